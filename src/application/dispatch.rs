//! Routes classified operations to a database handle and sets their cache mode.

use crate::cache::{OperationCachePolicy, OperationContext};
use crate::domain::operation::OperationKind;

/// Database handle an operation runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Cached read handle.
    Query,
    /// Uncached write handle with invalidation.
    Mutation,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Query => "query",
            Route::Mutation => "mutation",
        }
    }
}

/// Outcome of dispatching one operation.
#[derive(Debug, Clone)]
pub struct Dispatch {
    pub kind: OperationKind,
    pub route: Route,
    pub ctx: OperationContext,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OperationDispatcher {
    policy: OperationCachePolicy,
}

impl OperationDispatcher {
    pub fn new(policy: OperationCachePolicy) -> Self {
        Self { policy }
    }

    /// Streams go to the write handle so they never observe the read cache.
    pub fn route(kind: OperationKind) -> Route {
        match kind {
            OperationKind::Read => Route::Query,
            OperationKind::Write | OperationKind::Stream => Route::Mutation,
        }
    }

    pub fn dispatch(&self, kind: OperationKind, ctx: OperationContext) -> Dispatch {
        Dispatch {
            kind,
            route: Self::route(kind),
            ctx: self.policy.apply(kind, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::cache::CacheMode;
    use crate::domain::tenant::TenantId;

    #[test]
    fn routes_by_kind() {
        assert_eq!(OperationDispatcher::route(OperationKind::Read), Route::Query);
        assert_eq!(OperationDispatcher::route(OperationKind::Write), Route::Mutation);
        assert_eq!(OperationDispatcher::route(OperationKind::Stream), Route::Mutation);
    }

    #[test]
    fn dispatch_applies_policy() {
        let dispatcher = OperationDispatcher::default();
        let ctx = OperationContext::for_tenant(TenantId::new(Uuid::new_v4()));

        let read = dispatcher.dispatch(OperationKind::Read, ctx.clone());
        assert_eq!(read.route, Route::Query);
        assert_eq!(read.ctx.cache_mode(), CacheMode::Enabled);

        let stream = dispatcher.dispatch(OperationKind::Stream, ctx);
        assert_eq!(stream.route, Route::Mutation);
        assert_eq!(stream.ctx.cache_mode(), CacheMode::Untouched);
    }

    #[test]
    fn classified_documents_dispatch_end_to_end() {
        let dispatcher = OperationDispatcher::default();
        let kind = OperationKind::from_document("subscription { ticketUpdated { id } }")
            .expect("classified");

        let dispatch = dispatcher.dispatch(kind, OperationContext::system());
        assert_eq!(dispatch.route, Route::Mutation);
    }
}
