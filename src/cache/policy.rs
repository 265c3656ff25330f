//! Operation-type cache policy.

use tracing::debug;

use super::context::OperationContext;
use crate::domain::operation::OperationKind;

/// Sets the cache mode of an operation before any business logic runs.
///
/// | kind   | tenant | mode      |
/// |--------|--------|-----------|
/// | read   | yes    | enabled   |
/// | read   | no     | skip      |
/// | write  | any    | skip      |
/// | stream | any    | untouched |
#[derive(Debug, Default, Clone, Copy)]
pub struct OperationCachePolicy;

impl OperationCachePolicy {
    pub fn apply(&self, kind: OperationKind, ctx: OperationContext) -> OperationContext {
        let ctx = match kind {
            OperationKind::Read if ctx.tenant().is_some() => ctx.with_cache_enabled(),
            OperationKind::Read | OperationKind::Write => ctx.with_cache_skipped(),
            OperationKind::Stream => ctx,
        };
        debug!(
            kind = kind.as_str(),
            scope = %ctx.scope(),
            mode = ctx.cache_mode().as_str(),
            operation = ctx.operation_name().unwrap_or("anonymous"),
            "Cache policy applied"
        );
        ctx
    }
}
