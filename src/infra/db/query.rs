use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use sqlx::{
    Postgres,
    postgres::{PgArguments, PgPool},
    query::QueryAs,
    types::Json,
};
use tracing::debug;

use crate::cache::{CacheEntry, CachedDriver, Fetched, OperationContext, QueryKey, QueryRequest};
use crate::infra::error::InfraError;

/// Read handle: every query goes through the cached driver.
#[derive(Clone)]
pub struct QueryClient {
    pool: PgPool,
    driver: Arc<CachedDriver>,
}

impl QueryClient {
    pub fn new(pool: PgPool, driver: Arc<CachedDriver>) -> Self {
        Self { pool, driver }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Serve `request` from cache, or run `load` against the read pool.
    pub async fn cached<F, Fut>(
        &self,
        ctx: &OperationContext,
        request: &QueryRequest,
        load: F,
    ) -> Result<Fetched, InfraError>
    where
        F: FnOnce(PgPool) -> Fut,
        Fut: Future<Output = Result<CacheEntry, sqlx::Error>>,
    {
        let pool = self.pool.clone();
        self.driver
            .query(ctx, request, move || async move {
                load(pool).await.map_err(InfraError::from)
            })
            .await
    }

    /// Run `sql` with positional `args` and return each row as a JSON object.
    ///
    /// The cache key is the fingerprint of the SQL text and arguments. Scalar
    /// arguments bind as their native types; arrays and objects bind as jsonb.
    pub async fn fetch_json(
        &self,
        ctx: &OperationContext,
        sql: &str,
        args: Vec<Value>,
        ttl: Option<Duration>,
    ) -> Result<Fetched, InfraError> {
        let mut request = QueryRequest::new(QueryKey::fingerprint(sql, &args));
        request.ttl = ttl;
        let wrapped = row_json_sql(sql);

        self.cached(ctx, &request, move |pool| async move {
            debug!(sql = %wrapped, "Loading query from read pool");
            let mut query = sqlx::query_as::<_, (Value,)>(&wrapped);
            for arg in &args {
                query = bind_json(query, arg);
            }
            let rows = query.fetch_all(&pool).await?;
            Ok::<_, sqlx::Error>(CacheEntry::scalar_rows(
                "row",
                rows.into_iter().map(|(row,)| row),
            ))
        })
        .await
    }
}

/// Wrap `sql` so every row comes back as one JSON object column.
fn row_json_sql(sql: &str) -> String {
    format!("SELECT row_to_json(t) AS row FROM ({sql}) t")
}

/// Postgres type a JSON argument binds as.
#[derive(Debug, PartialEq)]
enum JsonParam<'a> {
    Null,
    Bool(bool),
    Int(i64),
    Float(Option<f64>),
    Text(&'a str),
    Jsonb(&'a Value),
}

impl<'a> From<&'a Value> for JsonParam<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => JsonParam::Null,
            Value::Bool(flag) => JsonParam::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => JsonParam::Int(int),
                None => JsonParam::Float(number.as_f64()),
            },
            Value::String(text) => JsonParam::Text(text),
            other => JsonParam::Jsonb(other),
        }
    }
}

fn bind_json<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    value: &'q Value,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    match JsonParam::from(value) {
        JsonParam::Null => query.bind(None::<String>),
        JsonParam::Bool(flag) => query.bind(flag),
        JsonParam::Int(int) => query.bind(int),
        JsonParam::Float(float) => query.bind(float),
        JsonParam::Text(text) => query.bind(text),
        JsonParam::Jsonb(other) => query.bind(Json(other)),
    }
}
