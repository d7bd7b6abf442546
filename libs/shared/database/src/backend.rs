use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The REST backend the core reads records from and writes status changes to.
///
/// Paths are relative to the backend base URL and may carry a query string.
/// Implementations return the decoded JSON body (`Value::Null` for an empty
/// body) and treat any non-success status, transport failure or timeout as an
/// error.
#[async_trait]
pub trait ClinicBackend: Send + Sync {
    async fn get(&self, path: &str) -> Result<Value>;

    async fn put(&self, path: &str, body: Option<Value>) -> Result<Value>;
}
