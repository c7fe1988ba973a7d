//! Remote API port (driven/secondary port)
//!
//! The sync engine replays queued operations through this interface. The
//! backend exposes plain REST resources (`/api/accounting/...`,
//! `/api/localization/indian/...`) whose JSON bodies are opaque here.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because transport errors are adapter-specific.
//!   Only the adapter knows its error types, so it also classifies them
//!   through [`IRemoteApi::failure_code`].
//! - Paths are relative to the adapter's configured base URL.

/// Port trait for the ERP REST backend
#[async_trait::async_trait]
pub trait IRemoteApi: Send + Sync {
    /// `GET path`, returning the decoded JSON body
    async fn get(&self, path: &str) -> anyhow::Result<serde_json::Value>;

    /// `POST path` with a JSON body
    async fn post(&self, path: &str, body: &serde_json::Value)
        -> anyhow::Result<serde_json::Value>;

    /// `PUT path` with a JSON body
    async fn put(&self, path: &str, body: &serde_json::Value) -> anyhow::Result<serde_json::Value>;

    /// `DELETE path`
    ///
    /// Returns `Value::Null` when the backend answers with an empty body.
    async fn delete(&self, path: &str) -> anyhow::Result<serde_json::Value>;

    /// Machine-readable category of an error returned by this adapter
    ///
    /// Recorded as the failure code of a queued operation (e.g. `"network"`,
    /// `"conflict"`, `"server_error"`).
    fn failure_code(&self, _err: &anyhow::Error) -> String {
        "remote".to_string()
    }
}
