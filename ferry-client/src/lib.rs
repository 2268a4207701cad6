//! Ferry HTTP Client
//!
//! A type-safe HTTP client for the Ferry job server API.
//!
//! # Example
//!
//! ```no_run
//! use ferry_client::FerryClient;
//! use ferry_core::dto::job::SubmitJob;
//! use serde_json::json;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> ferry_client::Result<()> {
//!     let client = FerryClient::new("http://localhost:8080");
//!
//!     let submitted = client.submit_job(&SubmitJob {
//!         script_path: "scripts/predict.py".to_string(),
//!         args: json!({"allele": "HLA-A02:01", "lengths": [9, 10]}),
//!         job_name: Some("prediction".to_string()),
//!     }).await?;
//!
//!     let status = client.wait_for_job(submitted.job_id, Duration::from_secs(1)).await?;
//!     println!("Job {} finished: {}", status.job_id, status.status);
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Ferry job server
#[derive(Debug, Clone)]
pub struct FerryClient {
    /// Base URL of the server (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl FerryClient {
    /// Create a new client
    ///
    /// # Example
    /// ```
    /// use ferry_client::FerryClient;
    ///
    /// let client = FerryClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = FerryClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = FerryClient::new("http://localhost:8080//");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert_eq!(client.url("/jobs"), "http://localhost:8080/jobs");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = FerryClient::with_client("http://localhost:8080", http_client);
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
