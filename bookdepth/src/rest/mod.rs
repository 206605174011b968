pub mod snapshot;

use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;

use crate::error::{BookError, Result};

/// Thin JSON GET wrapper over `reqwest` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct DepthHttpClient {
    client: Client,
}

impl DepthHttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bookdepth/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// GET a JSON resource from an absolute URL.
    ///
    /// # Errors
    ///
    /// [`BookError::Http`] for any non-success status, [`BookError::Request`]
    /// for transport failures and timeouts, [`BookError::Json`] for a body
    /// that does not decode into `T`.
    pub async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let resp = self.client.get(url).query(query).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(BookError::Http {
                status,
                message: body,
            });
        }

        let bytes = resp.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
