//! HTTP access to the remote marketplace (out-of-scope collaborator; the
//! core only needs the zip-download contract, per spec.md §1).

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{AgenShieldError, Result};

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[async_trait]
pub trait MarketplaceClient: Send + Sync {
    async fn download_zip(&self, url: &str) -> Result<Vec<u8>>;
}

pub struct HttpMarketplaceClient {
    http: reqwest::Client,
}

impl HttpMarketplaceClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(DOWNLOAD_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
        }
    }
}

impl Default for HttpMarketplaceClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketplaceClient for HttpMarketplaceClient {
    async fn download_zip(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(AgenShieldError::transient(
                url,
                format!("marketplace returned {}", response.status()),
            ));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
