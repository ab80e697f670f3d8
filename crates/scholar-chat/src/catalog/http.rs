use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{parse_page, CatalogPage, CatalogSource};
use crate::config::CatalogConfig;
use crate::error::{CatalogError, ChatError};

/// Catalog client over HTTP.
pub struct HttpCatalog {
    client: Client,
    mailto: Option<String>,
}

impl HttpCatalog {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            mailto: config.mailto.clone(),
        })
    }

    async fn request(&self, url: &str) -> Result<CatalogPage, CatalogError> {
        let mut builder = self.client.get(url);
        if let Some(mailto) = &self.mailto {
            builder = builder.query(&[("mailto", mailto)]);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                CatalogError::Network("The search service took too long to respond.".to_string())
            } else if e.is_connect() {
                CatalogError::Network("Could not reach the search service.".to_string())
            } else {
                CatalogError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Network(format!("Failed to read response body: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(url = %url, status = %status, "Catalog returned error status");
            return Err(CatalogError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_page(&body)
    }
}

#[async_trait]
impl CatalogSource for HttpCatalog {
    async fn fetch_page(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<CatalogPage, ChatError> {
        tracing::debug!(url = %url, "Fetching catalog page");

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            result = self.request(url) => result?,
        };

        tracing::info!(
            count = page.meta.count,
            page = page.meta.page,
            per_page = page.meta.per_page,
            results = page.results.len(),
            "Catalog page fetched"
        );
        Ok(page)
    }
}
