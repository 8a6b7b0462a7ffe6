//! Calendar feed HTTP client

use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::{IngestError, Result};

/// Downloads the raw calendar feed
#[derive(Clone)]
pub struct FeedClient {
    client: Client,
    url: String,
}

impl FeedClient {
    /// Create a new feed client
    ///
    /// `webcal://` URLs are fetched over https.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = normalize_url(url)?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

        info!("Calendar feed client initialized for: {}", url);

        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch the feed body
    ///
    /// Transport failures and non-success statuses both surface as
    /// `SourceUnavailable`; nothing is retried here.
    pub async fn fetch(&self) -> Result<Vec<u8>> {
        debug!("Fetching calendar feed from: {}", self.url);

        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Calendar feed request failed: {}", status);
            return Err(IngestError::SourceUnavailable(format!(
                "Request failed: {}",
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| IngestError::SourceUnavailable(e.to_string()))?;

        debug!("Fetched {} bytes of calendar feed", body.len());
        Ok(body.to_vec())
    }
}

fn normalize_url(raw: &str) -> Result<String> {
    let mut parsed = url::Url::parse(raw.trim()).map_err(|e| IngestError::InvalidUrl(e.to_string()))?;

    if parsed.scheme() == "webcal" {
        // Url::set_scheme refuses special/non-special swaps, so rebuild it
        let rebuilt = format!("https{}", &parsed.as_str()["webcal".len()..]);
        parsed = url::Url::parse(&rebuilt).map_err(|e| IngestError::InvalidUrl(e.to_string()))?;
    }

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(IngestError::InvalidUrl(format!(
            "unsupported scheme: {}",
            parsed.scheme()
        )));
    }

    Ok(parsed.to_string())
}
