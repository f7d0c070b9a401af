//! Fire-and-forget HTTP pushes to the realtime server
//!
//! Each notice is POSTed from its own task; failures are logged and never
//! reach the coordinator loop.

use jukebox_common::events::{TransportNotice, ValidationNotice};
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout for a single push
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// One push to the realtime server's HTTP control surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpNotice {
    /// New entry in the tracklist
    Tracklist(TransportNotice),
    Pause(TransportNotice),
    Resume(TransportNotice),
    Skip(TransportNotice),
    /// Validation outcome for a remotely enqueued entry
    Validate(ValidationNotice),
}

impl HttpNotice {
    pub fn path(&self) -> &'static str {
        match self {
            HttpNotice::Tracklist(_) => "/api/tracklist",
            HttpNotice::Pause(_) => "/api/pause",
            HttpNotice::Resume(_) => "/api/resume",
            HttpNotice::Skip(_) => "/api/skip",
            HttpNotice::Validate(_) => "/api/validate",
        }
    }

    pub fn body(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            HttpNotice::Tracklist(notice)
            | HttpNotice::Pause(notice)
            | HttpNotice::Resume(notice)
            | HttpNotice::Skip(notice) => serde_json::to_value(notice),
            HttpNotice::Validate(notice) => serde_json::to_value(notice),
        }
    }
}

#[derive(Clone)]
pub struct HttpNotifier {
    client: reqwest::Client,
    base_url: String,
}

impl HttpNotifier {
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, notice: &HttpNotice) -> String {
        format!("{}{}", self.base_url, notice.path())
    }

    /// Spawn the POST and return immediately
    pub fn notify(&self, notice: HttpNotice) {
        let body = match notice.body() {
            Ok(body) => body,
            Err(e) => {
                warn!("Failed to encode {} body: {}", notice.path(), e);
                return;
            }
        };
        let url = self.url_for(&notice);
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.post(&url).json(&body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(url = %url, "Pushed notice");
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status().as_u16(), "Push rejected");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Push failed");
                }
            }
        });
    }
}
