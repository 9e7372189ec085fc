use std::time::Duration;

use curl::easy::{Easy, List};
use data_model::ClampStatus;
use log::{error, info, warn};
use url::Url;

use crate::error::Result;
use crate::link::Connectivity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub code: u32,
    pub body: String,
}

/// Sends a JSON body as an HTTP POST and returns whatever the server answered
pub trait HttpClient {
    fn post_json(&mut self, url: &Url, body: &str) -> Result<HttpResponse>;
}

/// [HttpClient] using libcurl, one blocking request at a time
pub struct CurlClient {
    timeout: Duration,
}

impl CurlClient {
    pub fn new(timeout: Duration) -> Self {
        CurlClient { timeout }
    }
}

impl HttpClient for CurlClient {
    fn post_json(&mut self, url: &Url, body: &str) -> Result<HttpResponse> {
        let mut headers = List::new();
        headers.append("Content-Type: application/json")?;

        let mut easy = Easy::new();
        easy.url(url.as_str())?;
        easy.post(true)?;
        easy.http_headers(headers)?;
        easy.timeout(self.timeout)?;
        easy.post_fields_copy(body.as_bytes())?;

        let mut data = Vec::new();
        {
            let mut transfer = easy.transfer();
            transfer.write_function(|new_data| {
                data.extend_from_slice(new_data);
                Ok(new_data.len())
            })?;
            transfer.perform()?;
        }

        Ok(HttpResponse {
            code: easy.response_code()?,
            body: String::from_utf8_lossy(&data).into_owned(),
        })
    }
}

/// What happened to one report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The link was down so nothing was sent
    Skipped,
    /// The server accepted the report with a 2xx code
    Delivered { code: u32, body: String },
    /// The server answered with a code outside 2xx
    Rejected { code: u32, body: String },
    /// No answer was obtained from the server
    Failed { reason: String },
}

impl SendOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SendOutcome::Delivered { .. })
    }
}

/// Owns the state of one simulated clamp and reports it to the server
pub struct Reporter<C: HttpClient> {
    status: ClampStatus,
    report_url: Url,
    client: C,
}

impl<C: HttpClient> Reporter<C> {
    pub fn new(status: ClampStatus, report_url: Url, client: C) -> Self {
        Reporter {
            status,
            report_url,
            client,
        }
    }

    pub fn status(&self) -> &ClampStatus {
        &self.status
    }

    pub fn report_url(&self) -> &Url {
        &self.report_url
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn tick(&mut self) {
        self.status.tick();
    }

    /// The JSON body for a report of the current state
    pub fn build_payload(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.status)?)
    }

    /// POST `payload` to the report url, if `link` is up. Failures are logged and returned,
    /// never retried.
    pub fn send(&mut self, link: &impl Connectivity, payload: &str) -> SendOutcome {
        if !link.is_connected() {
            warn!("Link is down: skipping report");
            return SendOutcome::Skipped;
        }

        match self.client.post_json(&self.report_url, payload) {
            Ok(HttpResponse { code, body }) if (200..300).contains(&code) => {
                info!("Sent report to '{}': HTTP {code}", self.report_url);
                info!("Response: {body}");
                SendOutcome::Delivered { code, body }
            }
            Ok(HttpResponse { code, body }) => {
                warn!("Report to '{}' rejected: HTTP {code}", self.report_url);
                warn!("Response: {body}");
                SendOutcome::Rejected { code, body }
            }
            Err(e) => {
                error!(
                    "Error reporting to '{}': {e}, skipping report",
                    self.report_url
                );
                SendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// One reporting cycle: drain the battery, then report the new state
    pub fn cycle(&mut self, link: &impl Connectivity) -> SendOutcome {
        self.tick();
        info!("Status: {}", self.status);

        match self.build_payload() {
            Ok(payload) => self.send(link, &payload),
            Err(e) => {
                error!("{e}, skipping report");
                SendOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }
}
