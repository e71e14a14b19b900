//! Blocking HTTP client backing the platform adapters.

use shopsync_adapter::{HttpClient, HttpResponse};
use std::time::Duration;

/// An [`HttpClient`] over `reqwest::blocking` with a fixed auth header.
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
    auth_header: (&'static str, String),
}

impl ReqwestClient {
    /// Creates a client with the given timeout and auth header.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying client cannot be built.
    pub fn new(
        timeout: Duration,
        auth_header: (&'static str, String),
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            auth_header,
        })
    }
}

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String> {
        let (header, value) = &self.auth_header;
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header(*header, value)
            .body(body)
            .send()
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.bytes().map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse::new(status, body))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
