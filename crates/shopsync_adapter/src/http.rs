//! HTTP client abstraction.
//!
//! The concrete HTTP library is chosen by the embedding binary; the adapters
//! here only need a way to POST bytes and read a status code back. This keeps
//! the engine crates free of any network dependency and makes loopback
//! servers and test doubles first-class.

/// A minimal HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self { status, body }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// HTTP client abstraction.
///
/// Implement this to provide the actual transport (reqwest, hyper, a
/// loopback server, a canned test double).
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with a JSON body and returns the response.
    ///
    /// Transport-level failures are reported as an error string; HTTP error
    /// statuses come back as a normal [`HttpResponse`] so callers can map
    /// them to outcomes.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}
