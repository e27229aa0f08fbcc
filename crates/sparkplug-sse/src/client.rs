//! HTTP client for JSON snapshot endpoints and SSE streams.

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::SseError;
use crate::streaming::SseStream;

/// Client bound to one backend base URL.
#[derive(Clone)]
pub struct Client {
    /// HTTP client for making requests
    http_client: reqwest::Client,
    /// Base URL every path is appended to
    base_url: Url,
    /// Optional bearer token sent with every request
    bearer_token: Option<String>,
}

impl Client {
    /// Create a new client for the given base URL.
    ///
    /// # Example
    /// ```rust,no_run
    /// use sparkplug_sse::Client;
    ///
    /// # fn example() -> Result<(), sparkplug_sse::SseError> {
    /// let client = Client::new("http://localhost:8080")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(base_url: &str) -> Result<Self, SseError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SseError::InvalidUrl(format!(
                "'{}' cannot be used as a base URL",
                base_url
            )));
        }

        let http_client = reqwest::Client::builder()
            .build()
            .map_err(SseError::Http)?;

        Ok(Self {
            http_client,
            base_url,
            bearer_token: None,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Build the full URL for a path below the base URL.
    ///
    /// The path is appended to the base path rather than replacing it, so a
    /// base of `http://host/monitor` and a path of `/api/groups` yields
    /// `http://host/monitor/api/groups`.
    pub fn endpoint_url(&self, path: &str) -> Result<Url, SseError> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{}/{}", base, path))?)
    }

    /// Build headers with optional authentication.
    fn build_headers(&self, accept: &'static str) -> Result<HeaderMap, SseError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(accept));
        if let Some(token) = &self.bearer_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SseError::InvalidUrl(e.to_string()))?,
            );
        }
        Ok(headers)
    }

    /// GET a JSON document and deserialize it.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SseError> {
        let url = self.endpoint_url(path)?;
        tracing::debug!("[sse] GET {}", url);

        let response = self
            .http_client
            .get(url)
            .headers(self.build_headers("application/json")?)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Open a long-lived SSE stream.
    pub async fn open_stream(&self, path: &str) -> Result<SseStream, SseError> {
        let url = self.endpoint_url(path)?;
        tracing::info!("[sse] connecting to {}", url);

        let response = self
            .http_client
            .get(url)
            .headers(self.build_headers("text/event-stream")?)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        Ok(SseStream::new(response))
    }

    /// Turn non-2xx responses into `SseError::Status`.
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SseError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(SseError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.bearer_token.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_appends_to_base_path() {
        let client = Client::new("http://localhost:8080/monitor/").unwrap();
        assert_eq!(
            client.endpoint_url("/api/groups").unwrap().as_str(),
            "http://localhost:8080/monitor/api/groups"
        );
    }

    #[test]
    fn test_endpoint_url_plain_host() {
        let client = Client::new("http://localhost:8080").unwrap();
        assert_eq!(
            client.endpoint_url("api/groups/stream").unwrap().as_str(),
            "http://localhost:8080/api/groups/stream"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            Client::new("not a url"),
            Err(SseError::InvalidUrl(_))
        ));
        assert!(matches!(
            Client::new("mailto:ops@example.com"),
            Err(SseError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = Client::new("http://localhost:8080")
            .unwrap()
            .with_bearer_token("secret");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("authenticated: true"));
    }
}
