//! HTTP remote gateway.
//!
//! Speaks JSON to a REST-style record service:
//!
//! | Call      | Request                                  |
//! |-----------|------------------------------------------|
//! | create    | `POST   {base}/records`                  |
//! | update    | `PUT    {base}/records/{id}`             |
//! | status    | `POST   {base}/records/{id}/status`      |
//! | pin       | `POST   {base}/records/{id}/pin`         |
//! | highlight | `POST   {base}/records/{id}/highlight`   |
//! | delete    | `DELETE {base}/records/{id}`             |
//! | fetch     | `GET    {base}/records?owner={owner}`    |
//! | health    | `GET    {base}/health`                   |

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{RecordFields, RecordStatus};

use super::gateway::{RemoteError, RemoteGateway, RemoteRecord};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Remote gateway backed by reqwest.
pub struct HttpGateway {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    remote_id: String,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: RecordStatus,
}

#[derive(Debug, Serialize)]
struct PinBody {
    pinned: bool,
}

#[derive(Debug, Serialize)]
struct HighlightBody {
    highlighted: bool,
}

impl HttpGateway {
    /// Create a gateway for `endpoint` with an optional bearer token.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the endpoint is not an http(s) URL or the
    /// HTTP client cannot be built.
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let endpoint = endpoint.trim();
        let base = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid sync endpoint '{endpoint}': {e}")))?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "sync endpoint must be an http(s) URL, got '{endpoint}'"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("tack/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base,
            token: token.filter(|t| !t.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.base.as_str().trim_end_matches('/')
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // http(s) bases always have path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn record_url(&self, remote_id: &str, action: Option<&str>) -> Url {
        match action {
            Some(action) => self.url(&["records", remote_id, action]),
            None => self.url(&["records", remote_id]),
        }
    }

    fn fetch_request(&self, owner_id: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, self.url(&["records"]))
            .query(&[("owner", owner_id)])
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        trace!(%method, %url, "Remote request");
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request and map non-success statuses to [`RemoteError`].
    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> std::result::Result<reqwest::Response, RemoteError> {
        let response = builder
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, &body))
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        url: Url,
        body: &B,
    ) -> std::result::Result<(), RemoteError> {
        self.send(self.request(reqwest::Method::POST, url).json(body))
            .await
            .map(|_| ())
    }
}

/// Map an HTTP error status to the gateway error taxonomy.
fn classify(status: StatusCode, body: &str) -> RemoteError {
    let detail = if body.trim().is_empty() {
        status.to_string()
    } else {
        format!("{status}: {}", body.trim())
    };
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized(detail),
        StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Rejected(detail)
        }
        _ => RemoteError::Transport(detail),
    }
}

impl RemoteGateway for HttpGateway {
    async fn create_record(&self, fields: &RecordFields) -> std::result::Result<String, RemoteError> {
        let response = self
            .send(self.request(reqwest::Method::POST, self.url(&["records"])).json(fields))
            .await?;
        let created: CreateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(format!("invalid create response: {e}")))?;
        Ok(created.remote_id)
    }

    async fn update_record(
        &self,
        remote_id: &str,
        fields: &RecordFields,
    ) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(remote_id, None);
        self.send(self.request(reqwest::Method::PUT, url).json(fields))
            .await
            .map(|_| ())
    }

    async fn set_status(
        &self,
        remote_id: &str,
        status: RecordStatus,
    ) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(remote_id, Some("status"));
        self.post_json(url, &StatusBody { status }).await
    }

    async fn set_pin(&self, remote_id: &str, pinned: bool) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(remote_id, Some("pin"));
        self.post_json(url, &PinBody { pinned }).await
    }

    async fn set_highlight(
        &self,
        remote_id: &str,
        highlighted: bool,
    ) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(remote_id, Some("highlight"));
        self.post_json(url, &HighlightBody { highlighted }).await
    }

    async fn delete_record(&self, remote_id: &str) -> std::result::Result<(), RemoteError> {
        let url = self.record_url(remote_id, None);
        match self.send(self.request(reqwest::Method::DELETE, url)).await {
            Ok(_) | Err(RemoteError::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn fetch_all(&self, owner_id: &str) -> std::result::Result<Vec<RemoteRecord>, RemoteError> {
        let response = self.send(self.fetch_request(owner_id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Transport(format!("invalid record list: {e}")))
    }

    async fn is_reachable(&self) -> bool {
        let response = self
            .request(reqwest::Method::GET, self.url(&["health"]))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await;
        matches!(response, Ok(r) if r.status().is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(classify(StatusCode::NOT_FOUND, ""), RemoteError::NotFound);
        assert!(matches!(
            classify(StatusCode::FORBIDDEN, ""),
            RemoteError::Unauthorized(_)
        ));
        assert!(matches!(
            classify(StatusCode::UNPROCESSABLE_ENTITY, "title required"),
            RemoteError::Rejected(msg) if msg.contains("title required")
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, ""),
            RemoteError::Transport(_)
        ));
    }

    #[test]
    fn test_urls() {
        let gateway = HttpGateway::new("https://sync.example.com/api/", None).unwrap();
        assert_eq!(gateway.endpoint(), "https://sync.example.com/api");
        assert_eq!(
            gateway.record_url("r 1/x", Some("pin")).as_str(),
            "https://sync.example.com/api/records/r%201%2Fx/pin"
        );
        assert_eq!(
            gateway.url(&["records"]).as_str(),
            "https://sync.example.com/api/records"
        );

        let bare = HttpGateway::new("http://localhost:8080", None).unwrap();
        assert_eq!(bare.endpoint(), "http://localhost:8080");
        assert_eq!(
            bare.record_url("r1", None).as_str(),
            "http://localhost:8080/records/r1"
        );
    }

    #[test]
    fn test_owner_is_query_encoded() {
        let gateway = HttpGateway::new("https://sync.example.com/api", None).unwrap();
        let request = gateway.fetch_request("user 1&x").build().unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://sync.example.com/api/records?owner=user+1%26x"
        );
    }

    #[test]
    fn test_rejects_non_http_endpoint() {
        assert!(matches!(
            HttpGateway::new("ftp://example.com", None),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_blank_token_ignored() {
        let gateway = HttpGateway::new("http://localhost:8080", Some("  ".into())).unwrap();
        assert!(gateway.token.is_none());
    }
}
