//! Question-board client, shared by the public Stack Overflow site and the
//! internal (Teams) deployment.
//!
//! One `GET /questions` per tag; no paging is performed, so long polling
//! windows are capped at the upstream's default page size. A single 429 is
//! absorbed inside the client: sleep the throttle backoff, then report the
//! tag as empty. Everything else classifies upward.

use std::time::Duration;

use serde::Deserialize;
use spiegel_core::{Service, UpstreamError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::classify::classify_status;
use crate::http::{parse_json, send_with_cancel};

/// Back-off applied after a 429 before treating the tag as empty.
pub const THROTTLE_BACKOFF: Duration = Duration::from_millis(5100);

/// Timeout applied to credential-validation probes only; ordinary fetches
/// rely on the transport default.
const VALIDATE_TIMEOUT: Duration = Duration::from_secs(10);

/// One question record as returned by the board's `/questions` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Question {
    pub question_id: i64,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    items: Vec<Question>,
}

pub struct StackOverflowClient {
    client: reqwest::Client,
    service: Service,
    api_url: String,
    web_url: String,
    /// Site parameter, only sent for the public deployment.
    site: Option<String>,
    /// `X-API-Key` header value, only sent for the internal deployment.
    api_key: Option<String>,
    user_agent: String,
    throttle_backoff: Duration,
}

impl StackOverflowClient {
    /// Client for the public site. No key; `site=stackoverflow`.
    pub fn public(api_url: impl Into<String>, web_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            service: Service::StackOverflow,
            api_url: api_url.into(),
            web_url: web_url.into(),
            site: Some("stackoverflow".to_string()),
            api_key: None,
            user_agent: "spiegel (stack-overflow)".to_string(),
            throttle_backoff: THROTTLE_BACKOFF,
        }
    }

    /// Client for the internal Teams deployment, authenticated via
    /// `X-API-Key`.
    pub fn internal(
        api_url: impl Into<String>,
        web_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            service: Service::InternalStackOverflow,
            api_url: api_url.into(),
            web_url: web_url.into(),
            site: None,
            api_key: Some(api_key.into()),
            user_agent: "spiegel (internal-stack-overflow)".to_string(),
            throttle_backoff: THROTTLE_BACKOFF,
        }
    }

    /// Shorten the 429 back-off; tests only.
    pub fn with_throttle_backoff(mut self, backoff: Duration) -> Self {
        self.throttle_backoff = backoff;
        self
    }

    pub fn service(&self) -> Service {
        self.service
    }

    /// Canonical question URL on this deployment's web host.
    pub fn question_url(&self, question_id: i64) -> String {
        format!("{}/questions/{}", self.web_url, question_id)
    }

    fn questions_request(&self, tag: &str, from_unix: i64) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/questions", self.api_url))
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .query(&[
                ("fromdate", from_unix.to_string()),
                ("filter", "withbody".to_string()),
                ("tagged", tag.to_string()),
            ]);
        if let Some(site) = &self.site {
            request = request.query(&[("site", site.as_str())]);
        }
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        request
    }

    /// Fetch all questions tagged `tag` created at or after `from_unix`.
    pub async fn fetch_questions(
        &self,
        tag: &str,
        from_unix: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<Question>, UpstreamError> {
        debug!(service = %self.service, tag, from_unix, "fetching questions");
        let response =
            send_with_cancel(self.service, cancel, self.questions_request(tag, from_unix)).await?;

        let status = response.status();
        if status.as_u16() == 429 {
            // One fixed back-off, then the tag yields an empty page; no
            // recursive retry.
            warn!(service = %self.service, tag, "throttled; backing off");
            tokio::time::sleep(self.throttle_backoff).await;
            return Ok(Vec::new());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.service, status, &body));
        }

        let parsed: QuestionsResponse = parse_json(self.service, response).await?;
        Ok(parsed.items)
    }

    /// Minimal authenticated probe used by the credential validator.
    pub async fn validate(&self, cancel: &CancellationToken) -> Result<(), UpstreamError> {
        let request = self
            .questions_request("spiegel-validate", 0)
            .query(&[("pagesize", "1")])
            .timeout(VALIDATE_TIMEOUT);
        let response = send_with_cancel(self.service, cancel, request).await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(self.service, status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn test_fetch_sends_expected_query() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/questions")
                .query_param("fromdate", "1700000000")
                .query_param("filter", "withbody")
                .query_param("tagged", "sentry")
                .query_param("site", "stackoverflow");
            then.status(200)
                .json_body(serde_json::json!({ "items": [
                    { "question_id": 12345, "title": "T", "body": "B" }
                ]}));
        });

        let client = StackOverflowClient::public(server.base_url(), "https://stackoverflow.com");
        let items = client
            .fetch_questions("sentry", 1_700_000_000, &cancel())
            .await
            .unwrap();
        mock.assert();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].question_id, 12345);
        assert_eq!(items[0].title, "T");
    }

    #[tokio::test]
    async fn test_internal_sends_api_key_and_no_site() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/questions")
                .header("X-API-Key", "sekrit");
            then.status(200).json_body(serde_json::json!({ "items": [] }));
        });

        let client = StackOverflowClient::internal(
            server.base_url(),
            "https://internal.example.com",
            "sekrit",
        );
        let items = client.fetch_questions("sdk", 0, &cancel()).await.unwrap();
        mock.assert();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_throttle_yields_empty_page() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(429);
        });

        let client = StackOverflowClient::public(server.base_url(), "https://stackoverflow.com")
            .with_throttle_backoff(Duration::from_millis(10));
        let items = client.fetch_questions("sentry", 0, &cancel()).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_classifies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(200).body("{\"unexpected\": true}");
        });

        let client = StackOverflowClient::public(server.base_url(), "https://stackoverflow.com");
        let err = client
            .fetch_questions("sentry", 0, &cancel())
            .await
            .unwrap_err();
        assert_eq!(err.kind, spiegel_core::ErrorKind::Malformed);
    }

    #[tokio::test]
    async fn test_server_error_classifies() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(503).body("maintenance");
        });

        let client = StackOverflowClient::public(server.base_url(), "https://stackoverflow.com");
        let err = client
            .fetch_questions("sentry", 0, &cancel())
            .await
            .unwrap_err();
        assert_eq!(err.kind, spiegel_core::ErrorKind::Server);
        assert_eq!(err.service, Service::StackOverflow);
    }

    #[tokio::test]
    async fn test_cancelled_token_short_circuits() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/questions");
            then.status(200).json_body(serde_json::json!({ "items": [] }));
        });

        let client = StackOverflowClient::public(server.base_url(), "https://stackoverflow.com");
        let token = CancellationToken::new();
        token.cancel();
        let err = client.fetch_questions("sentry", 0, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_question_url() {
        let client =
            StackOverflowClient::public("https://api.example.com/2.3", "https://stackoverflow.com");
        assert_eq!(
            client.question_url(77),
            "https://stackoverflow.com/questions/77"
        );
    }
}
