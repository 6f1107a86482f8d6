//! Blocking client for the scraping API: crawl, render, and marketplace search.

use crate::api::decode::unescape_double_encoded;
use crate::api::error::ApiError;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde::Serialize;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://piloterr.com/api/v2";
const DEFAULT_USER_AGENT: &str = "lbcscan/0.1 (+https://github.com/lbcscan)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const API_KEY_HEADER: &str = "x-api-key";

const CRAWLER_PATH: &str = "website/crawler";
const RENDERING_PATH: &str = "website/rendering";
const SEARCH_PATH: &str = "leboncoin/search";

/// Scroll instruction sent with every rendering step: 2000 px down over 3 s, then wait 4 s.
const SCROLL_Y: u32 = 2000;
const SCROLL_DURATION_SECS: u32 = 3;
const SCROLL_WAIT_SECS: u32 = 4;

/// One browser instruction for the rendering endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrollInstruction {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub x: u32,
    pub y: u32,
    pub duration: u32,
    pub wait_time_s: u32,
}

impl ScrollInstruction {
    pub fn smooth_down() -> Self {
        Self {
            kind: "scroll",
            x: 0,
            y: SCROLL_Y,
            duration: SCROLL_DURATION_SECS,
            wait_time_s: SCROLL_WAIT_SECS,
        }
    }
}

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    query: &'a str,
    wait_in_seconds: String,
    browser_instructions: Vec<ScrollInstruction>,
}

/// Status and body of a search response, left unparsed for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Parse the body as JSON.
    pub fn json(&self) -> Result<serde_json::Value, ApiError> {
        serde_json::from_str(&self.body).map_err(|source| ApiError::Parse { source })
    }
}

/// Anything that can answer a marketplace search. Implemented by [ApiClient];
/// the category scanner is written against this so it can be driven without a network.
pub trait SearchApi {
    fn search(&mut self, query: &str) -> Result<RawResponse, ApiError>;
}

/// Blocking API client. The API key is sent as `x-api-key` on every request.
#[derive(Debug)]
pub struct ApiClient {
    inner: reqwest::blocking::Client,
    base_url: String,
    delay: Duration,
    last_request: Option<Instant>,
}

impl ApiClient {
    /// Builder; an API key must be set before [ApiClientBuilder::build].
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a page through the generic crawler and return its decoded HTML. No retries.
    pub fn crawl(&mut self, site_url: &str) -> Result<String, ApiError> {
        let endpoint = self.endpoint(CRAWLER_PATH);
        tracing::debug!(url = site_url, "crawl");
        self.wait_delay();
        let request = self.inner.get(&endpoint).query(&[("query", site_url)]);
        let body = self.send_checked(request, &endpoint)?;
        unescape_double_encoded(&body)
    }

    /// Render a page in the remote browser and return its decoded HTML.
    ///
    /// With `scroll_count == 0` this is a plain GET; otherwise a POST carrying
    /// `scroll_count` copies of [ScrollInstruction::smooth_down].
    pub fn render(
        &mut self,
        site_url: &str,
        wait_seconds: u32,
        scroll_count: u32,
    ) -> Result<String, ApiError> {
        let endpoint = self.endpoint(RENDERING_PATH);
        let wait = wait_seconds.to_string();
        tracing::debug!(url = site_url, wait_seconds, scroll_count, "render");
        self.wait_delay();
        let request = if scroll_count == 0 {
            self.inner
                .get(&endpoint)
                .query(&[("query", site_url), ("wait_in_seconds", wait.as_str())])
        } else {
            let payload = RenderRequest {
                query: site_url,
                wait_in_seconds: wait,
                browser_instructions: vec![ScrollInstruction::smooth_down(); scroll_count as usize],
            };
            self.inner.post(&endpoint).json(&payload)
        };
        let body = self.send_checked(request, &endpoint)?;
        unescape_double_encoded(&body)
    }

    fn send_checked(
        &mut self,
        request: reqwest::blocking::RequestBuilder,
        endpoint: &str,
    ) -> Result<String, ApiError> {
        let response = request.send().map_err(|source| ApiError::Transport {
            url: endpoint.to_string(),
            source,
        })?;
        self.last_request = Some(Instant::now());
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::HttpStatus {
                status: status.as_u16(),
                url: endpoint.to_string(),
            });
        }
        response
            .text()
            .map_err(|source| ApiError::BodyRead { source })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn wait_delay(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                std::thread::sleep(self.delay - elapsed);
            }
        }
    }
}

impl SearchApi for ApiClient {
    /// Run a marketplace search. The response is returned as-is: status is not
    /// checked and the body is not parsed.
    fn search(&mut self, query: &str) -> Result<RawResponse, ApiError> {
        let endpoint = self.endpoint(SEARCH_PATH);
        tracing::debug!(query, "search");
        self.wait_delay();
        let response = self
            .inner
            .get(&endpoint)
            .query(&[("query", query)])
            .send()
            .map_err(|source| ApiError::Transport {
                url: endpoint.clone(),
                source,
            })?;
        self.last_request = Some(Instant::now());
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|source| ApiError::BodyRead { source })?;
        Ok(RawResponse { status, body })
    }
}

/// Builder for [ApiClient]: API key, base URL, User-Agent, timeout, and request spacing.
#[derive(Debug)]
pub struct ApiClientBuilder {
    api_key: Option<String>,
    base_url: String,
    user_agent: Option<String>,
    timeout_secs: u64,
    delay_secs: u64,
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            delay_secs: 0,
        }
    }
}

impl ApiClientBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Override the API root, e.g. to point at a staging or mock server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Per-request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Minimum spacing between requests in seconds. Default 0.
    pub fn delay_secs(mut self, secs: u64) -> Self {
        self.delay_secs = secs;
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let api_key = self
            .api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or(ApiError::MissingApiKey)?;
        let mut key_value = HeaderValue::from_str(&api_key).map_err(|_| ApiError::InvalidApiKey)?;
        key_value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key_value);

        let base_url = self.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url).map_err(|e| ApiError::InvalidEndpoint {
            url: base_url.clone(),
            reason: e.to_string(),
        })?;

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|source| ApiError::Client { source })?;
        Ok(ApiClient {
            inner,
            base_url,
            delay: Duration::from_secs(self.delay_secs),
            last_request: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    const KEY: &str = "test-key";

    fn client_for(server: &mockito::Server) -> Result<ApiClient, ApiError> {
        ApiClient::builder()
            .api_key(KEY)
            .base_url(server.url())
            .timeout_secs(5)
            .build()
    }

    #[test]
    fn build_without_key_fails() {
        assert!(matches!(
            ApiClient::builder().build(),
            Err(ApiError::MissingApiKey)
        ));
        assert!(matches!(
            ApiClient::builder().api_key("   ").build(),
            Err(ApiError::MissingApiKey)
        ));
    }

    #[test]
    fn build_rejects_bad_base_url() {
        let result = ApiClient::builder()
            .api_key(KEY)
            .base_url("not a url")
            .build();
        assert!(matches!(result, Err(ApiError::InvalidEndpoint { .. })));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() -> Result<(), ApiError> {
        let client = ApiClient::builder()
            .api_key(KEY)
            .base_url("https://example.test/api/v2/")
            .build()?;
        assert_eq!(client.base_url(), "https://example.test/api/v2");
        Ok(())
    }

    #[test]
    fn scroll_instruction_serializes_with_api_field_names() -> Result<(), serde_json::Error> {
        let v = serde_json::to_value(ScrollInstruction::smooth_down())?;
        assert_eq!(
            v,
            json!({"type": "scroll", "x": 0, "y": 2000, "duration": 3, "wait_time_s": 4})
        );
        Ok(())
    }

    #[test]
    fn raw_response_json_reports_parse_error() {
        let raw = RawResponse {
            status: 200,
            body: "<html>not json</html>".to_string(),
        };
        assert!(raw.is_success());
        assert!(matches!(raw.json(), Err(ApiError::Parse { .. })));
    }

    #[test]
    fn crawl_sends_key_and_query_and_decodes_body() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/website/crawler")
            .match_header("x-api-key", KEY)
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "https://www.leboncoin.fr/c/voitures".into(),
            ))
            .with_status(200)
            .with_body("<h1 class=\\\"t\\\">Voitures d\\u00c3\\u00a9j\\u00c3\\u00a0 vues</h1>\\n")
            .create();
        let mut client = client_for(&server)?;
        let html = client.crawl("https://www.leboncoin.fr/c/voitures")?;
        assert_eq!(html, "<h1 class=\"t\">Voitures déjà vues</h1>\n");
        mock.assert();
        Ok(())
    }

    #[test]
    fn crawl_maps_http_error_status() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/website/crawler")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body("{\"error\":\"unauthorized\"}")
            .create();
        let mut client = client_for(&server)?;
        match client.crawl("https://www.leboncoin.fr/") {
            Err(ApiError::HttpStatus { status, .. }) => assert_eq!(status, 401),
            other => panic!("expected HttpStatus, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn crawl_surfaces_decode_error() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let _mock = server
            .mock("GET", "/website/crawler")
            .match_query(Matcher::Any)
            .with_body("caf\\u00e9")
            .create();
        let mut client = client_for(&server)?;
        assert!(matches!(
            client.crawl("https://www.leboncoin.fr/"),
            Err(ApiError::Decode { .. })
        ));
        Ok(())
    }

    #[test]
    fn render_without_scroll_is_get_with_wait() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/website/rendering")
            .match_header("x-api-key", KEY)
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "https://www.leboncoin.fr/".into()),
                Matcher::UrlEncoded("wait_in_seconds".into(), "7".into()),
            ]))
            .with_body("<p>ok</p>")
            .create();
        let mut client = client_for(&server)?;
        assert_eq!(client.render("https://www.leboncoin.fr/", 7, 0)?, "<p>ok</p>");
        mock.assert();
        Ok(())
    }

    #[test]
    fn render_with_scroll_posts_repeated_instructions() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let step = json!({"type": "scroll", "x": 0, "y": 2000, "duration": 3, "wait_time_s": 4});
        let mock = server
            .mock("POST", "/website/rendering")
            .match_header("x-api-key", KEY)
            .match_body(Matcher::Json(json!({
                "query": "https://www.leboncoin.fr/",
                "wait_in_seconds": "5",
                "browser_instructions": [step.clone(), step.clone(), step],
            })))
            .with_body("<p>scrolled</p>")
            .create();
        let mut client = client_for(&server)?;
        assert_eq!(
            client.render("https://www.leboncoin.fr/", 5, 3)?,
            "<p>scrolled</p>"
        );
        mock.assert();
        Ok(())
    }

    #[test]
    fn search_returns_raw_response_without_checking_status() -> Result<(), ApiError> {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/leboncoin/search")
            .match_header("x-api-key", KEY)
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                "https://www.leboncoin.fr/recherche?category=9".into(),
            ))
            .with_status(404)
            .with_body("not json")
            .create();
        let mut client = client_for(&server)?;
        let raw = client.search("https://www.leboncoin.fr/recherche?category=9")?;
        assert_eq!(raw.status, 404);
        assert_eq!(raw.body, "not json");
        assert!(!raw.is_success());
        mock.assert();
        Ok(())
    }

    #[test]
    fn unreachable_host_is_transport_error() -> Result<(), ApiError> {
        let mut client = ApiClient::builder()
            .api_key(KEY)
            .base_url("http://127.0.0.1:1")
            .timeout_secs(2)
            .build()?;
        let err = client
            .search("https://www.leboncoin.fr/recherche?category=1")
            .unwrap_err();
        assert!(err.is_transport());
        Ok(())
    }
}
