//! Client for the ZiviConnect search and detail endpoints.
//!
//! The service answers a search with the matching assignment specifications
//! (`Pflichtenheft`) and serves the full record of each by id. Queries are
//! validated before any request is sent.

mod query;

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ORIGIN, REFERER};
use serde_json::Value;
use tracing::{debug, info, instrument};
use url::Url;

use zivi_core::DetailSource;
use zivi_records::{DetailRecord, SearchHit};
use zivi_shared::{AppConfig, Locale, Result, ZiviError};

pub use query::{
    DURATION_WEEKS, MAX_LANGUAGES, MAX_RADIUS_KM, MAX_SPECIAL_CODES, RADIUS_STEP_KM, SearchQuery,
};

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("zivi/", env!("CARGO_PKG_VERSION"));

/// Header carrying the response locale.
const LOCALE_HEADER: &str = "x-zivi-locale";

/// Keys under which a paged search response keeps its hits.
const PAGE_CONTENT_KEYS: [&str; 3] = ["content", "items", "results"];

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Connection settings for [`ZiviClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, e.g. `https://ziviconnect.admin.ch/web-zdp/api`.
    pub base_url: Url,
    /// Locale of localized response fields.
    pub locale: Locale,
    /// Bearer token.
    pub token: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl ClientConfig {
    /// Build the client settings from the loaded config and a resolved token.
    pub fn new(config: &AppConfig, locale: Locale, token: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(&config.api.base_url).map_err(|e| {
            ZiviError::config(format!("invalid api.base_url {:?}: {e}", config.api.base_url))
        })?;

        Ok(Self {
            base_url,
            locale,
            token: token.into(),
            timeout: Duration::from_secs(config.api.timeout_secs),
        })
    }

    /// Base URL without a trailing slash.
    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }
}

// ---------------------------------------------------------------------------
// ZiviClient
// ---------------------------------------------------------------------------

/// HTTP client for the search and detail endpoints.
pub struct ZiviClient {
    config: ClientConfig,
    client: Client,
}

impl ZiviClient {
    /// Create a new client. Fails on an empty token.
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.token.is_empty() {
            return Err(ZiviError::config("authentication token not set"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(|e| ZiviError::transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Search assignment specifications.
    ///
    /// The query is validated first; an invalid query sends no request.
    #[instrument(skip_all, fields(locale = %self.config.locale))]
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>> {
        query.validate()?;

        let url = format!("{}/pflichtenheft/search", self.config.base());
        info!(%url, "searching");

        let request = self.with_headers(self.client.post(&url)).json(query);
        let body = self.send(request, &url).await?;

        let hits = search_hits(body)?;
        info!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    /// Fetch the full record of one assignment specification.
    #[instrument(skip(self), fields(locale = %self.config.locale))]
    pub async fn detail(&self, id: u64) -> Result<DetailRecord> {
        let url = format!("{}/pflichtenheft/{id}", self.config.base());
        debug!(%url, "fetching detail");

        let request = self.with_headers(self.client.get(&url));
        let body = self.send(request, &url).await?;
        DetailRecord::from_value(body)
    }

    fn with_headers(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let base = self.config.base();
        request
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .header(LOCALE_HEADER, self.config.locale.as_str())
            .bearer_auth(&self.config.token)
            .header(ORIGIN, base)
            .header(REFERER, format!("{base}/zdp/einsatz"))
    }

    /// Send `request` and parse a successful body as JSON.
    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| ZiviError::transport(format!("{url}: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ZiviError::transport(format!("{url}: failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(ZiviError::api(status.as_u16(), body));
        }

        serde_json::from_str(&body)
            .map_err(|e| ZiviError::format(format!("{url}: response is not JSON: {e}")))
    }
}

impl DetailSource for ZiviClient {
    fn fetch_detail(&self, id: u64) -> impl Future<Output = Result<DetailRecord>> + Send {
        self.detail(id)
    }
}

/// Unwrap the hit list from a bare array or a page object.
fn search_hits(body: Value) -> Result<Vec<SearchHit>> {
    let items = match body {
        Value::Array(items) => items,
        Value::Object(mut page) => PAGE_CONTENT_KEYS
            .iter()
            .find_map(|key| match page.remove(*key) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .ok_or_else(|| ZiviError::format("search response has no result list"))?,
        _ => return Err(ZiviError::format("search response is neither a list nor a page")),
    };

    items.into_iter().map(SearchHit::from_value).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{any, body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, locale: Locale) -> ZiviClient {
        let mut app = AppConfig::default();
        app.api.base_url = format!("{}/web-zdp/api", server.uri());
        ZiviClient::new(ClientConfig::new(&app, locale, "secret").unwrap()).unwrap()
    }

    #[tokio::test]
    async fn search_sends_payload_and_headers() {
        let server = MockServer::start().await;
        let base = format!("{}/web-zdp/api", server.uri());

        Mock::given(method("POST"))
            .and(path("/web-zdp/api/pflichtenheft/search"))
            .and(header("authorization", "Bearer secret"))
            .and(header("x-zivi-locale", "fr-CH"))
            .and(header("accept", "application/json"))
            .and(header("origin", base.as_str()))
            .and(header("referer", format!("{base}/zdp/einsatz").as_str()))
            .and(body_json(json!({ "searchText": "Wald", "umkreis": 10 })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{ "id": 1 }, { "id": "2", "eibName": "B" }])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let query = SearchQuery {
            text: Some("Wald".into()),
            radius_km: Some(10),
            ..SearchQuery::default()
        };
        let hits = client(&server, Locale::FrCh).search(&query).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[1].id().unwrap(), 2);
    }

    #[tokio::test]
    async fn search_accepts_paged_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalElements": 1,
                "content": [{ "id": 5 }]
            })))
            .mount(&server)
            .await;

        let hits = client(&server, Locale::DeCh)
            .search(&SearchQuery::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id().unwrap(), 5);
    }

    #[tokio::test]
    async fn invalid_radius_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let query = SearchQuery {
            radius_km: Some(30),
            ..SearchQuery::default()
        };
        let err = client(&server, Locale::DeCh).search(&query).await.unwrap_err();
        assert!(matches!(err, ZiviError::Validation { .. }));
    }

    #[tokio::test]
    async fn non_success_is_api_error_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
            .mount(&server)
            .await;

        let err = client(&server, Locale::DeCh)
            .search(&SearchQuery::default())
            .await
            .unwrap_err();
        match err {
            ZiviError::Api { status, body } => {
                assert_eq!(status, Some(401));
                assert_eq!(body, "token expired");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn detail_fetches_record_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/web-zdp/api/pflichtenheft/42"))
            .and(header("x-zivi-locale", "it-CH"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "id": 42, "eibName": "Acme" })),
            )
            .mount(&server)
            .await;

        let c = client(&server, Locale::ItCh);
        let record = c.fetch_detail(42).await.unwrap();
        assert_eq!(record.id(), Some(42));
        assert_eq!(record.text(&["eibName"]), "Acme");
    }

    #[tokio::test]
    async fn detail_must_be_an_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([1, 2])))
            .mount(&server)
            .await;

        let err = client(&server, Locale::DeCh).detail(1).await.unwrap_err();
        assert!(matches!(err, ZiviError::Format { .. }));
    }

    #[tokio::test]
    async fn unreachable_service_is_transport_error() {
        let mut app = AppConfig::default();
        app.api.base_url = "http://127.0.0.1:9".into();
        app.api.timeout_secs = 2;
        let c = ZiviClient::new(ClientConfig::new(&app, Locale::DeCh, "t").unwrap()).unwrap();

        let err = c.detail(1).await.unwrap_err();
        assert!(matches!(err, ZiviError::Api { status: None, .. }));
    }

    #[test]
    fn empty_token_is_rejected() {
        let app = AppConfig::default();
        let config = ClientConfig::new(&app, Locale::DeCh, "").unwrap();
        assert!(matches!(ZiviClient::new(config), Err(ZiviError::Config { .. })));
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let mut app = AppConfig::default();
        app.api.base_url = "not a url".into();
        let err = ClientConfig::new(&app, Locale::DeCh, "t").unwrap_err();
        assert!(matches!(err, ZiviError::Config { .. }));
    }
}
