//! Remote health service API
//!
//! [`HealthApi`] is the boundary to the remote store. [`HttpHealthApi`] is the
//! reqwest implementation used in production; tests and embedders can supply
//! their own.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, ClientBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{ApiError, SyncError};
use crate::types::UnifiedDailyRecord;

/// User id sent by availability probes
pub const PROBE_USER_ID: &str = "healthcheck";

/// Server reply to a record submission
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncReceipt {
    /// `false` means the server refused the record
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    /// Stored record as echoed by the server, shape not guaranteed
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl SyncReceipt {
    pub fn is_rejected(&self) -> bool {
        self.success == Some(false)
    }

    /// `syncedAt` reported by the server, if any
    pub fn synced_at(&self) -> Option<DateTime<Utc>> {
        self.data
            .as_ref()
            .and_then(|d| d.get("syncedAt"))
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Trait for the remote health service
#[async_trait]
pub trait HealthApi: Send + Sync {
    /// Lightweight request used only to check reachability
    async fn probe(&self) -> Result<(), ApiError>;

    /// Submit one daily record. Not idempotent.
    async fn sync_record(&self, record: &UnifiedDailyRecord) -> Result<SyncReceipt, ApiError>;

    /// All records stored for `user_id`
    async fn list_records(&self, user_id: &str) -> Result<Vec<UnifiedDailyRecord>, ApiError>;

    /// Most recent record stored for `user_id`
    async fn latest_record(&self, user_id: &str) -> Result<Option<UnifiedDailyRecord>, ApiError>;
}

/// Records for `user_id` with `start <= recordDate <= end`.
///
/// The service has no range query, so this lists everything and filters
/// locally.
pub async fn records_in_range<A>(
    api: &A,
    user_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<Vec<UnifiedDailyRecord>, ApiError>
where
    A: HealthApi + ?Sized,
{
    let records = api.list_records(user_id).await?;
    Ok(records
        .into_iter()
        .filter(|r| r.record_date >= start && r.record_date <= end)
        .collect())
}

/// reqwest-backed [`HealthApi`]
#[derive(Debug, Clone)]
pub struct HttpHealthApi {
    client: Client,
    base_url: Url,
    probe_timeout: Duration,
}

impl HttpHealthApi {
    /// Build a client from configuration.
    ///
    /// Fails when the base URL does not parse or the HTTP client cannot be
    /// constructed.
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| {
            SyncError::Config(format!("invalid API URL {}: {e}", config.api_base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!(
                "API URL cannot be used as a base: {}",
                config.api_base_url
            )));
        }

        let client = ClientBuilder::new()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|e| SyncError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            probe_timeout: config.probe.timeout,
        })
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL extended with percent-encoded path segments
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Client(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Pass successful responses through, turn the rest into `ApiError::Status`
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl HealthApi for HttpHealthApi {
    async fn probe(&self) -> Result<(), ApiError> {
        let url = self.endpoint(&["health", "records"])?;
        let response = self
            .client
            .get(url)
            .query(&[("userId", PROBE_USER_ID)])
            .timeout(self.probe_timeout)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn sync_record(&self, record: &UnifiedDailyRecord) -> Result<SyncReceipt, ApiError> {
        let url = self.endpoint(&["health", "sync"])?;
        debug!(date = %record.record_date, "submitting daily record");

        let response = self.client.post(url).json(record).send().await?;
        let response = check_status(response).await?;
        let body = response.text().await?;

        let receipt = if body.trim().is_empty() {
            SyncReceipt::default()
        } else {
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?
        };

        if receipt.is_rejected() {
            return Err(ApiError::Rejected(
                receipt
                    .message
                    .unwrap_or_else(|| "no reason given".to_string()),
            ));
        }
        Ok(receipt)
    }

    async fn list_records(&self, user_id: &str) -> Result<Vec<UnifiedDailyRecord>, ApiError> {
        let url = self.endpoint(&["health", "records"])?;
        let response = self
            .client
            .get(url)
            .query(&[("userId", user_id)])
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    async fn latest_record(&self, user_id: &str) -> Result<Option<UnifiedDailyRecord>, ApiError> {
        let url = self.endpoint(&["health", "records", user_id, "latest"])?;
        let response = self.client.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        let body = response.text().await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Ok(None);
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn api_for(server: &MockServer) -> HttpHealthApi {
        let config = SyncConfig::default().with_base_url(format!("{}/api", server.uri()));
        HttpHealthApi::new(&config).unwrap()
    }

    fn sample_record() -> UnifiedDailyRecord {
        let mut record = UnifiedDailyRecord::new(date("2024-01-15")).with_user("alice");
        record.steps = Some(8500);
        record
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let config = SyncConfig::default().with_base_url("not a url");
        assert!(matches!(HttpHealthApi::new(&config), Err(SyncError::Config(_))));
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let config = SyncConfig::default().with_base_url("http://localhost:3000/api/");
        let api = HttpHealthApi::new(&config).unwrap();

        let url = api.endpoint(&["health", "records", "a b/c", "latest"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:3000/api/health/records/a%20b%2Fc/latest"
        );
    }

    #[test]
    fn test_receipt_synced_at() {
        let receipt: SyncReceipt = serde_json::from_value(json!({
            "success": true,
            "data": { "syncedAt": "2024-01-16T08:00:00Z" }
        }))
        .unwrap();

        assert!(!receipt.is_rejected());
        assert_eq!(
            receipt.synced_at().map(|t| t.to_rfc3339()),
            Some("2024-01-16T08:00:00+00:00".to_string())
        );
    }

    #[tokio::test]
    async fn test_probe_success_ignores_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/records"))
            .and(query_param("userId", PROBE_USER_ID))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>anything</html>"))
            .expect(1)
            .mount(&server)
            .await;

        api_for(&server).probe().await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/records"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let api = api_for(&server).with_probe_timeout(Duration::from_millis(100));
        let err = api.probe().await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_probe_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let err = api_for(&server).probe().await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_probe_connection_refused() {
        let config = SyncConfig::default().with_base_url("http://127.0.0.1:1/api");
        let err = HttpHealthApi::new(&config).unwrap().probe().await.unwrap_err();
        assert!(matches!(err, ApiError::Connect(_)), "unexpected error: {err:?}");
    }

    #[tokio::test]
    async fn test_sync_record_posts_camel_case() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/health/sync"))
            .and(body_partial_json(json!({
                "userId": "alice",
                "recordDate": "2024-01-15",
                "steps": 8500,
                "heartRate": null
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        let receipt = api_for(&server).sync_record(&sample_record()).await.unwrap();
        assert_eq!(receipt.success, Some(true));
    }

    #[tokio::test]
    async fn test_sync_record_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": false, "message": "duplicate" })),
            )
            .mount(&server)
            .await;

        let err = api_for(&server).sync_record(&sample_record()).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected(msg) if msg == "duplicate"));
    }

    #[tokio::test]
    async fn test_sync_record_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = api_for(&server).sync_record(&sample_record()).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 500, body } if body == "boom"));
    }

    #[tokio::test]
    async fn test_list_records_and_range_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/records"))
            .and(query_param("userId", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "recordDate": "2024-01-03", "userId": "alice", "steps": 3000 },
                { "recordDate": "2024-01-02", "userId": "alice", "steps": 2000, "syncedToNotion": true },
                { "recordDate": "2024-01-01", "userId": "alice", "weightKg": 70.2 }
            ])))
            .mount(&server)
            .await;

        let api = api_for(&server);
        assert_eq!(api.list_records("alice").await.unwrap().len(), 3);

        let ranged = records_in_range(&api, "alice", date("2024-01-02"), date("2024-01-03"))
            .await
            .unwrap();
        let dates: Vec<NaiveDate> = ranged.iter().map(|r| r.record_date).collect();
        assert_eq!(dates, vec![date("2024-01-03"), date("2024-01-02")]);
        assert!(ranged[1].is_synced());
    }

    #[tokio::test]
    async fn test_list_records_accepts_fractional_calories() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/records"))
            .and(query_param("userId", "alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "recordDate": "2024-01-02", "userId": "alice", "calories": 2199.6 },
                { "recordDate": "2024-01-01", "userId": "alice", "calories": 1800 }
            ])))
            .mount(&server)
            .await;

        let records = api_for(&server).list_records("alice").await.unwrap();
        let calories: Vec<Option<i64>> = records.iter().map(|r| r.calories).collect();
        assert_eq!(calories, vec![Some(2200), Some(1800)]);
    }

    #[tokio::test]
    async fn test_latest_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/health/records/alice/latest"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "recordDate": "2024-01-03", "steps": 3000 })),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/health/records/bob/latest"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let api = api_for(&server);
        let latest = api.latest_record("alice").await.unwrap().unwrap();
        assert_eq!(latest.record_date, date("2024-01-03"));
        assert!(api.latest_record("bob").await.unwrap().is_none());
    }
}
