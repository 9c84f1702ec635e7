//! Anthropic Admin Cost API collector.
//!
//! Requires an organization Admin API key (`sk-ant-admin...`). Amounts come
//! back as decimal strings in cents and are converted with exact decimal
//! arithmetic.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

use crate::core::collectors::fetch::{build_http_client, check_status, validate_endpoint};
use crate::core::collectors::paging::{fetch_all_pages, Page};
use crate::core::collectors::{
    CollectionPeriod, Collector, CollectorError, CollectorKind, DEFAULT_LOOKBACK_DAYS,
};
use crate::core::cost::aggregate::{average_daily_cost, bucket_date, DailyTotals, ServiceTotals};
use crate::core::cost::money::{add_amounts, cents_to_dollars, parse_amount};
use crate::core::cost::trend::calculate_trend;
use crate::core::models::cost::{CostData, DailyCost, USD};

pub const COST_REPORT_URL: &str = "https://api.anthropic.com/v1/organizations/cost_report";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const ADMIN_KEY_PREFIX: &str = "sk-ant-admin";
pub const ADMIN_KEY_ENV: &str = "ANTHROPIC_ADMIN_KEY";

const SERVICE_PREFIX: &str = "Claude::";
const FALLBACK_SERVICE: &str = "API Usage";

#[derive(Deserialize)]
struct CostReportResponse {
    data: Option<Vec<CostBucket>>,
    /// Sent as `null` on some final pages.
    has_more: Option<bool>,
    next_page: Option<String>,
}

#[derive(Deserialize)]
struct CostBucket {
    starting_at: Option<String>,
    results: Option<Vec<CostItem>>,
}

#[derive(Deserialize)]
struct CostItem {
    /// Cents, as a decimal string
    amount: Option<Value>,
    description: Option<String>,
    model: Option<String>,
}

/// Label for a line item: description, then model, then a generic fallback,
/// namespaced so it never collides with another provider's services.
fn service_label(item: &CostItem) -> String {
    let name = [item.description.as_deref(), item.model.as_deref()]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or(FALLBACK_SERVICE);
    format!("{SERVICE_PREFIX}{name}")
}

fn day_start(date: NaiveDate) -> String {
    format!("{}T00:00:00Z", date.format("%Y-%m-%d"))
}

/// Collector for Anthropic API spend.
pub struct AnthropicCostCollector {
    client: Client,
    api_key: String,
    endpoint: String,
    lookback_days: u32,
}

impl std::fmt::Debug for AnthropicCostCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicCostCollector")
            .field("endpoint", &self.endpoint)
            .field("lookback_days", &self.lookback_days)
            .finish_non_exhaustive()
    }
}

impl AnthropicCostCollector {
    /// Create a collector with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `CollectorError::Config` if the key is empty or is not an
    /// Admin API key.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, CollectorError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(CollectorError::Config(
                "Anthropic Admin API key is required".to_string(),
            ));
        }
        if !api_key.starts_with(ADMIN_KEY_PREFIX) {
            return Err(CollectorError::Config(format!(
                "Anthropic Admin API key should start with '{ADMIN_KEY_PREFIX}'"
            )));
        }

        Ok(Self {
            client: build_http_client(timeout)?,
            api_key,
            endpoint: COST_REPORT_URL.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        })
    }

    /// Create a collector from `ANTHROPIC_ADMIN_KEY`.
    pub fn from_env(timeout: Duration) -> Result<Self, CollectorError> {
        let api_key = std::env::var(ADMIN_KEY_ENV).map_err(|_| {
            CollectorError::Config(format!("{ADMIN_KEY_ENV} environment variable not set"))
        })?;
        Self::new(api_key, timeout)
    }

    /// Point the collector at a different cost report URL.
    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, CollectorError> {
        validate_endpoint(endpoint, CollectorKind::Anthropic.display_name())?;
        self.endpoint = endpoint.to_string();
        Ok(self)
    }

    #[must_use]
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    async fn fetch_page(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        cursor: Option<String>,
    ) -> Result<Page<Vec<CostBucket>>, CollectorError> {
        let mut params = vec![("starting_at", day_start(start)), ("ending_at", day_start(end))];
        if let Some(cursor) = cursor {
            params.push(("page", cursor));
        }
        debug!(endpoint = %self.endpoint, ?params, "Requesting Anthropic cost report");

        let response = self
            .client
            .get(&self.endpoint)
            .query(&params)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("x-api-key", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        let report: CostReportResponse = serde_json::from_slice(&body)?;
        Ok(Page::new(
            report.data.unwrap_or_default(),
            report.has_more.unwrap_or(false),
            report.next_page,
        ))
    }

    async fn fetch_buckets(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<CostBucket>, CollectorError> {
        let pages = fetch_all_pages(|cursor| self.fetch_page(start, end, cursor)).await?;
        Ok(pages.into_iter().flatten().collect())
    }

    /// Per-service totals over the snapshot window.
    #[instrument(skip(self), level = "debug")]
    async fn fetch_service_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ServiceTotals, CollectorError> {
        let mut totals = ServiceTotals::new();
        for bucket in self.fetch_buckets(start, end).await? {
            for item in bucket.results.unwrap_or_default() {
                let dollars = cents_to_dollars(parse_amount(item.amount.as_ref())?);
                totals.add(service_label(&item), dollars)?;
            }
        }
        Ok(totals)
    }

    /// Daily series over the lookback window, bucketed by the provider's own
    /// bucket start date.
    #[instrument(skip(self), level = "debug")]
    async fn fetch_daily_costs(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCost>, CollectorError> {
        let mut daily = DailyTotals::new();
        for bucket in self.fetch_buckets(start, end).await? {
            let Some(date) = bucket.starting_at.as_deref().and_then(bucket_date) else {
                debug!("Skipping cost bucket without a start date");
                continue;
            };
            let mut cents = Decimal::ZERO;
            for item in bucket.results.unwrap_or_default() {
                cents = add_amounts(cents, parse_amount(item.amount.as_ref())?)?;
            }
            daily.add(date, cents_to_dollars(cents))?;
        }
        Ok(daily.into_daily_costs())
    }

    async fn try_collect(&self, period: CollectionPeriod) -> Result<CostData, CollectorError> {
        let (snapshot_start, snapshot_end) = period.snapshot_window();
        let totals = self.fetch_service_totals(snapshot_start, snapshot_end).await?;

        let (lookback_start, lookback_end) = period.lookback_window(self.lookback_days);
        let daily_costs = self.fetch_daily_costs(lookback_start, lookback_end).await?;

        Ok(CostData {
            start_date: period.start,
            end_date: period.end,
            collection_timestamp: Utc::now(),
            account_id: self.collector_name().to_string(),
            total_cost: totals.total_rounded(),
            currency: USD.to_string(),
            trend: calculate_trend(&daily_costs),
            average_daily_cost: average_daily_cost(&daily_costs),
            cost_by_service: totals.into_cost_by_service(),
            daily_costs,
            forecast: None,
        })
    }
}

#[async_trait]
impl Collector for AnthropicCostCollector {
    fn collector_name(&self) -> &'static str {
        CollectorKind::Anthropic.id()
    }

    async fn collect(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> CostData {
        let collection_timestamp = Utc::now();
        let period = CollectionPeriod::resolve(start_date, end_date, collection_timestamp.date_naive());
        info!(
            collector = self.collector_name(),
            start = %period.start,
            end = %period.end,
            "Collecting Anthropic costs"
        );

        match self.try_collect(period).await {
            Ok(data) => data,
            Err(e) => {
                error!(collector = self.collector_name(), error = %e, "Failed to collect Anthropic costs");
                CostData::degraded(
                    self.collector_name(),
                    period.start,
                    period.end,
                    collection_timestamp,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::cost::Trend;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

    const KEY: &str = "sk-ant-admin-test-key";
    const REPORT_PATH: &str = "/v1/organizations/cost_report";

    struct MissingQueryParam(&'static str);

    impl Match for MissingQueryParam {
        fn matches(&self, request: &Request) -> bool {
            !request.url.query_pairs().any(|(k, _)| k == self.0)
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn collector(server: &MockServer) -> AnthropicCostCollector {
        AnthropicCostCollector::new(KEY, Duration::from_secs(5))
            .unwrap()
            .with_endpoint(&format!("{}{}", server.uri(), REPORT_PATH))
            .unwrap()
    }

    fn bucket(day: &str, items: Value) -> Value {
        json!({ "starting_at": format!("{day}T00:00:00Z"), "ending_at": null, "results": items })
    }

    fn page(buckets: Vec<Value>, next_page: Option<&str>) -> Value {
        json!({
            "data": buckets,
            "has_more": next_page.is_some(),
            "next_page": next_page,
        })
    }

    /// Snapshot request for the default test period 2025-01-14..2025-01-15.
    async fn mount_snapshot(server: &MockServer, body: Value) {
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .and(query_param("starting_at", "2025-01-14T00:00:00Z"))
            .and(query_param("ending_at", "2025-01-15T00:00:00Z"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    /// First page of the 14-day lookback ending 2025-01-15.
    fn daily_request() -> wiremock::MockBuilder {
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .and(query_param("starting_at", "2025-01-01T00:00:00Z"))
            .and(query_param("ending_at", "2025-01-15T00:00:00Z"))
    }

    async fn collect(collector: &AnthropicCostCollector) -> CostData {
        collector
            .collect(Some(date("2025-01-14")), Some(date("2025-01-15")))
            .await
    }

    #[test]
    fn new_requires_api_key() {
        assert!(AnthropicCostCollector::new("", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn new_validates_key_format() {
        let err = AnthropicCostCollector::new("sk-ant-api03-xyz", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
        assert!(err.to_string().contains("should start with"));
    }

    #[test]
    fn with_endpoint_rejects_plain_http() {
        let result = AnthropicCostCollector::new(KEY, Duration::from_secs(1))
            .unwrap()
            .with_endpoint("http://api.example.com/cost_report");
        assert!(result.is_err());
    }

    #[test]
    fn service_label_fallback_chain() {
        let item = |description: Option<&str>, model: Option<&str>| CostItem {
            amount: None,
            description: description.map(str::to_string),
            model: model.map(str::to_string),
        };
        assert_eq!(
            service_label(&item(Some("Claude Opus tokens"), Some("claude-3"))),
            "Claude::Claude Opus tokens"
        );
        assert_eq!(service_label(&item(None, Some("claude-3"))), "Claude::claude-3");
        assert_eq!(service_label(&item(Some(""), Some("claude-3"))), "Claude::claude-3");
        assert_eq!(service_label(&item(None, None)), "Claude::API Usage");
    }

    #[test]
    fn deserialize_tolerates_missing_fields() {
        let report: CostReportResponse =
            serde_json::from_str(r#"{ "data": [ { "results": [ {} ] }, {} ] }"#).unwrap();
        assert!(report.has_more.is_none());
        assert!(report.next_page.is_none());
        let data = report.data.unwrap();
        assert!(data[0].starting_at.is_none());
        assert!(data[1].results.is_none());
    }

    #[tokio::test]
    async fn collects_snapshot_and_trend() {
        let server = MockServer::start().await;
        mount_snapshot(
            &server,
            page(
                vec![bucket(
                    "2025-01-14",
                    json!([
                        { "amount": "1234", "description": "Claude Opus tokens" },
                        { "amount": "66", "description": "Claude Opus tokens" },
                        { "amount": "250.5", "model": "claude-3" },
                        { "amount": "0.49", "description": "Rounding noise" },
                        { "amount": "0" },
                        { "amount": "100" }
                    ]),
                )],
                None,
            ),
        )
        .await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    bucket("2025-01-11", json!([{ "amount": "1000" }])),
                    bucket("2025-01-12", json!([{ "amount": "1000" }])),
                    bucket("2025-01-13", json!([{ "amount": "600" }, { "amount": "600" }])),
                    bucket("2025-01-14", json!([{ "amount": "1200" }])),
                ],
                None,
            )))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        assert_eq!(data.account_id, "anthropic");
        assert_eq!(data.currency, "USD");
        assert_eq!(data.start_date, date("2025-01-14"));
        assert_eq!(data.end_date, date("2025-01-15"));
        // 13.00 + 2.505 + 1.00
        assert_eq!(data.total_cost, 16.5);
        assert_eq!(data.cost_by_service.len(), 3);
        assert_eq!(data.cost_by_service["Claude::Claude Opus tokens"], 13.0);
        assert_eq!(data.cost_by_service["Claude::claude-3"], 2.505);
        assert_eq!(data.cost_by_service["Claude::API Usage"], 1.0);
        assert!(!data.cost_by_service.contains_key("Claude::Rounding noise"));

        let days: Vec<_> = data.daily_costs.iter().map(|d| (d.date, d.cost)).collect();
        assert_eq!(
            days,
            vec![
                (date("2025-01-11"), 10.0),
                (date("2025-01-12"), 10.0),
                (date("2025-01-13"), 12.0),
                (date("2025-01-14"), 12.0),
            ]
        );
        assert_eq!(data.trend, Trend::Increasing);
        assert_eq!(data.average_daily_cost, 11.0);
        assert!(data.forecast.is_none());
    }

    #[tokio::test]
    async fn sends_version_and_key_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(REPORT_PATH))
            .and(header("x-api-key", KEY))
            .and(header("anthropic-version", "2023-06-01"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
            .expect(2)
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert_eq!(data.total_cost, 0.0);
        assert_eq!(data.trend, Trend::Unknown);
    }

    #[tokio::test]
    async fn thousand_one_cent_items_total_ten_dollars() {
        let server = MockServer::start().await;
        let items: Vec<Value> = (0..1000).map(|_| json!({ "amount": "1" })).collect();
        mount_snapshot(&server, page(vec![bucket("2025-01-14", Value::Array(items))], None)).await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert_eq!(data.total_cost, 10.0);
        assert_eq!(data.cost_by_service["Claude::API Usage"], 10.0);
    }

    #[tokio::test]
    async fn null_has_more_ends_pagination() {
        let server = MockServer::start().await;
        let body = json!({
            "data": [bucket("2025-01-14", json!([{ "amount": "500" }]))],
            "has_more": null,
            "next_page": null,
        });
        mount_snapshot(&server, body.clone()).await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert_eq!(data.total_cost, 5.0);
        assert_eq!(data.cost_by_service["Claude::API Usage"], 5.0);
        assert_eq!(data.daily_costs.len(), 1);
        assert_eq!(data.daily_costs[0].cost, 5.0);
    }

    #[tokio::test]
    async fn credits_are_left_out_of_totals_but_net_daily() {
        let server = MockServer::start().await;
        mount_snapshot(
            &server,
            page(
                vec![bucket(
                    "2025-01-14",
                    json!([
                        { "amount": "1000", "description": "Claude Opus tokens" },
                        { "amount": "-400", "description": "Promotional credit" }
                    ]),
                )],
                None,
            ),
        )
        .await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    bucket("2025-01-13", json!([{ "amount": "1000" }, { "amount": "-400" }])),
                    bucket("2025-01-14", json!([{ "amount": "-500" }])),
                ],
                None,
            )))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        assert_eq!(data.total_cost, 10.0);
        assert_eq!(data.cost_by_service.len(), 1);
        assert!(!data.cost_by_service.contains_key("Claude::Promotional credit"));
        let days: Vec<_> = data.daily_costs.iter().map(|d| (d.date, d.cost)).collect();
        assert_eq!(days, vec![(date("2025-01-13"), 6.0), (date("2025-01-14"), 0.0)]);
        assert_eq!(data.average_daily_cost, 3.0);
    }

    #[tokio::test]
    async fn overflowing_day_degrades() {
        let server = MockServer::start().await;
        mount_snapshot(&server, page(vec![], None)).await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![bucket(
                    "2025-01-14",
                    json!([
                        { "amount": "79228162514264337593543950335" },
                        { "amount": "79228162514264337593543950335" }
                    ]),
                )],
                None,
            )))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert!(data.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
        assert_eq!(data.average_daily_cost, 0.0);
    }

    #[tokio::test]
    async fn follows_pagination_and_merges_days() {
        let server = MockServer::start().await;
        mount_snapshot(&server, page(vec![], None)).await;

        daily_request()
            .and(MissingQueryParam("page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    bucket("2025-01-01", json!([{ "amount": "500" }])),
                    bucket("2025-01-02", json!([{ "amount": "300" }])),
                ],
                Some("cursor-2"),
            )))
            .expect(1)
            .mount(&server)
            .await;
        daily_request()
            .and(query_param("page", "cursor-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![bucket("2025-01-02", json!([{ "amount": "200" }]))],
                Some("cursor-3"),
            )))
            .expect(1)
            .mount(&server)
            .await;
        daily_request()
            .and(query_param("page", "cursor-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![
                    bucket("2025-01-03", json!([{ "amount": "700" }])),
                    json!({ "results": [{ "amount": "99999" }] }),
                ],
                None,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        let days: Vec<_> = data.daily_costs.iter().map(|d| (d.date, d.cost)).collect();
        assert_eq!(
            days,
            vec![
                (date("2025-01-01"), 5.0),
                (date("2025-01-02"), 5.0),
                (date("2025-01-03"), 7.0),
            ]
        );
        assert_eq!(data.trend, Trend::Increasing);
        assert_eq!(data.average_daily_cost, 5.67);
    }

    #[tokio::test]
    async fn server_error_mid_pagination_degrades() {
        let server = MockServer::start().await;
        mount_snapshot(
            &server,
            page(vec![bucket("2025-01-14", json!([{ "amount": "5000" }]))], None),
        )
        .await;
        daily_request()
            .and(MissingQueryParam("page"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page(
                vec![bucket("2025-01-01", json!([{ "amount": "500" }]))],
                Some("cursor-2"),
            )))
            .mount(&server)
            .await;
        daily_request()
            .and(query_param("page", "cursor-2"))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        assert_eq!(data.total_cost, 0.0);
        assert!(data.cost_by_service.is_empty());
        assert!(data.daily_costs.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
        assert_eq!(data.average_daily_cost, 0.0);
        assert_eq!(data.start_date, date("2025-01-14"));
    }

    #[tokio::test]
    async fn rate_limit_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "type": "error",
                "error": { "type": "rate_limit_error", "message": "slow down" }
            })))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert!(data.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
    }

    #[tokio::test]
    async fn malformed_amount_degrades() {
        let server = MockServer::start().await;
        mount_snapshot(
            &server,
            page(vec![bucket("2025-01-14", json!([{ "amount": "lots" }]))], None),
        )
        .await;

        let data = collect(&collector(&server)).await;
        assert!(data.is_empty());
    }

    #[tokio::test]
    async fn connection_failure_degrades() {
        let collector = AnthropicCostCollector::new(KEY, Duration::from_secs(2))
            .unwrap()
            .with_endpoint("http://127.0.0.1:1/v1/organizations/cost_report")
            .unwrap();

        let data = collect(&collector).await;
        assert_eq!(data.total_cost, 0.0);
        assert!(data.cost_by_service.is_empty());
        assert!(data.daily_costs.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
    }

    #[tokio::test]
    async fn request_timeout_degrades() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(page(vec![], None))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let collector = AnthropicCostCollector::new(KEY, Duration::from_millis(200))
            .unwrap()
            .with_endpoint(&format!("{}{}", server.uri(), REPORT_PATH))
            .unwrap();

        let data = collect(&collector).await;
        assert!(data.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
    }
}
