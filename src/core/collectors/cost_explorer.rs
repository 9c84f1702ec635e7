//! AWS Cost Explorer collector.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::core::aws::{AwsJsonClient, Credentials};
use crate::core::collectors::paging::{fetch_all_pages, Page};
use crate::core::collectors::{
    first_of_next_month, CollectionPeriod, Collector, CollectorError, CollectorKind,
    DEFAULT_LOOKBACK_DAYS,
};
use crate::core::cost::aggregate::{average_daily_cost, bucket_date, DailyTotals, ServiceTotals};
use crate::core::cost::money::{add_amounts, parse_amount, round_total};
use crate::core::cost::trend::calculate_trend;
use crate::core::models::cost::{CostData, CostForecast, DailyCost, USD};

pub const COST_EXPLORER_URL: &str = "https://ce.us-east-1.amazonaws.com";
/// Cost Explorer is a global service signed in us-east-1.
const SIGNING_REGION: &str = "us-east-1";
const SERVICE: &str = "ce";

const GET_COST_AND_USAGE: &str = "AWSInsightsIndexService.GetCostAndUsage";
const GET_COST_FORECAST: &str = "AWSInsightsIndexService.GetCostForecast";

const METRIC: &str = "UnblendedCost";
const FORECAST_METRIC: &str = "UNBLENDED_COST";
const UNKNOWN_SERVICE: &str = "Unknown";
const DEFAULT_ACCOUNT: &str = "aws";

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "PascalCase")]
struct DateInterval {
    start: String,
    end: String,
}

impl DateInterval {
    fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self {
            start: start.format("%Y-%m-%d").to_string(),
            end: end.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GroupDefinition {
    #[serde(rename = "Type")]
    kind: &'static str,
    key: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageRequest {
    time_period: DateInterval,
    granularity: &'static str,
    metrics: [&'static str; 1],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    group_by: Vec<GroupDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostAndUsageResponse {
    #[serde(default)]
    results_by_time: Vec<ResultByTime>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResultByTime {
    time_period: Option<DateInterval>,
    #[serde(default)]
    total: BTreeMap<String, MetricValue>,
    #[serde(default)]
    groups: Vec<Group>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Group {
    #[serde(default)]
    keys: Vec<String>,
    #[serde(default)]
    metrics: BTreeMap<String, MetricValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MetricValue {
    amount: Option<Value>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostForecastRequest {
    time_period: DateInterval,
    metric: &'static str,
    granularity: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetCostForecastResponse {
    total: Option<MetricValue>,
}

fn metric_amount(metrics: &BTreeMap<String, MetricValue>) -> Result<Decimal, CollectorError> {
    parse_amount(metrics.get(METRIC).and_then(|m| m.amount.as_ref()))
}

/// Dollars for one day: the ungrouped total when present, otherwise the sum
/// of the groups.
fn day_amount(result: &ResultByTime) -> Result<Decimal, CollectorError> {
    if result.total.contains_key(METRIC) {
        return metric_amount(&result.total);
    }
    let mut sum = Decimal::ZERO;
    for group in &result.groups {
        sum = add_amounts(sum, metric_amount(&group.metrics)?)?;
    }
    Ok(sum)
}

/// Collector for account spend reported by AWS Cost Explorer.
#[derive(Debug)]
pub struct CostExplorerCollector {
    aws: AwsJsonClient,
    account_id: String,
    lookback_days: u32,
}

impl CostExplorerCollector {
    pub fn new(credentials: Credentials, timeout: Duration) -> Result<Self, CollectorError> {
        Ok(Self {
            aws: AwsJsonClient::new(
                credentials,
                COST_EXPLORER_URL,
                SIGNING_REGION,
                SERVICE,
                timeout,
            )?,
            account_id: DEFAULT_ACCOUNT.to_string(),
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, CollectorError> {
        self.aws = self.aws.with_endpoint(endpoint)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    #[must_use]
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    async fn fetch_results(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        by_service: bool,
    ) -> Result<Vec<ResultByTime>, CollectorError> {
        let pages = fetch_all_pages(move |cursor| async move {
            let request = GetCostAndUsageRequest {
                time_period: DateInterval::new(start, end),
                granularity: "DAILY",
                metrics: [METRIC],
                group_by: if by_service {
                    vec![GroupDefinition {
                        kind: "DIMENSION",
                        key: "SERVICE",
                    }]
                } else {
                    Vec::new()
                },
                next_page_token: cursor,
            };
            let response: GetCostAndUsageResponse =
                self.aws.call(GET_COST_AND_USAGE, &request).await?;
            let has_more = response.next_page_token.is_some();
            Ok(Page::new(
                response.results_by_time,
                has_more,
                response.next_page_token,
            ))
        })
        .await?;
        Ok(pages.into_iter().flatten().collect())
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_service_totals(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<ServiceTotals, CollectorError> {
        let mut totals = ServiceTotals::new();
        for result in self.fetch_results(start, end, true).await? {
            for group in &result.groups {
                let label = group
                    .keys
                    .first()
                    .map(String::as_str)
                    .filter(|k| !k.is_empty())
                    .unwrap_or(UNKNOWN_SERVICE);
                totals.add(label, metric_amount(&group.metrics)?)?;
            }
        }
        Ok(totals)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fetch_daily_costs(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DailyCost>, CollectorError> {
        let mut daily = DailyTotals::new();
        for result in self.fetch_results(start, end, false).await? {
            let Some(date) = result
                .time_period
                .as_ref()
                .and_then(|p| bucket_date(&p.start))
            else {
                debug!("Skipping Cost Explorer result without a time period");
                continue;
            };
            daily.add(date, day_amount(&result)?)?;
        }
        Ok(daily.into_daily_costs())
    }

    async fn fetch_forecast(&self, today: NaiveDate) -> Result<Option<CostForecast>, CollectorError> {
        let end = first_of_next_month(today);
        let request = GetCostForecastRequest {
            time_period: DateInterval::new(today, end),
            metric: FORECAST_METRIC,
            granularity: "MONTHLY",
        };
        let response: GetCostForecastResponse = self.aws.call(GET_COST_FORECAST, &request).await?;
        let Some(total) = response.total else {
            return Ok(None);
        };
        let amount = parse_amount(total.amount.as_ref())?;
        Ok(Some(CostForecast {
            total_cost: round_total(amount),
            start_date: today,
            end_date: end,
        }))
    }

    async fn try_collect(
        &self,
        period: CollectionPeriod,
        today: NaiveDate,
    ) -> Result<CostData, CollectorError> {
        let (snapshot_start, snapshot_end) = period.snapshot_window();
        let totals = self.fetch_service_totals(snapshot_start, snapshot_end).await?;

        let (lookback_start, lookback_end) = period.lookback_window(self.lookback_days);
        let daily_costs = self.fetch_daily_costs(lookback_start, lookback_end).await?;

        let forecast = match self.fetch_forecast(today).await {
            Ok(forecast) => forecast,
            Err(e) => {
                warn!(collector = self.collector_name(), error = %e, "Cost forecast unavailable");
                None
            }
        };

        Ok(CostData {
            start_date: period.start,
            end_date: period.end,
            collection_timestamp: Utc::now(),
            account_id: self.account_id.clone(),
            total_cost: totals.total_rounded(),
            currency: USD.to_string(),
            trend: calculate_trend(&daily_costs),
            average_daily_cost: average_daily_cost(&daily_costs),
            cost_by_service: totals.into_cost_by_service(),
            daily_costs,
            forecast,
        })
    }
}

#[async_trait]
impl Collector for CostExplorerCollector {
    fn collector_name(&self) -> &'static str {
        CollectorKind::AwsCostExplorer.id()
    }

    async fn collect(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> CostData {
        let collection_timestamp = Utc::now();
        let today = collection_timestamp.date_naive();
        let period = CollectionPeriod::resolve(start_date, end_date, today);
        info!(
            collector = self.collector_name(),
            account = %self.account_id,
            endpoint = self.aws.endpoint(),
            start = %period.start,
            end = %period.end,
            "Collecting AWS Cost Explorer costs"
        );

        match self.try_collect(period, today).await {
            Ok(data) => data,
            Err(e) => {
                error!(collector = self.collector_name(), error = %e, "Failed to collect AWS costs");
                CostData::degraded(
                    self.account_id.clone(),
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
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn collector(server: &MockServer) -> CostExplorerCollector {
        CostExplorerCollector::new(Credentials::new("AKIDEXAMPLE", "secret"), Duration::from_secs(5))
            .unwrap()
            .with_endpoint(&server.uri())
            .unwrap()
            .with_account_id("123456789012")
    }

    fn usage_request() -> wiremock::MockBuilder {
        Mock::given(method("POST")).and(header("x-amz-target", GET_COST_AND_USAGE))
    }

    fn snapshot_request() -> wiremock::MockBuilder {
        usage_request().and(body_partial_json(json!({
            "TimePeriod": { "Start": "2025-01-14", "End": "2025-01-15" },
            "GroupBy": [{ "Type": "DIMENSION", "Key": "SERVICE" }]
        })))
    }

    fn daily_request() -> wiremock::MockBuilder {
        usage_request().and(body_partial_json(json!({
            "TimePeriod": { "Start": "2025-01-01", "End": "2025-01-15" },
            "Granularity": "DAILY",
            "Metrics": ["UnblendedCost"]
        })))
    }

    fn forecast_request() -> wiremock::MockBuilder {
        Mock::given(method("POST")).and(header("x-amz-target", GET_COST_FORECAST))
    }

    fn group(service: &str, amount: &str) -> Value {
        json!({ "Keys": [service], "Metrics": { "UnblendedCost": { "Amount": amount, "Unit": "USD" } } })
    }

    fn day_total(day: &str, amount: &str) -> Value {
        json!({
            "TimePeriod": { "Start": day, "End": day },
            "Total": { "UnblendedCost": { "Amount": amount, "Unit": "USD" } },
            "Groups": []
        })
    }

    async fn collect(collector: &CostExplorerCollector) -> CostData {
        collector
            .collect(Some(date("2025-01-14")), Some(date("2025-01-15")))
            .await
    }

    #[test]
    fn request_body_uses_aws_field_names() {
        let request = GetCostAndUsageRequest {
            time_period: DateInterval::new(date("2025-01-01"), date("2025-01-15")),
            granularity: "DAILY",
            metrics: [METRIC],
            group_by: vec![GroupDefinition {
                kind: "DIMENSION",
                key: "SERVICE",
            }],
            next_page_token: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(
            body,
            json!({
                "TimePeriod": { "Start": "2025-01-01", "End": "2025-01-15" },
                "Granularity": "DAILY",
                "Metrics": ["UnblendedCost"],
                "GroupBy": [{ "Type": "DIMENSION", "Key": "SERVICE" }]
            })
        );
    }

    #[test]
    fn day_amount_falls_back_to_groups() {
        let result: ResultByTime = serde_json::from_value(json!({
            "TimePeriod": { "Start": "2025-01-02", "End": "2025-01-03" },
            "Total": {},
            "Groups": [group("Amazon S3", "1.25"), group("AWS Lambda", "0.75")]
        }))
        .unwrap();
        assert_eq!(day_amount(&result).unwrap(), Decimal::from(2));
    }

    #[tokio::test]
    async fn collects_services_trend_and_forecast() {
        let server = MockServer::start().await;
        snapshot_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [{
                    "TimePeriod": { "Start": "2025-01-14", "End": "2025-01-15" },
                    "Total": {},
                    "Groups": [
                        group("Amazon Elastic Compute Cloud - Compute", "12.3456"),
                        group("Amazon Simple Storage Service", "0.004"),
                        group("AWS Lambda", "1.5")
                    ]
                }]
            })))
            .mount(&server)
            .await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [
                    day_total("2025-01-12", "10"),
                    day_total("2025-01-13", "10"),
                    day_total("2025-01-14", "6")
                ]
            })))
            .mount(&server)
            .await;
        forecast_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Total": { "Amount": "321.987", "Unit": "USD" }
            })))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        assert_eq!(data.account_id, "123456789012");
        assert_eq!(data.total_cost, 13.85);
        assert_eq!(data.cost_by_service.len(), 2);
        assert_eq!(
            data.cost_by_service["Amazon Elastic Compute Cloud - Compute"],
            12.3456
        );
        assert!(!data.cost_by_service.contains_key("Amazon Simple Storage Service"));
        assert_eq!(data.daily_costs.len(), 3);
        assert_eq!(data.trend, Trend::Decreasing);
        assert_eq!(data.average_daily_cost, 8.67);

        let forecast = data.forecast.unwrap();
        assert_eq!(forecast.total_cost, 321.99);
        assert!(forecast.end_date > forecast.start_date);
    }

    #[tokio::test]
    async fn follows_next_page_token() {
        let server = MockServer::start().await;
        snapshot_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ResultsByTime": [] })))
            .mount(&server)
            .await;
        daily_request()
            .and(body_partial_json(json!({ "NextPageToken": "token-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [day_total("2025-01-02", "4"), day_total("2025-01-03", "6")]
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [day_total("2025-01-01", "5"), day_total("2025-01-02", "1")],
                "NextPageToken": "token-2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        forecast_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;

        let days: Vec<_> = data.daily_costs.iter().map(|d| (d.date, d.cost)).collect();
        assert_eq!(
            days,
            vec![
                (date("2025-01-01"), 5.0),
                (date("2025-01-02"), 5.0),
                (date("2025-01-03"), 6.0),
            ]
        );
        assert!(data.forecast.is_none());
    }

    #[tokio::test]
    async fn forecast_failure_keeps_the_rest() {
        let server = MockServer::start().await;
        snapshot_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ResultsByTime": [{ "Groups": [group("AWS Lambda", "3")] }]
            })))
            .mount(&server)
            .await;
        daily_request()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ResultsByTime": [] })))
            .mount(&server)
            .await;
        forecast_request()
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "DataUnavailableException",
                "Message": "Insufficient amount of historical data"
            })))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert_eq!(data.total_cost, 3.0);
        assert!(data.forecast.is_none());
        assert_eq!(data.trend, Trend::Unknown);
    }

    #[tokio::test]
    async fn throttling_degrades() {
        let server = MockServer::start().await;
        usage_request()
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "ThrottlingException",
                "Message": "Rate exceeded"
            })))
            .mount(&server)
            .await;

        let data = collect(&collector(&server)).await;
        assert!(data.is_empty());
        assert_eq!(data.account_id, "123456789012");
        assert_eq!(data.trend, Trend::Unknown);
    }
}
