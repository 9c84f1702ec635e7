//! AWS Budgets collector.
//!
//! Reports the current period spend of every cost budget in an account. The
//! numbers restate account spend already visible through Cost Explorer, so
//! this collector never counts toward cross-provider totals.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::core::aws::{AwsJsonClient, Credentials};
use crate::core::collectors::paging::{fetch_all_pages, Page};
use crate::core::collectors::{
    first_of_next_month, CollectionPeriod, Collector, CollectorError, CollectorKind,
};
use crate::core::cost::aggregate::ServiceTotals;
use crate::core::cost::money::{add_amounts, parse_amount, round_total};
use crate::core::models::cost::{CostData, CostForecast, Trend, USD};

pub const BUDGETS_URL: &str = "https://budgets.amazonaws.com";
const SIGNING_REGION: &str = "us-east-1";
const SERVICE: &str = "budgets";
const DESCRIBE_BUDGETS: &str = "AWSBudgetServiceGateway.DescribeBudgets";

const MAX_RESULTS: u32 = 100;
const COST_BUDGET: &str = "COST";
const SERVICE_PREFIX: &str = "Budget::";

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeBudgetsRequest<'a> {
    account_id: &'a str,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeBudgetsResponse {
    #[serde(default)]
    budgets: Vec<Budget>,
    next_token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Budget {
    budget_name: Option<String>,
    budget_type: Option<String>,
    calculated_spend: Option<CalculatedSpend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CalculatedSpend {
    actual_spend: Option<Spend>,
    forecasted_spend: Option<Spend>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Spend {
    amount: Option<Value>,
}

impl Budget {
    fn is_cost_budget(&self) -> bool {
        self.budget_type.as_deref().map_or(true, |t| t == COST_BUDGET)
    }

    fn label(&self) -> String {
        format!(
            "{SERVICE_PREFIX}{}",
            self.budget_name.as_deref().unwrap_or("unnamed")
        )
    }

    fn spend(&self, pick: fn(&CalculatedSpend) -> Option<&Spend>) -> Option<&Value> {
        self.calculated_spend
            .as_ref()
            .and_then(pick)
            .and_then(|s| s.amount.as_ref())
    }
}

/// Collector for AWS Budgets spend in one account.
#[derive(Debug)]
pub struct BudgetsCollector {
    aws: AwsJsonClient,
    account_id: String,
}

impl BudgetsCollector {
    /// # Errors
    ///
    /// Returns `CollectorError::Config` when `account_id` is blank.
    pub fn new(
        credentials: Credentials,
        account_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CollectorError> {
        let account_id = account_id.into();
        if account_id.trim().is_empty() {
            return Err(CollectorError::Config(
                "AWS Budgets requires an account_id".to_string(),
            ));
        }
        Ok(Self {
            aws: AwsJsonClient::new(credentials, BUDGETS_URL, SIGNING_REGION, SERVICE, timeout)?,
            account_id,
        })
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Result<Self, CollectorError> {
        self.aws = self.aws.with_endpoint(endpoint)?;
        Ok(self)
    }

    async fn fetch_budgets(&self) -> Result<Vec<Budget>, CollectorError> {
        let account_id = self.account_id.as_str();
        let pages = fetch_all_pages(move |cursor| async move {
            let request = DescribeBudgetsRequest {
                account_id,
                max_results: MAX_RESULTS,
                next_token: cursor,
            };
            let response: DescribeBudgetsResponse =
                self.aws.call(DESCRIBE_BUDGETS, &request).await?;
            let has_more = response.next_token.is_some();
            Ok(Page::new(response.budgets, has_more, response.next_token))
        })
        .await?;
        Ok(pages.into_iter().flatten().collect())
    }

    async fn try_collect(
        &self,
        period: CollectionPeriod,
        today: NaiveDate,
    ) -> Result<CostData, CollectorError> {
        let mut totals = ServiceTotals::new();
        let mut forecasted = Decimal::ZERO;
        let mut has_forecast = false;

        for budget in self.fetch_budgets().await? {
            if !budget.is_cost_budget() {
                debug!(budget = %budget.label(), "Skipping non-cost budget");
                continue;
            }
            let actual = parse_amount(budget.spend(|s| s.actual_spend.as_ref()))?;
            totals.add(budget.label(), actual)?;

            if let Some(amount) = budget.spend(|s| s.forecasted_spend.as_ref()) {
                forecasted = add_amounts(forecasted, parse_amount(Some(amount))?)?;
                has_forecast = true;
            }
        }

        let forecast = has_forecast.then(|| CostForecast {
            total_cost: round_total(forecasted),
            start_date: today,
            end_date: first_of_next_month(today),
        });

        Ok(CostData {
            start_date: period.start,
            end_date: period.end,
            collection_timestamp: Utc::now(),
            account_id: self.account_id.clone(),
            total_cost: totals.total_rounded(),
            currency: USD.to_string(),
            cost_by_service: totals.into_cost_by_service(),
            daily_costs: Vec::new(),
            forecast,
            trend: Trend::Unknown,
            average_daily_cost: 0.0,
        })
    }
}

#[async_trait]
impl Collector for BudgetsCollector {
    fn collector_name(&self) -> &'static str {
        CollectorKind::AwsBudgets.id()
    }

    async fn collect(&self, start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> CostData {
        let collection_timestamp = Utc::now();
        let today = collection_timestamp.date_naive();
        let period = CollectionPeriod::resolve(start_date, end_date, today);
        info!(
            collector = self.collector_name(),
            account = %self.account_id,
            endpoint = self.aws.endpoint(),
            "Collecting AWS budgets"
        );

        match self.try_collect(period, today).await {
            Ok(data) => data,
            Err(e) => {
                error!(collector = self.collector_name(), error = %e, "Failed to collect AWS budgets");
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
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCOUNT: &str = "123456789012";

    fn collector(server: &MockServer) -> BudgetsCollector {
        BudgetsCollector::new(
            Credentials::new("AKIDEXAMPLE", "secret"),
            ACCOUNT,
            Duration::from_secs(5),
        )
        .unwrap()
        .with_endpoint(&server.uri())
        .unwrap()
    }

    fn budget(name: &str, kind: &str, actual: &str, forecast: Option<&str>) -> Value {
        let mut spend = json!({ "ActualSpend": { "Amount": actual, "Unit": "USD" } });
        if let Some(forecast) = forecast {
            spend["ForecastedSpend"] = json!({ "Amount": forecast, "Unit": "USD" });
        }
        json!({
            "BudgetName": name,
            "BudgetType": kind,
            "BudgetLimit": { "Amount": "1000", "Unit": "USD" },
            "CalculatedSpend": spend
        })
    }

    fn describe() -> wiremock::MockBuilder {
        Mock::given(method("POST"))
            .and(header("x-amz-target", DESCRIBE_BUDGETS))
            .and(body_partial_json(json!({ "AccountId": ACCOUNT, "MaxResults": 100 })))
    }

    #[test]
    fn blank_account_is_rejected() {
        let err = BudgetsCollector::new(
            Credentials::new("a", "b"),
            "  ",
            Duration::from_secs(1),
        )
        .unwrap_err();
        assert!(matches!(err, CollectorError::Config(_)));
    }

    #[tokio::test]
    async fn sums_cost_budgets_across_pages() {
        let server = MockServer::start().await;
        describe()
            .and(body_partial_json(json!({ "NextToken": "page-2" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Budgets": [budget("team-b", "COST", "20.005", None)]
            })))
            .expect(1)
            .with_priority(1)
            .mount(&server)
            .await;
        describe()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Budgets": [
                    budget("team-a", "COST", "100.50", Some("310.25")),
                    budget("hours", "USAGE", "999", Some("999"))
                ],
                "NextToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let data = collector(&server).collect(None, None).await;

        assert_eq!(data.account_id, ACCOUNT);
        assert_eq!(data.cost_by_service.len(), 2);
        assert_eq!(data.cost_by_service["Budget::team-a"], 100.5);
        assert_eq!(data.cost_by_service["Budget::team-b"], 20.005);
        // 120.505 rounds half to even
        assert_eq!(data.total_cost, 120.5);
        assert!(data.daily_costs.is_empty());
        assert_eq!(data.trend, Trend::Unknown);
        assert_eq!(data.average_daily_cost, 0.0);

        let forecast = data.forecast.unwrap();
        assert_eq!(forecast.total_cost, 310.25);
        assert!(forecast.end_date > forecast.start_date);
    }

    #[tokio::test]
    async fn no_forecast_when_budgets_report_none() {
        let server = MockServer::start().await;
        describe()
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Budgets": [budget("team-a", "COST", "5", None)]
            })))
            .mount(&server)
            .await;

        let data = collector(&server).collect(None, None).await;
        assert_eq!(data.total_cost, 5.0);
        assert!(data.forecast.is_none());
    }

    #[tokio::test]
    async fn access_denied_degrades() {
        let server = MockServer::start().await;
        describe()
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "AccessDeniedException",
                "Message": "not authorized to perform budgets:ViewBudget"
            })))
            .mount(&server)
            .await;

        let data = collector(&server).collect(None, None).await;
        assert!(data.is_empty());
        assert_eq!(data.account_id, ACCOUNT);
    }
}
