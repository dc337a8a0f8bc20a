//! Tool catalog and dispatcher
//!
//! A closed set of data operations the planner can select by name. Every
//! tool runs against the cached snapshot when one exists, otherwise against
//! a fresh load. A failing tool is recorded as an error result without
//! aborting its siblings; an unregistered name is a contract violation and
//! does propagate.

use crate::error::AgentError;
use crate::models::{DataSnapshot, Plan, ToolResult};
use crate::snapshot::SnapshotLoader;
use crate::store::RecordStore;
use crate::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

const SPENDING_WINDOW_DAYS: i64 = 90;
const DEFAULT_ACTIVITY_DAYS: i64 = 7;
const DEFAULT_TERM_MONTHS: u32 = 36;

/// Closed catalog of operations. An exhaustive match keeps coverage checked
/// at compile time; `parse` is the only runtime name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    AccountOverview,
    RecentActivity,
    SpendingAnalysis,
    LoanAffordability,
    FetchEverything,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::AccountOverview,
        ToolKind::RecentActivity,
        ToolKind::SpendingAnalysis,
        ToolKind::LoanAffordability,
        ToolKind::FetchEverything,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::AccountOverview => "account_overview",
            ToolKind::RecentActivity => "recent_activity",
            ToolKind::SpendingAnalysis => "spending_analysis",
            ToolKind::LoanAffordability => "loan_affordability",
            ToolKind::FetchEverything => "fetch_everything",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::AccountOverview => "Account balances and totals across the user's accounts",
            ToolKind::RecentActivity => "Recent transactions with spend and income totals over a day window",
            ToolKind::SpendingAnalysis => "Spending forecast, savings opportunities and top category from 90 days of history",
            ToolKind::LoanAffordability => "Loan affordability analysis for a requested amount and term",
            ToolKind::FetchEverything => "Full snapshot of every financial record for the user",
        }
    }

    pub fn arg_guidance(&self) -> &'static str {
        match self {
            ToolKind::AccountOverview => "{}",
            ToolKind::RecentActivity => r#"{ "days": 7 }"#,
            ToolKind::SpendingAnalysis => "{}",
            ToolKind::LoanAffordability => {
                r#"{ "amount": 25000, "term_months": 36, "credit_score": 720 }"#
            }
            ToolKind::FetchEverything => "{}",
        }
    }

    /// Unknown names signal a contract violation, not a recoverable input.
    pub fn parse(name: &str) -> Result<ToolKind> {
        ToolKind::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }
}

pub struct Toolbox {
    loader: SnapshotLoader,
}

impl Toolbox {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self {
            loader: SnapshotLoader::new(store),
        }
    }

    /// Execute a single tool. Uses the cached snapshot when present,
    /// otherwise loads fresh data for this call.
    pub async fn invoke(
        &self,
        kind: ToolKind,
        user_id: &str,
        args: &Value,
        snapshot: Option<&DataSnapshot>,
    ) -> Result<Value> {
        debug!(tool = kind.name(), cached = snapshot.is_some(), "Invoking tool");

        if kind == ToolKind::FetchEverything {
            let fresh = self.loader.load(user_id, false).await.unwrap_or_default();
            return Ok(serde_json::to_value(&fresh)?);
        }

        let owned;
        let data = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                owned = self.loader.load(user_id, false).await.unwrap_or_default();
                &owned
            }
        };

        match kind {
            ToolKind::AccountOverview => Ok(account_overview(data)),
            ToolKind::RecentActivity => {
                let days = args
                    .get("days")
                    .and_then(Value::as_i64)
                    .unwrap_or(DEFAULT_ACTIVITY_DAYS);
                Ok(recent_activity(data, days))
            }
            ToolKind::SpendingAnalysis => Ok(spending_analysis(data)),
            ToolKind::LoanAffordability => loan_affordability(data, args),
            ToolKind::FetchEverything => unreachable!("handled above"),
        }
    }

    /// Run every call in a plan. One failing tool becomes an error-shaped
    /// result; the rest still execute. Only an unregistered name aborts.
    pub async fn execute_plan(
        &self,
        plan: &Plan,
        user_id: &str,
        snapshot: Option<&DataSnapshot>,
    ) -> Result<HashMap<String, ToolResult>> {
        let mut results = HashMap::with_capacity(plan.tool_calls.len());

        for call in &plan.tool_calls {
            let kind = ToolKind::parse(&call.name)?;

            match self.invoke(kind, user_id, &call.args, snapshot).await {
                Ok(payload) => {
                    results.insert(call.name.clone(), ToolResult::ok(&call.name, payload));
                }
                Err(e) => {
                    warn!(tool = %call.name, error = %e, "Tool execution failed, recording error result");
                    results.insert(call.name.clone(), ToolResult::failed(&call.name, e.to_string()));
                }
            }
        }

        Ok(results)
    }
}

//
// ================= Analytics =================
//
// Deterministic derivations over the snapshot; no model involvement.

fn account_overview(snapshot: &DataSnapshot) -> Value {
    let accounts: Vec<Value> = snapshot
        .accounts
        .iter()
        .map(|a| {
            json!({
                "name": a.name,
                "type": a.account_type,
                "balance": a.balance,
                "currency": a.currency,
            })
        })
        .collect();

    let card_balance: f64 = snapshot.cards.iter().map(|c| c.balance).sum();
    let loan_balance: f64 = snapshot.loans.iter().map(|l| l.balance).sum();

    json!({
        "accounts": accounts,
        "account_count": snapshot.accounts.len(),
        "total_balance": snapshot.total_balance(),
        "total_card_balance": card_balance,
        "total_loan_balance": loan_balance,
    })
}

fn recent_activity(snapshot: &DataSnapshot, days: i64) -> Value {
    let cutoff = Utc::now() - ChronoDuration::days(days.max(1));

    let recent: Vec<&crate::models::Transaction> = snapshot
        .transactions
        .iter()
        .filter(|t| t.occurred_at.map(|at| at >= cutoff).unwrap_or(false))
        .collect();

    let spend: f64 = recent.iter().filter(|t| t.amount < 0.0).map(|t| -t.amount).sum();
    let income: f64 = recent.iter().filter(|t| t.amount > 0.0).map(|t| t.amount).sum();

    let transactions: Vec<Value> = recent
        .iter()
        .map(|t| {
            json!({
                "description": t.description,
                "amount": t.amount,
                "category": t.category,
                "occurred_at": t.occurred_at,
            })
        })
        .collect();

    json!({
        "window_days": days,
        "transaction_count": transactions.len(),
        "transactions": transactions,
        "total_spend": spend,
        "total_income": income,
    })
}

fn spending_analysis(snapshot: &DataSnapshot) -> Value {
    let cutoff = Utc::now() - ChronoDuration::days(SPENDING_WINDOW_DAYS);

    let mut by_category: HashMap<&str, f64> = HashMap::new();
    let mut total_spend = 0.0;

    for t in &snapshot.transactions {
        if t.amount >= 0.0 {
            continue;
        }
        if !t.occurred_at.map(|at| at >= cutoff).unwrap_or(false) {
            continue;
        }
        let category = if t.category.is_empty() {
            "uncategorized"
        } else {
            t.category.as_str()
        };
        *by_category.entry(category).or_insert(0.0) += -t.amount;
        total_spend += -t.amount;
    }

    let top_category = by_category
        .iter()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(name, total)| json!({ "category": name, "total": total }));

    // A category taking more than 15% of the window's spend is a candidate
    // for a 10% trim.
    let mut opportunities: Vec<Value> = by_category
        .iter()
        .filter(|(_, total)| total_spend > 0.0 && **total > total_spend * 0.15)
        .map(|(name, total)| {
            json!({
                "category": name,
                "current": total,
                "suggested_monthly_saving": (total * 0.10) / 3.0,
            })
        })
        .collect();
    opportunities.sort_by(|a, b| {
        let av = a["current"].as_f64().unwrap_or(0.0);
        let bv = b["current"].as_f64().unwrap_or(0.0);
        bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal)
    });

    let monthly_forecast = total_spend / (SPENDING_WINDOW_DAYS as f64) * 30.0;

    json!({
        "window_days": SPENDING_WINDOW_DAYS,
        "total_spend": total_spend,
        "monthly_forecast": monthly_forecast,
        "top_category": top_category,
        "savings_opportunities": opportunities,
        "by_category": by_category,
    })
}

/// Standard fixed-payment formula; rate is annual percent.
pub fn monthly_payment(principal: f64, annual_rate_pct: f64, term_months: u32) -> f64 {
    if term_months == 0 {
        return principal;
    }
    let monthly_rate = annual_rate_pct / 100.0 / 12.0;
    if monthly_rate == 0.0 {
        return principal / term_months as f64;
    }
    principal * monthly_rate / (1.0 - (1.0 + monthly_rate).powi(-(term_months as i32)))
}

fn assumed_rate(credit_score: Option<i64>) -> f64 {
    match credit_score {
        Some(score) if score >= 740 => 6.49,
        Some(score) if score >= 670 => 8.99,
        Some(score) if score >= 580 => 12.49,
        Some(_) => 17.99,
        None => 9.99,
    }
}

fn loan_affordability(snapshot: &DataSnapshot, args: &Value) -> Result<Value> {
    let amount = args
        .get("amount")
        .and_then(Value::as_f64)
        .ok_or_else(|| AgentError::InvalidToolInput("loan_affordability requires an amount".to_string()))?;
    let term_months = args
        .get("term_months")
        .and_then(Value::as_u64)
        .map(|t| t as u32)
        .unwrap_or(DEFAULT_TERM_MONTHS);
    let credit_score = args.get("credit_score").and_then(Value::as_i64);

    let rate = assumed_rate(credit_score);
    let payment = monthly_payment(amount, rate, term_months);
    let total_interest = payment * term_months as f64 - amount;

    // Monthly income estimated from 90 days of inbound transactions.
    let cutoff = Utc::now() - ChronoDuration::days(SPENDING_WINDOW_DAYS);
    let inbound: f64 = snapshot
        .transactions
        .iter()
        .filter(|t| t.amount > 0.0 && t.occurred_at.map(|at| at >= cutoff).unwrap_or(false))
        .map(|t| t.amount)
        .sum();
    let monthly_income = inbound / 3.0;

    let existing_obligations: f64 = snapshot.loans.iter().map(|l| l.monthly_payment).sum::<f64>()
        + snapshot.cards.iter().map(|c| c.balance * 0.02).sum::<f64>();

    let dti = if monthly_income > 0.0 {
        (existing_obligations + payment) / monthly_income
    } else {
        f64::INFINITY
    };

    let mut strengths = Vec::new();
    let mut concerns = Vec::new();

    if monthly_income > 0.0 && dti <= 0.36 {
        strengths.push("Debt-to-income ratio stays inside the conventional 36% guideline".to_string());
    } else if monthly_income > 0.0 {
        concerns.push(format!(
            "Debt-to-income ratio would reach {:.0}%, above the 36% guideline",
            dti * 100.0
        ));
    } else {
        concerns.push("No recent income visible in transaction history".to_string());
    }

    if snapshot.total_balance() >= payment * 3.0 {
        strengths.push("Liquid balances cover more than three monthly payments".to_string());
    } else {
        concerns.push("Liquid balances cover fewer than three monthly payments".to_string());
    }

    if credit_score.map(|s| s >= 740).unwrap_or(false) {
        strengths.push("Credit score qualifies for the best available rate tier".to_string());
    }

    Ok(json!({
        "requested_amount": amount,
        "term_months": term_months,
        "assumed_rate": rate,
        "monthly_payment": round2(payment),
        "total_interest": round2(total_interest),
        "monthly_income_estimate": round2(monthly_income),
        "existing_monthly_obligations": round2(existing_obligations),
        "debt_to_income": if dti.is_finite() { json!(round2(dti)) } else { Value::Null },
        "strengths": strengths,
        "concerns": concerns,
    }))
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Account, ToolCall, Transaction};
    use crate::store::InMemoryRecordStore;

    fn snapshot_with_accounts() -> DataSnapshot {
        DataSnapshot {
            accounts: vec![
                Account {
                    id: "a-1".to_string(),
                    name: "Checking".to_string(),
                    balance: 100.0,
                    ..Account::default()
                },
                Account {
                    id: "a-2".to_string(),
                    name: "Savings".to_string(),
                    balance: 250.0,
                    ..Account::default()
                },
            ],
            ..DataSnapshot::default()
        }
    }

    fn tx(amount: f64, category: &str, days_ago: i64) -> Transaction {
        Transaction {
            id: format!("t-{}-{}", category, days_ago),
            account_id: "a-1".to_string(),
            description: format!("{} purchase", category),
            amount,
            category: category.to_string(),
            occurred_at: Some(Utc::now() - ChronoDuration::days(days_ago)),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_names() {
        assert!(ToolKind::parse("account_overview").is_ok());
        let err = ToolKind::parse("scry_the_future").unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_account_overview_totals_and_idempotence() {
        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let snapshot = snapshot_with_accounts();

        let first = toolbox
            .invoke(ToolKind::AccountOverview, "u-1", &json!({}), Some(&snapshot))
            .await
            .unwrap();
        let second = toolbox
            .invoke(ToolKind::AccountOverview, "u-1", &json!({}), Some(&snapshot))
            .await
            .unwrap();

        assert_eq!(first["total_balance"], json!(350.0));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_recent_activity_window() {
        let mut snapshot = snapshot_with_accounts();
        snapshot.transactions = vec![
            tx(-40.0, "dining", 1),
            tx(-60.0, "groceries", 3),
            tx(500.0, "salary", 2),
            tx(-100.0, "dining", 30),
        ];

        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let result = toolbox
            .invoke(
                ToolKind::RecentActivity,
                "u-1",
                &json!({"days": 7}),
                Some(&snapshot),
            )
            .await
            .unwrap();

        assert_eq!(result["transaction_count"], json!(3));
        assert_eq!(result["total_spend"], json!(100.0));
        assert_eq!(result["total_income"], json!(500.0));
    }

    #[tokio::test]
    async fn test_spending_analysis_top_category() {
        let mut snapshot = snapshot_with_accounts();
        snapshot.transactions = vec![
            tx(-300.0, "dining", 10),
            tx(-120.0, "groceries", 12),
            tx(-30.0, "transport", 15),
        ];

        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let result = toolbox
            .invoke(ToolKind::SpendingAnalysis, "u-1", &json!({}), Some(&snapshot))
            .await
            .unwrap();

        assert_eq!(result["top_category"]["category"], json!("dining"));
        assert_eq!(result["total_spend"], json!(450.0));
        let opportunities = result["savings_opportunities"].as_array().unwrap();
        assert!(!opportunities.is_empty());
    }

    #[tokio::test]
    async fn test_loan_affordability_requires_amount() {
        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let snapshot = snapshot_with_accounts();

        let err = toolbox
            .invoke(ToolKind::LoanAffordability, "u-1", &json!({}), Some(&snapshot))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolInput(_)));
    }

    #[tokio::test]
    async fn test_loan_affordability_payment_math() {
        let mut snapshot = snapshot_with_accounts();
        snapshot.transactions = vec![tx(3000.0, "salary", 10), tx(3000.0, "salary", 40)];

        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let result = toolbox
            .invoke(
                ToolKind::LoanAffordability,
                "u-1",
                &json!({"amount": 10000.0, "term_months": 24, "credit_score": 750}),
                Some(&snapshot),
            )
            .await
            .unwrap();

        assert_eq!(result["assumed_rate"], json!(6.49));
        let payment = result["monthly_payment"].as_f64().unwrap();
        // 10k over 24 months at 6.49% lands between straight-line and
        // double-interest bounds.
        assert!(payment > 10000.0 / 24.0);
        assert!(payment < 10000.0 / 24.0 * 1.2);
        assert!(result["debt_to_income"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_execute_plan_isolates_failures() {
        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let snapshot = snapshot_with_accounts();

        let plan = Plan {
            reasoning: String::new(),
            tool_calls: vec![
                ToolCall {
                    // Missing amount → this call fails.
                    name: "loan_affordability".to_string(),
                    args: json!({}),
                },
                ToolCall {
                    name: "account_overview".to_string(),
                    args: json!({}),
                },
            ],
        };

        let results = toolbox
            .execute_plan(&plan, "u-1", Some(&snapshot))
            .await
            .unwrap();

        assert!(results["loan_affordability"].error.is_some());
        assert!(results["account_overview"].error.is_none());
        assert_eq!(
            results["account_overview"].payload["total_balance"],
            json!(350.0)
        );
    }

    #[tokio::test]
    async fn test_execute_plan_unknown_name_is_hard_error() {
        let toolbox = Toolbox::new(Arc::new(InMemoryRecordStore::new()));
        let plan = Plan {
            reasoning: String::new(),
            tool_calls: vec![ToolCall {
                name: "scry_the_future".to_string(),
                args: json!({}),
            }],
        };

        let err = toolbox.execute_plan(&plan, "u-1", None).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolNotFound(_)));
    }

    #[test]
    fn test_monthly_payment_zero_rate() {
        assert_eq!(monthly_payment(1200.0, 0.0, 12), 100.0);
    }
}
