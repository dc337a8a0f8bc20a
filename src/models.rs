//! Core data models for the conversational agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Enums =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    Text,
    Voice,
    Hybrid,
}

impl Default for AnswerMode {
    fn default() -> Self {
        AnswerMode::Text
    }
}

impl AnswerMode {
    /// Voice-originated requests take the latency-critical path: smaller
    /// fetch budgets, smaller row caps, planner skip when data is cached.
    pub fn is_fast(&self) -> bool {
        matches!(self, AnswerMode::Voice)
    }
}

impl fmt::Display for AnswerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnswerMode::Text => "text",
            AnswerMode::Voice => "voice",
            AnswerMode::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

//
// ================= Request =================
//

/// Immutable inbound request; one per call, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    pub question: String,
    pub user_id: String,
    pub persona_id: String,
    pub current_page: String,
    pub mode: AnswerMode,
    /// Recent prior turns, newest last. Used only by follow-up detection.
    #[serde(default)]
    pub history: Vec<String>,
}

impl AgentRequest {
    pub fn new(question: impl Into<String>, user_id: impl Into<String>, mode: AnswerMode) -> Self {
        Self {
            question: question.into(),
            user_id: user_id.into(),
            persona_id: "default".to_string(),
            current_page: String::new(),
            mode,
            history: Vec::new(),
        }
    }
}

//
// ================= Financial Records =================
//
// Record rows come back from the store loosely typed; serde defaults keep
// partially-shaped rows decodable instead of failing the whole fetch.

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_type: String,
    #[serde(default)]
    pub balance: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Card {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub last_four: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub credit_limit: f64,
    #[serde(default)]
    pub balance: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Loan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub loan_type: String,
    #[serde(default)]
    pub principal: f64,
    #[serde(default)]
    pub balance: f64,
    #[serde(default)]
    pub interest_rate: f64,
    #[serde(default)]
    pub monthly_payment: f64,
    #[serde(default)]
    pub term_months: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub account_id: String,
    #[serde(default)]
    pub description: String,
    /// Negative amounts are spend, positive are income.
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Holding {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub market_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SavingsGoal {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub target_amount: f64,
    #[serde(default)]
    pub current_amount: f64,
    #[serde(default)]
    pub monthly_contribution: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardProfile {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub points_balance: i64,
    #[serde(default)]
    pub tier: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportTicket {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
}

//
// ================= Snapshot =================
//

/// Point-in-time aggregation of one user's records. Built once per request
/// by the loader, shared by reference downstream, discarded at request end.
/// Every collection defaults to empty so consumers never branch on absence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub accounts: Vec<Account>,
    pub cards: Vec<Card>,
    pub loans: Vec<Loan>,
    pub transactions: Vec<Transaction>,
    pub holdings: Vec<Holding>,
    pub goals: Vec<SavingsGoal>,
    pub reward_profile: Option<RewardProfile>,
    pub reward_activity: Vec<RewardEvent>,
    pub support_tickets: Vec<SupportTicket>,
}

impl DataSnapshot {
    pub fn total_balance(&self) -> f64 {
        self.accounts.iter().map(|a| a.balance).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
            && self.cards.is_empty()
            && self.loans.is_empty()
            && self.transactions.is_empty()
            && self.holdings.is_empty()
            && self.goals.is_empty()
            && self.reward_profile.is_none()
            && self.reward_activity.is_empty()
            && self.support_tickets.is_empty()
    }
}

//
// ================= Scenario =================
//

/// Classified user intent. One produced per inbound message; the checkers
/// run in a fixed priority order and the first match above threshold wins.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioKind {
    LoanWithTravel,
    LoanRequest,
    SpendingAnalysis,
    TravelPlanning,
    PaymentSchedule,
    SuspiciousActivityReview,
    TransactionReview,
    TransactionConfirmation,
    CardCompromised,
    DisputeRequest,
    LoanDetails,
    OverdraftWarning,
    MarketShockProtection,
    GoalAcceleration,
    Standard,
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioKind::LoanWithTravel => "loan_with_travel",
            ScenarioKind::LoanRequest => "loan_request",
            ScenarioKind::SpendingAnalysis => "spending_analysis",
            ScenarioKind::TravelPlanning => "travel_planning",
            ScenarioKind::PaymentSchedule => "payment_schedule",
            ScenarioKind::SuspiciousActivityReview => "suspicious_activity_review",
            ScenarioKind::TransactionReview => "transaction_review",
            ScenarioKind::TransactionConfirmation => "transaction_confirmation",
            ScenarioKind::CardCompromised => "card_compromised",
            ScenarioKind::DisputeRequest => "dispute_request",
            ScenarioKind::LoanDetails => "loan_details",
            ScenarioKind::OverdraftWarning => "overdraft_warning",
            ScenarioKind::MarketShockProtection => "market_shock_protection",
            ScenarioKind::GoalAcceleration => "goal_acceleration",
            ScenarioKind::Standard => "standard",
        };
        write!(f, "{}", s)
    }
}

/// Parameters extracted from the message text; every field is best-effort.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScenarioContext {
    pub amount: Option<f64>,
    pub term_months: Option<u32>,
    pub rate: Option<f64>,
    pub travel_destination: Option<String>,
    pub transaction_description: Option<String>,
    pub transaction_amount: Option<f64>,
    pub transaction_date: Option<String>,
    pub decision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioDetection {
    pub kind: ScenarioKind,
    pub confidence: f64,
    pub context: ScenarioContext,
}

impl ScenarioDetection {
    pub fn standard() -> Self {
        Self {
            kind: ScenarioKind::Standard,
            confidence: 1.0,
            context: ScenarioContext::default(),
        }
    }
}

//
// ================= Plan & Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Model-produced tool selection; transient, discarded after execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, alias = "toolCalls")]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool: String,
    pub payload: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(tool: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            payload,
            error: None,
        }
    }

    pub fn failed(tool: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            payload: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

//
// ================= Final Answer =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub short_answer: Option<String>,
}

impl AgentAnswer {
    pub fn long_only(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            short_answer: None,
        }
    }
}
