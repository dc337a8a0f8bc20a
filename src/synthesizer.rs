//! Answer synthesis
//!
//! Builds one bounded prompt from whatever the workflow gathered and asks
//! the model for the final answer. Scenario-specific instruction blocks
//! carry their own deterministic calculations (schedules, pre-approval
//! figures, flagged transactions) so the model formats numbers it was
//! given instead of inventing them. This layer is the last line of defense:
//! every model failure resolves to a fixed fallback sentence.

use crate::error::AgentError;
use crate::llm::LlmClient;
use crate::models::{
    AgentAnswer, AnswerMode, DataSnapshot, ScenarioDetection, ScenarioKind, ToolResult,
    Transaction,
};
use crate::tools::{monthly_payment, round2};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

const MAX_CONTEXT_TRANSACTIONS: usize = 20;
const MAX_CONTEXT_CHARS: usize = 9000;

const DEFAULT_LOAN_AMOUNT: f64 = 10000.0;
const DEFAULT_LOAN_TERM_MONTHS: u32 = 36;
const DEFAULT_LOAN_RATE: f64 = 9.99;

//
// ================= Fallbacks =================
//

pub fn fallback_answer(mode: AnswerMode, timed_out: bool) -> &'static str {
    match (mode, timed_out) {
        (AnswerMode::Voice, true) => "Sorry, that took too long. Please ask me again.",
        (AnswerMode::Voice, false) => "Sorry, I couldn't answer that just now. Please try again.",
        (_, true) => {
            "I'm sorry, that took longer than expected. Please try asking again in a moment."
        }
        (_, false) => {
            "I'm sorry, I wasn't able to finish answering that just now. Please try again."
        }
    }
}

//
// ================= Currency =================
//

pub fn format_currency(value: f64) -> String {
    let negative = value < 0.0;
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;
    format!(
        "{}${}.{:02}",
        if negative { "-" } else { "" },
        group_thousands(whole),
        frac
    )
}

pub fn format_currency_whole(value: f64) -> String {
    let negative = value < 0.0;
    let whole = value.abs().round() as u64;
    format!("{}${}", if negative { "-" } else { "" }, group_thousands(whole))
}

fn group_thousands(mut value: u64) -> String {
    let mut groups = Vec::new();
    loop {
        if value < 1000 {
            groups.push(value.to_string());
            break;
        }
        groups.push(format!("{:03}", value % 1000));
        value /= 1000;
    }
    groups.reverse();
    groups.join(",")
}

//
// ================= Amortization =================
//

#[derive(Debug, Clone, Serialize)]
pub struct AmortizationRow {
    pub month: u32,
    pub payment: f64,
    pub principal: f64,
    pub interest: f64,
    pub remaining: f64,
}

/// Fixed-payment amortization. Rounding happens per row with the principal
/// portion derived from payment minus interest, so each row's parts always
/// sum to its payment and the final balance lands on zero.
pub fn amortization_schedule(principal: f64, annual_rate_pct: f64, term_months: u32) -> Vec<AmortizationRow> {
    if term_months == 0 || principal <= 0.0 {
        return Vec::new();
    }

    let raw_payment = monthly_payment(principal, annual_rate_pct, term_months);
    let monthly_rate = annual_rate_pct / 100.0 / 12.0;

    let mut rows = Vec::with_capacity(term_months as usize);
    let mut balance = principal;

    for month in 1..=term_months {
        let interest = round2(balance * monthly_rate);

        let (payment, principal_part) = if month == term_months {
            // Final payment clears whatever rounding left behind.
            (round2(balance + interest), round2(balance))
        } else {
            let payment = round2(raw_payment);
            (payment, round2(payment - interest))
        };

        balance = round2(balance - principal_part);

        rows.push(AmortizationRow {
            month,
            payment,
            principal: principal_part,
            interest,
            remaining: balance.max(0.0),
        });
    }

    rows
}

fn amortization_table(rows: &[AmortizationRow]) -> String {
    let mut out = String::new();
    out.push_str("| Month | Payment | Principal | Interest | Remaining |\n");
    out.push_str("|-------|---------|-----------|----------|-----------|\n");
    for row in rows {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            row.month,
            format_currency(row.payment),
            format_currency(row.principal),
            format_currency(row.interest),
            format_currency(row.remaining),
        ));
    }
    out
}

//
// ================= Scenario instructions =================
//

fn loan_offer_block(amount: f64, term_months: u32, rate: f64, destination: Option<&str>) -> String {
    let payment = round2(monthly_payment(amount, rate, term_months));
    let offer = json!({
        "amount": amount,
        "term_months": term_months,
        "rate": rate,
        "monthly_payment": payment,
        "destination": destination,
    });

    format!(
        "```loan-offer\n{}\n```",
        serde_json::to_string_pretty(&offer).unwrap_or_else(|_| offer.to_string())
    )
}

/// Transactions worth flagging for review: outsized spend relative to the
/// user's own history, or any spend at or above $500.
fn flag_suspicious(transactions: &[Transaction]) -> Vec<&Transaction> {
    let spends: Vec<f64> = transactions
        .iter()
        .filter(|t| t.amount < 0.0)
        .map(|t| -t.amount)
        .collect();
    if spends.is_empty() {
        return Vec::new();
    }
    let average = spends.iter().sum::<f64>() / spends.len() as f64;

    let mut flagged: Vec<&Transaction> = transactions
        .iter()
        .filter(|t| t.amount < 0.0)
        .filter(|t| -t.amount >= 500.0 || -t.amount >= average * 3.0)
        .collect();
    flagged.sort_by(|a, b| a.amount.partial_cmp(&b.amount).unwrap_or(std::cmp::Ordering::Equal));
    flagged.truncate(3);
    flagged
}

/// The exact phrasing the scenario detector's follow-up checker matches.
fn review_offer_line(t: &Transaction) -> Option<String> {
    let date = t.occurred_at?.format("%Y-%m-%d").to_string();
    Some(format!(
        "I flagged \"{}\" for {} on {}. Would you like me to review it?",
        t.description,
        format_currency(-t.amount),
        date
    ))
}

fn scenario_instructions(
    scenario: &ScenarioDetection,
    snapshot: Option<&DataSnapshot>,
) -> Option<String> {
    let ctx = &scenario.context;

    match scenario.kind {
        ScenarioKind::Standard => None,

        ScenarioKind::LoanWithTravel => {
            let amount = ctx.amount.unwrap_or(DEFAULT_LOAN_AMOUNT);
            let term = ctx.term_months.unwrap_or(DEFAULT_LOAN_TERM_MONTHS);
            let rate = ctx.rate.unwrap_or(DEFAULT_LOAN_RATE);
            let savings: f64 = snapshot
                .map(|s| s.goals.iter().map(|g| g.current_amount).sum())
                .unwrap_or(0.0);
            let destination = ctx.travel_destination.as_deref().unwrap_or("the trip");

            Some(format!(
                "The user is asking about financing travel to {destination}. Before presenting \
the loan, point out existing savings of {} that could fund part of the trip and compare both \
paths. Then present the loan option. End your answer with this exact block so the interface \
can render an offer card:\n{}",
                format_currency(savings),
                loan_offer_block(amount, term, rate, ctx.travel_destination.as_deref()),
            ))
        }

        ScenarioKind::LoanRequest => {
            let amount = ctx.amount.unwrap_or(DEFAULT_LOAN_AMOUNT);
            let term = ctx.term_months.unwrap_or(DEFAULT_LOAN_TERM_MONTHS);
            let rate = ctx.rate.unwrap_or(DEFAULT_LOAN_RATE);
            let payment = round2(monthly_payment(amount, rate, term));

            Some(format!(
                "The user is asking for a loan of {} over {} months. A pre-approval estimate at \
{rate}% works out to {} per month; present these figures and what affects the final rate. End \
your answer with this exact block so the interface can render an offer card:\n{}",
                format_currency(amount),
                term,
                format_currency(payment),
                loan_offer_block(amount, term, rate, None),
            ))
        }

        ScenarioKind::PaymentSchedule => {
            let amount = ctx.amount.unwrap_or(DEFAULT_LOAN_AMOUNT);
            let term = ctx.term_months.unwrap_or(DEFAULT_LOAN_TERM_MONTHS);
            let rate = ctx.rate.unwrap_or(DEFAULT_LOAN_RATE);
            let rows = amortization_schedule(amount, rate, term);

            Some(format!(
                "The user asked for a payment schedule ({} at {rate}% over {term} months). \
Present this table exactly as given, then summarize the totals in one sentence:\n\n{}",
                format_currency(amount),
                amortization_table(&rows),
            ))
        }

        ScenarioKind::SpendingAnalysis => Some(
            "The user wants to understand their spending. Lead with the monthly forecast and the \
top category from the data, then name the concrete savings opportunities with their amounts."
                .to_string(),
        ),

        ScenarioKind::SuspiciousActivityReview => {
            let offers: Vec<String> = snapshot
                .map(|s| {
                    flag_suspicious(&s.transactions)
                        .into_iter()
                        .filter_map(review_offer_line)
                        .collect()
                })
                .unwrap_or_default();

            if offers.is_empty() {
                Some(
                    "The user is worried about suspicious activity but nothing in the data stands \
out. Say so plainly and explain what you checked."
                        .to_string(),
                )
            } else {
                Some(format!(
                    "The user is worried about suspicious activity. These transactions stand out. \
List each one and include its offer line exactly as written:\n{}",
                    offers.join("\n"),
                ))
            }
        }

        ScenarioKind::TransactionReview => {
            let detail = match (&ctx.transaction_description, ctx.transaction_amount) {
                (Some(desc), Some(amount)) => {
                    format!("the charge \"{}\" for {}", desc, format_currency(amount))
                }
                _ => "the charge they mentioned".to_string(),
            };
            Some(format!(
                "The user wants to review {detail}. Walk through what the data shows about it \
(merchant, date, account) and ask whether they recognize it.",
            ))
        }

        ScenarioKind::TransactionConfirmation => {
            let subject = ctx
                .transaction_description
                .as_deref()
                .unwrap_or("the flagged transaction");
            match ctx.decision.as_deref() {
                Some("dispute") => Some(format!(
                    "The user decided to dispute \"{subject}\". Confirm the dispute has been \
opened, explain that the card team will follow up within 2 business days, and that the amount \
is provisionally credited while it is investigated.",
                )),
                Some("confirm") => Some(format!(
                    "The user confirmed \"{subject}\" looks wrong and wants it handled. Confirm \
the next steps for the review you offered.",
                )),
                _ => Some(format!(
                    "The user recognizes \"{subject}\" after all. Acknowledge it, close the \
review, and remind them how to reopen it.",
                )),
            }
        }

        ScenarioKind::CardCompromised => Some(
            "The user believes a card is compromised. Tell them the card has been frozen as a \
precaution, a replacement is on its way, and list the three things to check next (recent \
charges, linked subscriptions, credit report)."
                .to_string(),
        ),

        ScenarioKind::DisputeRequest => {
            let subject = match (&ctx.transaction_description, ctx.transaction_amount) {
                (Some(desc), Some(amount)) => {
                    format!("\"{}\" for {}", desc, format_currency(amount))
                }
                _ => "the charge they described".to_string(),
            };
            Some(format!(
                "The user wants to dispute {subject}. Confirm the dispute is filed, state the \
provisional credit policy, and set the expectation of a decision within 10 business days.",
            ))
        }

        ScenarioKind::LoanDetails => Some(
            "The user is asking about their existing loans. Summarize each loan in the data: \
balance, rate, monthly payment and remaining term. Do not propose new borrowing unless asked."
                .to_string(),
        ),

        ScenarioKind::OverdraftWarning => Some(
            "The user is dealing with an overdraft risk. Identify the account closest to \
negative, say when it would go negative at the current spend rate, and suggest one concrete \
transfer to cover it."
                .to_string(),
        ),

        ScenarioKind::MarketShockProtection => Some(
            "The user is worried about a market drop. Review their holdings' concentration, \
explain their actual exposure in plain terms, and present defensive options without urging a \
sale."
                .to_string(),
        ),

        ScenarioKind::GoalAcceleration => Some(
            "The user wants to reach a savings goal sooner. Using their goals and spending in \
the data, show how much sooner the goal lands if the largest savings opportunity is redirected \
into it."
                .to_string(),
        ),

        ScenarioKind::TravelPlanning => {
            let destination = ctx.travel_destination.as_deref().unwrap_or("their destination");
            Some(format!(
                "The user is planning travel to {destination}. Review balances and goals for \
what they can comfortably budget, and mention any card perks in the data that apply to travel.",
            ))
        }
    }
}

//
// ================= Persona =================
//

fn persona_instruction(persona_id: &str) -> &'static str {
    match persona_id {
        "concise-coach" => {
            "You are a concise financial coach. Short sentences, one recommendation at a time, \
no filler."
        }
        "concierge" => {
            "You are a warm private-banking concierge. Courteous, unhurried, always offering \
one next step."
        }
        _ => {
            "You are a careful personal-finance assistant. Plain language, specific figures, \
no judgment about past choices."
        }
    }
}

//
// ================= Context =================
//

fn build_context(
    snapshot: Option<&DataSnapshot>,
    tool_results: &HashMap<String, ToolResult>,
) -> String {
    let mut context = serde_json::Map::new();

    if let Some(snapshot) = snapshot {
        let transactions: Vec<&Transaction> = snapshot
            .transactions
            .iter()
            .take(MAX_CONTEXT_TRANSACTIONS)
            .collect();

        context.insert(
            "snapshot".to_string(),
            json!({
                "accounts": snapshot.accounts,
                "total_balance": round2(snapshot.total_balance()),
                "cards": snapshot.cards,
                "loans": snapshot.loans,
                "holdings": snapshot.holdings,
                "goals": snapshot.goals,
                "reward_profile": snapshot.reward_profile,
                "recent_transactions": transactions,
                "open_support_tickets": snapshot.support_tickets,
            }),
        );
    }

    if !tool_results.is_empty() {
        let results: serde_json::Map<String, serde_json::Value> = tool_results
            .iter()
            .map(|(name, result)| {
                let value = match &result.error {
                    Some(error) => json!({ "error": error }),
                    None => result.payload.clone(),
                };
                (name.clone(), value)
            })
            .collect();
        context.insert("tool_results".to_string(), serde_json::Value::Object(results));
    }

    let mut rendered = serde_json::Value::Object(context).to_string();
    if rendered.len() > MAX_CONTEXT_CHARS {
        rendered.truncate(MAX_CONTEXT_CHARS);
    }
    rendered
}

//
// ================= Synthesizer =================
//

pub struct SynthesisInput<'a> {
    pub question: &'a str,
    pub persona_id: &'a str,
    pub current_page: &'a str,
    pub mode: AnswerMode,
    pub scenario: &'a ScenarioDetection,
    pub snapshot: Option<&'a DataSnapshot>,
    pub tool_results: &'a HashMap<String, ToolResult>,
}

pub struct Synthesizer {
    llm: Arc<dyn LlmClient>,
}

impl Synthesizer {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Produce the final answer. Never fails: model errors become the
    /// fixed fallback sentence for the request's mode.
    pub async fn synthesize(&self, input: &SynthesisInput<'_>) -> AgentAnswer {
        match input.mode {
            AnswerMode::Text => {
                let prompt = self.build_prompt(input, PromptShape::Long);
                AgentAnswer::long_only(self.generate_or_fallback(&prompt, input.mode).await)
            }
            AnswerMode::Voice => {
                let prompt = self.build_prompt(input, PromptShape::Short);
                AgentAnswer::long_only(self.generate_or_fallback(&prompt, input.mode).await)
            }
            AnswerMode::Hybrid => {
                let long_prompt = self.build_prompt(input, PromptShape::Long);
                let short_prompt = self.build_prompt(input, PromptShape::Short);

                let (long, short) = tokio::join!(
                    self.generate_or_fallback(&long_prompt, AnswerMode::Text),
                    self.generate_or_fallback(&short_prompt, AnswerMode::Voice),
                );

                AgentAnswer {
                    answer: long,
                    short_answer: Some(short),
                }
            }
        }
    }

    async fn generate_or_fallback(&self, prompt: &str, mode: AnswerMode) -> String {
        match self.llm.generate(prompt).await {
            Ok(answer) if !answer.trim().is_empty() => answer,
            Ok(_) => fallback_answer(mode, false).to_string(),
            Err(e) => {
                warn!(error = %e, "Answer generation failed, using fallback sentence");
                let timed_out = matches!(e, AgentError::ModelTimeout(_));
                fallback_answer(mode, timed_out).to_string()
            }
        }
    }

    fn build_prompt(&self, input: &SynthesisInput<'_>, shape: PromptShape) -> String {
        let mut prompt = String::new();

        prompt.push_str(persona_instruction(input.persona_id));
        prompt.push_str("\n\n");

        if let Some(instructions) = scenario_instructions(input.scenario, input.snapshot) {
            prompt.push_str("SITUATION:\n");
            prompt.push_str(&instructions);
            prompt.push_str("\n\n");
        }

        if !input.current_page.is_empty() {
            prompt.push_str(&format!(
                "The user is currently looking at the {} page.\n\n",
                input.current_page
            ));
        }

        prompt.push_str("FINANCIAL DATA:\n");
        prompt.push_str(&build_context(input.snapshot, input.tool_results));
        prompt.push_str("\n\n");

        prompt.push_str("RULES:\n");
        prompt.push_str("- Use only figures present in FINANCIAL DATA or SITUATION; never invent amounts\n");
        match shape {
            PromptShape::Long => {
                prompt.push_str("- Format currency as $1,234.56\n");
                prompt.push_str("- A structured, multi-sentence answer; markdown tables and lists are fine\n");
            }
            PromptShape::Short => {
                prompt.push_str("- Answer in 1-3 short plain sentences, no markdown\n");
                prompt.push_str("- Round currency to whole dollars, no decimals\n");
            }
        }
        prompt.push_str("\nQUESTION:\n");
        prompt.push_str(input.question);

        prompt
    }
}

#[derive(Clone, Copy)]
enum PromptShape {
    Long,
    Short,
}
