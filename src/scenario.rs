//! Scenario detection
//!
//! Classifies a user message into one of the fixed intents with extracted
//! parameters. Pure keyword/regex heuristics, no I/O. Checkers run in a
//! fixed priority order because several can fire on overlapping text; the
//! first whose confidence clears its threshold wins, and anything else
//! falls through to `Standard`.

use crate::models::{ScenarioContext, ScenarioDetection, ScenarioKind};
use lazy_static::lazy_static;
use regex::Regex;

/// Phrase the synthesizer emits when offering a transaction for review.
/// The follow-up checker looks for it in history, so detector and
/// synthesizer phrasing are coupled by contract.
pub const REVIEW_OFFER_MARKER: &str = "would you like me to review";

/// Static keyword lists — zero allocation
const LOAN_KEYWORDS: &[&str] = &[
    "loan", "borrow", "financing", "finance a", "lend me", "line of credit",
];

const TRAVEL_KEYWORDS: &[&str] = &[
    "trip", "travel", "vacation", "holiday", "flight", "getaway",
];

const SPENDING_KEYWORDS: &[&str] = &[
    "spending", "spend analysis", "expenses", "where my money",
    "where does my money", "budget", "cut back", "spending habits",
];

const PAYMENT_SCHEDULE_KEYWORDS: &[&str] = &[
    "payment schedule", "amortization", "amortisation", "installment",
    "repayment plan", "simulate payment", "monthly breakdown",
];

const SUSPICIOUS_KEYWORDS: &[&str] = &[
    "suspicious transactions", "suspicious activity", "suspicious charges",
    "fraud", "unusual activity", "unusual charges", "unauthorized",
];

const SINGLE_REVIEW_KEYWORDS: &[&str] = &[
    "this transaction", "this charge", "that charge", "that transaction",
    "review a transaction", "check this purchase",
];

const CONFIRM_WORDS: &[&str] = &[
    "yes", "confirm", "go ahead", "correct", "that's right", "please do",
];

const DENY_WORDS: &[&str] = &["no", "looks fine", "i recognize", "all good", "nevermind"];

const DISPUTE_WORDS: &[&str] = &[
    "dispute", "chargeback", "charge back", "not mine", "didn't make",
    "did not make", "never made",
];

const CARD_COMPROMISED_KEYWORDS: &[&str] = &[
    "card compromised", "card is compromised", "card was stolen",
    "card stolen", "lost my card", "freeze my card", "card got skimmed",
];

const LOAN_DETAILS_KEYWORDS: &[&str] = &[
    "my loan", "loan balance", "loan details", "interest on my loan",
    "remaining on my loan", "payoff",
];

const OVERDRAFT_KEYWORDS: &[&str] = &[
    "overdraft", "overdrawn", "negative balance", "insufficient funds",
];

const MARKET_SHOCK_KEYWORDS: &[&str] = &[
    "market crash", "market drop", "market shock", "market downturn",
    "protect my investments", "protect my portfolio", "hedge",
];

const GOAL_ACCELERATION_KEYWORDS: &[&str] = &[
    "goal faster", "reach my goal", "hit my goal", "save faster",
    "accelerate my savings", "get there sooner",
];

/// Known destinations, lowercase match → display form.
const DESTINATIONS: &[(&str, &str)] = &[
    ("japan", "Japan"),
    ("tokyo", "Tokyo"),
    ("paris", "Paris"),
    ("france", "France"),
    ("italy", "Italy"),
    ("rome", "Rome"),
    ("london", "London"),
    ("spain", "Spain"),
    ("greece", "Greece"),
    ("bali", "Bali"),
    ("thailand", "Thailand"),
    ("mexico", "Mexico"),
    ("hawaii", "Hawaii"),
    ("iceland", "Iceland"),
    ("portugal", "Portugal"),
    ("costa rica", "Costa Rica"),
    ("new york", "New York"),
    ("brazil", "Brazil"),
    ("egypt", "Egypt"),
    ("canada", "Canada"),
];

lazy_static! {
    static ref AMOUNT_RE: Regex =
        Regex::new(r"\$?(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)\s*(k\b|thousand|grand|dollars|bucks|usd)?")
            .unwrap();
    static ref TERM_RE: Regex = Regex::new(r"(\d+)\s*(months?|mo\b|years?|yrs?)").unwrap();
    static ref BARE_TERM_RE: Regex = Regex::new(r"\b(\d{1,2})\b").unwrap();
    static ref RATE_RE: Regex = Regex::new(r"(\d+(?:\.\d+)?)\s*(%|percent|apr)").unwrap();
    /// Matches the review-offer phrasing: `"<description>" for $<amount> on <date>`
    static ref REVIEWED_TX_RE: Regex =
        Regex::new(r#""([^"]+)" for \$(\d[\d,]*(?:\.\d{1,2})?) on (\d{4}-\d{2}-\d{2})"#).unwrap();
}

fn has_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| text.contains(kw))
}

fn has_destination(text: &str) -> Option<String> {
    DESTINATIONS
        .iter()
        .find(|(needle, _)| text.contains(needle))
        .map(|(_, display)| display.to_string())
}

//
// ================= Parameter extraction =================
//
// All extractors are best-effort: no match returns None, never an error.

/// Loan amount: numeric token, optional `k`/currency suffix, comma
/// thousands. Numbers that read as a rate or a term are skipped.
pub fn extract_loan_amount(text: &str) -> Option<f64> {
    for caps in AMOUNT_RE.captures_iter(text) {
        let whole = caps.get(0)?;
        let tail = &text[whole.end()..];
        let tail = tail.trim_start();
        if tail.starts_with('%')
            || tail.starts_with("percent")
            || tail.starts_with("apr")
            || tail.starts_with("month")
            || tail.starts_with("mo ")
            || tail.starts_with("year")
            || tail.starts_with("yr")
        {
            continue;
        }

        let raw = caps.get(1)?.as_str().replace(',', "");
        let value: f64 = match raw.parse() {
            Ok(v) => v,
            Err(_) => continue,
        };

        let suffix = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        let multiplied = match suffix {
            "k" | "thousand" | "grand" => value * 1000.0,
            _ => value,
        };

        // A bare small number with no suffix is more likely a term or a
        // conversational count than a loan amount.
        if suffix.is_empty() && multiplied < 100.0 {
            continue;
        }

        return Some(multiplied);
    }

    None
}

/// Loan term in months. Explicit "N months"/"N years" first (year → month
/// conversion); with `allow_bare`, a standalone 1–2 digit number ≤ 60 is
/// read as months.
pub fn extract_term_months(text: &str, allow_bare: bool) -> Option<u32> {
    if let Some(caps) = TERM_RE.captures(text) {
        let value: u32 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str();
        return if unit.starts_with('y') {
            Some(value * 12)
        } else {
            Some(value)
        };
    }

    if allow_bare {
        for caps in BARE_TERM_RE.captures_iter(text) {
            let whole = caps.get(0)?;
            let tail = text[whole.end()..].trim_start();
            if tail.starts_with('%') || tail.starts_with('k') || tail.starts_with(',') {
                continue;
            }
            let value: u32 = caps.get(1)?.as_str().parse().ok()?;
            if value > 0 && value <= 60 {
                return Some(value);
            }
        }
    }

    None
}

/// Interest rate: number followed by %, "percent" or "apr".
pub fn extract_rate(text: &str) -> Option<f64> {
    RATE_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Travel destination from the fixed gazetteer.
pub fn extract_destination(text: &str) -> Option<String> {
    has_destination(text)
}

/// Facts about a transaction previously offered for review, pulled from the
/// history turn that carries the review-offer phrasing. Newest turn wins.
fn extract_reviewed_transaction(history: &[String]) -> ScenarioContext {
    let mut context = ScenarioContext::default();

    for turn in history.iter().rev() {
        let lowered = turn.to_lowercase();
        if !lowered.contains(REVIEW_OFFER_MARKER) {
            continue;
        }

        if let Some(caps) = REVIEWED_TX_RE.captures(turn) {
            context.transaction_description = caps.get(1).map(|m| m.as_str().to_string());
            context.transaction_amount = caps
                .get(2)
                .and_then(|m| m.as_str().replace(',', "").parse().ok());
            context.transaction_date = caps.get(3).map(|m| m.as_str().to_string());
        }
        break;
    }

    context
}

fn history_offers_review(history: &[String]) -> bool {
    history
        .iter()
        .any(|turn| turn.to_lowercase().contains(REVIEW_OFFER_MARKER))
}

fn extract_decision(text: &str) -> Option<String> {
    if has_any(text, DISPUTE_WORDS) {
        Some("dispute".to_string())
    } else if has_any(text, CONFIRM_WORDS) {
        Some("confirm".to_string())
    } else if has_any(text, DENY_WORDS) {
        Some("dismiss".to_string())
    } else {
        None
    }
}

fn loan_context(text: &str) -> ScenarioContext {
    ScenarioContext {
        amount: extract_loan_amount(text),
        term_months: extract_term_months(text, true),
        rate: extract_rate(text),
        travel_destination: extract_destination(text),
        ..ScenarioContext::default()
    }
}

//
// ================= Detection =================
//

/// Classify one message against the fixed intent catalog. Never fails;
/// anything unmatched is `Standard` with confidence 1.0.
pub fn detect(message: &str, history: &[String]) -> ScenarioDetection {
    let text = message.to_lowercase();

    let detection = |kind, confidence, context| ScenarioDetection {
        kind,
        confidence,
        context,
    };

    // Priority order is load-bearing: overlapping keyword sets mean a
    // reordering changes classifications.
    if has_any(&text, LOAN_KEYWORDS)
        && (has_any(&text, TRAVEL_KEYWORDS) || has_destination(&text).is_some())
    {
        return detection(ScenarioKind::LoanWithTravel, 0.7, loan_context(&text));
    }

    if has_any(&text, LOAN_KEYWORDS)
        && !has_any(&text, LOAN_DETAILS_KEYWORDS)
        && !has_any(&text, PAYMENT_SCHEDULE_KEYWORDS)
    {
        return detection(ScenarioKind::LoanRequest, 0.7, loan_context(&text));
    }

    if has_any(&text, SPENDING_KEYWORDS) {
        return detection(
            ScenarioKind::SpendingAnalysis,
            0.7,
            ScenarioContext::default(),
        );
    }

    if has_any(&text, TRAVEL_KEYWORDS) || has_destination(&text).is_some() {
        let context = ScenarioContext {
            travel_destination: extract_destination(&text),
            ..ScenarioContext::default()
        };
        return detection(ScenarioKind::TravelPlanning, 0.6, context);
    }

    if has_any(&text, PAYMENT_SCHEDULE_KEYWORDS) {
        return detection(ScenarioKind::PaymentSchedule, 0.7, loan_context(&text));
    }

    if has_any(&text, SUSPICIOUS_KEYWORDS) {
        return detection(
            ScenarioKind::SuspiciousActivityReview,
            0.7,
            ScenarioContext::default(),
        );
    }

    if has_any(&text, SINGLE_REVIEW_KEYWORDS) {
        return detection(
            ScenarioKind::TransactionReview,
            0.7,
            extract_reviewed_transaction(history),
        );
    }

    if history_offers_review(history) {
        if let Some(decision) = extract_decision(&text) {
            let mut context = extract_reviewed_transaction(history);
            context.decision = Some(decision);
            return detection(ScenarioKind::TransactionConfirmation, 0.7, context);
        }
    }

    if has_any(&text, CARD_COMPROMISED_KEYWORDS) {
        return detection(
            ScenarioKind::CardCompromised,
            0.7,
            ScenarioContext::default(),
        );
    }

    if has_any(&text, DISPUTE_WORDS) {
        let mut context = extract_reviewed_transaction(history);
        context.decision = Some("dispute".to_string());
        return detection(ScenarioKind::DisputeRequest, 0.7, context);
    }

    if has_any(&text, LOAN_DETAILS_KEYWORDS) {
        return detection(ScenarioKind::LoanDetails, 0.6, ScenarioContext::default());
    }

    if has_any(&text, OVERDRAFT_KEYWORDS) {
        return detection(
            ScenarioKind::OverdraftWarning,
            0.7,
            ScenarioContext::default(),
        );
    }

    if has_any(&text, MARKET_SHOCK_KEYWORDS) {
        return detection(
            ScenarioKind::MarketShockProtection,
            0.7,
            ScenarioContext::default(),
        );
    }

    if has_any(&text, GOAL_ACCELERATION_KEYWORDS) {
        return detection(
            ScenarioKind::GoalAcceleration,
            0.7,
            ScenarioContext::default(),
        );
    }

    ScenarioDetection::standard()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loan_with_travel() {
        let result = detect("I want a loan for my Japan trip", &[]);
        assert_eq!(result.kind, ScenarioKind::LoanWithTravel);
        assert_eq!(result.context.travel_destination.as_deref(), Some("Japan"));
    }

    #[test]
    fn test_loan_amount_with_k_suffix() {
        let result = detect("apply for 50k loan", &[]);
        assert_eq!(result.kind, ScenarioKind::LoanRequest);
        assert_eq!(result.context.amount, Some(50000.0));
    }

    #[test]
    fn test_loan_amount_with_commas() {
        assert_eq!(extract_loan_amount("borrow 12,500 for a car"), Some(12500.0));
    }

    #[test]
    fn test_term_and_rate_extraction() {
        let text = "simulate payment schedule for a loan of 50000 at 5.99% apr over 24 months";
        let result = detect(text, &[]);
        assert_eq!(result.kind, ScenarioKind::PaymentSchedule);
        assert_eq!(result.context.amount, Some(50000.0));
        assert_eq!(result.context.term_months, Some(24));
        assert_eq!(result.context.rate, Some(5.99));
    }

    #[test]
    fn test_year_terms_convert_to_months() {
        assert_eq!(extract_term_months("over 2 years", true), Some(24));
        assert_eq!(extract_term_months("36 months", true), Some(36));
    }

    #[test]
    fn test_bare_term_fallback_capped() {
        assert_eq!(extract_term_months("maybe 48", true), Some(48));
        assert_eq!(extract_term_months("maybe 48", false), None);
        assert_eq!(extract_term_months("maybe 90", true), None);
    }

    #[test]
    fn test_payment_schedule_without_loan_keyword() {
        let result = detect("show me an amortization table", &[]);
        assert_eq!(result.kind, ScenarioKind::PaymentSchedule);
    }

    #[test]
    fn test_suspicious_beats_single_review() {
        let result = detect("are there suspicious transactions on this account", &[]);
        assert_eq!(result.kind, ScenarioKind::SuspiciousActivityReview);
    }

    #[test]
    fn test_confirmation_requires_history_marker() {
        let no_history = detect("yes, go ahead", &[]);
        assert_eq!(no_history.kind, ScenarioKind::Standard);

        let history = vec![
            "I flagged \"ACME ELECTRONICS\" for $432.10 on 2026-07-30. Would you like me to review it?"
                .to_string(),
        ];
        let result = detect("yes, go ahead", &history);
        assert_eq!(result.kind, ScenarioKind::TransactionConfirmation);
        assert_eq!(result.context.decision.as_deref(), Some("confirm"));
        assert_eq!(
            result.context.transaction_description.as_deref(),
            Some("ACME ELECTRONICS")
        );
        assert_eq!(result.context.transaction_amount, Some(432.10));
        assert_eq!(
            result.context.transaction_date.as_deref(),
            Some("2026-07-30")
        );
    }

    #[test]
    fn test_dispute_decision_from_followup() {
        let history = vec![
            "I flagged \"ACME ELECTRONICS\" for $432.10 on 2026-07-30. Would you like me to review it?"
                .to_string(),
        ];
        let result = detect("that's not mine, dispute it", &history);
        assert_eq!(result.kind, ScenarioKind::TransactionConfirmation);
        assert_eq!(result.context.decision.as_deref(), Some("dispute"));
    }

    #[test]
    fn test_card_compromised() {
        let result = detect("I think my card was stolen", &[]);
        assert_eq!(result.kind, ScenarioKind::CardCompromised);
    }

    #[test]
    fn test_remaining_intents() {
        let cases = vec![
            ("I was hit with an overdraft fee", ScenarioKind::OverdraftWarning),
            ("how do I protect my portfolio from a market crash", ScenarioKind::MarketShockProtection),
            ("help me reach my goal faster", ScenarioKind::GoalAcceleration),
            ("what's the payoff on my loan", ScenarioKind::LoanDetails),
            ("I want to dispute a charge", ScenarioKind::DisputeRequest),
            ("analyze my spending this month", ScenarioKind::SpendingAnalysis),
            ("planning a vacation", ScenarioKind::TravelPlanning),
        ];

        for (text, expected) in cases {
            let result = detect(text, &[]);
            assert_eq!(result.kind, expected, "text: {}", text);
        }
    }

    #[test]
    fn test_detection_is_total() {
        let cases = vec![
            "",
            "hi",
            "what's my balance?",
            "tell me about compound interest",
            "???",
            "1234567890",
        ];

        for text in cases {
            let result = detect(text, &[]);
            assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        }

        let fallback = detect("what's my balance?", &[]);
        assert_eq!(fallback.kind, ScenarioKind::Standard);
        assert_eq!(fallback.confidence, 1.0);
    }
}
