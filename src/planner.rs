//! Tool selection planner
//!
//! One model call chooses which tools are worth running for a question.
//! The reply is free text; the first balanced `{...}` region is decoded
//! best-effort. Malformed output degrades to the empty plan so the
//! workflow answers from whatever snapshot is already cached; planning
//! must never fail a request.

use crate::llm::LlmClient;
use crate::models::{AnswerMode, Plan};
use crate::tools::ToolKind;
use std::sync::Arc;
use tracing::{debug, warn};

const MAX_TOOL_CALLS: usize = 4;

pub struct Planner {
    llm: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// Decide which tools to run. Returns `None` when planning is skipped
    /// outright (voice with cached data, the latency-critical path), or
    /// a plan that may be empty after degradation.
    pub async fn plan(
        &self,
        question: &str,
        snapshot_cached: bool,
        mode: AnswerMode,
    ) -> Option<Plan> {
        if mode == AnswerMode::Voice && snapshot_cached {
            debug!("Voice request with cached snapshot, skipping planner");
            return None;
        }

        let prompt = build_prompt(question, snapshot_cached);

        let response = match self.llm.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Planner model call failed, continuing with cached snapshot");
                return Some(Plan::default());
            }
        };

        Some(parse_plan(&response))
    }
}

fn build_prompt(question: &str, snapshot_cached: bool) -> String {
    let mut catalog = String::new();
    for kind in ToolKind::ALL {
        catalog.push_str(&format!(
            "- {}: {}. Args: {}\n",
            kind.name(),
            kind.description(),
            kind.arg_guidance()
        ));
    }

    let cache_note = if snapshot_cached {
        "A snapshot of the user's records is already cached; only request tools that add information beyond it."
    } else {
        "No data has been loaded yet."
    };

    format!(
        r#"You are the planning stage of a financial assistant.

Choose which tools (if any) are needed to answer the user's question.

QUESTION:
{question}

{cache_note}

Available tools:
{catalog}
Rules:
- At most {MAX_TOOL_CALLS} tool calls
- Reference only the tools listed above
- Return ONLY a JSON object, no explanation text
- JSON format:

{{
  "reasoning": "...",
  "toolCalls": [
    {{ "name": "account_overview", "args": {{}} }}
  ]
}}
"#
    )
}

/// Parse a plan from raw model text. Every failure path lands on the empty
/// plan; unknown tool names are dropped here so the dispatcher only ever
/// sees registered names.
pub fn parse_plan(response: &str) -> Plan {
    let Some(region) = extract_json_region(response) else {
        warn!("No JSON object found in planner response, using empty plan");
        return Plan::default();
    };

    let mut plan: Plan = match serde_json::from_str(region) {
        Ok(plan) => plan,
        Err(e) => {
            warn!(error = %e, "Planner response did not decode, using empty plan");
            return Plan::default();
        }
    };

    plan.tool_calls.retain(|call| {
        let known = ToolKind::parse(&call.name).is_ok();
        if !known {
            warn!(tool = %call.name, "Dropping unknown tool from plan");
        }
        known
    });
    plan.tool_calls.truncate(MAX_TOOL_CALLS);

    plan
}

/// First balanced top-level `{...}` region of `text`, string-aware.
pub fn extract_json_region(text: &str) -> Option<&str> {
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ScriptedLlm, ScriptedReply};

    #[test]
    fn test_extract_json_region_with_surrounding_text() {
        let text = "Sure, here's the plan:\n```json\n{\"reasoning\": \"x\", \"toolCalls\": []}\n```\nHope that helps.";
        let region = extract_json_region(text).unwrap();
        assert_eq!(region, "{\"reasoning\": \"x\", \"toolCalls\": []}");
    }

    #[test]
    fn test_extract_json_region_nested_and_strings() {
        let text = r#"{"reasoning": "needs {braces} and \"quotes\"", "toolCalls": [{"name": "account_overview", "args": {"days": 7}}]} trailing"#;
        let region = extract_json_region(text).unwrap();
        assert!(region.ends_with("}"));
        assert!(serde_json::from_str::<Plan>(region).is_ok());
    }

    #[test]
    fn test_parse_plan_non_json_degrades_to_empty() {
        let plan = parse_plan("I cannot answer that right now.");
        assert!(plan.tool_calls.is_empty());
    }

    #[test]
    fn test_parse_plan_drops_unknown_tools() {
        let plan = parse_plan(
            r#"{"reasoning": "mix", "toolCalls": [
                {"name": "account_overview", "args": {}},
                {"name": "scry_the_future", "args": {}}
            ]}"#,
        );
        assert_eq!(plan.tool_calls.len(), 1);
        assert_eq!(plan.tool_calls[0].name, "account_overview");
    }

    #[test]
    fn test_parse_plan_caps_call_count() {
        let calls: Vec<String> = (0..6)
            .map(|_| r#"{"name": "account_overview", "args": {}}"#.to_string())
            .collect();
        let plan = parse_plan(&format!(
            r#"{{"reasoning": "", "toolCalls": [{}]}}"#,
            calls.join(",")
        ));
        assert_eq!(plan.tool_calls.len(), MAX_TOOL_CALLS);
    }

    #[tokio::test]
    async fn test_voice_with_cached_snapshot_skips_planning() {
        let llm = Arc::new(ScriptedLlm::echo());
        let planner = Planner::new(llm.clone());

        let decision = planner.plan("what's my balance", true, AnswerMode::Voice).await;
        assert!(decision.is_none());
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_degrades_to_empty_plan() {
        let llm = Arc::new(ScriptedLlm::with_replies(vec![ScriptedReply::Fail]));
        let planner = Planner::new(llm);

        let plan = planner
            .plan("what's my balance", true, AnswerMode::Text)
            .await
            .unwrap();
        assert!(plan.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_prompt_enumerates_catalog() {
        let llm = Arc::new(ScriptedLlm::canned(
            r#"{"reasoning": "overview", "toolCalls": [{"name": "account_overview", "args": {}}]}"#,
        ));
        let planner = Planner::new(llm.clone());

        let plan = planner
            .plan("what's my balance", false, AnswerMode::Text)
            .await
            .unwrap();
        assert_eq!(plan.tool_calls.len(), 1);

        let prompt = llm.prompts().pop().unwrap();
        for kind in ToolKind::ALL {
            assert!(prompt.contains(kind.name()));
        }
    }
}
