//! Orchestration workflow
//!
//! The finite state machine that turns a request into an answer:
//! Prefetch → Plan → {FetchAll | Answer}. Every edge moves forward; the
//! one conditional sits after planning. Node functions take the state by
//! value and return the next state, so each transition is testable on its
//! own. The public entry wraps the whole run in a mode-dependent budget
//! and substitutes the fallback answer when it expires.

use crate::budget::run_bounded;
use crate::llm::LlmClient;
use crate::models::{
    AgentAnswer, AgentRequest, AnswerMode, DataSnapshot, Plan, ScenarioDetection, ToolResult,
};
use crate::planner::Planner;
use crate::scenario;
use crate::snapshot::SnapshotLoader;
use crate::store::RecordStore;
use crate::synthesizer::{fallback_answer, SynthesisInput, Synthesizer};
use crate::tools::{ToolKind, Toolbox};
use crate::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

const WORKFLOW_BUDGET: Duration = Duration::from_secs(20);
const WORKFLOW_BUDGET_VOICE: Duration = Duration::from_secs(8);

//
// ================= State =================
//

/// Request-scoped workflow state. Nodes never mutate in place: each one
/// consumes the previous state and returns the next.
pub struct WorkflowState {
    pub request: AgentRequest,
    pub scenario: ScenarioDetection,
    pub snapshot: Option<Arc<DataSnapshot>>,
    pub tool_results: HashMap<String, ToolResult>,
    pub plan: Option<Plan>,
    pub iteration: u32,
}

impl WorkflowState {
    pub fn new(request: AgentRequest, scenario: ScenarioDetection) -> Self {
        Self {
            request,
            scenario,
            snapshot: None,
            tool_results: HashMap::new(),
            plan: None,
            iteration: 0,
        }
    }

    fn has_tool_error(&self) -> bool {
        self.tool_results.values().any(|r| r.error.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Prefetch,
    Plan,
    FetchAll,
    Answer,
}

/// The single conditional edge of the graph.
pub fn next_after_plan(state: &WorkflowState) -> Node {
    if state.request.mode == AnswerMode::Voice && state.snapshot.is_some() {
        return Node::Answer;
    }

    let nothing_gathered = state.snapshot.is_none() && state.tool_results.is_empty();
    if state.iteration <= 1 && (state.has_tool_error() || nothing_gathered) {
        return Node::FetchAll;
    }

    Node::Answer
}

//
// ================= Orchestrator =================
//

pub struct Orchestrator {
    loader: SnapshotLoader,
    planner: Planner,
    toolbox: Toolbox,
    synthesizer: Synthesizer,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn RecordStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self {
            loader: SnapshotLoader::new(store.clone()),
            planner: Planner::new(llm.clone()),
            toolbox: Toolbox::new(store),
            synthesizer: Synthesizer::new(llm),
        }
    }

    /// Public entry point: classify the question, run the workflow under
    /// the mode's budget, fall back to the fixed answer on expiry. The
    /// caller never sees an error.
    pub async fn handle(&self, request: AgentRequest) -> AgentAnswer {
        let request_id = uuid::Uuid::new_v4();
        let detection = scenario::detect(&request.question, &request.history);
        info!(
            request_id = %request_id,
            user_id = %request.user_id,
            mode = %request.mode,
            scenario = %detection.kind,
            confidence = detection.confidence,
            "Handling agent request"
        );

        let mode = request.mode;
        let budget = match mode {
            AnswerMode::Voice => WORKFLOW_BUDGET_VOICE,
            _ => WORKFLOW_BUDGET,
        };

        let state = WorkflowState::new(request, detection);

        run_bounded(
            "workflow",
            budget,
            async {
                match self.run(state).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        error!(error = %e, "Workflow failed");
                        AgentAnswer::long_only(fallback_answer(mode, false))
                    }
                }
            },
            AgentAnswer::long_only(fallback_answer(mode, true)),
        )
        .await
    }

    /// Drive the graph from Prefetch to Answer. Only a contract violation
    /// (an unregistered tool name reaching the dispatcher) can error.
    pub async fn run(&self, mut state: WorkflowState) -> Result<AgentAnswer> {
        let mut node = Node::Prefetch;

        loop {
            debug!(node = ?node, iteration = state.iteration, "Workflow step");

            match node {
                Node::Prefetch => {
                    state = self.prefetch(state).await;
                    node = Node::Plan;
                }
                Node::Plan => {
                    state = self.plan(state).await?;
                    node = next_after_plan(&state);
                }
                Node::FetchAll => {
                    state = self.fetch_all(state).await;
                    node = Node::Answer;
                }
                Node::Answer => {
                    return Ok(self.answer(&state).await);
                }
            }
        }
    }

    async fn prefetch(&self, mut state: WorkflowState) -> WorkflowState {
        let fast = state.request.mode.is_fast();
        state.snapshot = self
            .loader
            .load(&state.request.user_id, fast)
            .await
            .map(Arc::new);
        state
    }

    async fn plan(&self, mut state: WorkflowState) -> Result<WorkflowState> {
        state.iteration += 1;

        let decision = self
            .planner
            .plan(
                &state.request.question,
                state.snapshot.is_some(),
                state.request.mode,
            )
            .await;

        let Some(plan) = decision else {
            return Ok(state);
        };

        if !plan.tool_calls.is_empty() {
            let results = self
                .toolbox
                .execute_plan(&plan, &state.request.user_id, state.snapshot.as_deref())
                .await?;
            state = absorb_results(state, results);
        }

        state.plan = Some(plan);
        Ok(state)
    }

    /// Unconditionally re-fetch the full snapshot and replace the working
    /// one. Always proceeds to Answer.
    async fn fetch_all(&self, mut state: WorkflowState) -> WorkflowState {
        let payload = self
            .toolbox
            .invoke(
                ToolKind::FetchEverything,
                &state.request.user_id,
                &serde_json::json!({}),
                None,
            )
            .await;

        match payload {
            Ok(payload) => {
                if let Ok(snapshot) = serde_json::from_value::<DataSnapshot>(payload) {
                    state.snapshot = Some(Arc::new(snapshot));
                }
            }
            Err(e) => {
                debug!(error = %e, "Fetch-all failed, keeping previous snapshot");
            }
        }

        state
    }

    async fn answer(&self, state: &WorkflowState) -> AgentAnswer {
        let input = SynthesisInput {
            question: &state.request.question,
            persona_id: &state.request.persona_id,
            current_page: &state.request.current_page,
            mode: state.request.mode,
            scenario: &state.scenario,
            snapshot: state.snapshot.as_deref(),
            tool_results: &state.tool_results,
        };

        self.synthesizer.synthesize(&input).await
    }
}

/// Merge tool results into the state. A fresh snapshot from
/// `fetch_everything` supersedes the working one.
fn absorb_results(
    mut state: WorkflowState,
    results: HashMap<String, ToolResult>,
) -> WorkflowState {
    if let Some(result) = results.get(ToolKind::FetchEverything.name()) {
        if result.error.is_none() {
            if let Ok(snapshot) = serde_json::from_value::<DataSnapshot>(result.payload.clone()) {
                state.snapshot = Some(Arc::new(snapshot));
            }
        }
    }

    state.tool_results.extend(results);
    state
}
