use financial_copilot::{
    llm::ScriptedLlm,
    models::{AgentRequest, AnswerMode},
    store::{InMemoryRecordStore, Table},
    workflow::Orchestrator,
};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Seed a demo user with enough records to exercise the whole pipeline.
async fn seed_demo_user(store: &InMemoryRecordStore, user_id: &str) {
    store
        .insert(
            Table::Accounts,
            json!({"id": "acc-checking", "user_id": user_id, "name": "Everyday Checking", "account_type": "checking", "balance": 2843.17}),
        )
        .await;
    store
        .insert(
            Table::Accounts,
            json!({"id": "acc-savings", "user_id": user_id, "name": "Rainy Day Savings", "account_type": "savings", "balance": 11250.00}),
        )
        .await;
    store
        .insert(
            Table::Goals,
            json!({"id": "goal-1", "user_id": user_id, "name": "Japan trip", "target_amount": 6000.0, "current_amount": 2100.0, "monthly_contribution": 250.0}),
        )
        .await;
    store
        .insert(
            Table::Transactions,
            json!({"id": "tx-1", "account_id": "acc-checking", "description": "Grocery run", "amount": -84.12, "category": "groceries", "occurred_at": "2026-08-03T16:21:00Z"}),
        )
        .await;
    store
        .insert(
            Table::Transactions,
            json!({"id": "tx-2", "account_id": "acc-checking", "description": "Payroll", "amount": 3100.0, "category": "income", "occurred_at": "2026-08-01T09:00:00Z"}),
        )
        .await;
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    info!("Financial copilot demo starting");

    let store = Arc::new(InMemoryRecordStore::new());
    seed_demo_user(&store, "demo-user").await;

    // Scripted model keeps the demo runnable without an API key.
    let llm = Arc::new(ScriptedLlm::canned(
        "You have $14,093.17 across two accounts: $2,843.17 in Everyday Checking and $11,250.00 in Rainy Day Savings.",
    ));

    let orchestrator = Orchestrator::new(store, llm);

    let request = AgentRequest {
        question: "What's my balance?".to_string(),
        user_id: "demo-user".to_string(),
        persona_id: "default".to_string(),
        current_page: "dashboard".to_string(),
        mode: AnswerMode::Hybrid,
        history: Vec::new(),
    };

    info!(question = %request.question, "Running orchestrator");

    let answer = orchestrator.handle(request).await;

    println!("\n=== AGENT ANSWER ===");
    println!("{}", answer.answer);
    if let Some(short) = answer.short_answer {
        println!("\n=== SHORT (VOICE) ===");
        println!("{}", short);
    }

    Ok(())
}
