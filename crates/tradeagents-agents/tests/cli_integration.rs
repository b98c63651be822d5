//! Integration tests that invoke the real Claude CLI.
//!
//! These tests are `#[ignore]` by default. They require:
//! - The `claude` CLI installed and on PATH
//! - Valid Anthropic credentials configured
//!
//! Run explicitly with:
//! ```bash
//! cargo test -p tradeagents-agents --test cli_integration -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tradeagents_agents::parser::parse_verdict;
use tradeagents_agents::stage::roles;
use tradeagents_agents::{
    AgentError, ClaudeCliInvoker, GatedInvoker, Judge, LlmInvoker, LlmJudge, LlmRequest,
};
use tradeagents_models::{DebateKind, MarketCategory, MarketContext, SharedState};

const MODEL: &str = "claude-3-5-haiku-latest";

/// Verify the Claude CLI is installed and responds to --version.
#[tokio::test]
#[ignore]
async fn cli_is_available() {
    assert!(
        ClaudeCliInvoker::is_available().await,
        "claude CLI not found on PATH; install it from https://docs.anthropic.com/en/docs/claude-code"
    );
}

/// Ask for a verdict and check the tolerant parser accepts whatever the
/// CLI wraps it in. Catches output-format changes before they reach a run.
#[tokio::test]
#[ignore]
async fn cli_verdict_is_parseable() {
    if !ClaudeCliInvoker::is_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let invoker = ClaudeCliInvoker::new(Duration::from_secs(30));
    let system_prompt = concat!(
        "You are a test judge. Respond ONLY with a JSON object, no other text.\n",
        "The JSON must be exactly: {\"decision\": \"HOLD\"}\n",
    );

    let raw = invoker
        .invoke(LlmRequest {
            stage: roles::RESEARCH_JUDGE,
            model: MODEL,
            system_prompt,
            user_prompt: "decide",
        })
        .await
        .expect("Claude CLI invocation failed");

    let verdict = parse_verdict(&raw).unwrap_or_else(|e| {
        panic!(
            "Failed to parse verdict from CLI output ({e}).\n\
             This likely means the CLI output format has changed.\n\
             Raw output:\n---\n{raw}\n---"
        )
    });
    assert_eq!(verdict.as_deref(), Some("HOLD"));
}

/// A forced judge over the real CLI must return a decision.
#[tokio::test]
#[ignore]
async fn forced_judge_decides() {
    if !ClaudeCliInvoker::is_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let invoker = Arc::new(GatedInvoker::new(
        Arc::new(ClaudeCliInvoker::new(Duration::from_secs(60))),
        1,
    ));
    let judge = LlmJudge::new(roles::RESEARCH_JUDGE, DebateKind::Research, MODEL, invoker);
    let state = SharedState::new(
        "AAPL",
        NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        MarketContext::for_category(MarketCategory::UsEquity),
    );

    let decision = judge.force(&state.view()).await.expect("forced judge failed");
    assert!(!decision.trim().is_empty());
}

/// An invalid model makes the CLI exit non-zero; the error names the stage
/// and the model.
#[tokio::test]
#[ignore]
async fn cli_reports_errors_for_invalid_model() {
    if !ClaudeCliInvoker::is_available().await {
        eprintln!("Skipping: claude CLI not available");
        return;
    }

    let invoker = ClaudeCliInvoker::new(Duration::from_secs(15));
    let result = invoker
        .invoke(LlmRequest {
            stage: roles::TRADER,
            model: "nonexistent-model-12345",
            system_prompt: "You are a test.",
            user_prompt: "hello",
        })
        .await;

    match result {
        Err(AgentError::Cli(message)) => {
            assert!(message.starts_with(roles::TRADER), "{message}");
            assert!(message.contains("nonexistent-model-12345"), "{message}");
        }
        other => panic!("Expected a CLI error for an invalid model, got: {other:?}"),
    }
}
