//! `conduit` binary entry point: resolves `${CODEX_HOME}`, loads
//! `config.toml`, discovers developer instructions, wires a provider, an
//! exec policy, a tool registry and a stdin-driven approval sink into one
//! [`conduit_engine::Session`], and runs a single turn.

mod config;
mod crash_hardening;
mod instructions;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use conduit_engine::{
    ApprovalReceiver, ChannelApprovalSink, NullMcpBridge, QuestionReceiver, Session, SessionConfig, cancel_pair,
    register_agent_specs, run_turn,
};
use conduit_exec::ExecPolicy;
use conduit_providers::{ClaudeProvider, GeminiProvider, LlmProvider, MockProvider, OpenAiProvider, WebSearchMode};
use conduit_tools::{SpecRegistry, ToolRegistry};
use conduit_types::{ApprovalMode, ConversationItem};

use config::{Config, ExecConfig};

const BASE_INSTRUCTIONS: &str = "You are a careful coding agent operating inside a user's repository. \
Use the tools available to you, ask for approval when the policy requires it, and prefer small, correct changes.";

const DEFAULT_ENABLED_TOOLS: &[&str] =
    &["shell", "apply_patch", "read_file", "list_dir", "update_plan", "collab", "request_user_input"];

#[derive(Parser)]
#[command(name = "conduit", about = "Durable agent harness")]
struct Args {
    /// The user message to send. Read from stdin if omitted.
    message: Option<String>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn resolve_codex_home() -> PathBuf {
    if let Ok(raw) = std::env::var("CODEX_HOME") {
        return PathBuf::from(raw);
    }
    dirs::home_dir().map(|home| home.join(".codex")).unwrap_or_else(|| PathBuf::from(".codex"))
}

fn api_key_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|key| !key.is_empty())
}

fn build_provider(config: &Config) -> Arc<dyn LlmProvider> {
    match config.provider.kind.as_str() {
        "openai" => match api_key_from_env("OPENAI_API_KEY") {
            Some(key) => Arc::new(OpenAiProvider::new(key)) as Arc<dyn LlmProvider>,
            None => {
                tracing::warn!("provider.kind is \"openai\" but OPENAI_API_KEY is unset; falling back to mock");
                Arc::new(MockProvider::empty())
            }
        },
        "claude" => match api_key_from_env("ANTHROPIC_API_KEY") {
            Some(key) => Arc::new(ClaudeProvider::new(key)) as Arc<dyn LlmProvider>,
            None => {
                tracing::warn!("provider.kind is \"claude\" but ANTHROPIC_API_KEY is unset; falling back to mock");
                Arc::new(MockProvider::empty())
            }
        },
        "gemini" => match api_key_from_env("GEMINI_API_KEY") {
            Some(key) => Arc::new(GeminiProvider::new(key)) as Arc<dyn LlmProvider>,
            None => {
                tracing::warn!("provider.kind is \"gemini\" but GEMINI_API_KEY is unset; falling back to mock");
                Arc::new(MockProvider::empty())
            }
        },
        "mock" => Arc::new(MockProvider::empty()),
        other => {
            tracing::warn!(kind = other, "unknown provider.kind, falling back to mock");
            Arc::new(MockProvider::empty())
        }
    }
}

/// `ExecPolicy::load` only ever reads `{codex_home}/rules`; a custom
/// `exec.rules_dir` in `config.toml` is accepted but not yet wired past
/// that, so a mismatch just gets a warning rather than silently being
/// honored or rejected.
fn load_policy(codex_home: &Path, exec_config: &ExecConfig) -> Arc<ExecPolicy> {
    let resolved = exec_config.resolve(codex_home);
    if resolved != codex_home.join("rules") {
        tracing::warn!(
            configured = %resolved.display(),
            "a custom exec.rules_dir is configured, but only {{codex_home}}/rules is currently loaded"
        );
    }

    match ExecPolicy::load(codex_home) {
        Ok(policy) => Arc::new(policy),
        Err(err) => {
            tracing::warn!(error = %err, "failed to load exec policy rules, starting with an empty policy");
            Arc::new(ExecPolicy::empty())
        }
    }
}

/// Reads questions and approval requests off the channels a
/// [`ChannelApprovalSink`] feeds, and prompts on stdin/stdout for each.
/// Exits once both channels are closed (the session that owns the sink was
/// dropped).
async fn run_approval_prompts(mut approvals: ApprovalReceiver, mut questions: QuestionReceiver) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            next = approvals.recv() => {
                let Some((request, reply)) = next else { break };
                println!("\napproval requested for `{}`: {}", request.tool_name, request.description);
                if let Some(justification) = &request.justification {
                    println!("  justification: {justification}");
                }
                print!("allow? [y/N] ");
                let _ = std::io::Write::flush(&mut std::io::stdout());
                let approved = matches!(lines.next_line().await, Ok(Some(line)) if line.trim().eq_ignore_ascii_case("y"));
                let _ = reply.send(approved);
            }
            next = questions.recv() => {
                let Some((_call_id, batch, reply)) = next else { break };
                let mut answers = HashMap::new();
                for question in &batch {
                    println!("\n{}", question.prompt);
                    print!("> ");
                    let _ = std::io::Write::flush(&mut std::io::stdout());
                    let answer = lines.next_line().await.ok().flatten().unwrap_or_default();
                    answers.insert(question.id.clone(), answer);
                }
                let _ = reply.send(answers);
            }
            else => break,
        }
    }
}

async fn read_stdin_message() -> Result<String> {
    let mut buf = String::new();
    tokio::io::stdin().read_to_string(&mut buf).await?;
    Ok(buf.trim().to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    crash_hardening::apply()?;

    let args = Args::parse();
    let codex_home = resolve_codex_home();
    let config = config::load(&codex_home);

    let cwd = std::env::current_dir().ok();
    let developer_instructions = instructions::load_developer_instructions(cwd.as_deref().unwrap_or_else(|| Path::new(".")), &codex_home);

    let provider = build_provider(&config);
    let approval_mode = ApprovalMode::parse(&config.approval.mode);
    let policy = load_policy(&codex_home, &config.exec);

    let mut tools = ToolRegistry::new();
    conduit_tools::builtins::register_all(&mut tools);

    let mut specs = SpecRegistry::new();
    conduit_tools::specs::register_all(&mut specs);
    register_agent_specs(&mut specs);

    let (approval_sink, approvals_rx, questions_rx) = ChannelApprovalSink::new();
    tokio::spawn(run_approval_prompts(approvals_rx, questions_rx));

    let session_config = SessionConfig {
        model: config.provider.model.clone(),
        base_instructions: BASE_INSTRUCTIONS.to_string(),
        developer_instructions,
        user_instructions: String::new(),
        web_search_mode: WebSearchMode::Off,
        approval_mode,
        cwd: cwd.map(|p| p.display().to_string()),
        enabled_tools: DEFAULT_ENABLED_TOOLS.iter().map(|s| (*s).to_string()).collect(),
        temperature: None,
        max_output_tokens: None,
        reasoning_effort: None,
    };

    let mut session = Session::new(
        session_config,
        provider,
        Arc::new(tools),
        Arc::new(specs),
        policy,
        Arc::new(approval_sink),
        Arc::new(NullMcpBridge),
    );

    let message = match args.message {
        Some(message) => message,
        None => read_stdin_message().await?,
    };

    let (cancel_handle, cancel_token) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_handle.cancel();
        }
    });

    run_turn(&mut session, message, cancel_token).await?;

    for item in &session.history {
        if let ConversationItem::AssistantMessage { content } = item {
            println!("{content}");
        }
    }

    Ok(())
}
