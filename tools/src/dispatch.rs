//! Parallel dispatch with read/write gating (spec §4.5).
//!
//! Realized as the wave scheduler Design Notes §9 prefers over a raw
//! `RwLock`: wave one runs every non-mutating call of the batch
//! concurrently; wave two runs each mutating call serially. This keeps
//! P10 ("if any mutating tool is running, no other tool is running on the
//! same session") true by construction and easy to trace in a
//! deterministic log, rather than relying on lock-acquisition order.

use std::sync::Arc;

use conduit_types::{CallId, ToolInvocation, ToolOutput};

use crate::handler::{ToolError, ToolHandler};
use crate::registry::ToolRegistry;

/// Runs one batch of function calls (everything the LLM returned in a
/// single response) against `registry`, preserving the original call
/// order in the returned vector (spec §4.5, P9).
///
/// A call whose tool has no registered handler is an infrastructure
/// error: it resolves immediately to an output carrying the error message
/// as `content` with `success` left unset (spec §7's "infrastructure
/// error" case — [`conduit_types::ToolOutput`] has no separate `error`
/// field, so the message is carried in `content`; see DESIGN.md).
pub async fn dispatch_batch(registry: &ToolRegistry, invocations: &[ToolInvocation]) -> Vec<(CallId, ToolOutput)> {
    let n = invocations.len();
    let mut results: Vec<Option<(CallId, ToolOutput)>> = (0..n).map(|_| None).collect();
    let mut non_mutating = Vec::new();
    let mut mutating = Vec::new();

    for (i, invocation) in invocations.iter().enumerate() {
        match registry.get(&invocation.tool_name) {
            Some(handler) => {
                if handler.is_mutating(invocation) {
                    mutating.push((i, handler));
                } else {
                    non_mutating.push((i, handler));
                }
            }
            None => {
                results[i] = Some((
                    invocation.call_id.clone(),
                    ToolOutput { content: format!("no handler registered for tool '{}'", invocation.tool_name), success: None },
                ));
            }
        }
    }

    let wave_one = non_mutating.into_iter().map(|(i, handler)| {
        let invocation = &invocations[i];
        async move { (i, invocation.call_id.clone(), run_handler(&handler, invocation).await) }
    });
    for (i, call_id, output) in futures_util::future::join_all(wave_one).await {
        results[i] = Some((call_id, output));
    }

    for (i, handler) in mutating {
        let invocation = &invocations[i];
        let output = run_handler(&handler, invocation).await;
        results[i] = Some((invocation.call_id.clone(), output));
    }

    results.into_iter().map(|slot| slot.expect("every batch index is resolved by exactly one wave")).collect()
}

async fn run_handler(handler: &Arc<dyn ToolHandler>, invocation: &ToolInvocation) -> ToolOutput {
    match handler.handle(invocation).await {
        Ok(output) => output,
        Err(ToolError(message)) => ToolOutput::failed(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandleFut, ToolKind};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct Recorder {
        name: String,
        mutating: bool,
        concurrent: Arc<AtomicUsize>,
        any_mutating_running: Arc<AtomicBool>,
        violation: Arc<AtomicBool>,
        delay: Duration,
    }

    impl ToolHandler for Recorder {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> ToolKind {
            ToolKind::Function
        }
        fn is_mutating(&self, _invocation: &ToolInvocation) -> bool {
            self.mutating
        }
        fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a> {
            Box::pin(async move {
                self.concurrent.fetch_add(1, Ordering::SeqCst);
                if self.mutating {
                    self.any_mutating_running.store(true, Ordering::SeqCst);
                } else if self.any_mutating_running.load(Ordering::SeqCst) {
                    self.violation.store(true, Ordering::SeqCst);
                }
                tokio::time::sleep(self.delay).await;
                if self.mutating {
                    self.any_mutating_running.store(false, Ordering::SeqCst);
                }
                self.concurrent.fetch_sub(1, Ordering::SeqCst);
                Ok(ToolOutput::ok(format!("ran {}", invocation.call_id.as_str())))
            })
        }
    }

    fn invocation(call_id: &str, tool_name: &str) -> ToolInvocation {
        ToolInvocation {
            call_id: CallId::new(call_id).unwrap(),
            tool_name: tool_name.to_string(),
            arguments: HashMap::new(),
            cwd: None,
            sandbox_policy: None,
            env_policy: None,
            session_id: None,
            mcp_ref: None,
            heartbeat: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn p9_output_order_matches_original_call_index() {
        let mut registry = ToolRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(Arc::new(Recorder {
                name: name.to_string(),
                mutating: false,
                concurrent: Arc::new(AtomicUsize::new(0)),
                any_mutating_running: Arc::new(AtomicBool::new(false)),
                violation: Arc::new(AtomicBool::new(false)),
                delay: Duration::from_millis(1),
            }));
        }
        let batch = vec![invocation("1", "c"), invocation("2", "a"), invocation("3", "b")];
        let results = dispatch_batch(&registry, &batch).await;
        let ids: Vec<&str> = results.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn s5_non_mutating_runs_before_mutating_waits_for_it() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let any_mutating_running = Arc::new(AtomicBool::new(false));
        let violation = Arc::new(AtomicBool::new(false));

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Recorder {
            name: "ls".to_string(),
            mutating: false,
            concurrent: concurrent.clone(),
            any_mutating_running: any_mutating_running.clone(),
            violation: violation.clone(),
            delay: Duration::from_millis(20),
        }));
        registry.register(Arc::new(Recorder {
            name: "apply_patch".to_string(),
            mutating: true,
            concurrent: concurrent.clone(),
            any_mutating_running: any_mutating_running.clone(),
            violation: violation.clone(),
            delay: Duration::from_millis(5),
        }));

        let batch = vec![invocation("1", "ls"), invocation("2", "apply_patch")];
        let results = dispatch_batch(&registry, &batch).await;

        assert!(!violation.load(Ordering::SeqCst), "mutating and non-mutating overlapped");
        assert_eq!(results[0].0.as_str(), "1");
        assert_eq!(results[1].0.as_str(), "2");
    }

    #[tokio::test]
    async fn p10_two_mutating_calls_never_run_concurrently() {
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        struct MaxTrackingRecorder {
            concurrent: Arc<AtomicUsize>,
            max_concurrent: Arc<AtomicUsize>,
        }
        impl ToolHandler for MaxTrackingRecorder {
            fn name(&self) -> &str {
                "mutate"
            }
            fn kind(&self) -> ToolKind {
                ToolKind::Function
            }
            fn is_mutating(&self, _invocation: &ToolInvocation) -> bool {
                true
            }
            fn handle<'a>(&'a self, invocation: &'a ToolInvocation) -> HandleFut<'a> {
                Box::pin(async move {
                    let now = self.concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_concurrent.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    self.concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok(ToolOutput::ok(invocation.call_id.as_str().to_string()))
                })
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(MaxTrackingRecorder { concurrent: concurrent.clone(), max_concurrent: max_concurrent.clone() }));

        let batch = vec![invocation("1", "mutate"), invocation("2", "mutate"), invocation("3", "mutate")];
        dispatch_batch(&registry, &batch).await;

        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_handler_yields_infrastructure_error_with_unset_success() {
        let registry = ToolRegistry::new();
        let batch = vec![invocation("1", "no_such_tool")];
        let results = dispatch_batch(&registry, &batch).await;
        assert_eq!(results[0].1.success, None);
        assert!(results[0].1.content.contains("no_such_tool"));
    }
}
