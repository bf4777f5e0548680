//! `ToolSpec` constructors for the sub-agent control tools and
//! `request_user_input` (spec §4.7.4, §4.7.3). `conduit_tools::specs`
//! covers `shell`/`apply_patch`/`read_file`/`list_dir`/`update_plan`;
//! these six have no [`conduit_tools::ToolHandler`] either, since they
//! are answered by [`crate::intercepted::dispatch`] rather than the
//! registry, but still need a spec advertised to the model.

use conduit_types::{ParamSpec, ParameterSchema, ToolSpec};
use conduit_tools::SpecRegistry;

fn param(name: &str, type_name: &str, description: &str, required: bool) -> ParamSpec {
    ParamSpec { name: name.to_string(), type_name: type_name.to_string(), description: description.to_string(), required, items: None }
}

fn flat(params: Vec<ParamSpec>) -> ParameterSchema {
    ParameterSchema::Flat(params)
}

fn spawn_agent_spec() -> ToolSpec {
    ToolSpec {
        name: "spawn_agent".to_string(),
        description: "Spawns a sub-agent session with its own history, running a task concurrently.".to_string(),
        parameter_schema: flat(vec![
            param("agent_type", "string", "one of explorer, worker, orchestrator, default", true),
            param("task", "string", "the initial task given to the new agent", true),
            param("enabled_tools", "array", "tool names (or group names) to enable; defaults to the parent's set", false),
        ]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn send_input_spec() -> ToolSpec {
    ToolSpec {
        name: "send_input".to_string(),
        description: "Queues a message for a running sub-agent, optionally cancelling its current turn first.".to_string(),
        parameter_schema: flat(vec![
            param("agent_id", "string", "the agent to message", true),
            param("message", "string", "the message to deliver", true),
            param("interrupt", "boolean", "cancel the agent's in-flight turn before delivering", false),
        ]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn wait_spec() -> ToolSpec {
    ToolSpec {
        name: "wait".to_string(),
        description: "Blocks until any of the given sub-agents reaches a final status or the timeout elapses.".to_string(),
        parameter_schema: flat(vec![
            param("agent_ids", "array", "agents to wait on", true),
            param("timeout_ms", "integer", "clamped to [10000, 300000]; defaults to 30000", false),
        ]),
        default_timeout_ms: 300_000,
        raw_json_schema: None,
    }
}

fn close_agent_spec() -> ToolSpec {
    ToolSpec {
        name: "close_agent".to_string(),
        description: "Marks a sub-agent closed, rejecting further send_input until resume_agent re-enables it.".to_string(),
        parameter_schema: flat(vec![param("agent_id", "string", "the agent to close", true)]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn resume_agent_spec() -> ToolSpec {
    ToolSpec {
        name: "resume_agent".to_string(),
        description: "Re-enables a previously closed sub-agent.".to_string(),
        parameter_schema: flat(vec![param("agent_id", "string", "the agent to resume", true)]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn request_user_input_spec() -> ToolSpec {
    ToolSpec {
        name: "request_user_input".to_string(),
        description: "Freezes the turn and asks the user one or more questions, resuming once answers arrive.".to_string(),
        parameter_schema: flat(vec![param("questions", "array", "ordered list of {id, prompt, options?} entries", true)]),
        default_timeout_ms: 300_000,
        raw_json_schema: None,
    }
}

/// Registers specs for the six intercepted tools `conduit_tools::specs`
/// doesn't cover.
pub fn register_agent_specs(registry: &mut SpecRegistry) {
    registry.register("spawn_agent", spawn_agent_spec);
    registry.register("send_input", send_input_spec);
    registry.register("wait", wait_spec);
    registry.register("close_agent", close_agent_spec);
    registry.register("resume_agent", resume_agent_spec);
    registry.register("request_user_input", request_user_input_spec);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_six_specs_resolve_and_have_no_handlers() {
        let mut specs = SpecRegistry::new();
        register_agent_specs(&mut specs);
        let names = ["spawn_agent", "send_input", "wait", "close_agent", "resume_agent", "request_user_input"];
        let resolved = specs.resolve(&names.iter().map(|s| (*s).to_string()).collect::<Vec<_>>());
        assert_eq!(resolved.len(), names.len());

        let handlers = conduit_tools::ToolRegistry::new();
        for name in names {
            assert!(!handlers.contains(name));
        }
    }
}
