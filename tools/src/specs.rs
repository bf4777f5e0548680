//! `ToolSpec` constructors for the built-in and intercepted tools, fed into
//! a [`SpecRegistry`] at session start (spec §4.5, §4.7.2.d).

use conduit_types::{ParamSpec, ParameterSchema, ToolSpec};

use crate::registry::SpecRegistry;

fn param(name: &str, type_name: &str, description: &str, required: bool) -> ParamSpec {
    ParamSpec { name: name.to_string(), type_name: type_name.to_string(), description: description.to_string(), required, items: None }
}

fn flat(params: Vec<ParamSpec>) -> ParameterSchema {
    ParameterSchema::Flat(params)
}

fn shell_spec() -> ToolSpec {
    ToolSpec {
        name: "shell".to_string(),
        description: "Runs a command and its arguments as a subprocess.".to_string(),
        parameter_schema: flat(vec![param("command", "array", "argv to execute", true)]),
        default_timeout_ms: 45_000,
        raw_json_schema: None,
    }
}

fn apply_patch_spec() -> ToolSpec {
    ToolSpec {
        name: "apply_patch".to_string(),
        description: "Applies a patch envelope (add/delete/update file hunks) to the working tree.".to_string(),
        parameter_schema: flat(vec![param("input", "string", "the full patch envelope text", true)]),
        default_timeout_ms: 10_000,
        raw_json_schema: None,
    }
}

fn read_file_spec() -> ToolSpec {
    ToolSpec {
        name: "read_file".to_string(),
        description: "Reads a UTF-8 text file, truncated past a byte cap.".to_string(),
        parameter_schema: flat(vec![param("path", "string", "path relative to the working directory", true)]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn list_dir_spec() -> ToolSpec {
    ToolSpec {
        name: "list_dir".to_string(),
        description: "Lists the entries of a directory, one per line, directories suffixed with '/'.".to_string(),
        parameter_schema: flat(vec![param("path", "string", "path relative to the working directory", false)]),
        default_timeout_ms: 5_000,
        raw_json_schema: None,
    }
}

fn update_plan_spec() -> ToolSpec {
    ToolSpec {
        name: "update_plan".to_string(),
        description: "Replaces the current step-by-step plan shown to the user.".to_string(),
        parameter_schema: flat(vec![param("steps", "array", "ordered list of {step, status} entries", true)]),
        default_timeout_ms: 1_000,
        raw_json_schema: None,
    }
}

/// Registers the specs for every built-in handler plus the `update_plan`
/// intercepted tool, which has a spec but no [`crate::handler::ToolHandler`].
pub fn register_all(registry: &mut SpecRegistry) {
    registry.register("shell", shell_spec);
    registry.register("apply_patch", apply_patch_spec);
    registry.register("read_file", read_file_spec);
    registry.register("list_dir", list_dir_spec);
    registry.register("update_plan", update_plan_spec);
}
