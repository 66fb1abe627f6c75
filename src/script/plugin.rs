//! Plugin registry
//!
//! Plugins extend the script surface in two ways: new operations with an
//! interpreter implementation plus a Lua helper, and per-command emission
//! patches that replace a raw Redis call with a helper invocation. The
//! registry is builder-scoped and passed into registration; there is no
//! process-wide mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::storage::engine::EngineState;
use crate::value::Value;

/// Interpreter-side implementation of a plugin operation
pub type PluginFn = Arc<dyn Fn(&mut EngineState, &[Value]) -> Result<Value> + Send + Sync>;

/// A user-registered script operation
pub struct PluginOp {
    pub name: String,
    /// Exact number of call arguments
    pub arity: usize,
    /// Native implementation used by the interpreter
    pub run: PluginFn,
    /// Complete Lua `local function <helper_name>(...) ... end` text,
    /// emitted once per script that calls the op. The body must be
    /// self-contained; the emitter's own helpers are not guaranteed to be
    /// installed.
    pub lua_helper: String,
}

impl PluginOp {
    /// Name of the emitted Lua helper function for this op
    pub fn helper_name(&self) -> String {
        plugin_helper_name(&self.name)
    }
}

/// An emission patch addressed by Redis command name
#[derive(Debug, Clone)]
pub struct LuaPatch {
    /// Name of the helper function the call is rewritten to
    pub helper_name: String,
    /// Complete Lua `local function <helper_name>(...) ... end` text
    pub body: String,
}

/// Builder-scoped registry of plugin ops and emission patches
#[derive(Default)]
pub struct PluginRegistry {
    ops: HashMap<String, PluginOp>,
    patches: HashMap<String, LuaPatch>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        PluginRegistry::default()
    }

    /// Register a plugin operation. Replaces any previous op of the same
    /// name.
    pub fn register_op(&mut self, op: PluginOp) {
        self.ops.insert(op.name.clone(), op);
    }

    /// Register an emission patch for a Redis command name.
    pub fn register_patch(&mut self, command: &str, patch: LuaPatch) {
        self.patches.insert(command.to_string(), patch);
    }

    pub fn op(&self, name: &str) -> Option<&PluginOp> {
        self.ops.get(name)
    }

    pub fn patch(&self, command: &str) -> Option<&LuaPatch> {
        self.patches.get(command)
    }
}

/// Canonical Lua helper name for a plugin op
pub fn plugin_helper_name(op_name: &str) -> String {
    format!("redirs_plugin_{}", op_name.replace(|c: char| !c.is_ascii_alphanumeric(), "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PluginRegistry::new();
        registry.register_op(PluginOp {
            name: "double".to_string(),
            arity: 1,
            run: Arc::new(|_, args| {
                Ok(Value::Int(match args[0] {
                    Value::Int(n) => n * 2,
                    _ => 0,
                }))
            }),
            lua_helper: "local function redirs_plugin_double(x) return x * 2 end".to_string(),
        });

        assert!(registry.op("double").is_some());
        assert!(registry.op("triple").is_none());
        assert_eq!(registry.op("double").unwrap().helper_name(), "redirs_plugin_double");
    }

    #[test]
    fn test_patch_lookup() {
        let mut registry = PluginRegistry::new();
        registry.register_patch(
            "get",
            LuaPatch {
                helper_name: "redirs_patched_get".to_string(),
                body: "local function redirs_patched_get(k) return redis.call('GET', k) end"
                    .to_string(),
            },
        );
        assert!(registry.patch("get").is_some());
        assert!(registry.patch("set").is_none());
    }
}
