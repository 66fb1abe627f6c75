//! Backend dispatch
//!
//! A backend executes the unified command set and runs compiled scripts.
//! The memory backend applies commands to the in-process engine; the
//! external backend forwards them to a real Redis server.

pub mod external;
pub mod memory;

use std::sync::Arc;

use crate::command::Command;
use crate::error::Result;
use crate::script::registry::CompiledScript;
use crate::value::Value;

/// One queued pipeline slot
pub enum BatchEntry {
    Cmd(Command),
    Script {
        compiled: Arc<CompiledScript>,
        keys: Vec<String>,
        args: Vec<Value>,
    },
}

/// Uniform interface over the memory and external backends
pub trait Backend: Send + Sync {
    /// Execute one direct command as a single atomic step.
    fn dispatch(&self, cmd: Command) -> Result<Value>;

    /// Run a compiled script with resolved key names and argument values.
    /// The returned value is boundary-canonicalized.
    fn run_compiled(
        &self,
        script: &CompiledScript,
        keys: Vec<String>,
        args: Vec<Value>,
    ) -> Result<Value>;

    /// Flush a pipeline buffer. Results align with the entries; a failed
    /// slot records its error and later slots still run. The memory
    /// backend runs the whole batch as one atomic step; the external
    /// backend inherits Redis's non-transactional pipeline semantics.
    fn run_batch(&self, entries: Vec<BatchEntry>) -> Vec<Result<Value>> {
        entries
            .into_iter()
            .map(|entry| match entry {
                BatchEntry::Cmd(cmd) => self.dispatch(cmd),
                BatchEntry::Script {
                    compiled,
                    keys,
                    args,
                } => self.run_compiled(&compiled, keys, args),
            })
            .collect()
    }

    /// Liveness check. The memory backend is always live.
    fn ping(&self) -> bool;

    /// Drop any server-side script cache entries.
    fn flush_scripts(&self) -> Result<()>;
}

/// Shared backend handle
pub type BackendHandle = Arc<dyn Backend>;
