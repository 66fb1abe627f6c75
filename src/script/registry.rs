//! Script registration
//!
//! Compiles a builder context once: freezes the IR, validates every call,
//! pre-emits the Lua artifact for the external path and hashes it. The
//! compiled form is reused across executions and backends.

use std::sync::Arc;

use sha1::{Digest, Sha1};
use tracing::debug;

use crate::error::Result;
use crate::script::builder::FnContext;
use crate::script::lua::emit_lua;
use crate::script::plugin::PluginRegistry;
use crate::script::stmt::Script;

/// A registered script: frozen IR plus the emitted Lua and its hash
pub struct CompiledScript {
    script: Script,
    lua: String,
    sha: String,
    plugins: Arc<PluginRegistry>,
}

impl CompiledScript {
    /// The frozen IR
    pub(crate) fn ir(&self) -> &Script {
        &self.script
    }

    pub(crate) fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Declared key names, in registration order
    pub fn key_names(&self) -> &[String] {
        &self.script.keys
    }

    /// Declared argument names, in registration order
    pub fn arg_names(&self) -> &[String] {
        &self.script.args
    }

    /// The emitted Lua program
    pub fn lua(&self) -> &str {
        &self.lua
    }

    /// SHA1 of the emitted Lua, as sent with `EVALSHA`
    pub fn sha(&self) -> &str {
        &self.sha
    }
}

/// Compile a builder context against a plugin registry. All validation
/// happens here; execution never fails on an unknown op.
pub fn compile(ctx: &FnContext, plugins: Arc<PluginRegistry>) -> Result<CompiledScript> {
    let script = ctx.freeze()?;
    script.validate(&plugins)?;
    let lua = emit_lua(&script, &plugins)?;
    let sha = sha1_hex(&lua);
    debug!(
        sha = %sha,
        keys = script.keys.len(),
        args = script.args.len(),
        "registered script"
    );
    Ok(CompiledScript {
        script,
        lua,
        sha,
        plugins,
    })
}

/// Lowercase hex SHA1 of a script body
pub fn sha1_hex(text: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::Expr;
    use crate::script::objects::RedisVar;

    #[test]
    fn test_compile_hashes_deterministically() {
        let build = || {
            let ctx = FnContext::new();
            let key = ctx.add_key("k");
            let var = RedisVar::new(key);
            ctx.set_return_value(var.get());
            compile(&ctx, Arc::new(PluginRegistry::new())).unwrap()
        };
        let first = build();
        let second = build();
        assert_eq!(first.sha(), second.sha());
        assert_eq!(first.sha().len(), 40);
    }

    #[test]
    fn test_compile_rejects_bad_scripts() {
        let ctx = FnContext::new();
        ctx.root().stmt(Expr::redis_call("get", vec![]));
        assert!(compile(&ctx, Arc::new(PluginRegistry::new())).is_err());
    }

    #[test]
    fn test_sha1_known_vector() {
        // SHA1 of the empty string.
        assert_eq!(sha1_hex(""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }
}
