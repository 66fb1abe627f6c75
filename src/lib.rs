//! redirs
//!
//! A Redis-like key/value API backed by either a real Redis server or an
//! in-process memory engine, plus a symbolic script layer: scripts are
//! composed once against a builder API and run unchanged on both backends,
//! interpreted locally or lowered to Lua for `EVAL`.
//!
//! ```no_run
//! use redirs::{Client, FnContext, RedisList};
//!
//! let client = Client::memory();
//! client.rpush("queue", &["a", "b"]).unwrap();
//!
//! let ctx = FnContext::new();
//! let key = ctx.add_key("queue");
//! let list = RedisList::new(key);
//! ctx.set_return_value(list.lpop(None));
//!
//! let script = client.register_script(&ctx).unwrap();
//! let _head = script.run(&[("queue", "queue")], &[]).unwrap();
//! ```

pub mod backend;
pub mod client;
pub mod command;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod script;
pub mod storage;
pub mod value;

// Re-export commonly used types
pub use client::{Client, RegisteredScript};
pub use command::{Command, ReplyPolicy};
pub use config::{Config, ExternalConfig, MemoryConfig};
pub use error::{CommandError, RedirsError, Result};
pub use pipeline::Pipeline;
pub use script::{
    CodeBlock, Expr, FnContext, LuaPatch, PluginOp, PluginRegistry, RedisHash, RedisList,
    RedisSet, RedisVar, RedisZSet,
};
pub use storage::{MemoryEngine, SetMode, SetOptions};
pub use value::Value;
