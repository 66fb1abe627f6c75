//! Symbolic script layer
//!
//! Scripts are written once against the builder API and run unchanged on
//! both backends: the interpreter executes the IR directly against the
//! memory engine, the emitter lowers it to Lua for a real server.

pub mod builder;
pub mod expr;
pub mod interpreter;
pub mod lua;
pub mod objects;
pub mod plugin;
pub mod registry;
pub mod stmt;

pub use builder::{ArgHandle, CodeBlock, FnContext, KeyHandle, LocalHandle};
pub use expr::{BinOp, CallKind, CmpOp, Expr, LogicOp, UnOp};
pub use objects::{RedisHash, RedisList, RedisSet, RedisVar, RedisZSet};
pub use plugin::{LuaPatch, PluginFn, PluginOp, PluginRegistry};
pub use registry::CompiledScript;
pub use stmt::{Block, Script, Stmt};
