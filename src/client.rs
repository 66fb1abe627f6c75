//! Public client facade
//!
//! One client type over both backends. Every command from the unified
//! surface has a single host-friendly signature here; scalar-versus-list
//! returns are decided by the argument shape (`lpop` vs `lpop_count`),
//! never by reply-type quirks. The configured prefix is prepended to every
//! key that leaves the client and stripped from every key that comes back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::external::ExternalBackend;
use crate::backend::memory::MemoryBackend;
use crate::backend::BackendHandle;
use crate::command::{Command, HashCommand, KeyCommand, ListCommand, SetCommand, StrCommand,
                     ZSetCommand};
use crate::config::Config;
use crate::error::{CommandError, Result};
use crate::pipeline::Pipeline;
use crate::script::builder::FnContext;
use crate::script::plugin::PluginRegistry;
use crate::script::registry::{self, CompiledScript};
use crate::storage::engine::{MemoryEngine, SetOptions};
use crate::value::Value;

/// A Redis-like client backed by the memory engine or a real server
pub struct Client {
    backend: BackendHandle,
    prefix: String,
}

impl Client {
    /// Construct a client for the given configuration.
    pub fn new(config: Config) -> Result<Client> {
        let prefix = config.prefix().to_string();
        let backend: BackendHandle = match &config {
            Config::Memory(_) => Arc::new(MemoryBackend::new(MemoryEngine::new())),
            Config::External(external) => Arc::new(ExternalBackend::connect(external)?),
        };
        Ok(Client { backend, prefix })
    }

    /// Shorthand for an in-process client without a namespace.
    pub fn memory() -> Client {
        Client {
            backend: Arc::new(MemoryBackend::new(MemoryEngine::new())),
            prefix: String::new(),
        }
    }

    fn full_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    fn strip(&self, key: String) -> Option<String> {
        strip_key(&self.prefix, key)
    }

    fn dispatch(&self, cmd: Command) -> Result<Value> {
        self.backend.dispatch(cmd)
    }

    // ----- strings -------------------------------------------------------

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.dispatch(Command::Str(StrCommand::Get {
            key: self.full_key(key),
        }))?
        .into_opt_string()
    }

    /// Plain SET; returns whether the write happened (always true without
    /// mode flags).
    pub fn set(&self, key: &str, value: &str) -> Result<bool> {
        self.dispatch(Command::Str(StrCommand::Set {
            key: self.full_key(key),
            value: value.to_string(),
            options: SetOptions::default(),
        }))?
        .into_bool()
    }

    /// SET with mode flags. With `return_previous` the result is the
    /// previous value or `Null`, otherwise the set indicator.
    pub fn set_opts(&self, key: &str, value: &str, options: SetOptions) -> Result<Value> {
        self.dispatch(Command::Str(StrCommand::Set {
            key: self.full_key(key),
            value: value.to_string(),
            options,
        }))
    }

    pub fn incr_by(&self, key: &str, delta: i64) -> Result<i64> {
        self.dispatch(Command::Str(StrCommand::IncrBy {
            key: self.full_key(key),
            delta,
        }))?
        .into_int()
    }

    // ----- lists ---------------------------------------------------------

    pub fn lpush(&self, key: &str, values: &[&str]) -> Result<i64> {
        self.dispatch(Command::List(ListCommand::LPush {
            key: self.full_key(key),
            values: owned(values),
        }))?
        .into_int()
    }

    pub fn rpush(&self, key: &str, values: &[&str]) -> Result<i64> {
        self.dispatch(Command::List(ListCommand::RPush {
            key: self.full_key(key),
            values: owned(values),
        }))?
        .into_int()
    }

    pub fn lpop(&self, key: &str) -> Result<Option<String>> {
        self.dispatch(Command::List(ListCommand::LPop {
            key: self.full_key(key),
            count: None,
        }))?
        .into_opt_string()
    }

    pub fn lpop_count(&self, key: &str, count: u64) -> Result<Vec<String>> {
        self.dispatch(Command::List(ListCommand::LPop {
            key: self.full_key(key),
            count: Some(count),
        }))?
        .into_string_list()
    }

    pub fn rpop(&self, key: &str) -> Result<Option<String>> {
        self.dispatch(Command::List(ListCommand::RPop {
            key: self.full_key(key),
            count: None,
        }))?
        .into_opt_string()
    }

    pub fn rpop_count(&self, key: &str, count: u64) -> Result<Vec<String>> {
        self.dispatch(Command::List(ListCommand::RPop {
            key: self.full_key(key),
            count: Some(count),
        }))?
        .into_string_list()
    }

    pub fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.dispatch(Command::List(ListCommand::LRange {
            key: self.full_key(key),
            start,
            stop,
        }))?
        .into_string_list()
    }

    pub fn llen(&self, key: &str) -> Result<i64> {
        self.dispatch(Command::List(ListCommand::LLen {
            key: self.full_key(key),
        }))?
        .into_int()
    }

    pub fn lindex(&self, key: &str, index: i64) -> Result<Option<String>> {
        self.dispatch(Command::List(ListCommand::LIndex {
            key: self.full_key(key),
            index,
        }))?
        .into_opt_string()
    }

    // ----- hashes --------------------------------------------------------

    pub fn hset(&self, key: &str, pairs: &[(&str, &str)]) -> Result<i64> {
        self.dispatch(Command::Hash(HashCommand::HSet {
            key: self.full_key(key),
            pairs: pairs
                .iter()
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .collect(),
        }))?
        .into_int()
    }

    pub fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.dispatch(Command::Hash(HashCommand::HGet {
            key: self.full_key(key),
            field: field.to_string(),
        }))?
        .into_opt_string()
    }

    pub fn hdel(&self, key: &str, fields: &[&str]) -> Result<i64> {
        self.dispatch(Command::Hash(HashCommand::HDel {
            key: self.full_key(key),
            fields: owned(fields),
        }))?
        .into_int()
    }

    pub fn hgetall(&self, key: &str) -> Result<BTreeMap<String, String>> {
        self.dispatch(Command::Hash(HashCommand::HGetAll {
            key: self.full_key(key),
        }))?
        .into_string_map()
    }

    pub fn hkeys(&self, key: &str) -> Result<Vec<String>> {
        self.dispatch(Command::Hash(HashCommand::HKeys {
            key: self.full_key(key),
        }))?
        .into_string_list()
    }

    pub fn hvals(&self, key: &str) -> Result<Vec<String>> {
        self.dispatch(Command::Hash(HashCommand::HVals {
            key: self.full_key(key),
        }))?
        .into_string_list()
    }

    pub fn hmget(&self, key: &str, fields: &[&str]) -> Result<Vec<Option<String>>> {
        self.dispatch(Command::Hash(HashCommand::HMGet {
            key: self.full_key(key),
            fields: owned(fields),
        }))?
        .into_opt_string_list()
    }

    pub fn hincr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        self.dispatch(Command::Hash(HashCommand::HIncrBy {
            key: self.full_key(key),
            field: field.to_string(),
            delta,
        }))?
        .into_int()
    }

    // ----- sets ----------------------------------------------------------

    pub fn sadd(&self, key: &str, members: &[&str]) -> Result<i64> {
        self.dispatch(Command::Set(SetCommand::SAdd {
            key: self.full_key(key),
            members: owned(members),
        }))?
        .into_int()
    }

    pub fn srem(&self, key: &str, members: &[&str]) -> Result<i64> {
        self.dispatch(Command::Set(SetCommand::SRem {
            key: self.full_key(key),
            members: owned(members),
        }))?
        .into_int()
    }

    pub fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        self.dispatch(Command::Set(SetCommand::SIsMember {
            key: self.full_key(key),
            member: member.to_string(),
        }))?
        .into_bool()
    }

    pub fn scard(&self, key: &str) -> Result<i64> {
        self.dispatch(Command::Set(SetCommand::SCard {
            key: self.full_key(key),
        }))?
        .into_int()
    }

    pub fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.dispatch(Command::Set(SetCommand::SMembers {
            key: self.full_key(key),
        }))?
        .into_string_list()
    }

    // ----- sorted sets ---------------------------------------------------

    pub fn zadd(&self, key: &str, score: f64, member: &str) -> Result<i64> {
        self.zadd_multi(key, &[(score, member)])
    }

    pub fn zadd_multi(&self, key: &str, pairs: &[(f64, &str)]) -> Result<i64> {
        self.dispatch(Command::ZSet(ZSetCommand::ZAdd {
            key: self.full_key(key),
            pairs: pairs
                .iter()
                .map(|(score, member)| (*score, member.to_string()))
                .collect(),
        }))?
        .into_int()
    }

    pub fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.dispatch(Command::ZSet(ZSetCommand::ZRange {
            key: self.full_key(key),
            start,
            stop,
        }))?
        .into_string_list()
    }

    pub fn zpop_min(&self, key: &str) -> Result<Option<(String, f64)>> {
        scored_pair_of(self.dispatch(Command::ZSet(ZSetCommand::ZPopMin {
            key: self.full_key(key),
            count: None,
        }))?)
    }

    pub fn zpop_min_count(&self, key: &str, count: u64) -> Result<Vec<(String, f64)>> {
        self.dispatch(Command::ZSet(ZSetCommand::ZPopMin {
            key: self.full_key(key),
            count: Some(count),
        }))?
        .into_scored_pairs()
    }

    pub fn zpop_max(&self, key: &str) -> Result<Option<(String, f64)>> {
        scored_pair_of(self.dispatch(Command::ZSet(ZSetCommand::ZPopMax {
            key: self.full_key(key),
            count: None,
        }))?)
    }

    pub fn zpop_max_count(&self, key: &str, count: u64) -> Result<Vec<(String, f64)>> {
        self.dispatch(Command::ZSet(ZSetCommand::ZPopMax {
            key: self.full_key(key),
            count: Some(count),
        }))?
        .into_scored_pairs()
    }

    pub fn zcard(&self, key: &str) -> Result<i64> {
        self.dispatch(Command::ZSet(ZSetCommand::ZCard {
            key: self.full_key(key),
        }))?
        .into_int()
    }

    pub fn zrem(&self, key: &str, members: &[&str]) -> Result<i64> {
        self.dispatch(Command::ZSet(ZSetCommand::ZRem {
            key: self.full_key(key),
            members: owned(members),
        }))?
        .into_int()
    }

    // ----- keys ----------------------------------------------------------

    pub fn del(&self, keys: &[&str]) -> Result<i64> {
        self.dispatch(Command::Key(KeyCommand::Del {
            keys: keys.iter().map(|key| self.full_key(key)).collect(),
        }))?
        .into_int()
    }

    pub fn exists(&self, keys: &[&str]) -> Result<i64> {
        self.dispatch(Command::Key(KeyCommand::Exists {
            keys: keys.iter().map(|key| self.full_key(key)).collect(),
        }))?
        .into_int()
    }

    /// TYPE reply name, `"none"` when the key is absent
    pub fn key_type(&self, key: &str) -> Result<String> {
        Ok(self
            .dispatch(Command::Key(KeyCommand::Type {
                key: self.full_key(key),
            }))?
            .into_opt_string()?
            .unwrap_or_else(|| "none".to_string()))
    }

    /// Keys matching a glob pattern, namespace-stripped
    pub fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let matched = self
            .dispatch(Command::Key(KeyCommand::Keys {
                pattern: join_key(&self.prefix, pattern),
            }))?
            .into_string_list()?;
        Ok(matched
            .into_iter()
            .filter_map(|key| self.strip(key))
            .collect())
    }

    /// One cursor step. Pass `"0"` to start; iteration is finished when the
    /// returned cursor is `"0"` again.
    pub fn scan(
        &self,
        cursor: &str,
        pattern: Option<&str>,
        count: Option<u64>,
    ) -> Result<(String, Vec<String>)> {
        let pattern = match pattern {
            Some(pattern) => Some(join_key(&self.prefix, pattern)),
            None if self.prefix.is_empty() => None,
            None => Some(join_key(&self.prefix, "*")),
        };
        let reply = self.dispatch(Command::Key(KeyCommand::Scan {
            cursor: cursor.to_string(),
            pattern,
            count,
        }))?;
        let mut items = match reply {
            Value::List(items) => items.into_iter(),
            other => {
                return Err(crate::error::RedirsError::Parse(format!(
                    "unexpected scan reply: {other:?}"
                )))
            }
        };
        let next = items
            .next()
            .map(Value::into_opt_string)
            .transpose()?
            .flatten()
            .unwrap_or_else(|| "0".to_string());
        let keys = items
            .next()
            .map(Value::into_string_list)
            .transpose()?
            .unwrap_or_default();
        Ok((
            next,
            keys.into_iter().filter_map(|key| self.strip(key)).collect(),
        ))
    }

    pub fn expire(&self, key: &str, seconds: i64) -> Result<bool> {
        self.dispatch(Command::Key(KeyCommand::Expire {
            key: self.full_key(key),
            seconds,
        }))?
        .into_bool()
    }

    pub fn pexpire(&self, key: &str, millis: i64) -> Result<bool> {
        self.dispatch(Command::Key(KeyCommand::PExpire {
            key: self.full_key(key),
            millis,
        }))?
        .into_bool()
    }

    pub fn expire_at(&self, key: &str, ts_seconds: i64) -> Result<bool> {
        self.dispatch(Command::Key(KeyCommand::ExpireAt {
            key: self.full_key(key),
            ts_seconds,
        }))?
        .into_bool()
    }

    pub fn pexpire_at(&self, key: &str, ts_millis: i64) -> Result<bool> {
        self.dispatch(Command::Key(KeyCommand::PExpireAt {
            key: self.full_key(key),
            ts_millis,
        }))?
        .into_bool()
    }

    pub fn persist(&self, key: &str) -> Result<bool> {
        self.dispatch(Command::Key(KeyCommand::Persist {
            key: self.full_key(key),
        }))?
        .into_bool()
    }

    /// Remaining TTL in seconds; -1 without expiry, -2 when absent
    pub fn ttl(&self, key: &str) -> Result<i64> {
        self.dispatch(Command::Key(KeyCommand::Ttl {
            key: self.full_key(key),
        }))?
        .into_int()
    }

    /// Remaining TTL in milliseconds; -1 without expiry, -2 when absent
    pub fn pttl(&self, key: &str) -> Result<i64> {
        self.dispatch(Command::Key(KeyCommand::PTtl {
            key: self.full_key(key),
        }))?
        .into_int()
    }

    /// Clear the whole database, prefixes included.
    pub fn flushall(&self) -> Result<()> {
        self.dispatch(Command::Key(KeyCommand::FlushAll))?;
        Ok(())
    }

    // ----- infrastructure ------------------------------------------------

    /// Backend liveness; always true for the memory engine.
    pub fn ping(&self) -> bool {
        self.backend.ping()
    }

    /// Drop server-side cached scripts (no-op on the memory backend).
    pub fn flush_scripts(&self) -> Result<()> {
        self.backend.flush_scripts()
    }

    /// Start an order-preserving command buffer.
    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(Arc::clone(&self.backend), self.prefix.clone())
    }

    /// Register a script built in `ctx`. Validation and Lua emission happen
    /// here; the returned handle is reusable across calls.
    pub fn register_script(&self, ctx: &FnContext) -> Result<RegisteredScript> {
        self.register_script_with(ctx, Arc::new(PluginRegistry::new()))
    }

    /// Register a script against an explicit plugin registry.
    pub fn register_script_with(
        &self,
        ctx: &FnContext,
        plugins: Arc<PluginRegistry>,
    ) -> Result<RegisteredScript> {
        let compiled = registry::compile(ctx, plugins)?;
        Ok(RegisteredScript {
            compiled: Arc::new(compiled),
            backend: Arc::clone(&self.backend),
            prefix: self.prefix.clone(),
        })
    }
}

/// A compiled script bound to a client's backend and namespace
pub struct RegisteredScript {
    compiled: Arc<CompiledScript>,
    backend: BackendHandle,
    prefix: String,
}

impl RegisteredScript {
    /// Run the script. Keys and arguments are addressed by their declared
    /// names; every declared name must be supplied and unknown names are
    /// rejected.
    pub fn run(&self, keys: &[(&str, &str)], args: &[(&str, Value)]) -> Result<Value> {
        let (keys, args) = self.bind(keys, args)?;
        self.backend.run_compiled(&self.compiled, keys, args)
    }

    /// The emitted Lua program (what a real server would execute)
    pub fn lua(&self) -> &str {
        self.compiled.lua()
    }

    /// SHA1 of the emitted program
    pub fn sha(&self) -> &str {
        self.compiled.sha()
    }

    pub(crate) fn compiled(&self) -> Arc<CompiledScript> {
        Arc::clone(&self.compiled)
    }

    /// Resolve named keys/args to the positional order of registration.
    pub(crate) fn bind(
        &self,
        keys: &[(&str, &str)],
        args: &[(&str, Value)],
    ) -> Result<(Vec<String>, Vec<Value>)> {
        let bound_keys = bind_named(self.compiled.key_names(), keys, "key", |value: &&str| {
            join_key(&self.prefix, value)
        })?;
        let bound_args = bind_named(self.compiled.arg_names(), args, "arg", |value: &Value| {
            value.clone()
        })?;
        Ok((bound_keys, bound_args))
    }
}

fn bind_named<T, O>(
    declared: &[String],
    provided: &[(&str, T)],
    what: &str,
    convert: impl Fn(&T) -> O,
) -> Result<Vec<O>> {
    for (name, _) in provided {
        if !declared.iter().any(|declared| declared == name) {
            return Err(CommandError::WrongNumberOfArgs(format!(
                "unknown script {what} '{name}'"
            ))
            .into());
        }
    }
    declared
        .iter()
        .map(|name| {
            let mut found = provided.iter().filter(|(provided, _)| provided == name);
            let value = found
                .next()
                .map(|(_, value)| convert(value))
                .ok_or_else(|| {
                    CommandError::WrongNumberOfArgs(format!("missing script {what} '{name}'"))
                })?;
            if found.next().is_some() {
                return Err(CommandError::WrongNumberOfArgs(format!(
                    "duplicate script {what} '{name}'"
                ))
                .into());
            }
            Ok(value)
        })
        .collect()
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn scored_pair_of(value: Value) -> Result<Option<(String, f64)>> {
    match value {
        Value::Null => Ok(None),
        pair => {
            let mut pairs = Value::List(vec![pair]).into_scored_pairs()?;
            Ok(pairs.pop())
        }
    }
}

/// Namespace join: an empty prefix leaves keys untouched.
pub(crate) fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}:{key}")
    }
}

/// Reverse of [`join_key`]; `None` for keys outside the namespace.
pub(crate) fn strip_key(prefix: &str, key: String) -> Option<String> {
    if prefix.is_empty() {
        Some(key)
    } else {
        key.strip_prefix(&format!("{prefix}:")).map(str::to_string)
    }
}

/// Shared [`Duration`] helper for SET expiries.
pub fn expire_in(duration: Duration) -> SetOptions {
    SetOptions {
        expire_in: Some(duration),
        ..Default::default()
    }
}
