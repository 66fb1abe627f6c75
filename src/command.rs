//! Unified command layer
//!
//! The single source of truth for the supported Redis operations. Direct
//! client calls, script calls resolved by the interpreter, and the Lua
//! emitter all go through the same table, so a command has exactly one
//! host-facing semantics regardless of how it is reached.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::error::{CommandError, Result};
use crate::storage::engine::SetOptions;
use crate::value::Value;

/// Top-level command categories
#[derive(Debug, Clone)]
pub enum Command {
    Str(StrCommand),
    List(ListCommand),
    Hash(HashCommand),
    Set(SetCommand),
    ZSet(ZSetCommand),
    Key(KeyCommand),
}

/// String commands
#[derive(Debug, Clone)]
pub enum StrCommand {
    Set {
        key: String,
        value: String,
        options: SetOptions,
    },
    Get {
        key: String,
    },
    IncrBy {
        key: String,
        delta: i64,
    },
}

/// List commands
#[derive(Debug, Clone)]
pub enum ListCommand {
    LPush { key: String, values: Vec<String> },
    RPush { key: String, values: Vec<String> },
    LPop { key: String, count: Option<u64> },
    RPop { key: String, count: Option<u64> },
    LRange { key: String, start: i64, stop: i64 },
    LLen { key: String },
    LIndex { key: String, index: i64 },
}

/// Hash commands
#[derive(Debug, Clone)]
pub enum HashCommand {
    HSet {
        key: String,
        pairs: Vec<(String, String)>,
    },
    HGet {
        key: String,
        field: String,
    },
    HDel {
        key: String,
        fields: Vec<String>,
    },
    HGetAll {
        key: String,
    },
    HKeys {
        key: String,
    },
    HVals {
        key: String,
    },
    HMGet {
        key: String,
        fields: Vec<String>,
    },
    HIncrBy {
        key: String,
        field: String,
        delta: i64,
    },
}

/// Set commands
#[derive(Debug, Clone)]
pub enum SetCommand {
    SAdd { key: String, members: Vec<String> },
    SRem { key: String, members: Vec<String> },
    SIsMember { key: String, member: String },
    SCard { key: String },
    SMembers { key: String },
}

/// Sorted set commands
#[derive(Debug, Clone)]
pub enum ZSetCommand {
    ZAdd {
        key: String,
        pairs: Vec<(f64, String)>,
    },
    ZRange {
        key: String,
        start: i64,
        stop: i64,
    },
    ZPopMin {
        key: String,
        count: Option<u64>,
    },
    ZPopMax {
        key: String,
        count: Option<u64>,
    },
    ZCard {
        key: String,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
}

/// Key lifecycle commands
#[derive(Debug, Clone)]
pub enum KeyCommand {
    Del { keys: Vec<String> },
    Exists { keys: Vec<String> },
    Type { key: String },
    Keys { pattern: String },
    Scan {
        cursor: String,
        pattern: Option<String>,
        count: Option<u64>,
    },
    Expire { key: String, seconds: i64 },
    PExpire { key: String, millis: i64 },
    ExpireAt { key: String, ts_seconds: i64 },
    PExpireAt { key: String, ts_millis: i64 },
    Persist { key: String },
    Ttl { key: String },
    PTtl { key: String },
    FlushAll,
}

/// How a raw Redis reply for a command maps back into [`Value`]. The Lua
/// emitter consults the same policy to repair `false`-for-missing replies
/// and reshape flat pair arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyPolicy {
    /// Status reply, discarded (`Null`)
    Ok,
    /// Integer reply
    Int,
    /// 0/1 integer reply surfaced as a boolean
    Bool,
    /// Bulk string or missing (`Null`, never `false`)
    OptString,
    /// Array of strings
    StrList,
    /// Array of string-or-missing slots
    OptStrList,
    /// Flat field/value array surfaced as a map
    PairMap,
    /// TYPE reply name
    TypeName,
    /// Scalar-or-null without a count, array with one
    PopString,
    /// Member/score pops: one pair or a pair list, by count presence
    PopScored,
    /// `[cursor, [keys...]]`
    Scan,
    /// One `[member, score]` pair or `Null` (count-resolved form)
    ScoredPair,
    /// List of `[member, score]` pairs (count-resolved form)
    ScoredPairs,
}

/// Static description of one supported command
pub struct CommandSpec {
    pub name: &'static str,
    /// Minimum number of call arguments, including the key
    pub min_args: usize,
    /// Maximum number of call arguments, `usize::MAX` for variadic
    pub max_args: usize,
    pub policy: ReplyPolicy,
}

macro_rules! spec {
    ($name:literal, $min:expr, $max:expr, $policy:ident) => {
        (
            $name,
            CommandSpec {
                name: $name,
                min_args: $min,
                max_args: $max,
                policy: ReplyPolicy::$policy,
            },
        )
    };
}

lazy_static! {
    /// Every supported operation, keyed by its lowercase call name
    pub static ref COMMAND_TABLE: HashMap<&'static str, CommandSpec> = [
        spec!("set", 2, 2, Bool),
        spec!("get", 1, 1, OptString),
        spec!("incrby", 2, 2, Int),
        spec!("lpush", 2, usize::MAX, Int),
        spec!("rpush", 2, usize::MAX, Int),
        spec!("lpop", 1, 2, PopString),
        spec!("rpop", 1, 2, PopString),
        spec!("lrange", 3, 3, StrList),
        spec!("llen", 1, 1, Int),
        spec!("lindex", 2, 2, OptString),
        spec!("hset", 3, usize::MAX, Int),
        spec!("hget", 2, 2, OptString),
        spec!("hdel", 2, usize::MAX, Int),
        spec!("hgetall", 1, 1, PairMap),
        spec!("hkeys", 1, 1, StrList),
        spec!("hvals", 1, 1, StrList),
        spec!("hmget", 2, usize::MAX, OptStrList),
        spec!("hincrby", 3, 3, Int),
        spec!("sadd", 2, usize::MAX, Int),
        spec!("srem", 2, usize::MAX, Int),
        spec!("sismember", 2, 2, Bool),
        spec!("scard", 1, 1, Int),
        spec!("smembers", 1, 1, StrList),
        spec!("zadd", 3, usize::MAX, Int),
        spec!("zrange", 3, 3, StrList),
        spec!("zpopmin", 1, 2, PopScored),
        spec!("zpopmax", 1, 2, PopScored),
        spec!("zcard", 1, 1, Int),
        spec!("zrem", 2, usize::MAX, Int),
        spec!("del", 1, usize::MAX, Int),
        spec!("exists", 1, usize::MAX, Int),
        spec!("type", 1, 1, TypeName),
        spec!("keys", 1, 1, StrList),
        spec!("scan", 1, 3, Scan),
        spec!("expire", 2, 2, Bool),
        spec!("pexpire", 2, 2, Bool),
        spec!("expireat", 2, 2, Bool),
        spec!("pexpireat", 2, 2, Bool),
        spec!("persist", 1, 1, Bool),
        spec!("ttl", 1, 1, Int),
        spec!("pttl", 1, 1, Int),
        spec!("flushall", 0, 0, Ok),
    ]
    .into_iter()
    .collect();
}

/// Look up a command spec, or fail with the unknown-command kind.
pub fn lookup(name: &str) -> Result<&'static CommandSpec> {
    COMMAND_TABLE
        .get(name)
        .ok_or_else(|| CommandError::UnknownCommand(name.to_string()).into())
}

/// Validate a call arity against the table.
pub fn check_arity(name: &str, arg_count: usize) -> Result<&'static CommandSpec> {
    let spec = lookup(name)?;
    if arg_count < spec.min_args || arg_count > spec.max_args {
        return Err(CommandError::WrongNumberOfArgs(name.to_string()).into());
    }
    Ok(spec)
}

impl Command {
    /// Lowercase call name, as used in scripts and the command table
    pub fn name(&self) -> &'static str {
        match self {
            Command::Str(StrCommand::Set { .. }) => "set",
            Command::Str(StrCommand::Get { .. }) => "get",
            Command::Str(StrCommand::IncrBy { .. }) => "incrby",
            Command::List(ListCommand::LPush { .. }) => "lpush",
            Command::List(ListCommand::RPush { .. }) => "rpush",
            Command::List(ListCommand::LPop { .. }) => "lpop",
            Command::List(ListCommand::RPop { .. }) => "rpop",
            Command::List(ListCommand::LRange { .. }) => "lrange",
            Command::List(ListCommand::LLen { .. }) => "llen",
            Command::List(ListCommand::LIndex { .. }) => "lindex",
            Command::Hash(HashCommand::HSet { .. }) => "hset",
            Command::Hash(HashCommand::HGet { .. }) => "hget",
            Command::Hash(HashCommand::HDel { .. }) => "hdel",
            Command::Hash(HashCommand::HGetAll { .. }) => "hgetall",
            Command::Hash(HashCommand::HKeys { .. }) => "hkeys",
            Command::Hash(HashCommand::HVals { .. }) => "hvals",
            Command::Hash(HashCommand::HMGet { .. }) => "hmget",
            Command::Hash(HashCommand::HIncrBy { .. }) => "hincrby",
            Command::Set(SetCommand::SAdd { .. }) => "sadd",
            Command::Set(SetCommand::SRem { .. }) => "srem",
            Command::Set(SetCommand::SIsMember { .. }) => "sismember",
            Command::Set(SetCommand::SCard { .. }) => "scard",
            Command::Set(SetCommand::SMembers { .. }) => "smembers",
            Command::ZSet(ZSetCommand::ZAdd { .. }) => "zadd",
            Command::ZSet(ZSetCommand::ZRange { .. }) => "zrange",
            Command::ZSet(ZSetCommand::ZPopMin { .. }) => "zpopmin",
            Command::ZSet(ZSetCommand::ZPopMax { .. }) => "zpopmax",
            Command::ZSet(ZSetCommand::ZCard { .. }) => "zcard",
            Command::ZSet(ZSetCommand::ZRem { .. }) => "zrem",
            Command::Key(KeyCommand::Del { .. }) => "del",
            Command::Key(KeyCommand::Exists { .. }) => "exists",
            Command::Key(KeyCommand::Type { .. }) => "type",
            Command::Key(KeyCommand::Keys { .. }) => "keys",
            Command::Key(KeyCommand::Scan { .. }) => "scan",
            Command::Key(KeyCommand::Expire { .. }) => "expire",
            Command::Key(KeyCommand::PExpire { .. }) => "pexpire",
            Command::Key(KeyCommand::ExpireAt { .. }) => "expireat",
            Command::Key(KeyCommand::PExpireAt { .. }) => "pexpireat",
            Command::Key(KeyCommand::Persist { .. }) => "persist",
            Command::Key(KeyCommand::Ttl { .. }) => "ttl",
            Command::Key(KeyCommand::PTtl { .. }) => "pttl",
            Command::Key(KeyCommand::FlushAll) => "flushall",
        }
    }

    /// The reply policy for this concrete command, with count-dependent
    /// pops resolved.
    pub fn reply_policy(&self) -> ReplyPolicy {
        match self {
            Command::Str(StrCommand::Set { options, .. }) => {
                if options.return_previous {
                    ReplyPolicy::OptString
                } else {
                    ReplyPolicy::Bool
                }
            }
            Command::List(ListCommand::LPop { count, .. })
            | Command::List(ListCommand::RPop { count, .. }) => {
                if count.is_some() {
                    ReplyPolicy::StrList
                } else {
                    ReplyPolicy::OptString
                }
            }
            Command::ZSet(ZSetCommand::ZPopMin { count, .. })
            | Command::ZSet(ZSetCommand::ZPopMax { count, .. }) => {
                if count.is_some() {
                    ReplyPolicy::ScoredPairs
                } else {
                    ReplyPolicy::ScoredPair
                }
            }
            other => {
                COMMAND_TABLE
                    .get(other.name())
                    .map(|spec| spec.policy)
                    .unwrap_or(ReplyPolicy::Ok)
            }
        }
    }

    /// Parse a script-level call into a command. Keys arrive as resolved
    /// full key strings; every scalar argument is accepted where a string
    /// is expected and stringified Redis-style.
    pub fn from_call(name: &str, args: Vec<Value>) -> Result<Command> {
        check_arity(name, args.len())?;
        let mut args = CallArgs::new(name, args);
        let cmd = match name {
            "set" => Command::Str(StrCommand::Set {
                key: args.string()?,
                value: args.string()?,
                options: SetOptions::default(),
            }),
            "get" => Command::Str(StrCommand::Get { key: args.string()? }),
            "incrby" => Command::Str(StrCommand::IncrBy {
                key: args.string()?,
                delta: args.int()?,
            }),
            "lpush" => Command::List(ListCommand::LPush {
                key: args.string()?,
                values: args.rest_strings()?,
            }),
            "rpush" => Command::List(ListCommand::RPush {
                key: args.string()?,
                values: args.rest_strings()?,
            }),
            "lpop" => Command::List(ListCommand::LPop {
                key: args.string()?,
                count: args.opt_count()?,
            }),
            "rpop" => Command::List(ListCommand::RPop {
                key: args.string()?,
                count: args.opt_count()?,
            }),
            "lrange" => Command::List(ListCommand::LRange {
                key: args.string()?,
                start: args.int()?,
                stop: args.int()?,
            }),
            "llen" => Command::List(ListCommand::LLen { key: args.string()? }),
            "lindex" => Command::List(ListCommand::LIndex {
                key: args.string()?,
                index: args.int()?,
            }),
            "hset" => {
                let key = args.string()?;
                let flat = args.rest_strings()?;
                if flat.len() % 2 != 0 {
                    return Err(CommandError::WrongNumberOfArgs(name.to_string()).into());
                }
                let pairs = flat
                    .chunks(2)
                    .map(|chunk| (chunk[0].clone(), chunk[1].clone()))
                    .collect();
                Command::Hash(HashCommand::HSet { key, pairs })
            }
            "hget" => Command::Hash(HashCommand::HGet {
                key: args.string()?,
                field: args.string()?,
            }),
            "hdel" => Command::Hash(HashCommand::HDel {
                key: args.string()?,
                fields: args.rest_strings()?,
            }),
            "hgetall" => Command::Hash(HashCommand::HGetAll { key: args.string()? }),
            "hkeys" => Command::Hash(HashCommand::HKeys { key: args.string()? }),
            "hvals" => Command::Hash(HashCommand::HVals { key: args.string()? }),
            "hmget" => Command::Hash(HashCommand::HMGet {
                key: args.string()?,
                fields: args.rest_strings()?,
            }),
            "hincrby" => Command::Hash(HashCommand::HIncrBy {
                key: args.string()?,
                field: args.string()?,
                delta: args.int()?,
            }),
            "sadd" => Command::Set(SetCommand::SAdd {
                key: args.string()?,
                members: args.rest_strings()?,
            }),
            "srem" => Command::Set(SetCommand::SRem {
                key: args.string()?,
                members: args.rest_strings()?,
            }),
            "sismember" => Command::Set(SetCommand::SIsMember {
                key: args.string()?,
                member: args.string()?,
            }),
            "scard" => Command::Set(SetCommand::SCard { key: args.string()? }),
            "smembers" => Command::Set(SetCommand::SMembers { key: args.string()? }),
            "zadd" => {
                let key = args.string()?;
                let mut pairs = Vec::new();
                while !args.is_empty() {
                    let score = args.float()?;
                    let member = args.string()?;
                    pairs.push((score, member));
                }
                Command::ZSet(ZSetCommand::ZAdd { key, pairs })
            }
            "zrange" => Command::ZSet(ZSetCommand::ZRange {
                key: args.string()?,
                start: args.int()?,
                stop: args.int()?,
            }),
            "zpopmin" => Command::ZSet(ZSetCommand::ZPopMin {
                key: args.string()?,
                count: args.opt_count()?,
            }),
            "zpopmax" => Command::ZSet(ZSetCommand::ZPopMax {
                key: args.string()?,
                count: args.opt_count()?,
            }),
            "zcard" => Command::ZSet(ZSetCommand::ZCard { key: args.string()? }),
            "zrem" => Command::ZSet(ZSetCommand::ZRem {
                key: args.string()?,
                members: args.rest_strings()?,
            }),
            "del" => Command::Key(KeyCommand::Del {
                keys: args.rest_strings()?,
            }),
            "exists" => Command::Key(KeyCommand::Exists {
                keys: args.rest_strings()?,
            }),
            "type" => Command::Key(KeyCommand::Type { key: args.string()? }),
            "keys" => Command::Key(KeyCommand::Keys {
                pattern: args.string()?,
            }),
            "scan" => Command::Key(KeyCommand::Scan {
                cursor: args.string()?,
                pattern: args.opt_string()?,
                count: args.opt_count()?,
            }),
            "expire" => Command::Key(KeyCommand::Expire {
                key: args.string()?,
                seconds: args.int()?,
            }),
            "pexpire" => Command::Key(KeyCommand::PExpire {
                key: args.string()?,
                millis: args.int()?,
            }),
            "expireat" => Command::Key(KeyCommand::ExpireAt {
                key: args.string()?,
                ts_seconds: args.int()?,
            }),
            "pexpireat" => Command::Key(KeyCommand::PExpireAt {
                key: args.string()?,
                ts_millis: args.int()?,
            }),
            "persist" => Command::Key(KeyCommand::Persist { key: args.string()? }),
            "ttl" => Command::Key(KeyCommand::Ttl { key: args.string()? }),
            "pttl" => Command::Key(KeyCommand::PTtl { key: args.string()? }),
            "flushall" => Command::Key(KeyCommand::FlushAll),
            other => return Err(CommandError::UnknownCommand(other.to_string()).into()),
        };
        Ok(cmd)
    }

    /// Wire form for the external backend: uppercase command name plus the
    /// positional string arguments.
    pub fn wire(&self) -> (&'static str, Vec<String>) {
        match self {
            Command::Str(StrCommand::Set {
                key,
                value,
                options,
            }) => {
                let mut args = vec![key.clone(), value.clone()];
                match options.mode {
                    crate::storage::SetMode::IfMissing => args.push("NX".to_string()),
                    crate::storage::SetMode::IfExists => args.push("XX".to_string()),
                    crate::storage::SetMode::Always => {}
                }
                if options.return_previous {
                    args.push("GET".to_string());
                }
                if let Some(expire_in) = options.expire_in {
                    args.push("PX".to_string());
                    args.push(expire_in.as_millis().to_string());
                } else if options.keep_ttl {
                    args.push("KEEPTTL".to_string());
                }
                ("SET", args)
            }
            Command::Str(StrCommand::Get { key }) => ("GET", vec![key.clone()]),
            Command::Str(StrCommand::IncrBy { key, delta }) => {
                ("INCRBY", vec![key.clone(), delta.to_string()])
            }
            Command::List(ListCommand::LPush { key, values }) => {
                ("LPUSH", prepend(key, values.clone()))
            }
            Command::List(ListCommand::RPush { key, values }) => {
                ("RPUSH", prepend(key, values.clone()))
            }
            Command::List(ListCommand::LPop { key, count }) => ("LPOP", pop_args(key, *count)),
            Command::List(ListCommand::RPop { key, count }) => ("RPOP", pop_args(key, *count)),
            Command::List(ListCommand::LRange { key, start, stop }) => (
                "LRANGE",
                vec![key.clone(), start.to_string(), stop.to_string()],
            ),
            Command::List(ListCommand::LLen { key }) => ("LLEN", vec![key.clone()]),
            Command::List(ListCommand::LIndex { key, index }) => {
                ("LINDEX", vec![key.clone(), index.to_string()])
            }
            Command::Hash(HashCommand::HSet { key, pairs }) => {
                let mut args = vec![key.clone()];
                for (field, value) in pairs {
                    args.push(field.clone());
                    args.push(value.clone());
                }
                ("HSET", args)
            }
            Command::Hash(HashCommand::HGet { key, field }) => {
                ("HGET", vec![key.clone(), field.clone()])
            }
            Command::Hash(HashCommand::HDel { key, fields }) => {
                ("HDEL", prepend(key, fields.clone()))
            }
            Command::Hash(HashCommand::HGetAll { key }) => ("HGETALL", vec![key.clone()]),
            Command::Hash(HashCommand::HKeys { key }) => ("HKEYS", vec![key.clone()]),
            Command::Hash(HashCommand::HVals { key }) => ("HVALS", vec![key.clone()]),
            Command::Hash(HashCommand::HMGet { key, fields }) => {
                ("HMGET", prepend(key, fields.clone()))
            }
            Command::Hash(HashCommand::HIncrBy { key, field, delta }) => (
                "HINCRBY",
                vec![key.clone(), field.clone(), delta.to_string()],
            ),
            Command::Set(SetCommand::SAdd { key, members }) => {
                ("SADD", prepend(key, members.clone()))
            }
            Command::Set(SetCommand::SRem { key, members }) => {
                ("SREM", prepend(key, members.clone()))
            }
            Command::Set(SetCommand::SIsMember { key, member }) => {
                ("SISMEMBER", vec![key.clone(), member.clone()])
            }
            Command::Set(SetCommand::SCard { key }) => ("SCARD", vec![key.clone()]),
            Command::Set(SetCommand::SMembers { key }) => ("SMEMBERS", vec![key.clone()]),
            Command::ZSet(ZSetCommand::ZAdd { key, pairs }) => {
                let mut args = vec![key.clone()];
                for (score, member) in pairs {
                    args.push(crate::value::format_float(*score));
                    args.push(member.clone());
                }
                ("ZADD", args)
            }
            Command::ZSet(ZSetCommand::ZRange { key, start, stop }) => (
                "ZRANGE",
                vec![key.clone(), start.to_string(), stop.to_string()],
            ),
            Command::ZSet(ZSetCommand::ZPopMin { key, count }) => ("ZPOPMIN", pop_args(key, *count)),
            Command::ZSet(ZSetCommand::ZPopMax { key, count }) => ("ZPOPMAX", pop_args(key, *count)),
            Command::ZSet(ZSetCommand::ZCard { key }) => ("ZCARD", vec![key.clone()]),
            Command::ZSet(ZSetCommand::ZRem { key, members }) => {
                ("ZREM", prepend(key, members.clone()))
            }
            Command::Key(KeyCommand::Del { keys }) => ("DEL", keys.clone()),
            Command::Key(KeyCommand::Exists { keys }) => ("EXISTS", keys.clone()),
            Command::Key(KeyCommand::Type { key }) => ("TYPE", vec![key.clone()]),
            Command::Key(KeyCommand::Keys { pattern }) => ("KEYS", vec![pattern.clone()]),
            Command::Key(KeyCommand::Scan {
                cursor,
                pattern,
                count,
            }) => {
                let mut args = vec![cursor.clone()];
                if let Some(pattern) = pattern {
                    args.push("MATCH".to_string());
                    args.push(pattern.clone());
                }
                if let Some(count) = count {
                    args.push("COUNT".to_string());
                    args.push(count.to_string());
                }
                ("SCAN", args)
            }
            Command::Key(KeyCommand::Expire { key, seconds }) => {
                ("EXPIRE", vec![key.clone(), seconds.to_string()])
            }
            Command::Key(KeyCommand::PExpire { key, millis }) => {
                ("PEXPIRE", vec![key.clone(), millis.to_string()])
            }
            Command::Key(KeyCommand::ExpireAt { key, ts_seconds }) => {
                ("EXPIREAT", vec![key.clone(), ts_seconds.to_string()])
            }
            Command::Key(KeyCommand::PExpireAt { key, ts_millis }) => {
                ("PEXPIREAT", vec![key.clone(), ts_millis.to_string()])
            }
            Command::Key(KeyCommand::Persist { key }) => ("PERSIST", vec![key.clone()]),
            Command::Key(KeyCommand::Ttl { key }) => ("TTL", vec![key.clone()]),
            Command::Key(KeyCommand::PTtl { key }) => ("PTTL", vec![key.clone()]),
            Command::Key(KeyCommand::FlushAll) => ("FLUSHALL", Vec::new()),
        }
    }
}

fn prepend(key: &str, rest: Vec<String>) -> Vec<String> {
    let mut args = Vec::with_capacity(rest.len() + 1);
    args.push(key.to_string());
    args.extend(rest);
    args
}

fn pop_args(key: &str, count: Option<u64>) -> Vec<String> {
    match count {
        Some(count) => vec![key.to_string(), count.to_string()],
        None => vec![key.to_string()],
    }
}

/// Positional argument reader for script-level calls
struct CallArgs {
    name: String,
    args: std::vec::IntoIter<Value>,
}

impl CallArgs {
    fn new(name: &str, args: Vec<Value>) -> Self {
        CallArgs {
            name: name.to_string(),
            args: args.into_iter(),
        }
    }

    fn is_empty(&self) -> bool {
        self.args.len() == 0
    }

    fn next(&mut self) -> Result<Value> {
        self.args
            .next()
            .ok_or_else(|| CommandError::WrongNumberOfArgs(self.name.clone()).into())
    }

    fn string(&mut self) -> Result<String> {
        let v = self.next()?;
        match v {
            Value::List(_) | Value::Map(_) => {
                Err(CommandError::Syntax(format!("expected scalar for '{}'", self.name)).into())
            }
            scalar => Ok(scalar.redis_str()),
        }
    }

    fn opt_string(&mut self) -> Result<Option<String>> {
        match self.args.next() {
            None | Some(Value::Null) => Ok(None),
            Some(Value::List(_)) | Some(Value::Map(_)) => {
                Err(CommandError::Syntax(format!("expected scalar for '{}'", self.name)).into())
            }
            Some(scalar) => Ok(Some(scalar.redis_str())),
        }
    }

    fn int(&mut self) -> Result<i64> {
        let v = self.next()?;
        match v.as_number() {
            Some(crate::value::Number::Int(n)) => Ok(n),
            _ => Err(CommandError::NotInteger.into()),
        }
    }

    fn float(&mut self) -> Result<f64> {
        let v = self.next()?;
        match v.as_number().map(|n| n.as_f64()) {
            // Redis accepts infinite scores but rejects NaN.
            Some(f) if !f.is_nan() => Ok(f),
            _ => Err(CommandError::NotFloat.into()),
        }
    }

    fn opt_count(&mut self) -> Result<Option<u64>> {
        match self.args.next() {
            None | Some(Value::Null) => Ok(None),
            Some(v) => match v.as_number() {
                Some(crate::value::Number::Int(n)) if n >= 0 => Ok(Some(n as u64)),
                _ => Err(CommandError::NotInteger.into()),
            },
        }
    }

    fn rest_strings(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        while self.args.len() > 0 {
            out.push(self.string()?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_and_arity() {
        assert!(lookup("get").is_ok());
        assert!(lookup("getdel").is_err());
        assert!(check_arity("get", 1).is_ok());
        assert!(check_arity("get", 2).is_err());
        assert!(check_arity("lpush", 1).is_err());
        assert!(check_arity("lpush", 7).is_ok());
    }

    #[test]
    fn test_from_call_shapes() {
        let cmd = Command::from_call(
            "lpop",
            vec![Value::Str("k".into()), Value::Int(2)],
        )
        .unwrap();
        assert!(matches!(
            cmd,
            Command::List(ListCommand::LPop { count: Some(2), .. })
        ));
        assert_eq!(cmd.reply_policy(), ReplyPolicy::StrList);

        let cmd = Command::from_call("lpop", vec![Value::Str("k".into())]).unwrap();
        assert_eq!(cmd.reply_policy(), ReplyPolicy::OptString);
    }

    #[test]
    fn test_from_call_stringifies_scalars() {
        let cmd =
            Command::from_call("set", vec![Value::Str("k".into()), Value::Int(3)]).unwrap();
        match cmd {
            Command::Str(StrCommand::Set { value, .. }) => assert_eq!(value, "3"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_zadd_rejects_nan_scores() {
        let nan = Command::from_call(
            "zadd",
            vec![
                Value::Str("k".into()),
                Value::Str("nan".into()),
                Value::Str("m".into()),
            ],
        );
        assert!(matches!(
            nan,
            Err(crate::error::RedirsError::Command(CommandError::NotFloat))
        ));

        // Infinite scores are accepted, as on a real server.
        let inf = Command::from_call(
            "zadd",
            vec![
                Value::Str("k".into()),
                Value::Str("inf".into()),
                Value::Str("m".into()),
            ],
        )
        .unwrap();
        match inf {
            Command::ZSet(ZSetCommand::ZAdd { pairs, .. }) => {
                assert!(pairs[0].0.is_infinite());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_hset_requires_pairs() {
        let err = Command::from_call(
            "hset",
            vec![
                Value::Str("k".into()),
                Value::Str("f".into()),
                Value::Str("v".into()),
                Value::Str("dangling".into()),
            ],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_wire_set_options() {
        let cmd = Command::Str(StrCommand::Set {
            key: "k".into(),
            value: "v".into(),
            options: SetOptions {
                mode: crate::storage::SetMode::IfMissing,
                return_previous: true,
                ..Default::default()
            },
        });
        let (name, args) = cmd.wire();
        assert_eq!(name, "SET");
        assert_eq!(args, vec!["k", "v", "NX", "GET"]);
    }
}
