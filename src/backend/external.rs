//! External backend over a real Redis server
//!
//! Commands are serialized through the unified wire form and replies are
//! converted back through the same reply-policy table the Lua emitter uses,
//! so both backends surface identical host shapes. Scripts go out as
//! `EVALSHA sha numkeys key... json_of_args` with an `EVAL` fallback when
//! the server does not know the hash.

use std::sync::Mutex;

use tracing::{trace, warn};

use crate::command::{Command, ReplyPolicy};
use crate::config::ExternalConfig;
use crate::error::{RedirsError, Result};
use crate::script::registry::CompiledScript;
use crate::value::Value;

use super::Backend;

/// Synchronous connection to a Redis server
pub struct ExternalBackend {
    conn: Mutex<redis::Connection>,
}

impl ExternalBackend {
    /// Open a connection from the network configuration.
    pub fn connect(config: &ExternalConfig) -> Result<Self> {
        let info = redis::ConnectionInfo {
            addr: redis::ConnectionAddr::Tcp(config.host.clone(), config.port),
            redis: redis::RedisConnectionInfo {
                password: config.passwd.clone(),
                ..Default::default()
            },
        };
        let client = redis::Client::open(info)
            .map_err(|err| RedirsError::Connection(err.to_string()))?;
        let conn = client
            .get_connection()
            .map_err(|err| RedirsError::Connection(err.to_string()))?;
        Ok(ExternalBackend {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<R>(&self, f: impl FnOnce(&mut redis::Connection) -> Result<R>) -> Result<R> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| RedirsError::Connection("connection lock poisoned".to_string()))?;
        f(&mut conn)
    }
}

impl Backend for ExternalBackend {
    fn dispatch(&self, cmd: Command) -> Result<Value> {
        let (name, args) = cmd.wire();
        trace!(command = name, "external dispatch");
        let reply = self.with_conn(|conn| {
            let mut wire = redis::cmd(name);
            for arg in &args {
                wire.arg(arg);
            }
            Ok(wire.query::<redis::Value>(conn)?)
        })?;
        convert_reply(cmd.reply_policy(), reply)
    }

    fn run_compiled(
        &self,
        script: &CompiledScript,
        keys: Vec<String>,
        args: Vec<Value>,
    ) -> Result<Value> {
        let json = Value::List(args).encode();
        let reply = self.with_conn(|conn| {
            let mut evalsha = redis::cmd("EVALSHA");
            evalsha.arg(script.sha()).arg(keys.len());
            for key in &keys {
                evalsha.arg(key);
            }
            evalsha.arg(&json);
            match evalsha.query::<redis::Value>(conn) {
                Ok(reply) => Ok(reply),
                Err(err) if err.kind() == redis::ErrorKind::NoScriptError => {
                    warn!(sha = script.sha(), "script not cached, falling back to EVAL");
                    let mut eval = redis::cmd("EVAL");
                    eval.arg(script.lua()).arg(keys.len());
                    for key in &keys {
                        eval.arg(key);
                    }
                    eval.arg(&json);
                    Ok(eval.query::<redis::Value>(conn)?)
                }
                Err(err) => Err(err.into()),
            }
        })?;

        // The emitted program returns one JSON-encoded string.
        match reply {
            redis::Value::Nil => Ok(Value::Null),
            redis::Value::BulkString(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|err| RedirsError::Parse(err.to_string()))?;
                Ok(Value::decode(&text)?.canonicalize())
            }
            other => Err(RedirsError::Parse(format!(
                "unexpected script reply: {other:?}"
            ))),
        }
    }

    fn ping(&self) -> bool {
        self.with_conn(|conn| Ok(redis::cmd("PING").query::<String>(conn).is_ok()))
            .unwrap_or(false)
    }

    fn flush_scripts(&self) -> Result<()> {
        self.with_conn(|conn| {
            redis::cmd("SCRIPT").arg("FLUSH").query::<()>(conn)?;
            Ok(())
        })
    }
}

/// Convert a raw reply into the host value for the given policy.
fn convert_reply(policy: ReplyPolicy, reply: redis::Value) -> Result<Value> {
    match policy {
        ReplyPolicy::Ok => Ok(Value::Null),
        ReplyPolicy::Int => match reply {
            redis::Value::Int(n) => Ok(Value::Int(n)),
            other => Err(bad_reply("integer", &other)),
        },
        ReplyPolicy::Bool => match reply {
            redis::Value::Okay | redis::Value::SimpleString(_) => Ok(Value::Bool(true)),
            redis::Value::Nil => Ok(Value::Bool(false)),
            redis::Value::Int(n) => Ok(Value::Bool(n != 0)),
            redis::Value::Boolean(b) => Ok(Value::Bool(b)),
            other => Err(bad_reply("boolean", &other)),
        },
        ReplyPolicy::OptString => Ok(Value::from(opt_string(reply)?)),
        ReplyPolicy::TypeName => match opt_string(reply)? {
            Some(name) => Ok(Value::Str(name)),
            None => Err(bad_reply("type name", &redis::Value::Nil)),
        },
        ReplyPolicy::StrList | ReplyPolicy::OptStrList => Ok(Value::List(
            items_of(reply)?
                .into_iter()
                .map(|item| Ok(Value::from(opt_string(item)?)))
                .collect::<Result<Vec<Value>>>()?,
        )),
        ReplyPolicy::PairMap => {
            let mut map = std::collections::BTreeMap::new();
            match reply {
                redis::Value::Map(pairs) => {
                    for (field, value) in pairs {
                        let field = require_string(field)?;
                        map.insert(field, Value::from(opt_string(value)?));
                    }
                }
                other => {
                    let items = items_of(other)?;
                    for chunk in items.chunks(2) {
                        if let [field, value] = chunk {
                            let field = require_string(field.clone())?;
                            map.insert(field, Value::from(opt_string(value.clone())?));
                        }
                    }
                }
            }
            Ok(Value::Map(map))
        }
        ReplyPolicy::ScoredPair => {
            let items = items_of(reply)?;
            if items.is_empty() {
                return Ok(Value::Null);
            }
            scored_pairs(items).map(|mut pairs| pairs.pop().unwrap_or(Value::Null))
        }
        ReplyPolicy::ScoredPairs => Ok(Value::List(scored_pairs(items_of(reply)?)?)),
        ReplyPolicy::Scan => {
            let mut items = items_of(reply)?.into_iter();
            let cursor = items
                .next()
                .map(require_string)
                .transpose()?
                .unwrap_or_else(|| "0".to_string());
            let keys = match items.next() {
                Some(keys) => items_of(keys)?
                    .into_iter()
                    .map(|key| Ok(Value::Str(require_string(key)?)))
                    .collect::<Result<Vec<Value>>>()?,
                None => Vec::new(),
            };
            Ok(Value::List(vec![Value::Str(cursor), Value::List(keys)]))
        }
        // The count-ambiguous table policies are resolved before dispatch.
        ReplyPolicy::PopString | ReplyPolicy::PopScored => {
            Err(RedirsError::Parse("unresolved reply policy".to_string()))
        }
    }
}

fn bad_reply(expected: &str, got: &redis::Value) -> RedirsError {
    RedirsError::Parse(format!("expected {expected} reply, got {got:?}"))
}

fn opt_string(reply: redis::Value) -> Result<Option<String>> {
    match reply {
        redis::Value::Nil => Ok(None),
        redis::Value::BulkString(bytes) => Ok(Some(
            String::from_utf8(bytes).map_err(|err| RedirsError::Parse(err.to_string()))?,
        )),
        redis::Value::SimpleString(s) => Ok(Some(s)),
        redis::Value::Okay => Ok(Some("OK".to_string())),
        redis::Value::Int(n) => Ok(Some(n.to_string())),
        other => Err(bad_reply("string", &other)),
    }
}

fn require_string(reply: redis::Value) -> Result<String> {
    opt_string(reply)?.ok_or_else(|| bad_reply("string", &redis::Value::Nil))
}

fn items_of(reply: redis::Value) -> Result<Vec<redis::Value>> {
    match reply {
        redis::Value::Nil => Ok(Vec::new()),
        redis::Value::Array(items) | redis::Value::Set(items) => Ok(items),
        other => Err(bad_reply("array", &other)),
    }
}

/// Reshape a flat `[member, score, ...]` reply into pair values.
fn scored_pairs(items: Vec<redis::Value>) -> Result<Vec<Value>> {
    items
        .chunks(2)
        .map(|chunk| match chunk {
            [member, score] => {
                let member = require_string(member.clone())?;
                let score = match score {
                    redis::Value::Double(f) => *f,
                    other => require_string(other.clone())?
                        .parse::<f64>()
                        .map_err(|err| RedirsError::Parse(err.to_string()))?,
                };
                Ok(Value::List(vec![Value::Str(member), Value::Float(score)]))
            }
            _ => Err(RedirsError::Parse("odd member/score reply".to_string())),
        })
        .collect()
}
