//! Local backend over the in-memory engine
//!
//! [`apply`] is the single entry point for executing a [`Command`] against
//! [`EngineState`]. Direct client calls and `Call("redis", ...)` nodes
//! resolved by the interpreter both land here, which is what makes script
//! and direct semantics identical on the memory backend.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::command::{Command, HashCommand, KeyCommand, ListCommand, SetCommand, StrCommand,
                     ZSetCommand};
use crate::error::{CommandError, Result};
use crate::script::interpreter::run_script;
use crate::script::registry::CompiledScript;
use crate::storage::engine::{EngineState, MemoryEngine};
use crate::value::Value;

use super::Backend;

/// Backend running against a shared [`MemoryEngine`]
pub struct MemoryBackend {
    engine: Arc<MemoryEngine>,
}

impl MemoryBackend {
    pub fn new(engine: Arc<MemoryEngine>) -> Self {
        MemoryBackend { engine }
    }
}

impl Backend for MemoryBackend {
    fn dispatch(&self, cmd: Command) -> Result<Value> {
        trace!(command = cmd.name(), "memory dispatch");
        let mut state = self.engine.lock();
        apply(&mut state, &cmd)
    }

    fn run_compiled(
        &self,
        script: &CompiledScript,
        keys: Vec<String>,
        args: Vec<Value>,
    ) -> Result<Value> {
        // One lock for the whole script: the engine sees no interleaved
        // mutation, matching server-side script atomicity.
        let mut state = self.engine.lock();
        let result = run_script(script, &mut state, &keys, &args)?;
        Ok(result.canonicalize())
    }

    fn run_batch(&self, entries: Vec<super::BatchEntry>) -> Vec<Result<Value>> {
        // The whole flush is one atomic step: no other caller observes an
        // intermediate state between slots.
        let mut state = self.engine.lock();
        entries
            .into_iter()
            .map(|entry| match entry {
                super::BatchEntry::Cmd(cmd) => apply(&mut state, &cmd),
                super::BatchEntry::Script {
                    compiled,
                    keys,
                    args,
                } => run_script(&compiled, &mut state, &keys, &args)
                    .map(Value::canonicalize),
            })
            .collect()
    }

    fn ping(&self) -> bool {
        true
    }

    fn flush_scripts(&self) -> Result<()> {
        Ok(())
    }
}

/// Execute one command against the engine state.
pub fn apply(state: &mut EngineState, cmd: &Command) -> Result<Value> {
    match cmd {
        Command::Str(cmd) => apply_str(state, cmd),
        Command::List(cmd) => apply_list(state, cmd),
        Command::Hash(cmd) => apply_hash(state, cmd),
        Command::Set(cmd) => apply_set(state, cmd),
        Command::ZSet(cmd) => apply_zset(state, cmd),
        Command::Key(cmd) => apply_key(state, cmd),
    }
}

fn apply_str(state: &mut EngineState, cmd: &StrCommand) -> Result<Value> {
    match cmd {
        StrCommand::Set {
            key,
            value,
            options,
        } => {
            let outcome = state.set(key, value.clone(), options)?;
            if options.return_previous {
                Ok(Value::from(outcome.previous))
            } else {
                Ok(Value::Bool(outcome.did_set))
            }
        }
        StrCommand::Get { key } => Ok(Value::from(state.get(key)?)),
        StrCommand::IncrBy { key, delta } => Ok(Value::Int(state.incr_by(key, *delta)?)),
    }
}

fn apply_list(state: &mut EngineState, cmd: &ListCommand) -> Result<Value> {
    match cmd {
        ListCommand::LPush { key, values } => {
            Ok(Value::Int(state.lpush(key, values.clone())? as i64))
        }
        ListCommand::RPush { key, values } => {
            Ok(Value::Int(state.rpush(key, values.clone())? as i64))
        }
        ListCommand::LPop { key, count } => match count {
            None => Ok(Value::from(state.lpop_one(key)?)),
            Some(count) => Ok(string_list(state.lpop_count(key, *count as usize)?)),
        },
        ListCommand::RPop { key, count } => match count {
            None => Ok(Value::from(state.rpop_one(key)?)),
            Some(count) => Ok(string_list(state.rpop_count(key, *count as usize)?)),
        },
        ListCommand::LRange { key, start, stop } => Ok(string_list(state.lrange(
            key,
            *start as isize,
            *stop as isize,
        )?)),
        ListCommand::LLen { key } => Ok(Value::Int(state.llen(key)? as i64)),
        ListCommand::LIndex { key, index } => {
            Ok(Value::from(state.lindex(key, *index as isize)?))
        }
    }
}

fn apply_hash(state: &mut EngineState, cmd: &HashCommand) -> Result<Value> {
    match cmd {
        HashCommand::HSet { key, pairs } => Ok(Value::Int(state.hset(key, pairs.clone())? as i64)),
        HashCommand::HGet { key, field } => Ok(Value::from(state.hget(key, field)?)),
        HashCommand::HDel { key, fields } => Ok(Value::Int(state.hdel(key, fields)? as i64)),
        HashCommand::HGetAll { key } => {
            let map = state
                .hgetall(key)?
                .into_iter()
                .map(|(field, value)| (field, Value::Str(value)))
                .collect();
            Ok(Value::Map(map))
        }
        HashCommand::HKeys { key } => Ok(string_list(state.hkeys(key)?)),
        HashCommand::HVals { key } => Ok(string_list(state.hvals(key)?)),
        HashCommand::HMGet { key, fields } => Ok(Value::List(
            state
                .hmget(key, fields)?
                .into_iter()
                .map(Value::from)
                .collect(),
        )),
        HashCommand::HIncrBy { key, field, delta } => {
            Ok(Value::Int(state.hincr_by(key, field, *delta)?))
        }
    }
}

fn apply_set(state: &mut EngineState, cmd: &SetCommand) -> Result<Value> {
    match cmd {
        SetCommand::SAdd { key, members } => {
            Ok(Value::Int(state.sadd(key, members.clone())? as i64))
        }
        SetCommand::SRem { key, members } => Ok(Value::Int(state.srem(key, members)? as i64)),
        SetCommand::SIsMember { key, member } => Ok(Value::Bool(state.sismember(key, member)?)),
        SetCommand::SCard { key } => Ok(Value::Int(state.scard(key)? as i64)),
        SetCommand::SMembers { key } => Ok(string_list(state.smembers(key)?)),
    }
}

fn apply_zset(state: &mut EngineState, cmd: &ZSetCommand) -> Result<Value> {
    match cmd {
        ZSetCommand::ZAdd { key, pairs } => {
            // Redis rejects NaN scores; infinite scores are allowed. The
            // sorted set relies on this holding before storage.
            if pairs.iter().any(|(score, _)| score.is_nan()) {
                return Err(CommandError::NotFloat.into());
            }
            Ok(Value::Int(state.zadd(key, pairs.clone())? as i64))
        }
        ZSetCommand::ZRange { key, start, stop } => Ok(string_list(state.zrange(
            key,
            *start as isize,
            *stop as isize,
        )?)),
        ZSetCommand::ZPopMin { key, count } => {
            pop_scored(state.zpop_min(key, count.unwrap_or(1) as usize)?, *count)
        }
        ZSetCommand::ZPopMax { key, count } => {
            pop_scored(state.zpop_max(key, count.unwrap_or(1) as usize)?, *count)
        }
        ZSetCommand::ZCard { key } => Ok(Value::Int(state.zcard(key)? as i64)),
        ZSetCommand::ZRem { key, members } => Ok(Value::Int(state.zrem(key, members)? as i64)),
    }
}

fn apply_key(state: &mut EngineState, cmd: &KeyCommand) -> Result<Value> {
    match cmd {
        KeyCommand::Del { keys } => Ok(Value::Int(state.del(keys) as i64)),
        KeyCommand::Exists { keys } => Ok(Value::Int(state.exists(keys) as i64)),
        KeyCommand::Type { key } => Ok(Value::Str(
            state
                .key_type(key)
                .map(|kind| kind.type_name())
                .unwrap_or("none")
                .to_string(),
        )),
        KeyCommand::Keys { pattern } => Ok(string_list(state.keys_matching(pattern))),
        KeyCommand::Scan {
            cursor,
            pattern,
            count,
        } => {
            let (next, keys) = state.scan(
                cursor,
                pattern.as_deref(),
                count.unwrap_or(10) as usize,
            )?;
            Ok(Value::List(vec![Value::Str(next), string_list(keys)]))
        }
        KeyCommand::Expire { key, seconds } => {
            Ok(Value::Bool(state.pexpire_at(key, at_from_now(seconds.saturating_mul(1000)))))
        }
        KeyCommand::PExpire { key, millis } => {
            Ok(Value::Bool(state.pexpire_at(key, at_from_now(*millis))))
        }
        KeyCommand::ExpireAt { key, ts_seconds } => Ok(Value::Bool(
            state.pexpire_at(key, at_from_epoch(ts_seconds.saturating_mul(1000))),
        )),
        KeyCommand::PExpireAt { key, ts_millis } => {
            Ok(Value::Bool(state.pexpire_at(key, at_from_epoch(*ts_millis))))
        }
        KeyCommand::Persist { key } => Ok(Value::Bool(state.persist(key))),
        KeyCommand::Ttl { key } => {
            let ms = state.ttl_ms(key);
            Ok(Value::Int(if ms < 0 { ms } else { ms / 1000 }))
        }
        KeyCommand::PTtl { key } => Ok(Value::Int(state.ttl_ms(key))),
        KeyCommand::FlushAll => {
            state.flushall();
            Ok(Value::Null)
        }
    }
}

fn string_list(items: Vec<String>) -> Value {
    Value::List(items.into_iter().map(Value::Str).collect())
}

fn scored_pair((member, score): (String, f64)) -> Value {
    Value::List(vec![Value::Str(member), Value::Float(score)])
}

fn pop_scored(mut popped: Vec<(String, f64)>, count: Option<u64>) -> Result<Value> {
    match count {
        None => Ok(popped
            .pop()
            .map(scored_pair)
            .unwrap_or(Value::Null)),
        Some(_) => Ok(Value::List(popped.into_iter().map(scored_pair).collect())),
    }
}

fn at_from_now(ms: i64) -> SystemTime {
    if ms <= 0 {
        SystemTime::now()
    } else {
        SystemTime::now() + Duration::from_millis(ms as u64)
    }
}

fn at_from_epoch(ts_ms: i64) -> SystemTime {
    if ts_ms <= 0 {
        UNIX_EPOCH
    } else {
        UNIX_EPOCH + Duration::from_millis(ts_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;

    fn run(state: &mut EngineState, name: &str, args: Vec<Value>) -> Result<Value> {
        apply(state, &Command::from_call(name, args)?)
    }

    #[test]
    fn test_lpop_shapes() {
        let mut state = EngineState::new();
        run(
            &mut state,
            "rpush",
            vec![Value::from("l"), Value::from("a"), Value::from("b")],
        )
        .unwrap();

        // Scalar form.
        assert_eq!(
            run(&mut state, "lpop", vec![Value::from("l")]).unwrap(),
            Value::Str("a".to_string())
        );
        // Count form returns a list even with a single element.
        assert_eq!(
            run(&mut state, "lpop", vec![Value::from("l"), Value::Int(5)]).unwrap(),
            Value::List(vec![Value::Str("b".to_string())])
        );
        // Scalar form on a missing key is Null, never false.
        assert_eq!(
            run(&mut state, "lpop", vec![Value::from("l")]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_zpop_shapes() {
        let mut state = EngineState::new();
        run(
            &mut state,
            "zadd",
            vec![
                Value::from("z"),
                Value::Int(1),
                Value::from("a"),
                Value::Int(2),
                Value::from("b"),
            ],
        )
        .unwrap();

        assert_eq!(
            run(&mut state, "zpopmin", vec![Value::from("z")]).unwrap(),
            Value::List(vec![Value::Str("a".to_string()), Value::Float(1.0)])
        );
        assert_eq!(
            run(&mut state, "zpopmin", vec![Value::from("missing")]).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_type_names() {
        let mut state = EngineState::new();
        run(
            &mut state,
            "set",
            vec![Value::from("s"), Value::from("v")],
        )
        .unwrap();
        assert_eq!(
            run(&mut state, "type", vec![Value::from("s")]).unwrap(),
            Value::Str("string".to_string())
        );
        assert_eq!(
            run(&mut state, "type", vec![Value::from("nope")]).unwrap(),
            Value::Str("none".to_string())
        );
    }

    #[test]
    fn test_ttl_seconds() {
        let mut state = EngineState::new();
        run(
            &mut state,
            "set",
            vec![Value::from("k"), Value::from("v")],
        )
        .unwrap();
        run(
            &mut state,
            "expire",
            vec![Value::from("k"), Value::Int(10)],
        )
        .unwrap();
        let ttl = run(&mut state, "ttl", vec![Value::from("k")])
            .unwrap()
            .into_int()
            .unwrap();
        assert!(ttl >= 0 && ttl <= 10);
    }
}
