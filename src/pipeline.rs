//! Pipeline buffering
//!
//! A pipeline queues commands and flushes them on [`Pipeline::execute`].
//! The observable order of effects equals the enqueue order and results
//! align by index. Failures are best-effort: an errored slot records its
//! error and later slots still run. Scripts can be queued in line and
//! report their result at their position.

use crate::backend::{BackendHandle, BatchEntry};
use crate::client::{join_key, RegisteredScript};
use crate::command::{Command, HashCommand, KeyCommand, ListCommand, SetCommand, StrCommand,
                     ZSetCommand};
use crate::error::Result;
use crate::storage::engine::SetOptions;
use crate::value::Value;

/// An order-preserving command buffer
pub struct Pipeline {
    backend: BackendHandle,
    prefix: String,
    queued: Vec<BatchEntry>,
}

impl Pipeline {
    pub(crate) fn new(backend: BackendHandle, prefix: String) -> Pipeline {
        Pipeline {
            backend,
            prefix,
            queued: Vec::new(),
        }
    }

    fn push(&mut self, cmd: Command) -> &mut Self {
        self.queued.push(BatchEntry::Cmd(cmd));
        self
    }

    fn full_key(&self, key: &str) -> String {
        join_key(&self.prefix, key)
    }

    /// Number of queued slots
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Flush the buffer. Each slot holds the command's value or its error;
    /// execution continues past failed slots. On the memory backend the
    /// whole flush is one atomic step.
    pub fn execute(&mut self) -> Vec<Result<Value>> {
        let queued = std::mem::take(&mut self.queued);
        self.backend.run_batch(queued)
    }

    /// Queue a registered script invocation. Name binding is validated
    /// here, synchronously; only execution is deferred.
    pub fn run_script(
        &mut self,
        script: &RegisteredScript,
        keys: &[(&str, &str)],
        args: &[(&str, Value)],
    ) -> Result<&mut Self> {
        let (keys, args) = script.bind(keys, args)?;
        self.queued.push(BatchEntry::Script {
            compiled: script.compiled(),
            keys,
            args,
        });
        Ok(self)
    }

    // ----- mirrored commands ---------------------------------------------

    pub fn get(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Str(StrCommand::Get { key }))
    }

    pub fn set(&mut self, key: &str, value: &str) -> &mut Self {
        self.set_opts(key, value, SetOptions::default())
    }

    pub fn set_opts(&mut self, key: &str, value: &str, options: SetOptions) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Str(StrCommand::Set {
            key,
            value: value.to_string(),
            options,
        }))
    }

    pub fn incr_by(&mut self, key: &str, delta: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Str(StrCommand::IncrBy { key, delta }))
    }

    pub fn lpush(&mut self, key: &str, values: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::LPush {
            key,
            values: owned(values),
        }))
    }

    pub fn rpush(&mut self, key: &str, values: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::RPush {
            key,
            values: owned(values),
        }))
    }

    pub fn lpop(&mut self, key: &str, count: Option<u64>) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::LPop { key, count }))
    }

    pub fn rpop(&mut self, key: &str, count: Option<u64>) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::RPop { key, count }))
    }

    pub fn lrange(&mut self, key: &str, start: i64, stop: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::LRange { key, start, stop }))
    }

    pub fn llen(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::LLen { key }))
    }

    pub fn lindex(&mut self, key: &str, index: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::List(ListCommand::LIndex { key, index }))
    }

    pub fn hset(&mut self, key: &str, pairs: &[(&str, &str)]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HSet {
            key,
            pairs: pairs
                .iter()
                .map(|(field, value)| (field.to_string(), value.to_string()))
                .collect(),
        }))
    }

    pub fn hget(&mut self, key: &str, field: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HGet {
            key,
            field: field.to_string(),
        }))
    }

    pub fn hdel(&mut self, key: &str, fields: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HDel {
            key,
            fields: owned(fields),
        }))
    }

    pub fn hgetall(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HGetAll { key }))
    }

    pub fn hkeys(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HKeys { key }))
    }

    pub fn hvals(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HVals { key }))
    }

    pub fn hmget(&mut self, key: &str, fields: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HMGet {
            key,
            fields: owned(fields),
        }))
    }

    pub fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Hash(HashCommand::HIncrBy {
            key,
            field: field.to_string(),
            delta,
        }))
    }

    pub fn sadd(&mut self, key: &str, members: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Set(SetCommand::SAdd {
            key,
            members: owned(members),
        }))
    }

    pub fn srem(&mut self, key: &str, members: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Set(SetCommand::SRem {
            key,
            members: owned(members),
        }))
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Set(SetCommand::SIsMember {
            key,
            member: member.to_string(),
        }))
    }

    pub fn scard(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Set(SetCommand::SCard { key }))
    }

    pub fn smembers(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Set(SetCommand::SMembers { key }))
    }

    pub fn zadd(&mut self, key: &str, pairs: &[(f64, &str)]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZAdd {
            key,
            pairs: pairs
                .iter()
                .map(|(score, member)| (*score, member.to_string()))
                .collect(),
        }))
    }

    pub fn zrange(&mut self, key: &str, start: i64, stop: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZRange { key, start, stop }))
    }

    pub fn zpop_min(&mut self, key: &str, count: Option<u64>) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZPopMin { key, count }))
    }

    pub fn zpop_max(&mut self, key: &str, count: Option<u64>) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZPopMax { key, count }))
    }

    pub fn zcard(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZCard { key }))
    }

    pub fn zrem(&mut self, key: &str, members: &[&str]) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::ZSet(ZSetCommand::ZRem {
            key,
            members: owned(members),
        }))
    }

    pub fn del(&mut self, keys: &[&str]) -> &mut Self {
        let keys = keys.iter().map(|key| self.full_key(key)).collect();
        self.push(Command::Key(KeyCommand::Del { keys }))
    }

    pub fn exists(&mut self, keys: &[&str]) -> &mut Self {
        let keys = keys.iter().map(|key| self.full_key(key)).collect();
        self.push(Command::Key(KeyCommand::Exists { keys }))
    }

    pub fn key_type(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::Type { key }))
    }

    pub fn expire(&mut self, key: &str, seconds: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::Expire { key, seconds }))
    }

    pub fn pexpire(&mut self, key: &str, millis: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::PExpire { key, millis }))
    }

    pub fn expire_at(&mut self, key: &str, ts_seconds: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::ExpireAt { key, ts_seconds }))
    }

    pub fn pexpire_at(&mut self, key: &str, ts_millis: i64) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::PExpireAt { key, ts_millis }))
    }

    /// Queue KEYS; the reply carries namespace-qualified key names.
    pub fn keys(&mut self, pattern: &str) -> &mut Self {
        let pattern = join_key(&self.prefix, pattern);
        self.push(Command::Key(KeyCommand::Keys { pattern }))
    }

    /// Queue one SCAN step; the reply carries namespace-qualified key
    /// names.
    pub fn scan(&mut self, cursor: &str, pattern: Option<&str>, count: Option<u64>) -> &mut Self {
        let pattern = pattern.map(|pattern| join_key(&self.prefix, pattern));
        self.push(Command::Key(KeyCommand::Scan {
            cursor: cursor.to_string(),
            pattern,
            count,
        }))
    }

    pub fn persist(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::Persist { key }))
    }

    pub fn ttl(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::Ttl { key }))
    }

    pub fn pttl(&mut self, key: &str) -> &mut Self {
        let key = self.full_key(key);
        self.push(Command::Key(KeyCommand::PTtl { key }))
    }

    pub fn flushall(&mut self) -> &mut Self {
        self.push(Command::Key(KeyCommand::FlushAll))
    }
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}
