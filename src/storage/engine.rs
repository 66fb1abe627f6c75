//! Main storage engine implementation
//!
//! Provides Redis-compatible storage with lazy expiration. [`EngineState`]
//! holds the key space and implements the command surface; [`MemoryEngine`]
//! wraps it in a lock so that one guard acquisition is one atomic step
//! (a direct command, a whole script, or a pipeline slot).

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use std::time::{Duration, SystemTime};

use crate::error::{CommandError, Result};
use crate::storage::value::{StoredValue, TypedValue, ValueKind};
use crate::storage::zset::ScoreSet;

/// Mode flags for SET
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetMode {
    /// Unconditional write
    #[default]
    Always,
    /// Only set if the key does not exist
    IfMissing,
    /// Only set if the key already exists
    IfExists,
}

/// Options accepted by SET
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub mode: SetMode,
    /// Retain the existing TTL instead of clearing it
    pub keep_ttl: bool,
    /// Return the previous value instead of the set indicator
    pub return_previous: bool,
    /// Optional expiry applied with the write
    pub expire_in: Option<Duration>,
}

/// Outcome of a SET, shaped by the dispatch layer
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub did_set: bool,
    pub previous: Option<String>,
}

/// Shared handle to the in-memory engine
pub struct MemoryEngine {
    state: RwLock<EngineState>,
}

impl MemoryEngine {
    /// Create a new engine handle
    pub fn new() -> Arc<Self> {
        Arc::new(MemoryEngine {
            state: RwLock::new(EngineState::new()),
        })
    }

    /// Acquire the engine for one atomic step
    pub fn lock(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap()
    }
}

/// The key space and its expiry index
#[derive(Debug, Default)]
pub struct EngineState {
    /// Key-value storage
    data: HashMap<String, StoredValue>,

    /// Keys with expiration timestamps for cleanup
    expiring: HashMap<String, SystemTime>,
}

impl EngineState {
    pub fn new() -> Self {
        EngineState::default()
    }

    // ----- key lifecycle -------------------------------------------------

    fn evict_if_expired(&mut self, key: &str) {
        let now = SystemTime::now();
        if let Some(stored) = self.data.get(key) {
            if stored.is_expired(now) {
                self.data.remove(key);
                self.expiring.remove(key);
            }
        }
    }

    fn live(&mut self, key: &str) -> Option<&mut StoredValue> {
        self.evict_if_expired(key);
        self.data.get_mut(key)
    }

    fn remove_key(&mut self, key: &str) {
        self.data.remove(key);
        self.expiring.remove(key);
    }

    /// Drop the key when its container just became empty
    fn evict_if_emptied(&mut self, key: &str) {
        if let Some(stored) = self.data.get(key) {
            if stored.value.is_empty_container() {
                self.remove_key(key);
            }
        }
    }

    fn insert(&mut self, key: String, value: TypedValue) {
        self.expiring.remove(&key);
        self.data.insert(key, StoredValue::new(value));
    }

    // ----- typed access --------------------------------------------------

    fn str_of(&mut self, key: &str) -> Result<Option<&mut String>> {
        match self.live(key) {
            Some(stored) => match &mut stored.value {
                TypedValue::Str(s) => Ok(Some(s)),
                _ => Err(CommandError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    fn list_of(&mut self, key: &str) -> Result<Option<&mut VecDeque<String>>> {
        match self.live(key) {
            Some(stored) => match &mut stored.value {
                TypedValue::List(list) => Ok(Some(list)),
                _ => Err(CommandError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    fn hash_of(&mut self, key: &str) -> Result<Option<&mut BTreeMap<String, String>>> {
        match self.live(key) {
            Some(stored) => match &mut stored.value {
                TypedValue::Hash(hash) => Ok(Some(hash)),
                _ => Err(CommandError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    fn set_of(&mut self, key: &str) -> Result<Option<&mut BTreeSet<String>>> {
        match self.live(key) {
            Some(stored) => match &mut stored.value {
                TypedValue::Set(set) => Ok(Some(set)),
                _ => Err(CommandError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    fn zset_of(&mut self, key: &str) -> Result<Option<&mut ScoreSet>> {
        match self.live(key) {
            Some(stored) => match &mut stored.value {
                TypedValue::ZSet(zset) => Ok(Some(zset)),
                _ => Err(CommandError::WrongType.into()),
            },
            None => Ok(None),
        }
    }

    // ----- string commands ----------------------------------------------

    pub fn get(&mut self, key: &str) -> Result<Option<String>> {
        Ok(self.str_of(key)?.map(|s| s.clone()))
    }

    pub fn set(&mut self, key: &str, value: String, opts: &SetOptions) -> Result<SetOutcome> {
        let previous = match self.live(key) {
            Some(stored) => match &stored.value {
                TypedValue::Str(s) => Some(s.clone()),
                _ if opts.return_previous => return Err(CommandError::WrongType.into()),
                _ => None,
            },
            None => None,
        };
        let exists = self.data.contains_key(key);

        let blocked = match opts.mode {
            SetMode::Always => false,
            SetMode::IfMissing => exists,
            SetMode::IfExists => !exists,
        };
        if blocked {
            return Ok(SetOutcome {
                did_set: false,
                previous,
            });
        }

        let kept_ttl = if opts.keep_ttl {
            self.expiring.get(key).copied()
        } else {
            None
        };
        self.insert(key.to_string(), TypedValue::Str(value));
        if let Some(at) = kept_ttl {
            self.set_expiry(key, at);
        }
        if let Some(expire_in) = opts.expire_in {
            self.set_expiry(key, SystemTime::now() + expire_in);
        }
        Ok(SetOutcome {
            did_set: true,
            previous,
        })
    }

    pub fn incr_by(&mut self, key: &str, delta: i64) -> Result<i64> {
        let current = match self.str_of(key)? {
            Some(s) => s.parse::<i64>().map_err(|_| CommandError::NotInteger)?,
            None => 0,
        };
        let updated = current
            .checked_add(delta)
            .ok_or(CommandError::NotInteger)?;
        match self.str_of(key)? {
            Some(s) => *s = updated.to_string(),
            None => self.insert(key.to_string(), TypedValue::Str(updated.to_string())),
        }
        Ok(updated)
    }

    // ----- list commands -------------------------------------------------

    pub fn lpush(&mut self, key: &str, values: Vec<String>) -> Result<usize> {
        match self.list_of(key)? {
            Some(list) => {
                for value in values {
                    list.push_front(value);
                }
                Ok(list.len())
            }
            None => {
                let mut list = VecDeque::new();
                for value in values {
                    list.push_front(value);
                }
                let len = list.len();
                self.insert(key.to_string(), TypedValue::List(list));
                Ok(len)
            }
        }
    }

    pub fn rpush(&mut self, key: &str, values: Vec<String>) -> Result<usize> {
        match self.list_of(key)? {
            Some(list) => {
                list.extend(values);
                Ok(list.len())
            }
            None => {
                let list: VecDeque<String> = values.into();
                let len = list.len();
                self.insert(key.to_string(), TypedValue::List(list));
                Ok(len)
            }
        }
    }

    pub fn lpop_one(&mut self, key: &str) -> Result<Option<String>> {
        let popped = match self.list_of(key)? {
            Some(list) => list.pop_front(),
            None => None,
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn rpop_one(&mut self, key: &str) -> Result<Option<String>> {
        let popped = match self.list_of(key)? {
            Some(list) => list.pop_back(),
            None => None,
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn lpop_count(&mut self, key: &str, count: usize) -> Result<Vec<String>> {
        let popped = match self.list_of(key)? {
            Some(list) => {
                let take = count.min(list.len());
                list.drain(..take).collect()
            }
            None => Vec::new(),
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn rpop_count(&mut self, key: &str, count: usize) -> Result<Vec<String>> {
        let popped = match self.list_of(key)? {
            Some(list) => {
                let take = count.min(list.len());
                let at = list.len() - take;
                let mut tail: Vec<String> = list.drain(at..).collect();
                tail.reverse();
                tail
            }
            None => Vec::new(),
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn lrange(&mut self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        match self.list_of(key)? {
            Some(list) => {
                let len = list.len() as isize;
                let start = clamp_index(start, len);
                let stop = clamp_index(stop, len);
                if start > stop || start >= len {
                    return Ok(Vec::new());
                }
                Ok(list
                    .iter()
                    .skip(start as usize)
                    .take((stop - start + 1) as usize)
                    .cloned()
                    .collect())
            }
            None => Ok(Vec::new()),
        }
    }

    pub fn llen(&mut self, key: &str) -> Result<usize> {
        Ok(self.list_of(key)?.map(|list| list.len()).unwrap_or(0))
    }

    pub fn lindex(&mut self, key: &str, index: isize) -> Result<Option<String>> {
        match self.list_of(key)? {
            Some(list) => {
                let len = list.len() as isize;
                let index = if index < 0 { len + index } else { index };
                if index < 0 || index >= len {
                    Ok(None)
                } else {
                    Ok(list.get(index as usize).cloned())
                }
            }
            None => Ok(None),
        }
    }

    // ----- hash commands -------------------------------------------------

    pub fn hset(&mut self, key: &str, pairs: Vec<(String, String)>) -> Result<usize> {
        match self.hash_of(key)? {
            Some(hash) => {
                let mut added = 0;
                for (field, value) in pairs {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Ok(added)
            }
            None => {
                let hash: BTreeMap<String, String> = pairs.into_iter().collect();
                let added = hash.len();
                if added > 0 {
                    self.insert(key.to_string(), TypedValue::Hash(hash));
                }
                Ok(added)
            }
        }
    }

    pub fn hget(&mut self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .hash_of(key)?
            .and_then(|hash| hash.get(field).cloned()))
    }

    pub fn hdel(&mut self, key: &str, fields: &[String]) -> Result<usize> {
        let removed = match self.hash_of(key)? {
            Some(hash) => fields
                .iter()
                .filter(|field| hash.remove(*field).is_some())
                .count(),
            None => 0,
        };
        self.evict_if_emptied(key);
        Ok(removed)
    }

    pub fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>> {
        match self.hash_of(key)? {
            Some(hash) => Ok(hash.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn hkeys(&mut self, key: &str) -> Result<Vec<String>> {
        match self.hash_of(key)? {
            Some(hash) => Ok(hash.keys().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn hvals(&mut self, key: &str) -> Result<Vec<String>> {
        match self.hash_of(key)? {
            Some(hash) => Ok(hash.values().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn hmget(&mut self, key: &str, fields: &[String]) -> Result<Vec<Option<String>>> {
        match self.hash_of(key)? {
            Some(hash) => Ok(fields
                .iter()
                .map(|field| hash.get(field).cloned())
                .collect()),
            None => Ok(fields.iter().map(|_| None).collect()),
        }
    }

    pub fn hincr_by(&mut self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let current = match self.hash_of(key)? {
            Some(hash) => match hash.get(field) {
                Some(s) => s.parse::<i64>().map_err(|_| CommandError::NotInteger)?,
                None => 0,
            },
            None => 0,
        };
        let updated = current
            .checked_add(delta)
            .ok_or(CommandError::NotInteger)?;
        match self.hash_of(key)? {
            Some(hash) => {
                hash.insert(field.to_string(), updated.to_string());
            }
            None => {
                let mut hash = BTreeMap::new();
                hash.insert(field.to_string(), updated.to_string());
                self.insert(key.to_string(), TypedValue::Hash(hash));
            }
        }
        Ok(updated)
    }

    // ----- set commands --------------------------------------------------

    pub fn sadd(&mut self, key: &str, members: Vec<String>) -> Result<usize> {
        match self.set_of(key)? {
            Some(set) => Ok(members.into_iter().filter(|m| set.insert(m.clone())).count()),
            None => {
                let set: BTreeSet<String> = members.into_iter().collect();
                let added = set.len();
                if added > 0 {
                    self.insert(key.to_string(), TypedValue::Set(set));
                }
                Ok(added)
            }
        }
    }

    pub fn srem(&mut self, key: &str, members: &[String]) -> Result<usize> {
        let removed = match self.set_of(key)? {
            Some(set) => members.iter().filter(|m| set.remove(*m)).count(),
            None => 0,
        };
        self.evict_if_emptied(key);
        Ok(removed)
    }

    pub fn sismember(&mut self, key: &str, member: &str) -> Result<bool> {
        Ok(self
            .set_of(key)?
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    pub fn scard(&mut self, key: &str) -> Result<usize> {
        Ok(self.set_of(key)?.map(|set| set.len()).unwrap_or(0))
    }

    pub fn smembers(&mut self, key: &str) -> Result<Vec<String>> {
        match self.set_of(key)? {
            Some(set) => Ok(set.iter().cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    // ----- sorted set commands -------------------------------------------

    pub fn zadd(&mut self, key: &str, pairs: Vec<(f64, String)>) -> Result<usize> {
        match self.zset_of(key)? {
            Some(zset) => Ok(pairs
                .into_iter()
                .filter(|(score, member)| zset.insert(member.clone(), *score).is_none())
                .count()),
            None => {
                let mut zset = ScoreSet::new();
                let mut added = 0;
                for (score, member) in pairs {
                    if zset.insert(member, score).is_none() {
                        added += 1;
                    }
                }
                if !zset.is_empty() {
                    self.insert(key.to_string(), TypedValue::ZSet(zset));
                }
                Ok(added)
            }
        }
    }

    pub fn zrange(&mut self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        match self.zset_of(key)? {
            Some(zset) => Ok(zset
                .range_by_rank(start, stop)
                .into_iter()
                .map(|(member, _)| member)
                .collect()),
            None => Ok(Vec::new()),
        }
    }

    pub fn zpop_min(&mut self, key: &str, count: usize) -> Result<Vec<(String, f64)>> {
        let popped = match self.zset_of(key)? {
            Some(zset) => zset.pop_min(count),
            None => Vec::new(),
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn zpop_max(&mut self, key: &str, count: usize) -> Result<Vec<(String, f64)>> {
        let popped = match self.zset_of(key)? {
            Some(zset) => zset.pop_max(count),
            None => Vec::new(),
        };
        self.evict_if_emptied(key);
        Ok(popped)
    }

    pub fn zcard(&mut self, key: &str) -> Result<usize> {
        Ok(self.zset_of(key)?.map(|zset| zset.len()).unwrap_or(0))
    }

    pub fn zrem(&mut self, key: &str, members: &[String]) -> Result<usize> {
        let removed = match self.zset_of(key)? {
            Some(zset) => members
                .iter()
                .filter(|member| zset.remove(member).is_some())
                .count(),
            None => 0,
        };
        self.evict_if_emptied(key);
        Ok(removed)
    }

    // ----- key commands --------------------------------------------------

    pub fn del(&mut self, keys: &[String]) -> usize {
        keys.iter()
            .filter(|key| {
                self.evict_if_expired(key);
                if self.data.contains_key(*key) {
                    self.remove_key(key);
                    true
                } else {
                    false
                }
            })
            .count()
    }

    pub fn exists(&mut self, keys: &[String]) -> usize {
        keys.iter().filter(|key| self.live(key).is_some()).count()
    }

    pub fn key_type(&mut self, key: &str) -> Option<ValueKind> {
        self.live(key).map(|stored| stored.value.kind())
    }

    pub fn keys_matching(&mut self, pattern: &str) -> Vec<String> {
        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();
        keys.into_iter()
            .filter(|key| self.live(key).is_some() && glob_match(pattern, key))
            .collect()
    }

    /// Cursor walk over the key space in lexicographic order. The cursor is
    /// an opaque hex encoding of the last key handed out; `"0"` starts and
    /// terminates the iteration. Keys alive at the first call and still
    /// alive when reached are always yielded.
    pub fn scan(
        &mut self,
        cursor: &str,
        pattern: Option<&str>,
        count: usize,
    ) -> Result<(String, Vec<String>)> {
        let count = count.max(1);
        let resume_after = if cursor == "0" {
            None
        } else {
            let bytes = hex::decode(cursor)
                .map_err(|_| CommandError::Syntax("invalid cursor".to_string()))?;
            Some(String::from_utf8(bytes)
                .map_err(|_| CommandError::Syntax("invalid cursor".to_string()))?)
        };

        let mut keys: Vec<String> = self.data.keys().cloned().collect();
        keys.sort();

        let mut out = Vec::new();
        let mut last = None;
        let mut exhausted = true;
        for key in keys {
            if let Some(after) = &resume_after {
                if key.as_str() <= after.as_str() {
                    continue;
                }
            }
            if out.len() >= count {
                exhausted = false;
                break;
            }
            if self.live(&key).is_none() {
                continue;
            }
            if pattern.map(|p| glob_match(p, &key)).unwrap_or(true) {
                out.push(key.clone());
            }
            last = Some(key);
        }

        let next = if exhausted {
            "0".to_string()
        } else {
            hex::encode(last.unwrap_or_default())
        };
        Ok((next, out))
    }

    fn set_expiry(&mut self, key: &str, at: SystemTime) {
        if let Some(stored) = self.data.get_mut(key) {
            stored.expires_at = Some(at);
            self.expiring.insert(key.to_string(), at);
        }
    }

    /// Set an absolute expiry. A timestamp at or before now deletes the key.
    pub fn pexpire_at(&mut self, key: &str, at: SystemTime) -> bool {
        if self.live(key).is_none() {
            return false;
        }
        if at <= SystemTime::now() {
            self.remove_key(key);
        } else {
            self.set_expiry(key, at);
        }
        true
    }

    pub fn persist(&mut self, key: &str) -> bool {
        match self.live(key) {
            Some(stored) => {
                let had_expiry = stored.expires_at.take().is_some();
                if had_expiry {
                    self.expiring.remove(key);
                }
                had_expiry
            }
            None => false,
        }
    }

    /// Remaining lifetime in milliseconds: -2 when absent, -1 when the key
    /// has no expiry.
    pub fn ttl_ms(&mut self, key: &str) -> i64 {
        match self.live(key) {
            Some(stored) => match stored.expires_at {
                Some(at) => at
                    .duration_since(SystemTime::now())
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0),
                None => -1,
            },
            None => -2,
        }
    }

    pub fn flushall(&mut self) {
        self.data.clear();
        self.expiring.clear();
    }
}

fn clamp_index(index: isize, len: isize) -> isize {
    if index < 0 {
        (len + index).max(0)
    } else {
        index
    }
}

/// Redis glob matching: `*`, `?` and `[...]` classes with ranges and `\`
/// escapes.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    glob_match_at(&pattern, &text)
}

fn glob_match_at(pattern: &[char], text: &[char]) -> bool {
    let mut p = 0;
    let mut t = 0;
    while p < pattern.len() {
        match pattern[p] {
            '*' => {
                // Collapse consecutive stars, then try every suffix.
                while p + 1 < pattern.len() && pattern[p + 1] == '*' {
                    p += 1;
                }
                if p + 1 == pattern.len() {
                    return true;
                }
                for skip in 0..=text.len() - t {
                    if glob_match_at(&pattern[p + 1..], &text[t + skip..]) {
                        return true;
                    }
                }
                return false;
            }
            '?' => {
                if t >= text.len() {
                    return false;
                }
                t += 1;
                p += 1;
            }
            '[' => {
                if t >= text.len() {
                    return false;
                }
                let (matched, advance) = match_class(&pattern[p..], text[t]);
                if !matched {
                    return false;
                }
                p += advance;
                t += 1;
            }
            '\\' if p + 1 < pattern.len() => {
                if t >= text.len() || text[t] != pattern[p + 1] {
                    return false;
                }
                p += 2;
                t += 1;
            }
            c => {
                if t >= text.len() || text[t] != c {
                    return false;
                }
                p += 1;
                t += 1;
            }
        }
    }
    t == text.len()
}

fn match_class(pattern: &[char], c: char) -> (bool, usize) {
    // pattern[0] is '['
    let mut i = 1;
    let negated = pattern.get(i) == Some(&'^');
    if negated {
        i += 1;
    }
    let mut matched = false;
    while i < pattern.len() && pattern[i] != ']' {
        if i + 2 < pattern.len() && pattern[i + 1] == '-' && pattern[i + 2] != ']' {
            if pattern[i] <= c && c <= pattern[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if pattern[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    let advance = if i < pattern.len() { i + 1 } else { i };
    (matched != negated, advance)
}
