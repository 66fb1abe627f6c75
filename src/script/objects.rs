//! Typed script objects
//!
//! Semantic wrappers over a key expression. Each domain method desugars to
//! a `Call("redis", ...)` IR node with the key as the first argument, so a
//! wrapper is only naming convenience; the command table still owns the
//! semantics.

use crate::script::expr::Expr;

macro_rules! key_wrapper {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone)]
        pub struct $name {
            key: Expr,
        }

        impl $name {
            pub fn new<E: Into<Expr>>(key: E) -> Self {
                Self { key: key.into() }
            }

            /// The underlying key expression
            pub fn key(&self) -> Expr {
                self.key.clone()
            }

            fn call(&self, name: &str, mut rest: Vec<Expr>) -> Expr {
                let mut args = vec![self.key.clone()];
                args.append(&mut rest);
                Expr::redis_call(name, args)
            }

            /// Whether the key currently exists
            pub fn exists(&self) -> Expr {
                self.call("exists", vec![])
            }

            /// Delete the key
            pub fn delete(&self) -> Expr {
                self.call("del", vec![])
            }

            /// Remaining TTL in seconds
            pub fn ttl(&self) -> Expr {
                self.call("ttl", vec![])
            }
        }
    };
}

key_wrapper! {
    /// A plain string variable
    RedisVar
}

key_wrapper! {
    /// A list key
    RedisList
}

key_wrapper! {
    /// A hash key
    RedisHash
}

key_wrapper! {
    /// A set key
    RedisSet
}

key_wrapper! {
    /// A sorted set key
    RedisZSet
}

impl RedisVar {
    pub fn get(&self) -> Expr {
        self.call("get", vec![])
    }

    pub fn set<E: Into<Expr>>(&self, value: E) -> Expr {
        self.call("set", vec![value.into()])
    }

    pub fn incr_by<E: Into<Expr>>(&self, delta: E) -> Expr {
        self.call("incrby", vec![delta.into()])
    }
}

impl RedisList {
    pub fn lpush(&self, values: Vec<Expr>) -> Expr {
        self.call("lpush", values)
    }

    pub fn rpush(&self, values: Vec<Expr>) -> Expr {
        self.call("rpush", values)
    }

    /// Pop from the head. Without a count the result is the element or
    /// `Null`; with one it is a list.
    pub fn lpop(&self, count: Option<Expr>) -> Expr {
        self.call("lpop", count.into_iter().collect())
    }

    /// Pop from the tail, same shape rules as [`RedisList::lpop`]
    pub fn rpop(&self, count: Option<Expr>) -> Expr {
        self.call("rpop", count.into_iter().collect())
    }

    pub fn lrange<S: Into<Expr>, T: Into<Expr>>(&self, start: S, stop: T) -> Expr {
        self.call("lrange", vec![start.into(), stop.into()])
    }

    pub fn llen(&self) -> Expr {
        self.call("llen", vec![])
    }

    pub fn lindex<E: Into<Expr>>(&self, index: E) -> Expr {
        self.call("lindex", vec![index.into()])
    }
}

impl RedisHash {
    /// Set fields from (field, value) pairs
    pub fn hset(&self, pairs: Vec<(Expr, Expr)>) -> Expr {
        let mut flat = Vec::with_capacity(pairs.len() * 2);
        for (field, value) in pairs {
            flat.push(field);
            flat.push(value);
        }
        self.call("hset", flat)
    }

    pub fn hget<E: Into<Expr>>(&self, field: E) -> Expr {
        self.call("hget", vec![field.into()])
    }

    pub fn hdel(&self, fields: Vec<Expr>) -> Expr {
        self.call("hdel", fields)
    }

    pub fn hgetall(&self) -> Expr {
        self.call("hgetall", vec![])
    }

    pub fn hkeys(&self) -> Expr {
        self.call("hkeys", vec![])
    }

    pub fn hvals(&self) -> Expr {
        self.call("hvals", vec![])
    }

    pub fn hmget(&self, fields: Vec<Expr>) -> Expr {
        self.call("hmget", fields)
    }

    pub fn hincr_by<F: Into<Expr>, D: Into<Expr>>(&self, field: F, delta: D) -> Expr {
        self.call("hincrby", vec![field.into(), delta.into()])
    }
}

impl RedisSet {
    pub fn sadd(&self, members: Vec<Expr>) -> Expr {
        self.call("sadd", members)
    }

    pub fn srem(&self, members: Vec<Expr>) -> Expr {
        self.call("srem", members)
    }

    pub fn sismember<E: Into<Expr>>(&self, member: E) -> Expr {
        self.call("sismember", vec![member.into()])
    }

    pub fn scard(&self) -> Expr {
        self.call("scard", vec![])
    }

    pub fn smembers(&self) -> Expr {
        self.call("smembers", vec![])
    }
}

impl RedisZSet {
    pub fn zadd<S: Into<Expr>, M: Into<Expr>>(&self, score: S, member: M) -> Expr {
        self.call("zadd", vec![score.into(), member.into()])
    }

    /// Add several (score, member) pairs at once
    pub fn zadd_multi(&self, pairs: Vec<(Expr, Expr)>) -> Expr {
        let mut flat = Vec::with_capacity(pairs.len() * 2);
        for (score, member) in pairs {
            flat.push(score);
            flat.push(member);
        }
        self.call("zadd", flat)
    }

    pub fn zrange<S: Into<Expr>, T: Into<Expr>>(&self, start: S, stop: T) -> Expr {
        self.call("zrange", vec![start.into(), stop.into()])
    }

    /// Pop the lowest-scored entries. Without a count the result is one
    /// `[member, score]` pair or `Null`; with one it is a list of pairs.
    pub fn zpop_min(&self, count: Option<Expr>) -> Expr {
        self.call("zpopmin", count.into_iter().collect())
    }

    /// Pop the highest-scored entries, same shape rules as
    /// [`RedisZSet::zpop_min`]
    pub fn zpop_max(&self, count: Option<Expr>) -> Expr {
        self.call("zpopmax", count.into_iter().collect())
    }

    pub fn zcard(&self) -> Expr {
        self.call("zcard", vec![])
    }

    pub fn zrem(&self, members: Vec<Expr>) -> Expr {
        self.call("zrem", members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::CallKind;

    #[test]
    fn test_wrapper_desugars_to_call() {
        let list = RedisList::new(Expr::KeyRef(0));
        match list.lpop(None) {
            Expr::Call { kind, name, args } => {
                assert_eq!(kind, CallKind::Redis);
                assert_eq!(name, "lpop");
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn test_hset_flattens_pairs() {
        let hash = RedisHash::new(Expr::KeyRef(0));
        match hash.hset(vec![(Expr::lit("a"), Expr::lit("1"))]) {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "hset");
                // key + field + value
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }
}
