//! Direct command behavior on the memory backend

use std::thread;
use std::time::Duration;

use redirs::{Client, CommandError, RedirsError, SetMode, SetOptions, Value};

#[test]
fn test_lpop_on_absent_key_is_null() {
    let client = Client::memory();
    // Scalar pop on a missing key: None, never a boolean-ish sentinel.
    assert_eq!(client.lpop("k").unwrap(), None);
    assert_eq!(client.rpop("k").unwrap(), None);
    // Count pop on a missing key: empty list.
    assert_eq!(client.lpop_count("k", 3).unwrap(), Vec::<String>::new());
}

#[test]
fn test_expire_deletes_after_deadline() {
    let client = Client::memory();
    client.set("k", "v").unwrap();
    assert!(client.pexpire("k", 1).unwrap());

    thread::sleep(Duration::from_millis(10));
    assert_eq!(client.exists(&["k"]).unwrap(), 0);
    assert_eq!(client.ttl("k").unwrap(), -2);
}

#[test]
fn test_ttl_monotonicity() {
    let client = Client::memory();
    client.set("k", "v").unwrap();

    assert!(client.expire("k", 100).unwrap());
    let ttl = client.ttl("k").unwrap();
    assert!(ttl >= 0 && ttl <= 100, "ttl {ttl} out of range");

    assert!(client.persist("k").unwrap());
    assert_eq!(client.ttl("k").unwrap(), -1);
}

#[test]
fn test_expire_on_absent_key_fails_without_error() {
    let client = Client::memory();
    assert!(!client.expire("ghost", 10).unwrap());
    // Zero/negative deadline deletes an existing key.
    client.set("k", "v").unwrap();
    assert!(client.expire("k", 0).unwrap());
    assert_eq!(client.exists(&["k"]).unwrap(), 0);
}

#[test]
fn test_pipeline_with_error_slot() {
    let client = Client::memory();
    let mut pipe = client.pipeline();
    pipe.set("a", "1").lpush("a", &["x"]).get("a");
    let results = pipe.execute();

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(RedirsError::Command(CommandError::WrongType))
    ));
    assert_eq!(
        *results[2].as_ref().unwrap(),
        Value::Str("1".to_string())
    );
}

#[test]
fn test_empty_containers_never_exist() {
    let client = Client::memory();

    client.rpush("l", &["x"]).unwrap();
    client.lpop("l").unwrap();
    assert_eq!(client.key_type("l").unwrap(), "none");

    client.hset("h", &[("f", "v")]).unwrap();
    client.hdel("h", &["f"]).unwrap();
    assert_eq!(client.key_type("h").unwrap(), "none");

    client.sadd("s", &["m"]).unwrap();
    client.srem("s", &["m"]).unwrap();
    assert_eq!(client.key_type("s").unwrap(), "none");

    client.zadd("z", 1.0, "m").unwrap();
    client.zrem("z", &["m"]).unwrap();
    assert_eq!(client.key_type("z").unwrap(), "none");
}

#[test]
fn test_set_modes_and_previous() {
    let client = Client::memory();
    let nx = SetOptions {
        mode: SetMode::IfMissing,
        ..Default::default()
    };
    assert_eq!(
        client.set_opts("k", "a", nx.clone()).unwrap(),
        Value::Bool(true)
    );
    assert_eq!(
        client.set_opts("k", "b", nx).unwrap(),
        Value::Bool(false)
    );
    assert_eq!(client.get("k").unwrap(), Some("a".to_string()));

    let get_prev = SetOptions {
        return_previous: true,
        ..Default::default()
    };
    assert_eq!(
        client.set_opts("k", "c", get_prev).unwrap(),
        Value::Str("a".to_string())
    );
}

#[test]
fn test_incr_errors_on_non_integer() {
    let client = Client::memory();
    client.set("k", "abc").unwrap();
    assert!(matches!(
        client.incr_by("k", 1),
        Err(RedirsError::Command(CommandError::NotInteger))
    ));
    assert_eq!(client.incr_by("n", 41).unwrap(), 41);
    assert_eq!(client.incr_by("n", 1).unwrap(), 42);
}

#[test]
fn test_zrange_start_past_end_is_empty() {
    let client = Client::memory();
    client.zadd_multi("z", &[(1.0, "a"), (2.0, "b"), (3.0, "c")]).unwrap();
    assert_eq!(client.zrange("z", 5, 10).unwrap(), Vec::<String>::new());
    assert_eq!(client.zrange("z", 1, 10).unwrap(), vec!["b", "c"]);
}

#[test]
fn test_zadd_rejects_nan_score() {
    let client = Client::memory();
    assert!(matches!(
        client.zadd("z", f64::NAN, "m"),
        Err(RedirsError::Command(CommandError::NotFloat))
    ));
    assert_eq!(client.exists(&["z"]).unwrap(), 0);
    // Infinite scores are stored and ordered normally.
    client.zadd_multi("z", &[(f64::INFINITY, "top"), (0.0, "low")]).unwrap();
    assert_eq!(client.zrange("z", 0, -1).unwrap(), vec!["low", "top"]);
}

#[test]
fn test_zset_tie_breaks_lexicographically() {
    let client = Client::memory();
    client
        .zadd_multi("z", &[(1.0, "b"), (1.0, "a"), (0.5, "z")])
        .unwrap();
    assert_eq!(
        client.zrange("z", 0, -1).unwrap(),
        vec!["z".to_string(), "a".to_string(), "b".to_string()]
    );
    assert_eq!(
        client.zpop_min("z").unwrap(),
        Some(("z".to_string(), 0.5))
    );
    assert_eq!(
        client.zpop_max_count("z", 10).unwrap(),
        vec![("b".to_string(), 1.0), ("a".to_string(), 1.0)]
    );
}

#[test]
fn test_scan_covers_live_keys() {
    let client = Client::memory();
    for i in 0..40 {
        client.set(&format!("key:{i:02}"), "v").unwrap();
    }

    let mut seen = Vec::new();
    let mut cursor = "0".to_string();
    loop {
        let (next, keys) = client.scan(&cursor, Some("key:*"), Some(7)).unwrap();
        seen.extend(keys);
        if next == "0" {
            break;
        }
        cursor = next;
    }
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 40);
}

#[test]
fn test_prefix_namespacing() {
    let client = Client::new(redirs::Config::memory_with_prefix("ns")).unwrap();
    client.set("a", "1").unwrap();
    client.set("b", "2").unwrap();

    let mut keys = client.keys("*").unwrap();
    keys.sort();
    assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);

    let (_, scanned) = client.scan("0", None, Some(100)).unwrap();
    assert_eq!(scanned.len(), 2);
}

#[test]
fn test_flushall() {
    let client = Client::memory();
    client.set("a", "1").unwrap();
    client.rpush("l", &["x"]).unwrap();
    client.flushall().unwrap();
    assert_eq!(client.exists(&["a", "l"]).unwrap(), 0);
}

#[test]
fn test_hash_surface() {
    let client = Client::memory();
    assert_eq!(client.hset("h", &[("a", "1"), ("b", "2")]).unwrap(), 2);
    assert_eq!(client.hget("h", "a").unwrap(), Some("1".to_string()));
    assert_eq!(client.hget("h", "x").unwrap(), None);
    assert_eq!(
        client.hmget("h", &["a", "x", "b"]).unwrap(),
        vec![Some("1".to_string()), None, Some("2".to_string())]
    );
    assert_eq!(client.hkeys("h").unwrap(), vec!["a", "b"]);
    assert_eq!(client.hvals("h").unwrap(), vec!["1", "2"]);
    assert_eq!(client.hincr_by("h", "a", 9).unwrap(), 10);

    let all = client.hgetall("h").unwrap();
    assert_eq!(all.get("a").map(String::as_str), Some("10"));
    assert_eq!(all.len(), 2);
}
