//! Structural checks on the emitted Lua artifacts

use std::sync::Arc;

use redirs::script::registry;
use redirs::{Expr, FnContext, LuaPatch, PluginRegistry, RedisHash, RedisList, RedisZSet, Value};

fn compile(ctx: &FnContext) -> redirs::script::CompiledScript {
    registry::compile(ctx, Arc::new(PluginRegistry::new())).unwrap()
}

#[test]
fn test_script_skeleton() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let arg = ctx.add_arg("a");
    let list = RedisList::new(key);
    ctx.root().stmt(list.rpush(vec![arg.expr()]));
    ctx.set_return_value(list.llen());

    let compiled = compile(&ctx);
    let lua = compiled.lua();

    // Argument framing: one JSON blob in ARGV[1], decoded once.
    assert!(lua.contains("cjson.decode(ARGV[1])"));
    // Keys stay positional, 1-based.
    assert!(lua.contains("KEYS[1]"));
    // Return canonicalization wraps the outermost value.
    assert!(lua.contains("return cjson.encode(redirs_export("));
    // The sha matches a fresh hash of the text.
    assert_eq!(compiled.sha(), registry::sha1_hex(lua));
}

#[test]
fn test_nil_repairs_follow_the_policy_table() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let hash = RedisHash::new(key);
    ctx.set_return_value(hash.hget(Expr::lit("f")));
    let lua = compile(&ctx).lua().to_string();
    assert!(lua.contains("redirs_nil(redis.call('HGET'"));

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let zset = RedisZSet::new(key);
    ctx.set_return_value(zset.zpop_min(None));
    let lua = compile(&ctx).lua().to_string();
    assert!(lua.contains("redirs_zpop_one(redis.call('ZPOPMIN'"));

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let hash = RedisHash::new(key);
    ctx.set_return_value(hash.hgetall());
    let lua = compile(&ctx).lua().to_string();
    assert!(lua.contains("redirs_pairmap(redis.call('HGETALL'"));
}

#[test]
fn test_index_goes_through_the_adjustment_helper() {
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let list = ctx.add_local("list", Some(RedisList::new(key).lrange(Expr::lit(0), Expr::lit(-1))));
    ctx.set_return_value(list.expr().index(Expr::lit(1)));

    let lua = compile(&ctx).lua().to_string();
    assert!(lua.contains("redirs_index("));
    // The helper owns the 1-based adjustment; no bare t[i] leaks out.
    assert!(lua.contains("t[i + 1]"));
}

#[test]
fn test_identical_scripts_share_a_hash() {
    let build = || {
        let ctx = FnContext::new();
        let key = ctx.add_key("k");
        let arg = ctx.add_arg("n");
        let list = RedisList::new(key);
        ctx.root().stmt(list.rpush(vec![arg.expr()]));
        ctx.set_return_value(list.llen());
        compile(&ctx).sha().to_string()
    };
    assert_eq!(build(), build());

    // A different script hashes differently.
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).llen());
    assert_ne!(compile(&ctx).sha(), build());
}

#[test]
fn test_patch_rewrites_redis_call() {
    let mut plugins = PluginRegistry::new();
    plugins.register_patch(
        "get",
        LuaPatch {
            helper_name: "redirs_traced_get".to_string(),
            body: "local function redirs_traced_get(k) local v = redis.call('GET', k) \
                   if v == false then return nil end return v end"
                .to_string(),
        },
    );

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(Expr::redis_call("get", vec![key.expr()]));
    let compiled = registry::compile(&ctx, Arc::new(plugins)).unwrap();

    assert!(compiled.lua().contains("redirs_traced_get(KEYS[1])"));
    assert!(compiled
        .lua()
        .contains("local function redirs_traced_get"));
    // The raw call site is gone.
    assert!(!compiled.lua().contains("redis.call('GET', redirs_tostr"));
}

#[test]
fn test_literals_lower_faithfully() {
    let ctx = FnContext::new();
    ctx.set_return_value(Expr::lit(Value::List(vec![
        Value::Int(1),
        Value::Float(2.5),
        Value::Str("it's".to_string()),
        Value::Null,
    ])));

    let lua = compile(&ctx).lua().to_string();
    assert!(lua.contains("{ 1, 2.5, 'it\\'s', cjson.null }"));
}

#[test]
fn test_json_args_round_trip_shape() {
    // The wire frame for arguments is strict JSON of the positional list.
    let args = Value::List(vec![
        Value::Int(-3),
        Value::Str("x".to_string()),
        Value::Null,
        Value::Bool(true),
    ]);
    assert_eq!(args.encode(), "[-3,\"x\",null,true]");
    assert_eq!(Value::decode(&args.encode()).unwrap(), args);
}
