//! Script behavior through the builder, interpreter and memory backend

use redirs::{Client, Expr, FnContext, RedisHash, RedisList, Value};

/// The list-filter script: drain the input list, route each element to the
/// left or right output depending on a threshold argument.
fn filter_list(client: &Client) -> redirs::RegisteredScript {
    let ctx = FnContext::new();
    let inp = ctx.add_key("inp");
    let left = ctx.add_key("left");
    let right = ctx.add_key("right");
    let cmp = ctx.add_arg("cmp");
    let cur = ctx.add_local("cur", None);

    let root = ctx.root();
    let body = root.while_(Expr::lit(true));
    body.assign(cur, RedisList::new(inp).lpop(None));
    let (done, _) = body.if_(cur.expr().eq_(Expr::lit(Value::Null)));
    done.break_();
    let (small, big) = body.if_(cur.expr().to_num().lt_(cmp.expr()));
    small.stmt(RedisList::new(left).rpush(vec![cur.expr()]));
    big.stmt(RedisList::new(right).rpush(vec![cur.expr()]));

    client.register_script(&ctx).unwrap()
}

#[test]
fn test_filter_list_scenario() {
    let client = Client::memory();
    client.rpush("mylist", &["1", "3", "2", "4"]).unwrap();

    let script = filter_list(&client);
    let result = script
        .run(
            &[("inp", "mylist"), ("left", "small"), ("right", "big")],
            &[("cmp", Value::Int(3))],
        )
        .unwrap();
    assert_eq!(result, Value::Null);

    assert_eq!(client.lrange("mylist", 0, -1).unwrap(), Vec::<String>::new());
    assert_eq!(client.lrange("small", 0, -1).unwrap(), vec!["1", "2"]);
    assert_eq!(client.lrange("big", 0, -1).unwrap(), vec!["3", "4"]);
    // The drained input no longer exists at all.
    assert_eq!(client.exists(&["mylist"]).unwrap(), 0);
}

/// Cascading lookup over a stack of hash frames: walk from the top frame
/// down and return the first binding of the field.
fn get_cascading(client: &Client) -> redirs::RegisteredScript {
    let ctx = FnContext::new();
    let base = ctx.add_key("base");
    let field = ctx.add_arg("field");
    let frame = ctx.add_local(
        "frame",
        Some(
            Expr::redis_call(
                "get",
                vec![Expr::concat(vec![base.expr(), Expr::lit(":size")])],
            )
            .to_num()
            .sub(Expr::lit(1)),
        ),
    );
    let val = ctx.add_local("val", None);

    let root = ctx.root();
    let body = root.while_(frame.expr().ge_(Expr::lit(0)));
    let frame_key = Expr::concat(vec![
        base.expr(),
        Expr::lit(":"),
        frame.expr().to_int_str(),
    ]);
    body.assign(val, RedisHash::new(frame_key).hget(field.expr()));
    let (found, _) = body.if_(val.expr().ne_(Expr::lit(Value::Null)));
    found.return_value(val.expr());
    body.assign(frame, frame.expr().sub(Expr::lit(1)));

    client.register_script(&ctx).unwrap()
}

#[test]
fn test_cascading_get_scenario() {
    let client = Client::memory();
    client.set("stack:size", "2").unwrap();
    client.hset("stack:0", &[("a", "1")]).unwrap();
    client.hset("stack:1", &[("b", "2")]).unwrap();

    let script = get_cascading(&client);
    let keys = [("base", "stack")];
    assert_eq!(
        script.run(&keys, &[("field", Value::from("a"))]).unwrap(),
        Value::Str("1".to_string())
    );
    assert_eq!(
        script.run(&keys, &[("field", Value::from("b"))]).unwrap(),
        Value::Str("2".to_string())
    );
    assert_eq!(
        script.run(&keys, &[("field", Value::from("c"))]).unwrap(),
        Value::Null
    );
}

#[test]
fn test_lpop_in_script_is_null_not_false() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).lpop(None));

    let script = client.register_script(&ctx).unwrap();
    assert_eq!(script.run(&[("k", "absent")], &[]).unwrap(), Value::Null);
}

#[test]
fn test_empty_hash_return_collapses_to_null() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisHash::new(key).hgetall());

    let script = client.register_script(&ctx).unwrap();
    assert_eq!(script.run(&[("k", "absent")], &[]).unwrap(), Value::Null);
}

#[test]
fn test_index_adjustment_transparency() {
    let client = Client::memory();
    client.rpush("l", &["a", "b", "c", "d"]).unwrap();

    // Script-side: materialize the list, index it symbolically.
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    let idx = ctx.add_arg("i");
    let list = ctx.add_local("list", Some(RedisList::new(key).lrange(Expr::lit(0), Expr::lit(-1))));
    ctx.set_return_value(list.expr().index(idx.expr()));
    let script = client.register_script(&ctx).unwrap();

    for i in [-4, -1, 0, 2, 3, 7, -9] {
        let inside = script
            .run(&[("k", "l")], &[("i", Value::Int(i))])
            .unwrap();
        let outside = client
            .lindex("l", i)
            .unwrap()
            .map(Value::Str)
            .unwrap_or(Value::Null);
        assert_eq!(inside, outside, "index {i}");
    }
}

#[test]
fn test_script_error_surfaces() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let root = ctx.root();
    root.stmt(Expr::raise(Expr::lit("boom")));

    let script = client.register_script(&ctx).unwrap();
    match script.run(&[], &[]) {
        Err(redirs::RedirsError::Script(message)) => assert_eq!(message, "boom"),
        other => panic!("expected a script error, got {other:?}"),
    }
}

#[test]
fn test_wrong_type_inside_script_aborts() {
    let client = Client::memory();
    client.set("k", "plain-string").unwrap();

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).lpop(None));
    let script = client.register_script(&ctx).unwrap();

    // Inside a script the wrong-type failure surfaces as a script error,
    // the same kind a real server reports for errors raised under EVAL.
    match script.run(&[("k", "k")], &[]) {
        Err(redirs::RedirsError::Script(message)) => {
            assert!(message.contains("WRONGTYPE"), "message: {message}");
        }
        other => panic!("expected a script error, got {other:?}"),
    }
}

#[test]
fn test_named_binding_is_strict() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).llen());
    let script = client.register_script(&ctx).unwrap();

    // Missing key name.
    assert!(script.run(&[], &[]).is_err());
    // Unknown key name.
    assert!(script.run(&[("k", "l"), ("extra", "x")], &[]).is_err());
    // Unknown arg name.
    assert!(script.run(&[("k", "l")], &[("nope", Value::Int(1))]).is_err());
    // Correct binding works.
    assert_eq!(script.run(&[("k", "l")], &[]).unwrap(), Value::Int(0));
}

#[test]
fn test_registration_rejects_bad_scripts_synchronously() {
    let client = Client::memory();
    let ctx = FnContext::new();
    ctx.root().stmt(Expr::redis_call("hmset", vec![]));
    assert!(client.register_script(&ctx).is_err());

    let ctx = FnContext::new();
    ctx.root().break_();
    assert!(client.register_script(&ctx).is_err());
}

#[test]
fn test_arithmetic_and_logic_semantics() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let a = ctx.add_arg("a");
    let b = ctx.add_arg("b");
    // and/or return the deciding operand, not a boolean.
    ctx.set_return_value(Expr::or_(vec![
        Expr::and_(vec![a.expr(), b.expr()]),
        Expr::lit("fallback"),
    ]));
    let script = client.register_script(&ctx).unwrap();

    assert_eq!(
        script
            .run(&[], &[("a", Value::Int(1)), ("b", Value::from("x"))])
            .unwrap(),
        Value::Str("x".to_string())
    );
    // a falsy: and yields a (0), or sees falsy 0 and takes the fallback.
    assert_eq!(
        script
            .run(&[], &[("a", Value::Int(0)), ("b", Value::from("x"))])
            .unwrap(),
        Value::Str("fallback".to_string())
    );
}

#[test]
fn test_division_promotes_to_float_and_canonicalizes() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let a = ctx.add_arg("a");
    let b = ctx.add_arg("b");
    ctx.set_return_value(a.expr().div(b.expr()));
    let script = client.register_script(&ctx).unwrap();

    // 6 / 3 is a float inside the script, but whole floats collapse to
    // integers at the boundary.
    assert_eq!(
        script
            .run(&[], &[("a", Value::Int(6)), ("b", Value::Int(3))])
            .unwrap(),
        Value::Int(2)
    );
    assert_eq!(
        script
            .run(&[], &[("a", Value::Int(7)), ("b", Value::Int(2))])
            .unwrap(),
        Value::Float(3.5)
    );
}

#[test]
fn test_pipeline_runs_scripts_in_position() {
    let client = Client::memory();
    client.rpush("q", &["first", "second"]).unwrap();

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).lpop(None));
    let script = client.register_script(&ctx).unwrap();

    let mut pipe = client.pipeline();
    pipe.set("flag", "1");
    pipe.run_script(&script, &[("k", "q")], &[]).unwrap();
    pipe.get("flag");
    let results = pipe.execute();

    assert_eq!(results.len(), 3);
    assert_eq!(
        *results[1].as_ref().unwrap(),
        Value::Str("first".to_string())
    );
    assert_eq!(
        *results[2].as_ref().unwrap(),
        Value::Str("1".to_string())
    );
    assert_eq!(client.lrange("q", 0, -1).unwrap(), vec!["second"]);
}

#[test]
fn test_plugin_op_runs_in_interpreter() {
    use std::sync::Arc;

    let client = Client::memory();
    let mut plugins = redirs::PluginRegistry::new();
    plugins.register_op(redirs::PluginOp {
        name: "double".to_string(),
        arity: 1,
        run: Arc::new(|_, args| {
            Ok(match &args[0] {
                Value::Int(n) => Value::Int(n * 2),
                other => other.clone(),
            })
        }),
        lua_helper: "local function redirs_plugin_double(x) return x * 2 end".to_string(),
    });

    let ctx = FnContext::new();
    let n = ctx.add_arg("n");
    ctx.set_return_value(Expr::call(
        redirs::script::CallKind::Plugin,
        "double",
        vec![n.expr()],
    ));
    let script = client
        .register_script_with(&ctx, Arc::new(plugins))
        .unwrap();

    assert_eq!(
        script.run(&[], &[("n", Value::Int(21))]).unwrap(),
        Value::Int(42)
    );
    // The plugin helper landed in the emitted Lua.
    assert!(script.lua().contains("redirs_plugin_double"));
}

#[test]
fn test_unknown_plugin_rejected_at_registration() {
    let client = Client::memory();
    let ctx = FnContext::new();
    ctx.set_return_value(Expr::call(
        redirs::script::CallKind::Plugin,
        "missing",
        vec![],
    ));
    assert!(client.register_script(&ctx).is_err());
}

#[test]
fn test_scripts_respect_client_prefix() {
    let client = Client::new(redirs::Config::memory_with_prefix("ns")).unwrap();
    client.rpush("q", &["x"]).unwrap();

    let ctx = FnContext::new();
    let key = ctx.add_key("k");
    ctx.set_return_value(RedisList::new(key).lpop(None));
    let script = client.register_script(&ctx).unwrap();

    assert_eq!(
        script.run(&[("k", "q")], &[]).unwrap(),
        Value::Str("x".to_string())
    );
}

#[test]
fn test_nested_loop_break_and_continue() {
    let client = Client::memory();
    let ctx = FnContext::new();
    let total = ctx.add_local("total", Some(Expr::lit(0)));
    let i = ctx.add_local("i", Some(Expr::lit(0)));
    let j = ctx.add_local("j", None);

    let root = ctx.root();
    let outer = root.while_(i.expr().lt_(Expr::lit(4)));
    outer.assign(i, i.expr().add(Expr::lit(1)));
    // Skip even i entirely.
    let (even, _) = outer.if_(i.expr().rem(Expr::lit(2)).eq_(Expr::lit(0)));
    even.continue_();
    outer.assign(j, Expr::lit(0));
    let inner = outer.while_(Expr::lit(true));
    inner.assign(j, j.expr().add(Expr::lit(1)));
    let (stop, _) = inner.if_(j.expr().ge_(Expr::lit(10)));
    stop.break_();
    outer.assign(total, total.expr().add(j.expr()));
    ctx.set_return_value(total.expr());

    let script = client.register_script(&ctx).unwrap();
    // i runs over 1..=4; odd i (1, 3) each contribute j == 10.
    assert_eq!(script.run(&[], &[]).unwrap(), Value::Int(20));
}
