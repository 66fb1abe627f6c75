//! IR interpreter
//!
//! Executes a frozen script directly against the engine state. Redis calls
//! dispatch through the same [`apply`](crate::backend::memory::apply)
//! function as direct commands, which is what guarantees behavioral
//! identity between the direct API and the script API on the memory
//! backend. Missing values are `Null` throughout, never `false`.

use crate::backend::memory::apply;
use crate::command::Command;
use crate::error::{RedirsError, Result};
use crate::script::expr::{BinOp, CallKind, CmpOp, Expr, LogicOp, UnOp};
use crate::script::registry::CompiledScript;
use crate::script::stmt::{Block, Stmt};
use crate::storage::engine::EngineState;
use crate::value::{Number, Value};

/// Upper bound on loop iterations across one script run; a script that
/// exceeds it aborts with a script error instead of hanging the engine.
const MAX_ITERATIONS: u64 = 1_000_000;

/// Outcome of executing a statement or block
enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Run a compiled script against locked engine state. Any failure aborts
/// the script and surfaces as a script error with the original message,
/// matching how a real server reports errors raised inside `EVAL`.
pub(crate) fn run_script(
    compiled: &CompiledScript,
    state: &mut EngineState,
    keys: &[String],
    args: &[Value],
) -> Result<Value> {
    run_frame(compiled, state, keys, args).map_err(|err| match err {
        err @ RedirsError::Script(_) => err,
        other => RedirsError::Script(other.to_string()),
    })
}

fn run_frame(
    compiled: &CompiledScript,
    state: &mut EngineState,
    keys: &[String],
    args: &[Value],
) -> Result<Value> {
    let script = compiled.ir();
    let mut frame = Frame {
        keys,
        args,
        locals: vec![Value::Null; script.locals.len()],
        state,
        compiled,
        iterations: 0,
    };

    for (slot, (_, init)) in script.locals.iter().enumerate() {
        if let Some(init) = init {
            frame.locals[slot] = frame.eval(init)?;
        }
    }

    match frame.exec_block(&script.body)? {
        Flow::Return(value) => Ok(value),
        _ => match &script.return_expr {
            Some(expr) => frame.eval(expr),
            None => Ok(Value::Null),
        },
    }
}

/// One script activation: locals plus the bound keys and arguments
struct Frame<'a> {
    keys: &'a [String],
    args: &'a [Value],
    locals: Vec<Value>,
    state: &'a mut EngineState,
    compiled: &'a CompiledScript,
    iterations: u64,
}

impl Frame<'_> {
    fn exec_block(&mut self, block: &Block) -> Result<Flow> {
        for stmt in &block.stmts {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow> {
        match stmt {
            Stmt::Assign { local, expr } => {
                self.locals[*local] = self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then_block)
                } else {
                    self.exec_block(else_block)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond)?.is_truthy() {
                    self.iterations += 1;
                    if self.iterations > MAX_ITERATIONS {
                        return Err(RedirsError::Script(
                            "script exceeded the iteration limit".to_string(),
                        ));
                    }
                    match self.exec_block(body)? {
                        Flow::Normal | Flow::Continue => {}
                        Flow::Break => break,
                        ret @ Flow::Return(_) => return Ok(ret),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Break => Ok(Flow::Break),
            Stmt::Continue => Ok(Flow::Continue),
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval(expr)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Lit(value) => Ok(value.clone()),
            Expr::Local(id) => Ok(self.locals[*id].clone()),
            Expr::KeyRef(id) => Ok(Value::Str(self.keys[*id].clone())),
            Expr::ArgRef(id) => Ok(self.args[*id].clone()),
            Expr::BinOp { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                num_binop(*op, &lhs, &rhs)
            }
            Expr::UnOp { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnOp::Neg => match arith_num(&value)? {
                        Number::Int(n) => Ok(Value::Int(-n)),
                        Number::Float(f) => Ok(Value::Float(-f)),
                    },
                }
            }
            Expr::Compare { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                compare(*op, &lhs, &rhs)
            }
            Expr::Logical { op, operands } => {
                let (last, rest) = operands
                    .split_last()
                    .expect("validated: logical operands are non-empty");
                for operand in rest {
                    let value = self.eval(operand)?;
                    let decided = match op {
                        LogicOp::And => !value.is_truthy(),
                        LogicOp::Or => value.is_truthy(),
                    };
                    if decided {
                        return Ok(value);
                    }
                }
                self.eval(last)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                Ok(index_value(&target, &index))
            }
            Expr::Concat(operands) => {
                let mut out = String::new();
                for operand in operands {
                    out.push_str(&self.eval(operand)?.redis_str());
                }
                Ok(Value::Str(out))
            }
            Expr::ToNum(expr) => {
                let value = self.eval(expr)?;
                Ok(to_num(&value))
            }
            Expr::ToIntStr(expr) => {
                let value = self.eval(expr)?;
                Ok(to_int_str(&value))
            }
            Expr::ToStr(expr) => {
                let value = self.eval(expr)?;
                Ok(Value::Str(value.redis_str()))
            }
            Expr::Cond { cond, then, other } => {
                if self.eval(cond)?.is_truthy() {
                    self.eval(then)
                } else {
                    self.eval(other)
                }
            }
            Expr::Call { kind, name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                self.call(*kind, name, values)
            }
        }
    }

    fn call(&mut self, kind: CallKind, name: &str, args: Vec<Value>) -> Result<Value> {
        match kind {
            CallKind::Redis => {
                let cmd = Command::from_call(name, args)?;
                apply(self.state, &cmd)
            }
            CallKind::General => match name {
                "error" => Err(RedirsError::Script(args[0].redis_str())),
                other => Err(RedirsError::Script(format!("unknown general op '{other}'"))),
            },
            CallKind::Helper => match name {
                "tostr" => Ok(Value::Str(args[0].redis_str())),
                "tonum" => Ok(to_num(&args[0])),
                "tointstr" => Ok(to_int_str(&args[0])),
                other => Err(RedirsError::Script(format!("unknown helper op '{other}'"))),
            },
            CallKind::Plugin => {
                let op = self
                    .compiled
                    .plugins()
                    .op(name)
                    .ok_or_else(|| RedirsError::Script(format!("unknown plugin op '{name}'")))?;
                (op.run)(self.state, &args)
            }
        }
    }
}

/// Numeric view for arithmetic: integers, floats and numeric strings only.
fn arith_num(value: &Value) -> Result<Number> {
    match value {
        Value::Int(_) | Value::Float(_) | Value::Str(_) => value.as_number(),
        _ => None,
    }
    .ok_or_else(|| {
        RedirsError::Script(format!(
            "attempt to perform arithmetic on {:?}",
            value
        ))
    })
}

fn num_binop(op: BinOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    let lhs = arith_num(lhs)?;
    let rhs = arith_num(rhs)?;
    // Division always yields a float; any float operand makes the result a
    // float; mod by zero is an error on both backends.
    match (op, lhs, rhs) {
        (BinOp::Div, l, r) => Ok(Value::Float(l.as_f64() / r.as_f64())),
        (BinOp::Mod, _, Number::Int(0)) => {
            Err(RedirsError::Script("division by zero".to_string()))
        }
        (BinOp::Mod, _, Number::Float(f)) if f == 0.0 => {
            Err(RedirsError::Script("division by zero".to_string()))
        }
        (op, Number::Int(l), Number::Int(r)) => {
            let out = match op {
                BinOp::Add => l.checked_add(r),
                BinOp::Sub => l.checked_sub(r),
                BinOp::Mul => l.checked_mul(r),
                // Floored modulo, the Lua semantics.
                BinOp::Mod => l.checked_rem(r).map(|m| {
                    if m != 0 && (m < 0) != (r < 0) {
                        m + r
                    } else {
                        m
                    }
                }),
                BinOp::Div => unreachable!(),
            };
            out.map(Value::Int).ok_or_else(|| {
                RedirsError::Script("integer overflow in arithmetic".to_string())
            })
        }
        (op, l, r) => {
            let (l, r) = (l.as_f64(), r.as_f64());
            Ok(Value::Float(match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Mod => l - (l / r).floor() * r,
                BinOp::Div => unreachable!(),
            }))
        }
    }
}

/// Structural equality with the integer/float split erased
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(l), Value::Float(r)) | (Value::Float(r), Value::Int(l)) => *l as f64 == *r,
        (Value::List(l), Value::List(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Map(l), Value::Map(r)) => {
            l.len() == r.len()
                && l.iter()
                    .zip(r)
                    .all(|((lk, lv), (rk, rv))| lk == rk && values_equal(lv, rv))
        }
        (l, r) => l == r,
    }
}

fn compare(op: CmpOp, lhs: &Value, rhs: &Value) -> Result<Value> {
    match op {
        CmpOp::Eq => return Ok(Value::Bool(values_equal(lhs, rhs))),
        CmpOp::Ne => return Ok(Value::Bool(!values_equal(lhs, rhs))),
        _ => {}
    }
    // Ordered comparison: two strings compare lexicographically, any other
    // combination coerces to numbers.
    let ordering = match (lhs, rhs) {
        (Value::Str(l), Value::Str(r)) => l.cmp(r),
        _ => {
            let l = arith_num(lhs)?.as_f64();
            let r = arith_num(rhs)?.as_f64();
            l.partial_cmp(&r).ok_or_else(|| {
                RedirsError::Script("comparison with NaN".to_string())
            })?
        }
    };
    let result = match op {
        CmpOp::Lt => ordering.is_lt(),
        CmpOp::Le => ordering.is_le(),
        CmpOp::Gt => ordering.is_gt(),
        CmpOp::Ge => ordering.is_ge(),
        CmpOp::Eq | CmpOp::Ne => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// 0-based list indexing with negative wrap-around; string keys address
/// maps. Everything out of range or unindexable is `Null`.
fn index_value(target: &Value, index: &Value) -> Value {
    match target {
        Value::List(items) => {
            let idx = match index.as_number() {
                Some(Number::Int(n)) => n,
                Some(Number::Float(f)) if f.fract() == 0.0 => f as i64,
                _ => return Value::Null,
            };
            let len = items.len() as i64;
            let idx = if idx < 0 { len + idx } else { idx };
            if idx < 0 || idx >= len {
                Value::Null
            } else {
                items[idx as usize].clone()
            }
        }
        Value::Map(map) => match index {
            Value::Str(key) => map.get(key).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        },
        _ => Value::Null,
    }
}

fn to_num(value: &Value) -> Value {
    match value {
        Value::Int(_) | Value::Float(_) => value.clone(),
        Value::Str(_) => value
            .as_number()
            .map(Number::into_value)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn to_int_str(value: &Value) -> Value {
    // Routed through the same coercion as ToNum so booleans and
    // containers come out as Null on both backends.
    match to_num(value) {
        Value::Int(n) => Value::Str(n.to_string()),
        Value::Float(f) => Value::Str(format!("{}", f.trunc() as i64)),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promotion_rules() {
        let two = Value::Int(2);
        let three = Value::Int(3);
        assert_eq!(num_binop(BinOp::Add, &two, &three).unwrap(), Value::Int(5));
        assert_eq!(
            num_binop(BinOp::Div, &Value::Int(6), &three).unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            num_binop(BinOp::Add, &Value::Float(1.5), &two).unwrap(),
            Value::Float(3.5)
        );
    }

    #[test]
    fn test_string_coercion_in_arithmetic() {
        assert_eq!(
            num_binop(BinOp::Add, &Value::Str("4".into()), &Value::Int(1)).unwrap(),
            Value::Int(5)
        );
        assert!(num_binop(BinOp::Add, &Value::Str("x".into()), &Value::Int(1)).is_err());
        assert!(num_binop(BinOp::Add, &Value::Bool(true), &Value::Int(1)).is_err());
    }

    #[test]
    fn test_mod_by_zero_errors() {
        assert!(num_binop(BinOp::Mod, &Value::Int(5), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_compare_mixed_coerces() {
        assert_eq!(
            compare(CmpOp::Lt, &Value::Str("2".into()), &Value::Int(10)).unwrap(),
            Value::Bool(true)
        );
        // Two strings compare lexicographically.
        assert_eq!(
            compare(CmpOp::Lt, &Value::Str("2".into()), &Value::Str("10".into())).unwrap(),
            Value::Bool(false)
        );
        assert_eq!(
            compare(CmpOp::Eq, &Value::Int(1), &Value::Float(1.0)).unwrap(),
            Value::Bool(true)
        );
        // Equality is type-sensitive between strings and numbers.
        assert_eq!(
            compare(CmpOp::Eq, &Value::Str("1".into()), &Value::Int(1)).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_index_semantics() {
        let list = Value::List(vec![Value::Int(10), Value::Int(20), Value::Int(30)]);
        assert_eq!(index_value(&list, &Value::Int(0)), Value::Int(10));
        assert_eq!(index_value(&list, &Value::Int(-1)), Value::Int(30));
        assert_eq!(index_value(&list, &Value::Int(7)), Value::Null);
        assert_eq!(index_value(&Value::Null, &Value::Int(0)), Value::Null);

        let mut map = std::collections::BTreeMap::new();
        map.insert("a".to_string(), Value::Int(1));
        let map = Value::Map(map);
        assert_eq!(index_value(&map, &Value::Str("a".into())), Value::Int(1));
        assert_eq!(index_value(&map, &Value::Str("b".into())), Value::Null);
    }

    #[test]
    fn test_to_int_str() {
        assert_eq!(to_int_str(&Value::Float(3.9)), Value::Str("3".to_string()));
        assert_eq!(to_int_str(&Value::Float(-3.9)), Value::Str("-3".to_string()));
        assert_eq!(to_int_str(&Value::Str("x".into())), Value::Null);
    }
}
