//! IR to Lua lowering
//!
//! Emits a Lua program acceptable to Redis `EVAL` whose observable behavior
//! matches the interpreter. The divergences between the host model and
//! Redis Lua are repaired here, never left to the user:
//!
//! - non-key arguments travel as one JSON string in `ARGV[1]`, decoded once
//! - user-facing indices are adjusted to Lua's 1-based tables in a helper
//! - commands whose "missing" sentinel is `false` are wrapped to yield nil
//! - flat pair replies (HGETALL, ZPOPMIN) are reshaped to match the host
//! - the return value is canonicalized, collapsing outermost empties
//!
//! Emission is deterministic: identical IR produces identical text, and
//! therefore an identical script hash.

use std::collections::{BTreeMap, BTreeSet};

use crate::command::{self, ReplyPolicy};
use crate::error::{RedirsError, Result};
use crate::script::expr::{BinOp, CallKind, CmpOp, Expr, LogicOp, UnOp};
use crate::script::plugin::PluginRegistry;
use crate::script::stmt::{Block, Script, Stmt};
use crate::value::Value;

/// One entry of the bounded helper library
struct Helper {
    name: &'static str,
    deps: &'static [&'static str],
    body: &'static str,
}

/// Every helper, in canonical emission order
const HELPERS: &[Helper] = &[
    Helper {
        name: "truthy",
        deps: &[],
        body: "\
local function redirs_truthy(v)
  if v == nil or v == false or v == cjson.null then return false end
  if v == 0 or v == '' then return false end
  return true
end",
    },
    Helper {
        name: "tostr",
        deps: &[],
        body: "\
local function redirs_tostr(v)
  if v == nil or v == cjson.null then return '' end
  if v == true then return '1' end
  if v == false then return '0' end
  if type(v) == 'number' then
    if v == math.floor(v) and v ~= math.huge and v ~= -math.huge then
      return string.format('%d', v)
    end
    return tostring(v)
  end
  if type(v) == 'table' then
    if #v > 0 or next(v) == nil then return 'list' end
    return 'map'
  end
  return v
end",
    },
    Helper {
        name: "tonum",
        deps: &[],
        body: "\
local function redirs_tonum(v)
  if type(v) == 'number' then return v end
  if type(v) ~= 'string' then return nil end
  return tonumber(v)
end",
    },
    Helper {
        name: "anynum",
        deps: &["tonum"],
        body: "\
local function redirs_anynum(v)
  local n = redirs_tonum(v)
  if n == nil then error('attempt to perform arithmetic on a non-numeric value') end
  return n
end",
    },
    Helper {
        name: "tointstr",
        deps: &["tonum"],
        body: "\
local function redirs_tointstr(v)
  local n = redirs_tonum(v)
  if n == nil then return nil end
  return string.format('%d', n)
end",
    },
    Helper {
        name: "lt",
        deps: &["anynum"],
        body: "\
local function redirs_lt(a, b)
  if type(a) == 'string' and type(b) == 'string' then return a < b end
  return redirs_anynum(a) < redirs_anynum(b)
end",
    },
    Helper {
        name: "le",
        deps: &["anynum"],
        body: "\
local function redirs_le(a, b)
  if type(a) == 'string' and type(b) == 'string' then return a <= b end
  return redirs_anynum(a) <= redirs_anynum(b)
end",
    },
    Helper {
        name: "gt",
        deps: &["anynum"],
        body: "\
local function redirs_gt(a, b)
  if type(a) == 'string' and type(b) == 'string' then return a > b end
  return redirs_anynum(a) > redirs_anynum(b)
end",
    },
    Helper {
        name: "ge",
        deps: &["anynum"],
        body: "\
local function redirs_ge(a, b)
  if type(a) == 'string' and type(b) == 'string' then return a >= b end
  return redirs_anynum(a) >= redirs_anynum(b)
end",
    },
    Helper {
        name: "mod",
        deps: &["anynum"],
        body: "\
local function redirs_mod(a, b)
  local l = redirs_anynum(a)
  local r = redirs_anynum(b)
  if r == 0 then error('division by zero') end
  return l % r
end",
    },
    Helper {
        name: "nil",
        deps: &[],
        body: "\
local function redirs_nil(v)
  if v == false then return nil end
  return v
end",
    },
    Helper {
        name: "bool",
        deps: &[],
        body: "\
local function redirs_bool(v)
  if v == false or v == nil or v == 0 then return false end
  return true
end",
    },
    Helper {
        name: "status",
        deps: &[],
        body: "\
local function redirs_status(v)
  if type(v) == 'table' and v.ok ~= nil then return v.ok end
  return v
end",
    },
    Helper {
        name: "denull",
        deps: &[],
        body: "\
local function redirs_denull(v)
  if v == cjson.null then return nil end
  return v
end",
    },
    Helper {
        name: "index",
        deps: &[],
        body: "\
local function redirs_index(t, i)
  if type(t) ~= 'table' then return nil end
  local v
  if type(i) == 'string' then
    v = t[i]
  else
    local n = #t
    if i < 0 then i = n + i end
    if i < 0 or i >= n then return nil end
    v = t[i + 1]
  end
  if v == cjson.null then return nil end
  return v
end",
    },
    Helper {
        name: "pairmap",
        deps: &[],
        body: "\
local function redirs_pairmap(t)
  local out = {}
  for i = 1, #t, 2 do out[t[i]] = t[i + 1] end
  return out
end",
    },
    Helper {
        name: "pairlist",
        deps: &[],
        body: "\
local function redirs_pairlist(t)
  if t == false or t == nil then return {} end
  local out = {}
  for i = 1, #t, 2 do out[#out + 1] = { t[i], tonumber(t[i + 1]) } end
  return out
end",
    },
    Helper {
        name: "zpop_one",
        deps: &[],
        body: "\
local function redirs_zpop_one(t)
  if t == false or t == nil or #t == 0 then return nil end
  return { t[1], tonumber(t[2]) }
end",
    },
    Helper {
        name: "holes",
        deps: &[],
        body: "\
local function redirs_holes(t)
  local out = {}
  for i = 1, #t do
    if t[i] == false then out[i] = cjson.null else out[i] = t[i] end
  end
  return out
end",
    },
    Helper {
        name: "export",
        deps: &[],
        body: "\
local function redirs_export(v)
  if v == nil or v == cjson.null then return cjson.null end
  if type(v) == 'table' and next(v) == nil then return cjson.null end
  return v
end",
    },
];

/// Lower a validated script to Lua text.
pub fn emit_lua(script: &Script, plugins: &PluginRegistry) -> Result<String> {
    let mut emitter = Emitter {
        script,
        plugins,
        out: String::new(),
        helpers: BTreeSet::new(),
        extra_helpers: BTreeMap::new(),
    };
    emitter.emit()
}

struct Emitter<'a> {
    script: &'a Script,
    plugins: &'a PluginRegistry,
    out: String,
    helpers: BTreeSet<&'static str>,
    extra_helpers: BTreeMap<String, String>,
}

impl Emitter<'_> {
    fn emit(&mut self) -> Result<String> {
        // Always needed by conditions and the return framing.
        self.need("truthy");
        self.need("export");

        if !self.script.args.is_empty() {
            self.need("denull");
            self.out
                .push_str("local redirs_args = cjson.decode(ARGV[1])\n");
        }

        for (slot, (_, init)) in self.script.locals.iter().enumerate() {
            let init_text = match init {
                Some(expr) => self.expr(expr)?,
                None => "nil".to_string(),
            };
            self.out.push_str(&format!("local v_{slot} = {init_text}\n"));
        }

        let body = self.block(&self.script.body, 0)?;
        self.out.push_str(&body);

        let ret = match &self.script.return_expr {
            Some(expr) => self.expr(expr)?,
            None => "nil".to_string(),
        };
        self.out
            .push_str(&format!("return cjson.encode(redirs_export({ret}))\n"));

        // Assemble: helper prelude in canonical order, then plugin helper
        // bodies, then the program.
        let mut text = String::new();
        for helper in HELPERS {
            if self.helpers.contains(helper.name) {
                text.push_str(helper.body);
                text.push('\n');
            }
        }
        for body in self.extra_helpers.values() {
            text.push_str(body);
            text.push('\n');
        }
        text.push_str(&self.out);
        Ok(text)
    }

    fn need(&mut self, name: &'static str) {
        if self.helpers.insert(name) {
            if let Some(helper) = HELPERS.iter().find(|h| h.name == name) {
                for dep in helper.deps {
                    self.need(dep);
                }
            }
        }
    }

    // ----- statements ----------------------------------------------------

    fn block(&mut self, block: &Block, depth: usize) -> Result<String> {
        self.block_in(block, depth, LoopCtx::None)
    }

    fn block_in(&mut self, block: &Block, depth: usize, ctx: LoopCtx) -> Result<String> {
        let mut out = String::new();
        let pad = "  ".repeat(depth);
        for stmt in &block.stmts {
            match stmt {
                Stmt::Assign { local, expr } => {
                    let expr = self.expr(expr)?;
                    out.push_str(&format!("{pad}v_{local} = {expr}\n"));
                }
                Stmt::Expr(expr) => {
                    let expr = self.expr(expr)?;
                    out.push_str(&format!("{pad}local _ = {expr}\n"));
                }
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let cond = self.expr(cond)?;
                    out.push_str(&format!("{pad}if redirs_truthy({cond}) then\n"));
                    out.push_str(&self.block_in(then_block, depth + 1, ctx)?);
                    if !else_block.stmts.is_empty() {
                        out.push_str(&format!("{pad}else\n"));
                        out.push_str(&self.block_in(else_block, depth + 1, ctx)?);
                    }
                    out.push_str(&format!("{pad}end\n"));
                }
                Stmt::While { cond, body } => {
                    let cond = self.expr(cond)?;
                    out.push_str(&format!("{pad}while redirs_truthy({cond}) do\n"));
                    if block_has_continue(body) {
                        // Lua 5.1 has no continue; run the body inside a
                        // single-pass repeat so continue can break out of
                        // it, and carry real breaks across with a flag.
                        out.push_str(&format!("{pad}  local redirs_broke = false\n"));
                        out.push_str(&format!("{pad}  repeat\n"));
                        out.push_str(&self.block_in(body, depth + 2, LoopCtx::Wrapped)?);
                        out.push_str(&format!("{pad}  until true\n"));
                        out.push_str(&format!("{pad}  if redirs_broke then break end\n"));
                    } else {
                        out.push_str(&self.block_in(body, depth + 1, LoopCtx::Plain)?);
                    }
                    out.push_str(&format!("{pad}end\n"));
                }
                Stmt::Break => match ctx {
                    LoopCtx::Wrapped => {
                        out.push_str(&format!("{pad}redirs_broke = true\n"));
                        out.push_str(&format!("{pad}do break end\n"));
                    }
                    _ => out.push_str(&format!("{pad}do break end\n")),
                },
                Stmt::Continue => {
                    // Only reachable in wrapped loops: breaks the repeat.
                    out.push_str(&format!("{pad}do break end\n"));
                }
                Stmt::Return(expr) => {
                    let expr = match expr {
                        Some(expr) => self.expr(expr)?,
                        None => "nil".to_string(),
                    };
                    out.push_str(&format!(
                        "{pad}do return cjson.encode(redirs_export({expr})) end\n"
                    ));
                }
            }
        }
        Ok(out)
    }

    // ----- expressions ---------------------------------------------------

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::Lit(value) => self.literal(value, false),
            Expr::Local(id) => format!("v_{id}"),
            Expr::KeyRef(id) => format!("KEYS[{}]", id + 1),
            Expr::ArgRef(id) => {
                self.need("denull");
                format!("redirs_denull(redirs_args[{}])", id + 1)
            }
            Expr::BinOp { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                match op {
                    BinOp::Mod => {
                        self.need("mod");
                        format!("redirs_mod({lhs}, {rhs})")
                    }
                    op => {
                        self.need("anynum");
                        let sym = match op {
                            BinOp::Add => "+",
                            BinOp::Sub => "-",
                            BinOp::Mul => "*",
                            BinOp::Div => "/",
                            BinOp::Mod => unreachable!(),
                        };
                        format!("(redirs_anynum({lhs}) {sym} redirs_anynum({rhs}))")
                    }
                }
            }
            Expr::UnOp { op, expr } => {
                let inner = self.expr(expr)?;
                match op {
                    UnOp::Not => {
                        format!("(not redirs_truthy({inner}))")
                    }
                    UnOp::Neg => {
                        self.need("anynum");
                        format!("(-redirs_anynum({inner}))")
                    }
                }
            }
            Expr::Compare { op, lhs, rhs } => {
                let lhs = self.expr(lhs)?;
                let rhs = self.expr(rhs)?;
                match op {
                    CmpOp::Eq => format!("({lhs} == {rhs})"),
                    CmpOp::Ne => format!("({lhs} ~= {rhs})"),
                    CmpOp::Lt => {
                        self.need("lt");
                        format!("redirs_lt({lhs}, {rhs})")
                    }
                    CmpOp::Le => {
                        self.need("le");
                        format!("redirs_le({lhs}, {rhs})")
                    }
                    CmpOp::Gt => {
                        self.need("gt");
                        format!("redirs_gt({lhs}, {rhs})")
                    }
                    CmpOp::Ge => {
                        self.need("ge");
                        format!("redirs_ge({lhs}, {rhs})")
                    }
                }
            }
            Expr::Logical { op, operands } => {
                let (last, rest) = operands
                    .split_last()
                    .ok_or_else(|| RedirsError::Parse("empty logical".to_string()))?;
                let mut parts = Vec::new();
                for (i, operand) in rest.iter().enumerate() {
                    let operand = self.expr(operand)?;
                    let assign = if i == 0 { "local v = " } else { "v = " };
                    let guard = match op {
                        LogicOp::And => "if not redirs_truthy(v) then return v end",
                        LogicOp::Or => "if redirs_truthy(v) then return v end",
                    };
                    parts.push(format!("{assign}{operand}; {guard}"));
                }
                let last = self.expr(last)?;
                parts.push(format!("return {last}"));
                format!("(function() {} end)()", parts.join("; "))
            }
            Expr::Index { target, index } => {
                self.need("index");
                let target = self.expr(target)?;
                let index = self.expr(index)?;
                format!("redirs_index({target}, {index})")
            }
            Expr::Concat(operands) => {
                if operands.is_empty() {
                    return Ok("''".to_string());
                }
                self.need("tostr");
                let parts: Result<Vec<String>> = operands
                    .iter()
                    .map(|operand| Ok(format!("redirs_tostr({})", self.expr(operand)?)))
                    .collect();
                format!("({})", parts?.join(" .. "))
            }
            Expr::ToNum(expr) => {
                self.need("tonum");
                format!("redirs_tonum({})", self.expr(expr)?)
            }
            Expr::ToIntStr(expr) => {
                self.need("tointstr");
                format!("redirs_tointstr({})", self.expr(expr)?)
            }
            Expr::ToStr(expr) => {
                self.need("tostr");
                format!("redirs_tostr({})", self.expr(expr)?)
            }
            Expr::Cond { cond, then, other } => {
                let cond = self.expr(cond)?;
                let then = self.expr(then)?;
                let other = self.expr(other)?;
                format!(
                    "(function() if redirs_truthy({cond}) then return {then} else return {other} end end)()"
                )
            }
            Expr::Call { kind, name, args } => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in args {
                    parts.push(self.expr(arg)?);
                }
                self.call(*kind, name, parts)?
            }
        })
    }

    fn call(&mut self, kind: CallKind, name: &str, args: Vec<String>) -> Result<String> {
        match kind {
            CallKind::Redis => {
                if let Some(patch) = self.plugins.patch(name) {
                    self.extra_helpers
                        .insert(patch.helper_name.clone(), patch.body.clone());
                    return Ok(format!("{}({})", patch.helper_name, args.join(", ")));
                }
                self.redis_call(name, args)
            }
            CallKind::General => match name {
                "error" => {
                    self.need("tostr");
                    Ok(format!("error(redirs_tostr({}))", args.join(", ")))
                }
                other => Err(RedirsError::Parse(format!("unknown general op '{other}'"))),
            },
            CallKind::Helper => {
                let helper: &'static str = match name {
                    "tostr" => "tostr",
                    "tonum" => "tonum",
                    "tointstr" => "tointstr",
                    other => {
                        return Err(RedirsError::Parse(format!("unknown helper op '{other}'")))
                    }
                };
                self.need(helper);
                Ok(format!("redirs_{helper}({})", args.join(", ")))
            }
            CallKind::Plugin => {
                let op = self
                    .plugins
                    .op(name)
                    .ok_or_else(|| RedirsError::Parse(format!("unknown plugin op '{name}'")))?;
                let helper_name = op.helper_name();
                self.extra_helpers
                    .insert(helper_name.clone(), op.lua_helper.clone());
                Ok(format!("{helper_name}({})", args.join(", ")))
            }
        }
    }

    /// Emit a raw Redis call and install the reply repair dictated by the
    /// command's policy. Every argument is stringified; `ARGV`-style string
    /// arguments are what the wire expects anyway.
    fn redis_call(&mut self, name: &str, args: Vec<String>) -> Result<String> {
        let spec = command::lookup(name)?;
        self.need("tostr");
        let mut call = format!("redis.call('{}'", name.to_uppercase());
        let arg_count = args.len();
        for arg in args {
            call.push_str(&format!(", redirs_tostr({arg})"));
        }
        call.push(')');

        Ok(match spec.policy {
            // The count-resolved pop policies never appear in the static
            // table; PopString/PopScored below branch on the arg count.
            ReplyPolicy::Int
            | ReplyPolicy::StrList
            | ReplyPolicy::Scan
            | ReplyPolicy::ScoredPair
            | ReplyPolicy::ScoredPairs => call,
            ReplyPolicy::Ok => format!("({call} and nil)"),
            ReplyPolicy::OptString => {
                self.need("nil");
                format!("redirs_nil({call})")
            }
            ReplyPolicy::Bool => {
                self.need("bool");
                format!("redirs_bool({call})")
            }
            ReplyPolicy::OptStrList => {
                self.need("holes");
                format!("redirs_holes({call})")
            }
            ReplyPolicy::PairMap => {
                self.need("pairmap");
                format!("redirs_pairmap({call})")
            }
            ReplyPolicy::TypeName => {
                self.need("status");
                format!("redirs_status({call})")
            }
            ReplyPolicy::PopString => {
                if arg_count > 1 {
                    format!("({call} or {{}})")
                } else {
                    self.need("nil");
                    format!("redirs_nil({call})")
                }
            }
            ReplyPolicy::PopScored => {
                if arg_count > 1 {
                    self.need("pairlist");
                    format!("redirs_pairlist({call})")
                } else {
                    self.need("zpop_one");
                    format!("redirs_zpop_one({call})")
                }
            }
        })
    }

    /// Lua literal for a value. Inside containers `Null` becomes
    /// `cjson.null` so array lengths stay stable; at expression level it is
    /// plain `nil`.
    fn literal(&mut self, value: &Value, nested: bool) -> String {
        match value {
            Value::Null => {
                if nested {
                    "cjson.null".to_string()
                } else {
                    "nil".to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => {
                if f.is_finite() {
                    format!("{f:?}")
                } else if f.is_nan() {
                    "(0/0)".to_string()
                } else if *f > 0.0 {
                    "math.huge".to_string()
                } else {
                    "-math.huge".to_string()
                }
            }
            Value::Str(s) => lua_quote(s),
            Value::List(items) => {
                let parts: Vec<String> =
                    items.iter().map(|item| self.literal(item, true)).collect();
                format!("{{ {} }}", parts.join(", "))
            }
            Value::Map(map) => {
                let parts: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("[{}] = {}", lua_quote(k), self.literal(v, true)))
                    .collect();
                format!("{{ {} }}", parts.join(", "))
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum LoopCtx {
    /// Not inside a loop body
    None,
    /// Loop body emitted directly inside `while ... do`
    Plain,
    /// Loop body emitted inside the repeat-until-true continue shim
    Wrapped,
}

fn block_has_continue(block: &Block) -> bool {
    block.stmts.iter().any(|stmt| match stmt {
        Stmt::Continue => true,
        Stmt::If {
            then_block,
            else_block,
            ..
        } => block_has_continue(then_block) || block_has_continue(else_block),
        // A nested loop owns its own continues.
        _ => false,
    })
}

/// Single-quoted Lua string literal
fn lua_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\{}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}
