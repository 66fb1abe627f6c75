//! Statement IR and the frozen script form
//!
//! A [`Script`] is the immutable artifact produced by freezing a builder
//! context. Registration-time validation lives here: reference indices,
//! loop placement of `break`/`continue`, and call resolution against the
//! command table and plugin registry.

use crate::command;
use crate::error::{RedirsError, Result};
use crate::script::expr::{CallKind, Expr};
use crate::script::plugin::PluginRegistry;

/// A statement node
#[derive(Debug, Clone)]
pub enum Stmt {
    /// Assignment to a declared local
    Assign { local: usize, expr: Expr },

    /// Expression evaluated for its effect
    Expr(Expr),

    If {
        cond: Expr,
        then_block: Block,
        else_block: Block,
    },

    While {
        cond: Expr,
        body: Block,
    },

    Break,

    Continue,

    /// Early return; `None` returns `Null`
    Return(Option<Expr>),
}

/// A sequence of statements
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
}

/// A frozen script: declarations plus the body tree
#[derive(Debug, Clone)]
pub struct Script {
    /// Declared key names, in registration order
    pub keys: Vec<String>,

    /// Declared argument names, in registration order
    pub args: Vec<String>,

    /// Declared locals with optional initializer expressions
    pub locals: Vec<(String, Option<Expr>)>,

    /// The statement tree
    pub body: Block,

    /// Value produced when the body runs to completion; absent means `Null`
    pub return_expr: Option<Expr>,
}

impl Script {
    /// Validate well-formedness. Called once at registration; failures are
    /// parse errors and never deferred to run time.
    pub fn validate(&self, plugins: &PluginRegistry) -> Result<()> {
        check_unique("key", &self.keys)?;
        check_unique("arg", &self.args)?;
        let local_names: Vec<String> =
            self.locals.iter().map(|(name, _)| name.clone()).collect();
        check_unique("local", &local_names)?;

        for (_, init) in &self.locals {
            if let Some(expr) = init {
                self.validate_expr(expr, plugins)?;
            }
        }
        self.validate_block(&self.body, plugins, false)?;
        if let Some(expr) = &self.return_expr {
            self.validate_expr(expr, plugins)?;
        }
        Ok(())
    }

    fn validate_block(
        &self,
        block: &Block,
        plugins: &PluginRegistry,
        in_loop: bool,
    ) -> Result<()> {
        for stmt in &block.stmts {
            match stmt {
                Stmt::Assign { local, expr } => {
                    if *local >= self.locals.len() {
                        return Err(parse(format!("assignment to undeclared local {local}")));
                    }
                    self.validate_expr(expr, plugins)?;
                }
                Stmt::Expr(expr) => self.validate_expr(expr, plugins)?,
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                } => {
                    self.validate_expr(cond, plugins)?;
                    self.validate_block(then_block, plugins, in_loop)?;
                    self.validate_block(else_block, plugins, in_loop)?;
                }
                Stmt::While { cond, body } => {
                    self.validate_expr(cond, plugins)?;
                    self.validate_block(body, plugins, true)?;
                }
                Stmt::Break | Stmt::Continue => {
                    if !in_loop {
                        return Err(parse("break/continue outside of a loop".to_string()));
                    }
                }
                Stmt::Return(expr) => {
                    if let Some(expr) = expr {
                        self.validate_expr(expr, plugins)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_expr(&self, expr: &Expr, plugins: &PluginRegistry) -> Result<()> {
        match expr {
            Expr::Lit(_) => Ok(()),
            Expr::Local(id) => {
                if *id >= self.locals.len() {
                    Err(parse(format!("reference to undeclared local {id}")))
                } else {
                    Ok(())
                }
            }
            Expr::KeyRef(id) => {
                if *id >= self.keys.len() {
                    Err(parse(format!("reference to undeclared key {id}")))
                } else {
                    Ok(())
                }
            }
            Expr::ArgRef(id) => {
                if *id >= self.args.len() {
                    Err(parse(format!("reference to undeclared arg {id}")))
                } else {
                    Ok(())
                }
            }
            Expr::BinOp { lhs, rhs, .. } | Expr::Compare { lhs, rhs, .. } => {
                self.validate_expr(lhs, plugins)?;
                self.validate_expr(rhs, plugins)
            }
            Expr::UnOp { expr, .. }
            | Expr::ToNum(expr)
            | Expr::ToIntStr(expr)
            | Expr::ToStr(expr) => self.validate_expr(expr, plugins),
            Expr::Logical { operands, .. } => {
                if operands.is_empty() {
                    return Err(parse("logical operator with no operands".to_string()));
                }
                for operand in operands {
                    self.validate_expr(operand, plugins)?;
                }
                Ok(())
            }
            Expr::Index { target, index } => {
                self.validate_expr(target, plugins)?;
                self.validate_expr(index, plugins)
            }
            Expr::Concat(operands) => {
                for operand in operands {
                    self.validate_expr(operand, plugins)?;
                }
                Ok(())
            }
            Expr::Cond { cond, then, other } => {
                self.validate_expr(cond, plugins)?;
                self.validate_expr(then, plugins)?;
                self.validate_expr(other, plugins)
            }
            Expr::Call { kind, name, args } => {
                self.validate_call(*kind, name, args.len(), plugins)?;
                for arg in args {
                    self.validate_expr(arg, plugins)?;
                }
                Ok(())
            }
        }
    }

    fn validate_call(
        &self,
        kind: CallKind,
        name: &str,
        arg_count: usize,
        plugins: &PluginRegistry,
    ) -> Result<()> {
        match kind {
            CallKind::Redis => {
                command::check_arity(name, arg_count)?;
                Ok(())
            }
            CallKind::General => match name {
                "error" if arg_count == 1 => Ok(()),
                "error" => Err(parse("'error' takes one argument".to_string())),
                other => Err(parse(format!("unknown general op '{other}'"))),
            },
            CallKind::Helper => match name {
                "tostr" | "tonum" | "tointstr" if arg_count == 1 => Ok(()),
                "tostr" | "tonum" | "tointstr" => {
                    Err(parse(format!("'{name}' takes one argument")))
                }
                other => Err(parse(format!("unknown helper op '{other}'"))),
            },
            CallKind::Plugin => {
                let op = plugins
                    .op(name)
                    .ok_or_else(|| parse(format!("unknown plugin op '{name}'")))?;
                if op.arity != arg_count {
                    return Err(parse(format!(
                        "plugin op '{name}' expects {} arguments, got {arg_count}",
                        op.arity
                    )));
                }
                Ok(())
            }
        }
    }
}

fn check_unique(what: &str, names: &[String]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if name.is_empty() {
            return Err(parse(format!("empty {what} name")));
        }
        if !seen.insert(name) {
            return Err(parse(format!("duplicate {what} name '{name}'")));
        }
    }
    Ok(())
}

fn parse(message: String) -> RedirsError {
    RedirsError::Parse(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::plugin::PluginRegistry;

    fn bare_script(body: Block) -> Script {
        Script {
            keys: vec!["k".to_string()],
            args: vec![],
            locals: vec![("x".to_string(), None)],
            body,
            return_expr: None,
        }
    }

    #[test]
    fn test_break_outside_loop_rejected() {
        let script = bare_script(Block {
            stmts: vec![Stmt::Break],
        });
        assert!(script.validate(&PluginRegistry::new()).is_err());
    }

    #[test]
    fn test_break_inside_loop_accepted() {
        let script = bare_script(Block {
            stmts: vec![Stmt::While {
                cond: Expr::lit(true),
                body: Block {
                    stmts: vec![Stmt::Break],
                },
            }],
        });
        assert!(script.validate(&PluginRegistry::new()).is_ok());
    }

    #[test]
    fn test_unknown_command_rejected() {
        let script = bare_script(Block {
            stmts: vec![Stmt::Expr(Expr::redis_call("getdel", vec![Expr::KeyRef(0)]))],
        });
        assert!(script.validate(&PluginRegistry::new()).is_err());
    }

    #[test]
    fn test_bad_arity_rejected() {
        let script = bare_script(Block {
            stmts: vec![Stmt::Expr(Expr::redis_call("get", vec![]))],
        });
        assert!(script.validate(&PluginRegistry::new()).is_err());
    }

    #[test]
    fn test_out_of_range_refs_rejected() {
        let script = bare_script(Block {
            stmts: vec![Stmt::Expr(Expr::KeyRef(3))],
        });
        assert!(script.validate(&PluginRegistry::new()).is_err());

        let script = bare_script(Block {
            stmts: vec![Stmt::Assign {
                local: 9,
                expr: Expr::lit(1),
            }],
        });
        assert!(script.validate(&PluginRegistry::new()).is_err());
    }
}
