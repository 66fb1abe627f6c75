//! Symbolic script builder
//!
//! [`FnContext`] registers keys, arguments and locals, and hands out
//! [`CodeBlock`] handles that append statements. Building has no side
//! effects on any engine; [`FnContext::freeze`] produces the immutable
//! [`Script`] tree that registration validates.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::{RedirsError, Result};
use crate::script::expr::Expr;
use crate::script::stmt::{Block, Script, Stmt};

/// Handle to a declared key
#[derive(Debug, Clone, Copy)]
pub struct KeyHandle(pub(crate) usize);

/// Handle to a declared argument
#[derive(Debug, Clone, Copy)]
pub struct ArgHandle(pub(crate) usize);

/// Handle to a declared local
#[derive(Debug, Clone, Copy)]
pub struct LocalHandle(pub(crate) usize);

impl From<KeyHandle> for Expr {
    fn from(handle: KeyHandle) -> Expr {
        Expr::KeyRef(handle.0)
    }
}

impl From<ArgHandle> for Expr {
    fn from(handle: ArgHandle) -> Expr {
        Expr::ArgRef(handle.0)
    }
}

impl From<LocalHandle> for Expr {
    fn from(handle: LocalHandle) -> Expr {
        Expr::Local(handle.0)
    }
}

impl KeyHandle {
    pub fn expr(&self) -> Expr {
        Expr::KeyRef(self.0)
    }
}

impl ArgHandle {
    pub fn expr(&self) -> Expr {
        Expr::ArgRef(self.0)
    }
}

impl LocalHandle {
    pub fn expr(&self) -> Expr {
        Expr::Local(self.0)
    }
}

/// Builder-internal statement; block bodies are arena ids until freeze
enum BuildStmt {
    Assign { local: usize, expr: Expr },
    Expr(Expr),
    If { cond: Expr, then_id: usize, else_id: usize },
    While { cond: Expr, body_id: usize },
    Break,
    Continue,
    Return(Option<Expr>),
}

#[derive(Default)]
struct BuilderState {
    keys: Vec<String>,
    args: Vec<String>,
    locals: Vec<(String, Option<Expr>)>,
    blocks: Vec<Vec<BuildStmt>>,
    return_expr: Option<Expr>,
}

impl BuilderState {
    fn new_block(&mut self) -> usize {
        self.blocks.push(Vec::new());
        self.blocks.len() - 1
    }
}

/// The symbolic function context
pub struct FnContext {
    state: Rc<RefCell<BuilderState>>,
    root: usize,
}

impl FnContext {
    pub fn new() -> Self {
        let mut state = BuilderState::default();
        let root = state.new_block();
        FnContext {
            state: Rc::new(RefCell::new(state)),
            root,
        }
    }

    /// Register a key. Keys are bound by name at execution time and keep
    /// their registration order.
    pub fn add_key(&self, name: &str) -> KeyHandle {
        let mut state = self.state.borrow_mut();
        state.keys.push(name.to_string());
        KeyHandle(state.keys.len() - 1)
    }

    /// Register an argument.
    pub fn add_arg(&self, name: &str) -> ArgHandle {
        let mut state = self.state.borrow_mut();
        state.args.push(name.to_string());
        ArgHandle(state.args.len() - 1)
    }

    /// Register a local with an optional initializer, evaluated once at
    /// script entry in declaration order.
    pub fn add_local(&self, name: &str, init: Option<Expr>) -> LocalHandle {
        let mut state = self.state.borrow_mut();
        state.locals.push((name.to_string(), init));
        LocalHandle(state.locals.len() - 1)
    }

    /// The top-level statement block
    pub fn root(&self) -> CodeBlock {
        CodeBlock {
            state: Rc::clone(&self.state),
            id: self.root,
        }
    }

    /// Register the script's return value. At most one call; the last one
    /// wins. Absence means the script returns `Null`.
    pub fn set_return_value<E: Into<Expr>>(&self, expr: E) {
        self.state.borrow_mut().return_expr = Some(expr.into());
    }

    /// Produce the immutable script tree. Fails with a parse error when a
    /// block handle escaped its context or a declaration is malformed;
    /// call-level validation happens in [`Script::validate`].
    pub fn freeze(&self) -> Result<Script> {
        let state = self.state.borrow();
        let body = materialize(&state, self.root)?;
        Ok(Script {
            keys: state.keys.clone(),
            args: state.args.clone(),
            locals: state.locals.clone(),
            body,
            return_expr: state.return_expr.clone(),
        })
    }
}

impl Default for FnContext {
    fn default() -> Self {
        FnContext::new()
    }
}

fn materialize(state: &BuilderState, id: usize) -> Result<Block> {
    let stmts = state
        .blocks
        .get(id)
        .ok_or_else(|| RedirsError::Parse("unknown block handle".to_string()))?;
    let mut out = Vec::with_capacity(stmts.len());
    for stmt in stmts {
        out.push(match stmt {
            BuildStmt::Assign { local, expr } => Stmt::Assign {
                local: *local,
                expr: expr.clone(),
            },
            BuildStmt::Expr(expr) => Stmt::Expr(expr.clone()),
            BuildStmt::If {
                cond,
                then_id,
                else_id,
            } => Stmt::If {
                cond: cond.clone(),
                then_block: materialize(state, *then_id)?,
                else_block: materialize(state, *else_id)?,
            },
            BuildStmt::While { cond, body_id } => Stmt::While {
                cond: cond.clone(),
                body: materialize(state, *body_id)?,
            },
            BuildStmt::Break => Stmt::Break,
            BuildStmt::Continue => Stmt::Continue,
            BuildStmt::Return(expr) => Stmt::Return(expr.clone()),
        });
    }
    Ok(Block { stmts: out })
}

/// Handle to one statement block under construction
pub struct CodeBlock {
    state: Rc<RefCell<BuilderState>>,
    id: usize,
}

impl CodeBlock {
    fn push(&self, stmt: BuildStmt) {
        self.state.borrow_mut().blocks[self.id].push(stmt);
    }

    /// Assign an expression to a local
    pub fn assign<E: Into<Expr>>(&self, local: LocalHandle, expr: E) {
        self.push(BuildStmt::Assign {
            local: local.0,
            expr: expr.into(),
        });
    }

    /// Evaluate an expression for its effect
    pub fn stmt<E: Into<Expr>>(&self, expr: E) {
        self.push(BuildStmt::Expr(expr.into()));
    }

    /// Open a conditional; returns the then- and else-blocks
    pub fn if_<E: Into<Expr>>(&self, cond: E) -> (CodeBlock, CodeBlock) {
        let (then_id, else_id) = {
            let mut state = self.state.borrow_mut();
            (state.new_block(), state.new_block())
        };
        self.push(BuildStmt::If {
            cond: cond.into(),
            then_id,
            else_id,
        });
        (
            CodeBlock {
                state: Rc::clone(&self.state),
                id: then_id,
            },
            CodeBlock {
                state: Rc::clone(&self.state),
                id: else_id,
            },
        )
    }

    /// Open a loop; returns the loop body block
    pub fn while_<E: Into<Expr>>(&self, cond: E) -> CodeBlock {
        let body_id = self.state.borrow_mut().new_block();
        self.push(BuildStmt::While {
            cond: cond.into(),
            body_id,
        });
        CodeBlock {
            state: Rc::clone(&self.state),
            id: body_id,
        }
    }

    /// Leave the innermost loop
    pub fn break_(&self) {
        self.push(BuildStmt::Break);
    }

    /// Skip to the next iteration of the innermost loop
    pub fn continue_(&self) {
        self.push(BuildStmt::Continue);
    }

    /// Return early with a value
    pub fn return_value<E: Into<Expr>>(&self, expr: E) {
        self.push(BuildStmt::Return(Some(expr.into())));
    }

    /// Return early with `Null`
    pub fn return_nil(&self) {
        self.push(BuildStmt::Return(None));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::expr::CallKind;
    use crate::script::plugin::PluginRegistry;

    #[test]
    fn test_freeze_produces_tree() {
        let ctx = FnContext::new();
        let key = ctx.add_key("target");
        let cmp = ctx.add_arg("cmp");
        let cur = ctx.add_local("cur", Some(Expr::lit(0)));

        let root = ctx.root();
        let body = root.while_(cur.expr().lt_(cmp.expr()));
        body.stmt(Expr::redis_call(
            "rpush",
            vec![key.expr(), cur.expr().to_str()],
        ));
        body.assign(cur, cur.expr().add(Expr::lit(1)));
        ctx.set_return_value(cur.expr());

        let script = ctx.freeze().unwrap();
        assert_eq!(script.keys, vec!["target"]);
        assert_eq!(script.args, vec!["cmp"]);
        assert_eq!(script.locals.len(), 1);
        assert_eq!(script.body.stmts.len(), 1);
        assert!(script.return_expr.is_some());
        assert!(script.validate(&PluginRegistry::new()).is_ok());

        match &script.body.stmts[0] {
            Stmt::While { body, .. } => assert_eq!(body.stmts.len(), 2),
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_if_blocks_share_context() {
        let ctx = FnContext::new();
        let flag = ctx.add_arg("flag");
        let out = ctx.add_local("out", None);

        let root = ctx.root();
        let (then_block, else_block) = root.if_(flag.expr());
        then_block.assign(out, Expr::lit("yes"));
        else_block.assign(out, Expr::lit("no"));
        ctx.set_return_value(out.expr());

        let script = ctx.freeze().unwrap();
        match &script.body.stmts[0] {
            Stmt::If {
                then_block,
                else_block,
                ..
            } => {
                assert_eq!(then_block.stmts.len(), 1);
                assert_eq!(else_block.stmts.len(), 1);
            }
            other => panic!("unexpected statement: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_names_rejected_at_validation() {
        let ctx = FnContext::new();
        ctx.add_key("k");
        ctx.add_key("k");
        let script = ctx.freeze().unwrap();
        assert!(script.validate(&PluginRegistry::new()).is_err());
    }

    #[test]
    fn test_building_is_pure() {
        let ctx = FnContext::new();
        let key = ctx.add_key("k");
        ctx.root()
            .stmt(Expr::call(CallKind::Redis, "del", vec![key.expr()]));
        // Nothing ran: freezing twice yields equal trees and no engine was
        // ever touched.
        let first = ctx.freeze().unwrap();
        let second = ctx.freeze().unwrap();
        assert_eq!(first.body.stmts.len(), second.body.stmts.len());
    }
}
