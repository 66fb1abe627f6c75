//! Expression IR
//!
//! The tagged expression tree produced by the builder. Nodes are immutable
//! once built; the builder sugar below only ever constructs new nodes.

use crate::value::Value;

/// Binary arithmetic operators. Integer operands stay integral except under
/// `Div`, which always yields a float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    /// Logical negation against host truthiness
    Not,
    /// Numeric negation
    Neg,
}

/// Comparison operators. The ordered forms coerce mixed operands to
/// numbers; two strings compare lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Short-circuit logical operators. The result is the deciding operand's
/// value, not a boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicOp {
    And,
    Or,
}

/// The dispatch family of a call node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A Redis operation from the unified command table
    Redis,
    /// A host-general operation (`error`)
    General,
    /// An emitter helper with a native interpreter equivalent
    Helper,
    /// A user-registered plugin operation
    Plugin,
}

/// An expression node
#[derive(Debug, Clone)]
pub enum Expr {
    /// Literal value
    Lit(Value),

    /// Reference to a declared local by index
    Local(usize),

    /// Reference to a declared key by index
    KeyRef(usize),

    /// Reference to a declared argument by index
    ArgRef(usize),

    BinOp {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    UnOp {
        op: UnOp,
        expr: Box<Expr>,
    },

    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },

    Logical {
        op: LogicOp,
        operands: Vec<Expr>,
    },

    /// 0-based indexing into a list (negative counts from the end,
    /// out-of-range is `Null`) or string-keyed lookup into a map
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },

    /// Redis-style stringification of each operand, concatenated
    Concat(Vec<Expr>),

    /// String-to-number coercion, `Null` when not numeric
    ToNum(Box<Expr>),

    /// Integral string form of a number, truncating toward zero
    ToIntStr(Box<Expr>),

    /// Redis-style stringification
    ToStr(Box<Expr>),

    /// Ternary conditional
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        other: Box<Expr>,
    },

    Call {
        kind: CallKind,
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn lit<V: Into<Value>>(v: V) -> Expr {
        Expr::Lit(v.into())
    }

    pub fn call(kind: CallKind, name: &str, args: Vec<Expr>) -> Expr {
        Expr::Call {
            kind,
            name: name.to_string(),
            args,
        }
    }

    pub fn redis_call(name: &str, args: Vec<Expr>) -> Expr {
        Expr::call(CallKind::Redis, name, args)
    }

    fn bin(self, op: BinOp, rhs: Expr) -> Expr {
        Expr::BinOp {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    fn cmp(self, op: CmpOp, rhs: Expr) -> Expr {
        Expr::Compare {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Add, rhs)
    }

    pub fn sub(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Sub, rhs)
    }

    pub fn mul(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Mul, rhs)
    }

    pub fn div(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Div, rhs)
    }

    pub fn rem(self, rhs: Expr) -> Expr {
        self.bin(BinOp::Mod, rhs)
    }

    pub fn eq_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Eq, rhs)
    }

    pub fn ne_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Ne, rhs)
    }

    pub fn lt_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Lt, rhs)
    }

    pub fn le_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Le, rhs)
    }

    pub fn gt_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Gt, rhs)
    }

    pub fn ge_(self, rhs: Expr) -> Expr {
        self.cmp(CmpOp::Ge, rhs)
    }

    pub fn and_(operands: Vec<Expr>) -> Expr {
        Expr::Logical {
            op: LogicOp::And,
            operands,
        }
    }

    pub fn or_(operands: Vec<Expr>) -> Expr {
        Expr::Logical {
            op: LogicOp::Or,
            operands,
        }
    }

    pub fn not_(self) -> Expr {
        Expr::UnOp {
            op: UnOp::Not,
            expr: Box::new(self),
        }
    }

    pub fn neg(self) -> Expr {
        Expr::UnOp {
            op: UnOp::Neg,
            expr: Box::new(self),
        }
    }

    pub fn index(self, index: Expr) -> Expr {
        Expr::Index {
            target: Box::new(self),
            index: Box::new(index),
        }
    }

    pub fn concat(operands: Vec<Expr>) -> Expr {
        Expr::Concat(operands)
    }

    pub fn to_num(self) -> Expr {
        Expr::ToNum(Box::new(self))
    }

    pub fn to_int_str(self) -> Expr {
        Expr::ToIntStr(Box::new(self))
    }

    pub fn to_str(self) -> Expr {
        Expr::ToStr(Box::new(self))
    }

    pub fn cond(self, then: Expr, other: Expr) -> Expr {
        Expr::Cond {
            cond: Box::new(self),
            then: Box::new(then),
            other: Box::new(other),
        }
    }

    /// Convenience for raising a script error
    pub fn raise(message: Expr) -> Expr {
        Expr::call(CallKind::General, "error", vec![message])
    }
}
