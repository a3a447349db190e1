//! Binding expressions.
//!
//! An [`Expression`] is an immutable tree produced by a template compiler.
//! It is evaluated against a [`Scope`](sinew_core::Scope); when the
//! [`EvalContext`] carries a [`Connectable`], every property and collection
//! read is reported to it so the caller can subscribe to exactly what the
//! evaluation touched. Assignable forms can also be written through with
//! [`Expression::assign`].
//!
//! Trees are built directly or with the small constructor helpers below:
//!
//! ```
//! use sinew_runtime::expression::{BinaryOp, Expression};
//!
//! // person.first + ' ' + person.last
//! let full = Expression::binary(
//!     BinaryOp::Add,
//!     Expression::binary(
//!         BinaryOp::Add,
//!         Expression::scope("person").member("first"),
//!         Expression::literal(" "),
//!     ),
//!     Expression::scope("person").member("last"),
//! );
//! assert!(!full.is_assignable());
//! ```

mod builtins;
pub mod converter;
mod evaluate;
pub mod ops;

use std::fmt;
use std::rc::Rc;

use sinew_core::Value;

use crate::flags::LifecycleFlags;
use crate::reactive::{Connectable, ObserverLocator};

pub use converter::{Resources, ValueConverter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
    Nullish,
    LooseEq,
    LooseNe,
    StrictEq,
    StrictNe,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Lt,
    Gt,
    Le,
    Ge,
    In,
}

impl BinaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
            Self::Nullish => "??",
            Self::LooseEq => "==",
            Self::LooseNe => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::In => "in",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Neg,
    Plus,
    TypeOf,
    Void,
}

impl UnaryOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::Neg => "-",
            Self::Plus => "+",
            Self::TypeOf => "typeof",
            Self::Void => "void",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expression {
    /// `$this`, or `$parent` repeated `ancestor` times.
    AccessThis { ancestor: u32 },
    /// A bare name resolved through the scope chain.
    AccessScope { name: Rc<str>, ancestor: u32 },
    AccessMember {
        object: Box<Expression>,
        name: Rc<str>,
        optional: bool,
    },
    AccessKeyed {
        object: Box<Expression>,
        key: Box<Expression>,
        optional: bool,
    },
    CallScope {
        name: Rc<str>,
        args: Vec<Expression>,
        ancestor: u32,
        optional: bool,
    },
    CallMember {
        object: Box<Expression>,
        name: Rc<str>,
        args: Vec<Expression>,
        optional: bool,
    },
    CallFunction {
        function: Box<Expression>,
        args: Vec<Expression>,
        optional: bool,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
    Conditional {
        condition: Box<Expression>,
        yes: Box<Expression>,
        no: Box<Expression>,
    },
    Assign {
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Literal(Value),
    ArrayLiteral(Vec<Expression>),
    ObjectLiteral(Vec<(Rc<str>, Expression)>),
    /// `` `a${x}b` ``: `cooked` has one more element than `expressions`.
    Template {
        cooked: Vec<Rc<str>>,
        expressions: Vec<Expression>,
    },
    /// `a${x}b` inside an attribute. Like a template, but `null` and
    /// `undefined` render as the empty string.
    Interpolation {
        parts: Vec<Rc<str>>,
        expressions: Vec<Expression>,
    },
    /// `expression | name:arg1:arg2`
    ValueConverter {
        expression: Box<Expression>,
        name: Rc<str>,
        args: Vec<Expression>,
    },
}

impl Expression {
    // ── Constructors ─────────────────────────────────────────────────

    #[must_use]
    pub fn this() -> Self {
        Self::AccessThis { ancestor: 0 }
    }

    #[must_use]
    pub fn scope(name: &str) -> Self {
        Self::AccessScope {
            name: Rc::from(name),
            ancestor: 0,
        }
    }

    /// `$parent.$parent.name` with `ancestor` hops.
    #[must_use]
    pub fn parent_scope(name: &str, ancestor: u32) -> Self {
        Self::AccessScope {
            name: Rc::from(name),
            ancestor,
        }
    }

    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn binary(op: BinaryOp, left: Self, right: Self) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    #[must_use]
    pub fn unary(op: UnaryOp, operand: Self) -> Self {
        Self::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    #[must_use]
    pub fn conditional(condition: Self, yes: Self, no: Self) -> Self {
        Self::Conditional {
            condition: Box::new(condition),
            yes: Box::new(yes),
            no: Box::new(no),
        }
    }

    #[must_use]
    pub fn call_scope(name: &str, args: Vec<Self>) -> Self {
        Self::CallScope {
            name: Rc::from(name),
            args,
            ancestor: 0,
            optional: false,
        }
    }

    #[must_use]
    pub fn member(self, name: &str) -> Self {
        Self::AccessMember {
            object: Box::new(self),
            name: Rc::from(name),
            optional: false,
        }
    }

    /// `self?.name`
    #[must_use]
    pub fn optional_member(self, name: &str) -> Self {
        Self::AccessMember {
            object: Box::new(self),
            name: Rc::from(name),
            optional: true,
        }
    }

    #[must_use]
    pub fn keyed(self, key: Self) -> Self {
        Self::AccessKeyed {
            object: Box::new(self),
            key: Box::new(key),
            optional: false,
        }
    }

    #[must_use]
    pub fn call(self, name: &str, args: Vec<Self>) -> Self {
        Self::CallMember {
            object: Box::new(self),
            name: Rc::from(name),
            args,
            optional: false,
        }
    }

    #[must_use]
    pub fn assign_from(self, value: Self) -> Self {
        Self::Assign {
            target: Box::new(self),
            value: Box::new(value),
        }
    }

    #[must_use]
    pub fn convert(self, name: &str, args: Vec<Self>) -> Self {
        Self::ValueConverter {
            expression: Box::new(self),
            name: Rc::from(name),
            args,
        }
    }

    /// Interpolation over alternating text and expressions.
    #[must_use]
    pub fn interpolation(parts: &[&str], expressions: Vec<Self>) -> Self {
        Self::Interpolation {
            parts: parts.iter().map(|p| Rc::from(*p)).collect(),
            expressions,
        }
    }

    // ── Introspection ────────────────────────────────────────────────

    /// Node kind, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AccessThis { .. } => "AccessThis",
            Self::AccessScope { .. } => "AccessScope",
            Self::AccessMember { .. } => "AccessMember",
            Self::AccessKeyed { .. } => "AccessKeyed",
            Self::CallScope { .. } => "CallScope",
            Self::CallMember { .. } => "CallMember",
            Self::CallFunction { .. } => "CallFunction",
            Self::Binary { .. } => "Binary",
            Self::Unary { .. } => "Unary",
            Self::Conditional { .. } => "Conditional",
            Self::Assign { .. } => "Assign",
            Self::Literal(_) => "Literal",
            Self::ArrayLiteral(_) => "ArrayLiteral",
            Self::ObjectLiteral(_) => "ObjectLiteral",
            Self::Template { .. } => "Template",
            Self::Interpolation { .. } => "Interpolation",
            Self::ValueConverter { .. } => "ValueConverter",
        }
    }

    /// Whether [`Expression::assign`] can succeed on this node.
    #[must_use]
    pub fn is_assignable(&self) -> bool {
        match self {
            Self::AccessScope { .. }
            | Self::AccessMember { .. }
            | Self::AccessKeyed { .. }
            | Self::Assign { .. } => true,
            Self::ValueConverter { expression, .. } => expression.is_assignable(),
            _ => false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::AccessThis { ancestor: 0 } => f.write_str("$this"),
            Self::AccessThis { ancestor } => {
                f.write_str("$parent")?;
                for _ in 1..*ancestor {
                    f.write_str(".$parent")?;
                }
                Ok(())
            }
            Self::AccessScope { name, ancestor } => {
                for _ in 0..*ancestor {
                    f.write_str("$parent.")?;
                }
                f.write_str(name)
            }
            Self::AccessMember {
                object,
                name,
                optional,
            } => write!(f, "{object}{}{name}", if *optional { "?." } else { "." }),
            Self::AccessKeyed {
                object,
                key,
                optional,
            } => write!(f, "{object}{}[{key}]", if *optional { "?." } else { "" }),
            Self::CallScope { name, args, .. } => {
                write!(f, "{name}(")?;
                list(f, args)?;
                f.write_str(")")
            }
            Self::CallMember {
                object, name, args, ..
            } => {
                write!(f, "{object}.{name}(")?;
                list(f, args)?;
                f.write_str(")")
            }
            Self::CallFunction { function, args, .. } => {
                write!(f, "{function}(")?;
                list(f, args)?;
                f.write_str(")")
            }
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Unary { op, operand } => match op {
                UnaryOp::TypeOf | UnaryOp::Void => write!(f, "{} {operand}", op.symbol()),
                _ => write!(f, "{}{operand}", op.symbol()),
            },
            Self::Conditional { condition, yes, no } => write!(f, "({condition} ? {yes} : {no})"),
            Self::Assign { target, value } => write!(f, "{target} = {value}"),
            Self::Literal(Value::String(s)) => write!(f, "{:?}", &**s),
            Self::Literal(value) => write!(f, "{value}"),
            Self::ArrayLiteral(items) => {
                f.write_str("[")?;
                list(f, items)?;
                f.write_str("]")
            }
            Self::ObjectLiteral(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                f.write_str("}")
            }
            Self::Template {
                cooked: parts,
                expressions,
            }
            | Self::Interpolation { parts, expressions } => {
                f.write_str("`")?;
                for (i, part) in parts.iter().enumerate() {
                    f.write_str(part)?;
                    if let Some(expression) = expressions.get(i) {
                        write!(f, "${{{expression}}}")?;
                    }
                }
                f.write_str("`")
            }
            Self::ValueConverter {
                expression,
                name,
                args,
            } => {
                write!(f, "{expression} | {name}")?;
                for arg in args {
                    write!(f, ":{arg}")?;
                }
                Ok(())
            }
        }
    }
}

/// What an evaluation may use besides the scope.
#[derive(Clone, Copy, Default)]
pub struct EvalContext<'a> {
    pub flags: LifecycleFlags,
    /// Receives every observed read.
    pub connectable: Option<&'a dyn Connectable>,
    /// Routes writes and collection mutations through observers.
    pub locator: Option<&'a Rc<ObserverLocator>>,
    pub resources: Option<&'a Resources>,
}

impl<'a> EvalContext<'a> {
    #[must_use]
    pub fn new(flags: LifecycleFlags) -> Self {
        Self {
            flags,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn connected(mut self, connectable: &'a dyn Connectable) -> Self {
        self.connectable = Some(connectable);
        self
    }

    #[must_use]
    pub fn with_locator(mut self, locator: &'a Rc<ObserverLocator>) -> Self {
        self.locator = Some(locator);
        self
    }

    #[must_use]
    pub fn with_resources(mut self, resources: &'a Resources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// The same context without a connectable.
    #[must_use]
    pub fn unconnected(self) -> Self {
        Self {
            connectable: None,
            ..self
        }
    }
}

impl fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("flags", &self.flags)
            .field("connected", &self.connectable.is_some())
            .field("locator", &self.locator.is_some())
            .field("resources", &self.resources.is_some())
            .finish()
    }
}
