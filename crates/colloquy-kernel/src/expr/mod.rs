//! Typed expression model.
//!
//! An [`Expression`] reads the evaluating [`Env`] and produces a [`Value`]
//! whose shape is described by [`Expression::ty`].  Constructors check operand
//! types with [`Type::accepts`] and return a [`TypeError`] on mismatch, so an
//! ill-typed tree never reaches a running conversation.
//!
//! Evaluation is synchronous and side-effect free.  Anything that performs
//! I/O belongs in an action leaf, not here.
//!
//! ```rust
//! # use colloquy_kernel::expr::*;
//! # use colloquy_kernel::types::Type;
//! # use colloquy_kernel::value::Value;
//! let mut scope = Scope::new();
//! let x = scope.binder("x", Type::Number);
//! let numbers = Const::new(Type::array(Type::Number), Value::from(vec![1, 7, 9])).unwrap();
//! let big = Filtered::new(
//!     numbers.shared(),
//!     &x,
//!     GreaterThan::new(x.clone().shared(), Const::number(5.0).shared()).unwrap().shared(),
//! )
//! .unwrap();
//! assert_eq!(big.ty(), Type::array(Type::Number));
//! ```

mod arith;
mod basic;
mod collection;
mod scope;

use std::fmt;
use std::sync::Arc;

use crate::error::{Result, RuntimeError, TypeError, TypeResult};
use crate::types::Type;
use crate::value::Value;

pub use arith::{Divided, Equals, GreaterThan, LessThan, Not, Rounded, Sum};
pub use basic::{
    AsString, AuthorName, Attr, Const, Fallback, Formatted, MessageText, SlotValue,
    StringDictionary,
};
pub use collection::{
    Appended, Filtered, JoinedString, RandomElementOf, SelectFromArray, SelectFromMap,
};
pub use scope::{BinderId, Env, Scope, Slot, Variable};

/// A typed, side-effect free computation over an [`Env`].
pub trait Expression: fmt::Debug + Send + Sync {
    /// The static type of every value this expression produces.
    fn ty(&self) -> Type;

    /// Evaluate against the environment.
    fn evaluate(&self, env: &Env<'_>) -> Result<Value>;
}

/// Shared handle to an expression node.
pub type Expr = Arc<dyn Expression>;

/// Conversion of concrete expression nodes into [`Expr`] handles.
pub trait ExpressionExt: Expression + Sized + 'static {
    fn shared(self) -> Expr {
        Arc::new(self)
    }
}

impl<E: Expression + 'static> ExpressionExt for E {}

// ---------------------------------------------------------------------------
// Helpers shared by the node modules
// ---------------------------------------------------------------------------

/// Construction-time check that `expected` accepts the operand's type.
pub(crate) fn expect_type(
    context: &'static str,
    expected: &Type,
    operand: &dyn Expression,
) -> TypeResult<()> {
    let found = operand.ty();
    if expected.accepts(&found) {
        Ok(())
    } else {
        Err(TypeError::Mismatch {
            context,
            expected: expected.clone(),
            found,
        })
    }
}

pub(crate) fn mismatch(context: &'static str, expected: &str, found: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        context,
        expected: expected.to_string(),
        found: found.kind().to_string(),
    }
}

pub(crate) fn eval_number(context: &'static str, expr: &dyn Expression, env: &Env<'_>) -> Result<f64> {
    let value = expr.evaluate(env)?;
    value.as_number().ok_or_else(|| mismatch(context, "number", &value))
}

pub(crate) fn eval_string(
    context: &'static str,
    expr: &dyn Expression,
    env: &Env<'_>,
) -> Result<String> {
    match expr.evaluate(env)? {
        Value::String(s) => Ok(s),
        other => Err(mismatch(context, "string", &other)),
    }
}

pub(crate) fn eval_array(
    context: &'static str,
    expr: &dyn Expression,
    env: &Env<'_>,
) -> Result<Vec<Value>> {
    match expr.evaluate(env)? {
        Value::Array(items) => Ok(items),
        other => Err(mismatch(context, "array", &other)),
    }
}
