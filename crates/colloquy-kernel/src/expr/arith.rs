//! Numeric and boolean expressions.
//!
//! All arithmetic is over `f64`; there is no integer/float distinction beyond
//! [`Type::Number`].

use crate::error::{Result, RuntimeError, TypeError, TypeResult};
use crate::types::Type;
use crate::value::Value;

use super::{Env, Expr, Expression, eval_number, expect_type, mismatch};

fn finite(context: &'static str, n: f64) -> Result<Value> {
    if n.is_finite() {
        Ok(Value::Number(n))
    } else {
        Err(RuntimeError::NonFinite { context })
    }
}

/// `numerator / denominator`.
#[derive(Debug)]
pub struct Divided {
    numerator: Expr,
    denominator: Expr,
}

impl Divided {
    pub fn new(numerator: Expr, denominator: Expr) -> TypeResult<Self> {
        expect_type("division numerator", &Type::Number, numerator.as_ref())?;
        expect_type("division denominator", &Type::Number, denominator.as_ref())?;
        Ok(Self {
            numerator,
            denominator,
        })
    }
}

impl Expression for Divided {
    fn ty(&self) -> Type {
        Type::Number
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let n = eval_number("division", self.numerator.as_ref(), env)?;
        let d = eval_number("division", self.denominator.as_ref(), env)?;
        if d == 0.0 {
            return Err(RuntimeError::DivisionByZero);
        }
        finite("division", n / d)
    }
}

/// Sum of any number of operands.  The empty sum is `0`.
#[derive(Debug)]
pub struct Sum {
    terms: Vec<Expr>,
}

impl Sum {
    pub fn new(terms: impl IntoIterator<Item = Expr>) -> TypeResult<Self> {
        let terms: Vec<Expr> = terms.into_iter().collect();
        for term in &terms {
            expect_type("sum term", &Type::Number, term.as_ref())?;
        }
        Ok(Self { terms })
    }
}

impl Expression for Sum {
    fn ty(&self) -> Type {
        Type::Number
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let mut total = 0.0;
        for term in &self.terms {
            total += eval_number("sum", term.as_ref(), env)?;
        }
        finite("sum", total)
    }
}

/// Round to `digits` decimal places, ties to even.
#[derive(Debug)]
pub struct Rounded {
    inner: Expr,
    digits: i32,
}

impl Rounded {
    pub fn new(inner: Expr, digits: i32) -> TypeResult<Self> {
        expect_type("rounding", &Type::Number, inner.as_ref())?;
        Ok(Self { inner, digits })
    }
}

impl Expression for Rounded {
    fn ty(&self) -> Type {
        Type::Number
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let n = eval_number("rounding", self.inner.as_ref(), env)?;
        let scale = 10f64.powi(self.digits);
        finite("rounding", (n * scale).round_ties_even() / scale)
    }
}

// ---------------------------------------------------------------------------
// Comparisons
// ---------------------------------------------------------------------------

macro_rules! numeric_comparison {
    ($name:ident, $op:tt, $label:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug)]
        pub struct $name {
            left: Expr,
            right: Expr,
        }

        impl $name {
            pub fn new(left: Expr, right: Expr) -> TypeResult<Self> {
                expect_type($label, &Type::Number, left.as_ref())?;
                expect_type($label, &Type::Number, right.as_ref())?;
                Ok(Self { left, right })
            }
        }

        impl Expression for $name {
            fn ty(&self) -> Type {
                Type::Boolean
            }

            fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
                let l = eval_number($label, self.left.as_ref(), env)?;
                let r = eval_number($label, self.right.as_ref(), env)?;
                Ok(Value::Boolean(l $op r))
            }
        }
    };
}

numeric_comparison!(GreaterThan, >, "greater-than", "`left > right`.");
numeric_comparison!(LessThan, <, "less-than", "`left < right`.");

/// Structural equality of two values of compatible types.
#[derive(Debug)]
pub struct Equals {
    left: Expr,
    right: Expr,
}

impl Equals {
    pub fn new(left: Expr, right: Expr) -> TypeResult<Self> {
        let (lt, rt) = (left.ty(), right.ty());
        if !lt.accepts(&rt) && !rt.accepts(&lt) {
            return Err(TypeError::Mismatch {
                context: "equality",
                expected: lt,
                found: rt,
            });
        }
        Ok(Self { left, right })
    }
}

impl Expression for Equals {
    fn ty(&self) -> Type {
        Type::Boolean
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        Ok(Value::Boolean(
            self.left.evaluate(env)? == self.right.evaluate(env)?,
        ))
    }
}

/// Boolean negation.
#[derive(Debug)]
pub struct Not {
    inner: Expr,
}

impl Not {
    pub fn new(inner: Expr) -> TypeResult<Self> {
        expect_type("negation", &Type::Boolean, inner.as_ref())?;
        Ok(Self { inner })
    }
}

impl Expression for Not {
    fn ty(&self) -> Type {
        Type::Boolean
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        match self.inner.evaluate(env)? {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(mismatch("negation", "boolean", &other)),
        }
    }
}
