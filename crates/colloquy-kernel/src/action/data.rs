//! Variable and condition leaves.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Result, RuntimeError, TypeError, TypeResult};
use crate::expr::{Expr, Expression, Variable};
use crate::types::Type;

use super::combinators::seconds_to_duration;
use super::{Action, BoxAction};

struct SetVarFrom {
    variable: Variable,
    source: Expr,
}

#[async_trait]
impl Action for SetVarFrom {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let value = ctx.evaluate(self.source.as_ref())?;
        if value.is_null() {
            return Ok(false);
        }
        ctx.set(&self.variable, value)?;
        Ok(true)
    }
}

/// Evaluate `source` and store it into `variable`.
///
/// Fails (returns `false`) without touching the variable when `source`
/// evaluates to null.  `source` may be the optional form of the variable's
/// type.
pub fn set_var_from(variable: &Variable, source: Expr) -> TypeResult<BoxAction> {
    if variable.is_binder() {
        return Err(TypeError::NotAssignable {
            name: variable.name().to_string(),
        });
    }
    let expected = Type::optional(variable.ty());
    let found = source.ty();
    if !expected.accepts(&found) {
        return Err(TypeError::Mismatch {
            context: "set variable",
            expected,
            found,
        });
    }
    Ok(Arc::new(SetVarFrom {
        variable: variable.clone(),
        source,
    }))
}

struct EnsureVar(Variable);

#[async_trait]
impl Action for EnsureVar {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        match ctx.get(&self.0) {
            Ok(value) => Ok(value.is_truthy()),
            Err(RuntimeError::Unbound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Succeeds when `variable` is set to a truthy value.
pub fn ensure_var(variable: &Variable) -> BoxAction {
    Arc::new(EnsureVar(variable.clone()))
}

struct CheckCondition(Expr);

#[async_trait]
impl Action for CheckCondition {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        Ok(ctx.evaluate(self.0.as_ref())?.is_truthy())
    }
}

/// Succeeds when `condition` evaluates to a truthy value.
pub fn check_condition(condition: Expr) -> BoxAction {
    Arc::new(CheckCondition(condition))
}

struct DoAction<F>(F);

#[async_trait]
impl<F> Action for DoAction<F>
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync,
{
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        (self.0)(ctx)?;
        Ok(true)
    }
}

/// Run a synchronous side effect.  Always succeeds unless `f` errors.
pub fn do_action<F>(f: F) -> BoxAction
where
    F: Fn(&mut Context) -> Result<()> + Send + Sync + 'static,
{
    Arc::new(DoAction(f))
}

struct WaitForTimer(Duration);

#[async_trait]
impl Action for WaitForTimer {
    async fn run(&self, _ctx: &mut Context) -> Result<bool> {
        tokio::time::sleep(self.0).await;
        Ok(true)
    }
}

/// Suspend for `seconds`, then succeed.
pub fn wait_for_timer(seconds: f64) -> BoxAction {
    Arc::new(WaitForTimer(seconds_to_duration(seconds)))
}
