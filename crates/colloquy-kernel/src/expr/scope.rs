//! Variables, declaration scopes and evaluation environments.
//!
//! Variables are resolved by slot, never by name:
//!
//! - **Locals** live for the whole conversation.  A [`Scope`] hands out a
//!   dense index per declared name; the owning [`Context`] stores values in a
//!   vector indexed by that slot.
//! - **Binders** are loop variables of collection expressions.  Each binder
//!   gets a scope-unique [`BinderId`]; iteration extends an immutable,
//!   parent-chained [`Env`] with one frame per element, so nested loops that
//!   reuse a binder shadow lexically instead of clobbering shared state.

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Result, RuntimeError, TypeError, TypeResult};
use crate::types::Type;
use crate::value::Value;

use super::Expression;

/// Identifier of a loop binder, unique within its [`Scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BinderId(u32);

/// Where a variable's value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Index into the conversation's locals.
    Local(usize),
    /// A loop binder resolved through the environment chain.
    Binder(BinderId),
}

/// A named, typed reference to a value held by the evaluating context.
///
/// Variables are created once, at scenario-definition time, and shared by
/// every conversation that runs the scenario.
#[derive(Clone)]
pub struct Variable {
    name: Arc<str>,
    ty: Type,
    slot: Slot,
}

impl Variable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn is_binder(&self) -> bool {
        matches!(self.slot, Slot::Binder(_))
    }

    pub(crate) fn binder_id(&self) -> TypeResult<BinderId> {
        match self.slot {
            Slot::Binder(id) => Ok(id),
            Slot::Local(_) => Err(TypeError::NotABinder {
                name: self.name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}: {}", self.name, self.ty)
    }
}

impl Expression for Variable {
    fn ty(&self) -> Type {
        self.ty.clone()
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let bound = match self.slot {
            Slot::Local(index) => env.context().local(index),
            Slot::Binder(id) => env.lookup(id),
        };
        match bound {
            Some(value) => Ok(value.clone()),
            // An unset optional reads as null.
            None if self.ty.accepts(&Type::Null) => Ok(Value::Null),
            None => Err(RuntimeError::Unbound {
                name: self.name.to_string(),
            }),
        }
    }
}

/// Declaration registry for a set of scenarios.
///
/// Declare every local of a handler set through the same scope so that slot
/// indices never collide inside one conversation.
#[derive(Debug, Default)]
pub struct Scope {
    locals: Vec<Variable>,
    next_binder: u32,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or re-fetch) a conversation local.
    ///
    /// Declaring an existing name with the same type returns the existing
    /// variable; a different type is a [`TypeError::Redeclared`].
    pub fn local(&mut self, name: impl Into<String>, ty: Type) -> TypeResult<Variable> {
        let name = name.into();
        if let Some(existing) = self.locals.iter().find(|v| *v.name == *name) {
            if existing.ty != ty {
                return Err(TypeError::Redeclared {
                    name,
                    first: existing.ty.clone(),
                    second: ty,
                });
            }
            return Ok(existing.clone());
        }

        let variable = Variable {
            name: name.into(),
            ty,
            slot: Slot::Local(self.locals.len()),
        };
        tracing::trace!(variable = ?variable, "local declared");
        self.locals.push(variable.clone());
        Ok(variable)
    }

    /// Declare a fresh loop binder.
    pub fn binder(&mut self, name: impl Into<String>, ty: Type) -> Variable {
        let name: String = name.into();
        let id = BinderId(self.next_binder);
        self.next_binder += 1;
        Variable {
            name: name.into(),
            ty,
            slot: Slot::Binder(id),
        }
    }

    /// All declared locals in slot order.
    pub fn locals(&self) -> &[Variable] {
        &self.locals
    }
}

/// One binder frame in the environment chain.
struct Frame<'a> {
    binder: BinderId,
    value: Value,
    parent: Option<&'a Frame<'a>>,
}

/// Read-only evaluation environment: the owning context plus any loop
/// bindings introduced by enclosing collection expressions.
pub struct Env<'a> {
    context: &'a Context,
    frame: Option<&'a Frame<'a>>,
}

impl<'a> Env<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self {
            context,
            frame: None,
        }
    }

    pub fn context(&self) -> &'a Context {
        self.context
    }

    /// Resolve a binder, innermost frame first.
    pub fn lookup(&self, binder: BinderId) -> Option<&'a Value> {
        let mut current = self.frame;
        while let Some(frame) = current {
            if frame.binder == binder {
                return Some(&frame.value);
            }
            current = frame.parent;
        }
        None
    }

    /// Run `f` in an environment extended with `binder = value`.
    pub fn bind<R>(&self, binder: BinderId, value: Value, f: impl FnOnce(&Env<'_>) -> R) -> R {
        let frame = Frame {
            binder,
            value,
            parent: self.frame,
        };
        let extended = Env {
            context: self.context,
            frame: Some(&frame),
        };
        f(&extended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_with_same_type_returns_same_slot() {
        let mut scope = Scope::new();
        let a = scope.local("count", Type::Number).unwrap();
        let b = scope.local("count", Type::Number).unwrap();
        assert_eq!(a.slot(), b.slot());
        assert_eq!(scope.locals().len(), 1);
    }

    #[test]
    fn redeclaring_with_other_type_fails() {
        let mut scope = Scope::new();
        scope.local("count", Type::Number).unwrap();
        let err = scope.local("count", Type::String).unwrap_err();
        assert!(matches!(err, TypeError::Redeclared { .. }));
    }

    #[test]
    fn binders_are_unique_even_with_the_same_name() {
        let mut scope = Scope::new();
        let x1 = scope.binder("x", Type::Number);
        let x2 = scope.binder("x", Type::Number);
        assert_ne!(x1.slot(), x2.slot());
        assert!(x1.is_binder());
        assert!(scope.local("x", Type::Number).unwrap().binder_id().is_err());
    }
}
