//! Memory-backed action leaves.
//!
//! [`Memory`] wraps a [`MemoryStore`] and hands out behavior-tree leaves that
//! read and write it.  Global keys are shared by everyone; user keys are
//! namespaced as `<author id>-<key>`, where the author is the user who started
//! the conversation.
//!
//! Store failures surface as
//! [`RuntimeError::Collaborator`](colloquy_kernel::RuntimeError::Collaborator)
//! and end the conversation.

use std::sync::Arc;

use async_trait::async_trait;
use colloquy_kernel::error::{Result, TypeError, TypeResult};
use colloquy_kernel::{Action, BoxAction, Context, Expr, Expression, Type, Value, Variable};

use crate::memory::MemoryStore;

/// Factory for memory-backed action leaves.
#[derive(Clone)]
pub struct Memory {
    store: Arc<dyn MemoryStore>,
}

impl Memory {
    pub fn new(store: Arc<dyn MemoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// Store the value of `value` under the key `key` evaluates to.
    pub fn save_global_var(&self, key: Expr, value: Expr) -> TypeResult<BoxAction> {
        require_string("global memory key", &key)?;
        require_string("global memory value", &value)?;
        Ok(Arc::new(SaveVar {
            store: Arc::clone(&self.store),
            key: KeyScope::Global(key),
            value,
        }))
    }

    /// Succeeds when the key `key` evaluates to is present.
    pub fn check_global_var_exists(&self, key: Expr) -> TypeResult<BoxAction> {
        require_string("global memory key", &key)?;
        Ok(Arc::new(CheckVar {
            store: Arc::clone(&self.store),
            key: KeyScope::Global(key),
        }))
    }

    /// Store `value` under the conversation author's `key`.
    pub fn set_user_var(&self, key: impl Into<String>, value: Expr) -> TypeResult<BoxAction> {
        require_string("user memory value", &value)?;
        Ok(Arc::new(SaveVar {
            store: Arc::clone(&self.store),
            key: KeyScope::User(key.into()),
            value,
        }))
    }

    /// Succeeds when the conversation author has `key` set.
    pub fn check_user_var_exists(&self, key: impl Into<String>) -> BoxAction {
        Arc::new(CheckVar {
            store: Arc::clone(&self.store),
            key: KeyScope::User(key.into()),
        })
    }

    /// Copy the author's `key` into `target` when present.  Always succeeds.
    pub fn copy_user_var_to_local(
        &self,
        key: impl Into<String>,
        target: &Variable,
    ) -> TypeResult<BoxAction> {
        if target.is_binder() {
            return Err(TypeError::NotAssignable {
                name: target.name().to_string(),
            });
        }
        if !target.ty().accepts(&Type::String) {
            return Err(TypeError::Mismatch {
                context: "copy user memory",
                expected: target.ty(),
                found: Type::String,
            });
        }
        Ok(Arc::new(CopyUserVar {
            store: Arc::clone(&self.store),
            key: key.into(),
            target: target.clone(),
        }))
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory").finish_non_exhaustive()
    }
}

fn require_string(context: &'static str, expr: &Expr) -> TypeResult<()> {
    let found = expr.ty();
    if Type::String.accepts(&found) {
        Ok(())
    } else {
        Err(TypeError::Mismatch {
            context,
            expected: Type::String,
            found,
        })
    }
}

fn user_key(ctx: &Context, key: &str) -> String {
    format!("{}-{key}", ctx.author().id)
}

fn eval_string(ctx: &Context, expr: &Expr) -> Result<String> {
    match ctx.evaluate(expr.as_ref())? {
        Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

enum KeyScope {
    Global(Expr),
    User(String),
}

impl KeyScope {
    fn resolve(&self, ctx: &Context) -> Result<String> {
        match self {
            Self::Global(expr) => eval_string(ctx, expr),
            Self::User(key) => Ok(user_key(ctx, key)),
        }
    }
}

struct SaveVar {
    store: Arc<dyn MemoryStore>,
    key: KeyScope,
    value: Expr,
}

#[async_trait]
impl Action for SaveVar {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let key = self.key.resolve(ctx)?;
        let value = eval_string(ctx, &self.value)?;
        self.store.set(&key, &value).await?;
        tracing::debug!(conversation = %ctx.id(), key = %key, "memory saved");
        Ok(true)
    }
}

struct CheckVar {
    store: Arc<dyn MemoryStore>,
    key: KeyScope,
}

#[async_trait]
impl Action for CheckVar {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let key = self.key.resolve(ctx)?;
        Ok(self.store.contains(&key).await?)
    }
}

struct CopyUserVar {
    store: Arc<dyn MemoryStore>,
    key: String,
    target: Variable,
}

#[async_trait]
impl Action for CopyUserVar {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let key = user_key(ctx, &self.key);
        if let Some(value) = self.store.get(&key).await? {
            ctx.set(&self.target, Value::from(value))?;
        }
        Ok(true)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
