//! Collection expressions.
//!
//! `Filtered`, `SelectFromArray` and `SelectFromMap` evaluate their body once
//! per element in an [`Env`] extended with the element bound to a loop binder.
//! The conversation's locals are never touched.

use rand::seq::SliceRandom;

use crate::error::{Result, TypeError, TypeResult};
use crate::types::Type;
use crate::value::Value;

use super::{
    BinderId, Env, Expr, Expression, Variable, eval_array, expect_type, mismatch,
};

/// Elements of an array for which `predicate` holds.
#[derive(Debug)]
pub struct Filtered {
    collection: Expr,
    binder: BinderId,
    item_ty: Type,
    predicate: Expr,
}

impl Filtered {
    pub fn new(collection: Expr, binder: &Variable, predicate: Expr) -> TypeResult<Self> {
        let item_ty = binder.ty();
        expect_type("filter collection", &Type::array(item_ty.clone()), collection.as_ref())?;
        expect_type("filter predicate", &Type::Boolean, predicate.as_ref())?;
        Ok(Self {
            collection,
            binder: binder.binder_id()?,
            item_ty,
            predicate,
        })
    }
}

impl Expression for Filtered {
    fn ty(&self) -> Type {
        Type::array(self.item_ty.clone())
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let mut kept = Vec::new();
        for item in eval_array("filter", self.collection.as_ref(), env)? {
            let keep = env.bind(self.binder, item.clone(), |inner| {
                self.predicate.evaluate(inner)
            })?;
            match keep {
                Value::Boolean(true) => kept.push(item),
                Value::Boolean(false) => {}
                other => return Err(mismatch("filter predicate", "boolean", &other)),
            }
        }
        Ok(Value::Array(kept))
    }
}

/// `projection` applied to every element of an array.
#[derive(Debug)]
pub struct SelectFromArray {
    collection: Expr,
    binder: BinderId,
    projection: Expr,
}

impl SelectFromArray {
    pub fn new(collection: Expr, binder: &Variable, projection: Expr) -> TypeResult<Self> {
        expect_type("select collection", &Type::array(binder.ty()), collection.as_ref())?;
        Ok(Self {
            collection,
            binder: binder.binder_id()?,
            projection,
        })
    }
}

impl Expression for SelectFromArray {
    fn ty(&self) -> Type {
        Type::array(self.projection.ty())
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        eval_array("select", self.collection.as_ref(), env)?
            .into_iter()
            .map(|item| env.bind(self.binder, item, |inner| self.projection.evaluate(inner)))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }
}

/// `projection` applied to every entry of a map, producing an array.
#[derive(Debug)]
pub struct SelectFromMap {
    map: Expr,
    key: BinderId,
    value: BinderId,
    projection: Expr,
}

impl SelectFromMap {
    pub fn new(
        map: Expr,
        key: &Variable,
        value: &Variable,
        projection: Expr,
    ) -> TypeResult<Self> {
        expect_type("select map", &Type::map(key.ty(), value.ty()), map.as_ref())?;
        Ok(Self {
            map,
            key: key.binder_id()?,
            value: value.binder_id()?,
            projection,
        })
    }
}

impl Expression for SelectFromMap {
    fn ty(&self) -> Type {
        Type::array(self.projection.ty())
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let entries = match self.map.evaluate(env)? {
            Value::Map(entries) => entries,
            other => return Err(mismatch("select map", "map", &other)),
        };
        entries
            .into_iter()
            .map(|(k, v)| {
                env.bind(self.key, k, |with_key| {
                    with_key.bind(self.value, v, |inner| self.projection.evaluate(inner))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Value::Array)
    }
}

/// Array of strings joined with a separator.
#[derive(Debug)]
pub struct JoinedString {
    collection: Expr,
    separator: String,
}

impl JoinedString {
    pub fn new(collection: Expr, separator: impl Into<String>) -> TypeResult<Self> {
        expect_type("join", &Type::array(Type::String), collection.as_ref())?;
        Ok(Self {
            collection,
            separator: separator.into(),
        })
    }
}

impl Expression for JoinedString {
    fn ty(&self) -> Type {
        Type::String
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let parts = eval_array("join", self.collection.as_ref(), env)?
            .into_iter()
            .map(|item| match item {
                Value::String(s) => Ok(s),
                other => Err(mismatch("join", "string", &other)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::String(parts.join(&self.separator)))
    }
}

/// A uniformly chosen element of an array, or value of a map.
///
/// An empty collection yields null.
#[derive(Debug)]
pub struct RandomElementOf {
    collection: Expr,
    element_ty: Type,
}

impl RandomElementOf {
    pub fn new(collection: Expr) -> TypeResult<Self> {
        let ty = collection.ty();
        let element_ty = if let Some(item) = ty.array_item() {
            item.clone()
        } else if let Some((_, value)) = ty.map_entry() {
            value.clone()
        } else {
            return Err(TypeError::NotACollection {
                context: "random element",
                found: ty,
            });
        };
        Ok(Self {
            collection,
            element_ty,
        })
    }
}

impl Expression for RandomElementOf {
    fn ty(&self) -> Type {
        Type::optional(self.element_ty.clone())
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let mut rng = rand::thread_rng();
        let chosen = match self.collection.evaluate(env)? {
            Value::Array(items) => items.choose(&mut rng).cloned(),
            Value::Map(entries) => entries.choose(&mut rng).map(|(_, v)| v.clone()),
            other => return Err(mismatch("random element", "collection", &other)),
        };
        Ok(chosen.unwrap_or(Value::Null))
    }
}

/// A copy of an array with one more element at the end.
#[derive(Debug)]
pub struct Appended {
    array: Expr,
    item: Expr,
}

impl Appended {
    pub fn new(array: Expr, item: Expr) -> TypeResult<Self> {
        let array_ty = array.ty();
        let Some(item_ty) = array_ty.array_item() else {
            return Err(TypeError::NotACollection {
                context: "append",
                found: array_ty.clone(),
            });
        };
        expect_type("appended item", item_ty, item.as_ref())?;
        Ok(Self { array, item })
    }
}

impl Expression for Appended {
    fn ty(&self) -> Type {
        self.array.ty()
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let mut items = eval_array("append", self.array.as_ref(), env)?;
        items.push(self.item.evaluate(env)?);
        Ok(Value::Array(items))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::context::{Author, Context, Message};
    use crate::expr::{AsString, Const, ExpressionExt, Formatted, GreaterThan, Scope, Sum};
    use crate::platform::RecordingPlatform;

    fn ctx() -> Context {
        Context::new(
            Message::new(Author::new("u1", "Alice"), "c1", "x"),
            Arc::new(RecordingPlatform::new()),
        )
    }

    fn numbers(values: Vec<i32>) -> Expr {
        Const::new(Type::array(Type::Number), Value::from(values))
            .unwrap()
            .shared()
    }

    #[test]
    fn filter_select_pipeline() {
        let mut scope = Scope::new();
        let x = scope.binder("x", Type::Number);

        let filtered = Filtered::new(
            numbers((0..10).collect()),
            &x,
            GreaterThan::new(x.clone().shared(), Const::number(5.0).shared())
                .unwrap()
                .shared(),
        )
        .unwrap()
        .shared();
        assert_eq!(ctx().evaluate(filtered.as_ref()).unwrap(), Value::from(vec![6, 7, 8, 9]));

        let doubled = SelectFromArray::new(
            filtered,
            &x,
            Sum::new([x.clone().shared(), x.clone().shared()]).unwrap().shared(),
        )
        .unwrap()
        .shared();
        assert_eq!(doubled.ty(), Type::array(Type::Number));

        let labels = SelectFromArray::new(
            doubled,
            &x,
            Formatted::new("Number: {x}", [("x", AsString::new(x.clone().shared()).shared())])
                .unwrap()
                .shared(),
        )
        .unwrap();
        assert_eq!(
            ctx().evaluate(&labels).unwrap(),
            Value::from(vec!["Number: 12", "Number: 14", "Number: 16", "Number: 18"])
        );
    }

    #[test]
    fn nested_loops_reusing_a_name_do_not_collide() {
        let mut scope = Scope::new();
        let outer = scope.binder("x", Type::Number);
        let inner = scope.binder("x", Type::Number);

        // For every outer x, sum it with every inner x.
        let inner_select = SelectFromArray::new(
            numbers(vec![10, 20]),
            &inner,
            Sum::new([outer.clone().shared(), inner.clone().shared()])
                .unwrap()
                .shared(),
        )
        .unwrap()
        .shared();
        let outer_select = SelectFromArray::new(numbers(vec![1, 2]), &outer, inner_select).unwrap();

        assert_eq!(
            ctx().evaluate(&outer_select).unwrap(),
            Value::Array(vec![Value::from(vec![11, 21]), Value::from(vec![12, 22])])
        );
    }

    #[test]
    fn collection_ops_require_binders() {
        let mut scope = Scope::new();
        let local = scope.local("x", Type::Number).unwrap();
        let err = SelectFromArray::new(numbers(vec![1]), &local, local.clone().shared()).unwrap_err();
        assert!(matches!(err, TypeError::NotABinder { .. }));
    }

    #[test]
    fn filter_rejects_mismatched_collection() {
        let mut scope = Scope::new();
        let s = scope.binder("s", Type::String);
        let err = Filtered::new(numbers(vec![1]), &s, Const::boolean(true).shared()).unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn select_from_map_binds_key_and_value() {
        let mut scope = Scope::new();
        let k = scope.binder("k", Type::String);
        let v = scope.binder("v", Type::Number);
        let map = Const::new(
            Type::map(Type::String, Type::Number),
            Value::Map(vec![
                (Value::from("a"), Value::from(1)),
                (Value::from("b"), Value::from(2)),
            ]),
        )
        .unwrap()
        .shared();
        let select = SelectFromMap::new(
            map,
            &k,
            &v,
            Formatted::new("{k}={v}", [("k", k.clone().shared()), ("v", v.clone().shared())])
                .unwrap()
                .shared(),
        )
        .unwrap();
        assert_eq!(select.ty(), Type::array(Type::String));
        assert_eq!(ctx().evaluate(&select).unwrap(), Value::from(vec!["a=1", "b=2"]));
    }

    #[test]
    fn join_strings() {
        let words = Const::new(Type::array(Type::String), Value::from(vec!["a", "b", "c"]))
            .unwrap()
            .shared();
        let joined = JoinedString::new(words, ", ").unwrap();
        assert_eq!(ctx().evaluate(&joined).unwrap(), Value::from("a, b, c"));
        assert!(JoinedString::new(numbers(vec![1]), ",").is_err());
    }

    #[test]
    fn random_element_of_empty_is_null() {
        let empty = RandomElementOf::new(numbers(vec![])).unwrap();
        assert_eq!(empty.ty(), Type::optional(Type::Number));
        assert_eq!(ctx().evaluate(&empty).unwrap(), Value::Null);

        let one = RandomElementOf::new(numbers(vec![4])).unwrap();
        assert_eq!(ctx().evaluate(&one).unwrap(), Value::from(4));

        assert!(RandomElementOf::new(Const::number(1.0).shared()).is_err());
    }

    #[test]
    fn appended_extends_array() {
        let appended = Appended::new(numbers(vec![1, 2]), Const::number(3.0).shared()).unwrap();
        assert_eq!(ctx().evaluate(&appended).unwrap(), Value::from(vec![1, 2, 3]));
        assert!(Appended::new(numbers(vec![]), Const::string("x").shared()).is_err());
    }
}
