//! Leaf and string expressions.

use crate::error::{Result, RuntimeError, TypeError, TypeResult};
use crate::types::Type;
use crate::value::Value;

use super::{Env, Expr, Expression, eval_string, expect_type, mismatch};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// A literal value with a declared type.
#[derive(Debug, Clone)]
pub struct Const {
    ty: Type,
    value: Value,
}

impl Const {
    /// Create a constant, checking that `value` inhabits `ty`.
    pub fn new(ty: Type, value: impl Into<Value>) -> TypeResult<Self> {
        let value = value.into();
        if !value.conforms_to(&ty) {
            return Err(TypeError::InvalidConstant {
                declared: ty,
                value: value.to_string(),
            });
        }
        Ok(Self { ty, value })
    }

    #[must_use]
    pub fn null() -> Self {
        Self {
            ty: Type::Null,
            value: Value::Null,
        }
    }

    #[must_use]
    pub fn string(s: impl Into<String>) -> Self {
        Self {
            ty: Type::String,
            value: Value::String(s.into()),
        }
    }

    #[must_use]
    pub fn number(n: f64) -> Self {
        Self {
            ty: Type::Number,
            value: Value::Number(n),
        }
    }

    #[must_use]
    pub fn boolean(b: bool) -> Self {
        Self {
            ty: Type::Boolean,
            value: Value::Boolean(b),
        }
    }
}

impl Expression for Const {
    fn ty(&self) -> Type {
        self.ty.clone()
    }

    fn evaluate(&self, _env: &Env<'_>) -> Result<Value> {
        Ok(self.value.clone())
    }
}

// ---------------------------------------------------------------------------
// Struct projection
// ---------------------------------------------------------------------------

/// Projection of a single struct attribute.
#[derive(Debug)]
pub struct Attr {
    base: Expr,
    attr: String,
    ty: Type,
}

impl Attr {
    pub fn new(base: Expr, attr: impl Into<String>) -> TypeResult<Self> {
        let attr = attr.into();
        let base_ty = base.ty();
        let Some(st) = base_ty.as_struct() else {
            return Err(TypeError::NotAStruct {
                attr,
                found: base_ty.clone(),
            });
        };
        let ty = st
            .attribute(&attr)
            .cloned()
            .ok_or_else(|| TypeError::UnknownAttribute {
                struct_name: st.name.clone(),
                attr: attr.clone(),
            })?;
        Ok(Self { base, attr, ty })
    }
}

impl Expression for Attr {
    fn ty(&self) -> Type {
        self.ty.clone()
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        match self.base.evaluate(env)? {
            Value::Struct(mut sv) => {
                sv.fields
                    .remove(&self.attr)
                    .ok_or_else(|| RuntimeError::MissingAttribute {
                        struct_name: sv.name.clone(),
                        attr: self.attr.clone(),
                    })
            }
            other => Err(mismatch("attribute projection", "struct", &other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Display rendering of any value.
#[derive(Debug)]
pub struct AsString {
    inner: Expr,
}

impl AsString {
    #[must_use]
    pub fn new(inner: Expr) -> Self {
        Self { inner }
    }
}

impl Expression for AsString {
    fn ty(&self) -> Type {
        Type::String
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        Ok(Value::String(self.inner.evaluate(env)?.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Argument(usize),
}

/// A `{name}` template rendered from named argument expressions.
///
/// `{{` and `}}` produce literal braces.  The template is parsed once, at
/// construction; every placeholder must name a supplied argument.
#[derive(Debug)]
pub struct Formatted {
    template: String,
    segments: Vec<Segment>,
    arguments: Vec<Expr>,
}

impl Formatted {
    pub fn new<I, K>(template: impl Into<String>, arguments: I) -> TypeResult<Self>
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        let template = template.into();
        let (names, arguments): (Vec<String>, Vec<Expr>) =
            arguments.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        let segments = parse_template(&template, &names)?;
        Ok(Self {
            template,
            segments,
            arguments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }
}

fn parse_template(template: &str, names: &[String]) -> TypeResult<Vec<Segment>> {
    let invalid = |reason: String| TypeError::InvalidTemplate {
        template: template.to_string(),
        reason,
    };

    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(invalid("unclosed placeholder".into())),
                    }
                }
                let index = names
                    .iter()
                    .position(|n| *n == name)
                    .ok_or_else(|| invalid(format!("unknown placeholder `{name}`")))?;
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Argument(index));
            }
            '}' => return Err(invalid("single `}` outside a placeholder".into())),
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

impl Expression for Formatted {
    fn ty(&self) -> Type {
        Type::String
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let mut out = String::with_capacity(self.template.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Argument(index) => {
                    let value = self.arguments[*index].evaluate(env)?;
                    match value {
                        Value::String(s) => out.push_str(&s),
                        other => out.push_str(&other.to_string()),
                    }
                }
            }
        }
        Ok(Value::String(out))
    }
}

/// A `Map<String, String>` built from string-valued expressions.
#[derive(Debug)]
pub struct StringDictionary {
    entries: Vec<(String, Expr)>,
}

impl StringDictionary {
    pub fn new<I, K>(entries: I) -> TypeResult<Self>
    where
        I: IntoIterator<Item = (K, Expr)>,
        K: Into<String>,
    {
        let entries: Vec<(String, Expr)> =
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        for (_, value) in &entries {
            expect_type("string dictionary entry", &Type::String, value.as_ref())?;
        }
        Ok(Self { entries })
    }
}

impl Expression for StringDictionary {
    fn ty(&self) -> Type {
        Type::map(Type::String, Type::String)
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let entries = self
            .entries
            .iter()
            .map(|(key, expr)| {
                let value = eval_string("string dictionary entry", expr.as_ref(), env)?;
                Ok((Value::String(key.clone()), Value::String(value)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::Map(entries))
    }
}

// ---------------------------------------------------------------------------
// Message and intent readers
// ---------------------------------------------------------------------------

/// A slot extracted by the last matched intent, or null.
#[derive(Debug, Clone)]
pub struct SlotValue {
    slot: String,
}

impl SlotValue {
    #[must_use]
    pub fn new(slot: impl Into<String>) -> Self {
        Self { slot: slot.into() }
    }
}

impl Expression for SlotValue {
    fn ty(&self) -> Type {
        Type::optional(Type::String)
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        let slot = env
            .context()
            .intent()
            .and_then(|m| m.slots.get(&self.slot))
            .cloned();
        Ok(Value::from(slot))
    }
}

/// Text of the message currently being processed.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageText;

impl Expression for MessageText {
    fn ty(&self) -> Type {
        Type::String
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        Ok(Value::String(env.context().message().content.clone()))
    }
}

/// Display name of the current message's author.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthorName;

impl Expression for AuthorName {
    fn ty(&self) -> Type {
        Type::String
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        Ok(Value::String(env.context().message().author.name.clone()))
    }
}

// ---------------------------------------------------------------------------
// Null coalescing
// ---------------------------------------------------------------------------

/// `primary`, or `fallback` when `primary` evaluates to null.
///
/// Only null triggers the fallback; `0`, `""` and `false` pass through.
#[derive(Debug)]
pub struct Fallback {
    ty: Type,
    primary: Expr,
    fallback: Expr,
}

impl Fallback {
    pub fn new(ty: Type, primary: Expr, fallback: Expr) -> TypeResult<Self> {
        expect_type("fallback primary", &Type::optional(ty.clone()), primary.as_ref())?;
        expect_type("fallback default", &ty, fallback.as_ref())?;
        Ok(Self {
            ty,
            primary,
            fallback,
        })
    }
}

impl Expression for Fallback {
    fn ty(&self) -> Type {
        self.ty.clone()
    }

    fn evaluate(&self, env: &Env<'_>) -> Result<Value> {
        match self.primary.evaluate(env)? {
            Value::Null => self.fallback.evaluate(env),
            value => Ok(value),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Author, Context, Message};
    use crate::expr::{ExpressionExt, Scope};
    use crate::nlu::IntentMatch;
    use crate::platform::RecordingPlatform;
    use crate::value::StructValue;
    use std::sync::Arc;

    fn context(text: &str) -> Context {
        let message = Message::new(Author::new("u1", "Alice"), "c1", text);
        Context::new(message, Arc::new(RecordingPlatform::new()))
    }

    fn hero_type() -> Type {
        Type::structure("Hero", [("name", Type::String), ("level", Type::Number)])
    }

    #[test]
    fn const_rejects_nonconforming_value() {
        assert!(Const::new(Type::Number, "seven").is_err());
        assert!(Const::new(Type::optional(Type::Number), Value::Null).is_ok());
    }

    #[test]
    fn attr_checks_struct_and_attribute_at_construction() {
        let hero = Const::new(
            hero_type(),
            StructValue::new(
                "Hero",
                [("name", Value::from("Axe")), ("level", Value::from(30))],
            ),
        )
        .unwrap()
        .shared();

        let level = Attr::new(hero.clone(), "level").unwrap();
        assert_eq!(level.ty(), Type::Number);
        let ctx = context("hi");
        assert_eq!(ctx.evaluate(&level).unwrap(), Value::from(30));

        assert!(matches!(
            Attr::new(hero, "armor").unwrap_err(),
            TypeError::UnknownAttribute { .. }
        ));
        assert!(matches!(
            Attr::new(Const::number(1.0).shared(), "x").unwrap_err(),
            TypeError::NotAStruct { .. }
        ));
    }

    #[test]
    fn formatted_renders_named_arguments() {
        let f = Formatted::new(
            "{{{who}}} has {n} items",
            [
                ("who", Const::string("Bob").shared()),
                ("n", Const::number(3.0).shared()),
            ],
        )
        .unwrap();
        let ctx = context("hi");
        assert_eq!(ctx.evaluate(&f).unwrap(), Value::from("{Bob} has 3 items"));
    }

    #[test]
    fn formatted_rejects_unknown_placeholder() {
        let err = Formatted::new("hello {name}", [("who", Const::string("x").shared())])
            .unwrap_err();
        assert!(matches!(err, TypeError::InvalidTemplate { .. }));
        assert!(Formatted::new("oops {", Vec::<(String, Expr)>::new()).is_err());
        assert!(Formatted::new("oops }", Vec::<(String, Expr)>::new()).is_err());
    }

    #[test]
    fn fallback_only_replaces_null() {
        let mut scope = Scope::new();
        let var = scope.local("maybe", Type::optional(Type::Number)).unwrap();
        let fb = Fallback::new(Type::Number, var.clone().shared(), Const::number(42.0).shared())
            .unwrap();

        let mut ctx = context("hi");
        assert_eq!(ctx.evaluate(&fb).unwrap(), Value::from(42));
        ctx.set(&var, Value::from(0)).unwrap();
        assert_eq!(ctx.evaluate(&fb).unwrap(), Value::from(0));
    }

    #[test]
    fn fallback_checks_operand_types() {
        let err = Fallback::new(Type::Number, Const::string("a").shared(), Const::number(1.0).shared())
            .unwrap_err();
        assert!(matches!(err, TypeError::Mismatch { .. }));
    }

    #[test]
    fn slot_value_reads_intent_slots() {
        let ctx = context("call me Bob");
        assert_eq!(ctx.evaluate(&SlotValue::new("name")).unwrap(), Value::Null);

        let matched = IntentMatch::new("intent-name", 1.0).with_slot("name", "Bob");
        let ctx = ctx.with_intent(matched);
        assert_eq!(ctx.evaluate(&SlotValue::new("name")).unwrap(), Value::from("Bob"));
    }

    #[test]
    fn message_readers() {
        let ctx = context("ping");
        assert_eq!(ctx.evaluate(&MessageText).unwrap(), Value::from("ping"));
        assert_eq!(ctx.evaluate(&AuthorName).unwrap(), Value::from("Alice"));
    }

    #[test]
    fn string_dictionary_requires_string_values() {
        assert!(StringDictionary::new([("a", Const::number(1.0).shared())]).is_err());
        let dict = StringDictionary::new([("a", Const::string("x").shared())]).unwrap();
        let ctx = context("hi");
        assert_eq!(
            ctx.evaluate(&dict).unwrap(),
            Value::Map(vec![(Value::from("a"), Value::from("x"))])
        );
    }
}
