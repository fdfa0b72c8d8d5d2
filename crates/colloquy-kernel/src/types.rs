//! Static value types for the expression language.
//!
//! Types exist only to reject ill-typed expression trees while they are being
//! assembled.  Nothing is converted at runtime; [`Type::accepts`] is the whole
//! contract.
//!
//! # Acceptance rules
//!
//! | Receiver | Accepts |
//! |----------|---------|
//! | primitive | the same primitive |
//! | `Any` | everything |
//! | `Union` | a non-union any member accepts; a union only when the member sets are equal |
//! | `Array<T>` | `Array<U>` when `T` accepts `U` |
//! | `Map<K, V>` | `Map<K2, V2>` when `K` accepts `K2` and `V` accepts `V2` |
//! | `Struct` | a struct with the same name and the same attribute map |
//!
//! The union-to-union rule is deliberately stricter than a subset check.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// A value type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Number,
    String,
    Boolean,
    Null,
    Any,
    Union { members: BTreeSet<Type> },
    Array { item: Box<Type> },
    Map { key: Box<Type>, value: Box<Type> },
    Struct(StructType),
}

/// A nominal record type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StructType {
    pub name: String,
    pub attributes: BTreeMap<String, Type>,
}

impl StructType {
    /// The declared type of `attr`, if any.
    pub fn attribute(&self, attr: &str) -> Option<&Type> {
        self.attributes.get(attr)
    }
}

impl Type {
    /// Build a union, flattening nested unions.
    ///
    /// A union with a single distinct member collapses to that member.
    pub fn union(members: impl IntoIterator<Item = Type>) -> Self {
        let mut flat = BTreeSet::new();
        for member in members {
            match member {
                Type::Union { members } => flat.extend(members),
                other => {
                    flat.insert(other);
                }
            }
        }
        if flat.len() == 1
            && let Some(only) = flat.pop_first()
        {
            return only;
        }
        Type::Union { members: flat }
    }

    /// `T | Null`.
    pub fn optional(inner: Type) -> Self {
        Self::union([inner, Type::Null])
    }

    pub fn array(item: Type) -> Self {
        Type::Array {
            item: Box::new(item),
        }
    }

    pub fn map(key: Type, value: Type) -> Self {
        Type::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    pub fn structure<N, I, A>(name: N, attributes: I) -> Self
    where
        N: Into<String>,
        I: IntoIterator<Item = (A, Type)>,
        A: Into<String>,
    {
        Type::Struct(StructType {
            name: name.into(),
            attributes: attributes
                .into_iter()
                .map(|(attr, ty)| (attr.into(), ty))
                .collect(),
        })
    }

    /// Whether a slot of type `self` can receive a value of type `other`.
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Any, _) => true,
            (Type::Union { members }, Type::Union { members: others }) => members == others,
            (Type::Union { members }, other) => members.iter().any(|m| m.accepts(other)),
            (Type::Array { item }, Type::Array { item: other_item }) => item.accepts(other_item),
            (
                Type::Map { key, value },
                Type::Map {
                    key: other_key,
                    value: other_value,
                },
            ) => key.accepts(other_key) && value.accepts(other_value),
            (Type::Struct(a), Type::Struct(b)) => a == b,
            (Type::Number, Type::Number)
            | (Type::String, Type::String)
            | (Type::Boolean, Type::Boolean)
            | (Type::Null, Type::Null) => true,
            _ => false,
        }
    }

    /// The struct description, when this is a struct type.
    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Type::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Element type of an array.
    pub fn array_item(&self) -> Option<&Type> {
        match self {
            Type::Array { item } => Some(item),
            _ => None,
        }
    }

    /// Key and value types of a map.
    pub fn map_entry(&self) -> Option<(&Type, &Type)> {
        match self {
            Type::Map { key, value } => Some((key, value)),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Number => write!(f, "Number"),
            Type::String => write!(f, "String"),
            Type::Boolean => write!(f, "Bool"),
            Type::Null => write!(f, "Null"),
            Type::Any => write!(f, "*"),
            Type::Union { members } => {
                write!(f, "OneOf<")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{member}")?;
                }
                write!(f, ">")
            }
            Type::Array { item } => write!(f, "Array<{item}>"),
            Type::Map { key, value } => write!(f, "Map<{key}, {value}>"),
            Type::Struct(s) => write!(f, "{}", s.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
