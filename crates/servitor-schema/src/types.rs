//! The declared-type model.
//!
//! A [`DeclaredType`] describes the shape a caller expects back from the
//! remote model.  The same value drives both directions of the exchange:
//! it is rendered into compact notation for the prompt (see
//! [`crate::render`]) and it validates and coerces the parsed response
//! (see [`crate::decode`]).

use serde_json::Value;

// ---------------------------------------------------------------------------
// Primitives
// ---------------------------------------------------------------------------

/// Scalar leaf types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// Text.
    String,
    /// A whole number; fractional values never coerce into it.
    Integer,
    /// Any number.
    Float,
    /// `true` / `false`, with permissive token coercion.
    Boolean,
    /// The null value.
    Null,
}

impl Primitive {
    /// Name used in the textual notation.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "int",
            Self::Float => "float",
            Self::Boolean => "bool",
            Self::Null => "null",
        }
    }

    /// Look up a primitive by its notation name (or a common alias).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" | "str" => Some(Self::String),
            "int" | "integer" => Some(Self::Integer),
            "float" | "number" => Some(Self::Float),
            "bool" | "boolean" => Some(Self::Boolean),
            "null" | "none" => Some(Self::Null),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A named member of a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: DeclaredType,
    /// Optional fields may be absent from the response.
    pub optional: bool,
}

/// A mapping with a fixed set of declared fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    /// Display name, rendered as a prefix (`Person{...}`).
    pub name: Option<String>,
    pub fields: Vec<Field>,
    /// Whether keys outside `fields` are tolerated (rendered as `...`).
    pub extra: bool,
}

impl Record {
    /// Create an empty, closed, anonymous record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty record with a display name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Add a required field.
    pub fn field(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            optional: false,
        });
        self
    }

    /// Add a field that may be absent.
    pub fn optional_field(mut self, name: impl Into<String>, ty: DeclaredType) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            optional: true,
        });
        self
    }

    /// Accept keys that are not declared.
    pub fn tolerate_extra(mut self) -> Self {
        self.extra = true;
        self
    }

    /// Find a declared field by name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl From<Record> for DeclaredType {
    fn from(record: Record) -> Self {
        Self::Record(record)
    }
}

// ---------------------------------------------------------------------------
// Declared type
// ---------------------------------------------------------------------------

/// A recursive description of an expected value.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclaredType {
    Primitive(Primitive),
    /// `T?` -- null or absent decodes to the empty state.
    Optional(Box<DeclaredType>),
    /// `A|B` -- branches are tried in declaration order.
    Union(Vec<DeclaredType>),
    /// A single exact value.
    Literal(Value),
    /// `[T]`
    List(Box<DeclaredType>),
    /// `(A, B)` -- fixed arity.
    Tuple(Vec<DeclaredType>),
    /// `(T, ...)` -- any number of elements of one type.
    VariadicTuple(Box<DeclaredType>),
    /// `{T}` -- duplicates collapse to their first occurrence.
    Set(Box<DeclaredType>),
    Record(Record),
    /// Accepts anything unchanged.
    Any,
}

impl DeclaredType {
    pub fn string() -> Self {
        Self::Primitive(Primitive::String)
    }

    pub fn integer() -> Self {
        Self::Primitive(Primitive::Integer)
    }

    pub fn float() -> Self {
        Self::Primitive(Primitive::Float)
    }

    pub fn boolean() -> Self {
        Self::Primitive(Primitive::Boolean)
    }

    pub fn null() -> Self {
        Self::Primitive(Primitive::Null)
    }

    pub fn optional(inner: DeclaredType) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn union(branches: impl IntoIterator<Item = DeclaredType>) -> Self {
        Self::Union(branches.into_iter().collect())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn list(element: DeclaredType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn tuple(elements: impl IntoIterator<Item = DeclaredType>) -> Self {
        Self::Tuple(elements.into_iter().collect())
    }

    pub fn variadic_tuple(element: DeclaredType) -> Self {
        Self::VariadicTuple(Box::new(element))
    }

    pub fn set(element: DeclaredType) -> Self {
        Self::Set(Box::new(element))
    }

    /// Returns `true` for fixed and variadic tuples.
    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple(_) | Self::VariadicTuple(_))
    }

    /// Returns `true` if the type accepts any value unchanged.
    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl From<Primitive> for DeclaredType {
    fn from(primitive: Primitive) -> Self {
        Self::Primitive(primitive)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names_round_trip() {
        for p in [
            Primitive::String,
            Primitive::Integer,
            Primitive::Float,
            Primitive::Boolean,
            Primitive::Null,
        ] {
            assert_eq!(Primitive::from_name(p.name()), Some(p));
        }
        assert_eq!(Primitive::from_name("str"), Some(Primitive::String));
        assert_eq!(Primitive::from_name("widget"), None);
    }

    #[test]
    fn record_builder_keeps_declaration_order() {
        let record = Record::named("Person")
            .field("name", DeclaredType::string())
            .optional_field("age", DeclaredType::integer())
            .tolerate_extra();

        assert_eq!(record.name.as_deref(), Some("Person"));
        assert_eq!(record.fields[0].name, "name");
        assert!(!record.fields[0].optional);
        assert!(record.get("age").unwrap().optional);
        assert!(record.extra);
        assert!(record.get("email").is_none());
    }

    #[test]
    fn tuple_detection() {
        assert!(DeclaredType::tuple([DeclaredType::string()]).is_tuple());
        assert!(DeclaredType::variadic_tuple(DeclaredType::string()).is_tuple());
        assert!(!DeclaredType::list(DeclaredType::string()).is_tuple());
    }
}
