/// The fixed registry of primitive types.
///
/// `Comparable` is a virtual supertype of the four orderable primitives and
/// `Any` is the unconstrained top type; neither has values of its own.
/// `IntegerIterable` exists for built-in iteration helpers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Any,
    Nil,
    Comparable,
    Integer,
    Decimal,
    Boolean,
    Character,
    String,
    IntegerIterable,
}

/// A field or method exposed by a type, with the name used when emitting
/// target-language code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Member {
    pub ty: Type,
    pub target_name: &'static str,
}

impl Type {
    pub fn from_name(name: &str) -> Option<Type> {
        match name {
            "Any" => Some(Type::Any),
            "Nil" => Some(Type::Nil),
            "Comparable" => Some(Type::Comparable),
            "Integer" => Some(Type::Integer),
            "Decimal" => Some(Type::Decimal),
            "Boolean" => Some(Type::Boolean),
            "Character" => Some(Type::Character),
            "String" => Some(Type::String),
            "IntegerIterable" => Some(Type::IntegerIterable),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Type::Any => "Any",
            Type::Nil => "Nil",
            Type::Comparable => "Comparable",
            Type::Integer => "Integer",
            Type::Decimal => "Decimal",
            Type::Boolean => "Boolean",
            Type::Character => "Character",
            Type::String => "String",
            Type::IntegerIterable => "IntegerIterable",
        }
    }

    /// The name used for this type in emitted target-language source. Types
    /// without a dedicated target equivalent pass their own name through.
    pub fn target_name(self) -> &'static str {
        match self {
            Type::Any => "Object",
            Type::Nil => "Void",
            Type::Integer => "int",
            Type::Decimal => "double",
            Type::Boolean => "boolean",
            Type::String => "String",
            other => other.name(),
        }
    }

    pub fn is_comparable(self) -> bool {
        matches!(
            self,
            Type::Integer | Type::Decimal | Type::Character | Type::String
        )
    }

    /// Whether a value of type `source` may be used where `self` is expected:
    /// identity, the top type, or Comparable accepting any orderable
    /// primitive.
    pub fn assignable_from(self, source: Type) -> bool {
        self == source || self == Type::Any || (self == Type::Comparable && source.is_comparable())
    }

    /// Looks up a member field on this type. The primitive types expose none.
    pub fn field(self, _name: &str) -> Option<Member> {
        None
    }

    /// Looks up a member method by name and arity. The primitive types
    /// expose none.
    pub fn method(self, _name: &str, _arity: usize) -> Option<Member> {
        None
    }
}
