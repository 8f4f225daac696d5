use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use bigdecimal::BigDecimal;
use num_bigint::BigInt;

use super::RuntimeError;

/// A host-implemented method bound to an object's method table.
pub type HostMethod = fn(&mut Object, Vec<Value>) -> Result<Value, RuntimeError>;

/// A runtime object: a mutable field map plus a method table. PLC source has
/// no syntax to construct these; they enter a program through host-seeded
/// variables and are reached via access and call expressions with receivers.
#[derive(Debug, Clone, Default)]
pub struct Object {
    fields: HashMap<String, Value>,
    methods: HashMap<(String, usize), HostMethod>,
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn define_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn define_method(&mut self, name: &str, arity: usize, method: HostMethod) {
        self.methods.insert((name.to_string(), arity), method);
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.get(name).cloned()
    }

    /// Mutates an existing field; writing to an unknown field is an error.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        match self.fields.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(RuntimeError::UnknownField {
                name: name.to_string(),
            }),
        }
    }

    pub fn method(&self, name: &str, arity: usize) -> Option<HostMethod> {
        self.methods.get(&(name.to_string(), arity)).copied()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

/// Tagged runtime value. Integer and Decimal are unbounded; arithmetic never
/// converts between them.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Character(char),
    Integer(BigInt),
    Decimal(BigDecimal),
    Str(String),
    Object(Rc<RefCell<Object>>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "Nil",
            Value::Boolean(_) => "Boolean",
            Value::Character(_) => "Character",
            Value::Integer(_) => "Integer",
            Value::Decimal(_) => "Decimal",
            Value::Str(_) => "String",
            Value::Object(_) => "Object",
        }
    }

    /// The printable representation used by `print` and by string
    /// concatenation.
    pub fn to_output(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Boolean(value) => value.to_string(),
            Value::Character(value) => value.to_string(),
            Value::Integer(value) => value.to_string(),
            Value::Decimal(value) => value.to_string(),
            Value::Str(value) => value.clone(),
            Value::Object(_) => "<object>".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Boolean(left), Value::Boolean(right)) => left == right,
            (Value::Character(left), Value::Character(right)) => left == right,
            (Value::Integer(left), Value::Integer(right)) => left == right,
            (Value::Decimal(left), Value::Decimal(right)) => left == right,
            (Value::Str(left), Value::Str(right)) => left == right,
            (Value::Object(left), Value::Object(right)) => {
                Rc::ptr_eq(left, right) || *left.borrow() == *right.borrow()
            }
            _ => false,
        }
    }
}
