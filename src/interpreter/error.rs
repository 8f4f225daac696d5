use thiserror::Error;

/// Typed errors produced by the tree-walking evaluator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("A main/0 method was not found")]
    MissingMain,
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}/{arity}'")]
    UndefinedFunction { name: String, arity: usize },
    #[error("Cannot assign to constant '{name}'")]
    ConstantAssignment { name: String },
    #[error("Assignment target must be a variable or field access")]
    InvalidAssignmentTarget,
    #[error("Expected a Boolean, got {found}")]
    ExpectedBoolean { found: &'static str },
    #[error("Expected an object, got {found}")]
    ExpectedObject { found: &'static str },
    #[error("Invalid operand types {left} and {right} for operator '{operator}'")]
    InvalidOperands {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Object has no field '{name}'")]
    UnknownField { name: String },
    #[error("Object has no method '{name}/{arity}'")]
    UnknownMethod { name: String, arity: usize },
}
