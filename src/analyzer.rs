use std::collections::HashMap;

use num_traits::ToPrimitive;
use thiserror::Error;

use crate::ast::{BinaryOp, ExprId, ExprKind, Expression, Field, Literal, Method, Source, Statement};
use crate::types::Type;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("Unknown type '{name}'")]
    UnknownType { name: String },
    #[error("A main/0 method returning Integer is required")]
    MissingMain,
    #[error("Declaration of '{name}' needs a type or an initial value")]
    DeclarationWithoutType { name: String },
    #[error("Constant field '{name}' must have an initial value")]
    ConstantWithoutValue { name: String },
    #[error("Type {found} is not assignable to {expected}")]
    NotAssignable {
        expected: &'static str,
        found: &'static str,
    },
    #[error("Assignment target must be a variable or field access")]
    InvalidAssignmentTarget,
    #[error("Cannot assign to constant '{name}'")]
    ConstantAssignment { name: String },
    #[error("Condition must be Boolean, got {found}")]
    ConditionNotBoolean { found: &'static str },
    #[error("The {construct} body must not be empty")]
    EmptyBody { construct: &'static str },
    #[error("Only function calls may be used as statements")]
    ExpressionStatementNotCall,
    #[error("Return statement outside of a method")]
    ReturnOutsideMethod,
    #[error("Integer literal '{literal}' is out of range")]
    IntegerOutOfRange { literal: String },
    #[error("Decimal literal '{literal}' is out of range")]
    DecimalOutOfRange { literal: String },
    #[error("Grouped expression must contain a binary expression")]
    GroupNotBinary,
    #[error("Invalid operand types {left} and {right} for operator '{operator}'")]
    InvalidOperands {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined function '{name}/{arity}'")]
    UndefinedFunction { name: String, arity: usize },
    #[error("Type {ty} has no field '{name}'")]
    UnknownField { ty: &'static str, name: String },
    #[error("Type {ty} has no method '{name}/{arity}'")]
    UnknownMethod {
        ty: &'static str,
        name: String,
        arity: usize,
    },
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VariableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub target_name: String,
    pub ty: Type,
    pub constant: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub target_name: String,
    pub parameter_types: Vec<Type>,
    pub return_type: Type,
}

/// Everything the analyzer learns about a source tree.
///
/// The AST is never mutated: resolved symbols live in the tables below and
/// per-expression results are keyed by the parser-minted [`ExprId`]s.
#[derive(Debug, Default, PartialEq)]
pub struct Analysis {
    variables: Vec<Variable>,
    functions: Vec<Function>,
    expr_types: HashMap<ExprId, Type>,
    expr_variables: HashMap<ExprId, VariableId>,
    expr_functions: HashMap<ExprId, FunctionId>,
    /// Resolved variable per source field, in declaration order.
    pub field_variables: Vec<VariableId>,
    /// Resolved function per source method, in declaration order.
    pub method_functions: Vec<FunctionId>,
}

impl Analysis {
    pub fn type_of(&self, id: ExprId) -> Option<Type> {
        self.expr_types.get(&id).copied()
    }

    pub fn variable_of(&self, id: ExprId) -> Option<&Variable> {
        self.expr_variables.get(&id).map(|id| self.variable(*id))
    }

    pub fn function_of(&self, id: ExprId) -> Option<&Function> {
        self.expr_functions.get(&id).map(|id| self.function(*id))
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    fn add_variable(&mut self, variable: Variable) -> VariableId {
        let id = VariableId(self.variables.len() as u32);
        self.variables.push(variable);
        id
    }

    fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }
}

#[derive(Default)]
struct ScopeFrame {
    variables: HashMap<String, VariableId>,
    functions: HashMap<(String, usize), FunctionId>,
}

/// Lexical scope chain. Lookups walk outward; definitions always land in the
/// innermost frame.
struct ScopeStack {
    frames: Vec<ScopeFrame>,
}

impl ScopeStack {
    fn new() -> Self {
        Self {
            frames: vec![ScopeFrame::default()],
        }
    }

    fn push(&mut self) {
        self.frames.push(ScopeFrame::default());
    }

    fn pop(&mut self) {
        self.frames.pop();
    }

    fn define_variable(&mut self, name: &str, id: VariableId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.variables.insert(name.to_string(), id);
        }
    }

    fn define_function(&mut self, name: &str, arity: usize, id: FunctionId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.functions.insert((name.to_string(), arity), id);
        }
    }

    fn lookup_variable(&self, name: &str) -> Option<VariableId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.variables.get(name).copied())
    }

    fn lookup_function(&self, name: &str, arity: usize) -> Option<FunctionId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.functions.get(&(name.to_string(), arity)).copied())
    }
}

/// Resolves every name, attaches a type to every expression, and enforces the
/// semantic rules. The tree itself is left untouched.
pub struct Analyzer {
    analysis: Analysis,
    scopes: ScopeStack,
    current_return_type: Option<Type>,
}

pub fn analyze(source: &Source) -> AnalysisResult<Analysis> {
    let mut analyzer = Analyzer::new();
    analyzer.visit_source(source)?;
    Ok(analyzer.analysis)
}

impl Analyzer {
    fn new() -> Self {
        let mut analysis = Analysis::default();
        let mut scopes = ScopeStack::new();
        let print = analysis.add_function(Function {
            name: "print".to_string(),
            target_name: "System.out.println".to_string(),
            parameter_types: vec![Type::Any],
            return_type: Type::Nil,
        });
        scopes.define_function("print", 1, print);
        Self {
            analysis,
            scopes,
            current_return_type: None,
        }
    }

    fn visit_source(&mut self, source: &Source) -> AnalysisResult<()> {
        for field in &source.fields {
            self.visit_field(field)?;
        }

        let mut has_main = false;
        for method in &source.methods {
            self.visit_method(method)?;
            if method.name == "main"
                && method.parameters.is_empty()
                && method.return_type_name.as_deref() == Some("Integer")
            {
                has_main = true;
            }
        }

        if !has_main {
            return Err(AnalysisError::MissingMain);
        }
        Ok(())
    }

    fn visit_field(&mut self, field: &Field) -> AnalysisResult<()> {
        let declared = match &field.type_name {
            Some(name) => Some(self.resolve_type(name)?),
            None => None,
        };

        let ty = if let Some(value) = &field.value {
            let value_ty = self.visit_expression(value)?;
            match declared {
                Some(declared) => {
                    require_assignable(declared, value_ty)?;
                    declared
                }
                None => value_ty,
            }
        } else if field.constant {
            return Err(AnalysisError::ConstantWithoutValue {
                name: field.name.clone(),
            });
        } else {
            declared.ok_or_else(|| AnalysisError::DeclarationWithoutType {
                name: field.name.clone(),
            })?
        };

        let id = self.define_variable(&field.name, ty, field.constant);
        self.analysis.field_variables.push(id);
        Ok(())
    }

    fn visit_method(&mut self, method: &Method) -> AnalysisResult<()> {
        let return_type = match &method.return_type_name {
            Some(name) => self.resolve_type(name)?,
            None => Type::Nil,
        };
        let parameter_types = method
            .parameter_type_names
            .iter()
            .map(|name| self.resolve_type(name))
            .collect::<AnalysisResult<Vec<_>>>()?;

        let function_id = self.analysis.add_function(Function {
            name: method.name.clone(),
            target_name: method.name.clone(),
            parameter_types: parameter_types.clone(),
            return_type,
        });
        self.scopes
            .define_function(&method.name, method.parameters.len(), function_id);
        self.analysis.method_functions.push(function_id);

        self.scopes.push();
        for (name, ty) in method.parameters.iter().zip(&parameter_types) {
            self.define_variable(name, *ty, false);
        }
        let previous_return = self.current_return_type.replace(return_type);

        let mut result = Ok(());
        for statement in &method.statements {
            result = self.visit_statement(statement);
            if result.is_err() {
                break;
            }
        }

        self.current_return_type = previous_return;
        self.scopes.pop();
        result
    }

    fn visit_statement(&mut self, statement: &Statement) -> AnalysisResult<()> {
        match statement {
            Statement::Expression(expression) => {
                self.visit_expression(expression)?;
                if !matches!(expression.kind, ExprKind::Function { .. }) {
                    return Err(AnalysisError::ExpressionStatementNotCall);
                }
                Ok(())
            }
            Statement::Declaration {
                name,
                type_name,
                value,
            } => {
                let declared = match type_name {
                    Some(type_name) => Some(self.resolve_type(type_name)?),
                    None => None,
                };
                let ty = if let Some(value) = value {
                    let value_ty = self.visit_expression(value)?;
                    match declared {
                        Some(declared) => {
                            require_assignable(declared, value_ty)?;
                            declared
                        }
                        None => value_ty,
                    }
                } else {
                    declared.ok_or_else(|| AnalysisError::DeclarationWithoutType {
                        name: name.clone(),
                    })?
                };
                self.define_variable(name, ty, false);
                Ok(())
            }
            Statement::Assignment { receiver, value } => {
                if !matches!(receiver.kind, ExprKind::Access { .. }) {
                    return Err(AnalysisError::InvalidAssignmentTarget);
                }
                let receiver_ty = self.visit_expression(receiver)?;
                let value_ty = self.visit_expression(value)?;
                require_assignable(receiver_ty, value_ty)?;
                if let Some(variable) = self.analysis.variable_of(receiver.id) {
                    if variable.constant {
                        return Err(AnalysisError::ConstantAssignment {
                            name: variable.name.clone(),
                        });
                    }
                }
                Ok(())
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                self.check_condition(condition)?;
                if then_statements.is_empty() {
                    return Err(AnalysisError::EmptyBody { construct: "if" });
                }
                // Then and else bodies get sibling scopes, both children of
                // the surrounding one.
                self.visit_body(then_statements)?;
                if !else_statements.is_empty() {
                    self.visit_body(else_statements)?;
                }
                Ok(())
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                // Header statements resolve in the surrounding scope; only
                // the body opens a child.
                if let Some(initializer) = initializer {
                    self.visit_statement(initializer)?;
                }
                if let Some(condition) = condition {
                    self.check_condition(condition)?;
                }
                if let Some(increment) = increment {
                    self.visit_statement(increment)?;
                }
                if statements.is_empty() {
                    return Err(AnalysisError::EmptyBody { construct: "for" });
                }
                self.visit_body(statements)
            }
            Statement::While {
                condition,
                statements,
            } => {
                self.check_condition(condition)?;
                if statements.is_empty() {
                    return Err(AnalysisError::EmptyBody { construct: "while" });
                }
                self.visit_body(statements)
            }
            Statement::Return { value } => {
                let expected = self
                    .current_return_type
                    .ok_or(AnalysisError::ReturnOutsideMethod)?;
                let found = self.visit_expression(value)?;
                require_assignable(expected, found)
            }
        }
    }

    fn visit_body(&mut self, statements: &[Statement]) -> AnalysisResult<()> {
        self.scopes.push();
        let mut result = Ok(());
        for statement in statements {
            result = self.visit_statement(statement);
            if result.is_err() {
                break;
            }
        }
        self.scopes.pop();
        result
    }

    fn check_condition(&mut self, condition: &Expression) -> AnalysisResult<()> {
        let ty = self.visit_expression(condition)?;
        if ty != Type::Boolean {
            return Err(AnalysisError::ConditionNotBoolean { found: ty.name() });
        }
        Ok(())
    }

    fn visit_expression(&mut self, expression: &Expression) -> AnalysisResult<Type> {
        let ty = match &expression.kind {
            ExprKind::Literal(literal) => literal_type(literal)?,
            ExprKind::Group(inner) => {
                if !matches!(inner.kind, ExprKind::Binary { .. }) {
                    return Err(AnalysisError::GroupNotBinary);
                }
                self.visit_expression(inner)?
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.visit_expression(left)?;
                let right_ty = self.visit_expression(right)?;
                binary_type(*op, left_ty, right_ty)?
            }
            ExprKind::Access {
                receiver: Some(receiver),
                name,
            } => {
                let receiver_ty = self.visit_expression(receiver)?;
                let member =
                    receiver_ty
                        .field(name)
                        .ok_or_else(|| AnalysisError::UnknownField {
                            ty: receiver_ty.name(),
                            name: name.clone(),
                        })?;
                member.ty
            }
            ExprKind::Access {
                receiver: None,
                name,
            } => {
                let id = self.scopes.lookup_variable(name).ok_or_else(|| {
                    AnalysisError::UndefinedVariable { name: name.clone() }
                })?;
                self.analysis.expr_variables.insert(expression.id, id);
                self.analysis.variable(id).ty
            }
            ExprKind::Function {
                receiver: Some(receiver),
                name,
                arguments,
            } => {
                let receiver_ty = self.visit_expression(receiver)?;
                let member = receiver_ty.method(name, arguments.len()).ok_or_else(|| {
                    AnalysisError::UnknownMethod {
                        ty: receiver_ty.name(),
                        name: name.clone(),
                        arity: arguments.len(),
                    }
                })?;
                for argument in arguments {
                    self.visit_expression(argument)?;
                }
                member.ty
            }
            ExprKind::Function {
                receiver: None,
                name,
                arguments,
            } => {
                let id = self
                    .scopes
                    .lookup_function(name, arguments.len())
                    .ok_or_else(|| AnalysisError::UndefinedFunction {
                        name: name.clone(),
                        arity: arguments.len(),
                    })?;
                self.analysis.expr_functions.insert(expression.id, id);
                let function = self.analysis.function(id);
                let parameter_types = function.parameter_types.clone();
                let return_type = function.return_type;
                for (argument, parameter_type) in arguments.iter().zip(parameter_types) {
                    let argument_ty = self.visit_expression(argument)?;
                    require_assignable(parameter_type, argument_ty)?;
                }
                return_type
            }
        };
        self.analysis.expr_types.insert(expression.id, ty);
        Ok(ty)
    }

    fn resolve_type(&self, name: &str) -> AnalysisResult<Type> {
        Type::from_name(name).ok_or_else(|| AnalysisError::UnknownType {
            name: name.to_string(),
        })
    }

    fn define_variable(&mut self, name: &str, ty: Type, constant: bool) -> VariableId {
        let id = self.analysis.add_variable(Variable {
            name: name.to_string(),
            target_name: name.to_string(),
            ty,
            constant,
        });
        self.scopes.define_variable(name, id);
        id
    }
}

fn literal_type(literal: &Literal) -> AnalysisResult<Type> {
    match literal {
        Literal::Nil => Ok(Type::Nil),
        Literal::Boolean(_) => Ok(Type::Boolean),
        Literal::Character(_) => Ok(Type::Character),
        Literal::String(_) => Ok(Type::String),
        Literal::Integer(value) => {
            if value.to_i32().is_some() {
                Ok(Type::Integer)
            } else {
                Err(AnalysisError::IntegerOutOfRange {
                    literal: value.to_string(),
                })
            }
        }
        Literal::Decimal(value) => match value.to_f64() {
            Some(converted) if converted.is_finite() => Ok(Type::Decimal),
            _ => Err(AnalysisError::DecimalOutOfRange {
                literal: value.to_string(),
            }),
        },
    }
}

fn binary_type(op: BinaryOp, left: Type, right: Type) -> AnalysisResult<Type> {
    let invalid = || AnalysisError::InvalidOperands {
        operator: op.as_str(),
        left: left.name(),
        right: right.name(),
    };
    match op {
        BinaryOp::And | BinaryOp::Or => {
            if left == Type::Boolean && right == Type::Boolean {
                Ok(Type::Boolean)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Less
        | BinaryOp::LessEqual
        | BinaryOp::Greater
        | BinaryOp::GreaterEqual
        | BinaryOp::Equal
        | BinaryOp::NotEqual => {
            if left == right && left.is_comparable() {
                Ok(Type::Boolean)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Add => {
            if left == Type::String || right == Type::String {
                Ok(Type::String)
            } else if left == Type::Integer && right == Type::Integer {
                Ok(Type::Integer)
            } else if left == Type::Decimal && right == Type::Decimal {
                Ok(Type::Decimal)
            } else {
                Err(invalid())
            }
        }
        BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => {
            if left == Type::Integer && right == Type::Integer {
                Ok(Type::Integer)
            } else if left == Type::Decimal && right == Type::Decimal {
                Ok(Type::Decimal)
            } else {
                Err(invalid())
            }
        }
    }
}

fn require_assignable(target: Type, found: Type) -> AnalysisResult<()> {
    if target.assignable_from(found) {
        Ok(())
    } else {
        Err(AnalysisError::NotAssignable {
            expected: target.name(),
            found: found.name(),
        })
    }
}
