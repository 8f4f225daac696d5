//! Tree-walking backend.
//!
//! Executes the AST directly against its own scope chain, independent of any
//! analysis: names resolve dynamically and operators dispatch on the runtime
//! tags of their operands. Top-level execution defines every field, registers
//! every method, then invokes `main/0`.

use std::rc::Rc;

use bigdecimal::RoundingMode;
use num_traits::Zero;

use crate::ast::{BinaryOp, ExprKind, Expression, Literal, Source, Statement};

mod error;
mod scope;
mod value;

pub use error::RuntimeError;
pub use value::{HostMethod, Object, Value};

use scope::{Builtin, RuntimeFunction, Scopes};

/// Result of one evaluation: the value `main` returned plus everything
/// `print` wrote, one line per call.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    pub output: Vec<String>,
}

pub struct Interpreter;

impl Interpreter {
    pub fn new() -> Self {
        Self
    }

    pub fn run(&self, source: &Source) -> Result<Evaluation, RuntimeError> {
        let mut runtime = Runtime::new();
        let value = runtime.run(source)?;
        Ok(Evaluation {
            value,
            output: runtime.output,
        })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-flow outcome of statement execution. `Return` unwinds to the
/// nearest enclosing method invocation, which converts it back into a value.
enum Flow {
    Continue,
    Return(Value),
}

type ExecResult = Result<Flow, RuntimeError>;
type EvalResult = Result<Value, RuntimeError>;

struct Runtime<'src> {
    scopes: Scopes<'src>,
    output: Vec<String>,
}

impl<'src> Runtime<'src> {
    fn new() -> Self {
        let mut scopes = Scopes::new();
        scopes.define_function("print", 1, RuntimeFunction::Builtin(Builtin::Print));
        Self {
            scopes,
            output: Vec::new(),
        }
    }

    fn run(&mut self, source: &'src Source) -> EvalResult {
        for field in &source.fields {
            let value = match &field.value {
                Some(value) => self.eval_expression(value)?,
                None => Value::Nil,
            };
            self.scopes
                .define_variable(&field.name, field.constant, value);
        }

        for method in &source.methods {
            self.scopes.define_function(
                &method.name,
                method.parameters.len(),
                RuntimeFunction::User {
                    parameters: &method.parameters,
                    statements: &method.statements,
                    scope: self.scopes.current(),
                },
            );
        }

        let main = self
            .scopes
            .lookup_function("main", 0)
            .ok_or(RuntimeError::MissingMain)?;
        self.invoke(main, Vec::new())
    }

    fn invoke(&mut self, function: RuntimeFunction<'src>, arguments: Vec<Value>) -> EvalResult {
        match function {
            RuntimeFunction::Builtin(Builtin::Print) => {
                // Arity is part of the lookup key, so print always gets
                // exactly one argument.
                let mut arguments = arguments;
                let value = arguments.pop().unwrap_or(Value::Nil);
                self.output.push(value.to_output());
                Ok(Value::Nil)
            }
            RuntimeFunction::User {
                parameters,
                statements,
                scope,
            } => {
                let previous = self.scopes.enter(scope);
                for (parameter, value) in parameters.iter().zip(arguments) {
                    self.scopes.define_variable(parameter, false, value);
                }
                let flow = self.exec_block(statements);
                self.scopes.exit(previous);
                match flow? {
                    Flow::Return(value) => Ok(value),
                    Flow::Continue => Ok(Value::Nil),
                }
            }
        }
    }

    fn exec_block(&mut self, statements: &'src [Statement]) -> ExecResult {
        for statement in statements {
            if let Flow::Return(value) = self.exec_statement(statement)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_statement(&mut self, statement: &'src Statement) -> ExecResult {
        match statement {
            Statement::Expression(expression) => {
                self.eval_expression(expression)?;
                Ok(Flow::Continue)
            }
            Statement::Declaration { name, value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expression(value)?,
                    None => Value::Nil,
                };
                self.scopes.define_variable(name, false, value);
                Ok(Flow::Continue)
            }
            Statement::Assignment { receiver, value } => {
                let ExprKind::Access {
                    receiver: target,
                    name,
                } = &receiver.kind
                else {
                    return Err(RuntimeError::InvalidAssignmentTarget);
                };
                match target {
                    Some(target) => {
                        let target = self.eval_expression(target)?;
                        let Value::Object(object) = &target else {
                            return Err(RuntimeError::ExpectedObject {
                                found: target.type_name(),
                            });
                        };
                        let object = Rc::clone(object);
                        let value = self.eval_expression(value)?;
                        object.borrow_mut().set_field(name, value)?;
                    }
                    None => {
                        let value = self.eval_expression(value)?;
                        self.scopes.assign(name, value)?;
                    }
                }
                Ok(Flow::Continue)
            }
            Statement::If {
                condition,
                then_statements,
                else_statements,
            } => {
                let branch = if self.eval_condition(condition)? {
                    then_statements
                } else {
                    else_statements
                };
                let previous = self.scopes.push_child();
                let flow = self.exec_block(branch);
                self.scopes.exit(previous);
                flow
            }
            Statement::While {
                condition,
                statements,
            } => {
                loop {
                    if !self.eval_condition(condition)? {
                        break;
                    }
                    let previous = self.scopes.push_child();
                    let flow = self.exec_block(statements);
                    self.scopes.exit(previous);
                    if let Flow::Return(value) = flow? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Continue)
            }
            Statement::For {
                initializer,
                condition,
                increment,
                statements,
            } => {
                if let Some(initializer) = initializer {
                    self.exec_statement(initializer)?;
                }
                loop {
                    // An absent condition means the body never runs.
                    let Some(condition) = condition else {
                        break;
                    };
                    if !self.eval_condition(condition)? {
                        break;
                    }
                    let previous = self.scopes.push_child();
                    let mut flow = self.exec_block(statements);
                    if let Ok(Flow::Continue) = flow {
                        if let Some(increment) = increment {
                            flow = self.exec_statement(increment);
                        }
                    }
                    self.scopes.exit(previous);
                    if let Flow::Return(value) = flow? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Continue)
            }
            Statement::Return { value } => Ok(Flow::Return(self.eval_expression(value)?)),
        }
    }

    fn eval_condition(&mut self, condition: &'src Expression) -> Result<bool, RuntimeError> {
        let value = self.eval_expression(condition)?;
        match value {
            Value::Boolean(value) => Ok(value),
            other => Err(RuntimeError::ExpectedBoolean {
                found: other.type_name(),
            }),
        }
    }

    fn eval_expression(&mut self, expression: &'src Expression) -> EvalResult {
        match &expression.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Group(inner) => self.eval_expression(inner),
            ExprKind::Binary { op, left, right } => self.eval_binary(*op, left, right),
            ExprKind::Access {
                receiver: None,
                name,
            } => self
                .scopes
                .lookup(name)
                .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() }),
            ExprKind::Access {
                receiver: Some(receiver),
                name,
            } => {
                let receiver = self.eval_expression(receiver)?;
                let Value::Object(object) = &receiver else {
                    return Err(RuntimeError::ExpectedObject {
                        found: receiver.type_name(),
                    });
                };
                let field = object.borrow().field(name);
                field.ok_or_else(|| RuntimeError::UnknownField { name: name.clone() })
            }
            ExprKind::Function {
                receiver: None,
                name,
                arguments,
            } => {
                let values = self.eval_arguments(arguments)?;
                let function = self
                    .scopes
                    .lookup_function(name, values.len())
                    .ok_or_else(|| RuntimeError::UndefinedFunction {
                        name: name.clone(),
                        arity: values.len(),
                    })?;
                self.invoke(function, values)
            }
            ExprKind::Function {
                receiver: Some(receiver),
                name,
                arguments,
            } => {
                let receiver = self.eval_expression(receiver)?;
                let Value::Object(object) = &receiver else {
                    return Err(RuntimeError::ExpectedObject {
                        found: receiver.type_name(),
                    });
                };
                let object = Rc::clone(object);
                let values = self.eval_arguments(arguments)?;
                let method = object.borrow().method(name, values.len()).ok_or_else(|| {
                    RuntimeError::UnknownMethod {
                        name: name.clone(),
                        arity: values.len(),
                    }
                })?;
                let result = method(&mut object.borrow_mut(), values);
                result
            }
        }
    }

    fn eval_arguments(&mut self, arguments: &'src [Expression]) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(arguments.len());
        for argument in arguments {
            values.push(self.eval_expression(argument)?);
        }
        Ok(values)
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &'src Expression,
        right: &'src Expression,
    ) -> EvalResult {
        match op {
            BinaryOp::And => {
                if !self.eval_condition(left)? {
                    return Ok(Value::Boolean(false));
                }
                Ok(Value::Boolean(self.eval_condition(right)?))
            }
            BinaryOp::Or => {
                if self.eval_condition(left)? {
                    return Ok(Value::Boolean(true));
                }
                Ok(Value::Boolean(self.eval_condition(right)?))
            }
            BinaryOp::Equal => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(Value::Boolean(left == right))
            }
            BinaryOp::NotEqual => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                Ok(Value::Boolean(left != right))
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                let ordering = compare(op, &left, &right)?;
                let result = match op {
                    BinaryOp::Less => ordering.is_lt(),
                    BinaryOp::LessEqual => ordering.is_le(),
                    BinaryOp::Greater => ordering.is_gt(),
                    _ => ordering.is_ge(),
                };
                Ok(Value::Boolean(result))
            }
            BinaryOp::Add => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                match (left, right) {
                    (left @ Value::Str(_), right) | (left, right @ Value::Str(_)) => Ok(
                        Value::Str(format!("{}{}", left.to_output(), right.to_output())),
                    ),
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left + right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left + right))
                    }
                    (left, right) => Err(invalid_operands(op, &left, &right)),
                }
            }
            BinaryOp::Subtract => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left - right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left - right))
                    }
                    (left, right) => Err(invalid_operands(op, &left, &right)),
                }
            }
            BinaryOp::Multiply => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        Ok(Value::Integer(left * right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        Ok(Value::Decimal(left * right))
                    }
                    (left, right) => Err(invalid_operands(op, &left, &right)),
                }
            }
            BinaryOp::Divide => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                match (left, right) {
                    (Value::Integer(left), Value::Integer(right)) => {
                        if right.is_zero() {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        // BigInt division truncates toward zero.
                        Ok(Value::Integer(left / right))
                    }
                    (Value::Decimal(left), Value::Decimal(right)) => {
                        if right.is_zero() {
                            return Err(RuntimeError::DivisionByZero);
                        }
                        // The quotient keeps the dividend's scale, rounded
                        // half to even.
                        let scale = left.fractional_digit_count();
                        let quotient = left / right;
                        Ok(Value::Decimal(
                            quotient.with_scale_round(scale, RoundingMode::HalfEven),
                        ))
                    }
                    (left, right) => Err(invalid_operands(op, &left, &right)),
                }
            }
        }
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Nil => Value::Nil,
        Literal::Boolean(value) => Value::Boolean(*value),
        Literal::Character(value) => Value::Character(*value),
        Literal::Integer(value) => Value::Integer(value.clone()),
        Literal::Decimal(value) => Value::Decimal(value.clone()),
        Literal::String(value) => Value::Str(value.clone()),
    }
}

/// Ordered comparison requires both operands to carry the same orderable tag.
fn compare(
    op: BinaryOp,
    left: &Value,
    right: &Value,
) -> Result<std::cmp::Ordering, RuntimeError> {
    match (left, right) {
        (Value::Integer(left), Value::Integer(right)) => Ok(left.cmp(right)),
        (Value::Decimal(left), Value::Decimal(right)) => Ok(left.cmp(right)),
        (Value::Character(left), Value::Character(right)) => Ok(left.cmp(right)),
        (Value::Str(left), Value::Str(right)) => Ok(left.cmp(right)),
        _ => Err(invalid_operands(op, left, right)),
    }
}

fn invalid_operands(op: BinaryOp, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::InvalidOperands {
        operator: op.as_str(),
        left: left.type_name(),
        right: right.type_name(),
    }
}
