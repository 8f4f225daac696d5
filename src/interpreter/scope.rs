use std::collections::HashMap;

use crate::ast::Statement;

use super::error::RuntimeError;
use super::value::Value;

/// Handle into the scope arena. Methods capture the scope they were defined
/// in, so their bodies run as children of it rather than of the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct ScopeId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Builtin {
    Print,
}

#[derive(Clone)]
pub(super) enum RuntimeFunction<'src> {
    Builtin(Builtin),
    User {
        parameters: &'src [String],
        statements: &'src [Statement],
        scope: ScopeId,
    },
}

#[derive(Debug)]
struct RuntimeVariable {
    constant: bool,
    value: Value,
}

struct ScopeData<'src> {
    parent: Option<ScopeId>,
    variables: HashMap<String, RuntimeVariable>,
    functions: HashMap<(String, usize), RuntimeFunction<'src>>,
}

impl<'src> ScopeData<'src> {
    fn new(parent: Option<ScopeId>) -> Self {
        Self {
            parent,
            variables: HashMap::new(),
            functions: HashMap::new(),
        }
    }
}

/// Arena-backed lexical scope chain for one evaluation.
///
/// Scopes are entered and exited strictly LIFO, so exiting can truncate the
/// arena: everything allocated since the matching enter is unreachable once
/// control leaves the block, on the error path included.
pub(super) struct Scopes<'src> {
    arena: Vec<ScopeData<'src>>,
    current: ScopeId,
}

impl<'src> Scopes<'src> {
    pub(super) fn new() -> Self {
        Self {
            arena: vec![ScopeData::new(None)],
            current: ScopeId(0),
        }
    }

    pub(super) fn current(&self) -> ScopeId {
        self.current
    }

    /// Opens a child of the current scope, returning the previous current for
    /// the matching [`Self::exit`].
    pub(super) fn push_child(&mut self) -> ScopeId {
        self.enter(self.current)
    }

    /// Opens a child of an arbitrary scope (used for method invocation, which
    /// runs in a child of the method's defining scope).
    pub(super) fn enter(&mut self, parent: ScopeId) -> ScopeId {
        let previous = self.current;
        self.arena.push(ScopeData::new(Some(parent)));
        self.current = ScopeId(self.arena.len() - 1);
        previous
    }

    pub(super) fn exit(&mut self, previous: ScopeId) {
        debug_assert_eq!(self.current.0, self.arena.len() - 1);
        self.arena.truncate(self.current.0);
        self.current = previous;
    }

    pub(super) fn define_variable(&mut self, name: &str, constant: bool, value: Value) {
        self.arena[self.current.0]
            .variables
            .insert(name.to_string(), RuntimeVariable { constant, value });
    }

    pub(super) fn lookup(&self, name: &str) -> Option<Value> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            let data = &self.arena[id.0];
            if let Some(variable) = data.variables.get(name) {
                return Some(variable.value.clone());
            }
            scope = data.parent;
        }
        None
    }

    /// Writes through the chain to wherever `name` is defined.
    pub(super) fn assign(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            if let Some(variable) = self.arena[id.0].variables.get_mut(name) {
                if variable.constant {
                    return Err(RuntimeError::ConstantAssignment {
                        name: name.to_string(),
                    });
                }
                variable.value = value;
                return Ok(());
            }
            scope = self.arena[id.0].parent;
        }
        Err(RuntimeError::UndefinedVariable {
            name: name.to_string(),
        })
    }

    pub(super) fn define_function(
        &mut self,
        name: &str,
        arity: usize,
        function: RuntimeFunction<'src>,
    ) {
        self.arena[self.current.0]
            .functions
            .insert((name.to_string(), arity), function);
    }

    pub(super) fn lookup_function(&self, name: &str, arity: usize) -> Option<RuntimeFunction<'src>> {
        let key = (name.to_string(), arity);
        let mut scope = Some(self.current);
        while let Some(id) = scope {
            let data = &self.arena[id.0];
            if let Some(function) = data.functions.get(&key) {
                return Some(function.clone());
            }
            scope = data.parent;
        }
        None
    }
}
