//! Operations, call arguments and bound tasks.
//!
//! An [`Operation`] is the immutable declaration of one semantic call: its
//! name, instruction text, typed parameters and result type.  Binding it to
//! concrete [`Arguments`] produces a [`Task`], the per-call value the
//! negotiation loop consumes.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::decode::decode;
use crate::error::{Result, SchemaError};
use crate::types::DeclaredType;

/// Computes a task's instruction from its bound arguments.
///
/// Returning `None` (or blank text) falls back to the operation's doc.
pub type Instruction = Arc<dyn Fn(&Task) -> Option<String> + Send + Sync>;

// ---------------------------------------------------------------------------
// Param
// ---------------------------------------------------------------------------

/// One declared parameter of an [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: DeclaredType,
    /// Keyword-only parameters never bind positionally.
    pub keyword_only: bool,
    /// Value bound when the caller omits the argument.
    pub default: Option<Value>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: DeclaredType) -> Self {
        Self {
            name: name.into(),
            ty,
            keyword_only: false,
            default: None,
        }
    }

    /// A parameter of type `any`, rendered as a bare name.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self::new(name, DeclaredType::Any)
    }

    pub fn keyword_only(mut self) -> Self {
        self.keyword_only = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// Declaration of a callable unit fulfilled by the remote model.
#[derive(Clone)]
pub struct Operation {
    name: String,
    doc: Option<String>,
    params: Vec<Param>,
    returns: DeclaredType,
    typed: bool,
    instruction: Option<Instruction>,
}

impl Operation {
    /// A typed operation with no parameters and an `any` result.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc: None,
            params: Vec::new(),
            returns: DeclaredType::Any,
            typed: true,
            instruction: None,
        }
    }

    /// A bare instruction with no declared signature.
    ///
    /// Any arguments are accepted and passed to the model unchanged.
    pub fn untyped(instruction: impl Into<String>) -> Self {
        Self {
            typed: false,
            ..Self::new("task").doc(instruction)
        }
    }

    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn param(mut self, param: Param) -> Self {
        self.params.push(param);
        self
    }

    pub fn returns(mut self, ty: DeclaredType) -> Self {
        self.returns = ty;
        self
    }

    /// Compute the task text at call time instead of using the doc.
    pub fn instruction<F>(mut self, f: F) -> Self
    where
        F: Fn(&Task) -> Option<String> + Send + Sync + 'static,
    {
        self.instruction = Some(Arc::new(f));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn doc_text(&self) -> Option<&str> {
        self.doc.as_deref()
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn result_type(&self) -> &DeclaredType {
        &self.returns
    }

    /// `false` for operations built with [`Operation::untyped`].
    pub fn is_typed(&self) -> bool {
        self.typed
    }

    fn binding_error(&self, reason: impl Into<String>) -> SchemaError {
        SchemaError::Binding {
            operation: self.name.clone(),
            reason: reason.into(),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("doc", &self.doc)
            .field("params", &self.params)
            .field("returns", &self.returns)
            .field("typed", &self.typed)
            .field("instruction", &self.instruction.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

/// Call-site arguments: positional values then named values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    pub positional: Vec<Value>,
    pub named: Map<String, Value>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Add (or replace) a named argument.
    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }
}

impl From<Vec<Value>> for Arguments {
    fn from(positional: Vec<Value>) -> Self {
        Self {
            positional,
            named: Map::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// An operation bound to concrete, coerced argument values.
#[derive(Debug, Clone)]
pub struct Task {
    operation: Arc<Operation>,
    bound: Vec<(String, Value)>,
    raw: Arguments,
}

impl Task {
    /// Bind `args` to the operation's parameters.
    ///
    /// Positional values fill non-keyword-only parameters in order, named
    /// values bind by name, omitted parameters take their default.  Each
    /// bound value is coerced through [`decode`] against its parameter type.
    pub fn bind(operation: Arc<Operation>, args: Arguments) -> Result<Self> {
        if !operation.typed {
            return Ok(Self {
                operation,
                bound: Vec::new(),
                raw: args,
            });
        }

        let positional_slots: Vec<usize> = operation
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| !p.keyword_only)
            .map(|(i, _)| i)
            .collect();
        if args.positional.len() > positional_slots.len() {
            return Err(operation.binding_error(format!(
                "takes {} positional argument(s) but {} were given",
                positional_slots.len(),
                args.positional.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = vec![None; operation.params.len()];
        for (&index, value) in positional_slots.iter().zip(&args.positional) {
            slots[index] = Some(value.clone());
        }

        for (name, value) in &args.named {
            let index = operation
                .params
                .iter()
                .position(|p| &p.name == name)
                .ok_or_else(|| operation.binding_error(format!("unexpected argument `{name}`")))?;
            if slots[index].is_some() {
                return Err(operation.binding_error(format!("multiple values for `{name}`")));
            }
            slots[index] = Some(value.clone());
        }

        let mut bound = Vec::with_capacity(slots.len());
        for (param, slot) in operation.params.iter().zip(slots) {
            let value = slot
                .or_else(|| param.default.clone())
                .ok_or_else(|| operation.binding_error(format!("missing argument `{}`", param.name)))?;
            let coerced = decode(&value, &param.ty).map_err(|err| {
                operation.binding_error(format!("argument `{}`: {err}", param.name))
            })?;
            bound.push((param.name.clone(), coerced));
        }

        tracing::debug!(operation = %operation.name, bound = bound.len(), "bound arguments");
        Ok(Self {
            operation,
            bound,
            raw: args,
        })
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Bound `(name, value)` pairs in parameter order.
    pub fn arguments(&self) -> &[(String, Value)] {
        &self.bound
    }

    /// Look up a bound argument by parameter name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bound.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// The arguments exactly as the caller supplied them.
    pub fn raw_arguments(&self) -> &Arguments {
        &self.raw
    }

    /// The instruction body: computed text when the operation provides a
    /// non-blank one, otherwise its doc.
    pub fn instruction(&self) -> String {
        if let Some(compute) = &self.operation.instruction
            && let Some(text) = compute(self)
            && !text.trim().is_empty()
        {
            return text;
        }
        self.operation.doc.clone().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
