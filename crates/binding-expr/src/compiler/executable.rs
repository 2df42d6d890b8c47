use std::fmt::{self, Debug, Formatter};

use smallvec::SmallVec;

use crate::{Metadata, Shared, Type, Value, convert::ConvertError, error::runtime::RuntimeError};

type EvalFn = dyn Fn(&Frame<'_>) -> Result<Value, RuntimeError> + Send + Sync;

pub(crate) type Locals = SmallVec<[Value; 4]>;

/// Invocation state visible to an executable.
#[derive(Clone, Copy)]
pub struct Frame<'a> {
    args: &'a [Value],
    metadata: &'a Metadata,
    locals: &'a [Value],
}

impl<'a> Frame<'a> {
    pub fn new(args: &'a [Value], metadata: &'a Metadata) -> Self {
        Self {
            args,
            metadata,
            locals: &[],
        }
    }

    #[inline(always)]
    pub fn args(&self) -> &'a [Value] {
        self.args
    }

    #[inline(always)]
    pub fn metadata(&self) -> &'a Metadata {
        self.metadata
    }

    #[inline(always)]
    pub(crate) fn locals(&self) -> &'a [Value] {
        self.locals
    }

    /// Value of a lambda or null-conditional slot. Unassigned slots read as
    /// `Null`.
    #[inline(always)]
    pub fn local(&self, slot: usize) -> Value {
        self.locals.get(slot).cloned().unwrap_or_default()
    }

    pub fn with_locals<'b>(&self, locals: &'b [Value]) -> Frame<'b>
    where
        'a: 'b,
    {
        Frame {
            args: self.args,
            metadata: self.metadata,
            locals,
        }
    }

    /// Copies the current locals and assigns `value` to `slot`.
    pub(crate) fn extend_locals(&self, slot: usize, value: Value) -> Locals {
        let mut locals: Locals = self.locals.iter().cloned().collect();
        if locals.len() <= slot {
            locals.resize(slot + 1, Value::Null);
        }
        locals[slot] = value;
        locals
    }
}

impl Debug for Frame<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("args", &self.args)
            .field("locals", &self.locals)
            .finish()
    }
}

#[derive(Clone)]
enum Body {
    Constant(Value),
    Eval { eval: Shared<EvalFn>, closed: bool },
}

/// A node of the built tree: a static type plus either a constant or an
/// evaluation closure.
///
/// `closed` marks closures with no free variables. Such closures read neither
/// invocation arguments, locals nor metadata and never call into host members,
/// so the optimizer may evaluate them once at build time.
#[derive(Clone)]
pub struct Executable {
    ty: Type,
    body: Body,
}

impl Executable {
    pub fn constant(value: Value, ty: Type) -> Self {
        Self {
            ty,
            body: Body::Constant(value),
        }
    }

    pub fn new<F>(ty: Type, closed: bool, eval: F) -> Self
    where
        F: Fn(&Frame<'_>) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        Self {
            ty,
            body: Body::Eval {
                eval: Shared::new(eval),
                closed,
            },
        }
    }

    #[inline(always)]
    pub fn ty(&self) -> &Type {
        &self.ty
    }

    #[inline(always)]
    pub fn is_constant(&self) -> bool {
        matches!(self.body, Body::Constant(_))
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match &self.body {
            Body::Constant(value) => Some(value),
            Body::Eval { .. } => None,
        }
    }

    pub fn is_null_constant(&self) -> bool {
        matches!(self.body, Body::Constant(Value::Null))
    }

    pub fn is_closed(&self) -> bool {
        match &self.body {
            Body::Constant(_) => true,
            Body::Eval { closed, .. } => *closed,
        }
    }

    #[inline(always)]
    pub fn eval(&self, frame: &Frame<'_>) -> Result<Value, RuntimeError> {
        match &self.body {
            Body::Constant(value) => Ok(value.clone()),
            Body::Eval { eval, .. } => eval(frame),
        }
    }

    pub fn with_type(self, ty: Type) -> Self {
        Self { ty, ..self }
    }

    /// Converts the result to `target` along the implicit conversion lattice.
    /// Returns `None` when `target` is not assignable from this type.
    pub fn convert(self, target: &Type) -> Option<Self> {
        if &self.ty == target {
            return Some(self);
        }

        if self.is_null_constant() && target.is_nullable() {
            return Some(Executable::constant(Value::Null, target.clone()));
        }

        if !target.is_assignable_from(&self.ty) {
            return None;
        }

        if !target.underlying().is_value_type() {
            return Some(self.with_type(target.clone()));
        }

        match self.body {
            Body::Constant(value) => value
                .convert(target)
                .map(|value| Executable::constant(value, target.clone())),
            Body::Eval { eval, closed } => {
                let to = target.clone();
                Some(Executable {
                    ty: target.clone(),
                    body: Body::Eval {
                        eval: Shared::new(move |frame: &Frame<'_>| -> Result<Value, RuntimeError> {
                            let value = eval(frame)?;
                            value
                                .convert(&to)
                                .ok_or_else(|| ConvertError::new(&value, &to).into())
                        }),
                        closed,
                    },
                })
            }
        }
    }
}

impl Debug for Executable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.body {
            Body::Constant(value) => write!(f, "Constant({:?}: {})", value, self.ty),
            Body::Eval { closed, .. } => write!(f, "Eval({}, closed: {})", self.ty, closed),
        }
    }
}
