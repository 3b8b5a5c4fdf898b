//! Call sites and the immutable call descriptions derived from them.

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    env::{CallableId, ClassId},
    resolve::{candidate::CandidateId, reference::ResolvedReference},
    span::Span,
    symbol::Symbol,
    ty::Ty,
    unique::Uid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallKind {
    Function,
    VariableAccess,
    CallableReference,
    DelegatingConstructorCall,
    Annotation,
    /// A call whose callee is a value invoked through `invoke`.
    ImplicitInvoke,
}

impl CallKind {
    /// The kind to retry with when an attempt finds no candidates at all.
    pub const fn fallback(self) -> Option<CallKind> {
        match self {
            CallKind::Function => Some(CallKind::VariableAccess),
            CallKind::VariableAccess => Some(CallKind::Function),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallOrigin {
    #[default]
    Regular,
    /// The call was written with operator syntax (`a + b`, `a[i]`, ...).
    Operator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverOrigin {
    Explicit,
    /// The implicit receiver at this depth, 0 being the innermost.
    Implicit(u32),
    Super,
    /// The value a candidate is implicitly invoked on.
    InvokedValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiverValue {
    pub ty: Arc<Ty>,
    pub origin: ReceiverOrigin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExplicitReceiver {
    Expr { ty: Arc<Ty>, is_constant: bool },
    /// `super`, as in `super.f()`.
    Super,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaBody {
    Returns(Arc<Ty>),
    /// The lambda returns its parameter at this index.
    ReturnsParam(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaArgument {
    pub id: Uid,
    /// `None` if the lambda has no parameter list, in which case it may take
    /// a single implicit parameter.
    pub params: Option<Box<[Symbol]>>,
    pub body: LambdaBody,
}

impl LambdaArgument {
    /// Returns `true` if the lambda can take `arity` parameters.
    pub fn accepts_arity(&self, arity: usize) -> bool {
        match &self.params {
            Some(params) => params.len() == arity,
            None => arity <= 1,
        }
    }

    pub fn declared_arity(&self) -> usize {
        self.params.as_ref().map(|params| params.len()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentValue {
    Expr(Arc<Ty>),
    Lambda(Arc<LambdaArgument>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub name: Option<Symbol>,
    pub spread: bool,
    pub value: ArgumentValue,
}

impl Argument {
    pub fn positional(ty: Arc<Ty>) -> Self {
        Self {
            name: None,
            spread: false,
            value: ArgumentValue::Expr(ty),
        }
    }

    pub fn as_lambda(&self) -> Option<&Arc<LambdaArgument>> {
        match &self.value {
            ArgumentValue::Lambda(lambda) => Some(lambda),
            ArgumentValue::Expr(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainingDeclaration {
    Class(ClassId),
    Callable(CallableId),
}

/// An immutable description of one resolution attempt.
///
/// A fallback attempt gets its own [`CallInfo`] (see [`CallInfo::with_kind`]);
/// the original is never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    pub kind: CallKind,
    pub name: Symbol,
    pub explicit_receiver: Option<ExplicitReceiver>,
    pub args: Box<[Argument]>,
    pub type_args: Box<[Arc<Ty>]>,
    /// Innermost first.
    pub containing: Arc<[ContainingDeclaration]>,
    pub origin: CallOrigin,
    /// The type a callable reference is expected to have.
    pub expected: Option<Arc<Ty>>,
    /// Set when the call's value feeds an outer call, whose completion will
    /// also complete this one.
    pub dependent: bool,
}

impl CallInfo {
    pub fn with_kind(&self, kind: CallKind) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    /// The innermost class enclosing the call.
    pub fn containing_class(&self) -> Option<ClassId> {
        self.containing.iter().find_map(|decl| match decl {
            ContainingDeclaration::Class(id) => Some(*id),
            ContainingDeclaration::Callable(_) => None,
        })
    }

    pub fn explicit_receiver_ty(&self) -> Option<&Arc<Ty>> {
        match &self.explicit_receiver {
            Some(ExplicitReceiver::Expr { ty, .. }) => Some(ty),
            Some(ExplicitReceiver::Super) | None => None,
        }
    }

    pub fn is_super_call(&self) -> bool {
        matches!(self.explicit_receiver, Some(ExplicitReceiver::Super))
    }

    pub fn has_constant_receiver(&self) -> bool {
        matches!(
            self.explicit_receiver,
            Some(ExplicitReceiver::Expr {
                is_constant: true,
                ..
            })
        )
    }

    /// Returns the unique lambda argument with this id.
    pub fn lambda(&self, id: Uid) -> Option<(usize, &Arc<LambdaArgument>)> {
        self.args.iter().enumerate().find_map(|(index, arg)| {
            arg.as_lambda()
                .filter(|lambda| lambda.id == id)
                .map(|lambda| (index, lambda))
        })
    }
}

/// What the callee of a call site currently refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum CalleeReference {
    /// Not resolved yet.
    Simple(Symbol),
    /// Points at a candidate while the lambda disambiguator is running; never
    /// observable once resolution has finished.
    Transient(CandidateId),
    Resolved(ResolvedReference),
}

/// The syntactic shape of a call site, which resolution may rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallShape {
    AsWritten,
    /// `f(args)` was desugared to `f.invoke(args)`.
    ImplicitInvoke { variable: CallableId },
    /// The name denotes a classifier used as a qualifier.
    Qualifier(ClassId),
}

/// A call-like node in the tree being resolved.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub id: Uid,
    pub span: Span,
    /// The source text of the call, kept for internal error reports.
    pub text: Box<str>,
    pub kind: CallKind,
    pub name: Symbol,
    pub explicit_receiver: Option<ExplicitReceiver>,
    pub args: Box<[Argument]>,
    pub type_args: Box<[Arc<Ty>]>,
    pub origin: CallOrigin,
    pub dependent: bool,
    pub callee: CalleeReference,
    pub shape: CallShape,
}

impl CallSite {
    pub fn new(kind: CallKind, name: Symbol) -> Self {
        Self {
            id: Uid::fresh(),
            span: Span::ZERO,
            text: Box::from(""),
            kind,
            name,
            explicit_receiver: None,
            args: Box::new([]),
            type_args: Box::new([]),
            origin: CallOrigin::Regular,
            dependent: false,
            callee: CalleeReference::Simple(name),
            shape: CallShape::AsWritten,
        }
    }

    pub fn call_info(
        &self,
        containing: Arc<[ContainingDeclaration]>,
        expected: Option<Arc<Ty>>,
    ) -> CallInfo {
        CallInfo {
            kind: self.kind,
            name: self.name,
            explicit_receiver: self.explicit_receiver.clone(),
            args: self.args.clone(),
            type_args: self.type_args.clone(),
            containing,
            origin: self.origin,
            expected,
            dependent: self.dependent,
        }
    }

    /// Returns the final reference, if resolution has finished.
    pub fn resolved(&self) -> Option<&ResolvedReference> {
        match &self.callee {
            CalleeReference::Resolved(reference) => Some(reference),
            _ => None,
        }
    }
}

/// A callable reference (`::f`) whose resolution may be postponed until the
/// enclosing call has gathered more type information.
#[derive(Debug, Clone)]
pub struct CallableReferenceAtom {
    pub site: CallSite,
    /// May mention variables of the outer constraint system.
    pub expected: Option<Arc<Ty>>,
    pub resolved_once: bool,
    pub postponed: bool,
}

impl CallableReferenceAtom {
    pub fn new(site: CallSite, expected: Option<Arc<Ty>>) -> Self {
        Self {
            site,
            expected,
            resolved_once: false,
            postponed: false,
        }
    }
}
