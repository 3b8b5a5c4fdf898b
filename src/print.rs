//! Human-readable rendering of types, candidates and references.

use ena::unify::UnifyKey;
use pretty::RcDoc;

use crate::{
    env::{CallableKind, Session},
    resolve::{
        candidate::{Candidate, CandidateSymbol, ResolutionDiagnostic},
        reference::{ResolutionError, ResolvedReference},
    },
    scope::{PriorityOrder, ScopeEntry, ScopeTower},
    symbol::Symbol,
    ty::Ty,
};

pub const WIDTH: usize = 80;

pub trait ToDoc {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()>;
}

/// Renders `value` to a string at the default width.
pub fn render(value: &impl ToDoc, session: &Session) -> String {
    value.to_doc(session).pretty(WIDTH).to_string()
}

impl ToDoc for Symbol {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        RcDoc::as_string(session.name(*self))
    }
}

fn comma_separated(docs: Vec<RcDoc<'static, ()>>) -> RcDoc<'static, ()> {
    RcDoc::intersperse(docs, RcDoc::text(",").append(RcDoc::space()))
}

impl ToDoc for Ty {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        match self {
            Ty::Any => RcDoc::text("Any"),
            Ty::Nothing => RcDoc::text("Nothing"),
            Ty::Prim(prim) => RcDoc::text(prim.name()),
            Ty::Named { class, args } => {
                let name = session.class(*class).name.to_doc(session);
                match args.is_empty() {
                    true => name,
                    false => name
                        .append("<")
                        .append(comma_separated(
                            args.iter().map(|arg| arg.to_doc(session)).collect(),
                        ))
                        .append(">"),
                }
            }
            Ty::Fn { domain, codomain } => RcDoc::text("(")
                .append(comma_separated(
                    domain.iter().map(|ty| ty.to_doc(session)).collect(),
                ))
                .append(") -> ")
                .append(codomain.to_doc(session)),
            Ty::Param(param) => param.name.to_doc(session),
            Ty::Var(var) => RcDoc::as_string(format!("?{}", var.index())),
            Ty::Error => RcDoc::text("<error>"),
        }
    }
}

impl ToDoc for Candidate {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        let signature = &self.signature;
        let keyword = match self.symbol {
            CandidateSymbol::Qualifier(_) => "class",
            CandidateSymbol::Invoke { .. } => "invoke",
            CandidateSymbol::Callable(id) => match session.callable(id).kind {
                CallableKind::Function => "fun",
                CallableKind::Property => "val",
                CallableKind::Constructor => "constructor",
                CallableKind::LocalVariable => "local",
            },
        };

        let name = match self.symbol {
            CandidateSymbol::Callable(id) => session.callable(id).name.to_doc(session),
            CandidateSymbol::Invoke { variable, .. } => session
                .callable(variable)
                .name
                .to_doc(session)
                .append(".invoke"),
            CandidateSymbol::Qualifier(class) => {
                return RcDoc::text(keyword)
                    .append(RcDoc::space())
                    .append(session.class(class).name.to_doc(session));
            }
        };

        let receiver = match &signature.receiver {
            Some(ty) => ty.to_doc(session).append("."),
            None => RcDoc::nil(),
        };

        let ty_params = match signature.ty_params.is_empty() {
            true => RcDoc::nil(),
            false => RcDoc::text("<")
                .append(comma_separated(
                    signature
                        .ty_params
                        .iter()
                        .map(|param| param.ty.name.to_doc(session))
                        .collect(),
                ))
                .append("> "),
        };

        let params = signature
            .params
            .iter()
            .map(|param| {
                let vararg = match param.is_vararg {
                    true => RcDoc::text("vararg "),
                    false => RcDoc::nil(),
                };
                let default = match param.has_default {
                    true => RcDoc::text(" = _"),
                    false => RcDoc::nil(),
                };

                vararg
                    .append(param.name.to_doc(session))
                    .append(": ")
                    .append(param.ty.to_doc(session))
                    .append(default)
            })
            .collect();

        RcDoc::text(keyword)
            .append(RcDoc::space())
            .append(ty_params)
            .append(receiver)
            .append(name)
            .append("(")
            .append(comma_separated(params))
            .append("): ")
            .append(signature.ret.to_doc(session))
            .append(RcDoc::as_string(format!(" [{:?}]", self.applicability())))
    }
}

impl ToDoc for ResolutionDiagnostic {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        use ResolutionDiagnostic as D;

        match self {
            D::ArgumentTypeMismatch {
                argument,
                expected,
                actual,
            } => RcDoc::as_string(format!("argument {argument}: expected "))
                .append(expected.to_doc(session))
                .append(", found ")
                .append(actual.to_doc(session)),
            D::ReceiverTypeMismatch { expected, actual } => {
                RcDoc::text("receiver: expected ")
                    .append(expected.to_doc(session))
                    .append(", found ")
                    .append(actual.to_doc(session))
            }
            D::NoValueForParameter { param } => {
                RcDoc::text("no value for parameter ").append(param.to_doc(session))
            }
            D::OptInRequired { marker } => {
                RcDoc::text("requires opt-in to ").append(marker.to_doc(session))
            }
            other => RcDoc::as_string(format!("{other:?}")),
        }
    }
}

impl ToDoc for ResolutionError {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        match self {
            ResolutionError::UnresolvedName { name } => {
                RcDoc::text("unresolved reference ").append(name.to_doc(session))
            }
            ResolutionError::Ambiguity {
                candidates,
                applicability,
            } => RcDoc::as_string(format!(
                "ambiguity between {} candidates ({applicability:?})",
                candidates.len()
            )),
            ResolutionError::Inapplicable {
                applicability,
                diagnostic,
            } => {
                let head = RcDoc::as_string(format!("inapplicable ({applicability:?})"));
                match diagnostic {
                    Some(diagnostic) => head
                        .append(": ")
                        .append(diagnostic.to_doc(session)),
                    None => head,
                }
            }
            ResolutionError::FunctionExpected { name, ty } => {
                RcDoc::text("expression ")
                    .append(name.to_doc(session))
                    .append(" of type ")
                    .append(ty.to_doc(session))
                    .append(" cannot be invoked as a function")
            }
            ResolutionError::FunctionCallExpected { name } => {
                RcDoc::text("function ")
                    .append(name.to_doc(session))
                    .append(" must be called")
            }
            ResolutionError::ResolutionToClassifier { class } => {
                RcDoc::text("classifier ")
                    .append(session.class(*class).name.to_doc(session))
                    .append(" has no usable constructor")
            }
            ResolutionError::IllegalAnnotation { class } => {
                session
                    .class(*class)
                    .name
                    .to_doc(session)
                    .append(" is not an annotation class")
            }
            ResolutionError::UnresolvedSupertype => {
                RcDoc::text("the supertype of the delegating call is unknown")
            }
            ResolutionError::Unsupported { message } => {
                RcDoc::text("unsupported: ").append(RcDoc::as_string(message))
            }
            ResolutionError::InferenceFailed(error) => {
                RcDoc::as_string(format!("inference failed: {error:?}"))
            }
        }
    }
}

impl ToDoc for ResolvedReference {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        match self {
            ResolvedReference::Resolved(candidate) => {
                RcDoc::text("resolved: ").append(candidate.to_doc(session))
            }
            ResolvedReference::ResolvedWithPendingCompletion(candidate) => {
                RcDoc::text("resolved, pending completion: ")
                    .append(candidate.to_doc(session))
            }
            ResolvedReference::Ambiguous {
                candidates,
                applicability,
            } => RcDoc::as_string(format!("ambiguous ({applicability:?}):"))
                .append(
                    RcDoc::line()
                        .append(RcDoc::intersperse(
                            candidates.iter().map(|candidate| candidate.to_doc(session)),
                            RcDoc::line(),
                        ))
                        .nest(2),
                ),
            ResolvedReference::Unresolved(name) => {
                RcDoc::text("unresolved: ").append(name.to_doc(session))
            }
            ResolvedReference::ErrorWithBestEffortCandidate { candidate, error } => {
                let head = RcDoc::text("error: ").append(error.to_doc(session));
                match candidate {
                    Some(candidate) => head.append(
                        RcDoc::line()
                            .append("best effort: ")
                            .append(candidate.to_doc(session))
                            .nest(2),
                    ),
                    None => head,
                }
            }
        }
    }
}

impl ToDoc for ScopeTower {
    fn to_doc(&self, session: &Session) -> RcDoc<'static, ()> {
        let scopes = self
            .for_each_scope(PriorityOrder::HighestFirst)
            .map(|(group, scope)| {
                let head = RcDoc::as_string(format!("{:?} {:?} ", group.kind, scope.kind))
                    .append(scope.name.to_doc(session));

                let entries = scope.entries().iter().map(|entry| match *entry {
                    ScopeEntry::Callable(id) => session.callable(id).name.to_doc(session),
                    ScopeEntry::Classifier(id) => RcDoc::text("class ")
                        .append(session.class(id).name.to_doc(session)),
                });

                match scope.entries().is_empty() {
                    true => head,
                    false => head.append(
                        RcDoc::hardline()
                            .append(RcDoc::intersperse(entries, RcDoc::hardline()))
                            .nest(2),
                    ),
                }
            });

        let receivers = self.implicit_receivers().map(|(group, receiver)| {
            RcDoc::as_string(format!("{:?} receiver ", group.kind))
                .append(receiver.ty.to_doc(session))
        });

        RcDoc::intersperse(scopes.chain(receivers), RcDoc::hardline())
    }
}
