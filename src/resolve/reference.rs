//! Turning the final candidate set into the reference stored on a call
//! site, and reporting what went wrong.

use std::sync::Arc;

use tracing::debug;

use crate::{
    call::{CallInfo, CallKind, CallShape, CallSite, CalleeReference},
    env::{ClassId, Session},
    infer::InferenceError,
    span::Span,
    symbol::Symbol,
    ty::Ty,
};

use super::candidate::{
    ApplicabilityLevel, Candidate, CandidateSymbol, ResolutionDiagnostic,
};

/// The outcome of resolving a call site.
///
/// References compare structurally, so two resolutions of the same call
/// under the same session and tower compare equal.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedReference {
    Resolved(Arc<Candidate>),
    /// The candidate is chosen, but its constraint system is left for the
    /// enclosing call to complete.
    ResolvedWithPendingCompletion(Arc<Candidate>),
    Ambiguous {
        candidates: Box<[Arc<Candidate>]>,
        applicability: ApplicabilityLevel,
    },
    Unresolved(Symbol),
    ErrorWithBestEffortCandidate {
        candidate: Option<Arc<Candidate>>,
        error: ResolutionError,
    },
}

impl ResolvedReference {
    /// The candidate the call is bound to, if there is exactly one.
    pub fn candidate(&self) -> Option<&Arc<Candidate>> {
        match self {
            ResolvedReference::Resolved(candidate)
            | ResolvedReference::ResolvedWithPendingCompletion(candidate) => {
                Some(candidate)
            }
            ResolvedReference::ErrorWithBestEffortCandidate {
                candidate, ..
            } => candidate.as_ref(),
            ResolvedReference::Ambiguous { .. }
            | ResolvedReference::Unresolved(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            ResolvedReference::Resolved(_)
                | ResolvedReference::ResolvedWithPendingCompletion(_)
        )
    }

    /// The error this reference stands for, if any.
    pub fn error(&self) -> Option<ResolutionError> {
        match self {
            ResolvedReference::Resolved(_)
            | ResolvedReference::ResolvedWithPendingCompletion(_) => None,
            ResolvedReference::Ambiguous {
                candidates,
                applicability,
            } => Some(ResolutionError::Ambiguity {
                candidates: candidates
                    .iter()
                    .map(|candidate| candidate.symbol)
                    .collect(),
                applicability: *applicability,
            }),
            ResolvedReference::Unresolved(name) => {
                Some(ResolutionError::UnresolvedName { name: *name })
            }
            ResolvedReference::ErrorWithBestEffortCandidate { error, .. } => {
                Some(error.clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionError {
    UnresolvedName {
        name: Symbol,
    },
    Ambiguity {
        candidates: Box<[CandidateSymbol]>,
        applicability: ApplicabilityLevel,
    },
    /// The only candidates left have a problem; `diagnostic` is the worst
    /// one of the first of them.
    Inapplicable {
        applicability: ApplicabilityLevel,
        diagnostic: Option<ResolutionDiagnostic>,
    },
    /// A value was called, but it is not a function.
    FunctionExpected {
        name: Symbol,
        ty: Arc<Ty>,
    },
    /// A function was named without being called.
    FunctionCallExpected {
        name: Symbol,
    },
    /// A classifier was called, but it has no usable constructor.
    ResolutionToClassifier {
        class: ClassId,
    },
    IllegalAnnotation {
        class: ClassId,
    },
    UnresolvedSupertype,
    Unsupported {
        message: Box<str>,
    },
    InferenceFailed(InferenceError),
}

/// Receives the errors found while resolving calls.
pub trait DiagnosticSink {
    fn report(&mut self, span: Span, error: &ResolutionError);
}

/// A [`DiagnosticSink`] that keeps everything it is given.
#[derive(Debug, Clone, Default)]
pub struct CollectingSink {
    pub reports: Vec<(Span, ResolutionError)>,
}

impl DiagnosticSink for CollectingSink {
    fn report(&mut self, span: Span, error: &ResolutionError) {
        self.reports.push((span, error.clone()));
    }
}

/// The candidates a resolution ended with, before they become a reference.
#[derive(Debug)]
pub struct Selection {
    /// The attempt as it was asked for.
    pub info: Arc<CallInfo>,
    pub candidates: Vec<Candidate>,
    pub applicability: ApplicabilityLevel,
    /// Set if the candidates come from a retry with this call kind.
    pub fallback: Option<CallKind>,
}

#[derive(Debug, Clone, Copy)]
pub struct ReferenceBuilder<'a> {
    session: &'a Session,
}

impl<'a> ReferenceBuilder<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self { session }
    }

    /// Builds the reference for `selection`, stores it on `site`, rewrites
    /// the site's shape for desugared calls, and reports any error.
    pub fn build(
        &self,
        site: &mut CallSite,
        selection: Selection,
        sink: &mut dyn DiagnosticSink,
    ) -> ResolvedReference {
        let reference = self.reference_for(site, selection);
        debug!(
            name = self.session.name(site.name),
            success = reference.is_success(),
            "resolved call"
        );

        if let Some(error) = reference.error() {
            sink.report(site.span, &error);
        }

        site.callee = CalleeReference::Resolved(reference.clone());
        reference
    }

    /// Reports `error` for `site` without any candidate.
    pub fn build_error(
        &self,
        site: &mut CallSite,
        error: ResolutionError,
        sink: &mut dyn DiagnosticSink,
    ) -> ResolvedReference {
        sink.report(site.span, &error);
        let reference = ResolvedReference::ErrorWithBestEffortCandidate {
            candidate: None,
            error,
        };
        site.callee = CalleeReference::Resolved(reference.clone());
        reference
    }

    fn reference_for(
        &self,
        site: &mut CallSite,
        selection: Selection,
    ) -> ResolvedReference {
        let Selection {
            info,
            mut candidates,
            applicability,
            fallback,
        } = selection;

        if candidates.is_empty() {
            return match info.explicit_receiver_ty() {
                Some(ty)
                    if info.has_constant_receiver()
                        && info.name == self.session.names.invoke =>
                {
                    ResolvedReference::ErrorWithBestEffortCandidate {
                        candidate: None,
                        error: ResolutionError::FunctionExpected {
                            name: info.name,
                            ty: ty.clone(),
                        },
                    }
                }
                _ => ResolvedReference::Unresolved(info.name),
            };
        }

        if let Some(kind) = fallback {
            // the error is about the shape of the call, which every remaining
            // candidate shares; the first in tower order stands in for them
            let candidate = Arc::new(candidates.swap_remove(0));
            let error = match (kind, candidate.symbol) {
                (CallKind::VariableAccess, CandidateSymbol::Qualifier(class)) => {
                    ResolutionError::ResolutionToClassifier { class }
                }
                (CallKind::VariableAccess, _) => {
                    ResolutionError::FunctionExpected {
                        name: info.name,
                        ty: candidate.signature.ret.clone(),
                    }
                }
                _ => ResolutionError::FunctionCallExpected { name: info.name },
            };

            return ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(candidate),
                error,
            };
        }

        if candidates.len() > 1 {
            return ResolvedReference::Ambiguous {
                candidates: candidates.into_iter().map(Arc::new).collect(),
                applicability,
            };
        }

        let candidate = candidates.swap_remove(0);
        if !applicability.is_success() {
            let error = match candidate.worst_diagnostic() {
                Some(ResolutionDiagnostic::Unsupported { message }) => {
                    ResolutionError::Unsupported {
                        message: message.clone(),
                    }
                }
                Some(ResolutionDiagnostic::InferenceFailed(error)) => {
                    ResolutionError::InferenceFailed(error.clone())
                }
                diagnostic => ResolutionError::Inapplicable {
                    applicability,
                    diagnostic: diagnostic.cloned(),
                },
            };

            return ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(Arc::new(candidate)),
                error,
            };
        }

        // the call was found under a different kind than it was written
        // as; make the site say what it really is
        match candidate.symbol {
            CandidateSymbol::Invoke { variable, .. }
                if candidate.call.kind != info.kind =>
            {
                site.shape = CallShape::ImplicitInvoke { variable };
            }
            CandidateSymbol::Qualifier(class) => {
                site.shape = CallShape::Qualifier(class);
            }
            _ => (),
        }

        let pending = candidate.system.is_some() && candidate.solution.is_none();
        match pending {
            true => {
                ResolvedReference::ResolvedWithPendingCompletion(Arc::new(candidate))
            }
            false => ResolvedReference::Resolved(Arc::new(candidate)),
        }
    }
}
