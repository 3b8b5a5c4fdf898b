//! Internal errors: broken invariants of the resolver itself.
//!
//! These are never produced by ill-typed input. Input errors become
//! [`ResolvedReference`] values and are reported through a
//! [`DiagnosticSink`]; an [`InternalError`] means the resolver contradicted
//! itself, and carries enough context to reproduce the failing call.
//!
//! [`ResolvedReference`]: crate::resolve::reference::ResolvedReference
//! [`DiagnosticSink`]: crate::resolve::reference::DiagnosticSink

use std::fmt;

use thiserror::Error;

use crate::{
    call::CallKind,
    resolve::candidate::{ApplicabilityLevel, CandidateId},
};

/// The call site and candidates an [`InternalError`] was raised for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub call_site: Box<str>,
    /// One rendered line per candidate.
    pub candidates: Box<[Box<str>]>,
}

impl fmt::Display for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "while resolving `{}`", self.call_site)?;
        for candidate in self.candidates.iter() {
            write!(f, "\n  candidate: {candidate}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum InternalError {
    #[error(
        "a candidate is cached as {cached:?} but its diagnostics say {recomputed:?}\n{attachment}"
    )]
    ApplicabilityMismatch {
        cached: ApplicabilityLevel,
        recomputed: ApplicabilityLevel,
        attachment: Attachment,
    },
    #[error("the callee still points at candidate {candidate:?}\n{attachment}")]
    TransientCallee {
        candidate: CandidateId,
        attachment: Attachment,
    },
    #[error("{kind:?} calls are not resolved by this entry point\n{attachment}")]
    UnexpectedCallKind {
        kind: CallKind,
        attachment: Attachment,
    },
    #[error("resolution finished without attaching a reference\n{attachment}")]
    MissingReference { attachment: Attachment },
}

impl InternalError {
    pub fn attachment(&self) -> &Attachment {
        match self {
            InternalError::ApplicabilityMismatch { attachment, .. }
            | InternalError::TransientCallee { attachment, .. }
            | InternalError::UnexpectedCallKind { attachment, .. }
            | InternalError::MissingReference { attachment } => attachment,
        }
    }
}
