//! Overload candidates and what the resolution stages learn about them.

use std::sync::Arc;

use semver::Version;

use crate::{
    call::{CallInfo, ReceiverValue},
    env::{CallableId, ClassId, Param, Session, TyParam, Visibility},
    infer::{ConstraintSystem, InferenceError, PostponedLambda, Substitutor},
    scope::TowerGroup,
    symbol::Symbol,
    ty::{ParamSubstitution, Ty, substitute_params},
    unique::Uid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateId(Uid);

impl CandidateId {
    pub fn fresh() -> Self {
        Self(Uid::fresh())
    }
}

/// The declaration a candidate would bind the call to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CandidateSymbol {
    Callable(CallableId),
    /// The value `variable` invoked as a function: through its `invoke`
    /// member `operator`, or directly if it has a function type.
    Invoke {
        variable: CallableId,
        operator: Option<CallableId>,
    },
    /// A classifier named by a variable access.
    Qualifier(ClassId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKind {
    /// The candidate is a member of its dispatch receiver.
    Dispatch,
    Extension,
    None,
}

/// The declared signature of a candidate, as seen from the receiver it was
/// found on.
///
/// Type parameters of the receiver's class have already been substituted;
/// the candidate's own type parameters still appear as [`Ty::Param`].
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub ty_params: Box<[TyParam]>,
    pub receiver: Option<Arc<Ty>>,
    pub params: Box<[Param]>,
    pub ret: Arc<Ty>,
    /// Function-typed values cannot be called with named arguments.
    pub allows_named_args: bool,
}

impl Signature {
    pub fn of_callable(
        session: &Session,
        id: CallableId,
        owner_substitution: &ParamSubstitution,
    ) -> Self {
        let callable = session.callable(id);
        let subst = |ty: &Arc<Ty>| substitute_params(ty, owner_substitution);

        Self {
            ty_params: callable
                .ty_params
                .iter()
                .filter(|param| !owner_substitution.contains_key(&param.ty.uid))
                .map(|param| TyParam {
                    bounds: param.bounds.iter().map(subst).collect(),
                    ..param.clone()
                })
                .collect(),
            receiver: callable.receiver.as_ref().map(subst),
            params: callable
                .params
                .iter()
                .map(|param| Param {
                    ty: subst(&param.ty),
                    ..param.clone()
                })
                .collect(),
            ret: subst(&callable.ret),
            allows_named_args: true,
        }
    }

    /// The signature of calling a value of type `(domain) -> codomain`.
    pub fn of_function_ty(
        session: &Session,
        domain: &[Arc<Ty>],
        codomain: &Arc<Ty>,
    ) -> Self {
        Self {
            ty_params: Box::new([]),
            receiver: None,
            params: domain
                .iter()
                .map(|ty| Param {
                    name: session.names.it,
                    ty: ty.clone(),
                    has_default: false,
                    is_vararg: false,
                })
                .collect(),
            ret: codomain.clone(),
            allows_named_args: false,
        }
    }
}

/// How bad a candidate's worst problem is, from best to worst.
///
/// The first three levels are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ApplicabilityLevel {
    Resolved,
    ResolvedWithSyntheticConversion,
    UnstableApi,
    ConventionError,
    Inapplicable,
    InapplicableArgumentsMapping,
    InapplicableWrongReceiver,
    VisibilityError,
    Hidden,
    Unsupported,
}

impl ApplicabilityLevel {
    pub const fn is_success(self) -> bool {
        matches!(
            self,
            ApplicabilityLevel::Resolved
                | ApplicabilityLevel::ResolvedWithSyntheticConversion
                | ApplicabilityLevel::UnstableApi
        )
    }

    /// Past this point no later stage can make the candidate usable, so
    /// ordinary processing stops.
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ApplicabilityLevel::InapplicableArgumentsMapping
                | ApplicabilityLevel::InapplicableWrongReceiver
                | ApplicabilityLevel::VisibilityError
                | ApplicabilityLevel::Hidden
                | ApplicabilityLevel::Unsupported
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionDiagnostic {
    /// A function-typed argument was converted to a functional interface.
    SyntheticConversion { argument: usize },
    OptInRequired { marker: Symbol },
    OperatorModifierMissing,
    /// A property of function type was used through operator syntax.
    PropertyAsOperator,
    ArgumentTypeMismatch {
        argument: usize,
        expected: Arc<Ty>,
        actual: Arc<Ty>,
    },
    LambdaShapeMismatch { argument: usize, expected: Arc<Ty> },
    TypeArgumentBoundViolated { param: Symbol, arg: Arc<Ty> },
    NonReifiedTypeArgument { param: Symbol },
    CallableReferenceTypeMismatch { expected: Arc<Ty>, actual: Arc<Ty> },
    InferenceFailed(InferenceError),
    TooManyArguments { argument: usize },
    NoValueForParameter { param: Symbol },
    NamedArgumentNotFound { name: Symbol },
    ArgumentPassedTwice { param: Symbol },
    MixingNamedAndPositional { argument: usize },
    SpreadToNonVararg { argument: usize },
    WrongTypeArgumentCount { expected: usize, actual: usize },
    NoReceiverAllowed,
    ReceiverRequired,
    ReceiverTypeMismatch { expected: Arc<Ty>, actual: Arc<Ty> },
    Invisible { visibility: Visibility },
    HiddenByDeprecation,
    NotYetAvailable { since: Version },
    Unsupported { message: Box<str> },
}

impl ResolutionDiagnostic {
    pub fn level(&self) -> ApplicabilityLevel {
        use ResolutionDiagnostic as D;

        match self {
            D::SyntheticConversion { .. } => {
                ApplicabilityLevel::ResolvedWithSyntheticConversion
            }
            D::OptInRequired { .. } => ApplicabilityLevel::UnstableApi,
            D::OperatorModifierMissing | D::PropertyAsOperator => {
                ApplicabilityLevel::ConventionError
            }
            D::ArgumentTypeMismatch { .. }
            | D::LambdaShapeMismatch { .. }
            | D::TypeArgumentBoundViolated { .. }
            | D::NonReifiedTypeArgument { .. }
            | D::CallableReferenceTypeMismatch { .. }
            | D::InferenceFailed(_) => ApplicabilityLevel::Inapplicable,
            D::TooManyArguments { .. }
            | D::NoValueForParameter { .. }
            | D::NamedArgumentNotFound { .. }
            | D::ArgumentPassedTwice { .. }
            | D::MixingNamedAndPositional { .. }
            | D::SpreadToNonVararg { .. }
            | D::WrongTypeArgumentCount { .. } => {
                ApplicabilityLevel::InapplicableArgumentsMapping
            }
            D::NoReceiverAllowed
            | D::ReceiverRequired
            | D::ReceiverTypeMismatch { .. } => {
                ApplicabilityLevel::InapplicableWrongReceiver
            }
            D::Invisible { .. } => ApplicabilityLevel::VisibilityError,
            D::HiddenByDeprecation | D::NotYetAvailable { .. } => {
                ApplicabilityLevel::Hidden
            }
            D::Unsupported { .. } => ApplicabilityLevel::Unsupported,
        }
    }
}

/// Which parameter each argument went to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgumentMapping {
    /// Indexed by argument.
    pub params: Box<[usize]>,
    pub defaults_used: usize,
    pub uses_varargs: bool,
}

/// Identifies candidates that would bind the call in the same way.
pub type CandidateKey =
    (CandidateSymbol, Option<ReceiverValue>, Option<ReceiverValue>);

/// One way of binding a call to a declaration.
///
/// A candidate is created by the emitter, mutated by the resolution stages
/// while the resolver owns it, and frozen behind an [`Arc`] once it becomes
/// part of a resolved reference.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: CandidateId,
    pub symbol: CandidateSymbol,
    pub signature: Signature,
    pub receiver_kind: ReceiverKind,
    pub dispatch_receiver: Option<ReceiverValue>,
    pub extension_receiver: Option<ReceiverValue>,
    pub group: TowerGroup,
    /// The attempt this candidate was found for. Differs from the attempt
    /// being resolved for implicit invocations.
    pub call: Arc<CallInfo>,
    diagnostics: Vec<ResolutionDiagnostic>,
    applicability: ApplicabilityLevel,
    pub mapping: Option<ArgumentMapping>,
    /// Attached on demand, by the first stage that needs inference.
    pub system: Option<ConstraintSystem>,
    /// From the signature's type parameters to their variables in `system`.
    pub substitution: ParamSubstitution,
    pub postponed: Vec<PostponedLambda>,
    /// The declared type of a callable reference to this candidate.
    pub reference_ty: Option<Arc<Ty>>,
    /// Set once the candidate's system has been completed.
    pub solution: Option<Substitutor>,
    pub(crate) stage_cursor: usize,
}

impl Candidate {
    pub fn new(
        symbol: CandidateSymbol,
        signature: Signature,
        group: TowerGroup,
        call: Arc<CallInfo>,
    ) -> Self {
        Self {
            id: CandidateId::fresh(),
            symbol,
            signature,
            receiver_kind: ReceiverKind::None,
            dispatch_receiver: None,
            extension_receiver: None,
            group,
            call,
            diagnostics: Vec::new(),
            applicability: ApplicabilityLevel::Resolved,
            mapping: None,
            system: None,
            substitution: ParamSubstitution::new(),
            postponed: Vec::new(),
            reference_ty: None,
            solution: None,
            stage_cursor: 0,
        }
    }

    pub fn with_dispatch_receiver(mut self, receiver: ReceiverValue) -> Self {
        self.receiver_kind = ReceiverKind::Dispatch;
        self.dispatch_receiver = Some(receiver);
        self
    }

    pub fn with_extension_receiver(mut self, receiver: ReceiverValue) -> Self {
        self.receiver_kind = ReceiverKind::Extension;
        self.extension_receiver = Some(receiver);
        self
    }

    pub fn diagnostics(&self) -> &[ResolutionDiagnostic] {
        &self.diagnostics
    }

    pub fn applicability(&self) -> ApplicabilityLevel {
        self.applicability
    }

    pub fn is_successful(&self) -> bool {
        self.applicability.is_success()
    }

    pub fn add_diagnostic(&mut self, diagnostic: ResolutionDiagnostic) {
        self.applicability = self.applicability.max(diagnostic.level());
        self.diagnostics.push(diagnostic);
    }

    /// The applicability the diagnostics alone imply.
    pub fn recomputed_applicability(&self) -> ApplicabilityLevel {
        self.diagnostics
            .iter()
            .map(ResolutionDiagnostic::level)
            .max()
            .unwrap_or(ApplicabilityLevel::Resolved)
    }

    /// The diagnostic responsible for the candidate's applicability.
    pub fn worst_diagnostic(&self) -> Option<&ResolutionDiagnostic> {
        self.diagnostics
            .iter()
            .find(|diagnostic| diagnostic.level() == self.applicability)
    }

    pub fn key(&self) -> CandidateKey {
        (
            self.symbol,
            self.dispatch_receiver.clone(),
            self.extension_receiver.clone(),
        )
    }

    /// The declaration whose modifiers govern the candidate. For an invoked
    /// value, that is the value itself.
    pub fn declaration(&self) -> Option<CallableId> {
        match self.symbol {
            CandidateSymbol::Callable(id) => Some(id),
            CandidateSymbol::Invoke { variable, .. } => Some(variable),
            CandidateSymbol::Qualifier(_) => None,
        }
    }

    pub fn is_generic(&self) -> bool {
        !self.signature.ty_params.is_empty()
    }

    pub fn is_abstract(&self, session: &Session) -> bool {
        let id = match self.symbol {
            CandidateSymbol::Callable(id) => id,
            CandidateSymbol::Invoke {
                operator: Some(id), ..
            } => id,
            _ => return false,
        };

        session.callable(id).modifiers.is_abstract
    }

    /// `ty` with the candidate's type parameters replaced by its inference
    /// variables.
    pub fn instantiate(&self, ty: &Arc<Ty>) -> Arc<Ty> {
        substitute_params(ty, &self.substitution)
    }

    /// The declared type of the parameter `argument` was mapped to.
    pub fn param_ty_of(&self, argument: usize) -> Option<&Arc<Ty>> {
        let mapping = self.mapping.as_ref()?;
        let param = *mapping.params.get(argument)?;
        self.signature.params.get(param).map(|param| &param.ty)
    }
}

/// Structural equality, ignoring candidate identity and inference state.
impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.symbol == other.symbol
            && self.group == other.group
            && self.dispatch_receiver == other.dispatch_receiver
            && self.extension_receiver == other.extension_receiver
            && self.applicability == other.applicability
            && self.diagnostics == other.diagnostics
            && self.mapping == other.mapping
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order() {
        use ApplicabilityLevel as A;

        let levels = [
            A::Resolved,
            A::ResolvedWithSyntheticConversion,
            A::UnstableApi,
            A::ConventionError,
            A::Inapplicable,
            A::InapplicableArgumentsMapping,
            A::InapplicableWrongReceiver,
            A::VisibilityError,
            A::Hidden,
            A::Unsupported,
        ];

        assert!(levels.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(levels.iter().filter(|level| level.is_success()).count(), 3);
        assert!(!A::Inapplicable.is_terminal());
        assert!(A::InapplicableArgumentsMapping.is_terminal());
    }

    #[test]
    fn applicability_is_the_worst_diagnostic() {
        let mut builder = crate::env::SessionBuilder::new(Default::default());
        let name = builder.intern("C");
        let class = builder.add_class(crate::env::Class::new(
            name,
            crate::env::ClassKind::Object,
        ));
        let session = builder.finish().unwrap();
        let call = Arc::new(CallInfo {
            kind: crate::call::CallKind::VariableAccess,
            name,
            explicit_receiver: None,
            args: Box::new([]),
            type_args: Box::new([]),
            containing: Arc::new([]),
            origin: Default::default(),
            expected: None,
            dependent: false,
        });

        let mut candidate = Candidate::new(
            CandidateSymbol::Qualifier(class),
            Signature::of_function_ty(&session, &[], &session.declared_ty(class)),
            TowerGroup::START,
            call,
        );
        assert_eq!(candidate.applicability(), ApplicabilityLevel::Resolved);

        candidate.add_diagnostic(ResolutionDiagnostic::HiddenByDeprecation);
        candidate.add_diagnostic(ResolutionDiagnostic::OperatorModifierMissing);

        assert_eq!(candidate.applicability(), ApplicabilityLevel::Hidden);
        assert_eq!(
            candidate.recomputed_applicability(),
            candidate.applicability()
        );
        assert_eq!(
            candidate.worst_diagnostic(),
            Some(&ResolutionDiagnostic::HiddenByDeprecation)
        );
    }
}
