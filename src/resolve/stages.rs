//! The ordered checks every candidate goes through.
//!
//! Each stage looks at one aspect of a candidate and appends at most one
//! diagnostic. A candidate remembers how far it got, so running the
//! pipeline again (as [`StageRunner::fully_process`] does for candidates
//! that stopped early) resumes instead of repeating work.

use std::sync::Arc;

use tracing::trace;

use crate::{
    call::{
        Argument, ArgumentValue, CallKind, CallOrigin, ContainingDeclaration,
        ExplicitReceiver, LambdaArgument,
    },
    env::{CallableKind, DeprecationLevel, Session, Visibility},
    infer::{ConstraintSystem, PostponedLambda},
    ty::{Ty, substitute_params},
};

use super::candidate::{
    ArgumentMapping, Candidate, CandidateSymbol, ReceiverKind,
    ResolutionDiagnostic, Signature,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    CheckUnsupported,
    CheckReceiverKind,
    CheckVisibility,
    CheckDeprecation,
    MapArguments,
    CheckTypeArguments,
    CreateFreshVariables,
    CheckReceiverTypes,
    CheckArgumentTypes,
    CheckCallableReferenceType,
    CheckOperator,
    CheckOptIn,
}

/// The stages in the order they run.
pub const PIPELINE: [Stage; 12] = [
    Stage::CheckUnsupported,
    Stage::CheckReceiverKind,
    Stage::CheckVisibility,
    Stage::CheckDeprecation,
    Stage::MapArguments,
    Stage::CheckTypeArguments,
    Stage::CreateFreshVariables,
    Stage::CheckReceiverTypes,
    Stage::CheckArgumentTypes,
    Stage::CheckCallableReferenceType,
    Stage::CheckOperator,
    Stage::CheckOptIn,
];

#[derive(Debug, Clone, Copy)]
pub struct StageRunner<'a> {
    session: &'a Session,
    /// The system of the call a callable reference is an argument of.
    outer: Option<&'a ConstraintSystem>,
}

impl<'a> StageRunner<'a> {
    pub fn new(session: &'a Session) -> Self {
        Self {
            session,
            outer: None,
        }
    }

    pub fn with_outer(self, outer: &'a ConstraintSystem) -> Self {
        Self {
            outer: Some(outer),
            ..self
        }
    }

    /// Runs stages until the candidate is done or hopeless.
    pub fn process(&self, candidate: &mut Candidate) {
        self.run(candidate, false)
    }

    /// Runs every remaining stage, even after a hopeless result, so that
    /// the candidate's diagnostics are complete.
    pub fn fully_process(&self, candidate: &mut Candidate) {
        self.run(candidate, true)
    }

    fn run(&self, candidate: &mut Candidate, fully: bool) {
        while let Some(&stage) = PIPELINE.get(candidate.stage_cursor) {
            if !fully && candidate.applicability().is_terminal() {
                break;
            }

            candidate.stage_cursor += 1;
            if let Some(diagnostic) = self.run_stage(stage, candidate) {
                trace!(?stage, ?diagnostic, "stage reported a problem");
                candidate.add_diagnostic(diagnostic);
            }
        }
    }

    fn run_stage(
        &self,
        stage: Stage,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        match stage {
            Stage::CheckUnsupported => self.check_unsupported(candidate),
            Stage::CheckReceiverKind => self.check_receiver_kind(candidate),
            Stage::CheckVisibility => self.check_visibility(candidate),
            Stage::CheckDeprecation => self.check_deprecation(candidate),
            Stage::MapArguments => self.map_arguments(candidate),
            Stage::CheckTypeArguments => self.check_type_arguments(candidate),
            Stage::CreateFreshVariables => self.create_fresh_variables(candidate),
            Stage::CheckReceiverTypes => self.check_receiver_types(candidate),
            Stage::CheckArgumentTypes => self.check_argument_types(candidate),
            Stage::CheckCallableReferenceType => {
                self.check_callable_reference_type(candidate)
            }
            Stage::CheckOperator => self.check_operator(candidate),
            Stage::CheckOptIn => self.check_opt_in(candidate),
        }
    }

    /// The candidate's system, created on first use. Callable references
    /// start from a copy of the outer system.
    fn attach_system<'c>(
        &self,
        candidate: &'c mut Candidate,
    ) -> &'c mut ConstraintSystem {
        let outer = self.outer;
        candidate
            .system
            .get_or_insert_with(|| outer.cloned().unwrap_or_default())
    }

    // DECLARATION CHECKS

    fn check_unsupported(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let id = candidate.declaration()?;
        let message = self.session.callable(id).modifiers.unsupported.clone()?;
        Some(ResolutionDiagnostic::Unsupported { message })
    }

    fn check_receiver_kind(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        if candidate.call.kind == CallKind::CallableReference {
            return None;
        }

        let needs_dispatch = match candidate.symbol {
            CandidateSymbol::Callable(id) => {
                let callable = self.session.callable(id);
                callable.owner.is_some_and(|owner| {
                    callable.kind == CallableKind::Constructor
                        && self.session.class(owner).is_inner
                })
            }
            _ => false,
        };

        match (needs_dispatch, candidate.receiver_kind) {
            (true, ReceiverKind::None) => {
                Some(ResolutionDiagnostic::ReceiverRequired)
            }
            (false, ReceiverKind::None)
                if matches!(
                    candidate.call.explicit_receiver,
                    Some(ExplicitReceiver::Expr { .. })
                ) =>
            {
                Some(ResolutionDiagnostic::NoReceiverAllowed)
            }
            _ => None,
        }
    }

    fn check_visibility(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let callable = self.session.callable(candidate.declaration()?);
        let Some(owner) = callable.owner else {
            return None;
        };

        let mut enclosing =
            candidate.call.containing.iter().filter_map(|decl| match decl {
                ContainingDeclaration::Class(id) => Some(*id),
                ContainingDeclaration::Callable(_) => None,
            });

        let visible = match callable.modifiers.visibility {
            Visibility::Public => true,
            Visibility::Private => enclosing.any(|class| class == owner),
            Visibility::Protected => {
                enclosing.any(|class| self.session.is_subclass(class, owner))
            }
        };

        match visible {
            true => None,
            false => Some(ResolutionDiagnostic::Invisible {
                visibility: callable.modifiers.visibility,
            }),
        }
    }

    fn check_deprecation(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let callable = self.session.callable(candidate.declaration()?);
        let modifiers = &callable.modifiers;

        if modifiers.deprecation == Some(DeprecationLevel::Hidden) {
            return Some(ResolutionDiagnostic::HiddenByDeprecation);
        }

        match &modifiers.since {
            Some(since) if *since > self.session.settings.api_version => {
                Some(ResolutionDiagnostic::NotYetAvailable {
                    since: since.clone(),
                })
            }
            _ => None,
        }
    }

    // ARGUMENTS

    fn map_arguments(
        &self,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        if matches!(
            candidate.call.kind,
            CallKind::VariableAccess | CallKind::CallableReference
        ) || matches!(candidate.symbol, CandidateSymbol::Qualifier(_))
        {
            return None;
        }

        match map_arguments(&candidate.call.args, &candidate.signature) {
            Ok(mapping) => {
                candidate.mapping = Some(mapping);
                None
            }
            Err(diagnostic) => Some(diagnostic),
        }
    }

    fn check_type_arguments(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let type_args = &candidate.call.type_args;
        let ty_params = &candidate.signature.ty_params;
        if type_args.is_empty() {
            return None;
        }

        if type_args.len() != ty_params.len() {
            return Some(ResolutionDiagnostic::WrongTypeArgumentCount {
                expected: ty_params.len(),
                actual: type_args.len(),
            });
        }

        ty_params
            .iter()
            .zip(type_args.iter())
            .find_map(|(param, arg)| match arg.as_ref() {
                Ty::Param(arg) if param.reified && !self.session.is_reified(*arg) => {
                    Some(ResolutionDiagnostic::NonReifiedTypeArgument {
                        param: param.ty.name,
                    })
                }
                _ => None,
            })
    }

    fn create_fresh_variables(
        &self,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        if candidate.signature.ty_params.is_empty() {
            return None;
        }

        let ty_params = candidate.signature.ty_params.clone();
        let call = candidate.call.clone();
        let cs = self.attach_system(candidate);
        let substitution = cs.instantiate(self.session, &ty_params);

        // explicit type arguments pin their variables
        let mut violation = None;
        if call.type_args.len() == ty_params.len() {
            for (param, arg) in ty_params.iter().zip(call.type_args.iter()) {
                let var = &substitution[&param.ty.uid];
                let pinned = cs.try_add_subtype_constraint(self.session, var, arg)
                    && cs.try_add_subtype_constraint(self.session, arg, var);

                if !pinned && violation.is_none() {
                    violation = Some(ResolutionDiagnostic::TypeArgumentBoundViolated {
                        param: param.ty.name,
                        arg: arg.clone(),
                    });
                }
            }
        }

        candidate.substitution = substitution;
        violation
    }

    fn check_receiver_types(
        &self,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let (Some(receiver), Some(declared)) =
            (&candidate.extension_receiver, &candidate.signature.receiver)
        else {
            return None;
        };

        let actual = receiver.ty.clone();
        let expected = candidate.instantiate(declared);
        let fits = match candidate.system.as_mut() {
            Some(cs) => cs.try_add_subtype_constraint(self.session, &actual, &expected),
            None => ConstraintSystem::new().is_subtype(self.session, &actual, &expected),
        };

        match fits {
            true => None,
            false => Some(ResolutionDiagnostic::ReceiverTypeMismatch { expected, actual }),
        }
    }

    fn check_argument_types(
        &self,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let Some(mapping) = candidate.mapping.clone() else {
            return None;
        };

        let call = candidate.call.clone();
        if call.args.iter().any(|arg| arg.as_lambda().is_some()) {
            self.attach_system(candidate);
        }

        let mut scratch = ConstraintSystem::new();
        let Candidate {
            system,
            postponed,
            signature,
            substitution,
            ..
        } = candidate;
        let cs = system.as_mut().unwrap_or(&mut scratch);

        let mut conversion = None;
        for (index, arg) in call.args.iter().enumerate() {
            let param = &signature.params[mapping.params[index]];
            let expected = substitute_params(&param.ty, substitution);

            match &arg.value {
                ArgumentValue::Expr(actual) => {
                    if cs.try_add_subtype_constraint(
                        self.session,
                        actual,
                        &expected,
                    ) {
                        continue;
                    }

                    let converted =
                        self.session.sam_ty(&expected).is_some_and(|sam| {
                            cs.try_add_subtype_constraint(
                                self.session,
                                actual,
                                &sam,
                            )
                        });

                    match converted {
                        true => {
                            conversion.get_or_insert(
                                ResolutionDiagnostic::SyntheticConversion {
                                    argument: index,
                                },
                            );
                        }
                        false => {
                            return Some(
                                ResolutionDiagnostic::ArgumentTypeMismatch {
                                    argument: index,
                                    expected,
                                    actual: actual.clone(),
                                },
                            );
                        }
                    }
                }
                ArgumentValue::Lambda(lambda) => {
                    let Some((fn_ty, converted)) =
                        self.lambda_expected_ty(cs, lambda, &expected)
                    else {
                        return Some(ResolutionDiagnostic::LambdaShapeMismatch {
                            argument: index,
                            expected,
                        });
                    };

                    if converted {
                        conversion.get_or_insert(
                            ResolutionDiagnostic::SyntheticConversion {
                                argument: index,
                            },
                        );
                    }

                    postponed.push(PostponedLambda {
                        argument: index,
                        lambda: lambda.clone(),
                        expected: fn_ty,
                        analyzed: false,
                    });
                }
            }
        }

        conversion
    }

    /// The function type a lambda argument is checked against, and whether
    /// getting it took a functional-interface conversion.
    fn lambda_expected_ty(
        &self,
        cs: &mut ConstraintSystem,
        lambda: &LambdaArgument,
        expected: &Arc<Ty>,
    ) -> Option<(Arc<Ty>, bool)> {
        match expected.as_ref() {
            Ty::Fn { domain, .. } => lambda
                .accepts_arity(domain.len())
                .then(|| (expected.clone(), false)),
            Ty::Var(_) | Ty::Any | Ty::Error => {
                let inputs = (0..lambda.declared_arity())
                    .map(|_| Arc::new(Ty::Var(cs.fresh_var(None))))
                    .collect::<Vec<_>>();
                let output = Arc::new(Ty::Var(cs.fresh_var(None)));
                let fn_ty = Ty::function(inputs, output);

                cs.try_add_subtype_constraint(self.session, &fn_ty, expected)
                    .then_some((fn_ty, false))
            }
            _ => {
                let sam = self.session.sam_ty(expected)?;
                let (domain, _) = sam.fn_shape()?;
                lambda
                    .accepts_arity(domain.len())
                    .then(|| (sam.clone(), true))
            }
        }
    }

    fn check_callable_reference_type(
        &self,
        candidate: &mut Candidate,
    ) -> Option<ResolutionDiagnostic> {
        if candidate.call.kind != CallKind::CallableReference {
            return None;
        }

        let signature = &candidate.signature;
        let declared = match candidate.symbol {
            CandidateSymbol::Callable(id)
                if self.session.callable(id).kind.is_value() =>
            {
                Ty::function([], signature.ret.clone())
            }
            _ => Ty::function(
                signature.params.iter().map(|param| param.ty.clone()),
                signature.ret.clone(),
            ),
        };
        candidate.reference_ty = Some(declared.clone());

        let expected = candidate.call.expected.clone()?;
        let actual = candidate.instantiate(&declared);
        let cs = self.attach_system(candidate);

        match cs.try_add_subtype_constraint(self.session, &actual, &expected) {
            true => None,
            false => Some(ResolutionDiagnostic::CallableReferenceTypeMismatch {
                expected,
                actual,
            }),
        }
    }

    // CONVENTIONS

    fn check_operator(
        &self,
        candidate: &Candidate,
    ) -> Option<ResolutionDiagnostic> {
        let is_operator = |id| self.session.callable(id).modifiers.is_operator;

        match (candidate.symbol, candidate.call.origin) {
            (CandidateSymbol::Invoke { operator: Some(id), .. }, _)
                if !is_operator(id) =>
            {
                Some(ResolutionDiagnostic::OperatorModifierMissing)
            }
            (CandidateSymbol::Invoke { .. }, CallOrigin::Operator) => {
                Some(ResolutionDiagnostic::PropertyAsOperator)
            }
            (CandidateSymbol::Callable(id), CallOrigin::Operator)
                if !is_operator(id) =>
            {
                Some(ResolutionDiagnostic::OperatorModifierMissing)
            }
            _ => None,
        }
    }

    fn check_opt_in(&self, candidate: &Candidate) -> Option<ResolutionDiagnostic> {
        let marker = self.session.callable(candidate.declaration()?).modifiers.opt_in?;

        match self.session.settings.has_opted_into(self.session.name(marker)) {
            true => None,
            false => Some(ResolutionDiagnostic::OptInRequired { marker }),
        }
    }
}

/// Matches the arguments of a call to the parameters of `signature`.
///
/// Named arguments go to the parameter with that name; positional ones fill
/// the parameters left to right, and a vararg parameter takes every
/// positional argument from its position on. Parameters without an argument
/// need a default value, except for varargs, which may be empty.
pub fn map_arguments(
    args: &[Argument],
    signature: &Signature,
) -> Result<ArgumentMapping, ResolutionDiagnostic> {
    let params = &signature.params;
    let mut assigned = vec![false; params.len()];
    let mut mapped = Vec::with_capacity(args.len());
    let mut next_positional = 0;
    let mut seen_named = false;

    for (index, arg) in args.iter().enumerate() {
        let param = match arg.name {
            Some(name) => {
                seen_named = true;
                let position = params
                    .iter()
                    .position(|param| param.name == name)
                    .filter(|_| signature.allows_named_args)
                    .ok_or(ResolutionDiagnostic::NamedArgumentNotFound { name })?;

                if assigned[position] {
                    return Err(ResolutionDiagnostic::ArgumentPassedTwice { param: name });
                }
                position
            }
            None if seen_named => {
                return Err(ResolutionDiagnostic::MixingNamedAndPositional {
                    argument: index,
                });
            }
            None => {
                let position = next_positional;
                let param = params
                    .get(position)
                    .ok_or(ResolutionDiagnostic::TooManyArguments { argument: index })?;

                if !param.is_vararg {
                    next_positional += 1;
                }
                position
            }
        };

        if arg.spread && !params[param].is_vararg {
            return Err(ResolutionDiagnostic::SpreadToNonVararg { argument: index });
        }

        assigned[param] = true;
        mapped.push(param);
    }

    let mut defaults_used = 0;
    for (param, assigned) in params.iter().zip(assigned) {
        match (assigned, param.has_default, param.is_vararg) {
            (true, _, _) | (false, _, true) => (),
            (false, true, false) => defaults_used += 1,
            (false, false, false) => {
                return Err(ResolutionDiagnostic::NoValueForParameter {
                    param: param.name,
                });
            }
        }
    }

    Ok(ArgumentMapping {
        params: mapped.into_boxed_slice(),
        defaults_used,
        uses_varargs: params.iter().any(|param| param.is_vararg),
    })
}
