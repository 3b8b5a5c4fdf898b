//! Walking the scope tower and turning the symbols found there into
//! candidates.
//!
//! The walk is organised in levels, each tagged with a [`TowerGroup`]:
//!
//! - for a call with an explicit receiver, the receiver's members, then the
//!   extensions for it found in every scope;
//! - for `super.f()`, the members of each direct supertype, all at one
//!   level;
//! - otherwise the local scopes, then for each implicit receiver its
//!   members and the extensions for it, and finally the non-local scopes.
//!
//! Candidates are run through the stage pipeline as soon as they are
//! created, so that the collector can tell when a successful candidate has
//! been found and lower-priority levels need not be visited at all.

use std::{collections::HashSet, sync::Arc};

use tracing::trace;

use crate::{
    call::{CallInfo, CallKind, ExplicitReceiver, ReceiverOrigin, ReceiverValue},
    env::{CallableId, CallableKind, ClassId, Session},
    scope::{
        GroupOrder, PriorityOrder, Scope, ScopeEntry, ScopeTower, TowerGroup,
        TowerGroupKind,
    },
    ty::{ParamSubstitution, Ty, substitute_params},
};

use super::{
    candidate::{
        ApplicabilityLevel, Candidate, CandidateKey, CandidateSymbol, Signature,
    },
    stages::StageRunner,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Stop before the first level whose group is strictly lower in
    /// priority than a successful candidate.
    AtFirstSuccessfulGroup,
    /// Visit the whole tower.
    Never,
}

/// Accumulates processed candidates and tracks the best applicability seen.
#[derive(Debug)]
pub struct CandidateCollector {
    policy: StopPolicy,
    candidates: Vec<Candidate>,
    best: Option<ApplicabilityLevel>,
    first_successful_group: Option<TowerGroup>,
}

impl CandidateCollector {
    pub fn new(policy: StopPolicy) -> Self {
        Self {
            policy,
            candidates: Vec::new(),
            best: None,
            first_successful_group: None,
        }
    }

    pub fn consume(&mut self, candidate: Candidate) {
        let level = candidate.applicability();
        self.best = Some(self.best.map_or(level, |best| best.min(level)));

        if level.is_success() {
            self.first_successful_group = Some(
                self.first_successful_group
                    .map_or(candidate.group, |group| group.min(candidate.group)),
            );
        }

        self.candidates.push(candidate);
    }

    pub fn should_stop_at(&self, group: TowerGroup) -> bool {
        match (self.policy, self.first_successful_group) {
            (StopPolicy::AtFirstSuccessfulGroup, Some(successful)) => {
                successful < group
            }
            _ => false,
        }
    }

    /// The least severe applicability among the collected candidates.
    pub fn current_applicability(&self) -> Option<ApplicabilityLevel> {
        self.best
    }

    pub fn is_success(&self) -> bool {
        self.best.is_some_and(ApplicabilityLevel::is_success)
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

/// Where a level finds its symbols.
#[derive(Debug)]
enum LevelSource<'t> {
    /// Members of a receiver.
    Members(ReceiverValue),
    /// Declarations in a scope; with a receiver, only the extensions for it.
    Scope {
        scope: &'t Scope,
        receiver: Option<ReceiverValue>,
    },
}

#[derive(Debug)]
struct Level<'t> {
    group: TowerGroup,
    source: LevelSource<'t>,
}

#[derive(Debug, Clone, Copy)]
pub struct CandidateEmitter<'a> {
    session: &'a Session,
    tower: &'a ScopeTower,
    runner: StageRunner<'a>,
}

impl<'a> CandidateEmitter<'a> {
    pub fn new(
        session: &'a Session,
        tower: &'a ScopeTower,
        runner: StageRunner<'a>,
    ) -> Self {
        Self {
            session,
            tower,
            runner,
        }
    }

    /// Visits the tower for `call`, processing every candidate it yields.
    pub fn emit(
        &self,
        call: &Arc<CallInfo>,
        policy: StopPolicy,
    ) -> CandidateCollector {
        let mut collector = CandidateCollector::new(policy);
        let mut seen = HashSet::new();

        for level in self.levels(call) {
            if collector.should_stop_at(level.group) {
                trace!(group = ?level.group, "stopping the tower walk");
                break;
            }

            // invoke and qualifier candidates rank below the level's direct
            // symbols, so a direct success cuts them off
            let mut candidates = self.candidates_at(&level, call);
            candidates.sort_by_key(|candidate| candidate.group);
            for candidate in candidates {
                if collector.should_stop_at(candidate.group) {
                    break;
                }

                self.consume(&mut collector, &mut seen, candidate);
            }
        }

        collector
    }

    /// Produces the constructors of `class` for a call that names the class
    /// implicitly, as delegating constructor calls and annotations do.
    /// `args` are the type arguments the class is applied to, if known.
    pub fn emit_constructors(
        &self,
        call: &Arc<CallInfo>,
        class: ClassId,
        args: Option<&[Arc<Ty>]>,
    ) -> CandidateCollector {
        let mut collector = CandidateCollector::new(StopPolicy::Never);
        let mut seen = HashSet::new();
        let substitution = args
            .map(|args| self.session.class_substitution(class, args))
            .unwrap_or_default();

        let outer = self.outer_receiver(class);
        for &constructor in &self.session.class(class).constructors {
            let candidate = Candidate::new(
                CandidateSymbol::Callable(constructor),
                Signature::of_callable(self.session, constructor, &substitution),
                TowerGroup::new(TowerGroupKind::Member),
                call.clone(),
            );
            let candidate = match &outer {
                Some(receiver) => candidate.with_dispatch_receiver(receiver.clone()),
                None => candidate,
            };
            self.consume(&mut collector, &mut seen, candidate);
        }

        collector
    }

    /// The receiver an inner class's constructors are called on.
    fn outer_receiver(&self, class: ClassId) -> Option<ReceiverValue> {
        self.tower
            .innermost_receiver()
            .filter(|_| self.session.class(class).is_inner)
            .map(|receiver| ReceiverValue {
                ty: receiver.ty.clone(),
                origin: ReceiverOrigin::Implicit(0),
            })
    }

    fn consume(
        &self,
        collector: &mut CandidateCollector,
        seen: &mut HashSet<CandidateKey>,
        mut candidate: Candidate,
    ) {
        if !seen.insert(candidate.key()) {
            return;
        }

        self.runner.process(&mut candidate);
        trace!(
            symbol = ?candidate.symbol,
            group = ?candidate.group,
            applicability = ?candidate.applicability(),
            "processed candidate"
        );
        collector.consume(candidate);
    }

    fn levels(&self, call: &CallInfo) -> Vec<Level<'a>> {
        let mut levels = Vec::new();
        let tower = self.tower;
        let scopes = || tower.for_each_scope(PriorityOrder::HighestFirst);

        match &call.explicit_receiver {
            Some(ExplicitReceiver::Expr { ty, .. }) => {
                let receiver = ReceiverValue {
                    ty: ty.clone(),
                    origin: ReceiverOrigin::Explicit,
                };
                levels.push(Level {
                    group: TowerGroup::new(TowerGroupKind::Member),
                    source: LevelSource::Members(receiver.clone()),
                });
                levels.extend(scopes().map(|(group, scope)| Level {
                    group,
                    source: LevelSource::Scope {
                        scope,
                        receiver: Some(receiver.clone()),
                    },
                }));
            }
            Some(ExplicitReceiver::Super) => {
                let Some(class) = call.containing_class() else {
                    return levels;
                };

                let this = self.session.declared_ty(class);
                levels.extend(self.session.direct_supertypes(&this).into_iter().map(
                    |ty| Level {
                        group: TowerGroup::new(TowerGroupKind::Member),
                        source: LevelSource::Members(ReceiverValue {
                            ty,
                            origin: ReceiverOrigin::Super,
                        }),
                    },
                ));
            }
            None => {
                let (locals, non_local): (Vec<_>, Vec<_>) =
                    scopes().partition(|(group, _)| {
                        matches!(group.kind, TowerGroupKind::Local(_))
                    });

                levels.extend(locals.iter().map(|&(group, scope)| Level {
                    group,
                    source: LevelSource::Scope {
                        scope,
                        receiver: None,
                    },
                }));

                for (depth, (group, implicit)) in
                    tower.implicit_receivers().enumerate()
                {
                    let receiver = ReceiverValue {
                        ty: implicit.ty.clone(),
                        origin: ReceiverOrigin::Implicit(depth as u32),
                    };

                    levels.push(Level {
                        group,
                        source: LevelSource::Members(receiver.clone()),
                    });
                    levels.extend(scopes().enumerate().map(
                        |(position, (_, scope))| Level {
                            group: group.at(position as u32 + 1),
                            source: LevelSource::Scope {
                                scope,
                                receiver: Some(receiver.clone()),
                            },
                        },
                    ));
                }

                levels.extend(non_local.iter().map(|&(group, scope)| Level {
                    group,
                    source: LevelSource::Scope {
                        scope,
                        receiver: None,
                    },
                }));
            }
        }

        // stable, so members stay ahead of extensions within a group
        levels.sort_by_key(|level| level.group);
        levels
    }

    fn candidates_at(&self, level: &Level<'_>, call: &Arc<CallInfo>) -> Vec<Candidate> {
        let mut candidates = Vec::new();

        match &level.source {
            LevelSource::Members(receiver) => {
                for (id, substitution) in
                    self.session.members_named(&receiver.ty, call.name)
                {
                    let callable = self.session.callable(id);
                    if callable.receiver.is_some() {
                        // member extensions need two receivers
                        continue;
                    }

                    self.symbol_candidates(
                        &mut candidates,
                        level.group,
                        call,
                        id,
                        &substitution,
                        |candidate| {
                            candidate.with_dispatch_receiver(receiver.clone())
                        },
                    );
                }
            }
            LevelSource::Scope { scope, receiver } => {
                for &entry in scope.lookup(self.session, call.name) {
                    match (entry, receiver) {
                        (ScopeEntry::Callable(id), Some(receiver)) => {
                            if self.session.callable(id).receiver.is_none() {
                                continue;
                            }

                            self.symbol_candidates(
                                &mut candidates,
                                level.group,
                                call,
                                id,
                                &ParamSubstitution::new(),
                                |candidate| {
                                    candidate
                                        .with_extension_receiver(receiver.clone())
                                },
                            );
                        }
                        (ScopeEntry::Callable(id), None) => {
                            let callable = self.session.callable(id);
                            if callable.receiver.is_some() || callable.owner.is_some() {
                                continue;
                            }

                            self.symbol_candidates(
                                &mut candidates,
                                level.group,
                                call,
                                id,
                                &ParamSubstitution::new(),
                                |candidate| candidate,
                            );
                        }
                        (ScopeEntry::Classifier(class), None) => {
                            self.classifier_candidates(
                                &mut candidates,
                                level.group,
                                call,
                                class,
                            );
                        }
                        (ScopeEntry::Classifier(_), Some(_)) => (),
                    }
                }
            }
        }

        candidates
    }

    /// Candidates for a function, property or variable found at a level.
    /// `attach` adds the level's receiver.
    fn symbol_candidates(
        &self,
        out: &mut Vec<Candidate>,
        group: TowerGroup,
        call: &Arc<CallInfo>,
        id: CallableId,
        substitution: &ParamSubstitution,
        attach: impl Fn(Candidate) -> Candidate,
    ) {
        let callable = self.session.callable(id);
        let direct = match (call.kind, callable.kind) {
            (CallKind::CallableReference, CallableKind::Constructor) => false,
            (CallKind::CallableReference, _) => true,
            (CallKind::VariableAccess, kind) => kind.is_value(),
            (_, kind) => kind == CallableKind::Function,
        };

        if direct {
            out.push(attach(Candidate::new(
                CandidateSymbol::Callable(id),
                Signature::of_callable(self.session, id, substitution),
                group,
                call.clone(),
            )));
        }

        if call.kind == CallKind::Function && callable.kind.is_value() {
            let value_ty = substitute_params(&callable.ret, substitution);
            self.invoke_candidates(
                out,
                group,
                call,
                id,
                substitution,
                &value_ty,
                &attach,
            );
        }
    }

    /// Candidates that call the value `variable` through `invoke`.
    #[allow(clippy::too_many_arguments)]
    fn invoke_candidates(
        &self,
        out: &mut Vec<Candidate>,
        group: TowerGroup,
        call: &Arc<CallInfo>,
        variable: CallableId,
        substitution: &ParamSubstitution,
        value_ty: &Arc<Ty>,
        attach: &impl Fn(Candidate) -> Candidate,
    ) {
        let group = group.with_order(GroupOrder::Invoke);
        let invoke_call = Arc::new(call.with_kind(CallKind::ImplicitInvoke));
        let variable_signature =
            Signature::of_callable(self.session, variable, substitution);
        let invoked = ReceiverValue {
            ty: value_ty.clone(),
            origin: ReceiverOrigin::InvokedValue,
        };

        let mut push = |operator, signature: Signature| {
            let mut candidate = attach(Candidate::new(
                CandidateSymbol::Invoke { variable, operator },
                Signature {
                    receiver: variable_signature.receiver.clone(),
                    ..signature
                },
                group,
                invoke_call.clone(),
            ));
            candidate.dispatch_receiver = Some(invoked.clone());
            out.push(candidate);
        };

        match value_ty.as_ref() {
            Ty::Fn { domain, codomain } => push(
                None,
                Signature::of_function_ty(self.session, domain, codomain),
            ),
            _ => {
                let invoke = self.session.names.invoke;
                for (operator, substitution) in
                    self.session.members_named(value_ty, invoke)
                {
                    let signature =
                        Signature::of_callable(self.session, operator, &substitution);
                    push(Some(operator), signature);
                }
            }
        }
    }

    /// Constructors for a call, or the classifier itself for a variable
    /// access.
    fn classifier_candidates(
        &self,
        out: &mut Vec<Candidate>,
        group: TowerGroup,
        call: &Arc<CallInfo>,
        class: ClassId,
    ) {
        let decl = self.session.class(class);

        match call.kind {
            CallKind::VariableAccess => out.push(Candidate::new(
                CandidateSymbol::Qualifier(class),
                Signature {
                    ty_params: Box::new([]),
                    receiver: None,
                    params: Box::new([]),
                    ret: self.session.declared_ty(class),
                    allows_named_args: false,
                },
                group.with_order(GroupOrder::Qualifier),
                call.clone(),
            )),
            CallKind::Function | CallKind::CallableReference => {
                let outer = self.outer_receiver(class);
                for &constructor in &decl.constructors {
                    let candidate = Candidate::new(
                        CandidateSymbol::Callable(constructor),
                        Signature::of_callable(
                            self.session,
                            constructor,
                            &ParamSubstitution::new(),
                        ),
                        group,
                        call.clone(),
                    );

                    out.push(match &outer {
                        Some(receiver) => {
                            candidate.with_dispatch_receiver(receiver.clone())
                        }
                        None => candidate,
                    });
                }
            }
            _ => (),
        }
    }
}
