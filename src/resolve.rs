//! Resolving call sites to declarations.
//!
//! Every entry point drives one call through the same state machine:
//!
//! ```text
//! Init -> CandidatesCollected -> StageRun -> ConflictResolved
//!      -> [LambdaDisambiguation] -> Finalized
//! ```
//!
//! An attempt that collects no candidates at all goes back to `Init` once,
//! with the fallback kind of the call (a plain call is retried as a
//! variable access and vice versa). Every outcome, including ambiguity and
//! errors in the resolved code, ends in `Finalized` and becomes a
//! [`ResolvedReference`]. Only a contradiction inside the resolver itself
//! is returned as an [`InternalError`].

pub mod candidate;
pub mod conflict;
pub mod emit;
pub mod lambda;
pub mod reference;
pub mod stages;

use std::sync::Arc;

use tracing::debug;

use crate::{
    call::{
        CallInfo, CallKind, CallSite, CallableReferenceAtom, CalleeReference,
        ContainingDeclaration,
    },
    env::{ClassKind, Session},
    error::{Attachment, InternalError},
    infer::{ConstraintSystem, LambdaAnalyzer},
    print,
    scope::ScopeTower,
    ty::{Ty, substitute_params},
};

use candidate::{ApplicabilityLevel, Candidate, ResolutionDiagnostic};
use emit::{CandidateCollector, CandidateEmitter, StopPolicy};
use lambda::LambdaDisambiguator;
use reference::{
    DiagnosticSink, ReferenceBuilder, ResolutionError, ResolvedReference,
    Selection,
};
use stages::StageRunner;

/// Everything a [`CallResolver`] needs from its surroundings, handed over in
/// one piece when the resolver is built.
#[derive(Clone, Copy)]
pub struct ResolverComponents<'a> {
    pub session: &'a Session,
    pub tower: &'a ScopeTower,
    pub analyzer: &'a dyn LambdaAnalyzer,
    /// The declarations enclosing the calls, innermost first.
    pub containing: &'a Arc<[ContainingDeclaration]>,
}

/// A candidate as reported by [`CallResolver::collect_all_candidates`].
#[derive(Debug, Clone)]
pub struct OverloadCandidate {
    pub candidate: Candidate,
    /// Whether the candidate survived conflict resolution.
    pub in_best: bool,
}

enum State {
    Init {
        fallback: Option<CallKind>,
    },
    CandidatesCollected {
        fallback: Option<CallKind>,
        collector: CandidateCollector,
    },
    StageRun {
        fallback: Option<CallKind>,
        candidates: Vec<Candidate>,
    },
    ConflictResolved {
        fallback: Option<CallKind>,
        candidates: Vec<Candidate>,
        applicability: ApplicabilityLevel,
    },
    LambdaDisambiguation {
        fallback: Option<CallKind>,
        candidates: Vec<Candidate>,
        applicability: ApplicabilityLevel,
    },
    Finalized(Selection),
}

/// Completes the constraint system of a call whose result no outer call
/// depends on.
#[derive(Clone, Copy)]
pub struct CallCompleter<'a> {
    session: &'a Session,
    analyzer: &'a dyn LambdaAnalyzer,
}

impl<'a> CallCompleter<'a> {
    pub fn new(session: &'a Session, analyzer: &'a dyn LambdaAnalyzer) -> Self {
        Self { session, analyzer }
    }

    /// Analyzes the candidate's postponed lambdas and fixes every variable.
    /// On success the solution is stored on the candidate; on failure the
    /// candidate becomes inapplicable.
    pub fn complete(&self, candidate: &mut Candidate) -> bool {
        let Some(cs) = candidate.system.as_mut() else {
            return true;
        };

        match cs.complete(self.session, self.analyzer, &mut candidate.postponed) {
            true => {
                candidate.solution = Some(cs.build_current_substitutor());
                true
            }
            false => {
                let error = cs.errors().first().cloned();
                if let Some(error) = error {
                    candidate.add_diagnostic(ResolutionDiagnostic::InferenceFailed(error));
                }
                false
            }
        }
    }
}

pub struct CallResolver<'a> {
    components: ResolverComponents<'a>,
}

impl<'a> CallResolver<'a> {
    pub fn new(components: ResolverComponents<'a>) -> Self {
        Self { components }
    }

    fn session(&self) -> &'a Session {
        self.components.session
    }

    fn emitter<'r>(&self, runner: StageRunner<'r>) -> CandidateEmitter<'r>
    where
        'a: 'r,
    {
        CandidateEmitter::new(self.session(), self.components.tower, runner)
    }

    fn builder(&self) -> ReferenceBuilder<'a> {
        ReferenceBuilder::new(self.session())
    }

    fn call_info(&self, site: &CallSite, expected: Option<Arc<Ty>>) -> Arc<CallInfo> {
        Arc::new(site.call_info(self.components.containing.clone(), expected))
    }

    // ENTRY POINTS

    /// Resolves a plain call `f(..)` or `a.f(..)`.
    pub fn resolve_call_and_select_candidate(
        &self,
        site: &mut CallSite,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ResolvedReference, InternalError> {
        self.resolve_qualified(site, CallKind::Function, sink)
    }

    /// Resolves a name used as a value, `x` or `a.x`.
    pub fn resolve_variable_access_and_select_candidate(
        &self,
        site: &mut CallSite,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ResolvedReference, InternalError> {
        self.resolve_qualified(site, CallKind::VariableAccess, sink)
    }

    fn resolve_qualified(
        &self,
        site: &mut CallSite,
        kind: CallKind,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ResolvedReference, InternalError> {
        self.expect_kind(site, kind)?;

        let info = self.call_info(site, None);
        let runner = StageRunner::new(self.session());
        let mut selection =
            self.drive(site, &info, State::Init { fallback: None }, runner)?;
        self.complete_independent(&mut selection);

        Ok(self.builder().build(site, selection, sink))
    }

    /// Resolves a callable reference `::f` against the system `outer` of the
    /// call it is an argument of.
    ///
    /// Returns the applicability reached and whether resolution has been
    /// postponed: a first attempt that ends in ambiguity leaves the atom
    /// unresolved, to be tried again once `outer` knows more.
    pub fn resolve_callable_reference(
        &self,
        atom: &mut CallableReferenceAtom,
        outer: &mut ConstraintSystem,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(ApplicabilityLevel, bool), InternalError> {
        self.expect_kind(&atom.site, CallKind::CallableReference)?;

        let session = self.session();
        let expected = atom.expected.as_ref().map(|ty| outer.substitute(ty));
        let info = self.call_info(&atom.site, expected.clone());

        let frozen = outer.clone();
        let runner = StageRunner::new(session).with_outer(&frozen);
        let selection = self.drive(
            &mut atom.site,
            &info,
            State::Init { fallback: None },
            runner,
        )?;
        let applicability = selection.applicability;
        let first_pass = !atom.resolved_once;
        atom.resolved_once = true;

        if applicability.is_success() && selection.candidates.len() > 1 && first_pass {
            debug!(
                candidates = selection.candidates.len(),
                "postponing an ambiguous callable reference"
            );
            atom.postponed = true;
            return Ok((applicability, true));
        }

        if let ([candidate], true, Some(expected)) = (
            selection.candidates.as_slice(),
            applicability.is_success(),
            expected.as_ref(),
        ) {
            if let Some(declared) = &candidate.reference_ty {
                let ty_params = &candidate.signature.ty_params;
                let applied = outer.run_transaction(|cs| {
                    let substitution = cs.instantiate(session, ty_params);
                    let actual = substitute_params(declared, &substitution);
                    cs.try_add_subtype_constraint(session, &actual, expected)
                });
                debug!(applied, "applied a callable reference to its outer call");
            }
        }

        self.builder().build(&mut atom.site, selection, sink);
        Ok((applicability, false))
    }

    /// Resolves `this(..)` or `super(..)` in a constructor. `constructed` is
    /// the class type being delegated to, if it could be determined.
    pub fn resolve_delegating_constructor_call(
        &self,
        site: &mut CallSite,
        constructed: Option<&Arc<Ty>>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ResolvedReference, InternalError> {
        self.expect_kind(site, CallKind::DelegatingConstructorCall)?;

        let Some(Ty::Named { class, args }) = constructed.map(|ty| &**ty) else {
            return Ok(self.builder().build_error(
                site,
                ResolutionError::UnresolvedSupertype,
                sink,
            ));
        };

        let info = self.call_info(site, None);
        let runner = StageRunner::new(self.session());
        let collector = self.emitter(runner).emit_constructors(&info, *class, Some(&args[..]));
        let mut selection = self.drive(
            site,
            &info,
            State::CandidatesCollected {
                fallback: None,
                collector,
            },
            runner,
        )?;
        self.complete_independent(&mut selection);

        Ok(self.builder().build(site, selection, sink))
    }

    /// Resolves an annotation `@A(..)` to the constructor of `A`.
    pub fn resolve_annotation_call(
        &self,
        site: &mut CallSite,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<ResolvedReference, InternalError> {
        self.expect_kind(site, CallKind::Annotation)?;

        let session = self.session();
        let info = self.call_info(site, None);
        let Some(class) = self.components.tower.find_classifier(session, site.name) else {
            let selection = Selection {
                info,
                candidates: Vec::new(),
                applicability: ApplicabilityLevel::Unsupported,
                fallback: None,
            };
            return Ok(self.builder().build(site, selection, sink));
        };

        if session.class(class).kind != ClassKind::Annotation {
            return Ok(self.builder().build_error(
                site,
                ResolutionError::IllegalAnnotation { class },
                sink,
            ));
        }

        let runner = StageRunner::new(session);
        let collector = self.emitter(runner).emit_constructors(&info, class, None);
        let mut selection = self.drive(
            site,
            &info,
            State::CandidatesCollected {
                fallback: None,
                collector,
            },
            runner,
        )?;
        self.complete_independent(&mut selection);

        Ok(self.builder().build(site, selection, sink))
    }

    /// Visits the whole tower for `site` and reports every candidate found,
    /// marking the ones resolution would pick. The call site is left
    /// untouched.
    pub fn collect_all_candidates(
        &self,
        site: &CallSite,
    ) -> Result<Vec<OverloadCandidate>, InternalError> {
        let session = self.session();
        let info = self.call_info(site, None);
        let runner = StageRunner::new(session);

        let collector = self.emitter(runner).emit(&info, StopPolicy::Never);
        let mut candidates = collector.into_candidates();
        candidates.iter_mut().for_each(|candidate| runner.fully_process(candidate));
        self.check_applicability(site, &candidates)?;

        // only the levels a stopping walk would have reached compete
        let cutoff = candidates
            .iter()
            .filter(|candidate| candidate.is_successful())
            .map(|candidate| candidate.group)
            .min();
        let eligible = (0..candidates.len())
            .filter(|&index| {
                cutoff.is_none_or(|cutoff| candidates[index].group <= cutoff)
            })
            .collect::<Vec<_>>();
        let competing = eligible
            .iter()
            .map(|&index| candidates[index].clone())
            .collect::<Vec<_>>();

        let reduction =
            session
                .conflict_resolver()
                .reduce(session, &competing, info.is_super_call());

        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(index, candidate)| OverloadCandidate {
                candidate,
                in_best: eligible
                    .iter()
                    .position(|&eligible| eligible == index)
                    .is_some_and(|position| reduction.chosen.contains(&position)),
            })
            .collect())
    }

    // STATE MACHINE

    fn drive<'r>(
        &self,
        site: &mut CallSite,
        info: &Arc<CallInfo>,
        mut state: State,
        runner: StageRunner<'r>,
    ) -> Result<Selection, InternalError>
    where
        'a: 'r,
    {
        let session = self.session();

        loop {
            state = match state {
                State::Init { fallback } => {
                    let attempt = match fallback {
                        Some(kind) => Arc::new(info.with_kind(kind)),
                        None => info.clone(),
                    };
                    let collector = self
                        .emitter(runner)
                        .emit(&attempt, StopPolicy::AtFirstSuccessfulGroup);

                    match (collector.is_empty(), fallback, info.kind.fallback()) {
                        (true, None, Some(kind)) => {
                            debug!(?kind, "no candidates, retrying with the fallback kind");
                            State::Init {
                                fallback: Some(kind),
                            }
                        }
                        (true, Some(_), _) => State::CandidatesCollected {
                            fallback: None,
                            collector,
                        },
                        _ => State::CandidatesCollected {
                            fallback,
                            collector,
                        },
                    }
                }
                State::CandidatesCollected {
                    fallback,
                    collector,
                } => {
                    debug!(
                        candidates = collector.candidates().len(),
                        best = ?collector.current_applicability(),
                        "collected candidates"
                    );

                    let success = collector.is_success();
                    let mut candidates = collector.into_candidates();
                    if !success {
                        // nothing will be chosen; make the reports complete
                        for candidate in &mut candidates {
                            runner.fully_process(candidate);
                        }
                    }

                    State::StageRun {
                        fallback,
                        candidates,
                    }
                }
                State::StageRun {
                    fallback,
                    candidates,
                } => {
                    self.check_applicability(site, &candidates)?;

                    let reduction = session.conflict_resolver().reduce(
                        session,
                        &candidates,
                        info.is_super_call(),
                    );
                    debug!(
                        applicability = ?reduction.applicability,
                        chosen = reduction.chosen.len(),
                        "resolved conflicts"
                    );

                    let candidates = candidates
                        .into_iter()
                        .enumerate()
                        .filter(|(index, _)| reduction.chosen.contains(index))
                        .map(|(_, candidate)| candidate)
                        .collect();

                    State::ConflictResolved {
                        fallback,
                        candidates,
                        applicability: reduction.applicability,
                    }
                }
                State::ConflictResolved {
                    fallback,
                    candidates,
                    applicability,
                } => match applicability.is_success() && candidates.len() > 1 {
                    true => State::LambdaDisambiguation {
                        fallback,
                        candidates,
                        applicability,
                    },
                    false => State::Finalized(Selection {
                        info: info.clone(),
                        candidates,
                        applicability,
                        fallback,
                    }),
                },
                State::LambdaDisambiguation {
                    fallback,
                    candidates,
                    applicability,
                } => {
                    let candidates =
                        LambdaDisambiguator::new(session, self.components.analyzer)
                            .reduce(site, candidates);

                    if let CalleeReference::Transient(candidate) = site.callee {
                        return Err(InternalError::TransientCallee {
                            candidate,
                            attachment: self.attachment(site, &candidates),
                        });
                    }

                    State::Finalized(Selection {
                        info: info.clone(),
                        candidates,
                        applicability,
                        fallback,
                    })
                }
                State::Finalized(selection) => return Ok(selection),
            }
        }
    }

    /// Completes the single winner of an independent call.
    fn complete_independent(&self, selection: &mut Selection) {
        if selection.info.dependent
            || selection.fallback.is_some()
            || !selection.applicability.is_success()
        {
            return;
        }

        if let [candidate] = selection.candidates.as_mut_slice() {
            let completer = CallCompleter::new(self.session(), self.components.analyzer);
            if !completer.complete(candidate) {
                debug!("completion of the selected candidate failed");
                selection.applicability = candidate.applicability();
            }
        }
    }

    // INVARIANTS

    fn expect_kind(&self, site: &CallSite, kind: CallKind) -> Result<(), InternalError> {
        match site.kind == kind {
            true => Ok(()),
            false => Err(InternalError::UnexpectedCallKind {
                kind: site.kind,
                attachment: self.attachment(site, &[]),
            }),
        }
    }

    /// Every candidate's cached applicability must be the one its
    /// diagnostics imply.
    fn check_applicability(
        &self,
        site: &CallSite,
        candidates: &[Candidate],
    ) -> Result<(), InternalError> {
        for candidate in candidates {
            let recomputed = candidate.recomputed_applicability();
            if recomputed != candidate.applicability() {
                return Err(InternalError::ApplicabilityMismatch {
                    cached: candidate.applicability(),
                    recomputed,
                    attachment: self.attachment(site, candidates),
                });
            }
        }

        Ok(())
    }

    fn attachment(&self, site: &CallSite, candidates: &[Candidate]) -> Attachment {
        let call_site = match site.text.is_empty() {
            true => Box::from(self.session().name(site.name)),
            false => site.text.clone(),
        };

        Attachment {
            call_site,
            candidates: candidates
                .iter()
                .map(|candidate| {
                    let mut line = print::render(candidate, self.session());
                    for diagnostic in candidate.diagnostics() {
                        line.push_str("; ");
                        line.push_str(&print::render(diagnostic, self.session()));
                    }
                    line.into_boxed_str()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{
        call::{CallShape, LambdaArgument},
        config::LanguageSettings,
        env::{CallableId, Visibility},
        fixture::Fixture,
        infer::{BodyShapeAnalyzer, CompletionMode, LambdaResult},
        resolve::{
            candidate::{ApplicabilityLevel as A, CandidateSymbol, ResolutionDiagnostic as D},
            reference::CollectingSink,
        },
        ty::PrimTy,
    };

    /// Parses `decls` below a package scope called `app`.
    fn fixture(decls: &str) -> Fixture {
        let src = format!("[[scope]]\nname = \"app\"\nkind = \"package\"\n{decls}");
        src.parse().unwrap()
    }

    fn resolve(fixture: &Fixture, index: usize) -> (CallSite, ResolvedReference) {
        let mut sink = CollectingSink::default();
        fixture.resolve_call(index, &BodyShapeAnalyzer, &mut sink).unwrap()
    }

    fn resolves_to(reference: &ResolvedReference, id: CallableId) -> bool {
        matches!(
            reference,
            ResolvedReference::Resolved(candidate) if candidate.declaration() == Some(id)
        )
    }

    /// The `index`th callable named `name`, in declaration order.
    fn callable(fixture: &Fixture, name: &str, index: usize) -> CallableId {
        fixture.callable_named(name)[index]
    }

    #[derive(Default)]
    struct CountingAnalyzer {
        analyzed: Cell<usize>,
    }

    impl LambdaAnalyzer for CountingAnalyzer {
        fn analyze_lambda(
            &self,
            lambda: &LambdaArgument,
            input_tys: &[Arc<Ty>],
            expected_return: &Arc<Ty>,
        ) -> LambdaResult {
            self.analyzed.set(self.analyzed.get() + 1);
            BodyShapeAnalyzer.analyze_lambda(lambda, input_tys, expected_return)
        }
    }

    const OVERLOADS: &str = r#"
        [[function]]
        name = "f"
        params = ["x: Int"]
        scope = "app"

        [[function]]
        name = "f"
        params = ["x: String"]
        scope = "app"
    "#;

    #[test]
    fn pick_the_applicable_overload() {
        let fixture = fixture(&format!(
            "{OVERLOADS}\n[[call]]\nname = \"f\"\nargs = [\"Int\"]\n"
        ));
        let mut sink = CollectingSink::default();
        let (site, reference) = fixture
            .resolve_call(0, &BodyShapeAnalyzer, &mut sink)
            .unwrap();

        assert!(resolves_to(&reference, callable(&fixture, "f", 0)));
        assert!(reference.candidate().unwrap().system.is_none());
        assert_eq!(site.resolved(), Some(&reference));
        assert!(sink.reports.is_empty());
    }

    #[test]
    fn lambda_argument_selects_function_typed_parameter() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "f"
            params = ["x: String"]
            scope = "app"

            [[function]]
            name = "f"
            params = ["block: () -> String"]
            scope = "app"

            [[call]]
            name = "f"
            args = ["{ String }"]
            "#,
        );
        let (_, reference) = resolve(&fixture, 0);

        assert!(resolves_to(&reference, callable(&fixture, "f", 1)));
        let candidate = reference.candidate().unwrap();
        assert!(candidate.solution.is_some());
        assert!(candidate.postponed.iter().all(|lambda| lambda.analyzed));
    }

    #[test]
    fn unknown_names_are_unresolved() {
        let fixture = fixture("[[call]]\nname = \"g\"\n");
        let mut sink = CollectingSink::default();
        let (site, reference) = fixture
            .resolve_call(0, &BodyShapeAnalyzer, &mut sink)
            .unwrap();

        let g = fixture.session.interner.get("g").unwrap();
        assert_eq!(reference, ResolvedReference::Unresolved(g));
        assert_eq!(site.callee, CalleeReference::Resolved(reference));
        assert!(matches!(
            sink.reports.as_slice(),
            [(span, ResolutionError::UnresolvedName { name })]
                if *name == g && *span == site.span
        ));
    }

    #[test]
    fn super_calls_prefer_concrete_members() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "A"
            kind = "interface"
            scope = "app"

            [[class]]
            name = "B"
            kind = "interface"
            scope = "app"

            [[class]]
            name = "C"
            supertypes = ["A", "B"]
            scope = "app"

            [[function]]
            name = "f"
            owner = "A"
            abstract = true

            [[function]]
            name = "f"
            owner = "B"

            [context]
            containing = ["C"]

            [[call]]
            name = "f"
            receiver = "super"
            "#,
        );
        let (_, reference) = resolve(&fixture, 0);

        assert!(resolves_to(&reference, callable(&fixture, "f", 1)));
    }

    #[test]
    fn incomparable_overloads_are_ambiguous() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "f"
            params = ["x: Int", "y: String"]
            scope = "app"

            [[function]]
            name = "f"
            params = ["x: String", "y: Int"]
            scope = "app"

            [[call]]
            name = "f"
            args = ["Any", "Any"]

            [[call]]
            name = "f"
            args = ["Nothing", "Nothing"]
            "#,
        );

        let mut sink = CollectingSink::default();
        let (_, inapplicable) = fixture
            .resolve_call(0, &BodyShapeAnalyzer, &mut sink)
            .unwrap();
        assert!(matches!(
            &inapplicable,
            ResolvedReference::Ambiguous { candidates, applicability: A::Inapplicable }
                if candidates.len() == 2
        ));
        assert!(matches!(
            sink.reports.as_slice(),
            [(_, ResolutionError::Ambiguity { candidates, .. })] if candidates.len() == 2
        ));

        let (_, applicable) = resolve(&fixture, 1);
        assert!(matches!(
            &applicable,
            ResolvedReference::Ambiguous { candidates, applicability: A::Resolved }
                if candidates.len() == 2
        ));
    }

    #[test]
    fn least_bad_candidate_is_reported() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "f"
            params = ["x: Int"]
            deprecation = "hidden"
            scope = "app"

            [[function]]
            name = "f"
            params = ["x: String"]
            scope = "app"

            [[call]]
            name = "f"
            args = ["Int"]
            "#,
        );
        let (_, reference) = resolve(&fixture, 0);

        let f_string = callable(&fixture, "f", 1);
        assert!(matches!(
            &reference,
            ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(candidate),
                error: ResolutionError::Inapplicable {
                    applicability: A::Inapplicable,
                    diagnostic: Some(D::ArgumentTypeMismatch { argument: 0, .. }),
                },
            } if candidate.declaration() == Some(f_string)
        ));
    }

    // LAMBDAS

    #[test]
    fn lambda_is_analyzed_once_to_break_a_tie() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "f"
            params = ["block: () -> String"]
            scope = "app"

            [[function]]
            name = "f"
            params = ["block: () -> Int"]
            scope = "app"

            [[call]]
            name = "f"
            args = ["{ String }"]
            "#,
        );
        let analyzer = CountingAnalyzer::default();
        let (site, reference) = fixture
            .resolve_call(0, &analyzer, &mut CollectingSink::default())
            .unwrap();

        assert!(resolves_to(&reference, callable(&fixture, "f", 0)));
        assert_eq!(analyzer.analyzed.get(), 1);
        assert!(matches!(site.callee, CalleeReference::Resolved(_)));
    }

    #[test]
    fn marked_overload_wins_a_lambda_tie() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "I1"
            kind = "interface"
            scope = "app"

            [[class]]
            name = "I2"
            kind = "interface"
            scope = "app"

            [[class]]
            name = "Both"
            supertypes = ["I1", "I2"]
            scope = "app"

            [[function]]
            name = "marked"
            params = ["block: () -> I1"]
            prefers-lambda-return = true
            scope = "app"

            [[function]]
            name = "marked"
            params = ["block: () -> I2"]
            scope = "app"

            [[function]]
            name = "plain"
            params = ["block: () -> I1"]
            scope = "app"

            [[function]]
            name = "plain"
            params = ["block: () -> I2"]
            scope = "app"

            [[call]]
            name = "marked"
            args = ["{ Both }"]

            [[call]]
            name = "plain"
            args = ["{ Both }"]
            "#,
        );

        let (_, marked) = resolve(&fixture, 0);
        assert!(resolves_to(&marked, callable(&fixture, "marked", 0)));

        let (site, plain) = resolve(&fixture, 1);
        assert!(matches!(
            &plain,
            ResolvedReference::Ambiguous { candidates, applicability: A::Resolved }
                if candidates.len() == 2
        ));
        assert!(matches!(site.callee, CalleeReference::Resolved(_)));
    }

    // FALLBACKS AND DESUGARING

    #[test]
    fn values_and_functions_used_as_each_other() {
        let fixture = fixture(
            r#"
            [[property]]
            name = "count"
            type = "Int"
            scope = "app"

            [[function]]
            name = "compute"
            returns = "Int"
            scope = "app"

            [[call]]
            name = "count"

            [[call]]
            name = "compute"
            kind = "variable-access"
            "#,
        );

        let (_, called_value) = resolve(&fixture, 0);
        assert!(matches!(
            called_value.error(),
            Some(ResolutionError::FunctionExpected { ty, .. })
                if *ty == Ty::Prim(PrimTy::Int)
        ));
        assert!(called_value.candidate().is_some());

        let (_, named_function) = resolve(&fixture, 1);
        assert!(matches!(
            named_function.error(),
            Some(ResolutionError::FunctionCallExpected { .. })
        ));
    }

    #[test]
    fn function_typed_values_are_invoked() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Action"

            [[class]]
            name = "Plain"

            [[property]]
            name = "handler"
            type = "(Int) -> String"
            scope = "app"

            [[property]]
            name = "act"
            type = "Action"
            scope = "app"

            [[property]]
            name = "plain"
            type = "Plain"
            scope = "app"

            [[function]]
            name = "invoke"
            owner = "Action"
            params = ["x: Int"]
            operator = true

            [[function]]
            name = "invoke"
            owner = "Plain"
            params = ["x: Int"]

            [[call]]
            name = "handler"
            args = ["Int"]

            [[call]]
            name = "act"
            args = ["Int"]

            [[call]]
            name = "plain"
            args = ["Int"]
            "#,
        );

        let handler = callable(&fixture, "handler", 0);
        let (site, reference) = resolve(&fixture, 0);
        assert!(matches!(
            &reference,
            ResolvedReference::Resolved(candidate) if candidate.symbol
                == CandidateSymbol::Invoke { variable: handler, operator: None }
        ));
        assert_eq!(site.shape, CallShape::ImplicitInvoke { variable: handler });

        let act = callable(&fixture, "act", 0);
        let operator = callable(&fixture, "invoke", 0);
        let (_, reference) = resolve(&fixture, 1);
        assert!(matches!(
            &reference,
            ResolvedReference::Resolved(candidate) if candidate.symbol
                == CandidateSymbol::Invoke { variable: act, operator: Some(operator) }
        ));

        let (site, reference) = resolve(&fixture, 2);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::ConventionError,
                diagnostic: Some(D::OperatorModifierMissing),
            })
        ));
        assert_eq!(site.shape, CallShape::AsWritten);
    }

    #[test]
    fn direct_functions_outrank_invoked_values() {
        let fixture = fixture(
            r#"
            [[property]]
            name = "f"
            type = "(Int) -> Unit"
            scope = "app"

            [[function]]
            name = "f"
            params = ["x: Int"]
            scope = "app"

            [[property]]
            name = "g"
            type = "(Int) -> Unit"
            scope = "app"

            [[function]]
            name = "g"
            params = ["x: String"]
            scope = "app"

            [[call]]
            name = "f"
            args = ["Int"]

            [[call]]
            name = "g"
            args = ["Int"]
            "#,
        );
        let (property, function) = (callable(&fixture, "f", 0), callable(&fixture, "f", 1));

        let (_, reference) = resolve(&fixture, 0);
        assert!(resolves_to(&reference, function));

        let all = fixture
            .resolver(&BodyShapeAnalyzer)
            .collect_all_candidates(&fixture.calls[0].site)
            .unwrap();
        let summary = all
            .iter()
            .map(|overload| (overload.candidate.symbol, overload.in_best))
            .collect::<Vec<_>>();
        assert_eq!(
            summary,
            vec![
                (CandidateSymbol::Callable(function), true),
                (CandidateSymbol::Invoke { variable: property, operator: None }, false),
            ]
        );

        // the value is still invoked when the function does not apply
        let g = callable(&fixture, "g", 0);
        let (_, reference) = resolve(&fixture, 1);
        assert!(matches!(
            &reference,
            ResolvedReference::Resolved(candidate)
                if candidate.symbol == CandidateSymbol::Invoke { variable: g, operator: None }
        ));
    }

    #[test]
    fn functional_interfaces_accept_converted_arguments() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Runnable"
            kind = "fun-interface"
            scope = "app"

            [[function]]
            name = "run"
            owner = "Runnable"
            abstract = true

            [[function]]
            name = "submit"
            params = ["task: Runnable"]
            scope = "app"

            [[call]]
            name = "submit"
            args = ["{ Unit }"]

            [[call]]
            name = "submit"
            args = ["() -> Unit"]
            "#,
        );
        let submit = callable(&fixture, "submit", 0);

        for index in 0..2 {
            let (_, reference) = resolve(&fixture, index);
            assert!(reference.is_success());
            assert!(reference.error().is_none());

            let candidate = reference.candidate().unwrap();
            assert_eq!(candidate.declaration(), Some(submit));
            assert_eq!(candidate.applicability(), A::ResolvedWithSyntheticConversion);
            assert!(candidate
                .diagnostics()
                .contains(&D::SyntheticConversion { argument: 0 }));
        }
    }

    #[test]
    fn classifiers_without_constructors_are_not_callable() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Empty"
            scope = "app"

            [[call]]
            name = "Empty"
            "#,
        );
        let session = &fixture.session;
        let empty = session
            .find_class(session.interner.get("Empty").unwrap())
            .unwrap();

        let (_, reference) = resolve(&fixture, 0);
        assert!(matches!(
            &reference,
            ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(candidate),
                error: ResolutionError::ResolutionToClassifier { class },
            } if *class == empty && candidate.symbol == CandidateSymbol::Qualifier(empty)
        ));
    }

    #[test]
    fn constants_cannot_be_invoked() {
        let fixture = fixture(
            r#"
            [[call]]
            name = "invoke"
            receiver = "const Int"

            [[call]]
            name = "invoke"
            receiver = "Int"
            "#,
        );

        let (_, constant) = resolve(&fixture, 0);
        assert!(matches!(
            constant.error(),
            Some(ResolutionError::FunctionExpected { ty, .. }) if *ty == Ty::Prim(PrimTy::Int)
        ));
        assert!(constant.candidate().is_none());

        let invoke = fixture.session.names.invoke;
        let (_, value) = resolve(&fixture, 1);
        assert_eq!(value, ResolvedReference::Unresolved(invoke));
    }

    #[test]
    fn overloaded_fallbacks_report_one_shape_error() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "compute"
            params = ["x: Int"]
            scope = "app"

            [[function]]
            name = "compute"
            params = ["x: String"]
            scope = "app"

            [[call]]
            name = "compute"
            kind = "variable-access"
            "#,
        );
        let overloads = fixture.callable_named("compute");
        let mut sink = CollectingSink::default();
        let (_, reference) = fixture
            .resolve_call(0, &BodyShapeAnalyzer, &mut sink)
            .unwrap();

        assert!(matches!(
            &reference,
            ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(candidate),
                error: ResolutionError::FunctionCallExpected { .. },
            } if candidate.declaration().is_some_and(|id| overloads.contains(&id))
        ));
        assert_eq!(sink.reports.len(), 1);
    }

    #[test]
    fn classifiers_resolve_as_qualifiers_and_constructors() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Config"
            scope = "app"

            [[constructor]]
            owner = "Config"
            params = ["x: Int"]

            [[call]]
            name = "Config"
            kind = "variable-access"

            [[call]]
            name = "Config"
            args = ["Int"]
            "#,
        );
        let session = &fixture.session;
        let config = session
            .find_class(session.interner.get("Config").unwrap())
            .unwrap();

        let (site, qualifier) = resolve(&fixture, 0);
        assert!(matches!(
            &qualifier,
            ResolvedReference::Resolved(candidate)
                if candidate.symbol == CandidateSymbol::Qualifier(config)
        ));
        assert_eq!(site.shape, CallShape::Qualifier(config));

        let (_, constructor) = resolve(&fixture, 1);
        assert!(resolves_to(&constructor, session.class(config).constructors[0]));
    }

    // CALLABLE REFERENCES

    #[test]
    fn callable_reference_follows_its_expected_type() {
        let fixture = fixture(&format!(
            "{OVERLOADS}\n[[call]]\nname = \"f\"\nkind = \"callable-reference\"\n\
             expected = \"(Int) -> Unit\"\n"
        ));
        let (_, reference) = resolve(&fixture, 0);

        let f_int = callable(&fixture, "f", 0);
        assert!(matches!(
            &reference,
            ResolvedReference::ResolvedWithPendingCompletion(candidate)
                if candidate.declaration() == Some(f_int)
        ));
    }

    #[test]
    fn callable_reference_without_context_stays_ambiguous() {
        let fixture = fixture(&format!(
            "{OVERLOADS}\n[[call]]\nname = \"f\"\nkind = \"callable-reference\"\n"
        ));
        let resolver = fixture.resolver(&BodyShapeAnalyzer);
        let mut atom = CallableReferenceAtom::new(fixture.calls[0].site.clone(), None);
        let mut outer = ConstraintSystem::new();
        let mut sink = CollectingSink::default();

        let first = resolver
            .resolve_callable_reference(&mut atom, &mut outer, &mut sink)
            .unwrap();
        assert_eq!(first, (A::Resolved, true));
        assert!(atom.postponed);
        assert!(atom.site.resolved().is_none());

        let second = resolver
            .resolve_callable_reference(&mut atom, &mut outer, &mut sink)
            .unwrap();
        assert_eq!(second, (A::Resolved, false));
        assert!(matches!(
            atom.site.resolved(),
            Some(ResolvedReference::Ambiguous { candidates, .. }) if candidates.len() == 2
        ));
    }

    #[test]
    fn postponed_callable_reference_uses_what_the_outer_call_learned() {
        let fixture = fixture(&format!(
            "{OVERLOADS}\n[[call]]\nname = \"f\"\nkind = \"callable-reference\"\n"
        ));
        let session = &fixture.session;
        let resolver = fixture.resolver(&BodyShapeAnalyzer);

        let mut outer = ConstraintSystem::new();
        let var = Arc::new(Ty::Var(outer.fresh_var(None)));
        let expected = Ty::function([var.clone()], Ty::prim(PrimTy::Unit));
        let mut atom =
            CallableReferenceAtom::new(fixture.calls[0].site.clone(), Some(expected));
        let mut sink = CollectingSink::default();

        let (_, postponed) = resolver
            .resolve_callable_reference(&mut atom, &mut outer, &mut sink)
            .unwrap();
        assert!(postponed);

        // another argument of the outer call fixes the parameter type
        assert!(outer.add_subtype_constraint(session, &Ty::prim(PrimTy::String), &var));
        assert!(outer.run_completion(session, CompletionMode::Full, &[]));

        let (applicability, postponed) = resolver
            .resolve_callable_reference(&mut atom, &mut outer, &mut sink)
            .unwrap();
        assert_eq!(applicability, A::Resolved);
        assert!(!postponed);

        let f_string = callable(&fixture, "f", 1);
        assert!(matches!(
            atom.site.resolved(),
            Some(ResolvedReference::ResolvedWithPendingCompletion(candidate))
                if candidate.declaration() == Some(f_string)
        ));
        assert!(sink.reports.is_empty());
    }

    // IMPLICITLY NAMED CALLEES

    #[test]
    fn delegating_constructor_calls() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Base"
            type-params = ["T"]
            scope = "app"

            [[constructor]]
            owner = "Base"
            params = ["value: T"]

            [[constructor]]
            owner = "Base"
            params = ["value: T", "extra: Int"]

            [[call]]
            kind = "delegating-constructor-call"
            constructed = "Base<String>"
            args = ["String"]

            [[call]]
            kind = "delegating-constructor-call"
            constructed = "Base<String>"
            args = ["Int"]

            [[call]]
            kind = "delegating-constructor-call"
            args = ["String"]
            "#,
        );
        let first = callable(&fixture, "<init>", 0);

        let (_, reference) = resolve(&fixture, 0);
        assert!(resolves_to(&reference, first));

        let (_, reference) = resolve(&fixture, 1);
        assert!(matches!(
            &reference,
            ResolvedReference::ErrorWithBestEffortCandidate {
                candidate: Some(candidate),
                error: ResolutionError::Inapplicable {
                    applicability: A::Inapplicable,
                    ..
                },
            } if candidate.declaration() == Some(first)
        ));

        let (_, reference) = resolve(&fixture, 2);
        assert_eq!(reference.error(), Some(ResolutionError::UnresolvedSupertype));
    }

    #[test]
    fn annotation_calls() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Marker"
            kind = "annotation"
            scope = "app"

            [[class]]
            name = "Plain"
            scope = "app"

            [[constructor]]
            owner = "Marker"
            params = ["value: String"]

            [[call]]
            name = "Marker"
            kind = "annotation"
            args = ["String"]

            [[call]]
            name = "Plain"
            kind = "annotation"

            [[call]]
            name = "Missing"
            kind = "annotation"
            "#,
        );

        let (_, reference) = resolve(&fixture, 0);
        assert!(resolves_to(&reference, callable(&fixture, "<init>", 0)));

        let (_, reference) = resolve(&fixture, 1);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::IllegalAnnotation { .. })
        ));

        let (_, reference) = resolve(&fixture, 2);
        assert!(matches!(reference, ResolvedReference::Unresolved(_)));
    }

    #[test]
    fn inner_class_constructors_need_an_outer_receiver() {
        let decls = r#"
            [[class]]
            name = "Outer"
            scope = "app"

            [[class]]
            name = "Inner"
            inner = true
            scope = "app"

            [[constructor]]
            owner = "Inner"

            [[call]]
            name = "Inner"
        "#;

        let without = fixture(decls);
        let (_, reference) = resolve(&without, 0);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::InapplicableWrongReceiver,
                diagnostic: Some(D::ReceiverRequired),
            })
        ));

        let within = fixture(&format!("{decls}\n[context]\nreceivers = [\"Outer\"]\n"));
        let (_, reference) = resolve(&within, 0);
        assert!(resolves_to(&reference, callable(&within, "<init>", 0)));
    }

    #[test]
    fn extensions_check_their_receiver() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "shout"
            receiver = "String"
            scope = "app"

            [context]
            receivers = ["String"]

            [[call]]
            name = "shout"
            receiver = "String"

            [[call]]
            name = "shout"
            receiver = "Int"

            [[call]]
            name = "shout"
            "#,
        );
        let shout = callable(&fixture, "shout", 0);

        let (_, explicit) = resolve(&fixture, 0);
        assert!(resolves_to(&explicit, shout));

        let (_, mismatched) = resolve(&fixture, 1);
        assert!(matches!(
            mismatched.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::InapplicableWrongReceiver,
                diagnostic: Some(D::ReceiverTypeMismatch { .. }),
            })
        ));

        let (_, implicit) = resolve(&fixture, 2);
        assert!(resolves_to(&implicit, shout));
    }

    // GATING

    const GATED: &str = r#"
        [[class]]
        name = "Vault"
        scope = "app"

        [[function]]
        name = "modern"
        since = "3.0.0"
        scope = "app"

        [[function]]
        name = "experimental"
        opt-in = "Lab"
        scope = "app"

        [[function]]
        name = "secret"
        owner = "Vault"
        visibility = "private"

        [[call]]
        name = "modern"

        [[call]]
        name = "experimental"

        [[call]]
        name = "secret"
        receiver = "Vault"
    "#;

    #[test]
    fn declarations_gated_by_default_settings() {
        let fixture = fixture(GATED);

        let (_, modern) = resolve(&fixture, 0);
        assert!(matches!(
            modern.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::Hidden,
                diagnostic: Some(D::NotYetAvailable { .. }),
            })
        ));

        let (_, experimental) = resolve(&fixture, 1);
        assert!(experimental.is_success());
        assert_eq!(
            experimental.candidate().unwrap().applicability(),
            A::UnstableApi
        );

        let (_, secret) = resolve(&fixture, 2);
        assert!(matches!(
            secret.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::VisibilityError,
                diagnostic: Some(D::Invisible { .. }),
            })
        ));
    }

    #[test]
    fn settings_and_context_lift_the_gates() {
        let fixture = fixture(&format!(
            "{GATED}\n[settings]\napi-version = \"3.1.0\"\nopt-in = [\"Lab\"]\n\n\
             [context]\ncontaining = [\"Vault\"]\n"
        ));

        for (index, name) in ["modern", "experimental", "secret"].into_iter().enumerate() {
            let (_, reference) = resolve(&fixture, index);
            assert!(resolves_to(&reference, callable(&fixture, name, 0)));
            assert_eq!(reference.candidate().unwrap().applicability(), A::Resolved);
        }
    }

    #[test]
    fn explicit_settings_override_the_fixture() {
        let src = format!(
            "[[scope]]\nname = \"app\"\nkind = \"package\"\n{GATED}\n\
             [settings]\napi-version = \"3.1.0\"\n"
        );
        let settings = LanguageSettings {
            api_version: semver::Version::new(2, 5, 0),
            ..LanguageSettings::default()
        };
        let fixture = Fixture::parse(&src, Some(settings)).unwrap();

        let (_, modern) = resolve(&fixture, 0);
        assert!(!modern.is_success());
    }

    #[test]
    fn protected_members_are_visible_from_subclasses() {
        const MEMBERS: &str = r#"
            [[class]]
            name = "Base"
            scope = "app"

            [[class]]
            name = "Derived"
            supertypes = ["Base"]
            scope = "app"

            [[function]]
            name = "reset"
            owner = "Base"
            visibility = "protected"

            [[call]]
            name = "reset"
            receiver = "Base"
        "#;

        let inside = fixture(&format!("[context]\ncontaining = [\"Derived\"]\n{MEMBERS}"));
        let (_, reference) = resolve(&inside, 0);
        assert!(resolves_to(&reference, callable(&inside, "reset", 0)));

        let outside = fixture(MEMBERS);
        let (_, reference) = resolve(&outside, 0);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::VisibilityError,
                diagnostic: Some(D::Invisible {
                    visibility: Visibility::Protected
                }),
            })
        ));
    }

    #[test]
    fn explicit_type_arguments_are_checked() {
        let fixture = fixture(
            r#"
            [[class]]
            name = "Animal"
            scope = "app"

            [[class]]
            name = "Cat"
            supertypes = ["Animal"]
            scope = "app"

            [[function]]
            name = "adopt"
            type-params = ["T : Animal"]
            returns = "T"
            scope = "app"

            [[function]]
            name = "describe"
            type-params = ["reified T"]
            returns = "String"
            scope = "app"

            [[function]]
            name = "outer"
            type-params = ["U", "reified R"]
            scope = "app"

            [context]
            containing = ["outer"]

            [[call]]
            name = "adopt"
            type-args = ["Cat"]

            [[call]]
            name = "adopt"
            type-args = ["String"]

            [[call]]
            name = "describe"
            type-args = ["U"]

            [[call]]
            name = "describe"
            type-args = ["R"]
            "#,
        );
        let adopt = callable(&fixture, "adopt", 0);
        let describe = callable(&fixture, "describe", 0);
        let applies = |reference: &ResolvedReference, id| {
            reference.is_success()
                && reference.candidate().is_some_and(|c| c.declaration() == Some(id))
        };

        let (_, reference) = resolve(&fixture, 0);
        assert!(applies(&reference, adopt));

        let (_, reference) = resolve(&fixture, 1);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::Inapplicable,
                diagnostic: Some(D::TypeArgumentBoundViolated { arg, .. }),
            }) if *arg == Ty::Prim(PrimTy::String)
        ));

        let (_, reference) = resolve(&fixture, 2);
        assert!(matches!(
            reference.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::Inapplicable,
                diagnostic: Some(D::NonReifiedTypeArgument { .. }),
            })
        ));

        let (_, reference) = resolve(&fixture, 3);
        assert!(applies(&reference, describe));
    }

    #[test]
    fn operator_syntax_needs_operator_functions() {
        let fixture = fixture(
            r#"
            [[property]]
            name = "handler"
            type = "(Int) -> Unit"
            scope = "app"

            [[function]]
            name = "plus"
            params = ["x: Int"]
            scope = "app"

            [[function]]
            name = "minus"
            params = ["x: Int"]
            operator = true
            scope = "app"

            [[call]]
            name = "handler"
            args = ["Int"]
            operator = true

            [[call]]
            name = "plus"
            args = ["Int"]
            operator = true

            [[call]]
            name = "minus"
            args = ["Int"]
            operator = true
            "#,
        );

        let (_, property) = resolve(&fixture, 0);
        assert!(matches!(
            property.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::ConventionError,
                diagnostic: Some(D::PropertyAsOperator),
            })
        ));

        let (_, plain) = resolve(&fixture, 1);
        assert!(matches!(
            plain.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::ConventionError,
                diagnostic: Some(D::OperatorModifierMissing),
            })
        ));

        let (_, operator) = resolve(&fixture, 2);
        assert!(resolves_to(&operator, callable(&fixture, "minus", 0)));
    }

    // SPECIFICITY

    #[test]
    fn simpler_shapes_and_concrete_types_win() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "spread"
            params = ["x: Int"]
            scope = "app"

            [[function]]
            name = "spread"
            params = ["vararg xs: Int"]
            scope = "app"

            [[function]]
            name = "defaults"
            params = ["x: Int"]
            scope = "app"

            [[function]]
            name = "defaults"
            params = ["x: Int", "y: Int = _"]
            scope = "app"

            [[function]]
            name = "generic"
            params = ["x: Int"]
            scope = "app"

            [[function]]
            name = "generic"
            type-params = ["T"]
            params = ["x: T"]
            scope = "app"

            [[call]]
            name = "spread"
            args = ["Int"]

            [[call]]
            name = "defaults"
            args = ["Int"]

            [[call]]
            name = "generic"
            args = ["Int"]
            "#,
        );

        for (index, name) in ["spread", "defaults", "generic"].into_iter().enumerate() {
            let (_, reference) = resolve(&fixture, index);
            assert!(
                resolves_to(&reference, callable(&fixture, name, 0)),
                "{name}: {reference:?}"
            );
        }
    }

    #[test]
    fn shadowed_declarations_are_collected_but_not_chosen() {
        let fixture = fixture(
            r#"
            [[scope]]
            name = "block"
            kind = "local"

            [[function]]
            name = "f"
            returns = "Int"
            scope = "block"

            [[function]]
            name = "f"
            returns = "String"
            scope = "app"

            [[call]]
            name = "f"
            "#,
        );
        let (local, package) = (callable(&fixture, "f", 0), callable(&fixture, "f", 1));

        let (_, reference) = resolve(&fixture, 0);
        assert!(resolves_to(&reference, local));

        let all = fixture
            .resolver(&BodyShapeAnalyzer)
            .collect_all_candidates(&fixture.calls[0].site)
            .unwrap();
        let summary = all
            .iter()
            .map(|overload| (overload.candidate.declaration(), overload.in_best))
            .collect::<Vec<_>>();
        assert_eq!(summary, vec![(Some(local), true), (Some(package), false)]);
    }

    // COMPLETION

    #[test]
    fn independent_calls_are_completed() {
        let fixture = fixture(
            r#"
            [[function]]
            name = "id"
            type-params = ["T"]
            params = ["x: T"]
            returns = "T"
            scope = "app"

            [[function]]
            name = "make"
            type-params = ["T"]
            returns = "T"
            scope = "app"

            [[call]]
            name = "id"
            args = ["Int"]

            [[call]]
            name = "id"
            args = ["Int"]
            dependent = true

            [[call]]
            name = "make"

            [[call]]
            name = "id"
            args = ["Int"]
            type-args = ["Int", "Int"]
            "#,
        );

        let (_, independent) = resolve(&fixture, 0);
        let ResolvedReference::Resolved(candidate) = &independent else {
            panic!("expected a completed call, found {independent:?}");
        };
        let solution = candidate.solution.as_ref().unwrap();
        assert_eq!(
            solution.apply(&candidate.instantiate(&candidate.signature.ret)),
            Ty::prim(PrimTy::Int)
        );

        let (_, dependent) = resolve(&fixture, 1);
        assert!(matches!(
            dependent,
            ResolvedReference::ResolvedWithPendingCompletion(_)
        ));

        let (_, uninferable) = resolve(&fixture, 2);
        assert!(matches!(
            uninferable.error(),
            Some(ResolutionError::InferenceFailed(_))
        ));

        let (_, miscounted) = resolve(&fixture, 3);
        assert!(matches!(
            miscounted.error(),
            Some(ResolutionError::Inapplicable {
                applicability: A::InapplicableArgumentsMapping,
                diagnostic: Some(D::WrongTypeArgumentCount { expected: 1, actual: 2 }),
            })
        ));
    }

    // INVARIANTS

    #[test]
    fn entry_points_reject_the_wrong_call_kind() {
        let fixture = fixture("[[call]]\nname = \"f\"\nkind = \"implicit-invoke\"\n");
        let result = fixture.resolve_call(0, &BodyShapeAnalyzer, &mut CollectingSink::default());

        assert!(matches!(
            result,
            Err(InternalError::UnexpectedCallKind {
                kind: CallKind::ImplicitInvoke,
                ..
            })
        ));
    }

    #[test]
    fn resolution_is_deterministic_across_threads() {
        let fixture = fixture(&format!(
            "{OVERLOADS}\n[[call]]\nname = \"f\"\nargs = [\"Nothing\"]\n"
        ));

        let fixture = &fixture;
        let references = std::thread::scope(|scope| {
            let handles = (0..4)
                .map(|_| scope.spawn(move || resolve(fixture, 0).1))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(matches!(references[0], ResolvedReference::Ambiguous { .. }));
        assert!(references.iter().all(|reference| *reference == references[0]));
    }
}
