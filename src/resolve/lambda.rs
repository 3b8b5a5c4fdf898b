//! Breaking ties between overloads that differ only in what a lambda
//! argument returns.
//!
//! When several candidates are still applicable and each of them is waiting
//! on the same lambda, with the same parameter types, the lambda is
//! analyzed once and its result is tried against every candidate. The ones
//! whose systems stay consistent survive.

use std::sync::Arc;

use tracing::debug;

use crate::{
    call::{CallSite, CalleeReference},
    env::Session,
    infer::{CompletionMode, LambdaAnalyzer},
    ty::Ty,
};

use super::candidate::{Candidate, CandidateId};

/// Points the callee of a call site at candidates while the lambda is being
/// analyzed, and puts the original callee back when dropped.
struct CalleeGuard<'s> {
    site: &'s mut CallSite,
    original: Option<CalleeReference>,
}

impl<'s> CalleeGuard<'s> {
    fn new(site: &'s mut CallSite) -> Self {
        let original = Some(site.callee.clone());
        Self { site, original }
    }

    fn point_at(&mut self, candidate: CandidateId) {
        self.site.callee = CalleeReference::Transient(candidate);
    }
}

impl Drop for CalleeGuard<'_> {
    fn drop(&mut self) {
        if let Some(original) = self.original.take() {
            self.site.callee = original;
        }
    }
}

#[derive(Clone, Copy)]
pub struct LambdaDisambiguator<'a> {
    session: &'a Session,
    analyzer: &'a dyn LambdaAnalyzer,
}

impl<'a> LambdaDisambiguator<'a> {
    pub fn new(session: &'a Session, analyzer: &'a dyn LambdaAnalyzer) -> Self {
        Self { session, analyzer }
    }

    /// Narrows `candidates` by the return type of their shared lambda. If
    /// the candidates do not share a lambda, they are returned unchanged.
    pub fn reduce(
        &self,
        site: &mut CallSite,
        candidates: Vec<Candidate>,
    ) -> Vec<Candidate> {
        let Some(positions) = shared_lambda(&candidates) else {
            return candidates;
        };

        let mut systems = candidates
            .iter()
            .map(|candidate| candidate.system.clone().unwrap_or_default())
            .collect::<Vec<_>>();

        // the lambda can only be analyzed once if every candidate would
        // hand it the same parameter types
        let inputs = candidates
            .iter()
            .zip(&mut systems)
            .zip(&positions)
            .map(|((candidate, cs), &position)| {
                let lambda = &candidate.postponed[position];
                let mut focus = Vec::new();
                if let Some((domain, _)) = lambda.expected.fn_shape() {
                    domain.iter().for_each(|ty| ty.collect_vars(&mut focus));
                }

                cs.run_completion(self.session, CompletionMode::Partial, &focus);
                cs.lambda_input_tys(lambda)
                    .filter(|tys| tys.iter().all(|ty| ty.is_proper()))
            })
            .collect::<Option<Vec<_>>>();

        let Some(inputs) = inputs else {
            debug!("the lambda's parameter types are not known yet");
            return candidates;
        };

        if inputs.iter().any(|tys| *tys != inputs[0]) {
            debug!("candidates disagree on the lambda's parameter types");
            return candidates;
        }

        let mut guard = CalleeGuard::new(site);

        guard.point_at(candidates[0].id);
        let first = &candidates[0].postponed[positions[0]];
        let expected_return = systems[0]
            .substitute(&first.expected)
            .fn_shape()
            .map(|(_, codomain)| codomain.clone())
            .unwrap_or_else(|| Arc::new(Ty::Error));
        let result =
            self.analyzer
                .analyze_lambda(&first.lambda, &inputs[0], &expected_return);

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        for ((mut candidate, mut cs), position) in
            candidates.into_iter().zip(systems).zip(positions)
        {
            guard.point_at(candidate.id);
            let mut lambda = candidate.postponed[position].clone();
            let consistent = cs.apply_results_of_analyzed_lambda(
                self.session,
                &mut lambda,
                &result,
            ) && cs.run_completion(self.session, CompletionMode::Full, &[]);

            match consistent {
                true => {
                    candidate.postponed[position] = lambda;
                    candidate.system = Some(cs);
                    succeeded.push(candidate);
                }
                false => failed.push(candidate),
            }
        }
        drop(guard);

        debug!(
            succeeded = succeeded.len(),
            failed = failed.len(),
            "disambiguated by lambda return type"
        );

        let remaining = match succeeded.is_empty() {
            true => failed,
            false => succeeded,
        };

        self.prefer_marked(remaining)
    }

    /// Keeps only the candidates declared to win such ties, if there are
    /// any.
    fn prefer_marked(&self, candidates: Vec<Candidate>) -> Vec<Candidate> {
        if candidates.len() <= 1 {
            return candidates;
        }

        let is_marked = |candidate: &Candidate| {
            candidate.declaration().is_some_and(|id| {
                self.session
                    .callable(id)
                    .modifiers
                    .prefers_by_lambda_return
            })
        };

        match candidates.iter().any(is_marked) {
            true => candidates.into_iter().filter(is_marked).collect(),
            false => candidates,
        }
    }
}

/// For candidates that all wait on exactly one lambda, the same one, with
/// the same number of parameters, returns where that lambda sits in each
/// candidate's postponed list.
fn shared_lambda(candidates: &[Candidate]) -> Option<Vec<usize>> {
    if candidates.len() < 2
        || !candidates.iter().all(|candidate| {
            candidate.is_successful() && candidate.system.is_some()
        })
    {
        return None;
    }

    let mut shared = None;
    let mut positions = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let mut pending = candidate
            .postponed
            .iter()
            .enumerate()
            .filter(|(_, lambda)| !lambda.analyzed);

        let (position, lambda) = pending.next()?;
        if pending.next().is_some() {
            return None;
        }

        let arity = lambda.expected.fn_shape()?.0.len();
        match shared {
            None => shared = Some((lambda.lambda.id, arity)),
            Some(shared) if shared == (lambda.lambda.id, arity) => (),
            Some(_) => return None,
        }

        positions.push(position);
    }

    Some(positions)
}
