//! Choosing the most specific of several applicable candidates.
//!
//! The resolver here is a pure function of its inputs: it never mutates a
//! candidate, and every specificity check runs in a throwaway constraint
//! system. Results come back as indices into the slice it was given.

use std::sync::Arc;

use crate::{
    config::LanguageSettings,
    env::Session,
    infer::ConstraintSystem,
    ty::{Ty, substitute_params},
};

use super::candidate::{ApplicabilityLevel, Candidate};

/// The outcome of [`ConflictResolver::reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub applicability: ApplicabilityLevel,
    /// Indices of the surviving candidates, in their original order.
    pub chosen: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    discriminate_generics: bool,
}

impl ConflictResolver {
    pub fn new(settings: &LanguageSettings) -> Self {
        Self {
            discriminate_generics: settings.discriminate_generics,
        }
    }

    /// Keeps the candidates at the least severe applicability level and,
    /// if they are successful, narrows them down to the most specific ones.
    pub fn reduce(
        &self,
        session: &Session,
        candidates: &[Candidate],
        discriminate_abstracts: bool,
    ) -> Reduction {
        let Some(best) = candidates.iter().map(Candidate::applicability).min()
        else {
            return Reduction {
                applicability: ApplicabilityLevel::Unsupported,
                chosen: Vec::new(),
            };
        };

        let group = (0..candidates.len())
            .filter(|&index| candidates[index].applicability() == best)
            .collect::<Vec<_>>();

        let chosen = match best.is_success() {
            true => self.choose_maximally_specific(
                session,
                candidates,
                group,
                discriminate_abstracts,
            ),
            false => group,
        };

        Reduction {
            applicability: best,
            chosen,
        }
    }

    /// Narrows `group` (indices into `candidates`) down to the candidates
    /// no other member of the group is strictly more specific than.
    pub fn choose_maximally_specific(
        &self,
        session: &Session,
        candidates: &[Candidate],
        group: Vec<usize>,
        discriminate_abstracts: bool,
    ) -> Vec<usize> {
        if group.len() <= 1 {
            return group;
        }

        let group = filter_equivalent(candidates, group);
        let group = filter_overridden(session, candidates, group);
        if group.len() <= 1 {
            return group;
        }

        let maximal = group
            .iter()
            .copied()
            .filter(|&index| {
                group.iter().all(|&other| {
                    other == index
                        || !self.is_more_specific(
                            session,
                            &candidates[other],
                            &candidates[index],
                        )
                })
            })
            .collect::<Vec<_>>();

        let maximal = prefer_simplest_shape(candidates, maximal);

        if discriminate_abstracts && maximal.len() > 1 {
            let concrete = maximal
                .iter()
                .copied()
                .filter(|&index| !candidates[index].is_abstract(session))
                .collect::<Vec<_>>();

            if !concrete.is_empty() {
                return concrete;
            }
        }

        maximal
    }

    /// Returns `true` if `a` is strictly more specific than `b`.
    fn is_more_specific(
        &self,
        session: &Session,
        a: &Candidate,
        b: &Candidate,
    ) -> bool {
        if !is_not_less_specific(session, a, b) {
            return false;
        }

        if !is_not_less_specific(session, b, a) {
            return true;
        }

        // equally specific; a non-generic candidate wins over a generic one
        self.discriminate_generics && !a.is_generic() && b.is_generic()
    }
}

/// Returns `true` if every argument `a` accepts would also be accepted by
/// `b`, with the type parameters of `b` free to be chosen.
fn is_not_less_specific(session: &Session, a: &Candidate, b: &Candidate) -> bool {
    let mut cs = ConstraintSystem::new();
    let b_substitution = cs.instantiate(session, &b.signature.ty_params);
    let fits = |cs: &mut ConstraintSystem, a_ty: &Arc<Ty>, b_ty: &Arc<Ty>| {
        let b_ty = substitute_params(b_ty, &b_substitution);
        cs.try_add_subtype_constraint(session, a_ty, &b_ty)
    };

    if let (Some(a_receiver), Some(b_receiver)) =
        (&a.signature.receiver, &b.signature.receiver)
    {
        if !fits(&mut cs, a_receiver, b_receiver) {
            return false;
        }
    }

    (0..a.call.args.len()).all(|argument| {
        match (a.param_ty_of(argument), b.param_ty_of(argument)) {
            (Some(a_ty), Some(b_ty)) => fits(&mut cs, a_ty, b_ty),
            _ => true,
        }
    })
}

/// Drops candidates that bind the call exactly like an earlier one.
fn filter_equivalent(candidates: &[Candidate], group: Vec<usize>) -> Vec<usize> {
    let mut kept: Vec<usize> = Vec::with_capacity(group.len());
    for index in group {
        let key = candidates[index].key();
        if !kept.iter().any(|&other| candidates[other].key() == key) {
            kept.push(index);
        }
    }

    kept
}

/// Drops candidates that another member of the group overrides.
fn filter_overridden(
    session: &Session,
    candidates: &[Candidate],
    group: Vec<usize>,
) -> Vec<usize> {
    group
        .iter()
        .copied()
        .filter(|&index| {
            let Some(overridden) = candidates[index].declaration() else {
                return true;
            };

            !group.iter().any(|&other| {
                candidates[other]
                    .declaration()
                    .is_some_and(|id| session.overrides(id, overridden))
            })
        })
        .collect()
}

/// Among otherwise equally good candidates, prefers calls that need no
/// vararg packing, then calls that rely on fewer default values.
fn prefer_simplest_shape(candidates: &[Candidate], group: Vec<usize>) -> Vec<usize> {
    if group.len() <= 1 {
        return group;
    }

    let shape = |index: usize| {
        candidates[index]
            .mapping
            .as_ref()
            .map(|mapping| (mapping.uses_varargs, mapping.defaults_used))
            .unwrap_or_default()
    };

    let Some(best) = group.iter().map(|&index| shape(index)).min() else {
        return group;
    };

    group
        .into_iter()
        .filter(|&index| shape(index) == best)
        .collect()
}
