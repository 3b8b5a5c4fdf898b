//! The constraint system driven by the resolver.
//!
//! Each candidate that needs inference owns one [`ConstraintSystem`]. The
//! system records subtyping constraints on inference variables as lower and
//! upper bounds, and fixes variables to concrete types when the resolver asks
//! for completion. Variables and their bounds live in an [`ena`] unification
//! table, which gives us cheap snapshots: every constraint is added inside a
//! transaction that is rolled back if it turns out to be inconsistent.
//!
//! The resolver never looks at bounds directly. It only uses
//! [`ConstraintSystem::run_transaction`], the constraint entry points,
//! [`ConstraintSystem::build_current_substitutor`], [`ConstraintSystem::run_completion`]
//! and the lambda entry points.

use std::{collections::HashMap, sync::Arc};

use ena::unify::{InPlace, NoError, UnificationTable, UnifyKey, UnifyValue};
use tracing::trace;

use crate::{
    call::{LambdaArgument, LambdaBody},
    env::{Session, TyParam},
    ty::{ParamSubstitution, ParamTy, Ty, map_leaves, substitute_params},
};

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct TyVar(u32);

impl UnifyKey for TyVar {
    type Value = VarBounds;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        Self(u)
    }

    fn tag() -> &'static str {
        "TyVar"
    }
}

/// Everything known about an inference variable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarBounds {
    pub lower: Vec<Arc<Ty>>,
    pub upper: Vec<Arc<Ty>>,
    pub fixed: Option<Arc<Ty>>,
}

impl UnifyValue for VarBounds {
    type Error = NoError;

    fn unify_values(a: &Self, b: &Self) -> Result<Self, NoError> {
        let mut merged = a.clone();
        for ty in &b.lower {
            if !merged.lower.contains(ty) {
                merged.lower.push(ty.clone());
            }
        }
        for ty in &b.upper {
            if !merged.upper.contains(ty) {
                merged.upper.push(ty.clone());
            }
        }
        merged.fixed = a.fixed.clone().or_else(|| b.fixed.clone());
        Ok(merged)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceError {
    NotASubtype { sub: Arc<Ty>, sup: Arc<Ty> },
    CannotInfer { var: TyVar, param: Option<ParamTy> },
    BoundViolated { var: TyVar, ty: Arc<Ty>, bound: Arc<Ty> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionMode {
    /// Fix only the given variables, and only if their bounds allow it.
    Partial,
    /// Fix every variable, reporting those that cannot be inferred.
    Full,
}

/// A snapshot of the fixed variables of a [`ConstraintSystem`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitutor {
    fixed: HashMap<TyVar, Arc<Ty>>,
}

impl Substitutor {
    pub fn apply(&self, ty: &Arc<Ty>) -> Arc<Ty> {
        if self.fixed.is_empty() {
            return ty.clone();
        }

        map_leaves(ty, &mut |leaf| match leaf {
            Ty::Var(var) => self.fixed.get(var).cloned(),
            _ => None,
        })
    }

    pub fn get(&self, var: TyVar) -> Option<&Arc<Ty>> {
        self.fixed.get(&var)
    }

    pub fn is_empty(&self) -> bool {
        self.fixed.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintSystem {
    table: UnificationTable<InPlace<TyVar>>,
    /// The type parameter each variable was created for, indexed by
    /// variable.
    origins: Vec<Option<ParamTy>>,
    errors: Vec<InferenceError>,
}

impl Default for ConstraintSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstraintSystem {
    pub fn new() -> Self {
        Self {
            table: UnificationTable::new(),
            origins: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn errors(&self) -> &[InferenceError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn var_count(&self) -> usize {
        self.origins.len()
    }

    pub fn fresh_var(&mut self, origin: Option<ParamTy>) -> TyVar {
        let var = self.table.new_key(VarBounds::default());
        self.origins.push(origin);
        var
    }

    /// Creates a variable for each of `params` and constrains it by the
    /// parameter's bounds. Returns the substitution from the parameters to
    /// their variables.
    pub fn instantiate(
        &mut self,
        session: &Session,
        params: &[TyParam],
    ) -> ParamSubstitution {
        let substitution = params
            .iter()
            .map(|param| {
                let var = self.fresh_var(Some(param.ty));
                (param.ty.uid, Arc::new(Ty::Var(var)))
            })
            .collect::<ParamSubstitution>();

        for param in params {
            let var = substitution[&param.ty.uid].clone();
            for bound in param.bounds.iter() {
                let bound = substitute_params(bound, &substitution);
                self.add_subtype_constraint(session, &var, &bound);
            }
        }

        substitution
    }

    /// Runs `f` and keeps its effects only if it returns `true`.
    pub fn run_transaction(&mut self, f: impl FnOnce(&mut Self) -> bool) -> bool {
        let snapshot = self.table.snapshot();
        let errors = self.errors.len();

        if f(self) {
            self.table.commit(snapshot);
            true
        } else {
            self.table.rollback_to(snapshot);
            self.errors.truncate(errors);
            self.origins.truncate(self.table.len());
            false
        }
    }

    /// Runs `f` and always discards its effects.
    pub fn probe<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        let snapshot = self.table.snapshot();
        let errors = self.errors.len();
        let result = f(self);
        self.table.rollback_to(snapshot);
        self.errors.truncate(errors);
        self.origins.truncate(self.table.len());
        result
    }

    /// Adds `sub <: sup`. On failure the system is left unchanged apart
    /// from a recorded [`InferenceError`].
    pub fn add_subtype_constraint(
        &mut self,
        session: &Session,
        sub: &Arc<Ty>,
        sup: &Arc<Ty>,
    ) -> bool {
        let ok = self.run_transaction(|cs| cs.subtype(session, sub, sup));
        if !ok {
            trace!(?sub, ?sup, "rejected subtype constraint");
            self.errors.push(InferenceError::NotASubtype {
                sub: sub.clone(),
                sup: sup.clone(),
            });
        }
        ok
    }

    /// Adds `sub <: sup` if it is consistent with the system. Unlike
    /// [`ConstraintSystem::add_subtype_constraint`], a failure leaves no
    /// error behind.
    pub fn try_add_subtype_constraint(
        &mut self,
        session: &Session,
        sub: &Arc<Ty>,
        sup: &Arc<Ty>,
    ) -> bool {
        self.run_transaction(|cs| cs.subtype(session, sub, sup))
    }

    /// Checks `sub <: sup` without changing the system.
    pub fn is_subtype(
        &mut self,
        session: &Session,
        sub: &Arc<Ty>,
        sup: &Arc<Ty>,
    ) -> bool {
        self.probe(|cs| cs.subtype(session, sub, sup))
    }

    pub fn build_current_substitutor(&mut self) -> Substitutor {
        let mut fixed = HashMap::new();
        for index in 0..self.table.len() as u32 {
            let var = TyVar(index);
            if let Some(ty) = self.table.probe_value(var).fixed {
                fixed.insert(var, ty);
            }
        }

        Substitutor { fixed }
    }

    pub fn substitute(&mut self, ty: &Arc<Ty>) -> Arc<Ty> {
        self.build_current_substitutor().apply(ty)
    }

    // SUBTYPING

    fn subtype(&mut self, session: &Session, sub: &Arc<Ty>, sup: &Arc<Ty>) -> bool {
        let sub = self.shallow_resolve(sub);
        let sup = self.shallow_resolve(sup);

        match (sub.as_ref(), sup.as_ref()) {
            (Ty::Error, _) | (_, Ty::Error) => true,
            (Ty::Nothing, _) | (_, Ty::Any) => true,
            (Ty::Var(a), Ty::Var(b))
                if self.table.find(*a) == self.table.find(*b) =>
            {
                true
            }
            (Ty::Var(var), _) => self.add_upper_bound(session, *var, &sup),
            (_, Ty::Var(var)) => self.add_lower_bound(session, *var, &sub),
            (Ty::Prim(p), Ty::Prim(q)) => p == q,
            (Ty::Named { .. }, Ty::Named { class, args }) => {
                match session.supertype_as(&sub, *class) {
                    Some(viewed) => match viewed.as_ref() {
                        Ty::Named { args: viewed_args, .. } => viewed_args
                            .iter()
                            .zip(args.iter())
                            .all(|(a, b)| self.equal(session, a, b)),
                        _ => false,
                    },
                    None => false,
                }
            }
            (
                Ty::Fn {
                    domain: d1,
                    codomain: c1,
                },
                Ty::Fn {
                    domain: d2,
                    codomain: c2,
                },
            ) => {
                // parameters are contravariant, results covariant
                d1.len() == d2.len()
                    && d1
                        .iter()
                        .zip(d2.iter())
                        .all(|(p1, p2)| self.subtype(session, p2, p1))
                    && self.subtype(session, c1, c2)
            }
            (Ty::Param(p), Ty::Param(q)) if p == q => true,
            (Ty::Param(param), _) => session
                .bounds_of(*param)
                .iter()
                .any(|bound| self.run_transaction(|cs| cs.subtype(session, bound, &sup))),
            _ => false,
        }
    }

    fn equal(&mut self, session: &Session, a: &Arc<Ty>, b: &Arc<Ty>) -> bool {
        self.subtype(session, a, b) && self.subtype(session, b, a)
    }

    /// Replaces a fixed variable by its value.
    fn shallow_resolve(&mut self, ty: &Arc<Ty>) -> Arc<Ty> {
        match ty.as_ref() {
            Ty::Var(var) => self.table.probe_value(*var).fixed.unwrap_or_else(|| ty.clone()),
            _ => ty.clone(),
        }
    }

    fn add_upper_bound(&mut self, session: &Session, var: TyVar, ty: &Arc<Ty>) -> bool {
        let bounds = self.table.probe_value(var);
        if bounds.upper.contains(ty) {
            return true;
        }

        self.table.union_value(
            var,
            VarBounds {
                upper: vec![ty.clone()],
                ..VarBounds::default()
            },
        );

        bounds.lower.iter().all(|lower| self.subtype(session, lower, ty))
    }

    fn add_lower_bound(&mut self, session: &Session, var: TyVar, ty: &Arc<Ty>) -> bool {
        let bounds = self.table.probe_value(var);
        if bounds.lower.contains(ty) {
            return true;
        }

        self.table.union_value(
            var,
            VarBounds {
                lower: vec![ty.clone()],
                ..VarBounds::default()
            },
        );

        bounds.upper.iter().all(|upper| self.subtype(session, ty, upper))
    }

    // COMPLETION

    /// Fixes variables according to `mode`. In [`CompletionMode::Partial`]
    /// only the variables in `focus` are considered. Returns `true` if the
    /// system is free of errors afterwards.
    pub fn run_completion(
        &mut self,
        session: &Session,
        mode: CompletionMode,
        focus: &[TyVar],
    ) -> bool {
        let candidates = match mode {
            CompletionMode::Partial => focus.to_vec(),
            CompletionMode::Full => {
                (0..self.table.len() as u32).map(TyVar).collect()
            }
        };

        // fix whatever has proper bounds until nothing changes; fixing one
        // variable can make the bounds of another proper
        loop {
            let mut progress = false;
            for &var in &candidates {
                if self.is_fixed(var) {
                    continue;
                }

                if let Some(ty) = self.choose_fixation(session, var, false) {
                    self.fix(session, var, ty);
                    progress = true;
                }
            }

            if !progress {
                break;
            }
        }

        if mode == CompletionMode::Full {
            for &var in &candidates {
                if self.is_fixed(var) {
                    continue;
                }

                match self.choose_fixation(session, var, true) {
                    Some(ty) => self.fix(session, var, ty),
                    None => {
                        let param = self.origins.get(var.0 as usize).copied().flatten();
                        self.errors.push(InferenceError::CannotInfer { var, param });
                        self.fix(session, var, Arc::new(Ty::Error));
                    }
                }
            }
        }

        !self.has_errors()
    }

    pub fn is_fixed(&mut self, var: TyVar) -> bool {
        self.table.probe_value(var).fixed.is_some()
    }

    /// Picks a value for `var` from its proper bounds: the common supertype of
    /// its lower bounds, or failing that the most specific upper bound. If
    /// `eager` is set, bounds that still mention variables are ignored
    /// instead of blocking the choice.
    fn choose_fixation(&mut self, session: &Session, var: TyVar, eager: bool) -> Option<Arc<Ty>> {
        let bounds = self.table.probe_value(var);
        let substitutor = self.build_current_substitutor();
        let lower = bounds
            .lower
            .iter()
            .map(|ty| substitutor.apply(ty))
            .collect::<Vec<_>>();
        let upper = bounds
            .upper
            .iter()
            .map(|ty| substitutor.apply(ty))
            .collect::<Vec<_>>();

        let proper_lower = lower.iter().filter(|ty| ty.is_proper()).cloned().collect::<Vec<_>>();
        let proper_upper = upper.iter().filter(|ty| ty.is_proper()).cloned().collect::<Vec<_>>();

        let lower_ready = !proper_lower.is_empty() && (eager || proper_lower.len() == lower.len());
        let upper_ready = lower.is_empty()
            && !proper_upper.is_empty()
            && (eager || proper_upper.len() == upper.len());

        if lower_ready {
            Some(self.common_supertype(session, &proper_lower))
        } else if upper_ready {
            Some(self.common_subtype(session, &proper_upper))
        } else {
            None
        }
    }

    fn fix(&mut self, session: &Session, var: TyVar, ty: Arc<Ty>) {
        trace!(?var, ?ty, "fixing type variable");
        let bounds = self.table.probe_value(var);
        self.table.union_value(
            var,
            VarBounds {
                fixed: Some(ty.clone()),
                ..VarBounds::default()
            },
        );

        for lower in &bounds.lower {
            if !self.add_subtype_constraint(session, lower, &ty) {
                self.errors.push(InferenceError::BoundViolated {
                    var,
                    ty: ty.clone(),
                    bound: lower.clone(),
                });
            }
        }

        for upper in &bounds.upper {
            if !self.add_subtype_constraint(session, &ty, upper) {
                self.errors.push(InferenceError::BoundViolated {
                    var,
                    ty: ty.clone(),
                    bound: upper.clone(),
                });
            }
        }
    }

    /// The least common supertype of `tys` that this system can name.
    pub fn common_supertype(&mut self, session: &Session, tys: &[Arc<Ty>]) -> Arc<Ty> {
        let Some(first) = tys.first() else {
            return Arc::new(Ty::Nothing);
        };

        if tys.iter().all(|ty| ty == first) {
            return first.clone();
        }

        // one of the types might already be above all the others
        if let Some(top) = tys.iter().find(|&candidate| {
            tys.iter()
                .all(|ty| self.is_subtype(session, ty, candidate))
        }) {
            return top.clone();
        }

        // otherwise walk up from the first type, breadth-first
        let mut queue = std::collections::VecDeque::from(session.direct_supertypes(first));
        while let Some(st) = queue.pop_front() {
            if tys.iter().all(|ty| self.is_subtype(session, ty, &st)) {
                return st;
            }
            queue.extend(session.direct_supertypes(&st));
        }

        Ty::any()
    }

    fn common_subtype(&mut self, session: &Session, tys: &[Arc<Ty>]) -> Arc<Ty> {
        tys.iter()
            .find(|&candidate| {
                tys.iter().all(|ty| self.is_subtype(session, candidate, ty))
            })
            .or(tys.first())
            .cloned()
            .unwrap_or_else(Ty::any)
    }

    // LAMBDAS

    /// The parameter types `lambda` would be analyzed with, as far as they are
    /// currently known.
    pub fn lambda_input_tys(&mut self, lambda: &PostponedLambda) -> Option<Box<[Arc<Ty>]>> {
        let expected = self.substitute(&lambda.expected);
        expected.fn_shape().map(|(domain, _)| domain.into())
    }

    /// Fixes what can be fixed about the lambda's parameter types, then hands
    /// the lambda to `analyzer`.
    pub fn analyze_lambda(
        &mut self,
        session: &Session,
        analyzer: &dyn LambdaAnalyzer,
        lambda: &PostponedLambda,
    ) -> LambdaResult {
        let mut focus = Vec::new();
        if let Some((domain, _)) = lambda.expected.fn_shape() {
            domain.iter().for_each(|ty| ty.collect_vars(&mut focus));
        }
        self.run_completion(session, CompletionMode::Partial, &focus);

        let expected = self.substitute(&lambda.expected);
        let (inputs, expected_return) = match expected.fn_shape() {
            Some((domain, codomain)) => (domain.to_vec(), codomain.clone()),
            None => (Vec::new(), Arc::new(Ty::Error)),
        };

        analyzer.analyze_lambda(&lambda.lambda, &inputs, &expected_return)
    }

    /// Records what analysis found out about `lambda`: its return type must
    /// fit the expected one.
    pub fn apply_results_of_analyzed_lambda(
        &mut self,
        session: &Session,
        lambda: &mut PostponedLambda,
        result: &LambdaResult,
    ) -> bool {
        lambda.analyzed = true;
        match lambda.expected.fn_shape() {
            Some((_, codomain)) => {
                let codomain = codomain.clone();
                self.add_subtype_constraint(session, &result.return_ty, &codomain)
            }
            None => true,
        }
    }

    /// Drives a selected candidate's system to a full solution: lambdas are
    /// analyzed once their inputs are known, then every variable is fixed.
    pub fn complete(
        &mut self,
        session: &Session,
        analyzer: &dyn LambdaAnalyzer,
        postponed: &mut [PostponedLambda],
    ) -> bool {
        for lambda in postponed.iter_mut().filter(|lambda| !lambda.analyzed) {
            let result = self.analyze_lambda(session, analyzer, lambda);
            self.apply_results_of_analyzed_lambda(session, lambda, &result);
        }

        self.run_completion(session, CompletionMode::Full, &[])
    }
}

/// A lambda argument whose analysis waits until its parameter types are
/// known.
#[derive(Debug, Clone, PartialEq)]
pub struct PostponedLambda {
    /// The index of the argument in the call.
    pub argument: usize,
    pub lambda: Arc<LambdaArgument>,
    /// A function type, possibly mentioning variables of the owning system.
    pub expected: Arc<Ty>,
    pub analyzed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaResult {
    pub return_ty: Arc<Ty>,
}

/// Analyzes lambda bodies on behalf of the resolver.
///
/// This is the capability the surrounding body resolver hands to the call
/// resolver when the two are wired together.
pub trait LambdaAnalyzer {
    fn analyze_lambda(
        &self,
        lambda: &LambdaArgument,
        input_tys: &[Arc<Ty>],
        expected_return: &Arc<Ty>,
    ) -> LambdaResult;
}

/// Analyzes lambdas whose bodies are summarized by [`LambdaBody`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyShapeAnalyzer;

impl LambdaAnalyzer for BodyShapeAnalyzer {
    fn analyze_lambda(
        &self,
        lambda: &LambdaArgument,
        input_tys: &[Arc<Ty>],
        _expected_return: &Arc<Ty>,
    ) -> LambdaResult {
        let return_ty = match &lambda.body {
            LambdaBody::Returns(ty) => ty.clone(),
            LambdaBody::ReturnsParam(index) => input_tys
                .get(*index)
                .cloned()
                .unwrap_or_else(|| Arc::new(Ty::Error)),
        };

        LambdaResult { return_ty }
    }
}
