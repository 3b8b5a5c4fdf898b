//! The type language seen by the resolver.
//!
//! Types are immutable and shared through [`Arc`]. Declared types mention
//! type parameters through [`Ty::Param`]; once a candidate is instantiated its
//! parameters are replaced by inference variables ([`Ty::Var`]) owned by the
//! candidate's constraint system.

use std::{collections::HashMap, sync::Arc};

use crate::{env::ClassId, infer::TyVar, symbol::Symbol, unique::Uid};

pub mod parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimTy {
    Unit,
    Boolean,
    Char,
    Int,
    Long,
    Double,
    String,
}

impl PrimTy {
    pub const ALL: [PrimTy; 7] = [
        PrimTy::Unit,
        PrimTy::Boolean,
        PrimTy::Char,
        PrimTy::Int,
        PrimTy::Long,
        PrimTy::Double,
        PrimTy::String,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            PrimTy::Unit => "Unit",
            PrimTy::Boolean => "Boolean",
            PrimTy::Char => "Char",
            PrimTy::Int => "Int",
            PrimTy::Long => "Long",
            PrimTy::Double => "Double",
            PrimTy::String => "String",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|prim| prim.name() == name)
    }
}

/// A declared type parameter, as it appears inside a type.
///
/// The [`Uid`] identifies the declaration; the name is only kept for
/// rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParamTy {
    pub uid: Uid,
    pub name: Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    /// The top type.
    Any,
    /// The bottom type.
    Nothing,
    Prim(PrimTy),
    Named {
        class: ClassId,
        args: Box<[Arc<Ty>]>,
    },
    Fn {
        domain: Box<[Arc<Ty>]>,
        codomain: Arc<Ty>,
    },
    Param(ParamTy),
    Var(TyVar),
    /// Stands in for a type that could not be determined; compatible with
    /// everything so that one failure does not cascade.
    Error,
}

/// A mapping from declared type parameters to the types replacing them.
pub type ParamSubstitution = HashMap<Uid, Arc<Ty>>;

impl Ty {
    pub fn prim(prim: PrimTy) -> Arc<Ty> {
        Arc::new(Ty::Prim(prim))
    }

    pub fn any() -> Arc<Ty> {
        Arc::new(Ty::Any)
    }

    pub fn function(
        domain: impl IntoIterator<Item = Arc<Ty>>,
        codomain: Arc<Ty>,
    ) -> Arc<Ty> {
        Arc::new(Ty::Fn {
            domain: domain.into_iter().collect(),
            codomain,
        })
    }

    pub fn fn_shape(&self) -> Option<(&[Arc<Ty>], &Arc<Ty>)> {
        match self {
            Ty::Fn { domain, codomain } => Some((domain, codomain)),
            _ => None,
        }
    }

    /// Returns `true` if `self` mentions no inference variables.
    pub fn is_proper(&self) -> bool {
        match self {
            Ty::Var(_) => false,
            Ty::Named { args, .. } => args.iter().all(|arg| arg.is_proper()),
            Ty::Fn { domain, codomain } => {
                domain.iter().all(|ty| ty.is_proper()) && codomain.is_proper()
            }
            Ty::Any | Ty::Nothing | Ty::Prim(_) | Ty::Param(_) | Ty::Error => {
                true
            }
        }
    }

    pub fn mentions_params(&self) -> bool {
        match self {
            Ty::Param(_) => true,
            Ty::Named { args, .. } => args.iter().any(|arg| arg.mentions_params()),
            Ty::Fn { domain, codomain } => {
                domain.iter().any(|ty| ty.mentions_params())
                    || codomain.mentions_params()
            }
            Ty::Any | Ty::Nothing | Ty::Prim(_) | Ty::Var(_) | Ty::Error => {
                false
            }
        }
    }

    /// Pushes every inference variable in `self` onto `vars`, in order of
    /// first occurrence.
    pub fn collect_vars(&self, vars: &mut Vec<TyVar>) {
        match self {
            Ty::Var(var) => {
                if !vars.contains(var) {
                    vars.push(*var);
                }
            }
            Ty::Named { args, .. } => {
                args.iter().for_each(|arg| arg.collect_vars(vars))
            }
            Ty::Fn { domain, codomain } => {
                domain.iter().for_each(|ty| ty.collect_vars(vars));
                codomain.collect_vars(vars);
            }
            Ty::Any | Ty::Nothing | Ty::Prim(_) | Ty::Param(_) | Ty::Error => {
            }
        }
    }
}

/// Rebuilds `ty` bottom-up, replacing every leaf for which `leaf` returns a
/// new type. Subtrees that do not change are shared with the input.
pub fn map_leaves<F>(ty: &Arc<Ty>, leaf: &mut F) -> Arc<Ty>
where
    F: FnMut(&Ty) -> Option<Arc<Ty>>,
{
    match ty.as_ref() {
        Ty::Named { class, args } => {
            let new_args = args
                .iter()
                .map(|arg| map_leaves(arg, &mut *leaf))
                .collect::<Box<[_]>>();

            match new_args.iter().zip(args.iter()).all(|(a, b)| Arc::ptr_eq(a, b))
            {
                true => ty.clone(),
                false => Arc::new(Ty::Named {
                    class: *class,
                    args: new_args,
                }),
            }
        }
        Ty::Fn { domain, codomain } => {
            let new_domain = domain
                .iter()
                .map(|ty| map_leaves(ty, &mut *leaf))
                .collect::<Box<[_]>>();
            let new_codomain = map_leaves(codomain, &mut *leaf);

            let unchanged = Arc::ptr_eq(&new_codomain, codomain)
                && new_domain
                    .iter()
                    .zip(domain.iter())
                    .all(|(a, b)| Arc::ptr_eq(a, b));

            match unchanged {
                true => ty.clone(),
                false => Arc::new(Ty::Fn {
                    domain: new_domain,
                    codomain: new_codomain,
                }),
            }
        }
        leaf_ty => leaf(leaf_ty).unwrap_or_else(|| ty.clone()),
    }
}

/// Replaces declared type parameters according to `substitution`.
pub fn substitute_params(
    ty: &Arc<Ty>,
    substitution: &ParamSubstitution,
) -> Arc<Ty> {
    if substitution.is_empty() {
        return ty.clone();
    }

    map_leaves(ty, &mut |leaf| match leaf {
        Ty::Param(param) => substitution.get(&param.uid).cloned(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::StringInterner;

    #[test]
    fn substitution_replaces_only_named_params() {
        let mut interner = StringInterner::new();
        let t = ParamTy {
            uid: Uid::fresh(),
            name: interner.intern("T"),
        };
        let u = ParamTy {
            uid: Uid::fresh(),
            name: interner.intern("U"),
        };

        let ty = Ty::function(
            [Arc::new(Ty::Param(t))],
            Arc::new(Ty::Param(u)),
        );

        let substitution =
            ParamSubstitution::from([(t.uid, Ty::prim(PrimTy::Int))]);
        let result = substitute_params(&ty, &substitution);

        let expected =
            Ty::function([Ty::prim(PrimTy::Int)], Arc::new(Ty::Param(u)));
        assert_eq!(result, expected);
        assert!(result.mentions_params());
    }

    #[test]
    fn unchanged_types_are_shared() {
        let ty = Ty::function([Ty::prim(PrimTy::Int)], Ty::any());
        let result = map_leaves(&ty, &mut |_| None);
        assert!(Arc::ptr_eq(&ty, &result));
    }

    #[test]
    fn prim_names_round_trip() {
        for prim in PrimTy::ALL {
            assert_eq!(PrimTy::from_name(prim.name()), Some(prim));
        }

        assert_eq!(PrimTy::from_name("Any"), None);
    }
}
