//! Declaration tables shared by every resolution in a session.
//!
//! A [`Session`] is assembled once through a [`SessionBuilder`] and is
//! read-only afterwards. All lookups take `&self`, so a session can be shared
//! (for instance behind an [`Arc`]) by resolvers running on different
//! threads.

use std::{collections::HashMap, sync::Arc};

use petgraph::graph::{DiGraph, NodeIndex};
use semver::Version;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    config::LanguageSettings,
    resolve::conflict::ConflictResolver,
    symbol::{StringInterner, Symbol, WellKnown},
    ty::{ParamSubstitution, ParamTy, Ty, substitute_params},
    unique::Uid,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallableId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClassKind {
    Class,
    Interface,
    Object,
    Annotation,
    /// An interface with a single abstract function, which function-typed
    /// values may be converted to.
    FunInterface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TyParam {
    pub ty: ParamTy,
    pub bounds: Box<[Arc<Ty>]>,
    pub reified: bool,
}

impl TyParam {
    pub fn as_ty(&self) -> Arc<Ty> {
        Arc::new(Ty::Param(self.ty))
    }
}

#[derive(Debug, Clone)]
pub struct Class {
    pub name: Symbol,
    pub kind: ClassKind,
    pub ty_params: Box<[TyParam]>,
    pub supertypes: Box<[Arc<Ty>]>,
    pub is_abstract: bool,
    /// Inner classes capture an instance of their outer class, so their
    /// constructors need a dispatch receiver.
    pub is_inner: bool,
    /// The first entry is the primary constructor.
    pub constructors: Vec<CallableId>,
    pub members: Vec<CallableId>,
}

impl Class {
    pub fn new(name: Symbol, kind: ClassKind) -> Self {
        Self {
            name,
            kind,
            ty_params: Box::new([]),
            supertypes: Box::new([]),
            is_abstract: false,
            is_inner: false,
            constructors: Vec::new(),
            members: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallableKind {
    Function,
    Property,
    Constructor,
    LocalVariable,
}

impl CallableKind {
    /// Returns `true` for symbols that denote a value rather than a
    /// function.
    pub const fn is_value(self) -> bool {
        matches!(self, CallableKind::Property | CallableKind::LocalVariable)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    /// For a vararg parameter, this is the element type.
    pub ty: Arc<Ty>,
    pub has_default: bool,
    pub is_vararg: bool,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeprecationLevel {
    Warning,
    Error,
    Hidden,
}

#[derive(Debug, Default, Clone)]
pub struct Modifiers {
    pub is_abstract: bool,
    pub is_operator: bool,
    pub visibility: Visibility,
    pub deprecation: Option<DeprecationLevel>,
    /// The API version this declaration first appeared in.
    pub since: Option<Version>,
    /// A marker that callers must opt into.
    pub opt_in: Option<Symbol>,
    /// Set on overloads that should win ties decided by a lambda's return
    /// type.
    pub prefers_by_lambda_return: bool,
    /// Calls to this declaration need a feature the resolver does not
    /// support; the message says which.
    pub unsupported: Option<Box<str>>,
    pub overrides: Option<CallableId>,
}

/// A function, property, constructor or local variable.
#[derive(Debug, Clone)]
pub struct Callable {
    pub name: Symbol,
    pub kind: CallableKind,
    pub owner: Option<ClassId>,
    /// The extension receiver type, if this is an extension.
    pub receiver: Option<Arc<Ty>>,
    pub ty_params: Box<[TyParam]>,
    pub params: Box<[Param]>,
    /// The return type; for values, this is the type of the value.
    pub ret: Arc<Ty>,
    pub modifiers: Modifiers,
}

impl Callable {
    pub fn is_generic(&self) -> bool {
        !self.ty_params.is_empty()
    }
}

#[derive(Debug, Clone, Error)]
pub enum EnvError {
    #[error("the supertypes of {0} form a cycle")]
    InheritanceCycle(Box<str>),
    #[error("the constructor {0} has no owning class")]
    OrphanConstructor(Box<str>),
}

#[derive(Debug)]
pub struct Session {
    pub interner: StringInterner,
    pub names: WellKnown,
    pub settings: LanguageSettings,
    classes: Box<[Class]>,
    callables: Box<[Callable]>,
    /// Edges point from subclasses to their direct superclasses.
    hierarchy: DiGraph<ClassId, ()>,
    nodes: Box<[NodeIndex]>,
    ty_params: HashMap<Uid, TyParam>,
    conflict_resolver: ConflictResolver,
}

impl Session {
    pub fn class(&self, id: ClassId) -> &Class {
        self.classes
            .get(id.0)
            .expect("ClassId values are valid by construction")
    }

    pub fn callable(&self, id: CallableId) -> &Callable {
        self.callables
            .get(id.0)
            .expect("CallableId values are valid by construction")
    }

    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(index, class)| (ClassId(index), class))
    }

    pub fn callables(&self) -> impl Iterator<Item = (CallableId, &Callable)> {
        self.callables
            .iter()
            .enumerate()
            .map(|(index, callable)| (CallableId(index), callable))
    }

    pub fn find_class(&self, name: Symbol) -> Option<ClassId> {
        self.classes().find(|(_, class)| class.name == name).map(|(id, _)| id)
    }

    pub fn name(&self, symbol: Symbol) -> &str {
        self.interner.display(symbol)
    }

    pub fn conflict_resolver(&self) -> &ConflictResolver {
        &self.conflict_resolver
    }

    /// Returns the declared upper bounds of `param`; an unbounded parameter
    /// is bounded by `Any`.
    pub fn bounds_of(&self, param: ParamTy) -> Box<[Arc<Ty>]> {
        match self.ty_params.get(&param.uid) {
            Some(decl) if !decl.bounds.is_empty() => decl.bounds.clone(),
            _ => Box::new([Ty::any()]),
        }
    }

    pub fn is_reified(&self, param: ParamTy) -> bool {
        self.ty_params
            .get(&param.uid)
            .map(|decl| decl.reified)
            .unwrap_or(false)
    }

    /// The type of values of `class`, applied to its own type parameters.
    pub fn declared_ty(&self, class: ClassId) -> Arc<Ty> {
        Arc::new(Ty::Named {
            class,
            args: self
                .class(class)
                .ty_params
                .iter()
                .map(TyParam::as_ty)
                .collect(),
        })
    }

    pub fn is_subclass(&self, sub: ClassId, sup: ClassId) -> bool {
        sub == sup
            || petgraph::algo::has_path_connecting(
                &self.hierarchy,
                self.nodes[sub.0],
                self.nodes[sup.0],
                None,
            )
    }

    /// Maps the type parameters of `class` to `args`.
    pub fn class_substitution(
        &self,
        class: ClassId,
        args: &[Arc<Ty>],
    ) -> ParamSubstitution {
        self.class(class)
            .ty_params
            .iter()
            .zip(args)
            .map(|(param, arg)| (param.ty.uid, arg.clone()))
            .collect()
    }

    /// The direct supertypes of `ty`, with the class's type parameters
    /// replaced by the arguments of `ty`.
    pub fn direct_supertypes(&self, ty: &Ty) -> Vec<Arc<Ty>> {
        match ty {
            Ty::Named { class, args } => {
                let substitution = self.class_substitution(*class, args);
                self.class(*class)
                    .supertypes
                    .iter()
                    .map(|st| substitute_params(st, &substitution))
                    .collect()
            }
            Ty::Param(param) => self.bounds_of(*param).into_vec(),
            _ => Vec::new(),
        }
    }

    /// Views `ty` as an instance of `target`, if `target` is one of its
    /// (possibly indirect) superclasses.
    ///
    /// For `ty = ArrayList<Int>` and `target = List`, this returns
    /// `List<Int>`.
    pub fn supertype_as(&self, ty: &Arc<Ty>, target: ClassId) -> Option<Arc<Ty>> {
        match ty.as_ref() {
            Ty::Named { class, .. } if *class == target => Some(ty.clone()),
            Ty::Named { class, .. } if !self.is_subclass(*class, target) => None,
            Ty::Named { .. } | Ty::Param(_) => self
                .direct_supertypes(ty)
                .iter()
                .find_map(|st| self.supertype_as(st, target)),
            _ => None,
        }
    }

    /// Collects the members named `name` visible on values of type `ty`,
    /// walking superclasses in declaration order. Each member comes with
    /// the substitution for its owner's type parameters.
    pub fn members_named(
        &self,
        ty: &Arc<Ty>,
        name: Symbol,
    ) -> Vec<(CallableId, ParamSubstitution)> {
        let mut found = Vec::new();
        let mut visited = Vec::new();
        self.collect_members(ty, name, &mut visited, &mut found);
        found
    }

    fn collect_members(
        &self,
        ty: &Arc<Ty>,
        name: Symbol,
        visited: &mut Vec<ClassId>,
        found: &mut Vec<(CallableId, ParamSubstitution)>,
    ) {
        if let Ty::Named { class, args } = ty.as_ref() {
            if visited.contains(class) {
                return;
            }
            visited.push(*class);

            let substitution = self.class_substitution(*class, args);
            for &member in &self.class(*class).members {
                if self.callable(member).name == name {
                    found.push((member, substitution.clone()));
                }
            }
        }

        for st in self.direct_supertypes(ty) {
            self.collect_members(&st, name, visited, found);
        }
    }

    /// If `ty` is a functional interface, returns the function type that
    /// converts to it.
    pub fn sam_ty(&self, ty: &Arc<Ty>) -> Option<Arc<Ty>> {
        let Ty::Named { class, args } = ty.as_ref() else {
            return None;
        };

        let decl = self.class(*class);
        if decl.kind != ClassKind::FunInterface {
            return None;
        }

        let mut abstract_fns = decl.members.iter().filter(|&&member| {
            let callable = self.callable(member);
            callable.kind == CallableKind::Function
                && callable.modifiers.is_abstract
        });

        let sam = self.callable(*abstract_fns.next()?);
        if abstract_fns.next().is_some() {
            return None;
        }

        let substitution = self.class_substitution(*class, args);
        Some(Ty::function(
            sam.params
                .iter()
                .map(|param| substitute_params(&param.ty, &substitution)),
            substitute_params(&sam.ret, &substitution),
        ))
    }

    /// Returns `true` if `callable` overrides `other`, directly or through a
    /// chain of overrides.
    pub fn overrides(&self, callable: CallableId, other: CallableId) -> bool {
        let mut current = self.callable(callable).modifiers.overrides;
        while let Some(id) = current {
            if id == other {
                return true;
            }
            current = self.callable(id).modifiers.overrides;
        }

        false
    }
}

/// Assembles a [`Session`].
///
/// Classes are added before their supertypes are known, so that mutually
/// referencing declarations can be described in any order.
#[derive(Debug)]
pub struct SessionBuilder {
    pub interner: StringInterner,
    pub names: WellKnown,
    pub settings: LanguageSettings,
    classes: Vec<Class>,
    callables: Vec<Callable>,
}

impl SessionBuilder {
    pub fn new(settings: LanguageSettings) -> Self {
        let mut interner = StringInterner::new();
        let names = WellKnown::intern(&mut interner);

        Self {
            interner,
            names,
            settings,
            classes: Vec::new(),
            callables: Vec::new(),
        }
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        self.interner.intern(s)
    }

    pub fn fresh_ty_param(&mut self, name: &str) -> TyParam {
        TyParam {
            ty: ParamTy {
                uid: Uid::fresh(),
                name: self.interner.intern(name),
            },
            bounds: Box::new([]),
            reified: false,
        }
    }

    pub fn add_class(&mut self, class: Class) -> ClassId {
        let id = ClassId(self.classes.len());
        self.classes.push(class);
        id
    }

    pub fn class_mut(&mut self, id: ClassId) -> &mut Class {
        self.classes
            .get_mut(id.0)
            .expect("ClassId values are valid by construction")
    }

    pub fn class(&self, id: ClassId) -> &Class {
        self.classes
            .get(id.0)
            .expect("ClassId values are valid by construction")
    }

    pub fn find_class(&self, name: Symbol) -> Option<ClassId> {
        self.classes
            .iter()
            .position(|class| class.name == name)
            .map(ClassId)
    }

    pub fn find_member(&self, owner: ClassId, name: Symbol) -> Option<CallableId> {
        self.class(owner)
            .members
            .iter()
            .copied()
            .find(|&member| self.callables[member.0].name == name)
    }

    /// The first top-level callable called `name`.
    pub fn find_callable(&self, name: Symbol) -> Option<CallableId> {
        self.callables
            .iter()
            .position(|callable| callable.name == name && callable.owner.is_none())
            .map(CallableId)
    }

    pub fn callable(&self, id: CallableId) -> &Callable {
        self.callables
            .get(id.0)
            .expect("CallableId values are valid by construction")
    }

    pub fn add_callable(&mut self, callable: Callable) -> Result<CallableId, EnvError> {
        let id = CallableId(self.callables.len());

        match (callable.kind, callable.owner) {
            (CallableKind::Constructor, Some(owner)) => {
                self.class_mut(owner).constructors.push(id)
            }
            (CallableKind::Constructor, None) => {
                let name = self.interner.display(callable.name);
                return Err(EnvError::OrphanConstructor(name.into()));
            }
            (_, Some(owner)) => self.class_mut(owner).members.push(id),
            (_, None) => (),
        }

        self.callables.push(callable);
        Ok(id)
    }

    pub fn finish(self) -> Result<Session, EnvError> {
        let mut hierarchy = DiGraph::new();
        let nodes = (0..self.classes.len())
            .map(|index| hierarchy.add_node(ClassId(index)))
            .collect::<Box<[_]>>();

        for (index, class) in self.classes.iter().enumerate() {
            for st in &class.supertypes {
                if let Ty::Named { class: sup, .. } = st.as_ref() {
                    hierarchy.add_edge(nodes[index], nodes[sup.0], ());
                }
            }
        }

        if let Err(cycle) = petgraph::algo::toposort(&hierarchy, None) {
            let ClassId(index) = hierarchy[cycle.node_id()];
            let name = self.interner.display(self.classes[index].name);
            return Err(EnvError::InheritanceCycle(name.into()));
        }

        let ty_params = self
            .classes
            .iter()
            .flat_map(|class| class.ty_params.iter())
            .chain(
                self.callables
                    .iter()
                    .flat_map(|callable| callable.ty_params.iter()),
            )
            .map(|param| (param.ty.uid, param.clone()))
            .collect();

        let conflict_resolver = ConflictResolver::new(&self.settings);

        Ok(Session {
            interner: self.interner,
            names: self.names,
            settings: self.settings,
            classes: self.classes.into_boxed_slice(),
            callables: self.callables.into_boxed_slice(),
            hierarchy,
            nodes,
            ty_params,
            conflict_resolver,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::PrimTy;

    fn function(name: Symbol, owner: Option<ClassId>) -> Callable {
        Callable {
            name,
            kind: CallableKind::Function,
            owner,
            receiver: None,
            ty_params: Box::new([]),
            params: Box::new([]),
            ret: Ty::prim(PrimTy::Unit),
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn supertypes_are_viewed_through_substitution() {
        let mut builder = SessionBuilder::new(LanguageSettings::default());
        let list_name = builder.intern("List");
        let array_list_name = builder.intern("ArrayList");

        let t = builder.fresh_ty_param("T");
        let mut list = Class::new(list_name, ClassKind::Interface);
        list.ty_params = Box::new([t]);
        let list = builder.add_class(list);

        let e = builder.fresh_ty_param("E");
        let e_ty = e.as_ty();
        let mut array_list = Class::new(array_list_name, ClassKind::Class);
        array_list.ty_params = Box::new([e]);
        array_list.supertypes = Box::new([Arc::new(Ty::Named {
            class: list,
            args: Box::new([e_ty]),
        })]);
        let array_list = builder.add_class(array_list);

        let session = builder.finish().unwrap();
        let ints = Arc::new(Ty::Named {
            class: array_list,
            args: Box::new([Ty::prim(PrimTy::Int)]),
        });

        let viewed = session.supertype_as(&ints, list).unwrap();
        assert_eq!(
            viewed.as_ref(),
            &Ty::Named {
                class: list,
                args: Box::new([Ty::prim(PrimTy::Int)]),
            }
        );
        assert!(session.is_subclass(array_list, list));
        assert!(!session.is_subclass(list, array_list));
    }

    #[test]
    fn inheritance_cycles_are_rejected() {
        let mut builder = SessionBuilder::new(LanguageSettings::default());
        let a_name = builder.intern("A");
        let b_name = builder.intern("B");
        let a = builder.add_class(Class::new(a_name, ClassKind::Class));
        let b = builder.add_class(Class::new(b_name, ClassKind::Class));

        builder.class_mut(a).supertypes = Box::new([Arc::new(Ty::Named {
            class: b,
            args: Box::new([]),
        })]);
        builder.class_mut(b).supertypes = Box::new([Arc::new(Ty::Named {
            class: a,
            args: Box::new([]),
        })]);

        assert!(matches!(builder.finish(), Err(EnvError::InheritanceCycle(_))));
    }

    #[test]
    fn members_include_inherited_ones() {
        let mut builder = SessionBuilder::new(LanguageSettings::default());
        let base_name = builder.intern("Base");
        let derived_name = builder.intern("Derived");
        let f = builder.intern("f");

        let base = builder.add_class(Class::new(base_name, ClassKind::Class));
        let derived =
            builder.add_class(Class::new(derived_name, ClassKind::Class));
        builder.class_mut(derived).supertypes = Box::new([Arc::new(Ty::Named {
            class: base,
            args: Box::new([]),
        })]);

        let base_f = builder.add_callable(function(f, Some(base))).unwrap();
        let mut derived_f = function(f, Some(derived));
        derived_f.modifiers.overrides = Some(base_f);
        let derived_f = builder.add_callable(derived_f).unwrap();

        let session = builder.finish().unwrap();
        let members = session
            .members_named(&session.declared_ty(derived), f)
            .into_iter()
            .map(|(id, _)| id)
            .collect::<Vec<_>>();

        assert_eq!(members, vec![derived_f, base_f]);
        assert!(session.overrides(derived_f, base_f));
        assert!(!session.overrides(base_f, derived_f));
    }
}
