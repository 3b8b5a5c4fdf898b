//! Lookup scopes and the tower that orders them.
//!
//! Scopes are built by whoever owns the declarations (in this crate, the
//! [`fixture`] loader); the tower only decides in which order they are
//! searched. Every scope, and every implicit receiver, is tagged with a
//! [`TowerGroup`] that totally orders it against the others.
//!
//! [`fixture`]: crate::fixture

use std::{collections::HashMap, sync::Arc, sync::OnceLock};

use serde::Deserialize;

use crate::{
    env::{CallableId, ClassId, Session},
    symbol::Symbol,
    ty::Ty,
};

/// The kinds of scope a tower can contain.
///
/// Non-local scopes are searched in the order of this enum: explicit imports
/// shadow declarations from the current package, which shadow star imports,
/// which shadow the default imports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScopeKind {
    Local,
    ExplicitImport,
    Package,
    StarImport,
    DefaultImport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeEntry {
    Callable(CallableId),
    Classifier(ClassId),
}

/// A name-to-symbol multimap.
///
/// The name index is built on first lookup, at most once, and then shared by
/// every thread that reads the scope.
#[derive(Debug, Clone)]
pub struct Scope {
    pub name: Symbol,
    pub kind: ScopeKind,
    entries: Box<[ScopeEntry]>,
    index: OnceLock<HashMap<Symbol, Box<[ScopeEntry]>>>,
}

impl Scope {
    pub fn new(name: Symbol, kind: ScopeKind, entries: Vec<ScopeEntry>) -> Self {
        Self {
            name,
            kind,
            entries: entries.into_boxed_slice(),
            index: OnceLock::new(),
        }
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    /// Returns every entry called `name`, in declaration order.
    pub fn lookup(&self, session: &Session, name: Symbol) -> &[ScopeEntry] {
        let index = self.index.get_or_init(|| {
            let mut index = HashMap::<Symbol, Vec<ScopeEntry>>::new();
            for &entry in self.entries.iter() {
                let entry_name = match entry {
                    ScopeEntry::Callable(id) => session.callable(id).name,
                    ScopeEntry::Classifier(id) => session.class(id).name,
                };
                index.entry(entry_name).or_default().push(entry);
            }

            index
                .into_iter()
                .map(|(name, entries)| (name, entries.into_boxed_slice()))
                .collect()
        });

        index.get(&name).map(|entries| &**entries).unwrap_or(&[])
    }

    pub fn classifier(&self, session: &Session, name: Symbol) -> Option<ClassId> {
        self.lookup(session, name).iter().find_map(|entry| match entry {
            ScopeEntry::Classifier(id) => Some(*id),
            ScopeEntry::Callable(_) => None,
        })
    }
}

/// An implicit `this` available at a call site.
#[derive(Debug, Clone)]
pub struct ImplicitReceiver {
    pub ty: Arc<Ty>,
    pub label: Option<Symbol>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TowerGroupKind {
    Start,
    /// Members of an explicit receiver.
    Member,
    /// A local scope; 0 is the innermost one.
    Local(u32),
    /// An implicit receiver; 0 is the innermost one.
    ImplicitReceiver(u32),
    /// A non-local scope, by its position in the tower.
    NonLocal(u32),
    Last,
}

/// Distinguishes candidates found at the same level of the tower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GroupOrder {
    /// A symbol named like the call.
    Direct,
    /// A value named like the call, invoked through its `invoke` operator.
    Invoke,
    /// A classifier named like a variable access.
    Qualifier,
}

/// A totally ordered priority token. Smaller groups are searched first.
///
/// Groups compare lexicographically: by kind, then by position within the
/// kind (for instance, the members of an implicit receiver come before the
/// extensions found for it in each scope), then by [`GroupOrder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TowerGroup {
    pub kind: TowerGroupKind,
    pub position: u32,
    pub order: GroupOrder,
}

impl TowerGroup {
    pub const START: TowerGroup = TowerGroup::new(TowerGroupKind::Start);
    pub const LAST: TowerGroup = TowerGroup::new(TowerGroupKind::Last);

    pub const fn new(kind: TowerGroupKind) -> Self {
        Self {
            kind,
            position: 0,
            order: GroupOrder::Direct,
        }
    }

    pub const fn at(self, position: u32) -> Self {
        Self { position, ..self }
    }

    pub const fn with_order(self, order: GroupOrder) -> Self {
        Self { order, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityOrder {
    HighestFirst,
    LowestFirst,
}

/// The ordered layers of scopes visible at a call site.
#[derive(Debug, Clone, Default)]
pub struct ScopeTower {
    /// Innermost first.
    locals: Box<[Scope]>,
    /// Innermost first.
    receivers: Box<[ImplicitReceiver]>,
    /// Sorted by [`ScopeKind`].
    non_local: Box<[Scope]>,
}

impl ScopeTower {
    pub fn new(
        locals: Vec<Scope>,
        receivers: Vec<ImplicitReceiver>,
        mut non_local: Vec<Scope>,
    ) -> Self {
        // stable, so scopes of one kind keep their relative order
        non_local.sort_by_key(|scope| scope.kind);

        Self {
            locals: locals.into_boxed_slice(),
            receivers: receivers.into_boxed_slice(),
            non_local: non_local.into_boxed_slice(),
        }
    }

    /// Yields every scope with its group, in the requested order.
    pub fn for_each_scope(
        &self,
        order: PriorityOrder,
    ) -> impl Iterator<Item = (TowerGroup, &Scope)> {
        let mut scopes = self
            .locals
            .iter()
            .enumerate()
            .map(|(depth, scope)| {
                (TowerGroup::new(TowerGroupKind::Local(depth as u32)), scope)
            })
            .chain(self.non_local.iter().enumerate().map(|(index, scope)| {
                (TowerGroup::new(TowerGroupKind::NonLocal(index as u32)), scope)
            }))
            .collect::<Vec<_>>();

        if order == PriorityOrder::LowestFirst {
            scopes.reverse();
        }

        scopes.into_iter()
    }

    /// Yields the implicit receivers, innermost first.
    pub fn implicit_receivers(
        &self,
    ) -> impl Iterator<Item = (TowerGroup, &ImplicitReceiver)> {
        self.receivers.iter().enumerate().map(|(depth, receiver)| {
            let kind = TowerGroupKind::ImplicitReceiver(depth as u32);
            (TowerGroup::new(kind), receiver)
        })
    }

    pub fn innermost_receiver(&self) -> Option<&ImplicitReceiver> {
        self.receivers.first()
    }

    /// Finds the highest-priority classifier called `name`.
    pub fn find_classifier(
        &self,
        session: &Session,
        name: Symbol,
    ) -> Option<ClassId> {
        self.for_each_scope(PriorityOrder::HighestFirst)
            .find_map(|(_, scope)| scope.classifier(session, name))
    }
}
