//! Declarative descriptions of resolution problems.
//!
//! A fixture is a TOML document that lists scopes, classes, callables, the
//! context the calls appear in, and the calls themselves. Types, parameters
//! and arguments are written in the surface syntax of [`crate::ty::parse`].
//!
//! ```toml
//! [[scope]]
//! name = "app"
//! kind = "package"
//!
//! [[function]]
//! name = "f"
//! params = ["x: Int"]
//! scope = "app"
//!
//! [[call]]
//! name = "f"
//! args = ["Int"]
//! ```
//!
//! Declarations are lowered in a fixed order (classes, then constructors,
//! properties, functions and local variables), so an `overrides` entry must
//! name a class whose member has already been declared.

use std::{path::Path, str::FromStr, sync::Arc};

use semver::Version;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    call::{
        Argument, ArgumentValue, CallKind, CallOrigin, CallSite,
        CallableReferenceAtom, ContainingDeclaration, ExplicitReceiver,
        LambdaArgument, LambdaBody,
    },
    config::LanguageSettings,
    env::{
        Callable, CallableId, CallableKind, Class, ClassId, ClassKind,
        DeprecationLevel, EnvError, Modifiers, Param, Session, SessionBuilder,
        TyParam, Visibility,
    },
    error::{Attachment, InternalError},
    infer::{ConstraintSystem, LambdaAnalyzer},
    resolve::{
        CallResolver, ResolverComponents,
        reference::{DiagnosticSink, ResolvedReference},
    },
    scope::{ImplicitReceiver, Scope, ScopeEntry, ScopeKind, ScopeTower},
    span::{Span, SpanIndex},
    symbol::Symbol,
    ty::{
        PrimTy, Ty,
        parse::{
            ArgExpr, ArgValueExpr, TyExpr, TyParamExpr, TyParseError,
            parse_arg, parse_param, parse_ty, parse_ty_param,
        },
    },
    unique::Uid,
};

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    Parse(#[from] TyParseError),
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error("unknown type `{0}`")]
    UnknownType(Box<str>),
    #[error("unknown class `{0}`")]
    UnknownClass(Box<str>),
    #[error("unknown scope `{0}`")]
    UnknownScope(Box<str>),
    #[error("unknown declaration `{0}`")]
    UnknownDeclaration(Box<str>),
    #[error("`{name}` expects {expected} type arguments but was given {actual}")]
    TypeArgumentCount {
        name: Box<str>,
        expected: usize,
        actual: usize,
    },
    #[error("`{class}` has no member `{name}` to override")]
    MissingOverride { name: Box<str>, class: Box<str> },
    #[error("a {0} needs a name")]
    MissingName(&'static str),
}

// SCHEMA

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct FixtureDef {
    settings: Option<LanguageSettings>,
    #[serde(rename = "scope")]
    scopes: Vec<ScopeDef>,
    #[serde(rename = "class")]
    classes: Vec<ClassDef>,
    #[serde(rename = "constructor")]
    constructors: Vec<CallableDef>,
    #[serde(rename = "property")]
    properties: Vec<CallableDef>,
    #[serde(rename = "function")]
    functions: Vec<CallableDef>,
    #[serde(rename = "variable")]
    variables: Vec<CallableDef>,
    context: ContextDef,
    #[serde(rename = "call")]
    calls: Vec<CallDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ScopeDef {
    name: String,
    kind: ScopeKind,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct ClassDef {
    name: String,
    #[serde(default = "default_class_kind")]
    kind: ClassKind,
    #[serde(default)]
    type_params: Vec<String>,
    #[serde(default)]
    supertypes: Vec<String>,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default, rename = "inner")]
    is_inner: bool,
    scope: Option<String>,
}

fn default_class_kind() -> ClassKind {
    ClassKind::Class
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct CallableDef {
    name: Option<String>,
    owner: Option<String>,
    receiver: Option<String>,
    #[serde(default)]
    type_params: Vec<String>,
    #[serde(default)]
    params: Vec<String>,
    #[serde(alias = "type")]
    returns: Option<String>,
    scope: Option<String>,
    #[serde(default, rename = "abstract")]
    is_abstract: bool,
    #[serde(default, rename = "operator")]
    is_operator: bool,
    #[serde(default)]
    visibility: Visibility,
    deprecation: Option<DeprecationLevel>,
    since: Option<Version>,
    opt_in: Option<String>,
    #[serde(default)]
    prefers_lambda_return: bool,
    unsupported: Option<String>,
    /// The class whose member of the same name this one overrides.
    overrides: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
struct ContextDef {
    /// Implicit receiver types, innermost first.
    receivers: Vec<String>,
    /// Enclosing classes and top-level functions, innermost first. Their
    /// type parameters are visible to the calls' type arguments.
    containing: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct CallDef {
    name: Option<toml::Spanned<String>>,
    #[serde(default = "default_call_kind")]
    kind: CallKind,
    /// A type, `const <type>` for a constant, or `super`.
    receiver: Option<String>,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    type_args: Vec<String>,
    expected: Option<String>,
    constructed: Option<String>,
    #[serde(default)]
    operator: bool,
    #[serde(default)]
    dependent: bool,
}

fn default_call_kind() -> CallKind {
    CallKind::Function
}

// LOWERING

/// A lowered fixture, ready to be resolved.
#[derive(Debug)]
pub struct Fixture {
    pub session: Session,
    pub tower: ScopeTower,
    pub containing: Arc<[ContainingDeclaration]>,
    pub calls: Vec<FixtureCall>,
}

#[derive(Debug, Clone)]
pub struct FixtureCall {
    pub site: CallSite,
    /// The expected type of a callable reference.
    pub expected: Option<Arc<Ty>>,
    /// The class type a delegating constructor call delegates to.
    pub constructed: Option<Arc<Ty>>,
}

impl FromStr for Fixture {
    type Err = FixtureError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        Self::parse(src, None)
    }
}

impl Fixture {
    pub fn load(
        path: impl AsRef<Path>,
        settings: Option<LanguageSettings>,
    ) -> Result<Self, FixtureError> {
        let file_contents = std::fs::read_to_string(path)?;
        Self::parse(&file_contents, settings)
    }

    /// Lowers the fixture in `src`. `settings` take precedence over the
    /// fixture's own `[settings]` table.
    pub fn parse(
        src: &str,
        settings: Option<LanguageSettings>,
    ) -> Result<Self, FixtureError> {
        let def: FixtureDef = toml::from_str(src)?;
        let settings = settings.or(def.settings).unwrap_or_default();

        let mut lowering = Lowering {
            builder: SessionBuilder::new(settings),
            scopes: Vec::new(),
        };

        for scope in &def.scopes {
            let name = lowering.builder.intern(&scope.name);
            lowering.scopes.push((name, scope.kind, Vec::new()));
        }

        let mut classes = Vec::with_capacity(def.classes.len());
        for class in &def.classes {
            classes.push(lowering.declare_class(class)?);
        }
        for (class, (id, exprs)) in def.classes.iter().zip(&classes) {
            lowering.define_class(*id, exprs, class)?;
        }

        let callables = [
            (&def.constructors, CallableKind::Constructor),
            (&def.properties, CallableKind::Property),
            (&def.functions, CallableKind::Function),
            (&def.variables, CallableKind::LocalVariable),
        ];
        for (defs, kind) in callables {
            for callable in defs {
                lowering.callable(callable, kind)?;
            }
        }

        let mut receivers = Vec::with_capacity(def.context.receivers.len());
        for src in &def.context.receivers {
            receivers.push(ImplicitReceiver {
                ty: lowering.ty(src, &[])?,
                label: None,
            });
        }

        let containing = def
            .context
            .containing
            .iter()
            .map(|name| lowering.containing(name))
            .collect::<Result<Arc<[_]>, _>>()?;
        let visible = lowering.visible_ty_params(&containing);

        let calls = def
            .calls
            .iter()
            .map(|call| lowering.call(call, &visible))
            .collect::<Result<Vec<_>, _>>()?;

        let Lowering { builder, scopes } = lowering;
        let session = builder.finish()?;
        let (locals, non_local) = scopes
            .into_iter()
            .map(|(name, kind, entries)| Scope::new(name, kind, entries))
            .partition(|scope| scope.kind == ScopeKind::Local);

        Ok(Self {
            session,
            tower: ScopeTower::new(locals, receivers, non_local),
            containing,
            calls,
        })
    }

    pub fn resolver<'a>(&'a self, analyzer: &'a dyn LambdaAnalyzer) -> CallResolver<'a> {
        CallResolver::new(ResolverComponents {
            session: &self.session,
            tower: &self.tower,
            analyzer,
            containing: &self.containing,
        })
    }

    /// Resolves the call at `index` through the entry point for its kind and
    /// returns the call site as resolution left it.
    ///
    /// Callable references are resolved against an empty outer system, and
    /// resolved a second time if the first attempt was postponed.
    pub fn resolve_call(
        &self,
        index: usize,
        analyzer: &dyn LambdaAnalyzer,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(CallSite, ResolvedReference), InternalError> {
        let resolver = self.resolver(analyzer);
        let call = &self.calls[index];
        let mut site = call.site.clone();

        let reference = match site.kind {
            CallKind::Function | CallKind::ImplicitInvoke => {
                resolver.resolve_call_and_select_candidate(&mut site, sink)?
            }
            CallKind::VariableAccess => {
                resolver.resolve_variable_access_and_select_candidate(&mut site, sink)?
            }
            CallKind::DelegatingConstructorCall => resolver
                .resolve_delegating_constructor_call(
                    &mut site,
                    call.constructed.as_ref(),
                    sink,
                )?,
            CallKind::Annotation => resolver.resolve_annotation_call(&mut site, sink)?,
            CallKind::CallableReference => {
                let mut atom = CallableReferenceAtom::new(site, call.expected.clone());
                let mut outer = ConstraintSystem::new();
                while resolver
                    .resolve_callable_reference(&mut atom, &mut outer, sink)?
                    .1
                {}

                site = atom.site;
                site.resolved().cloned().ok_or_else(|| {
                    InternalError::MissingReference {
                        attachment: Attachment {
                            call_site: site.text.clone(),
                            candidates: Box::new([]),
                        },
                    }
                })?
            }
        };

        Ok((site, reference))
    }

    /// Looks up a callable by name, for tests and the CLI.
    pub fn callable_named(&self, name: &str) -> Vec<CallableId> {
        let Some(symbol) = self.session.interner.get(name) else {
            return Vec::new();
        };

        self.session
            .callables()
            .filter(|(_, callable)| callable.name == symbol)
            .map(|(id, _)| id)
            .collect()
    }
}

struct Lowering {
    builder: SessionBuilder,
    scopes: Vec<(Symbol, ScopeKind, Vec<ScopeEntry>)>,
}

impl Lowering {
    fn add_to_scope(
        &mut self,
        scope: Option<&str>,
        entry: ScopeEntry,
    ) -> Result<(), FixtureError> {
        let Some(name) = scope else {
            return Ok(());
        };

        let symbol = self.builder.intern(name);
        let (_, _, entries) = self
            .scopes
            .iter_mut()
            .find(|(scope, ..)| *scope == symbol)
            .ok_or_else(|| FixtureError::UnknownScope(name.into()))?;
        entries.push(entry);
        Ok(())
    }

    fn class(&mut self, name: &str) -> Result<ClassId, FixtureError> {
        let symbol = self.builder.intern(name);
        self.builder
            .find_class(symbol)
            .ok_or_else(|| FixtureError::UnknownClass(name.into()))
    }

    fn containing(&mut self, name: &str) -> Result<ContainingDeclaration, FixtureError> {
        let symbol = self.builder.intern(name);
        match (self.builder.find_class(symbol), self.builder.find_callable(symbol)) {
            (Some(class), _) => Ok(ContainingDeclaration::Class(class)),
            (None, Some(callable)) => Ok(ContainingDeclaration::Callable(callable)),
            (None, None) => Err(FixtureError::UnknownDeclaration(name.into())),
        }
    }

    /// The type parameters declared by `containing`, innermost first.
    fn visible_ty_params(&self, containing: &[ContainingDeclaration]) -> Vec<TyParam> {
        containing
            .iter()
            .flat_map(|decl| match decl {
                ContainingDeclaration::Class(id) => self.builder.class(*id).ty_params.iter(),
                ContainingDeclaration::Callable(id) => {
                    self.builder.callable(*id).ty_params.iter()
                }
            })
            .cloned()
            .collect()
    }

    fn declare_class(
        &mut self,
        def: &ClassDef,
    ) -> Result<(ClassId, Vec<TyParamExpr>), FixtureError> {
        let name = self.builder.intern(&def.name);
        let (exprs, ty_params) = self.declare_ty_params(&def.type_params)?;

        let mut class = Class::new(name, def.kind);
        class.ty_params = ty_params.into_boxed_slice();
        class.is_abstract = def.is_abstract;
        class.is_inner = def.is_inner;

        let id = self.builder.add_class(class);
        self.add_to_scope(def.scope.as_deref(), ScopeEntry::Classifier(id))?;
        Ok((id, exprs))
    }

    /// Fills in bounds and supertypes, once every class has been declared.
    fn define_class(
        &mut self,
        id: ClassId,
        exprs: &[TyParamExpr],
        def: &ClassDef,
    ) -> Result<(), FixtureError> {
        let mut ty_params = self.builder.class(id).ty_params.to_vec();
        self.bound_ty_params(exprs, &mut ty_params, &[])?;

        let supertypes = def
            .supertypes
            .iter()
            .map(|src| self.ty(src, &ty_params))
            .collect::<Result<Box<[_]>, _>>()?;

        let class = self.builder.class_mut(id);
        class.ty_params = ty_params.into_boxed_slice();
        class.supertypes = supertypes;
        Ok(())
    }

    fn declare_ty_params(
        &mut self,
        srcs: &[String],
    ) -> Result<(Vec<TyParamExpr>, Vec<TyParam>), FixtureError> {
        let exprs = srcs
            .iter()
            .map(|src| parse_ty_param(src))
            .collect::<Result<Vec<_>, _>>()?;

        let ty_params = exprs
            .iter()
            .map(|expr| TyParam {
                reified: expr.reified,
                ..self.builder.fresh_ty_param(&expr.name)
            })
            .collect();

        Ok((exprs, ty_params))
    }

    fn bound_ty_params(
        &mut self,
        exprs: &[TyParamExpr],
        ty_params: &mut [TyParam],
        outer: &[TyParam],
    ) -> Result<(), FixtureError> {
        let visible = outer
            .iter()
            .chain(ty_params.iter())
            .cloned()
            .collect::<Vec<_>>();

        for (param, expr) in ty_params.iter_mut().zip(exprs) {
            if let Some(bound) = &expr.bound {
                param.bounds = Box::new([self.lower_ty(bound, &visible)?]);
            }
        }

        Ok(())
    }

    fn callable(
        &mut self,
        def: &CallableDef,
        kind: CallableKind,
    ) -> Result<CallableId, FixtureError> {
        let owner = def.owner.as_deref().map(|name| self.class(name)).transpose()?;
        let outer = match owner {
            Some(owner) => self.builder.class(owner).ty_params.to_vec(),
            None => Vec::new(),
        };

        let name = match (kind, &def.name) {
            (CallableKind::Constructor, _) => self.builder.names.init,
            (_, Some(name)) => self.builder.intern(name),
            (_, None) => return Err(FixtureError::MissingName("callable")),
        };

        let (exprs, mut own) = self.declare_ty_params(&def.type_params)?;
        self.bound_ty_params(&exprs, &mut own, &outer)?;
        let visible = outer.iter().chain(own.iter()).cloned().collect::<Vec<_>>();

        let receiver = def
            .receiver
            .as_deref()
            .map(|src| self.ty(src, &visible))
            .transpose()?;

        let params = def
            .params
            .iter()
            .map(|src| self.param(src, &visible))
            .collect::<Result<Box<[_]>, _>>()?;

        let ret = match (kind, owner, &def.returns) {
            (CallableKind::Constructor, Some(owner), _) => Arc::new(Ty::Named {
                class: owner,
                args: outer.iter().map(TyParam::as_ty).collect(),
            }),
            // rejected by the builder below
            (CallableKind::Constructor, None, _) => Arc::new(Ty::Error),
            (_, _, Some(src)) => self.ty(src, &visible)?,
            (_, _, None) => Ty::prim(PrimTy::Unit),
        };

        // constructors of a generic class infer the class's arguments
        let ty_params = match kind {
            CallableKind::Constructor => visible.into_boxed_slice(),
            _ => own.into_boxed_slice(),
        };

        let overrides = match &def.overrides {
            Some(base) => {
                let base_id = self.class(base)?;
                let member = self.builder.find_member(base_id, name).ok_or_else(|| {
                    FixtureError::MissingOverride {
                        name: def.name.as_deref().unwrap_or_default().into(),
                        class: base.as_str().into(),
                    }
                })?;
                Some(member)
            }
            None => None,
        };

        let modifiers = Modifiers {
            is_abstract: def.is_abstract,
            is_operator: def.is_operator,
            visibility: def.visibility,
            deprecation: def.deprecation,
            since: def.since.clone(),
            opt_in: def.opt_in.as_deref().map(|marker| self.builder.intern(marker)),
            prefers_by_lambda_return: def.prefers_lambda_return,
            unsupported: def.unsupported.as_deref().map(Box::from),
            overrides,
        };

        let id = self.builder.add_callable(Callable {
            name,
            kind,
            owner,
            receiver,
            ty_params,
            params,
            ret,
            modifiers,
        })?;

        self.add_to_scope(def.scope.as_deref(), ScopeEntry::Callable(id))?;
        Ok(id)
    }

    fn param(&mut self, src: &str, visible: &[TyParam]) -> Result<Param, FixtureError> {
        let expr = parse_param(src)?;
        Ok(Param {
            name: self.builder.intern(&expr.name),
            ty: self.lower_ty(&expr.ty, visible)?,
            has_default: expr.has_default,
            is_vararg: expr.is_vararg,
        })
    }

    fn ty(&mut self, src: &str, visible: &[TyParam]) -> Result<Arc<Ty>, FixtureError> {
        let expr = parse_ty(src)?;
        self.lower_ty(&expr, visible)
    }

    fn lower_ty(
        &mut self,
        expr: &TyExpr,
        visible: &[TyParam],
    ) -> Result<Arc<Ty>, FixtureError> {
        let (name, args) = match expr {
            TyExpr::Fn { domain, codomain } => {
                let domain = domain
                    .iter()
                    .map(|ty| self.lower_ty(ty, visible))
                    .collect::<Result<Box<[_]>, _>>()?;
                let codomain = self.lower_ty(codomain, visible)?;
                return Ok(Arc::new(Ty::Fn { domain, codomain }));
            }
            TyExpr::Named { name, args } => (name, args),
        };

        let args = args
            .iter()
            .map(|arg| self.lower_ty(arg, visible))
            .collect::<Result<Box<[_]>, _>>()?;
        let symbol = self.builder.intern(name);

        let nullary = |ty: Ty| match args.is_empty() {
            true => Ok(Arc::new(ty)),
            false => Err(FixtureError::TypeArgumentCount {
                name: name.clone(),
                expected: 0,
                actual: args.len(),
            }),
        };

        if let Some(param) = visible.iter().find(|param| param.ty.name == symbol) {
            return nullary(Ty::Param(param.ty));
        }

        match (&**name, PrimTy::from_name(name)) {
            ("Any", _) => nullary(Ty::Any),
            ("Nothing", _) => nullary(Ty::Nothing),
            (_, Some(prim)) => nullary(Ty::Prim(prim)),
            _ => {
                let class = self
                    .builder
                    .find_class(symbol)
                    .ok_or_else(|| FixtureError::UnknownType(name.clone()))?;

                let expected = self.builder.class(class).ty_params.len();
                if expected != args.len() {
                    return Err(FixtureError::TypeArgumentCount {
                        name: name.clone(),
                        expected,
                        actual: args.len(),
                    });
                }

                Ok(Arc::new(Ty::Named { class, args }))
            }
        }
    }

    fn call(
        &mut self,
        def: &CallDef,
        visible: &[TyParam],
    ) -> Result<FixtureCall, FixtureError> {
        let (name, span) = match &def.name {
            Some(name) => (self.builder.intern(name.get_ref()), name.span()),
            None if def.kind == CallKind::DelegatingConstructorCall => {
                (self.builder.names.init, 0..0)
            }
            None => return Err(FixtureError::MissingName("call")),
        };

        let mut site = CallSite::new(def.kind, name);
        site.span = Span::new(span.start as SpanIndex, span.end as SpanIndex);
        site.text = call_text(def).into_boxed_str();
        site.explicit_receiver = def
            .receiver
            .as_deref()
            .map(|src| self.receiver(src))
            .transpose()?;
        site.args = def
            .args
            .iter()
            .map(|src| self.argument(src))
            .collect::<Result<_, _>>()?;
        site.type_args = def
            .type_args
            .iter()
            .map(|src| self.ty(src, visible))
            .collect::<Result<_, _>>()?;
        site.origin = match def.operator {
            true => CallOrigin::Operator,
            false => CallOrigin::Regular,
        };
        site.dependent = def.dependent;

        Ok(FixtureCall {
            site,
            expected: def
                .expected
                .as_deref()
                .map(|src| self.ty(src, &[]))
                .transpose()?,
            constructed: def
                .constructed
                .as_deref()
                .map(|src| self.ty(src, &[]))
                .transpose()?,
        })
    }

    fn receiver(&mut self, src: &str) -> Result<ExplicitReceiver, FixtureError> {
        let src = src.trim();
        if src == "super" {
            return Ok(ExplicitReceiver::Super);
        }

        let (src, is_constant) = match src.strip_prefix("const ") {
            Some(rest) => (rest, true),
            None => (src, false),
        };

        Ok(ExplicitReceiver::Expr {
            ty: self.ty(src, &[])?,
            is_constant,
        })
    }

    fn argument(&mut self, src: &str) -> Result<Argument, FixtureError> {
        let ArgExpr { name, spread, value } = parse_arg(src)?;

        let value = match value {
            ArgValueExpr::Expr(ty) => ArgumentValue::Expr(self.lower_ty(&ty, &[])?),
            ArgValueExpr::Lambda { params, body } => {
                // a body naming a parameter returns that parameter
                let returned = body.as_ident().and_then(|ident| match &params {
                    Some(params) => params.iter().position(|param| &**param == ident),
                    None => (ident == "it").then_some(0),
                });

                let body = match returned {
                    Some(index) => LambdaBody::ReturnsParam(index),
                    None => LambdaBody::Returns(self.lower_ty(&body, &[])?),
                };

                let params = params.map(|params| {
                    params
                        .iter()
                        .map(|param| self.builder.intern(param))
                        .collect()
                });

                ArgumentValue::Lambda(Arc::new(LambdaArgument {
                    id: Uid::fresh(),
                    params,
                    body,
                }))
            }
        };

        Ok(Argument {
            name: name.map(|name| self.builder.intern(&name)),
            spread,
            value,
        })
    }
}

/// A rendering of the call as it would be written, for reports.
fn call_text(def: &CallDef) -> String {
    let name = def
        .name
        .as_ref()
        .map(|name| name.get_ref().as_str())
        .unwrap_or("this");
    let receiver = def.receiver.as_deref();

    match def.kind {
        CallKind::CallableReference => {
            format!("{}::{name}", receiver.unwrap_or_default())
        }
        CallKind::VariableAccess => match receiver {
            Some(receiver) => format!("{receiver}.{name}"),
            None => name.to_owned(),
        },
        CallKind::Annotation => format!("@{name}({})", def.args.join(", ")),
        _ => match receiver {
            Some(receiver) => format!("{receiver}.{name}({})", def.args.join(", ")),
            None => format!("{name}({})", def.args.join(", ")),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_generic_declarations() {
        let fixture: Fixture = r#"
            [[scope]]
            name = "app"
            kind = "package"

            [[class]]
            name = "Base"
            kind = "interface"
            type-params = ["T"]
            scope = "app"

            [[class]]
            name = "Box"
            type-params = ["T: Any"]
            supertypes = ["Base<T>"]
            scope = "app"

            [[constructor]]
            owner = "Box"
            params = ["value: T"]

            [[function]]
            name = "wrap"
            type-params = ["reified U"]
            params = ["value: U", "vararg rest: U", "tag: String = _"]
            returns = "Box<U>"
            scope = "app"
        "#
        .parse()
        .unwrap();

        let session = &fixture.session;
        let boxed = session.find_class(session.interner.get("Box").unwrap()).unwrap();
        let class = session.class(boxed);
        assert_eq!(class.ty_params.len(), 1);
        assert_eq!(class.supertypes.len(), 1);
        assert_eq!(class.constructors.len(), 1);

        let constructor = session.callable(class.constructors[0]);
        assert_eq!(constructor.name, session.names.init);
        assert_eq!(constructor.ty_params.len(), 1);
        assert!(matches!(
            constructor.ret.as_ref(),
            Ty::Named { class, args } if *class == boxed && args.len() == 1
        ));

        let wrap = session.callable(fixture.callable_named("wrap")[0]);
        assert!(wrap.ty_params[0].reified);
        assert!(wrap.params[1].is_vararg);
        assert!(wrap.params[2].has_default);
        assert!(matches!(wrap.params[0].ty.as_ref(), Ty::Param(_)));
    }

    #[test]
    fn lower_calls() {
        let fixture: Fixture = r#"
            [context]
            receivers = ["Int"]

            [[call]]
            name = "f"
            receiver = "const String"
            args = ["x = Int", "*Int", "{ a, b -> b }", "{ it }", "{ String }"]
            type-args = ["Long"]
            operator = true

            [[call]]
            kind = "delegating-constructor-call"
            constructed = "Any"
        "#
        .parse()
        .unwrap();

        let site = &fixture.calls[0].site;
        assert!(site.span.length() > 0);
        assert_eq!(site.origin, CallOrigin::Operator);
        assert!(matches!(
            site.explicit_receiver,
            Some(ExplicitReceiver::Expr {
                is_constant: true,
                ..
            })
        ));
        assert!(site.args[0].name.is_some());
        assert!(site.args[1].spread);

        let bodies = site.args[2..]
            .iter()
            .map(|arg| arg.as_lambda().unwrap().body.clone())
            .collect::<Vec<_>>();
        assert_eq!(bodies[0], LambdaBody::ReturnsParam(1));
        assert_eq!(bodies[1], LambdaBody::ReturnsParam(0));
        assert_eq!(bodies[2], LambdaBody::Returns(Ty::prim(PrimTy::String)));

        let delegating = &fixture.calls[1];
        assert_eq!(delegating.site.name, fixture.session.names.init);
        assert_eq!(delegating.constructed, Some(Ty::any()));
    }

    #[test]
    fn reject_bad_fixtures() {
        let unknown = r#"
            [[function]]
            name = "f"
            params = ["x: Missing"]
        "#;
        assert!(matches!(
            unknown.parse::<Fixture>(),
            Err(FixtureError::UnknownType(name)) if &*name == "Missing"
        ));

        let arity = r#"
            [[class]]
            name = "Box"
            type-params = ["T"]

            [[function]]
            name = "f"
            returns = "Box"
        "#;
        assert!(matches!(
            arity.parse::<Fixture>(),
            Err(FixtureError::TypeArgumentCount { expected: 1, actual: 0, .. })
        ));

        let scope = r#"
            [[function]]
            name = "f"
            scope = "nowhere"
        "#;
        assert!(matches!(
            scope.parse::<Fixture>(),
            Err(FixtureError::UnknownScope(_))
        ));

        let enclosing = r#"
            [context]
            containing = ["nothing"]
        "#;
        assert!(matches!(
            enclosing.parse::<Fixture>(),
            Err(FixtureError::UnknownDeclaration(_))
        ));

        let cycle = r#"
            [[class]]
            name = "A"
            supertypes = ["B"]

            [[class]]
            name = "B"
            supertypes = ["A"]
        "#;
        assert!(matches!(
            cycle.parse::<Fixture>(),
            Err(FixtureError::Env(EnvError::InheritanceCycle(_)))
        ));
    }
}
