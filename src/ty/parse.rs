//! Parsers for the textual forms used by fixtures.
//!
//! The grammar is deliberately small:
//!
//! ```text
//! ty        := '(' [ty (',' ty)*] ')' '->' ty
//!            | ident ['<' ty (',' ty)* '>']
//! ty-param  := ['reified'] ident [':' ty]
//! param     := ['vararg'] ident ':' ty ['=' '_']
//! arg       := [ident '='] ['*'] (lambda | ty)
//! lambda    := '{' [[ident (',' ident)*] '->'] ty '}'
//! ```
//!
//! Names are left unresolved; [`crate::fixture`] maps them onto classes,
//! primitives and type parameters.

use thiserror::Error;
use winnow::{
    PResult, Parser,
    ascii::{multispace0, multispace1},
    combinator::{alt, delimited, opt, separated, terminated},
    error::ContextError,
    token::take_while,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TyExpr {
    Named {
        name: Box<str>,
        args: Box<[TyExpr]>,
    },
    Fn {
        domain: Box<[TyExpr]>,
        codomain: Box<TyExpr>,
    },
}

impl TyExpr {
    /// Returns the name of a bare identifier type like `T` or `x`.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            TyExpr::Named { name, args } if args.is_empty() => Some(name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TyParamExpr {
    pub name: Box<str>,
    pub bound: Option<TyExpr>,
    pub reified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamExpr {
    pub name: Box<str>,
    pub ty: TyExpr,
    pub has_default: bool,
    pub is_vararg: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgExpr {
    pub name: Option<Box<str>>,
    pub spread: bool,
    pub value: ArgValueExpr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValueExpr {
    Expr(TyExpr),
    Lambda {
        /// `None` if the lambda declares no parameter list at all.
        params: Option<Box<[Box<str>]>>,
        /// Either a type, or the name of a lambda parameter whose type the
        /// lambda returns.
        body: TyExpr,
    },
}

#[derive(Debug, Clone, Error)]
#[error("could not parse `{text}`: {message}")]
pub struct TyParseError {
    pub text: Box<str>,
    pub message: Box<str>,
}

pub fn parse_ty(src: &str) -> Result<TyExpr, TyParseError> {
    complete(ty_expr, src)
}

pub fn parse_ty_param(src: &str) -> Result<TyParamExpr, TyParseError> {
    complete(ty_param, src)
}

pub fn parse_param(src: &str) -> Result<ParamExpr, TyParseError> {
    complete(param, src)
}

pub fn parse_arg(src: &str) -> Result<ArgExpr, TyParseError> {
    complete(arg, src)
}

fn complete<'s, O, P>(parser: P, src: &'s str) -> Result<O, TyParseError>
where
    P: Parser<&'s str, O, ContextError>,
{
    delimited(multispace0, parser, multispace0)
        .parse(src)
        .map_err(|error| TyParseError {
            text: src.into(),
            message: error.to_string().into_boxed_str(),
        })
}

fn ws<'s, O, P>(inner: P) -> impl Parser<&'s str, O, ContextError>
where
    P: Parser<&'s str, O, ContextError>,
{
    delimited(multispace0, inner, multispace0)
}

fn ident<'s>(input: &mut &'s str) -> PResult<&'s str> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
        .parse_next(input)
}

fn ty_expr(input: &mut &str) -> PResult<TyExpr> {
    alt((fn_ty, named_ty)).parse_next(input)
}

fn fn_ty(input: &mut &str) -> PResult<TyExpr> {
    let domain: Vec<TyExpr> =
        delimited(ws('('), separated(0.., ty_expr, ws(',')), ws(')'))
            .parse_next(input)?;
    let _ = ws("->").parse_next(input)?;
    let codomain = ty_expr.parse_next(input)?;

    Ok(TyExpr::Fn {
        domain: domain.into_boxed_slice(),
        codomain: Box::new(codomain),
    })
}

fn named_ty(input: &mut &str) -> PResult<TyExpr> {
    let name = ws(ident).parse_next(input)?;
    let args: Option<Vec<TyExpr>> =
        opt(delimited(ws('<'), separated(1.., ty_expr, ws(',')), ws('>')))
            .parse_next(input)?;

    Ok(TyExpr::Named {
        name: name.into(),
        args: args.unwrap_or_default().into_boxed_slice(),
    })
}

fn ty_param(input: &mut &str) -> PResult<TyParamExpr> {
    let reified = opt(terminated("reified", multispace1))
        .parse_next(input)?
        .is_some();
    let name = ws(ident).parse_next(input)?;
    let bound = opt((ws(':'), ty_expr).map(|(_, ty)| ty)).parse_next(input)?;

    Ok(TyParamExpr {
        name: name.into(),
        bound,
        reified,
    })
}

fn param(input: &mut &str) -> PResult<ParamExpr> {
    let is_vararg = opt(terminated("vararg", multispace1))
        .parse_next(input)?
        .is_some();
    let name = ws(ident).parse_next(input)?;
    let _ = ws(':').parse_next(input)?;
    let ty = ty_expr.parse_next(input)?;
    let has_default = opt((ws('='), ws('_'))).parse_next(input)?.is_some();

    Ok(ParamExpr {
        name: name.into(),
        ty,
        has_default,
        is_vararg,
    })
}

fn arg(input: &mut &str) -> PResult<ArgExpr> {
    let name = opt(terminated(ws(ident), ws('='))).parse_next(input)?;
    let spread = opt(ws('*')).parse_next(input)?.is_some();
    let value = alt((lambda, ty_expr.map(ArgValueExpr::Expr)))
        .parse_next(input)?;

    Ok(ArgExpr {
        name: name.map(Into::into),
        spread,
        value,
    })
}

fn lambda(input: &mut &str) -> PResult<ArgValueExpr> {
    let _ = ws('{').parse_next(input)?;
    let params: Option<Vec<&str>> =
        opt(terminated(separated(0.., ws(ident), ws(',')), ws("->")))
            .parse_next(input)?;
    let body = ty_expr.parse_next(input)?;
    let _ = ws('}').parse_next(input)?;

    Ok(ArgValueExpr::Lambda {
        params: params.map(|params| {
            params.into_iter().map(Into::into).collect::<Box<[_]>>()
        }),
        body,
    })
}
