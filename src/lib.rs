//! Call and overload resolution over a tower of scopes.
//!
//! A [`fixture::Fixture`] (or any other front end) assembles an
//! [`env::Session`] of declarations and a [`scope::ScopeTower`], and hands
//! [`call::CallSite`]s to a [`resolve::CallResolver`], which binds each call
//! to a [`resolve::reference::ResolvedReference`].

pub mod call;
pub mod config;
pub mod env;
pub mod error;
pub mod fixture;
pub mod infer;
pub mod print;
pub mod resolve;
pub mod scope;
pub mod span;
pub mod symbol;
pub mod ty;
pub mod unique;
