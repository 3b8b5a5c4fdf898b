//! Central plumbing between CLI commands and the resolver.

use std::{io::Write, path::Path};

use calltower::{
    config::{ConfigError, LanguageSettings},
    error::InternalError,
    fixture::{Fixture, FixtureError},
    infer::BodyShapeAnalyzer,
    print,
    resolve::reference::CollectingSink,
};
use thiserror::Error;
use tracing::{debug, info};

/// The public result type of the [`driver`] module.
///
/// [`driver`]: self
pub type Result<T = ()> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Fixture(#[from] FixtureError),
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
}

/// Installs the global subscriber. `RUST_LOG` wins over the verbosity count.
pub fn init_logging(verbosity: u8) {
    use std::sync::OnceLock;
    use tracing_subscriber::{EnvFilter, fmt};

    static INITIALISED: OnceLock<()> = OnceLock::new();

    let _ = INITIALISED.get_or_init(|| {
        let level = match verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(true)
            .compact()
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

pub fn load_settings(path: Option<&Path>) -> Result<Option<LanguageSettings>> {
    match path {
        Some(path) => Ok(Some(LanguageSettings::load(path)?)),
        None => Ok(None),
    }
}

/// Resolves every call of the fixture at `path`, in order, and writes one
/// report per call to `out`.
pub fn resolve_fixture(
    path: &Path,
    settings: Option<&Path>,
    out: &mut impl Write,
) -> Result {
    let fixture = Fixture::load(path, load_settings(settings)?)?;
    info!(calls = fixture.calls.len(), "loaded fixture {}", path.display());

    let analyzer = BodyShapeAnalyzer;
    for index in 0..fixture.calls.len() {
        let mut sink = CollectingSink::default();
        let (site, reference) = fixture.resolve_call(index, &analyzer, &mut sink)?;
        debug!(call = %site.text, success = reference.is_success(), "resolved");

        writeln!(out, "{}", site.text)?;
        writeln!(out, "  {}", print::render(&reference, &fixture.session))?;
        for (span, error) in &sink.reports {
            writeln!(out, "  [{span}] {}", print::render(error, &fixture.session))?;
        }
    }

    Ok(())
}

pub fn dump_tower(path: &Path, out: &mut impl Write) -> Result {
    let fixture = Fixture::load(path, None)?;
    writeln!(out, "{}", print::render(&fixture.tower, &fixture.session))?;
    Ok(())
}
