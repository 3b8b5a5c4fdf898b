use clap::Parser;
use cli::{Cli, Command};

// executable-specific modules
mod cli;
mod driver;

pub fn interface() -> driver::Result {
    let Cli { verbose, command } = Cli::parse();
    driver::init_logging(verbose);

    let mut stdout = std::io::stdout().lock();
    match command {
        Command::Resolve { fixture, settings } => {
            driver::resolve_fixture(&fixture, settings.as_deref(), &mut stdout)
        }
        Command::DumpTower { fixture } => driver::dump_tower(&fixture, &mut stdout),
    }
}

fn main() {
    match interface() {
        Ok(()) => (),
        Err(error) => {
            eprintln!("{error}");
            std::process::exit(1);
        }
    }
}
