//! Entry point for the command-line interface.
#![forbid(unsafe_code)]

use std::error::Error;

use layersync_cli::CliError;

const DEFAULT_FILTER: &str = "layersync_core=info,layersync_data=info,layersync_cli=info";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(DEFAULT_FILTER))
        .init();
    match layersync_cli::run() {
        Ok(()) => {}
        Err(CliError::ArgumentParsing(err)) => err.exit(),
        Err(err) => fail(&err),
    }
}

#[expect(
    clippy::print_stderr,
    reason = "fatal errors are reported on stderr before exiting"
)]
fn fail(err: &CliError) -> ! {
    let mut message = err.to_string();
    let mut cause = err.source();
    while let Some(inner) = cause {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        cause = inner.source();
    }
    eprintln!("layersync: {message}");
    std::process::exit(1);
}
