//! `graft` binary entry point

use graft_cli::{cli, execute};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let mut stdout = std::io::stdout().lock();

    match execute(&matches, &mut stdout) {
        Ok(clean) => std::process::exit(if clean { 0 } else { 1 }),
        Err(err) => {
            tracing::error!("{:#}", err);
            std::process::exit(2);
        }
    }
}
