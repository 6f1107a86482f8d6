//! Tracing subscriber setup. Logs go to stderr so command output on stdout stays clean.

use anyhow::{Context, Result};
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

/// Level for the crate's own events: `--quiet` wins, then each `-v` steps up from INFO.
pub fn level_for(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the computed filter.
pub fn init(verbose: u8, quiet: bool) -> Result<()> {
    let level = level_for(verbose, quiet);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "lbcscan={},hyper=warn,reqwest=warn,rustls=warn",
            level
        ))
    });
    fmt()
        .with_env_filter(env_filter)
        .with_target(verbose > 0)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(anyhow::Error::msg)
        .context("Failed to initialize tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(level_for(2, true), Level::ERROR);
    }

    #[test]
    fn verbosity_steps() {
        assert_eq!(level_for(0, false), Level::INFO);
        assert_eq!(level_for(1, false), Level::DEBUG);
        assert_eq!(level_for(5, false), Level::TRACE);
    }
}
