//! Logging setup

use crate::config::Config;
use tracing_subscriber::EnvFilter;

fn directive(level: &str) -> String {
    format!("document_approval={}", level.trim())
}

/// Install a stderr subscriber filtered to this crate at `level`
/// (`error`, `warn`, `info`, `debug` or `trace`).
pub fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(directive(level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logging subscriber: {e}"))
}

/// Install the subscriber at the config's `logging_level`.
pub fn init_from_config(config: &Config) -> anyhow::Result<()> {
    init_logging(config.logging_level())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_uses_configured_level() {
        let config = Config::from_toml_str("logging_level = \" warn \"").unwrap();
        assert_eq!(directive(config.logging_level()), "document_approval=warn");

        let defaults = Config::default();
        assert_eq!(directive(defaults.logging_level()), "document_approval=info");
    }

    // the global subscriber can only be installed once per test binary
    #[test]
    fn second_initialisation_is_an_error_not_a_panic() {
        let config = Config::from_toml_str("logging_level = \"debug\"").unwrap();
        let _ = init_from_config(&config);
        assert!(init_logging("debug").is_err());
        assert!(init_from_config(&config).is_err());
    }
}
