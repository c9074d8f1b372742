use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

const DEFAULT_DB_PATH: &str = "mentorlink.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Connection settings for [`crate::Database`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
    /// How long a statement waits on a locked database before giving up.
    /// This is the only timeout the core relies on.
    pub busy_timeout: Duration,
    /// Apply optional-column DDL on first use. When off, optional columns are
    /// only probed and absent ones read back as NULL.
    pub auto_evolve: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            auto_evolve: true,
        }
    }

    pub fn without_evolution(mut self) -> Self {
        self.auto_evolve = false;
        self
    }

    /// Reads `MENTORLINK_DB_PATH`, `MENTORLINK_BUSY_TIMEOUT_MS` and
    /// `MENTORLINK_AUTO_EVOLVE`, falling back to defaults.
    pub fn from_env() -> Self {
        let path = std::env::var("MENTORLINK_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.into());

        let busy_timeout_ms = match std::env::var("MENTORLINK_BUSY_TIMEOUT_MS") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Ignoring invalid MENTORLINK_BUSY_TIMEOUT_MS '{}'", raw);
                DEFAULT_BUSY_TIMEOUT_MS
            }),
            Err(_) => DEFAULT_BUSY_TIMEOUT_MS,
        };

        let auto_evolve = std::env::var("MENTORLINK_AUTO_EVOLVE")
            .map(|raw| parse_flag(&raw))
            .unwrap_or(true);

        Self {
            path: PathBuf::from(path),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            auto_evolve,
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_defaults_to_enabled() {
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(parse_flag(""));
        assert!(!parse_flag("off"));
        assert!(!parse_flag(" FALSE "));
    }

    #[test]
    fn builder_disables_evolution() {
        let config = DbConfig::new("x.db").without_evolution();
        assert!(!config.auto_evolve);
        assert_eq!(config.busy_timeout, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS));
    }
}
