//! Structured logging plumbing. Dependents use this module rather than
//! importing `slog` directly so the drain configuration stays in one place.

pub use slog::{crit, debug, error, info, o, trace, warn};
pub use slog::{Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

const DEFAULT_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// Builds a terminal logger from the default TOML configuration.
pub fn term_logger() -> Logger {
    from_toml(DEFAULT_CONFIG).expect("Default logging config must be valid")
}

/// Builds a logger from a sloggers TOML configuration string.
pub fn from_toml(config: &str) -> Result<Logger, String> {
    let config: LoggerConfig = serdeconv::from_toml_str(config).map_err(|e| e.to_string())?;
    config.build_logger().map_err(|e| e.to_string())
}

/// A logger that discards all records. Used when no parent logger is supplied.
#[inline]
pub fn null_logger() -> Logger {
    Logger::root(Discard, o!())
}

/// Resolves an optional parent logger into a child logger, discarding records
/// when no parent is present.
#[inline]
pub fn child_of<'a, L: Into<Option<&'a Logger>>>(log: L) -> Logger {
    match log.into() {
        Some(log) => log.new(o!()),
        None => null_logger(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_builds() {
        let _ = term_logger();
    }

    #[test]
    fn test_null_logger_discards() {
        let log = null_logger();
        debug!(log, "dropped"; "key" => 1);
    }

    #[test]
    fn test_child_of_none() {
        let log = child_of(None);
        trace!(log, "dropped");
    }
}
