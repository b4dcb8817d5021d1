use std::fmt::Display;
use std::sync::Arc;

/// Severity threshold for the per-device logger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Silent,
    Error,
    Verbose,
}

/// Diagnostic sink carrying a fixed `(<interface>) ` prefix.
///
/// Constructed once per process, after the effective interface name is known,
/// and handed to every component that logs. Emits through `tracing`, so the
/// subscriber installed in `main` still controls formatting and filtering.
#[derive(Clone)]
pub struct Logger {
    level: LogLevel,
    prefix: Arc<str>,
}

impl Logger {
    pub fn new(level: LogLevel, interface_name: &str) -> Self {
        Self {
            level,
            prefix: format!("({}) ", interface_name).into(),
        }
    }

    pub fn verbose(&self, msg: impl Display) {
        if self.level >= LogLevel::Verbose {
            tracing::info!("{}{}", self.prefix, msg);
        }
    }

    pub fn error(&self, msg: impl Display) {
        if self.level >= LogLevel::Error {
            tracing::error!("{}{}", self.prefix, msg);
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_format() {
        let logger = Logger::new(LogLevel::Verbose, "tun3");
        assert_eq!(logger.prefix(), "(tun3) ");
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Verbose > LogLevel::Error);
        assert!(LogLevel::Error > LogLevel::Silent);
    }
}
