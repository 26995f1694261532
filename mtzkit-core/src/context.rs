//! Session context for diagnostics.
//!
//! A [`Context`] replaces process-wide state: program name, verbosity
//! and an optional user callback travel with the caller and are handed
//! to every operation that reports warnings or errors.

use std::fmt;

/// Severity of a reported condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational message.
    Info,
    /// Recoverable condition; processing continues.
    Warning,
    /// The current operation fails.
    Error,
    /// Unrecoverable for the session.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Callback invoked with `(severity, origin, message)`.
pub type SignalCallback = Box<dyn Fn(Severity, &str, &str) + Send + Sync>;

/// Diagnostics context passed to library operations.
pub struct Context {
    program_name: String,
    verbosity: u8,
    version: &'static str,
    callback: Option<SignalCallback>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            program_name: String::new(),
            verbosity: 1,
            version: env!("CARGO_PKG_VERSION"),
            callback: None,
        }
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("program_name", &self.program_name)
            .field("verbosity", &self.verbosity)
            .field("version", &self.version)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Context {
    /// Creates a context for the named program.
    #[must_use]
    pub fn new(program_name: impl Into<String>) -> Self {
        Self {
            program_name: program_name.into(),
            ..Self::default()
        }
    }

    /// Sets the verbosity. 0 silences informational and warning output.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Installs a callback that receives every signalled condition.
    #[must_use]
    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(Severity, &str, &str) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    #[must_use]
    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    /// Library version string.
    #[must_use]
    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Reports a condition through the `log` facade and the callback.
    ///
    /// Info and warning output is suppressed at verbosity 0; errors are
    /// always logged.
    pub fn signal(&self, severity: Severity, origin: &str, message: &str) {
        match severity {
            Severity::Info if self.verbosity > 0 => {
                log::info!("{origin}: {message}");
            }
            Severity::Warning if self.verbosity > 0 => {
                log::warn!("{origin}: {message}");
            }
            Severity::Error | Severity::Fatal => {
                log::error!("{origin}: {message}");
            }
            _ => {}
        }
        if let Some(cb) = &self.callback {
            cb(severity, origin, message);
        }
    }

    /// Shorthand for an informational signal.
    pub fn info(&self, origin: &str, message: &str) {
        self.signal(Severity::Info, origin, message);
    }

    /// Shorthand for a warning signal.
    pub fn warn(&self, origin: &str, message: &str) {
        self.signal(Severity::Warning, origin, message);
    }

    /// Shorthand for an error signal.
    pub fn error(&self, origin: &str, message: &str) {
        self.signal(Severity::Error, origin, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_callback_receives_signals() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ctx = Context::new("test").with_callback(move |sev, origin, msg| {
            sink.lock().unwrap().push((sev, origin.to_string(), msg.to_string()));
        });

        ctx.warn("reader", "minor version differs");
        ctx.error("writer", "disk full");

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].0, Severity::Warning);
        assert_eq!(seen[0].1, "reader");
        assert_eq!(seen[1].2, "disk full");
    }

    #[test]
    fn test_defaults() {
        let ctx = Context::default();
        assert_eq!(ctx.verbosity(), 1);
        assert_eq!(ctx.program_name(), "");
        assert!(!ctx.version().is_empty());
        assert!(Severity::Fatal > Severity::Warning);
    }
}
