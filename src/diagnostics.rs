//! Deferred log records collected while a runtime is assembled
//!
//! Building the command tree happens before the final log level is known (it is itself a
//! global flag), so components record what they want to report here and the runtime flushes
//! the sink to `log` once the level has been applied.

use log::Level;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: Level,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: Level, message: impl Into<String>) {
        self.entries.push(Diagnostic {
            level,
            message: message.into(),
        });
    }

    pub fn debug(&mut self, message: impl Into<String>) {
        self.push(Level::Debug, message);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.push(Level::Warn, message);
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.push(Level::Error, message);
    }

    #[must_use]
    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    /// Entries recorded at exactly `level`
    pub fn at(&self, level: Level) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |d| d.level == level)
            .map(|d| d.message.as_str())
    }

    /// Emit every recorded entry through `log` and clear the sink
    pub fn flush(&mut self) {
        for diagnostic in self.entries.drain(..) {
            log::log!(target: "centry", diagnostic.level, "{}", diagnostic.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_keep_insertion_order() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.debug("one");
        diagnostics.warn("two");
        diagnostics.error("three");
        let messages: Vec<&str> = diagnostics
            .entries()
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(messages, vec!["one", "two", "three"]);
        assert_eq!(diagnostics.at(Level::Warn).collect::<Vec<_>>(), vec!["two"]);
    }

    #[test]
    fn test_flush_drains() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.debug("hello");
        diagnostics.flush();
        assert!(diagnostics.entries().is_empty());
    }
}
