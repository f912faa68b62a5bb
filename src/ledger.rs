use std::fmt;

use serde::Serialize;

use crate::document::Node;
use crate::pointer::LocationPointer;

/// Severity of a recorded violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// ERROR and FATAL fail a rule, WARNING does not
    pub fn is_failure(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        })
    }
}

/// One recorded rule outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub severity: Severity,
    pub message: String,
    pub location: LocationPointer,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.severity, self.message, self.location)
    }
}

/// Append-only list of violations produced by one rule invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Ledger {
    entries: Vec<Violation>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a violation. Entries are never merged or deduplicated.
    pub fn record(
        &mut self,
        severity: Severity,
        message: impl Into<String>,
        location: LocationPointer,
    ) {
        self.entries.push(Violation {
            severity,
            message: message.into(),
            location,
        });
    }

    pub fn error(&mut self, node: Node<'_>, message: impl Into<String>) {
        self.record(Severity::Error, message, node.pointer());
    }

    pub fn warning(&mut self, node: Node<'_>, message: impl Into<String>) {
        self.record(Severity::Warning, message, node.pointer());
    }

    pub fn fatal(&mut self, node: Node<'_>, message: impl Into<String>) {
        self.record(Severity::Fatal, message, node.pointer());
    }

    /// True iff any entry is ERROR or FATAL
    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|v| v.severity.is_failure())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .iter()
            .filter(|v| v.severity == severity)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[Violation] {
        &self.entries
    }

    /// Human-readable rendering of every entry in insertion order
    pub fn report(&self) -> String {
        let mut out = format!(
            "{} violation{} recorded",
            self.entries.len(),
            if self.entries.len() == 1 { "" } else { "s" }
        );
        for violation in &self.entries {
            out.push('\n');
            out.push_str(&violation.to_string());
        }
        out
    }
}

impl<'a> IntoIterator for &'a Ledger {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ledger() {
        let ledger = Ledger::new();
        assert!(ledger.is_empty());
        assert!(!ledger.has_errors());
        assert_eq!(ledger.report(), "0 violations recorded");
    }

    #[test]
    fn test_warnings_do_not_count_as_errors() {
        let mut ledger = Ledger::new();
        ledger.record(Severity::Warning, "deprecated", LocationPointer::document());
        ledger.record(Severity::Warning, "deprecated", LocationPointer::document());
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.has_errors());

        ledger.record(Severity::Fatal, "broken", LocationPointer::document());
        assert!(ledger.has_errors());
        assert_eq!(ledger.count(Severity::Warning), 2);
        assert_eq!(ledger.count(Severity::Fatal), 1);
    }

    #[test]
    fn test_report_lists_entries_in_insertion_order() {
        let mut ledger = Ledger::new();
        ledger.record(Severity::Error, "first", LocationPointer::document());
        ledger.record(Severity::Warning, "second", LocationPointer::document());
        let report = ledger.report();
        let lines: Vec<_> = report.lines().collect();
        assert_eq!(lines[0], "2 violations recorded");
        assert_eq!(lines[1], "[ERROR] first (xpointer(/))");
        assert_eq!(lines[2], "[WARNING] second (xpointer(/))");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(!Severity::Warning.is_failure());
        assert!(Severity::Error.is_failure());
    }
}
