//! Side-channel for failure reports.
//!
//! Bridge operations report failures as `None`/`false` to the host and send a
//! human-readable line to a [`Diagnostics`] sink. The default sink forwards to
//! `tracing`; hosts with their own console plug in their own implementation.

use std::cell::RefCell;

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warning,
}

/// Receiver of diagnostic messages.
pub trait Diagnostics {
    fn emit(&self, severity: Severity, message: &str);

    fn warning(&self, message: &str) {
        self.emit(Severity::Warning, message);
    }

    fn debug(&self, message: &str) {
        self.emit(Severity::Debug, message);
    }
}

/// Forwards every non-empty line of a message to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn emit(&self, severity: Severity, message: &str) {
        for line in message.lines().filter(|l| !l.trim().is_empty()) {
            match severity {
                Severity::Warning => tracing::warn!(target: "rustyhdf5_bridge", "{line}"),
                Severity::Debug => tracing::debug!(target: "rustyhdf5_bridge", "{line}"),
            }
        }
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    records: RefCell<Vec<(Severity, String)>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Severity, String)> {
        self.records.borrow().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.records
            .borrow()
            .iter()
            .filter(|(s, _)| *s == Severity::Warning)
            .map(|(_, m)| m.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.records.borrow_mut().clear();
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn emit(&self, severity: Severity, message: &str) {
        self.records.borrow_mut().push((severity, message.to_string()));
    }
}

impl<D: Diagnostics + ?Sized> Diagnostics for std::rc::Rc<D> {
    fn emit(&self, severity: Severity, message: &str) {
        (**self).emit(severity, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_keeps_order_and_severity() {
        let sink = RecordingDiagnostics::new();
        sink.warning("first");
        sink.debug("second");
        assert_eq!(
            sink.records(),
            vec![
                (Severity::Warning, "first".to_string()),
                (Severity::Debug, "second".to_string())
            ]
        );
        assert_eq!(sink.warnings(), vec!["first".to_string()]);
        sink.clear();
        assert!(sink.records().is_empty());
    }

    #[test]
    fn tracing_sink_accepts_multiline() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
        TracingDiagnostics.warning("line one\n\nline two\n");
    }
}
