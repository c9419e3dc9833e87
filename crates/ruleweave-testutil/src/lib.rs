//! Test utilities for ruleweave.
//!
//! Provides the parser and runner for `tests/cases/*.test`: a JSON rule
//! tree, a JSON value, and the expected error list, compiled and run
//! end to end.

pub mod cases;

use std::fmt;

/// How a single case came out.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseOutcome {
    Pass,
    /// The recorded `CODE @ path` lines differ from the expected ones.
    ErrorsDiffer {
        expected: Vec<String>,
        actual: Vec<String>,
    },
    /// Compilation failed, but not with the expected text.
    CompileErrorDiffers { expected: String, actual: String },
    /// Compilation was expected to fail and did not.
    CompiledUnexpectedly { expected: String },
    /// Compilation failed where a validation run was expected.
    CompileFailed { message: String },
    /// The value did not parse or the run faulted.
    Fault { message: String },
    Skip { reason: String },
}

impl CaseOutcome {
    pub fn is_pass(&self) -> bool {
        matches!(self, CaseOutcome::Pass)
    }

    /// A wrong answer, as opposed to a case that could not run.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            CaseOutcome::ErrorsDiffer { .. }
                | CaseOutcome::CompileErrorDiffers { .. }
                | CaseOutcome::CompiledUnexpectedly { .. }
        )
    }
}

/// Tally of a case file run.
#[derive(Debug, Default)]
pub struct CaseReport {
    pub passed: usize,
    pub mismatched: usize,
    pub skipped: usize,
    pub broken: usize,
    pub failures: Vec<CaseFailure>,
}

/// A case that did not pass, with where it starts in the file.
#[derive(Debug, Clone)]
pub struct CaseFailure {
    pub name: String,
    pub line: usize,
    pub outcome: CaseOutcome,
}

impl CaseReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, line: usize, outcome: CaseOutcome) {
        match outcome {
            CaseOutcome::Pass => self.passed += 1,
            CaseOutcome::Skip { .. } => self.skipped += 1,
            outcome => {
                if outcome.is_mismatch() {
                    self.mismatched += 1;
                } else {
                    self.broken += 1;
                }
                self.failures.push(CaseFailure {
                    name: name.into(),
                    line,
                    outcome,
                });
            }
        }
    }

    pub fn total(&self) -> usize {
        self.passed + self.mismatched + self.skipped + self.broken
    }

    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CaseReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "cases: {} total, {} passed, {} mismatched, {} broken, {} skipped",
            self.total(),
            self.passed,
            self.mismatched,
            self.broken,
            self.skipped
        )?;
        for failure in &self.failures {
            writeln!(f, "\n{} (line {})", failure.name, failure.line)?;
            write_outcome(f, &failure.outcome)?;
        }
        Ok(())
    }
}

fn write_outcome(f: &mut fmt::Formatter<'_>, outcome: &CaseOutcome) -> fmt::Result {
    match outcome {
        CaseOutcome::ErrorsDiffer { expected, actual } => {
            for i in 0..expected.len().max(actual.len()) {
                match (expected.get(i), actual.get(i)) {
                    (Some(e), Some(a)) if e == a => writeln!(f, "    error {i}: {a}")?,
                    (Some(e), Some(a)) => writeln!(f, "  ! error {i}: expected {e}, got {a}")?,
                    (Some(e), None) => writeln!(f, "  - error {i}: missing {e}")?,
                    (None, Some(a)) => writeln!(f, "  + error {i}: unexpected {a}")?,
                    (None, None) => {}
                }
            }
            if actual.is_empty() {
                writeln!(f, "  value was valid")?;
            }
        }
        CaseOutcome::CompileErrorDiffers { expected, actual } => {
            writeln!(f, "  compile error did not mention {expected:?}")?;
            writeln!(f, "  got: {actual}")?;
        }
        CaseOutcome::CompiledUnexpectedly { expected } => {
            writeln!(f, "  compiled, expected a compile error mentioning {expected:?}")?;
        }
        CaseOutcome::CompileFailed { message } => writeln!(f, "  compile failed: {message}")?,
        CaseOutcome::Fault { message } => writeln!(f, "  fault: {message}")?,
        CaseOutcome::Pass | CaseOutcome::Skip { .. } => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn report_counts_each_outcome() {
        let mut report = CaseReport::new();
        report.record("a", 1, CaseOutcome::Pass);
        report.record(
            "b",
            5,
            CaseOutcome::ErrorsDiffer {
                expected: Vec::new(),
                actual: lines(&["NotEmpty @ Name"]),
            },
        );
        report.record("c", 9, CaseOutcome::Skip { reason: "later".into() });
        report.record("d", 12, CaseOutcome::Fault { message: "bad json".into() });

        assert_eq!(report.total(), 4);
        assert_eq!(
            (report.passed, report.mismatched, report.skipped, report.broken),
            (1, 1, 1, 1)
        );
        assert!(!report.all_passed());
        let text = report.to_string();
        assert!(text.contains("b (line 5)"));
        assert!(text.contains("+ error 0: unexpected NotEmpty @ Name"));
        assert!(text.contains("fault: bad json"));
    }

    #[test]
    fn error_lines_are_compared_by_position() {
        let mut report = CaseReport::new();
        report.record(
            "orders",
            3,
            CaseOutcome::ErrorsDiffer {
                expected: lines(&["NotEmpty @ Name", "GreaterThan @ Orders[1].Total"]),
                actual: lines(&["NotEmpty @ Name", "GreaterThan @ Orders[0].Total"]),
            },
        );
        let text = report.to_string();
        assert!(text.contains("    error 0: NotEmpty @ Name"));
        assert!(text.contains(
            "! error 1: expected GreaterThan @ Orders[1].Total, got GreaterThan @ Orders[0].Total"
        ));
        assert!(!text.contains("value was valid"));
    }
}
