//! Case file parser and runner.
//!
//! Parses the `tests/cases/*.test` format:
//!
//! ```text
//! # test: name
//! --- tree
//! { ...rule tree JSON... }
//! --- value
//! { ...value JSON... }
//! --- expect
//! NotEmpty @ Name
//! GreaterThan @ Orders[1].Total
//! ===
//! ```
//!
//! The expect block is one `CODE @ path` line per error in order, `valid`
//! for no errors, or `compile error: <text>` when compilation must fail
//! with a message containing `<text>`. A `# skip: reason` line after the
//! header skips the case.

use anyhow::{Context, Result};

use ruleweave_kernel::prelude::*;

use crate::{CaseOutcome, CaseReport};

/// A single case.
#[derive(Debug, Clone)]
pub struct CaseFile {
    /// Test name from the `# test: name` line.
    pub name: String,
    /// Line number where the case starts (1-indexed).
    pub line_number: usize,
    pub tree: String,
    pub value: String,
    pub expected: CaseExpectation,
    pub skip: Option<String>,
}

/// What a case expects.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseExpectation {
    /// `CODE @ path` lines, in record order; empty means valid.
    Errors(Vec<String>),
    /// Compilation fails with a message containing this text.
    CompileError(String),
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Tree,
    Value,
    Expect,
}

/// Parse the *.test case format.
pub fn parse_cases(content: &str) -> Vec<CaseFile> {
    let mut cases = Vec::new();
    let mut current: Option<(String, usize, Option<String>)> = None;
    let mut section = Section::None;
    let (mut tree, mut value, mut expect) = (Vec::new(), Vec::new(), Vec::new());

    for (i, raw) in content.lines().enumerate() {
        let line = raw.trim();

        if let Some(name) = line.strip_prefix("# test:") {
            current = Some((name.trim().to_string(), i + 1, None));
            section = Section::None;
            tree.clear();
            value.clear();
            expect.clear();
            continue;
        }
        let Some((name, line_number, skip)) = current.as_mut() else {
            continue;
        };

        match line {
            "--- tree" => section = Section::Tree,
            "--- value" => section = Section::Value,
            "--- expect" => section = Section::Expect,
            "===" => {
                cases.push(CaseFile {
                    name: name.clone(),
                    line_number: *line_number,
                    tree: tree.join("\n"),
                    value: value.join("\n"),
                    expected: expectation(&expect),
                    skip: skip.take(),
                });
                current = None;
                section = Section::None;
            }
            _ if section == Section::None => {
                if let Some(reason) = line.strip_prefix("# skip:") {
                    *skip = Some(reason.trim().to_string());
                }
            }
            _ => match section {
                Section::Tree => tree.push(raw),
                Section::Value => value.push(raw),
                Section::Expect if !line.is_empty() => expect.push(line),
                _ => {}
            },
        }
    }

    cases
}

fn expectation(lines: &[&str]) -> CaseExpectation {
    if let [only] = lines {
        if let Some(text) = only.strip_prefix("compile error:") {
            return CaseExpectation::CompileError(text.trim().to_string());
        }
        if *only == "valid" {
            return CaseExpectation::Errors(Vec::new());
        }
    }
    CaseExpectation::Errors(lines.iter().map(|l| normalize(l)).collect())
}

/// Collapse whitespace around the `@`.
fn normalize(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn error_lines(result: &ValidationResult) -> Vec<String> {
    result
        .errors
        .iter()
        .map(|e| normalize(&format!("{} @ {}", e.code, e.target_path)))
        .collect()
}

impl CaseFile {
    /// Run this case with the builtin catalog and runtime.
    pub fn run(&self) -> CaseOutcome {
        if let Some(reason) = &self.skip {
            return CaseOutcome::Skip {
                reason: reason.clone(),
            };
        }

        // shape errors surface from from_json, so they count as compile errors
        let compiled = RuleTree::from_json(&self.tree)
            .map_err(|e| e.to_string())
            .and_then(|tree| {
                Compiler::with_builtins()
                    .compile(&tree)
                    .map_err(|e| e.to_string())
            });

        match (compiled, &self.expected) {
            (Err(actual), CaseExpectation::CompileError(text)) => {
                if actual.contains(text.as_str()) {
                    CaseOutcome::Pass
                } else {
                    CaseOutcome::CompileErrorDiffers {
                        expected: text.clone(),
                        actual,
                    }
                }
            }
            (Err(message), CaseExpectation::Errors(_)) => CaseOutcome::CompileFailed { message },
            (Ok(_), CaseExpectation::CompileError(text)) => CaseOutcome::CompiledUnexpectedly {
                expected: text.clone(),
            },
            (Ok(validator), CaseExpectation::Errors(expected)) => {
                match self.validate(&validator) {
                    Ok(result) => {
                        let actual = error_lines(&result);
                        if &actual == expected {
                            CaseOutcome::Pass
                        } else {
                            CaseOutcome::ErrorsDiffer {
                                expected: expected.clone(),
                                actual,
                            }
                        }
                    }
                    Err(e) => CaseOutcome::Fault {
                        message: format!("{e:#}"),
                    },
                }
            }
        }
    }

    fn validate(&self, validator: &CompiledValidator) -> Result<ValidationResult> {
        let json: serde_json::Value =
            serde_json::from_str(&self.value).context("value is not valid JSON")?;
        let value = Value::from_json(&json);
        validator
            .validate(&value, &Runtime::new())
            .with_context(|| format!("running {}", validator.procedure().name))
    }
}

/// Run every case and tally the outcomes.
pub fn run_cases(cases: &[CaseFile]) -> CaseReport {
    let mut report = CaseReport::new();
    for case in cases {
        report.record(&case.name, case.line_number, case.run());
    }
    report
}
