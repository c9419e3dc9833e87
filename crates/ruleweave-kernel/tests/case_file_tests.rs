//! Integration tests driven by the case file format.

use ruleweave_testutil::cases::{parse_cases, run_cases};

const RULES_TEST: &str = include_str!("../../../tests/cases/rules.test");

#[test]
fn run_rules_case_file() {
    let cases = parse_cases(RULES_TEST);
    assert!(!cases.is_empty(), "no cases parsed from rules.test");

    let report = run_cases(&cases);
    println!("{report}");

    if !report.all_passed() {
        panic!(
            "rules.test: {} mismatched and {} broken out of {} cases",
            report.mismatched,
            report.broken,
            report.total()
        );
    }
}
