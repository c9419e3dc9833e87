//! End-to-end tests of the CLI commands against files on disk.

use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::TempDir;

use ruleweave_cli::{Cli, Command, TreeArgs, check, compile, run};

const PERSON_TREE: &str = r#"{
  "name": "PersonValidator",
  "subject": { "name": "Person" },
  "nodes": [
    {
      "kind": "target",
      "target": { "accessor": ["Name"], "type": { "name": "string" }, "display_name": "Name", "path_segment": "Name" },
      "rules": [
        {
          "target": { "accessor": ["Name"], "type": { "name": "string" }, "display_name": "Name", "path_segment": "Name" },
          "rule": { "weak": { "invocation": "NotEmpty" } }
        }
      ]
    }
  ]
}"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

fn tree_args(tree: &Path, config: Option<PathBuf>) -> TreeArgs {
    TreeArgs {
        tree: tree.to_path_buf(),
        config,
    }
}

#[test]
fn compile_prints_the_listing() {
    let dir = TempDir::new().unwrap();
    let tree = write(&dir, "person.json", PERSON_TREE);

    let listing = compile(&tree_args(&tree, None)).unwrap();
    assert!(listing.starts_with("procedure PersonValidator(instance: Person)"), "{listing}");
}

#[test]
fn config_file_renames_the_root_variable() {
    let dir = TempDir::new().unwrap();
    let tree = write(&dir, "person.json", PERSON_TREE);
    let config = write(&dir, "ruleweave.toml", "root_variable = \"subject\"\n");

    let listing = compile(&tree_args(&tree, Some(config))).unwrap();
    assert!(listing.starts_with("procedure PersonValidator(subject: Person)"), "{listing}");
}

#[rstest]
#[case::valid(r#"{ "$type": "Person", "Name": "Ada" }"#, true, 0)]
#[case::empty_name(r#"{ "$type": "Person", "Name": "" }"#, false, 1)]
fn check_reports_errors_as_json(#[case] value: &str, #[case] success: bool, #[case] count: usize) {
    let dir = TempDir::new().unwrap();
    let tree = write(&dir, "person.json", PERSON_TREE);
    let value = write(&dir, "value.json", value);

    let outcome = check(&tree_args(&tree, None), &value).unwrap();
    assert_eq!(outcome.success, success);

    let errors: Vec<serde_json::Value> = serde_json::from_str(&outcome.output).unwrap();
    assert_eq!(errors.len(), count);
    if let Some(first) = errors.first() {
        assert_eq!(first["code"], "NotEmpty");
        assert_eq!(first["target_path"], "Name");
        assert_eq!(first["message"], "'Name' must not be empty.");
    }
}

#[test]
fn unresolved_rule_fails_with_context() {
    let dir = TempDir::new().unwrap();
    let tree = write(&dir, "bad.json", &PERSON_TREE.replace("NotEmpty", "Palindrome"));

    let err = compile(&tree_args(&tree, None)).unwrap_err();
    let report = format!("{err:#}");
    assert!(report.contains("Failed to compile PersonValidator"), "{report}");
    assert!(report.contains("cannot resolve rule 'Palindrome(string)'"), "{report}");
}

#[test]
fn missing_tree_file_names_the_path() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("nope.json");

    let err = compile(&tree_args(&missing, None)).unwrap_err();
    assert!(format!("{err:#}").contains("nope.json"));
}

#[test]
fn malformed_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let tree = write(&dir, "person.json", PERSON_TREE);
    let config = write(&dir, "ruleweave.toml", "root_variable = [\n");

    let err = compile(&tree_args(&tree, Some(config))).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to load config"));
}

#[test]
fn catalog_command_succeeds() {
    let outcome = run(Cli {
        command: Command::Catalog,
    })
    .unwrap();
    assert!(outcome.success);
    assert!(outcome.output.contains("NotEmpty"));
}
