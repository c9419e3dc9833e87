//! ruleweave command-line front end.
//!
//! ```bash
//! ruleweave compile --tree person.json
//! ruleweave check --tree person.json --value alice.json
//! ruleweave catalog
//! ```
//!
//! Each command returns its stdout text so the binary stays a thin shell
//! around [`run`].

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};

use ruleweave_kernel::prelude::*;

/// Compile declarative rule trees into validation procedures.
#[derive(Parser, Debug)]
#[command(name = "ruleweave", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a rule tree and print the procedure listing
    Compile(TreeArgs),
    /// Validate a JSON value and print the errors as JSON
    Check {
        #[command(flatten)]
        tree: TreeArgs,

        /// JSON value to validate
        #[arg(long)]
        value: PathBuf,
    },
    /// List the builtin rule definitions
    Catalog,
}

#[derive(Args, Debug, Clone)]
pub struct TreeArgs {
    /// Rule tree JSON file
    #[arg(long)]
    pub tree: PathBuf,

    /// Compiler configuration (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// What a command printed, and whether the process should report failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub output: String,
    pub success: bool,
}

impl Outcome {
    fn ok(output: String) -> Self {
        Self {
            output,
            success: true,
        }
    }
}

pub fn run(cli: Cli) -> Result<Outcome> {
    match cli.command {
        Command::Compile(args) => compile(&args).map(Outcome::ok),
        Command::Check { tree, value } => check(&tree, &value),
        Command::Catalog => Ok(Outcome::ok(catalog_listing(&Catalog::builtin()))),
    }
}

impl TreeArgs {
    fn compiler(&self) -> Result<Compiler> {
        let config = match &self.config {
            Some(path) => CompilerConfig::load(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => CompilerConfig::default(),
        };
        Ok(Compiler::with_builtins().with_config(config))
    }

    fn load_tree(&self) -> Result<RuleTree> {
        let source = read(&self.tree)?;
        RuleTree::from_json(&source)
            .with_context(|| format!("Invalid rule tree {}", self.tree.display()))
    }

    fn compile(&self) -> Result<CompiledValidator> {
        let compiler = self.compiler()?;
        let tree = self.load_tree()?;
        let validator = compiler
            .compile(&tree)
            .with_context(|| format!("Failed to compile {}", tree.name))?;
        info!(validator = %tree.name, "compiled");
        Ok(validator)
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// The procedure listing for a tree.
pub fn compile(args: &TreeArgs) -> Result<String> {
    let validator = args.compile()?;
    Ok(validator.procedure().to_string())
}

/// Validate one value; fails the process when the value is invalid.
pub fn check(args: &TreeArgs, value_path: &Path) -> Result<Outcome> {
    let validator = args.compile()?;
    let json: serde_json::Value = serde_json::from_str(&read(value_path)?)
        .with_context(|| format!("Invalid JSON value {}", value_path.display()))?;
    let value = Value::from_json(&json);

    let result = validator
        .validate(&value, &Runtime::new())
        .with_context(|| format!("Validation of {} faulted", value_path.display()))?;
    debug!(errors = result.errors.len(), "checked");

    let output = serde_json::to_string_pretty(&result.errors)?;
    Ok(Outcome {
        output,
        success: result.is_valid(),
    })
}

/// One line per definition: signature, code, and message template.
pub fn catalog_listing(catalog: &Catalog) -> String {
    let width = catalog
        .iter()
        .map(|d| d.to_string().len())
        .max()
        .unwrap_or(0);
    catalog
        .iter()
        .map(|d| format!("{:<width$}  {:<20}  {}", d.to_string(), d.code, d.message))
        .collect::<Vec<_>>()
        .join("\n")
}
