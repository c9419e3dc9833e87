//! The compiled validation procedure: a flat instruction list with labels.

use std::collections::BTreeMap;
use std::fmt;

use ruleweave_types::{Severity, Value};

use crate::message::CompiledMessage;
use crate::tree::{ConditionTest, TypeRef, ValidatorRef};

/// A jump target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub String);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A variable plus a field chain, e.g. `item_1_0.Address.City`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRef {
    pub var: String,
    pub fields: Vec<String>,
}

impl ValueRef {
    pub fn var(name: impl Into<String>) -> Self {
        Self {
            var: name.into(),
            fields: Vec::new(),
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.var)?;
        for field in &self.fields {
            write!(f, ".{field}")?;
        }
        Ok(())
    }
}

/// An evaluated argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    Read(ValueRef),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(Value::String(s)) => write!(f, "{s:?}"),
            Operand::Literal(Value::Null) => write!(f, "null"),
            Operand::Literal(v) => write!(f, "{v}"),
            Operand::Read(r) => write!(f, "{r}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PathPart {
    Name(String),
    /// The current value of a loop index variable.
    Index(String),
}

/// An error path with loop indices filled in at runtime.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PathTemplate {
    pub parts: Vec<PathPart>,
}

impl PathTemplate {
    /// Append a dotted segment; empty segments are ignored.
    pub fn child(&self, segment: &str) -> Self {
        let mut next = self.clone();
        if !segment.is_empty() {
            next.parts.push(PathPart::Name(segment.to_string()));
        }
        next
    }

    pub fn index(&self, var: &str) -> Self {
        let mut next = self.clone();
        next.parts.push(PathPart::Index(var.to_string()));
        next
    }

    /// Render, looking up loop indices with `index_of`.
    pub fn render(&self, mut index_of: impl FnMut(&str) -> usize) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                PathPart::Name(name) => {
                    if !out.is_empty() {
                        out.push('.');
                    }
                    out.push_str(name);
                }
                PathPart::Index(var) => {
                    out.push('[');
                    out.push_str(&index_of(var).to_string());
                    out.push(']');
                }
            }
        }
        out
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "<root>");
        }
        let mut first = true;
        for part in &self.parts {
            match part {
                PathPart::Name(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                PathPart::Index(var) => write!(f, "[{var}]")?,
            }
            first = false;
        }
        Ok(())
    }
}

/// A runtime boolean test.
#[derive(Debug, Clone, PartialEq)]
pub struct Test {
    pub subject: ValueRef,
    pub test: ConditionTest,
    pub negate: bool,
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negate {
            write!(f, "!")?;
        }
        match &self.test {
            ConditionTest::Truthy => write!(f, "truthy({})", self.subject),
            ConditionTest::NotNull => write!(f, "not_null({})", self.subject),
            ConditionTest::Predicate { key, args } => {
                write!(f, "{key}({}", self.subject)?;
                for arg in args {
                    write!(f, ", {}", Operand::Literal(arg.clone()))?;
                }
                write!(f, ")")
            }
        }
    }
}

/// How a failure is recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub code: String,
    pub message: CompiledMessage,
    pub severity: Severity,
    pub target_name: String,
    pub path: PathTemplate,
    pub metadata: Vec<(String, Value)>,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {:?} at {} msg {}",
            self.severity, self.code, self.target_name, self.path, self.message
        )?;
        for (key, value) in &self.metadata {
            write!(f, " meta {key}={}", Operand::Literal(value.clone()))?;
        }
        Ok(())
    }
}

/// One leaf rule check.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    /// Definition name.
    pub rule: String,
    pub predicate: String,
    pub type_args: Vec<TypeRef>,
    pub subject: ValueRef,
    pub args: Vec<Operand>,
    pub guard: Option<Test>,
    /// Skipped when the previous check failed.
    pub chained: bool,
    pub report: Report,
    pub halt: Option<Label>,
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.chained {
            write!(f, "else ")?;
        }
        write!(f, "check {}", self.predicate)?;
        if !self.type_args.is_empty() {
            let args: Vec<String> = self.type_args.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        write!(f, "({}", self.subject)?;
        for arg in &self.args {
            write!(f, ", {arg}")?;
        }
        write!(f, ")")?;
        if let Some(guard) = &self.guard {
            write!(f, " if {guard}")?;
        }
        write!(f, " else {}", self.report)?;
        if let Some(halt) = &self.halt {
            write!(f, " halt {halt}")?;
        }
        Ok(())
    }
}

/// A call into another validator.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateCall {
    pub validator: ValidatorRef,
    pub subject: ValueRef,
    pub path: PathTemplate,
    /// Type the subject was narrowed to by a polymorphic branch.
    pub narrowed_to: Option<String>,
    pub halt: Option<Label>,
}

impl fmt::Display for DelegateCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delegate {}({}", self.validator, self.subject)?;
        if let Some(ty) = &self.narrowed_to {
            write!(f, " as {ty}")?;
        }
        write!(f, ") at {}", self.path)?;
        if let Some(halt) = &self.halt {
            write!(f, " halt {halt}")?;
        }
        Ok(())
    }
}

/// One instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    Check(Box<Check>),
    /// Jump to `skip` unless `test` holds.
    Guard { test: Test, skip: Label },
    /// Start iterating `list`; jump to `exit` when it is empty or not a list.
    LoopStart {
        list: ValueRef,
        index: String,
        item: String,
        exit: Label,
    },
    /// Advance the loop; jump back to `body` while elements remain.
    LoopNext {
        index: String,
        item: String,
        body: Label,
    },
    Delegate(Box<DelegateCall>),
    /// Swap in an empty accumulator.
    Isolate,
    /// Pop the isolated accumulator into a named capture.
    Capture { name: String },
    JumpIfEmpty { capture: String, target: Label },
    JumpIfNotNull { subject: ValueRef, target: Label },
    /// First-match type dispatch: jump to `target` unless the subject is a `type_name`.
    JumpUnlessType {
        subject: ValueRef,
        type_name: String,
        target: Label,
    },
    /// Append a synthesized error.
    Fail {
        subject: ValueRef,
        report: Report,
        halt: Option<Label>,
    },
    Jump(Label),
    Label(Label),
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Check(check) => write!(f, "{check}"),
            Instr::Guard { test, skip } => write!(f, "guard {test} else {skip}"),
            Instr::LoopStart {
                list,
                index,
                item,
                exit,
            } => write!(f, "loop {index}, {item} in {list} else {exit}"),
            Instr::LoopNext { index, item, body } => write!(f, "next {index}, {item} -> {body}"),
            Instr::Delegate(call) => write!(f, "{call}"),
            Instr::Isolate => write!(f, "isolate"),
            Instr::Capture { name } => write!(f, "capture {name}"),
            Instr::JumpIfEmpty { capture, target } => write!(f, "jump_if_empty {capture} {target}"),
            Instr::JumpIfNotNull { subject, target } => {
                write!(f, "jump_if_not_null {subject} {target}")
            }
            Instr::JumpUnlessType {
                subject,
                type_name,
                target,
            } => write!(f, "jump_unless {subject} is {type_name} {target}"),
            Instr::Fail {
                subject,
                report,
                halt,
            } => {
                write!(f, "fail({subject}) {report}")?;
                if let Some(halt) = halt {
                    write!(f, " halt {halt}")?;
                }
                Ok(())
            }
            Instr::Jump(label) => write!(f, "jump {label}"),
            Instr::Label(label) => write!(f, "{label}:"),
        }
    }
}

/// One compiled validator body.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub subject: TypeRef,
    pub root_variable: String,
    /// Leaf rule count of the tree; sizes the accumulator.
    pub capacity_hint: usize,
    pub instructions: Vec<Instr>,
    labels: BTreeMap<Label, usize>,
}

impl Procedure {
    pub fn new(
        name: impl Into<String>,
        subject: TypeRef,
        root_variable: impl Into<String>,
        capacity_hint: usize,
        instructions: Vec<Instr>,
    ) -> Self {
        let labels = instructions
            .iter()
            .enumerate()
            .filter_map(|(pc, instr)| match instr {
                Instr::Label(label) => Some((label.clone(), pc)),
                _ => None,
            })
            .collect();
        Self {
            name: name.into(),
            subject,
            root_variable: root_variable.into(),
            capacity_hint,
            instructions,
            labels,
        }
    }

    /// Instruction index of a label.
    pub fn label(&self, label: &Label) -> Option<usize> {
        self.labels.get(label).copied()
    }

    /// Every label an instruction jumps to, in instruction order.
    pub fn jump_targets(&self) -> impl Iterator<Item = &Label> {
        self.instructions.iter().filter_map(|instr| match instr {
            Instr::Check(c) => c.halt.as_ref(),
            Instr::Delegate(d) => d.halt.as_ref(),
            Instr::Fail { halt, .. } => halt.as_ref(),
            Instr::Guard { skip, .. } => Some(skip),
            Instr::LoopStart { exit, .. } => Some(exit),
            Instr::LoopNext { body, .. } => Some(body),
            Instr::JumpIfEmpty { target, .. }
            | Instr::JumpIfNotNull { target, .. }
            | Instr::JumpUnlessType { target, .. } => Some(target),
            Instr::Jump(label) => Some(label),
            Instr::Isolate | Instr::Capture { .. } | Instr::Label(_) => None,
        })
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "procedure {}({}: {}) capacity {}",
            self.name, self.root_variable, self.subject, self.capacity_hint
        )?;
        for instr in &self.instructions {
            match instr {
                Instr::Label(_) => writeln!(f, "{instr}")?,
                _ => writeln!(f, "    {instr}")?,
            }
        }
        Ok(())
    }
}
