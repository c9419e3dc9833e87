//! Step interpreter for compiled procedures.
//!
//! The machine owns all per-run state (variables, loop indices, the error
//! accumulator), so one procedure can be run by many callers at once.
//! [`Machine::step`] executes instructions until it reaches a delegate call
//! or the end; the driver performs the call and hands the errors back with
//! [`Machine::complete_delegate`].

use std::collections::{BTreeMap, HashMap};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use ruleweave_types::{ValidationError, Value};

use super::registry::Runtime;
use super::validator::Validator;
use super::RuntimeFault;
use crate::emit::{Instr, Label, Operand, PathTemplate, Procedure, Report, Test, ValueRef};
use crate::message::Slot;
use crate::tree::{ConditionTest, ValidatorRef};

/// A delegate call the driver must perform.
#[derive(Debug, Clone)]
pub struct DelegateRequest {
    pub validator: ValidatorRef,
    pub subject: Value,
    /// Rendered path, passed to the delegate as its inherited prefix.
    pub path: String,
    pub halt: Option<Label>,
}

/// Outcome of one [`Machine::step`].
#[derive(Debug)]
pub enum Step {
    Delegate(DelegateRequest),
    Done,
}

pub struct Machine<'p> {
    procedure: &'p Procedure,
    inherited_path: String,
    pc: usize,
    vars: HashMap<String, Value>,
    indices: HashMap<String, usize>,
    lists: HashMap<String, Vec<Value>>,
    accumulator: Option<Vec<ValidationError>>,
    isolated: Vec<Option<Vec<ValidationError>>>,
    captures: HashMap<String, Vec<ValidationError>>,
    /// Whether the last evaluated check failed; chained checks skip on it.
    last_failed: bool,
}

impl<'p> Machine<'p> {
    pub fn new(procedure: &'p Procedure, value: &Value, inherited_path: &str) -> Self {
        let mut vars = HashMap::new();
        vars.insert(procedure.root_variable.clone(), value.clone());
        Self {
            procedure,
            inherited_path: inherited_path.to_string(),
            pc: 0,
            vars,
            indices: HashMap::new(),
            lists: HashMap::new(),
            accumulator: None,
            isolated: Vec::new(),
            captures: HashMap::new(),
            last_failed: false,
        }
    }

    /// The collected errors.
    pub fn finish(self) -> Vec<ValidationError> {
        self.accumulator.unwrap_or_default()
    }

    fn jump(&mut self, label: &Label) -> Result<(), RuntimeFault> {
        self.pc = self
            .procedure
            .label(label)
            .ok_or_else(|| RuntimeFault::Malformed(format!("unknown label {label}")))?;
        Ok(())
    }

    fn record(&mut self, error: ValidationError) {
        let capacity = self.procedure.capacity_hint;
        self.accumulator
            .get_or_insert_with(|| Vec::with_capacity(capacity))
            .push(error);
    }

    fn read(&self, reference: &ValueRef) -> Result<Value, RuntimeFault> {
        let mut current = self
            .vars
            .get(&reference.var)
            .ok_or_else(|| RuntimeFault::Malformed(format!("unbound variable {}", reference.var)))?;
        for field in &reference.fields {
            match current.field(field) {
                Some(value) => current = value,
                None => return Ok(Value::Null),
            }
        }
        Ok(current.clone())
    }

    fn operand(&self, operand: &Operand) -> Result<Value, RuntimeFault> {
        match operand {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Read(reference) => self.read(reference),
        }
    }

    fn render_path(&self, template: &PathTemplate) -> String {
        let rendered = template.render(|var| self.indices.get(var).copied().unwrap_or(0));
        if self.inherited_path.is_empty() {
            rendered
        } else if rendered.is_empty() {
            self.inherited_path.clone()
        } else if rendered.starts_with('[') {
            format!("{}{rendered}", self.inherited_path)
        } else {
            format!("{}.{rendered}", self.inherited_path)
        }
    }

    fn eval_test(&self, test: &Test, runtime: &Runtime) -> Result<bool, RuntimeFault> {
        let subject = self.read(&test.subject)?;
        let holds = match &test.test {
            ConditionTest::Truthy => subject.is_truthy(),
            ConditionTest::NotNull => !subject.is_null(),
            ConditionTest::Predicate { key, args } => {
                let predicate = runtime
                    .predicates
                    .get(key)
                    .ok_or_else(|| RuntimeFault::UnknownPredicate(key.clone()))?;
                predicate
                    .test(&subject, args)
                    .map_err(|message| RuntimeFault::Predicate {
                        predicate: key.clone(),
                        path: test.subject.to_string(),
                        message,
                    })?
            }
        };
        Ok(holds != test.negate)
    }

    fn build_error(&self, report: &Report, subject: Value, args: &[Value]) -> ValidationError {
        let path = self.render_path(&report.path);
        let message = report.message.render(|slot| match slot {
            Slot::AttemptedValue => subject.clone(),
            Slot::TargetPath => Value::String(path.clone()),
            Slot::TotalLength => subject
                .len()
                .map(|n| Value::Int(n as i64))
                .unwrap_or(Value::Null),
            Slot::Argument(i) => args.get(i).cloned().unwrap_or(Value::Null),
        });
        let mut error = ValidationError::new(
            report.code.clone(),
            message,
            report.target_name.clone(),
            path,
            subject,
        )
        .with_severity(report.severity);
        error.metadata = report
            .metadata
            .iter()
            .cloned()
            .collect::<BTreeMap<String, Value>>();
        error
    }

    /// Merge a delegate's errors; jump to its halt label if it reported any.
    pub fn complete_delegate(
        &mut self,
        halt: Option<&Label>,
        errors: Vec<ValidationError>,
    ) -> Result<(), RuntimeFault> {
        if errors.is_empty() {
            return Ok(());
        }
        match &mut self.accumulator {
            Some(existing) => existing.extend(errors),
            None => self.accumulator = Some(errors),
        }
        if let Some(label) = halt {
            self.jump(label)?;
        }
        Ok(())
    }

    /// Execute instructions until a delegate call or the end.
    pub fn step(&mut self, runtime: &Runtime) -> Result<Step, RuntimeFault> {
        let procedure = self.procedure;
        while let Some(instr) = procedure.instructions.get(self.pc) {
            match instr {
                Instr::Check(check) => {
                    if check.chained && self.last_failed {
                        self.pc += 1;
                        continue;
                    }
                    if let Some(guard) = &check.guard {
                        if !self.eval_test(guard, runtime)? {
                            self.last_failed = false;
                            self.pc += 1;
                            continue;
                        }
                    }

                    let subject = self.read(&check.subject)?;
                    let args = check
                        .args
                        .iter()
                        .map(|op| self.operand(op))
                        .collect::<Result<Vec<_>, _>>()?;
                    let predicate = runtime
                        .predicates
                        .get(&check.predicate)
                        .ok_or_else(|| RuntimeFault::UnknownPredicate(check.predicate.clone()))?;
                    let passed = predicate.test(&subject, &args).map_err(|message| {
                        RuntimeFault::Predicate {
                            predicate: check.predicate.clone(),
                            path: self.render_path(&check.report.path),
                            message,
                        }
                    })?;

                    self.last_failed = !passed;
                    self.pc += 1;
                    if !passed {
                        trace!(rule = %check.rule, code = %check.report.code, "check failed");
                        let error = self.build_error(&check.report, subject, &args);
                        self.record(error);
                        if let Some(halt) = &check.halt {
                            self.jump(halt)?;
                        }
                    }
                }
                Instr::Guard { test, skip } => {
                    if self.eval_test(test, runtime)? {
                        self.pc += 1;
                    } else {
                        self.jump(skip)?;
                    }
                }
                Instr::LoopStart {
                    list,
                    index,
                    item,
                    exit,
                } => match self.read(list)? {
                    Value::List(items) if !items.is_empty() => {
                        self.vars.insert(item.clone(), items[0].clone());
                        self.indices.insert(index.clone(), 0);
                        self.lists.insert(index.clone(), items);
                        self.pc += 1;
                    }
                    _ => self.jump(exit)?,
                },
                Instr::LoopNext { index, item, body } => {
                    let next = self.indices.get(index).copied().unwrap_or(0) + 1;
                    let element = self
                        .lists
                        .get(index)
                        .ok_or_else(|| RuntimeFault::Malformed(format!("loop {index} not started")))?
                        .get(next)
                        .cloned();
                    match element {
                        Some(element) => {
                            self.vars.insert(item.clone(), element);
                            self.indices.insert(index.clone(), next);
                            self.jump(body)?;
                        }
                        None => self.pc += 1,
                    }
                }
                Instr::Delegate(call) => {
                    let subject = self.read(&call.subject)?;
                    self.pc += 1;
                    if subject.is_null() {
                        continue;
                    }
                    return Ok(Step::Delegate(DelegateRequest {
                        validator: call.validator.clone(),
                        path: self.render_path(&call.path),
                        subject,
                        halt: call.halt.clone(),
                    }));
                }
                Instr::Isolate => {
                    self.isolated.push(self.accumulator.take());
                    self.pc += 1;
                }
                Instr::Capture { name } => {
                    let captured = self.accumulator.take().unwrap_or_default();
                    self.accumulator = self
                        .isolated
                        .pop()
                        .ok_or_else(|| RuntimeFault::Malformed("capture without isolate".into()))?;
                    self.captures.insert(name.clone(), captured);
                    self.pc += 1;
                }
                Instr::JumpIfEmpty { capture, target } => {
                    if self.captures.get(capture).is_none_or(Vec::is_empty) {
                        self.jump(target)?;
                    } else {
                        self.pc += 1;
                    }
                }
                Instr::JumpIfNotNull { subject, target } => {
                    if self.read(subject)?.is_null() {
                        self.pc += 1;
                    } else {
                        self.jump(target)?;
                    }
                }
                Instr::JumpUnlessType {
                    subject,
                    type_name,
                    target,
                } => {
                    if self.read(subject)?.is_instance_of(type_name) {
                        self.pc += 1;
                    } else {
                        self.jump(target)?;
                    }
                }
                Instr::Fail {
                    subject,
                    report,
                    halt,
                } => {
                    let value = self.read(subject)?;
                    let error = self.build_error(report, value, &[]);
                    self.record(error);
                    self.pc += 1;
                    if let Some(halt) = halt {
                        self.jump(halt)?;
                    }
                }
                Instr::Jump(label) => self.jump(label)?,
                Instr::Label(_) => self.pc += 1,
            }
        }
        Ok(Step::Done)
    }
}

fn resolve(
    runtime: &Runtime,
    reference: &ValidatorRef,
) -> Result<std::sync::Arc<dyn Validator>, RuntimeFault> {
    runtime
        .validators
        .resolve(reference)
        .ok_or_else(|| RuntimeFault::UnknownValidator(reference.to_string()))
}

/// Run a procedure synchronously. Async delegates are a fault.
pub fn run(
    procedure: &Procedure,
    value: &Value,
    inherited_path: &str,
    runtime: &Runtime,
) -> Result<Vec<ValidationError>, RuntimeFault> {
    let mut machine = Machine::new(procedure, value, inherited_path);
    loop {
        match machine.step(runtime)? {
            Step::Delegate(request) => {
                let validator = resolve(runtime, &request.validator)?;
                if request.validator.is_async || validator.is_async() {
                    return Err(RuntimeFault::AsyncInSyncRun(request.validator.to_string()));
                }
                let errors = validator.validate_to_list(&request.subject, &request.path, runtime)?;
                machine.complete_delegate(request.halt.as_ref(), errors)?;
            }
            Step::Done => return Ok(machine.finish()),
        }
    }
}

/// Run a procedure, awaiting delegates one at a time.
///
/// Cancellation is checked before every delegate call and raced against it.
pub async fn run_async(
    procedure: &Procedure,
    value: &Value,
    inherited_path: &str,
    runtime: &Runtime,
    cancel: &CancellationToken,
) -> Result<Vec<ValidationError>, RuntimeFault> {
    let mut machine = Machine::new(procedure, value, inherited_path);
    loop {
        match machine.step(runtime)? {
            Step::Delegate(request) => {
                if cancel.is_cancelled() {
                    return Err(RuntimeFault::Cancelled);
                }
                let validator = resolve(runtime, &request.validator)?;
                let errors = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(RuntimeFault::Cancelled),
                    result = validator.validate_to_list_async(&request.subject, &request.path, runtime, cancel) => result?,
                };
                machine.complete_delegate(request.halt.as_ref(), errors)?;
            }
            Step::Done => return Ok(machine.finish()),
        }
    }
}
