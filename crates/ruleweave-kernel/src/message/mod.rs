//! Message compilation.
//!
//! A message template such as `'{PropertyName}' must be at least {MinLength:0}.`
//! is compiled once per leaf rule. Placeholders bound to literal values are
//! substituted at compile time; when nothing is left to compute the result
//! is a fixed string. Otherwise the template becomes a list of text and
//! runtime slots rendered per failure.
//!
//! Rendering is equivalent to naive replacement of every `{Token}` and
//! `{Token:format}` occurrence. Tokens without a binding stay verbatim.

mod format;

pub use format::format_value;

use std::fmt;

use ruleweave_types::Value;

/// A value only known while validating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// The value under test.
    AttemptedValue,
    /// The rendered error path.
    TargetPath,
    /// Length of the value under test (characters or elements).
    TotalLength,
    /// The n-th rule argument.
    Argument(usize),
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::AttemptedValue => write!(f, "value"),
            Slot::TargetPath => write!(f, "path"),
            Slot::TotalLength => write!(f, "length"),
            Slot::Argument(i) => write!(f, "arg{i}"),
        }
    }
}

/// What a placeholder token is bound to.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Literal(Value),
    Runtime(Slot),
}

/// Token name to binding, first binding wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageBindings {
    entries: Vec<(String, Binding)>,
}

impl MessageBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, token: impl Into<String>, binding: Binding) {
        let token = token.into();
        if self.get(&token).is_none() {
            self.entries.push((token, binding));
        }
    }

    pub fn with(mut self, token: impl Into<String>, binding: Binding) -> Self {
        self.bind(token, binding);
        self
    }

    pub fn get(&self, token: &str) -> Option<&Binding> {
        self.entries.iter().find(|(t, _)| t == token).map(|(_, b)| b)
    }
}

/// One piece of a formatted message.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Slot { slot: Slot, format: Option<String> },
}

/// A compiled message template.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledMessage {
    /// Fully resolved at compile time.
    Fixed(String),
    /// Needs runtime values.
    Formatted(Vec<Segment>),
}

impl CompiledMessage {
    pub fn is_fixed(&self) -> bool {
        matches!(self, CompiledMessage::Fixed(_))
    }

    /// Render with runtime values supplied by `resolve`.
    pub fn render(&self, mut resolve: impl FnMut(Slot) -> Value) -> String {
        match self {
            CompiledMessage::Fixed(s) => s.clone(),
            CompiledMessage::Formatted(segments) => {
                let mut out = String::new();
                for segment in segments {
                    match segment {
                        Segment::Text(t) => out.push_str(t),
                        Segment::Slot { slot, format } => {
                            out.push_str(&format_value(&resolve(*slot), format.as_deref()))
                        }
                    }
                }
                out
            }
        }
    }
}

impl fmt::Display for CompiledMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompiledMessage::Fixed(s) => write!(f, "{s:?}"),
            CompiledMessage::Formatted(segments) => {
                write!(f, "fmt(")?;
                for (i, segment) in segments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match segment {
                        Segment::Text(t) => write!(f, "{t:?}")?,
                        Segment::Slot { slot, format: None } => write!(f, "{{{slot}}}")?,
                        Segment::Slot {
                            slot,
                            format: Some(spec),
                        } => write!(f, "{{{slot}:{spec}}}")?,
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// Compile `template` against `bindings`.
pub fn compile_message(template: &str, bindings: &MessageBindings) -> CompiledMessage {
    let mut segments: Vec<Segment> = Vec::new();
    let mut text = String::new();
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        text.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            text.push_str(&rest[open..]);
            rest = "";
            break;
        };
        let inner = &after[..close];
        if inner.contains('{') {
            // `{{Token}`: the first brace is plain text
            text.push('{');
            rest = after;
            continue;
        }

        let (token, format) = match inner.split_once(':') {
            Some((t, f)) => (t, Some(f)),
            None => (inner, None),
        };
        match bindings.get(token) {
            Some(Binding::Literal(value)) => text.push_str(&format_value(value, format)),
            Some(Binding::Runtime(slot)) => {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                segments.push(Segment::Slot {
                    slot: *slot,
                    format: format.map(str::to_string),
                });
            }
            None => {
                text.push('{');
                text.push_str(inner);
                text.push('}');
            }
        }
        rest = &after[close + 1..];
    }
    text.push_str(rest);

    if segments.is_empty() {
        return CompiledMessage::Fixed(text);
    }
    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    CompiledMessage::Formatted(segments)
}
