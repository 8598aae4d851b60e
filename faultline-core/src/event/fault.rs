//! Faults as read-only structured values.
//!
//! A [`Fault`] is what the serializer consumes on the exception path: a type
//! name, a description, where it originated, and an ordered frame list
//! (innermost first). It can be assembled by hand or captured from a live
//! error together with the current call stack.

use std::error::Error;
use std::fmt::Write as _;

/// Symbols belonging to the capture machinery, trimmed from captured stacks
const CAPTURE_FRAME_PREFIXES: [&str; 3] = ["backtrace::", "faultline_core::", "std::backtrace"];

/// One call-stack frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackFrame {
    pub file: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    /// Enclosing type or module path
    pub class: Option<String>,
    /// Separator between `class` and `function` (`::`, `->`, `.`)
    pub call_type: Option<String>,
}

impl StackFrame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: Some(function.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn in_class(mut self, class: impl Into<String>, call_type: impl Into<String>) -> Self {
        self.class = Some(class.into());
        self.call_type = Some(call_type.into());
        self
    }

    /// Split a demangled Rust path (`a::b::c`) into module and function
    pub fn from_symbol(symbol: &str, file: Option<String>, line: Option<u32>) -> Self {
        let (class, call_type, function) = match symbol.rsplit_once("::") {
            Some((module, function)) => (
                Some(module.to_string()),
                Some("::".to_string()),
                function.to_string(),
            ),
            None => (None, None, symbol.to_string()),
        };
        Self {
            file,
            line,
            function: Some(function),
            class,
            call_type,
        }
    }

    /// `Class::function` as it appears in trace text
    pub fn qualified_name(&self) -> String {
        let function = self.function.as_deref().unwrap_or("{closure}");
        match (&self.class, &self.call_type) {
            (Some(class), Some(call_type)) => format!("{class}{call_type}{function}"),
            (Some(class), None) => format!("{class}::{function}"),
            _ => function.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    type_name: String,
    message: String,
    file: Option<String>,
    line: Option<u32>,
    frames: Vec<StackFrame>,
}

impl Fault {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            file: None,
            line: None,
            frames: Vec::new(),
        }
    }

    /// Set the origin location
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_frames(mut self, frames: Vec<StackFrame>) -> Self {
        self.frames = frames;
        self
    }

    /// Build a fault from a live error, capturing the current call stack.
    ///
    /// The origin defaults to the first captured frame with a known location.
    pub fn from_error<E: Error + 'static>(error: &E) -> Self {
        let frames = capture_frames();
        let origin = frames
            .iter()
            .find(|f| f.file.is_some() && f.line.is_some())
            .cloned();

        let mut fault = Self::new(std::any::type_name::<E>(), error.to_string());
        if let Some(StackFrame {
            file: Some(file),
            line: Some(line),
            ..
        }) = origin
        {
            fault = fault.at(file, line);
        }
        fault.with_frames(frames)
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.line
    }

    pub fn frames(&self) -> &[StackFrame] {
        &self.frames
    }

    /// Numbered call-stack text, one frame per line, closed by `{main}`
    pub fn trace_text(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.frames.iter().enumerate() {
            let location = match (&frame.file, frame.line) {
                (Some(file), Some(line)) => format!("{file}({line})"),
                (Some(file), None) => file.clone(),
                _ => "[internal function]".to_string(),
            };
            let _ = writeln!(out, "#{i} {location}: {}()", frame.qualified_name());
        }
        let _ = write!(out, "#{} {{main}}", self.frames.len());
        out
    }
}

/// Walk the current stack and keep frames outside the capture machinery
fn capture_frames() -> Vec<StackFrame> {
    let backtrace = backtrace::Backtrace::new();
    let mut frames = Vec::new();

    for frame in backtrace.frames() {
        for symbol in frame.symbols() {
            let Some(name) = symbol.name() else {
                continue;
            };
            // `{:#}` drops the trailing symbol hash
            let name = format!("{name:#}");
            let file = symbol.filename().map(|p| p.display().to_string());
            frames.push(StackFrame::from_symbol(&name, file, symbol.lineno()));
        }
    }

    let skip = frames
        .iter()
        .take_while(|f| is_capture_frame(&f.qualified_name()))
        .count();
    frames.split_off(skip)
}

fn is_capture_frame(symbol: &str) -> bool {
    CAPTURE_FRAME_PREFIXES
        .iter()
        .any(|prefix| symbol.starts_with(prefix))
}
