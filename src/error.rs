use std::error::Error as StdError;
use std::fmt::{self, Write};
use std::io::Error as IOError;
use std::string::FromUtf8Error;

use serde_json::error::Error as SerdeError;
use thiserror::Error;

/// Error when rendering data on template.
#[derive(Debug)]
pub struct RenderError {
    pub template_name: Option<String>,
    pub line_no: Option<usize>,
    pub column_no: Option<usize>,
    reason: Box<RenderErrorReason>,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let desc = self.reason.to_string();

        match (self.line_no, self.column_no) {
            (Some(line), Some(col)) => write!(
                f,
                "Error rendering \"{}\" line {}, col {}: {}",
                self.template_name.as_deref().unwrap_or("Unnamed template"),
                line,
                col,
                desc
            ),
            _ => write!(f, "{desc}"),
        }
    }
}

impl StdError for RenderError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.reason() {
            RenderErrorReason::HelperInvocation { cause, .. } => Some(cause.as_ref()),
            RenderErrorReason::TemplateError(e) => Some(e),
            RenderErrorReason::IOError(e) => Some(e),
            RenderErrorReason::SerdeError(e) => Some(e),
            RenderErrorReason::Utf8Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Reasons a render call fails.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderErrorReason {
    #[error("Template not found {0}")]
    TemplateNotFound(String),
    #[error("Failed to parse template {0}")]
    TemplateError(#[from] TemplateError),
    #[error("Failed to access variable in strict mode {0:?}")]
    MissingVariable(Option<String>),
    #[error("Partial not found {0}")]
    PartialNotFound(String),
    #[error("Decorator not found {0}")]
    DecoratorNotFound(String),
    #[error("Param not found for helper \"{0}\"")]
    ParamNotFoundForName(&'static str),
    #[error("Param not found for index {1} of helper \"{0}\"")]
    ParamNotFoundForIndex(&'static str, usize),
    #[error("Invalid param type, {0} expected")]
    InvalidParamType(&'static str),
    #[error("Helper \"{name}\" failed: {cause}")]
    HelperInvocation {
        name: String,
        cause: Box<RenderError>,
    },
    #[error("Partial \"{name}\" exceeded the inclusion limit at depth {depth}")]
    RecursionLimitExceeded { name: String, depth: usize },
    #[error("Script error: {0}")]
    ScriptError(String),
    #[error("Failed to emit portable template: {0}")]
    EmitError(String),
    #[error("Failed to access JSON data: {0}")]
    SerdeError(#[from] SerdeError),
    #[error("IO Error: {0}")]
    IOError(#[from] IOError),
    #[error("FromUtf8Error: {0}")]
    Utf8Error(#[from] FromUtf8Error),
    #[error("{0}")]
    Other(String),
    /// Marker for a helper that only writes output and offers no value form.
    #[error("Unimplemented")]
    Unimplemented,
}

impl From<RenderErrorReason> for RenderError {
    fn from(reason: RenderErrorReason) -> RenderError {
        RenderError {
            template_name: None,
            line_no: None,
            column_no: None,
            reason: Box::new(reason),
        }
    }
}

impl From<IOError> for RenderError {
    fn from(e: IOError) -> RenderError {
        RenderErrorReason::IOError(e).into()
    }
}

impl From<SerdeError> for RenderError {
    fn from(e: SerdeError) -> RenderError {
        RenderErrorReason::SerdeError(e).into()
    }
}

impl From<FromUtf8Error> for RenderError {
    fn from(e: FromUtf8Error) -> RenderError {
        RenderErrorReason::Utf8Error(e).into()
    }
}

impl From<TemplateError> for RenderError {
    fn from(e: TemplateError) -> RenderError {
        RenderErrorReason::TemplateError(e).into()
    }
}

impl RenderError {
    pub fn new<T: AsRef<str>>(desc: T) -> RenderError {
        RenderErrorReason::Other(desc.as_ref().to_owned()).into()
    }

    pub fn reason(&self) -> &RenderErrorReason {
        &self.reason
    }

    pub fn is_unimplemented(&self) -> bool {
        matches!(*self.reason, RenderErrorReason::Unimplemented)
    }

    /// Errors raised by nested rendering keep their identity when they pass
    /// through a helper; everything else is reported as a helper failure.
    pub(crate) fn in_helper(self, name: &str) -> RenderError {
        match *self.reason {
            RenderErrorReason::HelperInvocation { .. }
            | RenderErrorReason::RecursionLimitExceeded { .. }
            | RenderErrorReason::PartialNotFound(_)
            | RenderErrorReason::TemplateNotFound(_)
            | RenderErrorReason::DecoratorNotFound(_)
            | RenderErrorReason::Unimplemented => self,
            _ => RenderErrorReason::HelperInvocation {
                name: name.to_owned(),
                cause: Box::new(self),
            }
            .into(),
        }
    }
}

/// Template parsing error
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum TemplateErrorReason {
    #[error("helper {0:?} was opened, but {1:?} is closing")]
    MismatchingClosedHelper(String, String),
    #[error("block {0:?} is never closed")]
    UnclosedBlock(String),
    #[error("{0:?} closes a block that was never opened")]
    UnexpectedClose(String),
    #[error("invalid handlebars syntax: expected {expected}, found {found}")]
    InvalidSyntax { expected: String, found: String },
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unbalanced parentheses in sub-expression")]
    UnbalancedParens,
    #[error("invalid parameter {0:?}")]
    InvalidParam(String),
    #[error("invalid partial block: {0}")]
    InvalidPartialBlock(String),
    #[error("invalid delimiters {0:?}")]
    InvalidDelimiters(String),
}

/// Error on parsing template.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub struct TemplateError {
    reason: Box<TemplateErrorReason>,
    pub template_name: Option<String>,
    pub line_no: Option<usize>,
    pub column_no: Option<usize>,
    segment: Option<String>,
}

impl TemplateError {
    pub fn of(e: TemplateErrorReason) -> TemplateError {
        TemplateError {
            reason: Box::new(e),
            template_name: None,
            line_no: None,
            column_no: None,
            segment: None,
        }
    }

    pub fn at(mut self, template_str: &str, line_no: usize, column_no: usize) -> TemplateError {
        self.line_no = Some(line_no);
        self.column_no = Some(column_no);
        self.segment = Some(template_segment(template_str, line_no, column_no));
        self
    }

    pub fn in_template(mut self, name: String) -> TemplateError {
        self.template_name = Some(name);
        self
    }

    pub fn reason(&self) -> &TemplateErrorReason {
        &self.reason
    }

    /// Returns the source excerpt around the failure, with a caret under the
    /// offending column.
    pub fn segment(&self) -> Option<&str> {
        self.segment.as_deref()
    }
}

fn template_segment(template_str: &str, line: usize, col: usize) -> String {
    let range = 3;
    let line_start = line.saturating_sub(range);
    let line_end = line + range;

    let mut buf = String::new();
    for (line_count, line_content) in template_str.lines().enumerate() {
        if line_count >= line_start && line_count <= line_end {
            let _ = writeln!(&mut buf, "{line_count:4} | {line_content}");
            if line_count + 1 == line {
                buf.push_str("     |");
                for c in 0..line_content.len() {
                    if c + 1 != col {
                        buf.push('-');
                    } else {
                        buf.push('^');
                    }
                }
                buf.push('\n');
            }
        }
    }

    buf
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match (self.line_no, self.column_no, &self.segment) {
            (Some(line), Some(col), Some(seg)) => writeln!(
                f,
                "{reason}\n    --> Template error in \"{name}\":{line}:{col}\n     |\n{seg}     |\n     = reason: {reason}",
                name = self.template_name.as_deref().unwrap_or("Unnamed template"),
                reason = self.reason,
            ),
            _ => write!(f, "{}", self.reason),
        }
    }
}

/// Failure to register a script helper.
#[cfg(feature = "script_helper")]
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ScriptError {
    #[error("Cannot parse script: {0}")]
    ParseError(#[from] rhai::ParseError),
    #[error("Script defines no helper function taking (context, options)")]
    NoHelperFunction,
}
