use super::source_map::Location;
use crate::model::{CompileOutput, Diagnostic, Document};

/// A compilation error with source location.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub message: String,
    pub location: Option<Location>,
    pub kind: ErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Lexer,
    Parser,
    Semantic,
}

impl CompileError {
    pub fn lexer(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
            kind: ErrorKind::Lexer,
        }
    }

    pub fn parser(message: impl Into<String>, location: Location) -> Self {
        Self {
            message: message.into(),
            location: Some(location),
            kind: ErrorKind::Parser,
        }
    }

    /// Semantic errors come out of the lowering passes. The location is
    /// whatever the source map could recover for the offending node.
    pub fn semantic(message: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            message: message.into(),
            location,
            kind: ErrorKind::Semantic,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self.kind, ErrorKind::Lexer | ErrorKind::Parser)
    }

    /// Format the error with its position, for terminal output.
    pub fn format_with_position(&self) -> String {
        let tag = match self.kind {
            ErrorKind::Lexer => "lexer",
            ErrorKind::Parser => "parser",
            ErrorKind::Semantic => "semantic",
        };
        match self.location {
            Some(loc) => format!(
                "[{tag}] line {}:{}: {}",
                loc.start.line, loc.start.column, self.message
            ),
            None => format!("[{tag}] {}", self.message),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            message: self.message.clone(),
            location: self.location,
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

impl From<&CompileError> for Diagnostic {
    fn from(e: &CompileError) -> Self {
        e.to_diagnostic()
    }
}

impl From<Result<Document, Vec<CompileError>>> for CompileOutput {
    fn from(result: Result<Document, Vec<CompileError>>) -> Self {
        match result {
            Ok(document) => CompileOutput {
                document: Some(document),
                errors: Vec::new(),
            },
            Err(errors) => CompileOutput {
                document: None,
                errors: errors.iter().map(CompileError::to_diagnostic).collect(),
            },
        }
    }
}
