pub mod document;

pub use document::{CompileOutput, Diagnostic, Document, Override, Trigger};
