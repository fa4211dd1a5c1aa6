pub mod dsl;
pub mod error;
pub mod model;
pub mod settings;

pub use dsl::{compile, compile_source};
pub use model::{CompileOutput, Diagnostic, Document};
