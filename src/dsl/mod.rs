//! The configuration language compiler.
//!
//! source → lex → parse → lowering passes → validation → trigger chains →
//! code generation → [`Document`]
//!
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod ast;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod error;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod lexer;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod parser;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod source_map;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod registry;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod passes;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod typeck;
#[allow(
    clippy::indexing_slicing,
    clippy::wildcard_imports,
    clippy::cast_possible_truncation,
    clippy::single_match_else,
    clippy::needless_pass_by_value,
    clippy::module_name_repetitions,
)]
pub mod compiler;

use tracing::debug;

use crate::model::{CompileOutput, Document};
use error::CompileError;
use passes::{assert_stage, Context, Pass};
use registry::Registry;
use source_map::SourceMap;

/// Lowering passes in the order they run. Names match the stage checks in
/// [`passes::assert_stage`].
pub const PIPELINE: &[(&str, Pass)] = &[
    ("macros", passes::macros::run),
    ("wildcards", passes::wildcards::run),
    ("folds", passes::folds::run),
    ("placeholders", passes::placeholders::run),
    ("aliases", passes::aliases::run),
    ("prefixes", passes::prefixes::run),
    ("condition_blocks", passes::condition_blocks::run),
    ("conditions", passes::conditions::run),
    ("validation", typeck::run),
    ("triggers", passes::triggers::run),
];

/// Compile a source string into a [`Document`].
///
/// Syntax errors are collected and returned together; lowering stops at the
/// first semantic error.
#[tracing::instrument(skip_all, fields(len = source.len()))]
pub fn compile_source(source: &str, registry: &Registry) -> Result<Document, Vec<CompileError>> {
    let mut source_map = SourceMap::new();
    let (mut stmts, errors) = parser::parse(source, &mut source_map);
    if !errors.is_empty() {
        debug!(count = errors.len(), "syntax errors");
        return Err(errors);
    }

    let mut ctx = Context::new(registry, &mut source_map);
    for (name, pass) in PIPELINE {
        stmts = pass(stmts, &mut ctx).map_err(|e| {
            debug!(pass = name, error = %e, "lowering failed");
            vec![e]
        })?;
        if cfg!(debug_assertions) {
            assert_stage(name, &stmts);
        }
        debug!(pass = name, statements = stmts.len(), "lowered");
    }

    Ok(compiler::compile(&stmts))
}

/// [`compile_source`] folded into the serializable output shape.
pub fn compile(source: &str, registry: &Registry) -> CompileOutput {
    CompileOutput::from(compile_source(source, registry))
}
