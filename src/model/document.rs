use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::dsl::source_map::Location;

// ── Generated document ────────────────────────────────────────────

/// The configuration document consumed by the automation runtime. Field
/// names are part of the runtime's import format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Document {
    /// Unconditional setting values; last assignment wins.
    #[ts(type = "Record<string, unknown>")]
    pub settings: IndexMap<String, Value>,
    /// Conditional rules per setting, in source order.
    pub overrides: IndexMap<String, Vec<Override>>,
    pub triggers: Vec<Trigger>,
}

/// One conditional rule: when `arg1 <cmp> arg2` holds, the setting takes
/// `ret`. A `null` `ret` means the runtime evaluates `arg2` for the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Override {
    pub type1: String,
    #[ts(type = "unknown")]
    pub arg1: Value,
    pub cmp: String,
    pub type2: String,
    #[ts(type = "unknown")]
    pub arg2: Value,
    #[ts(type = "unknown")]
    pub ret: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Trigger {
    pub seq: usize,
    pub priority: usize,
    pub requirement_type: String,
    pub requirement_id: String,
    pub requirement_count: i64,
    pub action_type: String,
    pub action_id: String,
    pub action_count: i64,
    pub complete: bool,
}

// ── Compiler output ───────────────────────────────────────────────

/// A user-facing compile error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<Location>,
}

/// Result of one compilation: either a document or the diagnostics that
/// prevented it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct CompileOutput {
    pub document: Option<Document>,
    pub errors: Vec<Diagnostic>,
}

impl CompileOutput {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}
