//! Side table from AST nodes back to source locations.
//!
//! Nodes are keyed by the address of their `Rc` allocation. Every entry keeps
//! a `Weak` to the node, which pins the allocation (not the value) so an
//! address can never be reused for a different node while the map is alive.
//! The map owns nothing in the tree.

use std::any::Any;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::ast::Span;

/// 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

/// `stop` points just past the last character of the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, JsonSchema)]
#[ts(export)]
pub struct Location {
    pub start: Position,
    pub stop: Position,
}

impl Location {
    pub fn merge(self, other: Location) -> Location {
        Location {
            start: self.start.min(other.start),
            stop: self.stop.max(other.stop),
        }
    }
}

/// Byte offset → line/column conversion for one source text.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// Byte offset of the first character of every line.
    line_starts: Vec<usize>,
    source: String,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in source.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            source: source.to_string(),
        }
    }

    pub fn position(&self, offset: usize) -> Position {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let end = offset.min(self.source.len());
        let column = self
            .source
            .get(line_start..end)
            .map_or(0, |text| text.chars().count());
        Position {
            line: line + 1,
            column: column + 1,
        }
    }

    pub fn location(&self, span: Span) -> Location {
        Location {
            start: self.position(span.start),
            stop: self.position(span.end),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Origin {
    Source(Location),
    DerivedFrom(usize),
}

#[derive(Debug)]
struct Entry {
    _anchor: Weak<dyn Any>,
    origin: Origin,
}

/// Append-only provenance index for one compilation.
#[derive(Debug, Default)]
pub struct SourceMap {
    entries: HashMap<usize, Entry>,
}

fn key_of<T>(node: &Rc<T>) -> usize {
    Rc::as_ptr(node).cast::<()>() as usize
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record where an original node came from.
    pub fn locate<T: Any>(&mut self, node: &Rc<T>, location: Location) {
        self.insert(node, Origin::Source(location));
    }

    /// Record that `node` was synthesized from `origin`. Its location is
    /// resolved through `origin` on lookup.
    pub fn derive<T: Any, U: Any>(&mut self, node: &Rc<T>, origin: &Rc<U>) {
        let from = key_of(origin);
        // An unrecorded origin isn't pinned, so its address could be reused.
        if from != key_of(node) && self.entries.contains_key(&from) {
            self.insert(node, Origin::DerivedFrom(from));
        }
    }

    /// Record that `node` was merged from several nodes; its location spans
    /// all of them.
    pub fn derive_merged<T: Any>(&mut self, node: &Rc<T>, origins: &[Option<Location>]) {
        let merged = origins.iter().flatten().copied().reduce(Location::merge);
        if let Some(location) = merged {
            self.insert(node, Origin::Source(location));
        }
    }

    pub fn location_of<T: Any>(&self, node: &Rc<T>) -> Option<Location> {
        let mut key = key_of(node);
        // A derivation chain can't be longer than the number of entries.
        for _ in 0..=self.entries.len() {
            match self.entries.get(&key)?.origin {
                Origin::Source(location) => return Some(location),
                Origin::DerivedFrom(from) => key = from,
            }
        }
        None
    }

    fn insert<T: Any>(&mut self, node: &Rc<T>, origin: Origin) {
        let weak: Weak<T> = Rc::downgrade(node);
        let anchor: Weak<dyn Any> = weak;
        self.entries.entry(key_of(node)).or_insert(Entry {
            _anchor: anchor,
            origin,
        });
    }
}
