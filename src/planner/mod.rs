//! The document planner: compiles a GraphQL document into a reusable [`Plan`].
//!
//! A map of selections keyed by response key, fragments pre-flattened, built from an
//! untyped field name/alias pair since cachebay plans documents without a schema.

mod args;
mod build;
mod network;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;

pub use args::{ArgBuilder, ArgSpec, ArgValue};
pub use build::build_plan;

/// `infinite` (union), `page` (replace-window), or a pass-through custom string.
/// An unrecognized custom mode is folded back to `page`'s replace-window semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mode {
    Infinite,
    Page,
    Custom(String),
}

impl Mode {
    pub fn from_str_or_default(s: Option<&str>) -> Self {
        match s {
            None => Mode::Infinite,
            Some("infinite") => Mode::Infinite,
            Some("page") => Mode::Page,
            Some(other) => Mode::Custom(other.to_string()),
        }
    }

    /// `true` for any mode whose merge policy is "replace the window" rather than
    /// "union with the existing window" (`page` and any unrecognized custom mode).
    pub fn is_replace_window(&self) -> bool {
        !matches!(self, Mode::Infinite)
    }
}

/// Compiled, variable-free `@connection` metadata for one field.
#[derive(Debug, Clone)]
pub struct ConnectionMeta {
    pub key: String,
    pub filters: Vec<String>,
    pub mode: Mode,
}

/// One planned field within a selection set.
#[derive(Debug, Clone)]
pub struct PlanField {
    pub response_key: String,
    pub field_name: String,
    pub args: ArgBuilder,
    pub is_connection: bool,
    pub connection: Option<ConnectionMeta>,
    pub selection: Option<SelectionPlan>,
}

/// A selection set: an ordered field list plus a response-key lookup index.
#[derive(Debug, Clone, Default)]
pub struct SelectionPlan {
    pub fields: Vec<PlanField>,
    pub index_by_response_key: IndexMap<String, usize>,
}

impl SelectionPlan {
    pub fn field(&self, response_key: &str) -> Option<&PlanField> {
        self.index_by_response_key
            .get(response_key)
            .map(|&i| &self.fields[i])
    }

    fn push(&mut self, field: PlanField) {
        self.index_by_response_key
            .insert(field.response_key.clone(), self.fields.len());
        self.fields.push(field);
    }
}

/// Which top-level operation a [`Plan`] was compiled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
    Fragment,
}

/// Immutable compiled document.
#[derive(Debug, Clone)]
pub struct Plan {
    pub operation_kind: OperationKind,
    pub root_typename: String,
    pub root_selection: SelectionPlan,
    /// Network-shape document: `__typename` guaranteed on every selection set,
    /// `@connection` stripped, all other client directives passed through.
    pub network_document: String,
    fingerprint: u64,
}

impl Plan {
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

pub(crate) fn compute_fingerprint(
    operation_kind: OperationKind,
    root_typename: &str,
    root_selection: &SelectionPlan,
) -> u64 {
    let mut hasher = DefaultHasher::new();
    operation_kind.hash(&mut hasher);
    root_typename.hash(&mut hasher);
    hash_selection(root_selection, &mut hasher);
    hasher.finish()
}

fn hash_selection<H: Hasher>(selection: &SelectionPlan, state: &mut H) {
    selection.fields.len().hash(state);
    for field in &selection.fields {
        field.response_key.hash(state);
        field.field_name.hash(state);
        field.is_connection.hash(state);
        field.args.hash_stable(state);
        if let Some(conn) = &field.connection {
            conn.key.hash(state);
            conn.filters.hash(state);
            conn.mode.hash(state);
        }
        match &field.selection {
            Some(nested) => {
                1u8.hash(state);
                hash_selection(nested, state);
            }
            None => 0u8.hash(state),
        }
    }
}
