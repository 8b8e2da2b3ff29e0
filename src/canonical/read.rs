//! Read-path traversal: walks a compiled selection against the graph, folding the
//! optimistic overlay in, and assembles a plain `serde_json_bytes::Value` snapshot.

use std::cell::RefCell;

use indexmap::{IndexMap, IndexSet};
use serde_json_bytes::{Map, Value};

use crate::connections::{Edge, PageInfo, ViewEdge, ViewSession};
use crate::graph::{FieldValue, Graph, Record};
use crate::key::{ConnectionKey, DepKey, EntityKey};
use crate::optimistic::OptimisticStack;
use crate::planner::{PlanField, SelectionPlan};

/// Whether a connection read returns exactly the page the caller's variables name, or
/// the whole canonical (merged) window for that connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionMode {
    Strict,
    Canonical,
}

impl Default for DecisionMode {
    fn default() -> Self {
        DecisionMode::Strict
    }
}

pub struct ReadContext<'a> {
    pub graph: &'a Graph,
    pub optimistic: &'a OptimisticStack,
    pub variables: &'a Map,
    pub mode: DecisionMode,
    /// When set (only `watchQuery` subscribers carry one), each connection reached
    /// during this read is synced through its subscriber-owned [`ViewSession`]
    /// instead of rendered from a freshly allocated list.
    pub view_sessions: Option<&'a RefCell<IndexMap<ConnectionKey, ViewSession>>>,
}

/// Reads `selection` rooted at `entity_key`, returning `None` on any missing required
/// path (a cache miss, never an error).
pub fn read_entity(
    ctx: &ReadContext,
    selection: &SelectionPlan,
    entity_key: &EntityKey,
    deps: &mut IndexSet<DepKey>,
) -> Option<Value> {
    deps.insert(DepKey::Entity(entity_key.clone()));
    let base = ctx.graph.get_record(entity_key);
    let record = ctx.optimistic.materialize_entity(base, entity_key)?;
    read_record(ctx, selection, &record, deps)
}

fn read_record(
    ctx: &ReadContext,
    selection: &SelectionPlan,
    record: &Record,
    deps: &mut IndexSet<DepKey>,
) -> Option<Value> {
    let mut out = Map::new();

    for field in &selection.fields {
        let args_map = field.args.build(ctx.variables);
        let storage_key =
            crate::key::StorageKey::new(&field.field_name, Some(&crate::key::stringify_args(&args_map)));

        if field.is_connection {
            let conn_key = record.get(&storage_key).and_then(FieldValue::as_connection_key)?;
            let value = read_connection(ctx, field, &conn_key.clone(), &args_map, deps)?;
            out.insert(field.response_key.clone(), value);
            continue;
        }

        match record.get(&storage_key) {
            None => return None,
            Some(value) => {
                let rendered = read_field_value(ctx, field, value, deps)?;
                out.insert(field.response_key.clone(), rendered);
            }
        }
    }

    Some(Value::Object(out))
}

fn read_field_value(
    ctx: &ReadContext,
    field: &PlanField,
    value: &FieldValue,
    deps: &mut IndexSet<DepKey>,
) -> Option<Value> {
    match value {
        FieldValue::Null => Some(Value::Null),
        FieldValue::Scalar(v) => Some(v.clone()),
        FieldValue::ConnectionRef(key) => {
            let args_map = field.args.build(ctx.variables);
            read_connection(ctx, field, key, &args_map, deps)
        }
        FieldValue::Ref(key) => {
            let selection = field.selection.as_ref()?;
            read_entity(ctx, selection, key, deps)
        }
        FieldValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(read_field_value(ctx, field, item, deps)?);
            }
            Some(Value::Array(out))
        }
    }
}

fn read_connection(
    ctx: &ReadContext,
    field: &PlanField,
    conn_key: &ConnectionKey,
    args: &Map,
    deps: &mut IndexSet<DepKey>,
) -> Option<Value> {
    deps.insert(DepKey::Connection(conn_key.clone()));
    let base = ctx.graph.get_connection(conn_key);
    if base.is_none() && !ctx.optimistic_has(conn_key) {
        return None;
    }

    let (edges, page_info, meta) = ctx.optimistic.materialize_connection(base, conn_key);
    let ordered: Vec<&Edge> = edges.values().collect();

    let (view_edges, view_page_info) = match ctx.mode {
        DecisionMode::Canonical => (ordered, page_info),
        DecisionMode::Strict => slice_strict(ordered, args, &page_info),
    };

    // Per-subscriber stable container: reuse the same `ViewSession` across
    // recomputations so an unchanged window keeps the same `ViewEdge` values in
    // place rather than being rebuilt wholesale.
    let windowed: Vec<ViewEdge> = view_edges
        .iter()
        .map(|edge| ViewEdge {
            entity_key: edge.entity_key.clone(),
            cursor: edge.cursor.clone(),
            edge_extras: edge.edge_extras.clone(),
        })
        .collect();

    let synced: Vec<ViewEdge> = if let Some(sessions) = ctx.view_sessions {
        let mut sessions = sessions.borrow_mut();
        let session = sessions.entry(conn_key.clone()).or_insert_with(ViewSession::new);
        session.sync(windowed, view_page_info.clone());
        session.current().edges.clone()
    } else {
        windowed
    };

    let selection = field.selection.as_ref()?;
    let edges_field = selection.field("edges");
    let page_info_field = selection.field("pageInfo");

    let mut out = Map::new();
    if let Some(edges_field) = edges_field {
        let edge_selection = edges_field.selection.as_ref()?;
        let mut rendered_edges = Vec::with_capacity(synced.len());
        for edge in &synced {
            let node_field = edge_selection.field("node")?;
            let node_selection = node_field.selection.as_ref()?;
            let node_value = read_entity(ctx, node_selection, &edge.entity_key, deps)?;

            let mut edge_obj = Map::new();
            edge_obj.insert(node_field.response_key.clone(), node_value);
            if let Some(cursor_field) = edge_selection.field("cursor") {
                edge_obj.insert(
                    cursor_field.response_key.clone(),
                    edge.cursor.clone().map(Value::from).unwrap_or(Value::Null),
                );
            }
            if let Some(extras) = &edge.edge_extras {
                for f in &edge_selection.fields {
                    if f.field_name == "node" || f.field_name == "cursor" {
                        continue;
                    }
                    let args_map = f.args.build(ctx.variables);
                    let storage_key = crate::key::StorageKey::new(
                        &f.field_name,
                        Some(&crate::key::stringify_args(&args_map)),
                    );
                    if let Some(v) = extras.get(&storage_key) {
                        let rendered = read_field_value(ctx, f, v, deps)?;
                        edge_obj.insert(f.response_key.clone(), rendered);
                    }
                }
            }
            rendered_edges.push(Value::Object(edge_obj));
        }
        out.insert(edges_field.response_key.clone(), Value::Array(rendered_edges));
    }

    if let Some(page_info_field) = page_info_field {
        out.insert(page_info_field.response_key.clone(), render_page_info(&view_page_info));
    }

    for f in &selection.fields {
        if f.field_name == "edges" || f.field_name == "pageInfo" {
            continue;
        }
        if let Some(v) = meta.get(f.field_name.as_str()) {
            let rendered = read_field_value(ctx, f, v, deps)?;
            out.insert(f.response_key.clone(), rendered);
        }
    }

    Some(Value::Object(out))
}

fn render_page_info(page_info: &PageInfo) -> Value {
    let mut obj = Map::new();
    obj.insert("hasNextPage", Value::from(page_info.has_next_page));
    obj.insert("hasPreviousPage", Value::from(page_info.has_previous_page));
    obj.insert(
        "startCursor",
        page_info.start_cursor.clone().map(Value::from).unwrap_or(Value::Null),
    );
    obj.insert(
        "endCursor",
        page_info.end_cursor.clone().map(Value::from).unwrap_or(Value::Null),
    );
    Value::Object(obj)
}

/// Relay-style cursor slicing of the canonical window, approximating "the exact page
/// these variables describe" without keeping every historical page around.
fn slice_strict<'a>(ordered: Vec<&'a Edge>, args: &Map, canonical_page_info: &PageInfo) -> (Vec<&'a Edge>, PageInfo) {
    let after = args.get("after").and_then(Value::as_str);
    let before = args.get("before").and_then(Value::as_str);
    let first = args.get("first").and_then(Value::as_i64);
    let last = args.get("last").and_then(Value::as_i64);

    let start = after
        .and_then(|c| ordered.iter().position(|e| e.cursor.as_deref() == Some(c)))
        .map(|i| i + 1)
        .unwrap_or(0);
    let end = before
        .and_then(|c| ordered.iter().position(|e| e.cursor.as_deref() == Some(c)))
        .unwrap_or(ordered.len());

    let mut window: Vec<&Edge> = ordered[start.min(end)..end.max(start)].to_vec();

    if let Some(n) = first {
        window.truncate(n.max(0) as usize);
    }
    if let Some(n) = last {
        let n = n.max(0) as usize;
        if window.len() > n {
            window = window.split_off(window.len() - n);
        }
    }

    let has_previous_page = start > 0 || (last.is_some() && window.len() < (end - start));
    let has_next_page =
        (start + window.len()) < ordered.len() || (canonical_page_info.has_next_page && end == ordered.len());

    let page_info = PageInfo {
        has_next_page,
        has_previous_page,
        start_cursor: window.first().and_then(|e| e.cursor.clone()),
        end_cursor: window.last().and_then(|e| e.cursor.clone()),
    };

    (window, page_info)
}

impl ReadContext<'_> {
    fn optimistic_has(&self, conn_key: &ConnectionKey) -> bool {
        let (edges, _, _) = self.optimistic.materialize_connection(None, conn_key);
        !edges.is_empty()
    }
}
