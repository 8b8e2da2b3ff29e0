//! Canonical connection state and the page-merge policies that maintain it.

mod view;

pub use view::{ConnectionView, ViewEdge, ViewSession};

use hashlink::LinkedHashMap;
use indexmap::IndexMap;

use crate::graph::FieldValue;
use crate::key::{EntityKey, StorageKey};
use crate::planner::Mode;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub entity_key: EntityKey,
    pub cursor: Option<String>,
    pub edge_extras: Option<IndexMap<StorageKey, FieldValue>>,
}

/// A page exactly as normalized off the wire, ready to be merged into a
/// [`ConnectionState`].
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub edges: Vec<Edge>,
    pub page_info: PageInfo,
    pub meta: IndexMap<String, FieldValue>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClassification {
    Baseline,
    Forward,
    Backward,
}

impl Page {
    pub fn classify(&self) -> PageClassification {
        if self.after.is_some() {
            PageClassification::Forward
        } else if self.before.is_some() {
            PageClassification::Backward
        } else {
            PageClassification::Baseline
        }
    }
}

/// Canonical per-connection state: an ordered node list, pageInfo, meta, and a
/// version counter readers can use to skip unchanged recomputation. The node list
/// is a `hashlink::LinkedHashMap` so a duplicate arrival can update its
/// cursor/extras in place, keeping the earliest position, without disturbing
/// insertion order.
#[derive(Default)]
pub struct ConnectionState {
    pub edges: LinkedHashMap<EntityKey, Edge>,
    pub page_info: PageInfo,
    pub meta: IndexMap<String, FieldValue>,
    pub version: u64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn ordered_edges(&self) -> Vec<&Edge> {
        self.edges.values().collect()
    }

    /// Merges `page` into this state under `mode`'s policy.
    pub fn merge_page(&mut self, page: Page, mode: &Mode) {
        let classification = page.classify();

        if mode.is_replace_window() || classification == PageClassification::Baseline {
            self.replace_window(page);
            self.version += 1;
            return;
        }

        match classification {
            PageClassification::Forward => self.append_union(page),
            PageClassification::Backward => self.prepend_union(page),
            PageClassification::Baseline => unreachable!("handled above"),
        }
        self.version += 1;
    }

    fn replace_window(&mut self, page: Page) {
        let mut edges = LinkedHashMap::new();
        for edge in page.edges {
            edges.insert(edge.entity_key.clone(), edge);
        }
        self.edges = edges;
        self.page_info = page.page_info;
        self.meta = page.meta;
    }

    fn append_union(&mut self, page: Page) {
        for edge in page.edges {
            match self.edges.get_mut(&edge.entity_key) {
                Some(existing) => {
                    existing.cursor = edge.cursor;
                    existing.edge_extras = edge.edge_extras;
                }
                None => {
                    self.edges.insert(edge.entity_key.clone(), edge);
                }
            }
        }
        self.page_info.end_cursor = page.page_info.end_cursor;
        self.page_info.has_next_page = page.page_info.has_next_page;
        self.meta = page.meta;
    }

    fn prepend_union(&mut self, page: Page) {
        let mut leading = Vec::new();
        for edge in page.edges {
            match self.edges.get_mut(&edge.entity_key) {
                Some(existing) => {
                    existing.cursor = edge.cursor;
                    existing.edge_extras = edge.edge_extras;
                }
                None => leading.push(edge),
            }
        }

        let mut rebuilt = LinkedHashMap::new();
        for edge in leading {
            rebuilt.insert(edge.entity_key.clone(), edge);
        }
        for (key, edge) in self.edges.drain() {
            rebuilt.insert(key, edge);
        }
        self.edges = rebuilt;

        self.page_info.start_cursor = page.page_info.start_cursor;
        self.page_info.has_previous_page = page.page_info.has_previous_page;
        self.meta = page.meta;
    }
}
