//! Per-subscriber connection projection.
//!
//! A `ViewSession` owns a stable output container for one connection and re-syncs it
//! in place on every write that touches that connection, instead of allocating a
//! fresh vector per read.

use indexmap::IndexMap;

use super::PageInfo;
use crate::graph::FieldValue;
use crate::key::{EntityKey, StorageKey};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewEdge {
    pub entity_key: EntityKey,
    pub cursor: Option<String>,
    pub edge_extras: Option<IndexMap<StorageKey, FieldValue>>,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectionView {
    pub edges: Vec<ViewEdge>,
    pub page_info: PageInfo,
}

/// Owns one subscriber's reusable `(edges, pageInfo)` pair for a single connection.
#[derive(Default)]
pub struct ViewSession {
    current: ConnectionView,
}

impl ViewSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> &ConnectionView {
        &self.current
    }

    /// Re-syncs the owned `edges` vector to `new_edges`: same length reassigns
    /// entries in place, otherwise truncates or extends. Entries that compare
    /// equal are left untouched.
    pub fn sync(&mut self, new_edges: Vec<ViewEdge>, new_page_info: PageInfo) {
        let new_len = new_edges.len();

        if self.current.edges.len() > new_len {
            self.current.edges.truncate(new_len);
        }

        for (i, edge) in new_edges.into_iter().enumerate() {
            match self.current.edges.get(i) {
                Some(existing) if *existing == edge => {}
                Some(_) => self.current.edges[i] = edge,
                None => self.current.edges.push(edge),
            }
        }

        self.current.page_info = new_page_info;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(id: &str) -> ViewEdge {
        ViewEdge {
            entity_key: EntityKey::new("Post", id),
            cursor: None,
            edge_extras: None,
        }
    }

    #[test]
    fn shrinking_truncates_then_reassigns() {
        let mut session = ViewSession::new();
        session.sync(vec![edge("1"), edge("2"), edge("3")], PageInfo::default());
        session.sync(vec![edge("1")], PageInfo::default());
        assert_eq!(session.current().edges.len(), 1);
        assert_eq!(session.current().edges[0].entity_key.as_str(), "Post:1");
    }

    #[test]
    fn growing_extends() {
        let mut session = ViewSession::new();
        session.sync(vec![edge("1")], PageInfo::default());
        session.sync(vec![edge("1"), edge("2")], PageInfo::default());
        assert_eq!(session.current().edges.len(), 2);
    }
}
