//! SQLite implementation of [`GraphStore`].
//!
//! [`SqliteStore`] persists the catalog graph in a SQLite database with WAL
//! mode and automatic schema migrations. Tags and property maps are stored as
//! JSON TEXT columns via serde_json. Transactions map directly onto SQLite
//! transactions: `begin` takes the write lock up front with
//! `BEGIN IMMEDIATE`, so a concurrent writer fails fast instead of midway
//! through a batch.

use std::collections::BTreeSet;

use rusqlite::{params, Connection, OptionalExtension, Row};

use coursegraph_core::{NodeId, NodeLabel, NodeRef, Relation, Tag};

use crate::error::StorageError;
use crate::schema::SqliteConfig;
use crate::traits::{walk_chain, GraphStore};
use crate::types::{
    merge_properties, sort_by_order_key, Direction, Properties, StoredEdge, StoredNode,
};

const NODE_COLUMNS: &str = "label, id, tags_json, properties_json";
const EDGE_COLUMNS: &str =
    "source_label, source_id, relation, target_label, target_id, properties_json";

/// SQLite-backed implementation of [`GraphStore`].
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at `path`.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        Self::with_config(path, SqliteConfig::default())
    }

    /// Opens (or creates) a SQLite database at `path` with explicit settings.
    pub fn with_config(path: &str, config: SqliteConfig) -> Result<Self, StorageError> {
        let conn = crate::schema::open_database(path, config)?;
        Ok(SqliteStore { conn })
    }

    /// Opens an in-memory SQLite database (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = crate::schema::open_in_memory()?;
        Ok(SqliteStore { conn })
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn load_node(&self, node: &NodeRef) -> Result<Option<StoredNode>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM nodes WHERE label = ?1 AND id = ?2", NODE_COLUMNS),
                params![node.label.as_str(), node.id.as_str()],
                raw_node,
            )
            .optional()?;
        row.map(decode_node).transpose()
    }

    fn require_node(&self, node: &NodeRef) -> Result<StoredNode, StorageError> {
        self.load_node(node)?
            .ok_or_else(|| StorageError::NodeNotFound { node: node.clone() })
    }

    fn write_tags(&self, node: &NodeRef, tags: &BTreeSet<Tag>) -> Result<(), StorageError> {
        self.conn.execute(
            "UPDATE nodes SET tags_json = ?3 WHERE label = ?1 AND id = ?2",
            params![
                node.label.as_str(),
                node.id.as_str(),
                serde_json::to_string(tags)?
            ],
        )?;
        Ok(())
    }

    /// Outgoing targets of `node` along `relation`, for chain walks.
    fn targets(&self, node: &NodeRef, relation: Relation) -> Result<Vec<NodeRef>, StorageError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT target_label, target_id FROM edges
             WHERE source_label = ?1 AND source_id = ?2 AND relation = ?3",
        )?;
        let rows = stmt
            .query_map(
                params![node.label.as_str(), node.id.as_str(), relation.as_str()],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(label, id)| decode_ref(&label, id))
            .collect()
    }
}

/// WHERE clause selecting the edges of node `?1`/`?2` with relation `?3`.
fn edge_filter(direction: Direction) -> &'static str {
    match direction {
        Direction::Outgoing => "relation = ?3 AND source_label = ?1 AND source_id = ?2",
        Direction::Incoming => "relation = ?3 AND target_label = ?1 AND target_id = ?2",
        Direction::Both => {
            "relation = ?3 AND ((source_label = ?1 AND source_id = ?2)
                             OR (target_label = ?1 AND target_id = ?2))"
        }
    }
}

type RawNode = (String, String, String, String);
type RawEdge = (String, String, String, String, String, String);

fn raw_node(row: &Row<'_>) -> rusqlite::Result<RawNode> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn raw_edge(row: &Row<'_>) -> rusqlite::Result<RawEdge> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_ref(label: &str, id: String) -> Result<NodeRef, StorageError> {
    let label: NodeLabel = label
        .parse()
        .map_err(|reason| StorageError::IntegrityError { reason })?;
    Ok(NodeRef::new(label, NodeId(id)))
}

fn decode_node((label, id, tags, properties): RawNode) -> Result<StoredNode, StorageError> {
    Ok(StoredNode {
        node: decode_ref(&label, id)?,
        tags: serde_json::from_str(&tags)?,
        properties: serde_json::from_str(&properties)?,
    })
}

fn decode_edge(
    (source_label, source_id, relation, target_label, target_id, properties): RawEdge,
) -> Result<StoredEdge, StorageError> {
    Ok(StoredEdge {
        source: decode_ref(&source_label, source_id)?,
        relation: relation
            .parse()
            .map_err(|reason| StorageError::IntegrityError { reason })?,
        target: decode_ref(&target_label, target_id)?,
        properties: serde_json::from_str(&properties)?,
    })
}

impl GraphStore for SqliteStore {
    // -----------------------------------------------------------------------
    // Transactions
    // -----------------------------------------------------------------------

    fn begin(&mut self) -> Result<(), StorageError> {
        if !self.conn.is_autocommit() {
            return Err(StorageError::Transaction {
                reason: "a transaction is already open".into(),
            });
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.conn.is_autocommit() {
            return Err(StorageError::Transaction {
                reason: "commit without an open transaction".into(),
            });
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), StorageError> {
        if self.conn.is_autocommit() {
            return Err(StorageError::Transaction {
                reason: "rollback without an open transaction".into(),
            });
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    fn merge_node(&mut self, node: &NodeRef) -> Result<bool, StorageError> {
        let inserted = self.conn.execute(
            "INSERT INTO nodes (label, id) VALUES (?1, ?2) ON CONFLICT DO NOTHING",
            params![node.label.as_str(), node.id.as_str()],
        )?;
        Ok(inserted == 1)
    }

    fn get_node(&self, node: &NodeRef) -> Result<Option<StoredNode>, StorageError> {
        self.load_node(node)
    }

    fn nodes_with_label(&self, label: NodeLabel) -> Result<Vec<StoredNode>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM nodes WHERE label = ?1 ORDER BY id",
            NODE_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![label.as_str()], raw_node)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(decode_node).collect()
    }

    fn set_properties(
        &mut self,
        node: &NodeRef,
        properties: &Properties,
    ) -> Result<(), StorageError> {
        let mut stored = self.require_node(node)?;
        merge_properties(&mut stored.properties, properties);
        self.conn.execute(
            "UPDATE nodes SET properties_json = ?3 WHERE label = ?1 AND id = ?2",
            params![
                node.label.as_str(),
                node.id.as_str(),
                serde_json::to_string(&stored.properties)?
            ],
        )?;
        Ok(())
    }

    fn add_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError> {
        let mut stored = self.require_node(node)?;
        if !stored.tags.insert(tag) {
            return Ok(false);
        }
        self.write_tags(node, &stored.tags)?;
        Ok(true)
    }

    fn remove_tag(&mut self, node: &NodeRef, tag: Tag) -> Result<bool, StorageError> {
        let mut stored = self.require_node(node)?;
        if !stored.tags.remove(&tag) {
            return Ok(false);
        }
        self.write_tags(node, &stored.tags)?;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Relationships
    // -----------------------------------------------------------------------

    fn merge_edge(
        &mut self,
        source: &NodeRef,
        relation: Relation,
        target: &NodeRef,
        properties: &Properties,
    ) -> Result<bool, StorageError> {
        self.require_node(source)?;
        self.require_node(target)?;

        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT properties_json FROM edges
                 WHERE source_label = ?1 AND source_id = ?2 AND relation = ?3
                   AND target_label = ?4 AND target_id = ?5",
                params![
                    source.label.as_str(),
                    source.id.as_str(),
                    relation.as_str(),
                    target.label.as_str(),
                    target.id.as_str(),
                ],
                |row| row.get(0),
            )
            .optional()?;

        let created = existing.is_none();
        let mut merged: Properties = match existing {
            Some(json) => serde_json::from_str(&json)?,
            None => Properties::new(),
        };
        merge_properties(&mut merged, properties);

        self.conn.execute(
            "INSERT INTO edges (source_label, source_id, relation, target_label, target_id, properties_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (source_label, source_id, relation, target_label, target_id)
             DO UPDATE SET properties_json = excluded.properties_json",
            params![
                source.label.as_str(),
                source.id.as_str(),
                relation.as_str(),
                target.label.as_str(),
                target.id.as_str(),
                serde_json::to_string(&merged)?
            ],
        )?;
        Ok(created)
    }

    fn edges(
        &self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<Vec<StoredEdge>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM edges WHERE {}",
            EDGE_COLUMNS,
            edge_filter(direction)
        ))?;
        let mut edges = Vec::new();
        for relation in relations {
            let rows = stmt
                .query_map(
                    params![node.label.as_str(), node.id.as_str(), relation.as_str()],
                    raw_edge,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            for row in rows {
                edges.push(decode_edge(row)?);
            }
        }
        Ok(edges)
    }

    fn delete_edges(
        &mut self,
        node: &NodeRef,
        relations: &[Relation],
        direction: Direction,
    ) -> Result<usize, StorageError> {
        let sql = format!("DELETE FROM edges WHERE {}", edge_filter(direction));
        let mut deleted = 0;
        for relation in relations {
            deleted += self.conn.execute(
                &sql,
                params![node.label.as_str(), node.id.as_str(), relation.as_str()],
            )?;
        }
        Ok(deleted)
    }

    // -----------------------------------------------------------------------
    // Traversals
    // -----------------------------------------------------------------------

    fn children_ordered(
        &self,
        parent: &NodeRef,
        relation: Relation,
        order_key: &str,
    ) -> Result<Vec<StoredNode>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT n.label, n.id, n.tags_json, n.properties_json
             FROM edges e
             JOIN nodes n ON n.label = e.target_label AND n.id = e.target_id
             WHERE e.source_label = ?1 AND e.source_id = ?2 AND e.relation = ?3",
        )?;
        let rows = stmt
            .query_map(
                params![parent.label.as_str(), parent.id.as_str(), relation.as_str()],
                raw_node,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        let mut children = rows
            .into_iter()
            .map(decode_node)
            .collect::<Result<Vec<_>, _>>()?;
        sort_by_order_key(&mut children, order_key);
        Ok(children)
    }

    fn follow_chain(
        &self,
        start: &NodeRef,
        relation: Relation,
    ) -> Result<Vec<NodeRef>, StorageError> {
        self.require_node(start)?;
        walk_chain(start, relation, |current| self.targets(current, relation))
    }

    fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize, StorageError> {
        let count: i64 = match label {
            Some(label) => self.conn.query_row(
                "SELECT COUNT(*) FROM nodes WHERE label = ?1",
                params![label.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn count_edges(&self, relation: Option<Relation>) -> Result<usize, StorageError> {
        let count: i64 = match relation {
            Some(relation) => self.conn.query_row(
                "SELECT COUNT(*) FROM edges WHERE relation = ?1",
                params![relation.as_str()],
                |row| row.get(0),
            )?,
            None => self
                .conn
                .query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn props(key: &str, value: serde_json::Value) -> Properties {
        let mut p = Properties::new();
        p.insert(key.into(), value);
        p
    }

    #[test]
    fn node_round_trips_tags_and_properties() {
        let mut store = SqliteStore::in_memory().unwrap();
        let course = NodeRef::course("cypher");
        assert!(store.merge_node(&course).unwrap());
        assert!(!store.merge_node(&course).unwrap());

        store.set_properties(&course, &props("title", json!("Cypher"))).unwrap();
        store.set_properties(&course, &props("order", json!(3))).unwrap();
        assert!(store.add_tag(&course, Tag::FromCommunityGraph).unwrap());

        let stored = store.get_node(&course).unwrap().unwrap();
        assert_eq!(stored.str_property("title"), Some("Cypher"));
        assert_eq!(stored.int_property("order"), Some(3));
        assert!(stored.has_tag(Tag::FromCommunityGraph));
    }

    #[test]
    fn merge_edge_is_idempotent() {
        let mut store = SqliteStore::in_memory().unwrap();
        let module = NodeRef::module("c", "m");
        let lesson = NodeRef::lesson("c", "m", "l");
        store.merge_node(&module).unwrap();
        store.merge_node(&lesson).unwrap();

        assert!(store.merge_edge(&module, Relation::HasLesson, &lesson, &Properties::new()).unwrap());
        assert!(!store.merge_edge(&module, Relation::HasLesson, &lesson, &Properties::new()).unwrap());
        assert_eq!(store.count_edges(Some(Relation::HasLesson)).unwrap(), 1);
    }

    #[test]
    fn merge_edge_to_missing_node_fails() {
        let mut store = SqliteStore::in_memory().unwrap();
        let module = NodeRef::module("c", "m");
        store.merge_node(&module).unwrap();
        let err = store
            .merge_edge(&module, Relation::HasLesson, &NodeRef::lesson("c", "m", "x"), &Properties::new())
            .unwrap_err();
        assert!(matches!(err, StorageError::NodeNotFound { .. }));
    }

    #[test]
    fn both_direction_does_not_double_count_self_loops() {
        let mut store = SqliteStore::in_memory().unwrap();
        let a = NodeRef::course("a");
        store.merge_node(&a).unwrap();
        store.merge_edge(&a, Relation::Prerequisite, &a, &Properties::new()).unwrap();
        assert_eq!(store.edges(&a, &[Relation::Prerequisite], Direction::Both).unwrap().len(), 1);
        assert_eq!(store.delete_edges(&a, &[Relation::Prerequisite], Direction::Both).unwrap(), 1);
    }

    #[test]
    fn rollback_discards_writes() {
        let mut store = SqliteStore::in_memory().unwrap();
        store.begin().unwrap();
        store.merge_node(&NodeRef::course("a")).unwrap();
        store.rollback().unwrap();
        assert_eq!(store.count_nodes(None).unwrap(), 0);

        store.begin().unwrap();
        assert!(store.begin().is_err());
        store.merge_node(&NodeRef::course("b")).unwrap();
        store.commit().unwrap();
        assert_eq!(store.count_nodes(Some(NodeLabel::Course)).unwrap(), 1);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let path = path.to_str().unwrap();

        let a = NodeRef::lesson("c", "m", "a");
        let b = NodeRef::lesson("c", "m", "b");
        {
            let mut store = SqliteStore::new(path).unwrap();
            store.begin().unwrap();
            store.merge_node(&a).unwrap();
            store.merge_node(&b).unwrap();
            store.merge_edge(&a, Relation::Next, &b, &Properties::new()).unwrap();
            store.commit().unwrap();
        }

        let store = SqliteStore::new(path).unwrap();
        assert_eq!(store.follow_chain(&a, Relation::Next).unwrap(), vec![a, b]);
    }

    #[test]
    fn second_writer_is_reported_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let path = path.to_str().unwrap();
        let config = SqliteConfig {
            busy_timeout: std::time::Duration::from_millis(10),
        };

        let mut first = SqliteStore::with_config(path, config).unwrap();
        let mut second = SqliteStore::with_config(path, config).unwrap();
        first.begin().unwrap();
        let err = second.begin().unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
        first.rollback().unwrap();
    }
}
