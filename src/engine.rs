//! The `Index` facade: mapping registry, segment manager and queries

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::info;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::models::{Document, WriteResult};
use crate::query::{QueryContext, RangeQuery, RangeValue, TermQuery, ValueQuery};
use crate::schema::{FieldDeclaration, Mapping};
use crate::segment::{SegmentInfo, SegmentManager};

/// A single document index.
///
/// Writes go to the open segment and become searchable after `refresh`.
/// `get` and `update` see unrefreshed writes.
pub struct Index {
    manager: SegmentManager,
}

impl Index {
    /// Open an index. With a data directory, the last committed mapping
    /// and segments are recovered.
    pub fn open(config: IndexConfig) -> Result<Self> {
        let manager = SegmentManager::open(config)?;
        info!(
            persistent = manager.config().data_dir.is_some(),
            docs = manager.doc_count(),
            "Index opened"
        );
        Ok(Self { manager })
    }

    /// Open an in-memory index with default settings
    pub fn in_memory() -> Result<Self> {
        Self::open(IndexConfig::in_memory())
    }

    pub fn config(&self) -> &IndexConfig {
        self.manager.config()
    }

    /// Merge a mapping definition into the current mapping. It is
    /// committed to disk by the next refresh.
    pub fn define_mapping(&self, mapping: Mapping) -> Result<()> {
        self.manager.define_mapping(mapping)
    }

    /// Same as [`Index::define_mapping`] for a JSON mapping body
    pub fn define_mapping_json(&self, body: &Value) -> Result<()> {
        self.define_mapping(Mapping::from_json(body)?)
    }

    /// Current mapping snapshot
    pub fn mapping(&self) -> Arc<Mapping> {
        self.manager.registry().snapshot()
    }

    pub fn get_field_declaration(&self, name: &str) -> Option<FieldDeclaration> {
        self.manager.registry().get_field_declaration(name)
    }

    pub fn index(&self, doc: Document) -> Result<WriteResult> {
        self.manager.index(doc)
    }

    /// Partial update: `changes` override top-level fields of the current
    /// document
    pub fn update(&self, doc_id: &str, changes: &Map<String, Value>) -> Result<WriteResult> {
        self.manager.update(doc_id, changes)
    }

    pub fn delete(&self, doc_id: &str) -> Result<WriteResult> {
        self.manager.delete(doc_id)
    }

    pub fn get(&self, doc_id: &str) -> Result<Option<Document>> {
        self.manager.get(doc_id)
    }

    /// Make pending writes searchable. Returns the number of segments sealed.
    pub fn refresh(&self) -> Result<usize> {
        self.manager.refresh()
    }

    pub fn force_merge(&self, max_segments: usize) -> Result<usize> {
        self.manager.force_merge(max_segments)
    }

    /// Ids of docs whose `field` value lies in `[lo, hi]`
    pub fn search(
        &self,
        field: &str,
        lo: impl Into<RangeValue>,
        hi: impl Into<RangeValue>,
    ) -> Result<Vec<String>> {
        self.execute_range(&RangeQuery::new(field, lo, hi))
    }

    pub fn execute_range(&self, query: &RangeQuery) -> Result<Vec<String>> {
        query.execute(&self.context())
    }

    /// Ids of docs whose `field` contains `term`
    pub fn term_search(&self, field: &str, term: &str) -> Result<Vec<String>> {
        TermQuery::new(field, term).execute(&self.context())
    }

    /// Ids of docs whose `field` doc value equals `value`
    pub fn value_search(&self, field: &str, value: impl Into<Value>) -> Result<Vec<String>> {
        ValueQuery::new(field, value).execute(&self.context())
    }

    pub fn list_segments(&self) -> Vec<SegmentInfo> {
        self.manager.list_segments()
    }

    /// Live docs visible to search
    pub fn doc_count(&self) -> u64 {
        self.manager.doc_count()
    }

    fn context(&self) -> QueryContext<'_> {
        QueryContext::new(
            self.manager.snapshot(),
            self.manager.registry().snapshot(),
            self.manager.tokenizer(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapstoreError;
    use serde_json::json;

    fn index() -> Index {
        let index = Index::in_memory().unwrap();
        index
            .define_mapping_json(&json!({
                "_source": { "enabled": true },
                "properties": {
                    "title": { "type": "text" },
                    "status": { "type": "keyword" },
                    "price": { "type": "double", "doc_values": true }
                }
            }))
            .unwrap();
        index
    }

    #[test]
    fn test_term_search_analyzes_text() {
        let index = index();
        index
            .index(Document::new("a").with_field("title", "Rust Storage Engine"))
            .unwrap();
        index
            .index(Document::new("b").with_field("title", "storage of rust crates"))
            .unwrap();
        index.refresh().unwrap();

        assert_eq!(index.term_search("title", "storage").unwrap(), vec!["a", "b"]);
        assert_eq!(index.term_search("title", "RUST engine").unwrap(), vec!["a"]);
        assert!(index.term_search("title", "python").unwrap().is_empty());
    }

    #[test]
    fn test_double_range_search() {
        let index = index();
        for (id, price) in [("a", -2.5), ("b", 0.0), ("c", 9.99)] {
            index
                .index(Document::new(id).with_field("price", price))
                .unwrap();
        }
        index.refresh().unwrap();

        assert_eq!(index.search("price", -3, 0).unwrap(), vec!["a", "b"]);
        assert_eq!(index.search("price", 0.5, 10.0).unwrap(), vec!["c"]);
        assert!(index.search("price", 10, 20).unwrap().is_empty());
    }

    #[test]
    fn test_query_errors() {
        let index = index();
        assert!(matches!(
            index.search("title", 0, 1),
            Err(MapstoreError::FieldNotColumnar { .. })
        ));
        assert!(matches!(
            index.search("unknown", 0, 1),
            Err(MapstoreError::FieldNotColumnar { .. })
        ));
        assert!(matches!(
            index.search("status", 0, 1),
            Err(MapstoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            index.search("price", f64::NAN, 1.0),
            Err(MapstoreError::InvalidQuery(_))
        ));
        assert!(matches!(
            index.term_search("unknown", "x"),
            Err(MapstoreError::FieldNotSearchable { .. })
        ));
    }

    #[test]
    fn test_value_search_matches_whole_keyword() {
        let index = index();
        for (id, status, price) in [("a", "in stock", 1.5), ("b", "sold", 2.0), ("c", "in stock", 2.0)] {
            index
                .index(
                    Document::new(id)
                        .with_field("status", status)
                        .with_field("price", price),
                )
                .unwrap();
        }
        index.refresh().unwrap();

        assert_eq!(index.value_search("status", "in stock").unwrap(), vec!["a", "c"]);
        assert!(index.value_search("status", "stock").unwrap().is_empty());
        assert_eq!(index.value_search("price", 2).unwrap(), vec!["b", "c"]);
        assert!(index.value_search("status", Value::Null).unwrap().is_empty());
        assert!(matches!(
            index.value_search("title", "x"),
            Err(MapstoreError::FieldNotColumnar { .. })
        ));
        assert!(matches!(
            index.value_search("price", "cheap"),
            Err(MapstoreError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_get_sees_unrefreshed_writes() {
        let index = index();
        index
            .index(Document::new("a").with_field("status", "draft"))
            .unwrap();
        assert_eq!(
            index.get("a").unwrap().unwrap().get("status"),
            Some(&json!("draft"))
        );
        assert!(index.term_search("status", "draft").unwrap().is_empty());
        index.refresh().unwrap();
        assert_eq!(index.term_search("status", "draft").unwrap(), vec!["a"]);
    }
}
