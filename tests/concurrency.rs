//! Writers, refreshes and searches running on separate threads
//!
//! Every published snapshot must hold whole refreshes: a reader never
//! sees a superseded copy next to its replacement, and nothing indexed
//! before the last refresh goes missing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde_json::json;

use mapstore::{Document, Index};

const THREADS: usize = 4;
const DOCS_PER_THREAD: usize = 250;

fn create_index() -> Arc<Index> {
    let index = Index::in_memory().unwrap();
    index
        .define_mapping_json(&json!({
            "_source": { "enabled": false },
            "properties": {
                "name": { "type": "text", "store": true, "doc_values": false }
            },
            "dynamic_templates": [
                { "dv_template": {
                    "match": "dv_*",
                    "mapping": { "type": "integer", "index": false, "store": false, "doc_values": true }
                } }
            ]
        }))
        .unwrap();
    Arc::new(index)
}

fn create_doc(id: String, value: i64) -> Document {
    Document::new(id.clone())
        .with_field("dv_x", value)
        .with_field("name", id)
}

#[test]
fn test_concurrent_writers_and_refreshes_lose_nothing() {
    let index = create_index();
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for i in 0..DOCS_PER_THREAD {
                    let value = (thread_id * DOCS_PER_THREAD + i) as i64;
                    index
                        .index(create_doc(format!("t{}-{}", thread_id, i), value))
                        .unwrap();
                }
            })
        })
        .collect();

    let refresher = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut last_hits = 0;
            let mut last_count = 0;
            for _ in 0..50 {
                index.refresh().unwrap();
                let hits = index.search("dv_x", 0, 10_000).unwrap().len();
                let count = index.doc_count();
                // Inserts only: published totals never shrink
                assert!(hits >= last_hits, "hits went from {} to {}", last_hits, hits);
                assert!(count >= last_count, "count went from {} to {}", last_count, count);
                last_hits = hits;
                last_count = count;
                if done.load(Ordering::SeqCst) {
                    break;
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    refresher.join().unwrap();

    index.refresh().unwrap();
    let total = THREADS * DOCS_PER_THREAD;
    assert_eq!(index.doc_count(), total as u64);
    assert_eq!(index.search("dv_x", 0, 10_000).unwrap().len(), total);
    assert_eq!(index.search("dv_x", 250, 499).unwrap().len(), DOCS_PER_THREAD);
    assert_eq!(index.term_search("name", "t3-249").unwrap(), vec!["t3-249"]);
}

#[test]
fn test_concurrent_updates_keep_totals_stable() {
    let index = create_index();
    let total = THREADS * DOCS_PER_THREAD;
    for i in 0..total {
        index.index(create_doc(format!("d{}", i), i as i64)).unwrap();
    }
    index.refresh().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writers: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let index = Arc::clone(&index);
            thread::spawn(move || {
                for round in 1..=3i64 {
                    for i in 0..DOCS_PER_THREAD {
                        let doc = thread_id * DOCS_PER_THREAD + i;
                        let changes = json!({ "dv_x": round * 10_000 + doc as i64 });
                        index
                            .update(&format!("d{}", doc), changes.as_object().unwrap())
                            .unwrap();
                    }
                }
            })
        })
        .collect();

    let reader = {
        let index = Arc::clone(&index);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for _ in 0..50 {
                index.refresh().unwrap();
                // Each doc is visible exactly once in every snapshot
                assert_eq!(index.doc_count(), total as u64);
                assert_eq!(index.search("dv_x", 0, i64::MAX).unwrap().len(), total);
                if done.load(Ordering::SeqCst) {
                    break;
                }
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);
    reader.join().unwrap();

    index.refresh().unwrap();
    assert_eq!(index.doc_count(), total as u64);
    assert_eq!(index.search("dv_x", 30_000, 39_999).unwrap().len(), total);
    assert!(index.search("dv_x", 0, 29_999).unwrap().is_empty());
    assert!(index.list_segments().len() <= index.config().merge.max_segments);
}
