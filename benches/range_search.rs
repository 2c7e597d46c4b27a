use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;

use mapstore::{Document, Index, IndexConfig};

fn build_index(doc_count: usize, segments: usize) -> Index {
    let index = Index::open(IndexConfig::in_memory().with_max_segments(segments)).unwrap();
    index
        .define_mapping_json(&json!({
            "_source": { "enabled": false },
            "properties": {
                "name": { "type": "text", "store": true, "doc_values": false }
            },
            "dynamic_templates": [
                { "dv": {
                    "match": "dv_*",
                    "mapping": { "type": "integer", "index": false, "doc_values": true }
                } }
            ]
        }))
        .unwrap();

    let per_segment = (doc_count / segments).max(1);
    for i in 0..doc_count {
        let doc = Document::new(i.to_string())
            .with_field("dv_field", (i % 1_000) as i64)
            .with_field("name", format!("doc {}", i));
        index.index(doc).unwrap();
        if (i + 1) % per_segment == 0 {
            index.refresh().unwrap();
        }
    }
    index.refresh().unwrap();
    index
}

fn bench_range_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("range_search");
    for &count in &[1_000usize, 10_000, 50_000] {
        let index = build_index(count, 4);
        group.bench_with_input(BenchmarkId::new("point", count), &index, |b, index| {
            b.iter(|| black_box(index.search("dv_field", 500, 500).unwrap()))
        });
        group.bench_with_input(BenchmarkId::new("wide", count), &index, |b, index| {
            b.iter(|| black_box(index.search("dv_field", 100, 899).unwrap()))
        });
    }
    group.finish();
}

fn bench_update_refresh(c: &mut Criterion) {
    let index = build_index(10_000, 4);
    let mut value = 0i64;
    c.bench_function("update_refresh", |b| {
        b.iter(|| {
            value += 1;
            let changes = json!({ "dv_field": value });
            index.update("42", changes.as_object().unwrap()).unwrap();
            black_box(index.refresh().unwrap())
        })
    });
}

criterion_group!(benches, bench_range_search, bench_update_refresh);
criterion_main!(benches);
