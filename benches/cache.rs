use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use koo_rpc::wire::frame;
use koo_rpc::wire::xmlrpc;
use koo_rpc::{CachePolicy, ResultCache};

fn view_args(i: usize) -> Vec<Value> {
    vec![
        json!("res.partner"),
        json!("fields_view_get"),
        json!(i),
        json!("form"),
        json!({"lang": "en_US", "tz": "Europe/Brussels", "active_test": true}),
    ]
}

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("result_cache");
    for &n in &[100usize, 10_000usize] {
        let mut cache = ResultCache::new(CachePolicy::ViewsAndActions);
        for i in 0..n { cache.add(json!({"arch": "<form/>", "view_id": i}), "/object", "execute", &view_args(i)); }
        let probes: Vec<Vec<Value>> = (0..n).map(view_args).collect();

        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("get_hit", n), &n, |b, _| {
            b.iter(|| {
                let mut hits = 0usize;
                for args in &probes {
                    if cache.get("/object", "execute", args).is_some() { hits += 1; }
                }
                criterion::black_box(hits);
            });
        });
        group.bench_with_input(BenchmarkId::new("exists_miss", n), &n, |b, _| {
            let miss = view_args(n + 1);
            b.iter(|| criterion::black_box(cache.exists("/object", "execute", &miss)));
        });
    }
    group.finish();
}

fn bench_codecs(c: &mut Criterion) {
    let mut group = c.benchmark_group("codecs");
    let rows: Value = Value::Array((0..200).map(|i| json!({"id": i, "name": format!("Partner {}", i), "credit": 12.5, "active": true})).collect());
    let creds = koo_rpc::wire::Credentials { database: "demo".into(), uid: 1, password: "admin".into(), authorized: true };

    group.bench_function("frame_request_body", |b| {
        b.iter(|| frame::request_body(&creds, "/object", "execute", &[json!("res.partner"), json!("write"), rows.clone()]))
    });
    let xml = xmlrpc::encode_response(&rows);
    group.bench_function("xmlrpc_encode_response", |b| b.iter(|| xmlrpc::encode_response(&rows)));
    group.bench_function("xmlrpc_decode_response", |b| b.iter(|| xmlrpc::decode_response(&xml)));
    group.finish();
}

criterion_group!(benches, bench_cache, bench_codecs);
criterion_main!(benches);
