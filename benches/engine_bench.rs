use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use tokio::runtime::Runtime;

use polystore::entities::{user_to_fields, User, USER_SCHEMA};
use polystore::{CrudEngine, MemoryKvStore, MemoryRecordStore, TypedStore};

fn sample_user(i: i64) -> User {
    User {
        name: format!("user-{i}"),
        age: 20 + (i % 50),
        address: Some("12 Main St".to_string()),
        is_married: Some(i % 2 == 0),
        about_him: json!({"likes": "chess"}).as_object().cloned(),
        his_family: Some(vec![json!("Jane"), json!("Jim")]),
    }
}

fn bench_typed_kv(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = TypedStore::new(MemoryKvStore::new());

    c.bench_function("kv_set_get_string", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.set_string("greeting", "hello world").await.unwrap();
                black_box(store.get_string("greeting").await.unwrap())
            })
        })
    });

    c.bench_function("kv_set_get_json", |b| {
        let profile = json!({"level": 3, "tags": ["a", "b", "c"]});
        b.iter(|| {
            rt.block_on(async {
                store.set_json("profile", &profile).await.unwrap();
                black_box(
                    store
                        .get_json::<serde_json::Value>("profile")
                        .await
                        .unwrap(),
                )
            })
        })
    });
}

fn bench_record_engine(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("record_create", |b| {
        let engine = rt
            .block_on(CrudEngine::new(Arc::new(MemoryRecordStore::new()), &USER_SCHEMA))
            .unwrap();
        let mut i = 0;
        b.iter(|| {
            i += 1;
            rt.block_on(async {
                black_box(engine.create(&user_to_fields(&sample_user(i))).await.unwrap())
            })
        })
    });

    c.bench_function("record_read_by_filter_1000", |b| {
        let engine = rt
            .block_on(CrudEngine::new(Arc::new(MemoryRecordStore::new()), &USER_SCHEMA))
            .unwrap();
        rt.block_on(async {
            for i in 0..1000 {
                engine
                    .create(&user_to_fields(&sample_user(i)))
                    .await
                    .unwrap();
            }
        });
        let criteria: polystore::FieldMap = user_to_fields(&sample_user(0))
            .into_iter()
            .filter(|(k, _)| k == "age")
            .collect();
        b.iter(|| {
            rt.block_on(async { black_box(engine.read_by_filter(&criteria).await.unwrap()) })
        })
    });
}

criterion_group!(benches, bench_typed_kv, bench_record_engine);
criterion_main!(benches);
