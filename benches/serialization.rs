//! Benchmarks for the pluggable codecs

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde::{Deserialize, Serialize};
use tagged_cache::{AnyCodec, CacheCodec, CodecKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    id: u64,
    name: String,
    email: String,
    roles: Vec<String>,
}

impl User {
    fn new(id: u64) -> Self {
        Self {
            id,
            name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            roles: vec!["reader".to_string(), "writer".to_string()],
        }
    }
}

fn enabled_codecs() -> Vec<AnyCodec> {
    [CodecKind::Json, CodecKind::MsgPack, CodecKind::Bincode]
        .into_iter()
        .filter_map(|kind| AnyCodec::from_kind(kind).ok())
        .collect()
}

/// Encode then decode one value with every compiled-in codec
fn bench_round_trip(c: &mut Criterion) {
    let user = User::new(123);
    let mut group = c.benchmark_group("codec_round_trip");

    for codec in enabled_codecs() {
        group.bench_with_input(BenchmarkId::from_parameter(codec.name()), &codec, |b, codec| {
            b.iter(|| {
                let bytes = codec
                    .serialize(black_box(&user))
                    .unwrap_or_else(|_| panic!("Failed to serialize"));
                black_box(
                    codec
                        .deserialize::<User>(&bytes)
                        .unwrap_or_else(|_| panic!("Failed to deserialize")),
                );
            });
        });
    }

    group.finish();
}

/// Encode a page of values of growing size
fn bench_page_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_page_encode");

    for count in [10u64, 100, 1_000] {
        let page: Vec<User> = (0..count).map(User::new).collect();
        for codec in enabled_codecs() {
            group.bench_with_input(BenchmarkId::new(codec.name(), count), &page, |b, page| {
                b.iter(|| {
                    black_box(
                        codec
                            .serialize(page)
                            .unwrap_or_else(|_| panic!("Failed to serialize")),
                    );
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_round_trip, bench_page_sizes);
criterion_main!(benches);
