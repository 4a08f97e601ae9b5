// Copyright 2022 houseme
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use criterion::{Criterion, criterion_group, criterion_main};
use snowflake_idgen::{Config, IdGeneration, MemoryStore, Snowflake, WorkerIdentity};

fn bench_new(c: &mut Criterion) {
    c.bench_function("bench_new", |b| {
        b.iter(|| Snowflake::builder().worker_id(&|| Ok(1)).finalize());
    });
}

fn bench_next_id(c: &mut Criterion) {
    let sf = Snowflake::builder()
        .worker_id(&|| Ok(1))
        .finalize()
        .expect("Could not create Snowflake");
    c.bench_function("bench_next_id", |b| {
        b.iter(|| sf.next_id());
    });
}

fn bench_facade(c: &mut Criterion) {
    let identity = WorkerIdentity::new("10.0.0.1".parse().unwrap(), 8080, false)
        .expect("Could not create identity");
    let ids = IdGeneration::bootstrap(MemoryStore::new(), &identity, &Config::default())
        .expect("Could not bootstrap");
    c.bench_function("bench_gen_order_no", |b| {
        b.iter(|| ids.gen_order_no(Some("AB"), Some("001")));
    });
    c.bench_function("bench_gen_mch_id", |b| {
        b.iter(|| ids.gen_mch_id(Some("123"), true));
    });
}

criterion_group!(snowflake_perf, bench_new, bench_next_id, bench_facade);
criterion_main!(snowflake_perf);
