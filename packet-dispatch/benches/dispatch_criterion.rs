/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use dispatch_test_utils::{outbound, wait_until, RecordingListener, RecordingTransport};
use packet_dispatch::{
    ConnectionId, DispatchConfig, ListeningWhitelist, PacketDispatcher, PacketType,
};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

const BATCH: usize = 64;

fn bench_unobserved_enqueue(c: &mut Criterion) {
    let transport = Arc::new(RecordingTransport::default());
    let dispatcher =
        PacketDispatcher::new(DispatchConfig::default(), transport).expect("dispatcher");
    let connection = ConnectionId::new();

    c.bench_function("enqueue_without_listeners", |b| {
        b.iter(|| {
            let token = dispatcher
                .enqueue(outbound(connection, 1, black_box(b"payload")))
                .expect("enqueue");
            black_box(token);
        })
    });
}

fn bench_listener_round_trip(c: &mut Criterion) {
    let mut group = c.benchmark_group("listener_round_trip");
    group.throughput(Throughput::Elements(BATCH as u64));

    for workers in [1usize, 4] {
        let transport = Arc::new(RecordingTransport::default());
        let dispatcher = PacketDispatcher::new(DispatchConfig::default(), transport.clone())
            .expect("dispatcher");
        let listener = Arc::new(
            RecordingListener::new("bench").sending(ListeningWhitelist::of([PacketType::new(1)])),
        );
        let pool = dispatcher
            .register_listener(listener, false)
            .expect("register");
        pool.set_workers(workers).expect("workers");
        let connection = ConnectionId::new();

        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, _| {
            b.iter(|| {
                let target = transport.len() + BATCH;
                for _ in 0..BATCH {
                    dispatcher
                        .enqueue(outbound(connection, 1, b"payload"))
                        .expect("enqueue");
                }
                assert!(wait_until(Duration::from_secs(10), || transport.len() >= target));
            })
        });

        dispatcher.shutdown();
    }
    group.finish();
}

criterion_group!(benches, bench_unobserved_enqueue, bench_listener_round_trip);
criterion_main!(benches);
