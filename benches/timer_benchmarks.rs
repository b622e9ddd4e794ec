use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use cogen_rs::timer::heap::TimerHeap;
use cogen_rs::timer::{sleep, Interval};
use cogen_rs::Runtime;
use std::time::{Duration, Instant};

fn timer_insertion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_insertion");
    group.throughput(Throughput::Elements(1));

    group.bench_function("single_insert", |b| {
        let mut heap = TimerHeap::new();
        let now = Instant::now();

        b.iter(|| {
            let deadline = black_box(now + Duration::from_millis(100));
            let _seq = black_box(heap.push(deadline, 0u64));
        })
    });

    group.finish();
}

fn timer_batch_insertion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_batch_insertion");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size));
        group.bench_with_input(format!("batch_{}", batch_size), batch_size, |b, &size| {
            b.iter(|| {
                let mut heap = TimerHeap::new();
                let now = Instant::now();

                for i in 0..size {
                    let deadline = black_box(now + Duration::from_millis(i + 1));
                    let _seq = black_box(heap.push(deadline, i));
                }
            })
        });
    }

    group.finish();
}

fn timer_expiration_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_expiration");

    for timer_count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*timer_count));
        group.bench_with_input(
            format!("expire_{}_timers", timer_count),
            timer_count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let mut heap = TimerHeap::new();
                        let now = Instant::now();
                        for i in 0..count {
                            let deadline = now + Duration::from_millis(1 + (i % 10));
                            heap.push(deadline, i);
                        }
                        (heap, now + Duration::from_millis(20))
                    },
                    |(mut heap, expire_time)| {
                        let mut fired = Vec::new();
                        while let Some(payload) = heap.pop_due(expire_time) {
                            fired.push(payload);
                        }
                        black_box(fired);
                    },
                    criterion::BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

fn timer_heap_creation_benchmark(c: &mut Criterion) {
    c.bench_function("timer_heap_creation", |b| {
        b.iter(|| {
            let _heap: TimerHeap<u64> = black_box(TimerHeap::new());
        })
    });
}

fn timer_sleep_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("timer_sleep");
    group.throughput(Throughput::Elements(1));

    group.bench_function("sleep_future", |b| {
        let runtime = Runtime::new();
        b.iter(|| {
            runtime.block_on(sleep(Duration::from_millis(1)));
        })
    });

    group.finish();
}

fn interval_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval");
    group.throughput(Throughput::Elements(1));

    group.bench_function("interval_tick", |b| {
        let runtime = Runtime::new();
        b.iter(|| {
            runtime.block_on(async {
                let mut interval = Interval::new(Duration::from_millis(1));
                interval.tick().await;
            });
        })
    });

    group.finish();
}

criterion_group!(
    timer_benches,
    timer_insertion_benchmark,
    timer_batch_insertion_benchmark,
    timer_expiration_benchmark,
    timer_heap_creation_benchmark,
    timer_sleep_benchmark,
    interval_benchmark
);
criterion_main!(timer_benches);
