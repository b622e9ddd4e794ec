use criterion::{black_box, criterion_group, criterion_main, Criterion};
use cogen_rs::{spawn, Runtime};

fn runtime_creation_benchmark(c: &mut Criterion) {
    c.bench_function("runtime_creation", |b| {
        b.iter(|| {
            let _runtime = black_box(Runtime::new());
        })
    });
}

fn basic_task_spawning_benchmark(c: &mut Criterion) {
    c.bench_function("basic_task_spawn", |b| {
        b.iter(|| {
            let runtime = Runtime::new();
            let result = runtime.block_on(async {
                let handle = spawn(async { 42 });
                *handle.await.unwrap()
            });
            black_box(result);
        })
    });
}

criterion_group!(
    benches,
    runtime_creation_benchmark,
    basic_task_spawning_benchmark
);
criterion_main!(benches);
