use appnum::{
    AcademicYear, ApplicationNumber, Institute, InstituteId, MemoryStore, SequenceAllocator,
    StaticDirectory,
};
use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::future::try_join_all;
use std::{sync::Arc, time::Instant};
use tokio::runtime::Builder;

// Number of allocations per benchmark iteration (per task for the contended
// benchmark).
const TOTAL_IDS: usize = 1024;

fn setup() -> (MemoryStore, Arc<SequenceAllocator<StaticDirectory>>, InstituteId) {
    let institute = InstituteId::new_v4();
    let directory: StaticDirectory = [Institute::new(institute, "PGC")].into_iter().collect();
    (
        MemoryStore::new(),
        Arc::new(SequenceAllocator::new(directory)),
        institute,
    )
}

/// Renders numbers without touching a store.
fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    let year = AcademicYear::new("2026-27").unwrap();
    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.iter(|| {
            for sequence in 1..=TOTAL_IDS as u64 {
                let number = ApplicationNumber::new("PGC", year.clone(), sequence);
                black_box(number.to_string());
            }
        });
    });

    group.finish();
}

/// One transaction per allocation, no contention.
fn bench_sequential(c: &mut Criterion) {
    let rt = Builder::new_current_thread().enable_all().build().unwrap();
    let mut group = c.benchmark_group("memory/sequential");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let (store, allocator, institute) = setup();
            let start = Instant::now();
            for _ in 0..iters {
                for _ in 0..TOTAL_IDS {
                    let mut tx = store.begin();
                    let number = allocator.allocate(&mut tx, institute, "2026").await.unwrap();
                    tx.commit().unwrap();
                    black_box(number);
                }
            }
            start.elapsed()
        });
    });

    group.finish();
}

/// Every task allocates from the same key, so all of them queue on one row
/// lock.
fn bench_contended(c: &mut Criterion) {
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();
    let tasks = std::thread::available_parallelism().map_or(4, usize::from);
    let mut group = c.benchmark_group("memory/contended");
    group.throughput(Throughput::Elements((TOTAL_IDS * tasks) as u64));

    group.bench_function(format!("tasks/{tasks}/elems/{TOTAL_IDS}"), |b| {
        b.to_async(&rt).iter_custom(|iters| async move {
            let (store, allocator, institute) = setup();
            let start = Instant::now();
            for _ in 0..iters {
                let handles = (0..tasks).map(|_| {
                    let store = store.clone();
                    let allocator = allocator.clone();
                    tokio::spawn(async move {
                        for _ in 0..TOTAL_IDS {
                            let mut tx = store.begin();
                            let number =
                                allocator.allocate(&mut tx, institute, "2026").await.unwrap();
                            tx.commit().unwrap();
                            black_box(number);
                        }
                    })
                });
                try_join_all(handles).await.unwrap();
            }
            start.elapsed()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_render, bench_sequential, bench_contended);
criterion_main!(benches);
