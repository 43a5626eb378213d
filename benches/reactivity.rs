//! Benchmarks for rill-reactive
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rill_reactive::{batch, computed, watch, wrap};

// =============================================================================
// CELL BENCHMARKS
// =============================================================================

fn bench_cell_create(c: &mut Criterion) {
    c.bench_function("cell_create", |b| b.iter(|| black_box(wrap(0i32))));
}

fn bench_cell_get(c: &mut Criterion) {
    let cell = wrap(42i32);
    c.bench_function("cell_get", |b| b.iter(|| black_box(cell.get())));
}

fn bench_cell_set(c: &mut Criterion) {
    let cell = wrap(0i32);
    let mut i = 0i32;
    c.bench_function("cell_set", |b| {
        b.iter(|| {
            cell.set(black_box(i));
            i = i.wrapping_add(1);
        })
    });
}

fn bench_cell_set_same_value(c: &mut Criterion) {
    let cell = wrap(42i32);
    c.bench_function("cell_set_same_value", |b| b.iter(|| cell.set(black_box(42))));
}

// =============================================================================
// COMPUTED BENCHMARKS
// =============================================================================

fn bench_computed_get_cached(c: &mut Criterion) {
    let cell = wrap(42i32);
    let cell_read = cell.clone();
    let double = computed(move || cell_read.get() * 2);

    // First get to fill the memo.
    let _ = double.get();

    c.bench_function("computed_get_cached", |b| b.iter(|| black_box(double.get())));
}

fn bench_computed_get_dirty(c: &mut Criterion) {
    let cell = wrap(0i32);
    let cell_read = cell.clone();
    let double = computed(move || cell_read.get() * 2);

    let mut i = 0i32;
    c.bench_function("computed_get_dirty", |b| {
        b.iter(|| {
            cell.set(i);
            i = i.wrapping_add(1);
            black_box(double.get())
        })
    });
}

fn bench_computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1, 5, 10, 20] {
        group.bench_with_input(BenchmarkId::new("depth", depth), &depth, |b, &depth| {
            let cell = wrap(1i32);

            let mut current = {
                let cell = cell.clone();
                computed(move || cell.get() + 1)
            };
            for _ in 1..depth {
                let prev = current.clone();
                current = computed(move || prev.get() + 1);
            }

            let mut i = 0i32;
            b.iter(|| {
                cell.set(black_box(i));
                i = i.wrapping_add(1);
                black_box(current.get())
            })
        });
    }

    group.finish();
}

// =============================================================================
// WATCHER BENCHMARKS
// =============================================================================

fn bench_watcher_trigger(c: &mut Criterion) {
    let cell = wrap(0i32);
    let cell_read = cell.clone();
    let _handle = watch(move || black_box(cell_read.get()), |_, _| {});

    let mut i = 0i32;
    c.bench_function("watcher_trigger", |b| {
        b.iter(|| {
            cell.set(i);
            i = i.wrapping_add(1);
        })
    });
}

fn bench_watcher_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("watcher_fan_out");

    for count in [10, 100, 500] {
        group.bench_with_input(BenchmarkId::new("watchers", count), &count, |b, &count| {
            let cell = wrap(0i32);

            let handles: Vec<_> = (0..count)
                .map(|_| {
                    let cell = cell.clone();
                    watch(move || black_box(cell.get()), |_, _| {})
                })
                .collect();

            let mut i = 0i32;
            b.iter(|| {
                cell.set(i);
                i = i.wrapping_add(1);
            });

            drop(handles);
        });
    }

    group.finish();
}

// =============================================================================
// BATCH BENCHMARKS
// =============================================================================

fn bench_batched_writes(c: &mut Criterion) {
    let cell = wrap(0i32);
    let cell_read = cell.clone();
    let _handle = watch(move || black_box(cell_read.get()), |_, _| {});

    let mut base = 0i32;
    c.bench_function("batch_10_writes", |b| {
        b.iter(|| {
            batch(|| {
                for i in 0..10 {
                    cell.set(base.wrapping_add(i));
                }
            });
            base = base.wrapping_add(10);
        })
    });
}

fn bench_batched_multi_cell(c: &mut Criterion) {
    let cell_a = wrap(0i32);
    let cell_b = wrap(0i32);
    let cell_c = wrap(0i32);

    let (a, b_read, c_read) = (cell_a.clone(), cell_b.clone(), cell_c.clone());
    let _handle = watch(
        move || black_box(a.get() + b_read.get() + c_read.get()),
        |_, _| {},
    );

    let mut i = 0i32;
    c.bench_function("batch_3_cells_write", |bencher| {
        bencher.iter(|| {
            batch(|| {
                cell_a.set(i);
                cell_b.set(i);
                cell_c.set(i);
            });
            i = i.wrapping_add(1);
        })
    });
}

// =============================================================================
// CRITERION SETUP
// =============================================================================

criterion_group!(
    cell_benches,
    bench_cell_create,
    bench_cell_get,
    bench_cell_set,
    bench_cell_set_same_value,
);

criterion_group!(
    computed_benches,
    bench_computed_get_cached,
    bench_computed_get_dirty,
    bench_computed_chain,
);

criterion_group!(
    watcher_benches,
    bench_watcher_trigger,
    bench_watcher_fan_out,
    bench_batched_writes,
    bench_batched_multi_cell,
);

criterion_main!(cell_benches, computed_benches, watcher_benches);
