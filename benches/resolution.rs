//! Benchmarks for stack construction and replica resolution

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use gridstack::{Catalog, PluginManager, Replica, SecurityContext, StackInstance};
use std::sync::Arc;

fn manager(pools: usize) -> Arc<PluginManager> {
    let mut manager = PluginManager::new();
    for plugin in ["memory", "filesystem", "librarian"] {
        manager.load_plugin(plugin).expect("plugin loads");
    }
    manager.configure("TokenPassword", "bench-secret").expect("password");
    for i in 0..pools {
        manager
            .configure("MemoryPool", &format!("pool{:02}:filesystem", i))
            .expect("pool");
        manager
            .configure(
                "MemoryFilesystem",
                &format!("pool{:02}:disk{:02}:/srv/data:1:{}", i, i, 1_000_000 + i * 10),
            )
            .expect("filesystem");
    }
    Arc::new(manager)
}

fn stack(manager: &Arc<PluginManager>) -> StackInstance {
    let mut stack = StackInstance::new(Arc::clone(manager)).expect("stack");
    stack
        .set_security_context(SecurityContext::root())
        .expect("security context");
    stack
}

/// One file with a replica on every pool
fn populate(stack: &mut StackInstance, pools: usize) {
    let catalog: &mut dyn Catalog = stack.catalog().expect("catalog");
    catalog.create("/bench", 0o644).expect("create");
    let ino = catalog.stat("/bench").expect("stat").ino;
    for i in 0..pools {
        catalog
            .add_replica(&Replica {
                file_id: ino,
                pool: format!("pool{:02}", i),
                server: format!("disk{:02}", i),
                rfn: format!("disk{:02}:/srv/data/bench", i),
                ..Default::default()
            })
            .expect("replica");
    }
}

fn bench_stack_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("stack");
    group.throughput(Throughput::Elements(1));

    let manager = manager(8);
    group.bench_function("new_stack_instance", |b| {
        b.iter(|| black_box(stack(&manager)));
    });

    group.finish();
}

fn bench_read_resolution(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolution");
    group.throughput(Throughput::Elements(1));

    let pools = 16;
    let manager = manager(pools);
    let mut stack = stack(&manager);
    populate(&mut stack, pools);

    group.bench_function("where_to_read", |b| {
        b.iter(|| {
            stack.begin_operation();
            black_box(stack.where_to_read(black_box("/bench")).expect("location"))
        });
    });

    group.bench_function("where_to_read_with_exclusions", |b| {
        b.iter(|| {
            stack.begin_operation();
            for id in 1..=(pools as i64 / 2) {
                stack.exclude_replica(id);
            }
            black_box(stack.where_to_read(black_box("/bench")).expect("location"))
        });
    });

    group.finish();
}

criterion_group!(benches, bench_stack_construction, bench_read_resolution);
criterion_main!(benches);
