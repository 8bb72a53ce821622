//! Runs the built-in workload interpreted and translated:
//!   cargo bench --bench translate_benchmark

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use roast::{ClosureDefiner, VM, VMCreateInfo, compile, install, workload};

fn build_vm(translated: bool) -> (VM, Vec<workload::Task>) {
    let vm = VM::new(VMCreateInfo {
        seed: Some(1),
        ..Default::default()
    })
    .expect("vm");
    let tasks = workload::define(&vm).expect("workload");
    if translated {
        for method in workload::bytecode_methods(&vm).expect("methods") {
            let unit = compile(&method).expect("compile");
            install(&method, &ClosureDefiner, unit).expect("install");
        }
    }
    (vm, tasks)
}

fn run_case(c: &mut Criterion, label: &str, translated: bool) {
    let (vm, tasks) = build_vm(translated);
    for task in &tasks {
        black_box(task.run(&vm).expect("warmup"));
        c.bench_function(&format!("{}_{label}", task.name), |b| {
            b.iter(|| {
                let value = task.run(&vm).expect("run");
                black_box(value);
            })
        });
    }
}

fn bench_workload(c: &mut Criterion) {
    run_case(c, "interpreted", false);
    run_case(c, "translated", true);
}

criterion_group!(benches, bench_workload);
criterion_main!(benches);
