//! Batch and incremental update throughput over a synthetic unit.

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

use lattice_linker::ir::{
    hash_method_def, ClassKind, ClassName, CoreSpec, LinkedClass, LinkingUnit, Literal,
    MemberNamespace, MethodDef, MethodFlags, MethodName, OptimizerHints, Tree, Type, Versioned,
};
use lattice_linker::{Config, IdentityCore, IncrementalOptimizer};

fn method(name: &str, seed: i32) -> Versioned<MethodDef> {
    let mut def = MethodDef {
        encoded_name: MethodName::from(name),
        flags: MethodFlags::new(MemberNamespace::PublicInstance),
        params: Vec::new(),
        result_type: Type::Int,
        body: Some(Tree::Literal(Literal::Int(seed))),
        optimizer_hints: OptimizerHints::default(),
        hash: None,
    };
    let hash = hash_method_def(&def);
    def.hash = Some(hash);
    let version: String = hash.as_bytes()[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect();
    Versioned::new(Some(version), def)
}

fn build_unit(classes: usize, methods_per_class: usize) -> LinkingUnit {
    let mut class_defs = vec![LinkedClass {
        encoded_name: ClassName::from("O"),
        kind: ClassKind::Class,
        super_class: None,
        ancestors: vec![ClassName::from("O")],
        has_instances: false,
        fields: Vec::new(),
        methods: Vec::new(),
        optimizer_hints: OptimizerHints::default(),
    }];
    for index in 0..classes {
        let name = format!("C{index}");
        let methods = (0..methods_per_class)
            .map(|m| method(&format!("m{m}__I"), (index * 31 + m) as i32))
            .collect();
        class_defs.push(LinkedClass {
            encoded_name: ClassName::from(name.as_str()),
            kind: ClassKind::Class,
            super_class: Some(ClassName::from("O")),
            ancestors: vec![ClassName::from(name.as_str()), ClassName::from("O")],
            has_instances: index % 2 == 0,
            fields: Vec::new(),
            methods,
            optimizer_hints: OptimizerHints::default(),
        });
    }
    LinkingUnit {
        core_spec: CoreSpec::default(),
        class_defs,
        module_initializers: Vec::new(),
    }
}

fn bench_batch_update(c: &mut Criterion) {
    let unit = build_unit(100, 3);
    c.bench_function("batch_update_100x3", |b| {
        b.iter_batched(
            || {
                (
                    IncrementalOptimizer::new(Config { parallel: false }, Arc::new(IdentityCore)),
                    unit.clone(),
                )
            },
            |(mut optimizer, unit)| optimizer.update(unit).unwrap(),
            BatchSize::SmallInput,
        )
    });
}

fn bench_incremental_noop(c: &mut Criterion) {
    let unit = build_unit(100, 3);
    let mut optimizer =
        IncrementalOptimizer::new(Config { parallel: false }, Arc::new(IdentityCore));
    optimizer.update(unit.clone()).unwrap();
    c.bench_function("incremental_noop_100x3", |b| {
        b.iter(|| optimizer.update(unit.clone()).unwrap())
    });
}

criterion_group!(benches, bench_batch_update, bench_incremental_noop);
criterion_main!(benches);
