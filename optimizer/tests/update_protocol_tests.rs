//! Black-box tests of the two-pass update protocol: determinism of batch
//! runs, batch/incremental equivalence, version stability, and generative
//! idempotence.

use std::sync::Arc;

use proptest::prelude::*;

use lattice_ir::{
    hash_method_def, ClassKind, ClassName, CoreSpec, LinkedClass, LinkingUnit, Literal,
    MemberNamespace, MethodDef, MethodFlags, MethodName, OptimizerHints, Tree, Type, Versioned,
};
use lattice_optimizer::{Config, IdentityCore, IncrementalOptimizer};

fn method(name: &str, body: Tree) -> Versioned<MethodDef> {
    let mut def = MethodDef {
        encoded_name: MethodName::from(name),
        flags: MethodFlags::new(MemberNamespace::PublicInstance),
        params: Vec::new(),
        result_type: Type::Unit,
        body: Some(body),
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

fn class(
    name: &str,
    superclass: Option<&str>,
    ancestors: &[&str],
    has_instances: bool,
    methods: Vec<Versioned<MethodDef>>,
) -> LinkedClass {
    LinkedClass {
        encoded_name: ClassName::from(name),
        kind: ClassKind::Class,
        super_class: superclass.map(ClassName::from),
        ancestors: ancestors.iter().copied().map(ClassName::from).collect(),
        has_instances,
        fields: Vec::new(),
        methods,
        optimizer_hints: OptimizerHints::default(),
    }
}

fn object_class() -> LinkedClass {
    class("O", None, &["O"], false, Vec::new())
}

fn unit(class_defs: Vec<LinkedClass>) -> LinkingUnit {
    LinkingUnit {
        core_spec: CoreSpec::default(),
        class_defs,
        module_initializers: Vec::new(),
    }
}

fn sample_unit() -> LinkingUnit {
    unit(vec![
        object_class(),
        class(
            "A",
            Some("O"),
            &["A", "O"],
            true,
            vec![
                method("m__V", Tree::Literal(Literal::Int(1))),
                method("n__V", Tree::Literal(Literal::Int(2))),
            ],
        ),
        class(
            "B",
            Some("A"),
            &["B", "A", "O"],
            true,
            vec![method("m__V", Tree::Literal(Literal::Int(3)))],
        ),
    ])
}

fn optimized_methods(unit: &LinkingUnit) -> Vec<(ClassName, MethodName, MethodDef, Option<String>)> {
    let mut out = Vec::new();
    for linked in &unit.class_defs {
        for versioned in &linked.methods {
            out.push((
                linked.encoded_name.clone(),
                versioned.value.encoded_name.clone(),
                versioned.value.clone(),
                versioned.version.clone(),
            ));
        }
    }
    out.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    out
}

fn fresh() -> IncrementalOptimizer {
    IncrementalOptimizer::new(Config { parallel: false }, Arc::new(IdentityCore))
}

#[test]
fn batch_runs_are_deterministic() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let first = fresh().update(sample_unit()).unwrap();
    let second = fresh().update(sample_unit()).unwrap();
    assert_eq!(optimized_methods(&first), optimized_methods(&second));
}

#[test]
fn parallel_and_sequential_backends_agree() {
    let sequential = fresh().update(sample_unit()).unwrap();
    let parallel = IncrementalOptimizer::new(Config { parallel: true }, Arc::new(IdentityCore))
        .update(sample_unit())
        .unwrap();
    assert_eq!(optimized_methods(&sequential), optimized_methods(&parallel));
}

#[test]
fn batch_and_incremental_from_minimal_state_agree() {
    let batch = fresh().update(sample_unit()).unwrap();

    let mut incremental = fresh();
    incremental.update(unit(vec![object_class()])).unwrap();
    let grown = incremental.update(sample_unit()).unwrap();

    // Identical optimized bodies; the out versions may differ.
    let strip = |methods: Vec<(ClassName, MethodName, MethodDef, Option<String>)>| {
        methods
            .into_iter()
            .map(|(class, name, def, _)| (class, name, def))
            .collect::<Vec<_>>()
    };
    assert_eq!(
        strip(optimized_methods(&batch)),
        strip(optimized_methods(&grown))
    );
}

#[test]
fn rerun_without_changes_reuses_every_optimization() {
    let mut opt = fresh();
    let first = opt.update(sample_unit()).unwrap();
    let second = opt.update(sample_unit()).unwrap();

    assert_eq!(opt.last_run_stats().methods_scheduled, 0);
    // Same optimized definitions, same out versions: nothing was redone.
    assert_eq!(optimized_methods(&first), optimized_methods(&second));
}

#[test]
fn body_edit_bumps_only_the_edited_method() {
    let mut opt = fresh();
    let first = opt.update(sample_unit()).unwrap();

    let mut edited = sample_unit();
    edited.class_defs[1].methods[0] = method("m__V", Tree::Literal(Literal::Int(42)));
    let second = opt.update(edited).unwrap();

    assert_eq!(opt.last_run_stats().methods_scheduled, 1);
    let before = optimized_methods(&first);
    let after = optimized_methods(&second);
    for (old, new) in before.iter().zip(after.iter()) {
        let same_method = (&old.0, &old.1) == (&new.0, &new.1);
        assert!(same_method);
        if old.0 == ClassName::from("A") && old.1 == MethodName::from("m__V") {
            assert_ne!(old.3, new.3, "edited method must carry a new out version");
        } else {
            assert_eq!(old.3, new.3, "untouched methods keep their out version");
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Feeding the same unit twice never schedules anything on the second
    /// run, whatever the hierarchy shape.
    #[test]
    fn second_identical_run_is_a_no_op(
        shape in prop::collection::vec((any::<bool>(), 0usize..3, 0i32..1000), 1..6)
    ) {
        let build = || {
            let mut class_defs = vec![object_class()];
            for (index, (instantiated, method_count, seed)) in shape.iter().enumerate() {
                let name = format!("C{index}");
                let methods = (0..*method_count)
                    .map(|m| {
                        method(
                            &format!("m{m}__V"),
                            Tree::Literal(Literal::Int(seed + m as i32)),
                        )
                    })
                    .collect();
                let ancestors = [name.as_str(), "O"];
                class_defs.push(class(&name, Some("O"), &ancestors, *instantiated, methods));
            }
            unit(class_defs)
        };

        let mut opt = fresh();
        opt.update(build()).unwrap();
        opt.update(build()).unwrap();
        prop_assert_eq!(opt.last_run_stats().methods_scheduled, 0);
        prop_assert_eq!(opt.last_run_stats().classes_added, 0);
        prop_assert_eq!(opt.last_run_stats().classes_removed, 0);
    }
}
