mod common;

use std::sync::atomic::Ordering;

use common::{counter, lit, reference, Program};
use mw_core::config::RuntimeOptions;
use mw_core::construction::BinOp;
use mw_core::def::{DefSpec, Durability, ParamDef, TableBuilder};
use mw_core::error::ErrorCode;
use mw_core::host::HostRegistry;
use mw_core::keep::Cacheability;
use mw_core::{Construction, ContextEntry, Value};
use pretty_assertions::assert_eq;

fn clock(durability: Durability) -> (Program, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let (body, calls) = counter();
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(root, DefSpec::named("clock").durability(durability).value(body));
    (Program::new(b), calls)
}

#[test]
fn results_are_kept_in_the_scope_that_built_them() {
    let (program, calls) = clock(Durability::InContext);
    let mut ctx = program.context();

    let first = program.eval.evaluate_name(&mut ctx, "clock").unwrap();
    let second = program.eval.evaluate_name(&mut ctx, "clock").unwrap();
    assert_eq!(first, Value::Int(1));
    assert_eq!(second, Value::Int(1));
    assert_eq!(ctx.entry(0).unwrap().keep().stats().hits, 1);

    // a new context starts with empty scopes
    assert_eq!(program.value("clock"), Value::Int(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn dynamic_definitions_are_never_retrieved() {
    let (program, calls) = clock(Durability::Dynamic);
    let mut ctx = program.context();

    assert_eq!(
        program.eval.cacheability(&ctx, &reference("clock")),
        Cacheability::CacheStorable
    );
    program.eval.evaluate_name(&mut ctx, "clock").unwrap();
    let again = program.eval.evaluate_name(&mut ctx, "clock").unwrap();
    assert_eq!(again, Value::Int(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn static_definitions_are_built_once_per_runtime() {
    let (program, calls) = clock(Durability::Static);

    assert_eq!(program.value("clock"), Value::Int(1));
    assert_eq!(program.value("clock"), Value::Int(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn global_definitions_are_shared_by_every_context() {
    let (program, calls) = clock(Durability::Global);

    assert_eq!(program.value("clock"), Value::Int(1));
    assert_eq!(program.value("clock"), Value::Int(1));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(program.rt.global_keep().len(), 1);
}

#[test]
fn static_constructions_run_once() {
    let (body, calls) = counter();
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("stamp")
            .durability(Durability::Dynamic)
            .value(body.once()),
    );
    let program = Program::new(b);
    let mut ctx = program.context();

    for _ in 0..3 {
        let value = program.eval.evaluate_name(&mut ctx, "stamp").unwrap();
        assert_eq!(value, Value::Int(1));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn arguments_are_part_of_the_key() {
    let (body, calls) = counter();
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("bump")
            .params(vec![ParamDef::new("n")])
            .value(body),
    );
    let program = Program::new(b);
    let mut ctx = program.context();
    let mut call = |n: i64| {
        program
            .eval
            .evaluate(&mut ctx, &Construction::call("bump", vec![lit(n)]))
            .unwrap()
    };

    assert_eq!(call(1), Value::Int(1));
    assert_eq!(call(1), Value::Int(1));
    assert_eq!(call(2), Value::Int(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn tiers_follow_the_reference() {
    let (program, _) = clock(Durability::InContext);
    let ctx = program.context();
    let eval = &program.eval;

    assert_eq!(
        eval.cacheability(&ctx, &reference("clock")),
        Cacheability::FullyCacheable
    );
    assert_eq!(
        eval.cacheability(&ctx, &reference("clock").dynamic()),
        Cacheability::NotCacheable
    );
    assert_eq!(
        eval.cacheability(&ctx, &reference("clock").once()),
        Cacheability::NotCacheable
    );
    assert_eq!(
        eval.cacheability(&ctx, &reference("this")),
        Cacheability::NotCacheable
    );
    assert_eq!(
        eval.cacheability(&ctx, &reference("missing")),
        Cacheability::NotCacheable
    );
    assert_eq!(
        eval.cacheability(&ctx, &lit(1i64)),
        Cacheability::NotCacheable
    );
}

#[test]
fn dynamic_arguments_only_store() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(root, DefSpec::named("now").value(lit(3i64)));
    b.add(
        root,
        DefSpec::named("tick")
            .durability(Durability::Dynamic)
            .value(lit(4i64)),
    );
    b.add(
        root,
        DefSpec::named("show")
            .params(vec![ParamDef::new("x")])
            .value(reference("x")),
    );
    let program = Program::new(b);
    let ctx = program.context();

    let call = Construction::call("show", vec![reference("now").dynamic()]);
    assert_eq!(
        program.eval.cacheability(&ctx, &call),
        Cacheability::CacheStorable
    );

    let call = Construction::call("show", vec![reference("tick")]);
    assert_eq!(
        program.eval.cacheability(&ctx, &call),
        Cacheability::CacheStorable
    );

    let call = Construction::call(
        "show",
        vec![Construction::binary(BinOp::Add, lit(1i64), reference("tick"))],
    );
    assert_eq!(
        program.eval.cacheability(&ctx, &call),
        Cacheability::CacheStorable
    );

    let call = Construction::call("show", vec![reference("now")]);
    assert_eq!(
        program.eval.cacheability(&ctx, &call),
        Cacheability::FullyCacheable
    );
}

#[test]
fn unpushed_contexts_only_retrieve() {
    let (program, _) = clock(Durability::InContext);
    let root = program.rt.table().root();
    let mut ctx = program.context();
    ctx.push(ContextEntry::new(root, None, Vec::new()));

    let below = ctx.unpush_to(1).unwrap();
    assert_eq!(
        program.eval.cacheability(&below, &reference("clock")),
        Cacheability::CacheRetrievable
    );
    drop(below);
    assert_eq!(ctx.size(), 2);
    assert_eq!(ctx.unpushed(), 0);
}

#[test]
fn the_stack_is_restored_after_a_failure() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("broken").value(Construction::binary(BinOp::Div, lit(1i64), lit(0i64))),
    );
    let page = b.add(root, DefSpec::named("page").value(reference("section")));
    b.add(page, DefSpec::named("section").value(reference("broken")));
    let program = Program::with(b, HostRegistry::new(), RuntimeOptions::default());
    let mut ctx = program.context();

    let err = program.eval.evaluate_name(&mut ctx, "page").unwrap_err();
    assert_eq!(err.code(), ErrorCode::Operator);
    assert_eq!(ctx.size(), 1);
    assert_eq!(ctx.unpushed(), 0);
    let stats = ctx.stats();
    assert!(stats.is_balanced());
    assert!(stats.unpushes > 0);
    assert!(ctx.entry(0).unwrap().keep().is_empty());
}
