mod common;

use std::sync::{Arc, Barrier};

use common::{counter, lit, Program};
use mw_core::config::RuntimeOptions;
use mw_core::def::{DefSpec, ParamDef, TableBuilder};
use mw_core::error::ErrorCode;
use mw_core::host::HostRegistry;
use mw_core::instantiation::Instantiation;
use mw_core::{Construction, Value};
use pretty_assertions::assert_eq;

fn concurrent(name: &str) -> Construction {
    Construction::instantiation(Instantiation::parse(name).concurrently())
}

#[test]
fn spawned_constructions_return_a_pending_value() {
    let (body, _) = counter();
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(root, DefSpec::named("report").value(body));
    let program = Program::new(b);
    let mut ctx = program.context();

    let value = program.eval.evaluate(&mut ctx, &concurrent("report")).unwrap();
    assert!(matches!(value, Value::Pending(_)));
    assert_eq!(ctx.size(), 1);
    assert_eq!(value.settle().unwrap(), Value::Int(1));
}

#[test]
fn workers_see_the_frames_of_the_spawning_context() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("card")
            .params(vec![ParamDef::new("label")])
            .value(concurrent("label")),
    );
    let program = Program::new(b);
    let mut ctx = program.context();

    let value = program
        .eval
        .evaluate(&mut ctx, &Construction::call("card", vec![lit("news")]))
        .and_then(Value::settle)
        .unwrap();
    assert_eq!(value, Value::text("news"));
}

#[test]
fn the_pool_grows_when_every_worker_is_blocked() {
    let barrier = Arc::new(Barrier::new(2));
    let mut b = TableBuilder::new("app");
    let root = b.root();
    for name in ["left", "right"] {
        let barrier = barrier.clone();
        b.add(
            root,
            DefSpec::named(name).value(Construction::native(name, move |_| {
                barrier.wait();
                Ok(Value::text("met"))
            })),
        );
    }
    let mut options = RuntimeOptions::default();
    options.worker_threads = 1;
    let program = Program::with(b, HostRegistry::new(), options);
    let mut ctx = program.context();

    let left = program.eval.evaluate(&mut ctx, &concurrent("left")).unwrap();
    let right = program.eval.evaluate(&mut ctx, &concurrent("right")).unwrap();
    assert_eq!(left.settle().unwrap(), Value::text("met"));
    assert_eq!(right.settle().unwrap(), Value::text("met"));
    assert!(program.rt.pool().size() >= 2);
}

#[test]
fn failures_travel_through_the_handle() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("upload").value(Construction::native("upload", |_| {
            Err(eyre::eyre!("disk full"))
        })),
    );
    let program = Program::new(b);
    let mut ctx = program.context();

    let pending = program.eval.evaluate(&mut ctx, &concurrent("upload")).unwrap();
    let err = pending.settle().unwrap_err();
    assert_eq!(err.code(), ErrorCode::HostCall);
    assert!(err.to_string().contains("disk full"));
    assert!(ctx.stats().is_balanced());
}
