mod common;

use common::{lit, reference, Program};
use mw_core::collection::{CollectionElement, CollectionElements};
use mw_core::construction::BinOp;
use mw_core::def::{DefSpec, ParamDef, TableBuilder};
use mw_core::error::ErrorCode;
use mw_core::instantiation::{Instantiation, NamePart};
use mw_core::keep::Cacheability;
use mw_core::{Construction, Value};
use pretty_assertions::assert_eq;

fn mul(lhs: Construction, rhs: Construction) -> Construction {
    Construction::binary(BinOp::Mul, lhs, rhs)
}

fn shapes() -> Program {
    let mut b = TableBuilder::new("geometry");
    let root = b.root();
    let shape = b.add(root, DefSpec::named("Shape").value(reference("area")));
    b.add(shape, DefSpec::named("area").abstract_def());

    let circle = b.add(
        root,
        DefSpec::named("Circle")
            .extends("Shape")
            .params(vec![ParamDef::new("radius")]),
    );
    b.add(
        circle,
        DefSpec::named("area").value(mul(
            mul(reference("radius"), reference("radius")),
            lit(3.14159),
        )),
    );
    b.add(root, DefSpec::named("Square").extends("Shape"));
    Program::new(b)
}

fn circle_area(radius: i64) -> Construction {
    Construction::instantiation(Instantiation::from_parts(vec![
        NamePart::call("Circle", vec![lit(radius)]),
        NamePart::plain("area"),
    ]))
}

#[test]
fn subtypes_fill_in_inherited_bodies() {
    let program = shapes();
    let mut ctx = program.context();

    let value = program
        .eval
        .evaluate(&mut ctx, &Construction::call("Circle", vec![lit(2i64)]))
        .unwrap();
    assert_eq!(value, Value::Float(4.0 * 3.14159));
    assert_eq!(ctx.size(), 1);
}

#[test]
fn members_of_constructed_instances_are_kept() {
    let program = shapes();
    let mut ctx = program.context();
    let area = circle_area(2);

    assert_eq!(
        program.eval.cacheability(&ctx, &area),
        Cacheability::FullyCacheable
    );
    let first = program.eval.evaluate(&mut ctx, &area).unwrap();
    let second = program.eval.evaluate(&mut ctx, &area).unwrap();
    assert_eq!(first, second);
    assert_eq!(ctx.entry(0).unwrap().keep().stats().hits, 1);

    let other = program.eval.evaluate(&mut ctx, &circle_area(1)).unwrap();
    assert_eq!(other, Value::Float(3.14159));
}

#[test]
fn missing_overrides_are_abstract() {
    let program = shapes();
    let mut ctx = program.context();

    let err = program.eval.evaluate_name(&mut ctx, "Square").unwrap_err();
    assert_eq!(err.code(), ErrorCode::AbstractConstruction);
    assert!(ctx.stats().is_balanced());
}

#[test]
fn unions_construct_their_first_concrete_member() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    let draft = b.add(root, DefSpec::named("draft").abstract_def());
    let published = b.add(root, DefSpec::named("published").value(lit("live")));
    b.add(root, DefSpec::union("article", vec![draft, published]));
    let program = Program::new(b);

    assert_eq!(program.value("article"), Value::text("live"));
}

#[test]
fn collections_are_indexed_element_by_element() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    let sizes = CollectionElements::Array(vec![
        CollectionElement::Construction(lit("s")),
        CollectionElement::Construction(lit("m")),
        CollectionElement::Construction(lit("l")),
    ]);
    b.add(root, DefSpec::collection("sizes", sizes, vec![None]));
    let prices = CollectionElements::Table(vec![
        ("tea".to_string(), CollectionElement::Construction(lit(3i64))),
        (
            "cake".to_string(),
            CollectionElement::Construction(mul(lit(2i64), lit(4i64))),
        ),
    ]);
    b.add(root, DefSpec::collection("prices", prices, vec![None]));
    let program = Program::new(b);
    let mut ctx = program.context();

    assert_eq!(
        program.value("sizes"),
        Value::List(vec![Value::text("s"), Value::text("m"), Value::text("l")])
    );
    assert_eq!(program.value("sizes.count"), Value::Int(3));
    assert_eq!(
        program.value("prices.keys"),
        Value::List(vec![Value::text("tea"), Value::text("cake")])
    );
    let medium = Construction::instantiation(Instantiation::parse("sizes").with_indexes(vec![lit(1i64)]));
    assert_eq!(program.eval.evaluate(&mut ctx, &medium).unwrap(), Value::text("m"));

    let cake = Construction::instantiation(Instantiation::parse("prices").with_indexes(vec![lit("cake")]));
    assert_eq!(program.eval.evaluate(&mut ctx, &cake).unwrap(), Value::Int(8));

    let missing = Construction::instantiation(Instantiation::parse("sizes").with_indexes(vec![lit(7i64)]));
    assert!(program.eval.evaluate(&mut ctx, &missing).unwrap_err().is_undefined());
}

#[test]
fn conditionals_pick_a_branch() {
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(
        root,
        DefSpec::named("badge")
            .params(vec![ParamDef::new("count")])
            .value(Construction::conditional(
                Construction::binary(BinOp::Gt, reference("count"), lit(0i64)),
                vec![lit("("), reference("count"), lit(")")],
                vec![],
            )),
    );
    let program = Program::new(b);
    let mut ctx = program.context();
    let mut badge = |count: i64| {
        program
            .eval
            .evaluate(&mut ctx, &Construction::call("badge", vec![lit(count)]))
            .unwrap()
    };

    assert_eq!(badge(3), Value::text("(3)"));
    assert_eq!(badge(0), Value::Null);
}
