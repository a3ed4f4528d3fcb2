mod common;

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{lit, Program};
use mw_core::config::RuntimeOptions;
use mw_core::def::{DefSpec, TableBuilder};
use mw_core::error::ErrorCode;
use mw_core::host::{HostClass, HostField, HostMethod, HostObject, HostRegistry, HostType, HostValue};
use mw_core::instantiation::{Instantiation, NamePart};
use mw_core::{Construction, Value};
use pretty_assertions::assert_eq;

#[derive(Debug)]
struct Account {
    owner: String,
    balance: i64,
}

impl HostObject for Account {
    fn class_name(&self) -> &str {
        "Account"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug)]
struct Bag(Vec<String>);

impl HostObject for Bag {
    fn class_name(&self) -> &str {
        "Bag"
    }

    fn len(&self) -> Option<usize> {
        Some(self.0.len())
    }

    fn keys(&self) -> Option<Vec<String>> {
        Some(self.0.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn account(receiver: Option<&HostValue>) -> eyre::Result<&Account> {
    receiver
        .and_then(|r| r.downcast_ref::<Account>())
        .ok_or_else(|| eyre::eyre!("not an account"))
}

fn hosts(constructed: Arc<AtomicUsize>) -> HostRegistry {
    let mut hosts = HostRegistry::new();
    hosts.register_class(
        HostClass::new("Account")
            .constructor(vec![HostType::Text], move |args| {
                constructed.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Host(HostValue::new(Account {
                    owner: args[0].to_string(),
                    balance: 10,
                })))
            })
            .method(HostMethod::new("deposit", vec![HostType::int()], |receiver, args| {
                let amount = args[0].as_int().unwrap_or(0);
                Ok(Value::Int(account(receiver)?.balance + amount))
            }))
            .method(HostMethod::new("describe", vec![HostType::int()], |_, _| {
                Ok(Value::text("int"))
            }))
            .method(HostMethod::new("describe", vec![HostType::Text], |_, _| {
                Ok(Value::text("text"))
            }))
            .method(HostMethod::new("close", vec![], |_, _| {
                Err(eyre::eyre!("account is frozen"))
            }))
            .field(HostField::new("owner", |receiver| {
                Ok(Value::text(account(Some(receiver))?.owner.clone()))
            })),
    );
    hosts.register_class(HostClass::new("Math").method(HostMethod::new(
        "max",
        vec![HostType::int(), HostType::int()],
        |_, args| Ok(args.iter().max_by_key(|v| v.as_int()).cloned().unwrap_or_default()),
    )));
    hosts.register_object(
        "bag",
        HostValue::new(Bag(vec!["a".to_string(), "b".to_string(), "c".to_string()])),
    );
    hosts
}

fn program() -> (Program, Arc<AtomicUsize>) {
    let constructed = Arc::new(AtomicUsize::new(0));
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(root, DefSpec::external("host_classes", "*"));
    let program = Program::with(b, hosts(constructed.clone()), RuntimeOptions::default());
    (program, constructed)
}

fn member(owner: &str, args: Vec<Construction>, name: &str, member_args: Option<Vec<Construction>>) -> Construction {
    let last = match member_args {
        Some(args) => NamePart::call(name, args),
        None => NamePart::plain(name),
    };
    Construction::instantiation(Instantiation::from_parts(vec![NamePart::call(owner, args), last]))
}

#[test]
fn fields_and_methods_of_constructed_instances() {
    let (program, _) = program();
    let mut ctx = program.context();

    let owner = member("Account", vec![lit("ann")], "owner", None);
    assert_eq!(program.eval.evaluate(&mut ctx, &owner).unwrap(), Value::text("ann"));

    let deposit = member("Account", vec![lit("ann")], "deposit", Some(vec![lit(5i64)]));
    assert_eq!(program.eval.evaluate(&mut ctx, &deposit).unwrap(), Value::Int(15));
}

#[test]
fn instances_are_reused_on_the_same_context_path() {
    let (program, constructed) = program();
    let owner = member("Account", vec![lit("ann")], "owner", None);

    let mut ctx = program.context();
    program.eval.evaluate(&mut ctx, &owner).unwrap();
    program.eval.evaluate(&mut ctx, &owner).unwrap();
    assert_eq!(constructed.load(Ordering::SeqCst), 1);

    let other = member("Account", vec![lit("bob")], "owner", None);
    assert_eq!(program.eval.evaluate(&mut ctx, &other).unwrap(), Value::text("bob"));
    assert_eq!(constructed.load(Ordering::SeqCst), 2);

    let mut fresh = program.context();
    program.eval.evaluate(&mut fresh, &other).unwrap();
    assert_eq!(constructed.load(Ordering::SeqCst), 3);
}

#[test]
fn overloads_are_picked_by_score() {
    let (program, _) = program();
    let mut ctx = program.context();
    let mut describe = |arg: Construction| {
        let call = member("Account", vec![lit("ann")], "describe", Some(vec![arg]));
        program.eval.evaluate(&mut ctx, &call).unwrap()
    };

    assert_eq!(describe(lit(3i64)), Value::text("int"));
    assert_eq!(describe(lit("x")), Value::text("text"));
    assert_eq!(describe(lit(true)), Value::text("text"));
}

#[test]
fn unmatched_members_and_host_failures_are_reported() {
    let (program, _) = program();
    let mut ctx = program.context();

    let wrong = member("Account", vec![lit("ann")], "deposit", Some(vec![lit("lots")]));
    let err = program.eval.evaluate(&mut ctx, &wrong).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoMatchingOverload);

    let close = member("Account", vec![lit("ann")], "close", Some(vec![]));
    let err = program.eval.evaluate(&mut ctx, &close).unwrap_err();
    assert_eq!(err.code(), ErrorCode::HostCall);
    assert!(err.to_string().contains("frozen"));
}

#[test]
fn classes_without_constructors_offer_static_members() {
    let (program, _) = program();
    let mut ctx = program.context();

    let max = member("Math", vec![], "max", Some(vec![lit(2i64), lit(9i64)]));
    assert_eq!(program.eval.evaluate(&mut ctx, &max).unwrap(), Value::Int(9));
}

#[test]
fn host_objects_expose_count_and_keys() {
    let (program, _) = program();

    assert_eq!(program.value("bag.count"), Value::Int(3));
    assert_eq!(
        program.value("bag.keys"),
        Value::List(vec![Value::text("a"), Value::text("b"), Value::text("c")])
    );
}

#[test]
fn bindings_are_scoped_to_their_declaration() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let mut b = TableBuilder::new("app");
    let root = b.root();
    let page = b.add(
        root,
        DefSpec::named("page").value(member("Account", vec![lit("cy")], "owner", None)),
    );
    b.add(page, DefSpec::external("accounts", "Acc*"));
    let program = Program::with(b, hosts(constructed), RuntimeOptions::default());
    let ctx = program.context();

    assert!(!program.eval.is_defined(&ctx, "Account"));
    assert_eq!(program.value("page"), Value::text("cy"));
}

#[derive(Debug)]
struct Clock;

impl HostObject for Clock {
    fn class_name(&self) -> &str {
        "Clock"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn static_members_do_not_construct_the_class() {
    let constructed = Arc::new(AtomicUsize::new(0));
    let seen = constructed.clone();
    let mut hosts = HostRegistry::new();
    hosts.register_class(
        HostClass::new("Clock")
            .constructor(vec![], move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Host(HostValue::new(Clock)))
            })
            .method(HostMethod::new("epoch", vec![], |_, _| Ok(Value::Int(1970))).as_static())
            .method(HostMethod::new("running", vec![], |receiver, _| {
                Ok(Value::Bool(receiver.is_some()))
            })),
    );
    let mut b = TableBuilder::new("app");
    let root = b.root();
    b.add(root, DefSpec::external("clocks", "Clock"));
    let program = Program::with(b, hosts, RuntimeOptions::default());
    let mut ctx = program.context();
    let path = |name: &str| Construction::instantiation(Instantiation::parse(name));

    let epoch = program.eval.evaluate(&mut ctx, &path("Clock.epoch")).unwrap();
    assert_eq!(epoch, Value::Int(1970));
    assert_eq!(constructed.load(Ordering::SeqCst), 0);

    let running = path("Clock.running");
    assert_eq!(program.eval.evaluate(&mut ctx, &running).unwrap(), Value::Bool(true));
    assert_eq!(program.eval.evaluate(&mut ctx, &running).unwrap(), Value::Bool(true));
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
}
