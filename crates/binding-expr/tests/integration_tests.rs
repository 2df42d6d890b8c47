use std::sync::Arc;

use binding_expr::{
    BinaryOp, CompileError, Compiler, Error, Expr, HostObject, LambdaSignature, MemberRegistry, Metadata, Node,
    RuntimeError, Shared, Type, UnaryOp, Value, keys,
};
use rstest::{fixture, rstest};

#[derive(Debug)]
struct Person {
    name: String,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

#[fixture]
fn compiler() -> Compiler {
    init_tracing();

    let registry = MemberRegistry::with_builtins();
    registry.property(&Type::class("Person"), "Name", Type::String, |target| match target {
        Value::Object(o) => o
            .downcast_ref::<Person>()
            .map(|p| Value::from(p.name.as_str()))
            .ok_or_else(|| binding_expr::MemberError::InvalidTarget(o.class().into(), "Name".into())),
        v => Err(binding_expr::MemberError::InvalidTarget(v.type_name(), "Name".into())),
    });

    let mut compiler = Compiler::default();
    compiler.set_member_manager(Shared::new(registry));
    compiler
}

fn int(n: i32) -> Node {
    Expr::constant(n, Type::Int)
}

fn single(n: f32) -> Node {
    Expr::constant(n, Type::Single)
}

fn string(s: &str) -> Node {
    Expr::constant(s, Type::String)
}

fn person(name: &str) -> Value {
    Value::Object(HostObject::new(
        "Person",
        Person {
            name: name.to_string(),
        },
    ))
}

#[rstest]
#[case::int_multiplication(Expr::binary(BinaryOp::Multiplication, int(5), int(10)), Value::Int(50))]
#[case::single_multiplication(Expr::binary(BinaryOp::Multiplication, single(5.1), int(10)), Value::Single(5.1f32 * 10.0))]
#[case::single_concat(Expr::binary(BinaryOp::Addition, single(5.1), string("t")), Value::from("5.1t"))]
#[case::negate_negative(Expr::unary(UnaryOp::Minus, int(-1)), Value::Int(1))]
#[case::plus_negative(Expr::unary(UnaryOp::Plus, int(-1)), Value::Int(-1))]
#[case::not_true(Expr::unary(UnaryOp::LogicalNegation, Expr::constant(true, Type::Bool)), Value::Bool(false))]
#[case::complement(Expr::unary(UnaryOp::BitwiseNegation, int(-1)), Value::Int(0))]
#[case::condition_true(Expr::condition(Expr::constant(true, Type::Bool), int(1), int(2)), Value::Int(1))]
#[case::condition_false(Expr::condition(Expr::constant(false, Type::Bool), int(1), int(2)), Value::Int(2))]
#[case::null_conditional_null(Expr::member(Expr::null_conditional(Expr::null(Type::String)), "Length"), Value::Null)]
#[case::null_conditional_value(Expr::member(Expr::null_conditional(string("t")), "Length"), Value::Int(1))]
#[case::coalesce(Expr::binary(BinaryOp::NullCoalescing, Expr::null(Type::String), string("fallback")), Value::from("fallback"))]
fn test_evaluate(compiler: Compiler, #[case] node: Node, #[case] expected: Value) {
    assert_eq!(compiler.evaluate(&node, &[], &Metadata::default()), Ok(expected));
}

#[rstest]
#[case::single_minus_string(
    Expr::binary(BinaryOp::Subtraction, single(5.1), string("t")),
    CompileError::InvalidTypes { name: "-".into(), args: vec!["float".into(), "string".into()] }
)]
#[case::negate_string(
    Expr::unary(UnaryOp::Minus, string("")),
    CompileError::InvalidTypes { name: "-".into(), args: vec!["string".into()] }
)]
#[case::non_boolean_condition(
    Expr::condition(int(1), int(1), int(2)),
    CompileError::InvalidTypes { name: "?:".into(), args: vec!["int".into()] }
)]
#[case::unbound_parameter(Expr::parameter("x", Some(Type::Int)), CompileError::Unsupported("x".to_string()))]
fn test_compile_errors(compiler: Compiler, #[case] node: Node, #[case] expected: CompileError) {
    assert_eq!(compiler.compile(&node, &Metadata::default()).err(), Some(expected));
}

#[rstest]
fn test_binding_members(compiler: Compiler) {
    let node = Expr::binary(
        BinaryOp::Addition,
        Expr::member(Expr::binding_member(0, "Person", Type::class("Person")), "Name"),
        Expr::binding_member(1, "Suffix", Type::String),
    );
    let compiled = compiler.compile(&node, &Metadata::default()).unwrap();

    assert_eq!(compiled.result_type(), &Type::String);
    assert_eq!(
        compiled.invoke(&[person("Ada"), Value::from("!")], &Metadata::default()),
        Ok(Value::from("Ada!"))
    );
    assert_eq!(
        compiled.invoke(&[person("Bob"), Value::from("?")], &Metadata::default()),
        Ok(Value::from("Bob?"))
    );
}

#[rstest]
fn test_missing_argument(compiler: Compiler) {
    let node = Expr::binding_member(2, "Count", Type::Int);

    assert_eq!(
        compiler.evaluate(&node, &[Value::Int(1)], &Metadata::default()),
        Err(Error::Runtime(RuntimeError::MissingArgument {
            index: 2,
            path: "Count".into()
        }))
    );
}

#[rstest]
fn test_identical_trees_share_compiled_expression(compiler: Compiler) {
    let build = || Expr::binary(BinaryOp::Multiplication, Expr::binding_member(0, "Count", Type::Int), int(10));
    let first = compiler.compile(&build(), &Metadata::default()).unwrap();
    let second = compiler.compile(&build(), &Metadata::default()).unwrap();

    assert!(Shared::ptr_eq(&first, &second));
    assert_eq!(second.invoke(&[Value::Int(5)], &Metadata::default()), Ok(Value::Int(50)));
}

#[rstest]
fn test_invalidation_produces_new_instance(compiler: Compiler) {
    let node = Expr::binary(BinaryOp::Multiplication, Expr::binding_member(0, "Count", Type::Int), int(10));
    let first = compiler.compile(&node, &Metadata::default()).unwrap();

    assert!(compiler.try_invalidate_cache(Some(&node)));
    let second = compiler.compile(&node, &Metadata::default()).unwrap();
    assert!(!Shared::ptr_eq(&first, &second));

    assert!(compiler.try_invalidate_cache(None));
    let third = compiler.compile(&node, &Metadata::default()).unwrap();
    assert!(!Shared::ptr_eq(&second, &third));
}

#[rstest]
fn test_cache_ignores_bound_instances(compiler: Compiler) {
    let ada = Expr::member(
        Expr::bound_member(0, "Person", Type::class("Person"), person("Ada")),
        "Name",
    );
    let bob = Expr::member(
        Expr::bound_member(0, "Person", Type::class("Person"), person("Bob")),
        "Name",
    );

    let first = compiler.compile(&ada, &Metadata::default()).unwrap();
    let second = compiler.compile(&bob, &Metadata::default()).unwrap();

    assert!(Shared::ptr_eq(&first, &second));
    assert_eq!(
        second.invoke(&[person("Eve")], &Metadata::default()),
        Ok(Value::from("Eve"))
    );
}

#[rstest]
fn test_cache_does_not_retain_bound_instances(compiler: Compiler) {
    let instance = Arc::new(Person {
        name: "Ada".to_string(),
    });
    let node = Expr::member(
        Expr::bound_member(
            0,
            "Person",
            Type::class("Person"),
            Value::Object(HostObject::from_shared("Person", Arc::clone(&instance))),
        ),
        "Name",
    );

    let compiled = compiler.compile(&node, &Metadata::default()).unwrap();
    drop(node);

    assert_eq!(Arc::strong_count(&instance), 1);
    assert_eq!(compiler.cache().len(), 1);

    let weak = Arc::downgrade(&instance);
    drop(instance);
    assert!(weak.upgrade().is_none());
    assert_eq!(
        compiled.invoke(&[person("Bob")], &Metadata::default()),
        Ok(Value::from("Bob"))
    );
}

#[rstest]
#[case::one(1)]
#[case::five(5)]
fn test_identity_lambda(compiler: Compiler, #[case] n: i32) {
    let i = Expr::parameter("i", None);
    let node = Expr::lambda(vec![i.clone()], i);
    let metadata = Metadata::new().with(
        &keys::LAMBDA_SIGNATURE,
        Shared::new(LambdaSignature::new(vec![Type::Int], Type::Int)),
    );

    let value = compiler.evaluate(&node, &[], &metadata).unwrap();
    let function = value.as_function().unwrap();

    assert_eq!(function.call(&[Value::Int(n)]), Ok(Value::Int(n)));
}

#[rstest]
fn test_zero_parameter_lambda(compiler: Compiler) {
    let node = Expr::lambda(Vec::new(), int(42));
    let metadata = Metadata::new().with(
        &keys::LAMBDA_SIGNATURE,
        Shared::new(LambdaSignature::new(Vec::new(), Type::Int)),
    );

    let value = compiler.evaluate(&node, &[], &metadata).unwrap();

    assert_eq!(value.as_function().unwrap().call(&[]), Ok(Value::Int(42)));
}

#[rstest]
fn test_optimizer_folds_constants(compiler: Compiler) {
    let compiled = compiler
        .compile(&Expr::binary(BinaryOp::Addition, int(1), int(1)), &Metadata::default())
        .unwrap();

    assert!(compiled.is_constant());
    assert_eq!(compiled.invoke(&[], &Metadata::default()), Ok(Value::Int(2)));
}

#[rstest]
fn test_optimizer_leaves_free_variables(compiler: Compiler) {
    let compiled = compiler
        .compile(
            &Expr::binary(BinaryOp::Addition, Expr::binding_member(0, "A", Type::Int), int(1)),
            &Metadata::default(),
        )
        .unwrap();

    assert!(!compiled.is_constant());
    assert_eq!(compiled.invoke(&[Value::Int(41)], &Metadata::default()), Ok(Value::Int(42)));
}

#[rstest]
fn test_concurrent_compiles_agree(compiler: Compiler) {
    let compiler = &compiler;
    let results = std::thread::scope(|scope| {
        let handles = (0..8)
            .map(|n| {
                scope.spawn(move || {
                    let node = Expr::binary(BinaryOp::Addition, Expr::binding_member(0, "A", Type::Int), int(1));
                    let compiled = compiler.compile(&node, &Metadata::default()).unwrap();
                    compiled.invoke(&[Value::Int(n)], &Metadata::default()).unwrap()
                })
            })
            .collect::<Vec<_>>();

        handles.into_iter().map(|h| h.join().unwrap()).collect::<Vec<_>>()
    });

    assert_eq!(results, (1..=8).map(Value::Int).collect::<Vec<_>>());
    assert_eq!(compiler.cache().len(), 1);
}

#[test]
fn test_error_diagnostics() {
    use miette::Diagnostic;

    let error = Error::from(CompileError::TypeNotResolved("Missing".into()));

    assert_eq!(
        error.code().map(|c| c.to_string()),
        Some("CompileError::TypeNotResolved".to_string())
    );
    assert!(error.help().is_some());
}
