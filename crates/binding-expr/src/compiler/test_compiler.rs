//! Tests for method-call binding and the compiler cache.

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use crate::{
        CacheMode, CompileError, Compiler, Expr, HostObject, LambdaSignature, Member, MemberFlags, MemberRegistry,
        Metadata, MetadataKey, Node, ParameterInfo, RuntimeError, Shared, Type, TypeArg, TypeRegistry, Value,
    };

    const CULTURE: MetadataKey<&'static str> = MetadataKey::new("culture");

    #[derive(Debug)]
    struct Counter;

    #[fixture]
    fn compiler() -> Compiler {
        let registry = MemberRegistry::with_builtins();
        let counter = Type::class("Counter");

        registry.method(
            &counter,
            "Format",
            vec![ParameterInfo::new("value", Type::Int), ParameterInfo::new("metadata", Type::Metadata)],
            Type::String,
            |_, args, _| match args {
                [Value::Int(n), Value::Metadata(metadata)] => {
                    let culture = metadata.get(&CULTURE).copied().unwrap_or("invariant");
                    Ok(Value::from(format!("{}:{}", culture, n)))
                }
                _ => Err(crate::MemberError::Failed("unexpected arguments".to_string())),
            },
        );
        registry.method(
            &counter,
            "Sum",
            vec![ParameterInfo::variadic("values", Type::Int)],
            Type::Int,
            |_, args, _| match args {
                [Value::Array(values)] => Ok(Value::Int(values.iter().filter_map(Value::as_int).sum())),
                _ => Err(crate::MemberError::Failed("unexpected arguments".to_string())),
            },
        );
        registry.method(
            &counter,
            "Apply",
            vec![
                ParameterInfo::new("value", Type::Int),
                ParameterInfo::new("f", Type::function(vec![Type::Int], Type::Int)),
            ],
            Type::Int,
            |_, args, _| match args {
                [value, Value::Function(f)] => f.call(std::slice::from_ref(value)).map_err(|e| crate::MemberError::Failed(e.to_string())),
                _ => Err(crate::MemberError::Failed("unexpected arguments".to_string())),
            },
        );
        registry.method(
            &counter,
            "Map",
            vec![ParameterInfo::new("f", Type::function(vec![Type::Int], Type::Bool))],
            Type::String,
            |_, _, _| Ok(Value::from("predicate")),
        );
        registry.method(
            &counter,
            "Map",
            vec![ParameterInfo::new("f", Type::function(vec![Type::Int], Type::String))],
            Type::String,
            |_, _, _| Ok(Value::from("projection")),
        );
        registry.method(&counter, "Pick", vec![ParameterInfo::new("value", Type::String)], Type::String, |_, _, _| {
            Ok(Value::from("string"))
        });
        registry.method(&counter, "Pick", vec![ParameterInfo::new("value", Type::Object)], Type::String, |_, _, _| {
            Ok(Value::from("object"))
        });

        let types = TypeRegistry::new();
        types.register("Counter", counter);

        let mut compiler = Compiler::default();
        compiler.set_member_manager(Shared::new(registry));
        compiler.set_type_resolver(Shared::new(types));
        compiler
    }

    fn counter() -> Node {
        Expr::binding_member(0, "Counter", Type::class("Counter"))
    }

    fn counter_value() -> Value {
        Value::Object(HostObject::new("Counter", Counter))
    }

    fn int(n: i32) -> Node {
        Expr::constant(n, Type::Int)
    }

    #[rstest]
    #[case::substring(Expr::method_call(Expr::constant("abcdef", Type::String), "Substring", [int(2), int(3)]), Value::from("cde"))]
    #[case::optional_default(Expr::method_call(Expr::constant("abcdef", Type::String), "Substring", [int(4)]), Value::from("ef"))]
    #[case::string_indexer(Expr::index(Expr::constant("abc", Type::String), [int(2)]), Value::from("c"))]
    #[case::static_variadic(
        Expr::method_call(Expr::constant(Type::String, Type::TypeRef), "Concat", [Expr::constant("a", Type::String), int(1), Expr::constant(true, Type::Bool)]),
        Value::from("a1true")
    )]
    #[case::variadic_widening(Expr::method_call(counter(), "Sum", [int(1), int(2), int(3)]), Value::Int(6))]
    #[case::variadic_empty(Expr::method_call(counter(), "Sum", []), Value::Int(0))]
    #[case::metadata_injected(Expr::method_call(counter(), "Format", [int(7)]), Value::from("fr:7"))]
    #[case::first_applicable_wins(Expr::method_call(counter(), "Pick", [Expr::constant("a", Type::String)]), Value::from("string"))]
    #[case::second_candidate(Expr::method_call(counter(), "Pick", [int(1)]), Value::from("object"))]
    #[case::lambda_argument(
        {
            let x = Expr::parameter("x", None);
            Expr::method_call(counter(), "Apply", [int(20), Expr::lambda(vec![x.clone()], Expr::binary(crate::BinaryOp::Multiplication, x, int(2)))])
        },
        Value::Int(40)
    )]
    #[case::lambda_fits_first_overload(
        {
            let x = Expr::parameter("x", None);
            Expr::method_call(counter(), "Map", [Expr::lambda(vec![x.clone()], Expr::binary(crate::BinaryOp::GreaterThan, x, int(1)))])
        },
        Value::from("predicate")
    )]
    #[case::lambda_skips_mismatched_return(
        Expr::method_call(counter(), "Map", [Expr::lambda(vec![Expr::parameter("x", None)], Expr::constant("a", Type::String))]),
        Value::from("projection")
    )]
    #[case::generic_by_name(
        Expr::member(
            Expr::generic_method_call(
                Expr::binding_member(1, "Items", Type::array(Type::Object)),
                "OfType",
                [],
                vec![TypeArg::Name("int".into())],
            ),
            "Length"
        ),
        Value::Int(2)
    )]
    #[case::array_index(Expr::index(Expr::binding_member(1, "Items", Type::array(Type::Object)), [int(1)]), Value::from("a"))]
    #[case::dynamic_call(Expr::method_call(Expr::binding_member(2, "Any", Type::Object), "ToUpper", []), Value::from("XYZ"))]
    #[case::dynamic_index(Expr::index(Expr::binding_member(1, "Items", Type::Object), [int(0)]), Value::Int(1))]
    fn test_method_call(compiler: Compiler, #[case] node: Node, #[case] expected: Value) {
        let metadata = Metadata::new().with(&CULTURE, "fr");
        let args = [
            counter_value(),
            Value::array(vec![Value::Int(1), Value::from("a"), Value::Int(2)]),
            Value::from("xyz"),
        ];
        let compiled = compiler.compile(&node, &Metadata::default()).unwrap();

        assert_eq!(compiled.invoke(&args, &metadata), Ok(expected));
    }

    #[rstest]
    #[case::unknown_type(
        Expr::generic_method_call(Expr::binding_member(1, "Items", Type::array(Type::Object)), "OfType", [], vec![TypeArg::Name("Missing".into())]),
        CompileError::TypeNotResolved("Missing".into())
    )]
    #[case::too_many_arguments(
        Expr::method_call(Expr::constant("abc", Type::String), "ToUpper", [int(1)]),
        CompileError::InvalidArguments { name: "ToUpper".into(), message: "no overload of \"ToUpper\" on \"string\" accepts (int)".to_string() }
    )]
    #[case::lambda_fits_no_overload(
        Expr::method_call(counter(), "Apply", [int(1), Expr::lambda(vec![Expr::parameter("x", None)], Expr::constant("a", Type::String))]),
        CompileError::InvalidArguments { name: "Apply".into(), message: "no overload of \"Apply\" on \"Counter\" accepts (int, lambda)".to_string() }
    )]
    #[case::lambda_on_dynamic_target(
        {
            let x = Expr::parameter("x", None);
            Expr::method_call(Expr::binding_member(2, "Any", Type::Object), "Select", [Expr::lambda(vec![x.clone()], x)])
        },
        CompileError::InvalidArguments { name: "Select".into(), message: "lambda arguments require a statically resolved method".to_string() }
    )]
    fn test_method_call_errors(compiler: Compiler, #[case] node: Node, #[case] expected: CompileError) {
        assert_eq!(compiler.compile(&node, &Metadata::default()).err(), Some(expected));
    }

    #[rstest]
    #[case::out_of_bounds(
        Expr::index(Expr::binding_member(1, "Items", Type::array(Type::Object)), [int(3)]),
        RuntimeError::IndexOutOfBounds { index: 3, len: 3 }
    )]
    #[case::null_target(
        Expr::method_call(Expr::binding_member(3, "Missing", Type::String), "ToUpper", []),
        RuntimeError::NullReference("ToUpper".into())
    )]
    #[case::dynamic_missing(
        Expr::method_call(Expr::binding_member(2, "Any", Type::Object), "Explode", []),
        RuntimeError::MemberNotFound { owner: "string".into(), name: "Explode".into() }
    )]
    fn test_method_call_runtime_errors(compiler: Compiler, #[case] node: Node, #[case] expected: RuntimeError) {
        let args = [
            counter_value(),
            Value::array(vec![Value::Int(1), Value::from("a"), Value::Int(2)]),
            Value::from("xyz"),
            Value::Null,
        ];
        let compiled = compiler.compile(&node, &Metadata::default()).unwrap();

        assert_eq!(compiled.invoke(&args, &Metadata::default()), Err(expected));
    }

    #[rstest]
    fn test_strict_method_resolution(mut compiler: Compiler) {
        compiler.set_strict_members(true);
        let node = Expr::method_call(counter(), "Explode", []);

        assert_eq!(
            compiler.compile(&node, &Metadata::default()).err(),
            Some(CompileError::MemberNotFound {
                owner: "Counter".into(),
                name: "Explode".into()
            })
        );
    }

    #[rstest]
    fn test_member_manager_candidates_are_ordered(compiler: Compiler) {
        let members = compiler.member_manager().try_get_members(
            &Type::class("Counter"),
            crate::MemberKind::METHOD,
            MemberFlags::INSTANCE,
            "Pick",
            &Metadata::default(),
        );

        assert_eq!(members.len(), 2);
        assert!(matches!(&members[0], Member::Method(m) if m.parameters()[0].ty == Type::String));
    }

    fn sample() -> Node {
        Expr::binary(
            crate::BinaryOp::Multiplication,
            Expr::binding_member(0, "Count", Type::Int),
            int(10),
        )
    }

    #[test]
    fn test_cache_returns_same_instance() {
        let compiler = Compiler::default();
        let first = compiler.compile(&sample(), &Metadata::default()).unwrap();
        let second = compiler.compile(&sample(), &Metadata::default()).unwrap();

        assert!(Shared::ptr_eq(&first, &second));
        assert_eq!(compiler.cache().len(), 1);
    }

    #[rstest]
    #[case::global(None)]
    #[case::targeted(Some(sample()))]
    fn test_cache_invalidation(#[case] target: Option<Node>) {
        let compiler = Compiler::default();
        let first = compiler.compile(&sample(), &Metadata::default()).unwrap();

        assert!(compiler.try_invalidate_cache(target.as_ref()));

        let second = compiler.compile(&sample(), &Metadata::default()).unwrap();
        assert!(!Shared::ptr_eq(&first, &second));
    }

    #[test]
    fn test_targeted_invalidation_keeps_other_entries() {
        let compiler = Compiler::default();
        let other = Expr::binary(crate::BinaryOp::Addition, Expr::binding_member(0, "Count", Type::Int), int(1));
        let kept = compiler.compile(&other, &Metadata::default()).unwrap();
        let _removed = compiler.compile(&sample(), &Metadata::default()).unwrap();

        assert!(compiler.try_invalidate_cache(Some(&sample())));
        assert!(!compiler.try_invalidate_cache(Some(&sample())));
        assert!(Shared::ptr_eq(&kept, &compiler.compile(&other, &Metadata::default()).unwrap()));
    }

    #[test]
    fn test_weak_entries_are_purged() {
        let compiler = Compiler::default();
        let compiled = compiler.compile(&sample(), &Metadata::default()).unwrap();
        drop(compiled);

        assert_eq!(compiler.cache().purge(), 1);
        assert!(compiler.cache().is_empty());
    }

    fn distinct(n: usize) -> Node {
        Expr::binding_member(0, format!("Count{}", n), Type::Int)
    }

    #[test]
    fn test_weak_cache_stays_bounded() {
        let compiler = Compiler::default();

        for n in 0..1000 {
            let compiled = compiler.compile(&distinct(n), &Metadata::default()).unwrap();
            drop(compiled);
        }

        assert!(compiler.cache().len() <= crate::compiler::cache::PURGE_HIGH_WATER_MARK + 1);
    }

    #[test]
    fn test_bulk_purge_keeps_live_entries() {
        let compiler = Compiler::default();
        let kept = (0..300)
            .map(|n| compiler.compile(&distinct(n), &Metadata::default()).unwrap())
            .collect::<Vec<_>>();

        for n in 300..600 {
            drop(compiler.compile(&distinct(n), &Metadata::default()).unwrap());
        }

        assert!(compiler.cache().len() >= kept.len());
        assert!(compiler.cache().len() < 600);
        assert!(Shared::ptr_eq(&kept[0], &compiler.compile(&distinct(0), &Metadata::default()).unwrap()));
    }

    #[test]
    fn test_strong_cache_mode_retains() {
        let mut compiler = Compiler::default();
        compiler.set_cache_mode(CacheMode::Strong);
        drop(compiler.compile(&sample(), &Metadata::default()).unwrap());

        assert_eq!(compiler.cache().purge(), 0);
        assert_eq!(compiler.cache().len(), 1);
    }

    #[test]
    fn test_cache_disabled() {
        let mut compiler = Compiler::default();
        compiler.set_cache_mode(CacheMode::Disabled);
        let first = compiler.compile(&sample(), &Metadata::default()).unwrap();
        let second = compiler.compile(&sample(), &Metadata::default()).unwrap();

        assert!(!Shared::ptr_eq(&first, &second));
        assert!(compiler.cache().is_empty());
    }

    #[test]
    fn test_invalidation_during_compile_is_not_published() {
        let compiler = Compiler::default();
        let generation = compiler.cache().generation();
        compiler.try_invalidate_cache(None);

        let stale = compiler.compile(&sample(), &Metadata::default()).unwrap();
        let signature = stale.signature().clone();
        let late = Shared::new(crate::compiler::CompiledExpression::new(
            crate::compiler::Executable::constant(Value::Null, Type::Object),
            Vec::new(),
            signature.clone(),
        ));

        let returned = compiler.cache().insert(signature, Shared::clone(&late), generation, CacheMode::Weak);
        assert!(Shared::ptr_eq(&returned, &late));
        assert!(Shared::ptr_eq(&compiler.compile(&sample(), &Metadata::default()).unwrap(), &stale));
    }

    #[test]
    fn test_lambda_signature_is_part_of_cache_key() {
        let compiler = Compiler::default();
        let x = Expr::parameter("x", None);
        let node = Expr::lambda(vec![x.clone()], x);
        let int_md = Metadata::new().with(
            &crate::keys::LAMBDA_SIGNATURE,
            Shared::new(LambdaSignature::new(vec![Type::Int], Type::Int)),
        );
        let double_md = Metadata::new().with(
            &crate::keys::LAMBDA_SIGNATURE,
            Shared::new(LambdaSignature::new(vec![Type::Double], Type::Double)),
        );

        let a = compiler.compile(&node, &int_md).unwrap();
        let b = compiler.compile(&node, &double_md).unwrap();

        assert!(!Shared::ptr_eq(&a, &b));
        assert_eq!(a.result_type(), &Type::function(vec![Type::Int], Type::Int));
    }

    #[test]
    fn test_contributing_builders() {
        let compiler = Compiler::default();
        let compiled = compiler.compile(&sample(), &Metadata::default()).unwrap();

        for name in ["optimizer", "binding_member", "constant", "binary"] {
            assert!(compiled.builders().contains(&name), "{} did not contribute", name);
        }
        assert!(!compiled.builders().contains(&"lambda"));

        let folded = compiler
            .compile(
                &Expr::binary(crate::BinaryOp::Addition, int(1), int(1)),
                &Metadata::default(),
            )
            .unwrap();
        assert!(folded.is_constant());
        assert_eq!(folded.invoke(&[], &Metadata::default()), Ok(Value::Int(2)));
    }
}
