use itertools::Itertools;

use super::{ExpressionBuilder, method_call::coerce, priority};
use crate::{
    Shared, Type, Value,
    ast::node::{Expr, Node, NodeId},
    compiler::{BuildContext, Executable, Frame, executable::Locals},
    error::compile::CompileError,
    keys,
    value::Function,
};

/// Builds inline lambdas against the expected signature found under
/// [`keys::LAMBDA_SIGNATURE`]. Declines when no signature is present or the
/// parameter counts differ. A body that cannot convert to the expected return
/// type fails with [`CompileError::InvalidTypes`]; `object` bodies are
/// converted when the function is called.
#[derive(Debug, Default, Clone, Copy)]
pub struct LambdaBuilder;

impl ExpressionBuilder for LambdaBuilder {
    fn name(&self) -> &'static str {
        "lambda"
    }

    fn priority(&self) -> i32 {
        priority::LAMBDA
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::Lambda { body, parameters } = &**node else {
            return Ok(None);
        };
        let Some(signature) = ctx.metadata().get(&keys::LAMBDA_SIGNATURE).cloned() else {
            return Ok(None);
        };
        if signature.arity() != parameters.len() {
            return Ok(None);
        }

        let slots: Shared<[usize]> = parameters.iter().map(|_| ctx.allocate_slot()).collect();
        let bindings = parameters
            .iter()
            .zip(slots.iter().copied())
            .zip(&signature.parameters)
            .map(|((parameter, slot), expected)| {
                let ty = match &**parameter {
                    Expr::Parameter { ty: Some(ty), .. } => ty.clone(),
                    _ => expected.clone(),
                };
                (
                    NodeId::of(parameter),
                    Executable::new(ty, false, move |frame| Ok(frame.local(slot))),
                )
            })
            .collect_vec();

        let body_metadata = ctx.metadata().clone().without(&keys::LAMBDA_SIGNATURE);
        let body = ctx.with_bindings(bindings, |ctx| ctx.with_metadata(body_metadata, |ctx| ctx.build(body)))?;
        let body_type = body.ty().name();
        let body = coerce(ctx, body, &signature.return_type)
            .ok_or_else(|| CompileError::invalid_types("=>", [body_type, signature.return_type.name()]))?;

        let ty = Type::Function(Shared::clone(&signature));
        Ok(Some(Executable::new(ty, false, move |frame| {
            let captured_args: Shared<[Value]> = frame.args().into();
            let captured_metadata = frame.metadata().clone();
            let captured_locals: Locals = frame.locals().iter().cloned().collect();
            let (body, slots) = (body.clone(), Shared::clone(&slots));

            Ok(Value::Function(Function::new(Shared::clone(&signature), move |args| {
                let mut locals = captured_locals.clone();
                for (&slot, value) in slots.iter().zip(args) {
                    if locals.len() <= slot {
                        locals.resize(slot + 1, Value::Null);
                    }
                    locals[slot] = value.clone();
                }

                let frame = Frame::new(&captured_args, &captured_metadata);
                body.eval(&frame.with_locals(&locals))
            })))
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BinaryOp, Compiler, LambdaSignature, Metadata, RuntimeError};
    use rstest::rstest;

    fn lambda_metadata(parameters: Vec<Type>, return_type: Type) -> Metadata {
        Metadata::new().with(
            &keys::LAMBDA_SIGNATURE,
            Shared::new(LambdaSignature::new(parameters, return_type)),
        )
    }

    fn compile_function(node: &Node, metadata: &Metadata, args: &[Value]) -> Function {
        let compiler = Compiler::default();
        let compiled = compiler.compile(node, metadata).unwrap();
        match compiled.invoke(args, metadata).unwrap() {
            Value::Function(function) => function,
            v => panic!("expected a function, got {:?}", v),
        }
    }

    #[rstest]
    #[case::one(1)]
    #[case::five(5)]
    fn test_identity(#[case] n: i32) {
        let parameter = Expr::parameter("i", None);
        let node = Expr::lambda(vec![parameter.clone()], parameter);
        let function = compile_function(&node, &lambda_metadata(vec![Type::Int], Type::Int), &[]);

        assert_eq!(function.arity(), 1);
        assert_eq!(function.call(&[Value::Int(n)]), Ok(Value::Int(n)));
    }

    #[test]
    fn test_zero_parameters() {
        let node = Expr::lambda(vec![], Expr::constant(42, Type::Int));
        let function = compile_function(&node, &lambda_metadata(vec![], Type::Int), &[]);

        assert_eq!(function.call(&[]), Ok(Value::Int(42)));
        assert_eq!(
            function.call(&[Value::Int(1)]),
            Err(RuntimeError::ArgumentCount { expected: 0, got: 1 })
        );
    }

    #[test]
    fn test_captures_binding_arguments() {
        let parameter = Expr::parameter("x", Some(Type::Int));
        let node = Expr::lambda(
            vec![parameter.clone()],
            Expr::binary(BinaryOp::Addition, parameter, Expr::binding_member(0, "Offset", Type::Int)),
        );
        let function = compile_function(&node, &lambda_metadata(vec![Type::Int], Type::Int), &[Value::Int(10)]);

        assert_eq!(function.call(&[Value::Int(5)]), Ok(Value::Int(15)));
    }

    #[test]
    fn test_return_type_is_converted() {
        let parameter = Expr::parameter("x", None);
        let node = Expr::lambda(vec![parameter.clone()], parameter);
        let function = compile_function(&node, &lambda_metadata(vec![Type::Int], Type::Double), &[]);

        assert_eq!(function.call(&[Value::Int(2)]), Ok(Value::Double(2.0)));
    }

    #[test]
    fn test_dynamic_body_is_converted_on_call() {
        let parameter = Expr::parameter("x", Some(Type::Object));
        let node = Expr::lambda(vec![parameter.clone()], parameter);
        let function = compile_function(&node, &lambda_metadata(vec![Type::Object], Type::Int), &[]);

        assert_eq!(function.call(&[Value::from("12")]), Ok(Value::Int(12)));
    }

    #[rstest]
    #[case::string_to_bool(Expr::constant("oops", Type::String), Type::Bool, vec!["string".into(), "bool".into()])]
    #[case::double_to_int(Expr::constant(1.5, Type::Double), Type::Int, vec!["double".into(), "int".into()])]
    fn test_incompatible_return_type(#[case] body: Node, #[case] return_type: Type, #[case] args: Vec<smol_str::SmolStr>) {
        let node = Expr::lambda(vec![Expr::parameter("x", None)], body);
        let metadata = lambda_metadata(vec![Type::Int], return_type);

        assert_eq!(
            Compiler::default().compile(&node, &metadata).err(),
            Some(CompileError::InvalidTypes { name: "=>".into(), args })
        );
    }

    #[rstest]
    #[case::no_signature(Metadata::default())]
    #[case::arity_mismatch(lambda_metadata(vec![Type::Int, Type::Int], Type::Int))]
    fn test_declines(#[case] metadata: Metadata) {
        let parameter = Expr::parameter("x", None);
        let node = Expr::lambda(vec![parameter.clone()], parameter);

        assert!(matches!(
            Compiler::default().compile(&node, &metadata),
            Err(CompileError::Unsupported(_))
        ));
    }
}
