use smol_str::SmolStr;

use super::{ExpressionBuilder, priority};
use crate::{
    Type,
    ast::node::{Expr, Node},
    compiler::{BuildContext, Executable},
    convert::ConvertError,
    error::{compile::CompileError, runtime::RuntimeError},
};

/// Builds binding placeholders as reads of the invocation argument at their
/// index. The instance captured by the node is never referenced.
#[derive(Debug, Default, Clone, Copy)]
pub struct BindingMemberBuilder;

impl ExpressionBuilder for BindingMemberBuilder {
    fn name(&self) -> &'static str {
        "binding_member"
    }

    fn priority(&self) -> i32 {
        priority::BINDING_MEMBER
    }

    fn try_build(&self, _ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::BindingMember { index, path, ty, .. } = &**node else {
            return Ok(None);
        };

        let (index, path, target) = (*index, SmolStr::clone(path), ty.clone());

        Ok(Some(Executable::new(ty.clone(), false, move |frame| {
            let value = frame
                .args()
                .get(index)
                .ok_or_else(|| RuntimeError::MissingArgument {
                    index,
                    path: path.clone(),
                })?;

            match &target {
                Type::Object => Ok(value.clone()),
                target => value
                    .convert(target)
                    .ok_or_else(|| ConvertError::new(value, target).into()),
            }
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Compiler, Metadata, Value};
    use rstest::rstest;

    #[rstest]
    #[case::object(Type::Object, vec![Value::from("a")], Ok(Value::from("a")))]
    #[case::widened(Type::Double, vec![Value::Int(1)], Ok(Value::Double(1.0)))]
    #[case::null(Type::Int.nullable(), vec![Value::Null], Ok(Value::Null))]
    #[case::missing(Type::Int, vec![], Err(RuntimeError::MissingArgument { index: 0, path: "A".into() }))]
    #[case::mismatch(
        Type::Int,
        vec![Value::from("a")],
        Err(RuntimeError::Conversion(ConvertError { value: "\"a\"".into(), target: "int".into() }))
    )]
    fn test_binding_member(#[case] ty: Type, #[case] args: Vec<Value>, #[case] expected: Result<Value, RuntimeError>) {
        let compiler = Compiler::default();
        let compiled = compiler
            .compile(&Expr::binding_member(0, "A", ty), &Metadata::default())
            .unwrap();

        assert_eq!(compiled.invoke(&args, &Metadata::default()), expected);
    }
}
