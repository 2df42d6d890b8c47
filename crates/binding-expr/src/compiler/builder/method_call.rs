use itertools::Itertools;
use smallvec::SmallVec;
use smol_str::SmolStr;

use super::{
    ExpressionBuilder,
    member::{owner_of, runtime_owner_of},
    priority,
};
use crate::{
    Metadata, Shared, Type, Value,
    ast::node::{Expr, Node, TypeArg},
    compiler::{BuildContext, Executable},
    convert::ValueConverter,
    error::{compile::CompileError, runtime::RuntimeError},
    keys,
    member::{INDEXER_GETTER_NAME, MemberFlags, MemberKind, MemberManager, MethodMember, ParameterInfo},
};

type Values = SmallVec<[Value; 4]>;

fn find_methods(
    member_manager: &dyn MemberManager,
    owner: &Type,
    flags: MemberFlags,
    name: &str,
    metadata: &Metadata,
) -> Vec<Shared<dyn MethodMember>> {
    member_manager
        .try_get_members(owner, MemberKind::METHOD, flags, name, metadata)
        .into_iter()
        .filter_map(|member| member.as_method().cloned())
        .collect()
}

/// Closes `method` over `type_args`. Returns `None` when the arity does not
/// match, so the next candidate is tried.
fn close_generic(
    method: Shared<dyn MethodMember>,
    type_args: &[Type],
) -> Result<Option<Shared<dyn MethodMember>>, crate::member::MemberError> {
    match (method.generic_arity(), type_args.len()) {
        (0, 0) => Ok(Some(method)),
        (arity, len) if arity == len => method.make_generic(type_args).map(Some),
        _ => Ok(None),
    }
}

/// Splits off a trailing `Metadata` parameter that the caller did not supply.
fn declared_parameters(parameters: &[ParameterInfo], supplied: usize) -> (&[ParameterInfo], bool) {
    match parameters.split_last() {
        Some((last, rest)) if last.ty == Type::Metadata && supplied < parameters.len() => (rest, true),
        _ => (parameters, false),
    }
}

fn array_element(items: &[Value], index: &Value) -> Result<Value, RuntimeError> {
    let Value::Int(index) = index else {
        return Err(RuntimeError::invalid_types(INDEXER_GETTER_NAME, [index.type_name()]));
    };

    usize::try_from(*index)
        .ok()
        .and_then(|i| items.get(i))
        .cloned()
        .ok_or(RuntimeError::IndexOutOfBounds {
            index: i64::from(*index),
            len: items.len(),
        })
}

/// Builds method calls and indexers.
///
/// Candidates come from the member manager in its preference order and the
/// first one whose parameters accept the arguments is bound. Without any
/// candidate the call is resolved against the runtime types on every
/// invocation.
#[derive(Debug, Default, Clone, Copy)]
pub struct MethodCallBuilder;

impl ExpressionBuilder for MethodCallBuilder {
    fn name(&self) -> &'static str {
        "method_call"
    }

    fn priority(&self) -> i32 {
        priority::METHOD_CALL
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let (target, name, args, type_args) = match &**node {
            Expr::MethodCall {
                target,
                name,
                args,
                type_args,
            } => (target, name.clone(), args.as_slice(), type_args.as_slice()),
            Expr::Index { target, args } => (target, SmolStr::new_static(INDEXER_GETTER_NAME), args.as_slice(), &[][..]),
            _ => return Ok(None),
        };
        let is_index = matches!(&**node, Expr::Index { .. });

        let target = ctx.build(target)?;

        if is_index
            && let Type::Array(element) = target.ty().underlying()
            && args.len() == 1
        {
            let element = (**element).clone();
            return build_array_index(ctx, target, element, &args[0]).map(Some);
        }

        let type_args = type_args
            .iter()
            .map(|arg| match arg {
                TypeArg::Type(ty) => Ok(ty.clone()),
                TypeArg::Name(type_name) => ctx
                    .type_resolver()
                    .try_get_type(type_name, ctx.metadata())
                    .ok_or_else(|| CompileError::TypeNotResolved(type_name.clone())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let (owner, flags) = owner_of(&target);
        let candidates = if owner.is_dynamic() {
            Vec::new()
        } else {
            find_methods(&**ctx.member_manager(), &owner, flags, &name, ctx.metadata())
        };

        // Lambdas can only be built against a known parameter signature.
        let prebuilt = args
            .iter()
            .map(|arg| match &**arg {
                Expr::Lambda { .. } => Ok(None),
                _ => ctx.build(arg).map(Some),
            })
            .collect::<Result<Vec<_>, _>>()?;

        if candidates.is_empty() {
            if ctx.options().strict_members && !owner.is_dynamic() {
                return Err(CompileError::MemberNotFound {
                    owner: owner.name(),
                    name,
                });
            }

            let args = prebuilt
                .into_iter()
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| CompileError::InvalidArguments {
                    name: name.clone(),
                    message: "lambda arguments require a statically resolved method".to_string(),
                })?;

            return Ok(Some(build_dynamic_call(ctx, target, name, args, type_args, is_index)));
        }

        for method in candidates {
            let Some(method) = close_generic(method, &type_args)? else {
                continue;
            };

            if let Some(bound) = bind_arguments(ctx, method.parameters(), args, &prebuilt)? {
                return Ok(Some(build_call(target, name, flags, method, bound)));
            }
        }

        Err(CompileError::InvalidArguments {
            message: format!(
                "no overload of \"{}\" on \"{}\" accepts ({})",
                name,
                owner,
                prebuilt
                    .iter()
                    .map(|arg| arg.as_ref().map(|a| a.ty().to_string()).unwrap_or_else(|| "lambda".to_string()))
                    .join(", ")
            ),
            name,
        })
    }
}

fn build_array_index(
    ctx: &mut BuildContext<'_>,
    target: Executable,
    element: Type,
    index: &Node,
) -> Result<Executable, CompileError> {
    let index = ctx.build(index)?;
    let index = if index.ty().is_dynamic() {
        index
    } else {
        let ty = index.ty().name();
        index
            .convert(&Type::Int)
            .ok_or_else(|| CompileError::invalid_types(INDEXER_GETTER_NAME, [ty]))?
    };

    let closed = target.is_closed() && index.is_closed();
    Ok(Executable::new(element, closed, move |frame| match target.eval(frame)? {
        Value::Array(items) => array_element(&items, &index.eval(frame)?),
        Value::Null => Err(RuntimeError::NullReference(SmolStr::new_static(INDEXER_GETTER_NAME))),
        v => Err(RuntimeError::invalid_types(INDEXER_GETTER_NAME, [v.type_name()])),
    }))
}

/// Binds `args` to `parameters`. Returns `None` when the method does not
/// accept them.
fn bind_arguments(
    ctx: &mut BuildContext<'_>,
    parameters: &[ParameterInfo],
    args: &[Node],
    prebuilt: &[Option<Executable>],
) -> Result<Option<Vec<Executable>>, CompileError> {
    let (declared, inject_metadata) = declared_parameters(parameters, args.len());
    let mut bound = Vec::with_capacity(parameters.len());
    let mut next = 0;

    for (i, parameter) in declared.iter().enumerate() {
        if parameter.is_variadic && i + 1 == declared.len() {
            let rest = &prebuilt[next.min(prebuilt.len())..];

            if let [Some(array)] = rest
                && array.ty().underlying() != &Type::Object
                && let Some(array) = array.clone().convert(&parameter.ty)
                && matches!(array.ty(), Type::Array(_))
            {
                bound.push(array);
            } else {
                let shared: &BuildContext<'_> = ctx;
                let Some(items) = rest
                    .iter()
                    .map(|arg| arg.clone().and_then(|arg| coerce(shared, arg, parameter.element_type())))
                    .collect::<Option<Vec<_>>>()
                else {
                    return Ok(None);
                };
                bound.push(pack(parameter.ty.clone(), items));
            }

            next = args.len();
            break;
        }

        match args.get(next) {
            Some(arg) => {
                let Some(expr) = bind_one(ctx, &parameter.ty, arg, prebuilt[next].clone())? else {
                    return Ok(None);
                };
                bound.push(expr);
                next += 1;
            }
            None => match &parameter.default {
                Some(default) => bound.push(Executable::constant(default.clone(), parameter.ty.clone())),
                None => return Ok(None),
            },
        }
    }

    if next < args.len() {
        return Ok(None);
    }

    if inject_metadata {
        bound.push(ctx.metadata_expression());
    }

    Ok(Some(bound))
}

fn bind_one(
    ctx: &mut BuildContext<'_>,
    ty: &Type,
    arg: &Node,
    prebuilt: Option<Executable>,
) -> Result<Option<Executable>, CompileError> {
    match prebuilt {
        Some(expr) => Ok(coerce(ctx, expr, ty)),
        None => {
            let Type::Function(signature) = ty else {
                return Ok(None);
            };

            let metadata = ctx.metadata().clone().with(&keys::LAMBDA_SIGNATURE, Shared::clone(signature));
            // A lambda that does not fit this parameter rules out the candidate.
            match ctx.with_metadata(metadata, |ctx| ctx.try_build(arg)) {
                Err(CompileError::InvalidTypes { .. }) => Ok(None),
                result => result,
            }
        }
    }
}

/// Converts statically when the types allow it, otherwise defers `Object`
/// arguments to the value converter.
pub(super) fn coerce(ctx: &BuildContext<'_>, expr: Executable, ty: &Type) -> Option<Executable> {
    if !expr.ty().is_dynamic() {
        return expr.convert(ty);
    }

    let converter = Shared::clone(ctx.value_converter());
    let to = ty.clone();
    let closed = expr.is_closed();
    Some(Executable::new(ty.clone(), closed, move |frame| {
        let value = expr.eval(frame)?;
        Ok(converter.convert(&value, &to, frame.metadata())?)
    }))
}

fn pack(ty: Type, items: Vec<Executable>) -> Executable {
    let closed = items.iter().all(Executable::is_closed);
    Executable::new(ty, closed, move |frame| {
        Ok(Value::array(
            items.iter().map(|item| item.eval(frame)).collect::<Result<Vec<_>, _>>()?,
        ))
    })
}

fn build_call(
    target: Executable,
    name: SmolStr,
    flags: MemberFlags,
    method: Shared<dyn MethodMember>,
    args: Vec<Executable>,
) -> Executable {
    Executable::new(method.return_type().clone(), false, move |frame| {
        let target = target.eval(frame)?;
        if target.is_null() && flags == MemberFlags::INSTANCE {
            return Err(RuntimeError::NullReference(name.clone()));
        }

        let args = args.iter().map(|arg| arg.eval(frame)).collect::<Result<Values, _>>()?;
        Ok(method.invoke(&target, &args, frame.metadata())?)
    })
}

/// Binds already evaluated arguments; the runtime counterpart of
/// [`bind_arguments`].
fn bind_values(
    parameters: &[ParameterInfo],
    values: &[Value],
    converter: &dyn ValueConverter,
    metadata: &Metadata,
) -> Option<Values> {
    let convert = |value: &Value, ty: &Type| {
        value
            .convert(ty)
            .or_else(|| converter.convert(value, ty, metadata).ok())
    };
    let (declared, inject_metadata) = declared_parameters(parameters, values.len());
    let mut bound = Values::new();
    let mut next = 0;

    for (i, parameter) in declared.iter().enumerate() {
        if parameter.is_variadic && i + 1 == declared.len() {
            let rest = &values[next.min(values.len())..];
            let packed = match rest {
                [Value::Array(items)] => Value::Array(Shared::clone(items)),
                rest => Value::array(
                    rest.iter()
                        .map(|value| convert(value, parameter.element_type()))
                        .collect::<Option<Vec<_>>>()?,
                ),
            };
            bound.push(packed);
            next = values.len();
            break;
        }

        match values.get(next) {
            Some(value) => {
                bound.push(convert(value, &parameter.ty)?);
                next += 1;
            }
            None => bound.push(parameter.default.clone()?),
        }
    }

    if next < values.len() {
        return None;
    }

    if inject_metadata {
        bound.push(Value::Metadata(metadata.clone()));
    }

    Some(bound)
}

fn build_dynamic_call(
    ctx: &BuildContext<'_>,
    target: Executable,
    name: SmolStr,
    args: Vec<Executable>,
    type_args: Vec<Type>,
    is_index: bool,
) -> Executable {
    let member_manager = Shared::clone(ctx.member_manager());
    let converter = Shared::clone(ctx.value_converter());

    Executable::new(Type::Object, false, move |frame| {
        let target = target.eval(frame)?;
        if target.is_null() {
            return Err(RuntimeError::NullReference(name.clone()));
        }

        let values = args.iter().map(|arg| arg.eval(frame)).collect::<Result<Values, _>>()?;

        if is_index
            && let Value::Array(items) = &target
            && let [index] = values.as_slice()
        {
            return array_element(items, index);
        }

        let (owner, flags) = runtime_owner_of(&target);
        let candidates = find_methods(&*member_manager, &owner, flags, &name, frame.metadata());
        if candidates.is_empty() {
            return Err(RuntimeError::MemberNotFound {
                owner: owner.name(),
                name: name.clone(),
            });
        }

        for method in candidates {
            let Some(method) = close_generic(method, &type_args)? else {
                continue;
            };

            if let Some(bound) = bind_values(method.parameters(), &values, &*converter, frame.metadata()) {
                return Ok(method.invoke(&target, &bound, frame.metadata())?);
            }
        }

        Err(RuntimeError::invalid_types(
            name.clone(),
            values.iter().map(Value::type_name),
        ))
    })
}
