use smol_str::SmolStr;

use super::{ExpressionBuilder, priority};
use crate::{
    Metadata, Shared, Type, Value,
    ast::node::{Expr, Node},
    compiler::{BuildContext, Executable},
    error::{compile::CompileError, runtime::RuntimeError},
    member::{AccessorMember, MemberFlags, MemberKind, MemberManager},
};

/// How a member access was bound.
enum Resolution {
    Static(Shared<dyn AccessorMember>),
    /// Looked up against the runtime type of the target on every invocation.
    Dynamic(Shared<dyn MemberManager>),
}

/// Owner type and flags used to look up members on `target`: static members
/// of the referenced type for a type reference, instance members otherwise.
pub(super) fn owner_of(target: &Executable) -> (Type, MemberFlags) {
    match target.as_constant() {
        Some(Value::Type(ty)) => (ty.clone(), MemberFlags::STATIC),
        _ => (target.ty().clone(), MemberFlags::INSTANCE),
    }
}

pub(super) fn runtime_owner_of(target: &Value) -> (Type, MemberFlags) {
    match target {
        Value::Type(ty) => (ty.clone(), MemberFlags::STATIC),
        v => (v.runtime_type(), MemberFlags::INSTANCE),
    }
}

fn find_accessor(
    member_manager: &dyn MemberManager,
    owner: &Type,
    flags: MemberFlags,
    name: &str,
    metadata: &Metadata,
) -> Option<Shared<dyn AccessorMember>> {
    member_manager
        .try_get_members(owner, MemberKind::ACCESSOR, flags, name, metadata)
        .into_iter()
        .find_map(|member| member.as_accessor().cloned())
}

/// Builds property and field reads through the member manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemberBuilder;

impl ExpressionBuilder for MemberBuilder {
    fn name(&self) -> &'static str {
        "member"
    }

    fn priority(&self) -> i32 {
        priority::MEMBER
    }

    fn try_build(&self, ctx: &mut BuildContext<'_>, node: &Node) -> Result<Option<Executable>, CompileError> {
        let Expr::Member { target, name } = &**node else {
            return Ok(None);
        };

        let target = ctx.build(target)?;
        let (owner, flags) = owner_of(&target);

        let resolution = if owner.is_dynamic() {
            Resolution::Dynamic(Shared::clone(ctx.member_manager()))
        } else {
            match find_accessor(&**ctx.member_manager(), &owner, flags, name, ctx.metadata()) {
                Some(accessor) => Resolution::Static(accessor),
                None if ctx.options().strict_members => {
                    return Err(CompileError::MemberNotFound {
                        owner: owner.name(),
                        name: name.clone(),
                    });
                }
                None => Resolution::Dynamic(Shared::clone(ctx.member_manager())),
            }
        };

        let name = SmolStr::clone(name);
        let expr = match resolution {
            Resolution::Static(accessor) => match accessor.direct_getter() {
                Some(getter) => Executable::new(accessor.ty().clone(), false, move |frame| {
                    let target = target.eval(frame)?;
                    if target.is_null() {
                        return Err(RuntimeError::NullReference(name.clone()));
                    }
                    Ok(getter(&target)?)
                }),
                None => Executable::new(accessor.ty().clone(), false, move |frame| {
                    let target = target.eval(frame)?;
                    if target.is_null() {
                        return Err(RuntimeError::NullReference(name.clone()));
                    }
                    Ok(accessor.get_value(&target, frame.metadata())?)
                }),
            },
            Resolution::Dynamic(member_manager) => Executable::new(Type::Object, false, move |frame| {
                let target = target.eval(frame)?;
                if target.is_null() {
                    return Err(RuntimeError::NullReference(name.clone()));
                }

                let (owner, flags) = runtime_owner_of(&target);
                let accessor = find_accessor(&*member_manager, &owner, flags, &name, frame.metadata()).ok_or_else(
                    || RuntimeError::MemberNotFound {
                        owner: owner.name(),
                        name: name.clone(),
                    },
                )?;
                Ok(accessor.get_value(&target, frame.metadata())?)
            }),
        };

        Ok(Some(expr))
    }
}
