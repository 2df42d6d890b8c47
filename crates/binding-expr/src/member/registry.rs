use std::sync::RwLock;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use super::{
    AccessorMember, Getter, INDEXER_GETTER_NAME, Member, MemberError, MemberFlags, MemberKind,
    MemberManager, MethodMember, ParameterInfo,
};
use crate::{Metadata, Shared, Type, Value};

type IndirectGetter = dyn Fn(&Value, &Metadata) -> Result<Value, MemberError> + Send + Sync;
type MethodFn = dyn Fn(&Value, &[Value], &Metadata) -> Result<Value, MemberError> + Send + Sync;
type GenericFactory =
    dyn Fn(&[Type]) -> Result<Shared<dyn MethodMember>, MemberError> + Send + Sync;

#[derive(Clone)]
enum Read {
    Direct(Getter),
    Indirect(Shared<IndirectGetter>),
}

/// Property backed by a Rust closure.
#[derive(Clone)]
pub struct PropertyAccessor {
    name: SmolStr,
    ty: Type,
    read: Read,
}

impl PropertyAccessor {
    pub fn new<F>(name: impl Into<SmolStr>, ty: Type, getter: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            ty,
            read: Read::Direct(Shared::new(getter)),
        }
    }

    /// A property whose value depends on the invocation metadata.
    pub fn with_metadata<F>(name: impl Into<SmolStr>, ty: Type, getter: F) -> Self
    where
        F: Fn(&Value, &Metadata) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            ty,
            read: Read::Indirect(Shared::new(getter)),
        }
    }
}

impl AccessorMember for PropertyAccessor {
    fn name(&self) -> &str {
        &self.name
    }

    fn ty(&self) -> &Type {
        &self.ty
    }

    fn direct_getter(&self) -> Option<Getter> {
        match &self.read {
            Read::Direct(getter) => Some(Shared::clone(getter)),
            Read::Indirect(_) => None,
        }
    }

    fn get_value(&self, target: &Value, metadata: &Metadata) -> Result<Value, MemberError> {
        match &self.read {
            Read::Direct(getter) => getter(target),
            Read::Indirect(getter) => getter(target, metadata),
        }
    }
}

/// Method backed by a Rust closure.
#[derive(Clone)]
pub struct DelegateMethod {
    name: SmolStr,
    return_type: Type,
    parameters: Vec<ParameterInfo>,
    call: Shared<MethodFn>,
    generic: Option<(usize, Shared<GenericFactory>)>,
}

impl DelegateMethod {
    pub fn new<F>(
        name: impl Into<SmolStr>,
        parameters: Vec<ParameterInfo>,
        return_type: Type,
        call: F,
    ) -> Self
    where
        F: Fn(&Value, &[Value], &Metadata) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            return_type,
            parameters,
            call: Shared::new(call),
            generic: None,
        }
    }

    /// Marks the method generic over `arity` type arguments. `factory`
    /// produces the closed method.
    pub fn generic<F>(mut self, arity: usize, factory: F) -> Self
    where
        F: Fn(&[Type]) -> Result<Shared<dyn MethodMember>, MemberError> + Send + Sync + 'static,
    {
        self.generic = Some((arity, Shared::new(factory)));
        self
    }
}

impl MethodMember for DelegateMethod {
    fn name(&self) -> &str {
        &self.name
    }

    fn return_type(&self) -> &Type {
        &self.return_type
    }

    fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    fn generic_arity(&self) -> usize {
        self.generic.as_ref().map(|(arity, _)| *arity).unwrap_or(0)
    }

    fn make_generic(&self, type_args: &[Type]) -> Result<Shared<dyn MethodMember>, MemberError> {
        match &self.generic {
            Some((arity, factory)) if *arity == type_args.len() => factory(type_args),
            _ => Err(MemberError::GenericArity(self.name.clone(), type_args.len())),
        }
    }

    fn invoke(
        &self,
        target: &Value,
        args: &[Value],
        metadata: &Metadata,
    ) -> Result<Value, MemberError> {
        (self.call)(target, args, metadata)
    }
}

type Key = (Type, MemberFlags, SmolStr);

/// In-memory [`MemberManager`] populated by the host.
///
/// Members registered on any array type are visible on every array type, and
/// members of `T` are visible on `T?`.
#[derive(Default)]
pub struct MemberRegistry {
    members: RwLock<FxHashMap<Key, Vec<Member>>>,
}

impl std::fmt::Debug for MemberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self.members.read().map(|m| m.len()).unwrap_or_default();
        f.debug_struct("MemberRegistry").field("members", &len).finish()
    }
}

fn normalize(owner: &Type) -> Type {
    match owner.underlying() {
        Type::Array(_) => Type::array(Type::Object),
        ty => ty.clone(),
    }
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the string and array members every host expects.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        register_string_members(&registry);
        register_array_members(&registry);
        registry
    }

    pub fn register(&self, owner: &Type, flags: MemberFlags, member: Member) {
        let key = (normalize(owner), flags, SmolStr::new(member.name()));
        if let Ok(mut members) = self.members.write() {
            members.entry(key).or_default().push(member);
        }
    }

    pub fn register_accessor(&self, owner: &Type, flags: MemberFlags, accessor: impl AccessorMember + 'static) {
        self.register(owner, flags, Member::Accessor(Shared::new(accessor)));
    }

    pub fn register_method(&self, owner: &Type, flags: MemberFlags, method: impl MethodMember + 'static) {
        self.register(owner, flags, Member::Method(Shared::new(method)));
    }

    pub fn property<F>(&self, owner: &Type, name: &str, ty: Type, getter: F)
    where
        F: Fn(&Value) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.register_accessor(owner, MemberFlags::INSTANCE, PropertyAccessor::new(name, ty, getter));
    }

    pub fn static_property<F>(&self, owner: &Type, name: &str, ty: Type, getter: F)
    where
        F: Fn(&Value) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.register_accessor(owner, MemberFlags::STATIC, PropertyAccessor::new(name, ty, getter));
    }

    pub fn method<F>(
        &self,
        owner: &Type,
        name: &str,
        parameters: Vec<ParameterInfo>,
        return_type: Type,
        call: F,
    ) where
        F: Fn(&Value, &[Value], &Metadata) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.register_method(
            owner,
            MemberFlags::INSTANCE,
            DelegateMethod::new(name, parameters, return_type, call),
        );
    }

    pub fn static_method<F>(
        &self,
        owner: &Type,
        name: &str,
        parameters: Vec<ParameterInfo>,
        return_type: Type,
        call: F,
    ) where
        F: Fn(&Value, &[Value], &Metadata) -> Result<Value, MemberError> + Send + Sync + 'static,
    {
        self.register_method(
            owner,
            MemberFlags::STATIC,
            DelegateMethod::new(name, parameters, return_type, call),
        );
    }
}

impl MemberManager for MemberRegistry {
    fn try_get_members(
        &self,
        owner: &Type,
        kind: MemberKind,
        flags: MemberFlags,
        name: &str,
        _metadata: &Metadata,
    ) -> Vec<Member> {
        let Ok(members) = self.members.read() else {
            return Vec::new();
        };
        let owner = normalize(owner);

        flags
            .iter()
            .filter_map(|flag| members.get(&(owner.clone(), flag, SmolStr::new(name))))
            .flatten()
            .filter(|member| match member {
                Member::Accessor(_) => kind.contains(MemberKind::ACCESSOR),
                Member::Method(_) => kind.contains(MemberKind::METHOD),
            })
            .cloned()
            .collect_vec()
    }
}

fn invalid_target(member: &str, target: &Value) -> MemberError {
    MemberError::InvalidTarget(target.type_name(), SmolStr::new(member))
}

fn string_target<'a>(member: &str, target: &'a Value) -> Result<&'a str, MemberError> {
    target.as_str().ok_or_else(|| invalid_target(member, target))
}

fn int_arg(member: &str, args: &[Value], index: usize) -> Result<i32, MemberError> {
    args.get(index)
        .and_then(Value::as_int)
        .ok_or_else(|| MemberError::Failed(format!("\"{}\" expects an int argument at {}", member, index)))
}

fn register_string_members(registry: &MemberRegistry) {
    registry.property(&Type::String, "Length", Type::Int, |target| {
        let s = string_target("Length", target)?;
        Ok(Value::Int(s.chars().count() as i32))
    });

    registry.method(
        &Type::String,
        INDEXER_GETTER_NAME,
        vec![ParameterInfo::new("index", Type::Int)],
        Type::String,
        |target, args, _| {
            let s = string_target(INDEXER_GETTER_NAME, target)?;
            let index = int_arg(INDEXER_GETTER_NAME, args, 0)?;
            usize::try_from(index)
                .ok()
                .and_then(|index| s.chars().nth(index))
                .map(|c| Value::String(SmolStr::new(c.to_string())))
                .ok_or_else(|| MemberError::Failed(format!("Index {} is out of range", index)))
        },
    );

    registry.method(&Type::String, "ToUpper", Vec::new(), Type::String, |target, _, _| {
        Ok(Value::from(string_target("ToUpper", target)?.to_uppercase()))
    });

    registry.method(&Type::String, "ToLower", Vec::new(), Type::String, |target, _, _| {
        Ok(Value::from(string_target("ToLower", target)?.to_lowercase()))
    });

    registry.method(
        &Type::String,
        "Contains",
        vec![ParameterInfo::new("value", Type::String)],
        Type::Bool,
        |target, args, _| {
            let s = string_target("Contains", target)?;
            match args.first() {
                Some(Value::String(needle)) => Ok(Value::Bool(s.contains(needle.as_str()))),
                _ => Err(MemberError::Failed("\"Contains\" expects a string argument".to_string())),
            }
        },
    );

    registry.method(
        &Type::String,
        "Substring",
        vec![
            ParameterInfo::new("start", Type::Int),
            ParameterInfo::optional("length", Type::Int, -1),
        ],
        Type::String,
        |target, args, _| {
            let s = string_target("Substring", target)?;
            let start = int_arg("Substring", args, 0)?;
            let length = int_arg("Substring", args, 1)?;
            let chars = s.chars().skip(start.max(0) as usize);
            let result: String = if length < 0 {
                chars.collect()
            } else {
                chars.take(length as usize).collect()
            };
            Ok(Value::from(result))
        },
    );

    registry.static_method(
        &Type::String,
        "Concat",
        vec![ParameterInfo::variadic("values", Type::Object)],
        Type::String,
        |_, args, _| match args.first() {
            Some(Value::Array(values)) => Ok(Value::from(values.iter().join(""))),
            _ => Ok(Value::from(args.iter().join(""))),
        },
    );
}

fn register_array_members(registry: &MemberRegistry) {
    let array = Type::array(Type::Object);

    registry.property(&array, "Length", Type::Int, |target| match target {
        Value::Array(items) => Ok(Value::Int(items.len() as i32)),
        v => Err(invalid_target("Length", v)),
    });

    registry.register_method(
        &array,
        MemberFlags::INSTANCE,
        DelegateMethod::new("OfType", Vec::new(), Type::array(Type::Object), |target, _, _| {
            Err(invalid_target("OfType", target))
        })
        .generic(1, |type_args| {
            let element = type_args[0].clone();
            let filter = element.clone();
            Ok(Shared::new(DelegateMethod::new(
                "OfType",
                Vec::new(),
                Type::array(element),
                move |target, _, _| match target {
                    Value::Array(items) => Ok(Value::array(
                        items
                            .iter()
                            .filter(|item| !item.is_null() && item.is_instance_of(&filter))
                            .cloned()
                            .collect(),
                    )),
                    v => Err(invalid_target("OfType", v)),
                },
            )) as Shared<dyn MethodMember>)
        }),
    );
}
