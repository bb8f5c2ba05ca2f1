use std::sync::Arc;

use log::debug;

use crate::{
    environment::Env,
    error::{HostError, RegistryError},
    output::Channel,
    registry::{Arity, FunctionRegistry},
    value::Value,
};

pub const MT_VM_VERSION: f64 = 1.0;

pub fn init_globals(env: &mut Env) {
    env.set_constant("MT_VM_VERSION", Value::Number(MT_VM_VERSION));
}

pub fn init_io(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    // print(args...)
    registry.register_fn("print", Arity::at_least(0), |ctx, args| {
        let line: Vec<String> = args.iter().map(Value::to_string).collect();
        ctx.emit(Channel::Chat, line.join(" "));
        Ok(Value::Undefined)
    })?;
    // _vm_debug(value)
    registry.register_fn("_vm_debug", Arity::exact(1), |ctx, mut args| {
        let value = args.remove(0);
        debug!("Script {}: {value:?}", ctx.function);
        ctx.emit(Channel::Debug, value.to_string());
        Ok(value)
    })
}

pub fn init_collections(registry: &mut FunctionRegistry) -> Result<(), RegistryError> {
    // len(value)
    registry.register_fn("len", Arity::exact(1), |_, args| match &args[0] {
        Value::Str(s) => Ok(Value::Number(s.chars().count() as f64)),
        Value::List(items) => Ok(Value::Number(items.len() as f64)),
        Value::Map(map) => Ok(Value::Number(map.len() as f64)),
        other => Err(HostError::type_mismatch(format!(
            "expected a string, list or map, found {}",
            other.describe()
        ))),
    })
}

/// A frozen registry holding every built-in host function.
pub fn registry() -> Result<Arc<FunctionRegistry>, RegistryError> {
    let mut registry = FunctionRegistry::new();
    init_io(&mut registry)?;
    init_collections(&mut registry)?;
    Ok(registry.freeze())
}
