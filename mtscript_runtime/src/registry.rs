use std::{
    cell::RefCell,
    collections::HashMap,
    fmt::{Debug, Display},
    rc::{Rc, Weak},
    sync::Arc,
};

use log::debug;
use mtscript_syntax::{ast::FunctionDef, error::Diagnostic, token::Span};

use crate::{
    environment::Env,
    error::{make_with, ErrorMsg, Exception, HostError, RegistryError},
    interpret::Interpreter,
    output::{Channel, OutputEvent, OutputSink},
    value::Value,
};

/// Accepted argument counts. `max: None` means variadic.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    pub max: Option<usize>,
}

impl Arity {
    pub fn exact(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

impl Display for Arity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{max}"),
            Some(max) => write!(f, "{} to {max}", self.min),
            None => write!(f, "at least {}", self.min),
        }
    }
}

pub trait Callable {
    fn name(&self) -> &str;
    fn arity(&self) -> Arity;
    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        call_site: Span,
    ) -> Result<Value, Exception>;
}

/// A function defined by a script, bound to the scope its definition
/// ran in. The scope owns the function, so the link back is weak.
pub struct ScriptFunction {
    pub def: Rc<FunctionDef>,
    pub closure: Weak<RefCell<Env>>,
}

impl ScriptFunction {
    pub fn new(def: Rc<FunctionDef>, closure: Weak<RefCell<Env>>) -> Self {
        Self { def, closure }
    }
}

impl Debug for ScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("name", &self.def.name.name)
            .field("params", &self.def.params.len())
            .finish()
    }
}

impl Display for ScriptFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<&str> = self.def.params.iter().map(|p| p.name.as_str()).collect();
        write!(f, "function {}({})", self.def.name.name, params.join(", "))
    }
}

impl Callable for ScriptFunction {
    fn name(&self) -> &str {
        &self.def.name.name
    }

    fn arity(&self) -> Arity {
        Arity::exact(self.def.params.len())
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        call_site: Span,
    ) -> Result<Value, Exception> {
        let closure = self.closure.upgrade().ok_or_else(|| {
            Exception::Error(make_with(
                ErrorMsg::DeadScope,
                format!("'{}'", self.name()),
                call_site,
            ))
        })?;
        interpreter.call_script(self, closure, args)
    }
}

/// Native body of a host function.
pub type NativeBody = dyn Fn(&mut CallContext, Vec<Value>) -> Result<Value, HostError> + Send + Sync;

/// What a host function can reach while it runs.
pub struct CallContext<'a> {
    pub function: &'a str,
    output: &'a mut dyn OutputSink,
}

impl<'a> CallContext<'a> {
    pub fn new(function: &'a str, output: &'a mut dyn OutputSink) -> Self {
        Self { function, output }
    }

    pub fn emit(&mut self, channel: Channel, text: impl Into<String>) {
        self.output.emit(OutputEvent {
            channel,
            text: text.into(),
        });
    }

    pub fn output(&mut self) -> &mut dyn OutputSink {
        &mut *self.output
    }
}

/// A capability the host exposes to scripts.
#[derive(Clone)]
pub struct HostFunction {
    pub name: String,
    pub arity: Arity,
    body: Arc<NativeBody>,
}

impl HostFunction {
    pub fn new<F>(name: impl Into<String>, arity: Arity, body: F) -> Self
    where
        F: Fn(&mut CallContext, Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            arity,
            body: Arc::new(body),
        }
    }

    /// Run the body directly, outside of any script.
    pub fn invoke(&self, ctx: &mut CallContext, args: Vec<Value>) -> Result<Value, HostError> {
        (self.body)(ctx, args)
    }
}

impl PartialEq for HostFunction {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.arity == other.arity
    }
}

impl Debug for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFunction")
            .field("name", &self.name)
            .field("arity", &self.arity)
            .finish()
    }
}

impl Display for HostFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "native function {}/{}", self.name, self.arity)
    }
}

impl Callable for HostFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn call(
        &self,
        interpreter: &mut Interpreter,
        args: Vec<Value>,
        call_site: Span,
    ) -> Result<Value, Exception> {
        let mut ctx = CallContext::new(&self.name, interpreter.output());
        self.invoke(&mut ctx, args).map_err(|e| {
            Exception::Error(Diagnostic::error(
                e.kind,
                format!("{}: {}", self.name, e.message),
                call_site,
            ))
        })
    }
}

/// Host functions by name. Built once, then frozen and shared read-only
/// by every evaluation, across threads if need be.
#[derive(Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, HostFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: HostFunction) -> Result<(), RegistryError> {
        if self.functions.contains_key(&function.name) {
            return Err(RegistryError::Duplicate(function.name));
        }
        debug!("Register {function}");
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn register_fn<F>(&mut self, name: &str, arity: Arity, body: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut CallContext, Vec<Value>) -> Result<Value, HostError> + Send + Sync + 'static,
    {
        self.register(HostFunction::new(name, arity, body))
    }

    pub fn resolve(&self, name: &str) -> Option<&HostFunction> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Discard;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn registry_is_shareable() {
        assert_send_sync::<FunctionRegistry>();
        assert_send_sync::<Arc<FunctionRegistry>>();
    }

    #[test]
    fn arity() {
        assert!(Arity::exact(2).accepts(2));
        assert!(!Arity::exact(2).accepts(3));
        assert!(Arity::range(1, 2).accepts(1));
        assert!(!Arity::range(1, 2).accepts(0));
        assert!(Arity::at_least(0).accepts(100));
        assert_eq!(Arity::exact(2).to_string(), "2");
        assert_eq!(Arity::range(0, 2).to_string(), "0 to 2");
        assert_eq!(Arity::at_least(1).to_string(), "at least 1");
    }

    #[test]
    fn duplicate_registration() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_fn("foo", Arity::exact(0), |_, _| Ok(Value::Undefined))
            .unwrap();
        assert_eq!(
            registry.register_fn("foo", Arity::exact(1), |_, _| Ok(Value::Undefined)),
            Err(RegistryError::Duplicate("foo".to_string()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.resolve("foo").unwrap().arity, Arity::exact(0));
    }

    #[test]
    fn resolve_and_invoke() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_fn("double", Arity::exact(1), |_, args| {
                args[0]
                    .to_number()
                    .map(|n| Value::Number(n * 2.0))
                    .ok_or_else(|| HostError::type_mismatch("expected a number"))
            })
            .unwrap();
        let registry = registry.freeze();
        assert!(registry.resolve("missing").is_none());
        let double = registry.resolve("double").unwrap();
        let mut sink = Discard;
        let mut ctx = CallContext::new("double", &mut sink);
        assert_eq!(double.invoke(&mut ctx, vec![Value::from(4.0)]), Ok(Value::from(8.0)));
        assert!(double.invoke(&mut ctx, vec![Value::from("x")]).is_err());
    }

    #[test]
    fn host_functions_see_their_context() {
        let mut registry = FunctionRegistry::new();
        registry
            .register_fn("whoami", Arity::exact(0), |ctx, _| {
                ctx.emit(Channel::Debug, "called");
                Ok(Value::from(ctx.function))
            })
            .unwrap();
        let registry = registry.freeze();
        let whoami = registry.resolve("whoami").unwrap();
        assert_eq!(
            whoami,
            &HostFunction::new("whoami", Arity::exact(0), |_, _| Ok(Value::Undefined))
        );
        assert_ne!(
            whoami,
            &HostFunction::new("whoami", Arity::exact(1), |_, _| Ok(Value::Undefined))
        );

        let mut output: Vec<OutputEvent> = Vec::default();
        let mut ctx = CallContext::new("whoami", &mut output);
        assert_eq!(whoami.invoke(&mut ctx, vec![]), Ok(Value::from("whoami")));
        assert_eq!(
            output,
            vec![OutputEvent {
                channel: Channel::Debug,
                text: "called".to_string(),
            }]
        );
    }
}
