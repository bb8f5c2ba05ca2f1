use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use log::debug;

use crate::{
    error::ErrorMsg,
    registry::{Callable, ScriptFunction},
    stdlib,
    value::Value,
};

/// One lexical scope. The parent is fixed when the scope is created.
#[derive(Debug, Default)]
pub struct Env {
    values: HashMap<String, Value>,
    constants: HashSet<String>,
    functions: HashMap<String, Rc<ScriptFunction>>,
    parent: Option<Rc<RefCell<Env>>>,
}

impl Env {
    /// A root scope seeded with the built-in globals.
    pub fn new() -> Self {
        let mut env = Self::default();
        stdlib::init_globals(&mut env);
        env
    }

    pub fn with_parent(parent: Rc<RefCell<Env>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            ..Default::default()
        }))
    }

    /// Bind `name` in this scope unconditionally. Meant for hosts seeding
    /// globals; scripts go through [`Env::define`] and [`Env::assign`].
    pub fn set(&mut self, name: &str, value: Value) {
        debug!("Set {name} -> {value:?}");
        self.constants.remove(name);
        self.values.insert(name.to_string(), value);
    }

    pub fn set_constant(&mut self, name: &str, value: Value) {
        debug!("Set constant {name} -> {value:?}");
        self.values.insert(name.to_string(), value);
        self.constants.insert(name.to_string());
    }

    pub fn is_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }

    /// `var name = value`: always binds in this scope.
    pub fn define(&mut self, name: &str, value: Value) -> Result<(), ErrorMsg> {
        debug!("Define {name} -> {value:?}");
        if self.constants.contains(name) {
            return Err(ErrorMsg::ConstantAssign);
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, ErrorMsg> {
        debug!("Get {name}");
        if let Some(value) = self.values.get(name) {
            return Ok(value.clone());
        }
        if let Some(parent) = &self.parent {
            debug!("Get {name} from parent");
            return parent.borrow().get(name);
        }
        Err(ErrorMsg::UndefinedVar)
    }

    /// Mutate the nearest existing binding of `name`, or create one in
    /// this scope if there is none.
    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), ErrorMsg> {
        debug!("Assign {name} -> {value:?}");
        if let Some(value) = self.assign_existing(name, value)? {
            debug!("Define {name} in innermost scope");
            self.values.insert(name.to_string(), value);
        }
        Ok(())
    }

    /// Hands the value back if no scope in the chain binds `name`.
    fn assign_existing(&mut self, name: &str, value: Value) -> Result<Option<Value>, ErrorMsg> {
        if let Some(slot) = self.values.get_mut(name) {
            if self.constants.contains(name) {
                return Err(ErrorMsg::ConstantAssign);
            }
            *slot = value;
            return Ok(None);
        }
        match &self.parent {
            Some(parent) => parent.borrow_mut().assign_existing(name, value),
            None => Ok(Some(value)),
        }
    }

    pub fn define_function(&mut self, function: Rc<ScriptFunction>) {
        debug!("Define function {}", function.name());
        self.functions
            .insert(function.name().to_string(), function);
    }

    /// Innermost script function named `name`, if any.
    pub fn get_function(&self, name: &str) -> Option<Rc<ScriptFunction>> {
        if let Some(function) = self.functions.get(name) {
            return Some(Rc::clone(function));
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.borrow().get_function(name))
    }
}
