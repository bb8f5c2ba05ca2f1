use std::{cell::RefCell, cmp::Ordering, rc::Rc, sync::Arc};

use indexmap::IndexMap;
use log::debug;
use mtscript_syntax::{
    ast::{Ast, BinOp, Expr, ExprKind, Ident, LogicalOp, Stmt, StmtKind, UnaryOp},
    error::{Diagnostic, Frame},
    token::Span,
};

use crate::{
    config::EvalConfig,
    environment::Env,
    error::{runtime_error, ErrorMsg, Exception},
    output::OutputSink,
    registry::{Callable, FunctionRegistry, ScriptFunction},
    value::Value,
};

/// Tree-walking evaluator. Top-level statements run directly in the
/// global scope, so state persists between `evaluate` calls.
pub struct Interpreter<'o> {
    globals: Rc<RefCell<Env>>,
    env: Rc<RefCell<Env>>,
    registry: Arc<FunctionRegistry>,
    config: EvalConfig,
    output: &'o mut dyn OutputSink,
    steps: usize,
    depth: usize,
    frames: Vec<Frame>,
}

impl<'o> Interpreter<'o> {
    pub fn new(
        globals: Env,
        registry: Arc<FunctionRegistry>,
        config: EvalConfig,
        output: &'o mut dyn OutputSink,
    ) -> Self {
        let globals = Rc::new(RefCell::new(globals));
        Self {
            env: Rc::clone(&globals),
            globals,
            registry,
            config,
            output,
            steps: 0,
            depth: 0,
            frames: Vec::default(),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Read back a global binding.
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.borrow().get(name).ok()
    }

    pub fn set_global(&mut self, name: &str, value: Value) {
        self.globals.borrow_mut().set(name, value);
    }

    pub(crate) fn output(&mut self) -> &mut dyn OutputSink {
        &mut *self.output
    }

    /// Run a script to completion, yielding the value of its last
    /// statement. The step budget starts afresh on every call.
    pub fn evaluate(&mut self, ast: &Ast) -> Result<Value, Diagnostic> {
        self.steps = 0;
        self.depth = 0;
        self.frames.clear();
        self.env = Rc::clone(&self.globals);
        self.interpret_all(&ast.body).map_err(|e| {
            let e = e.into_diagnostic();
            if e.trace.is_none() {
                e.with_trace(Vec::default())
            } else {
                e
            }
        })
    }

    fn interpret_all(&mut self, stmts: &[Stmt]) -> Result<Value, Exception> {
        let mut value = Value::Undefined;
        for stmt in stmts {
            value = self.interpret_stmt(stmt)?;
        }
        Ok(value)
    }

    /// Charge one step and one level of nesting for the node at `span`.
    /// Every successful call is paired with a `self.depth -= 1`.
    fn enter(&mut self, span: Span) -> Result<(), Exception> {
        self.steps += 1;
        if self.steps > self.config.max_steps {
            return Err(runtime_error(
                ErrorMsg::StepLimit,
                format!("{} steps", self.config.max_steps),
                span,
            ));
        }
        if self.depth >= self.config.max_nesting {
            return Err(runtime_error(
                ErrorMsg::NestingLimit,
                format!("{} levels", self.config.max_nesting),
                span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    /// Run `f` with `scope` as the innermost scope, restoring the
    /// previous one afterwards whatever the outcome.
    fn with_scope<T>(&mut self, scope: Rc<RefCell<Env>>, f: impl FnOnce(&mut Self) -> T) -> T {
        let previous = std::mem::replace(&mut self.env, scope);
        let result = f(self);
        self.env = previous;
        result
    }

    fn interpret_stmt(&mut self, stmt: &Stmt) -> Result<Value, Exception> {
        self.enter(stmt.span)?;
        let result = self.interpret_stmt_kind(stmt);
        self.depth -= 1;
        result
    }

    fn interpret_stmt_kind(&mut self, stmt: &Stmt) -> Result<Value, Exception> {
        match &stmt.kind {
            StmtKind::Expr(expr) => self.interpret_expr(expr),
            StmtKind::Var { name, init } => self.interpret_var_stmt(name, init.as_ref()),
            StmtKind::Block(body) => self.interpret_block(body),
            StmtKind::If {
                condition,
                then,
                otherwise,
            } => self.interpret_if_stmt(condition, then, otherwise.as_deref()),
            StmtKind::While { condition, body } => self.interpret_while_stmt(condition, body),
            StmtKind::For {
                init,
                condition,
                update,
                body,
            } => self.interpret_for_stmt(
                init.as_deref(),
                condition.as_ref(),
                update.as_ref(),
                body,
            ),
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.interpret_expr(expr)?,
                    None => Value::Undefined,
                };
                Err(Exception::Return(value, stmt.span))
            }
            StmtKind::Break => Err(Exception::Break(stmt.span)),
            StmtKind::Continue => Err(Exception::Continue(stmt.span)),
            StmtKind::Function(def) => {
                let function = ScriptFunction::new(Rc::clone(def), Rc::downgrade(&self.env));
                self.env.borrow_mut().define_function(Rc::new(function));
                Ok(Value::Undefined)
            }
        }
    }

    fn interpret_var_stmt(&mut self, name: &Ident, init: Option<&Expr>) -> Result<Value, Exception> {
        let value = match init {
            Some(expr) => self.interpret_expr(expr)?,
            None => Value::Undefined,
        };
        self.env
            .borrow_mut()
            .define(&name.name, value)
            .map_err(|msg| runtime_error(msg, format!("'{}'", name.name), name.span))?;
        Ok(Value::Undefined)
    }

    fn interpret_block(&mut self, body: &[Stmt]) -> Result<Value, Exception> {
        let scope = Env::with_parent(Rc::clone(&self.env));
        self.with_scope(scope, |i| i.interpret_all(body))
    }

    fn interpret_if_stmt(
        &mut self,
        condition: &Expr,
        then: &Stmt,
        otherwise: Option<&Stmt>,
    ) -> Result<Value, Exception> {
        if self.interpret_expr(condition)?.to_bool() {
            self.interpret_stmt(then)
        } else if let Some(otherwise) = otherwise {
            self.interpret_stmt(otherwise)
        } else {
            Ok(Value::Undefined)
        }
    }

    fn interpret_while_stmt(&mut self, condition: &Expr, body: &Stmt) -> Result<Value, Exception> {
        while self.interpret_expr(condition)?.to_bool() {
            match self.interpret_stmt(body) {
                Ok(_) | Err(Exception::Continue(_)) => (),
                Err(Exception::Break(_)) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(Value::Undefined)
    }

    fn interpret_for_stmt(
        &mut self,
        init: Option<&Stmt>,
        condition: Option<&Expr>,
        update: Option<&Expr>,
        body: &Stmt,
    ) -> Result<Value, Exception> {
        // The loop variable lives in a scope of its own
        let scope = Env::with_parent(Rc::clone(&self.env));
        self.with_scope(scope, |i| -> Result<Value, Exception> {
            if let Some(init) = init {
                i.interpret_stmt(init)?;
            }
            loop {
                if let Some(condition) = condition {
                    if !i.interpret_expr(condition)?.to_bool() {
                        break;
                    }
                }
                match i.interpret_stmt(body) {
                    Ok(_) | Err(Exception::Continue(_)) => (),
                    Err(Exception::Break(_)) => break,
                    Err(e) => return Err(e),
                }
                if let Some(update) = update {
                    i.interpret_expr(update)?;
                }
            }
            Ok(Value::Undefined)
        })
    }

    fn interpret_expr(&mut self, expr: &Expr) -> Result<Value, Exception> {
        self.enter(expr.span)?;
        let result = self.interpret_expr_kind(expr);
        self.depth -= 1;
        result
    }

    fn interpret_expr_kind(&mut self, expr: &Expr) -> Result<Value, Exception> {
        match &expr.kind {
            ExprKind::Literal(l) => Ok(Value::from(l)),
            ExprKind::Variable(name) => self.lookup(name, expr.span),
            ExprKind::List(items) => {
                let items = items
                    .iter()
                    .map(|item| self.interpret_expr(item))
                    .collect::<Result<Vec<Value>, Exception>>()?;
                Ok(Value::from(items))
            }
            ExprKind::Map(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    let value = self.interpret_expr(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::from(map))
            }
            ExprKind::Unary { op, expr: operand } => {
                let value = self.interpret_expr(operand)?;
                interpret_unary(*op, value, expr.span)
            }
            ExprKind::Binary { lhs, op, rhs } => {
                let lhs = self.interpret_expr(lhs)?;
                let rhs = self.interpret_expr(rhs)?;
                interpret_binary(*op, lhs, rhs, expr.span)
            }
            ExprKind::Logical { lhs, op, rhs } => self.interpret_logical(lhs, *op, rhs),
            ExprKind::Assign { target, op, value } => {
                self.interpret_assignment(target, *op, value, expr.span)
            }
            ExprKind::Call { callee, args } => self.interpret_call(callee, args, expr.span),
            ExprKind::Index { target, index } => {
                let target = self.interpret_expr(target)?;
                let key = self.interpret_expr(index)?;
                read_element(&target, &key, index.span)
            }
            ExprKind::Member { target, field } => {
                let target = self.interpret_expr(target)?;
                read_element(&target, &Value::Str(field.name.clone()), field.span)
            }
        }
    }

    fn lookup(&self, name: &str, span: Span) -> Result<Value, Exception> {
        self.env
            .borrow()
            .get(name)
            .map_err(|msg| runtime_error(msg, format!("'{name}'"), span))
    }

    /// `&&` and `||` yield whichever operand decided the outcome.
    fn interpret_logical(&mut self, lhs: &Expr, op: LogicalOp, rhs: &Expr) -> Result<Value, Exception> {
        let lhs = self.interpret_expr(lhs)?;
        let decided = match op {
            LogicalOp::And => !lhs.to_bool(),
            LogicalOp::Or => lhs.to_bool(),
        };
        if decided {
            Ok(lhs)
        } else {
            self.interpret_expr(rhs)
        }
    }

    fn interpret_assignment(
        &mut self,
        target: &Expr,
        op: Option<BinOp>,
        value: &Expr,
        span: Span,
    ) -> Result<Value, Exception> {
        let (root, keys) = self.resolve_place(target)?;
        let value = self.interpret_expr(value)?;

        if keys.is_empty() {
            let value = match op {
                Some(op) => interpret_binary(op, self.lookup(&root.name, root.span)?, value, span)?,
                None => value,
            };
            self.env
                .borrow_mut()
                .assign(&root.name, value.clone())
                .map_err(|msg| runtime_error(msg, format!("'{}'", root.name), root.span))?;
            return Ok(value);
        }

        // Update a copy of the container and store it back. Shared lists
        // and maps are cloned on the first write.
        let mut container = self.lookup(&root.name, root.span)?;
        let value = write_element(&mut container, &keys, op, value, span)?;
        self.env
            .borrow_mut()
            .assign(&root.name, container)
            .map_err(|msg| runtime_error(msg, format!("'{}'", root.name), root.span))?;
        Ok(value)
    }

    /// Split an assignment target into the variable it is rooted at and
    /// the keys leading to the assigned element. Each key is evaluated
    /// exactly once, outermost first.
    fn resolve_place<'a>(
        &mut self,
        target: &'a Expr,
    ) -> Result<(Place<'a>, Vec<(Value, Span)>), Exception> {
        match &target.kind {
            ExprKind::Variable(name) => Ok((
                Place {
                    name,
                    span: target.span,
                },
                Vec::default(),
            )),
            ExprKind::Index {
                target: inner,
                index,
            } => {
                let (root, mut keys) = self.resolve_place(inner)?;
                keys.push((self.interpret_expr(index)?, index.span));
                Ok((root, keys))
            }
            ExprKind::Member {
                target: inner,
                field,
            } => {
                let (root, mut keys) = self.resolve_place(inner)?;
                keys.push((Value::Str(field.name.clone()), field.span));
                Ok((root, keys))
            }
            _ => Err(runtime_error(
                ErrorMsg::InvalidTarget,
                "the result of an expression",
                target.span,
            )),
        }
    }

    fn interpret_call(&mut self, callee: &Ident, args: &[Expr], span: Span) -> Result<Value, Exception> {
        // Script functions shadow host functions of the same name
        let script = self.env.borrow().get_function(&callee.name);
        let registry = Arc::clone(&self.registry);
        let function: &dyn Callable = match (&script, registry.resolve(&callee.name)) {
            (Some(f), _) => &**f,
            (None, Some(f)) => f,
            (None, None) => {
                return Err(runtime_error(
                    ErrorMsg::UnknownFunction,
                    format!("'{}'", callee.name),
                    callee.span,
                ))
            }
        };

        let arity = function.arity();
        if !arity.accepts(args.len()) {
            return Err(runtime_error(
                ErrorMsg::WrongArity,
                format!("'{}': expected {arity}, found {}", callee.name, args.len()),
                span,
            ));
        }
        let args = args
            .iter()
            .map(|arg| self.interpret_expr(arg))
            .collect::<Result<Vec<Value>, Exception>>()?;

        if self.frames.len() >= self.config.max_call_depth {
            return Err(runtime_error(
                ErrorMsg::DepthLimit,
                format!("{} frames", self.config.max_call_depth),
                span,
            ));
        }
        debug!("Call {} with {args:?}", callee.name);
        self.frames.push(Frame {
            function: callee.name.clone(),
            call_site: span,
        });
        let result = match function.call(self, args, span) {
            // Record the stack as the error leaves its innermost frame
            Err(Exception::Error(e)) if e.trace.is_none() => {
                let trace = self.frames.iter().rev().cloned().collect();
                Err(Exception::Error(e.with_trace(trace)))
            }
            result => result,
        };
        self.frames.pop();
        result
    }

    /// Run a script function body in a fresh scope chained to `closure`.
    pub(crate) fn call_script(
        &mut self,
        function: &ScriptFunction,
        closure: Rc<RefCell<Env>>,
        args: Vec<Value>,
    ) -> Result<Value, Exception> {
        let scope = Env::with_parent(closure);
        for (param, arg) in function.def.params.iter().zip(args) {
            scope.borrow_mut().set(&param.name, arg);
        }
        match self.with_scope(scope, |i| i.interpret_all(&function.def.body)) {
            Ok(value) | Err(Exception::Return(value, _)) => Ok(value),
            Err(e) => Err(Exception::Error(e.into_diagnostic())),
        }
    }
}

/// The variable an assignment target is rooted at.
struct Place<'a> {
    name: &'a str,
    span: Span,
}

fn to_number(value: &Value, span: Span) -> Result<f64, Exception> {
    value
        .to_number()
        .ok_or_else(|| runtime_error(ErrorMsg::ExpectedNumber, value.describe(), span))
}

fn interpret_unary(op: UnaryOp, value: Value, span: Span) -> Result<Value, Exception> {
    match op {
        UnaryOp::Minus => Ok(Value::Number(-to_number(&value, span)?)),
        UnaryOp::Bang => Ok(Value::Boolean(!value.to_bool())),
    }
}

fn interpret_binary(op: BinOp, lhs: Value, rhs: Value, span: Span) -> Result<Value, Exception> {
    let value = match op {
        BinOp::Plus => match (lhs, rhs) {
            (Value::List(a), Value::List(b)) => {
                let mut items = Vec::with_capacity(a.len() + b.len());
                items.extend(a.iter().cloned());
                items.extend(b.iter().cloned());
                Value::from(items)
            }
            (lhs @ Value::Str(_), rhs) | (lhs, rhs @ Value::Str(_)) => {
                Value::Str(format!("{lhs}{rhs}"))
            }
            (lhs, rhs) => Value::Number(to_number(&lhs, span)? + to_number(&rhs, span)?),
        },
        BinOp::Minus => Value::Number(to_number(&lhs, span)? - to_number(&rhs, span)?),
        BinOp::Star => Value::Number(to_number(&lhs, span)? * to_number(&rhs, span)?),
        BinOp::Slash | BinOp::Modulo => {
            let (a, b) = (to_number(&lhs, span)?, to_number(&rhs, span)?);
            if b == 0.0 {
                return Err(runtime_error(ErrorMsg::DivisionByZero, format!("'{op}'"), span));
            }
            Value::Number(if op == BinOp::Slash { a / b } else { a % b })
        }
        BinOp::EqualEqual => Value::Boolean(lhs.equals(&rhs)),
        BinOp::BangEqual => Value::Boolean(!lhs.equals(&rhs)),
        BinOp::Greater | BinOp::GreaterEqual | BinOp::Less | BinOp::LessEqual => {
            let ordering = match (&lhs, &rhs) {
                (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
                _ => to_number(&lhs, span)?.partial_cmp(&to_number(&rhs, span)?),
            };
            // Comparisons involving NaN are all false
            Value::Boolean(match ordering {
                Some(ordering) => match op {
                    BinOp::Greater => ordering == Ordering::Greater,
                    BinOp::GreaterEqual => ordering != Ordering::Less,
                    BinOp::Less => ordering == Ordering::Less,
                    _ => ordering != Ordering::Greater,
                },
                None => false,
            })
        }
    };
    Ok(value)
}

fn list_index(key: &Value, span: Span) -> Result<f64, Exception> {
    match key {
        Value::Number(n) if n.fract() == 0.0 => Ok(*n),
        other => Err(runtime_error(ErrorMsg::NonIntegerIndex, other.describe(), span)),
    }
}

/// `target[key]`. Missing elements read as undefined.
fn read_element(target: &Value, key: &Value, span: Span) -> Result<Value, Exception> {
    match target {
        Value::List(items) => {
            let index = list_index(key, span)?;
            if index < 0.0 {
                return Ok(Value::Undefined);
            }
            Ok(items.get(index as usize).cloned().unwrap_or_default())
        }
        Value::Map(map) => Ok(map.get(&key.to_string()).cloned().unwrap_or_default()),
        other => Err(runtime_error(ErrorMsg::NotIndexable, other.describe(), span)),
    }
}

/// Store `value` at the end of `keys` inside `container`, applying the
/// compound operator to the old element if there is one. Writing one
/// past the end of a list appends to it.
fn write_element(
    container: &mut Value,
    keys: &[(Value, Span)],
    op: Option<BinOp>,
    value: Value,
    span: Span,
) -> Result<Value, Exception> {
    let Some(((key, key_span), rest)) = keys.split_first() else {
        let value = match op {
            Some(op) => interpret_binary(op, std::mem::take(container), value, span)?,
            None => value,
        };
        *container = value.clone();
        return Ok(value);
    };
    let slot = match container {
        Value::List(items) => {
            let index = list_index(key, *key_span)?;
            let len = items.len();
            if index < 0.0 || index > len as f64 {
                return Err(runtime_error(
                    ErrorMsg::IndexOutOfRange,
                    format!("{} (length {len})", Value::Number(index)),
                    *key_span,
                ));
            }
            let items = Rc::make_mut(items);
            if index as usize == len {
                items.push(Value::Undefined);
            }
            &mut items[index as usize]
        }
        Value::Map(map) => Rc::make_mut(map)
            .entry(key.to_string())
            .or_insert(Value::Undefined),
        other => {
            return Err(runtime_error(ErrorMsg::NotIndexable, other.describe(), *key_span));
        }
    };
    write_element(slot, rest, op, value, span)
}
