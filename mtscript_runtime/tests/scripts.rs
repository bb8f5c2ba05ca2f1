use std::{sync::Arc, thread};

use mtscript_runtime::{
    config::EvalConfig,
    environment::Env,
    error::HostError,
    interpret::Interpreter,
    output::{Channel, OutputEvent},
    registry::{Arity, FunctionRegistry},
    run, stdlib,
    value::Value,
};
use mtscript_syntax::{
    compile,
    error::{Diagnostic, ErrorKind},
    parse::ParseMode,
};

fn run_script(source: &str, config: EvalConfig) -> (Result<Value, Vec<Diagnostic>>, Vec<OutputEvent>) {
    let mut output: Vec<OutputEvent> = Vec::default();
    let result = {
        let registry = stdlib::registry().unwrap();
        let mut interpreter = Interpreter::new(Env::new(), registry, config, &mut output);
        run(source, &mut interpreter)
    };
    (result, output)
}

fn eval(source: &str) -> Value {
    run_script(source, EvalConfig::default()).0.unwrap()
}

fn eval_err(source: &str, config: EvalConfig) -> Diagnostic {
    let mut errors = run_script(source, config).0.unwrap_err();
    assert_eq!(errors.len(), 1);
    errors.remove(0)
}

#[test]
fn basic_scenarios() {
    assert_eq!(eval("1 + 2 * 3"), Value::Number(7.0));
    assert_eq!(eval("'a' + 'b'"), Value::from("ab"));
    assert_eq!(eval("x = 5; while (x > 0) { x = x - 1; }; x"), Value::Number(0.0));
    assert_eq!(
        eval_err("1 / 0", EvalConfig::default()).kind,
        ErrorKind::DivisionByZero
    );
}

#[test]
fn host_arity_is_checked() {
    let mut registry = FunctionRegistry::new();
    registry
        .register_fn("foo", Arity::range(0, 2), |_, args| Ok(Value::Number(args.len() as f64)))
        .unwrap();
    let registry = registry.freeze();
    let mut output: Vec<OutputEvent> = Vec::default();
    let mut interpreter =
        Interpreter::new(Env::new(), Arc::clone(&registry), EvalConfig::default(), &mut output);

    let errors = run("foo(1, 2, 3)", &mut interpreter).unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::ArityMismatch);
    assert_eq!(errors[0].message, "wrong number of arguments for 'foo': expected 0 to 2, found 3");
    assert_eq!(run("foo(1, 2)", &mut interpreter), Ok(Value::Number(2.0)));
}

#[test]
fn step_budget_stops_long_loops() {
    let config = EvalConfig::default().with_max_steps(100);
    let source = "i = 0; while (i < 10000) { i += 1; }";
    let e = eval_err(source, config);
    assert_eq!(e.kind, ErrorKind::RuntimeLimitExceeded);
    assert!(e.is_limit());
    assert!(eval_err("while (true) {}", config).is_limit());
}

#[test]
fn recursion_depth_is_bounded() {
    let config = EvalConfig::default().with_max_call_depth(32);
    let e = eval_err("function f(n) { return f(n + 1); } f(0)", config);
    assert_eq!(e.kind, ErrorKind::RuntimeLimitExceeded);
    assert_eq!(e.trace.map(|t| t.len()), Some(32));

    let source = "function sum(n) { if (n == 0) return 0; return n + sum(n - 1); } sum(30)";
    assert_eq!(run_script(source, config).0, Ok(Value::Number(465.0)));
}

#[test]
fn long_chains_are_rejected_by_the_parser() {
    let sources = [
        format!("1{}", " + 1".repeat(100_000)),
        format!("m = {{}}; m{}", ".a".repeat(50_000)),
        format!("l = [0]; l{}", "[0]".repeat(50_000)),
        format!("ok = true{}", " && ok".repeat(10_000)),
    ];
    for source in &sources {
        let e = eval_err(source, EvalConfig::default());
        assert_eq!(e.kind, ErrorKind::SyntaxError);
        assert!(e.message.starts_with("nesting deeper than"), "{}", e.message);
    }

    let lenient = EvalConfig::default().with_parse_mode(ParseMode::Lenient);
    let source = format!("x = 1{}; y = 2", " + 1".repeat(100_000));
    let errors = run_script(&source, lenient).0.unwrap_err();
    assert_eq!(errors.len(), 1);

    assert_eq!(eval(&format!("1{}", " + 1".repeat(99))), Value::Number(100.0));
}

#[test]
fn deep_expressions_under_recursion_hit_a_limit() {
    let source = format!(
        "function f(n) {{ if (n == 0) return 0; var x = {}f(n - 1); return x; }} f(60)",
        "-".repeat(100)
    );
    let e = eval_err(&source, EvalConfig::default());
    assert_eq!(e.kind, ErrorKind::RuntimeLimitExceeded);
    assert!(e.message.starts_with("evaluation nested deeper than 512"), "{}", e.message);

    let shallow = source.replace("f(60)", "f(3)");
    assert_eq!(eval(&shallow), Value::Number(0.0));
}

#[test]
fn default_call_depth_is_reachable() {
    let e = eval_err("function f(n) { return f(n + 1); } f(0)", EvalConfig::default());
    assert_eq!(e.kind, ErrorKind::RuntimeLimitExceeded);
    assert_eq!(e.trace.map(|t| t.len()), Some(64));
}

#[test]
fn errors_carry_the_call_stack() {
    let source = "
        function check(hp) {
            if (hp < 0) return len(hp);
            return hp;
        }
        function heal(hp) { return check(hp - 10); }
        heal(5)
    ";
    let e = eval_err(source, EvalConfig::default());
    assert_eq!(e.kind, ErrorKind::TypeMismatch);
    let trace = e.trace.unwrap();
    let names: Vec<&str> = trace.iter().map(|f| f.function.as_str()).collect();
    assert_eq!(names, vec!["len", "check", "heal"]);
    // Call sites point into the source, innermost first
    let lines: Vec<usize> = trace.iter().map(|f| f.call_site.start.line).collect();
    assert_eq!(lines, vec![3, 6, 7]);

    let e = eval_err("undefined_name", EvalConfig::default());
    assert_eq!(e.kind, ErrorKind::UndefinedVariable);
    assert_eq!(e.trace, Some(vec![]));
}

#[test]
fn control_flow_outside_its_construct() {
    for source in ["break", "continue", "return 5", "function f() { break; } while (true) { f(); }"] {
        let e = eval_err(source, EvalConfig::default());
        assert_eq!(e.kind, ErrorKind::InvalidControlFlow, "{source}");
    }
}

#[test]
fn nested_assignment_scoping() {
    assert_eq!(eval("outer = 1; { outer = 2; inner = 3; } outer"), Value::Number(2.0));
    assert_eq!(
        eval_err("{ inner = 3; } inner", EvalConfig::default()).kind,
        ErrorKind::UndefinedVariable
    );
    assert_eq!(eval("x = 1; { var x = 2; x += 1; } x"), Value::Number(1.0));
}

#[test]
fn closures_see_their_definition_scope() {
    let source = "
        function counter() {
            var count = 0;
            function bump() { count += 1; return count; }
            bump();
            bump();
            return bump();
        }
        count = 100;
        [counter(), count]
    ";
    assert_eq!(eval(source).to_string(), "[3, 100]");
}

#[test]
fn constants_cannot_be_reassigned() {
    let e = eval_err("MT_VM_VERSION += 1", EvalConfig::default());
    assert_eq!(e.kind, ErrorKind::ConstantReassignment);
    assert_eq!(eval("function f() { var MT_VM_VERSION = 2; return MT_VM_VERSION; } f()"), Value::Number(2.0));
}

#[test]
fn output_is_routed_through_the_sink() {
    let (result, output) = run_script(
        "print('hello', 'world'); x = _vm_debug(41) + 1; print(x); x",
        EvalConfig::default(),
    );
    assert_eq!(result, Ok(Value::Number(42.0)));
    assert_eq!(
        output,
        vec![
            OutputEvent::chat("hello world"),
            OutputEvent::debug("41"),
            OutputEvent::chat("42"),
        ]
    );
    assert_eq!(output[1].channel, Channel::Debug);
}

#[test]
fn collections() {
    let source = "
        party = {leader: 'Ana', hp: [10, 12]};
        party.hp[2] = 7;
        party['hp'][0] -= 3;
        party.size = len(party.hp);
        party
    ";
    assert_eq!(
        eval(source).to_string(),
        r#"{"leader": "Ana", "hp": [7, 12, 7], "size": 3}"#
    );
    assert_eq!(
        eval_err("l = []; l[1] = 1", EvalConfig::default()).kind,
        ErrorKind::IndexOutOfRange
    );
    assert_eq!(eval("[1, 'a'] == ['1', 'a']"), Value::Boolean(true));
}

#[test]
fn globals_persist_between_runs() {
    let mut output: Vec<OutputEvent> = Vec::default();
    let mut globals = Env::new();
    globals.set("gold", Value::Number(50.0));
    let mut interpreter = Interpreter::new(
        globals,
        stdlib::registry().unwrap(),
        EvalConfig::default(),
        &mut output,
    );
    run("function spend(n) { gold -= n; return gold; }", &mut interpreter).unwrap();
    assert_eq!(run("spend(20)", &mut interpreter), Ok(Value::Number(30.0)));
    assert_eq!(run("spend(5); gold", &mut interpreter), Ok(Value::Number(25.0)));
    assert_eq!(interpreter.global("gold"), Some(Value::Number(25.0)));
}

#[test]
fn evaluation_is_idempotent() {
    let ast = compile("total = 0; for (var i = 1; i <= 4; i += 1) { total += i; print(total); } total", ParseMode::Strict)
        .unwrap()
        .ast;
    let registry = stdlib::registry().unwrap();
    let mut outputs = Vec::default();
    let mut values = Vec::default();
    for _ in 0..2 {
        let mut output: Vec<OutputEvent> = Vec::default();
        {
            let mut interpreter =
                Interpreter::new(Env::new(), Arc::clone(&registry), EvalConfig::default(), &mut output);
            values.push(interpreter.evaluate(&ast));
        }
        outputs.push(output);
    }
    assert_eq!(values[0], Ok(Value::Number(10.0)));
    assert_eq!(values[0], values[1]);
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0].len(), 4);
}

#[test]
fn registry_is_shared_across_threads() {
    let mut registry = FunctionRegistry::new();
    stdlib::init_io(&mut registry).unwrap();
    stdlib::init_collections(&mut registry).unwrap();
    registry
        .register_fn("roll", Arity::exact(1), |_, args| match args[0].to_number() {
            Some(sides) if sides >= 1.0 => Ok(Value::Number(sides)),
            _ => Err(HostError::new("a die needs at least one side")),
        })
        .unwrap();
    let registry = registry.freeze();

    let results: Vec<Result<String, Diagnostic>> = thread::scope(|s| {
        let handles: Vec<_> = (1..=4)
            .map(|n| {
                let registry = Arc::clone(&registry);
                s.spawn(move || {
                    let mut output: Vec<OutputEvent> = Vec::default();
                    let mut interpreter =
                        Interpreter::new(Env::new(), registry, EvalConfig::default(), &mut output);
                    let source = format!("total = 0; for (var i = 0; i < {n}; i += 1) {{ total += roll(6); }} total");
                    let ast = compile(&source, ParseMode::Strict).unwrap().ast;
                    interpreter.evaluate(&ast).map(|total| total.to_string())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    let totals: Vec<String> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(totals, vec!["6", "12", "18", "24"]);
}

#[test]
fn host_errors_become_diagnostics() {
    let mut registry = FunctionRegistry::new();
    registry
        .register_fn("roll", Arity::exact(1), |_, _| Err(HostError::new("a die needs at least one side")))
        .unwrap();
    let mut output: Vec<OutputEvent> = Vec::default();
    let mut interpreter =
        Interpreter::new(Env::new(), registry.freeze(), EvalConfig::default(), &mut output);
    let errors = run("roll(0)", &mut interpreter).unwrap_err();
    assert_eq!(errors[0].kind, ErrorKind::HostError);
    assert_eq!(errors[0].message, "roll: a die needs at least one side");
    assert_eq!(errors[0].span.start.column, 1);
}

#[test]
fn lenient_mode_reports_every_syntax_error() {
    let config = EvalConfig::default().with_parse_mode(ParseMode::Lenient);
    let (result, output) = run_script("print('ran'); a = ; b = (1 + ; c = 3", config);
    let errors = result.unwrap_err();
    assert_eq!(errors.len(), 2);
    assert!(errors[0].span.start.offset < errors[1].span.start.offset);
    // Nothing runs when the script has syntax errors
    assert!(output.is_empty());

    let errors = run_script("a = ; b = ;", EvalConfig::default()).0.unwrap_err();
    assert_eq!(errors.len(), 1);
}

#[test]
fn unterminated_strings_are_reported() {
    for source in ["x = 'abc", "print(\"oops);\ny = 2;", "s = 'a\\"] {
        let quote = source.find(['\'', '"']).unwrap();
        for mode in [ParseMode::Strict, ParseMode::Lenient] {
            let diagnostics = match compile(source, mode) {
                Ok(parsed) => parsed.diagnostics,
                Err(errors) => errors,
            };
            assert!(
                diagnostics
                    .iter()
                    .any(|d| d.kind == ErrorKind::SyntaxError && d.span.start.offset == quote),
                "{source:?} in {mode:?}: {diagnostics:?}"
            );
        }
    }
}
