use crate::surface::parser::parse_program;
use crate::trace::{TraceArgs, Tracer};
use crate::Error;

use super::environment::Env;
use super::values::Value;
use super::{ModuleRegistry, Runtime};

fn run_with(source: &str, registry: ModuleRegistry) -> (Env, String) {
    let stmts = parse_program(source).expect("parse");
    let mut runtime = Runtime::new(registry);
    let globals = runtime.run_program(&stmts).expect("execute");
    (globals, runtime.output)
}

fn run(source: &str) -> (Env, String) {
    run_with(source, ModuleRegistry::new())
}

fn int_of(env: &Env, name: &str) -> i64 {
    match env.get(name) {
        Some(Value::Int(value)) => value,
        other => panic!("expected int for `{name}`, got {other:?}"),
    }
}

#[test]
fn arithmetic_follows_the_surface_semantics() {
    let (env, _) = run(
        "a = 7 % 3\n\
         b = -7 % 3\n\
         c = 7 / 2\n\
         d = 2 + 3 * 4\n\
         s = \"ab\" + \"cd\"\n\
         assert a == 1\n\
         assert b == 2\n\
         assert c == 3.5\n\
         assert s == \"abcd\"\n",
    );
    assert_eq!(int_of(&env, "d"), 14);
}

#[test]
fn collections_and_methods() {
    run(
        "xs = [1, 2]\n\
         xs.append(3)\n\
         xs.extend([4, 5])\n\
         assert len(xs) == 5\n\
         assert xs[0] == 1\n\
         assert xs[-1] == 5\n\
         assert xs + [6] == [1, 2, 3, 4, 5, 6]\n\
         d = {\"a\": 1}\n\
         d[\"b\"] = 2\n\
         assert d[\"b\"] == 2\n\
         assert d.keys() == [\"a\", \"b\"]\n\
         assert \"a\" in d\n\
         assert 9 not in xs\n\
         t = (1, 2)\n\
         x, y = t\n\
         assert x == 1 and y == 2\n\
         assert sum(xs) == 15\n",
    );
}

#[test]
fn functions_bind_positionals_keywords_and_spreads() {
    run(
        "def f(a, b=10, *rest, c=100, **kw):\n\
         \x20   return a + b + c + len(rest) + len(kw)\n\
         assert f(1) == 111\n\
         assert f(1, 2) == 103\n\
         assert f(1, 2, 3, 4) == 105\n\
         assert f(1, c=5, extra=9) == 17\n\
         args = [1, 2]\n\
         kw = {\"c\": 1}\n\
         assert f(*args, **kw) == 4\n",
    );
}

#[test]
fn closures_capture_their_defining_scope() {
    run(
        "def outer():\n\
         \x20   x = 10\n\
         \x20   def inner(y):\n\
         \x20       return x + y\n\
         \x20   return inner\n\
         f = outer()\n\
         assert f(5) == 15\n",
    );
}

#[test]
fn generators_materialize_eagerly() {
    run(
        "def gen(n):\n\
         \x20   for i in range(n):\n\
         \x20       yield i * i\n\
         xs = gen(3)\n\
         assert xs == [0, 1, 4]\n\
         total = 0\n\
         for v in gen(4):\n\
         \x20   total = total + v\n\
         assert total == 14\n",
    );
}

#[test]
fn classes_methods_and_properties() {
    run(
        "class Point:\n\
         \x20   def __init__(self, x):\n\
         \x20       self.x = x\n\
         \x20   def shifted(self, d):\n\
         \x20       return self.x + d\n\
         \x20   @property\n\
         \x20   def double(self):\n\
         \x20       return self.x * 2\n\
         p = Point(3)\n\
         assert p.x == 3\n\
         assert p.shifted(1) == 4\n\
         assert Point.shifted(p, 2) == 5\n\
         assert p.double == 6\n\
         q = __new__(Point)\n\
         q.x = 9\n\
         assert q.x == 9\n",
    );
}

#[test]
fn scoped_resources_call_enter_and_exit() {
    run(
        "class Res:\n\
         \x20   def __init__(self):\n\
         \x20       self.log = []\n\
         \x20   def enter(self):\n\
         \x20       self.log.append(1)\n\
         \x20       return self\n\
         \x20   def exit(self):\n\
         \x20       self.log.append(2)\n\
         r = Res()\n\
         with r as h:\n\
         \x20   h.log.append(3)\n\
         assert r.log == [1, 3, 2]\n",
    );
}

#[test]
fn try_catches_failures_and_assert_reports_them() {
    run(
        "try:\n\
         \x20   x = missing_name\n\
         except:\n\
         \x20   x = 2\n\
         assert x == 2\n",
    );

    let stmts = parse_program("assert 1 == 2\n").expect("parse");
    let mut runtime = Runtime::new(ModuleRegistry::new());
    let err = match runtime.run_program(&stmts) {
        Err(err) => err,
        Ok(_) => panic!("assert should fail"),
    };
    assert!(err.to_string().contains("assertion failed"));
}

#[test]
fn comprehensions_and_conditional_expressions() {
    run(
        "xs = [i * 2 for i in range(4) if i % 2 == 0]\n\
         assert xs == [0, 4]\n\
         pairs = [(i, j) for i in range(2) for j in range(2)]\n\
         assert len(pairs) == 4\n\
         v = 1 if len(xs) == 2 else 2\n\
         assert v == 1\n",
    );
}

#[test]
fn imports_resolve_through_the_registry() {
    let mut registry = ModuleRegistry::new();
    registry.add_module("tools", "def add_one(x):\n    return x + 1\nBASE = 10\n");
    registry.add_module("pkg.mod", "VALUE = 5\n");
    let (env, _) = run_with(
        "import tools\n\
         assert tools.add_one(1) == 2\n\
         from tools import BASE\n\
         import pkg.mod\n\
         total = BASE + pkg.mod.VALUE\n\
         assert total == 15\n",
        registry,
    );
    assert_eq!(int_of(&env, "total"), 15);
}

#[test]
fn print_is_captured_and_defined_checks_scope() {
    let (_, output) = run(
        "print(\"a\", 1)\n\
         print([1, 2])\n\
         assert not defined(\"zzz\")\n\
         zzz = 1\n\
         assert defined(\"zzz\")\n",
    );
    assert_eq!(output, "a 1\n[1, 2]\n");
}

#[test]
fn tracer_records_reads_stores_and_values() {
    let stmts = parse_program("x = 1\ny = x + 1\nassert y == 2\n").expect("parse");
    let trace = Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::reads()).expect("trace");

    assert_eq!(trace.store_count("x"), 1);
    assert_eq!(trace.writes("x")[0].line, 1);
    assert!(!trace.writes("x")[0].in_closure);
    assert_eq!(trace.read_count("x"), 1);
    assert_eq!(trace.reads("x")[0].line, 2);
    assert!(matches!(trace.reads("x")[0].value, Value::Int(1)));
    assert_eq!(trace.writes("y")[0].line, 2);
    assert_eq!(trace.reads("y")[0].line, 3);
    assert!(matches!(trace.globals.get("y"), Some(Value::Int(2))));
}

#[test]
fn tracer_counts_loop_header_per_iteration() {
    let source = "for x in range(3):\n    if x % 2 == 0:\n        y = 1\n    y = 2\n";
    let stmts = parse_program(source).expect("parse");
    let trace = Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::lines()).expect("trace");

    assert_eq!(trace.line_count(1), 4);
    assert_eq!(trace.line_count(2), 3);
    assert_eq!(trace.line_count(3), 2);
    assert_eq!(trace.line_count(4), 3);
}

#[test]
fn tracer_flags_closure_events() {
    let source = "def f():\n    z = 5\n    return z\nr = f()\nassert r == 5\n";
    let stmts = parse_program(source).expect("parse");
    let trace = Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::reads()).expect("trace");

    assert!(trace.writes("z")[0].in_closure);
    assert!(trace.has_closure_event("z"));
    assert!(!trace.writes("r")[0].in_closure);
    assert!(!trace.has_closure_event("r"));
}

#[test]
fn tracer_derives_dead_stores() {
    let source = "x = 1\nx = 2\nassert x == 2\n";
    let stmts = parse_program(source).expect("parse");
    let trace = Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::reads()).expect("trace");

    let unused = trace.unused_store_lines();
    assert_eq!(unused.get("x"), Some(&vec![1]));
}

#[test]
fn tracer_failure_reports_the_instrumented_source() {
    let stmts = parse_program("boom()\n").expect("parse");
    let err = match Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::default()) {
        Err(err) => err,
        Ok(_) => panic!("program should fail"),
    };
    match err {
        Error::Traced { source_text, .. } => assert!(source_text.contains("boom()")),
        other => panic!("expected a traced failure, got {other}"),
    }
}

#[test]
fn mutation_through_a_name_counts_as_a_store() {
    let source = "d = {\"a\": 1}\nd[\"b\"] = 2\nassert d[\"b\"] == 2\n";
    let stmts = parse_program(source).expect("parse");
    let trace = Tracer::trace(&stmts, &ModuleRegistry::new(), TraceArgs::reads()).expect("trace");
    let lines: Vec<usize> = trace.writes("d").iter().map(|event| event.line).collect();
    assert_eq!(lines, vec![1, 2]);
}
