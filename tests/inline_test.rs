use planish::diagnostics::Position;
use planish::{Error, Inliner, InlinerOptions, ModuleRegistry, PassId, Target};

fn inliner(program: &str) -> Inliner {
    with_registry(program, ModuleRegistry::new())
}

fn with_registry(program: &str, registry: ModuleRegistry) -> Inliner {
    Inliner::new(
        program,
        registry,
        InlinerOptions {
            add_comments: false,
        },
    )
    .expect("input program should parse")
}

/// Runs one inline pass, checks the exact output, and re-executes the
/// rewritten program so its own assertions validate the transform.
fn check_inline(program: &str, expected: &str) -> Inliner {
    let mut inliner = inliner(program);
    assert!(inliner.run_pass(PassId::Inline).expect("inline pass"));
    assert_eq!(inliner.code(), expected);
    inliner.execute().expect("rewritten program should still pass");
    inliner
}

#[test]
fn inlines_a_plain_function_call() {
    check_inline(
        "def target(x):\n\
         \x20   return x + 1\n\
         assert target(1) == 2\n",
        "def target(x):\n\
         \x20   return x + 1\n\
         x___target_2 = 1\n\
         if not defined(\"target_ret\"):\n\
         \x20   target_ret = x___target_2 + 1\n\
         assert target_ret == 2\n",
    );
}

#[test]
fn expands_a_constructor_to_raw_allocation_plus_init() {
    check_inline(
        "class Test:\n\
         \x20   def __init__(self, x):\n\
         \x20       self.x = x\n\
         t = Test(1)\n\
         assert t.x == 1\n",
        "class Test:\n\
         \x20   def __init__(self, x):\n\
         \x20       self.x = x\n\
         Test_ret = __new__(Test)\n\
         x_____init__ = 1\n\
         Test_ret.x = x_____init__\n\
         t = Test_ret\n\
         assert t.x == 1\n",
    );
}

#[test]
fn rewrites_a_bound_method_to_its_unbound_form() {
    let mut inliner = check_inline(
        "class Counter:\n\
         \x20   def __init__(self, n):\n\
         \x20       self.n = n\n\
         \x20   def bump(self, k):\n\
         \x20       return self.n + k\n\
         c = Counter(1)\n\
         assert c.bump(2) == 3\n",
        "class Counter:\n\
         \x20   def __init__(self, n):\n\
         \x20       self.n = n\n\
         \x20   def bump(self, k):\n\
         \x20       return self.n + k\n\
         Counter_ret = __new__(Counter)\n\
         n_____init__ = 1\n\
         Counter_ret.n = n_____init__\n\
         c = Counter_ret\n\
         bump_ret = Counter.bump(c, 2)\n\
         assert bump_ret == 3\n",
    );

    // The unbound call expands on the next fixpoint iteration.
    assert!(inliner.run_pass(PassId::Inline).expect("second pass"));
    assert!(!inliner.code().contains("Counter.bump(c, 2)"));
    inliner.execute().expect("still passes after second expansion");
}

#[test]
fn materializes_a_generator_before_its_consumer_loop() {
    check_inline(
        "def gen():\n\
         \x20   for i in range(10):\n\
         \x20       yield i\n\
         total = 0\n\
         for i in gen():\n\
         \x20   total = total + i\n\
         assert total == 45\n",
        "def gen():\n\
         \x20   for i in range(10):\n\
         \x20       yield i\n\
         total = 0\n\
         gen_ret = []\n\
         for i___gen_2 in range(10):\n\
         \x20   gen_ret.append(i___gen_2)\n\
         for i in gen_ret:\n\
         \x20   total = total + i\n\
         assert total == 45\n",
    );
}

#[test]
fn expands_a_property_access_into_its_getter() {
    check_inline(
        "class Box:\n\
         \x20   def __init__(self, w):\n\
         \x20       self.w = w\n\
         \x20   @property\n\
         \x20   def wide(self):\n\
         \x20       return self.w * 2\n\
         b = Box(4)\n\
         assert b.wide == 8\n",
        "class Box:\n\
         \x20   def __init__(self, w):\n\
         \x20       self.w = w\n\
         \x20   @property\n\
         \x20   def wide(self):\n\
         \x20       return self.w * 2\n\
         Box_ret = __new__(Box)\n\
         w_____init__ = 4\n\
         Box_ret.w = w_____init__\n\
         b = Box_ret\n\
         if not defined(\"prop_wide\"):\n\
         \x20   prop_wide = b.w * 2\n\
         assert prop_wide == 8\n",
    );
}

#[test]
fn hoists_a_conditional_expression() {
    check_inline(
        "flag = True\n\
         x = 1 if flag else 2\n\
         assert x == 1\n",
        "flag = True\n\
         if flag:\n\
         \x20   ifexp = 1\n\
         else:\n\
         \x20   ifexp = 2\n\
         x = ifexp\n\
         assert x == 1\n",
    );
}

#[test]
fn expands_a_comprehension_with_a_qualifying_call() {
    check_inline(
        "def double(x):\n\
         \x20   return x * 2\n\
         ys = [double(i) for i in range(3)]\n\
         assert ys == [0, 2, 4]\n",
        "def double(x):\n\
         \x20   return x * 2\n\
         comp = []\n\
         for i in range(3):\n\
         \x20   x___double_2 = i\n\
         \x20   double_ret = x___double_2 * 2\n\
         \x20   comp.append(double_ret)\n\
         ys = comp\n\
         assert ys == [0, 2, 4]\n",
    );
}

#[test]
fn rewrites_a_single_decorator_into_an_explicit_application() {
    check_inline(
        "def register(f):\n\
         \x20   return f\n\
         @register\n\
         def step(x):\n\
         \x20   return x + 1\n\
         r = step(3)\n\
         assert r == 4\n",
        "def register(f):\n\
         \x20   return f\n\
         @register\n\
         def step(x):\n\
         \x20   return x + 1\n\
         def step_2(x):\n\
         \x20   return x + 1\n\
         step_ret = register(step_2)(3)\n\
         r = step_ret\n\
         assert r == 4\n",
    );
}

#[test]
fn expands_a_qualifying_scoped_resource_block() {
    check_inline(
        "class Res:\n\
         \x20   def __init__(self):\n\
         \x20       self.log = []\n\
         \x20   def enter(self):\n\
         \x20       self.log.append(1)\n\
         \x20   def exit(self):\n\
         \x20       self.log.append(2)\n\
         r = Res()\n\
         with r:\n\
         \x20   r.log.append(3)\n\
         assert r.log == [1, 3, 2]\n",
        "class Res:\n\
         \x20   def __init__(self):\n\
         \x20       self.log = []\n\
         \x20   def enter(self):\n\
         \x20       self.log.append(1)\n\
         \x20   def exit(self):\n\
         \x20       self.log.append(2)\n\
         Res_ret = __new__(Res)\n\
         Res_ret.log = []\n\
         r = Res_ret\n\
         ctx = r\n\
         ctx.enter()\n\
         r.log.append(3)\n\
         ctx.exit()\n\
         assert r.log == [1, 3, 2]\n",
    );
}

#[test]
fn two_independent_candidates_in_one_statement_are_an_error() {
    let mut inliner = inliner(
        "def add(a, b):\n\
         \x20   return a + b\n\
         assert add(1, 2) + add(3, 4) == 10\n",
    );
    let err = match inliner.run_pass(PassId::Inline) {
        Err(err) => err,
        Ok(_) => panic!("expected an ambiguous-rewrite error"),
    };
    assert!(matches!(err, Error::AmbiguousRewrite { .. }));
}

#[test]
fn nested_qualifying_calls_expand_outside_in() {
    let mut inliner = inliner(
        "def twice(x):\n\
         \x20   return x * 2\n\
         assert twice(twice(1)) == 4\n",
    );
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    // The outer call is expanded; the inner one becomes a parameter binding
    // for the next fixpoint iteration.
    assert!(inliner.code().contains("x___twice_2 = twice(1)"));
    inliner.execute().expect("still passes");
}

#[test]
fn expands_keyword_spreads_from_traced_keys() {
    check_inline(
        "def f(a, **rest):\n\
         \x20   return a + rest[\"b\"]\n\
         kw = {\"a\": 1, \"b\": 2}\n\
         r = f(**kw)\n\
         assert r == 3\n",
        "def f(a, **rest):\n\
         \x20   return a + rest[\"b\"]\n\
         kw = {\"a\": 1, \"b\": 2}\n\
         a___f_2 = kw[\"a\"]\n\
         rest___f_2 = {\"b\": kw[\"b\"]}\n\
         if not defined(\"f_ret\"):\n\
         \x20   f_ret = a___f_2 + rest___f_2[\"b\"]\n\
         r = f_ret\n\
         assert r == 3\n",
    );
}

#[test]
fn aborts_when_a_keyword_spread_is_mutated_after_the_call() {
    let program = "def f(**rest):\n\
                   \x20   return rest[\"a\"]\n\
                   kw = {\"a\": 1}\n\
                   r = f(**kw)\n\
                   kw[\"b\"] = 2\n\
                   assert r == 1\n";
    let mut inliner = inliner(program);
    let before = inliner.code();
    // The unsound edit is detected; the pass rolls back and reports no
    // change instead of expanding a stale key set.
    assert!(!inliner.run_pass(PassId::Inline).expect("pass should abort cleanly"));
    assert_eq!(inliner.code(), before);
}

#[test]
fn expands_positional_spreads_by_traced_length() {
    check_inline(
        "def add3(a, b, c):\n\
         \x20   return a + b + c\n\
         args = [1, 2, 3]\n\
         r = add3(*args)\n\
         assert r == 6\n",
        "def add3(a, b, c):\n\
         \x20   return a + b + c\n\
         args = [1, 2, 3]\n\
         a___add3_2 = args[0]\n\
         b___add3_2 = args[1]\n\
         c___add3_2 = args[2]\n\
         if not defined(\"add3_ret\"):\n\
         \x20   add3_ret = a___add3_2 + b___add3_2 + c___add3_2\n\
         r = add3_ret\n\
         assert r == 6\n",
    );
}

#[test]
fn generates_imports_for_callee_nonlocals() {
    let mut registry = ModuleRegistry::new();
    registry.add_module(
        "mathx",
        "FACTOR = 3\n\
         def scale(x):\n\
         \x20   return x * FACTOR\n",
    );
    let mut inliner = with_registry(
        "import mathx\n\
         r = mathx.scale(2)\n\
         assert r == 6\n",
        registry,
    );
    inliner.add_target("mathx");
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    assert_eq!(
        inliner.code(),
        "import mathx\n\
         FACTOR = 3\n\
         x___scale = 2\n\
         if not defined(\"scale_ret\"):\n\
         \x20   scale_ret = x___scale * FACTOR\n\
         r = scale_ret\n\
         assert r == 6\n"
    );
    inliner.execute().expect("still passes");
}

#[test]
fn imports_sibling_functions_from_the_defining_module() {
    let mut registry = ModuleRegistry::new();
    registry.add_module(
        "helpers",
        "def twice(x):\n\
         \x20   return x * 2\n\
         def quad(x):\n\
         \x20   return twice(twice(x))\n",
    );
    let mut inliner = with_registry(
        "import helpers\n\
         r = helpers.quad(2)\n\
         assert r == 8\n",
        registry,
    );
    inliner.add_target("helpers");
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    let code = inliner.code();
    assert!(code.contains("from helpers import twice"));
    inliner.execute().expect("still passes");
}

#[test]
fn targets_gate_which_callees_qualify() {
    let mut registry = ModuleRegistry::new();
    registry.add_module("a", "def f(x):\n    return x + 1\n");
    registry.add_module("b", "def g(x):\n    return x - 1\n");
    let mut inliner = with_registry(
        "from a import f\n\
         from b import g\n\
         assert f(1) == 2\n\
         assert g(1) == 0\n",
        registry,
    );
    inliner.add_target("a");
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    let code = inliner.code();
    assert!(!code.contains("f(1)"), "targeted call should be expanded");
    assert!(code.contains("g(1)"), "untargeted call should remain");
    inliner.execute().expect("still passes");
}

#[test]
fn cursor_targets_select_the_call_under_the_cursor() {
    let mut registry = ModuleRegistry::new();
    registry.add_module("a", "def f(x):\n    return x + 1\n");
    let mut inliner = with_registry(
        "from a import f\n\
         r1 = f(1)\n\
         r2 = f(2)\n\
         assert r1 == 2\n\
         assert r2 == 3\n",
        registry,
    );
    inliner.add_target_value(Target::Cursor(Position { line: 2, column: 6 }));
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    let code = inliner.code();
    assert!(!code.contains("f(1)"), "call under the cursor expands: {code}");
    assert!(code.contains("f(2)"), "other calls stay: {code}");
    inliner.execute().expect("still passes");
}

#[test]
fn closure_valued_callees_stay_as_calls() {
    let program = "def make_adder(n):\n\
                   \x20   def add(x):\n\
                   \x20       return x + n\n\
                   \x20   return add\n\
                   plus2 = make_adder(2)\n\
                   r = plus2(5)\n\
                   assert r == 7\n";
    let mut inliner = inliner(program);
    assert!(inliner.run_pass(PassId::Inline).expect("inline"));
    // make_adder itself is expanded, but the closure it returned cannot be
    // spliced without its captured frame.
    assert!(inliner.code().contains("plus2(5)"));
    inliner.execute().expect("still passes");
}
