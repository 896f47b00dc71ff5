use planish::{Inliner, InlinerOptions, ModuleRegistry, ReplayScript};

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

/// Full-pipeline check: the simplified program must execute with the same
/// captured output as the original, and a second `simplify` must be a no-op.
fn assert_equivalent(program: &str, registry: ModuleRegistry) -> Inliner {
    let mut inliner = with_registry(program, registry);
    let before = inliner.execute().expect("original program runs");
    inliner.simplify().expect("simplify");
    let after = inliner.execute().expect("simplified program runs");
    assert_eq!(before, after, "visible behavior must be preserved");

    let code = inliner.code();
    inliner.simplify().expect("second simplify");
    assert_eq!(inliner.code(), code, "simplify must be idempotent");
    inliner
}

#[test]
fn simplifies_a_single_call_to_a_flat_program() {
    let inliner = assert_equivalent(
        "def target(x):\n\
         \x20   return x + 1\n\
         assert target(1) == 2\n",
        ModuleRegistry::new(),
    );
    let code = inliner.code();
    assert!(!code.contains("def "), "the callee should be gone: {code}");
    assert!(!code.contains("target("), "the call should be gone: {code}");
}

#[test]
fn simplifies_constructors_and_methods() {
    let inliner = assert_equivalent(
        "class Counter:\n\
         \x20   def __init__(self, n):\n\
         \x20       self.n = n\n\
         \x20   def bump(self, k):\n\
         \x20       return self.n + k\n\
         c = Counter(1)\n\
         assert c.bump(2) == 3\n\
         print(c.n)\n",
        ModuleRegistry::new(),
    );
    let code = inliner.code();
    assert!(code.contains("__new__(Counter)"), "raw allocation expected: {code}");
    assert!(!code.contains(".bump("), "method call should be expanded: {code}");
}

#[test]
fn simplifies_a_generator_into_its_consumer() {
    let inliner = assert_equivalent(
        "def gen():\n\
         \x20   for i in range(10):\n\
         \x20       yield i\n\
         total = 0\n\
         for i in gen():\n\
         \x20   total = total + i\n\
         print(total)\n",
        ModuleRegistry::new(),
    );
    let code = inliner.code();
    assert!(!code.contains("yield"), "yields should be materialized: {code}");
    assert!(!code.contains("gen("), "generator call should be gone: {code}");
}

#[test]
fn simplifies_across_module_boundaries() {
    let mut registry = ModuleRegistry::new();
    registry.add_module(
        "mathx",
        "FACTOR = 3\n\
         def scale(x):\n\
         \x20   return x * FACTOR\n",
    );
    let mut inliner = with_registry(
        "import mathx\n\
         print(mathx.scale(2))\n\
         print(mathx.scale(5))\n",
        registry,
    );
    inliner.add_target("mathx");
    let before = inliner.execute().expect("original runs");
    inliner.simplify().expect("simplify");
    assert_eq!(inliner.execute().expect("simplified runs"), before);
    let code = inliner.code();
    assert!(!code.contains("mathx.scale("), "calls should be expanded: {code}");
}

#[test]
fn mixed_branches_and_loops_keep_their_behavior() {
    assert_equivalent(
        "def classify(n):\n\
         \x20   label = \"even\" if n % 2 == 0 else \"odd\"\n\
         \x20   return label\n\
         for i in range(4):\n\
         \x20   print(classify(i))\n",
        ModuleRegistry::new(),
    );
}

#[test]
fn dead_branches_vanish_while_live_ones_survive() {
    let inliner = assert_equivalent(
        "limit = 10\n\
         if limit > 5:\n\
         \x20   mode = \"big\"\n\
         else:\n\
         \x20   mode = \"small\"\n\
         print(mode)\n",
        ModuleRegistry::new(),
    );
    assert!(!inliner.code().contains("small"));
}

#[test]
fn replay_reproduces_the_final_tree() {
    let program = "def target(x):\n\
                   \x20   return x + 1\n\
                   assert target(1) == 2\n";
    let mut inliner = with_registry(program, ModuleRegistry::new());
    inliner.simplify().expect("simplify");

    let script = inliner.replay();
    let json = script.to_json().expect("serialize");
    let parsed = ReplayScript::from_json(&json).expect("deserialize");
    assert_eq!(parsed.program, program);

    let replayed = Inliner::run_replay(
        &parsed,
        ModuleRegistry::new(),
        InlinerOptions {
            add_comments: false,
        },
    )
    .expect("replay");
    assert_eq!(replayed.code(), inliner.code());
}

#[test]
fn undo_restores_the_previous_snapshot() {
    let program = "def target(x):\n\
                   \x20   return x + 1\n\
                   assert target(1) == 2\n";
    let mut inliner = with_registry(program, ModuleRegistry::new());
    assert!(inliner.inline().expect("inline"));
    assert_ne!(inliner.code(), program);
    inliner.undo().expect("undo");
    assert_eq!(inliner.code(), program);
    // The original snapshot is never popped.
    inliner.undo().expect("undo again");
    assert_eq!(inliner.code(), program);
}

#[test]
fn history_starts_with_the_original_tree() {
    let program = "x = 1\nassert x == 1\n";
    let mut inliner = with_registry(program, ModuleRegistry::new());
    inliner.simplify().expect("simplify");
    let history = inliner.history();
    assert_eq!(history[0].source, program);
    assert!(history[0].pass.is_none());
}

#[test]
fn target_suggestions_report_qualified_paths() {
    let mut registry = ModuleRegistry::new();
    registry.add_module(
        "mathx",
        "def scale(x):\n\
         \x20   return x * 2\n",
    );
    let inliner = with_registry(
        "import mathx\n\
         r = mathx.scale(2)\n\
         assert r == 4\n",
        registry,
    );
    let suggestions = inliner.target_suggestions().expect("suggestions");
    let paths: Vec<&str> = suggestions
        .iter()
        .map(|suggestion| suggestion.path.as_str())
        .collect();
    assert!(paths.contains(&"mathx"));
    assert!(paths.contains(&"mathx.scale"));
}

#[test]
fn unexecuted_lines_point_at_never_taken_branches() {
    let inliner = with_registry(
        "x = 1\n\
         if x == 1:\n\
         \x20   y = 1\n\
         else:\n\
         \x20   y = 2\n\
         assert y == 1\n",
        ModuleRegistry::new(),
    );
    assert_eq!(inliner.unexecuted_lines().expect("lines"), vec![5]);
}

#[test]
fn add_comments_records_the_original_call() {
    let mut inliner = Inliner::new(
        "def target(x):\n\
         \x20   return x + 1\n\
         assert target(1) == 2\n",
        ModuleRegistry::new(),
        InlinerOptions::default(),
    )
    .expect("parse");
    assert!(inliner.inline().expect("inline"));
    assert!(inliner.code().contains("# target(1)"));
    inliner.execute().expect("still passes");
}
