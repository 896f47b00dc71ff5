use planish::{Inliner, InlinerOptions, ModuleRegistry, PassId};

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

/// Runs one pass, checks the exact output, and re-executes the result so its
/// assertions validate the rewrite.
fn check_pass(program: &str, pass: PassId, expected: &str) {
    check_pass_with(program, ModuleRegistry::new(), pass, expected);
}

fn check_pass_with(program: &str, registry: ModuleRegistry, pass: PassId, expected: &str) {
    let mut inliner = with_registry(program, registry);
    inliner.run_pass(pass).expect("pass should run");
    assert_eq!(inliner.code(), expected);
    inliner.execute().expect("rewritten program should still pass");
}

#[test]
fn deadcode_collapses_a_taken_then_branch() {
    check_pass(
        "if True:\n\
         \x20   x = 1\n\
         else:\n\
         \x20   y = 1\n\
         assert x == 1\n",
        PassId::Deadcode,
        "x = 1\nassert x == 1\n",
    );
}

#[test]
fn deadcode_collapses_a_taken_else_branch() {
    check_pass(
        "if False:\n\
         \x20   x = 1\n\
         else:\n\
         \x20   y = 1\n\
         assert y == 1\n",
        PassId::Deadcode,
        "y = 1\nassert y == 1\n",
    );
}

#[test]
fn deadcode_keeps_a_branch_taken_only_sometimes() {
    let program = "seen = []\n\
                   for i in range(4):\n\
                   \x20   if i % 2 == 0:\n\
                   \x20       seen.append(i)\n\
                   assert seen == [0, 2]\n";
    let mut inliner = inliner(program);
    assert!(!inliner.run_pass(PassId::Deadcode).expect("pass"));
    assert_eq!(inliner.code(), program);
}

#[test]
fn deadcode_removes_valueless_expression_statements() {
    check_pass(
        "x = 1\nx\n\"doc\"\nassert x == 1\n",
        PassId::Deadcode,
        "x = 1\nassert x == 1\n",
    );
}

#[test]
fn deadcode_removes_a_loop_with_a_dead_body() {
    check_pass(
        "for i in []:\n\
         \x20   x = 1\n\
         y = 2\n\
         assert y == 2\n",
        PassId::Deadcode,
        "y = 2\nassert y == 2\n",
    );
}

#[test]
fn deadcode_collapses_try_to_the_side_that_ran() {
    check_pass(
        "try:\n\
         \x20   x = 1\n\
         except:\n\
         \x20   x = 2\n\
         assert x == 1\n",
        PassId::Deadcode,
        "x = 1\nassert x == 1\n",
    );

    check_pass(
        "try:\n\
         \x20   x = missing_name\n\
         except:\n\
         \x20   x = 2\n\
         assert x == 2\n",
        PassId::Deadcode,
        "x = 2\nassert x == 2\n",
    );
}

#[test]
fn deadcode_preserves_comments() {
    check_pass(
        "# keep me\n\
         if True:\n\
         \x20   x = 1\n\
         else:\n\
         \x20   y = 1\n\
         assert x == 1\n",
        PassId::Deadcode,
        "# keep me\nx = 1\nassert x == 1\n",
    );
}

#[test]
fn copy_propagation_resolves_alias_chains() {
    check_pass(
        "x = 1\ny = x\nz = y\nassert z == 1\n",
        PassId::CopyPropagation,
        "assert 1 == 1\n",
    );
}

#[test]
fn copy_propagation_skips_effectful_values() {
    let program = "def noisy():\n\
                   \x20   print(\"hi\")\n\
                   \x20   return 1\n\
                   x = noisy()\n\
                   assert x == 1\n";
    let mut inliner = inliner(program);
    assert!(!inliner.run_pass(PassId::CopyPropagation).expect("pass"));
    assert_eq!(inliner.code(), program);
}

#[test]
fn copy_propagation_skips_values_that_changed() {
    let program = "x = 10\n\
                   y = x\n\
                   x = 20\n\
                   assert y == 10\n\
                   assert x == 20\n";
    let mut inliner = inliner(program);
    inliner.run_pass(PassId::CopyPropagation).expect("pass");
    // `x` is stored twice, so it must not be folded into `y`'s use.
    assert!(inliner.code().contains("y = x"));
    inliner.execute().expect("still passes");
}

#[test]
fn copy_propagation_scales_the_baseline_inside_loops() {
    check_pass(
        "total = 0\n\
         for i in range(3):\n\
         \x20   doubled = i * 2\n\
         \x20   total = total + doubled\n\
         assert total == 6\n",
        PassId::CopyPropagation,
        "total = 0\n\
         for i in range(3):\n\
         \x20   total = total + i * 2\n\
         assert total == 6\n",
    );
}

#[test]
fn lifetimes_removes_dead_stores() {
    check_pass(
        "x = 1\nx = 2\nassert x == 2\n",
        PassId::Lifetimes,
        "x = 2\nassert x == 2\n",
    );
}

#[test]
fn lifetimes_keeps_effectful_dead_stores() {
    let program = "def noisy():\n\
                   \x20   print(\"hi\")\n\
                   \x20   return 1\n\
                   x = noisy()\n\
                   x = 2\n\
                   assert x == 2\n";
    let mut inliner = inliner(program);
    inliner.run_pass(PassId::Lifetimes).expect("pass");
    assert!(inliner.code().contains("x = noisy()"));
    inliner.execute().expect("still passes");
}

#[test]
fn lifetimes_drops_unread_imports_and_definitions() {
    let mut registry = ModuleRegistry::new();
    registry.add_module("mod_a", "A = 1\nB = 2\n");
    check_pass_with(
        "from mod_a import A, B\n\
         def helper(x):\n\
         \x20   return x\n\
         y = A\n\
         assert y == 1\n",
        registry,
        PassId::Lifetimes,
        "from mod_a import A\n\
         y = A\n\
         assert y == 1\n",
    );
}

#[test]
fn expand_tuples_splits_simple_tuple_assignments() {
    check_pass(
        "x, y = (1, 2)\n\
         assert x == 1\n\
         assert y == 2\n",
        PassId::ExpandTuples,
        "x = 1\n\
         y = 2\n\
         assert x == 1\n\
         assert y == 2\n",
    );
}

#[test]
fn expand_tuples_leaves_complex_elements_alone() {
    let program = "x, y = (len([1]), 2)\n\
                   assert x == 1\n\
                   assert y == 2\n";
    let mut inliner = inliner(program);
    assert!(!inliner.run_pass(PassId::ExpandTuples).expect("pass"));
    assert_eq!(inliner.code(), program);
}

#[test]
fn clean_imports_hoists_and_deduplicates() {
    let mut registry = ModuleRegistry::new();
    registry.add_module("mod_a", "A = 1\n");
    check_pass_with(
        "x = 1\n\
         from mod_a import A\n\
         from mod_a import A\n\
         y = A + x\n\
         assert y == 2\n",
        registry,
        PassId::CleanImports,
        "from mod_a import A\n\
         x = 1\n\
         y = A + x\n\
         assert y == 2\n",
    );
}

#[test]
fn remove_suffixes_renames_generated_locals() {
    check_pass(
        "x___helper = 10\n\
         y___helper = x___helper + 1\n\
         assert y___helper == 11\n",
        PassId::RemoveSuffixes,
        "x = 10\n\
         y = x + 1\n\
         assert y == 11\n",
    );
}

#[test]
fn simplify_varargs_drops_empty_keyword_spreads() {
    check_pass(
        "def g(x, **kw):\n\
         \x20   return x\n\
         empty = {}\n\
         r = g(1, **empty)\n\
         assert r == 1\n",
        PassId::SimplifyVarargs,
        "def g(x, **kw):\n\
         \x20   return x\n\
         empty = {}\n\
         r = g(1)\n\
         assert r == 1\n",
    );
}
