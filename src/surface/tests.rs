use super::parser::parse_program;
use super::printer::render_program;

fn roundtrip(source: &str) {
    let stmts = parse_program(source).expect("parse");
    assert_eq!(render_program(&stmts), source, "render should reproduce the input");
}

/// Rendering must be a fixpoint of parse-then-render.
fn stable(source: &str) {
    let stmts = parse_program(source).expect("parse");
    let rendered = render_program(&stmts);
    let reparsed = parse_program(&rendered).expect("re-parse rendered output");
    assert_eq!(render_program(&reparsed), rendered);
}

#[test]
fn roundtrip_simple_statements() {
    roundtrip(
        "x = 1\n\
         y = x + 2 * 3\n\
         z = (x + 1) * 2\n\
         name = \"hi\\n\"\n\
         t = (1, 2)\n\
         single = (1,)\n\
         items = [1, 2.5, True, None]\n\
         d = {\"a\": 1}\n\
         x, y = (y, x)\n\
         items[0] = x\n\
         assert x == 1, \"message\"\n",
    );
}

#[test]
fn roundtrip_control_flow() {
    roundtrip(
        "if x > 0:\n\
         \x20   y = 1\n\
         else:\n\
         \x20   y = 2\n\
         for i in range(3):\n\
         \x20   total = total + i\n\
         with res as r:\n\
         \x20   pass\n\
         try:\n\
         \x20   x = 1\n\
         except:\n\
         \x20   x = 2\n",
    );
}

#[test]
fn roundtrip_definitions() {
    roundtrip(
        "@dec\n\
         def f(a, b=1, *args, c=2, **kw):\n\
         \x20   return a + b\n\
         class C:\n\
         \x20   def __init__(self, x):\n\
         \x20       self.x = x\n\
         \x20   @property\n\
         \x20   def double(self):\n\
         \x20       return self.x * 2\n\
         def g():\n\
         \x20   yield 1\n",
    );
}

#[test]
fn roundtrip_expressions() {
    roundtrip(
        "ys = [x * 2 for x in xs if x > 0]\n\
         z = 1 if flag else 2\n\
         m = obj.method(1, key=2)\n\
         s = f(*args, **kw)\n\
         b = not done and x < 3 or y\n\
         neg = -x\n\
         # a comment\n\
         import a.b as m\n\
         from a.b import c as d, e\n",
    );
}

#[test]
fn elif_normalizes_to_nested_if() {
    let source = "if a:\n    x = 1\nelif b:\n    x = 2\nelse:\n    x = 3\n";
    let stmts = parse_program(source).expect("parse");
    let rendered = render_program(&stmts);
    assert_eq!(
        rendered,
        "if a:\n    x = 1\nelse:\n    if b:\n        x = 2\n    else:\n        x = 3\n"
    );
    stable(source);
}

#[test]
fn nested_comparisons_keep_parentheses() {
    let source = "x = (a == b) == c\n";
    stable(source);
    let stmts = parse_program(source).expect("parse");
    assert_eq!(render_program(&stmts), source);
}

#[test]
fn blank_lines_and_trailing_comments_are_dropped() {
    let stmts = parse_program("x = 1  # trailing\n\n\ny = 2\n").expect("parse");
    assert_eq!(render_program(&stmts), "x = 1\ny = 2\n");
}

#[test]
fn unsupported_constructs_are_rejected() {
    assert!(parse_program("while True:\n    pass\n").is_err());
    assert!(parse_program("x = y = 1\n").is_err());
    assert!(parse_program("lambda x: x\n").is_err());
    assert!(parse_program("class C(Base):\n    pass\n").is_err());
    let multi_handler = "try:\n    x = 1\nexcept:\n    x = 2\nexcept:\n    x = 3\n";
    assert!(parse_program(multi_handler).is_err());
}

#[test]
fn lexer_errors_carry_positions() {
    let err = parse_program("x = \"unterminated\n").expect_err("should fail");
    assert_eq!(err.span.start.line, 1);

    let err = parse_program("x = 1\n  y = 2\n").expect_err("bad indent");
    assert_eq!(err.span.start.line, 2);
}

#[test]
fn spans_track_lines() {
    let stmts = parse_program("x = 1\nif x:\n    y = 2\n").expect("parse");
    assert_eq!(stmts[0].span().start.line, 1);
    assert_eq!(stmts[1].span().start.line, 2);
    assert_eq!(stmts[1].span().end.line, 3);
}
