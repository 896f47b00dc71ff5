use crate::diagnostics::{Diagnostic, Position, Span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Int,
    Float,
    Str,
    Symbol,
    Comment,
    Newline,
    Indent,
    Dedent,
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    /// For `Str` tokens this is the decoded value, not the quoted form.
    pub text: String,
    pub span: Span,
}

pub const KEYWORDS: &[&str] = &[
    "def", "class", "return", "if", "elif", "else", "for", "in", "not", "and", "or", "assert",
    "import", "from", "with", "as", "try", "except", "pass", "yield", "True", "False", "None",
    "while", "break", "continue", "lambda",
];

/// Tokenizes a whole program, producing an indentation-resolved token stream.
///
/// Indentation must use spaces; each logical line opens with the Indent/Dedent
/// tokens needed to move from the previous line's depth and closes with a
/// Newline. Full-line comments become Comment tokens so the parser can keep
/// them as statements; trailing comments are dropped.
pub fn lex(source: &str) -> Result<Vec<Token>, Diagnostic> {
    let mut tokens = Vec::new();
    let mut indents: Vec<usize> = vec![0];

    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = raw_line.trim_end();
        if line.trim().is_empty() {
            continue;
        }

        let mut indent = 0;
        for ch in line.chars() {
            match ch {
                ' ' => indent += 1,
                '\t' => {
                    return Err(Diagnostic::error(
                        "lex:tab",
                        "tab indentation is not supported; use spaces",
                        Span::point(line_no, indent + 1),
                    ));
                }
                _ => break,
            }
        }

        let current = *indents.last().unwrap_or(&0);
        if indent > current {
            indents.push(indent);
            tokens.push(Token {
                kind: TokenKind::Indent,
                text: String::new(),
                span: Span::point(line_no, 1),
            });
        } else if indent < current {
            while indents.len() > 1 && *indents.last().unwrap_or(&0) > indent {
                indents.pop();
                tokens.push(Token {
                    kind: TokenKind::Dedent,
                    text: String::new(),
                    span: Span::point(line_no, 1),
                });
            }
            if *indents.last().unwrap_or(&0) != indent {
                return Err(Diagnostic::error(
                    "lex:indent",
                    "unindent does not match any outer indentation level",
                    Span::point(line_no, indent + 1),
                ));
            }
        }

        lex_line(line, line_no, indent, &mut tokens)?;
        tokens.push(Token {
            kind: TokenKind::Newline,
            text: String::new(),
            span: Span::point(line_no, line.chars().count() + 1),
        });
    }

    let final_line = source.lines().count() + 1;
    while indents.len() > 1 {
        indents.pop();
        tokens.push(Token {
            kind: TokenKind::Dedent,
            text: String::new(),
            span: Span::point(final_line, 1),
        });
    }

    Ok(tokens)
}

fn lex_line(
    line: &str,
    line_no: usize,
    indent: usize,
    tokens: &mut Vec<Token>,
) -> Result<(), Diagnostic> {
    let chars: Vec<char> = line.chars().collect();
    let mut pos = indent;

    if pos < chars.len() && chars[pos] == '#' {
        let text: String = chars[pos + 1..].iter().collect();
        tokens.push(Token {
            kind: TokenKind::Comment,
            text: text.strip_prefix(' ').unwrap_or(&text).to_string(),
            span: Span {
                start: Position {
                    line: line_no,
                    column: pos + 1,
                },
                end: Position {
                    line: line_no,
                    column: chars.len(),
                },
            },
        });
        return Ok(());
    }

    while pos < chars.len() {
        let ch = chars[pos];
        let column = pos + 1;

        if ch == ' ' {
            pos += 1;
            continue;
        }
        if ch == '#' {
            break;
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_ascii_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Ident,
                text: chars[start..pos].iter().collect(),
                span: span_on(line_no, column, pos),
            });
            continue;
        }

        if ch.is_ascii_digit() {
            let start = pos;
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            let mut is_float = false;
            if pos + 1 < chars.len() && chars[pos] == '.' && chars[pos + 1].is_ascii_digit() {
                is_float = true;
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            tokens.push(Token {
                kind: if is_float {
                    TokenKind::Float
                } else {
                    TokenKind::Int
                },
                text: chars[start..pos].iter().collect(),
                span: span_on(line_no, column, pos),
            });
            continue;
        }

        if ch == '"' || ch == '\'' {
            let quote = ch;
            pos += 1;
            let mut value = String::new();
            loop {
                if pos >= chars.len() {
                    return Err(Diagnostic::error(
                        "lex:string",
                        "unterminated string literal",
                        Span::point(line_no, column),
                    ));
                }
                let c = chars[pos];
                if c == quote {
                    pos += 1;
                    break;
                }
                if c == '\\' {
                    pos += 1;
                    let escaped = chars.get(pos).copied().ok_or_else(|| {
                        Diagnostic::error(
                            "lex:string",
                            "unterminated escape sequence",
                            Span::point(line_no, pos),
                        )
                    })?;
                    value.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        '\\' => '\\',
                        '\'' => '\'',
                        '"' => '"',
                        other => {
                            return Err(Diagnostic::error(
                                "lex:string",
                                format!("unknown escape sequence `\\{other}`"),
                                Span::point(line_no, pos + 1),
                            ));
                        }
                    });
                    pos += 1;
                    continue;
                }
                value.push(c);
                pos += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Str,
                text: value,
                span: span_on(line_no, column, pos),
            });
            continue;
        }

        let two: String = chars[pos..(pos + 2).min(chars.len())].iter().collect();
        if matches!(two.as_str(), "==" | "!=" | "<=" | ">=" | "**") {
            pos += 2;
            tokens.push(Token {
                kind: TokenKind::Symbol,
                text: two,
                span: span_on(line_no, column, pos),
            });
            continue;
        }

        if matches!(
            ch,
            '(' | ')' | '[' | ']' | '{' | '}' | ',' | ':' | '.' | '=' | '+' | '-' | '*' | '/'
                | '%' | '<' | '>' | '@'
        ) {
            pos += 1;
            tokens.push(Token {
                kind: TokenKind::Symbol,
                text: ch.to_string(),
                span: span_on(line_no, column, pos),
            });
            continue;
        }

        return Err(Diagnostic::error(
            "lex:char",
            format!("unexpected character `{ch}`"),
            Span::point(line_no, column),
        ));
    }

    Ok(())
}

fn span_on(line: usize, start_column: usize, end_pos: usize) -> Span {
    Span {
        start: Position {
            line,
            column: start_column,
        },
        end: Position {
            line,
            column: end_pos,
        },
    }
}
