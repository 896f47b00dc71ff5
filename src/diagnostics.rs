use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn point(line: usize, column: usize) -> Self {
        let pos = Position { line, column };
        Span {
            start: pos,
            end: pos,
        }
    }

    pub fn contains(&self, pos: Position) -> bool {
        let after_start = pos.line > self.start.line
            || (pos.line == self.start.line && pos.column >= self.start.column);
        let before_end =
            pos.line < self.end.line || (pos.line == self.end.line && pos.column <= self.end.column);
        after_start && before_end
    }
}

pub fn merge_span(start: Span, end: Span) -> Span {
    Span {
        start: start.start,
        end: end.end,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: DiagnosticSeverity,
    pub message: String,
    pub span: Span,
}

impl Diagnostic {
    pub fn error(code: &str, message: impl Into<String>, span: Span) -> Self {
        Diagnostic {
            code: code.to_string(),
            severity: DiagnosticSeverity::Error,
            message: message.into(),
            span,
        }
    }
}

// ANSI color codes
const RED: &str = "\x1b[1;31m";
const YELLOW: &str = "\x1b[1;33m";
const DARK_GRAY: &str = "\x1b[90m";
const WHITE: &str = "\x1b[97m";
const RESET: &str = "\x1b[0m";

pub fn render_diagnostic(source: &str, diagnostic: &Diagnostic, use_color: bool) -> String {
    let mut output = String::new();
    let start = &diagnostic.span.start;
    let severity_label = match diagnostic.severity {
        DiagnosticSeverity::Error => "error",
        DiagnosticSeverity::Warning => "warning",
    };
    if use_color {
        output.push_str(&format!(
            "{YELLOW}{severity_label}[{}]{RESET} {DARK_GRAY}{}:{}{RESET}\n  {WHITE}{}{RESET}\n",
            diagnostic.code, start.line, start.column, diagnostic.message
        ));
    } else {
        output.push_str(&format!(
            "{severity_label}[{}] {}:{}\n  {}\n",
            diagnostic.code, start.line, start.column, diagnostic.message
        ));
    }
    if let Some(frame) = render_source_frame(source, &diagnostic.span, use_color, diagnostic.severity)
    {
        output.push_str(&frame);
    }
    output.trim_end().to_string()
}

fn render_source_frame(
    source: &str,
    span: &Span,
    use_color: bool,
    severity: DiagnosticSeverity,
) -> Option<String> {
    let line_index = span.start.line.checked_sub(1)?;
    let line = source.lines().nth(line_index)?;
    let line_no = span.start.line;
    let width = line_no.to_string().len();

    let mut output = String::new();
    if use_color {
        output.push_str(&format!("{DARK_GRAY}{:>width$} |{RESET}\n", ""));
        output.push_str(&format!("{DARK_GRAY}{line_no:>width$} |{RESET} {line}\n"));
    } else {
        output.push_str(&format!("{:>width$} |\n", ""));
        output.push_str(&format!("{line_no:>width$} | {line}\n"));
    }

    let line_len = line.chars().count();
    let mut start_col = span.start.column.max(1);
    if start_col > line_len + 1 {
        start_col = line_len + 1;
    }
    let mut end_col = if span.start.line == span.end.line {
        span.end.column
    } else {
        start_col
    };
    if end_col < start_col {
        end_col = start_col;
    }
    if end_col > line_len {
        end_col = line_len.max(start_col);
    }
    let caret_len = end_col.saturating_sub(start_col).saturating_add(1);

    let padding = " ".repeat(start_col.saturating_sub(1));
    let carets = "^".repeat(caret_len);
    if use_color {
        let cc = match severity {
            DiagnosticSeverity::Error => RED,
            DiagnosticSeverity::Warning => YELLOW,
        };
        output.push_str(&format!(
            "{DARK_GRAY}{:>width$} |{RESET} {padding}{cc}{carets}{RESET}\n",
            ""
        ));
    } else {
        output.push_str(&format!("{:>width$} | {padding}{carets}\n", ""));
    }
    Some(output)
}
