use crate::diagnostics::{merge_span, Diagnostic, Span};
use crate::surface::ast::{
    Arg, AssignTarget, BinOp, ClassDef, CompClause, Decorator, Expr, FuncDef, ImportAlias, Param,
    Params, SpannedName, StarKind, Stmt, UnaryOp,
};
use crate::surface::lexer::{lex, Token, TokenKind, KEYWORDS};

/// Parses a whole program into a statement list.
pub fn parse_program(source: &str) -> Result<Vec<Stmt>, Diagnostic> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    let stmts = parser.parse_stmts_until_dedent(true)?;
    if let Some(token) = parser.tokens.get(parser.pos) {
        return Err(Diagnostic::error(
            "parse:trailing",
            format!("unexpected token `{}`", token.text),
            token.span,
        ));
    }
    Ok(stmts)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|token| token.kind)
    }

    fn peek_ident(&self, text: &str) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Ident && token.text == text)
    }

    fn peek_symbol(&self, text: &str) -> bool {
        self.peek()
            .is_some_and(|token| token.kind == TokenKind::Symbol && token.text == text)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn consume_ident_kw(&mut self, text: &str) -> bool {
        if self.peek_ident(text) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn consume_symbol(&mut self, text: &str) -> bool {
        if self.peek_symbol(text) {
            self.pos += 1;
            return true;
        }
        false
    }

    fn expect_symbol(&mut self, text: &str) -> Result<Span, Diagnostic> {
        if self.peek_symbol(text) {
            let span = self.tokens[self.pos].span;
            self.pos += 1;
            return Ok(span);
        }
        Err(self.error_here(format!("expected `{text}`")))
    }

    fn expect_keyword(&mut self, text: &str) -> Result<Span, Diagnostic> {
        if self.peek_ident(text) {
            let span = self.tokens[self.pos].span;
            self.pos += 1;
            return Ok(span);
        }
        Err(self.error_here(format!("expected `{text}`")))
    }

    fn expect_newline(&mut self) -> Result<(), Diagnostic> {
        if self.peek_kind() == Some(TokenKind::Newline) {
            self.pos += 1;
            return Ok(());
        }
        Err(self.error_here("expected end of line"))
    }

    fn expect_name(&mut self) -> Result<SpannedName, Diagnostic> {
        match self.peek() {
            Some(token) if token.kind == TokenKind::Ident => {
                if KEYWORDS.contains(&token.text.as_str()) {
                    return Err(Diagnostic::error(
                        "parse:keyword",
                        format!("`{}` is a keyword and cannot be used as a name", token.text),
                        token.span,
                    ));
                }
                let name = SpannedName::new(token.text.clone(), token.span);
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error_here("expected a name")),
        }
    }

    fn error_here(&self, message: impl Into<String>) -> Diagnostic {
        let span = self
            .peek()
            .map(|token| token.span)
            .or_else(|| self.tokens.last().map(|token| token.span))
            .unwrap_or_default();
        Diagnostic::error("parse:unexpected", message, span)
    }

    fn here(&self) -> Span {
        self.peek()
            .map(|token| token.span)
            .or_else(|| self.tokens.last().map(|token| token.span))
            .unwrap_or_default()
    }

    fn parse_stmts_until_dedent(&mut self, toplevel: bool) -> Result<Vec<Stmt>, Diagnostic> {
        let mut stmts = Vec::new();
        loop {
            match self.peek_kind() {
                None => {
                    if toplevel {
                        break;
                    }
                    return Err(self.error_here("unexpected end of input inside block"));
                }
                Some(TokenKind::Dedent) => {
                    if toplevel {
                        return Err(self.error_here("unbalanced indentation"));
                    }
                    self.pos += 1;
                    break;
                }
                _ => stmts.push(self.parse_stmt()?),
            }
        }
        Ok(stmts)
    }

    /// Parses the `: NEWLINE INDENT … DEDENT` suite of a compound statement.
    fn parse_block(&mut self) -> Result<Vec<Stmt>, Diagnostic> {
        self.expect_symbol(":")?;
        self.expect_newline()?;
        if self.peek_kind() != Some(TokenKind::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        self.pos += 1;
        self.parse_stmts_until_dedent(false)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, Diagnostic> {
        if let Some(token) = self.peek() {
            if token.kind == TokenKind::Comment {
                let stmt = Stmt::Comment {
                    text: token.text.clone(),
                    span: token.span,
                };
                self.pos += 1;
                self.expect_newline()?;
                return Ok(stmt);
            }
        }

        for unsupported in ["while", "break", "continue", "lambda"] {
            if self.peek_ident(unsupported) {
                return Err(Diagnostic::error(
                    "parse:unsupported",
                    format!("`{unsupported}` is not supported"),
                    self.here(),
                ));
            }
        }

        if self.peek_ident("pass") {
            let span = self.expect_keyword("pass")?;
            self.expect_newline()?;
            return Ok(Stmt::Pass { span });
        }
        if self.peek_ident("return") {
            let start = self.expect_keyword("return")?;
            let value = if self.peek_kind() == Some(TokenKind::Newline) {
                None
            } else {
                Some(self.parse_expr()?)
            };
            let span = value
                .as_ref()
                .map(|expr| merge_span(start, expr.span()))
                .unwrap_or(start);
            self.expect_newline()?;
            return Ok(Stmt::Return { value, span });
        }
        if self.peek_ident("assert") {
            let start = self.expect_keyword("assert")?;
            let expr = self.parse_expr()?;
            let message = if self.consume_symbol(",") {
                Some(self.parse_expr()?)
            } else {
                None
            };
            let end = message.as_ref().map(Expr::span).unwrap_or(expr.span());
            self.expect_newline()?;
            return Ok(Stmt::Assert {
                expr,
                message,
                span: merge_span(start, end),
            });
        }
        if self.peek_ident("import") {
            let start = self.expect_keyword("import")?;
            let module = self.parse_dotted_name()?;
            let alias = if self.consume_ident_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            let end = alias.as_ref().map(|name| name.span).unwrap_or(module.span);
            self.expect_newline()?;
            return Ok(Stmt::Import {
                module,
                alias,
                span: merge_span(start, end),
            });
        }
        if self.peek_ident("from") {
            let start = self.expect_keyword("from")?;
            let module = self.parse_dotted_name()?;
            self.expect_keyword("import")?;
            let mut names = Vec::new();
            loop {
                let name = self.expect_name()?;
                let alias = if self.consume_ident_kw("as") {
                    Some(self.expect_name()?)
                } else {
                    None
                };
                names.push(ImportAlias { name, alias });
                if !self.consume_symbol(",") {
                    break;
                }
            }
            let end = names
                .last()
                .map(|alias| {
                    alias
                        .alias
                        .as_ref()
                        .map(|name| name.span)
                        .unwrap_or(alias.name.span)
                })
                .unwrap_or(module.span);
            self.expect_newline()?;
            return Ok(Stmt::FromImport {
                module,
                names,
                span: merge_span(start, end),
            });
        }
        if self.peek_ident("if") {
            return self.parse_if();
        }
        if self.peek_ident("for") {
            let start = self.expect_keyword("for")?;
            let target = self.parse_target_list()?;
            self.expect_keyword("in")?;
            let iter = self.parse_expr()?;
            let body = self.parse_block()?;
            let end = body.last().map(Stmt::span).unwrap_or(iter.span());
            return Ok(Stmt::For {
                target,
                iter,
                body,
                span: merge_span(start, end),
            });
        }
        if self.peek_ident("with") {
            let start = self.expect_keyword("with")?;
            let context = self.parse_expr()?;
            let binding = if self.consume_ident_kw("as") {
                Some(self.expect_name()?)
            } else {
                None
            };
            let body = self.parse_block()?;
            let end = body.last().map(Stmt::span).unwrap_or(context.span());
            return Ok(Stmt::With {
                context,
                binding,
                body,
                span: merge_span(start, end),
            });
        }
        if self.peek_ident("try") {
            let start = self.expect_keyword("try")?;
            let body = self.parse_block()?;
            self.expect_keyword("except")?;
            let handler = self.parse_block()?;
            if self.peek_ident("except") {
                return Err(Diagnostic::error(
                    "parse:unsupported",
                    "multiple except clauses are not supported",
                    self.here(),
                ));
            }
            let end = handler.last().map(Stmt::span).unwrap_or(start);
            return Ok(Stmt::Try {
                body,
                handler,
                span: merge_span(start, end),
            });
        }
        if self.peek_symbol("@") || self.peek_ident("def") || self.peek_ident("class") {
            return self.parse_definition();
        }
        if self.peek_ident("yield") {
            let start = self.expect_keyword("yield")?;
            let value = self.parse_expr()?;
            let span = merge_span(start, value.span());
            self.expect_newline()?;
            return Ok(Stmt::ExprStmt {
                expr: Expr::Yield {
                    value: Box::new(value),
                    span,
                },
                span,
            });
        }

        self.parse_assign_or_expr()
    }

    fn parse_if(&mut self) -> Result<Stmt, Diagnostic> {
        let start = if self.consume_ident_kw("if") {
            self.tokens[self.pos - 1].span
        } else {
            self.expect_keyword("elif")?
        };
        let cond = self.parse_expr()?;
        let body = self.parse_block()?;
        let orelse = if self.peek_ident("elif") {
            vec![self.parse_if()?]
        } else if self.consume_ident_kw("else") {
            self.parse_block()?
        } else {
            Vec::new()
        };
        let end = orelse
            .last()
            .map(Stmt::span)
            .or_else(|| body.last().map(Stmt::span))
            .unwrap_or(cond.span());
        Ok(Stmt::If {
            cond,
            body,
            orelse,
            span: merge_span(start, end),
        })
    }

    fn parse_definition(&mut self) -> Result<Stmt, Diagnostic> {
        let mut decorators = Vec::new();
        while self.consume_symbol("@") {
            let at_span = self.tokens[self.pos - 1].span;
            let name = self.expect_name()?;
            let span = merge_span(at_span, name.span);
            decorators.push(Decorator { name, span });
            self.expect_newline()?;
        }

        if self.consume_ident_kw("def") {
            let start = decorators
                .first()
                .map(|decorator| decorator.span)
                .unwrap_or(self.tokens[self.pos - 1].span);
            let name = self.expect_name()?;
            let params = self.parse_params()?;
            let body = self.parse_block()?;
            let end = body.last().map(Stmt::span).unwrap_or(name.span);
            return Ok(Stmt::FuncDef(FuncDef {
                decorators,
                name,
                params,
                body,
                span: merge_span(start, end),
            }));
        }

        if self.consume_ident_kw("class") {
            let start = decorators
                .first()
                .map(|decorator| decorator.span)
                .unwrap_or(self.tokens[self.pos - 1].span);
            let name = self.expect_name()?;
            if self.peek_symbol("(") {
                return Err(Diagnostic::error(
                    "parse:unsupported",
                    "class inheritance is not supported",
                    self.here(),
                ));
            }
            let body = self.parse_block()?;
            let end = body.last().map(Stmt::span).unwrap_or(name.span);
            return Ok(Stmt::ClassDef(ClassDef {
                decorators,
                name,
                body,
                span: merge_span(start, end),
            }));
        }

        Err(self.error_here("expected `def` or `class` after decorator"))
    }

    fn parse_params(&mut self) -> Result<Params, Diagnostic> {
        self.expect_symbol("(")?;
        let mut params = Params::default();
        let mut seen_vararg = false;
        if !self.peek_symbol(")") {
            loop {
                if self.consume_symbol("**") {
                    params.kwarg = Some(self.expect_name()?);
                } else if self.consume_symbol("*") {
                    if seen_vararg {
                        return Err(self.error_here("duplicate `*` parameter"));
                    }
                    seen_vararg = true;
                    params.vararg = Some(self.expect_name()?);
                } else {
                    let name = self.expect_name()?;
                    let default = if self.consume_symbol("=") {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    let param = Param { name, default };
                    if seen_vararg {
                        if param.default.is_none() {
                            return Err(self.error_here(
                                "keyword-only parameters must have a default value",
                            ));
                        }
                        params.kwonly.push(param);
                    } else {
                        params.params.push(param);
                    }
                }
                if !self.consume_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        Ok(params)
    }

    fn parse_dotted_name(&mut self) -> Result<SpannedName, Diagnostic> {
        let first = self.expect_name()?;
        let mut text = first.name.clone();
        let mut span = first.span;
        while self.consume_symbol(".") {
            let next = self.expect_name()?;
            text.push('.');
            text.push_str(&next.name);
            span = merge_span(span, next.span);
        }
        Ok(SpannedName::new(text, span))
    }

    /// `x` / `x, y` / `x, (y, z)` as an assignment or loop target.
    fn parse_target_list(&mut self) -> Result<AssignTarget, Diagnostic> {
        let first = self.parse_postfix()?;
        if !self.peek_symbol(",") {
            return expr_to_target(first);
        }
        let mut items = vec![expr_to_target(first)?];
        while self.consume_symbol(",") {
            items.push(expr_to_target(self.parse_postfix()?)?);
        }
        let span = merge_span(
            items.first().map(AssignTarget::span).unwrap_or_default(),
            items.last().map(AssignTarget::span).unwrap_or_default(),
        );
        Ok(AssignTarget::Tuple { items, span })
    }

    fn parse_assign_or_expr(&mut self) -> Result<Stmt, Diagnostic> {
        let first = self.parse_expr()?;

        let mut exprs = vec![first];
        while self.consume_symbol(",") {
            exprs.push(self.parse_expr()?);
        }

        if self.consume_symbol("=") {
            let target = if exprs.len() == 1 {
                expr_to_target(exprs.pop().unwrap_or_else(|| Expr::name("_")))?
            } else {
                let span = merge_span(
                    exprs.first().map(Expr::span).unwrap_or_default(),
                    exprs.last().map(Expr::span).unwrap_or_default(),
                );
                let items = exprs
                    .into_iter()
                    .map(expr_to_target)
                    .collect::<Result<Vec<_>, _>>()?;
                AssignTarget::Tuple { items, span }
            };

            let mut values = vec![self.parse_expr()?];
            while self.consume_symbol(",") {
                values.push(self.parse_expr()?);
            }
            if self.peek_symbol("=") {
                return Err(Diagnostic::error(
                    "parse:unsupported",
                    "chained assignment is not supported",
                    self.here(),
                ));
            }
            let value = if values.len() == 1 {
                values.pop().unwrap_or_else(|| Expr::name("_"))
            } else {
                let span = merge_span(
                    values.first().map(Expr::span).unwrap_or_default(),
                    values.last().map(Expr::span).unwrap_or_default(),
                );
                Expr::Tuple { items: values, span }
            };
            let span = merge_span(target.span(), value.span());
            self.expect_newline()?;
            return Ok(Stmt::Assign {
                target,
                value,
                span,
            });
        }

        let expr = if exprs.len() == 1 {
            exprs.pop().unwrap_or_else(|| Expr::name("_"))
        } else {
            let span = merge_span(
                exprs.first().map(Expr::span).unwrap_or_default(),
                exprs.last().map(Expr::span).unwrap_or_default(),
            );
            Expr::Tuple { items: exprs, span }
        };
        let span = expr.span();
        self.expect_newline()?;
        Ok(Stmt::ExprStmt { expr, span })
    }

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        let value = self.parse_or()?;
        if self.peek_ident("if") {
            // `a if cond else b`; the else arm is required.
            self.expect_keyword("if")?;
            let cond = self.parse_or()?;
            self.expect_keyword("else")?;
            let orelse = self.parse_expr()?;
            let span = merge_span(value.span(), orelse.span());
            return Ok(Expr::IfExp {
                cond: Box::new(cond),
                then: Box::new(value),
                orelse: Box::new(orelse),
                span,
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_and()?;
        while self.consume_ident_kw("or") {
            let right = self.parse_and()?;
            left = binary(BinOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_not()?;
        while self.consume_ident_kw("and") {
            let right = self.parse_not()?;
            left = binary(BinOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, Diagnostic> {
        if self.peek_ident("not") {
            let start = self.expect_keyword("not")?;
            let operand = self.parse_not()?;
            let span = merge_span(start, operand.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        let left = self.parse_arith()?;
        let op = if self.consume_symbol("==") {
            Some(BinOp::Eq)
        } else if self.consume_symbol("!=") {
            Some(BinOp::Ne)
        } else if self.consume_symbol("<=") {
            Some(BinOp::Le)
        } else if self.consume_symbol(">=") {
            Some(BinOp::Ge)
        } else if self.consume_symbol("<") {
            Some(BinOp::Lt)
        } else if self.consume_symbol(">") {
            Some(BinOp::Gt)
        } else if self.peek_ident("in") {
            self.expect_keyword("in")?;
            Some(BinOp::In)
        } else if self.peek_ident("not") {
            self.expect_keyword("not")?;
            self.expect_keyword("in")?;
            Some(BinOp::NotIn)
        } else {
            None
        };
        match op {
            Some(op) => {
                let right = self.parse_arith()?;
                Ok(binary(op, left, right))
            }
            None => Ok(left),
        }
    }

    fn parse_arith(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_term()?;
        loop {
            let op = if self.peek_symbol("+") {
                BinOp::Add
            } else if self.peek_symbol("-") {
                BinOp::Sub
            } else {
                break;
            };
            self.pos += 1;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        let mut left = self.parse_factor()?;
        loop {
            let op = if self.peek_symbol("*") {
                BinOp::Mul
            } else if self.peek_symbol("/") {
                BinOp::Div
            } else if self.peek_symbol("%") {
                BinOp::Mod
            } else {
                break;
            };
            self.pos += 1;
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        if self.peek_symbol("-") {
            let start = self.here();
            self.pos += 1;
            let operand = self.parse_factor()?;
            let span = merge_span(start, operand.span());
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.consume_symbol(".") {
                let attr = self.expect_name()?;
                let span = merge_span(expr.span(), attr.span);
                expr = Expr::Attribute {
                    base: Box::new(expr),
                    attr,
                    span,
                };
            } else if self.peek_symbol("(") {
                let args = self.parse_call_args()?;
                let end = self.tokens[self.pos - 1].span;
                let span = merge_span(expr.span(), end);
                expr = Expr::Call {
                    func: Box::new(expr),
                    args,
                    span,
                };
            } else if self.consume_symbol("[") {
                let index = self.parse_expr()?;
                let end = self.expect_symbol("]")?;
                let span = merge_span(expr.span(), end);
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<Vec<Arg>, Diagnostic> {
        self.expect_symbol("(")?;
        let mut args = Vec::new();
        if !self.peek_symbol(")") {
            loop {
                if self.consume_symbol("**") {
                    args.push(Arg {
                        value: self.parse_expr()?,
                        keyword: None,
                        star: StarKind::DoubleStar,
                    });
                } else if self.consume_symbol("*") {
                    args.push(Arg {
                        value: self.parse_expr()?,
                        keyword: None,
                        star: StarKind::Star,
                    });
                } else {
                    // `name=value` is a keyword argument when the name is a
                    // plain identifier directly followed by `=`.
                    let is_keyword = self
                        .peek()
                        .is_some_and(|token| {
                            token.kind == TokenKind::Ident
                                && !KEYWORDS.contains(&token.text.as_str())
                        })
                        && self
                            .tokens
                            .get(self.pos + 1)
                            .is_some_and(|token| {
                                token.kind == TokenKind::Symbol && token.text == "="
                            });
                    if is_keyword {
                        let keyword = self.expect_name()?;
                        self.expect_symbol("=")?;
                        args.push(Arg {
                            value: self.parse_expr()?,
                            keyword: Some(keyword),
                            star: StarKind::None,
                        });
                    } else {
                        args.push(Arg::positional(self.parse_expr()?));
                    }
                }
                if !self.consume_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error_here("expected an expression"));
        };

        match token.kind {
            TokenKind::Int => {
                self.pos += 1;
                let value = token.text.parse::<i64>().map_err(|_| {
                    Diagnostic::error("parse:int", "integer literal out of range", token.span)
                })?;
                Ok(Expr::Int {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Float => {
                self.pos += 1;
                let value = token.text.parse::<f64>().map_err(|_| {
                    Diagnostic::error("parse:float", "invalid float literal", token.span)
                })?;
                Ok(Expr::Float {
                    value,
                    span: token.span,
                })
            }
            TokenKind::Str => {
                self.pos += 1;
                Ok(Expr::Str {
                    value: token.text,
                    span: token.span,
                })
            }
            TokenKind::Ident => match token.text.as_str() {
                "True" | "False" => {
                    self.pos += 1;
                    Ok(Expr::Bool {
                        value: token.text == "True",
                        span: token.span,
                    })
                }
                "None" => {
                    self.pos += 1;
                    Ok(Expr::None { span: token.span })
                }
                text if KEYWORDS.contains(&text) => {
                    Err(self.error_here(format!("unexpected keyword `{text}`")))
                }
                _ => {
                    self.pos += 1;
                    Ok(Expr::Name(SpannedName::new(token.text, token.span)))
                }
            },
            TokenKind::Symbol => match token.text.as_str() {
                "(" => {
                    let start = self.expect_symbol("(")?;
                    if self.peek_symbol(")") {
                        let end = self.expect_symbol(")")?;
                        return Ok(Expr::Tuple {
                            items: Vec::new(),
                            span: merge_span(start, end),
                        });
                    }
                    let first = self.parse_expr()?;
                    if self.peek_symbol(",") {
                        let mut items = vec![first];
                        while self.consume_symbol(",") {
                            if self.peek_symbol(")") {
                                break;
                            }
                            items.push(self.parse_expr()?);
                        }
                        let end = self.expect_symbol(")")?;
                        return Ok(Expr::Tuple {
                            items,
                            span: merge_span(start, end),
                        });
                    }
                    self.expect_symbol(")")?;
                    Ok(first)
                }
                "[" => self.parse_list_or_comp(),
                "{" => {
                    let start = self.expect_symbol("{")?;
                    let mut entries = Vec::new();
                    if !self.peek_symbol("}") {
                        loop {
                            let key = self.parse_expr()?;
                            self.expect_symbol(":")?;
                            let value = self.parse_expr()?;
                            entries.push((key, value));
                            if !self.consume_symbol(",") {
                                break;
                            }
                        }
                    }
                    let end = self.expect_symbol("}")?;
                    Ok(Expr::Dict {
                        entries,
                        span: merge_span(start, end),
                    })
                }
                text => Err(self.error_here(format!("unexpected `{text}`"))),
            },
            _ => Err(self.error_here("expected an expression")),
        }
    }

    fn parse_list_or_comp(&mut self) -> Result<Expr, Diagnostic> {
        let start = self.expect_symbol("[")?;
        if self.peek_symbol("]") {
            let end = self.expect_symbol("]")?;
            return Ok(Expr::List {
                items: Vec::new(),
                span: merge_span(start, end),
            });
        }

        let first = self.parse_expr()?;
        if self.peek_ident("for") {
            let mut clauses = Vec::new();
            while self.peek_ident("for") {
                let for_span = self.expect_keyword("for")?;
                let target = self.parse_target_list()?;
                self.expect_keyword("in")?;
                let iter = self.parse_or()?;
                let cond = if self.consume_ident_kw("if") {
                    Some(self.parse_or()?)
                } else {
                    None
                };
                let end = cond
                    .as_ref()
                    .map(Expr::span)
                    .unwrap_or_else(|| iter.span());
                clauses.push(CompClause {
                    target,
                    iter,
                    cond,
                    span: merge_span(for_span, end),
                });
            }
            let end = self.expect_symbol("]")?;
            return Ok(Expr::ListComp {
                elt: Box::new(first),
                clauses,
                span: merge_span(start, end),
            });
        }

        let mut items = vec![first];
        while self.consume_symbol(",") {
            if self.peek_symbol("]") {
                break;
            }
            items.push(self.parse_expr()?);
        }
        let end = self.expect_symbol("]")?;
        Ok(Expr::List {
            items,
            span: merge_span(start, end),
        })
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let span = merge_span(left.span(), right.span());
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        span,
    }
}

fn expr_to_target(expr: Expr) -> Result<AssignTarget, Diagnostic> {
    match expr {
        Expr::Name(name) => Ok(AssignTarget::Name(name)),
        Expr::Attribute { base, attr, span } => Ok(AssignTarget::Attribute {
            base: *base,
            attr,
            span,
        }),
        Expr::Index { base, index, span } => Ok(AssignTarget::Index {
            base: *base,
            index: *index,
            span,
        }),
        Expr::Tuple { items, span } => {
            let items = items
                .into_iter()
                .map(expr_to_target)
                .collect::<Result<Vec<_>, _>>()?;
            Ok(AssignTarget::Tuple { items, span })
        }
        other => Err(Diagnostic::error(
            "parse:target",
            "expression cannot be assigned to",
            other.span(),
        )),
    }
}
