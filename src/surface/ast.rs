use crate::diagnostics::Span;

/// Separator used when a spliced-in local is renamed after its defining
/// function, e.g. `x___helper`. Suffix removal splits on this.
pub const SEP: &str = "___";

#[derive(Debug, Clone, PartialEq)]
pub struct SpannedName {
    pub name: String,
    pub span: Span,
}

impl SpannedName {
    pub fn new(name: impl Into<String>, span: Span) -> Self {
        SpannedName {
            name: name.into(),
            span,
        }
    }

    pub fn synthetic(name: impl Into<String>) -> Self {
        SpannedName {
            name: name.into(),
            span: Span::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    pub name: SpannedName,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: SpannedName,
    pub default: Option<Expr>,
}

/// Parameter list of a function definition: positional parameters (trailing
/// ones may carry defaults), an optional `*args`, keyword-only parameters
/// (all carry defaults), and an optional `**kwargs`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    pub params: Vec<Param>,
    pub vararg: Option<SpannedName>,
    pub kwonly: Vec<Param>,
    pub kwarg: Option<SpannedName>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub decorators: Vec<Decorator>,
    pub name: SpannedName,
    pub params: Params,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub decorators: Vec<Decorator>,
    pub name: SpannedName,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportAlias {
    pub name: SpannedName,
    pub alias: Option<SpannedName>,
}

impl ImportAlias {
    /// The name this alias binds in the importing scope.
    pub fn bound_name(&self) -> &str {
        match &self.alias {
            Some(alias) => &alias.name,
            None => &self.name.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AssignTarget {
    Name(SpannedName),
    Attribute {
        base: Expr,
        attr: SpannedName,
        span: Span,
    },
    Index {
        base: Expr,
        index: Expr,
        span: Span,
    },
    Tuple {
        items: Vec<AssignTarget>,
        span: Span,
    },
}

impl AssignTarget {
    pub fn span(&self) -> Span {
        match self {
            AssignTarget::Name(name) => name.span,
            AssignTarget::Attribute { span, .. }
            | AssignTarget::Index { span, .. }
            | AssignTarget::Tuple { span, .. } => *span,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: AssignTarget,
        value: Expr,
        span: Span,
    },
    ExprStmt {
        expr: Expr,
        span: Span,
    },
    Assert {
        expr: Expr,
        message: Option<Expr>,
        span: Span,
    },
    If {
        cond: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
        span: Span,
    },
    For {
        target: AssignTarget,
        iter: Expr,
        body: Vec<Stmt>,
        span: Span,
    },
    FuncDef(FuncDef),
    ClassDef(ClassDef),
    Return {
        value: Option<Expr>,
        span: Span,
    },
    Import {
        module: SpannedName,
        alias: Option<SpannedName>,
        span: Span,
    },
    FromImport {
        module: SpannedName,
        names: Vec<ImportAlias>,
        span: Span,
    },
    With {
        context: Expr,
        binding: Option<SpannedName>,
        body: Vec<Stmt>,
        span: Span,
    },
    Try {
        body: Vec<Stmt>,
        handler: Vec<Stmt>,
        span: Span,
    },
    Pass {
        span: Span,
    },
    Comment {
        text: String,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Assign { span, .. }
            | Stmt::ExprStmt { span, .. }
            | Stmt::Assert { span, .. }
            | Stmt::If { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Return { span, .. }
            | Stmt::Import { span, .. }
            | Stmt::FromImport { span, .. }
            | Stmt::With { span, .. }
            | Stmt::Try { span, .. }
            | Stmt::Pass { span }
            | Stmt::Comment { span, .. } => *span,
            Stmt::FuncDef(def) => def.span,
            Stmt::ClassDef(def) => def.span,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Stmt::Comment { .. })
    }

    pub fn is_import(&self) -> bool {
        matches!(self, Stmt::Import { .. } | Stmt::FromImport { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    In,
    NotIn,
}

impl BinOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
            BinOp::In => "in",
            BinOp::NotIn => "not in",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarKind {
    None,
    Star,
    DoubleStar,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub value: Expr,
    pub keyword: Option<SpannedName>,
    pub star: StarKind,
}

impl Arg {
    pub fn positional(value: Expr) -> Self {
        Arg {
            value,
            keyword: None,
            star: StarKind::None,
        }
    }
}

/// One `for target in iter [if cond]` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct CompClause {
    pub target: AssignTarget,
    pub iter: Expr,
    pub cond: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(SpannedName),
    Int {
        value: i64,
        span: Span,
    },
    Float {
        value: f64,
        span: Span,
    },
    Str {
        value: String,
        span: Span,
    },
    Bool {
        value: bool,
        span: Span,
    },
    None {
        span: Span,
    },
    List {
        items: Vec<Expr>,
        span: Span,
    },
    Tuple {
        items: Vec<Expr>,
        span: Span,
    },
    Dict {
        entries: Vec<(Expr, Expr)>,
        span: Span,
    },
    Attribute {
        base: Box<Expr>,
        attr: SpannedName,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Arg>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        span: Span,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    IfExp {
        cond: Box<Expr>,
        then: Box<Expr>,
        orelse: Box<Expr>,
        span: Span,
    },
    ListComp {
        elt: Box<Expr>,
        clauses: Vec<CompClause>,
        span: Span,
    },
    Yield {
        value: Box<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Name(name) => name.span,
            Expr::Int { span, .. }
            | Expr::Float { span, .. }
            | Expr::Str { span, .. }
            | Expr::Bool { span, .. }
            | Expr::None { span }
            | Expr::List { span, .. }
            | Expr::Tuple { span, .. }
            | Expr::Dict { span, .. }
            | Expr::Attribute { span, .. }
            | Expr::Index { span, .. }
            | Expr::Call { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Binary { span, .. }
            | Expr::IfExp { span, .. }
            | Expr::ListComp { span, .. }
            | Expr::Yield { span, .. } => *span,
        }
    }

    pub fn name(name: impl Into<String>) -> Expr {
        Expr::Name(SpannedName::synthetic(name))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::Str {
            value: value.into(),
            span: Span::default(),
        }
    }
}

/// `target = value` with synthetic spans, for pass-generated statements.
pub fn make_assign(name: impl Into<String>, value: Expr) -> Stmt {
    Stmt::Assign {
        target: AssignTarget::Name(SpannedName::synthetic(name)),
        value,
        span: Span::default(),
    }
}

pub fn make_call(func: Expr, args: Vec<Expr>) -> Expr {
    Expr::Call {
        func: Box::new(func),
        args: args.into_iter().map(Arg::positional).collect(),
        span: Span::default(),
    }
}
