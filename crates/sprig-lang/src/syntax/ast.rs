/// Source location attached to every node for error reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

// ─── Types ───────────────────────────────────────────────────────────────────

/// Type tag of an expression or declared parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpType {
    Numeric,
    Flag,
    Mod,
}

impl ExpType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Numeric => "number",
            Self::Flag    => "flag",
            Self::Mod     => "adjustment",
        }
    }
}

/// A declared parameter of a shape, a function define or a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ExpType,
    /// Tuple width; 1 for plain numbers, flags and adjustments.
    pub arity: usize,
    pub span: Span,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: ExpType, arity: usize, span: Span) -> Self {
        Self { name: name.into(), ty, arity, span }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ExpType::Numeric, 1, Span::default())
    }
}

// ─── Expressions ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64, Span),
    Bool(bool, Span),
    Var(String, Span),

    /// `(a, b, c)`; flattened to a numeric vector when evaluated.
    Tuple(Vec<Expr>, Span),

    UnOp {
        op: UnOp,
        operand: Box<Expr>,
        span: Span,
    },

    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
        span: Span,
    },

    /// `name(args)`: a builtin or a function define.
    Call {
        callee: String,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::Number(_, s)        => s,
            Expr::Bool(_, s)          => s,
            Expr::Var(_, s)           => s,
            Expr::Tuple(_, s)         => s,
            Expr::UnOp { span, .. }   => span,
            Expr::BinOp { span, .. }  => span,
            Expr::Call { span, .. }   => span,
        }
    }

    pub fn num(v: f64) -> Self { Expr::Number(v, Span::default()) }

    pub fn flag(v: bool) -> Self { Expr::Bool(v, Span::default()) }

    pub fn var(name: impl Into<String>) -> Self { Expr::Var(name.into(), Span::default()) }

    pub fn tuple(items: Vec<Expr>) -> Self { Expr::Tuple(items, Span::default()) }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call { callee: callee.into(), args, span: Span::default() }
    }

    pub fn binary(left: Expr, op: BinOp, right: Expr) -> Self {
        Expr::BinOp { left: Box::new(left), op, right: Box::new(right), span: Span::default() }
    }

    pub fn unary(op: UnOp, operand: Expr) -> Self {
        Expr::UnOp { op, operand: Box::new(operand), span: Span::default() }
    }

    /// Constant when the value cannot change between evaluations: no random
    /// draws, no function calls, and only variables named in `bound` (names
    /// already known to hold constants).
    pub fn is_constant_in(&self, bound: &[&str]) -> bool {
        match self {
            Expr::Number(..) | Expr::Bool(..) => true,
            Expr::Var(name, _)     => bound.contains(&name.as_str()),
            Expr::Tuple(items, _)  => items.iter().all(|e| e.is_constant_in(bound)),
            Expr::UnOp { operand, .. } => operand.is_constant_in(bound),
            Expr::BinOp { left, right, .. } => left.is_constant_in(bound) && right.is_constant_in(bound),
            Expr::Call { callee, args, .. } => {
                is_pure_builtin(callee) && args.iter().all(|e| e.is_constant_in(bound))
            }
        }
    }

    pub fn is_constant(&self) -> bool { self.is_constant_in(&[]) }

    /// Variables and non-builtin callees referenced by the expression.
    pub fn names<'a>(&'a self, out: &mut Vec<(&'a str, &'a Span)>) {
        match self {
            Expr::Number(..) | Expr::Bool(..) => {}
            Expr::Var(name, span) => out.push((name.as_str(), span)),
            Expr::Tuple(items, _) => items.iter().for_each(|e| e.names(out)),
            Expr::UnOp { operand, .. } => operand.names(out),
            Expr::BinOp { left, right, .. } => {
                left.names(out);
                right.names(out);
            }
            Expr::Call { callee, args, span } => {
                if !is_builtin(callee) {
                    out.push((callee.as_str(), span));
                }
                args.iter().for_each(|e| e.names(out));
            }
        }
    }

    /// Static tuple width, when it can be read off the syntax.
    pub fn static_arity(&self) -> Option<usize> {
        match self {
            Expr::Tuple(items, _) => items.iter().map(|e| e.static_arity()).sum(),
            Expr::Number(..) | Expr::Bool(..) => Some(1),
            Expr::UnOp { operand, .. } => operand.static_arity(),
            _ => None,
        }
    }
}

/// Builtins whose result depends only on their arguments.
pub fn is_pure_builtin(name: &str) -> bool {
    matches!(name,
        "sin" | "cos" | "tan" | "atan" | "atan2" | "sqrt" | "abs"
        | "floor" | "ceil" | "exp" | "log" | "min" | "max")
}

/// Builtins that draw from the session random source.
pub fn is_random_builtin(name: &str) -> bool {
    matches!(name, "rand" | "randint")
}

pub fn is_builtin(name: &str) -> bool {
    is_pure_builtin(name) || is_random_builtin(name)
}

// ─── Operators ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add, Sub, Mul, Div, Mod, Pow,
    Eq, NotEq,
    Lt, LtEq, Gt, GtEq,
    And, Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add  => "+",  BinOp::Sub  => "-",
            BinOp::Mul  => "*",  BinOp::Div  => "/",
            BinOp::Mod  => "%",  BinOp::Pow  => "^",
            BinOp::Eq   => "==", BinOp::NotEq => "!=",
            BinOp::Lt   => "<",  BinOp::LtEq => "<=",
            BinOp::Gt   => ">",  BinOp::GtEq => ">=",
            BinOp::And  => "and", BinOp::Or  => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

// ─── Modifications ───────────────────────────────────────────────────────────

/// Kind of one term in an adjustment bundle such as `[x 1 r 45 b 0.5]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ModKind {
    /// One or two values: x, or x and y.
    Translate,
    X,
    Y,
    Z,
    /// Degrees.
    Rotate,
    /// One value for uniform scale, two for x and y.
    Size,
    /// Two angles in degrees.
    Skew,
    /// Reflection across the line at this angle (degrees).
    Flip,
    Hue,
    Sat,
    Bright,
    Alpha,
    /// Splices in an adjustment-valued expression.
    Transform,
}

impl ModKind {
    /// Position in the canonical order used by unordered bundles. Color and
    /// depth terms commute with everything and share the last slot.
    pub fn canonical_rank(self) -> u8 {
        match self {
            ModKind::Translate | ModKind::X | ModKind::Y => 0,
            ModKind::Rotate    => 1,
            ModKind::Size      => 2,
            ModKind::Skew      => 3,
            ModKind::Flip      => 4,
            ModKind::Transform => 5,
            ModKind::Z | ModKind::Hue | ModKind::Sat | ModKind::Bright | ModKind::Alpha => 6,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModTerm {
    pub kind: ModKind,
    pub args: Vec<Expr>,
    pub span: Span,
}

impl ModTerm {
    pub fn new(kind: ModKind, args: Vec<Expr>) -> Self {
        Self { kind, args, span: Span::default() }
    }
}

/// Deferred adjustments applied to a shape instance before recursing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModBundle {
    pub terms: Vec<ModTerm>,
    /// `[ ]` bundles apply terms in sequence; `{ }` bundles use canonical order.
    pub ordered: bool,
}

impl ModBundle {
    pub fn ordered(terms: Vec<ModTerm>) -> Self { Self { terms, ordered: true } }

    pub fn canonical(terms: Vec<ModTerm>) -> Self { Self { terms, ordered: false } }

    pub fn is_empty(&self) -> bool { self.terms.is_empty() }

    pub fn is_constant_in(&self, bound: &[&str]) -> bool {
        self.terms.iter().all(|t| t.args.iter().all(|e| e.is_constant_in(bound)))
    }

    pub fn names<'a>(&'a self, out: &mut Vec<(&'a str, &'a Span)>) {
        for t in &self.terms {
            t.args.iter().for_each(|e| e.names(out));
        }
    }
}

// ─── Shape specifiers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Circle,
    Square,
    Triangle,
}

/// What a replacement expands into. Named shapes are indices into the
/// grammar's shape table, never pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeTarget {
    /// Statements that do not replace anything (loops, defines, path ops).
    None,
    Primitive(Primitive),
    Shape(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapeSpec {
    pub target: ShapeTarget,
    /// Parameter values bound into the target shape's frame.
    pub args: Vec<Expr>,
}

impl ShapeSpec {
    pub const NONE: ShapeSpec = ShapeSpec { target: ShapeTarget::None, args: Vec::new() };

    pub fn primitive(p: Primitive) -> Self {
        Self { target: ShapeTarget::Primitive(p), args: Vec::new() }
    }

    pub fn shape(index: usize, args: Vec<Expr>) -> Self {
        Self { target: ShapeTarget::Shape(index), args }
    }
}
