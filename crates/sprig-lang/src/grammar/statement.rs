//! Statement nodes of rule bodies and the containers that own them.

use std::collections::BTreeMap;

use bitflags::bitflags;
use once_cell::sync::OnceCell;

use crate::error::{Error, ErrorCode};
use crate::path::{CommandKind, PathArg, PathArgs, PathFlags, PathOpKind};
use crate::runtime::eval::eval_const;
use crate::runtime::value::Value;
use crate::syntax::ast::{ExpType, Expr, ModBundle, Param, ShapeSpec, ShapeTarget, Span};

bitflags! {
    /// What a statement or body contributes when expanded.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RepKind: u8 {
        const OP          = 1;
        const COMMAND     = 2;
        const REPLACEMENT = 4;
        const MIXED       = Self::OP.bits() | Self::COMMAND.bits();
    }
}

// ─── Container ────────────────────────────────────────────────────────────────

/// An ordered body of statements with its declared parameters.
#[derive(Debug, Default)]
pub struct Container {
    pub statements: Vec<Statement>,
    pub params: Vec<Param>,
    pub is_global: bool,
    stack_count: usize,
}

impl Container {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self::with_params(Vec::new(), statements)
    }

    pub fn with_params(params: Vec<Param>, statements: Vec<Statement>) -> Self {
        let mut c = Self { statements, params, is_global: false, stack_count: 0 };
        c.recount();
        c
    }

    pub(crate) fn global(statements: Vec<Statement>) -> Self {
        let mut c = Self::new(statements);
        c.is_global = true;
        c
    }

    pub fn is_empty(&self) -> bool { self.statements.is_empty() }

    /// Slots pushed by one entry: the parameters plus one per direct define.
    pub fn stack_count(&self) -> usize { self.stack_count }

    pub(crate) fn bind_params(&mut self, params: Vec<Param>) {
        self.params = params;
        self.recount();
    }

    pub(crate) fn push(&mut self, statement: Statement) {
        self.statements.push(statement);
        self.recount();
    }

    fn recount(&mut self) {
        let defines = self.statements.iter().filter(|s| matches!(s.node, Node::Define(_))).count();
        self.stack_count = self.params.len() + defines;
    }

    pub fn rep_kind(&self) -> RepKind {
        self.statements.iter().fold(RepKind::empty(), |k, s| k | s.rep_kind())
    }

    /// Only path operators and commands (or nothing that draws).
    pub fn is_ops_only(&self) -> bool {
        RepKind::MIXED.contains(self.rep_kind())
    }
}

// ─── Statement ────────────────────────────────────────────────────────────────

/// A statement node. The target and modification bundle are shared by every
/// kind; `node` carries the kind-specific payload.
#[derive(Debug)]
pub struct Statement {
    pub spec: ShapeSpec,
    pub mods: ModBundle,
    pub span: Span,
    pub node: Node,
}

#[derive(Debug)]
pub enum Node {
    Replacement,
    Loop(Loop),
    Transform(Transform),
    If(If),
    Switch(Switch),
    Define(Define),
    PathOp(PathOp),
    PathCommand(PathCommand),
}

impl Statement {
    pub fn replace(spec: ShapeSpec, mods: ModBundle) -> Self {
        Self { spec, mods, span: Span::default(), node: Node::Replacement }
    }

    pub fn new(node: Node) -> Self {
        Self { spec: ShapeSpec::NONE, mods: ModBundle::default(), span: Span::default(), node }
    }

    pub fn with_mods(mut self, mods: ModBundle) -> Self {
        self.mods = mods;
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn rep_kind(&self) -> RepKind {
        match &self.node {
            Node::Replacement => match self.spec.target {
                ShapeTarget::None => RepKind::empty(),
                _ => RepKind::REPLACEMENT,
            },
            Node::Loop(l)      => l.body.rep_kind() | l.finally.rep_kind(),
            Node::Transform(t) => t.body.rep_kind(),
            Node::If(i)        => i.then_body.rep_kind() | i.else_body.rep_kind(),
            Node::Switch(s)    => s.bodies().fold(RepKind::empty(), |k, b| k | b.rep_kind()),
            Node::Define(_)    => RepKind::empty(),
            Node::PathOp(_)    => RepKind::OP,
            Node::PathCommand(_) => RepKind::COMMAND,
        }
    }

    /// Child containers, in traversal order.
    pub fn bodies(&self) -> Vec<&Container> {
        match &self.node {
            Node::Loop(l)      => vec![&l.body, &l.finally],
            Node::Transform(t) => vec![&t.body],
            Node::If(i)        => vec![&i.then_body, &i.else_body],
            Node::Switch(s)    => s.bodies().collect(),
            _ => Vec::new(),
        }
    }
}

// ─── Loop ─────────────────────────────────────────────────────────────────────

/// Inclusive `start..=end` by a positive `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl LoopRange {
    /// `n` counts 0..n-1; `(a, b)` steps by one; `(a, b, s)` is explicit.
    pub fn from_value(value: &Value, span: &Span) -> Result<Self, Error> {
        let bad = |msg: String| Error::at(ErrorCode::G001, span, msg);
        let nums = value.numbers()
            .ok_or_else(|| bad(format!("loop range must be numeric, found {}", value.type_name())))?;
        let (start, end, step) = match nums.as_slice() {
            [n]          => (0.0, n - 1.0, 1.0),
            [a, b]       => (*a, *b, 1.0),
            [a, b, s]    => (*a, *b, *s),
            other => return Err(bad(format!("loop range takes 1 to 3 values, found {}", other.len()))),
        };
        if !(start.is_finite() && end.is_finite() && step.is_finite()) {
            return Err(bad("loop range is not finite".into()));
        }
        if step <= 0.0 {
            return Err(bad(format!("loop step must be positive, found {step}")));
        }
        Ok(Self { start, end, step })
    }

    pub fn iterations(&self) -> usize {
        if self.end < self.start {
            return 0;
        }
        ((self.end - self.start) / self.step + 1e-9).floor() as usize + 1
    }

    pub fn value(&self, i: usize) -> f64 { self.start + i as f64 * self.step }
}

#[derive(Debug)]
pub struct Loop {
    pub var: Param,
    pub range: Expr,
    pub body: Container,
    /// Runs once after the last iteration, with the variable at its last value.
    pub finally: Container,
    constant: Option<LoopRange>,
    ops_only: bool,
}

impl Loop {
    pub fn new(var: Param, range: Expr, mut body: Container, mut finally: Container) -> Result<Self, Error> {
        let constant = if range.is_constant() {
            let value = eval_const(&range)
                .map_err(|e| Error::at(ErrorCode::G001, range.span(), e.to_string()))?;
            Some(LoopRange::from_value(&value, range.span())?)
        } else {
            None
        };
        body.bind_params(vec![var.clone()]);
        finally.bind_params(vec![var.clone()]);
        let ops_only = body.is_ops_only() && finally.is_ops_only();
        Ok(Self { var, range, body, finally, constant, ops_only })
    }

    pub fn constant_range(&self) -> Option<&LoopRange> { self.constant.as_ref() }

    pub fn is_ops_only(&self) -> bool { self.ops_only }
}

// ─── Transform ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Symmetry {
    Mods(ModBundle),
    /// Rotations by multiples of 360/n degrees.
    Cyclic(u32),
    /// The cyclic rotations followed by n reflections.
    Dihedral(u32),
}

#[derive(Debug)]
pub struct Transform {
    pub generators: Vec<Symmetry>,
    pub body: Container,
    /// Replicas start from the parent with the random state restored.
    pub clone: bool,
    ops_only: bool,
}

impl Transform {
    pub fn new(generators: Vec<Symmetry>, body: Container, clone: bool) -> Self {
        let ops_only = body.is_ops_only();
        Self { generators, body, clone, ops_only }
    }

    pub fn is_ops_only(&self) -> bool { self.ops_only }
}

// ─── Conditionals ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct If {
    pub cond: Expr,
    pub then_body: Container,
    pub else_body: Container,
}

impl If {
    pub fn new(cond: Expr, then_body: Container) -> Self {
        Self { cond, then_body, else_body: Container::default() }
    }

    pub fn with_else(mut self, else_body: Container) -> Self {
        self.else_body = else_body;
        self
    }
}

#[derive(Debug)]
pub struct Switch {
    pub selector: Expr,
    cases: BTreeMap<i64, usize>,
    bodies: Vec<Container>,
    pub default: Container,
}

impl Switch {
    pub fn new(selector: Expr) -> Self {
        Self { selector, cases: BTreeMap::new(), bodies: Vec::new(), default: Container::default() }
    }

    /// Register `body` for every value in `values`. Keys are unique across
    /// the whole switch.
    pub fn add_case(&mut self, values: &[i64], body: Container, span: &Span) -> Result<(), Error> {
        for (i, v) in values.iter().enumerate() {
            if self.cases.contains_key(v) || values[..i].contains(v) {
                return Err(Error::at(ErrorCode::G002, span, format!("duplicate case value {v}")));
            }
        }
        let index = self.bodies.len();
        self.bodies.push(body);
        for v in values {
            self.cases.insert(*v, index);
        }
        Ok(())
    }

    pub fn with_default(mut self, body: Container) -> Self {
        self.default = body;
        self
    }

    /// Body for `key`, or the default on a miss.
    pub fn case(&self, key: i64) -> &Container {
        self.cases.get(&key).map_or(&self.default, |&i| &self.bodies[i])
    }

    pub fn bodies(&self) -> impl Iterator<Item = &Container> {
        self.bodies.iter().chain(std::iter::once(&self.default))
    }

    pub(crate) fn bodies_mut(&mut self) -> impl Iterator<Item = &mut Container> {
        self.bodies.iter_mut().chain(std::iter::once(&mut self.default))
    }
}

// ─── Define ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum DefineBody {
    Expr(Expr),
    Mods(ModBundle),
}

#[derive(Debug)]
pub struct Define {
    pub name: String,
    pub body: DefineBody,
    pub ty: ExpType,
    pub arity: usize,
    /// Parameters of a function define.
    pub params: Vec<Param>,
    pub is_function: bool,
    pub(crate) constant: bool,
    pub(crate) cache: OnceCell<Value>,
}

impl Define {
    pub fn value(name: impl Into<String>, ty: ExpType, arity: usize, expr: Expr) -> Self {
        Self {
            name: name.into(),
            body: DefineBody::Expr(expr),
            ty,
            arity,
            params: Vec::new(),
            is_function: false,
            constant: false,
            cache: OnceCell::new(),
        }
    }

    pub fn number(name: impl Into<String>, expr: Expr) -> Self {
        Self::value(name, ExpType::Numeric, 1, expr)
    }

    pub fn adjustment(name: impl Into<String>, mods: ModBundle) -> Self {
        let mut d = Self::value(name, ExpType::Mod, 1, Expr::num(0.0));
        d.body = DefineBody::Mods(mods);
        d
    }

    pub fn function(name: impl Into<String>, params: Vec<Param>, ty: ExpType, arity: usize, expr: Expr) -> Self {
        let mut d = Self::value(name, ty, arity, expr);
        d.params = params;
        d.is_function = true;
        d
    }

    /// Decided at grammar load: the value never changes, so it is cached.
    pub fn is_constant(&self) -> bool { self.constant }

    pub fn stack_count(&self) -> usize { self.params.len() }

    pub fn is_constant_in(&self, bound: &[&str]) -> bool {
        match &self.body {
            DefineBody::Expr(e)  => e.is_constant_in(bound),
            DefineBody::Mods(m)  => m.is_constant_in(bound),
        }
    }
}

// ─── Path statements ──────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct PathOp {
    pub kind: PathOpKind,
    pub args: Vec<(PathArg, Expr)>,
    pub flags: PathFlags,
    cubic: bool,
    constant: Option<PathArgs>,
}

impl PathOp {
    /// Check the argument set against the operator and precompute constant
    /// arguments.
    pub fn new(kind: PathOpKind, args: Vec<(PathArg, Expr)>, flags: PathFlags, span: &Span) -> Result<Self, Error> {
        let bad = |msg: String| Error::at(ErrorCode::G009, span, msg);
        let has = |a: PathArg| args.iter().any(|(b, _)| *b == a);

        for (i, (arg, expr)) in args.iter().enumerate() {
            if !kind.accepts(*arg) {
                return Err(bad(format!("{} does not take '{}'", kind.name(), arg.name())));
            }
            if args[..i].iter().any(|(b, _)| b == arg) {
                return Err(bad(format!("'{}' given twice", arg.name())));
            }
            if matches!(expr.static_arity(), Some(n) if n != 1) {
                return Err(bad(format!("'{}' must be a single number", arg.name())));
            }
        }
        if !kind.accepted_flags().contains(flags) {
            return Err(bad(format!("invalid flags for {}", kind.name())));
        }

        let mut cubic = false;
        match kind {
            PathOpKind::ArcTo | PathOpKind::ArcRel => {
                let circular = has(PathArg::R);
                let elliptic = has(PathArg::Rx) || has(PathArg::Ry);
                if circular == elliptic || (elliptic && !(has(PathArg::Rx) && has(PathArg::Ry))) {
                    return Err(bad(format!("{} needs either r or both rx and ry", kind.name())));
                }
            }
            PathOpKind::CurveTo | PathOpKind::CurveRel => {
                if !(has(PathArg::X1) && has(PathArg::Y1)) {
                    return Err(bad(format!("{} needs x1 and y1", kind.name())));
                }
                cubic = has(PathArg::X2) || has(PathArg::Y2);
                if cubic && !(has(PathArg::X2) && has(PathArg::Y2)) {
                    return Err(bad(format!("{} needs both x2 and y2", kind.name())));
                }
            }
            _ => {}
        }

        let constant = if args.iter().all(|(_, e)| e.is_constant()) {
            let mut resolved = PathArgs::default();
            for (arg, expr) in &args {
                match eval_const(expr).map_err(|e| bad(e.to_string()))? {
                    Value::Number(v) => resolved.set(*arg, v),
                    other => return Err(bad(format!("'{}' must be a number, found {}", arg.name(), other.type_name()))),
                }
            }
            Some(resolved)
        } else {
            None
        };

        Ok(Self { kind, args, flags, cubic, constant })
    }

    pub fn is_cubic(&self) -> bool { self.cubic }

    pub fn constant_args(&self) -> Option<&PathArgs> { self.constant.as_ref() }

    pub fn is_constant_in(&self, bound: &[&str]) -> bool {
        self.args.iter().all(|(_, e)| e.is_constant_in(bound))
    }
}

#[derive(Debug)]
pub struct PathCommand {
    pub kind: CommandKind,
    pub flags: PathFlags,
    pub width: Option<Expr>,
    pub miter: Option<Expr>,
}

impl PathCommand {
    pub fn new(kind: CommandKind, flags: PathFlags, width: Option<Expr>, miter: Option<Expr>, span: &Span) -> Result<Self, Error> {
        let allowed = match kind {
            CommandKind::Fill   => PathFlags::EVEN_ODD,
            CommandKind::Stroke => PathFlags::STROKE_FLAGS,
        };
        if !allowed.contains(flags) {
            return Err(Error::at(ErrorCode::G009, span, "invalid flags for path command"));
        }
        if kind == CommandKind::Fill && (width.is_some() || miter.is_some()) {
            return Err(Error::at(ErrorCode::G009, span, "FILL takes no stroke width or miter limit"));
        }
        Ok(Self { kind, flags, width, miter })
    }

    pub fn fill() -> Self {
        Self { kind: CommandKind::Fill, flags: PathFlags::empty(), width: None, miter: None }
    }

    pub fn stroke(width: Expr) -> Self {
        Self { kind: CommandKind::Stroke, flags: PathFlags::empty(), width: Some(width), miter: None }
    }

    pub fn is_constant_in(&self, bound: &[&str]) -> bool {
        self.width.iter().chain(self.miter.iter()).all(|e| e.is_constant_in(bound))
    }
}
