//! Load-time checks and classification, run once by `GrammarBuilder::build`.
//!
//! - shape references resolve and pass the right number of arguments
//! - path rules hold only path statements, other rules hold none
//! - names are unique within each body
//! - rule weights are normalized and accumulated
//! - every variable and function name is in scope where it is used
//! - defines are marked constant and path rules static

use tracing::warn;

use crate::error::{Error, ErrorCode};
use crate::grammar::shape::{Shape, WeightKind};
use crate::grammar::statement::{Container, DefineBody, Node, RepKind, Statement, Symmetry};
use crate::syntax::ast::{Expr, ShapeTarget, Span};

pub struct Validator {
    pub errors: Vec<Error>,
}

impl Validator {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn validate(mut self, shapes: &mut [Shape], globals: &mut Container) -> Vec<Error> {
        self.check_references(shapes, globals);
        self.check_rule_kinds(shapes);
        self.check_names(shapes, globals);
        for shape in shapes.iter_mut() {
            self.normalize_weights(shape);
        }
        let undefined = classify(shapes, globals);
        self.errors.extend(undefined);
        self.errors
    }

    fn push(&mut self, code: ErrorCode, span: &Span, msg: impl Into<String>) {
        self.errors.push(Error::at(code, span, msg));
    }

    // ─── References ───────────────────────────────────────────────────────────

    fn check_references(&mut self, shapes: &[Shape], globals: &Container) {
        for shape in shapes {
            for rule in shape.rules() {
                self.check_container_refs(&rule.body, shapes);
            }
        }
        self.check_container_refs(globals, shapes);
    }

    fn check_container_refs(&mut self, body: &Container, shapes: &[Shape]) {
        for st in &body.statements {
            if let ShapeTarget::Shape(idx) = st.spec.target {
                match shapes.get(idx) {
                    None => self.push(ErrorCode::G004, &st.span, format!("no shape with index {idx}")),
                    Some(target) => {
                        if st.spec.args.len() != target.params.len() {
                            self.push(ErrorCode::G003, &st.span, format!(
                                "'{}' takes {} arguments, given {}",
                                target.name, target.params.len(), st.spec.args.len(),
                            ));
                        }
                        if target.rules().is_empty() {
                            self.push(ErrorCode::G008, &st.span, format!("shape '{}' has no rules", target.name));
                        }
                    }
                }
            }
            for child in st.bodies() {
                self.check_container_refs(child, shapes);
            }
        }
    }

    // ─── Body kinds ───────────────────────────────────────────────────────────

    fn check_rule_kinds(&mut self, shapes: &[Shape]) {
        for shape in shapes {
            for rule in shape.rules() {
                let kind = rule.body.rep_kind();
                if shape.is_path && kind.contains(RepKind::REPLACEMENT) {
                    self.push(ErrorCode::G006, &rule.span, format!(
                        "path '{}' cannot replace shapes", shape.name,
                    ));
                }
                if !shape.is_path && kind.intersects(RepKind::MIXED) {
                    self.push(ErrorCode::G007, &rule.span, format!(
                        "path operations used outside a path in '{}'", shape.name,
                    ));
                }
            }
        }
    }

    // ─── Names ────────────────────────────────────────────────────────────────

    fn check_names(&mut self, shapes: &[Shape], globals: &Container) {
        self.check_container_names(globals);
        for shape in shapes {
            for rule in shape.rules() {
                self.check_container_names(&rule.body);
            }
        }
    }

    fn check_container_names(&mut self, body: &Container) {
        let mut seen: Vec<&str> = Vec::new();
        for p in &body.params {
            if seen.contains(&p.name.as_str()) {
                self.push(ErrorCode::G010, &p.span, format!("parameter '{}' declared twice", p.name));
            }
            seen.push(&p.name);
        }
        for st in &body.statements {
            if let Node::Define(d) = &st.node {
                if seen.contains(&d.name.as_str()) {
                    self.push(ErrorCode::G010, &st.span, format!("'{}' is already defined in this scope", d.name));
                }
                seen.push(&d.name);
            }
            for child in st.bodies() {
                self.check_container_names(child);
            }
        }
    }

    // ─── Weights ──────────────────────────────────────────────────────────────

    fn normalize_weights(&mut self, shape: &mut Shape) {
        for rule in &mut shape.rules {
            if !(rule.weight > 0.0 && rule.weight.is_finite()) {
                warn!(shape = %shape.name, line = rule.span.line, weight = rule.weight, "rule weight normalized to 1.0");
                self.errors.push(Error::at(ErrorCode::W001, &rule.span, format!(
                    "non-positive weight on a rule of '{}' treated as 1", shape.name,
                )));
                rule.weight = 1.0;
                rule.weight_kind = WeightKind::None;
            }
        }

        let percent: f64 = shape.rules.iter()
            .filter(|r| r.weight_kind == WeightKind::Percent)
            .map(|r| r.weight)
            .sum();
        if percent > 1.0 + 1e-9 {
            let span = shape.rules.first().map(|r| r.span.clone()).unwrap_or_default();
            self.push(ErrorCode::G005, &span, format!(
                "percentage weights of '{}' add up to {:.1}%", shape.name, percent * 100.0,
            ));
        }

        // Unweighted and explicit rules share what the percentages leave.
        let others: f64 = shape.rules.iter()
            .filter(|r| r.weight_kind != WeightKind::Percent)
            .map(|r| r.weight)
            .sum();
        if percent > 0.0 && others > 0.0 {
            let share = (1.0 - percent).max(0.0) / others;
            for rule in shape.rules.iter_mut().filter(|r| r.weight_kind != WeightKind::Percent) {
                rule.weight *= share;
            }
        }

        shape.accumulate();
    }
}

impl Default for Validator {
    fn default() -> Self { Self::new() }
}

// ─── Classification ───────────────────────────────────────────────────────────

/// A name in scope during classification.
struct Entry {
    name: String,
    /// Same value on every evaluation, anywhere.
    cached: bool,
    /// Same value on every expansion of the enclosing path rule.
    fixed: bool,
}

#[derive(Default)]
struct Scope {
    entries: Vec<Entry>,
    undefined: Vec<Error>,
}

impl Scope {
    /// Names whose innermost binding satisfies `pick`.
    fn bound(&self, pick: fn(&Entry) -> bool) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for e in self.entries.iter().rev() {
            if seen.contains(&e.name.as_str()) {
                continue;
            }
            seen.push(&e.name);
            if pick(e) {
                out.push(e.name.as_str());
            }
        }
        out
    }

    fn fixed(&self) -> Vec<&str> { self.bound(|e| e.fixed) }

    fn cached(&self) -> Vec<&str> { self.bound(|e| e.cached) }

    fn push(&mut self, name: &str, cached: bool, fixed: bool) {
        self.entries.push(Entry { name: name.to_string(), cached, fixed });
    }

    /// G012 for each name with no binding in scope.
    fn check<'a>(&mut self, names: impl IntoIterator<Item = (&'a str, &'a Span)>) {
        for (name, span) in names {
            if !self.entries.iter().any(|e| e.name == name) {
                self.undefined.push(Error::at(ErrorCode::G012, span, format!("'{name}' is not defined")));
            }
        }
    }

    fn check_exprs<'a>(&mut self, exprs: impl IntoIterator<Item = &'a Expr>) {
        let mut names = Vec::new();
        for e in exprs {
            e.names(&mut names);
        }
        self.check(names);
    }
}

/// Classify defines and path rules; returns the names found undefined.
///
/// Rules see the globals and their own bindings only, the same view the
/// expander gives them.
fn classify(shapes: &mut [Shape], globals: &mut Container) -> Vec<Error> {
    let mut scope = Scope::default();
    // Global defines stay in scope for every rule.
    for st in &mut globals.statements {
        classify_statement(st, &mut scope);
    }
    for shape in shapes.iter_mut() {
        let is_path = shape.is_path;
        for rule in &mut shape.rules {
            let fixed = classify_container(&mut rule.body, &mut scope, false);
            rule.is_static = is_path && fixed;
        }
    }
    scope.undefined
}

/// Classify every define in `body`; true when everything the body does is
/// fixed for its path rule. `params_fixed` marks the body's own parameters.
fn classify_container(body: &mut Container, scope: &mut Scope, params_fixed: bool) -> bool {
    let mark = scope.entries.len();
    for p in &body.params {
        scope.push(&p.name, false, params_fixed);
    }
    let mut fixed = true;
    for st in &mut body.statements {
        fixed &= classify_statement(st, scope);
    }
    scope.entries.truncate(mark);
    fixed
}

fn classify_statement(st: &mut Statement, scope: &mut Scope) -> bool {
    {
        let mut names = Vec::new();
        st.mods.names(&mut names);
        st.spec.args.iter().for_each(|e| e.names(&mut names));
        scope.check(names);
    }
    let (mods_fixed, args_fixed) = {
        let bound = scope.fixed();
        (st.mods.is_constant_in(&bound), st.spec.args.iter().all(|e| e.is_constant_in(&bound)))
    };

    match &mut st.node {
        Node::Replacement => mods_fixed && args_fixed,

        Node::Define(d) => {
            let mut names = Vec::new();
            match &d.body {
                DefineBody::Expr(e) => e.names(&mut names),
                DefineBody::Mods(m) => m.names(&mut names),
            }
            if d.is_function {
                // Visible to its own body, so it may recurse.
                scope.push(&d.name, false, false);
                let mark = scope.entries.len();
                for p in &d.params {
                    scope.push(&p.name, false, false);
                }
                scope.check(names);
                scope.entries.truncate(mark);
                return true;
            }
            scope.check(names);
            let cached = d.is_constant_in(&scope.cached());
            let fixed = d.is_constant_in(&scope.fixed());
            d.constant = cached;
            scope.push(&d.name, cached, fixed);
            true
        }

        Node::PathOp(op) => {
            scope.check_exprs(op.args.iter().map(|(_, e)| e));
            op.is_constant_in(&scope.fixed())
        }

        Node::PathCommand(cmd) => {
            scope.check_exprs(cmd.width.iter().chain(cmd.miter.iter()));
            mods_fixed && cmd.is_constant_in(&scope.fixed())
        }

        Node::Loop(l) => {
            scope.check_exprs([&l.range]);
            let range_fixed = l.range.is_constant_in(&scope.fixed());
            let body = classify_container(&mut l.body, scope, range_fixed);
            let finally = classify_container(&mut l.finally, scope, range_fixed);
            mods_fixed & range_fixed & body & finally
        }

        Node::Transform(t) => {
            for g in &t.generators {
                if let Symmetry::Mods(m) = g {
                    let mut names = Vec::new();
                    m.names(&mut names);
                    scope.check(names);
                }
            }
            let generators = {
                let bound = scope.fixed();
                t.generators.iter().all(|g| match g {
                    Symmetry::Mods(m) => m.is_constant_in(&bound),
                    Symmetry::Cyclic(_) | Symmetry::Dihedral(_) => true,
                })
            };
            let body = classify_container(&mut t.body, scope, false);
            mods_fixed & generators & body
        }

        Node::If(i) => {
            scope.check_exprs([&i.cond]);
            let cond = i.cond.is_constant_in(&scope.fixed());
            let then_body = classify_container(&mut i.then_body, scope, false);
            let else_body = classify_container(&mut i.else_body, scope, false);
            cond & then_body & else_body
        }

        Node::Switch(s) => {
            scope.check_exprs([&s.selector]);
            let selector = s.selector.is_constant_in(&scope.fixed());
            let mut fixed = selector;
            for body in s.bodies_mut() {
                fixed &= classify_container(body, scope, false);
            }
            fixed
        }
    }
}
