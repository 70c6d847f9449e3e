//! Recursive expansion of a grammar into renderer calls.
//!
//! Every body entry pushes a frame and unwinds it on the way out, on the
//! error path too. Random draws happen strictly in traversal order, so a
//! grammar and a seed always reproduce the same call sequence.

use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{Error, ErrorCode, RuntimeError};
use crate::grammar::shape::Rule;
use crate::grammar::statement::{
    Container, Define, DefineBody, Loop, LoopRange, Node, PathCommand, PathOp, Statement, Symmetry, Transform,
};
use crate::grammar::{Grammar, Shape, ShapeId};
use crate::options::SessionOptions;
use crate::path::{
    append_op, CommandInfo, CompiledPath, PathArgs, DEFAULT_MITER_LIMIT, DEFAULT_STROKE_WIDTH,
};
use crate::runtime::eval::{self, Env};
use crate::runtime::random::RandomSource;
use crate::runtime::renderer::{Cutoff, Renderer};
use crate::runtime::stack::{Binding, ParamStack, View};
use crate::runtime::value::Value;
use crate::syntax::ast::{ExpType, Expr, ModBundle, ShapeTarget, Span};
use crate::types::draw::{Modification, ShapeInstance};
use crate::types::geometry::Affine;

/// One render session over a grammar.
pub struct Expander<'g, 'r> {
    grammar: &'g Grammar,
    renderer: &'r mut dyn Renderer,
    stack: ParamStack<'g>,
    rng: RandomSource,
    /// Path under construction, set only while a path rule is being built.
    open_path: Option<CompiledPath>,
    view: View,
    /// Height of the global frame once it is complete.
    globals_end: usize,
    depth: usize,
    options: SessionOptions,
}

impl<'g, 'r> Expander<'g, 'r> {
    pub fn new(grammar: &'g Grammar, renderer: &'r mut dyn Renderer, options: &SessionOptions) -> Self {
        Self {
            grammar,
            renderer,
            stack: ParamStack::new(),
            rng: RandomSource::new(options.seed),
            open_path: None,
            view: View::Full,
            globals_end: 0,
            depth: 0,
            options: options.clone(),
        }
    }

    /// Height of the parameter stack; zero between runs.
    pub fn stack_height(&self) -> usize { self.stack.height() }

    pub fn rng(&self) -> &RandomSource { &self.rng }

    // ─── Entry point ──────────────────────────────────────────────────────────

    /// Expand `start` from the root instance. Global defines live in a base
    /// frame for the whole run.
    pub fn run(&mut self, start: ShapeId) -> Result<(), RuntimeError> {
        let grammar = self.grammar;
        let shape = grammar.shape(start)
            .ok_or_else(|| Error::new(ErrorCode::G004, 0, 0, format!("no shape with index {start}")))?;
        if !shape.params.is_empty() {
            return Err(Error::new(ErrorCode::G003, 0, 0, format!(
                "start shape '{}' takes {} arguments", shape.name, shape.params.len(),
            )).into());
        }

        self.rng.seed(self.options.seed);
        self.view = View::Full;
        let mut position = 0;
        if let Some(variation) = &self.options.variation {
            self.rng.xor_str(variation, &mut position);
        }
        self.rng.xor_str(&shape.name, &mut position);
        debug!(seed = self.options.seed, variation = ?self.options.variation, start = %shape.name, "expansion started");

        let mark = self.stack.mark();
        self.stack.push_frame();
        let result = self.run_from(grammar.globals(), shape);
        let unwound = self.stack.unwind(mark);
        settle(result, unwound)
    }

    fn run_from(&mut self, globals: &'g Container, shape: &'g Shape) -> Result<(), RuntimeError> {
        let root = ShapeInstance::root(shape.id);
        for st in &globals.statements {
            self.traverse_statement(st, &root, true)?;
        }
        if self.stack.frame_len() != globals.stack_count() {
            return Err(RuntimeError::internal("global frame size does not match its declarations"));
        }
        self.globals_end = self.stack.height();
        self.expand(&root)
    }

    // ─── Shapes & rules ───────────────────────────────────────────────────────

    /// Ask the renderer whether `inst` should be expanded one level deeper.
    fn admit(&mut self, inst: &ShapeInstance) -> Result<bool, RuntimeError> {
        match self.renderer.cutoff(inst, self.depth + 1) {
            Cutoff::Expand => Ok(true),
            Cutoff::Skip => {
                debug!(depth = self.depth + 1, size = inst.size(), "expansion skipped");
                Ok(false)
            }
            Cutoff::Abort => {
                debug!(depth = self.depth + 1, "render aborted by renderer");
                Err(RuntimeError::Aborted)
            }
        }
    }

    fn expand(&mut self, inst: &ShapeInstance) -> Result<(), RuntimeError> {
        let id = inst.shape.ok_or_else(|| RuntimeError::internal("expanding an instance with no shape"))?;
        let shape = self.grammar.shape(id)
            .ok_or_else(|| RuntimeError::internal(format!("instance refers to missing shape {id}")))?;
        if !self.admit(inst)? {
            return Ok(());
        }
        self.depth += 1;
        let result = self.select_rule(shape).and_then(|rule| self.traverse_rule(shape, rule, inst));
        self.depth -= 1;
        result
    }

    /// Weighted draw over the shape's rules. A single rule is taken without
    /// touching the random source.
    fn select_rule(&mut self, shape: &'g Shape) -> Result<&'g Rule, RuntimeError> {
        match shape.rules() {
            [] => Err(Error::new(ErrorCode::G008, 0, 0, format!("shape '{}' has no rules", shape.name)).into()),
            [only] => Ok(only),
            rules => {
                let draw = self.rng.double_lower(true) * shape.total_weight();
                let rule = shape.pick(draw)
                    .ok_or_else(|| RuntimeError::internal(format!("no rule of '{}' selected", shape.name)))?;
                trace!(shape = %shape.name, draw, of = rules.len(), "rule selected");
                Ok(rule)
            }
        }
    }

    fn traverse_rule(&mut self, shape: &'g Shape, rule: &'g Rule, inst: &ShapeInstance) -> Result<(), RuntimeError> {
        let params: &[Value] = inst.params.as_deref().unwrap_or(&[]);
        // A rule body sees the globals and its own frames, never its caller's.
        let scope = View::rule(self.stack.height(), self.globals_end);
        let saved = mem::replace(&mut self.view, scope);
        let result = if shape.is_path {
            self.traverse_path_rule(rule, inst, params)
        } else {
            self.traverse_container(&rule.body, inst, true, params)
        };
        self.view = saved;
        result
    }

    // ─── Containers ───────────────────────────────────────────────────────────

    /// Push a frame seeded with `seed`, run the body, and unwind to the
    /// height recorded at entry whatever the outcome.
    fn traverse_container(
        &mut self,
        body: &'g Container,
        parent: &ShapeInstance,
        tr: bool,
        seed: &[Value],
    ) -> Result<(), RuntimeError> {
        if seed.len() != body.params.len() {
            return Err(RuntimeError::internal(format!(
                "body declares {} parameters, {} supplied", body.params.len(), seed.len(),
            )));
        }
        let mark = self.stack.mark();
        self.stack.push_frame();
        let result = self.run_body(body, parent, tr, seed).and_then(|()| {
            if self.stack.frame_len() == body.stack_count() {
                Ok(())
            } else {
                Err(RuntimeError::internal(format!(
                    "body pushed {} slots, declared {}", self.stack.frame_len(), body.stack_count(),
                )))
            }
        });
        let unwound = self.stack.unwind(mark);
        settle(result, unwound)
    }

    fn run_body(&mut self, body: &'g Container, parent: &ShapeInstance, tr: bool, seed: &[Value]) -> Result<(), RuntimeError> {
        for (param, value) in body.params.iter().zip(seed) {
            self.stack.push(&param.name, Binding::Value(value.clone()), &param.span)?;
        }
        for st in &body.statements {
            self.traverse_statement(st, parent, tr)?;
        }
        Ok(())
    }

    // ─── Statements ───────────────────────────────────────────────────────────

    fn traverse_statement(&mut self, st: &'g Statement, parent: &ShapeInstance, tr: bool) -> Result<(), RuntimeError> {
        match &st.node {
            Node::Replacement      => self.traverse_replacement(st, parent),
            Node::Loop(lp)         => self.traverse_loop(st, lp, parent, tr),
            Node::Transform(t)     => self.traverse_transform(st, t, parent, tr),
            Node::If(i) => {
                let cond = self.eval(&i.cond)?;
                let body = if eval::truth(&cond, i.cond.span())? { &i.then_body } else { &i.else_body };
                self.traverse_container(body, parent, tr, &[])
            }
            Node::Switch(s) => {
                let key = match self.eval(&s.selector)? {
                    Value::Number(x) if x.is_finite() => x.floor() as i64,
                    other => return Err(RuntimeError::eval(s.selector.span(), format!(
                        "switch needs a finite number, found {}", other.type_name(),
                    ))),
                };
                self.traverse_container(s.case(key), parent, tr, &[])
            }
            Node::Define(d)        => self.traverse_define(st, d),
            Node::PathOp(op)       => self.traverse_path_op(op, parent, tr),
            Node::PathCommand(cmd) => self.traverse_path_command(st, cmd),
        }
    }

    fn child_of(&mut self, parent: &ShapeInstance, mods: &ModBundle) -> Result<ShapeInstance, RuntimeError> {
        if mods.is_empty() {
            return Ok(parent.clone());
        }
        let m = self.eval_mods(mods)?;
        Ok(parent.applied(&m))
    }

    fn traverse_replacement(&mut self, st: &'g Statement, parent: &ShapeInstance) -> Result<(), RuntimeError> {
        match st.spec.target {
            ShapeTarget::None => Ok(()),
            ShapeTarget::Primitive(primitive) => {
                let mut child = self.child_of(parent, &st.mods)?;
                child.shape = None;
                child.params = None;
                if self.admit(&child)? {
                    self.renderer.draw_primitive(&child, primitive);
                }
                Ok(())
            }
            ShapeTarget::Shape(id) => {
                let shape = self.grammar.shape(id)
                    .ok_or_else(|| Error::at(ErrorCode::G004, &st.span, format!("no shape with index {id}")))?;
                let mut child = self.child_of(parent, &st.mods)?;
                let args = self.bind_args(shape, &st.spec.args, &st.span)?;
                child.shape = Some(id);
                child.params = if args.is_empty() { None } else { Some(Rc::from(args)) };
                self.expand(&child)
            }
        }
    }

    /// Evaluate replacement arguments against the target's declared
    /// parameters.
    fn bind_args(&mut self, shape: &'g Shape, args: &'g [Expr], span: &Span) -> Result<Vec<Value>, RuntimeError> {
        if args.len() != shape.params.len() {
            return Err(Error::at(ErrorCode::G003, span, format!(
                "'{}' takes {} arguments, given {}", shape.name, shape.params.len(), args.len(),
            )).into());
        }
        let mut out = Vec::with_capacity(args.len());
        for (param, expr) in shape.params.iter().zip(args) {
            let v = self.eval(expr)?;
            check_type(&v, param.ty, param.arity, expr.span(), &param.name)?;
            out.push(v);
        }
        Ok(out)
    }

    /// Iterate the loop variable from start to end inclusive. The statement's
    /// own adjustment is applied to the running instance after every pass.
    fn traverse_loop(&mut self, st: &'g Statement, lp: &'g Loop, parent: &ShapeInstance, tr: bool) -> Result<(), RuntimeError> {
        let range = match lp.constant_range() {
            Some(r) => *r,
            None => {
                let v = self.eval(&lp.range)?;
                LoopRange::from_value(&v, lp.range.span())?
            }
        };

        let mut running = parent.clone();
        if lp.is_ops_only() && !tr {
            running.transform = Affine::IDENTITY;
        }
        let body_tr = tr || lp.is_ops_only();

        let mut last = range.start;
        for i in 0..range.iterations() {
            last = range.value(i);
            self.traverse_container(&lp.body, &running, body_tr, &[Value::Number(last)])?;
            if !st.mods.is_empty() {
                let step = self.eval_mods(&st.mods)?;
                running.apply(&step);
            }
        }
        self.traverse_container(&lp.finally, &running, body_tr, &[Value::Number(last)])
    }

    fn traverse_transform(&mut self, st: &'g Statement, t: &'g Transform, parent: &ShapeInstance, tr: bool) -> Result<(), RuntimeError> {
        let mut base = parent.clone();
        if t.is_ops_only() && !tr {
            base.transform = Affine::IDENTITY;
        }
        let base = self.child_of(&base, &st.mods)?;
        let body_tr = tr || t.is_ops_only();
        let replicas = self.symmetry_product(&t.generators)?;

        let saved = self.rng;
        let mut running = base.clone();
        for m in &replicas {
            if t.clone {
                self.rng = saved;
                let child = base.applied(m);
                self.traverse_container(&t.body, &child, body_tr, &[])?;
            } else {
                running.apply(m);
                self.traverse_container(&t.body, &running, body_tr, &[])?;
            }
        }
        Ok(())
    }

    /// Every combination of the generators, first generator outermost.
    fn symmetry_product(&mut self, generators: &'g [Symmetry]) -> Result<Vec<Modification>, RuntimeError> {
        let mut product = vec![Modification::default()];
        for g in generators {
            let factors = match g {
                Symmetry::Mods(bundle) => vec![self.eval_mods(bundle)?],
                Symmetry::Cyclic(n)    => rotations(*n),
                Symmetry::Dihedral(n)  => {
                    let mut v = rotations(*n);
                    v.extend(reflections(*n));
                    v
                }
            };
            product = product.iter()
                .flat_map(|p| factors.iter().map(move |f| {
                    let mut m = p.clone();
                    m.then(f);
                    m
                }))
                .collect();
        }
        Ok(product)
    }

    fn traverse_define(&mut self, st: &'g Statement, d: &'g Define) -> Result<(), RuntimeError> {
        let binding = if d.is_function {
            Binding::Function(d)
        } else if d.is_constant() {
            let v = d.cache.get_or_try_init(|| self.eval_define(d, &st.span))?;
            Binding::Value(v.clone())
        } else {
            Binding::Deferred(d)
        };
        self.stack.push(&d.name, binding, &st.span)
    }

    fn eval_define(&mut self, d: &'g Define, span: &Span) -> Result<Value, RuntimeError> {
        let v = match &d.body {
            DefineBody::Expr(e)  => self.eval(e)?,
            DefineBody::Mods(m)  => Value::Mod(Box::new(self.eval_mods(m)?)),
        };
        check_type(&v, d.ty, d.arity, span, &d.name)?;
        Ok(v)
    }

    fn call_function(&mut self, d: &'g Define, index: usize, args: Vec<Value>, span: &Span) -> Result<Value, RuntimeError> {
        let base = self.stack.height();
        for (param, value) in d.params.iter().zip(args) {
            self.stack.push(&param.name, Binding::Value(value), &param.span)?;
        }
        let inner = self.view.through(index).with_args(base..self.stack.height());
        let saved = mem::replace(&mut self.view, inner);
        let result = self.eval_define(d, span);
        self.view = saved;
        result
    }

    // ─── Paths ────────────────────────────────────────────────────────────────

    /// Static rules build their path once and share it; other path rules
    /// build a fresh one per expansion.
    fn traverse_path_rule(&mut self, rule: &'g Rule, inst: &ShapeInstance, params: &[Value]) -> Result<(), RuntimeError> {
        let path = if rule.is_static() {
            let cached = rule.cached_path.get_or_try_init(|| self.build_path(rule, params).map(Arc::new))?;
            Arc::clone(cached)
        } else {
            Arc::new(self.build_path(rule, params)?)
        };
        let uid = path.uid()?;
        for command in path.commands() {
            let shape = inst.applied(&command.adjust);
            self.renderer.draw_path(&shape, uid, &path, command);
        }
        Ok(())
    }

    fn build_path(&mut self, rule: &'g Rule, params: &[Value]) -> Result<CompiledPath, RuntimeError> {
        if self.open_path.is_some() {
            return Err(RuntimeError::internal("path build started while another is open"));
        }
        self.open_path = Some(CompiledPath::new(self.stack.frame_ref()));
        let local = ShapeInstance::root(rule.shape);
        let result = self.traverse_container(&rule.body, &local, false, params);
        let built = self.open_path.take();
        result?;

        let mut path = built.ok_or_else(|| RuntimeError::internal("open path lost during build"))?;
        let uid = path.finish();
        if self.stack.resolve(path.frame()).is_none() {
            return Err(RuntimeError::internal("compiled path frame does not belong to this session"));
        }
        debug!(
            uid = uid.get(),
            segments = path.storage().len(),
            commands = path.commands().count(),
            cached = rule.is_static(),
            "path compiled",
        );
        Ok(path)
    }

    fn building_path(&mut self, what: &str) -> Result<&mut CompiledPath, RuntimeError> {
        self.open_path.as_mut()
            .ok_or_else(|| RuntimeError::internal(format!("{what} outside a path build")))
    }

    fn traverse_path_op(&mut self, op: &'g PathOp, inst: &ShapeInstance, tr: bool) -> Result<(), RuntimeError> {
        let args = match op.constant_args() {
            Some(a) => *a,
            None => {
                let mut a = PathArgs::default();
                for (arg, expr) in &op.args {
                    let v = self.eval(expr)?;
                    a.set(*arg, eval::number(&v, expr.span())?);
                }
                a
            }
        };
        let transform = if tr { inst.transform } else { Affine::IDENTITY };
        let path = self.building_path(op.kind.name())?;
        append_op(path.storage_mut()?, op.kind, op.flags, op.is_cubic(), &args, &transform);
        Ok(())
    }

    fn traverse_path_command(&mut self, st: &'g Statement, cmd: &'g PathCommand) -> Result<(), RuntimeError> {
        let adjust = self.eval_mods(&st.mods)?;
        let stroke_width = self.eval_number_or(cmd.width.as_ref(), DEFAULT_STROKE_WIDTH)?;
        let miter_limit = self.eval_number_or(cmd.miter.as_ref(), DEFAULT_MITER_LIMIT)?;
        let info = CommandInfo {
            kind: cmd.kind,
            flags: cmd.flags,
            stroke_width,
            miter_limit,
            segments: 0..0,
            adjust,
        };
        self.building_path("path command")?.add_command(info)
    }

    // ─── Evaluation ───────────────────────────────────────────────────────────

    fn eval(&mut self, expr: &Expr) -> Result<Value, RuntimeError> {
        eval::eval(expr, self)
    }

    fn eval_mods(&mut self, bundle: &ModBundle) -> Result<Modification, RuntimeError> {
        eval::eval_mods(bundle, self)
    }

    fn eval_number_or(&mut self, expr: Option<&Expr>, default: f64) -> Result<f64, RuntimeError> {
        match expr {
            Some(e) => {
                let v = self.eval(e)?;
                eval::number(&v, e.span())
            }
            None => Ok(default),
        }
    }
}

impl<'g, 'r> Env for Expander<'g, 'r> {
    fn lookup(&mut self, name: &str, span: &Span) -> Result<Value, RuntimeError> {
        match self.stack.lookup(name, &self.view) {
            None => Err(RuntimeError::eval(span, format!("undefined name '{name}'"))),
            Some((_, Binding::Value(v))) => Ok(v),
            Some((index, Binding::Deferred(d))) => {
                let inner = self.view.before(index);
                let saved = mem::replace(&mut self.view, inner);
                let result = self.eval_define(d, span);
                self.view = saved;
                result
            }
            Some((_, Binding::Function(_))) => {
                Err(RuntimeError::eval(span, format!("'{name}' is a function and needs arguments")))
            }
        }
    }

    fn call(&mut self, name: &str, args: Vec<Value>, span: &Span) -> Result<Option<Value>, RuntimeError> {
        let Some((index, Binding::Function(d))) = self.stack.lookup(name, &self.view) else {
            return Ok(None);
        };
        if args.len() != d.params.len() {
            return Err(RuntimeError::eval(span, format!(
                "'{name}' takes {} arguments, given {}", d.params.len(), args.len(),
            )));
        }
        for (param, value) in d.params.iter().zip(&args) {
            check_type(value, param.ty, param.arity, span, &param.name)?;
        }
        let mark = self.stack.mark();
        self.stack.push_frame();
        let result = self.call_function(d, index, args, span);
        let unwound = self.stack.unwind(mark);
        settle(result, unwound).map(Some)
    }

    fn random(&mut self) -> Option<&mut RandomSource> { Some(&mut self.rng) }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// A broken stack outranks whatever the body returned.
fn settle<T>(result: Result<T, RuntimeError>, unwound: Result<(), RuntimeError>) -> Result<T, RuntimeError> {
    match unwound {
        Err(e) => Err(e),
        Ok(()) => result,
    }
}

fn check_type(v: &Value, ty: ExpType, arity: usize, span: &Span, what: &str) -> Result<(), RuntimeError> {
    if v.exp_type() == ty && v.arity() == arity {
        return Ok(());
    }
    let expected = if ty == ExpType::Numeric && arity > 1 {
        format!("number[{arity}]")
    } else {
        ty.name().to_string()
    };
    Err(RuntimeError::eval(span, format!("'{what}' expects {expected}, found {}", v.type_name())))
}

/// An order of zero behaves as one.
fn rotations(n: u32) -> Vec<Modification> {
    let n = n.max(1);
    (0..n)
        .map(|k| Modification { transform: Affine::rotate(k as f64 * 360.0 / n as f64), ..Modification::default() })
        .collect()
}

fn reflections(n: u32) -> Vec<Modification> {
    let n = n.max(1);
    (0..n)
        .map(|k| Modification { transform: Affine::reflect(k as f64 * 180.0 / n as f64), ..Modification::default() })
        .collect()
}
