//! Expression and adjustment evaluation.
//!
//! Evaluation is written once against the `Env` capability: the expander
//! supplies name lookup, user functions and the session random source,
//! while `eval_const` runs with none of them for load-time folding.

use crate::error::RuntimeError;
use crate::runtime::random::RandomSource;
use crate::runtime::value::{Numbers, Value};
use crate::syntax::ast::{BinOp, Expr, ModBundle, ModKind, ModTerm, Span, UnOp};
use crate::types::draw::Modification;
use crate::types::geometry::Affine;

pub trait Env {
    fn lookup(&mut self, name: &str, span: &Span) -> Result<Value, RuntimeError>;

    /// Call a user function; `Ok(None)` when `name` is not one in scope.
    fn call(&mut self, name: &str, args: Vec<Value>, span: &Span) -> Result<Option<Value>, RuntimeError>;

    fn random(&mut self) -> Option<&mut RandomSource>;
}

/// Environment with no names, no functions and no randomness.
struct ConstEnv;

impl Env for ConstEnv {
    fn lookup(&mut self, name: &str, span: &Span) -> Result<Value, RuntimeError> {
        Err(RuntimeError::eval(span, format!("'{name}' is not a constant")))
    }

    fn call(&mut self, _name: &str, _args: Vec<Value>, _span: &Span) -> Result<Option<Value>, RuntimeError> {
        Ok(None)
    }

    fn random(&mut self) -> Option<&mut RandomSource> { None }
}

pub fn eval_const(expr: &Expr) -> Result<Value, RuntimeError> {
    eval(expr, &mut ConstEnv)
}

// ─── Expressions ──────────────────────────────────────────────────────────────

pub fn eval(expr: &Expr, env: &mut dyn Env) -> Result<Value, RuntimeError> {
    match expr {
        Expr::Number(v, _) => Ok(Value::Number(*v)),
        Expr::Bool(b, _)   => Ok(Value::Flag(*b)),
        Expr::Var(name, span) => env.lookup(name, span),

        Expr::Tuple(items, span) => {
            let mut out = Numbers::new();
            for item in items {
                let v = eval(item, env)?;
                let nums = v.numbers().ok_or_else(|| {
                    RuntimeError::eval(span, format!("tuple element must be numeric, found {}", v.type_name()))
                })?;
                out.extend(nums);
            }
            Ok(Value::from_numbers(out))
        }

        Expr::UnOp { op, operand, span } => {
            let v = eval(operand, env)?;
            unary(*op, v, span)
        }

        Expr::BinOp { left, op: BinOp::And, right, span } => {
            if !truth(&eval(left, env)?, span)? { return Ok(Value::Flag(false)); }
            Ok(Value::Flag(truth(&eval(right, env)?, span)?))
        }
        Expr::BinOp { left, op: BinOp::Or, right, span } => {
            if truth(&eval(left, env)?, span)? { return Ok(Value::Flag(true)); }
            Ok(Value::Flag(truth(&eval(right, env)?, span)?))
        }
        Expr::BinOp { left, op, right, span } => {
            let l = eval(left, env)?;
            let r = eval(right, env)?;
            binary(*op, l, r, span)
        }

        Expr::Call { callee, args, span } => {
            let mut values = Vec::with_capacity(args.len());
            for a in args {
                values.push(eval(a, env)?);
            }
            if let Some(v) = env.call(callee, values.clone(), span)? {
                return Ok(v);
            }
            builtin(callee, &values, env, span)
        }
    }
}

/// Flags are themselves; numbers are true when non-zero.
pub fn truth(v: &Value, span: &Span) -> Result<bool, RuntimeError> {
    match v {
        Value::Flag(b)   => Ok(*b),
        Value::Number(x) => Ok(*x != 0.0),
        other => Err(RuntimeError::eval(span, format!("expected a flag, found {}", other.type_name()))),
    }
}

pub fn number(v: &Value, span: &Span) -> Result<f64, RuntimeError> {
    match v {
        Value::Number(x) => Ok(*x),
        other => Err(RuntimeError::eval(span, format!("expected a number, found {}", other.type_name()))),
    }
}

fn unary(op: UnOp, v: Value, span: &Span) -> Result<Value, RuntimeError> {
    match (op, v) {
        (UnOp::Neg, Value::Number(x)) => Ok(Value::Number(-x)),
        (UnOp::Neg, Value::Tuple(v))  => Ok(Value::Tuple(v.iter().map(|x| -x).collect())),
        (UnOp::Not, v @ (Value::Flag(_) | Value::Number(_))) => Ok(Value::Flag(!truth(&v, span)?)),
        (op, v) => Err(RuntimeError::eval(span, format!("cannot apply {op:?} to {}", v.type_name()))),
    }
}

fn binary(op: BinOp, l: Value, r: Value, span: &Span) -> Result<Value, RuntimeError> {
    use BinOp::*;
    let mismatch = |l: &Value, r: &Value| {
        RuntimeError::eval(span, format!("cannot apply '{}' to {} and {}", op.symbol(), l.type_name(), r.type_name()))
    };

    match (op, &l, &r) {
        (Eq, _, _)    => Ok(Value::Flag(l == r)),
        (NotEq, _, _) => Ok(Value::Flag(l != r)),

        (_, Value::Number(a), Value::Number(b)) => {
            let (a, b) = (*a, *b);
            Ok(match op {
                Add => Value::Number(a + b),
                Sub => Value::Number(a - b),
                Mul => Value::Number(a * b),
                Div | Mod if b == 0.0 => {
                    return Err(RuntimeError::eval(span, "division by zero"));
                }
                Div => Value::Number(a / b),
                Mod => Value::Number(a.rem_euclid(b)),
                Pow => Value::Number(a.powf(b)),
                Lt   => Value::Flag(a < b),
                LtEq => Value::Flag(a <= b),
                Gt   => Value::Flag(a > b),
                GtEq => Value::Flag(a >= b),
                Eq | NotEq | And | Or => return Err(mismatch(&l, &r)),
            })
        }

        (Add | Sub, Value::Tuple(a), Value::Tuple(b)) if a.len() == b.len() => {
            let f: fn(f64, f64) -> f64 = if op == Add { |x, y| x + y } else { |x, y| x - y };
            Ok(Value::Tuple(a.iter().zip(b.iter()).map(|(x, y)| f(*x, *y)).collect()))
        }
        (Mul, Value::Number(k), Value::Tuple(v)) | (Mul, Value::Tuple(v), Value::Number(k)) => {
            Ok(Value::Tuple(v.iter().map(|x| x * k).collect()))
        }
        (Div, Value::Tuple(v), Value::Number(k)) => {
            if *k == 0.0 {
                return Err(RuntimeError::eval(span, "division by zero"));
            }
            Ok(Value::Tuple(v.iter().map(|x| x / k).collect()))
        }

        _ => Err(mismatch(&l, &r)),
    }
}

// ─── Builtins ─────────────────────────────────────────────────────────────────

fn builtin(name: &str, args: &[Value], env: &mut dyn Env, span: &Span) -> Result<Value, RuntimeError> {
    let nums = args.iter().map(|a| number(a, span)).collect::<Result<Vec<f64>, _>>()?;
    let arity = |expected: &str| {
        RuntimeError::eval(span, format!("{name}() takes {expected}, found {}", nums.len()))
    };
    let one = || match nums.as_slice() { [x] => Ok(*x), _ => Err(arity("1 argument")) };

    let v = match name {
        "sin"  => one()?.to_radians().sin(),
        "cos"  => one()?.to_radians().cos(),
        "tan"  => one()?.to_radians().tan(),
        "atan" => one()?.atan().to_degrees(),
        "atan2" => match nums.as_slice() {
            [y, x] => y.atan2(*x).to_degrees(),
            _ => return Err(arity("2 arguments")),
        },
        "sqrt" => {
            let x = one()?;
            if x < 0.0 { return Err(RuntimeError::eval(span, "sqrt of a negative number")); }
            x.sqrt()
        }
        "abs"   => one()?.abs(),
        "floor" => one()?.floor(),
        "ceil"  => one()?.ceil(),
        "exp"   => one()?.exp(),
        "log" => {
            let x = one()?;
            if x <= 0.0 { return Err(RuntimeError::eval(span, "log of a non-positive number")); }
            x.ln()
        }
        "min" | "max" => {
            if nums.is_empty() { return Err(arity("at least 1 argument")); }
            let pick: fn(f64, f64) -> f64 = if name == "min" { f64::min } else { f64::max };
            nums.iter().copied().fold(nums[0], pick)
        }
        "rand" | "randint" => {
            let (lo, hi) = match (name, nums.as_slice()) {
                ("rand", [])        => (0.0, 1.0),
                ("rand", [a])       => (0.0, *a),
                (_, [a, b])         => (*a, *b),
                ("rand", _)         => return Err(arity("0 to 2 arguments")),
                _                   => return Err(arity("2 arguments")),
            };
            let rng = env.random()
                .ok_or_else(|| RuntimeError::eval(span, format!("{name}() is not allowed in a constant")))?;
            let x = lo + rng.double_lower(true) * (hi - lo);
            if name == "randint" { x.floor() } else { x }
        }
        _ => return Err(RuntimeError::eval(span, format!("unknown function '{name}'"))),
    };
    Ok(Value::Number(v))
}

// ─── Adjustments ──────────────────────────────────────────────────────────────

/// Evaluate a bundle into one modification. Unordered bundles apply their
/// geometric terms in canonical order.
pub fn eval_mods(bundle: &ModBundle, env: &mut dyn Env) -> Result<Modification, RuntimeError> {
    let mut terms: Vec<&ModTerm> = bundle.terms.iter().collect();
    if !bundle.ordered {
        terms.sort_by_key(|t| t.kind.canonical_rank());
    }
    let mut out = Modification::default();
    for term in terms {
        let m = eval_term(term, env)?;
        out.then(&m);
    }
    Ok(out)
}

fn eval_term(term: &ModTerm, env: &mut dyn Env) -> Result<Modification, RuntimeError> {
    let span = &term.span;
    let mut m = Modification::default();

    if term.kind == ModKind::Transform {
        return match term.args.as_slice() {
            [e] => match eval(e, env)? {
                Value::Mod(inner) => Ok(*inner),
                other => Err(RuntimeError::eval(span, format!("expected an adjustment, found {}", other.type_name()))),
            },
            _ => Err(RuntimeError::eval(span, "transform takes one adjustment")),
        };
    }

    let mut nums = Numbers::new();
    for e in &term.args {
        let v = eval(e, env)?;
        nums.extend(v.numbers().ok_or_else(|| {
            RuntimeError::eval(span, format!("expected a number, found {}", v.type_name()))
        })?);
    }
    let bad = || RuntimeError::eval(span, format!("wrong number of values for {:?}", term.kind));

    match (term.kind, nums.as_slice()) {
        (ModKind::Translate, [x])   => m.transform = Affine::translate(*x, 0.0),
        (ModKind::Translate, [x, y]) => m.transform = Affine::translate(*x, *y),
        (ModKind::X, [x])          => m.transform = Affine::translate(*x, 0.0),
        (ModKind::Y, [y])          => m.transform = Affine::translate(0.0, *y),
        (ModKind::Z, [z])          => m.z = *z,
        (ModKind::Rotate, [a])     => m.transform = Affine::rotate(*a),
        (ModKind::Size, [s])       => m.transform = Affine::scale(*s, *s),
        (ModKind::Size, [sx, sy])  => m.transform = Affine::scale(*sx, *sy),
        (ModKind::Skew, [ax, ay])  => m.transform = Affine::skew(*ax, *ay),
        (ModKind::Flip, [a])       => m.transform = Affine::reflect(*a),
        (ModKind::Hue, [h])        => m.hue = *h,
        (ModKind::Sat, [s])        => m.sat = *s,
        (ModKind::Bright, [b])     => m.bright = *b,
        (ModKind::Alpha, [a])      => m.alpha = *a,
        _ => return Err(bad()),
    }
    Ok(m)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::ast::ModTerm;

    fn c(e: Expr) -> Value { eval_const(&e).unwrap() }

    fn bin(l: f64, op: BinOp, r: f64) -> Expr { Expr::binary(Expr::num(l), op, Expr::num(r)) }

    #[test]
    fn arithmetic() {
        assert_eq!(c(bin(2.0, BinOp::Pow, 3.0)), Value::Number(8.0));
        assert_eq!(c(bin(-1.0, BinOp::Mod, 3.0)), Value::Number(2.0));
        assert_eq!(c(bin(1.0, BinOp::Lt, 2.0)), Value::Flag(true));
        assert_eq!(c(Expr::unary(UnOp::Neg, Expr::tuple(vec![Expr::num(1.0), Expr::num(2.0)]))),
                   Value::Tuple(smallvec::smallvec![-1.0, -2.0]));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert!(eval_const(&bin(1.0, BinOp::Div, 0.0)).is_err());
        assert!(eval_const(&bin(1.0, BinOp::Mod, 0.0)).is_err());
    }

    #[test]
    fn short_circuit_skips_right() {
        // The right side would fail if evaluated.
        let e = Expr::binary(Expr::flag(false), BinOp::And, Expr::var("missing"));
        assert_eq!(c(e), Value::Flag(false));
        let e = Expr::binary(Expr::flag(true), BinOp::Or, Expr::var("missing"));
        assert_eq!(c(e), Value::Flag(true));
    }

    #[test]
    fn builtins_use_degrees() {
        let v = c(Expr::call("sin", vec![Expr::num(90.0)]));
        assert_eq!(v, Value::Number(1.0));
        let v = c(Expr::call("atan2", vec![Expr::num(1.0), Expr::num(1.0)]));
        match v { Value::Number(x) => assert!((x - 45.0).abs() < 1e-9), other => panic!("{other:?}") }
        assert_eq!(c(Expr::call("max", vec![Expr::num(1.0), Expr::num(5.0), Expr::num(3.0)])), Value::Number(5.0));
    }

    #[test]
    fn random_builtins_are_not_constant() {
        assert!(eval_const(&Expr::call("rand", vec![])).is_err());
        assert!(eval_const(&Expr::var("x")).is_err());
    }

    #[test]
    fn canonical_order_ignores_declaration_order() {
        let terms = |order: &[ModKind]| {
            order.iter().map(|k| {
                let args = match k {
                    ModKind::X      => vec![Expr::num(2.0)],
                    ModKind::Rotate => vec![Expr::num(90.0)],
                    _               => vec![Expr::num(3.0)],
                };
                ModTerm::new(*k, args)
            }).collect::<Vec<_>>()
        };
        let a = eval_mods(&ModBundle::canonical(terms(&[ModKind::Size, ModKind::Rotate, ModKind::X])), &mut ConstEnv).unwrap();
        let b = eval_mods(&ModBundle::canonical(terms(&[ModKind::X, ModKind::Rotate, ModKind::Size])), &mut ConstEnv).unwrap();
        assert!(a.transform.approx_eq(&b.transform, 1e-12));

        let ordered = eval_mods(&ModBundle::ordered(terms(&[ModKind::Size, ModKind::X])), &mut ConstEnv).unwrap();
        let (x, _) = ordered.transform.apply((0.0, 0.0));
        assert!((x - 6.0).abs() < 1e-12);
    }

    #[test]
    fn color_terms_accumulate() {
        let bundle = ModBundle::ordered(vec![
            ModTerm::new(ModKind::Hue, vec![Expr::num(30.0)]),
            ModTerm::new(ModKind::Hue, vec![Expr::num(30.0)]),
            ModTerm::new(ModKind::Bright, vec![Expr::num(0.5)]),
        ]);
        let m = eval_mods(&bundle, &mut ConstEnv).unwrap();
        assert_eq!((m.hue, m.bright), (60.0, 0.5));
        assert!(m.transform.is_identity());
    }
}
