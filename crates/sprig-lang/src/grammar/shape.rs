use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::grammar::statement::Container;
use crate::path::CompiledPath;
use crate::syntax::ast::{Param, Span};

pub type ShapeId = usize;

/// Weight as written on a rule.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum RuleWeight {
    #[default]
    Default,
    Explicit(f64),
    /// Share of the shape's total, out of 100.
    Percent(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightKind {
    None,
    Percent,
    Explicit,
}

// ─── Rule ─────────────────────────────────────────────────────────────────────

/// One weighted alternative of a shape.
#[derive(Debug)]
pub struct Rule {
    pub shape: ShapeId,
    /// Normalized weight, strictly positive after load (percent weights are
    /// fractions of one).
    pub weight: f64,
    pub weight_kind: WeightKind,
    pub body: Container,
    pub span: Span,
    pub(crate) is_static: bool,
    pub(crate) cached_path: OnceCell<Arc<CompiledPath>>,
}

impl Rule {
    pub(crate) fn new(shape: ShapeId, weight: RuleWeight, body: Container, span: Span) -> Self {
        let (weight, weight_kind) = match weight {
            RuleWeight::Default     => (1.0, WeightKind::None),
            RuleWeight::Explicit(w) => (w, WeightKind::Explicit),
            RuleWeight::Percent(p)  => (p / 100.0, WeightKind::Percent),
        };
        Self {
            shape,
            weight,
            weight_kind,
            body,
            span,
            is_static: false,
            cached_path: OnceCell::new(),
        }
    }

    /// A path rule whose geometry cannot vary between expansions; its
    /// compiled path is built once and shared.
    pub fn is_static(&self) -> bool { self.is_static }

    pub fn cached_path(&self) -> Option<&Arc<CompiledPath>> { self.cached_path.get() }
}

// ─── Shape ────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Shape {
    pub name: String,
    pub id: ShapeId,
    pub is_path: bool,
    pub params: Vec<Param>,
    pub(crate) rules: Vec<Rule>,
    /// Running sums of the rule weights, in declaration order.
    pub(crate) cumulative: Vec<f64>,
}

impl Shape {
    pub(crate) fn new(name: String, id: ShapeId, is_path: bool, params: Vec<Param>) -> Self {
        Self { name, id, is_path, params, rules: Vec::new(), cumulative: Vec::new() }
    }

    pub fn rules(&self) -> &[Rule] { &self.rules }

    pub fn total_weight(&self) -> f64 { self.cumulative.last().copied().unwrap_or(0.0) }

    /// First rule whose cumulative weight exceeds `draw`; ties go to the
    /// earlier rule.
    pub fn pick(&self, draw: f64) -> Option<&Rule> {
        let i = self.cumulative.iter().position(|&c| c > draw).unwrap_or(self.rules.len().checked_sub(1)?);
        self.rules.get(i)
    }

    pub(crate) fn accumulate(&mut self) {
        let mut sum = 0.0;
        self.cumulative = self.rules.iter().map(|r| { sum += r.weight; sum }).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(weights: &[f64]) -> Shape {
        let mut s = Shape::new("s".into(), 0, false, Vec::new());
        for &w in weights {
            s.rules.push(Rule::new(0, RuleWeight::Explicit(w), Container::default(), Span::default()));
        }
        s.accumulate();
        s
    }

    fn index(s: &Shape, draw: f64) -> usize {
        let r = s.pick(draw).unwrap();
        s.rules.iter().position(|x| std::ptr::eq(x, r)).unwrap()
    }

    #[test]
    fn cumulative_pick() {
        let s = shape(&[1.0, 2.0, 1.0]);
        assert_eq!(s.total_weight(), 4.0);
        assert_eq!(index(&s, 0.0), 0);
        assert_eq!(index(&s, 0.999), 0);
        assert_eq!(index(&s, 1.0), 1);
        assert_eq!(index(&s, 2.999), 1);
        assert_eq!(index(&s, 3.5), 2);
    }

    #[test]
    fn draw_at_total_falls_back_to_last() {
        let s = shape(&[1.0, 1.0]);
        assert_eq!(index(&s, 2.0), 1);
    }

    #[test]
    fn percent_weights_are_fractions() {
        let r = Rule::new(0, RuleWeight::Percent(25.0), Container::default(), Span::default());
        assert_eq!((r.weight, r.weight_kind), (0.25, WeightKind::Percent));
    }
}
