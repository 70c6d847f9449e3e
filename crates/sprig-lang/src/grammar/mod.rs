pub mod shape;
pub mod statement;
pub mod validate;

#[cfg(test)]
mod tests;

use std::collections::HashMap;

use crate::error::{Error, ErrorCode};
use crate::syntax::ast::{Param, Span};
use shape::Rule;
use statement::{Define, Node, Statement};
use validate::Validator;

pub use shape::{RuleWeight, Shape, ShapeId, WeightKind};
pub use statement::Container;

// ─── Grammar ──────────────────────────────────────────────────────────────────

/// A loaded grammar. Read-only after `GrammarBuilder::build`, apart from the
/// build-once caches on defines and path rules.
#[derive(Debug)]
pub struct Grammar {
    shapes: Vec<Shape>,
    names: HashMap<String, ShapeId>,
    globals: Container,
    warnings: Vec<Error>,
}

impl Grammar {
    pub fn shape_id(&self, name: &str) -> Option<ShapeId> { self.names.get(name).copied() }

    pub fn shape(&self, id: ShapeId) -> Option<&Shape> { self.shapes.get(id) }

    pub fn shapes(&self) -> &[Shape] { &self.shapes }

    pub fn globals(&self) -> &Container { &self.globals }

    pub fn warnings(&self) -> &[Error] { &self.warnings }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Collects shapes and rules as a front end produces them. Declaration
/// errors are kept and reported together by `build`.
#[derive(Debug)]
pub struct GrammarBuilder {
    shapes: Vec<Shape>,
    names: HashMap<String, ShapeId>,
    globals: Container,
    errors: Vec<Error>,
}

impl Default for GrammarBuilder {
    fn default() -> Self { Self::new() }
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self {
            shapes: Vec::new(),
            names: HashMap::new(),
            globals: Container::global(Vec::new()),
            errors: Vec::new(),
        }
    }

    /// Declare a shape. A name declared twice keeps its first id.
    pub fn declare_shape(&mut self, name: &str, is_path: bool, params: Vec<Param>) -> ShapeId {
        if let Some(&id) = self.names.get(name) {
            self.errors.push(Error::new(ErrorCode::G011, 0, 0, format!("shape '{name}' declared twice")));
            return id;
        }
        let id = self.shapes.len();
        self.shapes.push(Shape::new(name.to_string(), id, is_path, params));
        self.names.insert(name.to_string(), id);
        id
    }

    /// Add an alternative to `shape`. The body's parameters become the
    /// shape's.
    pub fn add_rule(&mut self, shape: ShapeId, weight: RuleWeight, mut body: Container, span: Span) {
        let Some(target) = self.shapes.get_mut(shape) else {
            self.errors.push(Error::at(ErrorCode::G004, &span, format!("no shape with index {shape}")));
            return;
        };
        body.bind_params(target.params.clone());
        target.rules.push(Rule::new(shape, weight, body, span));
    }

    /// A define visible to every rule for the whole session.
    pub fn add_global(&mut self, define: Define, span: Span) {
        self.globals.push(Statement::new(Node::Define(define)).at(span));
    }

    pub fn build(mut self) -> Result<Grammar, Vec<Error>> {
        let found = Validator::new().validate(&mut self.shapes, &mut self.globals);
        self.errors.extend(found);

        let (errors, warnings): (Vec<_>, Vec<_>) = self.errors
            .into_iter()
            .partition(|e| e.code.is_error());

        if errors.is_empty() {
            Ok(Grammar { shapes: self.shapes, names: self.names, globals: self.globals, warnings })
        } else {
            Err(errors)
        }
    }
}
