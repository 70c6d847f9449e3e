pub mod syntax;
pub mod types;
pub mod runtime;
pub mod grammar;
pub mod path;
pub mod error;
pub mod options;

pub use types::draw::{DrawCommand, Hsba, Modification, ShapeInstance};
pub use types::geometry::Affine;
pub use syntax::ast::Primitive;
pub use error::{Error, ErrorCode, RuntimeError};
pub use grammar::{Grammar, GrammarBuilder, RuleWeight, ShapeId};
pub use options::SessionOptions;
pub use path::{CommandInfo, CommandKind, CompiledPath, PathUid};
pub use runtime::renderer::{Cutoff, Renderer};
pub use runtime::value::Value;

use runtime::expander::Expander;

// ─── Public API ───────────────────────────────────────────────────────────────

/// Expand the shape named `start` and stream the result into `renderer`.
///
/// The same grammar, start shape and options always produce the same
/// sequence of renderer calls.
pub fn render(
    grammar: &Grammar,
    start: &str,
    renderer: &mut dyn Renderer,
    options: &SessionOptions,
) -> Result<(), RuntimeError> {
    let id = grammar.shape_id(start)
        .ok_or_else(|| Error::new(ErrorCode::G004, 0, 0, format!("unknown start shape '{start}'")))?;
    Expander::new(grammar, renderer, options).run(id)
}
