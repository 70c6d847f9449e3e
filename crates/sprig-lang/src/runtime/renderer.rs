use crate::path::{CommandInfo, CompiledPath, PathUid};
use crate::syntax::ast::Primitive;
use crate::types::draw::ShapeInstance;

/// Renderer verdict at a shape-expansion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cutoff {
    Expand,
    /// Drop this instance and everything under it.
    Skip,
    /// Stop the whole render.
    Abort,
}

/// The drawing side of an expansion. The expander never stops recursing on
/// its own; a grammar that recurses forever relies on `cutoff`.
pub trait Renderer {
    /// Consulted before every shape expansion and primitive draw. `depth` is
    /// the nesting level the instance would occupy, starting at 1 for the
    /// start shape.
    fn cutoff(&mut self, _shape: &ShapeInstance, _depth: usize) -> Cutoff {
        Cutoff::Expand
    }

    fn draw_primitive(&mut self, shape: &ShapeInstance, primitive: Primitive);

    /// Called once per command of a finished compiled path, with the
    /// command's adjustment already applied to `shape`.
    fn draw_path(&mut self, shape: &ShapeInstance, uid: PathUid, path: &CompiledPath, command: &CommandInfo);
}
