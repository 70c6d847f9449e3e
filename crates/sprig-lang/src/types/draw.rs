use std::rc::Rc;

use crate::path::{CommandInfo, PathUid};
use crate::runtime::value::Value;
use crate::syntax::ast::Primitive;
use crate::types::geometry::Affine;

// ─── Color ────────────────────────────────────────────────────────────────────

/// Hue in degrees [0, 360); saturation, brightness and alpha in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsba {
    pub h: f64,
    pub s: f64,
    pub b: f64,
    pub a: f64,
}

impl Default for Hsba {
    /// Opaque black.
    fn default() -> Self { Self { h: 0.0, s: 0.0, b: 0.0, a: 1.0 } }
}

impl Hsba {
    /// Move `base` toward 1 by `delta` when positive, toward 0 when negative.
    pub fn adjust(base: f64, delta: f64) -> f64 {
        let delta = delta.clamp(-1.0, 1.0);
        if delta > 0.0 {
            base + (1.0 - base) * delta
        } else {
            base + base * delta
        }
    }

    pub fn adjusted(&self, m: &Modification) -> Hsba {
        Hsba {
            h: (self.h + m.hue).rem_euclid(360.0),
            s: Self::adjust(self.s, m.sat),
            b: Self::adjust(self.b, m.bright),
            a: Self::adjust(self.a, m.alpha),
        }
    }
}

// ─── Modification ─────────────────────────────────────────────────────────────

/// An evaluated adjustment bundle.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modification {
    pub transform: Affine,
    pub z: f64,
    pub hue: f64,
    pub sat: f64,
    pub bright: f64,
    pub alpha: f64,
}

impl Modification {
    /// Fold `next` in after `self`.
    pub fn then(&mut self, next: &Modification) {
        self.transform = self.transform.compose(&next.transform);
        self.z      += next.z;
        self.hue    += next.hue;
        self.sat    += next.sat;
        self.bright += next.bright;
        self.alpha  += next.alpha;
    }

    pub fn is_identity(&self) -> bool { *self == Modification::default() }
}

// ─── Shape instance ───────────────────────────────────────────────────────────

/// The current drawing state handed down the expansion.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeInstance {
    /// Index of the shape being expanded; `None` for primitives.
    pub shape: Option<usize>,
    pub transform: Affine,
    pub z: f64,
    pub color: Hsba,
    /// Values bound to the shape's declared parameters.
    pub params: Option<Rc<[Value]>>,
}

impl ShapeInstance {
    pub fn root(shape: usize) -> Self {
        Self {
            shape: Some(shape),
            transform: Affine::IDENTITY,
            z: 0.0,
            color: Hsba::default(),
            params: None,
        }
    }

    pub fn apply(&mut self, m: &Modification) {
        self.transform = self.transform.compose(&m.transform);
        self.z += m.z;
        self.color = self.color.adjusted(m);
    }

    pub fn applied(&self, m: &Modification) -> ShapeInstance {
        let mut out = self.clone();
        out.apply(m);
        out
    }

    /// Linear size of the instance relative to the root.
    pub fn size(&self) -> f64 { self.transform.scale_factor() }
}

// ─── Draw command ─────────────────────────────────────────────────────────────

/// One finished drawing operation, as recorded by a renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Primitive {
        primitive: Primitive,
        transform: Affine,
        z: f64,
        color: Hsba,
    },
    Path {
        uid: PathUid,
        command: CommandInfo,
        transform: Affine,
        z: f64,
        color: Hsba,
    },
}

impl DrawCommand {
    pub fn primitive(shape: &ShapeInstance, primitive: Primitive) -> Self {
        DrawCommand::Primitive {
            primitive,
            transform: shape.transform,
            z: shape.z,
            color: shape.color,
        }
    }

    pub fn path(shape: &ShapeInstance, uid: PathUid, command: &CommandInfo) -> Self {
        DrawCommand::Path {
            uid,
            command: command.clone(),
            transform: shape.transform,
            z: shape.z,
            color: shape.color,
        }
    }
}
