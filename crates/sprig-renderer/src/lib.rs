//! A renderer that records what an expansion draws.
//!
//! `Recorder` keeps every draw call as a `DrawCommand` and the geometry of
//! each compiled path once per uid, so a backend can replay a render or a
//! test can inspect it.

use std::collections::BTreeMap;

use sprig_lang::path::Segment;
use sprig_lang::{CommandInfo, CompiledPath, Cutoff, DrawCommand, PathUid, Primitive, Renderer, ShapeInstance};
use tracing::{debug, warn};


/// Limits applied at every expansion boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecorderOptions {
    /// Instances whose size falls below this are dropped.
    ///
    /// Default: 0.001
    pub min_size: f64,

    /// Deepest nesting level that is still expanded.
    ///
    /// Default: 64
    pub max_depth: usize,

    /// The render aborts once this many commands are recorded.
    ///
    /// Default: 100 000
    pub max_commands: usize,
}

impl Default for RecorderOptions {
    fn default() -> Self {
        Self {
            min_size: 0.001,
            max_depth: 64,
            max_commands: 100_000,
        }
    }
}

#[derive(Debug, Default)]
pub struct Recorder {
    options: RecorderOptions,
    commands: Vec<DrawCommand>,
    paths: BTreeMap<PathUid, Vec<Segment>>,
    skipped: usize,
}

impl Recorder {
    pub fn new(options: RecorderOptions) -> Self {
        Self { options, ..Self::default() }
    }

    pub fn commands(&self) -> &[DrawCommand] { &self.commands }

    pub fn into_commands(self) -> Vec<DrawCommand> { self.commands }

    /// Segments of the path `uid`, if any command referenced it.
    pub fn path(&self, uid: PathUid) -> Option<&[Segment]> {
        self.paths.get(&uid).map(Vec::as_slice)
    }

    pub fn path_count(&self) -> usize { self.paths.len() }

    /// Instances dropped by the size or depth limit.
    pub fn skipped(&self) -> usize { self.skipped }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.paths.clear();
        self.skipped = 0;
    }
}

impl Renderer for Recorder {
    fn cutoff(&mut self, shape: &ShapeInstance, depth: usize) -> Cutoff {
        if self.commands.len() >= self.options.max_commands {
            warn!(limit = self.options.max_commands, "command limit reached, aborting render");
            return Cutoff::Abort;
        }
        if depth > self.options.max_depth || shape.size() < self.options.min_size {
            self.skipped += 1;
            return Cutoff::Skip;
        }
        Cutoff::Expand
    }

    fn draw_primitive(&mut self, shape: &ShapeInstance, primitive: Primitive) {
        self.commands.push(DrawCommand::primitive(shape, primitive));
    }

    fn draw_path(&mut self, shape: &ShapeInstance, uid: PathUid, path: &CompiledPath, command: &CommandInfo) {
        self.paths.entry(uid).or_insert_with(|| {
            debug!(uid = uid.get(), segments = path.storage().len(), "path recorded");
            path.storage().segments().to_vec()
        });
        self.commands.push(DrawCommand::path(shape, uid, command));
    }
}
