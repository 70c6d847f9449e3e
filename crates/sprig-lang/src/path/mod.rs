//! Compiled paths: the geometry of a path rule, built once by running the
//! rule's path operators and then shared by identity.

pub mod storage;

pub use storage::{PathStorage, Segment};

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use bitflags::bitflags;

use crate::error::RuntimeError;
use crate::runtime::stack::FrameRef;
use crate::types::draw::Modification;
use crate::types::geometry::Affine;

// ─── Identity ─────────────────────────────────────────────────────────────────

static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Process-wide identity of a compiled path. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathUid(u64);

impl PathUid {
    pub fn next() -> Self { PathUid(NEXT_UID.fetch_add(1, Ordering::Relaxed)) }

    pub fn get(self) -> u64 { self.0 }
}

// ─── Operators ────────────────────────────────────────────────────────────────

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PathFlags: u32 {
        /// Arc drawn clockwise.
        const CW         = 1 << 0;
        /// Arc takes the long way round.
        const LARGE      = 1 << 1;
        /// Snap the closing point onto the sub-path start.
        const ALIGN      = 1 << 2;
        const EVEN_ODD   = 1 << 3;
        const MITER_JOIN = 1 << 4;
        const ROUND_JOIN = 1 << 5;
        const BEVEL_JOIN = 1 << 6;
        const BUTT_CAP   = 1 << 7;
        const ROUND_CAP  = 1 << 8;
        const SQUARE_CAP = 1 << 9;

        const ARC_FLAGS    = Self::CW.bits() | Self::LARGE.bits();
        const STROKE_FLAGS = Self::MITER_JOIN.bits() | Self::ROUND_JOIN.bits() | Self::BEVEL_JOIN.bits()
                           | Self::BUTT_CAP.bits() | Self::ROUND_CAP.bits() | Self::SQUARE_CAP.bits();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOpKind {
    MoveTo,
    MoveRel,
    LineTo,
    LineRel,
    ArcTo,
    ArcRel,
    CurveTo,
    CurveRel,
    ClosePoly,
}

impl PathOpKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::MoveTo    => "MOVETO",
            Self::MoveRel   => "MOVEREL",
            Self::LineTo    => "LINETO",
            Self::LineRel   => "LINEREL",
            Self::ArcTo     => "ARCTO",
            Self::ArcRel    => "ARCREL",
            Self::CurveTo   => "CURVETO",
            Self::CurveRel  => "CURVEREL",
            Self::ClosePoly => "CLOSEPOLY",
        }
    }

    pub fn is_relative(self) -> bool {
        matches!(self, Self::MoveRel | Self::LineRel | Self::ArcRel | Self::CurveRel)
    }

    /// Named arguments the operator accepts.
    pub fn accepts(self, arg: PathArg) -> bool {
        use PathArg::*;
        match self {
            Self::MoveTo | Self::MoveRel | Self::LineTo | Self::LineRel => matches!(arg, X | Y),
            Self::ArcTo | Self::ArcRel => matches!(arg, X | Y | R | Rx | Ry | Angle),
            Self::CurveTo | Self::CurveRel => matches!(arg, X | Y | X1 | Y1 | X2 | Y2),
            Self::ClosePoly => false,
        }
    }

    pub fn accepted_flags(self) -> PathFlags {
        match self {
            Self::ArcTo | Self::ArcRel => PathFlags::ARC_FLAGS,
            Self::ClosePoly => PathFlags::ALIGN,
            _ => PathFlags::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathArg { X, Y, X1, Y1, X2, Y2, R, Rx, Ry, Angle }

impl PathArg {
    pub fn name(self) -> &'static str {
        match self {
            Self::X => "x",   Self::Y => "y",
            Self::X1 => "x1", Self::Y1 => "y1",
            Self::X2 => "x2", Self::Y2 => "y2",
            Self::R => "r",   Self::Rx => "rx", Self::Ry => "ry",
            Self::Angle => "angle",
        }
    }
}

/// Resolved operator arguments. Unset coordinates default to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PathArgs {
    pub x: f64,
    pub y: f64,
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub rx: f64,
    pub ry: f64,
    pub angle: f64,
}

impl PathArgs {
    pub fn set(&mut self, arg: PathArg, v: f64) {
        match arg {
            PathArg::X => self.x = v,
            PathArg::Y => self.y = v,
            PathArg::X1 => self.x1 = v,
            PathArg::Y1 => self.y1 = v,
            PathArg::X2 => self.x2 = v,
            PathArg::Y2 => self.y2 = v,
            PathArg::R => { self.rx = v; self.ry = v; }
            PathArg::Rx => self.rx = v,
            PathArg::Ry => self.ry = v,
            PathArg::Angle => self.angle = v,
        }
    }
}

/// Append one operator to `storage`. Points go through `transform`; relative
/// operators offset from the current point by the transformed vector.
pub fn append_op(
    storage: &mut PathStorage,
    kind: PathOpKind,
    flags: PathFlags,
    cubic: bool,
    args: &PathArgs,
    transform: &Affine,
) {
    let origin = storage.current_point();
    let place = |x: f64, y: f64| {
        if kind.is_relative() {
            let (dx, dy) = transform.apply_vector((x, y));
            (origin.0 + dx, origin.1 + dy)
        } else {
            transform.apply((x, y))
        }
    };

    match kind {
        PathOpKind::MoveTo | PathOpKind::MoveRel => storage.move_to(place(args.x, args.y)),
        PathOpKind::LineTo | PathOpKind::LineRel => storage.line_to(place(args.x, args.y)),
        PathOpKind::ArcTo | PathOpKind::ArcRel => {
            let scale = transform.scale_factor();
            let mirrored = transform.det() < 0.0;
            let cw = flags.contains(PathFlags::CW) != mirrored;
            storage.arc_to(
                place(args.x, args.y),
                (args.rx * scale, args.ry * scale),
                args.angle + transform.rotation(),
                flags.contains(PathFlags::LARGE),
                !cw,
            );
        }
        PathOpKind::CurveTo | PathOpKind::CurveRel => {
            let ctrl1 = place(args.x1, args.y1);
            let to = place(args.x, args.y);
            if cubic {
                storage.cubic_to(ctrl1, place(args.x2, args.y2), to);
            } else {
                storage.quad_to(ctrl1, to);
            }
        }
        PathOpKind::ClosePoly => storage.close(flags.contains(PathFlags::ALIGN)),
    }
}

// ─── Commands ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Fill,
    Stroke,
}

pub const DEFAULT_STROKE_WIDTH: f64 = 0.1;
pub const DEFAULT_MITER_LIMIT: f64 = 4.0;

/// Metadata for one draw of a compiled path.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandInfo {
    pub kind: CommandKind,
    pub flags: PathFlags,
    pub stroke_width: f64,
    pub miter_limit: f64,
    /// Segments of the path storage this command covers.
    pub segments: Range<usize>,
    /// Adjustment applied to the instance when the command is drawn.
    pub adjust: Modification,
}

impl CommandInfo {
    pub fn fill(segments: Range<usize>) -> Self {
        Self {
            kind: CommandKind::Fill,
            flags: PathFlags::empty(),
            stroke_width: DEFAULT_STROKE_WIDTH,
            miter_limit: DEFAULT_MITER_LIMIT,
            segments,
            adjust: Modification::default(),
        }
    }
}

// ─── Compiled path ────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct CompiledPath {
    complete: bool,
    storage: PathStorage,
    commands: Vec<CommandInfo>,
    terminal: Option<CommandInfo>,
    frame: FrameRef,
    uid: Option<PathUid>,
    /// First segment not yet claimed by a command group.
    group_start: usize,
    /// The last thing appended was a command, so the next one joins its group.
    in_group: bool,
}

impl CompiledPath {
    pub fn new(frame: FrameRef) -> Self {
        Self {
            complete: false,
            storage: PathStorage::new(),
            commands: Vec::new(),
            terminal: None,
            frame,
            uid: None,
            group_start: 0,
            in_group: false,
        }
    }

    pub fn is_complete(&self) -> bool { self.complete }

    pub fn storage(&self) -> &PathStorage { &self.storage }

    pub fn frame(&self) -> FrameRef { self.frame }

    /// Identity of a finished path. Asking before `finish` is a logic error.
    pub fn uid(&self) -> Result<PathUid, RuntimeError> {
        self.uid.ok_or_else(|| RuntimeError::internal("compiled path has no identity"))
    }

    /// Storage for appending segments; starts a new command group if the
    /// previous append was a command.
    pub fn storage_mut(&mut self) -> Result<&mut PathStorage, RuntimeError> {
        if self.complete {
            return Err(RuntimeError::internal("path operator appended to a complete path"));
        }
        if self.in_group {
            self.group_start = self.storage.len();
            self.in_group = false;
        }
        Ok(&mut self.storage)
    }

    /// Record a command over the segments of the current group. `info.segments`
    /// is overwritten.
    pub fn add_command(&mut self, mut info: CommandInfo) -> Result<(), RuntimeError> {
        if self.complete {
            return Err(RuntimeError::internal("path command appended to a complete path"));
        }
        info.segments = self.group_start..self.storage.len();
        self.commands.push(info);
        self.in_group = true;
        Ok(())
    }

    /// Close the path for appends, adding an implicit fill for segments no
    /// command covers, and assign the identity if it has none yet.
    pub fn finish(&mut self) -> PathUid {
        if !self.complete {
            let uncovered = !self.in_group && self.storage.len() > self.group_start;
            if uncovered || self.commands.is_empty() {
                self.terminal = Some(CommandInfo::fill(self.group_start..self.storage.len()));
            }
            self.complete = true;
        }
        *self.uid.get_or_insert_with(PathUid::next)
    }

    pub fn terminal(&self) -> Option<&CommandInfo> { self.terminal.as_ref() }

    /// Every command to draw, the synthetic terminal last.
    pub fn commands(&self) -> impl Iterator<Item = &CommandInfo> {
        self.commands.iter().chain(self.terminal.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FrameRef { FrameRef::detached() }

    fn square(path: &mut CompiledPath) {
        let args = |x, y| PathArgs { x, y, ..PathArgs::default() };
        let s = path.storage_mut().unwrap();
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0)] {
            append_op(s, PathOpKind::LineTo, PathFlags::empty(), false, &args(x, y), &Affine::IDENTITY);
        }
        append_op(s, PathOpKind::ClosePoly, PathFlags::empty(), false, &PathArgs::default(), &Affine::IDENTITY);
    }

    #[test]
    fn uids_increase() {
        let a = PathUid::next();
        let b = PathUid::next();
        assert!(b > a);
    }

    #[test]
    fn finish_adds_terminal_fill() {
        let mut p = CompiledPath::new(frame());
        square(&mut p);
        let uid = p.finish();
        assert!(p.is_complete());
        assert_eq!(p.uid().unwrap(), uid);
        let cmds: Vec<_> = p.commands().collect();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].kind, CommandKind::Fill);
        assert_eq!(cmds[0].segments, 0..p.storage().len());
    }

    #[test]
    fn consecutive_commands_share_a_group() {
        let mut p = CompiledPath::new(frame());
        square(&mut p);
        let n = p.storage().len();
        p.add_command(CommandInfo::fill(0..0)).unwrap();
        let mut stroke = CommandInfo::fill(0..0);
        stroke.kind = CommandKind::Stroke;
        p.add_command(stroke).unwrap();
        square(&mut p);
        p.add_command(CommandInfo::fill(0..0)).unwrap();
        p.finish();

        let ranges: Vec<_> = p.commands().map(|c| c.segments.clone()).collect();
        assert_eq!(ranges, vec![0..n, 0..n, n..2 * n]);
        assert!(p.terminal().is_none());
    }

    #[test]
    fn trailing_ops_get_terminal() {
        let mut p = CompiledPath::new(frame());
        square(&mut p);
        p.add_command(CommandInfo::fill(0..0)).unwrap();
        let n = p.storage().len();
        square(&mut p);
        p.finish();
        assert_eq!(p.terminal().map(|c| c.segments.clone()), Some(n..2 * n));
    }

    #[test]
    fn complete_path_rejects_appends() {
        let mut p = CompiledPath::new(frame());
        square(&mut p);
        let first = p.finish();
        assert!(p.storage_mut().is_err());
        assert!(p.add_command(CommandInfo::fill(0..0)).is_err());
        assert_eq!(p.finish(), first);
    }

    #[test]
    fn missing_uid_is_internal() {
        let p = CompiledPath::new(frame());
        assert!(p.uid().unwrap_err().is_fatal());
    }

    #[test]
    fn relative_ops_follow_pen() {
        let mut s = PathStorage::new();
        let t = Affine::scale(2.0, 2.0);
        let args = PathArgs { x: 1.0, y: 0.0, ..PathArgs::default() };
        append_op(&mut s, PathOpKind::MoveTo, PathFlags::empty(), false, &args, &t);
        append_op(&mut s, PathOpKind::LineRel, PathFlags::empty(), false, &args, &t);
        assert_eq!(s.current_point(), (4.0, 0.0));
    }
}
