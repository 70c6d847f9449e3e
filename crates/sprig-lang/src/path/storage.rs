//! Plain 2-D path container. Compiled paths append to it; nothing here
//! interprets the geometry beyond tracking the pen position.

use crate::types::geometry::Point;

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    MoveTo(Point),
    LineTo(Point),
    /// Elliptical arc from the current point to `to`.
    Arc {
        to: Point,
        radii: (f64, f64),
        /// x-axis rotation in degrees.
        angle: f64,
        large: bool,
        sweep: bool,
    },
    Quad { ctrl: Point, to: Point },
    Cubic { ctrl1: Point, ctrl2: Point, to: Point },
    Close,
}

impl Segment {
    pub fn end_point(&self) -> Option<Point> {
        match self {
            Segment::MoveTo(p) | Segment::LineTo(p) => Some(*p),
            Segment::Arc { to, .. }
            | Segment::Quad { to, .. }
            | Segment::Cubic { to, .. } => Some(*to),
            Segment::Close => None,
        }
    }

    fn set_end_point(&mut self, p: Point) {
        match self {
            Segment::MoveTo(q) | Segment::LineTo(q) => *q = p,
            Segment::Arc { to, .. }
            | Segment::Quad { to, .. }
            | Segment::Cubic { to, .. } => *to = p,
            Segment::Close => {}
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathStorage {
    segments: Vec<Segment>,
    current: Point,
    subpath_start: Point,
    open: bool,
}

impl PathStorage {
    pub fn new() -> Self { Self::default() }

    pub fn segments(&self) -> &[Segment] { &self.segments }

    pub fn len(&self) -> usize { self.segments.len() }

    pub fn is_empty(&self) -> bool { self.segments.is_empty() }

    pub fn current_point(&self) -> Point { self.current }

    pub fn subpath_start(&self) -> Point { self.subpath_start }

    pub fn move_to(&mut self, p: Point) {
        self.segments.push(Segment::MoveTo(p));
        self.current = p;
        self.subpath_start = p;
        self.open = true;
    }

    /// Drawing without an open sub-path starts one at the pen position.
    fn ensure_open(&mut self) {
        if !self.open {
            let p = self.current;
            self.move_to(p);
        }
    }

    fn push_drawn(&mut self, seg: Segment, to: Point) {
        self.ensure_open();
        self.segments.push(seg);
        self.current = to;
    }

    pub fn line_to(&mut self, to: Point) {
        self.push_drawn(Segment::LineTo(to), to);
    }

    pub fn arc_to(&mut self, to: Point, radii: (f64, f64), angle: f64, large: bool, sweep: bool) {
        self.push_drawn(Segment::Arc { to, radii, angle, large, sweep }, to);
    }

    pub fn quad_to(&mut self, ctrl: Point, to: Point) {
        self.push_drawn(Segment::Quad { ctrl, to }, to);
    }

    pub fn cubic_to(&mut self, ctrl1: Point, ctrl2: Point, to: Point) {
        self.push_drawn(Segment::Cubic { ctrl1, ctrl2, to }, to);
    }

    /// Close the open sub-path. With `align`, an end point that misses the
    /// sub-path start is snapped onto it first.
    pub fn close(&mut self, align: bool) {
        if !self.open {
            return;
        }
        if align && self.current != self.subpath_start {
            let start = self.subpath_start;
            if let Some(last) = self.segments.last_mut() {
                last.set_end_point(start);
            }
        }
        self.segments.push(Segment::Close);
        self.current = self.subpath_start;
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_without_move_starts_at_pen() {
        let mut p = PathStorage::new();
        p.line_to((1.0, 0.0));
        assert_eq!(p.segments(), &[Segment::MoveTo((0.0, 0.0)), Segment::LineTo((1.0, 0.0))]);
        assert_eq!(p.current_point(), (1.0, 0.0));
    }

    #[test]
    fn close_returns_to_start() {
        let mut p = PathStorage::new();
        p.move_to((1.0, 1.0));
        p.line_to((2.0, 1.0));
        p.close(false);
        assert_eq!(p.current_point(), (1.0, 1.0));
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn aligned_close_snaps_last_point() {
        let mut p = PathStorage::new();
        p.move_to((0.0, 0.0));
        p.line_to((1.0, 0.0));
        p.line_to((0.0, 1e-7));
        p.close(true);
        assert_eq!(p.segments()[2].end_point(), Some((0.0, 0.0)));
    }

    #[test]
    fn closing_twice_is_a_no_op() {
        let mut p = PathStorage::new();
        p.move_to((0.0, 0.0));
        p.line_to((1.0, 0.0));
        p.close(false);
        p.close(false);
        assert_eq!(p.len(), 3);
    }
}
