//! Parameter stack for one render session.
//!
//! Slots are named bindings; frames record where each body's slots begin.
//! Lookup walks from the innermost slot outward, so an inner binding shadows
//! an outer one with the same name.

use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, ErrorCode, RuntimeError};
use crate::grammar::statement::Define;
use crate::runtime::value::Value;
use crate::syntax::ast::Span;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub enum Binding<'g> {
    Value(Value),
    /// Non-constant define; evaluated at each reference.
    Deferred(&'g Define),
    Function(&'g Define),
}

#[derive(Debug, Clone)]
pub struct Slot<'g> {
    pub name: &'g str,
    pub binding: Binding<'g>,
}

/// Saved stack height, restored by `unwind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    slots: usize,
    frames: usize,
}

/// Non-owning handle to a stack position in a given session. It resolves
/// only against the stack of the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRef {
    session: u64,
    height: usize,
}

impl FrameRef {
    /// A handle that resolves against no session.
    pub fn detached() -> Self { Self { session: 0, height: 0 } }

    pub fn height(&self) -> usize { self.height }
}

/// Which slots a lookup may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Every slot. Only the global frame exists while this is in force.
    Full,
    /// Function arguments first, then the current rule's own slots, then
    /// the globals below `globals_end`. Slots of calling rules fall in none
    /// of these.
    Lexical { args: Range<usize>, scope: Range<usize>, globals_end: usize },
}

impl View {
    /// A rule body whose first frame starts at `base`.
    pub fn rule(base: usize, globals_end: usize) -> Self {
        View::Lexical { args: 0..0, scope: base..usize::MAX, globals_end }
    }

    /// What the binding at `slot` saw where it was declared.
    pub fn before(&self, slot: usize) -> Self { self.cut(slot, slot) }

    /// As `before`, with the binding at `slot` itself still visible.
    pub fn through(&self, slot: usize) -> Self { self.cut(slot, slot + 1) }

    pub fn with_args(self, args: Range<usize>) -> Self {
        match self {
            View::Full => View::Lexical { args, scope: 0..0, globals_end: usize::MAX },
            View::Lexical { scope, globals_end, .. } => View::Lexical { args, scope, globals_end },
        }
    }

    fn cut(&self, slot: usize, end: usize) -> Self {
        match self {
            View::Full => View::Lexical { args: 0..0, scope: 0..0, globals_end: end },
            View::Lexical { args, scope, globals_end } => {
                if args.contains(&slot) {
                    View::Lexical { args: args.start..end, scope: scope.clone(), globals_end: *globals_end }
                } else if scope.contains(&slot) {
                    View::Lexical { args: 0..0, scope: scope.start..end, globals_end: *globals_end }
                } else {
                    View::Lexical { args: 0..0, scope: 0..0, globals_end: end.min(*globals_end) }
                }
            }
        }
    }
}

#[derive(Debug)]
pub struct ParamStack<'g> {
    slots: Vec<Slot<'g>>,
    frames: Vec<usize>,
    session: u64,
}

impl<'g> Default for ParamStack<'g> {
    fn default() -> Self { Self::new() }
}

impl<'g> ParamStack<'g> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            frames: Vec::new(),
            session: NEXT_SESSION.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn height(&self) -> usize { self.slots.len() }

    pub fn depth(&self) -> usize { self.frames.len() }

    pub fn mark(&self) -> Mark {
        Mark { slots: self.slots.len(), frames: self.frames.len() }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(self.slots.len());
    }

    /// Slots pushed since the innermost frame began.
    pub fn frame_len(&self) -> usize {
        self.slots.len() - self.frames.last().copied().unwrap_or(0)
    }

    /// Bind `name` in the innermost frame. Names are unique per frame.
    pub fn push(&mut self, name: &'g str, binding: Binding<'g>, span: &Span) -> Result<(), RuntimeError> {
        let start = self.frames.last().copied().unwrap_or(0);
        if self.slots[start..].iter().any(|s| s.name == name) {
            return Err(Error::at(ErrorCode::G010, span, format!("'{name}' is already defined in this scope")).into());
        }
        self.slots.push(Slot { name, binding });
        Ok(())
    }

    /// Truncate back to `mark`. A stack already below the mark has been
    /// corrupted by someone else's unwind.
    pub fn unwind(&mut self, mark: Mark) -> Result<(), RuntimeError> {
        if self.slots.len() < mark.slots || self.frames.len() < mark.frames {
            return Err(RuntimeError::internal(format!(
                "parameter stack at {} slots / {} frames, below saved {} / {}",
                self.slots.len(), self.frames.len(), mark.slots, mark.frames,
            )));
        }
        self.slots.truncate(mark.slots);
        self.frames.truncate(mark.frames);
        Ok(())
    }

    /// Innermost visible binding for `name`, with its slot index.
    pub fn lookup(&self, name: &str, view: &View) -> Option<(usize, Binding<'g>)> {
        let find = |range: Range<usize>| {
            range.rev().find(|&i| self.slots[i].name == name)
        };
        let len = self.slots.len();
        let clamp = |r: &Range<usize>| r.start.min(len)..r.end.min(len);
        let index = match view {
            View::Full => find(0..len),
            View::Lexical { args, scope, globals_end } => find(clamp(args))
                .or_else(|| find(clamp(scope)))
                .or_else(|| find(0..(*globals_end).min(len))),
        }?;
        Some((index, self.slots[index].binding.clone()))
    }

    pub fn frame_ref(&self) -> FrameRef {
        FrameRef { session: self.session, height: self.slots.len() }
    }

    /// The slots visible from `frame`, if it belongs to this session and
    /// has not been unwound.
    pub fn resolve(&self, frame: FrameRef) -> Option<&[Slot<'g>]> {
        if frame.session != self.session || frame.height > self.slots.len() {
            return None;
        }
        Some(&self.slots[..frame.height])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> Binding<'static> { Binding::Value(Value::Number(v)) }

    fn value_of(stack: &ParamStack, name: &str, view: &View) -> Option<f64> {
        match stack.lookup(name, view)? {
            (_, Binding::Value(Value::Number(v))) => Some(v),
            _ => None,
        }
    }

    #[test]
    fn inner_shadows_outer() {
        let mut s = ParamStack::new();
        let span = Span::default();
        s.push_frame();
        s.push("a", num(1.0), &span).unwrap();
        let mark = s.mark();
        s.push_frame();
        s.push("a", num(2.0), &span).unwrap();
        assert_eq!(value_of(&s, "a", &View::Full), Some(2.0));
        s.unwind(mark).unwrap();
        assert_eq!(value_of(&s, "a", &View::Full), Some(1.0));
    }

    #[test]
    fn duplicate_in_frame_rejected() {
        let mut s = ParamStack::new();
        let span = Span::new(3, 1);
        s.push_frame();
        s.push("a", num(1.0), &span).unwrap();
        match s.push("a", num(2.0), &span) {
            Err(RuntimeError::Grammar(e)) => assert_eq!(e.code, ErrorCode::G010),
            other => panic!("expected G010, got {other:?}"),
        }
    }

    #[test]
    fn unwind_below_mark_is_internal() {
        let mut s = ParamStack::new();
        s.push_frame();
        s.push("a", num(1.0), &Span::default()).unwrap();
        let mark = s.mark();
        s.unwind(ParamStack::new().mark()).unwrap();
        assert!(s.unwind(mark).unwrap_err().is_fatal());
    }

    #[test]
    fn before_hides_newer_slots() {
        let mut s = ParamStack::new();
        let span = Span::default();
        s.push_frame();
        s.push("a", num(1.0), &span).unwrap();
        s.push("b", num(2.0), &span).unwrap();
        s.push("c", num(3.0), &span).unwrap();
        let view = View::Full.before(1);
        assert_eq!(value_of(&s, "a", &view), Some(1.0));
        assert_eq!(value_of(&s, "b", &view), None);
        assert_eq!(value_of(&s, "a", &View::Full.through(1)), Some(1.0));
        assert_eq!(value_of(&s, "b", &View::Full.through(1)), Some(2.0));
    }

    /// globals `g`, caller rule binds `k` and `g`, callee rule binds `m`.
    fn nested_rules() -> (ParamStack<'static>, usize, usize) {
        let mut s = ParamStack::new();
        let span = Span::default();
        s.push_frame();
        s.push("g", num(1.0), &span).unwrap();
        let globals_end = s.height();
        s.push_frame();
        s.push("k", num(7.0), &span).unwrap();
        s.push("g", num(9.0), &span).unwrap();
        let callee = s.height();
        s.push_frame();
        s.push("m", num(4.0), &span).unwrap();
        (s, globals_end, callee)
    }

    #[test]
    fn rule_view_skips_caller_frames() {
        let (s, globals_end, callee) = nested_rules();
        let view = View::rule(callee, globals_end);
        assert_eq!(value_of(&s, "m", &view), Some(4.0));
        assert_eq!(value_of(&s, "g", &view), Some(1.0));
        assert_eq!(value_of(&s, "k", &view), None);
        assert_eq!(value_of(&s, "g", &View::Full), Some(9.0));
    }

    #[test]
    fn cut_views_stay_inside_the_rule() {
        let (mut s, globals_end, callee) = nested_rules();
        s.push("n", num(5.0), &Span::default()).unwrap();
        let view = View::rule(callee, globals_end);

        // Declared at the callee's `n`: sees `m` and the globals only.
        let declared = view.before(callee + 1);
        assert_eq!(value_of(&s, "m", &declared), Some(4.0));
        assert_eq!(value_of(&s, "n", &declared), None);
        assert_eq!(value_of(&s, "k", &declared), None);

        // A global's view ends below the global itself.
        let global = view.before(0);
        assert_eq!(value_of(&s, "g", &global), None);

        let call = view.through(callee).with_args(callee + 1..callee + 2);
        assert_eq!(value_of(&s, "n", &call), Some(5.0));
        assert_eq!(value_of(&s, "m", &call), Some(4.0));
        assert_eq!(value_of(&s, "g", &call), Some(1.0));
        assert_eq!(value_of(&s, "k", &call), None);
    }

    #[test]
    fn frame_refs_are_session_scoped() {
        let mut s = ParamStack::new();
        s.push_frame();
        s.push("a", num(1.0), &Span::default()).unwrap();
        let f = s.frame_ref();
        assert_eq!(s.resolve(f).map(|slots| slots.len()), Some(1));
        assert!(ParamStack::new().resolve(f).is_none());
        assert!(s.resolve(FrameRef::detached()).is_none());
        s.unwind(ParamStack::new().mark()).unwrap();
        assert!(s.resolve(f).is_none());
    }
}
