//! Lifecycle trace log attached to errors and leak reports.

use std::backtrace::Backtrace;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// The lifecycle event a [`TracePoint`] records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceKind {
    /// One more acquisition was taken on the resource.
    Acquire,
    /// The owner recorded an access through `touch`.
    Touch,
    /// `close` was called and decremented the acquisition count.
    Close,
    /// The last acquisition was closed and the resource is being disposed.
    Drop,
}

impl fmt::Display for TraceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TraceKind::Acquire => "acquire",
            TraceKind::Touch => "touch",
            TraceKind::Close => "close",
            TraceKind::Drop => "drop",
        };
        f.write_str(name)
    }
}

/// A single recorded lifecycle event.
#[derive(Debug, Clone)]
pub struct TracePoint {
    /// What happened.
    pub kind: TraceKind,
    /// Context supplied by the caller of `touch`.
    pub hint: Option<String>,
    /// The acquisition count observed when the event was recorded.
    pub acquires: isize,
    /// Where it happened. Only captured while leak detection is enabled.
    pub backtrace: Option<Arc<Backtrace>>,
}

/// Ordered, bounded log of [`TracePoint`]s. Once full, the oldest point is evicted for each new
/// one.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    points: VecDeque<TracePoint>,
    capacity: usize,
    evicted: usize,
    backtraces: bool,
}

impl Trace {
    pub(crate) fn new(capacity: usize, backtraces: bool) -> Trace {
        Trace {
            points: VecDeque::with_capacity(capacity.min(8)),
            capacity,
            evicted: 0,
            backtraces,
        }
    }

    pub(crate) fn record(&mut self, kind: TraceKind, hint: Option<&str>, acquires: isize) {
        if self.capacity == 0 {
            self.evicted += 1;
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
            self.evicted += 1;
        }
        self.points.push_back(TracePoint {
            kind,
            hint: hint.map(str::to_owned),
            acquires,
            backtrace: self
                .backtraces
                .then(|| Arc::new(Backtrace::force_capture())),
        });
    }

    /// The retained points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &TracePoint> {
        self.points.iter()
    }

    /// The retained points of the given kind, oldest first.
    pub fn points_of(&self, kind: TraceKind) -> impl Iterator<Item = &TracePoint> {
        self.points.iter().filter(move |p| p.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Number of points dropped because the log was full.
    pub fn evicted(&self) -> usize {
        self.evicted
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lifecycle trace ({} points", self.points.len())?;
        if self.evicted > 0 {
            write!(f, ", {} evicted", self.evicted)?;
        }
        write!(f, ")")?;
        for (i, point) in self.points.iter().enumerate() {
            write!(f, "\n  #{} {} acquires={}", i, point.kind, point.acquires)?;
            if let Some(hint) = &point.hint {
                write!(f, " hint={:?}", hint)?;
            }
            if let Some(backtrace) = &point.backtrace {
                for line in backtrace.to_string().lines() {
                    write!(f, "\n      {}", line)?;
                }
            }
        }
        Ok(())
    }
}
