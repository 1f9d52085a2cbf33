//! Per-call execution state: call depth, and optional frame tracing.

use std::io::Write;

use crate::error::Trap;

/// Static description of a compiled function, emitted once per function.
#[derive(Debug, PartialEq, Eq)]
pub struct FrameInfo {
    pub module: &'static str,
    pub name: &'static str,
    pub index: u32,
}

/// Receives call events from a [`Thread`] with tracing enabled.
pub trait TraceSink {
    fn enter(&mut self, depth: u32, frame: &FrameInfo);
    fn leave(&mut self, depth: u32, frame: &FrameInfo);
    /// Called once from [`Thread::close`].
    fn close(&mut self);
}

/// A call-depth counter with a configurable maximum.
///
/// A `Thread` is cheap; create one per logical call and do not share it.
/// Every generated function brackets its body with [`Thread::enter`] and
/// [`Thread::leave`]. A trap skips the `leave`, so call boundaries restore
/// the depth with [`Thread::unwind`].
pub struct Thread {
    depth: u32,
    max_depth: u32,
    recording: bool,
    frames: Vec<&'static FrameInfo>,
    trace: Option<Box<dyn TraceSink>>,
}

impl Thread {
    /// Creates a thread. A `max_depth` of 0 means unlimited.
    pub fn new(max_depth: u32) -> Self {
        Self {
            depth: 0,
            max_depth: if max_depth == 0 { u32::MAX } else { max_depth },
            recording: false,
            frames: Vec::new(),
            trace: None,
        }
    }

    /// Sends every call and return to `sink`.
    pub fn with_trace(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.recording = true;
        self.trace = Some(sink);
        self
    }

    /// Records the active frames so they can be inspected with
    /// [`Thread::frames`].
    pub fn debug(mut self) -> Self {
        self.recording = true;
        self
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The active frames, innermost last. Empty unless recording.
    pub fn frames(&self) -> &[&'static FrameInfo] {
        &self.frames
    }

    #[inline]
    pub fn enter(&mut self, frame: &'static FrameInfo) -> Result<(), Trap> {
        if self.depth >= self.max_depth {
            return Err(Trap::CallStackExhausted);
        }
        self.depth += 1;
        if self.recording {
            self.frames.push(frame);
            if let Some(sink) = self.trace.as_mut() {
                sink.enter(self.depth, frame);
            }
        }
        Ok(())
    }

    #[inline]
    pub fn leave(&mut self) {
        if self.recording {
            if let Some(frame) = self.frames.pop() {
                if let Some(sink) = self.trace.as_mut() {
                    sink.leave(self.depth, frame);
                }
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Restores the depth recorded before a call that trapped.
    pub fn unwind(&mut self, depth: u32) {
        if self.depth > depth {
            self.depth = depth;
            self.frames.truncate(depth as usize);
        }
    }

    /// Flushes the trace sink, if any.
    pub fn close(&mut self) {
        if let Some(sink) = self.trace.as_mut() {
            sink.close();
        }
    }
}

impl Default for Thread {
    fn default() -> Self {
        Thread::new(0)
    }
}

// ── Sinks ──

/// Writes one line per event: `> depth module.name`, `< depth module.name`,
/// and `end` on close.
pub struct WriterSink<W: Write> {
    out: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }
}

impl<W: Write> TraceSink for WriterSink<W> {
    fn enter(&mut self, depth: u32, frame: &FrameInfo) {
        // Tracing is best effort; a failing writer must not turn into a trap.
        let _ = writeln!(self.out, "> {depth} {}.{}", frame.module, frame.name);
    }

    fn leave(&mut self, depth: u32, frame: &FrameInfo) {
        let _ = writeln!(self.out, "< {depth} {}.{}", frame.module, frame.name);
    }

    fn close(&mut self) {
        let _ = writeln!(self.out, "end");
        let _ = self.out.flush();
    }
}

/// Emits `tracing` events at `TRACE` level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn enter(&mut self, depth: u32, frame: &FrameInfo) {
        tracing::trace!(depth, module = frame.module, function = frame.name, "enter");
    }

    fn leave(&mut self, depth: u32, frame: &FrameInfo) {
        tracing::trace!(depth, module = frame.module, function = frame.name, "leave");
    }

    fn close(&mut self) {
        tracing::trace!("end");
    }
}
