use crate::core::types::Span;

/// Run-wide character and frame cursors.
///
/// Character positions start at 1 and frame positions at 0. Every token
/// consumes its length plus one separator position unless it is glued to
/// the next token, so consecutive token spans never overlap.
#[derive(Debug, Clone)]
pub struct RangeTracker {
    char_cursor: u64,
    frame_cursor: u64,
    last_char_high: u64,
}

impl RangeTracker {
    pub fn new() -> Self {
        RangeTracker {
            char_cursor: 1,
            frame_cursor: 0,
            last_char_high: 1,
        }
    }

    pub fn char_cursor(&self) -> u64 {
        self.char_cursor
    }

    pub fn frame_cursor(&self) -> u64 {
        self.frame_cursor
    }

    /// Upper bound of the last emitted token span
    pub fn last_char_high(&self) -> u64 {
        self.last_char_high
    }

    /// Emit the span of a token of `length` characters and move past it
    pub fn advance_char(&mut self, length: u64, space_after: bool) -> Span {
        let span = Span::widened(self.char_cursor, self.char_cursor + length);
        let gap = if space_after { 1 } else { 0 };
        self.char_cursor = span.high + gap;
        self.last_char_high = span.high;
        span
    }

    /// Whether nothing was emitted since `start`
    pub fn is_empty_since(&self, start: u64) -> bool {
        self.last_char_high <= start
    }

    /// Take one position for an extent that emitted no token, so the next
    /// extent starts past it
    pub fn claim_empty(&mut self) -> Span {
        let span = Span::widened(self.char_cursor, self.char_cursor);
        self.char_cursor = span.high;
        self.last_char_high = span.high;
        span
    }

    /// Map a document-local frame interval onto the global timeline
    pub fn advance_frame(&mut self, local: (u64, u64), offset: u64) -> Span {
        let span = Span::widened(local.0 + offset, local.1 + offset);
        self.frame_cursor = span.high;
        span
    }

    /// Span from `start` to the last emitted position
    pub fn char_span_since(&self, start: u64) -> Span {
        Span::widened(start, self.last_char_high)
    }

    pub fn frame_span_since(&self, start: u64) -> Span {
        Span::widened(start, self.frame_cursor)
    }
}

impl Default for RangeTracker {
    fn default() -> Self {
        RangeTracker::new()
    }
}
