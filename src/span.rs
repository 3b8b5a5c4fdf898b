//! Source locations attached to call sites.
//!
//! The resolver itself never looks inside a span; spans only travel with call
//! sites so that diagnostics and internal errors can point back at the code
//! that produced them.

/// A half-open byte span in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: SpanIndex,
    pub end: SpanIndex,
}

/// The integer type used for span indices.
pub type SpanIndex = u32;

impl Span {
    pub const ZERO: Span = Span { start: 0, end: 0 };

    pub const fn new(start: SpanIndex, end: SpanIndex) -> Self {
        Self { start, end }
    }

    /// Returns the length of the byte range represented by `self`.
    pub fn length(&self) -> SpanIndex {
        self.end - self.start
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}
