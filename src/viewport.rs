use std::ops::Range;

/// The slice of the rule list that fits on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub start: usize,
    pub end: usize,
}

impl Viewport {
    /// Scrolls only as far as needed to keep `selected` on the last visible row.
    pub fn compute(selected: usize, total: usize, height: usize) -> Self {
        if height == 0 {
            return Self { start: 0, end: 0 };
        }
        let start = if selected < height { 0 } else { selected - height + 1 };
        let end = total.min(start + height);
        Self { start, end }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}
