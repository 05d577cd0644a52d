//! Spiral scan order around a center position.
//!
//! Picks are `center, +1, -1, +2, -2, …`. Each side has its own cursor; a
//! cursor that runs off its end of the collection stops for good and the
//! other side keeps going alone.

/// One scheduled position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pick {
    pub rank: usize,
    /// Signed distance from the center.
    pub offset: isize,
}

#[derive(Clone, Debug)]
pub struct Spiral {
    center: usize,
    /// Steps taken to the right / left of the center.
    right: usize,
    left: usize,
    right_done: bool,
    left_done: bool,
    /// Whether the next pick tries the right side first.
    right_turn: bool,
    started: bool,
}

impl Spiral {
    pub fn new(center: usize) -> Self {
        Spiral {
            center,
            right: 0,
            left: 0,
            right_done: false,
            left_done: false,
            right_turn: true,
            started: false,
        }
    }

    pub fn center(&self) -> usize {
        self.center
    }

    /// Next pick within a collection of `count` positions, or None once both
    /// cursors are exhausted.
    ///
    /// `count` is passed per call because the collection can change size
    /// underneath a running scan.
    pub fn next_pick(&mut self, count: usize) -> Option<Pick> {
        if !self.started {
            self.started = true;
            if self.center >= count {
                self.right_done = true;
                self.left_done = true;
                return None;
            }
            return Some(Pick {
                rank: self.center,
                offset: 0,
            });
        }

        let right_first = self.right_turn;
        self.right_turn = !self.right_turn;
        if right_first {
            self.step_right(count).or_else(|| self.step_left())
        } else {
            self.step_left().or_else(|| self.step_right(count))
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.started && self.right_done && self.left_done
    }

    fn step_right(&mut self, count: usize) -> Option<Pick> {
        if self.right_done {
            return None;
        }
        let rank = self.center + self.right + 1;
        if rank >= count {
            self.right_done = true;
            return None;
        }
        self.right += 1;
        Some(Pick {
            rank,
            offset: self.right as isize,
        })
    }

    fn step_left(&mut self) -> Option<Pick> {
        if self.left_done {
            return None;
        }
        if self.left >= self.center {
            self.left_done = true;
            return None;
        }
        self.left += 1;
        Some(Pick {
            rank: self.center - self.left,
            offset: -(self.left as isize),
        })
    }
}
