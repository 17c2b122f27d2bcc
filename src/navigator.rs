//! Cursor and page arithmetic for a list of variable-height items.
//!
//! The navigator never looks at content. It keeps an anchor (`page_index`),
//! the on-screen offset of the selection from that anchor (`cursor_index`)
//! and the draw orientation, and asks an [`IndexOracle`] whether a candidate
//! index exists. The render step supplies how many items fit on screen for
//! the current frame.

use crate::error::Error;

/// Answers whether an absolute index can be presented.
pub trait IndexOracle {
    fn is_valid(&self, index: i64) -> bool;
}

impl<F> IndexOracle for F
where
    F: Fn(i64) -> bool,
{
    fn is_valid(&self, index: i64) -> bool {
        self(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn sign(self) -> i64 {
        match self {
            Direction::Up => -1,
            Direction::Down => 1,
        }
    }
}

/// Result of a movement: whether it landed somewhere, and whether the
/// caller has to redraw the whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub valid: bool,
    pub redraw: bool,
}

impl Outcome {
    const fn new(valid: bool, redraw: bool) -> Self {
        Self { valid, redraw }
    }

    pub fn into_result(self) -> Result<bool, Error> {
        if self.valid {
            Ok(self.redraw)
        } else {
            Err(Error::InvalidMove)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Navigator {
    pub page_index: i64,
    pub cursor_index: usize,
    pub inverted: bool,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Navigator {
    pub fn new(page_index: i64) -> Self {
        Self {
            page_index,
            cursor_index: 0,
            inverted: false,
        }
    }

    pub fn position(&self) -> (i64, usize, bool) {
        (self.page_index, self.cursor_index, self.inverted)
    }

    pub fn step(&self) -> i64 {
        if self.inverted {
            -1
        } else {
            1
        }
    }

    pub fn absolute_index(&self) -> i64 {
        self.page_index + self.step() * self.cursor_index as i64
    }

    /// Moves the selection by one item. `visible` is the number of items
    /// drawn in the current frame.
    pub fn move_cursor(
        &mut self,
        direction: Direction,
        visible: usize,
        oracle: &impl IndexOracle,
    ) -> Outcome {
        let forward = direction.sign() * self.step() > 0;

        if forward {
            if self.page_index < 0 {
                // leaving the thread root always lands on the first comment
                if oracle.is_valid(0) {
                    self.page_index = 0;
                    self.cursor_index = 0;
                    return Outcome::new(true, true);
                }
                return Outcome::new(false, false);
            }

            self.cursor_index += 1;
            if !oracle.is_valid(self.absolute_index()) {
                self.cursor_index -= 1;
                return Outcome::new(false, false);
            }
            if self.cursor_index + 1 >= visible {
                // the selection reached the far edge: draw from it instead
                self.flip(self.cursor_index);
                self.cursor_index = 0;
                return Outcome::new(true, true);
            }
            return Outcome::new(true, false);
        }

        if self.cursor_index > 0 {
            self.cursor_index -= 1;
            return Outcome::new(true, false);
        }

        self.page_index -= self.step();
        if oracle.is_valid(self.absolute_index()) {
            Outcome::new(true, true)
        } else {
            self.page_index += self.step();
            Outcome::new(false, false)
        }
    }

    /// Scrolls by a screenful. `visible` is the number of items drawn in
    /// the current frame. On failure the position is left untouched.
    ///
    /// Paging backward while already at the top of the first page reports
    /// an invalid move instead of a redraw, so the caller flashes rather
    /// than repainting an unchanged screen.
    pub fn move_page(
        &mut self,
        direction: Direction,
        visible: usize,
        oracle: &impl IndexOracle,
    ) -> Outcome {
        if self.absolute_index() < 0 || visible == 0 {
            return self.move_cursor(direction, visible, oracle);
        }

        let saved = *self;

        if direction == Direction::Up && self.absolute_index() < visible as i64 {
            self.page_index = -1;
            self.cursor_index = 0;
            self.inverted = false;
            if !oracle.is_valid(self.absolute_index()) {
                self.page_index = 0;
            }
            if *self == saved {
                return Outcome::new(false, false);
            }
            return Outcome::new(true, true);
        }

        let aligned = (direction == Direction::Down) != self.inverted;
        if !aligned {
            // re-anchor on the opposite edge of the current page
            self.page_index += self.step() * (visible - 1) as i64;
            self.inverted = !self.inverted;
            let span = visible - usize::from(direction == Direction::Up);
            self.cursor_index = span.saturating_sub(self.cursor_index);
        }

        let anchor = self.page_index;
        for n_move in (1..=visible).rev() {
            self.page_index = anchor + direction.sign() * n_move as i64;
            if oracle.is_valid(self.page_index) && oracle.is_valid(self.absolute_index()) {
                return Outcome::new(true, true);
            }
        }

        *self = saved;
        Outcome::new(false, false)
    }

    /// Reflects the page around the item `count` steps from the anchor,
    /// which becomes the new anchor, drawn from the opposite edge.
    ///
    /// Two consecutive flips with the same `count` restore `inverted` but not
    /// necessarily the indices, because the step changes sign in between.
    pub fn flip(&mut self, count: usize) {
        self.page_index += self.step() * count as i64;
        self.cursor_index = count;
        self.inverted = !self.inverted;
    }

    /// Keeps the cursor on a drawn item after the page shrank.
    pub fn clamp_cursor(&mut self, visible: usize) {
        if visible > 0 && self.cursor_index >= visible {
            self.cursor_index = visible - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(lo: i64, hi: i64) -> impl Fn(i64) -> bool {
        move |index| (lo..=hi).contains(&index)
    }

    #[test]
    fn flip_reflects_around_count() {
        let mut nav = Navigator::new(0);
        nav.flip(3);
        assert_eq!(nav.position(), (3, 3, true));
        nav.flip(3);
        assert_eq!(nav.position(), (0, 3, false));
    }

    #[test]
    fn move_cursor_within_page() {
        let oracle = range(0, 9);
        let mut nav = Navigator::new(0);
        let out = nav.move_cursor(Direction::Down, 5, &oracle);
        assert_eq!(out, Outcome::new(true, false));
        assert_eq!(nav.absolute_index(), 1);
        let out = nav.move_cursor(Direction::Up, 5, &oracle);
        assert_eq!(out, Outcome::new(true, false));
        assert_eq!(nav.position(), (0, 0, false));
    }

    #[test]
    fn move_cursor_rejects_past_end() {
        let oracle = range(0, 1);
        let mut nav = Navigator {
            page_index: 0,
            cursor_index: 1,
            inverted: false,
        };
        let out = nav.move_cursor(Direction::Down, 5, &oracle);
        assert_eq!(out, Outcome::new(false, false));
        assert_eq!(nav.position(), (0, 1, false));
        assert!(matches!(out.into_result(), Err(Error::InvalidMove)));
    }

    #[test]
    fn inverted_backward_move_shifts_anchor() {
        let oracle = range(0, 9);
        let mut nav = Navigator {
            page_index: 5,
            cursor_index: 0,
            inverted: true,
        };
        let out = nav.move_cursor(Direction::Down, 3, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        assert_eq!(nav.position(), (6, 0, true));
    }

    #[test]
    fn tiny_viewport_does_not_underflow() {
        let oracle = range(0, 9);
        let mut nav = Navigator::new(0);
        let out = nav.move_cursor(Direction::Down, 0, &oracle);
        assert!(out.valid && out.redraw);
        assert_eq!(nav.position(), (1, 0, true));
        assert_eq!(nav.absolute_index(), 1);
    }

    #[test]
    fn page_down_then_clamps_at_end() {
        let oracle = range(0, 7);
        let mut nav = Navigator::new(0);
        assert_eq!(nav.move_page(Direction::Down, 5, &oracle), Outcome::new(true, true));
        assert_eq!(nav.position(), (5, 0, false));
        assert_eq!(nav.move_page(Direction::Down, 5, &oracle), Outcome::new(true, true));
        assert_eq!(nav.position(), (7, 0, false));
        assert_eq!(nav.move_page(Direction::Down, 5, &oracle), Outcome::new(false, false));
        assert_eq!(nav.position(), (7, 0, false));
    }

    #[test]
    fn page_up_on_first_page_goes_to_top() {
        let oracle = range(0, 7);
        let mut nav = Navigator {
            page_index: 0,
            cursor_index: 2,
            inverted: false,
        };
        assert_eq!(nav.move_page(Direction::Up, 5, &oracle), Outcome::new(true, true));
        assert_eq!(nav.position(), (0, 0, false));
        assert_eq!(nav.move_page(Direction::Up, 5, &oracle), Outcome::new(false, false));
    }

    #[test]
    fn page_up_on_thread_returns_to_root() {
        let oracle = range(-1, 20);
        let mut nav = Navigator {
            page_index: 1,
            cursor_index: 1,
            inverted: false,
        };
        let out = nav.move_page(Direction::Up, 4, &oracle);
        assert!(out.valid);
        assert_eq!(nav.position(), (-1, 0, false));
    }

    #[test]
    fn page_down_from_inverted_reanchors_at_top() {
        let oracle = range(0, 30);
        // inverted page drawn bottom-up from 12: 12, 11, 10, 9, 8
        let mut nav = Navigator {
            page_index: 12,
            cursor_index: 2,
            inverted: true,
        };
        let out = nav.move_page(Direction::Down, 5, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        // anchored on 8 with the cursor at 5 - 2, then one screen down
        assert_eq!(nav.position(), (13, 3, false));
        assert_eq!(nav.absolute_index(), 16);
    }

    #[test]
    fn page_up_from_upright_reanchors_at_bottom() {
        let oracle = range(0, 30);
        // page drawn top-down from 10: 10, 11, 12, 13, 14
        let mut nav = Navigator {
            page_index: 10,
            cursor_index: 1,
            inverted: false,
        };
        let out = nav.move_page(Direction::Up, 5, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        // anchored on 14 with the cursor at 4 - 1, then one screen up
        assert_eq!(nav.position(), (9, 3, true));
        assert_eq!(nav.absolute_index(), 6);
    }

    #[test]
    fn page_down_from_inverted_shrinks_block_near_end() {
        let oracle = range(0, 14);
        let mut nav = Navigator {
            page_index: 12,
            cursor_index: 2,
            inverted: true,
        };
        // anchored on 8 with cursor 3: blocks of 5 and 4 overshoot 14
        let out = nav.move_page(Direction::Down, 5, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        assert_eq!(nav.position(), (11, 3, false));
        assert_eq!(nav.absolute_index(), 14);
    }

    #[test]
    fn page_up_from_inverted_stays_inverted() {
        let oracle = range(0, 30);
        let mut nav = Navigator {
            page_index: 20,
            cursor_index: 1,
            inverted: true,
        };
        let out = nav.move_page(Direction::Up, 5, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        assert_eq!(nav.position(), (15, 1, true));
    }

    #[test]
    fn failed_page_rolls_back_flip() {
        let oracle = range(0, 4);
        let mut nav = Navigator {
            page_index: 4,
            cursor_index: 0,
            inverted: true,
        };
        let out = nav.move_page(Direction::Down, 5, &oracle);
        assert_eq!(out, Outcome::new(false, false));
        assert_eq!(nav.position(), (4, 0, true));
    }

    #[test]
    fn page_from_root_degrades_to_move() {
        let oracle = range(-1, 3);
        let mut nav = Navigator::new(-1);
        let out = nav.move_page(Direction::Down, 3, &oracle);
        assert_eq!(out, Outcome::new(true, true));
        assert_eq!(nav.position(), (0, 0, false));
    }

    #[test]
    fn clamp_cursor_after_shrink() {
        let mut nav = Navigator {
            page_index: 0,
            cursor_index: 6,
            inverted: false,
        };
        nav.clamp_cursor(3);
        assert_eq!(nav.cursor_index, 2);
        nav.clamp_cursor(0);
        assert_eq!(nav.cursor_index, 2);
    }
}
