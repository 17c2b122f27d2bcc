use crate::navigator::Navigator;
use crate::sequence::{DrawUnit, Sequence, Units};

/// A drawable unit cut to the rows it gets on screen.
#[derive(Debug, Clone)]
pub struct Slot<'a> {
    pub unit: DrawUnit<'a>,
    pub rows: usize,
}

/// Lazily takes units while the row budget lasts. Each item costs its row
/// span plus one blank separator row; the last item may be cut short.
#[derive(Debug, Clone)]
pub struct DrawUnits<'a> {
    units: Units<'a>,
    remaining: usize,
    exhausted_budget: bool,
}

impl DrawUnits<'_> {
    /// True once the budget ran out, i.e. the page is full.
    pub fn is_full(&self) -> bool {
        self.exhausted_budget
    }
}

impl<'a> Iterator for DrawUnits<'a> {
    type Item = Slot<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            self.exhausted_budget = true;
            return None;
        }
        let unit = self.units.next()?;
        let rows = unit.row_span().min(self.remaining);
        self.remaining = self.remaining.saturating_sub(rows + 1);
        if self.remaining == 0 {
            self.exhausted_budget = true;
        }
        Some(Slot { unit, rows })
    }
}

pub fn draw_units(
    seq: &Sequence,
    start: i64,
    step: i64,
    available_rows: usize,
    width: usize,
) -> DrawUnits<'_> {
    DrawUnits {
        units: seq.iterate(start, step, width),
        remaining: available_rows,
        exhausted_budget: available_rows == 0,
    }
}

#[derive(Debug, Clone)]
pub struct Placement<'a> {
    pub unit: DrawUnit<'a>,
    /// First screen row, relative to the content area.
    pub top: usize,
    pub height: usize,
    /// Set when a cut item should show its last rows instead of its first.
    pub from_bottom: bool,
}

#[derive(Debug, Clone)]
pub struct Plan<'a> {
    pub placements: Vec<Placement<'a>>,
    pub full: bool,
}

impl<'a> Plan<'a> {
    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    /// Placement under the cursor.
    pub fn selected(&self, nav: &Navigator) -> Option<&Placement<'a>> {
        self.placements.get(nav.cursor_index)
    }
}

/// Lays out one page from the navigator's anchor. Inverted pages stack
/// upwards from the bottom row.
pub fn plan<'a>(seq: &'a Sequence, nav: &Navigator, rows: usize, width: usize) -> Plan<'a> {
    let mut units = draw_units(seq, nav.page_index, nav.step(), rows, width);
    let mut placements = Vec::new();
    let mut used = 0usize;
    for slot in units.by_ref() {
        let top = if nav.inverted {
            rows - used - slot.rows
        } else {
            used
        };
        let cut = slot.rows < slot.unit.row_span();
        used += slot.rows + 1;
        placements.push(Placement {
            unit: slot.unit,
            top,
            height: slot.rows,
            from_bottom: nav.inverted && cut,
        });
    }
    let full = units.is_full();
    Plan { placements, full }
}

/// Plans the page the render step draws. A partly filled inverted page is
/// renormalized to draw downwards from its topmost item, and the cursor is
/// kept on a drawn item.
pub fn settle<'a>(seq: &'a Sequence, nav: &mut Navigator, rows: usize, width: usize) -> Plan<'a> {
    let mut page = plan(seq, nav, rows, width);
    if !page.full && nav.inverted && !page.is_empty() {
        nav.flip(page.len() - 1);
        page = plan(seq, nav, rows, width);
    }
    nav.clamp_cursor(page.len());
    page
}
