//! Terminal-width-aware status lines.
//!
//! A line is built from [`Section`]s: literal text with one `{}` slot, the
//! value substituted into it, a priority and the side to cut from. When the
//! line is too wide for the terminal, low-priority values give up space first
//! and cut values get a filler marker on the cut side. Lengths are counted in
//! `char`s; glyph display widths are not considered.

use super::constants::{STATUS_FILLER, STATUS_MIN_LENGTH};

/// Which end of a value is dropped when it is cut.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cut {
    /// Keep the tail: `..end-of-value`.
    Front,
    /// Keep the head: `start-of-val..`.
    Back,
}

/// One formatter input unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Literal text containing a single `{}` slot.
    pub text: String,
    /// Value substituted into the slot.
    pub value: String,
    /// Higher priorities keep more of their value.
    pub priority: i32,
    /// Side to cut from.
    pub cut: Cut,
}

impl Section {
    /// Creates a section.
    pub fn new(text: impl Into<String>, value: impl Into<String>, priority: i32, cut: Cut) -> Self {
        Self {
            text: text.into(),
            value: value.into(),
            priority,
            cut,
        }
    }

    fn render(&self, value: &str) -> String {
        self.text.replacen("{}", value, 1)
    }
}

/// Tuning knobs for [`fit_sections`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitOptions<'a> {
    /// Marker inserted where a value was cut.
    pub filler: &'a str,
    /// Values are never cut below this many characters plus the filler.
    pub min_length: usize,
    /// Extra columns to keep free (negative allows overflow).
    pub margin: isize,
}

impl Default for FitOptions<'_> {
    fn default() -> Self {
        Self {
            filler: STATUS_FILLER,
            min_length: STATUS_MIN_LENGTH,
            margin: 0,
        }
    }
}

/// Columns always kept free on top of the margin.
const RESERVED_COLUMNS: isize = 6;

#[allow(clippy::cast_possible_wrap)]
fn len_isize(s: &str) -> isize {
    s.chars().count() as isize
}

fn cut_value(value: &str, keep: usize, filler: &str, cut: Cut) -> String {
    let chars: Vec<char> = value.chars().collect();
    let keep = keep.min(chars.len());
    match cut {
        Cut::Front => {
            let tail: String = chars[chars.len() - keep..].iter().collect();
            format!("{filler}{tail}")
        }
        Cut::Back => {
            let head: String = chars[..keep].iter().collect();
            format!("{head}{filler}")
        }
    }
}

/// Formats `sections` into a single line no wider than `width` where possible.
///
/// A `width` of 0 means the terminal size is unknown; values are then
/// substituted verbatim. Sections are concatenated in the given order, not in
/// priority order.
#[must_use]
#[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
pub fn fit_sections(sections: &[Section], width: usize, options: FitOptions<'_>) -> String {
    let mut values: Vec<String> = sections.iter().map(|s| s.value.clone()).collect();

    if width > 0 {
        let filler_len = len_isize(options.filler);
        let min_length = filler_len + options.min_length as isize;

        // Stable sort keeps the given order among equal priorities.
        let mut order: Vec<usize> = (0..sections.len()).collect();
        order.sort_by_key(|&i| std::cmp::Reverse(sections[i].priority));

        // reserve[k]: space still needed by sections after position k.
        let mut reserve = vec![0isize; order.len()];
        let mut needed = 0isize;
        for (k, &i) in order.iter().enumerate().rev() {
            reserve[k] = needed;
            needed += len_isize(&sections[i].value).min(min_length);
        }

        let literal: isize = sections.iter().map(|s| len_isize(&s.text) - 2).sum();
        let mut free = width as isize - literal - options.margin - RESERVED_COLUMNS;

        for (k, &i) in order.iter().enumerate() {
            let section = &sections[i];
            let value_len = len_isize(&values[i]);
            let available = free - reserve[k];
            if available < value_len && value_len > min_length {
                let cut_length = available.max(min_length);
                let keep = (cut_length - filler_len) as usize;
                values[i] = cut_value(&values[i], keep, options.filler, section.cut);
            }
            free -= len_isize(&values[i]);
        }
    }

    sections
        .iter()
        .zip(&values)
        .map(|(section, value)| section.render(value))
        .collect()
}

/// Returns the current terminal width in columns, or 0 when unknown.
#[must_use]
pub fn terminal_width() -> usize {
    crossterm::terminal::size().map_or(0, |(columns, _)| usize::from(columns))
}
