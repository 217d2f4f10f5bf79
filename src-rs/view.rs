use crate::glyphs::GlyphRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    NoSelection,
    RowSelected(usize),
}

/// In-process model of the table page: search filter plus single-row
/// selection, with the same transitions the page script applies.
#[derive(Debug, Clone)]
pub struct TableView {
    rows: Vec<GlyphRow>,
    haystacks: Vec<String>,
    visible: Vec<bool>,
    selection: Selection,
}

impl TableView {
    pub fn new(rows: Vec<GlyphRow>) -> Self {
        let haystacks = rows
            .iter()
            .map(|row| row.visible_text().to_lowercase())
            .collect();
        let visible = vec![true; rows.len()];
        Self {
            rows,
            haystacks,
            visible,
            selection: Selection::NoSelection,
        }
    }

    pub fn total(&self) -> usize {
        self.rows.len()
    }

    pub fn visible_count(&self) -> usize {
        self.visible.iter().filter(|v| **v).count()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = (usize, &GlyphRow)> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(idx, _)| self.visible[*idx])
    }

    /// Applies a search query and returns the number of rows left visible.
    pub fn filter(&mut self, query: &str) -> usize {
        let needle = query.trim().to_lowercase();
        for (flag, haystack) in self.visible.iter_mut().zip(&self.haystacks) {
            *flag = needle.is_empty() || haystack.contains(&needle);
        }
        if let Selection::RowSelected(idx) = self.selection {
            if !self.visible[idx] {
                self.selection = Selection::NoSelection;
            }
        }
        self.visible_count()
    }

    /// Click on a row. Hidden or unknown rows are ignored.
    pub fn toggle(&mut self, idx: usize) -> Selection {
        if !self.visible.get(idx).copied().unwrap_or(false) {
            return self.selection;
        }
        self.selection = match self.selection {
            Selection::RowSelected(current) if current == idx => Selection::NoSelection,
            _ => Selection::RowSelected(idx),
        };
        self.selection
    }

    /// Selects the first visible row with this glyph name.
    pub fn select_name(&mut self, name: &str) -> Option<usize> {
        let idx = self
            .visible_rows()
            .find(|(_, row)| row.name == name)
            .map(|(idx, _)| idx)?;
        if self.selection != Selection::RowSelected(idx) {
            self.toggle(idx);
        }
        Some(idx)
    }

    pub fn copy_enabled(&self) -> bool {
        matches!(self.selection, Selection::RowSelected(_))
    }

    /// Codepoint and name of the selected row.
    pub fn copy_selected(&self) -> Option<String> {
        let row = self.selected_row()?;
        Some(join_non_empty(&[&row.codepoint_display(), &row.name]))
    }

    /// Codepoint, entity and name of the selected row.
    pub fn copy_row(&self) -> Option<String> {
        let row = self.selected_row()?;
        let entity = row.decoded().entity;
        Some(join_non_empty(&[&row.codepoint_display(), &entity, &row.name]))
    }

    pub fn counter(&self) -> String {
        format!("Showing: {} / {}", self.visible_count(), self.total())
    }

    fn selected_row(&self) -> Option<&GlyphRow> {
        match self.selection {
            Selection::RowSelected(idx) => self.rows.get(idx),
            Selection::NoSelection => None,
        }
    }
}

fn join_non_empty(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyphs::normalize_rows;
    use serde_json::json;

    fn sample_view() -> TableView {
        TableView::new(normalize_rows(&json!({
            "noteheadBlack": {"codepoint": "U+E0A4", "description": "Black notehead"},
            "noteheadWhole": {"codepoint": "U+E0A2", "description": "Whole note"},
            "gClef": {"codepoint": "U+E050", "description": "G clef"},
            "plain": {}
        })))
    }

    #[test]
    fn starts_unfiltered_without_selection() {
        let view = sample_view();
        assert_eq!(view.counter(), "Showing: 4 / 4");
        assert_eq!(view.selection(), Selection::NoSelection);
        assert!(!view.copy_enabled());
        assert_eq!(view.copy_selected(), None);
    }

    #[test]
    fn filter_is_case_insensitive_substring_over_all_cells() {
        let mut view = sample_view();
        assert_eq!(view.filter("NOTEHEAD"), 2);
        assert_eq!(view.filter("u+e050"), 1);
        assert_eq!(view.filter("&#xe0a2;"), 1);
        assert_eq!(view.filter("clef"), 1);
        assert_eq!(view.counter(), "Showing: 1 / 4");
    }

    #[test]
    fn zero_matches_hide_everything_and_clearing_restores() {
        let mut view = sample_view();
        assert_eq!(view.filter("no such glyph"), 0);
        assert_eq!(view.visible_rows().count(), 0);
        assert_eq!(view.filter("   "), 4);
        assert_eq!(view.visible_rows().count(), 4);
    }

    #[test]
    fn toggle_enforces_single_selection() {
        let mut view = sample_view();
        assert_eq!(view.toggle(0), Selection::RowSelected(0));
        assert_eq!(view.toggle(2), Selection::RowSelected(2));
        assert_eq!(view.toggle(2), Selection::NoSelection);
        assert!(!view.copy_enabled());
        assert_eq!(view.toggle(99), Selection::NoSelection);
    }

    #[test]
    fn filtering_out_selected_row_clears_selection() {
        let mut view = sample_view();
        view.toggle(2);
        assert!(view.copy_enabled());
        view.filter("clef");
        assert_eq!(view.selection(), Selection::RowSelected(2));
        view.filter("notehead");
        assert_eq!(view.selection(), Selection::NoSelection);
        assert!(!view.copy_enabled());
        assert_eq!(view.copy_row(), None);
    }

    #[test]
    fn hidden_rows_cannot_be_selected() {
        let mut view = sample_view();
        view.filter("clef");
        assert_eq!(view.toggle(0), Selection::NoSelection);
        assert_eq!(view.select_name("noteheadBlack"), None);
        assert_eq!(view.select_name("gClef"), Some(2));
    }

    #[test]
    fn copy_payloads_join_non_empty_parts() {
        let mut view = sample_view();
        view.select_name("noteheadBlack");
        assert_eq!(view.copy_selected().as_deref(), Some("U+E0A4 noteheadBlack"));
        assert_eq!(
            view.copy_row().as_deref(),
            Some("U+E0A4 &#xE0A4; noteheadBlack")
        );

        view.select_name("plain");
        assert_eq!(view.copy_selected().as_deref(), Some("plain"));
        assert_eq!(view.copy_row().as_deref(), Some("plain"));
    }

    #[test]
    fn select_name_keeps_existing_selection() {
        let mut view = sample_view();
        view.select_name("gClef");
        view.select_name("gClef");
        assert_eq!(view.selection(), Selection::RowSelected(2));
    }
}
