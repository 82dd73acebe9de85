//! Tabular presentation of an [`ExtractionResult`].
//!
//! Columns are the union of every record's keys in first-seen order, so a
//! field that only some records carry still gets a column; missing cells are
//! left empty.

use crate::error::ExtractError;
use crate::output::ExtractionResult;
use serde_json::Value;

/// Widest a rendered column may get before cells are truncated.
pub const DEFAULT_MAX_COLUMN_WIDTH: usize = 40;

/// Rows and columns laid out from a result set.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLayout {
    pub columns: Vec<String>,
    /// One entry per record; `None` where the record lacks the column.
    pub rows: Vec<Vec<Option<Value>>>,
}

impl TableLayout {
    /// Lay out `result`. Fails with [`ExtractError::NoRecords`] on an empty
    /// result, since there is nothing to derive columns from.
    pub fn from_result(result: &ExtractionResult) -> Result<Self, ExtractError> {
        let records = result.require_rows()?;
        let columns = result.columns();
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|col| record.get(col).cloned())
                    .collect()
            })
            .collect();
        Ok(Self { columns, rows })
    }

    /// Render as an aligned, pipe-delimited text table.
    ///
    /// ```text
    /// | name | qty |
    /// |------|-----|
    /// | A    | 1   |
    /// ```
    pub fn render_text(&self, max_width: usize) -> String {
        let max_width = max_width.max(3);
        let header: Vec<String> = self
            .columns
            .iter()
            .map(|c| truncate(c, max_width))
            .collect();
        let body: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| truncate(&cell_text(cell.as_ref()), max_width))
                    .collect()
            })
            .collect();

        let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
        for row in &body {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        push_line(&mut out, &header, &widths);
        out.push('|');
        for w in &widths {
            out.push_str(&"-".repeat(w + 2));
            out.push('|');
        }
        out.push('\n');
        for row in &body {
            push_line(&mut out, row, &widths);
        }
        out
    }
}

/// Render `result` with the default column width.
pub fn render_table(result: &ExtractionResult) -> Result<String, ExtractError> {
    Ok(TableLayout::from_result(result)?.render_text(DEFAULT_MAX_COLUMN_WIDTH))
}

/// Display text for one cell: strings unquoted, null and missing empty,
/// everything else as compact JSON.
pub fn cell_text(cell: Option<&Value>) -> String {
    match cell {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn push_line(out: &mut String, cells: &[String], widths: &[usize]) {
    out.push('|');
    for (cell, w) in cells.iter().zip(widths) {
        let pad = w - cell.chars().count();
        out.push(' ');
        out.push_str(cell);
        out.push_str(&" ".repeat(pad + 1));
        out.push('|');
    }
    out.push('\n');
}

/// Collapse newlines and cut to `max` characters, marking the cut with `…`.
fn truncate(s: &str, max: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let mut cut: String = flat.chars().take(max - 1).collect();
        cut.push('\u{2026}');
        cut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::parse_records;
    use serde_json::json;

    #[test]
    fn layout_fills_missing_cells() {
        let result = parse_records(r#"[{"Style": "A1", "Qty": 10}, {"Qty": 5, "Colour": "navy"}]"#).unwrap();
        let layout = TableLayout::from_result(&result).unwrap();
        assert_eq!(layout.columns, vec!["style", "qty", "colour"]);
        assert_eq!(
            layout.rows,
            vec![
                vec![Some(json!("A1")), Some(json!(10)), None],
                vec![None, Some(json!(5)), Some(json!("navy"))],
            ]
        );
    }

    #[test]
    fn empty_result_has_no_layout() {
        let result = parse_records("[]").unwrap();
        assert!(matches!(
            TableLayout::from_result(&result),
            Err(ExtractError::NoRecords)
        ));
        assert!(render_table(&result).is_err());
    }

    #[test]
    fn render_aligns_columns() {
        let result = parse_records(r#"[{"Name": "A", "Qty": 1}, {"Name": "Bolt", "Qty": null}]"#).unwrap();
        let text = render_table(&result).unwrap();
        assert_eq!(
            text,
            "| name | qty |\n\
             |------|-----|\n\
             | A    | 1   |\n\
             | Bolt |     |\n"
        );
    }

    #[test]
    fn cell_text_formats_values() {
        assert_eq!(cell_text(None), "");
        assert_eq!(cell_text(Some(&Value::Null)), "");
        assert_eq!(cell_text(Some(&json!("x"))), "x");
        assert_eq!(cell_text(Some(&json!(true))), "true");
        assert_eq!(cell_text(Some(&json!(2.5))), "2.5");
        assert_eq!(cell_text(Some(&json!(["S", "M"]))), r#"["S","M"]"#);
    }

    #[test]
    fn long_cells_are_truncated() {
        assert_eq!(truncate("abcdefgh", 5), "abcd…");
        assert_eq!(truncate("line1\nline2", 20), "line1 line2");
        assert_eq!(truncate("åäö", 3), "åäö");
    }
}
