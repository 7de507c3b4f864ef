//! Plain-text rendering of table views for terminal frontends.

use std::fmt::Write as _;

use corral_core::columns::{columns_for, ColumnSpec};
use corral_core::Entity;

use crate::table::{TableRow, TableView};

const ID_WIDTH: usize = 12;

fn fit(s: &str, width: usize) -> String {
    let n = s.chars().count();
    if n <= width {
        format!("{:<width$}", s, width = width)
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

fn header(cols: &[ColumnSpec]) -> String {
    let mut line = fit("ID", ID_WIDTH);
    for c in cols {
        line.push_str("  ");
        line.push_str(&fit(c.label, c.width));
    }
    line.trim_end().to_string()
}

fn row_line<E: Entity>(row: &TableRow<E>, cols: &[ColumnSpec]) -> String {
    let mut line = fit(row.entity.id(), ID_WIDTH);
    for (c, cell) in cols.iter().zip(row.cells.iter()) {
        line.push_str("  ");
        line.push_str(&fit(cell, c.width));
    }
    line.trim_end().to_string()
}

/// Render `view` as an aligned table followed by a pagination footer.
pub fn render_view<E: Entity>(view: &TableView<E>) -> String {
    let cols = columns_for(E::KIND);
    let mut out = String::new();
    match view {
        TableView::Skeleton { rows } => {
            let _ = writeln!(out, "{}", header(&cols));
            for _ in 0..*rows {
                let blank: Vec<String> = std::iter::once(fit("░░░░", ID_WIDTH)).chain(cols.iter().map(|c| fit("░░░░", c.width))).collect();
                let _ = writeln!(out, "{}", blank.join("  ").trim_end());
            }
        }
        TableView::Failed(e) => {
            let _ = writeln!(out, "Could not load {}: {}", E::KIND, e);
        }
        TableView::Rows { rows, placeholder, pagination, error } => {
            let _ = writeln!(out, "{}", header(&cols));
            if rows.is_empty() {
                let _ = writeln!(out, "(no {})", E::KIND);
            }
            for row in rows {
                let _ = writeln!(out, "{}", row_line(row, &cols));
            }
            let _ = write!(out, "page {}/{} · {} total", pagination.page, pagination.page_count, pagination.total_count);
            if *placeholder {
                out.push_str(" · loading");
            }
            out.push('\n');
            if let Some(e) = error {
                let _ = writeln!(out, "! {}", e);
            }
        }
    }
    out
}
