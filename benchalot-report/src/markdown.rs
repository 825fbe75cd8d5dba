//! Markdown Table Renderer

use crate::format_number;
use benchalot_stats::StatTable;

/// Render a stat table as a GitHub-flavored Markdown pipe table.
///
/// Columns are padded to a common width so the source stays readable; empty
/// cells mark groups without data.
pub fn render_markdown(table: &StatTable) -> String {
    let headers = table.headers();
    let mut cells: Vec<Vec<String>> = vec![headers.iter().map(|h| h.to_string()).collect()];
    for row in &table.rows {
        let mut line: Vec<String> = row.key.clone();
        line.extend(row.values.iter().map(|v| match v {
            Some(value) => format_number(*value),
            None => String::new(),
        }));
        cells.push(line);
    }

    let widths: Vec<usize> = (0..headers.len())
        .map(|col| {
            cells
                .iter()
                .map(|row| row[col].chars().count())
                .max()
                .unwrap_or(0)
                .max(3)
        })
        .collect();

    let mut out = String::new();
    render_row(&mut out, &cells[0], &widths);
    out.push('|');
    for width in &widths {
        out.push_str(&format!("{}|", "-".repeat(width + 2)));
    }
    out.push('\n');
    for row in &cells[1..] {
        render_row(&mut out, row, &widths);
    }
    out
}

fn render_row(out: &mut String, row: &[String], widths: &[usize]) {
    out.push('|');
    for (cell, width) in row.iter().zip(widths) {
        out.push_str(&format!(" {:<w$} |", cell, w = width));
    }
    out.push('\n');
}
