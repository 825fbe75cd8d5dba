//! HTML Table Renderer

use crate::format_number;
use benchalot_stats::StatTable;

/// Render a stat table as a standalone HTML `<table>` element.
pub fn render_html(table: &StatTable) -> String {
    let mut out = String::new();
    out.push_str("<table border=\"1\">\n  <thead>\n    <tr>\n");
    for header in table.headers() {
        out.push_str(&format!("      <th>{}</th>\n", escape(header)));
    }
    out.push_str("    </tr>\n  </thead>\n  <tbody>\n");
    for row in &table.rows {
        out.push_str("    <tr>\n");
        for key in &row.key {
            out.push_str(&format!("      <td>{}</td>\n", escape(key)));
        }
        for value in &row.values {
            let text = value.map(format_number).unwrap_or_default();
            out.push_str(&format!("      <td>{}</td>\n", text));
        }
        out.push_str("    </tr>\n");
    }
    out.push_str("  </tbody>\n</table>\n");
    out
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
