// Output rendering: aligned tables for homogeneous streams, JSON lines
// otherwise.

use crate::value::Record;

/// Render a completed stream the way the interactive shell shows it:
/// a table when every record has the same non-empty ordered key list,
/// JSON lines otherwise. An empty stream renders as the empty string.
pub fn pretty(records: &[Record]) -> String {
    let Some(first) = records.first() else {
        return String::new();
    };
    let keys: Vec<&str> = first.keys().collect();
    let homogeneous = !keys.is_empty()
        && records
            .iter()
            .all(|record| record.keys().eq(keys.iter().copied()));
    if homogeneous {
        table(records, &keys)
    } else {
        json_lines(records)
    }
}

/// One JSON-encoded record per line, insertion order preserved.
pub fn json_lines(records: &[Record]) -> String {
    records
        .iter()
        .map(|record| record.to_json().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

fn table(records: &[Record], keys: &[&str]) -> String {
    let headers: Vec<String> = keys.iter().map(|k| k.to_uppercase()).collect();
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            keys.iter()
                .map(|k| record.get(k).map(|v| v.render()).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, header)| {
            rows.iter()
                .map(|row| row[i].len())
                .max()
                .unwrap_or(0)
                .max(header.len())
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 2);
    lines.push(format_row(&headers, &widths));
    lines.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    for row in &rows {
        lines.push(format_row(row, &widths));
    }
    lines.join("\n")
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}
