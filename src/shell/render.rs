// Text rendering helpers: aligned tables, size units, sector hex dumps.
use crate::shell::args::rounding_divide;

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    if headers.is_empty() {
        return String::new();
    }
    let column_count = headers.len();
    let mut sanitized_rows = Vec::with_capacity(rows.len());
    let mut widths = headers
        .iter()
        .map(|header| header.chars().count())
        .collect::<Vec<_>>();

    for row in rows {
        let mut sanitized = Vec::with_capacity(column_count);
        for (idx, width) in widths.iter_mut().enumerate() {
            let value = row.get(idx).map(String::as_str).unwrap_or("");
            let cleaned = sanitize_table_cell(value);
            *width = (*width).max(cleaned.chars().count());
            sanitized.push(cleaned);
        }
        sanitized_rows.push(sanitized);
    }

    let rule = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>();
    let mut lines = Vec::with_capacity(sanitized_rows.len() + 2);
    lines.push(format_table_line(
        &headers
            .iter()
            .map(|header| header.to_string())
            .collect::<Vec<_>>(),
        &widths,
    ));
    lines.push(format_table_line(&rule, &widths));
    for row in sanitized_rows {
        lines.push(format_table_line(&row, &widths));
    }
    lines.join("\n")
}

fn sanitize_table_cell(value: &str) -> String {
    value.replace('\n', "\\n").replace('\r', "\\r")
}

fn format_table_line(cells: &[String], widths: &[usize]) -> String {
    let mut line = String::new();
    for (idx, width) in widths.iter().enumerate() {
        if idx > 0 {
            line.push_str("  ");
        }
        let cell = cells.get(idx).map(String::as_str).unwrap_or("");
        line.push_str(cell);
        let cell_len = cell.chars().count();
        if *width > cell_len {
            line.push_str(&" ".repeat(*width - cell_len));
        }
    }
    line.trim_end().to_string()
}

/// Partition and volume sizes: GB from 10 GiB, MB from 10 MiB, KB below.
pub fn format_size(bytes: u64) -> String {
    if bytes >= 10 * GIB {
        format!("{} GB", rounding_divide(bytes, GIB))
    } else if bytes >= 10 * MIB {
        format!("{} MB", rounding_divide(bytes, MIB))
    } else {
        format!("{} KB", rounding_divide(bytes, KIB))
    }
}

/// Disk sizes: GB from 10 GiB, otherwise MB (never below 1 MB for a non-empty disk).
pub fn format_disk_size(bytes: u64) -> String {
    if bytes >= 10 * GIB {
        format!("{} GB", rounding_divide(bytes, GIB))
    } else {
        let mb = rounding_divide(bytes, MIB);
        let mb = if mb == 0 && bytes > 0 { 1 } else { mb };
        format!("{mb} MB")
    }
}

/// Sixteen bytes per line: offset, hex bytes, printable ASCII.
pub fn hex_dump(bytes: &[u8]) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(index, chunk)| {
            let mut line = format!(" {:04x} ", index * 16);
            for byte in chunk {
                line.push_str(&format!(" {byte:02x}"));
            }
            for _ in chunk.len()..16 {
                line.push_str("   ");
            }
            line.push_str("  ");
            line.extend(chunk.iter().map(|byte| {
                if byte.is_ascii_graphic() || *byte == b' ' {
                    char::from(*byte)
                } else {
                    '.'
                }
            }));
            line
        })
        .collect()
}
