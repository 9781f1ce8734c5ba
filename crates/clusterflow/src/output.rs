//! Console tables

use clusterflow_cloud::{CloudResource, ResourceRow};
use std::io::Write;

/// Writes rows as left-aligned columns separated by at least two spaces
pub fn write_table<W: Write, const N: usize>(
    out: &mut W,
    headers: [&str; N],
    rows: &[[&str; N]],
) -> std::io::Result<()> {
    let mut widths = headers.map(str::len);
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    write_row(out, &headers, &widths)?;
    for row in rows {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

fn write_row<W: Write>(out: &mut W, cells: &[&str], widths: &[usize]) -> std::io::Result<()> {
    let last = cells.len().saturating_sub(1);
    let mut line = String::new();
    for (i, (cell, width)) in cells.iter().zip(widths).enumerate() {
        if i == last {
            line.push_str(cell);
        } else {
            line.push_str(&format!("{:<width$}  ", cell, width = width));
        }
    }
    writeln!(out, "{}", line.trim_end())
}

/// `TYPE  ID  NAME` preview of resources about to be deleted
pub fn write_resources<W: Write>(out: &mut W, resources: &[CloudResource]) -> std::io::Result<()> {
    let rows: Vec<ResourceRow<'_>> = resources.iter().map(CloudResource::row).collect();
    let cells: Vec<[&str; 3]> = rows.iter().map(|r| r.columns()).collect();
    write_table(out, ResourceRow::HEADERS, &cells)
}
