use csv::{ReaderBuilder, WriterBuilder};
use std::path::Path;

use super::{unnamed_column, CellValue, SheetResult, Table};

/// CSV cells are all text; empty fields become `CellValue::Empty`.
pub(super) fn read(path: &Path) -> SheetResult<Table> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let columns = rdr
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim_start_matches('\u{feff}');
            if h.trim().is_empty() {
                unnamed_column(i)
            } else {
                h.to_string()
            }
        })
        .collect::<Vec<_>>();

    let mut grid = Vec::new();
    for record in rdr.records() {
        let record = record?;
        grid.push(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        CellValue::Empty
                    } else {
                        CellValue::Text(field.to_string())
                    }
                })
                .collect::<Vec<_>>(),
        );
    }

    Ok(Table::from_grid(columns, grid))
}

pub(super) fn write<const N: usize>(
    path: &Path,
    header: &[&str; N],
    rows: &[[String; N]],
) -> SheetResult<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(header)?;
    for row in rows {
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}
