// src/sheet/xlsx.rs
//
// Just enough Office Open XML to read the first worksheet's cell values and to
// write a single-sheet workbook of inline strings.

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::{
    collections::{BTreeMap, HashMap},
    fs::File,
    io::{BufReader, Read, Seek, Write},
    path::Path,
};
use tracing::debug;
use zip::{write::SimpleFileOptions, ZipArchive, ZipWriter};

use super::{unnamed_column, CellValue, SheetError, SheetResult, Table};

pub(super) fn read_first_sheet(path: &Path) -> SheetResult<Table> {
    let file = File::open(path)?;
    read_first_sheet_from(file)
}

fn read_first_sheet_from<R: Read + Seek>(reader: R) -> SheetResult<Table> {
    let mut archive = ZipArchive::new(reader)?;

    if archive.by_name("[Content_Types].xml").is_err() {
        return Err(SheetError::InvalidFormat(
            "Missing [Content_Types].xml".into(),
        ));
    }

    let shared_strings = read_shared_strings(&mut archive)?;
    let first_rid = read_first_sheet_rid(&mut archive)?
        .ok_or_else(|| SheetError::InvalidFormat("workbook has no sheets".into()))?;
    let rels = read_workbook_rels(&mut archive)?;
    let sheet_path = rels
        .get(&first_rid)
        .cloned()
        .ok_or_else(|| SheetError::MissingPart(format!("worksheet for {}", first_rid)))?;
    debug!(sheet = %sheet_path, shared = shared_strings.len(), "reading worksheet");

    let rows = read_worksheet(&mut archive, &sheet_path, &shared_strings)?;
    Ok(rows_to_table(rows))
}

/// Text is kept untrimmed: rich-text runs carry meaningful edge whitespace.
fn xml_reader<R: std::io::BufRead>(inner: R) -> Reader<R> {
    Reader::from_reader(inner)
}

fn attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn read_shared_strings<R: Read + Seek>(archive: &mut ZipArchive<R>) -> SheetResult<Vec<String>> {
    let mut strings = Vec::new();
    let file = match archive.by_name("xl/sharedStrings.xml") {
        Ok(f) => f,
        Err(_) => return Ok(strings),
    };

    let mut xml = xml_reader(BufReader::new(file));
    let mut buf = Vec::new();
    let mut current = String::new();
    let (mut in_si, mut in_t) = (false, false);
    // phonetic hints (<rPh>) carry their own <t> runs that are not cell text
    let mut in_rph = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_si = true;
                    current.clear();
                }
                b"rPh" => in_rph = true,
                b"t" if in_si && !in_rph => in_t = true,
                _ => {}
            },
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_si = false;
                }
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::Text(e) if in_t => current.push_str(&e.unescape()?),
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(strings)
}

/// `r:id` of the first `<sheet>` in workbook.xml, which is the sheet a user sees first.
fn read_first_sheet_rid<R: Read + Seek>(archive: &mut ZipArchive<R>) -> SheetResult<Option<String>> {
    let file = archive
        .by_name("xl/workbook.xml")
        .map_err(|_| SheetError::MissingPart("xl/workbook.xml".into()))?;

    let mut xml = xml_reader(BufReader::new(file));
    let mut buf = Vec::new();
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"sheet" => {
                if let Some(rid) = attr(&e, b"r:id") {
                    return Ok(Some(rid));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
        buf.clear();
    }
}

fn read_workbook_rels<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
) -> SheetResult<HashMap<String, String>> {
    let file = archive
        .by_name("xl/_rels/workbook.xml.rels")
        .map_err(|_| SheetError::MissingPart("xl/_rels/workbook.xml.rels".into()))?;

    let mut xml = xml_reader(BufReader::new(file));
    let mut buf = Vec::new();
    let mut rels = HashMap::new();
    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Empty(e) | Event::Start(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, b"Id"), attr(&e, b"Target")) {
                    // Targets are relative to xl/ unless absolute
                    let full = match target.strip_prefix('/') {
                        Some(abs) => abs.to_string(),
                        None => format!("xl/{}", target),
                    };
                    rels.insert(id, full);
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(rels)
}

/// Zero-based column index of an A1-style reference ("AB12" → 27).
fn column_index(cell_ref: &str) -> Option<usize> {
    let letters: String = cell_ref
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if letters.is_empty() {
        return None;
    }
    let n = letters
        .to_ascii_uppercase()
        .bytes()
        .try_fold(0usize, |acc, b| {
            acc.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)
        })?;
    Some(n - 1)
}

/// Inverse of [`column_index`].
fn column_letters(mut index: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn cell_value(cell_type: Option<&str>, raw: Option<&str>, shared: &[String]) -> SheetResult<CellValue> {
    let Some(raw) = raw else {
        return Ok(CellValue::Empty);
    };
    Ok(match cell_type {
        Some("s") => {
            let idx: usize = raw
                .trim()
                .parse()
                .map_err(|_| SheetError::InvalidFormat(format!("bad shared string index {:?}", raw)))?;
            let s = shared.get(idx).ok_or_else(|| {
                SheetError::InvalidFormat(format!("shared string index {} out of bounds", idx))
            })?;
            CellValue::Text(s.clone())
        }
        Some("b") => CellValue::Bool(raw == "1" || raw.eq_ignore_ascii_case("true")),
        // #N/A, #REF! and friends carry no usable value
        Some("e") => CellValue::Empty,
        Some("str") | Some("inlineStr") => CellValue::Text(raw.to_string()),
        None | Some("n") => match raw.trim().parse::<f64>() {
            Ok(n) => CellValue::Number(n),
            Err(_) => CellValue::Text(raw.to_string()),
        },
        Some(_) => CellValue::Text(raw.to_string()),
    })
}

type SheetRows = BTreeMap<usize, BTreeMap<usize, CellValue>>;

fn read_worksheet<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    path: &str,
    shared: &[String],
) -> SheetResult<SheetRows> {
    let file = archive
        .by_name(path)
        .map_err(|_| SheetError::MissingPart(path.to_string()))?;

    let mut xml = xml_reader(BufReader::new(file));
    let mut buf = Vec::new();
    let mut rows: SheetRows = BTreeMap::new();

    let mut row_idx = 0usize;
    let mut next_col = 0usize;
    let mut cell_col = 0usize;
    let mut cell_type: Option<String> = None;
    let mut cell_raw: Option<String> = None;
    let (mut in_v, mut in_t, mut in_rph) = (false, false, false);

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    row_idx = attr(&e, b"r")
                        .and_then(|r| r.parse::<usize>().ok())
                        .map(|r| r.saturating_sub(1))
                        .unwrap_or_else(|| rows.keys().next_back().map_or(0, |last| last + 1));
                    rows.entry(row_idx).or_default();
                    next_col = 0;
                }
                b"c" => {
                    cell_col = attr(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_col);
                    cell_type = attr(&e, b"t");
                    cell_raw = None;
                }
                b"v" => in_v = true,
                b"rPh" => in_rph = true,
                b"t" if !in_rph => in_t = true,
                _ => {}
            },
            Event::Text(e) if in_v || in_t => {
                cell_raw
                    .get_or_insert_with(String::new)
                    .push_str(&e.unescape()?);
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_v = false,
                b"rPh" => in_rph = false,
                b"t" => in_t = false,
                b"c" => {
                    let value = cell_value(cell_type.as_deref(), cell_raw.as_deref(), shared)?;
                    rows.entry(row_idx).or_default().insert(cell_col, value);
                    next_col = cell_col + 1;
                }
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                // value-less cell, e.g. style only
                b"c" => {
                    next_col = attr(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(next_col)
                        + 1;
                }
                b"row" => {
                    next_col = 0;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(rows)
}

/// First row holds the header; the remaining rows become data rows.
fn rows_to_table(rows: SheetRows) -> Table {
    let mut iter = rows.into_values().filter(|cells| !cells.is_empty());
    let Some(header_cells) = iter.next() else {
        return Table::default();
    };

    let width = header_cells.keys().next_back().map_or(0, |last| last + 1);
    let columns = (0..width)
        .map(|i| match header_cells.get(&i) {
            Some(v) if !v.is_empty() => v.to_string().trim().to_string(),
            _ => unnamed_column(i),
        })
        .collect::<Vec<_>>();

    let grid = iter
        .map(|cells| {
            let mut row = vec![CellValue::Empty; width];
            for (col, value) in cells {
                if col < width {
                    row[col] = value;
                }
            }
            row
        })
        .collect();

    Table::from_grid(columns, grid)
}

pub(super) fn write_sheet<const N: usize>(
    path: &Path,
    header: &[&str; N],
    rows: &[[String; N]],
) -> SheetResult<()> {
    let file = File::create(path)?;
    write_sheet_to(file, header, rows)
}

fn write_sheet_to<W: Write + Seek, const N: usize>(
    writer: W,
    header: &[&str; N],
    rows: &[[String; N]],
) -> SheetResult<()> {
    let mut zip = ZipWriter::new(writer);
    let options = SimpleFileOptions::default();

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
    <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
    <Default Extension="xml" ContentType="application/xml"/>
    <Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>
    <Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>
</Types>"#,
    )?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>
</Relationships>"#,
    )?;

    zip.start_file("xl/workbook.xml", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
    <sheets>
        <sheet name="Sheet1" sheetId="1" r:id="rId1"/>
    </sheets>
</workbook>"#,
    )?;

    zip.start_file("xl/_rels/workbook.xml.rels", options)?;
    zip.write_all(
        br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
    <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
</Relationships>"#,
    )?;

    let mut content = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <sheetData>"#,
    );
    let header_row = header.iter().map(|h| h.to_string()).collect::<Vec<_>>();
    for (r, cells) in std::iter::once(header_row.as_slice())
        .chain(rows.iter().map(|row| row.as_slice()))
        .enumerate()
    {
        content.push_str(&format!("\n        <row r=\"{}\">", r + 1));
        for (c, text) in cells.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            content.push_str(&format!(
                "<c r=\"{}{}\" t=\"inlineStr\"><is><t xml:space=\"preserve\">{}</t></is></c>",
                column_letters(c),
                r + 1,
                escape(text.as_str())
            ));
        }
        content.push_str("</row>");
    }
    content.push_str("\n    </sheetData>\n</worksheet>");

    zip.start_file("xl/worksheets/sheet1.xml", options)?;
    zip.write_all(content.as_bytes())?;

    zip.finish()?;
    Ok(())
}
