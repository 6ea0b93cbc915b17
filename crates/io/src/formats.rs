// XLSX number-format recovery.
//
// calamine hands back cell values without their display formats, so a
// tax id stored as the number 12345678000195 under the custom format
// 00\.000\.000\/0000\-00 would lose its punctuation. This module reads
// xl/styles.xml and the first worksheet's XML straight from the ZIP to
// find which cells carry a custom numFmt, and reconstructs the displayed
// text for identifier-like formats.

use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

/// Custom format codes keyed by absolute (row, col), 0-based.
pub type SheetFormats = HashMap<(usize, usize), String>;

/// First numFmtId available to custom formats.
const FIRST_CUSTOM_NUM_FMT: u16 = 164;

/// Unescape the 5 predefined XML entities: &amp; &lt; &gt; &quot; &apos;
fn unescape_xml(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    s.replace("&quot;", "\"")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&apos;", "'")
}

// =============================================================================
// styles.xml
// =============================================================================

/// Parse styles.xml into a table indexed by cellXfs position. Each entry is
/// the custom format code applied by that xf, if any.
pub fn parse_styles_xml(xml: &str) -> Vec<Option<String>> {
    let custom = parse_num_fmts(xml);
    parse_cell_xf_formats(xml)
        .into_iter()
        .map(|id| {
            id.filter(|id| *id >= FIRST_CUSTOM_NUM_FMT)
                .and_then(|id| custom.get(&id).cloned())
        })
        .collect()
}

/// Parse <numFmts> section → HashMap<formatId, formatCode>
fn parse_num_fmts(xml: &str) -> HashMap<u16, String> {
    let mut map = HashMap::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_num_fmts = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"numFmts" => {
                in_num_fmts = true;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"numFmts" => {
                break;
            }
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_num_fmts && e.name().as_ref() == b"numFmt" =>
            {
                let mut id: Option<u16> = None;
                let mut code: Option<String> = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"numFmtId" => {
                            id = std::str::from_utf8(&attr.value)
                                .ok()
                                .and_then(|s| s.parse().ok());
                        }
                        b"formatCode" => {
                            let raw = String::from_utf8_lossy(&attr.value).to_string();
                            code = Some(unescape_xml(&raw));
                        }
                        _ => {}
                    }
                }
                if let (Some(id), Some(code)) = (id, code) {
                    map.insert(id, code);
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    map
}

/// numFmtId of each <xf> inside <cellXfs>, in order.
fn parse_cell_xf_formats(xml: &str) -> Vec<Option<u16>> {
    let mut ids = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_cell_xfs = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"cellXfs" => {
                in_cell_xfs = true;
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"cellXfs" => {
                break;
            }
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if in_cell_xfs && e.name().as_ref() == b"xf" =>
            {
                let id = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.as_ref() == b"numFmtId")
                    .and_then(|a| std::str::from_utf8(&a.value).ok()?.parse().ok());
                ids.push(id);
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    ids
}

// =============================================================================
// Worksheet XML
// =============================================================================

/// (row, col, style id) for every cell with a non-default style.
pub fn parse_sheet_cell_styles(xml: &str) -> Vec<(usize, usize, usize)> {
    let mut cell_styles = Vec::new();
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) | Ok(Event::Empty(ref e)) if e.name().as_ref() == b"c" => {
                let mut style_id: Option<usize> = None;
                let mut cell_ref: Option<String> = None;

                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"s" => {
                            style_id = std::str::from_utf8(&attr.value)
                                .ok()
                                .and_then(|s| s.parse().ok());
                        }
                        b"r" => {
                            cell_ref = Some(String::from_utf8_lossy(&attr.value).to_string());
                        }
                        _ => {}
                    }
                }

                if let (Some(style_id), Some(cell_ref)) = (style_id, cell_ref) {
                    if style_id > 0 {
                        if let Some((row, col)) = parse_cell_ref(&cell_ref) {
                            cell_styles.push((row, col, style_id));
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    cell_styles
}

/// Parse a cell reference like "B5" into (row, col) = (4, 1).
fn parse_cell_ref(r: &str) -> Option<(usize, usize)> {
    let mut col_part = String::new();
    let mut row_part = String::new();

    for ch in r.chars() {
        if ch.is_ascii_alphabetic() {
            col_part.push(ch);
        } else if ch.is_ascii_digit() {
            row_part.push(ch);
        }
    }

    if col_part.is_empty() || row_part.is_empty() {
        return None;
    }

    let mut col: usize = 0;
    for ch in col_part.chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }
    let col = col.saturating_sub(1);
    let row: usize = row_part.parse().ok()?;

    Some((row.saturating_sub(1), col))
}

// =============================================================================
// Entry point
// =============================================================================

/// Custom number formats of the named sheet in an XLSX file.
pub fn read_sheet_formats(path: &Path, sheet_name: &str) -> Result<SheetFormats, String> {
    let file = std::fs::File::open(path)
        .map_err(|e| format!("Failed to open XLSX file for styles: {}", e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| format!("Failed to read XLSX as ZIP for styles: {}", e))?;

    let xf_formats = match read_zip_file(&mut archive, "xl/styles.xml") {
        Ok(xml) => parse_styles_xml(&xml),
        Err(_) => return Ok(SheetFormats::new()),
    };
    if xf_formats.iter().all(Option::is_none) {
        return Ok(SheetFormats::new());
    }

    let workbook_xml = read_zip_file(&mut archive, "xl/workbook.xml")?;
    let rels_xml = read_zip_file(&mut archive, "xl/_rels/workbook.xml.rels")?;
    let sheet_path = resolve_worksheet_path(&workbook_xml, &rels_xml, sheet_name)
        .ok_or_else(|| format!("Worksheet '{}' not found in workbook.xml", sheet_name))?;
    let sheet_xml = read_zip_file(&mut archive, &sheet_path)?;

    let formats = parse_sheet_cell_styles(&sheet_xml)
        .into_iter()
        .filter_map(|(row, col, style)| {
            let code = xf_formats.get(style)?.as_ref()?;
            Some(((row, col), code.clone()))
        })
        .collect();
    Ok(formats)
}

/// Read a file from a ZIP archive.
fn read_zip_file<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<String, String> {
    let mut file = archive
        .by_name(path)
        .map_err(|e| format!("File '{}' not found in XLSX: {}", path, e))?;
    let mut content = String::new();
    file.read_to_string(&mut content)
        .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
    Ok(content)
}

/// Resolve the worksheet XML path for a sheet name via workbook.xml and its rels.
fn resolve_worksheet_path(workbook_xml: &str, rels_xml: &str, sheet_name: &str) -> Option<String> {
    let rid = find_sheet_rid(workbook_xml, sheet_name)?;

    let mut reader = Reader::from_str(rels_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e))
                if e.name().as_ref() == b"Relationship" =>
            {
                let mut id = None;
                let mut target = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"Id" => id = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        b"Target" => {
                            target = Some(String::from_utf8_lossy(&attr.value).to_string());
                        }
                        _ => {}
                    }
                }
                if id.as_deref() == Some(rid.as_str()) {
                    return target.map(|t| match t.strip_prefix('/') {
                        Some(absolute) => absolute.to_string(),
                        None => format!("xl/{}", t),
                    });
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

fn find_sheet_rid(workbook_xml: &str, sheet_name: &str) -> Option<String> {
    let mut reader = Reader::from_str(workbook_xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Empty(ref e)) | Ok(Event::Start(ref e)) if e.name().as_ref() == b"sheet" => {
                let mut name = None;
                let mut rid = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"name" => {
                            name = Some(unescape_xml(&String::from_utf8_lossy(&attr.value)));
                        }
                        b"r:id" => rid = Some(String::from_utf8_lossy(&attr.value).to_string()),
                        _ => {}
                    }
                }
                if name.as_deref() == Some(sheet_name) {
                    return rid;
                }
            }
            Ok(Event::Eof) => return None,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
}

// =============================================================================
// Identifier rendering
// =============================================================================

/// Minimum digit placeholders for a format to read as an identifier mask.
const MIN_IDENTIFIER_DIGITS: usize = 8;

/// Whether a format code is a fixed-width digit mask (tax ids, postal
/// codes) rather than a numeric, date or percentage format.
pub fn looks_like_identifier_format(code: &str) -> bool {
    let section = code.split(';').next().unwrap_or("");
    let mut placeholders = 0;
    let mut chars = section.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '0' | '#' => placeholders += 1,
            '%' | '@' | 'E' | 'e' => return false,
            c if c.is_ascii_alphabetic() => return false,
            _ => {}
        }
    }
    placeholders >= MIN_IDENTIFIER_DIGITS
}

/// Text an identifier mask displays for a whole, non-negative value.
///
/// Digit placeholders consume the zero-padded digits of the value in
/// order; escaped characters, quoted strings and punctuation are emitted
/// as literals. Returns `None` when the value does not fit the mask.
pub fn render_identifier(value: f64, code: &str) -> Option<String> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value >= 1e15 {
        return None;
    }
    let section = code.split(';').next()?;
    let width = section.chars().filter(|c| matches!(c, '0' | '#')).count();
    if width == 0 {
        return None;
    }
    let digits = format!("{:0width$}", value as u64, width = width);
    if digits.len() > width {
        return None;
    }

    let mut digits = digits.chars();
    let mut out = String::with_capacity(section.len());
    let mut chars = section.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '0' | '#' => out.push(digits.next()?),
            '\\' => out.push(chars.next()?),
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                    out.push(c);
                }
            }
            '[' => {
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                }
            }
            '_' | '*' => {
                chars.next();
            }
            c => out.push(c),
        }
    }
    Some(out)
}
