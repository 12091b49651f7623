//! Fixture builders for integration tests.
//!
//! Workbooks and documents are assembled part by part with the `zip` crate so
//! every test controls exactly what the adapters see.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io::{Read, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const ROOT_RELS_XLSX: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/></Relationships>"#;

const CONTENT_TYPES_DOCX: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS_DOCX: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// A cell value placed in the fixture worksheet.
#[derive(Debug, Clone, Copy)]
pub enum Cell<'a> {
    /// Stored in the shared-string table
    Shared(&'a str),
    /// Stored inline in the sheet
    Inline(&'a str),
    Number(f64),
    /// A formula with a cached string result
    Formula(&'a str, &'a str),
}

pub fn temp_root() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, root)
}

/// Write a zip with the given `(part name, content)` entries.
pub fn write_package<N: AsRef<str>>(path: &Utf8Path, parts: &[(N, String)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in parts {
        zip.start_file(name.as_ref(), options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Workbook with one sheet named `sheet_name` holding `cells` as `(reference, value)`.
pub fn write_xlsx(path: &Utf8Path, sheet_name: &str, cells: &[(&str, Cell)]) {
    write_workbook(path, &[(sheet_name, cells)]);
}

/// Workbook with the given sheets in workbook order.
///
/// Shared-string cells with equal text share one table entry.
pub fn write_workbook(path: &Utf8Path, sheets: &[(&str, &[(&str, Cell)])]) {
    let mut shared: Vec<String> = Vec::new();
    let mut parts: Vec<(String, String)> = Vec::new();
    let mut sheet_entries = String::new();
    let mut sheet_rels = String::new();
    let mut overrides = String::new();

    for (i, (name, cells)) in sheets.iter().enumerate() {
        let number = i + 1;
        sheet_entries.push_str(&format!(
            r#"<sheet name="{}" sheetId="{}" r:id="rId{}"/>"#,
            escape(name),
            number,
            number
        ));
        sheet_rels.push_str(&format!(
            r#"<Relationship Id="rId{0}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{0}.xml"/>"#,
            number
        ));
        overrides.push_str(&format!(
            r#"<Override PartName="/xl/worksheets/sheet{}.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/>"#,
            number
        ));
        parts.push((
            format!("xl/worksheets/sheet{}.xml", number),
            sheet_xml(cells, &mut shared),
        ));
    }

    let shared_rel_id = sheets.len() + 1;
    sheet_rels.push_str(&format!(
        r#"<Relationship Id="rId{}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>"#,
        shared_rel_id
    ));

    let content_types = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>{}<Override PartName="/xl/sharedStrings.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sharedStrings+xml"/></Types>"#,
        overrides
    );
    let workbook = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>{}</sheets></workbook>"#,
        sheet_entries
    );
    let workbook_rels = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{}</Relationships>"#,
        sheet_rels
    );
    let shared_items: String = shared
        .iter()
        .map(|text| format!("<si><t>{}</t></si>", escape(text)))
        .collect();
    let shared_strings = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" uniqueCount="{}">{}</sst>"#,
        shared.len(),
        shared_items
    );

    let mut all_parts = vec![
        ("[Content_Types].xml".to_string(), content_types),
        ("_rels/.rels".to_string(), ROOT_RELS_XLSX.to_string()),
        ("xl/workbook.xml".to_string(), workbook),
        ("xl/_rels/workbook.xml.rels".to_string(), workbook_rels),
    ];
    all_parts.extend(parts);
    all_parts.push(("xl/sharedStrings.xml".to_string(), shared_strings));

    write_package(path, &all_parts);
}

fn sheet_xml(cells: &[(&str, Cell)], shared: &mut Vec<String>) -> String {
    let mut rows: Vec<(u32, String)> = Vec::new();

    for (reference, value) in cells {
        let row: u32 = reference
            .trim_start_matches(|c: char| c.is_ascii_alphabetic())
            .parse()
            .unwrap();
        let xml = match value {
            Cell::Shared(text) => {
                let index = match shared.iter().position(|s| s == text) {
                    Some(index) => index,
                    None => {
                        shared.push(text.to_string());
                        shared.len() - 1
                    }
                };
                format!(r#"<c r="{}" t="s"><v>{}</v></c>"#, reference, index)
            }
            Cell::Inline(text) => format!(
                r#"<c r="{}" t="inlineStr"><is><t>{}</t></is></c>"#,
                reference,
                escape(text)
            ),
            Cell::Number(n) => format!(r#"<c r="{}"><v>{}</v></c>"#, reference, n),
            Cell::Formula(formula, cached) => format!(
                r#"<c r="{}" t="str"><f>{}</f><v>{}</v></c>"#,
                reference,
                escape(formula),
                escape(cached)
            ),
        };
        match rows.iter_mut().find(|(r, _)| *r == row) {
            Some((_, cells)) => cells.push_str(&xml),
            None => rows.push((row, xml)),
        }
    }

    let sheet_data: String = rows
        .iter()
        .map(|(r, cells)| format!(r#"<row r="{}">{}</row>"#, r, cells))
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
        sheet_data
    )
}

/// Document whose body holds one paragraph per entry, each split into the given runs.
///
/// Every run after the first is bold so the paragraph has formatting to lose.
pub fn write_docx(path: &Utf8Path, paragraphs: &[&[&str]]) {
    let body: String = paragraphs.iter().map(|runs| paragraph(runs)).collect();
    write_docx_body(path, &body);
}

/// `<w:p>` with left alignment and the given runs; runs after the first are bold.
pub fn paragraph(runs: &[&str]) -> String {
    let runs: String = runs
        .iter()
        .enumerate()
        .map(|(i, text)| run(text, i > 0))
        .collect();
    format!("<w:p><w:pPr><w:jc w:val=\"left\"/></w:pPr>{}</w:p>", runs)
}

pub fn run(text: &str, bold: bool) -> String {
    let props = if bold { "<w:rPr><w:b/></w:rPr>" } else { "" };
    format!(
        r#"<w:r>{}<w:t xml:space="preserve">{}</w:t></w:r>"#,
        props,
        escape(text)
    )
}

/// A one-row table whose cells each hold one paragraph.
pub fn table(cells: &[&str]) -> String {
    let cells: String = cells
        .iter()
        .map(|text| format!("<w:tc><w:tcPr/>{}</w:tc>", paragraph(&[*text])))
        .collect();
    format!("<w:tbl><w:tblPr/><w:tr>{}</w:tr></w:tbl>", cells)
}

/// Paragraph of plain text followed by an internal hyperlink.
pub fn paragraph_with_link(text: &str, link_text: &str) -> String {
    format!(
        r#"<w:p>{}<w:hyperlink w:anchor="target">{}</w:hyperlink></w:p>"#,
        run(text, false),
        run(link_text, false)
    )
}

/// Document whose `<w:body>` content is `body` (`w:` prefix bound).
pub fn write_docx_body(path: &Utf8Path, body: &str) {
    let document = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}<w:sectPr/></w:body></w:document>"#,
        body
    );

    write_package(
        path,
        &[
            ("[Content_Types].xml", CONTENT_TYPES_DOCX.to_string()),
            ("_rels/.rels", ROOT_RELS_DOCX.to_string()),
            ("word/document.xml", document),
        ],
    );
}

/// Content of one part of a package on disk.
pub fn read_part(path: &Utf8Path, name: &str) -> String {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut content = String::new();
    entry.read_to_string(&mut content).unwrap();
    content
}
