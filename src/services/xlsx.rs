//! Spreadsheet adapter for `.xlsx` workbooks.
//!
//! Textual cells are shared-string cells (`t="s"`) and inline-string cells
//! (`t="inlineStr"`). Numbers, booleans, errors, dates, formulas and blanks are
//! never inspected.
//!
//! Shared strings are substituted once per table entry: every cell pointing at
//! the same entry holds the same text and therefore gets the same result, so on
//! commit the entry itself is rewritten rather than each referencing cell.

use crate::services::adapter::{AdapterError, Change, FileReport, FormatAdapter, Location};
use crate::services::package::{Package, Relationship};
use crate::services::substitute::{Matcher, Substitution};
use crate::services::xml::{XmlDocument, XmlElement, XmlNode};
use camino::Utf8Path;
use std::collections::{BTreeMap, HashMap};

const WORKBOOK_FALLBACK: &str = "xl/workbook.xml";
const SHARED_STRINGS_FALLBACK: &str = "xl/sharedStrings.xml";
const SHARED_STRINGS_REL: &str = "/sharedStrings";

/// A worksheet in workbook order.
#[derive(Debug, Clone, PartialEq, Eq)]
struct SheetRef {
    name: String,
    part: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SpreadsheetAdapter;

impl SpreadsheetAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl FormatAdapter for SpreadsheetAdapter {
    fn process(
        &self,
        path: &Utf8Path,
        matcher: &Matcher,
        commit: bool,
    ) -> Result<FileReport, AdapterError> {
        let mut package = Package::open(path)?;

        let workbook_part = package.main_part(WORKBOOK_FALLBACK)?;
        let workbook = package.require_xml_part(&workbook_part)?;
        let rels = package.relationships(&workbook_part)?;
        let sheets = sheet_list(&workbook, &workbook_part, &rels)?;

        let sst_part = rels
            .iter()
            .find(|rel| rel.rel_type.ends_with(SHARED_STRINGS_REL))
            .map(|rel| rel.target.clone())
            .unwrap_or_else(|| SHARED_STRINGS_FALLBACK.to_string());
        let mut sst = package.xml_part(&sst_part)?;
        let shared_texts = sst.as_ref().map(shared_string_texts).unwrap_or_default();

        let mut shared = SharedStrings {
            texts: shared_texts,
            results: HashMap::new(),
            rewritten: BTreeMap::new(),
        };

        let mut changes = Vec::new();
        for sheet in &sheets {
            let Some(mut doc) = package.xml_part(&sheet.part)? else {
                tracing::warn!("{}: sheet '{}' has no part {}", path, sheet.name, sheet.part);
                continue;
            };

            let inline_edits =
                scan_sheet(&mut doc, sheet, matcher, commit, &mut shared, &mut changes)?;

            if commit && inline_edits > 0 {
                package.set_xml_part(&sheet.part, &doc)?;
            }
        }

        if commit && !shared.rewritten.is_empty() {
            if let Some(sst_doc) = sst.as_mut() {
                rewrite_shared_strings(sst_doc, &shared.rewritten, &sst_part)?;
                package.set_xml_part(&sst_part, sst_doc)?;
            }
        }

        let mut saved = false;
        if commit && package.is_modified() {
            package.save()?;
            saved = true;
        }

        tracing::debug!("{}: {} changed cell(s), saved={}", path, changes.len(), saved);
        Ok(FileReport { changes, saved })
    }
}

/// Substitution results for the shared-string table, computed lazily.
struct SharedStrings {
    texts: Vec<String>,
    results: HashMap<usize, Substitution>,
    rewritten: BTreeMap<usize, String>,
}

impl SharedStrings {
    fn apply(&mut self, index: usize, matcher: &Matcher) -> Option<&Substitution> {
        let text = self.texts.get(index)?;
        Some(
            self.results
                .entry(index)
                .or_insert_with(|| matcher.apply(text)),
        )
    }
}

fn sheet_list(
    workbook: &XmlDocument,
    workbook_part: &str,
    rels: &[Relationship],
) -> Result<Vec<SheetRef>, AdapterError> {
    let root = workbook
        .root()
        .ok_or_else(|| AdapterError::malformed(workbook_part, "empty workbook"))?;
    let Some(sheets_el) = root.child("sheets") else {
        return Ok(Vec::new());
    };

    let targets: HashMap<&str, &str> = rels
        .iter()
        .map(|rel| (rel.id.as_str(), rel.target.as_str()))
        .collect();

    let mut sheets = Vec::new();
    for sheet in sheets_el.child_elements().filter(|el| el.is("sheet")) {
        let name = sheet
            .attribute("name")
            .map_err(AdapterError::xml(workbook_part))?
            .unwrap_or_default();
        let rel_id = sheet
            .attribute_local("id")
            .map_err(AdapterError::xml(workbook_part))?;

        match rel_id.as_deref().and_then(|id| targets.get(id)) {
            Some(part) => sheets.push(SheetRef {
                name,
                part: part.to_string(),
            }),
            None => tracing::warn!("Sheet '{}' has no resolvable relationship", name),
        }
    }

    Ok(sheets)
}

/// Plain text of every `<si>` entry in the shared-string table.
fn shared_string_texts(sst: &XmlDocument) -> Vec<String> {
    sst.root()
        .map(|root| {
            root.child_elements()
                .filter(|el| el.is("si"))
                .map(rich_text)
                .collect()
        })
        .unwrap_or_default()
}

/// Text of an `<si>` or `<is>` element: direct `<t>` plus `<r><t>` runs, phonetic runs excluded.
fn rich_text(el: &XmlElement) -> String {
    let mut out = String::new();
    for child in el.child_elements() {
        if child.is("t") {
            out.push_str(&child.text());
        } else if child.is("r") {
            for t in child.child_elements().filter(|el| el.is("t")) {
                out.push_str(&t.text());
            }
        }
    }
    out
}

/// Replace the text content of an `<si>`/`<is>` element with a single plain `<t>`.
fn set_rich_text(el: &mut XmlElement, text: &str) {
    let t_name = match el.prefix() {
        Some(prefix) => format!("{}:t", prefix),
        None => "t".to_string(),
    };

    el.children.retain(|node| match node {
        XmlNode::Element(child) => !(child.is("t") || child.is("r")),
        XmlNode::Text(_) => false,
        XmlNode::Other(_) => true,
    });

    let t = XmlElement::new(&t_name)
        .with_attribute("xml:space", "preserve")
        .with_text(text);
    el.children.insert(0, XmlNode::Element(t));
}

fn rewrite_shared_strings(
    sst: &mut XmlDocument,
    rewritten: &BTreeMap<usize, String>,
    part: &str,
) -> Result<(), AdapterError> {
    let root = sst
        .root_mut()
        .ok_or_else(|| AdapterError::malformed(part, "empty shared string table"))?;

    for (index, si) in root.child_elements_mut().filter(|el| el.is("si")).enumerate() {
        if let Some(text) = rewritten.get(&index) {
            set_rich_text(si, text);
        }
    }
    Ok(())
}

/// Walk every cell of a sheet. Returns the number of inline-string edits applied.
fn scan_sheet(
    doc: &mut XmlDocument,
    sheet: &SheetRef,
    matcher: &Matcher,
    commit: bool,
    shared: &mut SharedStrings,
    changes: &mut Vec<Change>,
) -> Result<usize, AdapterError> {
    let part = sheet.part.as_str();
    let Some(sheet_data) = doc.root_mut().and_then(|root| root.child_mut("sheetData")) else {
        return Ok(0);
    };

    let mut inline_edits = 0;
    let mut row_number = 0u32;

    for row in sheet_data.child_elements_mut().filter(|el| el.is("row")) {
        row_number = match row.attribute("r").map_err(AdapterError::xml(part))? {
            Some(r) => r
                .trim()
                .parse()
                .map_err(|_| AdapterError::malformed(part, format!("bad row number '{}'", r)))?,
            None => row_number + 1,
        };

        let mut column = 0u32;
        for cell in row.child_elements_mut().filter(|el| el.is("c")) {
            let reference = cell.attribute("r").map_err(AdapterError::xml(part))?;
            column = reference
                .as_deref()
                .and_then(parse_cell_reference)
                .map(|(col, _)| col)
                .unwrap_or(column + 1);
            let coordinate =
                reference.unwrap_or_else(|| format!("{}{}", column_name(column), row_number));

            if cell.child("f").is_some() {
                continue;
            }

            let cell_type = cell.attribute("t").map_err(AdapterError::xml(part))?;
            match cell_type.as_deref() {
                Some("s") => {
                    let Some(index) = cell
                        .child("v")
                        .and_then(|v| v.text().trim().parse::<usize>().ok())
                    else {
                        continue;
                    };
                    let Some(result) = shared.apply(index, matcher) else {
                        tracing::warn!("{}: cell {} points past the shared string table", part, coordinate);
                        continue;
                    };
                    if !result.changed {
                        continue;
                    }
                    let after = result.text.clone();
                    let before = shared.texts[index].clone();
                    shared.rewritten.insert(index, after.clone());
                    changes.push(Change {
                        location: Location::Cell {
                            sheet: sheet.name.clone(),
                            cell: coordinate,
                        },
                        before,
                        after,
                    });
                }
                Some("inlineStr") => {
                    let Some(is) = cell.child_mut("is") else {
                        continue;
                    };
                    let before = rich_text(is);
                    let result = matcher.apply(&before);
                    if !result.changed {
                        continue;
                    }
                    if commit {
                        set_rich_text(is, &result.text);
                        inline_edits += 1;
                    }
                    changes.push(Change {
                        location: Location::Cell {
                            sheet: sheet.name.clone(),
                            cell: coordinate,
                        },
                        before,
                        after: result.text,
                    });
                }
                _ => {}
            }
        }
    }

    Ok(inline_edits)
}

/// `"AB12"` -> `(28, 12)`. Column letters are case-insensitive; `$` markers are ignored.
pub fn parse_cell_reference(reference: &str) -> Option<(u32, u32)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = reference.split_at(split);
    if letters.is_empty() {
        return None;
    }

    let mut column = 0u32;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        column = column
            .checked_mul(26)?
            .checked_add(c.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }

    let row = digits.parse().ok()?;
    Some((column, row))
}

/// 1 -> `A`, 27 -> `AA`.
pub fn column_name(mut column: u32) -> String {
    let mut name = Vec::new();
    while column > 0 {
        let rem = ((column - 1) % 26) as u8;
        name.push(b'A' + rem);
        column = (column - 1) / 26;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}
