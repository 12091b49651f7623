//! Document adapter for `.docx` files.
//!
//! Every body paragraph, table-cell paragraphs included, is one text unit. Its
//! text is the concatenation of its runs, so a match may span several runs.
//! When a changed paragraph is committed, all of its runs are dropped and a
//! single unformatted run carrying the new text is appended; formatting
//! boundaries inside that paragraph are lost.

use crate::services::adapter::{AdapterError, Change, FileReport, FormatAdapter, Location};
use crate::services::package::Package;
use crate::services::substitute::Matcher;
use crate::services::xml::{XmlElement, XmlNode};
use camino::Utf8Path;

const DOCUMENT_FALLBACK: &str = "word/document.xml";

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentAdapter;

impl DocumentAdapter {
    pub fn new() -> Self {
        Self
    }
}

impl FormatAdapter for DocumentAdapter {
    fn process(
        &self,
        path: &Utf8Path,
        matcher: &Matcher,
        commit: bool,
    ) -> Result<FileReport, AdapterError> {
        let mut package = Package::open(path)?;
        let part = package.main_part(DOCUMENT_FALLBACK)?;
        let mut doc = package.require_xml_part(&part)?;

        let body = doc
            .root_mut()
            .and_then(|root| root.child_mut("body"))
            .ok_or_else(|| AdapterError::malformed(&part, "document has no body"))?;

        let mut changes = Vec::new();
        let mut index = 0usize;
        for_each_paragraph(body, &mut |paragraph| {
            index += 1;
            let before = paragraph_text(paragraph);
            let result = matcher.apply(&before);
            if !result.changed {
                return;
            }
            if commit {
                replace_runs(paragraph, &result.text);
            }
            changes.push(Change {
                location: Location::Paragraph(index),
                before,
                after: result.text,
            });
        });

        let mut saved = false;
        if commit && !changes.is_empty() {
            package.set_xml_part(&part, &doc)?;
            package.save()?;
            saved = true;
        }

        tracing::debug!("{}: {} changed paragraph(s), saved={}", path, changes.len(), saved);
        Ok(FileReport { changes, saved })
    }
}

/// Visit paragraphs in reading order without descending into a paragraph's own content.
fn for_each_paragraph(el: &mut XmlElement, visit: &mut impl FnMut(&mut XmlElement)) {
    for child in el.child_elements_mut() {
        if child.is("p") {
            visit(child);
        } else {
            for_each_paragraph(child, visit);
        }
    }
}

/// Text of the paragraph's runs, including runs wrapped in hyperlinks.
pub fn paragraph_text(paragraph: &XmlElement) -> String {
    let mut out = String::new();
    for child in paragraph.child_elements() {
        if child.is("r") {
            push_run_text(child, &mut out);
        } else if child.is("hyperlink") {
            for run in child.child_elements().filter(|el| el.is("r")) {
                push_run_text(run, &mut out);
            }
        }
    }
    out
}

fn push_run_text(run: &XmlElement, out: &mut String) {
    for item in run.child_elements() {
        match item.local_name().as_str() {
            "t" => out.push_str(&item.text()),
            "tab" => out.push('\t'),
            "br" | "cr" => out.push('\n'),
            "noBreakHyphen" => out.push('-'),
            _ => {}
        }
    }
}

/// Drop every run (and hyperlink) and append one run holding `text`.
fn replace_runs(paragraph: &mut XmlElement, text: &str) {
    let prefix = paragraph.prefix();
    let qualified = |local: &str| match &prefix {
        Some(p) => format!("{}:{}", p, local),
        None => local.to_string(),
    };

    paragraph.children.retain(|node| match node {
        XmlNode::Element(child) => !(child.is("r") || child.is("hyperlink")),
        _ => true,
    });

    let mut run = XmlElement::new(&qualified("r"));
    let mut pending = String::new();
    let flush = |pending: &mut String, run: &mut XmlElement| {
        if !pending.is_empty() {
            let t = XmlElement::new(&qualified("t"))
                .with_attribute("xml:space", "preserve")
                .with_text(pending);
            run.children.push(XmlNode::Element(t));
            pending.clear();
        }
    };

    for c in text.chars() {
        match c {
            '\t' => {
                flush(&mut pending, &mut run);
                run.children
                    .push(XmlNode::Element(XmlElement::empty(&qualified("tab"))));
            }
            '\n' | '\r' => {
                flush(&mut pending, &mut run);
                run.children
                    .push(XmlNode::Element(XmlElement::empty(&qualified("br"))));
            }
            other => pending.push(other),
        }
    }
    flush(&mut pending, &mut run);

    paragraph.children.push(XmlNode::Element(run));
}
