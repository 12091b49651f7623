//! OOXML package access - the zip container behind `.xlsx` and `.docx` files.
//!
//! A [`Package`] loads every part into memory in archive order, lets adapters
//! replace individual parts, and writes the whole archive back over the
//! original file. Parts that were never touched are copied byte for byte.

use crate::services::xml::{XmlDocument, XmlError};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Relationship type suffix of the package's main part (workbook or document body).
pub const OFFICE_DOCUMENT_REL: &str = "/officeDocument";

/// Largest uncompressed part accepted when opening a package.
pub const MAX_PART_SIZE: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum PackageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a valid Office package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Malformed part {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("Package is missing required part: {0}")]
    MissingPart(String),

    #[error("Part {part} is larger than {limit} bytes")]
    PartTooLarge { part: String, limit: u64 },
}

/// One `<Relationship>` from a `.rels` part, with its target resolved to a part name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub rel_type: String,
    pub target: String,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    is_dir: bool,
}

/// An opened OOXML package held in memory.
#[derive(Debug, Clone)]
pub struct Package {
    path: Utf8PathBuf,
    entries: IndexMap<String, Entry>,
    modified: bool,
}

impl Package {
    pub fn open(path: &Utf8Path) -> Result<Self, PackageError> {
        let file = File::open(path)?;
        let mut archive = ZipArchive::new(file)?;
        let mut entries = IndexMap::with_capacity(archive.len());

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            let is_dir = entry.is_dir();
            let mut data = Vec::new();
            if !is_dir {
                // The header size is untrusted: check it, then cap the actual read too.
                if entry.size() > MAX_PART_SIZE {
                    return Err(PackageError::PartTooLarge {
                        part: name,
                        limit: MAX_PART_SIZE,
                    });
                }
                (&mut entry).take(MAX_PART_SIZE + 1).read_to_end(&mut data)?;
                if data.len() as u64 > MAX_PART_SIZE {
                    return Err(PackageError::PartTooLarge {
                        part: name,
                        limit: MAX_PART_SIZE,
                    });
                }
            }
            entries.insert(name, Entry { data, is_dir });
        }

        tracing::debug!("Opened package {} ({} entries)", path, entries.len());

        Ok(Self {
            path: path.to_path_buf(),
            entries,
            modified: false,
        })
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn part_names(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_dir)
            .map(|(name, _)| name.as_str())
    }

    pub fn part(&self, name: &str) -> Option<&[u8]> {
        self.entries
            .get(name)
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.data.as_slice())
    }

    /// Parse a part as XML; `Ok(None)` if the part does not exist.
    pub fn xml_part(&self, name: &str) -> Result<Option<XmlDocument>, PackageError> {
        match self.part(name) {
            Some(bytes) => XmlDocument::parse(bytes)
                .map(Some)
                .map_err(|source| PackageError::Xml {
                    part: name.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    pub fn require_xml_part(&self, name: &str) -> Result<XmlDocument, PackageError> {
        self.xml_part(name)?
            .ok_or_else(|| PackageError::MissingPart(name.to_string()))
    }

    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        self.entries.insert(
            name.to_string(),
            Entry {
                data,
                is_dir: false,
            },
        );
        self.modified = true;
    }

    pub fn set_xml_part(&mut self, name: &str, doc: &XmlDocument) -> Result<(), PackageError> {
        let bytes = doc.to_bytes().map_err(|source| PackageError::Xml {
            part: name.to_string(),
            source,
        })?;
        self.set_part(name, bytes);
        Ok(())
    }

    /// Relationships declared by `source` (`""` for the package itself).
    pub fn relationships(&self, source: &str) -> Result<Vec<Relationship>, PackageError> {
        let rels_name = rels_part_name(source);
        let Some(doc) = self.xml_part(&rels_name)? else {
            return Ok(Vec::new());
        };
        let Some(root) = doc.root() else {
            return Ok(Vec::new());
        };

        let xml_err = |source| PackageError::Xml {
            part: rels_name.clone(),
            source,
        };

        let mut rels = Vec::new();
        for rel in root.child_elements().filter(|el| el.is("Relationship")) {
            if rel.attribute("TargetMode").map_err(xml_err)?.as_deref() == Some("External") {
                continue;
            }
            let id = rel.attribute("Id").map_err(xml_err)?.unwrap_or_default();
            let rel_type = rel.attribute("Type").map_err(xml_err)?.unwrap_or_default();
            let Some(target) = rel.attribute("Target").map_err(xml_err)? else {
                continue;
            };
            rels.push(Relationship {
                id,
                rel_type,
                target: resolve_target(source, &target),
            });
        }

        Ok(rels)
    }

    /// Part name of the package's main part, falling back to `fallback`.
    pub fn main_part(&self, fallback: &str) -> Result<String, PackageError> {
        let main = self
            .relationships("")?
            .into_iter()
            .find(|rel| rel.rel_type.ends_with(OFFICE_DOCUMENT_REL))
            .map(|rel| rel.target)
            .filter(|target| self.part(target).is_some());

        Ok(main.unwrap_or_else(|| fallback.to_string()))
    }

    /// Write the package back over the file it was opened from.
    ///
    /// The archive is written to a sibling temporary file first and then renamed
    /// into place, so a failed write leaves the original untouched.
    pub fn save(&mut self) -> Result<(), PackageError> {
        let tmp_path = Utf8PathBuf::from(format!("{}.tmp", self.path));

        let result = self.write_archive(&tmp_path).and_then(|()| {
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        });

        if let Err(e) = result {
            if tmp_path.exists() {
                let _ = fs::remove_file(&tmp_path);
            }
            return Err(e);
        }

        self.modified = false;
        tracing::debug!("Saved package {}", self.path);
        Ok(())
    }

    fn write_archive(&self, dest: &Utf8Path) -> Result<(), PackageError> {
        let file = File::create(dest)?;
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        for (name, entry) in &self.entries {
            if entry.is_dir {
                writer.add_directory(name.as_str(), options)?;
            } else {
                writer.start_file(name.as_str(), options)?;
                writer.write_all(&entry.data)?;
            }
        }

        let file = writer.finish()?;
        file.sync_all()?;
        Ok(())
    }
}

/// `xl/workbook.xml` -> `xl/_rels/workbook.xml.rels`; `""` -> `_rels/.rels`.
fn rels_part_name(source: &str) -> String {
    match source.rsplit_once('/') {
        Some((dir, file)) => format!("{}/_rels/{}.rels", dir, file),
        None if source.is_empty() => "_rels/.rels".to_string(),
        None => format!("_rels/{}.rels", source),
    }
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }

    let mut segments: Vec<&str> = match source.rsplit_once('/') {
        Some((dir, _)) => dir.split('/').collect(),
        None => Vec::new(),
    };

    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    segments.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_zip(path: &Utf8Path, parts: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, body) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn temp_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::try_from(dir.path().join(name)).unwrap()
    }

    /// Single stored entry whose zip64 extra field claims `claimed_size` bytes.
    fn zip_with_claimed_size(name: &str, data: &[u8], claimed_size: u64) -> Vec<u8> {
        let mut extra = Vec::new();
        extra.extend_from_slice(&0x0001u16.to_le_bytes());
        extra.extend_from_slice(&16u16.to_le_bytes());
        extra.extend_from_slice(&claimed_size.to_le_bytes());
        extra.extend_from_slice(&(data.len() as u64).to_le_bytes());

        let mut out = Vec::new();
        out.extend_from_slice(&0x04034b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes()); // flags
        out.extend_from_slice(&0u16.to_le_bytes()); // stored
        out.extend_from_slice(&0u16.to_le_bytes()); // time
        out.extend_from_slice(&0x21u16.to_le_bytes()); // date
        out.extend_from_slice(&0u32.to_le_bytes()); // crc
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&extra);
        out.extend_from_slice(data);

        let central_offset = out.len() as u32;
        out.extend_from_slice(&0x02014b50u32.to_le_bytes());
        out.extend_from_slice(&45u16.to_le_bytes()); // version made by
        out.extend_from_slice(&45u16.to_le_bytes()); // version needed
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0x21u16.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&u32::MAX.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes()); // comment
        out.extend_from_slice(&0u16.to_le_bytes()); // disk
        out.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        out.extend_from_slice(&0u32.to_le_bytes()); // external attributes
        out.extend_from_slice(&0u32.to_le_bytes()); // local header offset
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(&extra);
        let central_size = out.len() as u32 - central_offset;

        out.extend_from_slice(&0x06054b50u32.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&central_size.to_le_bytes());
        out.extend_from_slice(&central_offset.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    #[test]
    fn test_forged_part_size_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "huge.xlsx");
        fs::write(&path, zip_with_claimed_size("xl/workbook.xml", b"<w/>", 1 << 62)).unwrap();

        let result = Package::open(&path);
        assert!(result.is_err(), "forged size must not be trusted");
    }

    #[test]
    fn test_rels_part_name() {
        assert_eq!(rels_part_name(""), "_rels/.rels");
        assert_eq!(rels_part_name("xl/workbook.xml"), "xl/_rels/workbook.xml.rels");
        assert_eq!(rels_part_name("word/document.xml"), "word/_rels/document.xml.rels");
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("xl/workbook.xml", "worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(resolve_target("xl/workbook.xml", "/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("xl/worksheets/sheet1.xml", "../sharedStrings.xml"), "xl/sharedStrings.xml");
        assert_eq!(resolve_target("", "word/document.xml"), "word/document.xml");
    }

    #[test]
    fn test_open_and_save_preserves_parts() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "book.xlsx");
        write_zip(&path, &[("a.xml", "<a/>"), ("docProps/b.xml", "<b>keep</b>")]);

        let mut package = Package::open(&path).unwrap();
        assert_eq!(package.part_names().collect::<Vec<_>>(), vec!["a.xml", "docProps/b.xml"]);
        assert!(!package.is_modified());

        package.set_part("a.xml", b"<a>changed</a>".to_vec());
        assert!(package.is_modified());
        package.save().unwrap();

        let reopened = Package::open(&path).unwrap();
        assert_eq!(reopened.part("a.xml").unwrap(), b"<a>changed</a>");
        assert_eq!(reopened.part("docProps/b.xml").unwrap(), b"<b>keep</b>");
        assert!(!Utf8PathBuf::from(format!("{}.tmp", path)).exists());
    }

    #[test]
    fn test_main_part_from_package_relationships() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "doc.docx");
        write_zip(
            &path,
            &[
                (
                    "_rels/.rels",
                    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/main.xml"/></Relationships>"#,
                ),
                ("word/main.xml", "<w:document/>"),
            ],
        );

        let package = Package::open(&path).unwrap();
        assert_eq!(package.main_part("word/document.xml").unwrap(), "word/main.xml");
    }

    #[test]
    fn test_main_part_fallback() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "doc.docx");
        write_zip(&path, &[("word/document.xml", "<w:document/>")]);

        let package = Package::open(&path).unwrap();
        assert_eq!(package.main_part("word/document.xml").unwrap(), "word/document.xml");
    }

    #[test]
    fn test_open_rejects_non_zip() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "fake.xlsx");
        fs::write(&path, "not a zip").unwrap();

        assert!(matches!(Package::open(&path), Err(PackageError::Zip(_))));
    }

    #[test]
    fn test_missing_xml_part() {
        let dir = TempDir::new().unwrap();
        let path = temp_path(&dir, "book.xlsx");
        write_zip(&path, &[("a.xml", "<a/>")]);

        let package = Package::open(&path).unwrap();
        assert!(package.xml_part("missing.xml").unwrap().is_none());
        assert!(matches!(
            package.require_xml_part("missing.xml"),
            Err(PackageError::MissingPart(_))
        ));
    }
}
