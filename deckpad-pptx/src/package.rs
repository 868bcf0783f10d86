//! OPC plumbing: zip container, relationships and content types.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::io::{Read, Seek, Write};

use anyhow::{anyhow, Context, Result};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::xml::{self, escape, Element, XML_DECLARATION};

pub const REL_OFFICE_DOCUMENT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
pub const REL_SLIDE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide";
pub const REL_SLIDE_LAYOUT: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideLayout";
pub const REL_SLIDE_MASTER: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster";
pub const REL_THEME: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/theme";
pub const REL_IMAGE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";
pub const REL_CHART: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/chart";

pub const CT_PRESENTATION: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml";
pub const CT_SLIDE: &str = "application/vnd.openxmlformats-officedocument.presentationml.slide+xml";
pub const CT_SLIDE_LAYOUT: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml";
pub const CT_SLIDE_MASTER: &str =
    "application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml";
pub const CT_THEME: &str = "application/vnd.openxmlformats-officedocument.theme+xml";
pub const CT_CHART: &str = "application/vnd.openxmlformats-officedocument.drawingml.chart+xml";
const CT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub id: String,
    pub kind: String,
    pub target: String,
}

/// `ppt/slides/slide1.xml` -> `ppt/slides/_rels/slide1.xml.rels`
pub fn rels_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((dir, file)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

/// Resolves a relationship target against the part that owns it.
pub fn resolve_target(source: &str, target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        return absolute.to_string();
    }
    let mut segments: Vec<&str> = source.split('/').collect();
    segments.pop();
    for segment in target.split('/') {
        match segment {
            ".." => {
                segments.pop();
            }
            "." | "" => {}
            other => segments.push(other),
        }
    }
    segments.join("/")
}

pub fn parse_relationships(root: &Element) -> Vec<Relationship> {
    root.children("Relationship")
        .filter(|rel| rel.attr("TargetMode") != Some("External"))
        .filter_map(|rel| {
            Some(Relationship {
                id: rel.attr("Id")?.to_string(),
                kind: rel.attr("Type")?.to_string(),
                target: rel.attr("Target")?.to_string(),
            })
        })
        .collect()
}

pub fn relationships_xml(relationships: &[Relationship]) -> Result<String> {
    let mut xml = String::with_capacity(256 + relationships.len() * 160);
    xml.push_str(XML_DECLARATION);
    write!(
        xml,
        r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
    )?;
    for rel in relationships {
        write!(
            xml,
            r#"<Relationship Id="{}" Type="{}" Target="{}"/>"#,
            rel.id,
            rel.kind,
            escape(&rel.target)
        )?;
    }
    xml.push_str("</Relationships>");
    Ok(xml)
}

/// Sequential `rIdN` ids for one part's outgoing relationships.
#[derive(Debug, Default)]
pub struct RelationshipSet {
    items: Vec<Relationship>,
}

impl RelationshipSet {
    pub fn add(&mut self, kind: &str, target: impl Into<String>) -> String {
        let id = format!("rId{}", self.items.len() + 1);
        self.items.push(Relationship {
            id: id.clone(),
            kind: kind.to_string(),
            target: target.into(),
        });
        id
    }

    pub fn to_xml(&self) -> Result<String> {
        relationships_xml(&self.items)
    }
}

/// Collects parts and their content types, then writes the zip in one go.
#[derive(Debug, Default)]
pub struct PackageBuilder {
    parts: Vec<(String, Vec<u8>)>,
    defaults: BTreeMap<String, String>,
    overrides: Vec<(String, &'static str)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        let mut builder = Self::default();
        builder.register_extension("rels", CT_RELATIONSHIPS);
        builder.register_extension("xml", "application/xml");
        builder
    }

    pub fn register_extension(&mut self, extension: &str, content_type: &str) {
        self.defaults
            .entry(extension.to_ascii_lowercase())
            .or_insert_with(|| content_type.to_string());
    }

    pub fn add_xml(&mut self, name: impl Into<String>, content_type: &'static str, xml: String) {
        let name = name.into();
        self.overrides.push((name.clone(), content_type));
        self.parts.push((name, xml.into_bytes()));
    }

    /// A part whose content type follows from its extension.
    pub fn add_part(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        self.parts.push((name.into(), bytes));
    }

    pub fn add_rels(&mut self, source: &str, relationships: &RelationshipSet) -> Result<()> {
        let xml = relationships.to_xml()?;
        self.add_part(rels_path(source), xml.into_bytes());
        Ok(())
    }

    fn content_types(&self) -> Result<String> {
        let mut xml = String::with_capacity(512 + self.overrides.len() * 160);
        xml.push_str(XML_DECLARATION);
        xml.push_str(
            r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
        );
        for (extension, content_type) in &self.defaults {
            write!(
                xml,
                r#"<Default Extension="{extension}" ContentType="{content_type}"/>"#
            )?;
        }
        for (name, content_type) in &self.overrides {
            write!(
                xml,
                r#"<Override PartName="/{}" ContentType="{content_type}"/>"#,
                escape(name)
            )?;
        }
        xml.push_str("</Types>");
        Ok(xml)
    }

    pub fn write<W: Write + Seek>(self, writer: W) -> Result<W> {
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(writer);

        zip.start_file("[Content_Types].xml", options)?;
        zip.write_all(self.content_types()?.as_bytes())?;
        for (name, bytes) in &self.parts {
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("failed to start part {name}"))?;
            zip.write_all(bytes)
                .with_context(|| format!("failed to write part {name}"))?;
        }
        Ok(zip.finish()?)
    }
}

pub fn office_document_rels() -> Result<String> {
    relationships_xml(&[Relationship {
        id: "rId1".to_string(),
        kind: REL_OFFICE_DOCUMENT.to_string(),
        target: "ppt/presentation.xml".to_string(),
    }])
}

/// Read side of the container.
pub struct Package<R> {
    archive: ZipArchive<R>,
}

/// Upper bound on what a part's declared size may reserve up front.
const MAX_PREALLOCATION: u64 = 16 * 1024 * 1024;

/// The size in a zip header is whatever the file's author wrote there.
fn initial_capacity(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

impl<R: Read + Seek> Package<R> {
    pub fn new(reader: R) -> Result<Self> {
        let archive = ZipArchive::new(reader).context("not a zip package")?;
        Ok(Self { archive })
    }

    pub fn part(&mut self, name: &str) -> Result<Vec<u8>> {
        self.optional_part(name)?
            .ok_or_else(|| anyhow!("package is missing part {name}"))
    }

    pub fn optional_part(&mut self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut file = match self.archive.by_name(name) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("failed to open part {name}")),
        };
        let mut bytes = Vec::with_capacity(initial_capacity(file.size()));
        file.read_to_end(&mut bytes)
            .with_context(|| format!("failed to read part {name}"))?;
        Ok(Some(bytes))
    }

    pub fn xml(&mut self, name: &str) -> Result<Element> {
        let bytes = self.part(name)?;
        xml::parse(&bytes).with_context(|| format!("failed to parse {name}"))
    }

    /// Relationships owned by `part`; a part without a rels file has none.
    pub fn relationships(&mut self, part: &str) -> Result<Vec<Relationship>> {
        let path = rels_path(part);
        match self.optional_part(&path)? {
            Some(bytes) => {
                let root = xml::parse(&bytes).with_context(|| format!("failed to parse {path}"))?;
                Ok(parse_relationships(&root))
            }
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_part_sizes_do_not_drive_allocation() {
        assert_eq!(initial_capacity(0), 0);
        assert_eq!(initial_capacity(4096), 4096);
        assert_eq!(initial_capacity(u64::MAX), MAX_PREALLOCATION as usize);
    }

    #[test]
    fn targets_resolve_relative_to_source_part() {
        assert_eq!(
            resolve_target("ppt/slides/slide3.xml", "../media/image1.png"),
            "ppt/media/image1.png"
        );
        assert_eq!(
            resolve_target("ppt/presentation.xml", "slides/slide1.xml"),
            "ppt/slides/slide1.xml"
        );
        assert_eq!(resolve_target("_rels/.rels", "/ppt/presentation.xml"), "ppt/presentation.xml");
        assert_eq!(rels_path("ppt/presentation.xml"), "ppt/_rels/presentation.xml.rels");
    }

    #[test]
    fn relationship_ids_are_sequential() {
        let mut rels = RelationshipSet::default();
        assert_eq!(rels.add(REL_SLIDE_LAYOUT, "../slideLayouts/slideLayout1.xml"), "rId1");
        assert_eq!(rels.add(REL_IMAGE, "../media/image1.png"), "rId2");
        let root = xml::parse(rels.to_xml().unwrap().as_bytes()).unwrap();
        let parsed = parse_relationships(&root);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1].target, "../media/image1.png");
    }
}
