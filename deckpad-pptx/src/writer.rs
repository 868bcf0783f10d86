//! Serializes a [`Document`] into presentation parts.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use anyhow::Result;
use deckpad_core::model::{
    Alignment, Bullet, Chart, Crop, Document, Geometry, IconPicture, MediaType, Paragraph,
    Picture, RunFormat, Shape, ShapeKind, Slide, Table, TextBody,
};
use deckpad_core::Rgb;
use tracing::debug;

use crate::chart::chart_xml;
use crate::package::{
    office_document_rels, PackageBuilder, RelationshipSet, CT_CHART, CT_PRESENTATION, CT_SLIDE,
    CT_SLIDE_LAYOUT, CT_SLIDE_MASTER, CT_THEME, REL_CHART, REL_IMAGE, REL_SLIDE,
    REL_SLIDE_LAYOUT, REL_SLIDE_MASTER, REL_THEME,
};
use crate::templates::{self, EMPTY_SHAPE_TREE, NAMESPACES};
use crate::xml::{escape, XML_DECLARATION};

pub const SVG_BLIP_EXTENSION: &str = "{96DAC541-7B7A-43D3-8B79-37D633B846F1}";
pub const SVG_NAMESPACE: &str = "http://schemas.microsoft.com/office/drawing/2016/SVG/main";
const TABLE_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/table";
const CHART_URI: &str = "http://schemas.openxmlformats.org/drawingml/2006/chart";
const TABLE_STYLE: &str = "{5C22544A-7EE6-4342-B048-85BDC9FD1C3A}";
const NOTES_SIZE: &str = r#"<p:notesSz cx="6858000" cy="9144000"/>"#;
const BULLET_INDENT: i64 = 342_900;
const FIRST_SLIDE_ID: usize = 256;

/// Line breaks inside a run are stored as this character in the model.
const LINE_BREAK: char = '\u{b}';

/// Media and chart parts are numbered across the whole package.
#[derive(Default)]
struct PartCounters {
    media: usize,
    charts: usize,
}

struct SlideWriter<'a> {
    package: &'a mut PackageBuilder,
    counters: &'a mut PartCounters,
    rels: RelationshipSet,
    xml: String,
}

fn write_xfrm(xml: &mut String, tag: &str, geometry: &Geometry, rotation: f64) -> Result<()> {
    let rot = (rotation * 60_000.0).round() as i64;
    if rot != 0 {
        write!(xml, r#"<{tag} rot="{rot}">"#)?;
    } else {
        write!(xml, "<{tag}>")?;
    }
    write!(
        xml,
        r#"<a:off x="{}" y="{}"/><a:ext cx="{}" cy="{}"/></{tag}>"#,
        geometry.left, geometry.top, geometry.width, geometry.height
    )?;
    Ok(())
}

fn solid_fill(xml: &mut String, color: Rgb) -> Result<()> {
    write!(xml, r#"<a:solidFill><a:srgbClr val="{}"/></a:solidFill>"#, color.hex())?;
    Ok(())
}

fn run_properties(xml: &mut String, tag: &str, format: &RunFormat) -> Result<()> {
    write!(xml, r#"<{tag} lang="en-US""#)?;
    if let Some(size) = format.size {
        write!(xml, r#" sz="{size}""#)?;
    }
    if let Some(bold) = format.bold {
        write!(xml, r#" b="{}""#, u8::from(bold))?;
    }
    if let Some(italic) = format.italic {
        write!(xml, r#" i="{}""#, u8::from(italic))?;
    }
    if let Some(underline) = format.underline {
        write!(xml, r#" u="{}""#, if underline { "sng" } else { "none" })?;
    }
    xml.push_str(r#" dirty="0""#);
    if format.color.is_none() && format.font.is_none() {
        xml.push_str("/>");
        return Ok(());
    }
    xml.push('>');
    if let Some(color) = format.color {
        solid_fill(xml, color)?;
    }
    if let Some(font) = &format.font {
        let font = escape(font);
        write!(
            xml,
            r#"<a:latin typeface="{font}"/><a:ea typeface="{font}"/><a:cs typeface="{font}"/>"#
        )?;
    }
    write!(xml, "</{tag}>")?;
    Ok(())
}

fn alignment_code(alignment: Alignment) -> &'static str {
    match alignment {
        Alignment::Left => "l",
        Alignment::Center => "ctr",
        Alignment::Right => "r",
        Alignment::Justify => "just",
    }
}

fn paragraph_properties(xml: &mut String, paragraph: &Paragraph) -> Result<()> {
    let mut attrs = String::new();
    if let Some(Bullet::Char(_) | Bullet::AutoNumber(_)) = &paragraph.bullet {
        let margin = BULLET_INDENT * (i64::from(paragraph.level) + 1);
        write!(attrs, r#" marL="{margin}" indent="-{BULLET_INDENT}""#)?;
    }
    if paragraph.level > 0 {
        write!(attrs, r#" lvl="{}""#, paragraph.level)?;
    }
    if let Some(alignment) = paragraph.alignment {
        write!(attrs, r#" algn="{}""#, alignment_code(alignment))?;
    }
    match &paragraph.bullet {
        None if attrs.is_empty() => {}
        None => write!(xml, "<a:pPr{attrs}/>")?,
        Some(Bullet::Disabled) => write!(xml, "<a:pPr{attrs}><a:buNone/></a:pPr>")?,
        Some(Bullet::Char(c)) => write!(
            xml,
            r#"<a:pPr{attrs}><a:buFont typeface="Arial"/><a:buChar char="{}"/></a:pPr>"#,
            escape(&c.to_string())
        )?,
        Some(Bullet::AutoNumber(scheme)) => write!(
            xml,
            r#"<a:pPr{attrs}><a:buFont typeface="+mj-lt"/><a:buAutoNum type="{}"/></a:pPr>"#,
            escape(scheme)
        )?,
    }
    Ok(())
}

fn write_paragraphs(xml: &mut String, body: &TextBody) -> Result<()> {
    // a text body needs at least one paragraph
    if body.paragraphs.is_empty() {
        xml.push_str("<a:p/>");
    }
    for paragraph in &body.paragraphs {
        xml.push_str("<a:p>");
        paragraph_properties(xml, paragraph)?;
        for run in &paragraph.runs {
            for (idx, piece) in run.text.split(LINE_BREAK).enumerate() {
                if idx > 0 {
                    xml.push_str("<a:br>");
                    run_properties(xml, "a:rPr", &run.format)?;
                    xml.push_str("</a:br>");
                }
                if piece.is_empty() {
                    continue;
                }
                xml.push_str("<a:r>");
                run_properties(xml, "a:rPr", &run.format)?;
                write!(xml, "<a:t>{}</a:t></a:r>", escape(piece))?;
            }
        }
        run_properties(xml, "a:endParaRPr", &paragraph.end_format)?;
        xml.push_str("</a:p>");
    }
    Ok(())
}

fn write_text_body(xml: &mut String, tag: &str, body: &TextBody, anchor: Option<&str>) -> Result<()> {
    write!(xml, "<{tag}>")?;
    let wrap = if body.word_wrap { "square" } else { "none" };
    write!(xml, r#"<a:bodyPr wrap="{wrap}" rtlCol="0""#)?;
    if let Some(anchor) = anchor {
        write!(xml, r#" anchor="{anchor}""#)?;
    }
    xml.push_str("/><a:lstStyle/>");
    write_paragraphs(xml, body)?;
    write!(xml, "</{tag}>")?;
    Ok(())
}

fn write_shape_style(xml: &mut String, shape: &Shape, default_no_fill: bool) -> Result<()> {
    match shape.style.fill {
        Some(color) => solid_fill(xml, color)?,
        None if default_no_fill => xml.push_str("<a:noFill/>"),
        None => {}
    }
    if let Some(line) = shape.style.line {
        match line.width {
            Some(width) => write!(xml, r#"<a:ln w="{width}">"#)?,
            None => xml.push_str("<a:ln>"),
        }
        if let Some(color) = line.color {
            solid_fill(xml, color)?;
        }
        xml.push_str("</a:ln>");
    }
    Ok(())
}

fn non_visual(xml: &mut String, shape: &Shape, description: Option<&str>) -> Result<()> {
    write!(xml, r#"<p:cNvPr id="{}" name="{}""#, shape.id, escape(&shape.name))?;
    if let Some(description) = description.filter(|text| !text.is_empty()) {
        write!(xml, r#" descr="{}""#, escape(description))?;
    }
    xml.push_str("/>");
    Ok(())
}

fn placeholder(xml: &mut String, shape: &Shape) -> Result<()> {
    match &shape.placeholder {
        Some(kind) => write!(xml, r#"<p:nvPr><p:ph type="{}"/></p:nvPr>"#, escape(kind))?,
        None => xml.push_str("<p:nvPr/>"),
    }
    Ok(())
}

impl<'a> SlideWriter<'a> {
    fn new(package: &'a mut PackageBuilder, counters: &'a mut PartCounters, layout: usize) -> Self {
        let mut rels = RelationshipSet::default();
        rels.add(
            REL_SLIDE_LAYOUT,
            format!("../slideLayouts/slideLayout{layout}.xml"),
        );
        Self {
            package,
            counters,
            rels,
            xml: String::with_capacity(4096),
        }
    }

    fn add_media(&mut self, data: &[u8], media: &MediaType) -> String {
        self.counters.media += 1;
        let file = format!("image{}.{}", self.counters.media, media.extension);
        self.package
            .register_extension(&media.extension, &media.content_type);
        self.package.add_part(format!("ppt/media/{file}"), data.to_vec());
        self.rels.add(REL_IMAGE, format!("../media/{file}"))
    }

    fn add_chart_part(&mut self, chart: &Chart) -> Result<String> {
        self.counters.charts += 1;
        let file = format!("chart{}.xml", self.counters.charts);
        self.package
            .add_xml(format!("ppt/charts/{file}"), CT_CHART, chart_xml(chart)?);
        Ok(self.rels.add(REL_CHART, format!("../charts/{file}")))
    }

    fn write_slide(&mut self, slide: &Slide) -> Result<()> {
        self.xml.push_str(XML_DECLARATION);
        write!(self.xml, "<p:sld {NAMESPACES}>")?;
        write!(self.xml, "<p:cSld><p:spTree>{EMPTY_SHAPE_TREE}")?;
        for shape in &slide.shapes {
            self.write_shape(shape)?;
        }
        self.xml
            .push_str("</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>");
        Ok(())
    }

    fn write_shape(&mut self, shape: &Shape) -> Result<()> {
        match &shape.kind {
            ShapeKind::TextBox(body) => self.write_text_shape(shape, body),
            ShapeKind::AutoShape(auto) => self.write_auto_shape(shape, &auto.preset, &auto.text),
            ShapeKind::Picture(picture) => self.write_picture(shape, picture),
            ShapeKind::Icon(icon) => self.write_icon(shape, icon),
            ShapeKind::Table(table) => self.write_table(shape, table),
            ShapeKind::Chart(chart) => self.write_chart(shape, chart),
        }
    }

    fn write_text_shape(&mut self, shape: &Shape, body: &TextBody) -> Result<()> {
        let xml = &mut self.xml;
        xml.push_str("<p:sp><p:nvSpPr>");
        non_visual(xml, shape, None)?;
        if shape.placeholder.is_some() {
            xml.push_str(r#"<p:cNvSpPr><a:spLocks noGrp="1"/></p:cNvSpPr>"#);
        } else {
            xml.push_str(r#"<p:cNvSpPr txBox="1"/>"#);
        }
        placeholder(xml, shape)?;
        xml.push_str("</p:nvSpPr><p:spPr>");
        write_xfrm(xml, "a:xfrm", &shape.geometry, shape.rotation)?;
        xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom>"#);
        write_shape_style(xml, shape, shape.placeholder.is_none())?;
        xml.push_str("</p:spPr>");
        write_text_body(xml, "p:txBody", body, None)?;
        xml.push_str("</p:sp>");
        Ok(())
    }

    fn write_auto_shape(&mut self, shape: &Shape, preset: &str, body: &TextBody) -> Result<()> {
        let xml = &mut self.xml;
        xml.push_str("<p:sp><p:nvSpPr>");
        non_visual(xml, shape, None)?;
        xml.push_str("<p:cNvSpPr/>");
        placeholder(xml, shape)?;
        xml.push_str("</p:nvSpPr><p:spPr>");
        write_xfrm(xml, "a:xfrm", &shape.geometry, shape.rotation)?;
        write!(
            xml,
            r#"<a:prstGeom prst="{}"><a:avLst/></a:prstGeom>"#,
            escape(preset)
        )?;
        write_shape_style(xml, shape, false)?;
        xml.push_str("</p:spPr>");
        xml.push_str(concat!(
            r#"<p:style><a:lnRef idx="2"><a:schemeClr val="accent1"><a:shade val="50000"/></a:schemeClr></a:lnRef>"#,
            r#"<a:fillRef idx="1"><a:schemeClr val="accent1"/></a:fillRef>"#,
            r#"<a:effectRef idx="0"><a:schemeClr val="accent1"/></a:effectRef>"#,
            r#"<a:fontRef idx="minor"><a:schemeClr val="lt1"/></a:fontRef></p:style>"#
        ));
        write_text_body(xml, "p:txBody", body, Some("ctr"))?;
        xml.push_str("</p:sp>");
        Ok(())
    }

    fn write_picture_frame(
        &mut self,
        shape: &Shape,
        description: &str,
        blip: &str,
        crop: Option<&Crop>,
    ) -> Result<()> {
        let xml = &mut self.xml;
        xml.push_str("<p:pic><p:nvPicPr>");
        non_visual(xml, shape, Some(description))?;
        xml.push_str(r#"<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr>"#);
        xml.push_str("<p:blipFill>");
        xml.push_str(blip);
        if let Some(crop) = crop.filter(|crop| !crop.is_empty()) {
            let scaled = |fraction: f64| (fraction * 100_000.0).round() as i64;
            write!(
                xml,
                r#"<a:srcRect l="{}" t="{}" r="{}" b="{}"/>"#,
                scaled(crop.left),
                scaled(crop.top),
                scaled(crop.right),
                scaled(crop.bottom)
            )?;
        }
        xml.push_str("<a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr>");
        write_xfrm(xml, "a:xfrm", &shape.geometry, shape.rotation)?;
        xml.push_str(r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom>"#);
        write_shape_style(xml, shape, false)?;
        xml.push_str("</p:spPr></p:pic>");
        Ok(())
    }

    fn write_picture(&mut self, shape: &Shape, picture: &Picture) -> Result<()> {
        let rid = self.add_media(&picture.data, &picture.media);
        let blip = format!(r#"<a:blip r:embed="{rid}"/>"#);
        self.write_picture_frame(shape, &picture.description, &blip, Some(&picture.crop))
    }

    fn write_icon(&mut self, shape: &Shape, icon: &IconPicture) -> Result<()> {
        let svg_media = MediaType::new("svg", "image/svg+xml");
        let blip = if icon.png.is_empty() {
            let rid = self.add_media(icon.svg.as_bytes(), &svg_media);
            format!(r#"<a:blip r:embed="{rid}"/>"#)
        } else {
            let png = self.add_media(&icon.png, &MediaType::png());
            let svg = self.add_media(icon.svg.as_bytes(), &svg_media);
            format!(
                concat!(
                    r#"<a:blip r:embed="{png}"><a:extLst><a:ext uri="{ext}">"#,
                    r#"<asvg:svgBlip xmlns:asvg="{ns}" r:embed="{svg}"/></a:ext></a:extLst></a:blip>"#
                ),
                png = png,
                svg = svg,
                ext = SVG_BLIP_EXTENSION,
                ns = SVG_NAMESPACE,
            )
        };
        self.write_picture_frame(shape, &icon.name, &blip, None)
    }

    fn open_graphic_frame(&mut self, shape: &Shape, locks: &str) -> Result<()> {
        let xml = &mut self.xml;
        xml.push_str("<p:graphicFrame><p:nvGraphicFramePr>");
        non_visual(xml, shape, None)?;
        write!(xml, "<p:cNvGraphicFramePr>{locks}</p:cNvGraphicFramePr><p:nvPr/></p:nvGraphicFramePr>")?;
        write_xfrm(xml, "p:xfrm", &shape.geometry, shape.rotation)?;
        Ok(())
    }

    fn write_table(&mut self, shape: &Shape, table: &Table) -> Result<()> {
        self.open_graphic_frame(shape, r#"<a:graphicFrameLocks noGrp="1"/>"#)?;
        let xml = &mut self.xml;
        write!(
            xml,
            r#"<a:graphic><a:graphicData uri="{TABLE_URI}"><a:tbl><a:tblPr firstRow="1" bandRow="1"><a:tableStyleId>{TABLE_STYLE}</a:tableStyleId></a:tblPr><a:tblGrid>"#
        )?;
        for width in &table.column_widths {
            write!(xml, r#"<a:gridCol w="{width}"/>"#)?;
        }
        xml.push_str("</a:tblGrid>");
        for (idx, row) in table.rows.iter().enumerate() {
            let height = table.row_heights.get(idx).copied().unwrap_or_default();
            write!(xml, r#"<a:tr h="{height}">"#)?;
            for cell in row {
                xml.push_str("<a:tc>");
                write_text_body(xml, "a:txBody", &cell.body, None)?;
                match cell.fill {
                    Some(color) => {
                        xml.push_str("<a:tcPr>");
                        solid_fill(xml, color)?;
                        xml.push_str("</a:tcPr>");
                    }
                    None => xml.push_str("<a:tcPr/>"),
                }
                xml.push_str("</a:tc>");
            }
            xml.push_str("</a:tr>");
        }
        xml.push_str("</a:tbl></a:graphicData></a:graphic></p:graphicFrame>");
        Ok(())
    }

    fn write_chart(&mut self, shape: &Shape, chart: &Chart) -> Result<()> {
        let rid = self.add_chart_part(chart)?;
        self.open_graphic_frame(shape, "")?;
        write!(
            self.xml,
            concat!(
                r#"<a:graphic><a:graphicData uri="{uri}">"#,
                r#"<c:chart xmlns:c="{uri}" r:id="{rid}"/></a:graphicData></a:graphic></p:graphicFrame>"#
            ),
            uri = CHART_URI,
            rid = rid,
        )?;
        Ok(())
    }
}

fn presentation_xml(document: &Document) -> Result<String> {
    let mut xml = String::with_capacity(1024 + document.slides.len() * 64);
    xml.push_str(XML_DECLARATION);
    write!(xml, r#"<p:presentation {NAMESPACES} saveSubsetFonts="1">"#)?;
    xml.push_str(r#"<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>"#);
    if !document.slides.is_empty() {
        xml.push_str("<p:sldIdLst>");
        for idx in 0..document.slides.len() {
            write!(
                xml,
                r#"<p:sldId id="{}" r:id="rId{}"/>"#,
                FIRST_SLIDE_ID + idx,
                idx + 3
            )?;
        }
        xml.push_str("</p:sldIdLst>");
    }
    write!(
        xml,
        r#"<p:sldSz cx="{}" cy="{}"/>{NOTES_SIZE}"#,
        document.width, document.height
    )?;
    xml.push_str("</p:presentation>");
    Ok(xml)
}

/// Distinct layout names in first-use order; a deck without slides still
/// gets the blank layout.
fn layout_names(document: &Document) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for slide in &document.slides {
        if !names.contains(&slide.layout) {
            names.push(slide.layout.clone());
        }
    }
    if names.is_empty() {
        names.push("Blank".to_string());
    }
    names
}

/// Builds every part of the package for `document`.
pub fn build_package(document: &Document) -> Result<PackageBuilder> {
    let mut package = PackageBuilder::new();
    package.add_part("_rels/.rels", office_document_rels()?.into_bytes());

    let mut presentation_rels = RelationshipSet::default();
    presentation_rels.add(REL_SLIDE_MASTER, "slideMasters/slideMaster1.xml");
    presentation_rels.add(REL_THEME, "theme/theme1.xml");

    let layouts = layout_names(document);
    let layout_numbers: BTreeMap<&str, usize> = layouts
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx + 1))
        .collect();

    let mut counters = PartCounters::default();
    for (idx, slide) in document.slides.iter().enumerate() {
        let number = idx + 1;
        let layout = layout_numbers
            .get(slide.layout.as_str())
            .copied()
            .unwrap_or(1);
        let mut writer = SlideWriter::new(&mut package, &mut counters, layout);
        writer.write_slide(slide)?;
        let SlideWriter { rels, xml, .. } = writer;
        let part = format!("ppt/slides/slide{number}.xml");
        package.add_rels(&part, &rels)?;
        package.add_xml(part, CT_SLIDE, xml);
        presentation_rels.add(REL_SLIDE, format!("slides/slide{number}.xml"));
    }

    package.add_xml("ppt/presentation.xml", CT_PRESENTATION, presentation_xml(document)?);
    package.add_rels("ppt/presentation.xml", &presentation_rels)?;

    let master = "ppt/slideMasters/slideMaster1.xml";
    let mut master_rels = RelationshipSet::default();
    for (idx, name) in layouts.iter().enumerate() {
        let number = idx + 1;
        let part = format!("ppt/slideLayouts/slideLayout{number}.xml");
        let mut rels = RelationshipSet::default();
        rels.add(REL_SLIDE_MASTER, "../slideMasters/slideMaster1.xml");
        package.add_rels(&part, &rels)?;
        package.add_xml(part, CT_SLIDE_LAYOUT, templates::slide_layout(name)?);
        master_rels.add(
            REL_SLIDE_LAYOUT,
            format!("../slideLayouts/slideLayout{number}.xml"),
        );
    }
    master_rels.add(REL_THEME, "../theme/theme1.xml");
    package.add_xml(master, CT_SLIDE_MASTER, templates::slide_master(layouts.len())?);
    package.add_rels(master, &master_rels)?;
    package.add_xml("ppt/theme/theme1.xml", CT_THEME, templates::THEME.to_string());

    debug!(
        slides = document.slides.len(),
        layouts = layouts.len(),
        media = counters.media,
        charts = counters.charts,
        "built presentation package"
    );
    Ok(package)
}
