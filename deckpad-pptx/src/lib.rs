//! PowerPoint (`.pptx`) package codec for deckpad documents.

mod chart;
mod package;
mod reader;
mod templates;
mod writer;
mod xml;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use deckpad_core::backend::PackageCodec;
use deckpad_core::model::Document;
use tracing::{debug, instrument};

pub use reader::read_package;
pub use writer::build_package;

/// Reads and writes Office Open XML presentations.
#[derive(Debug, Default, Clone, Copy)]
pub struct PptxCodec;

impl PptxCodec {
    pub fn new() -> Self {
        Self
    }
}

impl PackageCodec for PptxCodec {
    #[instrument(skip(self))]
    fn load(&self, path: &Path) -> Result<Document> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let document = read_package(BufReader::new(file))
            .with_context(|| format!("failed to read presentation {}", path.display()))?;
        debug!(slides = document.slides.len(), "loaded presentation");
        Ok(document)
    }

    #[instrument(skip(self, document))]
    fn save(&self, document: &Document, path: &Path) -> Result<()> {
        let package = build_package(document)?;
        let file =
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = package
            .write(BufWriter::new(file))
            .with_context(|| format!("failed to write presentation {}", path.display()))?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use deckpad_core::content::{
        add_chart, add_image, add_shape, add_table, add_textbox, AutoShapeKind, ShapeStyleOptions,
        TextFormat,
    };
    use deckpad_core::model::{
        Bullet, ChartKind, ChartSeries, IconPicture, Paragraph, RunFormat, ShapeKind, Slide,
        TextRun,
    };
    use deckpad_core::modify::{modify_table_cell, CellFormat};
    use deckpad_core::resolve::{ShapeRef, TableRef};
    use deckpad_core::slides::{add_slide, add_slide_with_layout, SlideLayout};
    use deckpad_core::units::Placement;
    use deckpad_core::Rgb;
    use tempfile::tempdir;

    use super::*;
    use crate::package::{PackageBuilder, RelationshipSet, CT_PRESENTATION, CT_SLIDE, REL_SLIDE};

    fn round_trip(document: &Document) -> Document {
        let bytes = build_package(document)
            .unwrap()
            .write(Cursor::new(Vec::new()))
            .unwrap()
            .into_inner();
        read_package(Cursor::new(bytes)).unwrap()
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let file = File::create(path).unwrap();
        let mut encoder = png::Encoder::new(file, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer
            .write_image_data(&vec![90; (width * height * 4) as usize])
            .unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn text_runs_survive_a_save() {
        let mut doc = Document::new(12_192_000, 6_858_000);
        add_slide(&mut doc, None).unwrap();
        add_textbox(
            &mut doc,
            1,
            "unused",
            Placement::at(1.0, 1.0, 6.0, 1.5),
            &TextFormat::default(),
        )
        .unwrap();
        let bold_red = RunFormat {
            font: Some("Georgia".to_string()),
            size: Some(2400),
            bold: Some(true),
            color: Some(Rgb::new(0xC0, 0, 0)),
            ..RunFormat::default()
        };
        let shape = &mut doc.slides[0].shapes[0];
        shape.rotation = 15.0;
        shape.text_body_mut().unwrap().paragraphs = vec![
            Paragraph {
                runs: vec![
                    TextRun::plain("Net "),
                    TextRun::new("income <&> \"tax\"", bold_red.clone()),
                ],
                end_format: bold_red,
                ..Paragraph::default()
            },
            Paragraph {
                runs: vec![TextRun::plain("first\u{b}second")],
                bullet: Some(Bullet::Char('•')),
                level: 1,
                ..Paragraph::default()
            },
            Paragraph {
                bullet: Some(Bullet::AutoNumber("arabicPeriod".to_string())),
                ..Paragraph::default()
            },
        ];

        let loaded = round_trip(&doc);
        assert_eq!((loaded.width, loaded.height), (12_192_000, 6_858_000));
        let original = &doc.slides[0].shapes[0];
        let shape = &loaded.slides[0].shapes[0];
        assert_eq!(shape.id, original.id);
        assert_eq!(shape.name, original.name);
        assert_eq!(shape.geometry, original.geometry);
        assert_eq!(shape.rotation, 15.0);
        let body = shape.text_body().unwrap();
        assert_eq!(body.paragraphs[0], original.text_body().unwrap().paragraphs[0]);
        assert_eq!(body.text(), "Net income <&> \"tax\"\nfirst\u{b}second\n");
        assert_eq!(body.paragraphs[1].bullet, Some(Bullet::Char('•')));
        assert_eq!(body.paragraphs[1].level, 1);
        assert_eq!(
            body.paragraphs[2].bullet,
            Some(Bullet::AutoNumber("arabicPeriod".to_string()))
        );
    }

    #[test]
    fn every_shape_kind_survives_a_save() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("photo.png");
        write_png(&image, 40, 20);

        let mut doc = Document::default();
        add_slide(&mut doc, None).unwrap();
        add_slide(&mut doc, None).unwrap();
        doc.slides[1].layout = "Title Only".to_string();
        add_shape(
            &mut doc,
            1,
            AutoShapeKind::RoundedRectangle,
            Placement::default(),
            &ShapeStyleOptions {
                fill_color: Some(Rgb::new(0x11, 0x22, 0x33)),
                line_color: Some(Rgb::new(0, 0, 0)),
                line_width: Some(2.0),
                text: Some("Label".to_string()),
            },
        )
        .unwrap();
        add_image(&mut doc, 1, &image, Placement::default(), None, None).unwrap();
        let data = vec![
            vec!["Region".to_string(), "Sales".to_string()],
            vec!["North".to_string(), "12".to_string()],
        ];
        add_table(&mut doc, 2, 2, 2, Some(&data), Placement::default(), None).unwrap();
        modify_table_cell(
            &mut doc,
            2,
            &TableRef::Index(1),
            1,
            1,
            None,
            &CellFormat {
                fill_color: Some(Rgb::new(0xEE, 0xEE, 0xEE)),
                ..CellFormat::default()
            },
        )
        .unwrap();
        add_chart(
            &mut doc,
            2,
            ChartKind::Column,
            vec!["Q1".to_string(), "Q2".to_string()],
            vec![ChartSeries {
                name: "Revenue".to_string(),
                values: vec![3.0, 4.5],
            }],
            Placement::default(),
        )
        .unwrap();
        let slide = &mut doc.slides[1];
        let icon = slide.new_shape(
            deckpad_core::model::Geometry {
                left: 100,
                top: 100,
                width: 914_400,
                height: 914_400,
            },
            ShapeKind::Icon(IconPicture {
                name: "check".to_string(),
                color: Rgb::new(0x2F, 0x55, 0x97),
                svg: r##"<svg xmlns="http://www.w3.org/2000/svg" fill="#2F5597"/>"##.to_string(),
                png: vec![0x89, b'P', b'N', b'G'],
            }),
        )
        .unwrap();
        slide.shapes.push(icon);

        let loaded = round_trip(&doc);
        assert_eq!(loaded.slides.len(), 2);
        assert_eq!(loaded.slides[0].layout, "Blank");
        assert_eq!(loaded.slides[1].layout, "Title Only");
        for (before, after) in doc.slides.iter().zip(&loaded.slides) {
            assert_eq!(before.shapes.len(), after.shapes.len());
            for (a, b) in before.shapes.iter().zip(&after.shapes) {
                assert_eq!((a.id, &a.name, a.geometry), (b.id, &b.name, b.geometry));
                assert_eq!(a.kind.name(), b.kind.name());
                assert_eq!(a.style, b.style);
            }
        }
        let slide = &loaded.slides[0];
        match &slide.shapes[0].kind {
            ShapeKind::AutoShape(shape) => {
                assert_eq!(shape.preset, "roundRect");
                assert_eq!(shape.text.text(), "Label");
            }
            other => panic!("unexpected {other:?}"),
        }
        match (&doc.slides[0].shapes[1].kind, &slide.shapes[1].kind) {
            (ShapeKind::Picture(a), ShapeKind::Picture(b)) => {
                assert_eq!(a.data, b.data);
                assert_eq!(b.media.extension, "png");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(loaded.slides[1].shapes[0].kind, doc.slides[1].shapes[0].kind);
        assert_eq!(loaded.slides[1].shapes[1].kind, doc.slides[1].shapes[1].kind);
        assert_eq!(loaded.slides[1].shapes[2].kind, doc.slides[1].shapes[2].kind);
    }

    #[test]
    fn layout_placeholders_survive_a_save() {
        let mut doc = Document::default();
        add_slide_with_layout(&mut doc, None, SlideLayout::by_index(1).unwrap()).unwrap();
        let title = doc.slides[0].shapes[0].id;
        deckpad_core::modify::modify_shape(
            &mut doc,
            1,
            &ShapeRef::Id(title),
            &deckpad_core::modify::ShapeChanges {
                text: Some("Agenda".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let loaded = round_trip(&doc);
        let slide = &loaded.slides[0];
        assert_eq!(slide.layout, "Title and Content");
        assert_eq!(slide.title().as_deref(), Some("Agenda"));
        let kinds: Vec<_> = slide
            .shapes
            .iter()
            .map(|shape| shape.placeholder.clone())
            .collect();
        assert_eq!(kinds, vec![Some("title".to_string()), Some("body".to_string())]);
        assert_eq!(slide.shapes[1].geometry, doc.slides[0].shapes[1].geometry);
    }

    #[test]
    fn ids_keep_growing_after_reload() {
        let mut doc = Document::default();
        add_slide(&mut doc, None).unwrap();
        for _ in 0..3 {
            add_textbox(&mut doc, 1, "x", Placement::default(), &TextFormat::default()).unwrap();
        }
        doc.slides[0].shapes.remove(2);
        let mut loaded = round_trip(&doc);
        let id = add_textbox(&mut loaded, 1, "y", Placement::default(), &TextFormat::default())
            .unwrap()
            .id;
        assert_eq!(id, 4);
    }

    #[test]
    fn placeholders_inherit_layout_geometry_and_groups_flatten() {
        let ns = r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main""#;
        let layout = format!(
            r#"<p:sldLayout {ns}><p:cSld name="Title and Content"><p:spTree>
            <p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
            <p:spPr><a:xfrm><a:off x="838200" y="365125"/><a:ext cx="10515600" cy="1325563"/></a:xfrm></p:spPr></p:sp>
            </p:spTree></p:cSld></p:sldLayout>"#
        );
        let slide = format!(
            r#"<p:sld {ns}><p:cSld><p:spTree>
            <p:sp><p:nvSpPr><p:cNvPr id="2" name="Title 1"/><p:cNvSpPr/><p:nvPr><p:ph type="title"/></p:nvPr></p:nvSpPr>
            <p:spPr/><p:txBody><a:bodyPr/><a:p><a:r><a:t>Agenda</a:t></a:r></a:p></p:txBody></p:sp>
            <p:grpSp><p:nvGrpSpPr><p:cNvPr id="5" name="Group 4"/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr>
            <p:grpSpPr><a:xfrm><a:off x="1000" y="2000"/><a:ext cx="200" cy="200"/><a:chOff x="0" y="0"/><a:chExt cx="100" cy="100"/></a:xfrm></p:grpSpPr>
            <p:sp><p:nvSpPr><p:cNvPr id="6" name="Oval 5"/><p:cNvSpPr/><p:nvPr/></p:nvSpPr>
            <p:spPr><a:xfrm><a:off x="10" y="20"/><a:ext cx="50" cy="40"/></a:xfrm><a:prstGeom prst="ellipse"><a:avLst/></a:prstGeom></p:spPr></p:sp>
            </p:grpSp></p:spTree></p:cSld></p:sld>"#
        );
        let presentation = format!(
            r#"<p:presentation {ns}><p:sldIdLst><p:sldId id="256" r:id="rId7"/></p:sldIdLst><p:sldSz cx="12192000" cy="6858000"/></p:presentation>"#
        );

        let mut package = PackageBuilder::new();
        package.add_part("_rels/.rels", crate::package::office_document_rels().unwrap().into_bytes());
        let mut rels = RelationshipSet::default();
        for _ in 0..6 {
            rels.add("urn:unused", "unused.xml");
        }
        rels.add(REL_SLIDE, "slides/slide1.xml");
        package.add_rels("ppt/presentation.xml", &rels).unwrap();
        package.add_xml("ppt/presentation.xml", CT_PRESENTATION, presentation);
        let mut slide_rels = RelationshipSet::default();
        slide_rels.add(
            crate::package::REL_SLIDE_LAYOUT,
            "../slideLayouts/slideLayout2.xml",
        );
        package.add_rels("ppt/slides/slide1.xml", &slide_rels).unwrap();
        package.add_xml("ppt/slides/slide1.xml", CT_SLIDE, slide);
        package.add_part("ppt/slideLayouts/slideLayout2.xml", layout.into_bytes());
        let bytes = package.write(Cursor::new(Vec::new())).unwrap().into_inner();

        let doc = read_package(Cursor::new(bytes)).unwrap();
        let slide: &Slide = &doc.slides[0];
        assert_eq!(slide.layout, "Title and Content");
        assert_eq!(slide.title().as_deref(), Some("Agenda"));
        let title = &slide.shapes[0];
        assert_eq!(title.kind.name(), "text_box");
        assert_eq!(
            (title.geometry.left, title.geometry.width),
            (838_200, 10_515_600)
        );
        let oval = &slide.shapes[1];
        assert_eq!(oval.id, 6);
        assert_eq!(
            (oval.geometry.left, oval.geometry.top, oval.geometry.width, oval.geometry.height),
            (1020, 2040, 100, 80)
        );
        let by_name = deckpad_core::resolve::resolve_shape(
            &doc,
            1,
            &ShapeRef::Name("Oval 5".to_string()),
        )
        .unwrap();
        assert_eq!(by_name.id, 6);
    }

    #[test]
    fn codec_writes_and_reads_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deck.pptx");
        let mut doc = Document::default();
        add_slide(&mut doc, None).unwrap();
        add_textbox(&mut doc, 1, "Hello", Placement::default(), &TextFormat::default()).unwrap();
        let codec = PptxCodec::new();
        codec.save(&doc, &path).unwrap();
        let loaded = codec.load(&path).unwrap();
        assert_eq!(loaded.slides[0].shapes[0].text_body().unwrap().text(), "Hello");
        assert!(codec.load(&dir.path().join("missing.pptx")).is_err());
    }
}
