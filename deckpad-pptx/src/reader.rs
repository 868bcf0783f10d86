//! Builds a [`Document`] from a presentation package.

use std::collections::HashMap;
use std::io::{Read, Seek};

use anyhow::{anyhow, Context, Result};
use deckpad_core::model::{
    Alignment, AutoShape, Bullet, Crop, Document, Geometry, IconPicture, LineStyle, MediaType,
    Paragraph, Picture, RunFormat, Shape, ShapeKind, ShapeStyle, Slide, Table, TableCell,
    TextBody, TextRun,
};
use deckpad_core::units::{DEFAULT_SLIDE_HEIGHT, DEFAULT_SLIDE_WIDTH};
use deckpad_core::Rgb;
use tracing::{debug, warn};

use crate::chart::parse_chart;
use crate::package::{
    resolve_target, Package, Relationship, REL_OFFICE_DOCUMENT, REL_SLIDE_LAYOUT,
    REL_SLIDE_MASTER,
};
use crate::xml::Element;

const LINE_BREAK: char = '\u{b}';

/// Geometry a slide placeholder inherits when it carries no `a:xfrm`.
#[derive(Debug, Clone)]
struct InheritedSlot {
    kind: String,
    index: Option<String>,
    geometry: Geometry,
}

#[derive(Debug, Clone, Default)]
struct LayoutInfo {
    name: String,
    slots: Vec<InheritedSlot>,
    master_slots: Vec<InheritedSlot>,
}

impl LayoutInfo {
    fn inherited(&self, kind: &str, index: Option<&str>) -> Option<Geometry> {
        let by_index = index.and_then(|index| {
            self.slots
                .iter()
                .find(|slot| slot.index.as_deref() == Some(index))
        });
        by_index
            .or_else(|| self.slots.iter().find(|slot| same_slot_kind(&slot.kind, kind)))
            .or_else(|| {
                self.master_slots
                    .iter()
                    .find(|slot| same_slot_kind(&slot.kind, kind))
            })
            .map(|slot| slot.geometry)
    }
}

fn slot_family(kind: &str) -> &str {
    match kind {
        "ctrTitle" => "title",
        "subTitle" | "obj" => "body",
        other => other,
    }
}

fn same_slot_kind(a: &str, b: &str) -> bool {
    slot_family(a) == slot_family(b)
}

/// Child-to-slide coordinate mapping of an enclosing group.
#[derive(Debug, Clone, Copy)]
struct GroupTransform {
    offset: (i64, i64),
    child_offset: (i64, i64),
    scale: (f64, f64),
}

impl GroupTransform {
    fn identity() -> Self {
        Self {
            offset: (0, 0),
            child_offset: (0, 0),
            scale: (1.0, 1.0),
        }
    }

    fn apply(&self, geometry: Geometry) -> Geometry {
        let map = |value: i64, child: i64, offset: i64, scale: f64| {
            offset + ((value - child) as f64 * scale).round() as i64
        };
        Geometry {
            left: map(geometry.left, self.child_offset.0, self.offset.0, self.scale.0),
            top: map(geometry.top, self.child_offset.1, self.offset.1, self.scale.1),
            width: (geometry.width as f64 * self.scale.0).round() as i64,
            height: (geometry.height as f64 * self.scale.1).round() as i64,
        }
    }

    fn nest(&self, group: &Element) -> Self {
        let Some(xfrm) = group.path(&["grpSpPr", "xfrm"]) else {
            return *self;
        };
        let pair = |name: &str, x: &str, y: &str| {
            xfrm.child(name).map(|element| {
                (
                    element.parse_attr::<i64>(x).unwrap_or(0),
                    element.parse_attr::<i64>(y).unwrap_or(0),
                )
            })
        };
        let offset = pair("off", "x", "y").unwrap_or((0, 0));
        let extent = pair("ext", "cx", "cy").unwrap_or((0, 0));
        let child_offset = pair("chOff", "x", "y").unwrap_or(offset);
        let child_extent = pair("chExt", "cx", "cy").unwrap_or(extent);
        let ratio = |outer: i64, inner: i64| {
            if inner == 0 {
                1.0
            } else {
                outer as f64 / inner as f64
            }
        };
        let local = Self {
            offset,
            child_offset,
            scale: (ratio(extent.0, child_extent.0), ratio(extent.1, child_extent.1)),
        };
        // Compose: the group's own frame lives in the parent's child space.
        let outer = self.apply(Geometry {
            left: local.offset.0,
            top: local.offset.1,
            width: 0,
            height: 0,
        });
        Self {
            offset: (outer.left, outer.top),
            child_offset: local.child_offset,
            scale: (local.scale.0 * self.scale.0, local.scale.1 * self.scale.1),
        }
    }
}

fn xfrm_geometry(xfrm: &Element) -> Option<Geometry> {
    let off = xfrm.child("off")?;
    let ext = xfrm.child("ext")?;
    Some(Geometry {
        left: off.parse_attr("x").unwrap_or(0),
        top: off.parse_attr("y").unwrap_or(0),
        width: ext.parse_attr("cx").unwrap_or(0),
        height: ext.parse_attr("cy").unwrap_or(0),
    })
}

fn rotation(xfrm: Option<&Element>) -> f64 {
    xfrm.and_then(|xfrm| xfrm.parse_attr::<f64>("rot"))
        .map(|rot| rot / 60_000.0)
        .unwrap_or(0.0)
}

fn srgb(fill: &Element) -> Option<Rgb> {
    fill.child("srgbClr")?.attr("val")?.parse().ok()
}

fn solid_fill(parent: &Element) -> Option<Rgb> {
    srgb(parent.child("solidFill")?)
}

fn run_format(properties: Option<&Element>) -> RunFormat {
    let Some(rpr) = properties else {
        return RunFormat::default();
    };
    RunFormat {
        font: rpr
            .child("latin")
            .and_then(|latin| latin.attr("typeface"))
            .map(str::to_string),
        size: rpr.parse_attr("sz"),
        bold: rpr.flag("b"),
        italic: rpr.flag("i"),
        underline: rpr.attr("u").map(|value| value != "none"),
        color: solid_fill(rpr),
    }
}

fn alignment(code: &str) -> Option<Alignment> {
    match code {
        "l" => Some(Alignment::Left),
        "ctr" => Some(Alignment::Center),
        "r" => Some(Alignment::Right),
        "just" | "justLow" | "dist" => Some(Alignment::Justify),
        _ => None,
    }
}

fn bullet(properties: &Element) -> Option<Bullet> {
    if properties.child("buNone").is_some() {
        return Some(Bullet::Disabled);
    }
    if let Some(c) = properties
        .child("buChar")
        .and_then(|bullet| bullet.attr("char"))
        .and_then(|value| value.chars().next())
    {
        return Some(Bullet::Char(c));
    }
    properties
        .child("buAutoNum")
        .map(|number| Bullet::AutoNumber(number.attr("type").unwrap_or("arabicPeriod").to_string()))
}

fn parse_paragraph(element: &Element) -> Paragraph {
    let properties = element.child("pPr");
    let mut runs = Vec::new();
    for child in element.elements() {
        match child.name.as_str() {
            "r" | "fld" => {
                let text = child.child("t").map(Element::text).unwrap_or_default();
                runs.push(TextRun::new(text, run_format(child.child("rPr"))));
            }
            "br" => runs.push(TextRun::new(
                LINE_BREAK.to_string(),
                run_format(child.child("rPr")),
            )),
            _ => {}
        }
    }
    Paragraph {
        runs,
        alignment: properties
            .and_then(|ppr| ppr.attr("algn"))
            .and_then(alignment),
        level: properties
            .and_then(|ppr| ppr.parse_attr("lvl"))
            .unwrap_or(0),
        bullet: properties.and_then(bullet),
        end_format: run_format(element.child("endParaRPr")),
    }
}

fn parse_text_body(element: Option<&Element>) -> TextBody {
    let Some(body) = element else {
        return TextBody::default();
    };
    let paragraphs: Vec<Paragraph> = body.children("p").map(parse_paragraph).collect();
    let mut text = if paragraphs.is_empty() {
        TextBody::default()
    } else {
        TextBody::from_paragraphs(paragraphs)
    };
    text.word_wrap = body
        .child("bodyPr")
        .and_then(|props| props.attr("wrap"))
        != Some("none");
    text
}

fn shape_style(properties: Option<&Element>) -> ShapeStyle {
    let Some(sppr) = properties else {
        return ShapeStyle::default();
    };
    let line = sppr.child("ln").and_then(|ln| {
        let style = LineStyle {
            color: solid_fill(ln),
            width: ln.parse_attr("w"),
        };
        (style.color.is_some() || style.width.is_some()).then_some(style)
    });
    ShapeStyle {
        fill: solid_fill(sppr),
        line,
    }
}

/// First `fill="#RRGGBB"` in a recolored icon.
fn icon_color(svg: &str) -> Rgb {
    svg.match_indices("fill=\"#")
        .find_map(|(at, marker)| {
            let start = at + marker.len();
            svg.get(start..start + 6)?.parse().ok()
        })
        .unwrap_or(Rgb::new(0, 0, 0))
}

struct SlideReader<'a, R> {
    package: &'a mut Package<R>,
    part: String,
    rels: HashMap<String, Relationship>,
    layout: &'a LayoutInfo,
}

impl<'a, R: Read + Seek> SlideReader<'a, R> {
    fn related_part(&self, id: &str) -> Result<String> {
        let rel = self
            .rels
            .get(id)
            .ok_or_else(|| anyhow!("{} references unknown relationship {id}", self.part))?;
        Ok(resolve_target(&self.part, &rel.target))
    }

    fn read_tree(&mut self, tree: &Element, transform: GroupTransform, shapes: &mut Vec<Shape>) -> Result<()> {
        for element in tree.elements() {
            let shape = match element.name.as_str() {
                "sp" | "cxnSp" => self.read_sp(element, &transform),
                "pic" => self.read_pic(element, &transform),
                "graphicFrame" => self.read_graphic_frame(element, &transform),
                "grpSp" => {
                    debug!(part = %self.part, "flattening group shape");
                    self.read_tree(element, transform.nest(element), shapes)?;
                    continue;
                }
                "AlternateContent" => {
                    if let Some(choice) = element.child("Fallback").or_else(|| element.child("Choice")) {
                        self.read_tree(choice, transform, shapes)?;
                    }
                    continue;
                }
                _ => continue,
            };
            match shape {
                Ok(Some(shape)) => shapes.push(shape),
                Ok(None) => {}
                Err(err) => warn!(?err, part = %self.part, "skipping unreadable shape"),
            }
        }
        Ok(())
    }

    fn identity(element: &Element, container: &str) -> Result<(u32, String, String)> {
        let c_nv_pr = element
            .path(&[container, "cNvPr"])
            .ok_or_else(|| anyhow!("shape without cNvPr"))?;
        let id = c_nv_pr
            .parse_attr("id")
            .ok_or_else(|| anyhow!("shape without a numeric id"))?;
        Ok((
            id,
            c_nv_pr.attr("name").unwrap_or_default().to_string(),
            c_nv_pr.attr("descr").unwrap_or_default().to_string(),
        ))
    }

    fn read_sp(&mut self, element: &Element, transform: &GroupTransform) -> Result<Option<Shape>> {
        let container = if element.name == "cxnSp" { "nvCxnSpPr" } else { "nvSpPr" };
        let (id, name, _) = Self::identity(element, container)?;
        let non_visual = element.child(container);
        let placeholder = non_visual.and_then(|nv| nv.path(&["nvPr", "ph"]));
        let placeholder_kind =
            placeholder.map(|ph| ph.attr("type").unwrap_or("obj").to_string());
        let text_box = non_visual
            .and_then(|nv| nv.child("cNvSpPr"))
            .and_then(|props| props.flag("txBox"))
            .unwrap_or(false);

        let properties = element.child("spPr");
        let xfrm = properties.and_then(|sppr| sppr.child("xfrm"));
        let geometry = match xfrm.and_then(xfrm_geometry) {
            Some(geometry) => transform.apply(geometry),
            None => match &placeholder_kind {
                Some(kind) => self
                    .layout
                    .inherited(kind, placeholder.and_then(|ph| ph.attr("idx")))
                    .unwrap_or_default(),
                None => Geometry::default(),
            },
        };
        let preset = properties
            .and_then(|sppr| sppr.child("prstGeom"))
            .and_then(|geom| geom.attr("prst"));
        let body = parse_text_body(element.child("txBody"));

        let kind = if text_box || (placeholder_kind.is_some() && matches!(preset, None | Some("rect"))) {
            ShapeKind::TextBox(body)
        } else {
            ShapeKind::AutoShape(AutoShape {
                preset: preset.unwrap_or("rect").to_string(),
                text: body,
            })
        };
        Ok(Some(Shape {
            id,
            name,
            geometry,
            rotation: rotation(xfrm),
            style: shape_style(properties),
            placeholder: placeholder_kind,
            kind,
        }))
    }

    fn read_pic(&mut self, element: &Element, transform: &GroupTransform) -> Result<Option<Shape>> {
        let (id, name, description) = Self::identity(element, "nvPicPr")?;
        let fill = element
            .child("blipFill")
            .ok_or_else(|| anyhow!("picture {id} has no blipFill"))?;
        let Some(blip) = fill.child("blip") else {
            return Ok(None);
        };
        let Some(embed) = blip.attr("r:embed") else {
            warn!(part = %self.part, id, "skipping linked picture");
            return Ok(None);
        };
        let target = self.related_part(embed)?;
        let data = self.package.part(&target)?;
        let media = target
            .rsplit_once('.')
            .and_then(|(_, extension)| MediaType::from_extension(extension))
            .unwrap_or_else(|| MediaType::new("bin", "application/octet-stream"));

        let properties = element.child("spPr");
        let xfrm = properties.and_then(|sppr| sppr.child("xfrm"));
        let geometry = xfrm
            .and_then(xfrm_geometry)
            .map(|geometry| transform.apply(geometry))
            .unwrap_or_default();

        let svg_blip = blip
            .child("extLst")
            .into_iter()
            .flat_map(|list| list.children("ext"))
            .find_map(|ext| ext.child("svgBlip"))
            .and_then(|svg| svg.attr("r:embed"));
        let kind = match svg_blip {
            Some(svg_embed) => {
                let svg_part = self.related_part(svg_embed)?;
                let svg = String::from_utf8_lossy(&self.package.part(&svg_part)?).into_owned();
                ShapeKind::Icon(IconPicture {
                    name: description,
                    color: icon_color(&svg),
                    svg,
                    png: data,
                })
            }
            None => {
                let crop = fill
                    .child("srcRect")
                    .map(|rect| {
                        let edge = |name: &str| rect.parse_attr::<f64>(name).unwrap_or(0.0) / 100_000.0;
                        Crop {
                            left: edge("l"),
                            top: edge("t"),
                            right: edge("r"),
                            bottom: edge("b"),
                        }
                    })
                    .unwrap_or_default();
                ShapeKind::Picture(Picture {
                    data,
                    media,
                    crop,
                    description,
                })
            }
        };
        Ok(Some(Shape {
            id,
            name,
            geometry,
            rotation: rotation(xfrm),
            style: shape_style(properties),
            placeholder: None,
            kind,
        }))
    }

    fn read_graphic_frame(&mut self, element: &Element, transform: &GroupTransform) -> Result<Option<Shape>> {
        let (id, name, _) = Self::identity(element, "nvGraphicFramePr")?;
        let xfrm = element.child("xfrm");
        let geometry = xfrm
            .and_then(xfrm_geometry)
            .map(|geometry| transform.apply(geometry))
            .unwrap_or_default();
        let data = element
            .path(&["graphic", "graphicData"])
            .ok_or_else(|| anyhow!("graphic frame {id} has no graphicData"))?;

        let kind = if let Some(table) = data.child("tbl") {
            ShapeKind::Table(parse_table(table))
        } else if let Some(chart) = data.child("chart") {
            let rid = chart
                .attr("r:id")
                .ok_or_else(|| anyhow!("chart frame {id} has no relationship"))?;
            let part = self.related_part(rid)?;
            let root = self.package.xml(&part)?;
            ShapeKind::Chart(parse_chart(&root).with_context(|| format!("failed to read {part}"))?)
        } else {
            warn!(
                part = %self.part,
                id,
                uri = data.attr("uri").unwrap_or_default(),
                "skipping unsupported graphic frame"
            );
            return Ok(None);
        };
        Ok(Some(Shape {
            id,
            name,
            geometry,
            rotation: rotation(xfrm),
            style: ShapeStyle::default(),
            placeholder: None,
            kind,
        }))
    }
}

fn parse_table(table: &Element) -> Table {
    let mut column_widths: Vec<i64> = table
        .child("tblGrid")
        .into_iter()
        .flat_map(|grid| grid.children("gridCol"))
        .map(|column| column.parse_attr("w").unwrap_or(0))
        .collect();
    let mut rows = Vec::new();
    let mut row_heights = Vec::new();
    for row in table.children("tr") {
        row_heights.push(row.parse_attr("h").unwrap_or(0));
        let cells: Vec<TableCell> = row
            .children("tc")
            .map(|cell| TableCell {
                body: parse_text_body(cell.child("txBody")),
                fill: cell.child("tcPr").and_then(solid_fill),
            })
            .collect();
        rows.push(cells);
    }
    // short rows are padded; extra cells widen the grid
    let widest = rows.iter().map(Vec::len).max().unwrap_or(0);
    if column_widths.len() < widest {
        column_widths.resize(widest, 0);
    }
    for row in &mut rows {
        row.resize_with(column_widths.len(), || TableCell::with_text(""));
    }
    Table {
        rows,
        column_widths,
        row_heights,
    }
}

fn placeholder_slots(root: &Element) -> Vec<InheritedSlot> {
    let Some(tree) = root.path(&["cSld", "spTree"]) else {
        return Vec::new();
    };
    tree.children("sp")
        .filter_map(|sp| {
            let ph = sp.path(&["nvSpPr", "nvPr", "ph"])?;
            let geometry = sp.path(&["spPr", "xfrm"]).and_then(xfrm_geometry)?;
            Some(InheritedSlot {
                kind: ph.attr("type").unwrap_or("obj").to_string(),
                index: ph.attr("idx").map(str::to_string),
                geometry,
            })
        })
        .collect()
}

fn find_relationship<'r>(rels: &'r [Relationship], kind: &str) -> Option<&'r Relationship> {
    rels.iter().find(|rel| rel.kind == kind)
}

fn read_layout<R: Read + Seek>(package: &mut Package<R>, part: &str) -> Result<LayoutInfo> {
    let root = package.xml(part)?;
    let mut info = LayoutInfo {
        name: root
            .child("cSld")
            .and_then(|csld| csld.attr("name"))
            .unwrap_or("Blank")
            .to_string(),
        slots: placeholder_slots(&root),
        master_slots: Vec::new(),
    };
    let rels = package.relationships(part)?;
    if let Some(master) = find_relationship(&rels, REL_SLIDE_MASTER) {
        let master_part = resolve_target(part, &master.target);
        match package.xml(&master_part) {
            Ok(master) => info.master_slots = placeholder_slots(&master),
            Err(err) => warn!(?err, part = %master_part, "ignoring unreadable slide master"),
        }
    }
    Ok(info)
}

/// Reads every slide the presentation lists, in presentation order.
pub fn read_package<R: Read + Seek>(reader: R) -> Result<Document> {
    let mut package = Package::new(reader)?;
    let root_rels = package.relationships("")?;
    let presentation_part = find_relationship(&root_rels, REL_OFFICE_DOCUMENT)
        .map(|rel| resolve_target("", &rel.target))
        .unwrap_or_else(|| "ppt/presentation.xml".to_string());

    let presentation = package.xml(&presentation_part)?;
    let size = presentation.child("sldSz");
    let width = size
        .and_then(|size| size.parse_attr("cx"))
        .unwrap_or(DEFAULT_SLIDE_WIDTH);
    let height = size
        .and_then(|size| size.parse_attr("cy"))
        .unwrap_or(DEFAULT_SLIDE_HEIGHT);
    let mut document = Document::new(width, height);

    let presentation_rels: HashMap<String, Relationship> = package
        .relationships(&presentation_part)?
        .into_iter()
        .map(|rel| (rel.id.clone(), rel))
        .collect();
    let slide_ids: Vec<String> = presentation
        .child("sldIdLst")
        .into_iter()
        .flat_map(|list| list.children("sldId"))
        .filter_map(|id| id.attr("r:id").map(str::to_string))
        .collect();

    let mut layouts: HashMap<String, LayoutInfo> = HashMap::new();
    for rid in slide_ids {
        let rel = presentation_rels
            .get(&rid)
            .ok_or_else(|| anyhow!("presentation references unknown slide {rid}"))?;
        let part = resolve_target(&presentation_part, &rel.target);
        let root = package.xml(&part)?;
        let rels = package.relationships(&part)?;

        let layout = match find_relationship(&rels, REL_SLIDE_LAYOUT) {
            Some(layout_rel) => {
                let layout_part = resolve_target(&part, &layout_rel.target);
                if !layouts.contains_key(&layout_part) {
                    let info = read_layout(&mut package, &layout_part).unwrap_or_else(|err| {
                        warn!(?err, part = %layout_part, "ignoring unreadable slide layout");
                        LayoutInfo {
                            name: "Blank".to_string(),
                            ..LayoutInfo::default()
                        }
                    });
                    layouts.insert(layout_part.clone(), info);
                }
                layouts.get(&layout_part).cloned().unwrap_or_default()
            }
            None => LayoutInfo {
                name: "Blank".to_string(),
                ..LayoutInfo::default()
            },
        };

        let mut shapes = Vec::new();
        if let Some(tree) = root.path(&["cSld", "spTree"]) {
            let mut reader = SlideReader {
                package: &mut package,
                part: part.clone(),
                rels: rels.into_iter().map(|rel| (rel.id.clone(), rel)).collect(),
                layout: &layout,
            };
            reader.read_tree(tree, GroupTransform::identity(), &mut shapes)?;
        }
        debug!(part = %part, shapes = shapes.len(), "read slide");
        document
            .slides
            .push(Slide::from_shapes(layout.name.clone(), shapes));
    }
    Ok(document)
}
