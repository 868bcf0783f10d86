use serde::Serialize;
use tracing::instrument;

use crate::error::{DeckError, DeckResult};
use crate::model::{Document, Geometry, Shape, ShapeKind, Slide, TextBody};
use crate::resolve::{resolve_slide, slide_index};
use crate::units::{emu_to_inches, DEFAULT_SLIDE_HEIGHT, DEFAULT_SLIDE_WIDTH, EMU_PER_INCH};

/// Result of a slide-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideChange {
    pub action: &'static str,
    /// Where the affected slide ended up, 1-based; absent after a delete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slide: Option<usize>,
    pub slide_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<&'static str>,
}

fn insertion_index(doc: &Document, position: Option<usize>) -> DeckResult<usize> {
    let count = doc.slides.len();
    match position {
        None => Ok(count),
        Some(number) if number >= 1 && number <= count + 1 => Ok(number - 1),
        Some(number) => Err(DeckError::SlideIndex {
            number,
            count: count + 1,
        }),
    }
}

/// One placeholder a layout puts on a new slide. The frame is in inches on
/// a 10 x 7.5 in slide and scales with the document's slide size.
#[derive(Debug)]
struct LayoutSlot {
    kind: &'static str,
    label: &'static str,
    frame: [f64; 4],
}

const fn slot(kind: &'static str, label: &'static str, frame: [f64; 4]) -> LayoutSlot {
    LayoutSlot { kind, label, frame }
}

const TITLE: LayoutSlot = slot("title", "Title", [0.5, 0.3, 9.0, 1.25]);

#[derive(Debug)]
pub struct SlideLayout {
    pub name: &'static str,
    slots: &'static [LayoutSlot],
}

/// Built-in layouts, addressed by position or name.
pub static LAYOUTS: [SlideLayout; 9] = [
    SlideLayout {
        name: "Title Slide",
        slots: &[
            slot("ctrTitle", "Title", [0.75, 2.33, 8.5, 1.61]),
            slot("subTitle", "Subtitle", [1.5, 4.25, 7.0, 1.92]),
        ],
    },
    SlideLayout {
        name: "Title and Content",
        slots: &[TITLE, slot("body", "Content Placeholder", [0.5, 1.75, 9.0, 4.95])],
    },
    SlideLayout {
        name: "Section Header",
        slots: &[
            slot("title", "Title", [0.79, 4.82, 8.5, 1.49]),
            slot("body", "Text Placeholder", [0.79, 3.18, 8.5, 1.64]),
        ],
    },
    SlideLayout {
        name: "Two Content",
        slots: &[
            TITLE,
            slot("body", "Content Placeholder", [0.5, 1.75, 4.42, 4.95]),
            slot("body", "Content Placeholder", [5.08, 1.75, 4.42, 4.95]),
        ],
    },
    SlideLayout {
        name: "Comparison",
        slots: &[
            TITLE,
            slot("body", "Text Placeholder", [0.5, 1.68, 4.42, 0.7]),
            slot("body", "Content Placeholder", [0.5, 2.38, 4.42, 4.32]),
            slot("body", "Text Placeholder", [5.08, 1.68, 4.42, 0.7]),
            slot("body", "Content Placeholder", [5.08, 2.38, 4.42, 4.32]),
        ],
    },
    SlideLayout {
        name: "Title Only",
        slots: &[TITLE],
    },
    SlideLayout {
        name: "Blank",
        slots: &[],
    },
    SlideLayout {
        name: "Content with Caption",
        slots: &[
            slot("title", "Title", [0.5, 0.3, 3.29, 1.27]),
            slot("body", "Content Placeholder", [3.91, 0.3, 5.59, 6.4]),
            slot("body", "Text Placeholder", [0.5, 1.57, 3.29, 5.13]),
        ],
    },
    SlideLayout {
        name: "Picture with Caption",
        slots: &[
            slot("title", "Title", [1.96, 5.25, 6.0, 0.62]),
            slot("body", "Text Placeholder", [1.96, 5.87, 6.0, 0.88]),
        ],
    },
];

/// Index of "Blank" in [`LAYOUTS`].
pub const BLANK_LAYOUT: usize = 6;

impl SlideLayout {
    pub fn by_index(index: usize) -> DeckResult<&'static SlideLayout> {
        LAYOUTS.get(index).ok_or_else(|| {
            DeckError::invalid(format!(
                "layout index {index} is out of range; available: {}",
                layout_listing()
            ))
        })
    }

    /// Case-insensitive lookup.
    pub fn by_name(name: &str) -> DeckResult<&'static SlideLayout> {
        LAYOUTS
            .iter()
            .find(|layout| layout.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| {
                DeckError::invalid(format!(
                    "unknown layout '{name}'; available: {}",
                    layout_listing()
                ))
            })
    }

    fn build(&self, doc: &Document) -> DeckResult<Slide> {
        let scale_x = doc.width as f64 / DEFAULT_SLIDE_WIDTH as f64;
        let scale_y = doc.height as f64 / DEFAULT_SLIDE_HEIGHT as f64;
        let emu = |inches: f64, scale: f64| (inches * scale * EMU_PER_INCH as f64).round() as i64;

        let mut slide = Slide::new(self.name);
        for slot in self.slots {
            let [left, top, width, height] = slot.frame;
            let geometry = Geometry {
                left: emu(left, scale_x),
                top: emu(top, scale_y),
                width: emu(width, scale_x).max(1),
                height: emu(height, scale_y).max(1),
            };
            let mut shape = slide.new_shape(geometry, ShapeKind::TextBox(TextBody::default()))?;
            shape.name = format!("{} {}", slot.label, shape.id - 1);
            shape.placeholder = Some(slot.kind.to_string());
            slide.shapes.push(shape);
        }
        Ok(slide)
    }
}

fn layout_listing() -> String {
    LAYOUTS
        .iter()
        .enumerate()
        .map(|(idx, layout)| format!("{idx}={}", layout.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Appends (or inserts at `position`) an empty slide on the blank layout.
#[instrument(skip(doc))]
pub fn add_slide(doc: &mut Document, position: Option<usize>) -> DeckResult<SlideChange> {
    add_slide_with_layout(doc, position, &LAYOUTS[BLANK_LAYOUT])
}

/// Inserts a slide carrying the layout's empty placeholders.
#[instrument(skip(doc, layout), fields(layout = layout.name))]
pub fn add_slide_with_layout(
    doc: &mut Document,
    position: Option<usize>,
    layout: &'static SlideLayout,
) -> DeckResult<SlideChange> {
    let idx = insertion_index(doc, position)?;
    let slide = layout.build(doc)?;
    doc.slides.insert(idx, slide);
    Ok(SlideChange {
        action: "added",
        slide: Some(idx + 1),
        slide_count: doc.slides.len(),
        layout: Some(layout.name),
    })
}

/// Removes a slide; later slides move up by one.
#[instrument(skip(doc))]
pub fn delete_slide(doc: &mut Document, number: usize) -> DeckResult<SlideChange> {
    let idx = slide_index(doc, number)?;
    doc.slides.remove(idx);
    Ok(SlideChange {
        action: "deleted",
        slide: None,
        slide_count: doc.slides.len(),
        layout: None,
    })
}

/// Copies a slide with all of its shapes. Shape ids carry over unchanged.
#[instrument(skip(doc))]
pub fn duplicate_slide(
    doc: &mut Document,
    number: usize,
    position: Option<usize>,
) -> DeckResult<SlideChange> {
    let idx = slide_index(doc, number)?;
    let target = match position {
        None => idx + 1,
        Some(_) => insertion_index(doc, position)?,
    };
    let copy = doc.slides[idx].clone();
    doc.slides.insert(target, copy);
    Ok(SlideChange {
        action: "duplicated",
        slide: Some(target + 1),
        slide_count: doc.slides.len(),
        layout: None,
    })
}

#[instrument(skip(doc))]
pub fn move_slide(doc: &mut Document, from: usize, to: usize) -> DeckResult<SlideChange> {
    let source = slide_index(doc, from)?;
    let target = slide_index(doc, to)?;
    let slide = doc.slides.remove(source);
    doc.slides.insert(target, slide);
    Ok(SlideChange {
        action: "moved",
        slide: Some(target + 1),
        slide_count: doc.slides.len(),
        layout: None,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapeSnapshot {
    pub id: u32,
    pub name: String,
    pub kind: &'static str,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<TableDimensions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Small, roughly square shapes are candidates for `insert_icon` with `replace`.
    pub icon_placeholder: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TableDimensions {
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideSnapshot {
    pub slide: usize,
    pub slide_count: usize,
    pub layout: String,
    pub shapes: Vec<ShapeSnapshot>,
}

const ICON_PLACEHOLDER_MAX_SIDE: i64 = EMU_PER_INCH * 3 / 2;
const ICON_PLACEHOLDER_MIN_RATIO: f64 = 0.8;

fn looks_like_icon_slot(shape: &Shape) -> bool {
    if matches!(shape.kind, ShapeKind::Table(_) | ShapeKind::Chart(_)) {
        return false;
    }
    let (w, h) = (shape.geometry.width, shape.geometry.height);
    if w <= 0 || h <= 0 || w > ICON_PLACEHOLDER_MAX_SIDE || h > ICON_PLACEHOLDER_MAX_SIDE {
        return false;
    }
    w.min(h) as f64 / w.max(h) as f64 >= ICON_PLACEHOLDER_MIN_RATIO
}

fn list_format(shape: &Shape) -> Option<String> {
    shape
        .text_body()?
        .paragraphs
        .iter()
        .find_map(|paragraph| paragraph.bullet.as_ref())
        .map(|bullet| bullet.describe())
}

pub fn shape_snapshot(shape: &Shape) -> ShapeSnapshot {
    ShapeSnapshot {
        id: shape.id,
        name: shape.name.clone(),
        kind: shape.kind.name(),
        left: emu_to_inches(shape.geometry.left),
        top: emu_to_inches(shape.geometry.top),
        width: emu_to_inches(shape.geometry.width),
        height: emu_to_inches(shape.geometry.height),
        rotation: shape.rotation,
        placeholder: shape.placeholder.clone(),
        text: shape.text_body().map(|body| body.text()),
        list_format: list_format(shape),
        table: shape.table().map(|table| TableDimensions {
            rows: table.row_count(),
            columns: table.column_count(),
        }),
        chart: match &shape.kind {
            ShapeKind::Chart(chart) => Some(chart.kind.name()),
            _ => None,
        },
        icon: match &shape.kind {
            ShapeKind::Icon(icon) => Some(icon.name.clone()),
            _ => None,
        },
        icon_placeholder: looks_like_icon_slot(shape),
    }
}

/// Describes every shape on a slide in z-order.
pub fn get_slide_snapshot(doc: &Document, number: usize) -> DeckResult<SlideSnapshot> {
    let slide = resolve_slide(doc, number)?;
    Ok(SlideSnapshot {
        slide: number,
        slide_count: doc.slides.len(),
        layout: slide.layout.clone(),
        shapes: slide.shapes.iter().map(shape_snapshot).collect(),
    })
}
