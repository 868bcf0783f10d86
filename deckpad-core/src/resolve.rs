use std::fmt;

use serde::Deserialize;

use crate::error::{DeckError, DeckResult};
use crate::model::{Document, Shape, Slide, Table};

/// How a caller names a shape.
///
/// Ids are unique within a slide. Names are not: a name lookup returns the
/// first shape carrying it in z-order (bottom-most first), every time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ShapeRef {
    Id(u32),
    Name(String),
}

impl ShapeRef {
    /// Builds a reference from optional id/name arguments; the id wins.
    pub fn from_parts(id: Option<u32>, name: Option<&str>) -> DeckResult<Self> {
        match (id, name) {
            (Some(id), _) => Ok(ShapeRef::Id(id)),
            (None, Some(name)) if !name.is_empty() => Ok(ShapeRef::Name(name.to_string())),
            _ => Err(DeckError::invalid("either shape_id or shape_name is required")),
        }
    }

    pub fn matches(&self, shape: &Shape) -> bool {
        match self {
            ShapeRef::Id(id) => shape.id == *id,
            ShapeRef::Name(name) => shape.name == *name,
        }
    }
}

impl fmt::Display for ShapeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRef::Id(id) => write!(f, "with id {id}"),
            ShapeRef::Name(name) => write!(f, "named '{name}'"),
        }
    }
}

/// A table named directly, or by its 1-based rank among the slide's tables
/// ordered top-to-bottom then left-to-right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    Shape(ShapeRef),
    Index(usize),
}

/// Converts a 1-based slide number to a vector index.
pub fn slide_index(doc: &Document, number: usize) -> DeckResult<usize> {
    let count = doc.slides.len();
    if number == 0 || number > count {
        return Err(DeckError::SlideIndex { number, count });
    }
    Ok(number - 1)
}

pub fn resolve_slide(doc: &Document, number: usize) -> DeckResult<&Slide> {
    let idx = slide_index(doc, number)?;
    Ok(&doc.slides[idx])
}

pub fn resolve_slide_mut(doc: &mut Document, number: usize) -> DeckResult<&mut Slide> {
    let idx = slide_index(doc, number)?;
    Ok(&mut doc.slides[idx])
}

/// Position of the shape within the slide's z-order.
pub fn shape_position(slide: &Slide, slide_number: usize, shape: &ShapeRef) -> DeckResult<usize> {
    slide
        .shapes
        .iter()
        .position(|candidate| shape.matches(candidate))
        .ok_or_else(|| DeckError::ShapeNotFound {
            slide: slide_number,
            reference: shape.to_string(),
        })
}

pub fn resolve_shape<'a>(
    doc: &'a Document,
    slide_number: usize,
    shape: &ShapeRef,
) -> DeckResult<&'a Shape> {
    let slide = resolve_slide(doc, slide_number)?;
    let pos = shape_position(slide, slide_number, shape)?;
    Ok(&slide.shapes[pos])
}

pub fn resolve_shape_mut<'a>(
    doc: &'a mut Document,
    slide_number: usize,
    shape: &ShapeRef,
) -> DeckResult<&'a mut Shape> {
    let slide = resolve_slide_mut(doc, slide_number)?;
    let pos = shape_position(slide, slide_number, shape)?;
    Ok(&mut slide.shapes[pos])
}

/// Position of the referenced table within the slide's z-order.
pub fn table_position(slide: &Slide, slide_number: usize, table: &TableRef) -> DeckResult<usize> {
    match table {
        TableRef::Shape(shape) => {
            let pos = shape_position(slide, slide_number, shape)?;
            if slide.shapes[pos].table().is_none() {
                return Err(DeckError::invalid(format!(
                    "shape {shape} on slide {slide_number} is not a table"
                )));
            }
            Ok(pos)
        }
        TableRef::Index(index) => {
            let mut tables: Vec<usize> = slide
                .shapes
                .iter()
                .enumerate()
                .filter(|(_, shape)| shape.table().is_some())
                .map(|(pos, _)| pos)
                .collect();
            tables.sort_by_key(|&pos| {
                let geometry = slide.shapes[pos].geometry;
                (geometry.top, geometry.left)
            });
            if *index == 0 || *index > tables.len() {
                return Err(DeckError::ShapeNotFound {
                    slide: slide_number,
                    reference: format!(
                        "table #{index} ({} tables on the slide)",
                        tables.len()
                    ),
                });
            }
            Ok(tables[index - 1])
        }
    }
}

/// Converts 1-based cell coordinates to grid indices.
pub fn resolve_cell(table: &Table, row: usize, column: usize) -> DeckResult<(usize, usize)> {
    let rows = table.row_count();
    let columns = table.column_count();
    if row == 0 || column == 0 || row > rows || column > columns {
        return Err(DeckError::CellIndex {
            row,
            column,
            rows,
            columns,
        });
    }
    Ok((row - 1, column - 1))
}
