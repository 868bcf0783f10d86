use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::content::{unescape_input, ShapeIdentity, TextFormat};
use crate::error::{DeckError, DeckResult};
use crate::model::{Document, LineStyle, RunFormat, Shape, ShapeKind, TextBody};
use crate::resolve::{
    resolve_cell, resolve_shape_mut, resolve_slide, shape_position, slide_index, table_position,
    ShapeRef, TableRef,
};
use crate::units::{extent_to_emu, inches_to_emu, points_to_emu, Rgb};

/// Sparse attribute changes; `None` leaves the attribute untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShapeChanges {
    pub left: Option<f64>,
    pub top: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Clockwise degrees.
    pub rotation: Option<f64>,
    pub text: Option<String>,
    pub fill_color: Option<Rgb>,
    pub line_color: Option<Rgb>,
    /// Points.
    pub line_width: Option<f64>,
    #[serde(flatten)]
    pub format: TextFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModifyReport {
    #[serde(flatten)]
    pub shape: ShapeIdentity,
    pub changed: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellReport {
    #[serde(flatten)]
    pub shape: ShapeIdentity,
    pub row: usize,
    pub column: usize,
    /// `false` when the text and format already matched.
    pub changed: bool,
}

fn supports_style(shape: &Shape) -> bool {
    matches!(
        shape.kind,
        ShapeKind::TextBox(_) | ShapeKind::AutoShape(_) | ShapeKind::Picture(_) | ShapeKind::Icon(_)
    )
}

#[instrument(skip(doc, changes))]
pub fn modify_shape(
    doc: &mut Document,
    slide: usize,
    target: &ShapeRef,
    changes: &ShapeChanges,
) -> DeckResult<ModifyReport> {
    let left = changes.left.map(inches_to_emu).transpose()?;
    let top = changes.top.map(inches_to_emu).transpose()?;
    let width = changes
        .width
        .map(|value| extent_to_emu("width", value))
        .transpose()?;
    let height = changes
        .height
        .map(|value| extent_to_emu("height", value))
        .transpose()?;
    let line_width = changes.line_width.map(points_to_emu).transpose()?;
    if let Some(rotation) = changes.rotation {
        if !rotation.is_finite() {
            return Err(DeckError::invalid("rotation must be a finite number of degrees"));
        }
    }
    if let Some(size) = changes.format.font_size {
        crate::units::font_size_to_centipoints(size)?;
    }

    let shape = resolve_shape_mut(doc, slide, target)?;
    let wants_text = changes.text.is_some() || !changes.format.is_empty();
    if wants_text && shape.text_body().is_none() {
        return Err(DeckError::invalid(format!(
            "shape {target} is a {} and has no text to change",
            shape.kind.name()
        )));
    }
    let wants_style =
        changes.fill_color.is_some() || changes.line_color.is_some() || line_width.is_some();
    if wants_style && !supports_style(shape) {
        return Err(DeckError::invalid(format!(
            "shape {target} is a {} and has no fill or outline",
            shape.kind.name()
        )));
    }

    let mut changed = Vec::new();
    let geometry = &mut shape.geometry;
    for (value, field, name) in [
        (left, &mut geometry.left, "left"),
        (top, &mut geometry.top, "top"),
        (width, &mut geometry.width, "width"),
        (height, &mut geometry.height, "height"),
    ] {
        if let Some(value) = value {
            *field = value;
            changed.push(name);
        }
    }
    if let Some(rotation) = changes.rotation {
        shape.rotation = rotation.rem_euclid(360.0);
        changed.push("rotation");
    }
    if let Some(fill) = changes.fill_color {
        shape.style.fill = Some(fill);
        changed.push("fill_color");
    }
    if changes.line_color.is_some() || line_width.is_some() {
        let line = shape.style.line.get_or_insert_with(LineStyle::default);
        if let Some(color) = changes.line_color {
            line.color = Some(color);
            changed.push("line_color");
        }
        if let Some(width) = line_width {
            line.width = Some(width);
            changed.push("line_width");
        }
    }
    if let Some(body) = shape.text_body_mut() {
        if let Some(text) = &changes.text {
            body.set_text(&unescape_input(text));
            changed.push("text");
        }
        if !changes.format.is_empty() {
            changes.format.apply(body)?;
            changed.push("format");
        }
    }

    Ok(ModifyReport {
        shape: ShapeIdentity {
            slide,
            id: shape.id,
            name: shape.name.clone(),
        },
        changed,
    })
}

/// Removes a shape. The ids of the remaining shapes do not change.
#[instrument(skip(doc))]
pub fn delete_shape(
    doc: &mut Document,
    slide: usize,
    target: &ShapeRef,
) -> DeckResult<ShapeIdentity> {
    let idx = slide_index(doc, slide)?;
    let pos = shape_position(&doc.slides[idx], slide, target)?;
    let removed = doc.slides[idx].shapes.remove(pos);
    debug!(id = removed.id, name = %removed.name, "deleted shape");
    Ok(ShapeIdentity {
        slide,
        id: removed.id,
        name: removed.name,
    })
}

/// Limits a find-and-replace to one slide, or one shape on it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceScope {
    pub slide: Option<usize>,
    pub shape: Option<ShapeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaceLocation {
    pub slide: usize,
    pub shape_id: u32,
    pub shape_name: String,
    /// 1-based `(row, column)` for table cells.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cell: Option<(usize, usize)>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub replacements: usize,
    pub locations: Vec<ReplaceLocation>,
}

fn replace_in_shape(
    shape: &mut Shape,
    slide: usize,
    search: &str,
    replacement: &str,
    match_case: bool,
    report: &mut ReplaceReport,
) {
    let mut record = |cell, count: usize, id: u32, name: &str| {
        if count > 0 {
            report.replacements += count;
            report.locations.push(ReplaceLocation {
                slide,
                shape_id: id,
                shape_name: name.to_string(),
                cell,
                count,
            });
        }
    };
    let (id, name) = (shape.id, shape.name.clone());
    if let ShapeKind::Table(table) = &mut shape.kind {
        for (row_idx, row) in table.rows.iter_mut().enumerate() {
            for (col_idx, cell) in row.iter_mut().enumerate() {
                let count = cell.body.replace_all(search, replacement, match_case);
                record(Some((row_idx + 1, col_idx + 1)), count, id, &name);
            }
        }
        return;
    }
    if let Some(body) = shape.text_body_mut() {
        let count = body.replace_all(search, replacement, match_case);
        record(None, count, id, &name);
    }
}

/// Replaces every occurrence of `search` in text frames and table cells.
///
/// Matching works on each paragraph's concatenated run text, so a match may
/// cross run boundaries; see [`crate::model::Paragraph::splice`] for how the
/// touched runs are rewritten.
#[instrument(skip(doc, search, replacement))]
pub fn find_and_replace(
    doc: &mut Document,
    scope: &ReplaceScope,
    search: &str,
    replacement: &str,
    match_case: bool,
) -> DeckResult<ReplaceReport> {
    if search.is_empty() {
        return Err(DeckError::invalid("search text must not be empty"));
    }
    if scope.shape.is_some() && scope.slide.is_none() {
        return Err(DeckError::invalid("a shape scope needs a slide number"));
    }
    let slides: Vec<usize> = match scope.slide {
        Some(number) => vec![slide_index(doc, number)?],
        None => (0..doc.slides.len()).collect(),
    };
    let only = match (&scope.shape, scope.slide) {
        (Some(shape), Some(number)) => {
            Some(shape_position(&doc.slides[slides[0]], number, shape)?)
        }
        _ => None,
    };

    let mut report = ReplaceReport::default();
    for idx in slides {
        let shapes = &mut doc.slides[idx].shapes;
        for (pos, shape) in shapes.iter_mut().enumerate() {
            if only.is_some_and(|only| only != pos) {
                continue;
            }
            replace_in_shape(shape, idx + 1, search, replacement, match_case, &mut report);
        }
    }
    debug!(replacements = report.replacements, "find and replace finished");
    Ok(report)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellRun {
    pub text: String,
    #[serde(flatten)]
    pub format: RunFormat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableContent {
    #[serde(flatten)]
    pub shape: ShapeIdentity,
    pub rows: usize,
    pub columns: usize,
    pub cells: Vec<Vec<String>>,
    /// Per cell, the runs of every paragraph in order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatting: Option<Vec<Vec<Vec<CellRun>>>>,
}

fn cell_runs(body: &TextBody) -> Vec<CellRun> {
    body.paragraphs
        .iter()
        .flat_map(|paragraph| paragraph.runs.iter())
        .map(|run| CellRun {
            text: run.text.clone(),
            format: run.format.clone(),
        })
        .collect()
}

pub fn get_table_content(
    doc: &Document,
    slide: usize,
    table: &TableRef,
    include_formatting: bool,
) -> DeckResult<TableContent> {
    let target = resolve_slide(doc, slide)?;
    let pos = table_position(target, slide, table)?;
    let shape = &target.shapes[pos];
    let Some(grid) = shape.table() else {
        return Err(DeckError::invalid("shape is not a table"));
    };
    let cells = grid
        .rows
        .iter()
        .map(|row| row.iter().map(|cell| cell.body.text()).collect())
        .collect();
    let formatting = include_formatting.then(|| {
        grid.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell_runs(&cell.body)).collect())
            .collect()
    });
    Ok(TableContent {
        shape: ShapeIdentity {
            slide,
            id: shape.id,
            name: shape.name.clone(),
        },
        rows: grid.row_count(),
        columns: grid.column_count(),
        cells,
        formatting,
    })
}

/// Optional cell-level changes beyond the text itself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CellFormat {
    #[serde(flatten)]
    pub text: TextFormat,
    pub fill_color: Option<Rgb>,
}

/// Rewrites one cell; only the span of text that differs is spliced.
#[instrument(skip(doc, text, format))]
pub fn modify_table_cell(
    doc: &mut Document,
    slide: usize,
    table: &TableRef,
    row: usize,
    column: usize,
    text: Option<&str>,
    format: &CellFormat,
) -> DeckResult<CellReport> {
    if let Some(size) = format.text.font_size {
        crate::units::font_size_to_centipoints(size)?;
    }
    let idx = slide_index(doc, slide)?;
    let pos = table_position(&doc.slides[idx], slide, table)?;
    let shape = &mut doc.slides[idx].shapes[pos];
    let (id, name) = (shape.id, shape.name.clone());
    let Some(grid) = shape.table_mut() else {
        return Err(DeckError::invalid("shape is not a table"));
    };
    let (r, c) = resolve_cell(grid, row, column)?;
    let cell = &mut grid.rows[r][c];
    let before = cell.clone();
    if let Some(text) = text {
        cell.body.set_text(&unescape_input(text));
    }
    format.text.apply(&mut cell.body)?;
    if let Some(fill) = format.fill_color {
        cell.fill = Some(fill);
    }
    Ok(CellReport {
        shape: ShapeIdentity { slide, id, name },
        row,
        column,
        changed: *cell != before,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::tests::one_slide;
    use crate::content::{add_shape, add_table, add_textbox, AutoShapeKind, ShapeStyleOptions};
    use crate::model::{Paragraph, TextRun};
    use crate::resolve::resolve_shape;
    use crate::slides::add_slide;
    use crate::units::Placement;

    fn styled_box(doc: &mut Document, slide: usize) -> u32 {
        let identity = add_textbox(doc, slide, "", Placement::default(), &TextFormat::default())
            .unwrap();
        let shape = resolve_shape_mut(doc, slide, &ShapeRef::Id(identity.id)).unwrap();
        let body = shape.text_body_mut().unwrap();
        let bold = RunFormat {
            bold: Some(true),
            ..RunFormat::default()
        };
        let red = RunFormat {
            color: Some(Rgb::new(200, 0, 0)),
            ..RunFormat::default()
        };
        body.paragraphs = vec![Paragraph {
            runs: vec![
                TextRun::new("Launch ", RunFormat::default()),
                TextRun::new("Project", bold),
                TextRun::new(" Apollo", red),
            ],
            ..Paragraph::default()
        }];
        identity.id
    }

    #[test]
    fn delete_keeps_sibling_ids() {
        let mut doc = one_slide();
        let ids: Vec<u32> = (0..3)
            .map(|_| {
                add_textbox(&mut doc, 1, "x", Placement::default(), &TextFormat::default())
                    .unwrap()
                    .id
            })
            .collect();
        delete_shape(&mut doc, 1, &ShapeRef::Id(ids[1])).unwrap();
        let remaining: Vec<u32> = doc.slides[0].shapes.iter().map(|s| s.id).collect();
        assert_eq!(remaining, vec![ids[0], ids[2]]);
        assert_eq!(
            delete_shape(&mut doc, 1, &ShapeRef::Id(ids[1])).unwrap_err().kind(),
            "ShapeNotFoundError"
        );
    }

    #[test]
    fn sparse_changes_leave_other_attributes() {
        let mut doc = one_slide();
        let id = add_shape(
            &mut doc,
            1,
            AutoShapeKind::Rectangle,
            Placement::at(1.0, 1.0, 2.0, 2.0),
            &ShapeStyleOptions {
                fill_color: Some(Rgb::new(1, 2, 3)),
                ..ShapeStyleOptions::default()
            },
        )
        .unwrap()
        .id;
        let before = resolve_shape(&doc, 1, &ShapeRef::Id(id)).unwrap().clone();
        let report = modify_shape(
            &mut doc,
            1,
            &ShapeRef::Id(id),
            &ShapeChanges {
                left: Some(4.0),
                rotation: Some(-90.0),
                ..ShapeChanges::default()
            },
        )
        .unwrap();
        assert_eq!(report.changed, vec!["left", "rotation"]);
        let after = resolve_shape(&doc, 1, &ShapeRef::Id(id)).unwrap();
        assert_eq!(after.geometry.left, 4 * 914_400);
        assert_eq!(after.geometry.top, before.geometry.top);
        assert_eq!(after.geometry.width, before.geometry.width);
        assert_eq!(after.rotation, 270.0);
        assert_eq!(after.style.fill, Some(Rgb::new(1, 2, 3)));
    }

    #[test]
    fn text_change_on_table_is_rejected_before_mutation() {
        let mut doc = one_slide();
        let id = add_table(&mut doc, 1, 1, 1, None, Placement::default(), None)
            .unwrap()
            .id;
        let before = doc.clone();
        let err = modify_shape(
            &mut doc,
            1,
            &ShapeRef::Id(id),
            &ShapeChanges {
                left: Some(3.0),
                text: Some("nope".into()),
                ..ShapeChanges::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
        assert_eq!(doc, before);
    }

    #[test]
    fn modify_text_keeps_run_formats() {
        let mut doc = one_slide();
        let id = styled_box(&mut doc, 1);
        modify_shape(
            &mut doc,
            1,
            &ShapeRef::Id(id),
            &ShapeChanges {
                text: Some("Launch Project Artemis".into()),
                ..ShapeChanges::default()
            },
        )
        .unwrap();
        let shape = resolve_shape(&doc, 1, &ShapeRef::Id(id)).unwrap();
        let runs = &shape.text_body().unwrap().paragraphs[0].runs;
        assert_eq!(runs.len(), 3);
        assert_eq!(runs[1].format.bold, Some(true));
        assert_eq!(runs[2].text, " Artemis");
        assert_eq!(runs[2].format.color, Some(Rgb::new(200, 0, 0)));
    }

    #[test]
    fn replace_across_runs_and_is_idempotent() {
        let mut doc = one_slide();
        let id = styled_box(&mut doc, 1);
        let report = find_and_replace(
            &mut doc,
            &ReplaceScope::default(),
            "project apollo",
            "Mission Gemini",
            false,
        )
        .unwrap();
        assert_eq!(report.replacements, 1);
        assert_eq!(report.locations[0].shape_id, id);

        let shape = resolve_shape(&doc, 1, &ShapeRef::Id(id)).unwrap();
        let runs = &shape.text_body().unwrap().paragraphs[0].runs;
        assert_eq!(runs[0].text, "Launch ");
        assert_eq!(runs[1].text, "Mission Gemini");
        assert_eq!(runs[1].format.bold, Some(true));
        assert_eq!(runs.len(), 2);

        let snapshot = doc.clone();
        let again = find_and_replace(
            &mut doc,
            &ReplaceScope::default(),
            "project apollo",
            "Mission Gemini",
            false,
        )
        .unwrap();
        assert_eq!(again.replacements, 0);
        assert_eq!(doc, snapshot);
    }

    #[test]
    fn replace_respects_scope_and_case() {
        let mut doc = one_slide();
        add_slide(&mut doc, None).unwrap();
        for slide in [1, 2] {
            add_textbox(&mut doc, slide, "Draft", Placement::default(), &TextFormat::default())
                .unwrap();
        }
        let data = vec![vec!["draft".to_string(), "final".to_string()]];
        add_table(&mut doc, 2, 1, 2, Some(&data), Placement::default(), None).unwrap();

        let scoped = ReplaceScope {
            slide: Some(2),
            shape: None,
        };
        let report = find_and_replace(&mut doc, &scoped, "Draft", "Final", true).unwrap();
        assert_eq!(report.replacements, 1);

        let report = find_and_replace(&mut doc, &scoped, "draft", "final", false).unwrap();
        assert_eq!(report.replacements, 1);
        assert_eq!(report.locations[0].cell, Some((1, 1)));

        assert_eq!(
            doc.slides[0].shapes[0].text_body().unwrap().text(),
            "Draft"
        );
        assert!(find_and_replace(&mut doc, &ReplaceScope::default(), "", "x", true).is_err());
    }

    #[test]
    fn table_cells_read_and_write_by_index() {
        let mut doc = one_slide();
        let data = vec![
            vec!["Region".to_string(), "Revenue".to_string()],
            vec!["EMEA".to_string(), "$10M".to_string()],
        ];
        add_table(&mut doc, 1, 2, 2, Some(&data), Placement::default(), None).unwrap();
        let report = modify_table_cell(
            &mut doc,
            1,
            &TableRef::Index(1),
            2,
            2,
            Some("$12M"),
            &CellFormat {
                fill_color: Some(Rgb::new(0xEE, 0xEE, 0xEE)),
                ..CellFormat::default()
            },
        )
        .unwrap();
        assert!(report.changed);
        assert_eq!((report.row, report.column), (2, 2));
        let content = get_table_content(&doc, 1, &TableRef::Index(1), true).unwrap();
        assert_eq!(content.cells[1], vec!["EMEA", "$12M"]);
        assert_eq!((content.rows, content.columns), (2, 2));
        assert_eq!(content.formatting.unwrap()[1][1][0].text, "$12M");

        let err = modify_table_cell(
            &mut doc,
            1,
            &TableRef::Index(1),
            3,
            1,
            Some("x"),
            &CellFormat::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "CellIndexError");

        let report = modify_table_cell(
            &mut doc,
            1,
            &TableRef::Index(1),
            2,
            2,
            Some("$12M"),
            &CellFormat::default(),
        )
        .unwrap();
        assert!(!report.changed);
    }
}
