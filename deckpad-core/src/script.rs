//! Escape hatch: caller-supplied Rhai scripts against the open document.
//!
//! Scripts get a `doc` handle exposing the same operations as the fixed tool
//! set plus direct shape access, and `slide` bound to the requested slide
//! number (or `()`). There is no sandbox beyond the operation budget; scripts
//! run with the privileges of the host process.

use std::cell::RefCell;
use std::rc::Rc;

use rhai::{Array, Dynamic, Engine, EvalAltResult, ImmutableString, Map, Position, Scope};
use serde::{Deserialize, Serialize};

use crate::content::{add_textbox, TextFormat};
use crate::error::{DeckError, DeckResult};
use crate::model::{Document, Shape};
use crate::modify::{
    delete_shape, find_and_replace, modify_shape, modify_table_cell, CellFormat, ReplaceScope,
    ShapeChanges,
};
use crate::resolve::{resolve_cell, resolve_shape, resolve_slide, ShapeRef, TableRef};
use crate::slides::{add_slide, add_slide_with_layout, delete_slide, move_slide, SlideLayout};
use crate::units::{emu_to_inches, Placement, Rgb};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScriptLimits {
    /// Zero means unlimited.
    pub max_operations: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationFault {
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    pub ok: bool,
    /// Display form of the script's final expression, unless it was `()`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub output: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault: Option<EvaluationFault>,
    pub modified: bool,
}

type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

fn script_error(err: DeckError) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(format!("{}: {}", err.kind(), err).into(), Position::NONE).into()
}

#[derive(Clone)]
struct ScriptDocument(Rc<RefCell<Document>>);

impl ScriptDocument {
    fn read<T>(&self, f: impl FnOnce(&Document) -> DeckResult<T>) -> ScriptResult<T> {
        f(&self.0.borrow()).map_err(script_error)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Document) -> DeckResult<T>) -> ScriptResult<T> {
        f(&mut self.0.borrow_mut()).map_err(script_error)
    }
}

fn number(value: &Dynamic, what: &str) -> ScriptResult<f64> {
    if let Ok(float) = value.as_float() {
        return Ok(float);
    }
    if let Ok(int) = value.as_int() {
        return Ok(int as f64);
    }
    Err(script_error(DeckError::invalid(format!(
        "{what} must be a number, got {}",
        value.type_name()
    ))))
}

fn position(value: i64, what: &str) -> ScriptResult<usize> {
    usize::try_from(value)
        .map_err(|_| script_error(DeckError::invalid(format!("{what} must not be negative"))))
}

fn shape_id(value: i64) -> ScriptResult<ShapeRef> {
    u32::try_from(value)
        .map(ShapeRef::Id)
        .map_err(|_| script_error(DeckError::invalid(format!("invalid shape id {value}"))))
}

fn shape_map(shape: &Shape) -> Map {
    let mut map = Map::new();
    map.insert("id".into(), Dynamic::from(i64::from(shape.id)));
    map.insert("name".into(), shape.name.clone().into());
    map.insert("kind".into(), shape.kind.name().into());
    map.insert("left".into(), emu_to_inches(shape.geometry.left).into());
    map.insert("top".into(), emu_to_inches(shape.geometry.top).into());
    map.insert("width".into(), emu_to_inches(shape.geometry.width).into());
    map.insert("height".into(), emu_to_inches(shape.geometry.height).into());
    map.insert("rotation".into(), shape.rotation.into());
    if let Some(body) = shape.text_body() {
        map.insert("text".into(), body.text().into());
    }
    map
}

fn change_shape(
    doc: &mut ScriptDocument,
    slide: i64,
    id: i64,
    changes: ShapeChanges,
) -> ScriptResult<()> {
    let slide = position(slide, "slide")?;
    let target = shape_id(id)?;
    doc.write(|d| modify_shape(d, slide, &target, &changes).map(|_| ()))
}

fn build_engine(limits: ScriptLimits) -> Engine {
    let mut engine = Engine::new();
    if limits.max_operations > 0 {
        engine.set_max_operations(limits.max_operations);
    }

    engine
        .register_type_with_name::<ScriptDocument>("Document")
        .register_get("slide_count", |doc: &mut ScriptDocument| {
            doc.0.borrow().slides.len() as i64
        })
        .register_get("width", |doc: &mut ScriptDocument| {
            emu_to_inches(doc.0.borrow().width)
        })
        .register_get("height", |doc: &mut ScriptDocument| {
            emu_to_inches(doc.0.borrow().height)
        });

    engine
        .register_fn("add_slide", |doc: &mut ScriptDocument| -> ScriptResult<i64> {
            let change = doc.write(|d| add_slide(d, None))?;
            Ok(change.slide.unwrap_or_default() as i64)
        })
        .register_fn(
            "add_slide",
            |doc: &mut ScriptDocument, layout: ImmutableString| -> ScriptResult<i64> {
                let change = doc.write(|d| {
                    let layout = SlideLayout::by_name(layout.as_str())?;
                    add_slide_with_layout(d, None, layout)
                })?;
                Ok(change.slide.unwrap_or_default() as i64)
            },
        )
        .register_fn(
            "delete_slide",
            |doc: &mut ScriptDocument, slide: i64| -> ScriptResult<()> {
                let slide = position(slide, "slide")?;
                doc.write(|d| delete_slide(d, slide).map(|_| ()))
            },
        )
        .register_fn(
            "move_slide",
            |doc: &mut ScriptDocument, from: i64, to: i64| -> ScriptResult<()> {
                let from = position(from, "slide")?;
                let to = position(to, "slide")?;
                doc.write(|d| move_slide(d, from, to).map(|_| ()))
            },
        )
        .register_fn(
            "shapes",
            |doc: &mut ScriptDocument, slide: i64| -> ScriptResult<Array> {
                let slide = position(slide, "slide")?;
                doc.read(|d| {
                    let target = resolve_slide(d, slide)?;
                    Ok(target
                        .shapes
                        .iter()
                        .map(|shape| Dynamic::from_map(shape_map(shape)))
                        .collect())
                })
            },
        );

    engine
        .register_fn(
            "text",
            |doc: &mut ScriptDocument, slide: i64, id: i64| -> ScriptResult<String> {
                let slide = position(slide, "slide")?;
                let target = shape_id(id)?;
                doc.read(|d| {
                    let shape = resolve_shape(d, slide, &target)?;
                    shape
                        .text_body()
                        .map(|body| body.text())
                        .ok_or_else(|| DeckError::invalid(format!("shape {target} has no text")))
                })
            },
        )
        .register_fn(
            "set_text",
            |doc: &mut ScriptDocument, slide: i64, id: i64, text: ImmutableString| -> ScriptResult<()> {
                let changes = ShapeChanges {
                    text: Some(text.to_string()),
                    ..ShapeChanges::default()
                };
                change_shape(doc, slide, id, changes)
            },
        )
        .register_fn(
            "add_textbox",
            |doc: &mut ScriptDocument,
             slide: i64,
             text: ImmutableString,
             left: Dynamic,
             top: Dynamic,
             width: Dynamic,
             height: Dynamic|
             -> ScriptResult<i64> {
                let slide = position(slide, "slide")?;
                let placement = Placement::at(
                    number(&left, "left")?,
                    number(&top, "top")?,
                    number(&width, "width")?,
                    number(&height, "height")?,
                );
                let identity = doc.write(|d| {
                    add_textbox(d, slide, text.as_str(), placement, &TextFormat::default())
                })?;
                Ok(i64::from(identity.id))
            },
        )
        .register_fn(
            "move_shape",
            |doc: &mut ScriptDocument, slide: i64, id: i64, left: Dynamic, top: Dynamic| -> ScriptResult<()> {
                let changes = ShapeChanges {
                    left: Some(number(&left, "left")?),
                    top: Some(number(&top, "top")?),
                    ..ShapeChanges::default()
                };
                change_shape(doc, slide, id, changes)
            },
        )
        .register_fn(
            "resize_shape",
            |doc: &mut ScriptDocument, slide: i64, id: i64, width: Dynamic, height: Dynamic| -> ScriptResult<()> {
                let changes = ShapeChanges {
                    width: Some(number(&width, "width")?),
                    height: Some(number(&height, "height")?),
                    ..ShapeChanges::default()
                };
                change_shape(doc, slide, id, changes)
            },
        )
        .register_fn(
            "rotate_shape",
            |doc: &mut ScriptDocument, slide: i64, id: i64, degrees: Dynamic| -> ScriptResult<()> {
                let changes = ShapeChanges {
                    rotation: Some(number(&degrees, "rotation")?),
                    ..ShapeChanges::default()
                };
                change_shape(doc, slide, id, changes)
            },
        )
        .register_fn(
            "set_fill",
            |doc: &mut ScriptDocument, slide: i64, id: i64, color: ImmutableString| -> ScriptResult<()> {
                let color: Rgb = color.as_str().parse().map_err(script_error)?;
                let changes = ShapeChanges {
                    fill_color: Some(color),
                    ..ShapeChanges::default()
                };
                change_shape(doc, slide, id, changes)
            },
        )
        .register_fn(
            "delete_shape",
            |doc: &mut ScriptDocument, slide: i64, id: i64| -> ScriptResult<()> {
                let slide = position(slide, "slide")?;
                let target = shape_id(id)?;
                doc.write(|d| delete_shape(d, slide, &target).map(|_| ()))
            },
        );

    engine
        .register_fn(
            "replace",
            |doc: &mut ScriptDocument,
             search: ImmutableString,
             replacement: ImmutableString|
             -> ScriptResult<i64> {
                let report = doc.write(|d| {
                    find_and_replace(
                        d,
                        &ReplaceScope::default(),
                        search.as_str(),
                        replacement.as_str(),
                        true,
                    )
                })?;
                Ok(report.replacements as i64)
            },
        )
        .register_fn(
            "cell",
            |doc: &mut ScriptDocument,
             slide: i64,
             id: i64,
             row: i64,
             column: i64|
             -> ScriptResult<String> {
                let slide = position(slide, "slide")?;
                let target = shape_id(id)?;
                let (row, column) = (position(row, "row")?, position(column, "column")?);
                doc.read(|d| {
                    let shape = resolve_shape(d, slide, &target)?;
                    let table = shape
                        .table()
                        .ok_or_else(|| DeckError::invalid(format!("shape {target} is not a table")))?;
                    let (r, c) = resolve_cell(table, row, column)?;
                    Ok(table.rows[r][c].body.text())
                })
            },
        )
        .register_fn(
            "set_cell",
            |doc: &mut ScriptDocument,
             slide: i64,
             id: i64,
             row: i64,
             column: i64,
             text: ImmutableString|
             -> ScriptResult<()> {
                let slide = position(slide, "slide")?;
                let table = TableRef::Shape(shape_id(id)?);
                let (row, column) = (position(row, "row")?, position(column, "column")?);
                doc.write(|d| {
                    modify_table_cell(
                        d,
                        slide,
                        &table,
                        row,
                        column,
                        Some(text.as_str()),
                        &CellFormat::default(),
                    )
                    .map(|_| ())
                })
            },
        );

    engine
}

fn fault_kind(err: &EvalAltResult) -> &'static str {
    match err {
        EvalAltResult::ErrorParsing(..) => "ParseError",
        EvalAltResult::ErrorRuntime(..) => "RuntimeError",
        EvalAltResult::ErrorFunctionNotFound(..) => "FunctionNotFound",
        EvalAltResult::ErrorVariableNotFound(..) => "VariableNotFound",
        EvalAltResult::ErrorMismatchDataType(..) | EvalAltResult::ErrorMismatchOutputType(..) => {
            "TypeMismatch"
        }
        EvalAltResult::ErrorTooManyOperations(..) => "OperationLimit",
        _ => "EvaluationError",
    }
}

/// Runs `code` against a copy of `document`.
///
/// Returns the updated copy only when the script completed; a fault discards
/// every change the script made.
pub fn evaluate(
    document: &Document,
    code: &str,
    slide: Option<usize>,
    limits: ScriptLimits,
) -> (EvaluationResult, Option<Document>) {
    let handle = ScriptDocument(Rc::new(RefCell::new(document.clone())));
    let output = Rc::new(RefCell::new(Vec::new()));

    let outcome = {
        let mut engine = build_engine(limits);
        let sink = Rc::clone(&output);
        engine.on_print(move |text| sink.borrow_mut().push(text.to_string()));
        // Nothing a script emits may reach stdout.
        let sink = Rc::clone(&output);
        engine.on_debug(move |text, _source, _position| {
            sink.borrow_mut().push(text.to_string())
        });

        let mut scope = Scope::new();
        scope.push("doc", handle.clone());
        match slide {
            Some(number) => scope.push("slide", number as i64),
            None => scope.push("slide", ()),
        };
        engine
            .eval_with_scope::<Dynamic>(&mut scope, code)
            .map(|value| (!value.is_unit()).then(|| value.to_string()))
    };

    let output = Rc::try_unwrap(output)
        .map(RefCell::into_inner)
        .unwrap_or_else(|shared| shared.borrow().clone());

    match outcome {
        Ok(value) => {
            let document = Rc::try_unwrap(handle.0)
                .map(RefCell::into_inner)
                .unwrap_or_else(|shared| shared.borrow().clone());
            let result = EvaluationResult {
                ok: true,
                value,
                output,
                fault: None,
                modified: false,
            };
            (result, Some(document))
        }
        Err(err) => {
            let result = EvaluationResult {
                ok: false,
                value: None,
                output,
                fault: Some(EvaluationFault {
                    kind: fault_kind(&err).to_string(),
                    message: err.to_string(),
                }),
                modified: false,
            };
            (result, None)
        }
    }
}
