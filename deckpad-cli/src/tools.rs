use std::path::PathBuf;
use std::sync::Arc;

use deckpad_core::content::{
    self, AutoShapeKind, FitMode, IconPlacement, ShapeStyleOptions, TextFormat,
};
use deckpad_core::model::{ChartKind, ChartSeries};
use deckpad_core::modify::{self, CellFormat, ReplaceScope, ShapeChanges};
use deckpad_core::slides::{self, SlideLayout};
use deckpad_core::{
    DeckError, DeckResult, IconProvider, Placement, Rgb, Session, ShapeRef, TableRef,
};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, instrument};

#[derive(Debug, Clone, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

fn tool(
    name: &'static str,
    description: &'static str,
    properties: Value,
    required: &[&str],
) -> ToolDescriptor {
    ToolDescriptor {
        name,
        description,
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn placement_properties() -> Value {
    json!({
        "left": { "type": "number", "description": "Left edge in inches" },
        "top": { "type": "number", "description": "Top edge in inches" },
        "width": { "type": "number", "description": "Width in inches" },
        "height": { "type": "number", "description": "Height in inches" },
    })
}

fn text_format_properties() -> Value {
    json!({
        "font_name": { "type": "string" },
        "font_size": { "type": "number", "description": "Points" },
        "bold": { "type": "boolean" },
        "italic": { "type": "boolean" },
        "underline": { "type": "boolean" },
        "color": { "type": "string", "description": "#RRGGBB" },
        "alignment": { "type": "string", "enum": ["left", "center", "right", "justify"] },
        "bullet": {
            "type": "string",
            "enum": [
                "bullet", "dash", "arrow", "check", "square", "circle", "diamond", "star",
                "number", "number_paren", "roman", "roman_upper", "letter", "letter_upper", "none"
            ]
        },
    })
}

fn shape_ref_properties() -> Value {
    json!({
        "shape_id": { "type": "integer", "description": "Shape id; wins over shape_name" },
        "shape_name": { "type": "string" },
    })
}

fn replace_properties() -> Value {
    json!({
        "replace_shape_id": { "type": "integer", "description": "Shape whose place the new one takes" },
        "replace_shape_name": { "type": "string" },
    })
}

fn table_ref_properties() -> Value {
    merge([
        shape_ref_properties(),
        json!({
            "table_index": {
                "type": "integer",
                "description": "1-based rank among the slide's tables, top-to-bottom then left-to-right"
            }
        }),
    ])
}

fn merge<const N: usize>(parts: [Value; N]) -> Value {
    let mut merged = serde_json::Map::new();
    for part in parts {
        if let Value::Object(map) = part {
            merged.extend(map);
        }
    }
    Value::Object(merged)
}

fn slide_property() -> Value {
    json!({ "slide_number": { "type": "integer", "description": "1-based slide number" } })
}

pub static TOOLS: Lazy<Vec<ToolDescriptor>> = Lazy::new(|| {
    vec![
        tool(
            "manage_presentation",
            "Open, create, save, save_as or close the presentation. Only one can be open at a time.",
            json!({
                "action": { "type": "string", "enum": ["open", "create", "save", "save_as", "close"] },
                "file_path": { "type": "string", "description": "File to open, or default save path for create" },
                "save_path": { "type": "string", "description": "Target for save_as" },
                "width": { "type": "number", "description": "Slide width in inches for create" },
                "height": { "type": "number", "description": "Slide height in inches for create" },
                "discard_unsaved": { "type": "boolean", "description": "Allow close to drop unsaved changes" },
            }),
            &["action"],
        ),
        tool(
            "get_presentation_info",
            "Path, state, slide size and a per-slide overview of the open presentation.",
            json!({}),
            &[],
        ),
        tool(
            "manage_slide",
            "Add, delete, duplicate or move a slide.",
            json!({
                "action": { "type": "string", "enum": ["add", "delete", "duplicate", "move"] },
                "slide_number": { "type": "integer", "description": "Slide to delete, duplicate or move" },
                "target_position": { "type": "integer", "description": "Where to insert or move to (1-based)" },
                "layout_index": {
                    "type": "integer",
                    "description": "Layout for add: 0=Title Slide, 1=Title and Content, 2=Section Header, 3=Two Content, 4=Comparison, 5=Title Only, 6=Blank (default), 7=Content with Caption, 8=Picture with Caption",
                },
                "layout": { "type": "string", "description": "Layout for add, by name; overrides layout_index" },
            }),
            &["action"],
        ),
        tool(
            "get_slide_snapshot",
            "Every shape on a slide in z-order with geometry, text and kind details.",
            slide_property(),
            &["slide_number"],
        ),
        tool(
            "add_textbox",
            "Add a text box. Literal \\n starts a new paragraph and \\t inserts a tab.",
            merge([
                slide_property(),
                json!({ "text": { "type": "string" } }),
                placement_properties(),
                text_format_properties(),
            ]),
            &["slide_number", "text"],
        ),
        tool(
            "add_image",
            "Add a PNG, JPEG, GIF or BMP image, optionally replacing a placeholder shape.",
            merge([
                slide_property(),
                json!({
                    "image_path": { "type": "string" },
                    "fit_mode": { "type": "string", "enum": ["fill", "fit", "stretch"] },
                }),
                placement_properties(),
                replace_properties(),
            ]),
            &["slide_number", "image_path"],
        ),
        tool(
            "add_shape",
            "Add an auto shape with optional fill, outline and text.",
            merge([
                slide_property(),
                json!({
                    "shape_type": {
                        "type": "string",
                        "enum": [
                            "rectangle", "rounded_rectangle", "oval", "triangle", "right_arrow",
                            "left_arrow", "up_arrow", "down_arrow", "star", "pentagon",
                            "hexagon", "diamond", "line"
                        ]
                    },
                    "fill_color": { "type": "string" },
                    "line_color": { "type": "string" },
                    "line_width": { "type": "number", "description": "Points" },
                    "text": { "type": "string" },
                }),
                placement_properties(),
            ]),
            &["slide_number", "shape_type"],
        ),
        tool(
            "add_table",
            "Add a table, optionally filled from a row-major grid of strings.",
            merge([
                slide_property(),
                json!({
                    "rows": { "type": "integer" },
                    "cols": { "type": "integer" },
                    "data": { "type": "array", "items": { "type": "array", "items": { "type": "string" } } },
                }),
                placement_properties(),
                replace_properties(),
            ]),
            &["slide_number", "rows", "cols"],
        ),
        tool(
            "add_chart",
            "Add a bar, column, line, pie or area chart.",
            merge([
                slide_property(),
                json!({
                    "chart_type": { "type": "string", "enum": ["bar", "column", "line", "pie", "area"] },
                    "categories": { "type": "array", "items": { "type": "string" } },
                    "series": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "values": { "type": "array", "items": { "type": "number" } }
                            },
                            "required": ["name", "values"]
                        }
                    },
                }),
                placement_properties(),
            ]),
            &["slide_number", "chart_type", "categories", "series"],
        ),
        tool(
            "insert_icon",
            "Insert a bundled vector icon, recolored, as a square picture.",
            merge([
                slide_property(),
                json!({
                    "icon_name": { "type": "string" },
                    "color": { "type": "string", "description": "#RRGGBB" },
                    "left": { "type": "number" },
                    "top": { "type": "number" },
                    "size": { "type": "number", "description": "Side length in inches" },
                }),
                replace_properties(),
            ]),
            &["slide_number", "icon_name"],
        ),
        tool(
            "list_icons",
            "Bundled icon names grouped by category.",
            json!({ "category": { "type": "string" } }),
            &[],
        ),
        tool(
            "modify_shape",
            "Change geometry, rotation, text, colors or text formatting of a shape.",
            merge([
                slide_property(),
                shape_ref_properties(),
                placement_properties(),
                json!({
                    "rotation": { "type": "number", "description": "Clockwise degrees" },
                    "text": { "type": "string" },
                    "fill_color": { "type": "string" },
                    "line_color": { "type": "string" },
                    "line_width": { "type": "number" },
                }),
                text_format_properties(),
            ]),
            &["slide_number"],
        ),
        tool(
            "delete_shape",
            "Remove a shape from a slide.",
            merge([slide_property(), shape_ref_properties()]),
            &["slide_number"],
        ),
        tool(
            "find_and_replace",
            "Replace text everywhere, on one slide, or in one shape, keeping run formatting.",
            merge([
                json!({
                    "find_text": { "type": "string" },
                    "replace_text": { "type": "string" },
                    "match_case": { "type": "boolean" },
                    "slide_number": { "type": "integer" },
                }),
                shape_ref_properties(),
            ]),
            &["find_text", "replace_text"],
        ),
        tool(
            "get_table_content",
            "Cell text of a table, with run formatting on request.",
            merge([
                slide_property(),
                table_ref_properties(),
                json!({ "include_formatting": { "type": "boolean" } }),
            ]),
            &["slide_number"],
        ),
        tool(
            "modify_table_cell",
            "Set the text and formatting of one cell. Row and column are 1-based.",
            merge([
                slide_property(),
                table_ref_properties(),
                json!({
                    "row": { "type": "integer" },
                    "column": { "type": "integer" },
                    "text": { "type": "string" },
                    "fill_color": { "type": "string" },
                }),
                text_format_properties(),
            ]),
            &["slide_number", "row", "column"],
        ),
        tool(
            "evaluate",
            "Run a Rhai script against the open presentation through the `doc` API. \
             Changes are kept only if the script finishes without a fault.",
            json!({
                "code": { "type": "string" },
                "slide_number": { "type": "integer", "description": "Bound to `slide` in the script" },
            }),
            &["code"],
        ),
    ]
});

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum PresentationAction {
    Open,
    Create,
    Save,
    SaveAs,
    Close,
}

#[derive(Debug, Deserialize)]
struct ManagePresentationArgs {
    action: PresentationAction,
    file_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    width: Option<f64>,
    height: Option<f64>,
    #[serde(default)]
    discard_unsaved: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SlideAction {
    Add,
    Delete,
    Duplicate,
    Move,
}

#[derive(Debug, Deserialize)]
struct ManageSlideArgs {
    action: SlideAction,
    slide_number: Option<usize>,
    target_position: Option<usize>,
    layout_index: Option<usize>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlideArgs {
    slide_number: usize,
}

#[derive(Debug, Default, Deserialize)]
struct ShapeRefArgs {
    shape_id: Option<u32>,
    shape_name: Option<String>,
}

impl ShapeRefArgs {
    fn required(&self) -> DeckResult<ShapeRef> {
        ShapeRef::from_parts(self.shape_id, self.shape_name.as_deref())
    }

    fn optional(&self) -> DeckResult<Option<ShapeRef>> {
        if self.shape_id.is_none() && self.shape_name.is_none() {
            return Ok(None);
        }
        self.required().map(Some)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReplaceArgs {
    replace_shape_id: Option<u32>,
    replace_shape_name: Option<String>,
}

impl ReplaceArgs {
    fn target(&self) -> DeckResult<Option<ShapeRef>> {
        ShapeRefArgs {
            shape_id: self.replace_shape_id,
            shape_name: self.replace_shape_name.clone(),
        }
        .optional()
    }
}

#[derive(Debug, Deserialize)]
struct TableRefArgs {
    #[serde(flatten)]
    shape: ShapeRefArgs,
    table_index: Option<usize>,
}

impl TableRefArgs {
    /// A shape reference wins; otherwise the index, defaulting to the first table.
    fn resolve(&self) -> DeckResult<TableRef> {
        match self.shape.optional()? {
            Some(shape) => Ok(TableRef::Shape(shape)),
            None => Ok(TableRef::Index(self.table_index.unwrap_or(1))),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddTextboxArgs {
    slide_number: usize,
    text: String,
    #[serde(flatten)]
    placement: Placement,
    #[serde(flatten)]
    format: TextFormat,
}

#[derive(Debug, Deserialize)]
struct AddImageArgs {
    slide_number: usize,
    image_path: PathBuf,
    fit_mode: Option<FitMode>,
    #[serde(flatten)]
    placement: Placement,
    #[serde(flatten)]
    replace: ReplaceArgs,
}

#[derive(Debug, Deserialize)]
struct AddShapeArgs {
    slide_number: usize,
    shape_type: AutoShapeKind,
    #[serde(flatten)]
    placement: Placement,
    #[serde(flatten)]
    style: ShapeStyleOptions,
}

#[derive(Debug, Deserialize)]
struct AddTableArgs {
    slide_number: usize,
    rows: usize,
    #[serde(alias = "columns")]
    cols: usize,
    data: Option<Vec<Vec<String>>>,
    #[serde(flatten)]
    placement: Placement,
    #[serde(flatten)]
    replace: ReplaceArgs,
}

#[derive(Debug, Deserialize)]
struct AddChartArgs {
    slide_number: usize,
    chart_type: ChartKind,
    categories: Vec<String>,
    series: Vec<ChartSeries>,
    #[serde(flatten)]
    placement: Placement,
}

#[derive(Debug, Deserialize)]
struct InsertIconArgs {
    slide_number: usize,
    icon_name: String,
    color: Option<Rgb>,
    #[serde(flatten)]
    placement: IconPlacement,
    #[serde(flatten)]
    replace: ReplaceArgs,
}

#[derive(Debug, Deserialize)]
struct ListIconsArgs {
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModifyShapeArgs {
    slide_number: usize,
    #[serde(flatten)]
    shape: ShapeRefArgs,
    #[serde(flatten)]
    changes: ShapeChanges,
}

#[derive(Debug, Deserialize)]
struct DeleteShapeArgs {
    slide_number: usize,
    #[serde(flatten)]
    shape: ShapeRefArgs,
}

#[derive(Debug, Deserialize)]
struct FindReplaceArgs {
    find_text: String,
    replace_text: String,
    #[serde(default)]
    match_case: bool,
    slide_number: Option<usize>,
    #[serde(flatten)]
    shape: ShapeRefArgs,
}

#[derive(Debug, Deserialize)]
struct TableContentArgs {
    slide_number: usize,
    #[serde(flatten)]
    table: TableRefArgs,
    #[serde(default)]
    include_formatting: bool,
}

#[derive(Debug, Deserialize)]
struct TableCellArgs {
    slide_number: usize,
    #[serde(flatten)]
    table: TableRefArgs,
    row: usize,
    column: usize,
    text: Option<String>,
    #[serde(flatten)]
    format: CellFormat,
}

#[derive(Debug, Deserialize)]
struct EvaluateArgs {
    code: String,
    slide_number: Option<usize>,
}

fn decode<T: DeserializeOwned>(tool: &str, arguments: Value) -> DeckResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other,
    };
    serde_json::from_value(arguments)
        .map_err(|err| DeckError::invalid(format!("invalid arguments for {tool}: {err}")))
}

fn reply<T: Serialize>(value: T) -> DeckResult<Value> {
    serde_json::to_value(value).map_err(|err| DeckError::Package(err.into()))
}

fn required<T>(value: Option<T>, what: &str) -> DeckResult<T> {
    value.ok_or_else(|| DeckError::invalid(format!("{what} is required")))
}

/// The fixed operation set, dispatched by tool name.
pub struct Toolbox {
    session: Session,
    icons: Arc<dyn IconProvider>,
    default_icon_color: Rgb,
}

impl Toolbox {
    pub fn new(session: Session, icons: Arc<dyn IconProvider>, default_icon_color: Rgb) -> Self {
        Self {
            session,
            icons,
            default_icon_color,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    #[instrument(skip(self, arguments))]
    pub fn call(&mut self, name: &str, arguments: Value) -> DeckResult<Value> {
        info!("tool call");
        match name {
            "manage_presentation" => self.manage_presentation(decode(name, arguments)?),
            "get_presentation_info" => reply(self.session.info()?),
            "manage_slide" => self.manage_slide(decode(name, arguments)?),
            "get_slide_snapshot" => {
                let args: SlideArgs = decode(name, arguments)?;
                reply(
                    self.session
                        .read(|doc| slides::get_slide_snapshot(doc, args.slide_number))?,
                )
            }
            "add_textbox" => {
                let args: AddTextboxArgs = decode(name, arguments)?;
                reply(self.session.mutate(|doc| {
                    content::add_textbox(
                        doc,
                        args.slide_number,
                        &args.text,
                        args.placement,
                        &args.format,
                    )
                })?)
            }
            "add_image" => {
                let args: AddImageArgs = decode(name, arguments)?;
                let replace = args.replace.target()?;
                reply(self.session.mutate(|doc| {
                    content::add_image(
                        doc,
                        args.slide_number,
                        &args.image_path,
                        args.placement,
                        args.fit_mode,
                        replace.as_ref(),
                    )
                })?)
            }
            "add_shape" => {
                let args: AddShapeArgs = decode(name, arguments)?;
                reply(self.session.mutate(|doc| {
                    content::add_shape(
                        doc,
                        args.slide_number,
                        args.shape_type,
                        args.placement,
                        &args.style,
                    )
                })?)
            }
            "add_table" => {
                let args: AddTableArgs = decode(name, arguments)?;
                let replace = args.replace.target()?;
                reply(self.session.mutate(|doc| {
                    content::add_table(
                        doc,
                        args.slide_number,
                        args.rows,
                        args.cols,
                        args.data.as_deref(),
                        args.placement,
                        replace.as_ref(),
                    )
                })?)
            }
            "add_chart" => {
                let args: AddChartArgs = decode(name, arguments)?;
                reply(self.session.mutate(|doc| {
                    content::add_chart(
                        doc,
                        args.slide_number,
                        args.chart_type,
                        args.categories,
                        args.series,
                        args.placement,
                    )
                })?)
            }
            "insert_icon" => {
                let args: InsertIconArgs = decode(name, arguments)?;
                let replace = args.replace.target()?;
                let color = args.color.unwrap_or(self.default_icon_color);
                let icons = self.icons.as_ref();
                reply(self.session.mutate(|doc| {
                    content::insert_icon(
                        doc,
                        icons,
                        args.slide_number,
                        &args.icon_name,
                        color,
                        args.placement,
                        replace.as_ref(),
                    )
                })?)
            }
            "list_icons" => self.list_icons(decode(name, arguments)?),
            "modify_shape" => {
                let args: ModifyShapeArgs = decode(name, arguments)?;
                let target = args.shape.required()?;
                reply(self.session.mutate(|doc| {
                    modify::modify_shape(doc, args.slide_number, &target, &args.changes)
                })?)
            }
            "delete_shape" => {
                let args: DeleteShapeArgs = decode(name, arguments)?;
                let target = args.shape.required()?;
                reply(
                    self.session
                        .mutate(|doc| modify::delete_shape(doc, args.slide_number, &target))?,
                )
            }
            "find_and_replace" => {
                let args: FindReplaceArgs = decode(name, arguments)?;
                let scope = ReplaceScope {
                    slide: args.slide_number,
                    shape: args.shape.optional()?,
                };
                reply(self.session.mutate(|doc| {
                    modify::find_and_replace(
                        doc,
                        &scope,
                        &args.find_text,
                        &args.replace_text,
                        args.match_case,
                    )
                })?)
            }
            "get_table_content" => {
                let args: TableContentArgs = decode(name, arguments)?;
                let table = args.table.resolve()?;
                reply(self.session.read(|doc| {
                    modify::get_table_content(
                        doc,
                        args.slide_number,
                        &table,
                        args.include_formatting,
                    )
                })?)
            }
            "modify_table_cell" => {
                let args: TableCellArgs = decode(name, arguments)?;
                let table = args.table.resolve()?;
                reply(self.session.mutate(|doc| {
                    modify::modify_table_cell(
                        doc,
                        args.slide_number,
                        &table,
                        args.row,
                        args.column,
                        args.text.as_deref(),
                        &args.format,
                    )
                })?)
            }
            "evaluate" => {
                let args: EvaluateArgs = decode(name, arguments)?;
                reply(self.session.evaluate(&args.code, args.slide_number)?)
            }
            other => Err(DeckError::invalid(format!("unknown tool '{other}'"))),
        }
    }

    fn manage_presentation(&mut self, args: ManagePresentationArgs) -> DeckResult<Value> {
        match args.action {
            PresentationAction::Open => {
                let path = required(args.file_path, "file_path")?;
                reply(self.session.open(&path)?)
            }
            PresentationAction::Create => {
                let dimensions = match (args.width, args.height) {
                    (Some(width), Some(height)) => Some((width, height)),
                    (None, None) => None,
                    _ => {
                        return Err(DeckError::invalid(
                            "width and height must be given together",
                        ))
                    }
                };
                reply(self.session.create(args.file_path, dimensions)?)
            }
            PresentationAction::Save => {
                let path = self.session.save()?;
                reply(json!({ "saved": path }))
            }
            PresentationAction::SaveAs => {
                let path = required(args.save_path.or(args.file_path), "save_path")?;
                let path = self.session.save_as(&path)?;
                reply(json!({ "saved": path }))
            }
            PresentationAction::Close => reply(self.session.close(args.discard_unsaved)?),
        }
    }

    fn manage_slide(&mut self, args: ManageSlideArgs) -> DeckResult<Value> {
        let change = match args.action {
            SlideAction::Add => {
                let layout = match (&args.layout, args.layout_index) {
                    (Some(name), _) => SlideLayout::by_name(name)?,
                    (None, Some(index)) => SlideLayout::by_index(index)?,
                    (None, None) => &slides::LAYOUTS[slides::BLANK_LAYOUT],
                };
                self.session.mutate(|doc| {
                    slides::add_slide_with_layout(doc, args.target_position, layout)
                })?
            }
            SlideAction::Delete => {
                let number = required(args.slide_number, "slide_number")?;
                self.session
                    .mutate(|doc| slides::delete_slide(doc, number))?
            }
            SlideAction::Duplicate => {
                let number = required(args.slide_number, "slide_number")?;
                self.session
                    .mutate(|doc| slides::duplicate_slide(doc, number, args.target_position))?
            }
            SlideAction::Move => {
                let from = required(args.slide_number, "slide_number")?;
                let to = required(args.target_position, "target_position")?;
                self.session
                    .mutate(|doc| slides::move_slide(doc, from, to))?
            }
        };
        reply(change)
    }

    fn list_icons(&self, args: ListIconsArgs) -> DeckResult<Value> {
        let mut catalog = self.icons.catalog();
        if let Some(category) = args.category {
            let Some(names) = catalog.remove(&category) else {
                let known: Vec<_> = catalog.keys().cloned().collect();
                return Err(DeckError::invalid(format!(
                    "unknown icon category '{category}'; available: {}",
                    known.join(", ")
                )));
            };
            catalog.clear();
            catalog.insert(category, names);
        }
        let count: usize = catalog.values().map(Vec::len).sum();
        reply(json!({ "count": count, "categories": catalog }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::Path;

    use super::*;
    use deckpad_core::{Document, IconImage, PackageCodec};

    struct NullCodec;

    impl PackageCodec for NullCodec {
        fn load(&self, path: &Path) -> anyhow::Result<Document> {
            anyhow::bail!("cannot load {:?}", path)
        }

        fn save(&self, _document: &Document, _path: &Path) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct OneIcon;

    impl IconProvider for OneIcon {
        fn catalog(&self) -> BTreeMap<String, Vec<String>> {
            BTreeMap::from([("status".to_string(), vec!["check".to_string()])])
        }

        fn contains(&self, name: &str) -> bool {
            name == "check"
        }

        fn suggest(&self, _name: &str) -> Vec<String> {
            vec!["check".to_string()]
        }

        fn render(&self, name: &str, color: Rgb, pixel_size: u32) -> DeckResult<IconImage> {
            Ok(IconImage {
                name: name.to_string(),
                svg: format!(r#"<svg xmlns="http://www.w3.org/2000/svg" fill="{color}"/>"#),
                png: vec![0x89, b'P', b'N', b'G'],
                pixel_size,
            })
        }
    }

    fn toolbox() -> Toolbox {
        let session = Session::new(Arc::new(NullCodec));
        Toolbox::new(session, Arc::new(OneIcon), Rgb::new(0x33, 0x33, 0x33))
    }

    fn open_with_slide(tools: &mut Toolbox) {
        tools
            .call("manage_presentation", json!({ "action": "create" }))
            .unwrap();
        tools
            .call("manage_slide", json!({ "action": "add" }))
            .unwrap();
    }

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<_> = TOOLS.iter().map(|tool| tool.name).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert_eq!(total, 17);
    }

    #[test]
    fn mutations_need_an_open_presentation() {
        let mut tools = toolbox();
        let err = tools
            .call("add_textbox", json!({ "slide_number": 1, "text": "hi" }))
            .unwrap_err();
        assert_eq!(err.kind(), "NoOpenDocumentError");
    }

    #[test]
    fn bad_arguments_are_invalid_input() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        let err = tools
            .call("add_shape", json!({ "slide_number": 1, "shape_type": "blob" }))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
        let err = tools
            .call("add_textbox", json!({ "slide_number": 1, "text": "x", "color": "red" }))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
        let err = tools.call("no_such_tool", Value::Null).unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
    }

    #[test]
    fn textbox_then_replace_then_snapshot() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        let added = tools
            .call(
                "add_textbox",
                json!({
                    "slide_number": 1,
                    "text": "Hello world\\nSecond",
                    "bold": true,
                    "bullet": "dash",
                    "left": 2,
                }),
            )
            .unwrap();
        assert_eq!(added["slide"], 1);

        let report = tools
            .call(
                "find_and_replace",
                json!({ "find_text": "WORLD", "replace_text": "deck" }),
            )
            .unwrap();
        assert_eq!(report["replacements"], 1);

        let snapshot = tools
            .call("get_slide_snapshot", json!({ "slide_number": 1 }))
            .unwrap();
        let shape = &snapshot["shapes"][0];
        assert_eq!(shape["text"], "Hello deck\nSecond");
        assert_eq!(shape["left"], 2.0);

        let info = tools.call("get_presentation_info", Value::Null).unwrap();
        assert_eq!(info["state"], "dirty");
    }

    #[test]
    fn tables_are_addressed_by_index() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        tools
            .call(
                "add_table",
                json!({ "slide_number": 1, "rows": 2, "cols": 2, "data": [["a", "b"], ["c", "d"]] }),
            )
            .unwrap();
        tools
            .call(
                "modify_table_cell",
                json!({ "slide_number": 1, "row": 2, "column": 1, "text": "z", "bold": true }),
            )
            .unwrap();
        let content = tools
            .call("get_table_content", json!({ "slide_number": 1 }))
            .unwrap();
        assert_eq!(content["cells"], json!([["a", "b"], ["z", "d"]]));

        let err = tools
            .call(
                "modify_table_cell",
                json!({ "slide_number": 1, "row": 3, "column": 1, "text": "x" }),
            )
            .unwrap_err();
        assert_eq!(err.kind(), "CellIndexError");
    }

    #[test]
    fn icons_use_the_default_color_and_report_misses() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        tools
            .call("insert_icon", json!({ "slide_number": 1, "icon_name": "check" }))
            .unwrap();
        let snapshot = tools
            .call("get_slide_snapshot", json!({ "slide_number": 1 }))
            .unwrap();
        assert_eq!(snapshot["shapes"].as_array().unwrap().len(), 1);

        let err = tools
            .call("insert_icon", json!({ "slide_number": 1, "icon_name": "chek" }))
            .unwrap_err();
        assert_eq!(err.kind(), "IconNotFoundError");
        assert!(err.to_string().contains("check"));

        let listed = tools
            .call("list_icons", json!({ "category": "status" }))
            .unwrap();
        assert_eq!(listed["count"], 1);
        let err = tools
            .call("list_icons", json!({ "category": "nope" }))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
    }

    #[test]
    fn slides_move_and_close_guards_unsaved_work() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        tools
            .call("manage_slide", json!({ "action": "duplicate", "slide_number": 1 }))
            .unwrap();
        let moved = tools
            .call(
                "manage_slide",
                json!({ "action": "move", "slide_number": 2, "target_position": 1 }),
            )
            .unwrap();
        assert_eq!(moved["slide_count"], 2);

        let err = tools
            .call("manage_presentation", json!({ "action": "close" }))
            .unwrap_err();
        assert_eq!(err.kind(), "UnsavedChangesError");
        let closed = tools
            .call(
                "manage_presentation",
                json!({ "action": "close", "discard_unsaved": true }),
            )
            .unwrap();
        assert_eq!(closed["discarded_changes"], true);
    }

    #[test]
    fn slides_can_be_added_from_a_layout() {
        let mut tools = toolbox();
        tools
            .call("manage_presentation", json!({ "action": "create" }))
            .unwrap();
        let added = tools
            .call("manage_slide", json!({ "action": "add", "layout_index": 0 }))
            .unwrap();
        assert_eq!(added["layout"], "Title Slide");

        let snapshot = tools
            .call("get_slide_snapshot", json!({ "slide_number": 1 }))
            .unwrap();
        let title = &snapshot["shapes"][0];
        assert_eq!(title["placeholder"], "ctrTitle");
        tools
            .call(
                "modify_shape",
                json!({ "slide_number": 1, "shape_id": title["id"], "text": "Roadmap" }),
            )
            .unwrap();
        let info = tools.call("get_presentation_info", json!({})).unwrap();
        assert_eq!(info["slides"][0]["title"], "Roadmap");

        let named = tools
            .call("manage_slide", json!({ "action": "add", "layout": "Title Only" }))
            .unwrap();
        assert_eq!(named["slide"], 2);
        let err = tools
            .call("manage_slide", json!({ "action": "add", "layout_index": 12 }))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
    }

    #[test]
    fn evaluate_returns_faults_as_data() {
        let mut tools = toolbox();
        open_with_slide(&mut tools);
        let result = tools
            .call("evaluate", json!({ "code": "doc.slide_count" }))
            .unwrap();
        assert_eq!(result["ok"], true);
        let result = tools
            .call("evaluate", json!({ "code": "let x = ;" }))
            .unwrap();
        assert_eq!(result["ok"], false);
        assert_eq!(result["fault"]["kind"], "ParseError");
    }
}
