use serde::{Deserialize, Serialize};

use crate::error::{DeckError, DeckResult};
use crate::units::{Rgb, DEFAULT_SLIDE_HEIGHT, DEFAULT_SLIDE_WIDTH};

/// Character formatting carried by one run. `None` means inherited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font: Option<String>,
    /// Hundredths of a point.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub italic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<Rgb>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextRun {
    pub text: String,
    #[serde(flatten)]
    pub format: RunFormat,
}

impl TextRun {
    pub fn new(text: impl Into<String>, format: RunFormat) -> Self {
        Self {
            text: text.into(),
            format,
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(text, RunFormat::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bullet {
    /// Explicitly no bullet, even when the list style would add one.
    Disabled,
    Char(char),
    /// DrawingML auto-numbering scheme such as `arabicPeriod`.
    AutoNumber(String),
}

impl Bullet {
    pub fn describe(&self) -> String {
        match self {
            Bullet::Disabled => "none".to_string(),
            Bullet::Char(c) => format!("bullet:{c}"),
            Bullet::AutoNumber(scheme) => format!("numbered:{scheme}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Paragraph {
    pub runs: Vec<TextRun>,
    pub alignment: Option<Alignment>,
    pub level: u8,
    pub bullet: Option<Bullet>,
    /// Format of the end-of-paragraph mark; seeds runs added to an empty paragraph.
    pub end_format: RunFormat,
}

impl Paragraph {
    pub fn from_run(run: TextRun) -> Self {
        Self {
            end_format: run.format.clone(),
            runs: vec![run],
            ..Self::default()
        }
    }

    pub fn text(&self) -> String {
        self.runs.iter().map(|run| run.text.as_str()).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody {
    pub paragraphs: Vec<Paragraph>,
    pub word_wrap: bool,
}

impl Default for TextBody {
    fn default() -> Self {
        Self {
            paragraphs: vec![Paragraph::default()],
            word_wrap: true,
        }
    }
}

impl TextBody {
    pub fn from_paragraphs(paragraphs: Vec<Paragraph>) -> Self {
        Self {
            paragraphs,
            word_wrap: true,
        }
    }

    /// Paragraph texts joined with `\n`.
    pub fn text(&self) -> String {
        self.paragraphs
            .iter()
            .map(Paragraph::text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn runs_mut(&mut self) -> impl Iterator<Item = &mut TextRun> {
        self.paragraphs
            .iter_mut()
            .flat_map(|paragraph| paragraph.runs.iter_mut())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineStyle {
    pub color: Option<Rgb>,
    /// EMU.
    pub width: Option<i64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShapeStyle {
    pub fill: Option<Rgb>,
    pub line: Option<LineStyle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoShape {
    /// DrawingML preset geometry name, `rect`, `ellipse`, ...
    pub preset: String,
    pub text: TextBody,
}

/// Source crop as fractions of the image, as stored in `a:srcRect`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Crop {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Crop {
    pub fn is_empty(&self) -> bool {
        self.left == 0.0 && self.top == 0.0 && self.right == 0.0 && self.bottom == 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    pub extension: String,
    pub content_type: String,
}

impl MediaType {
    pub fn new(extension: &str, content_type: &str) -> Self {
        Self {
            extension: extension.to_string(),
            content_type: content_type.to_string(),
        }
    }

    pub fn png() -> Self {
        Self::new("png", "image/png")
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let media = match extension.to_ascii_lowercase().as_str() {
            "png" => Self::png(),
            "jpg" | "jpeg" => Self::new("jpeg", "image/jpeg"),
            "gif" => Self::new("gif", "image/gif"),
            "bmp" => Self::new("bmp", "image/bmp"),
            "tif" | "tiff" => Self::new("tiff", "image/tiff"),
            "emf" => Self::new("emf", "image/x-emf"),
            "wmf" => Self::new("wmf", "image/x-wmf"),
            "svg" => Self::new("svg", "image/svg+xml"),
            _ => return None,
        };
        Some(media)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub data: Vec<u8>,
    pub media: MediaType,
    pub crop: Crop,
    pub description: String,
}

/// A recolored vector icon with its raster fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconPicture {
    pub name: String,
    pub color: Rgb,
    pub svg: String,
    pub png: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCell {
    pub body: TextBody,
    pub fill: Option<Rgb>,
}

impl TableCell {
    pub fn with_text(text: &str) -> Self {
        let mut body = TextBody::default();
        body.set_text(text);
        Self { body, fill: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub rows: Vec<Vec<TableCell>>,
    pub column_widths: Vec<i64>,
    pub row_heights: Vec<i64>,
}

impl Table {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.column_widths.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Column,
    Line,
    Pie,
    Area,
}

impl ChartKind {
    pub fn name(&self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Column => "column",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Area => "area",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub kind: ChartKind,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    TextBox(TextBody),
    AutoShape(AutoShape),
    Picture(Picture),
    Icon(IconPicture),
    Table(Table),
    Chart(Chart),
}

impl ShapeKind {
    pub fn name(&self) -> &'static str {
        match self {
            ShapeKind::TextBox(_) => "text_box",
            ShapeKind::AutoShape(_) => "auto_shape",
            ShapeKind::Picture(_) => "picture",
            ShapeKind::Icon(_) => "icon",
            ShapeKind::Table(_) => "table",
            ShapeKind::Chart(_) => "chart",
        }
    }

    /// Prefix PowerPoint uses when naming a fresh shape of this kind.
    pub fn name_prefix(&self) -> &'static str {
        match self {
            ShapeKind::TextBox(_) => "TextBox",
            ShapeKind::AutoShape(_) => "Shape",
            ShapeKind::Picture(_) => "Picture",
            ShapeKind::Icon(_) => "Graphic",
            ShapeKind::Table(_) => "Table",
            ShapeKind::Chart(_) => "Chart",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub id: u32,
    pub name: String,
    pub geometry: Geometry,
    /// Clockwise degrees.
    pub rotation: f64,
    pub style: ShapeStyle,
    /// Placeholder type (`title`, `body`, ...) when the shape fills a layout slot.
    pub placeholder: Option<String>,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn text_body(&self) -> Option<&TextBody> {
        match &self.kind {
            ShapeKind::TextBox(body) => Some(body),
            ShapeKind::AutoShape(shape) => Some(&shape.text),
            _ => None,
        }
    }

    pub fn text_body_mut(&mut self) -> Option<&mut TextBody> {
        match &mut self.kind {
            ShapeKind::TextBox(body) => Some(body),
            ShapeKind::AutoShape(shape) => Some(&mut shape.text),
            _ => None,
        }
    }

    pub fn table(&self) -> Option<&Table> {
        match &self.kind {
            ShapeKind::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn table_mut(&mut self) -> Option<&mut Table> {
        match &mut self.kind {
            ShapeKind::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn is_title(&self) -> bool {
        matches!(self.placeholder.as_deref(), Some("title" | "ctrTitle"))
    }
}

/// Shapes in paint order: index 0 is the bottom of the z-order.
#[derive(Debug, Clone, PartialEq)]
pub struct Slide {
    pub layout: String,
    pub shapes: Vec<Shape>,
    next_shape_id: u64,
}

impl Default for Slide {
    fn default() -> Self {
        Self::new("Blank")
    }
}

impl Slide {
    pub fn new(layout: impl Into<String>) -> Self {
        // id 1 belongs to the slide's own shape tree
        Self {
            layout: layout.into(),
            shapes: Vec::new(),
            next_shape_id: 2,
        }
    }

    pub fn from_shapes(layout: impl Into<String>, shapes: Vec<Shape>) -> Self {
        let next_shape_id = shapes
            .iter()
            .map(|shape| u64::from(shape.id))
            .max()
            .unwrap_or(1)
            + 1;
        Self {
            layout: layout.into(),
            shapes,
            next_shape_id: next_shape_id.max(2),
        }
    }

    /// Builds a shape with a fresh id and a default name such as `TextBox 3`.
    ///
    /// Ids are never reused within a slide, even after deletions.
    pub fn new_shape(&mut self, geometry: Geometry, kind: ShapeKind) -> DeckResult<Shape> {
        let id = u32::try_from(self.next_shape_id)
            .map_err(|_| DeckError::invalid("slide has no shape ids left"))?;
        self.next_shape_id += 1;
        Ok(Shape {
            id,
            name: format!("{} {}", kind.name_prefix(), id - 1),
            geometry,
            rotation: 0.0,
            style: ShapeStyle::default(),
            placeholder: None,
            kind,
        })
    }

    pub fn title(&self) -> Option<String> {
        self.shapes
            .iter()
            .find(|shape| shape.is_title())
            .and_then(Shape::text_body)
            .map(TextBody::text)
            .filter(|text| !text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub slides: Vec<Slide>,
    /// Slide width in EMU.
    pub width: i64,
    /// Slide height in EMU.
    pub height: i64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new(DEFAULT_SLIDE_WIDTH, DEFAULT_SLIDE_HEIGHT)
    }
}

impl Document {
    pub fn new(width: i64, height: i64) -> Self {
        Self {
            slides: Vec::new(),
            width,
            height,
        }
    }

    pub fn slide_count(&self) -> usize {
        self.slides.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_ids_are_not_reused_after_removal() {
        let mut slide = Slide::default();
        let first = slide.new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default())).unwrap();
        slide.shapes.push(first);
        let second = slide.new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default())).unwrap();
        assert_eq!(second.id, 3);
        assert_eq!(second.name, "TextBox 2");
        slide.shapes.push(second);
        slide.shapes.pop();
        let third = slide.new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default())).unwrap();
        assert_eq!(third.id, 4);
    }

    #[test]
    fn loaded_slides_continue_after_highest_id() {
        let mut seed = Slide::default();
        let mut shape = seed.new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default())).unwrap();
        shape.id = 40;
        let mut slide = Slide::from_shapes("Title Only", vec![shape]);
        let next = slide.new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default())).unwrap();
        assert_eq!(next.id, 41);
    }

    #[test]
    fn exhausted_ids_are_an_error() {
        let mut seed = Slide::default();
        let mut shape = seed
            .new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default()))
            .unwrap();
        shape.id = u32::MAX;
        let mut slide = Slide::from_shapes("Blank", vec![shape]);
        let err = slide
            .new_shape(Geometry::default(), ShapeKind::TextBox(TextBody::default()))
            .unwrap_err();
        assert_eq!(err.kind(), "InvalidInputError");
    }

    #[test]
    fn body_text_joins_paragraphs() {
        let body = TextBody::from_paragraphs(vec![
            Paragraph::from_run(TextRun::plain("one")),
            Paragraph {
                runs: vec![TextRun::plain("tw"), TextRun::plain("o")],
                ..Paragraph::default()
            },
        ]);
        assert_eq!(body.text(), "one\ntwo");
    }
}
