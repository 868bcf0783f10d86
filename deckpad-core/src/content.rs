use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::backend::IconProvider;
use crate::error::{DeckError, DeckResult};
use crate::model::{
    Alignment, AutoShape, Bullet, Chart, ChartKind, ChartSeries, Crop, Document, Geometry,
    IconPicture, LineStyle, MediaType, Paragraph, Picture, RunFormat, Shape, ShapeKind, Table,
    TableCell, TextBody, TextRun,
};
use crate::resolve::{resolve_slide_mut, shape_position, slide_index, ShapeRef};
use crate::units::{
    check_extent, emu_to_inches, extent_to_emu, font_size_to_centipoints, inches_to_emu,
    points_to_emu, Placement, Rgb, EMU_PER_INCH,
};

/// Handle for addressing a shape in follow-up calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeIdentity {
    pub slide: usize,
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulletStyle {
    Bullet,
    Dash,
    Arrow,
    Check,
    Square,
    Circle,
    Diamond,
    Star,
    Number,
    NumberParen,
    Roman,
    RomanUpper,
    Letter,
    LetterUpper,
    None,
}

impl BulletStyle {
    pub fn bullet(self) -> Bullet {
        match self {
            BulletStyle::Bullet => Bullet::Char('•'),
            BulletStyle::Dash => Bullet::Char('–'),
            BulletStyle::Arrow => Bullet::Char('→'),
            BulletStyle::Check => Bullet::Char('✓'),
            BulletStyle::Square => Bullet::Char('■'),
            BulletStyle::Circle => Bullet::Char('●'),
            BulletStyle::Diamond => Bullet::Char('◆'),
            BulletStyle::Star => Bullet::Char('★'),
            BulletStyle::Number => Bullet::AutoNumber("arabicPeriod".into()),
            BulletStyle::NumberParen => Bullet::AutoNumber("arabicParenR".into()),
            BulletStyle::Roman => Bullet::AutoNumber("romanLcPeriod".into()),
            BulletStyle::RomanUpper => Bullet::AutoNumber("romanUcPeriod".into()),
            BulletStyle::Letter => Bullet::AutoNumber("alphaLcPeriod".into()),
            BulletStyle::LetterUpper => Bullet::AutoNumber("alphaUcPeriod".into()),
            BulletStyle::None => Bullet::Disabled,
        }
    }
}

/// Character and paragraph formatting requested by a caller.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextFormat {
    pub font_name: Option<String>,
    /// Points.
    pub font_size: Option<f64>,
    pub bold: Option<bool>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub color: Option<Rgb>,
    pub alignment: Option<Alignment>,
    pub bullet: Option<BulletStyle>,
}

impl TextFormat {
    pub fn is_empty(&self) -> bool {
        *self == TextFormat::default()
    }

    /// Run format for freshly created text.
    pub fn run_format(&self) -> DeckResult<RunFormat> {
        let mut format = RunFormat::default();
        self.overlay(&mut format)?;
        Ok(format)
    }

    fn overlay(&self, format: &mut RunFormat) -> DeckResult<()> {
        if let Some(size) = self.font_size {
            format.size = Some(font_size_to_centipoints(size)?);
        }
        if let Some(font) = &self.font_name {
            format.font = Some(font.clone());
        }
        if let Some(bold) = self.bold {
            format.bold = Some(bold);
        }
        if let Some(italic) = self.italic {
            format.italic = Some(italic);
        }
        if let Some(underline) = self.underline {
            format.underline = Some(underline);
        }
        if let Some(color) = self.color {
            format.color = Some(color);
        }
        Ok(())
    }

    /// Applies the requested attributes to every run and paragraph of `body`,
    /// leaving unspecified attributes as they are.
    pub fn apply(&self, body: &mut TextBody) -> DeckResult<()> {
        if let Some(size) = self.font_size {
            font_size_to_centipoints(size)?;
        }
        for paragraph in &mut body.paragraphs {
            for run in &mut paragraph.runs {
                self.overlay(&mut run.format)?;
            }
            self.overlay(&mut paragraph.end_format)?;
            if let Some(alignment) = self.alignment {
                paragraph.alignment = Some(alignment);
            }
            if let Some(bullet) = self.bullet {
                paragraph.bullet = Some(bullet.bullet());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitMode {
    Fill,
    Fit,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoShapeKind {
    Rectangle,
    RoundedRectangle,
    Oval,
    Triangle,
    RightArrow,
    LeftArrow,
    UpArrow,
    DownArrow,
    Star,
    Pentagon,
    Hexagon,
    Diamond,
    Line,
}

impl AutoShapeKind {
    pub fn preset(self) -> &'static str {
        match self {
            AutoShapeKind::Rectangle => "rect",
            AutoShapeKind::RoundedRectangle => "roundRect",
            AutoShapeKind::Oval => "ellipse",
            AutoShapeKind::Triangle => "triangle",
            AutoShapeKind::RightArrow => "rightArrow",
            AutoShapeKind::LeftArrow => "leftArrow",
            AutoShapeKind::UpArrow => "upArrow",
            AutoShapeKind::DownArrow => "downArrow",
            AutoShapeKind::Star => "star5",
            AutoShapeKind::Pentagon => "pentagon",
            AutoShapeKind::Hexagon => "hexagon",
            AutoShapeKind::Diamond => "diamond",
            AutoShapeKind::Line => "line",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShapeStyleOptions {
    pub fill_color: Option<Rgb>,
    pub line_color: Option<Rgb>,
    /// Points.
    pub line_width: Option<f64>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct IconPlacement {
    pub left: Option<f64>,
    pub top: Option<f64>,
    /// Side of the square icon, inches.
    pub size: Option<f64>,
}

const TEXTBOX_DEFAULTS: [f64; 4] = [1.0, 1.0, 8.0, 1.0];
const SHAPE_DEFAULTS: [f64; 4] = [1.0, 1.0, 2.0, 2.0];
const TABLE_DEFAULTS: [f64; 4] = [1.0, 2.0, 8.0, 3.0];
const CHART_DEFAULTS: [f64; 4] = [1.0, 2.0, 8.0, 4.5];
const IMAGE_DPI: i64 = 72;
const ICON_DPI: f64 = 96.0;
const MIN_ICON_PIXELS: u32 = 96;
const MAX_ICON_PIXELS: u32 = 2048;

/// Resolves a placement against default inches `[left, top, width, height]`.
fn place(placement: &Placement, defaults: [f64; 4]) -> DeckResult<Geometry> {
    Ok(Geometry {
        left: inches_to_emu(placement.left.unwrap_or(defaults[0]))?,
        top: inches_to_emu(placement.top.unwrap_or(defaults[1]))?,
        width: extent_to_emu("width", placement.width.unwrap_or(defaults[2]))?,
        height: extent_to_emu("height", placement.height.unwrap_or(defaults[3]))?,
    })
}

/// Explicit placement values win over an inherited frame.
fn place_over(placement: &Placement, frame: Geometry) -> DeckResult<Geometry> {
    place(
        placement,
        [
            emu_to_inches(frame.left),
            emu_to_inches(frame.top),
            emu_to_inches(frame.width),
            emu_to_inches(frame.height),
        ],
    )
}

/// Turns the literal escapes `\n` and `\t` into the characters they name.
pub fn unescape_input(text: &str) -> String {
    text.replace("\\n", "\n").replace("\\t", "\t")
}

fn paragraphs_for(text: &str, run_format: &RunFormat, format: &TextFormat) -> Vec<Paragraph> {
    text.split('\n')
        .map(|line| Paragraph {
            runs: if line.is_empty() {
                Vec::new()
            } else {
                vec![TextRun::new(line, run_format.clone())]
            },
            alignment: format.alignment,
            level: 0,
            bullet: format.bullet.map(BulletStyle::bullet),
            end_format: run_format.clone(),
        })
        .collect()
}

/// Frame of the shape a new one is about to replace, with its z-position.
fn replacement_target(
    doc: &Document,
    slide: usize,
    target: Option<&ShapeRef>,
) -> DeckResult<Option<(usize, Geometry)>> {
    let Some(target) = target else {
        return Ok(None);
    };
    let idx = slide_index(doc, slide)?;
    let pos = shape_position(&doc.slides[idx], slide, target)?;
    Ok(Some((pos, doc.slides[idx].shapes[pos].geometry)))
}

/// Adds a freshly built shape, taking the z-position of a replaced one.
fn install(
    doc: &mut Document,
    slide: usize,
    geometry: Geometry,
    kind: ShapeKind,
    replacing: Option<usize>,
) -> DeckResult<ShapeIdentity> {
    install_with(doc, slide, geometry, kind, replacing, |_| {})
}

fn install_with(
    doc: &mut Document,
    slide: usize,
    geometry: Geometry,
    kind: ShapeKind,
    replacing: Option<usize>,
    configure: impl FnOnce(&mut Shape),
) -> DeckResult<ShapeIdentity> {
    let target = resolve_slide_mut(doc, slide)?;
    let mut shape = target.new_shape(geometry, kind)?;
    configure(&mut shape);
    let identity = ShapeIdentity {
        slide,
        id: shape.id,
        name: shape.name.clone(),
    };
    match replacing {
        Some(pos) => {
            let removed = target.shapes.remove(pos);
            debug!(replaced = removed.id, id = identity.id, "replaced shape");
            target.shapes.insert(pos, shape);
        }
        None => target.shapes.push(shape),
    }
    Ok(identity)
}

#[instrument(skip(doc, text, format))]
pub fn add_textbox(
    doc: &mut Document,
    slide: usize,
    text: &str,
    placement: Placement,
    format: &TextFormat,
) -> DeckResult<ShapeIdentity> {
    slide_index(doc, slide)?;
    let geometry = place(&placement, TEXTBOX_DEFAULTS)?;
    let run_format = format.run_format()?;
    let body = TextBody::from_paragraphs(paragraphs_for(
        &unescape_input(text),
        &run_format,
        format,
    ));
    install(doc, slide, geometry, ShapeKind::TextBox(body), None)
}

/// Detects the image container and reads its pixel size without decoding.
pub fn probe_image(data: &[u8]) -> DeckResult<(MediaType, (u32, u32))> {
    let reader = image::ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|err| DeckError::invalid(format!("cannot inspect image: {err}")))?;
    let media = match reader.format() {
        Some(image::ImageFormat::Png) => MediaType::png(),
        Some(image::ImageFormat::Jpeg) => MediaType::new("jpeg", "image/jpeg"),
        Some(image::ImageFormat::Gif) => MediaType::new("gif", "image/gif"),
        Some(image::ImageFormat::Bmp) => MediaType::new("bmp", "image/bmp"),
        Some(other) => {
            return Err(DeckError::invalid(format!(
                "unsupported image format {other:?}"
            )))
        }
        None => return Err(DeckError::invalid("unrecognized image data")),
    };
    let dimensions = reader
        .into_dimensions()
        .map_err(|err| DeckError::invalid(format!("cannot read image size: {err}")))?;
    Ok((media, dimensions))
}

/// Reconciles an image's pixel aspect ratio with a target frame.
pub fn fit_picture(pixels: (u32, u32), frame: Geometry, mode: FitMode) -> (Geometry, Crop) {
    let image_w = f64::from(pixels.0.max(1));
    let image_h = f64::from(pixels.1.max(1));
    let frame_w = frame.width as f64;
    let frame_h = frame.height as f64;
    match mode {
        FitMode::Stretch => (frame, Crop::default()),
        FitMode::Fill => {
            let mut crop = Crop::default();
            let image_aspect = image_w / image_h;
            let frame_aspect = frame_w / frame_h;
            if image_aspect > frame_aspect {
                let scaled = image_w * (frame_h / image_h);
                let excess = (scaled - frame_w) / scaled / 2.0;
                crop.left = excess;
                crop.right = excess;
            } else if image_aspect < frame_aspect {
                let scaled = image_h * (frame_w / image_w);
                let excess = (scaled - frame_h) / scaled / 2.0;
                crop.top = excess;
                crop.bottom = excess;
            }
            (frame, crop)
        }
        FitMode::Fit => {
            let scale = (frame_w / image_w).min(frame_h / image_h);
            let width = (image_w * scale).round() as i64;
            let height = (image_h * scale).round() as i64;
            let fitted = Geometry {
                left: frame.left + (frame.width - width) / 2,
                top: frame.top + (frame.height - height) / 2,
                width,
                height,
            };
            (fitted, Crop::default())
        }
    }
}

#[instrument(skip(doc, placement))]
pub fn add_image(
    doc: &mut Document,
    slide: usize,
    source: &Path,
    placement: Placement,
    fit: Option<FitMode>,
    replace: Option<&ShapeRef>,
) -> DeckResult<ShapeIdentity> {
    slide_index(doc, slide)?;
    let target = replacement_target(doc, slide, replace)?;
    let data = fs::read(source).map_err(|err| {
        DeckError::invalid(format!("cannot read image {}: {err}", source.display()))
    })?;
    let (media, pixels) = probe_image(&data)?;

    let frame = match target {
        Some((_, geometry)) => place_over(&placement, geometry)?,
        None => {
            let emu_per_pixel = EMU_PER_INCH / IMAGE_DPI;
            let native_w = i64::from(pixels.0.max(1)) * emu_per_pixel;
            let native_h = i64::from(pixels.1.max(1)) * emu_per_pixel;
            let (width, height) = match (placement.width, placement.height) {
                (Some(w), Some(h)) => (extent_to_emu("width", w)?, extent_to_emu("height", h)?),
                (Some(w), None) => {
                    let width = extent_to_emu("width", w)?;
                    (width, (width as f64 * native_h as f64 / native_w as f64).round() as i64)
                }
                (None, Some(h)) => {
                    let height = extent_to_emu("height", h)?;
                    ((height as f64 * native_w as f64 / native_h as f64).round() as i64, height)
                }
                (None, None) => (native_w, native_h),
            };
            Geometry {
                left: inches_to_emu(placement.left.unwrap_or(1.0))?,
                top: inches_to_emu(placement.top.unwrap_or(1.0))?,
                width: check_extent("width", width.max(1))?,
                height: check_extent("height", height.max(1))?,
            }
        }
    };
    let mode = fit.unwrap_or(if target.is_some() {
        FitMode::Fill
    } else {
        FitMode::Stretch
    });
    let (geometry, crop) = fit_picture(pixels, frame, mode);
    let description = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let picture = Picture {
        data,
        media,
        crop,
        description,
    };
    install(
        doc,
        slide,
        geometry,
        ShapeKind::Picture(picture),
        target.map(|(pos, _)| pos),
    )
}

#[instrument(skip(doc, placement, style))]
pub fn add_shape(
    doc: &mut Document,
    slide: usize,
    kind: AutoShapeKind,
    placement: Placement,
    style: &ShapeStyleOptions,
) -> DeckResult<ShapeIdentity> {
    slide_index(doc, slide)?;
    let geometry = place(&placement, SHAPE_DEFAULTS)?;
    let line_width = style.line_width.map(points_to_emu).transpose()?;
    let mut text = TextBody::default();
    if let Some(initial) = &style.text {
        text.set_text(&unescape_input(initial));
    }
    let shape = AutoShape {
        preset: kind.preset().to_string(),
        text,
    };
    let line = if style.line_color.is_some() || line_width.is_some() {
        Some(LineStyle {
            color: style.line_color,
            width: line_width,
        })
    } else {
        None
    };
    install_with(
        doc,
        slide,
        geometry,
        ShapeKind::AutoShape(shape),
        None,
        |shape| {
            shape.style.fill = style.fill_color;
            shape.style.line = line;
        },
    )
}

fn split_evenly(total: i64, parts: usize) -> Vec<i64> {
    let parts_i64 = parts as i64;
    let base = total / parts_i64;
    let mut sizes = vec![base; parts];
    if let Some(last) = sizes.last_mut() {
        *last += total - base * parts_i64;
    }
    sizes
}

#[instrument(skip(doc, data, placement))]
pub fn add_table(
    doc: &mut Document,
    slide: usize,
    rows: usize,
    columns: usize,
    data: Option<&[Vec<String>]>,
    placement: Placement,
    replace: Option<&ShapeRef>,
) -> DeckResult<ShapeIdentity> {
    if rows == 0 || columns == 0 {
        return Err(DeckError::invalid(format!(
            "a table needs at least one row and one column, got {rows}x{columns}"
        )));
    }
    if let Some(data) = data {
        if data.len() != rows {
            return Err(DeckError::TableShapeMismatch {
                rows,
                columns,
                detail: format!("data has {} rows", data.len()),
            });
        }
        if let Some((idx, row)) = data.iter().enumerate().find(|(_, row)| row.len() != columns) {
            return Err(DeckError::TableShapeMismatch {
                rows,
                columns,
                detail: format!("row {} has {} cells", idx + 1, row.len()),
            });
        }
    }
    slide_index(doc, slide)?;
    let target = replacement_target(doc, slide, replace)?;
    let geometry = match target {
        Some((_, frame)) => place_over(&placement, frame)?,
        None => place(&placement, TABLE_DEFAULTS)?,
    };

    let cells = (0..rows)
        .map(|row| {
            (0..columns)
                .map(|column| {
                    let text = data
                        .and_then(|data| data.get(row))
                        .and_then(|cells| cells.get(column))
                        .map(String::as_str)
                        .unwrap_or("");
                    TableCell::with_text(&unescape_input(text))
                })
                .collect()
        })
        .collect();
    let table = Table {
        rows: cells,
        column_widths: split_evenly(geometry.width, columns),
        row_heights: split_evenly(geometry.height, rows),
    };
    install(
        doc,
        slide,
        geometry,
        ShapeKind::Table(table),
        target.map(|(pos, _)| pos),
    )
}

#[instrument(skip(doc, categories, series, placement))]
pub fn add_chart(
    doc: &mut Document,
    slide: usize,
    kind: ChartKind,
    categories: Vec<String>,
    series: Vec<ChartSeries>,
    placement: Placement,
) -> DeckResult<ShapeIdentity> {
    if categories.is_empty() {
        return Err(DeckError::invalid("a chart needs at least one category"));
    }
    if series.is_empty() {
        return Err(DeckError::invalid("a chart needs at least one series"));
    }
    for entry in &series {
        if entry.values.len() != categories.len() {
            return Err(DeckError::invalid(format!(
                "series '{}' has {} values for {} categories",
                entry.name,
                entry.values.len(),
                categories.len()
            )));
        }
        if entry.values.iter().any(|value| !value.is_finite()) {
            return Err(DeckError::invalid(format!(
                "series '{}' contains a non-finite value",
                entry.name
            )));
        }
    }
    slide_index(doc, slide)?;
    let geometry = place(&placement, CHART_DEFAULTS)?;
    let chart = Chart {
        kind,
        categories,
        series,
    };
    install(doc, slide, geometry, ShapeKind::Chart(chart), None)
}

/// Pixel size of the raster fallback for an icon `size` EMU wide.
/// Always between 96 and 2048 pixels.
pub fn icon_pixel_size(size: i64) -> u32 {
    let pixels = (emu_to_inches(size) * ICON_DPI).round();
    pixels.clamp(f64::from(MIN_ICON_PIXELS), f64::from(MAX_ICON_PIXELS)) as u32
}

#[instrument(skip(doc, icons, placement))]
pub fn insert_icon(
    doc: &mut Document,
    icons: &dyn IconProvider,
    slide: usize,
    name: &str,
    color: Rgb,
    placement: IconPlacement,
    replace: Option<&ShapeRef>,
) -> DeckResult<ShapeIdentity> {
    slide_index(doc, slide)?;
    if !icons.contains(name) {
        return Err(DeckError::icon_not_found(name, &icons.suggest(name)));
    }
    let target = replacement_target(doc, slide, replace)?;
    let (left, top, size) = match target {
        Some((_, frame)) => (frame.left, frame.top, frame.width.min(frame.height)),
        None => (EMU_PER_INCH, EMU_PER_INCH, EMU_PER_INCH),
    };
    let geometry = Geometry {
        left: placement.left.map(inches_to_emu).transpose()?.unwrap_or(left),
        top: placement.top.map(inches_to_emu).transpose()?.unwrap_or(top),
        width: placement
            .size
            .map(|size| extent_to_emu("size", size))
            .transpose()?
            .unwrap_or(size),
        height: 0,
    };
    let geometry = Geometry {
        height: geometry.width,
        ..geometry
    };

    let rendered = icons.render(name, color, icon_pixel_size(geometry.width))?;
    let icon = IconPicture {
        name: rendered.name,
        color,
        svg: rendered.svg,
        png: rendered.png,
    };
    install(
        doc,
        slide,
        geometry,
        ShapeKind::Icon(icon),
        target.map(|(pos, _)| pos),
    )
}
