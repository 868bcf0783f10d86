use std::io::Cursor;

use anyhow::{Context, Result};
use deckpad_core::Rgb;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

/// Rewrites an icon's fills to a single color.
///
/// Every `fill` attribute other than `fill="none"` is dropped and the root
/// `<svg>` element gets `fill="#RRGGBB"`, so child shapes inherit it. Strokes
/// are left alone; the bundle is fill-based.
pub fn recolor_svg(svg: &str, color: Rgb) -> Result<String> {
    let mut reader = Reader::from_str(svg);
    reader.config_mut().trim_text(false);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(svg.len() + 32)));
    let fill = color.to_string();
    let mut root_seen = false;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed svg at byte {}", reader.buffer_position()))?;
        match event {
            Event::Start(start) => {
                let rebuilt = rewrite_fills(&start, &fill, &mut root_seen)?;
                writer.write_event(Event::Start(rebuilt))?;
            }
            Event::Empty(start) => {
                let rebuilt = rewrite_fills(&start, &fill, &mut root_seen)?;
                writer.write_event(Event::Empty(rebuilt))?;
            }
            Event::Eof => break,
            other => writer.write_event(other)?,
        }
    }

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).context("recolored svg is not utf-8")
}

fn rewrite_fills<'a>(
    start: &BytesStart<'a>,
    fill: &str,
    root_seen: &mut bool,
) -> Result<BytesStart<'a>> {
    let is_root = !*root_seen && start.local_name().as_ref() == b"svg";
    let mut rebuilt = start.clone();
    rebuilt.clear_attributes();
    for attr in start.attributes() {
        let attr = attr.context("malformed svg attribute")?;
        if attr.key.as_ref() == b"fill" && attr.value.as_ref() != b"none" {
            continue;
        }
        rebuilt.push_attribute(attr);
    }
    if is_root {
        *root_seen = true;
        rebuilt.push_attribute(Attribute::from(("fill", fill)));
    }
    Ok(rebuilt)
}
