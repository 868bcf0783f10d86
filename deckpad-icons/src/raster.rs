use anyhow::Result;
use png::{BitDepth, ColorType, Encoder};

/// Straight-alpha RGBA pixels.
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

pub fn encode_png(raster: &Raster) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut encoder = Encoder::new(&mut buffer, raster.width, raster.height);
    encoder.set_color(ColorType::Rgba);
    encoder.set_depth(BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&raster.pixels)?;
    writer.finish()?;
    Ok(buffer)
}

/// Rasterizes into a `pixel_size` square, scaled to fit and centered.
#[cfg(feature = "raster")]
pub fn rasterize(svg: &str, pixel_size: u32) -> Result<Raster> {
    use anyhow::{anyhow, Context};
    use resvg::tiny_skia::{Pixmap, Transform};
    use resvg::usvg::{Options, Tree};

    let tree = Tree::from_str(svg, &Options::default()).context("failed to parse svg")?;
    let side = pixel_size.max(1);
    let mut pixmap =
        Pixmap::new(side, side).ok_or_else(|| anyhow!("cannot allocate {side}px pixmap"))?;

    let size = tree.size();
    let scale = side as f32 / size.width().max(size.height());
    let dx = (side as f32 - size.width() * scale) / 2.0;
    let dy = (side as f32 - size.height() * scale) / 2.0;
    let transform = Transform::from_scale(scale, scale).post_translate(dx, dy);
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    let capacity = (side as usize)
        .checked_mul(side as usize)
        .and_then(|area| area.checked_mul(4))
        .ok_or_else(|| anyhow!("{side}px raster is too large"))?;
    let mut pixels = Vec::with_capacity(capacity);
    for pixel in pixmap.pixels() {
        let color = pixel.demultiply();
        pixels.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
    }
    Ok(Raster {
        width: side,
        height: side,
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn png_header_carries_dimensions() {
        let raster = Raster {
            width: 3,
            height: 2,
            pixels: vec![255; 3 * 2 * 4],
        };
        let bytes = encode_png(&raster).unwrap();
        let decoder = png::Decoder::new(bytes.as_slice());
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().width, 3);
        assert_eq!(reader.info().height, 2);
    }

    #[cfg(feature = "raster")]
    #[test]
    fn square_icon_fills_the_requested_size() {
        let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10" fill="#FF0000"><rect x="0" y="0" width="10" height="10"/></svg>"##;
        let raster = rasterize(svg, 96).unwrap();
        assert_eq!((raster.width, raster.height), (96, 96));
        let center = ((48 * 96 + 48) * 4) as usize;
        assert_eq!(&raster.pixels[center..center + 4], &[255, 0, 0, 255]);
    }
}
