//! Watermark image preparation: decode, scale, rotate, fade.

use super::WatermarkSpec;
use crate::error::{Result, RptError};
use image::imageops::{self, FilterType};
use image::{ImageError, Rgba, RgbaImage};

/// The transformed mark, split into the planes the PDF overlay embeds.
pub struct PreparedMark {
    pub width: u32,
    pub height: u32,
    /// Interleaved 8-bit RGB rows.
    pub rgb: Vec<u8>,
    /// 8-bit alpha plane (the SMask).
    pub alpha: Vec<u8>,
}

/// Decode and transform the watermark for one page geometry.
///
/// The mark's longer edge is scaled to `0.30 × min(page_w, page_h) × scale`
/// with a floor of 50 units; one pixel of the prepared mark maps to one
/// PDF user-space unit.
pub fn prepare(spec: &WatermarkSpec, page_w: f64, page_h: f64) -> Result<PreparedMark> {
    let decoded = image::open(&spec.image).map_err(|e| match e {
        ImageError::IoError(io) if io.kind() == std::io::ErrorKind::NotFound => {
            RptError::FileNotFound(spec.image.clone())
        }
        ImageError::IoError(io) => RptError::Read(io),
        other => RptError::InvalidArguments(format!(
            "cannot decode watermark image {}: {other}",
            spec.image.display()
        )),
    })?;
    let mut rgba = decoded.to_rgba8();

    let base = (0.30 * page_w.min(page_h) * spec.scale).max(50.0);
    let longer = u32::max(rgba.width(), rgba.height()) as f64;
    let factor = base / longer;
    let new_w = ((rgba.width() as f64 * factor).round() as u32).max(1);
    let new_h = ((rgba.height() as f64 * factor).round() as u32).max(1);
    rgba = imageops::resize(&rgba, new_w, new_h, FilterType::Triangle);

    let angle = spec.rotation.rem_euclid(360.0);
    rgba = if angle == 0.0 {
        rgba
    } else if angle == 90.0 {
        imageops::rotate270(&rgba) // counter-clockwise quarter turn
    } else if angle == 180.0 {
        imageops::rotate180(&rgba)
    } else if angle == 270.0 {
        imageops::rotate90(&rgba)
    } else {
        rotate_bilinear(&rgba, angle.to_radians())
    };

    let fade = (spec.opacity / 100.0).clamp(0.0, 1.0);
    let (width, height) = (rgba.width(), rgba.height());
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push((f64::from(pixel.0[3]) * fade).round() as u8);
    }

    Ok(PreparedMark {
        width,
        height,
        rgb,
        alpha,
    })
}

/// Rotate by an arbitrary angle into an enlarged transparent canvas,
/// sampling the source bilinearly through the inverse mapping.
fn rotate_bilinear(src: &RgbaImage, radians: f64) -> RgbaImage {
    let (sw, sh) = (src.width() as f64, src.height() as f64);
    let (sin, cos) = radians.sin_cos();
    let dw = (sw * cos.abs() + sh * sin.abs()).ceil() as u32;
    let dh = (sw * sin.abs() + sh * cos.abs()).ceil() as u32;

    let (scx, scy) = (sw / 2.0, sh / 2.0);
    let (dcx, dcy) = (f64::from(dw) / 2.0, f64::from(dh) / 2.0);

    let mut dst = RgbaImage::from_pixel(dw, dh, Rgba([0, 0, 0, 0]));
    for y in 0..dh {
        for x in 0..dw {
            // Map the destination pixel back into source space.
            let dx = f64::from(x) + 0.5 - dcx;
            let dy = f64::from(y) + 0.5 - dcy;
            let sx = dx * cos + dy * sin + scx - 0.5;
            let sy = -dx * sin + dy * cos + scy - 0.5;
            if sx < -1.0 || sy < -1.0 || sx > sw || sy > sh {
                continue;
            }
            dst.put_pixel(x, y, sample_bilinear(src, sx, sy));
        }
    }
    dst
}

fn sample_bilinear(src: &RgbaImage, x: f64, y: f64) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let fetch = |ix: i64, iy: i64| -> [f64; 4] {
        if ix < 0 || iy < 0 || ix >= i64::from(src.width()) || iy >= i64::from(src.height()) {
            return [0.0; 4];
        }
        let p = src.get_pixel(ix as u32, iy as u32).0;
        [
            f64::from(p[0]),
            f64::from(p[1]),
            f64::from(p[2]),
            f64::from(p[3]),
        ]
    };

    let (x0, y0) = (x0 as i64, y0 as i64);
    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1, y0);
    let p01 = fetch(x0, y0 + 1);
    let p11 = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for (i, slot) in out.iter_mut().enumerate() {
        let top = p00[i] * (1.0 - fx) + p10[i] * fx;
        let bottom = p01[i] * (1.0 - fx) + p11[i] * fx;
        *slot = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
