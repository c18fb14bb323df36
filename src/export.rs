use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use image::{imageops::FilterType, DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use rusttype::{point, Font, Scale};
use tracing::info;

use crate::config::CONFIG;
use crate::image_file::ImageFile;

/// Fixed export resolutions, by target output width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTier {
    Standard,
    Ultra,
}

impl ExportTier {
    pub fn target_width(self) -> u32 {
        match self {
            ExportTier::Standard => 2048,
            ExportTier::Ultra => 4096,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            ExportTier::Standard => "standard",
            ExportTier::Ultra => "ultra",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "standard" | "2k" => Ok(ExportTier::Standard),
            "ultra" | "4k" => Ok(ExportTier::Ultra),
            other => Err(anyhow!(
                "Unknown export tier '{other}'. Expected 'standard' or 'ultra'."
            )),
        }
    }
}

/// Output width is always the tier width; height follows the source
/// aspect ratio.
pub fn scaled_dimensions(source_width: u32, source_height: u32, tier: ExportTier) -> (u32, u32) {
    let width = tier.target_width();
    let height = (f64::from(width) * f64::from(source_height) / f64::from(source_width))
        .round()
        .max(1.0) as u32;
    (width, height)
}

/// Watermark sizing scales with the output so the mark stays legible
/// and proportionate at both tiers.
fn watermark_metrics(output_width: u32) -> (f32, f32) {
    let font_size = (output_width as f32 * 0.025).floor();
    let margin = (output_width as f32 * 0.02).floor();
    (font_size, margin)
}

pub fn export_file_name(source_stem: &str, tier: ExportTier) -> String {
    format!(
        "{source_stem}-{}-{}.png",
        tier.keyword(),
        Utc::now().timestamp_millis()
    )
}

fn load_watermark_font() -> Result<Font<'static>> {
    let path = CONFIG
        .watermark_font_path
        .as_ref()
        .ok_or_else(|| anyhow!("No watermark font found; set WATERMARK_FONT_PATH"))?;
    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read watermark font {}", path.display()))?;
    Font::try_from_vec(bytes)
        .ok_or_else(|| anyhow!("Watermark font {} could not be parsed", path.display()))
}

fn text_width(font: &Font<'_>, px: f32, text: &str) -> f32 {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let mut width: f32 = 0.0;
    for glyph in font.layout(text, scale, point(0.0, v_metrics.ascent)) {
        if let Some(bb) = glyph.pixel_bounding_box() {
            width = width.max(bb.max.x as f32);
        }
    }
    width
}

/// Alpha-blends one text run onto the canvas. Coverage from the glyph
/// rasterizer is multiplied by the color's own alpha so semi-opaque
/// passes compose correctly.
fn draw_text(img: &mut RgbaImage, font: &Font<'_>, px: f32, x: i32, y: i32, color: Rgba<u8>, text: &str) {
    let scale = Scale::uniform(px);
    let v_metrics = font.v_metrics(scale);
    let baseline_y = y as f32 + v_metrics.ascent;
    let color_alpha = color.0[3] as f32 / 255.0;

    let mut caret_x = x as f32;
    for ch in text.chars() {
        let glyph = font
            .glyph(ch)
            .scaled(scale)
            .positioned(point(caret_x, baseline_y));
        if let Some(bb) = glyph.pixel_bounding_box() {
            glyph.draw(|gx, gy, coverage| {
                let px = gx as i32 + bb.min.x;
                let py = gy as i32 + bb.min.y;
                if px < 0 || py < 0 {
                    return;
                }
                let (px, py) = (px as u32, py as u32);
                if px >= img.width() || py >= img.height() {
                    return;
                }
                let alpha = coverage * color_alpha;
                if alpha <= 0.0 {
                    return;
                }
                let dst = img.get_pixel_mut(px, py);
                let inv = 1.0 - alpha;
                dst.0[0] = (color.0[0] as f32 * alpha + dst.0[0] as f32 * inv) as u8;
                dst.0[1] = (color.0[1] as f32 * alpha + dst.0[1] as f32 * inv) as u8;
                dst.0[2] = (color.0[2] as f32 * alpha + dst.0[2] as f32 * inv) as u8;
                dst.0[3] = 255;
            });
        }
        caret_x += glyph.unpositioned().h_metrics().advance_width;
    }
}

/// Burns the ownership mark into the bottom-right corner: a drop
/// shadow, a dark outline ring for light backgrounds, then the
/// semi-opaque white fill.
fn draw_watermark(canvas: &mut RgbaImage, font: &Font<'_>, text: &str) {
    let (font_size, margin) = watermark_metrics(canvas.width());
    let scale = Scale::uniform(font_size);
    let v_metrics = font.v_metrics(scale);
    let line_height = (v_metrics.ascent - v_metrics.descent).max(1.0);

    let x = (canvas.width() as f32 - margin - text_width(font, font_size, text)).round() as i32;
    let y = (canvas.height() as f32 - margin - line_height).round() as i32;

    let shadow_offset = ((font_size / 12.0).round() as i32).max(2);
    draw_text(
        canvas,
        font,
        font_size,
        x + shadow_offset,
        y + shadow_offset,
        Rgba([0, 0, 0, 110]),
        text,
    );

    let stroke = ((font_size / 16.0).round() as i32).max(1);
    for (dx, dy) in [
        (-stroke, 0),
        (stroke, 0),
        (0, -stroke),
        (0, stroke),
        (-stroke, -stroke),
        (stroke, -stroke),
        (-stroke, stroke),
        (stroke, stroke),
    ] {
        draw_text(canvas, font, font_size, x + dx, y + dy, Rgba([0, 0, 0, 128]), text);
    }

    draw_text(canvas, font, font_size, x, y, Rgba([255, 255, 255, 230]), text);
}

/// Re-encodes the generated image at the tier resolution, burns in the
/// watermark, and writes the PNG under `out_dir`.
///
/// The PNG is fully encoded in memory before the file is created, so a
/// failure at any step leaves nothing partially written on disk.
pub fn export_image(image: &ImageFile, tier: ExportTier, out_dir: &Path) -> Result<PathBuf> {
    let decoded = image::load_from_memory(&image.bytes)
        .with_context(|| format!("Failed to decode {}", image.display_name))?;

    let (width, height) = scaled_dimensions(decoded.width(), decoded.height(), tier);
    let mut canvas = decoded
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8();

    let font = load_watermark_font()?;
    draw_watermark(&mut canvas, &font, &CONFIG.watermark_text);

    let mut encoded = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)
        .context("Failed to encode export as PNG")?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(export_file_name(image.stem(), tier));
    fs::write(&path, &encoded)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    info!(
        "Exported {}x{} {} render to {}",
        width,
        height,
        tier.keyword(),
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tier_preserves_aspect_ratio_at_2048() {
        assert_eq!(scaled_dimensions(1000, 500, ExportTier::Standard), (2048, 1024));
    }

    #[test]
    fn ultra_tier_preserves_aspect_ratio_at_4096() {
        assert_eq!(scaled_dimensions(1000, 500, ExportTier::Ultra), (4096, 2048));
    }

    #[test]
    fn portrait_sources_still_scale_to_the_tier_width() {
        assert_eq!(scaled_dimensions(500, 1000, ExportTier::Standard), (2048, 4096));
    }

    #[test]
    fn watermark_scales_proportionally_with_output_width() {
        let (font_standard, margin_standard) = watermark_metrics(2048);
        let (font_ultra, margin_ultra) = watermark_metrics(4096);
        assert_eq!((font_standard, margin_standard), (51.0, 40.0));
        assert_eq!((font_ultra, margin_ultra), (102.0, 81.0));
    }

    #[test]
    fn tier_keywords_round_trip_through_parse() {
        assert_eq!(ExportTier::parse("ultra").unwrap(), ExportTier::Ultra);
        assert_eq!(ExportTier::parse("2k").unwrap(), ExportTier::Standard);
        assert!(ExportTier::parse("8k").is_err());
    }

    #[test]
    fn export_file_names_encode_stem_and_tier() {
        let name = export_file_name("lamp", ExportTier::Ultra);
        assert!(name.starts_with("lamp-ultra-"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn full_export_produces_a_png_at_tier_dimensions() {
        if CONFIG.watermark_font_path.is_none() {
            // No system font available in this environment; the sizing
            // math is covered by the tests above.
            return;
        }

        let mut source = RgbaImage::new(100, 50);
        for pixel in source.pixels_mut() {
            *pixel = Rgba([40, 90, 160, 255]);
        }
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(source)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        let image = ImageFile::new(bytes, "image/png".to_string(), "swatch.png".to_string());

        let dir = tempfile::tempdir().unwrap();
        let path = export_image(&image, ExportTier::Standard, dir.path()).unwrap();

        let exported = image::open(&path).unwrap();
        assert_eq!((exported.width(), exported.height()), (2048, 1024));
    }
}
