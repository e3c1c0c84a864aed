use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::warn;
use png::{Decoder, Transformations};
use tray_icon::Icon;

static BUILTIN_ICON: &[u8] = include_bytes!("../../assets/icon.png");

/// Tray icon from the configured override path, or the built-in one when the
/// path is empty or the file cannot be used.
pub fn load_tray_icon(override_path: &str) -> Result<Icon> {
    if !override_path.is_empty() {
        match load_icon_file(Path::new(override_path)) {
            Ok(icon) => return Ok(icon),
            Err(e) => warn!(
                "Cannot use icon {}: {:#}; using built-in icon",
                override_path, e
            ),
        }
    }
    to_icon(decode_rgba(BUILTIN_ICON)?)
}

fn load_icon_file(path: &Path) -> Result<Icon> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    to_icon(decode_rgba(&data)?)
}

fn to_icon((rgba, width, height): (Vec<u8>, u32, u32)) -> Result<Icon> {
    Icon::from_rgba(rgba, width, height).map_err(|e| anyhow!("failed to create icon: {e}"))
}

/// Decodes any PNG into 8-bit RGBA.
fn decode_rgba(png_data: &[u8]) -> Result<(Vec<u8>, u32, u32)> {
    let mut decoder = Decoder::new(png_data);
    // Palette and sub-byte images become RGB(A), 16-bit becomes 8-bit.
    decoder.set_transformations(Transformations::EXPAND | Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| anyhow!("failed to read PNG header: {e}"))?;

    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| anyhow!("failed to decode PNG: {e}"))?;
    let pixels = &buf[..info.buffer_size()];
    let (width, height) = (info.width, info.height);

    let rgba = match info.color_type {
        png::ColorType::Rgba => pixels.to_vec(),
        png::ColorType::Rgb => pixels
            .chunks(3)
            .flat_map(|c| [c[0], c[1], c[2], 255])
            .collect(),
        png::ColorType::GrayscaleAlpha => pixels
            .chunks(2)
            .flat_map(|c| [c[0], c[0], c[0], c[1]])
            .collect(),
        png::ColorType::Grayscale => pixels.iter().flat_map(|&g| [g, g, g, 255]).collect(),
        png::ColorType::Indexed => {
            return Err(anyhow!("indexed PNG was not expanded"));
        }
    };

    Ok((rgba, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_icon_decodes_to_rgba() {
        let (rgba, width, height) = decode_rgba(BUILTIN_ICON).unwrap();
        assert!(width > 0 && height > 0);
        assert_eq!(rgba.len(), (width * height * 4) as usize);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_rgba(b"definitely not a png").is_err());
    }

    #[test]
    fn missing_override_file_is_an_error() {
        assert!(load_icon_file(Path::new("/nonexistent/weblauncher/icon.png")).is_err());
    }
}
