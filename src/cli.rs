// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! This module provides command-line functionality for:
//! - Listing capture devices
//! - Running one image through the pipeline

use invariance::backends::camera::{list_devices, load_still_image};
use invariance::invariant::TransformParameters;
use invariance::session::{RenderBackend, process_still};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// List V4L2 capture devices and the packed formats they offer
pub fn list_cameras() -> Result<(), Box<dyn std::error::Error>> {
    let devices = list_devices();

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Capture devices:");
    println!();
    for device in &devices {
        println!("  {} ({})", device.name, device.path);
        if device.packed_formats.is_empty() {
            println!("      No packed 32-bit format, live mode unavailable");
        } else {
            println!("      Formats: {}", device.packed_formats.join(", "));
        }
        println!();
    }

    Ok(())
}

/// Transform a single image file and write the result as PNG
pub fn process_image(
    input: &Path,
    output: Option<PathBuf>,
    params: TransformParameters,
    backend: RenderBackend,
) -> Result<(), Box<dyn std::error::Error>> {
    let image = load_still_image(input)?;
    let (width, height) = image.dimensions();
    println!(
        "Processing {} ({}x{}) on {} | {} | alpha {:.2}",
        input.display(),
        width,
        height,
        backend,
        params.variant(),
        params.alpha
    );

    let start = Instant::now();
    let shown = process_still(backend, params, image)?;
    let elapsed = start.elapsed();

    let output = output.unwrap_or_else(|| default_output_path(input, params));
    let img = shown
        .to_image()
        .ok_or("Presented frame does not match its size")?;
    img.save(&output)?;

    println!(
        "Saved {} in {:.1} ms",
        output.display(),
        elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

/// `photo.jpg` becomes `photo_invariant.png` next to the input
fn default_output_path(input: &Path, params: TransformParameters) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "frame".to_string());
    input.with_file_name(format!("{}_{}.png", stem, params.variant()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        let params = TransformParameters {
            alpha: 0.45,
            invariance_enabled: true,
        };
        assert_eq!(
            default_output_path(Path::new("/tmp/shots/photo.jpg"), params),
            PathBuf::from("/tmp/shots/photo_invariant.png")
        );

        let params = TransformParameters {
            invariance_enabled: false,
            ..params
        };
        assert_eq!(
            default_output_path(Path::new("photo.png"), params),
            PathBuf::from("photo_passthrough.png")
        );
    }

    #[test]
    fn test_process_image_on_cpu() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        image::RgbaImage::from_pixel(3, 2, image::Rgba([40, 80, 120, 255]))
            .save(&input)
            .unwrap();
        let output = dir.path().join("out.png");

        process_image(
            &input,
            Some(output.clone()),
            TransformParameters {
                alpha: 0.45,
                invariance_enabled: false,
            },
            RenderBackend::Cpu,
        )
        .unwrap();

        let written = image::open(&output).unwrap().to_rgba8();
        assert_eq!(written.dimensions(), (3, 2));
        assert_eq!(written.get_pixel(2, 1).0, [40, 80, 120, 255]);
    }
}
