//! Pointer marker overlay
//!
//! Screenshots carry a ring around the pointer so a reviewer can see where
//! the user was pointing at capture time.

use image::{Rgba, RgbaImage};

/// Ring style drawn on every screenshot
#[derive(Debug, Clone, Copy)]
pub struct MarkerStyle {
    pub radius: u32,
    pub outline_width: u32,
    pub color: Rgba<u8>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            radius: 8,
            outline_width: 3,
            color: Rgba([255, 0, 0, 255]),
        }
    }
}

/// Draw a ring centered on `(cx, cy)` in image coordinates.
///
/// The outline grows inward from `radius`; pixels outside the image are
/// skipped, so a pointer at the edge of a monitor is fine.
pub fn draw_ring(image: &mut RgbaImage, cx: i32, cy: i32, style: &MarkerStyle) {
    let outer = style.radius as f64;
    let inner = (style.radius.saturating_sub(style.outline_width)) as f64;
    let reach = style.radius as i64;
    let (width, height) = (i64::from(image.width()), i64::from(image.height()));

    for dy in -reach..=reach {
        let py = i64::from(cy) + dy;
        if py < 0 || py >= height {
            continue;
        }
        for dx in -reach..=reach {
            let px = i64::from(cx) + dx;
            if px < 0 || px >= width {
                continue;
            }
            let distance = ((dx * dx + dy * dy) as f64).sqrt();
            if distance <= outer + 0.5 && distance >= inner - 0.5 {
                image.put_pixel(px as u32, py as u32, style.color);
            }
        }
    }
}
