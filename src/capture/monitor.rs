//! Monitor location
//!
//! Maps a point in global desktop coordinates onto the monitor that owns it.
//! Monitor lists follow the convention that index 0 is the virtual desktop
//! bounding box and real monitors start at index 1.

use serde::{Deserialize, Serialize};

/// Index reported when no monitor contains the point
pub const PRIMARY_MONITOR: usize = 1;

/// A monitor rectangle in global desktop coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl MonitorRect {
    pub fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Half-open containment on both axes: `left <= x < left + width`
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        let left = i64::from(self.left);
        let top = i64::from(self.top);
        x >= left
            && x < left + i64::from(self.width)
            && y >= top
            && y < top + i64::from(self.height)
    }

    /// Translate a global point into this monitor's image coordinates
    pub fn to_local(&self, x: i32, y: i32) -> (i32, i32) {
        (x.saturating_sub(self.left), y.saturating_sub(self.top))
    }

    /// Smallest rectangle covering every monitor (the virtual desktop)
    pub fn bounding(rects: &[MonitorRect]) -> Option<MonitorRect> {
        let first = rects.first()?;
        let mut left = i64::from(first.left);
        let mut top = i64::from(first.top);
        let mut right = left + i64::from(first.width);
        let mut bottom = top + i64::from(first.height);

        for rect in &rects[1..] {
            left = left.min(i64::from(rect.left));
            top = top.min(i64::from(rect.top));
            right = right.max(i64::from(rect.left) + i64::from(rect.width));
            bottom = bottom.max(i64::from(rect.top) + i64::from(rect.height));
        }

        Some(MonitorRect {
            left: left as i32,
            top: top as i32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Result of resolving a (possibly scaled) point to a monitor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorMatch {
    /// 1-based monitor index
    pub index: usize,
    /// The point that matched, after any device-pixel-ratio scaling
    pub x: i32,
    pub y: i32,
    /// False when no monitor contained any candidate and the primary was assumed
    pub contained: bool,
}

/// Return the index of the first real monitor containing the point,
/// or [`PRIMARY_MONITOR`] if none does.
pub fn locate_monitor(monitors: &[MonitorRect], x: i32, y: i32) -> usize {
    find_monitor(monitors, x, y).unwrap_or(PRIMARY_MONITOR)
}

fn find_monitor(monitors: &[MonitorRect], x: i32, y: i32) -> Option<usize> {
    monitors
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, rect)| rect.contains(x, y))
        .map(|(idx, _)| idx)
}

/// Candidate points for a coordinate reported with a device-pixel-ratio hint.
///
/// The try-order is raw, scaled up by the ratio, then scaled down by it.
/// This is a heuristic: with overlapping scalings the first hit wins even if
/// a later candidate would have been the geometrically correct one.
pub fn scaled_candidates(x: i32, y: i32, dpr: Option<f64>) -> Vec<(i32, i32)> {
    let mut points = vec![(x, y)];
    if let Some(ratio) = dpr.filter(|r| r.is_finite() && *r > 0.0 && (*r - 1.0).abs() > f64::EPSILON)
    {
        let scale = |v: i32, factor: f64| (f64::from(v) * factor).round() as i32;
        points.push((scale(x, ratio), scale(y, ratio)));
        points.push((scale(x, 1.0 / ratio), scale(y, 1.0 / ratio)));
    }
    points
}

/// Resolve a point to a monitor, retrying with the device-pixel-ratio scaled
/// variants when the raw point lies on no monitor.
pub fn locate_monitor_scaled(
    monitors: &[MonitorRect],
    x: i32,
    y: i32,
    dpr: Option<f64>,
) -> MonitorMatch {
    for (cx, cy) in scaled_candidates(x, y, dpr) {
        if let Some(index) = find_monitor(monitors, cx, cy) {
            return MonitorMatch {
                index,
                x: cx,
                y: cy,
                contained: true,
            };
        }
    }

    MonitorMatch {
        index: PRIMARY_MONITOR,
        x,
        y,
        contained: false,
    }
}
