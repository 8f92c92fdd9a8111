//! Geometry for detection boxes and geofence polygons
//!
//! Boxes are in pixel coordinates. Geofence polygons are stored in
//! normalized [0, 1] frame coordinates and scaled to pixels at test time,
//! so a polygon drawn once stays valid across capture resolutions.

use serde::{Deserialize, Serialize};

use crate::{BoundingBox, CoreError};

/// Distance (in pixels) within which a point counts as lying on an edge
const EDGE_TOLERANCE_PX: f64 = 1e-6;

/// Intersection-over-union of two axis-aligned boxes.
///
/// Degenerate boxes clamp their intersection to zero and a zero union
/// yields 0.0 rather than a division error.
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter_w = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let inter_h = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = a.area() + b.area() - intersection;

    if union > 0.0 && union.is_finite() {
        (intersection / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// A polygon vertex in normalized frame coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Finite and within the unit square
    pub fn is_normalized(&self) -> bool {
        (0.0..=1.0).contains(&self.x) && (0.0..=1.0).contains(&self.y)
    }

    /// Scale to pixel coordinates for a frame of the given size
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> (f64, f64) {
        (self.x * frame_width as f64, self.y * frame_height as f64)
    }
}

/// Test whether a pixel-space point lies inside a normalized polygon.
///
/// Fewer than three vertices means no geofence is defined and every point
/// is allowed. Points on an edge or vertex count as inside. Anything that
/// cannot be evaluated (non-finite input, empty frame) also answers `true`.
pub fn contains_point(
    point: (f64, f64),
    polygon: &[NormalizedPoint],
    frame_width: u32,
    frame_height: u32,
) -> bool {
    if polygon.len() < 3 {
        return true;
    }

    let (px, py) = point;
    if !px.is_finite() || !py.is_finite() || frame_width == 0 || frame_height == 0 {
        return true;
    }

    let vertices: Vec<(f64, f64)> = polygon
        .iter()
        .map(|p| p.to_pixels(frame_width, frame_height))
        .collect();

    if vertices.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
        return true;
    }

    let n = vertices.len();

    let mut j = n - 1;
    for i in 0..n {
        if on_segment(point, vertices[j], vertices[i]) {
            return true;
        }
        j = i;
    }

    // Ray casting algorithm
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = vertices[i];
        let (xj, yj) = vertices[j];

        if ((yi > py) != (yj > py)) && (px < (xj - xi) * (py - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn on_segment(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> bool {
    let (dx, dy) = (b.0 - a.0, b.1 - a.1);
    let length = (dx * dx + dy * dy).sqrt();

    if length < EDGE_TOLERANCE_PX {
        return (p.0 - a.0).abs() <= EDGE_TOLERANCE_PX && (p.1 - a.1).abs() <= EDGE_TOLERANCE_PX;
    }

    let cross = dx * (p.1 - a.1) - dy * (p.0 - a.0);
    if (cross / length).abs() > EDGE_TOLERANCE_PX {
        return false;
    }

    let dot = (p.0 - a.0) * dx + (p.1 - a.1) * dy;
    dot >= -EDGE_TOLERANCE_PX && dot <= length * length + EDGE_TOLERANCE_PX
}

/// Safe-zone polygon owned by a user
///
/// Only constructed with three or more vertices, all inside the unit
/// square. Anything else is malformed and treated as "no geofence" by the
/// callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<NormalizedPoint>", into = "Vec<NormalizedPoint>")]
pub struct Geofence {
    points: Vec<NormalizedPoint>,
}

impl Geofence {
    pub fn new(points: Vec<NormalizedPoint>) -> Option<Self> {
        Self::try_from(points).ok()
    }

    pub fn points(&self) -> &[NormalizedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Check whether a pixel point is inside the zone
    pub fn contains(&self, point: (f64, f64), frame_width: u32, frame_height: u32) -> bool {
        contains_point(point, &self.points, frame_width, frame_height)
    }

    /// Vertices scaled to a frame, for drawing
    pub fn to_pixels(&self, frame_width: u32, frame_height: u32) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|p| p.to_pixels(frame_width, frame_height))
            .collect()
    }
}

impl TryFrom<Vec<NormalizedPoint>> for Geofence {
    type Error = CoreError;

    fn try_from(points: Vec<NormalizedPoint>) -> Result<Self, Self::Error> {
        if points.len() < 3 {
            return Err(CoreError::invalid_geofence(format!("{} points, need 3", points.len())));
        }
        if let Some(i) = points.iter().position(|p| !p.is_normalized()) {
            return Err(CoreError::invalid_geofence(format!(
                "point {} ({}, {}) is outside [0, 1]",
                i, points[i].x, points[i].y
            )));
        }
        Ok(Self { points })
    }
}

impl From<Geofence> for Vec<NormalizedPoint> {
    fn from(geofence: Geofence) -> Self {
        geofence.points
    }
}

/// Containment against an optional geofence; absent means everywhere is safe
pub fn in_safe_zone(
    geofence: Option<&Geofence>,
    point: (f64, f64),
    frame_width: u32,
    frame_height: u32,
) -> bool {
    geofence.map_or(true, |g| g.contains(point, frame_width, frame_height))
}

// ============================================================================
// TESTS
// ============================================================================
