//! Overlay rendering for tracked objects
//!
//! Draws onto RGB frames:
//! - Translucent safe-zone fill with border and label
//! - Per-track boxes, green inside the zone and red outside
//! - Class and confidence labels
//! - Center markers used for the zone test
//! - A status line summarizing the frame
//!
//! Shapes are always drawn. Text needs a TrueType font; without one the
//! labels are skipped.

use crate::{CvError, CvResult, RenderingConfig};
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut,
    draw_polygon_mut, draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;
use sight_core::{Geofence, TrackView};
use std::sync::Arc;
use tracing::{debug, trace};

pub const ZONE_COLOR: Rgb<u8> = Rgb([20, 255, 57]);
pub const INSIDE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OUTSIDE_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Renders tracking overlays on video frames
#[derive(Clone)]
pub struct OverlayRenderer {
    config: RenderingConfig,
    font: Option<Arc<FontVec>>,
}

impl OverlayRenderer {
    /// Create a renderer, loading the label font if one is configured
    pub fn new(config: &RenderingConfig) -> CvResult<Self> {
        let font = match &config.font_path {
            Some(path) if config.draw_text => {
                let bytes = std::fs::read(path)
                    .map_err(|e| CvError::rendering(format!("font {}: {}", path.display(), e)))?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|e| CvError::rendering(format!("font {}: {}", path.display(), e)))?;
                debug!("Loaded overlay font {}", path.display());
                Some(Arc::new(font))
            }
            _ => None,
        };

        Ok(Self {
            config: config.clone(),
            font,
        })
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw the zone, every track and the status line onto `frame`
    pub fn annotate(&self, frame: &mut RgbImage, views: &[TrackView], geofence: Option<&Geofence>) {
        if frame.width() == 0 || frame.height() == 0 {
            return;
        }

        if self.config.draw_zone {
            if let Some(zone) = geofence {
                self.draw_zone(frame, zone);
            }
        }

        if self.config.draw_tracks {
            for view in views {
                self.draw_track(frame, view);
            }
        }

        if let Some((status, outside)) = status_line(views) {
            let color = if outside { OUTSIDE_COLOR } else { INSIDE_COLOR };
            let y = frame.height() as i32 - 20 - self.text_height(&status);
            self.draw_text(frame, &status, 10, y, color);
        }

        trace!("{}", format_overlay_text(views));
    }

    fn draw_zone(&self, frame: &mut RgbImage, zone: &Geofence) {
        let pixels = zone.to_pixels(frame.width(), frame.height());
        let points = polygon_points(&pixels);

        if points.len() >= 3 && self.config.zone_opacity > 0.0 {
            let mut overlay = frame.clone();
            draw_polygon_mut(&mut overlay, &points, ZONE_COLOR);
            blend_into(frame, &overlay, self.config.zone_opacity);
        }

        for (i, &(x0, y0)) in pixels.iter().enumerate() {
            let (x1, y1) = pixels[(i + 1) % pixels.len()];
            draw_line_segment_mut(frame, (x0 as f32, y0 as f32), (x1 as f32, y1 as f32), ZONE_COLOR);
        }

        self.draw_text(frame, "SAFE ZONE", 10, 10, ZONE_COLOR);
    }

    fn draw_track(&self, frame: &mut RgbImage, view: &TrackView) {
        let color = if view.outside_zone { OUTSIDE_COLOR } else { INSIDE_COLOR };
        let bbox = &view.track.bbox;
        let x = bbox.x1.round() as i32;
        let y = bbox.y1.round() as i32;
        let w = bbox.width().round().max(1.0) as u32;
        let h = bbox.height().round().max(1.0) as u32;

        for inset in 0..self.config.box_thickness {
            let i = inset as i32;
            if w <= 2 * inset || h <= 2 * inset {
                break;
            }
            draw_hollow_rect_mut(frame, Rect::at(x + i, y + i).of_size(w - 2 * inset, h - 2 * inset), color);
        }

        let (cx, cy) = view.track.center();
        draw_filled_circle_mut(frame, (cx.round() as i32, cy.round() as i32), self.config.center_radius, color);

        if let Some(font) = self.font.as_deref() {
            let label = track_label(view);
            let scale = self.scale();
            let (tw, th) = text_size(scale, font, &label);
            if tw > 0 && th > 0 {
                let top = y - th as i32 - 10;
                draw_filled_rect_mut(frame, Rect::at(x, top).of_size(tw + 4, th + 10), color);
                draw_text_mut(frame, TEXT_COLOR, x + 2, top + 5, scale, font, &label);
            }
        }
    }

    fn draw_text(&self, frame: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
        if let Some(font) = self.font.as_deref() {
            draw_text_mut(frame, color, x, y, self.scale(), font, text);
        }
    }

    fn text_height(&self, text: &str) -> i32 {
        match self.font.as_deref() {
            Some(font) => text_size(self.scale(), font, text).1 as i32,
            None => 0,
        }
    }

    fn scale(&self) -> PxScale {
        PxScale::from(self.config.font_size)
    }
}

/// `"<Class> <conf>"`, with `" OUTSIDE"` appended for flagged tracks
pub fn track_label(view: &TrackView) -> String {
    let mut label = format!("{} {:.2}", view.track.class.title(), view.track.confidence);
    if view.outside_zone {
        label.push_str(" OUTSIDE");
    }
    label
}

/// Status text for the frame and whether it reports an exit.
/// `None` when nothing is surfaced.
pub fn status_line(views: &[TrackView]) -> Option<(String, bool)> {
    let first = views.first()?;
    match views.iter().find(|v| v.outside_zone) {
        Some(outside) => Some((format!("{} Outside Safe Zone!", outside.track.class.title()), true)),
        None => Some((format!("{} Detected", first.track.class.title()), false)),
    }
}

/// Text-based overlay info (for logging/debugging)
pub fn format_overlay_text(views: &[TrackView]) -> String {
    let mut output = format!("=== Tracking {} objects ===\n", views.len());
    for view in views {
        let (cx, cy) = view.track.center();
        output.push_str(&format!(
            "{} [{}] center=({:.0}, {:.0}) hits={} {}\n",
            view.track.id,
            track_label(view),
            cx,
            cy,
            view.track.hits,
            if view.outside_zone { "outside" } else { "inside" }
        ));
    }
    output
}

/// Integer polygon for filling: consecutive duplicates and a repeated
/// closing vertex are removed
fn polygon_points(pixels: &[(f64, f64)]) -> Vec<Point<i32>> {
    let mut points: Vec<Point<i32>> = Vec::with_capacity(pixels.len());
    for &(x, y) in pixels {
        let p = Point::new(x.round() as i32, y.round() as i32);
        if points.last() != Some(&p) {
            points.push(p);
        }
    }
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }
    points
}

fn blend_into(frame: &mut RgbImage, overlay: &RgbImage, opacity: f32) {
    for (dst, src) in frame.pixels_mut().zip(overlay.pixels()) {
        if dst == src {
            continue;
        }
        for c in 0..3 {
            let mixed = dst.0[c] as f32 * (1.0 - opacity) + src.0[c] as f32 * opacity;
            dst.0[c] = mixed.round().clamp(0.0, 255.0) as u8;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sight_core::{BoundingBox, ClassLabel, NormalizedPoint, Track, TrackId};

    fn view(x1: f64, y1: f64, x2: f64, y2: f64, outside: bool) -> TrackView {
        TrackView {
            track: Track {
                id: TrackId(1),
                class: ClassLabel::new("dog"),
                bbox: BoundingBox::new(x1, y1, x2, y2),
                confidence: 0.914,
                hits: 4,
                age: 0,
            },
            outside_zone: outside,
        }
    }

    fn left_half() -> Geofence {
        Geofence::new(vec![
            NormalizedPoint::new(0.0, 0.0),
            NormalizedPoint::new(0.5, 0.0),
            NormalizedPoint::new(0.5, 1.0),
            NormalizedPoint::new(0.0, 1.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_renderer_creation() {
        let renderer = OverlayRenderer::new(&RenderingConfig::default()).unwrap();
        assert!(!renderer.has_font());
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let config = RenderingConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..RenderingConfig::default()
        };
        assert!(matches!(OverlayRenderer::new(&config), Err(CvError::Rendering(_))));
    }

    #[test]
    fn test_box_colors() {
        let renderer = OverlayRenderer::new(&RenderingConfig::default()).unwrap();
        let mut frame = RgbImage::new(200, 100);
        renderer.annotate(
            &mut frame,
            &[view(10.0, 10.0, 50.0, 50.0, false), view(120.0, 10.0, 160.0, 50.0, true)],
            None,
        );

        assert_eq!(frame.get_pixel(10, 30), &INSIDE_COLOR);
        assert_eq!(frame.get_pixel(120, 30), &OUTSIDE_COLOR);
        // Center markers
        assert_eq!(frame.get_pixel(30, 30), &INSIDE_COLOR);
        assert_eq!(frame.get_pixel(140, 30), &OUTSIDE_COLOR);
        // Untouched background
        assert_eq!(frame.get_pixel(90, 90), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_zone_fill_is_translucent() {
        let renderer = OverlayRenderer::new(&RenderingConfig::default()).unwrap();
        let mut frame = RgbImage::from_pixel(100, 100, Rgb([100, 100, 100]));
        renderer.annotate(&mut frame, &[], Some(&left_half()));

        let inside = frame.get_pixel(25, 50);
        assert_ne!(inside, &Rgb([100, 100, 100]));
        assert_ne!(inside, &ZONE_COLOR);
        assert!(inside.0[1] > 100);
        assert_eq!(frame.get_pixel(80, 50), &Rgb([100, 100, 100]));
    }

    #[test]
    fn test_disabled_layers() {
        let config = RenderingConfig {
            draw_zone: false,
            draw_tracks: false,
            ..RenderingConfig::default()
        };
        let renderer = OverlayRenderer::new(&config).unwrap();
        let mut frame = RgbImage::new(100, 100);
        renderer.annotate(&mut frame, &[view(10.0, 10.0, 50.0, 50.0, true)], Some(&left_half()));
        assert!(frame.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }

    #[test]
    fn test_labels_and_status() {
        assert_eq!(track_label(&view(0.0, 0.0, 1.0, 1.0, false)), "Dog 0.91");
        assert_eq!(track_label(&view(0.0, 0.0, 1.0, 1.0, true)), "Dog 0.91 OUTSIDE");

        assert_eq!(status_line(&[]), None);
        assert_eq!(
            status_line(&[view(0.0, 0.0, 1.0, 1.0, false)]),
            Some(("Dog Detected".to_string(), false))
        );
        assert_eq!(
            status_line(&[view(0.0, 0.0, 1.0, 1.0, false), view(0.0, 0.0, 1.0, 1.0, true)]),
            Some(("Dog Outside Safe Zone!".to_string(), true))
        );
    }

    #[test]
    fn test_format_overlay_text() {
        let text = format_overlay_text(&[view(10.0, 10.0, 50.0, 50.0, true)]);
        assert!(text.contains("Tracking 1 objects"));
        assert!(text.contains("#1"));
        assert!(text.contains("center=(30, 30)"));
        assert!(text.contains("outside"));
    }

    #[test]
    fn test_polygon_points_drops_closing_vertex() {
        let points = polygon_points(&[(0.0, 0.0), (10.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 0.0)]);
        assert_eq!(points, vec![Point::new(0, 0), Point::new(10, 0), Point::new(10, 10)]);
    }
}
