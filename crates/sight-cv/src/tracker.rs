//! Multi-object tracking by greedy per-class IoU association
//!
//! Each frame, detections are matched against the live tracks of the same
//! class. Matched tracks are smoothed toward the detection with an EMA,
//! unmatched detections open new tracks and unmatched tracks age and lose
//! confidence until they fall out of the store. Exposure to consumers is a
//! separate gate (`hits` and box area) so short-lived noise never
//! surfaces while its track keeps accumulating state.

use crate::TrackingConfig;
use sight_core::{Detection, Track, TrackId};
use tracing::{debug, trace, warn};

/// Hands out track ids; never reuses one for the life of the process
#[derive(Debug, Clone)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> TrackId {
        let id = TrackId(self.next);
        self.next += 1;
        id
    }

    /// Id the next allocation will return
    pub fn peek(&self) -> TrackId {
        TrackId(self.next)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// For each detection, the index of the track it claims (if any).
///
/// Candidate pairs of the same class with a positive IoU at or above the
/// threshold are claimed in descending IoU order, so a track goes to the
/// detection that overlaps it most. Equal IoUs keep detection input order,
/// then track order.
pub fn match_detections(
    detections: &[Detection],
    tracks: &[Track],
    iou_threshold: f64,
) -> Vec<Option<usize>> {
    let mut matches = vec![None; detections.len()];
    if detections.is_empty() || tracks.is_empty() {
        return matches;
    }

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for (d_idx, detection) in detections.iter().enumerate() {
        for (t_idx, track) in tracks.iter().enumerate() {
            if track.class != detection.class {
                continue;
            }
            let iou = track.bbox.iou(&detection.bbox);
            if iou > 0.0 && iou >= iou_threshold {
                candidates.push((iou, d_idx, t_idx));
            }
        }
    }

    // Stable sort keeps insertion order among equal IoUs
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut track_claimed = vec![false; tracks.len()];
    for (iou, d_idx, t_idx) in candidates {
        if matches[d_idx].is_some() || track_claimed[t_idx] {
            continue;
        }
        trace!("Detection {} -> track {} (IoU {:.3})", d_idx, tracks[t_idx].id, iou);
        matches[d_idx] = Some(t_idx);
        track_claimed[t_idx] = true;
    }

    matches
}

/// Run one frame of association and return the next track store.
///
/// Surviving tracks keep their store order; new tracks are appended in
/// detection order.
pub fn associate(
    detections: &[Detection],
    tracks: Vec<Track>,
    params: &TrackingConfig,
    ids: &mut IdAllocator,
) -> Vec<Track> {
    let matches = match_detections(detections, &tracks, params.iou_match_threshold);

    let mut claimed_by: Vec<Option<usize>> = vec![None; tracks.len()];
    for (d_idx, matched) in matches.iter().enumerate() {
        if let Some(t_idx) = matched {
            claimed_by[*t_idx] = Some(d_idx);
        }
    }

    let mut next = Vec::with_capacity(tracks.len() + detections.len());

    for (track, claim) in tracks.into_iter().zip(claimed_by) {
        let mut track = track;
        match claim {
            Some(d_idx) => {
                let detection = &detections[d_idx];
                track.bbox = track.bbox.blend(&detection.bbox, params.ema_alpha);
                track.confidence = detection.confidence.max(track.confidence);
                track.hits = track.hits.saturating_add(1);
                track.age = 0;
                next.push(track);
            }
            None => {
                track.age = track.age.saturating_add(1);
                track.confidence *= params.decay_factor;

                if track.age <= params.max_age && track.confidence > params.min_confidence_keep {
                    next.push(track);
                } else {
                    debug!(
                        "Dropping track {} ({}): age={}, confidence={:.3}",
                        track.id, track.class, track.age, track.confidence
                    );
                }
            }
        }
    }

    for (detection, matched) in detections.iter().zip(&matches) {
        if matched.is_some() {
            continue;
        }
        if detection.confidence <= params.min_confidence_keep {
            trace!("Skipping weak detection ({:.3}) for new track", detection.confidence);
            continue;
        }
        if next.len() >= params.max_tracks {
            warn!("Track limit {} reached, ignoring new {}", params.max_tracks, detection.class);
            continue;
        }

        let track = Track::from_detection(ids.allocate(), detection);
        debug!("Created track {} ({})", track.id, track.class);
        next.push(track);
    }

    next
}

/// Whether a track passes the output gate
pub fn is_surfaced(track: &Track, params: &TrackingConfig) -> bool {
    track.hits >= params.min_hits_output && track.area() >= params.min_area_output
}

/// Track store plus id counter, owned by the processing context
#[derive(Debug, Clone)]
pub struct ObjectTracker {
    config: TrackingConfig,
    tracks: Vec<Track>,
    ids: IdAllocator,
    frame_count: u64,
}

impl ObjectTracker {
    pub fn new(config: &TrackingConfig) -> Self {
        Self {
            config: config.clone(),
            tracks: Vec::new(),
            ids: IdAllocator::new(),
            frame_count: 0,
        }
    }

    /// Associate one frame of detections and return the surfaced tracks
    pub fn update(&mut self, detections: &[Detection]) -> Vec<Track> {
        self.frame_count += 1;
        trace!(
            "Association {}: {} detections against {} tracks",
            self.frame_count,
            detections.len(),
            self.tracks.len()
        );

        let current = std::mem::take(&mut self.tracks);
        self.tracks = associate(detections, current, &self.config, &mut self.ids);

        let surfaced = self.surfaced();
        debug!("Surfaced tracks: {}, Total tracks: {}", surfaced.len(), self.tracks.len());
        surfaced
    }

    pub fn surfaced(&self) -> Vec<Track> {
        self.tracks
            .iter()
            .filter(|t| is_surfaced(t, &self.config))
            .cloned()
            .collect()
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn total_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn surfaced_count(&self) -> usize {
        self.tracks.iter().filter(|t| is_surfaced(t, &self.config)).count()
    }

    /// Association passes run so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn config(&self) -> &TrackingConfig {
        &self.config
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sight_core::BoundingBox;
    use std::collections::HashSet;

    fn dog(x1: f64, y1: f64, x2: f64, y2: f64, conf: f64) -> Detection {
        Detection::new("dog", conf, BoundingBox::new(x1, y1, x2, y2))
    }

    fn params() -> TrackingConfig {
        TrackingConfig::default()
    }

    #[test]
    fn test_new_detection_creates_track() {
        let mut tracker = ObjectTracker::new(&params());
        let surfaced = tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.9)]);

        assert!(surfaced.is_empty());
        assert_eq!(tracker.total_count(), 1);
        let track = &tracker.tracks()[0];
        assert_eq!(track.id, TrackId(1));
        assert_eq!(track.hits, 1);
        assert_eq!(track.age, 0);
        assert_eq!(track.confidence, 0.9);
    }

    #[test]
    fn test_surfaces_on_third_hit() {
        let config = TrackingConfig {
            min_hits_output: 3,
            ..params()
        };
        let mut tracker = ObjectTracker::new(&config);
        let frame = [dog(10.0, 10.0, 50.0, 50.0, 0.9)];

        assert!(tracker.update(&frame).is_empty());
        assert!(tracker.update(&frame).is_empty());
        let surfaced = tracker.update(&frame);
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].hits, 3);
        assert_eq!(surfaced[0].id, TrackId(1));
    }

    #[test]
    fn test_match_preserves_id_and_smooths() {
        let mut tracker = ObjectTracker::new(&params());
        tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.7)]);
        tracker.update(&[dog(14.0, 12.0, 54.0, 52.0, 0.6)]);

        let track = &tracker.tracks()[0];
        assert_eq!(tracker.total_count(), 1);
        assert_eq!(track.id, TrackId(1));
        assert_eq!(track.hits, 2);
        // max(0.6, 0.7)
        assert_eq!(track.confidence, 0.7);
        // 10 * 0.4 + 14 * 0.6
        assert!((track.bbox.x1 - 12.4).abs() < 1e-9);
        assert!(track.bbox.x1 > 10.0 && track.bbox.x1 < 14.0);
        assert!(track.bbox.y2 > 50.0 && track.bbox.y2 < 52.0);
    }

    #[test]
    fn test_class_restricted_matching() {
        let mut tracker = ObjectTracker::new(&params());
        tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.9)]);
        tracker.update(&[Detection::new("cat", 0.9, BoundingBox::new(10.0, 10.0, 50.0, 50.0))]);

        let classes: Vec<&str> = tracker.tracks().iter().map(|t| t.class.as_str()).collect();
        assert_eq!(classes, vec!["dog", "cat"]);
        assert_eq!(tracker.tracks()[0].age, 1);
        assert_eq!(tracker.tracks()[1].id, TrackId(2));
    }

    #[test]
    fn test_higher_iou_detection_claims_track() {
        let mut ids = IdAllocator::new();
        let tracks = associate(&[dog(0.0, 0.0, 100.0, 100.0, 0.9)], Vec::new(), &params(), &mut ids);

        // The second detection overlaps the track more and must win it
        let detections = [dog(40.0, 0.0, 140.0, 100.0, 0.9), dog(5.0, 0.0, 105.0, 100.0, 0.9)];
        let matches = match_detections(&detections, &tracks, 0.3);
        assert_eq!(matches, vec![None, Some(0)]);

        let next = associate(&detections, tracks, &params(), &mut ids);
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].id, TrackId(1));
        assert_eq!(next[0].hits, 2);
        assert_eq!(next[1].id, TrackId(2));
        assert_eq!(next[1].bbox.x1, 40.0);
    }

    #[test]
    fn test_tie_goes_to_first_detection() {
        let mut ids = IdAllocator::new();
        let tracks = associate(&[dog(0.0, 0.0, 100.0, 100.0, 0.9)], Vec::new(), &params(), &mut ids);

        let detections = [dog(10.0, 0.0, 110.0, 100.0, 0.8), dog(-10.0, 0.0, 90.0, 100.0, 0.8)];
        let matches = match_detections(&detections, &tracks, 0.3);
        assert_eq!(matches, vec![Some(0), None]);
    }

    #[test]
    fn test_below_threshold_opens_new_track() {
        let mut tracker = ObjectTracker::new(&params());
        tracker.update(&[dog(0.0, 0.0, 100.0, 100.0, 0.9)]);
        // IoU = 2500 / 17500 ≈ 0.14
        tracker.update(&[dog(50.0, 50.0, 150.0, 150.0, 0.9)]);
        assert_eq!(tracker.total_count(), 2);
    }

    #[test]
    fn test_unmatched_track_ages_and_decays() {
        let mut tracker = ObjectTracker::new(&params());
        tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.9)]);
        tracker.update(&[]);

        let track = &tracker.tracks()[0];
        assert_eq!(track.age, 1);
        assert_eq!(track.hits, 1);
        assert!((track.confidence - 0.9 * 0.88).abs() < 1e-12);
    }

    #[test]
    fn test_track_dropped_after_max_age() {
        let config = TrackingConfig {
            max_age: 5,
            min_hits_output: 3,
            ..params()
        };
        let mut tracker = ObjectTracker::new(&config);
        let frame = [dog(10.0, 10.0, 50.0, 50.0, 0.9)];
        for _ in 0..5 {
            tracker.update(&frame);
        }
        assert_eq!(tracker.tracks()[0].hits, 5);

        // Misses 1..=max_age keep the track alive and visible
        for miss in 1..=config.max_age {
            let surfaced = tracker.update(&[]);
            assert_eq!(surfaced.len(), 1, "miss {}", miss);
        }

        // Miss max_age + 1 evicts it from the store and the output
        let surfaced = tracker.update(&[]);
        assert!(surfaced.is_empty());
        assert_eq!(tracker.total_count(), 0);
    }

    #[test]
    fn test_low_confidence_drops_before_max_age() {
        let config = TrackingConfig {
            max_age: 30,
            decay_factor: 0.5,
            min_confidence_keep: 0.25,
            ..params()
        };
        let mut tracker = ObjectTracker::new(&config);
        tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.9)]);
        tracker.update(&[]); // 0.45
        assert_eq!(tracker.total_count(), 1);
        tracker.update(&[]); // 0.225
        assert_eq!(tracker.total_count(), 0);
    }

    #[test]
    fn test_weak_detection_does_not_open_track() {
        let mut tracker = ObjectTracker::new(&params());
        tracker.update(&[dog(10.0, 10.0, 50.0, 50.0, 0.2)]);
        assert_eq!(tracker.total_count(), 0);
    }

    #[test]
    fn test_small_boxes_stay_hidden() {
        let config = TrackingConfig {
            min_hits_output: 1,
            min_area_output: 400.0,
            ..params()
        };
        let mut tracker = ObjectTracker::new(&config);
        let surfaced = tracker.update(&[dog(0.0, 0.0, 10.0, 10.0, 0.9), dog(100.0, 100.0, 130.0, 130.0, 0.9)]);
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].id, TrackId(2));
        assert_eq!(tracker.total_count(), 2);
        assert_eq!(tracker.surfaced_count(), 1);
    }

    #[test]
    fn test_track_limit() {
        let config = TrackingConfig {
            max_tracks: 2,
            ..params()
        };
        let mut tracker = ObjectTracker::new(&config);
        tracker.update(&[
            dog(0.0, 0.0, 10.0, 10.0, 0.9),
            dog(100.0, 0.0, 110.0, 10.0, 0.9),
            dog(200.0, 0.0, 210.0, 10.0, 0.9),
        ]);
        assert_eq!(tracker.total_count(), 2);
    }

    #[test]
    fn test_ids_never_reused() {
        let mut tracker = ObjectTracker::new(&TrackingConfig {
            max_age: 1,
            ..params()
        });
        let mut seen = HashSet::new();
        let mut last_max = 0;

        // Objects appear at shifting positions and vanish
        for step in 0..40u32 {
            let x = (step * 37 % 300) as f64;
            let detections = if step % 3 == 0 {
                vec![]
            } else {
                vec![dog(x, 0.0, x + 40.0, 40.0, 0.9), dog(x, 200.0, x + 40.0, 240.0, 0.8)]
            };
            tracker.update(&detections);

            let ids: Vec<u64> = tracker.tracks().iter().map(|t| t.id.0).collect();
            let unique: HashSet<u64> = ids.iter().copied().collect();
            assert_eq!(unique.len(), ids.len());

            for id in ids {
                if seen.insert(id) {
                    assert!(id > last_max, "id {} allocated out of order", id);
                    last_max = id;
                }
            }
        }
    }

    #[test]
    fn test_id_allocator() {
        let mut ids = IdAllocator::new();
        assert_eq!(ids.peek(), TrackId(1));
        assert_eq!(ids.allocate(), TrackId(1));
        assert_eq!(ids.allocate(), TrackId(2));
        assert_eq!(ids.peek(), TrackId(3));
    }
}
