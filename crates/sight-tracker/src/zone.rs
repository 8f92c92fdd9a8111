//! Safe-zone cache, refresh timers and containment policy
//!
//! The geofence and the alert flag are refreshed on independent timers.
//! A failed lookup keeps whatever was cached before; only a successful
//! answer replaces it.

use sight_core::{in_safe_zone, Geofence, Track, TrackView, UserId};
use sight_store::ZoneStore;
use sight_telemetry::MetricsCollector;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Elapsed-time gate against an injected clock reading
#[derive(Debug, Clone)]
pub struct RefreshTimer {
    interval: Duration,
    last: Option<Instant>,
}

impl RefreshTimer {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// Never-run timers are always due
    pub fn due(&self, now: Instant) -> bool {
        match self.last {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }

    /// Make the next `due` check succeed
    pub fn force(&mut self) {
        self.last = None;
    }
}

/// Cached per-user zone state, owned by the processing task
#[derive(Debug)]
pub struct ZoneCache {
    user: Option<UserId>,
    geofence: Option<Geofence>,
    alert_enabled: bool,
    zone_timer: RefreshTimer,
    flag_timer: RefreshTimer,
}

impl ZoneCache {
    pub fn new(geofence_refresh: Duration, alert_flag_refresh: Duration) -> Self {
        Self {
            user: None,
            geofence: None,
            alert_enabled: false,
            zone_timer: RefreshTimer::new(geofence_refresh),
            flag_timer: RefreshTimer::new(alert_flag_refresh),
        }
    }

    /// Switch to another user. Returns `false` if the user is unchanged.
    ///
    /// State cached for the previous user is dropped and both lookups run
    /// on the next refresh.
    pub fn bind(&mut self, user: Option<UserId>) -> bool {
        if self.user == user {
            return false;
        }
        info!(
            "👤 User set to: {}",
            user.as_ref().map(UserId::as_str).unwrap_or("<none>")
        );
        self.user = user;
        self.geofence = None;
        self.alert_enabled = false;
        self.zone_timer.force();
        self.flag_timer.force();
        true
    }

    /// Run whichever lookups are due. Without a bound user nothing is
    /// fetched.
    pub async fn refresh(&mut self, store: &dyn ZoneStore, now: Instant, metrics: &MetricsCollector) {
        let Some(user) = self.user.clone() else {
            return;
        };

        if self.zone_timer.due(now) {
            self.zone_timer.mark(now);
            match store.fetch_geofence(&user).await {
                Ok(geofence) => {
                    match &geofence {
                        Some(g) => debug!("Safe zone loaded: {} points", g.len()),
                        None => debug!("No safe zone defined for {}", user),
                    }
                    self.geofence = geofence;
                }
                Err(e) => {
                    warn!("⚠️ Error fetching safe zone: {} (keeping cached value)", e);
                    metrics.record_store_failure("geofence");
                }
            }
        }

        if self.flag_timer.due(now) {
            self.flag_timer.mark(now);
            match store.fetch_alert_enabled(&user).await {
                Ok(enabled) => {
                    if enabled != self.alert_enabled {
                        debug!("Alerts {} for {}", if enabled { "enabled" } else { "disabled" }, user);
                    }
                    self.alert_enabled = enabled;
                }
                Err(e) => {
                    warn!("⚠️ Error checking alert status: {} (keeping cached value)", e);
                    metrics.record_store_failure("alert_flag");
                }
            }
        }
    }

    pub fn user(&self) -> Option<&UserId> {
        self.user.as_ref()
    }

    pub fn geofence(&self) -> Option<&Geofence> {
        self.geofence.as_ref()
    }

    pub fn alert_enabled(&self) -> bool {
        self.alert_enabled
    }
}

/// Per-track containment against the current geofence
pub struct GeofencePolicy;

impl GeofencePolicy {
    /// Flag each track whose box center falls outside the geofence. With no
    /// geofence every track is inside.
    pub fn evaluate(tracks: &[Track], geofence: Option<&Geofence>, frame_width: u32, frame_height: u32) -> Vec<TrackView> {
        tracks
            .iter()
            .map(|track| TrackView {
                track: track.clone(),
                outside_zone: !in_safe_zone(geofence, track.center(), frame_width, frame_height),
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use sight_core::{BoundingBox, ClassLabel, NormalizedPoint, TrackId};
    use sight_store::{StoreError, StoreResult};

    /// Store answering from queued results
    #[derive(Default)]
    struct QueuedStore {
        zones: Mutex<Vec<StoreResult<Option<Geofence>>>>,
        flags: Mutex<Vec<StoreResult<bool>>>,
        zone_calls: Mutex<u32>,
        flag_calls: Mutex<u32>,
    }

    #[async_trait::async_trait]
    impl ZoneStore for QueuedStore {
        async fn fetch_geofence(&self, _user: &UserId) -> StoreResult<Option<Geofence>> {
            *self.zone_calls.lock() += 1;
            self.zones.lock().remove(0)
        }

        async fn fetch_alert_enabled(&self, _user: &UserId) -> StoreResult<bool> {
            *self.flag_calls.lock() += 1;
            self.flags.lock().remove(0)
        }

        fn backend(&self) -> &'static str {
            "queued"
        }
    }

    fn half(right: bool) -> Geofence {
        let (a, b) = if right { (0.5, 1.0) } else { (0.0, 0.5) };
        Geofence::new(vec![
            NormalizedPoint::new(a, 0.0),
            NormalizedPoint::new(b, 0.0),
            NormalizedPoint::new(b, 1.0),
            NormalizedPoint::new(a, 1.0),
        ])
        .unwrap()
    }

    fn track_at(cx: f64, cy: f64) -> Track {
        Track {
            id: TrackId(1),
            class: ClassLabel::new("dog"),
            bbox: BoundingBox::new(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0),
            confidence: 0.9,
            hits: 3,
            age: 0,
        }
    }

    #[test]
    fn test_refresh_timer() {
        let start = Instant::now();
        let mut timer = RefreshTimer::new(Duration::from_secs(10));
        assert!(timer.due(start));
        timer.mark(start);
        assert!(!timer.due(start + Duration::from_secs(9)));
        assert!(timer.due(start + Duration::from_secs(10)));
        timer.force();
        assert!(timer.due(start));
    }

    #[test]
    fn test_policy_without_geofence() {
        let views = GeofencePolicy::evaluate(&[track_at(600.0, 240.0)], None, 640, 480);
        assert!(!views[0].outside_zone);
    }

    #[test]
    fn test_policy_left_half_zone() {
        // Zone covers x in [0, 0.5]; 0.9 is outside, 0.1 inside
        let zone = half(false);
        let views = GeofencePolicy::evaluate(&[track_at(576.0, 240.0), track_at(64.0, 240.0)], Some(&zone), 640, 480);
        assert!(views[0].outside_zone);
        assert!(!views[1].outside_zone);
    }

    #[test]
    fn test_policy_right_half_zone() {
        let zone = half(true);
        let views = GeofencePolicy::evaluate(&[track_at(576.0, 240.0), track_at(64.0, 240.0)], Some(&zone), 640, 480);
        assert!(!views[0].outside_zone);
        assert!(views[1].outside_zone);
    }

    #[tokio::test]
    async fn test_no_user_no_lookups() {
        let store = QueuedStore::default();
        let metrics = MetricsCollector::new().unwrap();
        let mut cache = ZoneCache::new(Duration::from_secs(10), Duration::from_secs(5));

        cache.refresh(&store, Instant::now(), &metrics).await;
        assert_eq!(*store.zone_calls.lock(), 0);
        assert_eq!(*store.flag_calls.lock(), 0);
        assert!(cache.geofence().is_none());
    }

    #[tokio::test]
    async fn test_independent_timers() {
        let store = QueuedStore::default();
        store.zones.lock().extend([Ok(Some(half(false)))]);
        store.flags.lock().extend([Ok(true), Ok(false)]);
        let metrics = MetricsCollector::new().unwrap();
        let mut cache = ZoneCache::new(Duration::from_secs(10), Duration::from_secs(5));
        cache.bind(Some(UserId::new("u1")));

        let start = Instant::now();
        cache.refresh(&store, start, &metrics).await;
        assert!(cache.geofence().is_some());
        assert!(cache.alert_enabled());

        cache.refresh(&store, start + Duration::from_secs(6), &metrics).await;
        assert_eq!(*store.zone_calls.lock(), 1);
        assert_eq!(*store.flag_calls.lock(), 2);
        assert!(!cache.alert_enabled());
    }

    #[tokio::test]
    async fn test_failure_keeps_cached_values() {
        let store = QueuedStore::default();
        store.zones.lock().extend([Ok(Some(half(false))), Err(StoreError::query("down"))]);
        store.flags.lock().extend([Ok(true), Err(StoreError::query("down"))]);
        let metrics = MetricsCollector::new().unwrap();
        let mut cache = ZoneCache::new(Duration::from_secs(10), Duration::from_secs(5));
        cache.bind(Some(UserId::new("u1")));

        let start = Instant::now();
        cache.refresh(&store, start, &metrics).await;
        cache.refresh(&store, start + Duration::from_secs(11), &metrics).await;

        assert_eq!(cache.geofence().map(Geofence::len), Some(4));
        assert!(cache.alert_enabled());
        assert_eq!(metrics.store_failures("geofence"), 1);
        assert_eq!(metrics.store_failures("alert_flag"), 1);
    }

    #[tokio::test]
    async fn test_absent_zone_replaces_cache() {
        let store = QueuedStore::default();
        store.zones.lock().extend([Ok(Some(half(false))), Ok(None)]);
        store.flags.lock().extend([Ok(false), Ok(false)]);
        let metrics = MetricsCollector::new().unwrap();
        let mut cache = ZoneCache::new(Duration::from_secs(10), Duration::from_secs(5));
        cache.bind(Some(UserId::new("u1")));

        let start = Instant::now();
        cache.refresh(&store, start, &metrics).await;
        cache.refresh(&store, start + Duration::from_secs(10), &metrics).await;
        assert!(cache.geofence().is_none());
    }

    #[tokio::test]
    async fn test_bind_forces_refresh() {
        let store = QueuedStore::default();
        store.zones.lock().extend([Ok(None), Ok(Some(half(true)))]);
        store.flags.lock().extend([Ok(false), Ok(true)]);
        let metrics = MetricsCollector::new().unwrap();
        let mut cache = ZoneCache::new(Duration::from_secs(10), Duration::from_secs(5));

        let start = Instant::now();
        assert!(cache.bind(Some(UserId::new("u1"))));
        cache.refresh(&store, start, &metrics).await;
        assert!(!cache.bind(Some(UserId::new("u1"))));

        assert!(cache.bind(Some(UserId::new("u2"))));
        cache.refresh(&store, start + Duration::from_secs(1), &metrics).await;
        assert_eq!(cache.user(), Some(&UserId::new("u2")));
        assert!(cache.geofence().is_some());
        assert!(cache.alert_enabled());
    }
}
