//! Correlation engine
//!
//! Buffers OS clicks for a short window and enriches each one with at most
//! one browser-extension event and at most one screenshot before handing it
//! to the record sink. Every pending click is flushed exactly once: whichever
//! path (extension match, screenshot match, deadline timer, lazy sweep or
//! shutdown) removes it from the pending set under the lock owns its flush.
//!
//! Persistence never happens on the caller's thread. Flushed records go
//! through an unbounded queue to a writer task that calls the sink on the
//! blocking pool.

use crate::capture::config::ConfigHandle;
use crate::capture::input::types::{ClickEvent, ExtEvent};
use crate::capture::monitor::scaled_candidates;
use crate::capture::screen::CaptureEvent;
use crate::recorder::channel::{CaptureError, CaptureResult};
use crate::recorder::record::{ActivityRecord, Source};
use crate::recorder::sink::RecordSink;
use parking_lot::Mutex as ParkingMutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Maps an extension point (with its device-pixel-ratio hint) to a monitor
/// index for records that match no OS click
pub type DisplayResolver = Arc<dyn Fn(i32, i32, Option<f64>) -> Option<usize> + Send + Sync>;

/// Matching windows and distances
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationSettings {
    /// How long an OS click waits for enrichment before it is flushed as-is
    pub merge_timeout: Duration,
    /// Max distance (px) between an OS click and an extension event
    pub merge_distance: f64,
    /// Max distance (px) between an OS click and a screenshot's pointer
    pub screenshot_attach_distance: f64,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        Self {
            merge_timeout: Duration::from_millis(250),
            merge_distance: 80.0,
            screenshot_attach_distance: 120.0,
        }
    }
}

/// An OS click awaiting enrichment
struct PendingClick {
    id: Uuid,
    seq: u64,
    record: ActivityRecord,
    /// Global desktop point the click happened at
    origin: (i32, i32),
    created_at: Instant,
    expiry: Option<JoinHandle<()>>,
}

impl PendingClick {
    fn disarm(&mut self) {
        if let Some(timer) = self.expiry.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct PendingSet {
    entries: HashMap<Uuid, PendingClick>,
    next_seq: u64,
}

impl PendingSet {
    /// Remove every entry at least `max_age` old
    fn sweep(&mut self, now: Instant, max_age: Duration) -> Vec<ActivityRecord> {
        let mut expired: Vec<Uuid> = self
            .entries
            .values()
            .filter(|p| now.saturating_duration_since(p.created_at) >= max_age)
            .map(|p| p.id)
            .collect();
        expired.sort_by_key(|id| self.entries.get(id).map(|p| p.seq));

        expired
            .into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .map(|mut entry| {
                entry.disarm();
                entry.record
            })
            .collect()
    }
}

/// A pending click reserved for an extension event
pub struct ClaimedClick {
    id: Uuid,
    record: Option<ActivityRecord>,
    engine: Weak<EngineInner>,
}

impl Drop for ClaimedClick {
    fn drop(&mut self) {
        if let (Some(record), Some(inner)) = (self.record.take(), self.engine.upgrade()) {
            tracing::warn!("Claimed click {} was not completed; flushing it unchanged", self.id);
            inner.flush(vec![record]);
        }
    }
}

enum WriterMsg {
    Record(ActivityRecord),
    Barrier(oneshot::Sender<()>),
}

struct EngineInner {
    settings: CorrelationSettings,
    config: ConfigHandle,
    pending: ParkingMutex<PendingSet>,
    flush_tx: mpsc::UnboundedSender<WriterMsg>,
    runtime: Handle,
    display_resolver: ParkingMutex<Option<DisplayResolver>>,
}

impl EngineInner {
    fn flush(&self, records: Vec<ActivityRecord>) {
        for record in records {
            tracing::debug!("Flushing {} record", record.source);
            if self.flush_tx.send(WriterMsg::Record(record)).is_err() {
                tracing::error!("Record writer is gone; dropping record");
            }
        }
    }

    /// Deadline path for one entry
    fn expire(&self, id: Uuid) {
        let flushed = {
            let mut pending = self.pending.lock();
            let mut flushed = pending.sweep(Instant::now(), self.settings.merge_timeout);
            if let Some(mut entry) = pending.entries.remove(&id) {
                // This task is the timer; just forget its handle.
                entry.expiry.take();
                flushed.push(entry.record);
            }
            flushed
        };
        self.flush(flushed);
    }
}

/// Shared, cloneable handle to the correlation engine
#[derive(Clone)]
pub struct CorrelationEngine {
    inner: Arc<EngineInner>,
}

impl CorrelationEngine {
    /// Create an engine bound to the current tokio runtime.
    ///
    /// The engine's operations can afterwards be called from any thread,
    /// including non-runtime threads such as an OS input hook.
    pub fn new(
        settings: CorrelationSettings,
        config: ConfigHandle,
        sink: Arc<dyn RecordSink>,
    ) -> CaptureResult<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            CaptureError::Configuration(format!("Correlation engine needs a tokio runtime: {}", e))
        })?;

        let (flush_tx, flush_rx) = mpsc::unbounded_channel();
        runtime.spawn(run_writer(flush_rx, sink));

        tracing::info!(
            "Correlation engine ready (merge_timeout={:?}, merge_distance={}, attach_distance={})",
            settings.merge_timeout,
            settings.merge_distance,
            settings.screenshot_attach_distance
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                settings,
                config,
                pending: ParkingMutex::new(PendingSet::default()),
                flush_tx,
                runtime,
                display_resolver: ParkingMutex::new(None),
            }),
        })
    }

    pub fn set_display_resolver(&self, resolver: Option<DisplayResolver>) {
        *self.inner.display_resolver.lock() = resolver;
    }

    /// Buffer an OS click and arm its deadline. Never blocks on I/O.
    pub fn on_os_click(&self, click: ClickEvent) -> Uuid {
        let id = Uuid::new_v4();
        let now = Instant::now();

        let mut record = ActivityRecord::new(Source::Os);
        record.timestamp = click.timestamp;
        record.x = Some(click.local_x);
        record.y = Some(click.local_y);
        record.app_name = click.app_name;
        record.process_id = click.pid;
        record.window_title = click.window_title;
        record.display_id = Some(click.monitor_index);

        let timeout = self.inner.settings.merge_timeout;
        let weak: Weak<EngineInner> = Arc::downgrade(&self.inner);

        let flushed = {
            let mut pending = self.inner.pending.lock();
            let flushed = pending.sweep(now, timeout);

            let expiry = self.inner.runtime.spawn(async move {
                tokio::time::sleep(timeout).await;
                if let Some(inner) = weak.upgrade() {
                    inner.expire(id);
                }
            });

            let seq = pending.next_seq;
            pending.next_seq += 1;
            pending.entries.insert(
                id,
                PendingClick {
                    id,
                    seq,
                    record,
                    origin: (click.x, click.y),
                    created_at: now,
                    expiry: Some(expiry),
                },
            );
            flushed
        };
        self.inner.flush(flushed);

        tracing::debug!("OS click {} pending at ({}, {})", id, click.x, click.y);
        id
    }

    /// Match an extension event against pending clicks; see [`Self::merge_ext_event`]
    pub fn on_ext_event(&self, ev: ExtEvent) -> bool {
        self.merge_ext_event(ev, None)
    }

    /// Merge an extension event into the nearest pending click, or write it
    /// as a standalone `ext` record when nothing matches.
    ///
    /// `screenshot_path` is an on-demand capture taken for this event; it
    /// ends up in whichever record is flushed. Returns whether a pending
    /// click was matched.
    pub fn merge_ext_event(&self, ev: ExtEvent, screenshot_path: Option<String>) -> bool {
        let claim = self.claim_ext_match(&ev);
        self.complete_ext_event(claim, ev, screenshot_path)
    }

    /// Take the pending click an extension event belongs to out of the
    /// pending set, measured at the moment of the call.
    ///
    /// The claimed click no longer expires; finish it with
    /// [`Self::complete_ext_event`]. A claim dropped unfinished flushes the
    /// click unchanged.
    pub fn claim_ext_match(&self, ev: &ExtEvent) -> Option<ClaimedClick> {
        let settings = self.inner.settings;
        let now = Instant::now();

        let (claimed, flushed) = {
            let mut pending = self.inner.pending.lock();
            let flushed = pending.sweep(now, settings.merge_timeout);

            let hit = ev.point().and_then(|(x, y)| {
                scaled_candidates(x, y, ev.dpr).into_iter().find_map(|point| {
                    nearest_pending(
                        pending.entries.values(),
                        point,
                        settings.merge_distance,
                        settings.merge_timeout,
                        now,
                    )
                })
            });

            let claimed = hit.and_then(|id| pending.entries.remove(&id)).map(|mut entry| {
                entry.disarm();
                ClaimedClick {
                    id: entry.id,
                    record: Some(entry.record),
                    engine: Arc::downgrade(&self.inner),
                }
            });
            (claimed, flushed)
        };

        self.inner.flush(flushed);
        claimed
    }

    /// Flush a claimed click enriched by `ev`, or a standalone `ext` record
    /// when there was no claim. Returns whether a click was merged.
    pub fn complete_ext_event(
        &self,
        claim: Option<ClaimedClick>,
        ev: ExtEvent,
        screenshot_path: Option<String>,
    ) -> bool {
        if let Some(mut claim) = claim {
            if let Some(mut record) = claim.record.take() {
                merge_into(&mut record, &ev, screenshot_path);
                tracing::info!("Extension event merged into click {}", claim.id);
                self.inner.flush(vec![record]);
                return true;
            }
        }

        let mut record = ActivityRecord::from_ext_event(&ev, screenshot_path);
        if record.display_id.is_none() {
            record.display_id = self.resolve_display(&ev);
        }
        if record.is_meaningful() {
            tracing::info!("No pending click for extension event; writing standalone record");
            self.inner.flush(vec![record]);
        } else {
            tracing::warn!("Skipping extension event with no position, text or url");
        }
        false
    }

    fn resolve_display(&self, ev: &ExtEvent) -> Option<usize> {
        let (x, y) = ev.point()?;
        let resolver = self.inner.display_resolver.lock().clone()?;
        resolver(x, y, ev.dpr)
    }

    /// Attach a screenshot to the nearest pending click. No match is a no-op.
    pub fn on_capture_event(&self, cap: &CaptureEvent) -> bool {
        let settings = self.inner.settings;
        let window = self.inner.config.snapshot().screenshot_attach_timeout();
        let now = Instant::now();

        let (attached, flushed) = {
            let mut pending = self.inner.pending.lock();
            let mut flushed = pending.sweep(now, settings.merge_timeout);

            let hit = nearest_pending(
                pending.entries.values(),
                (cap.x, cap.y),
                settings.screenshot_attach_distance,
                window,
                now,
            );

            let attached = match hit.and_then(|id| pending.entries.remove(&id)) {
                Some(mut entry) => {
                    entry.disarm();
                    entry.record.screenshot_path = Some(cap.path.to_string_lossy().into_owned());
                    tracing::debug!("Screenshot attached to click {}", entry.id);
                    flushed.push(entry.record);
                    true
                }
                None => false,
            };
            (attached, flushed)
        };

        self.inner.flush(flushed);
        attached
    }

    /// Number of clicks still waiting for enrichment
    pub fn pending_count(&self) -> usize {
        let (flushed, count) = {
            let mut pending = self.inner.pending.lock();
            let flushed = pending.sweep(Instant::now(), self.inner.settings.merge_timeout);
            (flushed, pending.entries.len())
        };
        self.inner.flush(flushed);
        count
    }

    /// Flush every pending click as-is, oldest first. Returns how many were flushed.
    pub fn flush_all(&self) -> usize {
        let records = {
            let mut pending = self.inner.pending.lock();
            pending.sweep(Instant::now(), Duration::ZERO)
        };
        let count = records.len();
        if count > 0 {
            tracing::info!("Flushing {} pending click(s)", count);
        }
        self.inner.flush(records);
        count
    }

    /// Wait until every record flushed so far has been handed to the sink
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        if self.inner.flush_tx.send(WriterMsg::Barrier(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    #[cfg(test)]
    fn disarm_timers(&self) {
        for entry in self.inner.pending.lock().entries.values_mut() {
            entry.disarm();
        }
    }
}

async fn run_writer(mut rx: mpsc::UnboundedReceiver<WriterMsg>, sink: Arc<dyn RecordSink>) {
    while let Some(msg) = rx.recv().await {
        match msg {
            WriterMsg::Record(record) => {
                let sink = sink.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || sink.log_click(&record)).await {
                    tracing::error!("Record sink task failed: {}", e);
                }
            }
            WriterMsg::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Record writer stopped");
}

/// Pick the pending click closest to `point` within `limit` pixels and
/// younger than `window`. Ties go to the oldest click.
fn nearest_pending<'a>(
    entries: impl Iterator<Item = &'a PendingClick>,
    point: (i32, i32),
    limit: f64,
    window: Duration,
    now: Instant,
) -> Option<Uuid> {
    let mut best: Option<(f64, Instant, u64, Uuid)> = None;

    for entry in entries {
        if now.saturating_duration_since(entry.created_at) >= window {
            continue;
        }
        let distance = distance(entry.origin, point);
        if distance > limit {
            continue;
        }
        let better = match best {
            None => true,
            Some((d, created, seq, _)) => {
                distance < d
                    || (distance == d && (entry.created_at, entry.seq) < (created, seq))
            }
        };
        if better {
            best = Some((distance, entry.created_at, entry.seq, entry.id));
        }
    }

    best.map(|(_, _, _, id)| id)
}

fn distance(a: (i32, i32), b: (i32, i32)) -> f64 {
    let dx = f64::from(a.0) - f64::from(b.0);
    let dy = f64::from(a.1) - f64::from(b.1);
    (dx * dx + dy * dy).sqrt()
}

/// Extension fields win over OS fields when both are present
fn merge_into(record: &mut ActivityRecord, ev: &ExtEvent, screenshot_path: Option<String>) {
    record.source = Source::Ext;
    if ev.text.is_some() {
        record.text = ev.text.clone();
    }
    if ev.url.is_some() {
        record.set_url(ev.url.clone());
    }
    if ev.title.is_some() {
        record.window_title = ev.title.clone();
    }
    if ev.display_id.is_some() {
        record.display_id = ev.display_id;
    }
    if screenshot_path.is_some() {
        record.screenshot_path = screenshot_path;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::config::CaptureConfig;
    use crate::recorder::record::DEFAULT_BROWSER;
    use chrono::Utc;
    use crate::recorder::sink::testing::MemorySink;
    use std::path::PathBuf;

    fn engine() -> (CorrelationEngine, Arc<MemorySink>) {
        engine_with(CorrelationSettings::default())
    }

    fn engine_with(settings: CorrelationSettings) -> (CorrelationEngine, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::default());
        let engine = CorrelationEngine::new(
            settings,
            ConfigHandle::new(CaptureConfig::new(1.0, "unused")),
            sink.clone(),
        )
        .expect("engine");
        (engine, sink)
    }

    fn ext_at(x: i32, y: i32, text: &str) -> ExtEvent {
        ExtEvent {
            text: Some(text.to_string()),
            url: Some("https://shop.test/cart".to_string()),
            global_x: Some(x),
            global_y: Some(y),
            ..Default::default()
        }
    }

    fn capture_at(x: i32, y: i32) -> CaptureEvent {
        CaptureEvent {
            path: PathBuf::from("data/2024-05-01/shot.png"),
            x,
            y,
            monitor_index: 1,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_ext_match_flushes_exactly_once() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(100, 100));

        assert!(engine.on_ext_event(ext_at(110, 105, "Buy now")));
        assert_eq!(engine.pending_count(), 0);

        // Later sources find nothing and the cancelled timer never fires.
        assert!(!engine.on_capture_event(&capture_at(100, 100)));
        tokio::time::sleep(Duration::from_millis(400)).await;
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Ext);
        assert_eq!(records[0].text.as_deref(), Some("Buy now"));
        assert_eq!(records[0].url_or_path.as_deref(), Some("https://shop.test/cart"));
        assert_eq!((records[0].x, records[0].y), (Some(100), Some(100)));
    }

    #[tokio::test]
    async fn test_equidistant_ext_event_picks_older_click() {
        let (engine, sink) = engine();
        let mut first = ClickEvent::at(90, 100);
        first.window_title = Some("first".into());
        let mut second = ClickEvent::at(110, 100);
        second.window_title = Some("second".into());
        engine.on_os_click(first);
        engine.on_os_click(second);

        let ev = ExtEvent {
            global_x: Some(100),
            global_y: Some(100),
            text: Some("x".into()),
            ..Default::default()
        };
        assert!(engine.on_ext_event(ev));
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].window_title.as_deref(), Some("first"));
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_unmatched_click_flushes_after_timeout() {
        let (engine, sink) = engine();
        let start = Instant::now();
        engine.on_os_click(ClickEvent::at(10, 20));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sink.len(), 0);

        let records = sink.wait_for(1, Duration::from_secs(2)).await;
        let elapsed = start.elapsed();
        assert_eq!(records.len(), 1);
        assert!(elapsed >= Duration::from_millis(250), "flushed early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1250), "flushed late: {:?}", elapsed);

        let record = &records[0];
        assert_eq!(record.source, Source::Os);
        assert!(record.text.is_none());
        assert!(record.url_or_path.is_none());
        assert!(record.screenshot_path.is_none());
    }

    #[tokio::test]
    async fn test_far_ext_event_writes_standalone_record() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(0, 0));

        assert!(!engine.on_ext_event(ext_at(500, 500, "elsewhere")));
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Ext);
        assert_eq!(records[0].app_name.as_deref(), Some(DEFAULT_BROWSER));
        assert_eq!((records[0].x, records[0].y), (Some(500), Some(500)));
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_standalone_record_uses_display_resolver() {
        let (engine, sink) = engine();
        engine.set_display_resolver(Some(Arc::new(|x: i32, _y: i32, dpr: Option<f64>| {
            let scaled = (f64::from(x) * dpr.unwrap_or(1.0)) as i32;
            Some(if scaled >= 1000 { 2 } else { 1 })
        })));

        let mut ev = ext_at(600, 150, "standalone");
        ev.dpr = Some(2.0);
        assert!(!engine.on_ext_event(ev));

        let mut named = ext_at(10, 10, "named");
        named.display_id = Some(7);
        assert!(!engine.on_ext_event(named));
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records[0].display_id, Some(2));
        assert_eq!(records[1].display_id, Some(7));
    }

    #[tokio::test]
    async fn test_empty_ext_event_is_skipped() {
        let (engine, sink) = engine();
        assert!(!engine.on_ext_event(ExtEvent::default()));
        engine.settle().await;
        assert_eq!(sink.len(), 0);
    }

    #[tokio::test]
    async fn test_screenshot_attaches_to_nearby_click() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(500, 400));

        assert!(!engine.on_capture_event(&capture_at(800, 400)));
        assert!(engine.on_capture_event(&capture_at(560, 420)));
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Os);
        assert_eq!(
            records[0].screenshot_path.as_deref(),
            Some("data/2024-05-01/shot.png")
        );
    }

    #[tokio::test]
    async fn test_dpr_scaled_ext_event_matches_second_monitor_click() {
        let (engine, sink) = engine();
        let mut click = ClickEvent::at(1200, 300);
        click.local_x = 200;
        click.local_y = 300;
        click.monitor_index = 2;
        engine.on_os_click(click);

        let ev = ExtEvent {
            global_x: Some(600),
            global_y: Some(150),
            dpr: Some(2.0),
            text: Some("Next".into()),
            ..Default::default()
        };
        assert!(engine.on_ext_event(ev));
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].display_id, Some(2));
        assert_eq!((records[0].x, records[0].y), (Some(200), Some(300)));
    }

    #[tokio::test]
    async fn test_merge_carries_on_demand_screenshot_and_doc_path() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(40, 40));

        let ev = ExtEvent {
            url: Some("file:///C:/Users/Admin/Downloads/example.pdf".into()),
            x: Some(42),
            y: Some(38),
            display_id: Some(3),
            ..Default::default()
        };
        assert!(engine.merge_ext_event(ev, Some("shot.png".into())));
        engine.settle().await;

        let record = &sink.records()[0];
        assert_eq!(record.screenshot_path.as_deref(), Some("shot.png"));
        assert_eq!(record.doc_path.as_deref(), Some("C:/Users/Admin/Downloads/example.pdf"));
        assert_eq!(record.display_id, Some(3));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_racing_sources_produce_one_record() {
        let (engine, sink) = engine();

        for round in 0..20 {
            engine.on_os_click(ClickEvent::at(300, 300));
            let ext_engine = engine.clone();
            let cap_engine = engine.clone();
            let ext = std::thread::spawn(move || {
                ext_engine.on_ext_event(ext_at(305, 300, "race")) as usize
            });
            let cap = std::thread::spawn(move || {
                cap_engine.on_capture_event(&capture_at(300, 305)) as usize
            });
            let _ = ext.join().expect("ext thread");
            let _ = cap.join().expect("capture thread");

            tokio::time::sleep(Duration::from_millis(300)).await;
            engine.settle().await;
            // The extension event either merged or wrote a standalone record;
            // the click itself is flushed exactly once.
            let records = sink.records();
            let clicks = records
                .iter()
                .filter(|r| r.x == Some(300) && r.y == Some(300))
                .count();
            assert_eq!(clicks, round + 1, "round {}", round);
        }
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_deadline_racing_ext_and_capture_flushes_once() {
        let (engine, sink) = engine_with(CorrelationSettings {
            merge_timeout: Duration::from_millis(10),
            ..CorrelationSettings::default()
        });
        let rounds = 40;

        for round in 0..rounds {
            let cx = round * 1000;
            engine.on_os_click(ClickEvent::at(cx, 500));
            // Land on either side of the 10ms deadline
            tokio::time::sleep(Duration::from_millis(8 + (round % 5) as u64)).await;

            let ext_engine = engine.clone();
            let cap_engine = engine.clone();
            let ext = std::thread::spawn(move || ext_engine.on_ext_event(ext_at(cx + 3, 500, "race")));
            let cap = std::thread::spawn(move || cap_engine.on_capture_event(&capture_at(cx, 502)));
            let _ = ext.join().expect("ext thread");
            let _ = cap.join().expect("capture thread");
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(engine.pending_count(), 0);
        engine.settle().await;

        let records = sink.records();
        for round in 0..rounds {
            let cx = round * 1000;
            let clicks = records.iter().filter(|r| r.x == Some(cx)).count();
            assert_eq!(clicks, 1, "click {} flushed {} times", round, clicks);
            let ext = records
                .iter()
                .filter(|r| r.text.as_deref() == Some("race"))
                .filter(|r| r.x == Some(cx) || r.x == Some(cx + 3))
                .count();
            assert_eq!(ext, 1, "extension event {} written {} times", round, ext);
        }
    }

    #[tokio::test]
    async fn test_claimed_click_outlives_its_deadline() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(100, 100));

        let ev = ext_at(102, 100, "late");
        let claim = engine.claim_ext_match(&ev);
        assert!(claim.is_some());
        assert_eq!(engine.pending_count(), 0);

        tokio::time::sleep(Duration::from_millis(400)).await;
        engine.settle().await;
        assert_eq!(sink.len(), 0);

        assert!(engine.complete_ext_event(claim, ev, Some("shot.png".into())));
        engine.settle().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Ext);
        assert_eq!(records[0].screenshot_path.as_deref(), Some("shot.png"));
    }

    #[tokio::test]
    async fn test_dropped_claim_flushes_click_unchanged() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(100, 100));

        let claim = engine.claim_ext_match(&ext_at(101, 101, "lost"));
        assert!(claim.is_some());
        drop(claim);
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Os);
        assert!(records[0].text.is_none());
    }

    #[tokio::test]
    async fn test_sweep_flushes_when_timer_never_fires() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(1, 1));
        engine.disarm_timers();

        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.settle().await;
        assert_eq!(sink.len(), 0);

        assert_eq!(engine.pending_count(), 0);
        engine.settle().await;
        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, Source::Os);
    }

    #[tokio::test]
    async fn test_flush_all_empties_pending_set() {
        let (engine, sink) = engine();
        engine.on_os_click(ClickEvent::at(1, 1));
        engine.on_os_click(ClickEvent::at(2, 2));

        assert_eq!(engine.flush_all(), 2);
        assert_eq!(engine.flush_all(), 0);
        tokio::time::sleep(Duration::from_millis(300)).await;
        engine.settle().await;

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].x, Some(1));
    }
}
