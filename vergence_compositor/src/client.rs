// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! One client session's compositor-side state.
//!
//! A [`ClientCompositor`] is shared between exactly two threads: the client's
//! own submission thread and the display's render thread. The layer pipeline
//! between them is a triple buffer:
//!
//! ```text
//!   client thread                        render thread
//!   ─────────────                        ─────────────
//!   begin_layers / append_layer
//!        │ writes `progress`
//!        ▼
//!   commit_layers ── moves ──► `scheduled` (slot lock, most-recent-wins)
//!                                   │
//!                          deliver_if_due(t) when the batch's display
//!                          time has arrived
//!                                   ▼
//!                              `delivered` ── walked by the render loop
//! ```
//!
//! `progress` is only ever touched by the client thread and `delivered` only
//! by the render thread; each sits behind its own (uncontended) mutex so the
//! sharing stays safe without unsafe code. A commit *overwrites* a scheduled
//! batch that never became due — the newest content wins, nothing is queued.

use std::sync::Mutex;
use std::thread;

use tracing::trace;

use vergence_core::backend::SwapchainHandle;
use vergence_core::client_pacer::ClientPacer;
use vergence_core::event::{EventQueue, SessionEvent};
use vergence_core::layer::{BlendMode, LayerEntry, LayerSlot, MAX_LAYERS, SwapchainIndex};
use vergence_core::time::HostTime;
use vergence_core::timing::{ClientPrediction, FrameId, TimingSample};

use crate::{CompositorError, lock, monotonic_now};

/// Session flags, guarded by one mutex.
///
/// `visible`/`focused` are what the activation policy last computed;
/// `sent_visible`/`sent_focused` are what the client was last told. Events
/// are emitted only when the two disagree.
#[derive(Debug, Default)]
struct SessionState {
    session_active: bool,
    overlay: bool,
    z_order: i64,
    visible: bool,
    focused: bool,
    sent_visible: bool,
    sent_focused: bool,
}

/// One client session.
#[derive(Debug, Default)]
pub struct ClientCompositor {
    session: Mutex<SessionState>,
    events: Mutex<EventQueue>,
    pacer: Mutex<ClientPacer>,
    /// Client-local swapchain table; layers reference slots by index.
    swapchains: Mutex<Vec<Option<SwapchainHandle>>>,
    /// Being written by the client thread.
    progress: Mutex<LayerSlot>,
    /// Committed for a future display time; the handoff point.
    scheduled: Mutex<LayerSlot>,
    /// Promoted by the render thread, walked during composition.
    delivered: Mutex<LayerSlot>,
}

impl ClientCompositor {
    /// Creates a detached session with no layers and no timing sample.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- session flags -----------------------------------------------------

    /// Marks the session as running (or not). The server's activation update
    /// must run afterwards for visibility and focus to follow.
    pub fn set_session_active(&self, active: bool) {
        lock(&self.session).session_active = active;
    }

    /// Whether the session is running.
    #[must_use]
    pub fn session_active(&self) -> bool {
        lock(&self.session).session_active
    }

    /// Makes this session an overlay at the given stacking position, or a
    /// primary candidate again.
    pub fn set_overlay(&self, overlay: bool, z_order: i64) {
        let mut session = lock(&self.session);
        session.overlay = overlay;
        session.z_order = z_order;
    }

    /// Whether this session renders on top of the primary application.
    #[must_use]
    pub fn is_overlay(&self) -> bool {
        lock(&self.session).overlay
    }

    /// Stacking position among overlays; lower renders first.
    #[must_use]
    pub fn z_order(&self) -> i64 {
        lock(&self.session).z_order
    }

    // -- swapchain table ---------------------------------------------------

    /// Stores a backend swapchain handle and returns the client-local index
    /// layers use to reference it.
    pub fn register_swapchain(&self, handle: SwapchainHandle) -> SwapchainIndex {
        let mut table = lock(&self.swapchains);
        for (i, slot) in table.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(handle);
                return SwapchainIndex(i as u32);
            }
        }
        table.push(Some(handle));
        SwapchainIndex((table.len() - 1) as u32)
    }

    /// Forgets a swapchain. Layers still referencing the index are skipped at
    /// composition time.
    pub fn destroy_swapchain(&self, index: SwapchainIndex) {
        let mut table = lock(&self.swapchains);
        if let Some(slot) = table.get_mut(index.0 as usize) {
            *slot = None;
        }
    }

    /// Resolves a client-local swapchain index to its backend handle.
    #[must_use]
    pub fn resolve_swapchain(&self, index: SwapchainIndex) -> Option<SwapchainHandle> {
        lock(&self.swapchains).get(index.0 as usize).copied().flatten()
    }

    // -- frame protocol ----------------------------------------------------

    /// Installs the timing sample broadcast by the render loop.
    pub fn new_sample(&self, sample: TimingSample) {
        lock(&self.pacer).new_sample(sample);
    }

    /// Predicts the session's next frame without waiting.
    pub fn predict_frame(&self, now: HostTime) -> Result<ClientPrediction, CompositorError> {
        Ok(lock(&self.pacer).predict(now)?)
    }

    /// Records that the client's wait for `frame_id` returned at `now`.
    pub fn mark_wait_woke(&self, frame_id: FrameId, now: HostTime) {
        lock(&self.pacer).mark_wait_woke(frame_id, now);
    }

    /// Predicts the next frame, sleeps until its wake-up time, and marks the
    /// wake. This is the blocking call a client's frame loop sits in.
    pub fn wait_frame(&self) -> Result<ClientPrediction, CompositorError> {
        let prediction = { lock(&self.pacer).predict(monotonic_now())? };

        let now = monotonic_now();
        if now < prediction.wake_up_time {
            let delay = prediction.wake_up_time - now;
            thread::sleep(std::time::Duration::from_nanos(delay.nanos()));
        }

        lock(&self.pacer).mark_wait_woke(prediction.frame_id, monotonic_now());
        Ok(prediction)
    }

    /// Records that the client began rendering `frame_id`.
    pub fn begin_frame(&self, frame_id: FrameId, now: HostTime) {
        lock(&self.pacer).mark_begin(frame_id, now);
    }

    /// Releases a frame the client will not submit layers for.
    pub fn discard_frame(&self, frame_id: FrameId, now: HostTime) {
        lock(&self.pacer).mark_discarded(frame_id, now);
    }

    // -- layer submission (client thread) ----------------------------------

    /// Starts a fresh layer batch for `frame_id`.
    pub fn begin_layers(&self, frame_id: FrameId, env_blend_mode: BlendMode) {
        trace!(?frame_id, "layer batch begin");
        let mut progress = lock(&self.progress);
        progress.clear();
        progress.active = true;
        progress.env_blend_mode = env_blend_mode;
    }

    /// Appends one layer to the batch in progress. Order is blend order.
    pub fn append_layer(&self, entry: LayerEntry) -> Result<(), CompositorError> {
        let mut progress = lock(&self.progress);
        if progress.layers.len() == MAX_LAYERS {
            return Err(CompositorError::LayerLimit);
        }
        progress.layers.push(entry);
        Ok(())
    }

    /// Commits the batch in progress for display at `display_time`.
    ///
    /// The batch replaces whatever was scheduled before — a batch whose
    /// display time never arrived is superseded, not queued behind.
    pub fn commit_layers(&self, frame_id: FrameId, display_time: HostTime, now: HostTime) {
        let mut batch = std::mem::take(&mut *lock(&self.progress));
        batch.display_time = display_time;

        *lock(&self.scheduled) = batch;

        lock(&self.pacer).mark_delivered(frame_id, now);
    }

    // -- delivery (render thread) ------------------------------------------

    /// Promotes the scheduled batch to `delivered` if its display time is at
    /// or before `display_time` (within the present-slop window). Returns
    /// whether a promotion happened.
    pub fn deliver_if_due(&self, display_time: HostTime) -> bool {
        let batch = {
            let mut scheduled = lock(&self.scheduled);
            if !scheduled.active {
                return false;
            }
            let due = display_time >= scheduled.display_time
                || display_time.is_within_half_ms(scheduled.display_time);
            if !due {
                return false;
            }
            std::mem::take(&mut *scheduled)
        };

        *lock(&self.delivered) = batch;
        true
    }

    /// Clones the delivered batch for the render walk.
    #[must_use]
    pub fn delivered_batch(&self) -> LayerSlot {
        lock(&self.delivered).clone()
    }

    // -- events ------------------------------------------------------------

    /// Pops the oldest pending state-change event.
    #[must_use]
    pub fn poll_event(&self) -> Option<SessionEvent> {
        lock(&self.events).pop()
    }

    /// Number of events lost because the client did not drain its queue.
    #[must_use]
    pub fn dropped_events(&self) -> u64 {
        lock(&self.events).dropped_count()
    }

    /// Applies the activation policy's verdict for this client and queues
    /// events for whatever actually changed.
    ///
    /// `has_primary` says whether any primary application is active;
    /// `is_active` whether this client is it; `primary_switched` whether the
    /// primary changed identity from one application to another (overlays are
    /// told about that even though their own visibility is unchanged).
    pub(crate) fn apply_focus_state(
        &self,
        has_primary: bool,
        is_active: bool,
        primary_switched: bool,
    ) {
        let mut session = lock(&self.session);

        let (visible, focused) = if is_active {
            (true, true)
        } else if has_primary && session.overlay {
            (true, false)
        } else {
            (false, false)
        };
        session.visible = visible;
        session.focused = focused;

        let state_changed = visible != session.sent_visible || focused != session.sent_focused;
        let overlay_repaint =
            session.overlay && primary_switched && visible && session.sent_visible;

        if state_changed {
            session.sent_visible = visible;
            session.sent_focused = focused;
            lock(&self.events).push(SessionEvent::StateChange { visible, focused });
        } else if overlay_repaint {
            // The overlay stays visible but the application under it changed.
            lock(&self.events).push(SessionEvent::OverlayChange { visible });
        }
    }

    /// Drops all in-flight state: layer slots, pacing slots, queued events.
    /// Called when the session detaches from the server.
    pub(crate) fn teardown(&self) {
        lock(&self.progress).clear();
        lock(&self.scheduled).clear();
        lock(&self.delivered).clear();
        lock(&self.pacer).clear();
        lock(&self.events).drain();
        lock(&self.swapchains).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergence_core::layer::{
        DeviceIndex, EyeVisibility, LayerData, LayerFlags, LayerKind, Pose, SubImage,
    };
    use vergence_core::time::Duration;

    const PERIOD: Duration = Duration(16_666_667);

    fn quad_entry(swapchain: SwapchainIndex) -> LayerEntry {
        LayerEntry {
            device: DeviceIndex(0),
            data: LayerData {
                timestamp: HostTime(0),
                flags: LayerFlags::default(),
                flip_y: false,
                kind: LayerKind::Quad {
                    swapchain,
                    visibility: EyeVisibility::Both,
                    sub: SubImage {
                        image_index: 0,
                        rect: kurbo::Rect::new(0.0, 0.0, 256.0, 256.0),
                    },
                    pose: Pose::IDENTITY,
                    size: kurbo::Size::new(1.0, 1.0),
                },
            },
        }
    }

    /// Drives the frame protocol far enough that a batch can be committed.
    fn begun_frame(client: &ClientCompositor, now: HostTime) -> FrameId {
        client.new_sample(TimingSample {
            predicted_display_time: now,
            extra: Duration::MS,
            period: PERIOD,
        });
        let prediction = client.predict_frame(now).unwrap();
        client.mark_wait_woke(prediction.frame_id, now);
        client.begin_frame(prediction.frame_id, now);
        prediction.frame_id
    }

    #[test]
    fn most_recent_commit_wins() {
        let client = ClientCompositor::new();
        let now = HostTime(100_000_000);
        let swapchain_a = client.register_swapchain(SwapchainHandle(0xa));
        let swapchain_b = client.register_swapchain(SwapchainHandle(0xb));

        let t1 = HostTime(200_000_000);
        let t2 = HostTime(216_666_667);

        // Batch A for T1, never delivered.
        let frame = begun_frame(&client, now);
        client.begin_layers(frame, BlendMode::Opaque);
        client.append_layer(quad_entry(swapchain_a)).unwrap();
        client.commit_layers(frame, t1, now);

        // Batch B for a later T2 overwrites A before anything was due.
        let frame = begun_frame(&client, now);
        client.begin_layers(frame, BlendMode::Opaque);
        client.append_layer(quad_entry(swapchain_b)).unwrap();
        client.commit_layers(frame, t2, now);

        assert!(client.deliver_if_due(t2));
        let delivered = client.delivered_batch();
        assert!(delivered.active);
        assert_eq!(delivered.display_time, t2);
        assert_eq!(delivered.layers.len(), 1);
        match delivered.layers[0].data.kind {
            LayerKind::Quad { swapchain, .. } => assert_eq!(swapchain, swapchain_b),
            LayerKind::Projection { .. } => panic!("expected the quad from batch B"),
        }
    }

    #[test]
    fn not_yet_due_batches_stay_scheduled() {
        let client = ClientCompositor::new();
        let now = HostTime(100_000_000);
        let swapchain = client.register_swapchain(SwapchainHandle(1));

        let display_time = HostTime(500_000_000);
        let frame = begun_frame(&client, now);
        client.begin_layers(frame, BlendMode::Opaque);
        client.append_layer(quad_entry(swapchain)).unwrap();
        client.commit_layers(frame, display_time, now);

        // A full period early: not due, nothing delivered.
        assert!(!client.deliver_if_due(display_time - PERIOD));
        assert!(!client.delivered_batch().active);

        // Within the half-millisecond window: due.
        assert!(client.deliver_if_due(display_time - Duration(400_000)));
        assert!(client.delivered_batch().active);

        // The scheduled slot is empty again.
        assert!(!client.deliver_if_due(display_time + PERIOD));
    }

    #[test]
    fn layer_limit_is_enforced() {
        let client = ClientCompositor::new();
        let swapchain = client.register_swapchain(SwapchainHandle(1));
        client.begin_layers(FrameId(1), BlendMode::Opaque);
        for _ in 0..MAX_LAYERS {
            client.append_layer(quad_entry(swapchain)).unwrap();
        }
        assert_eq!(
            client.append_layer(quad_entry(swapchain)).unwrap_err(),
            CompositorError::LayerLimit
        );
    }

    #[test]
    fn swapchain_slots_are_reused_after_destroy() {
        let client = ClientCompositor::new();
        let a = client.register_swapchain(SwapchainHandle(1));
        let b = client.register_swapchain(SwapchainHandle(2));
        assert_ne!(a, b);

        client.destroy_swapchain(a);
        assert_eq!(client.resolve_swapchain(a), None);
        assert_eq!(client.resolve_swapchain(b), Some(SwapchainHandle(2)));

        let c = client.register_swapchain(SwapchainHandle(3));
        assert_eq!(c, a, "freed slot should be reused");
        assert_eq!(client.resolve_swapchain(c), Some(SwapchainHandle(3)));
    }

    #[test]
    fn focus_events_fire_only_on_change() {
        let client = ClientCompositor::new();

        client.apply_focus_state(true, true, false);
        assert_eq!(
            client.poll_event(),
            Some(SessionEvent::StateChange {
                visible: true,
                focused: true,
            })
        );

        // Same verdict again: no event.
        client.apply_focus_state(true, true, false);
        assert_eq!(client.poll_event(), None);

        client.apply_focus_state(false, false, false);
        assert_eq!(
            client.poll_event(),
            Some(SessionEvent::StateChange {
                visible: false,
                focused: false,
            })
        );
    }

    #[test]
    fn overlays_hear_about_primary_switches() {
        let client = ClientCompositor::new();
        client.set_overlay(true, 10);

        // Overlay becomes visible when a primary appears.
        client.apply_focus_state(true, false, false);
        assert_eq!(
            client.poll_event(),
            Some(SessionEvent::StateChange {
                visible: true,
                focused: false,
            })
        );

        // Primary switched identity: visibility unchanged, one overlay event.
        client.apply_focus_state(true, false, true);
        assert_eq!(
            client.poll_event(),
            Some(SessionEvent::OverlayChange { visible: true })
        );
        assert_eq!(client.poll_event(), None);
    }

    #[test]
    fn teardown_clears_everything() {
        let client = ClientCompositor::new();
        let now = HostTime(100_000_000);
        let swapchain = client.register_swapchain(SwapchainHandle(1));

        let frame = begun_frame(&client, now);
        client.begin_layers(frame, BlendMode::Opaque);
        client.append_layer(quad_entry(swapchain)).unwrap();
        client.commit_layers(frame, now, now);
        client.apply_focus_state(true, true, false);

        client.teardown();

        assert!(!client.deliver_if_due(HostTime(u64::MAX)));
        assert!(client.poll_event().is_none());
        assert_eq!(client.resolve_swapchain(swapchain), None);
    }
}
