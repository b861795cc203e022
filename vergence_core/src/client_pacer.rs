// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-client frame pacing.
//!
//! [`ClientPacer`] is the cheap, non-adaptive sibling of the display pacer.
//! The compositor loop broadcasts one [`TimingSample`] per real display frame
//! to every connected client's pacer; each pacer then answers that client's
//! `wait_frame` calls independently, on the client's own cadence — a client
//! may be one or more display periods behind the display without affecting
//! anyone else.
//!
//! Predicted display times are guaranteed monotonic: a client polling faster
//! than the display cadence gets successive whole periods, never the same
//! time twice and never a regression.
//!
//! # Calling protocol
//!
//! Per frame id, in order: [`predict`](ClientPacer::predict) →
//! [`mark_wait_woke`](ClientPacer::mark_wait_woke) →
//! [`mark_begin`](ClientPacer::mark_begin) → either
//! [`mark_delivered`](ClientPacer::mark_delivered) or
//! [`mark_discarded`](ClientPacer::mark_discarded) (discard is also legal
//! straight after wake). Breaking the order panics.

use crate::time::{Duration, HostTime};
use crate::timing::{ClientPrediction, FrameId, PacingError, TimingSample};

/// Number of in-flight frame slots per client.
const CLIENT_FRAME_SLOTS: usize = 2;

/// Where a client frame slot is in its life.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ClientFrameState {
    Ready,
    Predicted,
    WaitLeft,
    Begun,
}

/// One client frame slot.
#[derive(Clone, Copy, Debug)]
struct ClientFrame {
    state: ClientFrameState,
    /// `None` marks an unused slot.
    frame_id: Option<FrameId>,
    when_predicted: HostTime,
    when_wait_woke: HostTime,
    when_begin: HostTime,
    when_end_frame: HostTime,
}

impl Default for ClientFrame {
    fn default() -> Self {
        Self {
            state: ClientFrameState::Ready,
            frame_id: None,
            when_predicted: HostTime(0),
            when_wait_woke: HostTime(0),
            when_begin: HostTime(0),
            when_end_frame: HostTime(0),
        }
    }
}

/// Derives per-client frame predictions from broadcast timing samples.
///
/// Not internally synchronized; the owning session serializes access.
#[derive(Debug, Default)]
pub struct ClientPacer {
    frames: [ClientFrame; CLIENT_FRAME_SLOTS],
    frame_counter: i64,
    /// The display time of the most recent broadcast sample.
    last_input: HostTime,
    /// Compositor overhead carried by the most recent sample.
    extra: Duration,
    /// Display period carried by the most recent sample. Zero until the
    /// first sample arrives.
    period: Duration,
    /// The display time handed out last; predictions never regress below it.
    last_returned: HostTime,
}

impl ClientPacer {
    /// Creates a pacer with no timing sample yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resets every frame slot to unused.
    ///
    /// The broadcast sample fields are kept; only the client's in-flight
    /// bookkeeping is dropped (used when a session restarts its frame loop).
    pub fn clear(&mut self) {
        self.frames = [ClientFrame::default(); CLIENT_FRAME_SLOTS];
    }

    /// Installs a fresh timing sample.
    ///
    /// Called by the compositor loop, once per real display frame, for every
    /// connected client.
    pub fn new_sample(&mut self, sample: TimingSample) {
        self.last_input = sample.predicted_display_time;
        self.extra = sample.extra;
        self.period = sample.period;
    }

    /// The compositor overhead from the most recent sample.
    #[must_use]
    pub fn extra(&self) -> Duration {
        self.extra
    }

    /// Predicts the client's next frame.
    ///
    /// The returned display time is the smallest `sample + k * period`
    /// strictly after both `now` and every previously returned time, so
    /// results are strictly monotonic however fast the client polls.
    pub fn predict(&mut self, now: HostTime) -> Result<ClientPrediction, PacingError> {
        if self.period == Duration::ZERO {
            return Err(PacingError::NoTimingSample);
        }

        let frame_id = FrameId(self.frame_counter + 1);
        let slot = &self.frames[Self::index_of(frame_id)];
        if let Some(occupant) = slot.frame_id {
            return Err(PacingError::RingSlotOccupied { frame_id, occupant });
        }
        self.frame_counter += 1;

        // Don't return a time before the last returned one.
        let at_least = now.max(self.last_returned);
        let mut predicted = self.last_input;
        while predicted <= at_least {
            predicted = predicted + self.period;
        }
        self.last_returned = predicted;

        let slot = &mut self.frames[Self::index_of(frame_id)];
        slot.state = ClientFrameState::Predicted;
        slot.frame_id = Some(frame_id);
        slot.when_predicted = now;

        Ok(ClientPrediction {
            frame_id,
            predicted_display_time: predicted,
            wake_up_time: predicted - self.period,
            predicted_display_period: self.period,
            min_display_period: self.period,
        })
    }

    /// Records that the client left its frame wait.
    ///
    /// # Panics
    ///
    /// Panics unless the frame is in the predicted state.
    pub fn mark_wait_woke(&mut self, frame_id: FrameId, now: HostTime) {
        let slot = self.slot_mut(frame_id);
        assert_eq!(
            slot.state,
            ClientFrameState::Predicted,
            "wait-woke marked on frame not in predicted state"
        );
        slot.when_wait_woke = now;
        slot.state = ClientFrameState::WaitLeft;
    }

    /// Records that the client began building the frame.
    ///
    /// # Panics
    ///
    /// Panics unless the frame has left its wait.
    pub fn mark_begin(&mut self, frame_id: FrameId, now: HostTime) {
        let slot = self.slot_mut(frame_id);
        assert_eq!(
            slot.state,
            ClientFrameState::WaitLeft,
            "begin marked on frame not in wait-left state"
        );
        slot.when_begin = now;
        slot.state = ClientFrameState::Begun;
    }

    /// Releases a frame the client abandoned without submitting layers.
    ///
    /// # Panics
    ///
    /// Panics unless the frame has at least left its wait.
    pub fn mark_discarded(&mut self, frame_id: FrameId, now: HostTime) {
        let slot = self.slot_mut(frame_id);
        assert!(
            matches!(
                slot.state,
                ClientFrameState::WaitLeft | ClientFrameState::Begun
            ),
            "discard marked on frame that never left its wait"
        );
        slot.when_end_frame = now;
        slot.state = ClientFrameState::Ready;
        slot.frame_id = None;
    }

    /// Releases a frame whose layers were committed.
    ///
    /// # Panics
    ///
    /// Panics unless the frame was begun.
    pub fn mark_delivered(&mut self, frame_id: FrameId, now: HostTime) {
        let slot = self.slot_mut(frame_id);
        assert_eq!(
            slot.state,
            ClientFrameState::Begun,
            "delivery marked on frame not in begun state"
        );
        slot.when_end_frame = now;
        slot.state = ClientFrameState::Ready;
        slot.frame_id = None;
    }

    fn index_of(frame_id: FrameId) -> usize {
        frame_id.0 as usize % CLIENT_FRAME_SLOTS
    }

    fn slot_mut(&mut self, frame_id: FrameId) -> &mut ClientFrame {
        let slot = &mut self.frames[Self::index_of(frame_id)];
        assert_eq!(slot.frame_id, Some(frame_id), "mark on unknown client frame");
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration(16_666_667);

    fn sampled_pacer() -> ClientPacer {
        let mut p = ClientPacer::new();
        p.new_sample(TimingSample {
            predicted_display_time: HostTime(100_000_000),
            extra: Duration::from_millis(2),
            period: PERIOD,
        });
        p
    }

    #[test]
    fn predict_before_first_sample_is_an_error() {
        let mut p = ClientPacer::new();
        assert_eq!(
            p.predict(HostTime(1_000_000)).unwrap_err(),
            PacingError::NoTimingSample
        );
    }

    #[test]
    fn fast_polling_yields_strictly_increasing_display_times() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);

        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);
        p.mark_begin(a.frame_id, now);
        p.mark_delivered(a.frame_id, now);

        // Same `now`: the next prediction must still advance a whole period.
        let b = p.predict(now).unwrap();
        assert_eq!(b.predicted_display_time - a.predicted_display_time, PERIOD);
        assert_eq!(b.wake_up_time, b.predicted_display_time - PERIOD);
        assert_eq!(b.frame_id, FrameId(2));
    }

    #[test]
    fn predictions_step_from_the_broadcast_sample() {
        let mut p = sampled_pacer();
        // `now` well past the sample: first multiple strictly after now.
        let now = HostTime(150_000_000);
        let prediction = p.predict(now).unwrap();
        let offset = prediction.predicted_display_time - HostTime(100_000_000);
        assert_eq!(offset.nanos() % PERIOD.0, 0, "not aligned to the sample");
        assert!(prediction.predicted_display_time > now);
        assert!(
            prediction.predicted_display_time - now <= PERIOD,
            "overshot by more than one period"
        );
    }

    #[test]
    fn both_slots_in_flight_is_a_typed_error() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);

        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);
        let b = p.predict(now).unwrap();
        p.mark_wait_woke(b.frame_id, now);

        // Two frames in flight fill both slots.
        let err = p.predict(now).unwrap_err();
        assert_eq!(
            err,
            PacingError::RingSlotOccupied {
                frame_id: FrameId(3),
                occupant: a.frame_id,
            }
        );

        // Discarding the older frame frees its slot for reuse.
        p.mark_discarded(a.frame_id, now);
        let c = p.predict(now).unwrap();
        assert_eq!(c.frame_id, FrameId(3));
    }

    #[test]
    fn discard_is_legal_after_wake_or_begin() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);

        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);
        p.mark_discarded(a.frame_id, now);

        let b = p.predict(now).unwrap();
        p.mark_wait_woke(b.frame_id, now);
        p.mark_begin(b.frame_id, now);
        p.mark_discarded(b.frame_id, now);
    }

    #[test]
    fn clear_resets_slots_but_keeps_the_sample() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);
        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);

        p.clear();

        // The in-flight frame is gone, but the sample still drives timing.
        let b = p.predict(now).unwrap();
        assert!(b.predicted_display_time > a.predicted_display_time);
    }

    #[test]
    #[should_panic(expected = "delivery marked on frame not in begun state")]
    fn deliver_without_begin_panics() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);
        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);
        p.mark_delivered(a.frame_id, now);
    }

    #[test]
    #[should_panic(expected = "begin marked on frame not in wait-left state")]
    fn begin_without_wake_panics() {
        let mut p = sampled_pacer();
        let a = p.predict(HostTime(100_000_000)).unwrap();
        p.mark_begin(a.frame_id, HostTime(100_000_000));
    }

    #[test]
    #[should_panic(expected = "mark on unknown client frame")]
    fn mark_on_released_frame_panics() {
        let mut p = sampled_pacer();
        let now = HostTime(100_000_000);
        let a = p.predict(now).unwrap();
        p.mark_wait_woke(a.frame_id, now);
        p.mark_begin(a.frame_id, now);
        p.mark_delivered(a.frame_id, now);
        p.mark_delivered(a.frame_id, now);
    }
}
