// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display-side frame pacing.
//!
//! A *pacer* owns the timing of one display: it predicts when each new frame
//! should be woken, built, and presented, and — if present feedback is
//! available — adapts the time budget it hands the frame producer.
//!
//! Two implementations share the [`FramePacer`] trait:
//!
//! - [`DisplayPacer`] — the real thing. Keeps a ring of per-frame records,
//!   walks presentation history to predict the next reachable present time,
//!   and runs an additive-increase/additive-decrease feedback loop on the
//!   app-time budget (back off hard on a missed frame, tighten gently
//!   otherwise).
//! - [`NaivePacer`] — the fallback when the presentation engine reports no
//!   present times. Predicts with a fixed fraction of the period and never
//!   adapts.
//!
//! # Calling protocol
//!
//! For every predicted frame id, exactly one of each in order:
//! [`predict`](FramePacer::predict) →
//! [`mark_point(WakeUp)`](FramePacer::mark_point) → `mark_point(Begin)` →
//! `mark_point(Submit)` → [`info`](FramePacer::info). Breaking the order
//! panics — it means the surrounding runtime is broken, and continuing would
//! corrupt the timing data everything downstream trusts.
//!
//! A pacer serves one display and is not internally synchronized; the owner
//! serializes access.

mod display;
mod naive;

pub use display::DisplayPacer;
pub use naive::NaivePacer;

use crate::time::{Duration, HostTime};
use crate::timing::{
    FrameId, FramePrediction, FrameReport, PacingError, PresentTiming, TimingPoint,
};

/// Number of frame records a [`DisplayPacer`] keeps.
///
/// Must exceed the deepest plausible in-flight backlog: a reused slot that
/// still holds an in-flight frame is a [`PacingError::RingSlotOccupied`].
pub const FRAME_RING_SIZE: usize = 16;

/// Tunables for a [`DisplayPacer`].
///
/// The adjustment sizes are deliberately asymmetric — a miss backs the budget
/// off by more than a clean frame tightens it — trading a little throughput
/// for missed-frame avoidance. The exact fractions are operating points, not
/// invariants; change them freely per display.
#[derive(Clone, Copy, Debug)]
pub struct PacerConfig {
    /// Nominal time between presentable frames.
    pub frame_period: Duration,
    /// Offset from scanout start to photons. Present feedback reports when
    /// the display engine starts scanning out, not when the user sees light.
    pub present_offset: Duration,
    /// Target slack between end of GPU work and the present.
    pub margin: Duration,
    /// App-time budget to start from.
    pub initial_app_time: Duration,
    /// Hard ceiling on the app-time budget.
    pub app_time_max: Duration,
    /// Budget increase applied after a missed frame.
    pub adjust_missed: Duration,
    /// Budget step (and dead-band half-width) for non-missed frames.
    pub adjust_non_miss: Duration,
}

impl PacerConfig {
    /// Default operating point for a display with the given period.
    #[must_use]
    pub const fn for_period(frame_period: Duration) -> Self {
        Self {
            frame_period,
            present_offset: Duration(4 * Duration::MS.0),
            margin: Duration::MS,
            initial_app_time: frame_period.percent(10),
            app_time_max: frame_period.percent(30),
            adjust_missed: frame_period.percent(4),
            adjust_non_miss: frame_period.percent(2),
        }
    }
}

/// Predicts frame timing for one display and consumes present feedback.
pub trait FramePacer {
    /// Predicts the next frame.
    ///
    /// Returns the new frame's id together with its wake-up, present, and
    /// display times. `now` must come from the monotonic clock.
    fn predict(&mut self, now: HostTime) -> Result<FramePrediction, PacingError>;

    /// Records that `frame_id` reached `point` at `when`.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not in the state the point requires.
    fn mark_point(&mut self, point: TimingPoint, frame_id: FrameId, when: HostTime);

    /// Feeds back the observed present timing for a submitted frame.
    ///
    /// Returns the completed [`FrameReport`] when the pacer tracks records;
    /// the naive pacer returns `None`.
    ///
    /// # Panics
    ///
    /// Panics if the frame was never submitted.
    fn info(
        &mut self,
        frame_id: FrameId,
        timing: PresentTiming,
        now: HostTime,
    ) -> Option<FrameReport>;
}
