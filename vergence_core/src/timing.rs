// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared timing vocabulary.
//!
//! This module defines the types that flow between the pacers, the client
//! sessions, and the compositor loop:
//!
//! - [`FramePrediction`] — one display-pacer prediction: when to wake the
//!   frame producer and when the frame should hit the screen
//! - [`ClientPrediction`] — the per-client equivalent, derived from a
//!   broadcast [`TimingSample`]
//! - [`TimingSample`] — the loop's once-per-display-frame broadcast to every
//!   client's pacing helper
//! - [`PresentTiming`] — post-present observations fed back to the display
//!   pacer
//! - [`FrameReport`] — the completed record of one frame's life, returned by
//!   the feedback call for diagnostics and metrics
//! - [`PacingError`] — the recoverable failures a pacer can report
//!
//! Protocol *misuse* — marking timing points out of order, feeding back a
//! frame that was never submitted — is not an error value anywhere in this
//! crate; it panics. See the taxonomy notes on [`PacingError`].

use core::fmt;

use crate::time::{Duration, HostTime};

/// Identifies one predicted frame.
///
/// Frame ids increase monotonically per pacer and index that pacer's record
/// ring modulo the ring size.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FrameId(pub i64);

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

/// A point in a frame's life reported to [`FramePacer::mark_point`].
///
/// The points must be reported strictly in this order, exactly once each.
///
/// [`FramePacer::mark_point`]: crate::pacer::FramePacer::mark_point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimingPoint {
    /// The frame producer woke up (left its wait).
    WakeUp,
    /// The frame producer began building the frame.
    Begin,
    /// The frame was submitted to the presentation engine.
    Submit,
}

/// One display-pacer prediction.
///
/// Produced by [`FramePacer::predict`](crate::pacer::FramePacer::predict).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FramePrediction {
    /// Identity of the predicted frame.
    pub frame_id: FrameId,
    /// When the frame producer should be woken.
    pub wake_up_time: HostTime,
    /// The present time the frame should ask the display engine for.
    pub desired_present_time: HostTime,
    /// Tolerance granted on the present time before a frame counts as missed.
    pub present_slop: Duration,
    /// When the frame's pixels are expected to become photons.
    pub predicted_display_time: HostTime,
    /// The display period this prediction assumed.
    pub predicted_display_period: Duration,
    /// The shortest period the display can run at.
    pub min_display_period: Duration,
    /// Whole display periods the prediction stepped past because there was no
    /// longer time to hit them. Non-zero values mean frames are being skipped;
    /// callers should log each occurrence.
    pub periods_skipped: u32,
}

/// One client-pacer prediction, derived from the latest [`TimingSample`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClientPrediction {
    /// Identity of the predicted frame.
    pub frame_id: FrameId,
    /// When the client's pixels are expected to be displayed.
    pub predicted_display_time: HostTime,
    /// When the client should be woken to start rendering.
    pub wake_up_time: HostTime,
    /// The display period this prediction assumed.
    pub predicted_display_period: Duration,
    /// The shortest period the display can run at.
    pub min_display_period: Duration,
}

/// The timing sample the compositor loop broadcasts to every client's
/// [`ClientPacer`](crate::client_pacer::ClientPacer) once per display frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TimingSample {
    /// The display time the real compositor predicted for its current frame.
    pub predicted_display_time: HostTime,
    /// How far in the future that display time was when the sample was taken.
    pub extra: Duration,
    /// The display period the hardware is running at.
    pub period: Duration,
}

/// Present-time observations for one submitted frame.
///
/// Fed back to [`FramePacer::info`](crate::pacer::FramePacer::info) by
/// whoever hears from the display engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PresentTiming {
    /// The present time the frame asked for.
    pub desired_present_time: HostTime,
    /// When the display engine actually presented it.
    pub actual_present_time: HostTime,
    /// The earliest time the display engine could have presented it.
    pub earliest_present_time: HostTime,
    /// Slack between the end of GPU work and the present.
    pub present_margin: Duration,
}

/// The completed record of one frame's life.
///
/// Returned by the adaptive pacer's feedback call, consumed by the timeline
/// tooling and the pacing metrics harness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Identity of the frame.
    pub frame_id: FrameId,
    /// When the prediction was made.
    pub when_predict: HostTime,
    /// When the producer was scheduled to wake.
    pub wake_up_time: HostTime,
    /// When the producer actually woke.
    pub when_woke: HostTime,
    /// When frame building began.
    pub when_began: HostTime,
    /// When the frame was submitted.
    pub when_submitted: HostTime,
    /// When present feedback arrived.
    pub when_infoed: HostTime,
    /// The present time the frame asked for.
    pub desired_present_time: HostTime,
    /// The display time that was predicted for it.
    pub predicted_display_time: HostTime,
    /// When it was actually presented.
    pub actual_present_time: HostTime,
    /// The earliest time it could have been presented.
    pub earliest_present_time: HostTime,
    /// Slack between end of GPU work and the present.
    pub present_margin: Duration,
    /// The app-time budget that was in force when the frame was predicted.
    pub current_app_time: Duration,
    /// Whether the frame presented later than asked, beyond the slop window.
    pub missed: bool,
}

/// Recoverable pacing failures.
///
/// These are conditions the *runtime* can produce — a backlog deep enough to
/// wrap the record ring, or a client predicting before the first broadcast
/// sample has arrived. Calling-protocol violations are bugs in the caller and
/// panic instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingError {
    /// The ring slot for a new frame id still holds an in-flight frame.
    ///
    /// The record ring must be deeper than the maximum in-flight frame count;
    /// hitting this means the caller predicted far ahead of feedback. The
    /// caller chooses the policy (abort, or drop and retry later) — behavior
    /// is identical in debug and release builds.
    RingSlotOccupied {
        /// The frame id that could not be created.
        frame_id: FrameId,
        /// The in-flight frame occupying the slot.
        occupant: FrameId,
    },
    /// A client predicted before any timing sample was broadcast, so there is
    /// no display period to walk forward by.
    NoTimingSample,
}

impl fmt::Display for PacingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RingSlotOccupied { frame_id, occupant } => write!(
                f,
                "frame record ring slot for {frame_id:?} still occupied by in-flight {occupant:?}"
            ),
            Self::NoTimingSample => {
                write!(f, "no timing sample received yet, display period unknown")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pacing_error_display_names_the_frames() {
        let err = PacingError::RingSlotOccupied {
            frame_id: FrameId(17),
            occupant: FrameId(1),
        };
        let mut buf = alloc::string::String::new();
        core::fmt::write(&mut buf, format_args!("{err}")).unwrap();
        assert!(buf.contains("FrameId(17)"), "got: {buf}");
        assert!(buf.contains("FrameId(1)"), "got: {buf}");
    }
}
