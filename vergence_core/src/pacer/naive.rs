// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The non-adaptive fallback pacer.

use crate::pacer::FramePacer;
use crate::time::{Duration, HostTime};
use crate::timing::{
    FrameId, FramePrediction, FrameReport, PacingError, PresentTiming, TimingPoint,
};

/// A pacer for displays that report no present timing.
///
/// Every prediction is the cold-start wild guess: the next whole period after
/// `now` that leaves room for a fixed 20%-of-period app budget. There is no
/// record ring and no adaptation; [`mark_point`](FramePacer::mark_point) and
/// [`info`](FramePacer::info) only uphold the call contract.
#[derive(Debug)]
pub struct NaivePacer {
    frame_period: Duration,
    present_offset: Duration,
    app_time: Duration,
    /// The display time handed out last; the next one is strictly later even
    /// if the clock has not advanced.
    last_display_time: HostTime,
    next_frame_id: i64,
}

impl NaivePacer {
    /// Creates a pacer for the given display period.
    ///
    /// `now` seeds the first prediction; the first display time lands a
    /// comfortable 50ms out.
    #[must_use]
    pub fn new(frame_period: Duration, now: HostTime) -> Self {
        Self {
            frame_period,
            present_offset: Duration(4 * Duration::MS.0),
            app_time: frame_period.percent(20),
            last_display_time: now + Duration::from_millis(50),
            // Start above zero so a default-initialized id can't be mistaken
            // for a real frame.
            next_frame_id: 5,
        }
    }

    /// The fixed app-time budget.
    #[must_use]
    pub fn app_time(&self) -> Duration {
        self.app_time
    }
}

impl FramePacer for NaivePacer {
    fn predict(&mut self, now: HostTime) -> Result<FramePrediction, PacingError> {
        let frame_id = FrameId(self.next_frame_id);
        self.next_frame_id += 1;

        let time_needed = self.present_offset.saturating_add(self.app_time);
        let mut predicted_display_time = self.last_display_time + self.frame_period;
        while now + time_needed > predicted_display_time {
            predicted_display_time = predicted_display_time + self.frame_period;
        }
        self.last_display_time = predicted_display_time;

        let desired_present_time = predicted_display_time - self.present_offset;
        let wake_up_time = desired_present_time - self.app_time;

        Ok(FramePrediction {
            frame_id,
            wake_up_time,
            desired_present_time,
            present_slop: Duration::HALF_MS,
            predicted_display_time,
            predicted_display_period: self.frame_period,
            min_display_period: self.frame_period,
            periods_skipped: 0,
        })
    }

    fn mark_point(&mut self, point: TimingPoint, _frame_id: FrameId, _when: HostTime) {
        // No records to update; the match still validates the token for
        // callers that construct points from raw protocol data.
        match point {
            TimingPoint::WakeUp | TimingPoint::Begin | TimingPoint::Submit => {}
        }
    }

    fn info(
        &mut self,
        _frame_id: FrameId,
        _timing: PresentTiming,
        _now: HostTime,
    ) -> Option<FrameReport> {
        // The compositor may feed real feedback even though it selected the
        // naive pacer; there is nothing to adapt.
        None
    }
}
