// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The adaptive display pacer.

use crate::pacer::{FRAME_RING_SIZE, FramePacer, PacerConfig};
use crate::time::{Duration, HostTime};
use crate::timing::{
    FrameId, FramePrediction, FrameReport, PacingError, PresentTiming, TimingPoint,
};

/// Where a frame record is in its life.
///
/// Strictly advances left to right; `Skipped` and `Cleared` are the discard
/// states a record can be reset to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(i8)]
enum FrameState {
    Skipped = -1,
    Cleared = 0,
    Predicted = 1,
    Woke = 2,
    Began = 3,
    Submitted = 4,
    Infoed = 5,
}

impl FrameState {
    /// In-flight frames occupy their ring slot; completed or cleared frames
    /// may be overwritten.
    const fn is_in_flight(self) -> bool {
        matches!(
            self,
            Self::Predicted | Self::Woke | Self::Began | Self::Submitted
        )
    }
}

/// One frame's timing record.
#[derive(Clone, Copy, Debug)]
struct FrameRecord {
    frame_id: FrameId,
    state: FrameState,
    when_predict: HostTime,
    wake_up_time: HostTime,
    desired_present_time: HostTime,
    predicted_display_time: HostTime,
    when_woke: HostTime,
    when_began: HostTime,
    when_submitted: HostTime,
    when_infoed: HostTime,
    actual_present_time: HostTime,
    earliest_present_time: HostTime,
    present_margin: Duration,
    current_app_time: Duration,
}

impl Default for FrameRecord {
    fn default() -> Self {
        Self {
            frame_id: FrameId(-1),
            state: FrameState::Cleared,
            when_predict: HostTime(0),
            wake_up_time: HostTime(0),
            desired_present_time: HostTime(0),
            predicted_display_time: HostTime(0),
            when_woke: HostTime(0),
            when_began: HostTime(0),
            when_submitted: HostTime(0),
            when_infoed: HostTime(0),
            actual_present_time: HostTime(0),
            earliest_present_time: HostTime(0),
            present_margin: Duration::ZERO,
            current_app_time: Duration::ZERO,
        }
    }
}

/// The adaptive per-display frame pacer.
///
/// Predicts wake-up and present times for each frame from presentation
/// history, and adapts the app-time budget from present feedback: a missed
/// frame grows the budget by [`PacerConfig::adjust_missed`] (clamped to
/// [`PacerConfig::app_time_max`]); a clean frame nudges the budget by
/// [`PacerConfig::adjust_non_miss`] toward the point where GPU work ends
/// [`PacerConfig::margin`] before the present.
///
/// One pacer serves one display. Not internally synchronized.
#[derive(Debug)]
pub struct DisplayPacer {
    config: PacerConfig,
    /// Current app-time budget, adapted within `[0, config.app_time_max]`.
    app_time: Duration,
    next_frame_id: i64,
    /// Latest `now` seen by `predict`; later calls are clamped to it.
    last_now: HostTime,
    clock_regressions: u64,
    frames: [FrameRecord; FRAME_RING_SIZE],
}

impl DisplayPacer {
    /// Creates a pacer with the given tunables.
    #[must_use]
    pub fn new(config: PacerConfig) -> Self {
        Self {
            app_time: config.initial_app_time,
            config,
            next_frame_id: 0,
            last_now: HostTime(0),
            clock_regressions: 0,
            frames: [FrameRecord::default(); FRAME_RING_SIZE],
        }
    }

    /// Creates a pacer with default tunables for the given display period.
    #[must_use]
    pub fn for_period(frame_period: Duration) -> Self {
        Self::new(PacerConfig::for_period(frame_period))
    }

    /// The current app-time budget.
    #[must_use]
    pub fn app_time(&self) -> Duration {
        self.app_time
    }

    /// How many `predict` calls saw the clock run backwards and were clamped.
    #[must_use]
    pub fn clock_regressions(&self) -> u64 {
        self.clock_regressions
    }

    /// The tunables this pacer was created with.
    #[must_use]
    pub fn config(&self) -> &PacerConfig {
        &self.config
    }

    /// App budget plus the safety margin: the full interval between wake-up
    /// and the desired present.
    fn total_app_time(&self) -> Duration {
        self.app_time.saturating_add(self.config.margin)
    }

    /// Abandons an in-flight frame, freeing its ring slot without feedback.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not in flight.
    pub fn discard(&mut self, frame_id: FrameId) {
        let record = self.record_mut(frame_id);
        assert_eq!(record.frame_id, frame_id, "discard of unknown frame");
        assert!(
            record.state.is_in_flight(),
            "discard of a frame not in flight"
        );
        record.state = FrameState::Skipped;
    }

    fn index_of(frame_id: FrameId) -> usize {
        debug_assert!(frame_id.0 >= 0, "frame ids are never negative");
        frame_id.0 as usize % FRAME_RING_SIZE
    }

    fn record(&self, frame_id: FrameId) -> &FrameRecord {
        &self.frames[Self::index_of(frame_id)]
    }

    fn record_mut(&mut self, frame_id: FrameId) -> &mut FrameRecord {
        &mut self.frames[Self::index_of(frame_id)]
    }

    /// The newest frame whose state is at least `state`, scanning back over
    /// the live span of the ring.
    fn latest_with_state_at_least(&self, state: FrameState) -> Option<&FrameRecord> {
        for offset in 1..FRAME_RING_SIZE as i64 {
            let id = self.next_frame_id - offset;
            if id < 0 {
                break;
            }
            let record = self.record(FrameId(id));
            if record.state >= state {
                return Some(record);
            }
        }
        None
    }

    /// Steps forward from `last_present_time` in whole periods until the
    /// candidate present leaves enough room for a full app budget from `now`.
    /// Returns the candidate and how many periods were stepped past.
    fn walk_forward(&self, last_present_time: HostTime, now: HostTime) -> (HostTime, u32) {
        let from_time = now + self.total_app_time();
        let mut desired = last_present_time + self.config.frame_period;
        let mut skipped = 0u32;

        while desired <= from_time {
            desired = desired + self.config.frame_period;
            skipped += 1;
        }

        (desired, skipped)
    }

    fn adjust_app_time(&mut self, missed: bool, present_margin: Duration) {
        if missed {
            // Back off hard and stop; margin data from a missed frame says
            // nothing about the steady state.
            self.app_time = self
                .app_time
                .saturating_add(self.config.adjust_missed)
                .min(self.config.app_time_max);
            return;
        }

        // GPU work should stop margin_ns before the present.
        if within(present_margin, self.config.margin, self.config.adjust_non_miss) {
            return;
        }

        if present_margin > self.config.margin {
            // Finished too early: hand the app the spare time.
            self.app_time = self.app_time.saturating_sub(self.config.adjust_non_miss);
        } else {
            // Finished too close to the deadline: back off.
            self.app_time = self
                .app_time
                .saturating_add(self.config.adjust_non_miss)
                .min(self.config.app_time_max);
        }
    }
}

impl FramePacer for DisplayPacer {
    fn predict(&mut self, now: HostTime) -> Result<FramePrediction, PacingError> {
        // Clamp a regressing clock instead of predicting into the past.
        let now = if now < self.last_now {
            self.clock_regressions += 1;
            self.last_now
        } else {
            self.last_now = now;
            now
        };

        let last_predicted = self.latest_with_state_at_least(FrameState::Predicted);
        let last_completed = self.latest_with_state_at_least(FrameState::Infoed);

        let (desired_present_time, periods_skipped) = match (last_predicted, last_completed) {
            (None, None) => {
                // Cold start: wild shot in the dark.
                (now + Duration(self.config.frame_period.0 * 10), 0)
            }
            (Some(predicted), Some(completed)) if predicted.frame_id == completed.frame_id => {
                // Nothing predicted since the last completed frame: the
                // pipeline ran dry, very probably a missed frame.
                self.walk_forward(completed.earliest_present_time, now)
            }
            (Some(predicted), Some(completed)) => {
                let diff_id = predicted.frame_id.0 - completed.frame_id.0;
                let adjusted_last_present_time = completed.earliest_present_time
                    + Duration(diff_id as u64 * self.config.frame_period.0);
                self.walk_forward(adjusted_last_present_time, now)
            }
            (Some(predicted), None) => self.walk_forward(predicted.predicted_display_time, now),
            (None, Some(completed)) => self.walk_forward(completed.earliest_present_time, now),
        };

        let frame_id = FrameId(self.next_frame_id);
        let occupant = self.record(frame_id);
        if occupant.state.is_in_flight() {
            return Err(PacingError::RingSlotOccupied {
                frame_id,
                occupant: occupant.frame_id,
            });
        }
        self.next_frame_id += 1;

        let predicted_display_time = desired_present_time + self.config.present_offset;
        let wake_up_time = desired_present_time - self.total_app_time();
        let current_app_time = self.app_time;

        *self.record_mut(frame_id) = FrameRecord {
            frame_id,
            state: FrameState::Predicted,
            when_predict: now,
            wake_up_time,
            desired_present_time,
            predicted_display_time,
            current_app_time,
            ..FrameRecord::default()
        };

        Ok(FramePrediction {
            frame_id,
            wake_up_time,
            desired_present_time,
            present_slop: Duration::HALF_MS,
            predicted_display_time,
            predicted_display_period: self.config.frame_period,
            min_display_period: self.config.frame_period,
            periods_skipped,
        })
    }

    fn mark_point(&mut self, point: TimingPoint, frame_id: FrameId, when: HostTime) {
        let record = self.record_mut(frame_id);
        assert_eq!(record.frame_id, frame_id, "mark_point on unknown frame");

        match point {
            TimingPoint::WakeUp => {
                assert_eq!(
                    record.state,
                    FrameState::Predicted,
                    "wake-up marked on frame not in predicted state"
                );
                record.state = FrameState::Woke;
                record.when_woke = when;
            }
            TimingPoint::Begin => {
                assert_eq!(
                    record.state,
                    FrameState::Woke,
                    "begin marked on frame not in woke state"
                );
                record.state = FrameState::Began;
                record.when_began = when;
            }
            TimingPoint::Submit => {
                assert_eq!(
                    record.state,
                    FrameState::Began,
                    "submit marked on frame not in began state"
                );
                record.state = FrameState::Submitted;
                record.when_submitted = when;
            }
        }
    }

    fn info(
        &mut self,
        frame_id: FrameId,
        timing: PresentTiming,
        now: HostTime,
    ) -> Option<FrameReport> {
        let record = self.record_mut(frame_id);
        assert_eq!(record.frame_id, frame_id, "info on unknown frame");
        assert_eq!(
            record.state,
            FrameState::Submitted,
            "info on frame not in submitted state"
        );

        record.when_infoed = now;
        record.actual_present_time = timing.actual_present_time;
        record.earliest_present_time = timing.earliest_present_time;
        record.present_margin = timing.present_margin;
        record.state = FrameState::Infoed;

        let missed = timing.actual_present_time > record.desired_present_time
            && !timing
                .actual_present_time
                .is_within_half_ms(record.desired_present_time);

        let report = FrameReport {
            frame_id,
            when_predict: record.when_predict,
            wake_up_time: record.wake_up_time,
            when_woke: record.when_woke,
            when_began: record.when_began,
            when_submitted: record.when_submitted,
            when_infoed: record.when_infoed,
            desired_present_time: record.desired_present_time,
            predicted_display_time: record.predicted_display_time,
            actual_present_time: record.actual_present_time,
            earliest_present_time: record.earliest_present_time,
            present_margin: record.present_margin,
            current_app_time: record.current_app_time,
            missed,
        };

        self.adjust_app_time(missed, timing.present_margin);

        Some(report)
    }
}

/// Symmetric open-interval tolerance test on durations.
fn within(a: Duration, b: Duration, range: Duration) -> bool {
    let diff = a.0 as i64 - b.0 as i64;
    -(range.0 as i64) < diff && diff < range.0 as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration(16_666_667);

    fn pacer() -> DisplayPacer {
        DisplayPacer::for_period(PERIOD)
    }

    /// Drives one frame through its whole life with a clean present.
    fn complete_frame(
        pacer: &mut DisplayPacer,
        now: HostTime,
        margin: Duration,
    ) -> (FramePrediction, FrameReport) {
        let prediction = pacer.predict(now).unwrap();
        pacer.mark_point(TimingPoint::WakeUp, prediction.frame_id, prediction.wake_up_time);
        pacer.mark_point(
            TimingPoint::Begin,
            prediction.frame_id,
            prediction.wake_up_time + Duration(100_000),
        );
        pacer.mark_point(
            TimingPoint::Submit,
            prediction.frame_id,
            prediction.wake_up_time + Duration(1_000_000),
        );
        let report = pacer
            .info(
                prediction.frame_id,
                PresentTiming {
                    desired_present_time: prediction.desired_present_time,
                    actual_present_time: prediction.desired_present_time,
                    earliest_present_time: prediction.desired_present_time,
                    present_margin: margin,
                },
                prediction.desired_present_time + Duration(200_000),
            )
            .unwrap();
        (prediction, report)
    }

    #[test]
    fn cold_start_predicts_ten_periods_out() {
        let mut p = pacer();
        let now = HostTime(1_000_000);
        let prediction = p.predict(now).unwrap();

        assert_eq!(prediction.frame_id, FrameId(0));
        assert_eq!(prediction.desired_present_time, now + Duration(PERIOD.0 * 10));
        assert_eq!(
            prediction.predicted_display_time,
            prediction.desired_present_time + p.config().present_offset
        );
        assert_eq!(
            prediction.wake_up_time,
            prediction.desired_present_time - (p.app_time() + p.config().margin)
        );
        assert_eq!(prediction.present_slop, Duration::HALF_MS);
        assert_eq!(prediction.periods_skipped, 0);
    }

    #[test]
    fn display_times_strictly_increase_across_frames() {
        let mut p = pacer();
        let mut now = HostTime(1_000_000);
        let mut last_display = HostTime(0);

        for _ in 0..32 {
            let (prediction, _) = complete_frame(&mut p, now, Duration::MS);
            assert!(
                prediction.predicted_display_time > last_display,
                "display time regressed: {:?} after {:?}",
                prediction.predicted_display_time,
                last_display
            );
            last_display = prediction.predicted_display_time;
            now = prediction.desired_present_time + Duration(300_000);
        }
    }

    #[test]
    fn pipelined_predictions_stay_monotonic() {
        let mut p = pacer();
        let now = HostTime(1_000_000);

        // Two frames in flight before any feedback.
        let a = p.predict(now).unwrap();
        let b = p.predict(now + Duration(1_000_000)).unwrap();
        assert!(b.predicted_display_time > a.predicted_display_time);

        for prediction in [a, b] {
            p.mark_point(TimingPoint::WakeUp, prediction.frame_id, prediction.wake_up_time);
            p.mark_point(TimingPoint::Begin, prediction.frame_id, prediction.wake_up_time);
            p.mark_point(TimingPoint::Submit, prediction.frame_id, prediction.wake_up_time);
            p.info(
                prediction.frame_id,
                PresentTiming {
                    desired_present_time: prediction.desired_present_time,
                    actual_present_time: prediction.desired_present_time,
                    earliest_present_time: prediction.desired_present_time,
                    present_margin: Duration::MS,
                },
                prediction.desired_present_time,
            );
        }

        let c = p.predict(b.desired_present_time).unwrap();
        assert!(c.predicted_display_time > b.predicted_display_time);
    }

    #[test]
    fn dry_pipeline_walks_whole_periods_from_last_present() {
        let mut p = pacer();
        let (first, _) = complete_frame(&mut p, HostTime(1_000_000), Duration::MS);

        // Ask again long after the completed frame: the candidate walks
        // forward in whole periods and reports every skip.
        let late = first.desired_present_time + Duration(PERIOD.0 * 5);
        let prediction = p.predict(late).unwrap();

        let earliest = first.desired_present_time;
        let gap = prediction.desired_present_time - earliest;
        assert_eq!(gap.nanos() % PERIOD.0, 0, "not period-aligned");
        assert!(prediction.desired_present_time > late + p.app_time());
        assert!(prediction.periods_skipped > 0, "expected skipped periods");
    }

    #[test]
    fn misses_grow_app_time_until_saturation() {
        let mut p = pacer();
        let max = p.config().app_time_max;
        let mut now = HostTime(1_000_000);
        let mut previous = p.app_time();
        let mut saturated = false;

        for _ in 0..12 {
            let prediction = p.predict(now).unwrap();
            p.mark_point(TimingPoint::WakeUp, prediction.frame_id, prediction.wake_up_time);
            p.mark_point(TimingPoint::Begin, prediction.frame_id, prediction.wake_up_time);
            p.mark_point(TimingPoint::Submit, prediction.frame_id, prediction.wake_up_time);
            // Presented a full 2ms late: a miss.
            let actual = prediction.desired_present_time + Duration::from_millis(2);
            let report = p
                .info(
                    prediction.frame_id,
                    PresentTiming {
                        desired_present_time: prediction.desired_present_time,
                        actual_present_time: actual,
                        earliest_present_time: actual,
                        present_margin: Duration::ZERO,
                    },
                    actual,
                )
                .unwrap();
            assert!(report.missed, "2ms late must count as missed");

            if saturated {
                assert_eq!(p.app_time(), max, "budget must stay saturated");
            } else {
                assert!(p.app_time() > previous, "budget must grow after a miss");
            }
            saturated = p.app_time() == max;
            previous = p.app_time();
            now = actual;
        }
        assert!(saturated, "12 misses must saturate the budget");
    }

    #[test]
    fn on_target_margin_leaves_app_time_unchanged() {
        let mut p = pacer();
        let target = p.config().margin;
        let mut now = HostTime(1_000_000);

        for _ in 0..4 {
            let before = p.app_time();
            let (prediction, report) = complete_frame(&mut p, now, target);
            assert!(!report.missed);
            assert_eq!(p.app_time(), before, "on-target margin must not adapt");
            now = prediction.desired_present_time;
        }
    }

    #[test]
    fn oversized_margin_shrinks_app_time() {
        let mut p = pacer();
        let before = p.app_time();
        let fat_margin = p.config().margin + p.config().adjust_non_miss + Duration(100_000);
        complete_frame(&mut p, HostTime(1_000_000), fat_margin);
        assert_eq!(p.app_time(), before.saturating_sub(p.config().adjust_non_miss));
    }

    #[test]
    fn collapsed_margin_grows_app_time() {
        let mut p = pacer();
        let before = p.app_time();
        complete_frame(&mut p, HostTime(1_000_000), Duration::ZERO);
        assert_eq!(p.app_time(), before + p.config().adjust_non_miss);
    }

    #[test]
    fn ring_overflow_is_a_typed_error() {
        let mut p = pacer();
        let mut now = HostTime(1_000_000);

        for i in 0..FRAME_RING_SIZE {
            let prediction = p.predict(now).unwrap();
            assert_eq!(prediction.frame_id, FrameId(i as i64));
            now = now + Duration(1_000);
        }

        // All sixteen records are in flight; the next predict must refuse to
        // overwrite frame 0 rather than corrupt it.
        let err = p.predict(now).unwrap_err();
        assert_eq!(
            err,
            PacingError::RingSlotOccupied {
                frame_id: FrameId(FRAME_RING_SIZE as i64),
                occupant: FrameId(0),
            }
        );
        // And the refusal is stable.
        assert!(p.predict(now + Duration(1_000)).is_err());

        // Discarding the occupant frees the slot.
        p.discard(FrameId(0));
        let prediction = p.predict(now).unwrap();
        assert_eq!(prediction.frame_id, FrameId(FRAME_RING_SIZE as i64));
    }

    #[test]
    #[should_panic(expected = "discard of a frame not in flight")]
    fn double_discard_panics() {
        let mut p = pacer();
        let prediction = p.predict(HostTime(1_000_000)).unwrap();
        p.discard(prediction.frame_id);
        p.discard(prediction.frame_id);
    }

    #[test]
    fn clock_regression_is_clamped_and_counted() {
        let mut p = pacer();
        let (first, _) = complete_frame(&mut p, HostTime(100_000_000), Duration::MS);
        assert_eq!(p.clock_regressions(), 0);

        let prediction = p.predict(HostTime(50_000_000)).unwrap();
        assert_eq!(p.clock_regressions(), 1);
        assert!(
            prediction.predicted_display_time > first.predicted_display_time,
            "clamped prediction must not regress"
        );
    }

    #[test]
    #[should_panic(expected = "begin marked on frame not in woke state")]
    fn begin_before_wake_up_panics() {
        let mut p = pacer();
        let prediction = p.predict(HostTime(1_000_000)).unwrap();
        p.mark_point(TimingPoint::Begin, prediction.frame_id, HostTime(2_000_000));
    }

    #[test]
    #[should_panic(expected = "submit marked on frame not in began state")]
    fn submit_before_begin_panics() {
        let mut p = pacer();
        let prediction = p.predict(HostTime(1_000_000)).unwrap();
        p.mark_point(TimingPoint::WakeUp, prediction.frame_id, HostTime(2_000_000));
        p.mark_point(TimingPoint::Submit, prediction.frame_id, HostTime(3_000_000));
    }

    #[test]
    #[should_panic(expected = "wake-up marked on frame not in predicted state")]
    fn double_wake_up_panics() {
        let mut p = pacer();
        let prediction = p.predict(HostTime(1_000_000)).unwrap();
        p.mark_point(TimingPoint::WakeUp, prediction.frame_id, HostTime(2_000_000));
        p.mark_point(TimingPoint::WakeUp, prediction.frame_id, HostTime(2_100_000));
    }

    #[test]
    #[should_panic(expected = "info on frame not in submitted state")]
    fn info_before_submit_panics() {
        let mut p = pacer();
        let prediction = p.predict(HostTime(1_000_000)).unwrap();
        p.info(
            prediction.frame_id,
            PresentTiming {
                desired_present_time: prediction.desired_present_time,
                actual_present_time: prediction.desired_present_time,
                earliest_present_time: prediction.desired_present_time,
                present_margin: Duration::MS,
            },
            HostTime(2_000_000),
        );
    }

    #[test]
    #[should_panic(expected = "mark_point on unknown frame")]
    fn mark_point_on_never_predicted_frame_panics() {
        let mut p = pacer();
        let _ = p.predict(HostTime(1_000_000)).unwrap();
        p.mark_point(TimingPoint::WakeUp, FrameId(7), HostTime(2_000_000));
    }
}
