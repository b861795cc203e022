// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rolling pacing-quality metrics and grading.
//!
//! Feeds on completed [`FrameReport`]s and answers the question a soak test
//! or demo HUD asks: *is this display being paced well right now?* Tracks a
//! ring of recent frame deltas, counts misses, and grades the result A–D with
//! thresholds keyed on the pacing source — an adaptive pacer with real
//! present feedback is held to a stricter standard than the naive fallback.

#![no_std]

use vergence_core::time::HostTime;
use vergence_core::timing::FrameReport;

/// Where a display's frame timing comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingSource {
    /// Present feedback flows and the pacer adapts: tight pacing expected.
    Adaptive,
    /// No present feedback; fixed-budget guessing: looser standard.
    Naive,
}

/// Per-frame metrics sample fed into [`PacingTracker::observe`].
#[derive(Clone, Copy, Debug)]
pub struct PacingSample {
    /// How the frame was paced.
    pub source: PacingSource,
    /// Whether the frame presented late beyond the slop window.
    pub missed: bool,
    /// Signed error between actual and desired present, in ms.
    pub present_error_ms: f64,
    /// Actual-present delta to the previous frame, in ms.
    pub frame_delta_ms: f64,
}

impl PacingSample {
    /// Builds a sample from a frame report and the previous frame's actual
    /// present time.
    #[must_use]
    pub fn from_report(
        source: PacingSource,
        report: &FrameReport,
        prev_actual_present: Option<HostTime>,
    ) -> Self {
        let present_error_ms = signed_ms(report.actual_present_time, report.desired_present_time);
        let frame_delta_ms = prev_actual_present
            .map_or(0.0, |prev| signed_ms(report.actual_present_time, prev));
        Self {
            source,
            missed: report.missed,
            present_error_ms,
            frame_delta_ms,
        }
    }
}

/// Letter grade for pacing quality.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacingGrade {
    /// Tight pacing and a negligible miss rate.
    A,
    /// Good pacing with occasional misses.
    B,
    /// Degraded but usable.
    C,
    /// Poor pacing.
    D,
}

impl PacingGrade {
    /// Returns a short label for HUD rendering.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

/// Aggregated report returned by [`PacingTracker::observe`].
#[derive(Clone, Copy, Debug)]
pub struct PacingReport {
    /// Current grade.
    pub grade: PacingGrade,
    /// Misses per 1000 observed frames.
    pub miss_rate_per_1000: f64,
    /// Current frame's signed present error in milliseconds.
    pub present_error_ms: f64,
    /// Total frames observed.
    pub total_frames: u64,
    /// Total misses observed.
    pub missed_frames: u64,
}

/// Rolling pacing tracker with fixed-size frame-delta history.
#[derive(Debug)]
pub struct PacingTracker<const N: usize> {
    deltas_ms: [f64; N],
    cursor: usize,
    total_frames: u64,
    missed_frames: u64,
}

impl<const N: usize> Default for PacingTracker<N> {
    fn default() -> Self {
        Self::new(16.67)
    }
}

impl<const N: usize> PacingTracker<N> {
    /// Creates a tracker with `seed_delta_ms` prefilled in the ring buffer.
    #[must_use]
    pub const fn new(seed_delta_ms: f64) -> Self {
        Self {
            deltas_ms: [seed_delta_ms; N],
            cursor: 0,
            total_frames: 0,
            missed_frames: 0,
        }
    }

    /// Observes one frame and returns an updated report.
    #[must_use]
    pub fn observe(&mut self, sample: PacingSample) -> PacingReport {
        self.total_frames = self.total_frames.saturating_add(1);
        self.deltas_ms[self.cursor % N] = sample.frame_delta_ms;
        self.cursor = (self.cursor + 1) % N;

        if sample.missed {
            self.missed_frames = self.missed_frames.saturating_add(1);
        }

        let miss_rate = self.missed_frames as f64 * 1000.0 / self.total_frames as f64;
        let grade = grade_for(sample.source, sample.present_error_ms.abs(), miss_rate);

        PacingReport {
            grade,
            miss_rate_per_1000: miss_rate,
            present_error_ms: sample.present_error_ms,
            total_frames: self.total_frames,
            missed_frames: self.missed_frames,
        }
    }

    /// Returns ring-buffer frame deltas oldest→newest.
    #[must_use]
    pub fn frame_deltas(&self) -> [f64; N] {
        let mut out = [0.0; N];
        let mut i = 0;
        while i < N {
            out[i] = self.deltas_ms[(self.cursor + i) % N];
            i += 1;
        }
        out
    }
}

fn grade_for(source: PacingSource, present_error_abs_ms: f64, miss_rate_per_1000: f64) -> PacingGrade {
    let (a_err, b_err, c_err, a_miss, b_miss, c_miss) = match source {
        PacingSource::Adaptive => (0.5, 1.0, 2.0, 1.0, 5.0, 15.0),
        PacingSource::Naive => (1.0, 2.5, 5.0, 10.0, 30.0, 80.0),
    };

    if present_error_abs_ms < a_err && miss_rate_per_1000 < a_miss {
        PacingGrade::A
    } else if present_error_abs_ms < b_err && miss_rate_per_1000 < b_miss {
        PacingGrade::B
    } else if present_error_abs_ms < c_err && miss_rate_per_1000 < c_miss {
        PacingGrade::C
    } else {
        PacingGrade::D
    }
}

fn signed_ms(a: HostTime, b: HostTime) -> f64 {
    (a.nanos() as f64 - b.nanos() as f64) / 1_000_000.0
}
