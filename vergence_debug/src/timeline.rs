// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame report → timeline decomposition.
//!
//! [`frame_timeline`] turns the timestamps of one [`FrameReport`] into the
//! spans a human wants to see on a trace: where the compositor slept and
//! overslept, where the GPU worked, how much margin was left before the
//! present, and — when the frame slipped — by how much.

use vergence_core::time::{Duration, HostTime};
use vergence_core::timing::FrameReport;

/// Which row of the trace an event belongs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Track {
    /// CPU-side waiting and oversleep.
    Cpu,
    /// GPU work.
    Gpu,
    /// Slack between GPU completion and the present deadline.
    Margin,
    /// Slippage and run-ahead relative to the desired present.
    Error,
    /// Feedback latency.
    Info,
    /// Present-time instants (earliest / predicted / vsync).
    Present,
    /// The app-time budget that was allotted to the frame.
    Allotted,
}

impl Track {
    /// Stable display name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Gpu => "gpu",
            Self::Margin => "margin",
            Self::Error => "error",
            Self::Info => "info",
            Self::Present => "present",
            Self::Allotted => "allotted",
        }
    }

    /// Stable row index for trace viewers.
    #[must_use]
    pub const fn row(self) -> u32 {
        match self {
            Self::Cpu => 0,
            Self::Gpu => 1,
            Self::Margin => 2,
            Self::Error => 3,
            Self::Info => 4,
            Self::Present => 5,
            Self::Allotted => 6,
        }
    }
}

/// One element of a frame's timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelineEvent {
    /// A span with a beginning and an end.
    Span {
        /// Row the span belongs on.
        track: Track,
        /// What the span covers.
        name: &'static str,
        /// The frame it belongs to.
        frame_id: i64,
        /// Span start.
        begin: HostTime,
        /// Span end.
        end: HostTime,
    },
    /// A single point in time.
    Instant {
        /// Row the instant belongs on.
        track: Track,
        /// What happened.
        name: &'static str,
        /// The frame it belongs to.
        frame_id: i64,
        /// When it happened.
        at: HostTime,
    },
}

/// Decomposes one completed frame into timeline events.
#[must_use]
pub fn frame_timeline(report: &FrameReport) -> Vec<TimelineEvent> {
    let mut events = Vec::new();
    let frame_id = report.frame_id.0;
    let span = |track, name, begin, end| TimelineEvent::Span {
        track,
        name,
        frame_id,
        begin,
        end,
    };
    let instant = |track, name, at| TimelineEvent::Instant {
        track,
        name,
        frame_id,
        at,
    };

    // The intended sleep, and any oversleep past the wake-up point.
    events.push(span(Track::Cpu, "sleep", report.when_predict, report.wake_up_time));
    let oversleep_start = report.wake_up_time + Duration(1);
    if report.when_woke > oversleep_start {
        events.push(span(Track::Cpu, "oversleep", oversleep_start, report.when_woke));
    }

    // GPU work ends present_margin before the actual present. Feedback that
    // claims it ended before submission is shown as-is, flagged by name.
    let gpu_end = report
        .actual_present_time
        .checked_sub(report.present_margin)
        .unwrap_or(report.actual_present_time);
    if gpu_end > report.when_submitted {
        events.push(span(Track::Gpu, "gpu", report.when_submitted, gpu_end));
    } else {
        events.push(span(Track::Gpu, "gpu-time-travel", gpu_end, report.when_submitted));
    }

    if gpu_end < report.desired_present_time {
        events.push(span(Track::Margin, "margin", gpu_end, report.desired_present_time));
    }

    if !report
        .actual_present_time
        .is_within_half_ms(report.desired_present_time)
    {
        if report.actual_present_time > report.desired_present_time {
            events.push(span(
                Track::Error,
                "slippage",
                report.desired_present_time,
                report.actual_present_time,
            ));
        } else {
            events.push(span(
                Track::Error,
                "run-ahead",
                report.actual_present_time,
                report.desired_present_time,
            ));
        }
    }

    if report.when_infoed >= report.actual_present_time {
        events.push(span(Track::Info, "info", report.actual_present_time, report.when_infoed));
    } else {
        events.push(span(
            Track::Info,
            "info-before",
            report.when_infoed,
            report.actual_present_time,
        ));
    }

    if report.actual_present_time != report.earliest_present_time {
        events.push(instant(Track::Present, "earliest", report.earliest_present_time));
    }
    if !report
        .desired_present_time
        .is_within_half_ms(report.earliest_present_time)
    {
        events.push(instant(Track::Present, "predicted", report.desired_present_time));
    }
    events.push(instant(Track::Present, "vsync", report.actual_present_time));

    events.push(span(
        Track::Allotted,
        "allotted",
        report.wake_up_time,
        report.wake_up_time + report.current_app_time,
    ));

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use vergence_core::time::Duration;
    use vergence_core::timing::FrameId;

    fn clean_report() -> FrameReport {
        let desired = HostTime(100_000_000);
        FrameReport {
            frame_id: FrameId(3),
            when_predict: HostTime(80_000_000),
            wake_up_time: HostTime(95_000_000),
            when_woke: HostTime(95_100_000),
            when_began: HostTime(95_500_000),
            when_submitted: HostTime(97_000_000),
            when_infoed: HostTime(101_000_000),
            desired_present_time: desired,
            predicted_display_time: desired + Duration::from_millis(4),
            actual_present_time: desired,
            earliest_present_time: desired,
            present_margin: Duration::MS,
            current_app_time: Duration(1_666_666),
            missed: false,
        }
    }

    fn names(events: &[TimelineEvent]) -> Vec<&'static str> {
        events
            .iter()
            .map(|e| match e {
                TimelineEvent::Span { name, .. } | TimelineEvent::Instant { name, .. } => *name,
            })
            .collect()
    }

    #[test]
    fn clean_frame_has_no_error_span() {
        let events = frame_timeline(&clean_report());
        let names = names(&events);
        assert!(names.contains(&"sleep"));
        assert!(names.contains(&"gpu"));
        assert!(names.contains(&"margin"));
        assert!(names.contains(&"vsync"));
        assert!(names.contains(&"allotted"));
        assert!(!names.contains(&"slippage"));
        assert!(!names.contains(&"run-ahead"));
        // Presented exactly when predicted: no separate earliest/predicted.
        assert!(!names.contains(&"earliest"));
        assert!(!names.contains(&"predicted"));
    }

    #[test]
    fn missed_frame_shows_slippage() {
        let mut report = clean_report();
        report.actual_present_time = report.desired_present_time + Duration::from_millis(2);
        report.earliest_present_time = report.actual_present_time;
        report.missed = true;

        let events = frame_timeline(&report);
        let slip = events.iter().find_map(|e| match e {
            TimelineEvent::Span {
                name: "slippage",
                begin,
                end,
                ..
            } => Some((*begin, *end)),
            _ => None,
        });
        let (begin, end) = slip.expect("missed frame must carry a slippage span");
        assert_eq!(end - begin, Duration::from_millis(2));
        assert!(names(&events).contains(&"predicted"));
    }

    #[test]
    fn oversleep_appears_only_when_late() {
        let events = frame_timeline(&clean_report());
        assert!(names(&events).contains(&"oversleep"));

        let mut punctual = clean_report();
        punctual.when_woke = punctual.wake_up_time;
        let events = frame_timeline(&punctual);
        assert!(!names(&events).contains(&"oversleep"));
    }

    #[test]
    fn gpu_time_travel_is_flagged_not_hidden() {
        let mut report = clean_report();
        // Feedback claims GPU work ended before submission.
        report.present_margin = Duration::from_millis(10);
        let events = frame_timeline(&report);
        assert!(names(&events).contains(&"gpu-time-travel"));
        assert!(!names(&events).contains(&"gpu"));
    }
}
