// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] writes timeline events as [Chrome Trace Event Format][spec]
//! JSON, suitable for loading into `chrome://tracing` or
//! [Perfetto](https://ui.perfetto.dev/). Tracks map to thread rows so the
//! frame decomposition reads as parallel lanes.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::timeline::TimelineEvent;

/// Exports timeline events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects. Timestamps
/// are converted from nanoseconds to the format's microseconds.
pub fn export(events: &[TimelineEvent], writer: &mut dyn Write) -> io::Result<()> {
    let mut objects: Vec<Value> = Vec::new();

    for event in events {
        match *event {
            TimelineEvent::Span {
                track,
                name,
                frame_id,
                begin,
                end,
            } => {
                objects.push(json!({
                    "ph": "B",
                    "name": name,
                    "cat": track.name(),
                    "ts": nanos_to_us(begin.nanos()),
                    "pid": 0,
                    "tid": track.row(),
                    "args": { "frame_id": frame_id }
                }));
                objects.push(json!({
                    "ph": "E",
                    "name": name,
                    "cat": track.name(),
                    "ts": nanos_to_us(end.nanos()),
                    "pid": 0,
                    "tid": track.row(),
                    "args": { "frame_id": frame_id }
                }));
            }
            TimelineEvent::Instant {
                track,
                name,
                frame_id,
                at,
            } => {
                objects.push(json!({
                    "ph": "i",
                    "name": name,
                    "cat": track.name(),
                    "ts": nanos_to_us(at.nanos()),
                    "pid": 0,
                    "tid": track.row(),
                    "s": "t",
                    "args": { "frame_id": frame_id }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &objects)?;
    Ok(())
}

fn nanos_to_us(nanos: u64) -> f64 {
    nanos as f64 / 1000.0
}
