// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostics for vergence frame pacing.
//!
//! [`timeline`] decomposes a completed frame's
//! [`FrameReport`](vergence_core::timing::FrameReport) into named spans and
//! instants on fixed tracks (sleep, GPU work, margin, slippage, the present
//! itself). [`chrome`] serializes those events as Chrome Trace Event Format
//! JSON for `chrome://tracing` or Perfetto.

pub mod chrome;
pub mod timeline;

pub use chrome::export;
pub use timeline::{TimelineEvent, Track, frame_timeline};
