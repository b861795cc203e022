// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame pacing state machines and layer model for multi-client XR
//! compositing.
//!
//! `vergence_core` provides the timing and composition data model for an XR
//! runtime: an adaptive per-display frame pacer, a cheaper per-client pacing
//! helper, the layer-batch types that clients submit, and the contract the
//! render backend implements. It is `no_std` compatible (with `alloc`) and
//! takes the current time as an argument everywhere instead of reading a
//! clock, so every state machine is deterministic under test.
//!
//! # Architecture
//!
//! The crate is organized around the per-frame loop of a compositing server
//! that merges layers from several client sessions:
//!
//! ```text
//!   RenderBackend::wait_frame() ──► FrameSignal
//!        │                             │ broadcast as TimingSample
//!        ▼                             ▼
//!   DisplayPacer::predict()      ClientPacer::predict()  (one per client)
//!        │                             │
//!        ▼                             ▼
//!   mark_point(WakeUp/Begin/     client renders, commits a layer batch,
//!   Submit) around the real      batch promoted progress → scheduled →
//!   compositor's frame work      delivered when its display time arrives
//!        │                             │
//!        ▼                             ▼
//!   PresentTiming ──► info()     layers walked in z-order and handed to
//!   (adapts the app budget)      the RenderBackend
//! ```
//!
//! **[`time`]** — Monotonic nanosecond time points and durations, with the
//! half-millisecond tolerance tests presentation feedback is judged by.
//!
//! **[`timing`]** — The vocabulary that flows between pacers, clients, and
//! the loop: predictions, timing samples, present feedback, frame reports.
//!
//! **[`pacer`]** — The [`FramePacer`](pacer::FramePacer) trait with the
//! adaptive [`DisplayPacer`](pacer::DisplayPacer) and the degenerate
//! [`NaivePacer`](pacer::NaivePacer).
//!
//! **[`client_pacer`]** — [`ClientPacer`](client_pacer::ClientPacer), the
//! non-adaptive per-client scheduling primitive driven by broadcast samples.
//!
//! **[`layer`]** — Layer batches: the closed layer sum type, the plain-data
//! layer blob, and the slot type the triple-buffer pipeline moves around.
//!
//! **[`backend`]** — The [`RenderBackend`](backend::RenderBackend) trait that
//! presentation backends implement, plus opaque resource handles.
//!
//! **[`event`]** — Session visibility/focus events and the bounded
//! drop-oldest queue they are delivered through.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod backend;
pub mod client_pacer;
pub mod event;
pub mod layer;
pub mod pacer;
pub mod time;
pub mod timing;
