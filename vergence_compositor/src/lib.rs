// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multi-client compositor server.
//!
//! This crate is the thread-facing half of vergence: it owns the locks, the
//! client sessions, and the render loop, and drives the state machines from
//! [`vergence_core`] with the real monotonic clock.
//!
//! # Threads and locks
//!
//! One render thread per display runs [`SystemCompositor::run`]; one thread
//! per connected client calls that client's [`ClientCompositor`] methods.
//! Locks are held for move/copy-sized critical sections only and never across
//! a [`RenderBackend`](vergence_core::backend::RenderBackend) call. Where two
//! locks nest, the order is activation state → client table → per-client
//! state.
//!
//! **[`client`]** — [`ClientCompositor`]: one session's slot pipeline
//! (progress → scheduled → delivered), frame protocol, swapchain table, and
//! event queue.
//!
//! **[`server`]** — [`SystemCompositor`]: the client registry, the
//! once-per-frame timing broadcast, z-ordered layer submission, and the
//! activation/focus policy.
//!
//! **[`headless`]** — [`HeadlessBackend`]: a render backend over a synthetic
//! clock that closes the predict→present feedback loop without hardware.

pub mod client;
pub mod headless;
pub mod server;

pub use client::ClientCompositor;
pub use headless::HeadlessBackend;
pub use server::SystemCompositor;

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Instant;

use thiserror::Error;
use vergence_core::backend::BackendError;
use vergence_core::time::HostTime;
use vergence_core::timing::PacingError;

/// Failures the compositor surfaces to its embedder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompositorError {
    /// The render backend reported an unrecoverable condition.
    #[error("render backend: {0}")]
    Backend(BackendError),
    /// A pacer refused a prediction.
    #[error("frame pacing: {0}")]
    Pacing(PacingError),
    /// A layer batch already holds the maximum number of layers.
    #[error("layer batch is full")]
    LayerLimit,
    /// The client table already holds the maximum number of sessions.
    #[error("client table is full")]
    ClientLimit,
}

impl From<BackendError> for CompositorError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}

impl From<PacingError> for CompositorError {
    fn from(err: PacingError) -> Self {
        Self::Pacing(err)
    }
}

/// The current time on the process-wide monotonic clock.
#[must_use]
pub fn monotonic_now() -> HostTime {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = *EPOCH.get_or_init(Instant::now);
    HostTime(u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX))
}

/// Locks a mutex, riding over poisoning.
///
/// A client thread that panicked mid-commit must not take the render loop
/// (or the other clients) down with it; every guarded structure here is
/// valid after any partial update.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
