// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The system compositor: one render loop over many client sessions.
//!
//! Each display period the loop blocks in the backend's `wait_frame`, fans
//! the resulting timing sample out to every client's pacer, promotes every
//! due scheduled batch, and walks the delivered batches in z-order into the
//! backend. Activation (which client is the primary application, who is
//! visible, who has focus) changes on session lifecycle events, not per
//! frame, and is applied by [`SystemCompositor::update_server_state`].

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info, warn};

use vergence_core::backend::{BackendError, DeviceHandle, FrameSignal, RenderBackend};
use vergence_core::layer::{BlendMode, LayerKind, MAX_CLIENTS};
use vergence_core::time::HostTime;
use vergence_core::timing::TimingSample;

use crate::client::ClientCompositor;
use crate::{CompositorError, lock, monotonic_now};

/// Client table plus the timing state broadcast alongside it; one lock
/// guards both so a client never joins between a broadcast and its seed.
#[derive(Debug)]
struct ClientTable {
    slots: Vec<Option<Arc<ClientCompositor>>>,
    /// The most recent broadcast; clients that join late start from it.
    last_sample: Option<TimingSample>,
}

/// Which client is the primary application.
#[derive(Debug, Default)]
struct ActivationState {
    active: Option<usize>,
    last_active: Option<usize>,
}

/// The per-display compositor server.
///
/// Lock order, where locks nest: activation state → client table →
/// per-client state. No lock is held across a backend call.
#[derive(Debug)]
pub struct SystemCompositor {
    /// Device table shared by all clients; layers reference it by index.
    devices: Vec<Option<DeviceHandle>>,
    clients: Mutex<ClientTable>,
    activation: Mutex<ActivationState>,
    running: AtomicBool,
}

impl SystemCompositor {
    /// Creates a server over the given device table.
    #[must_use]
    pub fn new(devices: Vec<Option<DeviceHandle>>) -> Self {
        Self {
            devices,
            clients: Mutex::new(ClientTable {
                slots: vec![None; MAX_CLIENTS],
                last_sample: None,
            }),
            activation: Mutex::new(ActivationState::default()),
            running: AtomicBool::new(true),
        }
    }

    /// Resolves a device table index.
    #[must_use]
    pub fn device(&self, index: usize) -> Option<DeviceHandle> {
        self.devices.get(index).copied().flatten()
    }

    // -- client registry ---------------------------------------------------

    /// Attaches a client session and returns its table index.
    ///
    /// The client's pacer is seeded with the most recent timing broadcast so
    /// it can predict frames before the next display period arrives.
    pub fn add_client(&self, client: Arc<ClientCompositor>) -> Result<usize, CompositorError> {
        let mut table = lock(&self.clients);

        let Some(index) = table.slots.iter().position(Option::is_none) else {
            return Err(CompositorError::ClientLimit);
        };

        if let Some(sample) = table.last_sample {
            client.new_sample(sample);
        }
        table.slots[index] = Some(client);
        debug!(index, "client attached");
        Ok(index)
    }

    /// Detaches a client session, dropping its in-flight state, and re-runs
    /// the activation policy over the remaining clients.
    pub fn remove_client(&self, index: usize) {
        let client = {
            let mut table = lock(&self.clients);
            table.slots.get_mut(index).and_then(Option::take)
        };
        if let Some(client) = client {
            client.teardown();
            debug!(index, "client detached");
            self.update_server_state();
        }
    }

    /// Looks up an attached client by index.
    #[must_use]
    pub fn client(&self, index: usize) -> Option<Arc<ClientCompositor>> {
        lock(&self.clients).slots.get(index).cloned().flatten()
    }

    // -- activation policy -------------------------------------------------

    /// Recomputes which client is the primary application and tells every
    /// client whether it is visible and focused.
    ///
    /// Invoked on session lifecycle changes (not per frame) and safe to call
    /// redundantly: if the designated primary is unchanged and still active,
    /// nothing is recomputed and no events are queued.
    pub fn update_server_state(&self) {
        let mut activation = lock(&self.activation);
        let table = lock(&self.clients);

        // Still the same, still running: nothing to tell anyone.
        if let Some(active) = activation.active
            && activation.last_active == Some(active)
            && table.slots[active]
                .as_ref()
                .is_some_and(|c| c.session_active() && !c.is_overlay())
        {
            return;
        }

        // The primary changed, went away, or was never chosen: fall through
        // to the first session-active non-overlay client, or to idle.
        let fallback = table.slots.iter().position(|slot| {
            slot.as_ref()
                .is_some_and(|c| !c.is_overlay() && c.session_active())
        });

        let still_valid = activation.active.is_some_and(|active| {
            table.slots[active]
                .as_ref()
                .is_some_and(|c| !c.is_overlay() && c.session_active())
        });
        if !still_valid {
            activation.active = fallback;
        }

        if activation.active != activation.last_active {
            match activation.active {
                Some(active) => info!(active, "primary application changed"),
                None => info!("no primary application, idle"),
            }
        }

        let primary_switched = activation.active.is_some()
            && activation.last_active.is_some()
            && activation.active != activation.last_active;

        for (index, slot) in table.slots.iter().enumerate() {
            if let Some(client) = slot {
                client.apply_focus_state(
                    activation.active.is_some(),
                    activation.active == Some(index),
                    primary_switched,
                );
            }
        }

        activation.last_active = activation.active;
    }

    // -- render loop -------------------------------------------------------

    /// Whether the render loop should keep running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Asks the render loop to exit after the current display period.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Runs the render loop until [`stop`](Self::stop) or a fatal backend
    /// error.
    pub fn run(&self, backend: &mut dyn RenderBackend) -> Result<(), CompositorError> {
        info!("render loop starting");
        while self.is_running() {
            self.run_frame(backend, monotonic_now())?;
        }
        info!("render loop exited");
        Ok(())
    }

    /// Executes one display period: wait, broadcast, deliver, compose.
    ///
    /// A frame-scoped backend failure abandons the frame and returns `Ok`;
    /// only a fatal backend error propagates.
    pub fn run_frame(
        &self,
        backend: &mut dyn RenderBackend,
        now: HostTime,
    ) -> Result<(), CompositorError> {
        let signal = match backend.wait_frame() {
            Ok(signal) => signal,
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                warn!(%err, "wait_frame failed, skipping period");
                return Ok(());
            }
        };

        let sample = TimingSample {
            predicted_display_time: signal.predicted_display_time,
            extra: signal.predicted_display_time.saturating_duration_since(now),
            period: signal.predicted_display_period,
        };

        // Lock order: activation before the client table.
        let active = lock(&self.activation).active;
        let draw_list = {
            let mut table = lock(&self.clients);
            table.last_sample = Some(sample);

            let mut draw_list: Vec<(i64, usize, Arc<ClientCompositor>)> = Vec::new();
            for (index, slot) in table.slots.iter().enumerate() {
                let Some(client) = slot else { continue };
                client.new_sample(sample);
                client.deliver_if_due(signal.predicted_display_time);

                // Only the primary and session-active overlays composite,
                // and overlays only while a primary exists; the primary
                // always renders first whatever its z-order.
                if active == Some(index) {
                    draw_list.push((i64::MIN, index, Arc::clone(client)));
                } else if active.is_some() && client.is_overlay() && client.session_active() {
                    draw_list.push((client.z_order(), index, Arc::clone(client)));
                }
            }
            draw_list.sort_by_key(|&(z, index, _)| (z, index));
            draw_list
        };

        match self.submit_layers(backend, &signal, &draw_list) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err.into()),
            Err(err) => {
                warn!(%err, frame_id = signal.frame_id.0, "frame abandoned");
                Ok(())
            }
        }
    }

    /// Hands every delivered layer to the backend in draw order.
    fn submit_layers(
        &self,
        backend: &mut dyn RenderBackend,
        signal: &FrameSignal,
        draw_list: &[(i64, usize, Arc<ClientCompositor>)],
    ) -> Result<(), BackendError> {
        backend.begin_frame(signal.frame_id)?;
        backend.layer_begin(signal.frame_id, BlendMode::Opaque)?;

        for &(_, index, ref client) in draw_list {
            let batch = client.delivered_batch();
            if !batch.active {
                continue;
            }

            for layer in &batch.layers {
                let Some(device) = self.device(layer.device.0 as usize) else {
                    error!(client = index, "layer references a dead device, skipping");
                    continue;
                };

                match layer.data.kind {
                    LayerKind::Projection { left, right } => {
                        let left_handle = client.resolve_swapchain(left.swapchain);
                        let right_handle = client.resolve_swapchain(right.swapchain);
                        let (Some(left_handle), Some(right_handle)) = (left_handle, right_handle)
                        else {
                            error!(
                                client = index,
                                "projection layer references a dead swapchain, skipping"
                            );
                            continue;
                        };
                        backend.layer_projection(device, left_handle, right_handle, &layer.data)?;
                    }
                    LayerKind::Quad { swapchain, .. } => {
                        let Some(handle) = client.resolve_swapchain(swapchain) else {
                            error!(
                                client = index,
                                "quad layer references a dead swapchain, skipping"
                            );
                            continue;
                        };
                        backend.layer_quad(device, handle, &layer.data)?;
                    }
                }
            }
        }

        backend.layer_commit(signal.frame_id)
    }
}
