// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render backend contract.
//!
//! Vergence does not own GPU resources, distortion correction, or displays;
//! all of that sits behind [`RenderBackend`], which the compositor loop
//! drives once per display period:
//!
//! ```text
//! wait_frame() ─► begin_frame(id) ─► layer_begin(id, blend)
//!     ─► layer_projection(..) / layer_quad(..)   (one call per layer,
//!     ─► layer_commit(id)                         z-order, bottom first)
//! ```
//!
//! [`wait_frame`](RenderBackend::wait_frame) blocks until the display's next
//! frame can be predicted and returns the [`FrameSignal`] the loop fans out
//! to clients. `layer_commit` performs the actual draw and present (with
//! whatever time-warp and distortion correction the backend applies).
//!
//! Resource handles ([`DeviceHandle`], [`SwapchainHandle`]) are opaque to
//! this crate: backends assign them, the compositor stores and passes them
//! through, and a handle's absence from a resource table is the only
//! validity test the core performs.

use core::fmt;

use crate::layer::{BlendMode, LayerData};
use crate::time::{Duration, HostTime};
use crate::timing::FrameId;

/// Opaque identity of a pose-tracked device, assigned by the device layer.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceHandle(pub u64);

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceHandle({})", self.0)
    }
}

/// Opaque identity of a swapchain, assigned by the render backend.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SwapchainHandle(pub u64);

impl fmt::Debug for SwapchainHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwapchainHandle({})", self.0)
    }
}

/// What `wait_frame` learned about the upcoming display frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSignal {
    /// Identity of the display frame.
    pub frame_id: FrameId,
    /// When the frame's pixels are expected to become photons.
    pub predicted_display_time: HostTime,
    /// The display period the prediction assumed.
    pub predicted_display_period: Duration,
}

/// A failure reported by the render backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendError {
    /// This frame cannot be composited; the loop abandons it and continues
    /// with the next display period.
    Frame,
    /// The backend is gone (device lost, display disconnected); the loop
    /// must stop.
    Lost,
}

impl BackendError {
    /// Whether the loop must stop rather than retry next period.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Lost)
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frame => write!(f, "backend failed to composite the frame"),
            Self::Lost => write!(f, "render backend lost"),
        }
    }
}

/// The presentation side of the compositor: accepts prepared layers and turns
/// them into a presented frame.
pub trait RenderBackend {
    /// Blocks until the next display frame can be predicted.
    fn wait_frame(&mut self) -> Result<FrameSignal, BackendError>;

    /// Opens the display frame for composition.
    fn begin_frame(&mut self, frame_id: FrameId) -> Result<(), BackendError>;

    /// Opens the layer list for the frame.
    fn layer_begin(&mut self, frame_id: FrameId, env_blend_mode: BlendMode)
    -> Result<(), BackendError>;

    /// Appends a stereo projection layer.
    ///
    /// `data.kind` is [`LayerKind::Projection`](crate::layer::LayerKind);
    /// the handles are the resolved per-eye swapchains.
    fn layer_projection(
        &mut self,
        device: DeviceHandle,
        left: SwapchainHandle,
        right: SwapchainHandle,
        data: &LayerData,
    ) -> Result<(), BackendError>;

    /// Appends a quad layer.
    fn layer_quad(
        &mut self,
        device: DeviceHandle,
        swapchain: SwapchainHandle,
        data: &LayerData,
    ) -> Result<(), BackendError>;

    /// Closes the layer list, draws, and presents.
    fn layer_commit(&mut self, frame_id: FrameId) -> Result<(), BackendError>;
}
