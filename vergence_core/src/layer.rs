// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Layer batches submitted by client sessions.
//!
//! A client submits one *batch* of layers per frame: an ordered sequence of
//! [`LayerEntry`] values (order is blend order) plus a target display time
//! and an environment blend mode, held in a [`LayerSlot`]. The compositor
//! moves whole slots through the progress → scheduled → delivered pipeline;
//! the types here are plain data and know nothing about that pipeline.
//!
//! Layer payloads reference resources indirectly: a [`DeviceIndex`] into the
//! server's device table and [`SwapchainIndex`]es into the owning client's
//! swapchain table. Delivery resolves the indices and skips layers whose
//! references have gone dangling.

use alloc::vec::Vec;

use kurbo::{Rect, Size};

use crate::time::HostTime;

/// Most layers one batch may carry.
pub const MAX_LAYERS: usize = 16;

/// Most client sessions one compositor serves.
pub const MAX_CLIENTS: usize = 64;

/// How submitted imagery is blended with the user's environment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    /// Imagery fully replaces the view.
    #[default]
    Opaque,
    /// Imagery is summed onto the view.
    Additive,
    /// Imagery is alpha-blended over the view.
    AlphaBlend,
}

/// Which eyes a layer is shown to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EyeVisibility {
    /// Hidden from both eyes.
    Neither,
    /// Left eye only.
    Left,
    /// Right eye only.
    Right,
    /// Shown to both eyes.
    #[default]
    Both,
}

/// Per-layer composition flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LayerFlags {
    /// Chromatic aberration correction was already applied by the client.
    pub correct_chromatic_aberration: bool,
    /// Blend using the texture's own alpha channel.
    pub blend_texture_source_alpha: bool,
    /// The texture's alpha is not premultiplied.
    pub unpremultiplied_alpha: bool,
}

/// A rotation as a unit quaternion.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quat {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W (scalar) component.
    pub w: f32,
}

impl Quat {
    /// The identity rotation.
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };
}

/// A position in tracking space, in meters.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

/// A rigid pose: where a layer sits in tracking space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pose {
    /// Orientation.
    pub orientation: Quat,
    /// Position in meters.
    pub position: Vec3,
}

impl Pose {
    /// The identity pose at the tracking-space origin.
    pub const IDENTITY: Self = Self {
        orientation: Quat::IDENTITY,
        position: Vec3 {
            x: 0.0,
            y: 0.0,
            z: 0.0,
        },
    };
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A view frustum as four half-angles in radians.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Fov {
    /// Angle to the left edge (typically negative).
    pub angle_left: f32,
    /// Angle to the right edge.
    pub angle_right: f32,
    /// Angle to the top edge.
    pub angle_up: f32,
    /// Angle to the bottom edge (typically negative).
    pub angle_down: f32,
}

/// Index into the server's device table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceIndex(pub u32);

/// Index into the owning client's swapchain table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SwapchainIndex(pub u32);

/// The region of a swapchain image a layer samples from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubImage {
    /// Which image in the swapchain.
    pub image_index: u32,
    /// Sample region in pixels.
    pub rect: Rect,
}

/// One eye's view of a projection layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionView {
    /// Swapchain holding this eye's imagery.
    pub swapchain: SwapchainIndex,
    /// Region of the swapchain image to sample.
    pub sub: SubImage,
    /// Frustum the imagery was rendered with.
    pub fov: Fov,
    /// Pose the imagery was rendered from.
    pub pose: Pose,
}

/// The closed set of layer shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LayerKind {
    /// Full-view stereo imagery, one swapchain per eye.
    Projection {
        /// Left eye view.
        left: ProjectionView,
        /// Right eye view.
        right: ProjectionView,
    },
    /// A flat textured rectangle positioned in tracking space.
    Quad {
        /// Swapchain holding the quad's imagery.
        swapchain: SwapchainIndex,
        /// Which eyes see the quad.
        visibility: EyeVisibility,
        /// Region of the swapchain image to sample.
        sub: SubImage,
        /// Center pose of the quad.
        pose: Pose,
        /// Extent of the quad in meters.
        size: Size,
    },
}

/// Everything about a layer except which device supplies its pose.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerData {
    /// Display-no-earlier-than timestamp: the layer may be shown after this
    /// point but never before it.
    pub timestamp: HostTime,
    /// Composition flags.
    pub flags: LayerFlags,
    /// Whether the compositor should flip Y when sampling, per the submitting
    /// graphics API's convention.
    pub flip_y: bool,
    /// The layer's shape and per-shape payload.
    pub kind: LayerKind,
}

/// One layer in a batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LayerEntry {
    /// Device whose pose this layer is relative to.
    pub device: DeviceIndex,
    /// The layer payload.
    pub data: LayerData,
}

/// One client's layer batch.
///
/// `layers` order is submission order and is meaningful for blending.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerSlot {
    /// When this batch should be shown.
    pub display_time: HostTime,
    /// How the batch blends with the environment.
    pub env_blend_mode: BlendMode,
    /// Whether the slot holds a batch at all.
    pub active: bool,
    /// The batch, in blend order.
    pub layers: Vec<LayerEntry>,
}

impl LayerSlot {
    /// Resets the slot to inactive and empty, keeping its allocation.
    pub fn clear(&mut self) {
        self.display_time = HostTime(0);
        self.env_blend_mode = BlendMode::Opaque;
        self.active = false;
        self.layers.clear();
    }
}
