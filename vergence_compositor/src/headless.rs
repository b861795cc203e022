// Copyright 2026 the Vergence Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A render backend with no hardware behind it.
//!
//! [`HeadlessBackend`] drives any [`FramePacer`] through the full
//! predict → wake → begin → submit → feedback protocol against a synthetic
//! clock: `wait_frame` advances the clock to the predicted wake-up point
//! instead of sleeping, and `layer_commit` synthesizes present feedback as if
//! a display had presented at the desired time (plus a configurable error).
//!
//! It exists for integration tests, pacing experiments, and driving the
//! server loop on machines with no XR display, and is the reference for how
//! a real backend slots a pacer between `wait_frame` and its swapchain.

use tracing::{debug, error};

use vergence_core::backend::{
    BackendError, DeviceHandle, FrameSignal, RenderBackend, SwapchainHandle,
};
use vergence_core::layer::{BlendMode, LayerData};
use vergence_core::pacer::FramePacer;
use vergence_core::time::{Duration, HostTime};
use vergence_core::timing::{FrameId, FramePrediction, FrameReport, PresentTiming, TimingPoint};

/// A display-frame in flight between `wait_frame` and `layer_commit`.
#[derive(Debug)]
struct InFlight {
    prediction: FramePrediction,
}

/// A pacer-driven backend over a synthetic clock.
#[derive(Debug)]
pub struct HeadlessBackend<P> {
    pacer: P,
    clock: HostTime,
    /// Simulated compositor CPU time between wake-up and begin.
    pub cpu_time: Duration,
    /// Simulated GPU time between begin and the end of GPU work.
    pub gpu_time: Duration,
    /// How late the simulated display presents relative to the desired time.
    pub present_error: Duration,
    in_flight: Option<InFlight>,
    reports: Vec<FrameReport>,
    layers_drawn: u64,
}

impl<P: FramePacer> HeadlessBackend<P> {
    /// Creates a backend over `pacer` with its clock at `start`.
    #[must_use]
    pub fn new(pacer: P, start: HostTime) -> Self {
        Self {
            pacer,
            clock: start,
            cpu_time: Duration::MS,
            gpu_time: Duration::from_millis(2),
            present_error: Duration::ZERO,
            in_flight: None,
            reports: Vec::new(),
            layers_drawn: 0,
        }
    }

    /// The synthetic clock's current value.
    #[must_use]
    pub fn clock(&self) -> HostTime {
        self.clock
    }

    /// The pacer this backend drives.
    #[must_use]
    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Frame reports collected from completed feedback, oldest first.
    #[must_use]
    pub fn reports(&self) -> &[FrameReport] {
        &self.reports
    }

    /// Total layers handed to the backend across all frames.
    #[must_use]
    pub fn layers_drawn(&self) -> u64 {
        self.layers_drawn
    }

    fn advance_to(&mut self, time: HostTime) {
        self.clock = self.clock.max(time);
    }
}

impl<P: FramePacer> RenderBackend for HeadlessBackend<P> {
    fn wait_frame(&mut self) -> Result<FrameSignal, BackendError> {
        assert!(
            self.in_flight.is_none(),
            "wait_frame while a frame is still in flight"
        );

        let prediction = match self.pacer.predict(self.clock) {
            Ok(prediction) => prediction,
            Err(err) => {
                // The ring only fills if feedback stopped flowing, and this
                // backend always feeds back on commit; treat as gone.
                error!(%err, "pacer refused a prediction");
                return Err(BackendError::Lost);
            }
        };

        if prediction.periods_skipped > 0 {
            debug!(
                frame_id = prediction.frame_id.0,
                skipped = prediction.periods_skipped,
                "display periods skipped"
            );
        }

        // Sleep until the wake-up point.
        self.advance_to(prediction.wake_up_time);
        self.pacer
            .mark_point(TimingPoint::WakeUp, prediction.frame_id, self.clock);

        let signal = FrameSignal {
            frame_id: prediction.frame_id,
            predicted_display_time: prediction.predicted_display_time,
            predicted_display_period: prediction.predicted_display_period,
        };
        self.in_flight = Some(InFlight { prediction });
        Ok(signal)
    }

    fn begin_frame(&mut self, frame_id: FrameId) -> Result<(), BackendError> {
        let in_flight = self.in_flight.as_ref().expect("begin_frame before wait_frame");
        assert_eq!(
            in_flight.prediction.frame_id, frame_id,
            "begin_frame for a different frame than wait_frame returned"
        );

        self.clock = self.clock + self.cpu_time;
        self.pacer.mark_point(TimingPoint::Begin, frame_id, self.clock);
        Ok(())
    }

    fn layer_begin(
        &mut self,
        _frame_id: FrameId,
        _env_blend_mode: BlendMode,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn layer_projection(
        &mut self,
        _device: DeviceHandle,
        _left: SwapchainHandle,
        _right: SwapchainHandle,
        _data: &LayerData,
    ) -> Result<(), BackendError> {
        self.layers_drawn += 1;
        Ok(())
    }

    fn layer_quad(
        &mut self,
        _device: DeviceHandle,
        _swapchain: SwapchainHandle,
        _data: &LayerData,
    ) -> Result<(), BackendError> {
        self.layers_drawn += 1;
        Ok(())
    }

    fn layer_commit(&mut self, frame_id: FrameId) -> Result<(), BackendError> {
        let in_flight = self.in_flight.take().expect("layer_commit before wait_frame");
        assert_eq!(
            in_flight.prediction.frame_id, frame_id,
            "layer_commit for a different frame than wait_frame returned"
        );
        let prediction = in_flight.prediction;

        self.pacer.mark_point(TimingPoint::Submit, frame_id, self.clock);

        // GPU work, then the simulated scanout.
        let gpu_end = self.clock + self.gpu_time;
        let desired = prediction.desired_present_time;
        let actual = desired.max(gpu_end) + self.present_error;
        let present_margin = actual.saturating_duration_since(gpu_end);

        self.advance_to(actual);
        let report = self.pacer.info(
            frame_id,
            PresentTiming {
                desired_present_time: desired,
                actual_present_time: actual,
                earliest_present_time: actual,
                present_margin,
            },
            self.clock,
        );
        if let Some(report) = report {
            self.reports.push(report);
        }
        Ok(())
    }
}
