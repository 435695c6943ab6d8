//! The navigation state machine.
//!
//! A [`NavigationController`] is constructed explicitly by the application and owns everything
//! that changes while navigating: which mode is active, the register→image transform, the rate
//! limiter, and the pose-stream subscription. Each pose sample is handled synchronously to
//! completion:
//!
//! 1. pending mode switches are applied,
//! 2. the sample is moved into the image frame,
//! 3. the rate limiter decides whether it gets through,
//! 4. the active mode handles it; a failure is logged and the stream carries on,
//! 5. mode switches requested while the mode was busy are applied.

use crate::config::NavigationConfig;
use crate::error::{NavigationError, Result};
use crate::math::RigidBodyTransform;
use crate::modes::{Mode, ModeKind, ModeOutput, NavigationMode};
use crate::pose::PoseSample;
use crate::rendering::Renderer;
use crate::stream::{PoseStream, Subscription};
use crate::systems::{Image, Register};
use crate::throttle::RateLimiter;
use crate::transformer::CoordinateTransformer;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// What became of one pose sample.
#[derive(Clone, Debug, PartialEq)]
pub enum SampleOutcome {
    Delivered(ModeOutput),
    /// Dropped by the rate limiter.
    Throttled,
    /// Dropped because no mode is active.
    NoActiveMode,
    /// The active mode failed on this sample. The error is always
    /// [`NavigationError::SampleHandling`].
    Failed(NavigationError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct ModeRequest {
    kind: ModeKind,
    force: bool,
}

/// A handle for requesting a mode switch from code that cannot borrow the controller, such as
/// a renderer or UI callback running inside a sample update.
///
/// Requests are applied by the controller between samples, never while a mode is handling one.
/// If several requests arrive before that, the last one wins.
#[derive(Clone, Debug, Default)]
pub struct ModeRequests {
    pending: Rc<RefCell<Option<ModeRequest>>>,
}

impl ModeRequests {
    pub fn request(&self, kind: ModeKind, force: bool) {
        *self.pending.borrow_mut() = Some(ModeRequest { kind, force });
    }

    /// Parses `name` and queues a switch to it.
    ///
    /// An unknown name is rejected right away with [`NavigationError::ModeNotFound`] and leaves
    /// any earlier request in place.
    pub fn request_by_name(&self, name: &str, force: bool) -> Result<ModeKind> {
        let kind = name.parse::<ModeKind>()?;
        self.request(kind, force);
        Ok(kind)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.borrow().is_some()
    }

    fn take(&self) -> Option<ModeRequest> {
        self.pending.borrow_mut().take()
    }

    fn clear(&self) {
        self.pending.borrow_mut().take();
    }
}

pub struct NavigationController<R> {
    renderer: R,
    config: NavigationConfig,
    transformer: CoordinateTransformer,
    limiter: RateLimiter,
    active: Option<Mode>,
    requests: ModeRequests,
    subscription: Option<Box<dyn Subscription>>,
}

impl<R> NavigationController<R>
where
    R: Renderer,
{
    /// Builds an idle controller: no mode active, no transform loaded, not subscribed.
    pub fn new(renderer: R, config: NavigationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            renderer,
            limiter: RateLimiter::from_config(&config),
            config,
            transformer: CoordinateTransformer::new(),
            active: None,
            requests: ModeRequests::default(),
            subscription: None,
        })
    }

    #[must_use]
    pub fn config(&self) -> &NavigationConfig {
        &self.config
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub fn transformer(&self) -> &CoordinateTransformer {
        &self.transformer
    }

    pub fn load_transform(&mut self, transform: RigidBodyTransform<Register, Image>) {
        self.transformer.load(transform);
    }

    pub fn clear_transform(&mut self) {
        self.transformer.clear();
    }

    /// A handle through which callbacks can ask for a mode switch later.
    #[must_use]
    pub fn mode_requests(&self) -> ModeRequests {
        self.requests.clone()
    }

    #[must_use]
    pub fn active_mode(&self) -> Option<ModeKind> {
        self.active.as_ref().map(NavigationMode::kind)
    }

    #[must_use]
    pub fn mode(&self) -> Option<&Mode> {
        self.active.as_ref()
    }

    /// Switches to the mode called `name`.
    ///
    /// An unknown name fails with [`NavigationError::ModeNotFound`] and leaves the active mode
    /// untouched.
    pub fn set_mode(&mut self, name: &str, force: bool) -> Result<ModeKind> {
        let kind = name.parse::<ModeKind>().map_err(|error| {
            warn!(%error, "rejected mode switch");
            error
        })?;
        self.set_mode_kind(kind, force);
        Ok(kind)
    }

    /// Switches to `kind`.
    ///
    /// Switching to the mode that is already active does nothing unless `force` is set, in which
    /// case the mode is torn down and entered again from scratch. The outgoing mode is exited and
    /// cleaned up before the incoming one is entered.
    pub fn set_mode_kind(&mut self, kind: ModeKind, force: bool) {
        if !force && self.active_mode() == Some(kind) {
            debug!(mode = %kind, "mode already active");
            return;
        }
        let previous = self.teardown_active();
        let mut incoming = Mode::new(kind, &self.config);
        incoming.enter(&mut self.renderer);
        self.active = Some(incoming);
        self.limiter.reset();
        info!(
            mode = %kind,
            previous = previous.map(ModeKind::name),
            force,
            "navigation mode switched"
        );
    }

    /// Exits and cleans up the active mode, if any, and returns what it was.
    fn teardown_active(&mut self) -> Option<ModeKind> {
        let mut outgoing = self.active.take()?;
        outgoing.exit(&mut self.renderer);
        outgoing.cleanup(&mut self.renderer);
        Some(outgoing.kind())
    }

    fn apply_requested_switch(&mut self) {
        if let Some(ModeRequest { kind, force }) = self.requests.take() {
            self.set_mode_kind(kind, force);
        }
    }

    /// Routes one pose sample through the engine.
    ///
    /// This never fails: every per-sample problem is recovered or reported through the
    /// returned [`SampleOutcome`], and the next sample is processed normally.
    pub fn handle_pose_sample(&mut self, sample: PoseSample) -> SampleOutcome {
        self.apply_requested_switch();

        let sequence_id = sample.sequence_id;
        let pose = self.transformer.sample_to_image_frame(&sample);

        let Some(mode) = self.active.as_mut() else {
            warn!(sequence_id, "no navigation mode active; dropping pose sample");
            return SampleOutcome::NoActiveMode;
        };
        if !pose.position.is_finite() {
            let failure = NavigationError::SampleHandling {
                mode: mode.kind().name(),
                sequence_id,
                source: Box::new(NavigationError::invalid_transform(
                    "sample position contains NaN or infinite entries",
                )),
            };
            warn!(sequence_id, error = %failure, "dropping non-finite pose sample");
            return SampleOutcome::Failed(failure);
        }
        if !self.limiter.admit(pose.timestamp_ms) {
            return SampleOutcome::Throttled;
        }

        let outcome = match mode.handle_update(&mut self.renderer, &pose) {
            Ok(output) => SampleOutcome::Delivered(output),
            Err(source) => {
                let failure = NavigationError::SampleHandling {
                    mode: mode.kind().name(),
                    sequence_id,
                    source: Box::new(source),
                };
                error!(sequence_id, error = %failure, "pose sample handling failed");
                SampleOutcome::Failed(failure)
            }
        };

        self.apply_requested_switch();
        outcome
    }

    /// Subscribes to `stream`, replacing any earlier subscription.
    ///
    /// If no mode is active yet, camera following is entered.
    pub fn start_navigation(&mut self, stream: &mut dyn PoseStream) {
        if let Some(mut previous) = self.subscription.take() {
            previous.cancel();
        }
        if self.active.is_none() {
            self.set_mode_kind(ModeKind::CameraFollowing, false);
        }
        self.subscription = Some(stream.subscribe());
        info!(mode = ?self.active_mode().map(ModeKind::name), "navigation started");
    }

    /// Unsubscribes from the pose stream and tears the active mode down, in one step.
    ///
    /// Afterwards no sample reaches any mode. Pending mode requests are discarded.
    pub fn stop_navigation(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            subscription.cancel();
        }
        let previous = self.teardown_active();
        self.requests.clear();
        self.limiter.reset();
        info!(previous = previous.map(ModeKind::name), "navigation stopped");
    }

    #[must_use]
    pub fn is_navigating(&self) -> bool {
        self.subscription.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinates::Coordinate;
    use crate::math::Rotation;
    use crate::modes::ProjectionInstruction;
    use crate::rendering::{Bounds, ViewportId};
    use crate::stream::tests::FakeStream;
    use crate::testing::{c, init_tracing, sample, Call, RecordingRenderer};
    use approx::assert_relative_eq;

    fn controller() -> NavigationController<RecordingRenderer> {
        init_tracing();
        NavigationController::new(RecordingRenderer::standard(), NavigationConfig::default())
            .expect("default config is valid")
    }

    #[test]
    fn rejects_invalid_config() {
        let result = NavigationController::new(
            RecordingRenderer::standard(),
            NavigationConfig {
                target_update_rate_hz: -5.,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(NavigationError::InvalidConfig(_))));
    }

    #[test]
    fn samples_without_a_mode_are_dropped() {
        let mut controller = controller();
        assert_eq!(
            controller.handle_pose_sample(sample([0., 0., 0.], 0, 0)),
            SampleOutcome::NoActiveMode
        );
        assert!(controller.renderer().calls.is_empty());
    }

    #[test]
    fn unknown_mode_keeps_the_current_one() {
        let mut controller = controller();
        controller
            .set_mode("camera-following", false)
            .expect("known mode");
        assert_eq!(
            controller.set_mode("x-ray", false),
            Err(NavigationError::ModeNotFound {
                name: "x-ray".to_owned()
            })
        );
        assert_eq!(controller.active_mode(), Some(ModeKind::CameraFollowing));
    }

    #[test]
    fn transform_is_applied_before_the_mode_sees_the_sample() {
        let mut controller = controller();
        controller.load_transform(
            RigidBodyTransform::build(Rotation::identity(), [10., 0., 0.]).expect("transform"),
        );
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        let outcome = controller.handle_pose_sample(sample([5., 5., 5.], 0, 1));
        let SampleOutcome::Delivered(ModeOutput::Camera(update)) = outcome else {
            panic!("expected a camera update, got {outcome:?}");
        };
        assert_relative_eq!(update.target, c(15., 5., 5.));
        assert!(controller.transformer().has_transform());

        controller.clear_transform();
        assert!(!controller.transformer().has_transform());
    }

    #[test]
    fn throttle_bounds_deliveries_per_window() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        let outcomes: Vec<_> = (0..5)
            .map(|i| controller.handle_pose_sample(sample([i as f64 * 10., 0., 0.], 1_000 + i, i)))
            .collect();
        assert!(matches!(outcomes[0], SampleOutcome::Delivered(_)));
        assert!(outcomes[1..]
            .iter()
            .all(|outcome| *outcome == SampleOutcome::Throttled));
        assert_eq!(controller.renderer().set_camera_calls_for("axial").len(), 1);
    }

    #[test]
    fn modes_are_isolated() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::InstrumentProjection, false);
        for i in 0..10 {
            controller.handle_pose_sample(sample([0., 0., -20. - i as f64], i * 100, i));
        }
        assert_eq!(controller.renderer().set_camera_count(), 0);
        assert!(controller
            .renderer()
            .overlays
            .contains_key(&ViewportId::new("axial")));

        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        // leaving projection took its overlays with it
        assert!(controller.renderer().overlays.is_empty());
        let draws_before = controller
            .renderer()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::DrawProjection(_)))
            .count();
        for i in 0..10 {
            controller.handle_pose_sample(sample([i as f64, 0., 0.], 10_000 + i * 100, 100 + i));
        }
        let draws_after = controller
            .renderer()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::DrawProjection(_)))
            .count();
        assert_eq!(draws_before, draws_after);
        assert!(controller.renderer().set_camera_count() > 0);
    }

    #[test]
    fn failures_do_not_stop_the_stream() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        controller.renderer_mut().fail_set_camera = true;
        let failed = controller.handle_pose_sample(sample([1., 0., 0.], 0, 7));
        let SampleOutcome::Failed(error) = failed else {
            panic!("expected a failure, got {failed:?}");
        };
        insta::assert_snapshot!(
            error,
            @"mode camera-following failed to handle sample 7: rendering collaborator failed: axial refused the camera"
        );
        assert!(error.is_recoverable());

        controller.renderer_mut().fail_set_camera = false;
        let next = controller.handle_pose_sample(sample([2., 0., 0.], 100, 8));
        assert!(matches!(next, SampleOutcome::Delivered(ModeOutput::Camera(_))));
    }

    #[test]
    fn non_finite_samples_never_reach_the_renderer() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        let dropped = controller.handle_pose_sample(sample([f64::NAN, 0., 0.], 0, 3));
        let SampleOutcome::Failed(error) = dropped else {
            panic!("expected a failure, got {dropped:?}");
        };
        insta::assert_snapshot!(
            error,
            @"mode camera-following failed to handle sample 3: invalid rigid transform: sample position contains NaN or infinite entries"
        );
        assert_eq!(controller.renderer().set_camera_count(), 0);

        // the rejected sample did not use up the throttle window
        let next = controller.handle_pose_sample(sample([2., 0., 0.], 0, 4));
        assert!(matches!(next, SampleOutcome::Delivered(ModeOutput::Camera(_))));
        assert!(controller.renderer().camera_of("axial").is_finite());
    }

    #[test]
    fn nan_volume_bounds_are_ignored() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        controller.renderer_mut().bounds = Some(Bounds {
            min: c(f64::NAN, 0., 0.),
            max: c(10., 10., 10.),
        });
        let outcome = controller.handle_pose_sample(sample([50., 0., 0.], 0, 0));
        let SampleOutcome::Delivered(ModeOutput::Camera(update)) = outcome else {
            panic!("expected a camera update, got {outcome:?}");
        };
        assert!(!update.clamped);
        assert_relative_eq!(controller.renderer().camera_of("axial").focal_point, c(50., 0., 0.));
    }

    #[test]
    fn same_mode_is_a_no_op_unless_forced() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        controller.handle_pose_sample(sample([10., 0., 0.], 0, 0));
        fn last_applied(
            controller: &NavigationController<RecordingRenderer>,
        ) -> Option<Coordinate<Image>> {
            match controller.mode() {
                Some(Mode::CameraFollowing(mode)) => mode.last_applied_position(),
                other => panic!("unexpected mode {other:?}"),
            }
        }
        assert!(last_applied(&controller).is_some());

        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        assert!(last_applied(&controller).is_some());

        controller.set_mode_kind(ModeKind::CameraFollowing, true);
        assert!(last_applied(&controller).is_none());
    }

    #[test]
    fn forced_reentry_captures_cameras_once_the_renderer_is_ready() {
        init_tracing();
        let mut controller =
            NavigationController::new(RecordingRenderer::empty(), NavigationConfig::default())
                .expect("valid config");
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        let has_baseline = |controller: &NavigationController<RecordingRenderer>| {
            matches!(controller.mode(), Some(Mode::CameraFollowing(mode)) if mode.has_baseline())
        };
        assert!(!has_baseline(&controller));

        *controller.renderer_mut() = RecordingRenderer::standard();
        controller.set_mode_kind(ModeKind::CameraFollowing, true);
        assert!(has_baseline(&controller));
    }

    #[test]
    fn switch_requested_during_an_update_waits_for_it_to_finish() {
        let mut controller = controller();
        controller.set_mode_kind(ModeKind::CameraFollowing, false);
        let requests = controller.mode_requests();
        controller.renderer_mut().on_set_camera = Some(Box::new(move || {
            requests.request(ModeKind::InstrumentProjection, false);
        }));

        let outcome = controller.handle_pose_sample(sample([10., 0., 0.], 0, 0));
        // all four following cameras were moved, so camera following ran to completion
        let SampleOutcome::Delivered(ModeOutput::Camera(update)) = outcome else {
            panic!("expected a camera update, got {outcome:?}");
        };
        assert_eq!(update.cameras.len(), 4);
        assert_eq!(controller.active_mode(), Some(ModeKind::InstrumentProjection));
        assert!(!controller.mode_requests().is_pending());

        let outcome = controller.handle_pose_sample(sample([0., 0., -20.], 100, 1));
        let SampleOutcome::Delivered(ModeOutput::Projection(projections)) = outcome else {
            panic!("expected projections, got {outcome:?}");
        };
        assert_eq!(
            projections[0].instruction,
            ProjectionInstruction::Crossing {
                point: c(0., 0., 0.)
            }
        );
    }

    #[test]
    fn requests_by_name_are_validated() {
        let controller = controller();
        let requests = controller.mode_requests();
        assert!(requests.request_by_name("surface-matching", false).is_err());
        assert!(!requests.is_pending());
        assert_eq!(
            requests.request_by_name("instrument_projection", false),
            Ok(ModeKind::InstrumentProjection)
        );
        assert!(requests.is_pending());
    }

    #[test]
    fn start_and_stop_navigation() {
        let mut controller = controller();
        let mut stream = FakeStream::default();

        controller.start_navigation(&mut stream);
        assert!(controller.is_navigating());
        assert_eq!(controller.active_mode(), Some(ModeKind::CameraFollowing));
        assert_eq!(stream.active.get(), 1);

        // restarting replaces the subscription rather than stacking a second one
        controller.start_navigation(&mut stream);
        assert_eq!((stream.active.get(), stream.subscribed.get()), (1, 2));

        controller.mode_requests().request(ModeKind::InstrumentProjection, false);
        controller.stop_navigation();
        assert!(!controller.is_navigating());
        assert_eq!(stream.active.get(), 0);
        assert_eq!(controller.active_mode(), None);
        assert!(!controller.mode_requests().is_pending());
        assert_eq!(
            controller.handle_pose_sample(sample([0., 0., 0.], 0, 0)),
            SampleOutcome::NoActiveMode
        );

        // stopping twice is harmless
        controller.stop_navigation();
    }
}
