//! Keeps viewport cameras centred on the tracked instrument.
//!
//! Every eligible viewport keeps its camera distance. In 3-DOF tracking the camera also keeps
//! its viewing direction and up vector and is simply carried along with the instrument; in
//! 6-DOF tracking it looks down the instrument's shaft with the instrument's "up" on top.

use super::{ModeKind, ModeOutput, NavigationMode};
use crate::config::{CameraTracking, NavigationConfig};
use crate::coordinate_systems::Image;
use crate::coordinates::Coordinate;
use crate::error::{NavigationError, Result};
use crate::pose::{ImageFramePose, Orientation};
use crate::rendering::{CameraPose, Renderer, ViewportId, ViewportInfo, ViewportKind};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Moves `camera` so that it looks at `target`, keeping its distance, direction, and up vector.
///
/// A camera sitting on its own focal point has no direction to keep and stays on the target.
#[must_use]
pub fn follow_position(camera: &CameraPose, target: Coordinate<Image>) -> CameraPose {
    let position = match camera.view_direction() {
        Some(direction) => target + direction * camera.distance(),
        None => target,
    };
    CameraPose {
        focal_point: target,
        position,
        view_up: camera.view_up,
    }
}

/// Moves `camera` so that it looks at `target` down the instrument's forward axis.
///
/// The camera keeps its distance to the focal point. Fails with
/// [`NavigationError::DegenerateOrientation`] if either the up or the forward axis of
/// `orientation` has no usable direction, in which case nothing should be applied.
pub fn follow_pose(
    camera: &CameraPose,
    target: Coordinate<Image>,
    orientation: &Orientation<Image>,
) -> Result<CameraPose> {
    let up = orientation.up()?;
    let forward = orientation.forward()?;
    Ok(CameraPose {
        focal_point: target,
        position: target - forward * camera.distance(),
        view_up: up,
    })
}

/// The cameras applied for one sample.
#[derive(Clone, Debug, PartialEq)]
pub struct CameraUpdate {
    pub cameras: Vec<(ViewportId, CameraPose)>,
    /// The focal point every camera was moved to, after clamping.
    pub target: Coordinate<Image>,
    /// Whether the tracked position had to be clamped into the volume.
    pub clamped: bool,
    /// Whether 6-DOF tracking fell back to position-only for this sample.
    pub orientation_fallback: bool,
}

/// Viewports whose camera follows the instrument. Raw stacks have no free camera.
fn follows(viewport: &ViewportInfo) -> bool {
    viewport.kind != ViewportKind::Stack
}

#[derive(Clone, Debug)]
pub struct CameraFollowingMode {
    tracking: CameraTracking,
    movement_threshold_mm: f64,
    bounds_margin_mm: f64,
    restore_on_exit: bool,
    last_applied: Option<Coordinate<Image>>,
    /// Cameras as they were on entry; `None` until the renderer has had viewports to capture.
    baseline: Option<BTreeMap<ViewportId, CameraPose>>,
}

impl CameraFollowingMode {
    #[must_use]
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            tracking: config.camera_tracking,
            movement_threshold_mm: config.movement_threshold_mm,
            bounds_margin_mm: config.bounds_margin_mm,
            restore_on_exit: config.restore_cameras_on_exit,
            last_applied: None,
            baseline: None,
        }
    }

    #[must_use]
    pub fn tracking(&self) -> CameraTracking {
        self.tracking
    }

    /// The focal point most recently applied, if any update got through since `enter`.
    #[must_use]
    pub fn last_applied_position(&self) -> Option<Coordinate<Image>> {
        self.last_applied
    }

    #[must_use]
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    fn capture_baseline(&mut self, renderer: &dyn Renderer) {
        let Some(viewports) = renderer.viewports() else {
            debug!("renderer has no viewports yet; deferring camera capture");
            return;
        };
        let baseline: BTreeMap<_, _> = viewports
            .iter()
            .filter(|viewport| follows(viewport))
            .filter_map(|viewport| {
                renderer
                    .camera(&viewport.id)
                    .map(|camera| (viewport.id.clone(), camera))
            })
            .collect();
        debug!(viewports = baseline.len(), "captured baseline cameras");
        self.baseline = Some(baseline);
    }

    /// Works out which orientation (if any) to steer the cameras by.
    ///
    /// Returns the orientation to use and whether the sample had to fall back to 3-DOF.
    fn steering_orientation(
        &self,
        pose: &ImageFramePose,
    ) -> (Option<Orientation<Image>>, bool) {
        if self.tracking == CameraTracking::ThreeDof {
            return (None, false);
        }
        match pose.orientation {
            Some(orientation) => match orientation.up().and(orientation.forward()) {
                Ok(_) => (Some(orientation), false),
                Err(error) => {
                    warn!(
                        sequence_id = pose.sequence_id,
                        %error,
                        "degenerate orientation; following position only"
                    );
                    (None, true)
                }
            },
            None => {
                warn!(
                    sequence_id = pose.sequence_id,
                    "sample carries no orientation; following position only"
                );
                (None, true)
            }
        }
    }
}

impl NavigationMode for CameraFollowingMode {
    fn kind(&self) -> ModeKind {
        ModeKind::CameraFollowing
    }

    fn enter(&mut self, renderer: &mut dyn Renderer) {
        self.last_applied = None;
        self.baseline = None;
        self.capture_baseline(renderer);
        info!(tracking = ?self.tracking, "camera following entered");
    }

    fn exit(&mut self, renderer: &mut dyn Renderer) {
        if self.restore_on_exit {
            if let Some(baseline) = &self.baseline {
                for (viewport, camera) in baseline {
                    match renderer.set_camera(viewport, *camera) {
                        Ok(()) => renderer.render(viewport),
                        Err(error) => warn!(%viewport, %error, "could not restore camera"),
                    }
                }
            }
        }
        info!("camera following exited");
    }

    fn cleanup(&mut self, _renderer: &mut dyn Renderer) {
        self.last_applied = None;
        self.baseline = None;
    }

    fn handle_update(
        &mut self,
        renderer: &mut dyn Renderer,
        pose: &ImageFramePose,
    ) -> Result<ModeOutput> {
        if self.baseline.is_none() {
            self.capture_baseline(renderer);
        }
        let Some(viewports) = renderer.viewports().filter(|_| self.baseline.is_some()) else {
            debug!(sequence_id = pose.sequence_id, "renderer not ready");
            return Ok(ModeOutput::NotReady);
        };

        let mut target = pose.position;
        if !target.is_finite() {
            return Err(NavigationError::invalid_transform(
                "instrument position contains NaN or infinite entries",
            ));
        }
        let mut clamped = false;
        let bounds = renderer.volume_bounds().filter(|bounds| {
            if !bounds.is_finite() {
                warn!(sequence_id = pose.sequence_id, ?bounds, "ignoring non-finite volume bounds");
            }
            bounds.is_finite()
        });
        if let Some(bounds) = bounds {
            let inside = bounds.shrunk_by(self.bounds_margin_mm).clamp(target);
            if inside != target {
                let [x, y, z] = target.to_millimeters();
                debug!(
                    sequence_id = pose.sequence_id,
                    error = %NavigationError::OutOfBounds { x, y, z },
                    "clamped into the volume"
                );
                target = inside;
                clamped = true;
            }
        }

        if let Some(last) = self.last_applied {
            if last.distance_to(&target) < self.movement_threshold_mm {
                return Ok(ModeOutput::Gated);
            }
        }

        let (orientation, orientation_fallback) = self.steering_orientation(pose);
        let mut cameras = Vec::new();
        for viewport in viewports.iter().filter(|viewport| follows(viewport)) {
            let Some(camera) = renderer.camera(&viewport.id) else {
                continue;
            };
            let updated = match &orientation {
                Some(orientation) => follow_pose(&camera, target, orientation)?,
                None => follow_position(&camera, target),
            };
            renderer.set_camera(&viewport.id, updated)?;
            renderer.render(&viewport.id);
            cameras.push((viewport.id.clone(), updated));
        }

        self.last_applied = Some(target);
        Ok(ModeOutput::Camera(CameraUpdate {
            cameras,
            target,
            clamped,
            orientation_fallback,
        }))
    }
}
