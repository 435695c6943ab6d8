//! Test doubles shared by the unit tests.

use crate::coordinate_systems::Image;
use crate::coordinates::Coordinate;
use crate::error::RenderError;
use crate::pose::{ImageFramePose, Orientation, PoseSample};
use crate::rendering::{
    Bounds, CameraPose, ProjectionOverlay, Renderer, ScreenPoint, ViewingPlane, ViewportId,
    ViewportInfo, ViewportKind,
};
use crate::vectors::Vector;
use std::collections::BTreeMap;

/// Installs a test-friendly subscriber. Repeated calls are harmless.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Call {
    SetCamera(ViewportId, CameraPose),
    DrawProjection(ViewportId),
    ClearOverlay(ViewportId),
    Render(ViewportId),
}

/// An in-memory renderer that records every command it receives.
pub(crate) struct RecordingRenderer {
    pub(crate) viewports: Option<Vec<ViewportInfo>>,
    pub(crate) cameras: BTreeMap<ViewportId, CameraPose>,
    pub(crate) planes: BTreeMap<ViewportId, ViewingPlane>,
    pub(crate) bounds: Option<Bounds>,
    pub(crate) overlays: BTreeMap<ViewportId, ProjectionOverlay>,
    pub(crate) calls: Vec<Call>,
    pub(crate) fail_set_camera: bool,
    /// Runs after every successful `set_camera`.
    pub(crate) on_set_camera: Option<Box<dyn FnMut()>>,
}

pub(crate) fn c(x: f64, y: f64, z: f64) -> Coordinate<Image> {
    Coordinate::from_millimeters([x, y, z])
}

impl RecordingRenderer {
    /// A renderer that is not ready: no viewports, no volume.
    pub(crate) fn empty() -> Self {
        Self {
            viewports: None,
            cameras: BTreeMap::new(),
            planes: BTreeMap::new(),
            bounds: None,
            overlays: BTreeMap::new(),
            calls: Vec::new(),
            fail_set_camera: false,
            on_set_camera: None,
        }
    }

    /// A typical layout: three orthogonal slices through the origin, a raw stack, and a 3D
    /// view, over a 200 mm cube centred on the origin.
    pub(crate) fn standard() -> Self {
        let mut renderer = Self::empty();
        renderer.viewports = Some(vec![
            ViewportInfo::new("axial", ViewportKind::OrthogonalSlice),
            ViewportInfo::new("sagittal", ViewportKind::OrthogonalSlice),
            ViewportInfo::new("coronal", ViewportKind::OrthogonalSlice),
            ViewportInfo::new("stack", ViewportKind::Stack),
            ViewportInfo::new("3d", ViewportKind::Volume3d),
        ]);
        for (id, normal) in [
            ("axial", Vector::z_axis()),
            ("sagittal", Vector::x_axis()),
            ("coronal", Vector::y_axis()),
        ] {
            renderer.planes.insert(
                ViewportId::new(id),
                ViewingPlane::new(normal, c(0., 0., 0.), id).expect("unit normal"),
            );
        }
        for (id, position, up) in [
            ("axial", c(0., 0., 300.), Vector::y_axis()),
            ("sagittal", c(300., 0., 0.), Vector::z_axis()),
            ("coronal", c(0., 300., 0.), Vector::z_axis()),
            ("stack", c(0., 0., 500.), Vector::y_axis()),
            ("3d", c(0., -400., 0.), Vector::z_axis()),
        ] {
            renderer.cameras.insert(
                ViewportId::new(id),
                CameraPose {
                    focal_point: c(0., 0., 0.),
                    position,
                    view_up: up,
                },
            );
        }
        renderer.bounds = Some(Bounds::from_corners(
            c(-100., -100., -100.),
            c(100., 100., 100.),
        ));
        renderer
    }

    pub(crate) fn camera_of(&self, id: &str) -> CameraPose {
        self.cameras[&ViewportId::new(id)]
    }

    pub(crate) fn set_camera_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|call| matches!(call, Call::SetCamera(..)))
            .count()
    }

    pub(crate) fn set_camera_calls_for(&self, id: &str) -> Vec<CameraPose> {
        let id = ViewportId::new(id);
        self.calls
            .iter()
            .filter_map(|call| match call {
                Call::SetCamera(viewport, camera) if *viewport == id => Some(*camera),
                _ => None,
            })
            .collect()
    }
}

impl Renderer for RecordingRenderer {
    fn viewports(&self) -> Option<Vec<ViewportInfo>> {
        self.viewports.clone()
    }

    fn camera(&self, viewport: &ViewportId) -> Option<CameraPose> {
        self.cameras.get(viewport).copied()
    }

    fn set_camera(
        &mut self,
        viewport: &ViewportId,
        camera: CameraPose,
    ) -> Result<(), RenderError> {
        if self.fail_set_camera {
            return Err(RenderError(format!("{viewport} refused the camera")));
        }
        self.cameras.insert(viewport.clone(), camera);
        self.calls.push(Call::SetCamera(viewport.clone(), camera));
        if let Some(hook) = self.on_set_camera.as_mut() {
            hook();
        }
        Ok(())
    }

    fn viewing_plane(&self, viewport: &ViewportId) -> Option<ViewingPlane> {
        self.planes.get(viewport).cloned()
    }

    fn volume_bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    fn project_to_screen(
        &self,
        _viewport: &ViewportId,
        point: Coordinate<Image>,
    ) -> Option<ScreenPoint> {
        let [x, y, _] = point.to_millimeters();
        Some(ScreenPoint { x, y })
    }

    fn draw_projection(
        &mut self,
        viewport: &ViewportId,
        overlay: &ProjectionOverlay,
    ) -> Result<(), RenderError> {
        self.overlays.insert(viewport.clone(), overlay.clone());
        self.calls.push(Call::DrawProjection(viewport.clone()));
        Ok(())
    }

    fn clear_overlay(&mut self, viewport: &ViewportId) {
        self.overlays.remove(viewport);
        self.calls.push(Call::ClearOverlay(viewport.clone()));
    }

    fn render(&mut self, viewport: &ViewportId) {
        self.calls.push(Call::Render(viewport.clone()));
    }
}

/// An image-frame pose at `position`, shaft along `forward` and "up" along `up`.
pub(crate) fn image_pose(
    position: Coordinate<Image>,
    up: Vector<Image>,
    forward: Vector<Image>,
) -> ImageFramePose {
    ImageFramePose {
        position,
        orientation: Some(Orientation::from_axes(up.cross(&forward), up, forward)),
        timestamp_ms: 0,
        sequence_id: 0,
    }
}

pub(crate) fn position_only(position: Coordinate<Image>) -> ImageFramePose {
    ImageFramePose {
        position,
        orientation: None,
        timestamp_ms: 0,
        sequence_id: 0,
    }
}

/// A register-frame sample with the instrument aligned to the frame axes.
pub(crate) fn sample(position: [f64; 3], timestamp_ms: u64, sequence_id: u64) -> PoseSample {
    PoseSample::new(
        Coordinate::from_millimeters(position),
        Some(Orientation::aligned()),
        timestamp_ms,
        sequence_id,
    )
}
