use std::collections::BTreeMap;
use surgnav::config::NavigationConfig;
use surgnav::controller::{NavigationController, SampleOutcome};
use surgnav::math::{RigidBodyTransform, Rotation};
use surgnav::modes::{ModeOutput, ProjectionInstruction};
use surgnav::pose::{Orientation, PoseSample};
use surgnav::rendering::{
    Bounds, CameraPose, ProjectionOverlay, Renderer, ScreenPoint, ViewingPlane, ViewportId,
    ViewportInfo, ViewportKind,
};
use surgnav::systems::{Image, Register};
use surgnav::{Coordinate, RenderError, Vector};

/// A stand-in for the image viewer: one axial slice through the origin and one 3D view of a
/// 200 mm cube.
struct Viewer {
    cameras: BTreeMap<ViewportId, CameraPose>,
    overlays: BTreeMap<ViewportId, ProjectionOverlay>,
}

impl Viewer {
    fn new() -> Self {
        let looking_down = |position: [f64; 3], view_up: Vector<Image>| CameraPose {
            focal_point: Coordinate::origin(),
            position: Coordinate::from_millimeters(position),
            view_up,
        };
        let cameras = BTreeMap::from([
            (
                ViewportId::new("axial"),
                looking_down([0., 0., 300.], Vector::y_axis()),
            ),
            (
                ViewportId::new("3d"),
                looking_down([0., -400., 0.], Vector::z_axis()),
            ),
        ]);
        Self {
            cameras,
            overlays: BTreeMap::new(),
        }
    }
}

impl Renderer for Viewer {
    fn viewports(&self) -> Option<Vec<ViewportInfo>> {
        Some(vec![
            ViewportInfo::new("axial", ViewportKind::OrthogonalSlice),
            ViewportInfo::new("3d", ViewportKind::Volume3d),
        ])
    }

    fn camera(&self, viewport: &ViewportId) -> Option<CameraPose> {
        self.cameras.get(viewport).copied()
    }

    fn set_camera(&mut self, viewport: &ViewportId, camera: CameraPose) -> Result<(), RenderError> {
        match self.cameras.get_mut(viewport) {
            Some(slot) => {
                *slot = camera;
                Ok(())
            }
            None => Err(RenderError(format!("no viewport {viewport}"))),
        }
    }

    fn viewing_plane(&self, viewport: &ViewportId) -> Option<ViewingPlane> {
        (viewport.0 == "axial")
            .then(|| ViewingPlane::new(Vector::z_axis(), Coordinate::origin(), "axial").ok())
            .flatten()
    }

    fn volume_bounds(&self) -> Option<Bounds> {
        Some(Bounds::from_corners(
            Coordinate::from_millimeters([-100.; 3]),
            Coordinate::from_millimeters([100.; 3]),
        ))
    }

    fn project_to_screen(
        &self,
        _viewport: &ViewportId,
        point: Coordinate<Image>,
    ) -> Option<ScreenPoint> {
        // the axial slice is drawn 1:1 with +x to the right and +y up
        let [x, y, _] = point.to_millimeters();
        Some(ScreenPoint { x, y })
    }

    fn draw_projection(
        &mut self,
        viewport: &ViewportId,
        overlay: &ProjectionOverlay,
    ) -> Result<(), RenderError> {
        self.overlays.insert(viewport.clone(), overlay.clone());
        Ok(())
    }

    fn clear_overlay(&mut self, viewport: &ViewportId) {
        self.overlays.remove(viewport);
    }

    fn render(&mut self, _viewport: &ViewportId) {}
}

fn main() {
    // the tracker is mounted turned a quarter turn about the table's vertical axis, and its
    // origin sits 50 mm above the image origin. registration produced this transform:
    let register_to_image = RigidBodyTransform::<Register, Image>::build(
        Rotation::try_from_rows([[0., -1., 0.], [1., 0., 0.], [0., 0., 1.]])
            .expect("a quarter turn is orthonormal"),
        [0., 0., -50.],
    )
    .expect("translation is finite");

    let mut navigation = NavigationController::new(Viewer::new(), NavigationConfig::default())
        .expect("default configuration is valid");
    navigation.load_transform(register_to_image);

    // the tracker reports in its own frame, with the instrument pointing along its +z
    let reading = |position: [f64; 3], timestamp_ms: u64, sequence_id: u64| {
        PoseSample::new(
            Coordinate::<Register>::from_millimeters(position),
            Some(Orientation::aligned()),
            timestamp_ms,
            sequence_id,
        )
    };

    // nothing listens until a mode is chosen
    assert_eq!(
        navigation.handle_pose_sample(reading([10., 0., 60.], 0, 0)),
        SampleOutcome::NoActiveMode
    );

    navigation
        .set_mode("camera-following", false)
        .expect("camera-following is a known mode");

    // (10, 0, 60) in the tracker is (0, 10, 10) in the images; every camera now looks at it
    // from the same distance and direction as before
    let SampleOutcome::Delivered(ModeOutput::Camera(update)) =
        navigation.handle_pose_sample(reading([10., 0., 60.], 0, 1))
    else {
        panic!("the first sample moves the cameras");
    };
    assert!(!update.clamped);
    let axial = navigation.renderer().cameras[&ViewportId::new("axial")];
    assert!(axial.focal_point.distance_to(&Coordinate::from_millimeters([0., 10., 10.])) < 1e-9);
    assert!((axial.distance() - 300.).abs() < 1e-9);

    // the default 20 Hz target rate leaves room for one update every 50 ms
    assert_eq!(
        navigation.handle_pose_sample(reading([20., 0., 60.], 20, 2)),
        SampleOutcome::Throttled
    );

    // jitter below half a millimetre does not move anything
    assert_eq!(
        navigation.handle_pose_sample(reading([10.2, 0., 60.], 100, 3)),
        SampleOutcome::Delivered(ModeOutput::Gated)
    );

    // a reading the tracker could not resolve is refused before it reaches the viewer
    let garbled = navigation.handle_pose_sample(reading([f64::NAN, 0., 60.], 150, 4));
    assert!(matches!(garbled, SampleOutcome::Failed(_)));
    let axial = navigation.renderer().cameras[&ViewportId::new("axial")];
    assert!(axial.is_finite());

    // switch to drawing the instrument on the slice instead
    navigation
        .set_mode("instrument-projection", false)
        .expect("instrument-projection is a known mode");

    // the tip is 20 mm below the axial slice, pointing up through it
    let SampleOutcome::Delivered(ModeOutput::Projection(projections)) =
        navigation.handle_pose_sample(reading([10., 0., 30.], 200, 5))
    else {
        panic!("projection mode reports one decision per slice");
    };
    assert_eq!(projections.len(), 1);
    let ProjectionInstruction::Crossing { point } = projections[0].instruction else {
        panic!("the shaft crosses the axial slice");
    };
    assert!(point.distance_to(&Coordinate::from_millimeters([0., 10., 0.])) < 1e-9);

    let overlay = &navigation.renderer().overlays[&ViewportId::new("axial")];
    assert_eq!(overlay.screen_points, vec![ScreenPoint { x: 0., y: 10. }]);

    navigation.set_mode("camera-following", false).expect("known mode");
    assert!(navigation.renderer().overlays.is_empty());
}
