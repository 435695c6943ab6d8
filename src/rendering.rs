//! The narrow contract between the navigation engine and whatever draws the images.
//!
//! The engine never reaches into rendering internals. It asks the [`Renderer`] for cameras,
//! planes, and bounds, and hands back new cameras or overlay instructions as plain data.

use crate::coordinate_systems::Image;
use crate::coordinates::Coordinate;
use crate::error::{NavigationError, RenderError, Result};
use crate::modes::instrument_projection::ProjectionInstruction;
use crate::vectors::Vector;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ViewportId(pub String);

impl ViewportId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ViewportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ViewportId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What a viewport shows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ViewportKind {
    /// An orthogonal slice (axial, sagittal, coronal, or oblique) through the volume.
    OrthogonalSlice,
    /// A raw stack of 2D images with no definite slice plane.
    Stack,
    /// A free 3D rendering of the volume.
    Volume3d,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ViewportInfo {
    pub id: ViewportId,
    pub kind: ViewportKind,
}

impl ViewportInfo {
    pub fn new(id: impl Into<String>, kind: ViewportKind) -> Self {
        Self {
            id: ViewportId::new(id),
            kind,
        }
    }
}

/// A viewing camera in the image frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraPose {
    pub focal_point: Coordinate<Image>,
    pub position: Coordinate<Image>,
    pub view_up: Vector<Image>,
}

impl CameraPose {
    /// Distance from the camera to its focal point, in millimetres.
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.position.distance_to(&self.focal_point)
    }

    /// Unit vector from the focal point towards the camera, if the two are apart.
    #[must_use]
    pub fn view_direction(&self) -> Option<Vector<Image>> {
        (self.position - self.focal_point).normalized()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.focal_point.is_finite() && self.position.is_finite() && self.view_up.is_finite()
    }
}

#[cfg(any(test, feature = "approx"))]
impl approx::AbsDiffEq for CameraPose {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-6
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.focal_point.abs_diff_eq(&other.focal_point, epsilon)
            && self.position.abs_diff_eq(&other.position, epsilon)
            && self.view_up.abs_diff_eq(&other.view_up, epsilon)
    }
}

/// A planar image slice, given by a unit normal and a point on the plane.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewingPlane {
    normal: Vector<Image>,
    point_on_plane: Coordinate<Image>,
    plane_id: String,
}

impl ViewingPlane {
    /// Constructs a plane, normalising `normal`.
    ///
    /// A zero-length or non-finite normal does not describe a plane and is rejected.
    pub fn new(
        normal: Vector<Image>,
        point_on_plane: Coordinate<Image>,
        plane_id: impl Into<String>,
    ) -> Result<Self> {
        let normal = normal
            .normalized()
            .ok_or_else(|| NavigationError::invalid_transform("viewing plane normal has no direction"))?;
        if !point_on_plane.is_finite() {
            return Err(NavigationError::invalid_transform(
                "viewing plane point contains NaN or infinite entries",
            ));
        }
        Ok(Self {
            normal,
            point_on_plane,
            plane_id: plane_id.into(),
        })
    }

    #[must_use]
    pub fn normal(&self) -> Vector<Image> {
        self.normal
    }

    #[must_use]
    pub fn point_on_plane(&self) -> Coordinate<Image> {
        self.point_on_plane
    }

    #[must_use]
    pub fn plane_id(&self) -> &str {
        &self.plane_id
    }

    /// Signed distance of `point` from the plane along the normal, in millimetres.
    #[must_use]
    pub fn signed_distance(&self, point: Coordinate<Image>) -> f64 {
        self.normal.dot(&(point - self.point_on_plane))
    }

    /// Orthogonal projection of `point` onto the plane.
    #[must_use]
    pub fn project_point(&self, point: Coordinate<Image>) -> Coordinate<Image> {
        point - self.normal * self.signed_distance(point)
    }
}

/// Axis-aligned bounding box of the loaded volume, in the image frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Coordinate<Image>,
    pub max: Coordinate<Image>,
}

impl Bounds {
    /// Constructs bounds from two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: Coordinate<Image>, b: Coordinate<Image>) -> Self {
        let [ax, ay, az] = a.to_millimeters();
        let [bx, by, bz] = b.to_millimeters();
        Self {
            min: Coordinate::from_millimeters([ax.min(bx), ay.min(by), az.min(bz)]),
            max: Coordinate::from_millimeters([ax.max(bx), ay.max(by), az.max(bz)]),
        }
    }

    #[must_use]
    pub fn contains(&self, point: Coordinate<Image>) -> bool {
        let p = point.to_millimeters();
        let min = self.min.to_millimeters();
        let max = self.max.to_millimeters();
        (0..3).all(|i| min[i] <= p[i] && p[i] <= max[i])
    }

    #[must_use]
    pub fn center(&self) -> Coordinate<Image> {
        self.min.lerp(&self.max, 0.5)
    }

    /// The bounds moved inwards by `margin_mm` on every side.
    ///
    /// Along any axis thinner than twice the margin the result collapses onto the centre.
    #[must_use]
    pub fn shrunk_by(&self, margin_mm: f64) -> Self {
        let min = self.min.to_millimeters();
        let max = self.max.to_millimeters();
        let mut lo = [0.; 3];
        let mut hi = [0.; 3];
        for i in 0..3 {
            if max[i] - min[i] >= 2. * margin_mm {
                lo[i] = min[i] + margin_mm;
                hi[i] = max[i] - margin_mm;
            } else {
                let mid = 0.5 * (min[i] + max[i]);
                lo[i] = mid;
                hi[i] = mid;
            }
        }
        Self {
            min: Coordinate::from_millimeters(lo),
            max: Coordinate::from_millimeters(hi),
        }
    }

    /// Whether both corners are finite. Bounds that are not describe no usable volume.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.min.is_finite() && self.max.is_finite()
    }

    /// Clamps `point` component-wise into the bounds.
    ///
    /// A NaN bound leaves that component of `point` unconstrained; this never panics.
    #[must_use]
    pub fn clamp(&self, point: Coordinate<Image>) -> Coordinate<Image> {
        let p = point.to_millimeters();
        let min = self.min.to_millimeters();
        let max = self.max.to_millimeters();
        // `f64::max`/`f64::min` ignore a NaN operand, unlike `f64::clamp`
        Coordinate::from_millimeters([
            p[0].max(min[0]).min(max[0]),
            p[1].max(min[1]).min(max[1]),
            p[2].max(min[2]).min(max[2]),
        ])
    }
}

/// A position on screen, in viewport pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

/// How the projected instrument axis should be stroked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineStyle {
    /// The axis passes through the slice; draw it solid with a marker at the crossing.
    Solid,
    /// The axis runs within the slice rather than through it.
    Dashed,
}

/// Everything the renderer needs to draw the instrument on one viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionOverlay {
    pub plane_id: String,
    pub instruction: ProjectionInstruction,
    pub style: LineStyle,
    /// The instruction's points mapped to the screen, in the order the instruction lists them.
    /// Points the renderer could not project are omitted.
    pub screen_points: Vec<ScreenPoint>,
}

/// The rendering collaborator.
///
/// Implementations are driven synchronously from the navigation update; none of these calls
/// may block.
pub trait Renderer {
    /// The viewports currently on screen, or `None` if the renderer is not ready yet.
    fn viewports(&self) -> Option<Vec<ViewportInfo>>;

    fn camera(&self, viewport: &ViewportId) -> Option<CameraPose>;

    fn set_camera(
        &mut self,
        viewport: &ViewportId,
        camera: CameraPose,
    ) -> std::result::Result<(), RenderError>;

    /// The slice plane shown by `viewport`, if it shows one.
    fn viewing_plane(&self, viewport: &ViewportId) -> Option<ViewingPlane>;

    /// The bounding box of the active volume, if one is loaded.
    fn volume_bounds(&self) -> Option<Bounds>;

    fn project_to_screen(
        &self,
        viewport: &ViewportId,
        point: Coordinate<Image>,
    ) -> Option<ScreenPoint>;

    fn draw_projection(
        &mut self,
        viewport: &ViewportId,
        overlay: &ProjectionOverlay,
    ) -> std::result::Result<(), RenderError>;

    /// Removes any instrument overlay from `viewport`. Clearing an empty viewport is a no-op.
    fn clear_overlay(&mut self, viewport: &ViewportId);

    /// Requests a redraw of `viewport`.
    fn render(&mut self, viewport: &ViewportId);
}
