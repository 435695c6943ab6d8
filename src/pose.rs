//! Pose samples as they arrive from the tracker, and the instrument model derived from them.
//!
//! The tracker is not consistent about how it shapes an orientation: depending on the source
//! it may be a nested 3x3 matrix, a flat 9- or 16-element array, a nested 4x4 homogeneous
//! matrix, or a quaternion. [`RawRotation`] accepts all of them and [`RawRotation::normalize`]
//! turns them into the one representation the rest of the crate works with, an
//! [`Orientation`]. Nothing past this module ever looks at the original array shape.

use crate::coordinates::Coordinate;
use crate::coordinate_systems::{CoordinateSystem, Register};
use crate::error::{NavigationError, Result};
use crate::math::{RigidBodyTransform, Rotation};
use crate::vectors::Vector;
use crate::Matrix3;
use std::fmt;
use std::marker::PhantomData;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Index of the orientation row holding the instrument's "up" axis.
pub const UP_ROW: usize = 1;
/// Index of the orientation row holding the instrument's forward (shaft) axis.
pub const FORWARD_ROW: usize = 2;

/// The orientation of the tracked instrument in frame `In`.
///
/// Stored row-major; each row is one of the instrument's body axes expressed in `In`. The
/// mapping of rows to axes is fixed: row [`UP_ROW`] is "up" and row [`FORWARD_ROW`] is the
/// direction the shaft points in. Row 0 is the remaining lateral axis and is not used for
/// navigation.
///
/// Unlike [`Rotation`], an `Orientation` is _not_ validated: tracker data can be garbled, and
/// a garbled orientation must degrade navigation for one sample rather than be rejected
/// outright. Use [`Orientation::up`] and [`Orientation::forward`], which report degenerate axes.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Orientation<In> {
    pub(crate) rows: Matrix3,
    #[cfg_attr(feature = "serde", serde(skip))]
    system: PhantomData<In>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Orientation<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Orientation<In> {}

impl<In> PartialEq<Self> for Orientation<In> {
    fn eq(&self, other: &Self) -> bool {
        self.rows.eq(&other.rows)
    }
}

impl<In> Orientation<In> {
    pub(crate) fn from_matrix(rows: Matrix3) -> Self {
        Self {
            rows,
            system: PhantomData,
        }
    }

    /// Constructs an orientation from its rows.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self::from_matrix(Matrix3::from_row_slice(&rows.concat()))
    }

    /// Constructs an orientation directly from its body axes.
    pub fn from_axes(lateral: Vector<In>, up: Vector<In>, forward: Vector<In>) -> Self {
        Self::from_matrix(Matrix3::from_rows(&[
            lateral.inner.transpose(),
            up.inner.transpose(),
            forward.inner.transpose(),
        ]))
    }

    /// The orientation whose body axes coincide with the axes of `In`.
    #[must_use]
    pub fn aligned() -> Self {
        Self::from_matrix(Matrix3::identity())
    }

    #[must_use]
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.rows;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    fn row(&self, index: usize) -> Vector<In> {
        Vector::from_nalgebra_vector(self.rows.row(index).transpose())
    }

    /// The instrument's normalised "up" axis.
    pub fn up(&self) -> Result<Vector<In>> {
        self.row(UP_ROW)
            .normalized()
            .ok_or(NavigationError::DegenerateOrientation { axis: "up" })
    }

    /// The instrument's normalised forward (shaft) axis.
    pub fn forward(&self) -> Result<Vector<In>> {
        self.row(FORWARD_ROW)
            .normalized()
            .ok_or(NavigationError::DegenerateOrientation { axis: "forward" })
    }

    /// Re-expresses the orientation in another frame by rotating each body axis.
    #[must_use]
    pub fn transformed<To>(&self, transform: &RigidBodyTransform<In, To>) -> Orientation<To> {
        self.rotated(&transform.rotation())
    }

    #[must_use]
    pub fn rotated<To>(&self, rotation: &Rotation<In, To>) -> Orientation<To> {
        // every row is a vector in `In`: row' = R·row, so rows' = rows·Rᵀ
        Orientation::from_matrix(self.rows * rotation.inner.transpose())
    }

    pub(crate) fn retag<NewIn>(self) -> Orientation<NewIn> {
        Orientation::from_matrix(self.rows)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Orientation<In> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.rows.abs_diff_eq(&other.rows, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Orientation<In> {
    fn default_max_relative() -> Self::Epsilon {
        Matrix3::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.rows.relative_eq(&other.rows, epsilon, max_relative)
    }
}

/// An orientation exactly as the pose source delivered it.
///
/// With `serde`, this deserializes untagged, so a JSON/YAML document may carry any of the
/// accepted shapes.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum RawRotation {
    /// Row-major 3x3.
    Nested3x3([[f64; 3]; 3]),
    /// Row-major homogeneous 4x4; the translation column is ignored.
    Nested4x4([[f64; 4]; 4]),
    /// Row-major 3x3, flattened.
    Flat9([f64; 9]),
    /// Row-major homogeneous 4x4, flattened; the translation column is ignored.
    Flat16([f64; 16]),
    /// Unit quaternion. It is normalised on ingestion.
    Quaternion { w: f64, x: f64, y: f64, z: f64 },
}

impl RawRotation {
    /// Converts the raw orientation into the canonical row-major representation.
    ///
    /// Fails only on NaN/infinite input or a zero quaternion; a finite but non-orthonormal
    /// matrix is passed through for the modes to judge axis by axis.
    pub fn normalize<In>(&self) -> Result<Orientation<In>> {
        let rows: [[f64; 3]; 3] = match *self {
            Self::Nested3x3(rows) => rows,
            Self::Nested4x4(m) => [
                [m[0][0], m[0][1], m[0][2]],
                [m[1][0], m[1][1], m[1][2]],
                [m[2][0], m[2][1], m[2][2]],
            ],
            Self::Flat9(m) => [[m[0], m[1], m[2]], [m[3], m[4], m[5]], [m[6], m[7], m[8]]],
            Self::Flat16(m) => [[m[0], m[1], m[2]], [m[4], m[5], m[6]], [m[8], m[9], m[10]]],
            Self::Quaternion { w, x, y, z } => {
                return Rotation::<In, In>::try_from_quaternion(w, x, y, z)
                    .map(|rotation| Orientation::from_rows(rotation.rows()));
            }
        };
        if rows.iter().flatten().all(|v| v.is_finite()) {
            Ok(Orientation::from_rows(rows))
        } else {
            Err(NavigationError::invalid_transform(
                "orientation contains NaN or infinite entries",
            ))
        }
    }
}

/// A pose sample as delivered by the pose stream, before normalisation.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct RawPoseSample {
    pub position: [f64; 3],
    #[cfg_attr(feature = "serde", serde(default))]
    pub rotation: Option<RawRotation>,
    pub timestamp_ms: u64,
    pub sequence_id: u64,
}

/// One tracked pose of the instrument in the register frame.
///
/// Samples are handled exactly once and never retained past the update they drive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseSample {
    pub position: Coordinate<Register>,
    /// `None` for position-only (3-DOF) trackers.
    pub orientation: Option<Orientation<Register>>,
    pub timestamp_ms: u64,
    pub sequence_id: u64,
}

impl PoseSample {
    #[must_use]
    pub fn new(
        position: Coordinate<Register>,
        orientation: Option<Orientation<Register>>,
        timestamp_ms: u64,
        sequence_id: u64,
    ) -> Self {
        Self {
            position,
            orientation,
            timestamp_ms,
            sequence_id,
        }
    }

    /// Normalises a raw sample.
    ///
    /// The position must be finite; the orientation is normalised with
    /// [`RawRotation::normalize`].
    pub fn from_raw(raw: &RawPoseSample) -> Result<Self> {
        let position = Coordinate::from_millimeters(raw.position);
        if !position.is_finite() {
            return Err(NavigationError::invalid_transform(
                "position contains NaN or infinite entries",
            ));
        }
        let orientation = raw.rotation.as_ref().map(RawRotation::normalize::<Register>).transpose()?;
        Ok(Self::new(
            position,
            orientation,
            raw.timestamp_ms,
            raw.sequence_id,
        ))
    }
}

impl TryFrom<RawPoseSample> for PoseSample {
    type Error = NavigationError;

    fn try_from(raw: RawPoseSample) -> Result<Self> {
        Self::from_raw(&raw)
    }
}

/// A pose sample after it has been moved into some frame `In` (normally the image frame).
#[derive(Debug)]
pub struct FramePose<In> {
    pub position: Coordinate<In>,
    pub orientation: Option<Orientation<In>>,
    pub timestamp_ms: u64,
    pub sequence_id: u64,
}

impl<In> Clone for FramePose<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for FramePose<In> {}

/// What the modes consume: a pose already moved into the image frame.
pub type ImageFramePose = FramePose<crate::coordinate_systems::Image>;

/// The instrument modelled as a finite ray: `origin + t·axis` for `t ∈ [0, extension_length]`.
#[derive(Debug)]
pub struct ToolRepresentation<In> {
    origin: Coordinate<In>,
    axis: Vector<In>,
    extension_length: f64,
}

impl<In> Clone for ToolRepresentation<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for ToolRepresentation<In> {}

impl<In> ToolRepresentation<In> {
    /// Constructs the ray, normalising `axis`.
    ///
    /// Fails with [`NavigationError::DegenerateOrientation`] if the axis has no direction, and
    /// with [`NavigationError::InvalidConfig`] if the length is negative or not finite.
    pub fn new(origin: Coordinate<In>, axis: Vector<In>, extension_length: f64) -> Result<Self> {
        if !extension_length.is_finite() || extension_length < 0. {
            return Err(NavigationError::InvalidConfig(format!(
                "tool extension length must be finite and non-negative, got {extension_length}"
            )));
        }
        if !origin.is_finite() {
            return Err(NavigationError::invalid_transform(
                "tool origin contains NaN or infinite entries",
            ));
        }
        let axis = axis
            .normalized()
            .ok_or(NavigationError::DegenerateOrientation { axis: "forward" })?;
        Ok(Self {
            origin,
            axis,
            extension_length,
        })
    }

    /// Builds the ray from a tracked position and the forward axis of its orientation.
    pub fn from_pose(
        position: Coordinate<In>,
        orientation: &Orientation<In>,
        extension_length: f64,
    ) -> Result<Self> {
        Self::new(position, orientation.forward()?, extension_length)
    }

    #[must_use]
    pub fn origin(&self) -> Coordinate<In> {
        self.origin
    }

    /// Unit direction of the shaft.
    #[must_use]
    pub fn axis(&self) -> Vector<In> {
        self.axis
    }

    /// Visible length of the shaft in millimetres.
    #[must_use]
    pub fn extension_length(&self) -> f64 {
        self.extension_length
    }

    /// The far end of the visible segment.
    #[must_use]
    pub fn tip(&self) -> Coordinate<In> {
        self.point_at(self.extension_length)
    }

    #[must_use]
    pub fn point_at(&self, t: f64) -> Coordinate<In> {
        self.origin + self.axis * t
    }
}

impl<In> fmt::Display for ToolRepresentation<In>
where
    In: CoordinateSystem,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool from {} along {} for {:.1} mm",
            self.origin, self.axis, self.extension_length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_systems::Image;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const QUARTER_TURN_ABOUT_Z: [[f64; 3]; 3] = [[0., -1., 0.], [1., 0., 0.], [0., 0., 1.]];

    #[rstest]
    #[case::nested_3x3(RawRotation::Nested3x3(QUARTER_TURN_ABOUT_Z))]
    #[case::flat_9(RawRotation::Flat9([0., -1., 0., 1., 0., 0., 0., 0., 1.]))]
    #[case::flat_16(RawRotation::Flat16([
        0., -1., 0., 5.,
        1., 0., 0., 6.,
        0., 0., 1., 7.,
        0., 0., 0., 1.,
    ]))]
    #[case::nested_4x4(RawRotation::Nested4x4([
        [0., -1., 0., 5.],
        [1., 0., 0., 6.],
        [0., 0., 1., 7.],
        [0., 0., 0., 1.],
    ]))]
    #[case::quaternion(RawRotation::Quaternion {
        w: std::f64::consts::FRAC_1_SQRT_2,
        x: 0.,
        y: 0.,
        z: std::f64::consts::FRAC_1_SQRT_2,
    })]
    fn every_shape_normalizes_to_the_same_orientation(#[case] raw: RawRotation) {
        let orientation: Orientation<Register> = raw.normalize().expect("finite input");
        assert_relative_eq!(
            orientation,
            Orientation::from_rows(QUARTER_TURN_ABOUT_Z),
            epsilon = 1e-12
        );
    }

    #[test]
    fn non_finite_orientation_is_rejected() {
        let raw = RawRotation::Flat9([f64::NAN, 0., 0., 0., 1., 0., 0., 0., 1.]);
        assert!(raw.normalize::<Register>().is_err());
    }

    #[test]
    fn garbled_orientation_is_kept_but_reports_degenerate_axes() {
        let raw = RawRotation::Nested3x3([[1., 0., 0.], [0., 0., 0.], [0., 0., 3.]]);
        let orientation = raw.normalize::<Register>().expect("finite");
        assert_eq!(
            orientation.up(),
            Err(NavigationError::DegenerateOrientation { axis: "up" })
        );
        assert_relative_eq!(orientation.forward().expect("non-zero"), Vector::z_axis());
    }

    #[test]
    fn orientation_rows_rotate_with_the_frame() {
        let transform = RigidBodyTransform::<Register, Image>::build(
            Rotation::try_from_rows(QUARTER_TURN_ABOUT_Z).expect("rotation"),
            [100., 0., 0.],
        )
        .expect("transform");
        let forward_along_x = Orientation::<Register>::from_axes(
            Vector::from_millimeters([0., 1., 0.]),
            Vector::from_millimeters([0., 0., 1.]),
            Vector::from_millimeters([1., 0., 0.]),
        );
        let in_image = forward_along_x.transformed(&transform);
        // the translation never affects directions
        assert_relative_eq!(in_image.forward().expect("unit"), Vector::y_axis());
        assert_relative_eq!(in_image.up().expect("unit"), Vector::z_axis());
    }

    #[test]
    fn raw_sample_normalizes() {
        let raw = RawPoseSample {
            position: [1., 2., 3.],
            rotation: Some(RawRotation::Flat9([1., 0., 0., 0., 1., 0., 0., 0., 1.])),
            timestamp_ms: 40,
            sequence_id: 3,
        };
        let sample = PoseSample::try_from(raw).expect("valid sample");
        assert_eq!(sample.position, Coordinate::from_millimeters([1., 2., 3.]));
        assert_eq!(sample.orientation, Some(Orientation::aligned()));
        assert_eq!((sample.timestamp_ms, sample.sequence_id), (40, 3));

        let bad = RawPoseSample {
            position: [f64::INFINITY, 0., 0.],
            rotation: None,
            timestamp_ms: 0,
            sequence_id: 0,
        };
        assert!(PoseSample::from_raw(&bad).is_err());
    }

    #[cfg(feature = "serde")]
    #[rstest]
    #[case("[[1, 0, 0], [0, 1, 0], [0, 0, 1]]")]
    #[case("[1, 0, 0, 0, 1, 0, 0, 0, 1]")]
    #[case("[1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 1]")]
    #[case("[[1, 0, 0, 0], [0, 1, 0, 0], [0, 0, 1, 0], [0, 0, 0, 1]]")]
    #[case("{w: 1, x: 0, y: 0, z: 0}")]
    fn untagged_shapes_deserialize(#[case] doc: &str) {
        let raw: RawRotation = serde_yaml::from_str(doc).expect("accepted shape");
        assert_relative_eq!(
            raw.normalize::<Register>().expect("finite"),
            Orientation::aligned(),
            epsilon = 1e-12
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn raw_sample_deserializes_with_camel_case_fields() {
        let raw: RawPoseSample = serde_yaml::from_str(
            "position: [1, 2, 3]\nrotation: [1, 0, 0, 0, 1, 0, 0, 0, 1]\ntimestampMs: 1000\nsequenceId: 12\n",
        )
        .expect("valid sample");
        assert_eq!(raw.timestamp_ms, 1000);
        assert_eq!(raw.rotation, Some(RawRotation::Flat9([1., 0., 0., 0., 1., 0., 0., 0., 1.])));
    }

    #[rstest]
    #[case(-1.)]
    #[case(f64::NAN)]
    fn tool_rejects_bad_lengths(#[case] length: f64) {
        assert!(ToolRepresentation::<Image>::new(
            Coordinate::origin(),
            Vector::z_axis(),
            length
        )
        .is_err());
    }

    #[test]
    fn tool_normalizes_axis_and_finds_tip() {
        let tool = ToolRepresentation::<Image>::new(
            Coordinate::from_millimeters([0., 0., 10.]),
            Vector::from_millimeters([2., 0., 0.]),
            100.,
        )
        .expect("valid tool");
        assert_relative_eq!(tool.axis(), Vector::x_axis());
        assert_relative_eq!(tool.tip(), Coordinate::from_millimeters([100., 0., 10.]));
    }
}
