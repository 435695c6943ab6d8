//! Rigid transforms between coordinate frames.
//!
//! The main type provided by this module is [`RigidBodyTransform`], which describes the isometry
//! (ie, rotation and translation) taking points from one [`CoordinateSystem`] into another. In
//! this crate that is almost always the "register" tracking frame into the image frame, but the
//! types are generic so that the compiler refuses to apply a transform to a point in the wrong
//! frame.
//!
//! Transforms are immutable. They are validated once at construction (see
//! [`RigidBodyTransform::build`]) and replaced wholesale rather than mutated in place.
//!
//! [`CoordinateSystem`]: crate::CoordinateSystem

use crate::coordinates::Coordinate;
use crate::error::{NavigationError, Result};
use crate::vectors::Vector;
use crate::{Matrix3, Quaternion, UnitQuaternion, Vector3};
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::Mul;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tolerance used both for the orthonormality check and for identity detection.
pub const TRANSFORM_TOLERANCE: f64 = 1e-3;

fn check_finite(values: impl IntoIterator<Item = f64>, what: &str) -> Result<()> {
    if values.into_iter().all(f64::is_finite) {
        Ok(())
    } else {
        Err(NavigationError::invalid_transform(format!(
            "{what} contains NaN or infinite entries"
        )))
    }
}

/// A proper rotation (orthonormal, determinant +1) from frame `From` into frame `To`.
///
/// Stored as a row-major 3x3 matrix `R` such that a vector `v` in `From` becomes `R·v` in `To`.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")
)]
pub struct Rotation<From, To> {
    pub(crate) inner: Matrix3,
    pub(crate) from: PhantomData<From>,
    pub(crate) to: PhantomData<To>,
}

// manual impls of Clone and Copy to avoid requiring From/To: Copy + Clone
impl<From, To> Clone for Rotation<From, To> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<From, To> Copy for Rotation<From, To> {}

impl<From, To> PartialEq<Self> for Rotation<From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<From, To> Rotation<From, To> {
    fn from_validated(inner: Matrix3) -> Self {
        Self {
            inner,
            from: PhantomData,
            to: PhantomData,
        }
    }

    /// Validates `matrix` as a proper rotation.
    ///
    /// Fails with [`NavigationError::InvalidTransform`] if any entry is NaN or infinite, if
    /// `RᵀR` differs from the identity by more than [`TRANSFORM_TOLERANCE`] in any entry, or if
    /// the determinant is not within that tolerance of +1 (which rules out reflections).
    pub fn try_from_matrix(matrix: Matrix3) -> Result<Self> {
        check_finite(matrix.iter().copied(), "rotation")?;

        let deviation = (matrix.transpose() * matrix - Matrix3::identity()).amax();
        if deviation > TRANSFORM_TOLERANCE {
            return Err(NavigationError::invalid_transform(format!(
                "rotation is not orthonormal (max |RᵀR - I| = {deviation:.2e})"
            )));
        }

        let determinant = matrix.determinant();
        if (determinant - 1.).abs() > TRANSFORM_TOLERANCE {
            return Err(NavigationError::invalid_transform(format!(
                "rotation determinant is {determinant:.4}, expected +1"
            )));
        }

        Ok(Self::from_validated(matrix))
    }

    /// Validates a row-major rotation matrix. See [`Rotation::try_from_matrix`].
    pub fn try_from_rows(rows: [[f64; 3]; 3]) -> Result<Self> {
        Self::try_from_matrix(Matrix3::from_row_slice(&rows.concat()))
    }

    /// Constructs a rotation from a quaternion.
    ///
    /// The quaternion is normalised first, so only its direction matters. A zero or non-finite
    /// quaternion is rejected.
    pub fn try_from_quaternion(w: f64, i: f64, j: f64, k: f64) -> Result<Self> {
        check_finite([w, i, j, k], "quaternion")?;
        let q = UnitQuaternion::try_new(Quaternion::new(w, i, j, k), f64::EPSILON)
            .ok_or_else(|| NavigationError::invalid_transform("quaternion has zero norm"))?;
        Ok(Self::from_validated(*q.to_rotation_matrix().matrix()))
    }

    #[must_use]
    pub fn identity() -> Self {
        Self::from_validated(Matrix3::identity())
    }

    /// Returns the equal-but-opposite rotation, ie the transpose.
    #[must_use]
    pub fn inverse(&self) -> Rotation<To, From> {
        Rotation::from_validated(self.inner.transpose())
    }

    /// Whether this rotation is within [`TRANSFORM_TOLERANCE`] of the identity in every entry.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        (self.inner - Matrix3::identity()).amax() <= TRANSFORM_TOLERANCE
    }

    /// The rotation as a row-major 3x3 array.
    #[must_use]
    pub fn rows(&self) -> [[f64; 3]; 3] {
        let m = &self.inner;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    /// Rotates a vector from `From` into `To`.
    #[must_use]
    pub fn rotate(&self, v: Vector<From>) -> Vector<To> {
        Vector::from_nalgebra_vector(self.inner * v.inner)
    }

    /// Rotates a vector from `To` back into `From`.
    #[must_use]
    pub fn inverse_rotate(&self, v: Vector<To>) -> Vector<From> {
        Vector::from_nalgebra_vector(self.inner.transpose() * v.inner)
    }
}

impl<From, To> TryFrom<[[f64; 3]; 3]> for Rotation<From, To> {
    type Error = NavigationError;

    fn try_from(rows: [[f64; 3]; 3]) -> Result<Self> {
        Self::try_from_rows(rows)
    }
}

impl<From, To> std::convert::From<Rotation<From, To>> for [[f64; 3]; 3] {
    fn from(rotation: Rotation<From, To>) -> Self {
        rotation.rows()
    }
}

impl<From, Over, To> Mul<Rotation<From, Over>> for Rotation<Over, To> {
    type Output = Rotation<From, To>;

    /// `(Over→To) * (From→Over) = From→To`, exactly like matrix multiplication.
    fn mul(self, rhs: Rotation<From, Over>) -> Self::Output {
        Rotation::from_validated(self.inner * rhs.inner)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> AbsDiffEq<Self> for Rotation<From, To> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> RelativeEq for Rotation<From, To> {
    fn default_max_relative() -> Self::Epsilon {
        Matrix3::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.inner.relative_eq(&other.inner, epsilon, max_relative)
    }
}

/// A rigid transform (rotation + translation) taking points from frame `From` into frame `To`.
///
/// A point `p` in `From` maps to `rotation·p + translation` in `To`. The inverse is
/// `(rotationᵀ, −rotationᵀ·translation)`.
///
/// There are three ways to construct one, all of which validate their input:
///
/// 1. [`RigidBodyTransform::build`] from a rotation and a translation;
/// 2. [`RigidBodyTransform::from_row_major_4x4`] from a flat homogeneous matrix; or
/// 3. [`RigidBodyTransform::from_nested_4x4`] from a nested homogeneous matrix.
///
/// With the `serde` feature, a transform (de)serializes as `{ rotation, translation }` and goes
/// through the same validation, so an invalid transform can never be deserialized.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[cfg_attr(
    feature = "serde",
    serde(try_from = "TransformParts", into = "TransformParts")
)]
pub struct RigidBodyTransform<From, To> {
    pub(crate) rotation: Rotation<From, To>,
    pub(crate) translation: Vector3,
}

// manual impls of Clone and Copy to avoid requiring From/To: Copy + Clone
impl<From, To> Clone for RigidBodyTransform<From, To> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<From, To> Copy for RigidBodyTransform<From, To> {}

impl<From, To> PartialEq<Self> for RigidBodyTransform<From, To> {
    fn eq(&self, other: &Self) -> bool {
        self.rotation == other.rotation && self.translation == other.translation
    }
}

/// The serialized form of a [`RigidBodyTransform`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(deny_unknown_fields))]
pub struct TransformParts {
    /// Row-major rotation.
    pub rotation: [[f64; 3]; 3],
    /// Translation in millimetres, applied after the rotation.
    pub translation: [f64; 3],
}

impl<From, To> TryFrom<TransformParts> for RigidBodyTransform<From, To> {
    type Error = NavigationError;

    fn try_from(parts: TransformParts) -> Result<Self> {
        Self::build(Rotation::try_from_rows(parts.rotation)?, parts.translation)
    }
}

impl<From, To> std::convert::From<RigidBodyTransform<From, To>> for TransformParts {
    fn from(transform: RigidBodyTransform<From, To>) -> Self {
        Self {
            rotation: transform.rotation.rows(),
            translation: transform.translation.into(),
        }
    }
}

impl<From, To> RigidBodyTransform<From, To> {
    /// Constructs a transform from an already-validated rotation and a translation in
    /// millimetres.
    ///
    /// Fails with [`NavigationError::InvalidTransform`] if the translation is not finite.
    pub fn build(rotation: Rotation<From, To>, translation: [f64; 3]) -> Result<Self> {
        check_finite(translation, "translation")?;
        Ok(Self {
            rotation,
            translation: Vector3::from(translation),
        })
    }

    /// Constructs a transform from a flat, row-major, homogeneous 4x4 matrix.
    ///
    /// This is the shape most tracking systems and DICOM tooling hand out. The bottom row must be
    /// `[0, 0, 0, 1]` (within [`TRANSFORM_TOLERANCE`]); anything else is not a rigid transform.
    pub fn from_row_major_4x4(m: [f64; 16]) -> Result<Self> {
        check_finite(m, "homogeneous matrix")?;
        let bottom = [m[12], m[13], m[14], m[15]];
        let expected = [0., 0., 0., 1.];
        if bottom
            .iter()
            .zip(expected)
            .any(|(got, want)| (got - want).abs() > TRANSFORM_TOLERANCE)
        {
            return Err(NavigationError::invalid_transform(format!(
                "homogeneous matrix has bottom row {bottom:?}, expected [0, 0, 0, 1]"
            )));
        }
        let rotation = Rotation::try_from_rows([
            [m[0], m[1], m[2]],
            [m[4], m[5], m[6]],
            [m[8], m[9], m[10]],
        ])?;
        Self::build(rotation, [m[3], m[7], m[11]])
    }

    /// Constructs a transform from a nested (row of rows) homogeneous 4x4 matrix.
    pub fn from_nested_4x4(m: [[f64; 4]; 4]) -> Result<Self> {
        let flat: Vec<f64> = m.concat();
        let mut row_major = [0.; 16];
        row_major.copy_from_slice(&flat);
        Self::from_row_major_4x4(row_major)
    }

    /// The transform that leaves every point where it is.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            rotation: Rotation::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Returns the equal-but-opposite transform to this one, taking `To` back into `From`.
    ///
    /// Always succeeds: the inverse of a valid rigid transform is itself valid.
    #[must_use]
    pub fn inverse(&self) -> RigidBodyTransform<To, From> {
        let rotation = self.rotation.inverse();
        RigidBodyTransform {
            translation: -(rotation.inner * self.translation),
            rotation,
        }
    }

    /// Chains two transforms to produce a transform directly from `From` to `NewTo`.
    ///
    /// `self` is applied first, then `rhs`.
    #[must_use]
    pub fn and_then<NewTo>(self, rhs: RigidBodyTransform<To, NewTo>) -> RigidBodyTransform<From, NewTo> {
        RigidBodyTransform {
            rotation: rhs.rotation * self.rotation,
            translation: rhs.rotation.inner * self.translation + rhs.translation,
        }
    }

    /// Whether the rotation is within tolerance of the identity _and_ the translation is within
    /// tolerance of zero.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.rotation.is_identity() && self.translation.amax() <= TRANSFORM_TOLERANCE
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation<From, To> {
        self.rotation
    }

    /// Translation in millimetres, applied after the rotation.
    #[must_use]
    pub fn translation(&self) -> [f64; 3] {
        self.translation.into()
    }

    /// The transform as a flat, row-major, homogeneous 4x4 matrix.
    #[must_use]
    pub fn to_row_major_4x4(&self) -> [f64; 16] {
        let r = self.rotation.rows();
        let t = self.translation;
        [
            r[0][0], r[0][1], r[0][2], t.x, //
            r[1][0], r[1][1], r[1][2], t.y, //
            r[2][0], r[2][1], r[2][2], t.z, //
            0., 0., 0., 1.,
        ]
    }

    /// Maps a point from `From` into `To`.
    #[doc(alias = "apply")]
    #[must_use]
    pub fn transform(&self, point: Coordinate<From>) -> Coordinate<To> {
        Coordinate::from_nalgebra_point(
            (self.rotation.inner * point.point.coords + self.translation).into(),
        )
    }

    /// Maps a point from `To` back into `From`.
    ///
    /// Equivalent to (but cheaper than) `self.inverse().transform(point)`.
    #[must_use]
    pub fn inverse_transform(&self, point: Coordinate<To>) -> Coordinate<From> {
        Coordinate::from_nalgebra_point(
            (self.rotation.inner.transpose() * (point.point.coords - self.translation)).into(),
        )
    }

    /// Maps a vector from `From` into `To`.
    ///
    /// Vectors have no origin, so only the rotation applies.
    #[must_use]
    pub fn transform_vector(&self, v: Vector<From>) -> Vector<To> {
        self.rotation.rotate(v)
    }

    /// Maps a vector from `To` back into `From`.
    #[must_use]
    pub fn inverse_transform_vector(&self, v: Vector<To>) -> Vector<From> {
        self.rotation.inverse_rotate(v)
    }
}

impl<From, To> Display for RigidBodyTransform<From, To> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let r = self.rotation.rows();
        let t = self.translation;
        for (i, (row, t)) in r.iter().zip([t.x, t.y, t.z]).enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(
                f,
                "[{:>9.4} {:>9.4} {:>9.4} | {:>10.3}]",
                row[0], row[1], row[2], t
            )?;
        }
        Ok(())
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> AbsDiffEq<Self> for RigidBodyTransform<From, To> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.rotation.abs_diff_eq(&other.rotation, epsilon)
            && self.translation.abs_diff_eq(&other.translation, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<From, To> RelativeEq for RigidBodyTransform<From, To> {
    fn default_max_relative() -> Self::Epsilon {
        Matrix3::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.rotation.relative_eq(&other.rotation, epsilon, max_relative)
            && self
                .translation
                .relative_eq(&other.translation, epsilon, max_relative)
    }
}
