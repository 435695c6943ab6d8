use crate::coordinate_systems::{CoordinateSystem, EquivalentTo};
use crate::Vector3;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};
use uom::si::f64::Length;
use uom::si::length::millimeter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Norms at or below this are treated as "no direction at all".
pub(crate) const NEAR_ZERO_NORM: f64 = 1e-9;

/// Defines a displacement or direction in the coordinate system specified by `In`.
///
/// Components are millimetres. A `Vector` has no origin: when transformed between frames it is
/// only rotated, never translated (see
/// [`RigidBodyTransform::transform_vector`](crate::math::RigidBodyTransform::transform_vector)).
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Vector<In> {
    pub(crate) inner: Vector3,
    #[cfg_attr(feature = "serde", serde(skip))]
    system: PhantomData<In>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Vector<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Vector<In> {}

impl<In> PartialEq<Self> for Vector<In> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.eq(&other.inner)
    }
}

impl<In> Vector<In> {
    pub(crate) fn from_nalgebra_vector(v: Vector3) -> Self {
        Self {
            inner: v,
            system: PhantomData,
        }
    }

    /// Constructs a vector from its (x, y, z) components in millimetres.
    pub fn from_millimeters(components: [f64; 3]) -> Self {
        Self::from_nalgebra_vector(Vector3::from(components))
    }

    /// Constructs a vector from its (x, y, z) components as lengths.
    pub fn from_cartesian(
        x: impl Into<Length>,
        y: impl Into<Length>,
        z: impl Into<Length>,
    ) -> Self {
        Self::from_millimeters([
            x.into().get::<millimeter>(),
            y.into().get::<millimeter>(),
            z.into().get::<millimeter>(),
        ])
    }

    #[must_use]
    pub fn zero() -> Self {
        Self::from_nalgebra_vector(Vector3::zeros())
    }

    #[must_use]
    pub fn x_axis() -> Self {
        Self::from_nalgebra_vector(*Vector3::x_axis())
    }

    #[must_use]
    pub fn y_axis() -> Self {
        Self::from_nalgebra_vector(*Vector3::y_axis())
    }

    #[must_use]
    pub fn z_axis() -> Self {
        Self::from_nalgebra_vector(*Vector3::z_axis())
    }

    #[must_use]
    pub fn to_millimeters(&self) -> [f64; 3] {
        [self.inner.x, self.inner.y, self.inner.z]
    }

    #[must_use]
    pub fn x(&self) -> Length {
        Length::new::<millimeter>(self.inner.x)
    }

    #[must_use]
    pub fn y(&self) -> Length {
        Length::new::<millimeter>(self.inner.y)
    }

    #[must_use]
    pub fn z(&self) -> Length {
        Length::new::<millimeter>(self.inner.z)
    }

    /// Euclidean length of the vector, in millimetres.
    #[must_use]
    pub fn norm(&self) -> f64 {
        self.inner.norm()
    }

    /// Euclidean length of the vector.
    #[must_use]
    pub fn magnitude(&self) -> Length {
        Length::new::<millimeter>(self.norm())
    }

    /// Returns the unit vector pointing the same way, or `None` if this vector is too short (or
    /// not finite) to have a meaningful direction.
    #[must_use]
    pub fn normalized(&self) -> Option<Self> {
        let norm = self.inner.norm();
        if !norm.is_finite() || norm <= NEAR_ZERO_NORM {
            return None;
        }
        Some(Self::from_nalgebra_vector(self.inner / norm))
    }

    #[must_use]
    pub fn dot(&self, rhs: &Self) -> f64 {
        self.inner.dot(&rhs.inner)
    }

    #[must_use]
    pub fn cross(&self, rhs: &Self) -> Self {
        Self::from_nalgebra_vector(self.inner.cross(&rhs.inner))
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.inner.iter().all(|c| c.is_finite())
    }

    /// Linearly interpolate between this vector and another one.
    ///
    /// The value for `t` is not restricted to the range [0, 1].
    #[must_use]
    pub fn lerp(&self, rhs: &Self, t: f64) -> Self {
        Self::from_nalgebra_vector(self.inner.lerp(&rhs.inner, t))
    }

    /// Casts the frame of this vector to the equivalent frame `AlsoIn`.
    #[must_use]
    pub fn cast<AlsoIn>(self) -> Vector<AlsoIn>
    where
        In: EquivalentTo<AlsoIn>,
    {
        Vector::from_nalgebra_vector(self.inner)
    }
}

impl<In> Display for Vector<In>
where
    In: CoordinateSystem,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{:.3}, {:.3}, {:.3}> mm in {}",
            self.inner.x,
            self.inner.y,
            self.inner.z,
            In::NAME
        )
    }
}

impl<In> Neg for Vector<In> {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::from_nalgebra_vector(-self.inner)
    }
}

impl<In> Add<Self> for Vector<In> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::from_nalgebra_vector(self.inner + rhs.inner)
    }
}

impl<In> AddAssign<Self> for Vector<In> {
    fn add_assign(&mut self, rhs: Self) {
        self.inner += rhs.inner;
    }
}

impl<In> Sub<Self> for Vector<In> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::from_nalgebra_vector(self.inner - rhs.inner)
    }
}

impl<In> SubAssign<Self> for Vector<In> {
    fn sub_assign(&mut self, rhs: Self) {
        self.inner -= rhs.inner;
    }
}

impl<In> Mul<f64> for Vector<In> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::from_nalgebra_vector(self.inner * rhs)
    }
}

impl<In> Mul<Vector<In>> for f64 {
    type Output = Vector<In>;

    fn mul(self, rhs: Vector<In>) -> Self::Output {
        rhs * self
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Vector<In> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        // millimetres; a micrometre is well below tracker noise
        1e-6
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.inner.abs_diff_eq(&other.inner, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Vector<In> {
    fn default_max_relative() -> Self::Epsilon {
        Vector3::default_max_relative()
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
