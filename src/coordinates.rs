use crate::coordinate_systems::{CoordinateSystem, EquivalentTo};
use crate::vectors::Vector;
use crate::Point3;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use uom::si::f64::Length;
use uom::si::length::millimeter;

#[cfg(any(test, feature = "approx"))]
use approx::{AbsDiffEq, RelativeEq};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Defines a point (ie, position) in the coordinate system specified by `In`.
///
/// Components are millimetres, which is what both tracking systems and DICOM positioning tags
/// report. Use [`Coordinate::from_cartesian`] if you have [`Length`]s in other units.
///
/// <div class="warning">
///
/// Deserializing a `Coordinate` does not (and cannot) check that the numbers really are in `In`.
///
/// </div>
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
// don't require In: Serialize/Deserialize since we skip it anyway
#[cfg_attr(feature = "serde", serde(bound = ""))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct Coordinate<In> {
    /// X, Y, Z in millimetres
    pub(crate) point: Point3,
    #[cfg_attr(feature = "serde", serde(skip))]
    system: PhantomData<In>,
}

// manual impls of Clone and Copy to avoid requiring In: Copy + Clone
impl<In> Clone for Coordinate<In> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<In> Copy for Coordinate<In> {}

impl<In> PartialEq<Self> for Coordinate<In> {
    fn eq(&self, other: &Self) -> bool {
        self.point.eq(&other.point)
    }
}

impl<In> Coordinate<In> {
    pub(crate) fn from_nalgebra_point(p: Point3) -> Self {
        Self {
            point: p,
            system: PhantomData,
        }
    }

    /// Constructs a coordinate from its (x, y, z) components in millimetres.
    pub fn from_millimeters(components: [f64; 3]) -> Self {
        Self::from_nalgebra_point(Point3::from(components))
    }

    /// Constructs a coordinate at the given (x, y, z) cartesian point in `In`.
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

    /// The origin of `In`.
    #[must_use]
    pub fn origin() -> Self {
        Self::from_nalgebra_point(Point3::origin())
    }

    #[must_use]
    pub fn to_millimeters(&self) -> [f64; 3] {
        [self.point.x, self.point.y, self.point.z]
    }

    #[must_use]
    pub fn x(&self) -> Length {
        Length::new::<millimeter>(self.point.x)
    }

    #[must_use]
    pub fn y(&self) -> Length {
        Length::new::<millimeter>(self.point.y)
    }

    #[must_use]
    pub fn z(&self) -> Length {
        Length::new::<millimeter>(self.point.z)
    }

    /// Straight-line distance to `other`, in millimetres.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        (self.point - other.point).norm()
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.point.iter().all(|c| c.is_finite())
    }

    /// Linearly interpolate between this coordinate and another one.
    ///
    /// The value for `t` is not restricted to the range [0, 1].
    #[must_use]
    pub fn lerp(&self, rhs: &Self, t: f64) -> Self {
        Self::from_nalgebra_point(self.point + (rhs.point - self.point) * t)
    }

    /// Casts the frame of this coordinate to the equivalent frame `AlsoIn`.
    ///
    /// See [`EquivalentTo`] for when this is appropriate.
    #[must_use]
    pub fn cast<AlsoIn>(self) -> Coordinate<AlsoIn>
    where
        In: EquivalentTo<AlsoIn>,
    {
        Coordinate::from_nalgebra_point(self.point)
    }

    /// Re-tags this coordinate as being in `NewIn` without changing its components.
    ///
    /// Only the [`CoordinateTransformer`](crate::CoordinateTransformer) does this, for its
    /// pass-through behaviour when no transform is loaded.
    pub(crate) fn retag<NewIn>(self) -> Coordinate<NewIn> {
        Coordinate::from_nalgebra_point(self.point)
    }
}

impl<In> Display for Coordinate<In>
where
    In: CoordinateSystem,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.3}, {:.3}, {:.3}) mm in {}",
            self.point.x,
            self.point.y,
            self.point.z,
            In::NAME
        )
    }
}

impl<In> Sub<Self> for Coordinate<In> {
    type Output = Vector<In>;

    fn sub(self, rhs: Self) -> Self::Output {
        Vector::from_nalgebra_vector(self.point - rhs.point)
    }
}

impl<In> Add<Vector<In>> for Coordinate<In> {
    type Output = Self;

    fn add(self, rhs: Vector<In>) -> Self::Output {
        Self::from_nalgebra_point(self.point + rhs.inner)
    }
}

impl<In> AddAssign<Vector<In>> for Coordinate<In> {
    fn add_assign(&mut self, rhs: Vector<In>) {
        self.point += rhs.inner;
    }
}

impl<In> Sub<Vector<In>> for Coordinate<In> {
    type Output = Self;

    fn sub(self, rhs: Vector<In>) -> Self::Output {
        Self::from_nalgebra_point(self.point - rhs.inner)
    }
}

impl<In> SubAssign<Vector<In>> for Coordinate<In> {
    fn sub_assign(&mut self, rhs: Vector<In>) {
        self.point -= rhs.inner;
    }
}

impl<In> From<Coordinate<In>> for Vector<In> {
    /// The displacement of the coordinate from the origin.
    fn from(value: Coordinate<In>) -> Self {
        Vector::from_nalgebra_vector(value.point.coords)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> AbsDiffEq<Self> for Coordinate<In> {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        // millimetres
        1e-6
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        // NOTE: this checks every component separately, not the distance between the points.
        self.point.abs_diff_eq(&other.point, epsilon)
    }
}

#[cfg(any(test, feature = "approx"))]
impl<In> RelativeEq for Coordinate<In> {
    fn default_max_relative() -> Self::Epsilon {
        Point3::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.point.relative_eq(&other.point, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinate_systems::{Image, Register};
    use crate::coordinates::Coordinate;
    use crate::vectors::Vector;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use uom::si::f64::Length;
    use uom::si::length::{meter, millimeter};

    #[rstest]
    #[case([500., 0., 0.], 500.)]
    #[case([0., -300., 0.], 300.)]
    #[case([0., 0., 200.], 200.)]
    #[case([3., 4., 12.], 13.)]
    fn distance_to_origin(#[case] point: [f64; 3], #[case] expected: f64) {
        let coordinate = Coordinate::<Image>::from_millimeters(point);
        assert_relative_eq!(coordinate.distance_to(&Coordinate::origin()), expected);
    }

    #[test]
    fn arithmetic_with_vectors() {
        let a = Coordinate::<Register>::from_millimeters([1., 2., 3.]);
        let b = Coordinate::<Register>::from_millimeters([4., 6., 3.]);
        let ab = b - a;
        assert_relative_eq!(ab, Vector::from_millimeters([3., 4., 0.]));
        assert_relative_eq!(a + ab, b);
        assert_relative_eq!(b - ab, a);

        let mut c = a;
        c += ab;
        c -= ab * 2.;
        assert_relative_eq!(c, Coordinate::from_millimeters([-2., -2., 3.]));
    }

    #[test]
    fn cartesian_accepts_any_length_unit() {
        let c = Coordinate::<Image>::from_cartesian(
            Length::new::<meter>(0.1),
            Length::new::<millimeter>(-5.),
            Length::new::<millimeter>(0.),
        );
        assert_relative_eq!(c, Coordinate::from_millimeters([100., -5., 0.]), epsilon = 1e-9);
        assert_relative_eq!(c.y().get::<millimeter>(), -5., epsilon = 1e-9);
    }

    #[test]
    fn lerp_midpoint() {
        let a = Coordinate::<Image>::from_millimeters([0., 0., 0.]);
        let b = Coordinate::<Image>::from_millimeters([10., -10., 4.]);
        assert_relative_eq!(a.lerp(&b, 0.5), Coordinate::from_millimeters([5., -5., 2.]));
    }

    #[test]
    fn display() {
        insta::assert_snapshot!(
            Coordinate::<Register>::from_millimeters([12.5, 0., -3.25]),
            @"(12.500, 0.000, -3.250) mm in Register"
        );
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_is_a_plain_triple() {
        let c: Coordinate<Image> = serde_yaml::from_str("[1.0, 2.0, 3.5]").expect("valid yaml");
        assert_eq!(c, Coordinate::from_millimeters([1., 2., 3.5]));
    }
}
