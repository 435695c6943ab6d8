#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg(doc)]
use crate::{Coordinate, Vector};

/// Marks a type as a coordinate frame that [`Coordinate`] and [`Vector`] can live in.
///
/// The frame itself carries no data and knows nothing about how it relates to other frames; that
/// relation is expressed by a [`RigidBodyTransform`](crate::math::RigidBodyTransform) between two
/// frames.
///
/// While you _can_ implement this trait directly, prefer using [`system!`](crate::system).
pub trait CoordinateSystem {
    /// Human-readable name of the frame, used in `Display` output and log fields.
    const NAME: &'static str;
}

/// Indicates that the implementing frame is exactly equivalent to `OtherCoordinateSystem`.
///
/// `impl EquivalentTo<B> for A` should only exist if the transform from `A` to `B` is the
/// identity function. When it does, [`Coordinate::cast`] and friends let values move between the
/// two frames without a transform.
///
/// # Safety
///
/// Implementing this trait allows moving values between two frames without transforming them. If
/// a transform actually _is_ needed, this defeats the frame tagging.
pub unsafe trait EquivalentTo<OtherCoordinateSystem> {}

/// All coordinate systems are equivalent to themselves.
unsafe impl<System> EquivalentTo<System> for System {}

/// Defines a new coordinate frame.
///
/// The frame is a zero-sized type used only to tag [`Coordinate`] and [`Vector`] with the frame
/// they are expressed in.
///
/// ```rust
/// surgnav::system!(pub struct ProbeTip);
/// ```
///
/// Doc comments and attributes may be included in the invocation:
///
/// ```rust
/// surgnav::system! {
///     /// The frame of the patient reference array.
///     #[derive(Hash)]
///     pub(crate) struct PatientArray
/// }
/// ```
#[macro_export]
macro_rules! system {
    {
        $(#[$attr:meta])*
        $vis:vis struct $name:ident
    } => {
        $(#[$attr])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq)]
        $vis struct $name;

        impl $crate::CoordinateSystem for $name {
            const NAME: &'static str = stringify!($name);
        }
    };
}

system! {
    /// The tracking system's native frame ("register" frame).
    ///
    /// Pose samples arrive from the tracker in this frame. Units are millimetres.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Register
}

system! {
    /// The frame of the loaded image volume (the DICOM patient frame).
    ///
    /// Everything handed to the rendering collaborator is expressed in this frame. Units are
    /// millimetres.
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub struct Image
}
