//! The coordinate-transform and projection core of a surgical navigation system.
//!
//! A tracked instrument reports its pose in the tracker's own frame, the
//! [`Register`](systems::Register) frame. The images it is navigated against live in the
//! [`Image`](systems::Image) frame. This crate moves poses between the two and turns each pose into
//! something the image viewer can show: either cameras that follow the instrument, or the
//! instrument's shaft projected onto each image slice.
//!
//! Points and directions are [`Coordinate`]s and [`Vector`]s tagged with the frame they live in,
//! so a register-frame point cannot be handed to code that expects an image-frame point. The only
//! way across is a [`RigidBodyTransform`](math::RigidBodyTransform), usually held by a
//! [`CoordinateTransformer`].
//!
//! The [`NavigationController`](controller::NavigationController) ties it all together. It owns
//! the transformer and the active [navigation mode](modes), and receives every
//! [`PoseSample`](pose::PoseSample) from the pose source. Everything it draws goes through the
//! narrow [`Renderer`](rendering::Renderer) trait.
//!
//! # Examples
//!
//! Register a tracker frame that is offset and turned a quarter turn about z relative to the
//! image volume, and see where a tracked point ends up:
//!
//! ```
//! use surgnav::{Coordinate, CoordinateTransformer, math::{RigidBodyTransform, Rotation}};
//! use surgnav::systems::{Image, Register};
//!
//! let register_to_image = RigidBodyTransform::<Register, Image>::build(
//!     Rotation::try_from_rows([[0., -1., 0.], [1., 0., 0.], [0., 0., 1.]])
//!         .expect("a quarter turn is orthonormal"),
//!     [-120., 35.5, 900.],
//! )
//! .expect("translation is finite");
//!
//! let mut transformer = CoordinateTransformer::new();
//! let tip = Coordinate::<Register>::from_millimeters([1., 0., 0.]);
//!
//! // without a transform, points pass through unchanged
//! assert_eq!(transformer.to_image_frame(tip).to_millimeters(), [1., 0., 0.]);
//!
//! transformer.load(register_to_image);
//! let in_image = transformer.to_image_frame(tip);
//! assert!((in_image.to_millimeters()[1] - 36.5).abs() < 1e-9);
//!
//! // and back again
//! let back = transformer.to_register_frame(in_image);
//! assert!(back.distance_to(&tip) < 1e-9);
//! ```
//!
//! Mixing frames does not compile:
//!
//! ```compile_fail
//! use surgnav::{Coordinate, Vector, systems::{Image, Register}};
//!
//! let p = Coordinate::<Register>::origin();
//! let _ = p + Vector::<Image>::z_axis();
//! ```
//!
//! # Features
//!
//! - `serde`: serialization of frames, points, transforms, pose samples, and configuration.
//! - `approx`: [`approx`] comparisons for the geometric types.
//!
//! Both are enabled by default.

#[macro_use]
mod coordinate_systems;

mod coordinates;
mod vectors;

pub mod config;
pub mod controller;
pub mod error;
pub mod math;
pub mod modes;
pub mod pose;
pub mod rendering;
pub mod stream;
pub mod throttle;
pub mod transformer;

#[cfg(test)]
mod testing;

pub(crate) type Point3 = nalgebra::Point3<f64>;
pub(crate) type Vector3 = nalgebra::Vector3<f64>;
pub(crate) type Matrix3 = nalgebra::Matrix3<f64>;
pub(crate) type Quaternion = nalgebra::Quaternion<f64>;
pub(crate) type UnitQuaternion = nalgebra::Unit<Quaternion>;

/// The coordinate frames navigation works in.
pub mod systems {
    pub use super::coordinate_systems::{EquivalentTo, Image, Register};
}

pub use coordinate_systems::CoordinateSystem;
pub use coordinates::Coordinate;
pub use error::{NavigationError, RenderError, Result};
pub use transformer::CoordinateTransformer;
pub use vectors::Vector;
