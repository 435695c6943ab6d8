//! Tunables for the navigation engine.
//!
//! Everything has a sensible default, so an empty document is a valid configuration. Raw fields
//! carry their unit in the name; the accessors hand out `uom` quantities.

use crate::error::{NavigationError, Result};
use crate::modes::instrument_projection::ProjectionTolerances;
use uom::si::f64::{Frequency, Length, Time};
use uom::si::frequency::hertz;
use uom::si::length::millimeter;
use uom::si::time::second;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which degrees of freedom the camera follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum CameraTracking {
    /// Position only; the camera keeps its viewing direction and up vector.
    #[default]
    ThreeDof,
    /// Position and orientation; the camera looks down the instrument's forward axis.
    SixDof,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct NavigationConfig {
    /// Upper bound on how often the active mode is updated.
    pub target_update_rate_hz: f64,
    pub camera_tracking: CameraTracking,
    /// Camera-following updates closer than this to the last applied position are ignored.
    pub movement_threshold_mm: f64,
    /// Margin kept between the followed position and the edge of the volume.
    pub bounds_margin_mm: f64,
    /// `|n·D|` below this means the instrument axis is parallel to a plane.
    pub parallel_tolerance: f64,
    /// An axis parallel to a plane and closer than this lies in the plane.
    pub on_plane_tolerance_mm: f64,
    /// Visible length of the instrument shaft.
    pub tool_extension_length_mm: f64,
    /// Put every camera back where it was when camera following is exited.
    pub restore_cameras_on_exit: bool,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            target_update_rate_hz: 20.,
            camera_tracking: CameraTracking::ThreeDof,
            movement_threshold_mm: 0.5,
            bounds_margin_mm: 1.,
            parallel_tolerance: 1e-3,
            on_plane_tolerance_mm: 1.,
            tool_extension_length_mm: 100.,
            restore_cameras_on_exit: false,
        }
    }
}

impl NavigationConfig {
    /// Checks that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.target_update_rate_hz.is_finite() && self.target_update_rate_hz > 0.) {
            return Err(NavigationError::InvalidConfig(format!(
                "target_update_rate_hz must be positive, got {}",
                self.target_update_rate_hz
            )));
        }
        for (name, value) in [
            ("movement_threshold_mm", self.movement_threshold_mm),
            ("bounds_margin_mm", self.bounds_margin_mm),
            ("parallel_tolerance", self.parallel_tolerance),
            ("on_plane_tolerance_mm", self.on_plane_tolerance_mm),
            ("tool_extension_length_mm", self.tool_extension_length_mm),
        ] {
            if !(value.is_finite() && value >= 0.) {
                return Err(NavigationError::InvalidConfig(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn target_update_rate(&self) -> Frequency {
        Frequency::new::<hertz>(self.target_update_rate_hz)
    }

    /// The minimum time between two deliveries to the active mode.
    #[must_use]
    pub fn min_frame_interval(&self) -> Time {
        Time::new::<second>(1. / self.target_update_rate().get::<hertz>())
    }

    #[must_use]
    pub fn movement_threshold(&self) -> Length {
        Length::new::<millimeter>(self.movement_threshold_mm)
    }

    #[must_use]
    pub fn bounds_margin(&self) -> Length {
        Length::new::<millimeter>(self.bounds_margin_mm)
    }

    #[must_use]
    pub fn tool_extension_length(&self) -> Length {
        Length::new::<millimeter>(self.tool_extension_length_mm)
    }

    #[must_use]
    pub fn projection_tolerances(&self) -> ProjectionTolerances {
        ProjectionTolerances {
            parallel: self.parallel_tolerance,
            on_plane: Length::new::<millimeter>(self.on_plane_tolerance_mm),
        }
    }
}
