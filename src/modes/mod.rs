//! The navigation modes and the lifecycle they share.
//!
//! The set of modes is fixed: [`Mode`] is a closed enum over the two implementations and
//! dispatches the [`NavigationMode`] lifecycle to whichever one is inside. Each mode owns its
//! own bookkeeping; no mode ever looks at another's state.

use crate::config::NavigationConfig;
use crate::error::{NavigationError, Result};
use crate::pose::ImageFramePose;
use crate::rendering::Renderer;
use std::fmt;
use std::str::FromStr;

pub mod camera_following;
pub mod instrument_projection;

pub use camera_following::{CameraFollowingMode, CameraUpdate};
pub use instrument_projection::{
    InstrumentProjectionMode, PlaneProjection, ProjectionInstruction, ProjectionTolerances,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ModeKind {
    CameraFollowing,
    InstrumentProjection,
}

impl ModeKind {
    pub const ALL: [Self; 2] = [Self::CameraFollowing, Self::InstrumentProjection];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CameraFollowing => "camera-following",
            Self::InstrumentProjection => "instrument-projection",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModeKind {
    type Err = NavigationError;

    /// Accepts the kebab-case, snake_case, and CamelCase spellings of a mode name, ignoring case.
    fn from_str(name: &str) -> Result<Self> {
        let folded: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "camerafollowing" => Ok(Self::CameraFollowing),
            "instrumentprojection" => Ok(Self::InstrumentProjection),
            _ => Err(NavigationError::ModeNotFound {
                name: name.to_owned(),
            }),
        }
    }
}

/// What a single update of a mode produced.
#[derive(Clone, Debug, PartialEq)]
pub enum ModeOutput {
    /// Camera following moved one or more cameras.
    Camera(CameraUpdate),
    /// Instrument projection decided what to draw on each slice.
    Projection(Vec<PlaneProjection>),
    /// The instrument moved less than the movement threshold; nothing was changed.
    Gated,
    /// The renderer has no viewports yet; the sample was skipped.
    NotReady,
}

/// The lifecycle every navigation mode goes through.
///
/// `enter` and `exit` must tolerate a renderer without viewports, and `cleanup` must be safe to
/// call any number of times, including when `enter` never ran to completion.
pub trait NavigationMode {
    fn kind(&self) -> ModeKind;

    /// Resets per-activation state and captures whatever baseline the mode needs.
    fn enter(&mut self, renderer: &mut dyn Renderer);

    /// Stops producing output and hands back anything the mode put on screen.
    fn exit(&mut self, renderer: &mut dyn Renderer);

    fn cleanup(&mut self, renderer: &mut dyn Renderer);

    /// Handles one pose sample that is already in the image frame.
    fn handle_update(
        &mut self,
        renderer: &mut dyn Renderer,
        pose: &ImageFramePose,
    ) -> Result<ModeOutput>;
}

#[derive(Clone, Debug)]
pub enum Mode {
    CameraFollowing(CameraFollowingMode),
    InstrumentProjection(InstrumentProjectionMode),
}

impl Mode {
    /// Builds a fresh, not yet entered, mode of the given kind.
    #[must_use]
    pub fn new(kind: ModeKind, config: &NavigationConfig) -> Self {
        match kind {
            ModeKind::CameraFollowing => Self::CameraFollowing(CameraFollowingMode::new(config)),
            ModeKind::InstrumentProjection => {
                Self::InstrumentProjection(InstrumentProjectionMode::new(config))
            }
        }
    }

    fn as_dyn(&mut self) -> &mut dyn NavigationMode {
        match self {
            Self::CameraFollowing(mode) => mode,
            Self::InstrumentProjection(mode) => mode,
        }
    }
}

impl NavigationMode for Mode {
    fn kind(&self) -> ModeKind {
        match self {
            Self::CameraFollowing(_) => ModeKind::CameraFollowing,
            Self::InstrumentProjection(_) => ModeKind::InstrumentProjection,
        }
    }

    fn enter(&mut self, renderer: &mut dyn Renderer) {
        self.as_dyn().enter(renderer);
    }

    fn exit(&mut self, renderer: &mut dyn Renderer) {
        self.as_dyn().exit(renderer);
    }

    fn cleanup(&mut self, renderer: &mut dyn Renderer) {
        self.as_dyn().cleanup(renderer);
    }

    fn handle_update(
        &mut self,
        renderer: &mut dyn Renderer,
        pose: &ImageFramePose,
    ) -> Result<ModeOutput> {
        self.as_dyn().handle_update(renderer, pose)
    }
}
