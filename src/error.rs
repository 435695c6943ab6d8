//! Errors produced while building transforms, switching modes, and handling pose samples.
//!
//! Only construction-time failures ([`NavigationError::InvalidTransform`],
//! [`NavigationError::ModeNotFound`], [`NavigationError::InvalidConfig`]) are ever handed back to
//! the caller as a hard failure. Everything that can go wrong with a single pose sample is
//! recovered inside the engine and at most reported through
//! [`SampleOutcome`](crate::controller::SampleOutcome).

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = NavigationError> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NavigationError {
    /// A rotation was not orthonormal, or a matrix/translation contained NaN or infinity.
    #[error("invalid rigid transform: {reason}")]
    InvalidTransform { reason: String },

    /// The orientation of a pose sample yielded a (near) zero-length body axis.
    #[error("degenerate orientation: {axis} axis has near-zero length")]
    DegenerateOrientation { axis: &'static str },

    /// A target position lay outside the active volume's bounds.
    #[error("position ({x:.3}, {y:.3}, {z:.3}) mm lies outside the volume bounds")]
    OutOfBounds { x: f64, y: f64, z: f64 },

    /// `set_mode` was handed a name that does not correspond to any navigation mode.
    #[error("unknown navigation mode {name:?}")]
    ModeNotFound { name: String },

    /// A mode failed while handling a single pose sample.
    #[error("mode {mode} failed to handle sample {sequence_id}: {source}")]
    SampleHandling {
        mode: &'static str,
        sequence_id: u64,
        #[source]
        source: Box<NavigationError>,
    },

    #[error("invalid navigation configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl NavigationError {
    pub(crate) fn invalid_transform(reason: impl Into<String>) -> Self {
        Self::InvalidTransform {
            reason: reason.into(),
        }
    }

    /// Whether this error is handled locally for a single sample rather than surfaced to the
    /// caller as a failed operation.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DegenerateOrientation { .. }
                | Self::OutOfBounds { .. }
                | Self::SampleHandling { .. }
                | Self::Render(_)
        )
    }
}

/// Failure reported by the rendering collaborator when it could not carry out a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rendering collaborator failed: {0}")]
pub struct RenderError(pub String);
