use crate::coordinate_systems::{Image, Register};
use crate::coordinates::Coordinate;
use crate::math::RigidBodyTransform;
use crate::pose::{FramePose, Orientation, PoseSample};
use crate::vectors::Vector;
use tracing::{debug, info};

/// Holds the (at most one) active register→image transform.
///
/// When no transform is loaded every mapping is the identity: points pass through with their
/// components untouched, so callers never have to special-case "not registered yet".
#[derive(Clone, Copy, Debug, Default)]
pub struct CoordinateTransformer {
    transform: Option<RigidBodyTransform<Register, Image>>,
}

impl CoordinateTransformer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_transform(transform: RigidBodyTransform<Register, Image>) -> Self {
        Self {
            transform: Some(transform),
        }
    }

    /// Replaces the active transform.
    pub fn load(&mut self, transform: RigidBodyTransform<Register, Image>) {
        info!(
            identity = transform.is_identity(),
            translation = ?transform.translation(),
            "loaded register→image transform"
        );
        self.transform = Some(transform);
    }

    /// Drops the active transform, reverting to pass-through.
    pub fn clear(&mut self) {
        if self.transform.take().is_some() {
            info!("cleared register→image transform");
        } else {
            debug!("clear requested with no transform loaded");
        }
    }

    #[must_use]
    pub fn has_transform(&self) -> bool {
        self.transform.is_some()
    }

    #[must_use]
    pub fn transform(&self) -> Option<&RigidBodyTransform<Register, Image>> {
        self.transform.as_ref()
    }

    #[must_use]
    pub fn to_image_frame(&self, point: Coordinate<Register>) -> Coordinate<Image> {
        match &self.transform {
            Some(t) => t.transform(point),
            None => point.retag(),
        }
    }

    #[must_use]
    pub fn to_register_frame(&self, point: Coordinate<Image>) -> Coordinate<Register> {
        match &self.transform {
            Some(t) => t.inverse_transform(point),
            None => point.retag(),
        }
    }

    #[must_use]
    pub fn vector_to_image_frame(&self, v: Vector<Register>) -> Vector<Image> {
        match &self.transform {
            Some(t) => t.transform_vector(v),
            None => Vector::from_nalgebra_vector(v.inner),
        }
    }

    #[must_use]
    pub fn orientation_to_image_frame(
        &self,
        orientation: &Orientation<Register>,
    ) -> Orientation<Image> {
        match &self.transform {
            Some(t) => orientation.transformed(t),
            None => orientation.retag(),
        }
    }

    /// Moves a whole pose sample into the image frame.
    #[must_use]
    pub fn sample_to_image_frame(&self, sample: &PoseSample) -> FramePose<Image> {
        FramePose {
            position: self.to_image_frame(sample.position),
            orientation: sample
                .orientation
                .as_ref()
                .map(|o| self.orientation_to_image_frame(o)),
            timestamp_ms: sample.timestamp_ms,
            sequence_id: sample.sequence_id,
        }
    }
}
