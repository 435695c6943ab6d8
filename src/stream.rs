//! The seam to whatever produces pose samples.
//!
//! Connecting to the tracker (and reconnecting to it) happens outside this crate. The source
//! pushes each [`PoseSample`](crate::pose::PoseSample) into
//! [`NavigationController::handle_pose_sample`](crate::controller::NavigationController::handle_pose_sample)
//! on its own event loop; the controller only needs a way to switch that delivery on and off.

/// A live registration with a pose source.
pub trait Subscription {
    /// Stops delivery. Once this returns, no further sample may be pushed for this subscription.
    /// Cancelling twice is a no-op.
    fn cancel(&mut self);
}

pub trait PoseStream {
    /// Starts delivering samples until the returned subscription is cancelled.
    fn subscribe(&mut self) -> Box<dyn Subscription>;
}
