//! Draws the instrument's shaft onto every orthogonal slice without moving any camera.
//!
//! The heart of this mode is [`project_onto_plane`], which decides per slice whether the shaft
//! pierces the slice, lies in it, or has nothing to show there. Everything else is plumbing to
//! and from the renderer.

use super::{ModeKind, ModeOutput, NavigationMode};
use crate::config::NavigationConfig;
use crate::coordinate_systems::Image;
use crate::coordinates::Coordinate;
use crate::error::{NavigationError, Result};
use crate::pose::{ImageFramePose, ToolRepresentation};
use crate::rendering::{
    LineStyle, ProjectionOverlay, Renderer, ViewingPlane, ViewportId, ViewportInfo, ViewportKind,
};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, info, warn};
use uom::si::f64::Length;
use uom::si::length::millimeter;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectionTolerances {
    /// `|n·D|` below this counts as the axis being parallel to the plane.
    pub parallel: f64,
    /// How close to a plane a parallel axis must be to count as lying in it.
    pub on_plane: Length,
}

impl Default for ProjectionTolerances {
    fn default() -> Self {
        Self {
            parallel: 1e-3,
            on_plane: Length::new::<millimeter>(1.),
        }
    }
}

/// How the instrument should be drawn on one plane.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionInstruction {
    /// The visible shaft passes through the plane at `point`.
    Crossing { point: Coordinate<Image> },
    /// The shaft lies in the plane. Both ends are already projected onto it.
    OnPlane {
        origin: Coordinate<Image>,
        tip: Coordinate<Image>,
    },
    /// Nothing to draw.
    None,
}

impl ProjectionInstruction {
    /// How to stroke the instruction, or `None` if there is nothing to draw.
    #[must_use]
    pub fn line_style(&self) -> Option<LineStyle> {
        match self {
            Self::Crossing { .. } => Some(LineStyle::Solid),
            Self::OnPlane { .. } => Some(LineStyle::Dashed),
            Self::None => None,
        }
    }

    /// The points the renderer has to place on screen.
    #[must_use]
    pub fn points(&self) -> Vec<Coordinate<Image>> {
        match *self {
            Self::Crossing { point } => vec![point],
            Self::OnPlane { origin, tip } => vec![origin, tip],
            Self::None => Vec::new(),
        }
    }
}

impl fmt::Display for ProjectionInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crossing { point } => write!(f, "crossing at {point}"),
            Self::OnPlane { origin, tip } => write!(f, "on plane from {origin} to {tip}"),
            Self::None => f.write_str("none"),
        }
    }
}

/// Intersects the visible segment of `tool` with `plane`.
///
/// With `d0` the signed distance of the tool's origin from the plane and `denom = n·D`:
///
/// - if the axis is parallel to the plane (`|denom|` below the parallel tolerance), the result
///   is [`OnPlane`](ProjectionInstruction::OnPlane) when the origin is within the on-plane
///   tolerance of the plane and [`None`](ProjectionInstruction::None) otherwise;
/// - otherwise the line meets the plane at `t = -d0 / denom`, which is a
///   [`Crossing`](ProjectionInstruction::Crossing) if `0 ≤ t ≤ L` and `None` if the plane only
///   meets the line beyond the visible segment.
#[must_use]
pub fn project_onto_plane(
    tool: &ToolRepresentation<Image>,
    plane: &ViewingPlane,
    tolerances: &ProjectionTolerances,
) -> ProjectionInstruction {
    let d0 = plane.signed_distance(tool.origin());
    let denom = plane.normal().dot(&tool.axis());

    if denom.abs() < tolerances.parallel {
        if d0.abs() < tolerances.on_plane.get::<millimeter>() {
            ProjectionInstruction::OnPlane {
                origin: plane.project_point(tool.origin()),
                tip: plane.project_point(tool.tip()),
            }
        } else {
            ProjectionInstruction::None
        }
    } else {
        let t = -d0 / denom;
        if (0. ..=tool.extension_length()).contains(&t) {
            ProjectionInstruction::Crossing {
                point: tool.point_at(t),
            }
        } else {
            ProjectionInstruction::None
        }
    }
}

/// The decision made for one viewport.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaneProjection {
    pub viewport: ViewportId,
    pub plane_id: String,
    pub instruction: ProjectionInstruction,
}

/// Only definite slice planes can show a projection.
fn projects(viewport: &ViewportInfo) -> bool {
    viewport.kind == ViewportKind::OrthogonalSlice
}

#[derive(Clone, Debug)]
pub struct InstrumentProjectionMode {
    tolerances: ProjectionTolerances,
    tool_length_mm: f64,
    /// Viewports that currently carry one of our overlays.
    drawn: BTreeSet<ViewportId>,
}

impl InstrumentProjectionMode {
    #[must_use]
    pub fn new(config: &NavigationConfig) -> Self {
        Self {
            tolerances: config.projection_tolerances(),
            tool_length_mm: config.tool_extension_length_mm,
            drawn: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn tolerances(&self) -> &ProjectionTolerances {
        &self.tolerances
    }

    fn clear(&mut self, renderer: &mut dyn Renderer, viewport: &ViewportId) {
        renderer.clear_overlay(viewport);
        self.drawn.remove(viewport);
    }

    fn clear_all(&mut self, renderer: &mut dyn Renderer) {
        for viewport in std::mem::take(&mut self.drawn) {
            renderer.clear_overlay(&viewport);
            renderer.render(&viewport);
        }
    }
}

impl NavigationMode for InstrumentProjectionMode {
    fn kind(&self) -> ModeKind {
        ModeKind::InstrumentProjection
    }

    fn enter(&mut self, _renderer: &mut dyn Renderer) {
        self.drawn.clear();
        info!(
            tool_length_mm = self.tool_length_mm,
            "instrument projection entered"
        );
    }

    fn exit(&mut self, renderer: &mut dyn Renderer) {
        self.clear_all(renderer);
        info!("instrument projection exited");
    }

    fn cleanup(&mut self, renderer: &mut dyn Renderer) {
        self.clear_all(renderer);
    }

    fn handle_update(
        &mut self,
        renderer: &mut dyn Renderer,
        pose: &ImageFramePose,
    ) -> Result<ModeOutput> {
        let Some(viewports) = renderer.viewports() else {
            debug!(sequence_id = pose.sequence_id, "renderer not ready");
            return Ok(ModeOutput::NotReady);
        };

        let tool = match &pose.orientation {
            Some(orientation) => {
                ToolRepresentation::from_pose(pose.position, orientation, self.tool_length_mm)
            }
            None => Err(NavigationError::DegenerateOrientation { axis: "forward" }),
        };
        let tool = match tool {
            Ok(tool) => tool,
            Err(error @ NavigationError::DegenerateOrientation { .. }) => {
                warn!(
                    sequence_id = pose.sequence_id,
                    %error,
                    "no usable instrument axis; hiding projections"
                );
                self.clear_all(renderer);
                return Ok(ModeOutput::Projection(Vec::new()));
            }
            Err(error) => return Err(error),
        };

        let mut projections = Vec::new();
        for viewport in viewports.iter().filter(|viewport| projects(viewport)) {
            let Some(plane) = renderer.viewing_plane(&viewport.id) else {
                debug!(viewport = %viewport.id, "slice viewport has no plane");
                self.clear(renderer, &viewport.id);
                continue;
            };
            let instruction = project_onto_plane(&tool, &plane, &self.tolerances);
            match instruction.line_style() {
                Some(style) => {
                    let screen_points = instruction
                        .points()
                        .into_iter()
                        .filter_map(|point| renderer.project_to_screen(&viewport.id, point))
                        .collect();
                    let overlay = ProjectionOverlay {
                        plane_id: plane.plane_id().to_owned(),
                        instruction,
                        style,
                        screen_points,
                    };
                    renderer.draw_projection(&viewport.id, &overlay)?;
                    self.drawn.insert(viewport.id.clone());
                }
                None => self.clear(renderer, &viewport.id),
            }
            renderer.render(&viewport.id);
            projections.push(PlaneProjection {
                viewport: viewport.id.clone(),
                plane_id: plane.plane_id().to_owned(),
                instruction,
            });
        }
        Ok(ModeOutput::Projection(projections))
    }
}
