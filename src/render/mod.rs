// ABOUTME: Diagram rendering module
// ABOUTME: Engines, the superseding renderer and the per-function diagram board

pub mod board;
pub mod engine;
pub mod flowchart;
pub mod mmdc;
pub mod renderer;
pub mod svg;

use std::sync::Arc;

pub use board::{CardView, DiagramBoard};
pub use engine::{Artifact, DiagramEngine, RenderToken, PLACEHOLDER_DIAGRAM};
pub use mmdc::MmdcEngine;
pub use renderer::{
    DiagramRenderer, DiagramTarget, RenderDisposition, RenderOutput, RenderTicket, TargetId,
};
pub use svg::BuiltinEngine;

use crate::config::EngineKind;
use crate::error::RenderError;

/// Builds the engine selected in configuration.
pub fn engine_for(kind: EngineKind) -> Result<Arc<dyn DiagramEngine>, RenderError> {
    match kind {
        EngineKind::Builtin => Ok(Arc::new(BuiltinEngine)),
        EngineKind::Mmdc => Ok(Arc::new(MmdcEngine::locate()?)),
    }
}
