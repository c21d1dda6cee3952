// ABOUTME: Diagram engine backed by the Mermaid CLI (mmdc)
// ABOUTME: Writes the description to a temp dir, runs mmdc and reads back the SVG

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::process::Command;

use super::engine::{Artifact, DiagramEngine, RenderToken};
use crate::error::RenderError;

pub struct MmdcEngine {
    binary: PathBuf,
}

impl MmdcEngine {
    /// Locates `mmdc` on `PATH`.
    pub fn locate() -> Result<Self, RenderError> {
        let binary = which::which("mmdc").map_err(|e| {
            RenderError::EngineUnavailable(format!(
                "mmdc not found in PATH ({}). Install @mermaid-js/mermaid-cli or use the builtin engine",
                e
            ))
        })?;
        Ok(Self { binary })
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl DiagramEngine for MmdcEngine {
    fn name(&self) -> &'static str {
        "mmdc"
    }

    async fn render(&self, token: &RenderToken, description: &str) -> Result<Artifact, RenderError> {
        let workdir = tempfile::tempdir()
            .map_err(|e| RenderError::Engine(format!("failed to create temp dir: {}", e)))?;
        let input = workdir.path().join(format!("{}.mmd", token));
        let output = workdir.path().join(format!("{}.svg", token));

        tokio::fs::write(&input, description)
            .await
            .map_err(|e| RenderError::Engine(format!("failed to write diagram source: {}", e)))?;

        tracing::debug!(token = %token, binary = %self.binary.display(), "Running mmdc");
        // Dropping the future (superseded render) kills the child.
        let result = Command::new(&self.binary)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .arg("--svgId")
            .arg(token.as_str())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| RenderError::EngineUnavailable(format!("failed to run mmdc: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let message = stderr
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or("mmdc exited with an error")
                .to_string();
            return Err(RenderError::Engine(message));
        }

        let svg = tokio::fs::read_to_string(&output)
            .await
            .map_err(|e| RenderError::Engine(format!("mmdc produced no output: {}", e)))?;

        Ok(Artifact {
            token: token.clone(),
            svg,
        })
    }
}
