//! Chart rendering
//!
//! Labs can be configured with a raw YAML manifest, a packaged chart archive,
//! or a chart reference/URL. The two chart modes delegate rendering to the
//! `helm template` CLI as a subprocess and consume its stdout as manifest
//! text. Helm already skips NOTES.txt, drops empty render outputs, and
//! prefixes every included document with a `# Source:` marker, so no
//! post-processing is needed before distribution.

use std::str::FromStr;

use tokio::process::Command;
use tracing::info;

use crate::{Error, Result};

/// Release name passed to `helm template`
///
/// Rendering happens outside any release lifecycle; the name only feeds the
/// chart's templating context.
const RELEASE_NAME: &str = "lab";

/// How the lab's resource configuration is delivered
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeploymentMode {
    /// A raw multi-document YAML manifest
    Manifest,
    /// A packaged chart archive (`.tgz` upload)
    ChartArchive,
    /// A chart reference or URL resolved by helm
    ChartReference,
}

impl FromStr for DeploymentMode {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "YAML" => Ok(Self::Manifest),
            "CHART" => Ok(Self::ChartArchive),
            "CHART_URL" => Ok(Self::ChartReference),
            other => Err(Error::validation(format!(
                "deploymentMode must be one of YAML, CHART, CHART_URL; got {other:?}"
            ))),
        }
    }
}

/// The lab's resource configuration, as uploaded
///
/// Carried unrendered through orchestration; [`DeploymentSource::resolve`]
/// turns it into manifest text only when distribution needs it.
#[derive(Clone, Debug)]
pub enum DeploymentSource {
    /// A raw manifest, passed through unchanged
    Manifest(String),
    /// An uploaded chart archive, rendered by helm
    ChartArchive(Vec<u8>),
    /// A chart reference or URL, fetched and rendered by helm
    ChartReference(String),
}

impl DeploymentSource {
    /// Resolve this source to manifest text
    pub async fn resolve(&self) -> Result<String> {
        match self {
            Self::Manifest(text) => Ok(text.clone()),
            Self::ChartArchive(archive) => render_archive(archive).await,
            Self::ChartReference(reference) => render_reference(reference).await,
        }
    }
}

/// Render an uploaded chart archive to manifest text
///
/// The archive is persisted to a temporary file for helm to read; the file
/// is removed when rendering finishes.
pub async fn render_archive(archive: &[u8]) -> Result<String> {
    let file = tempfile::Builder::new()
        .prefix("lab-chart-")
        .suffix(".tgz")
        .tempfile()
        .map_err(|e| Error::render(format!("failed to create temp file: {e}")))?;

    tokio::fs::write(file.path(), archive)
        .await
        .map_err(|e| Error::render(format!("failed to write chart archive: {e}")))?;

    let path = file.path().to_string_lossy().into_owned();
    run_helm_template(&path).await
}

/// Render a chart reference or URL to manifest text
pub async fn render_reference(reference: &str) -> Result<String> {
    run_helm_template(reference).await
}

async fn run_helm_template(chart: &str) -> Result<String> {
    let output = Command::new("helm")
        .args(["template", RELEASE_NAME, chart, "--namespace", "default"])
        .output()
        .await
        .map_err(|e| Error::render(format!("failed to run helm: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::render(format!("helm template failed: {stderr}")));
    }

    let manifest = String::from_utf8_lossy(&output.stdout).into_owned();
    info!(chart = %chart, bytes = manifest.len(), "Rendered chart");
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_mode_wire_values() {
        assert_eq!("YAML".parse::<DeploymentMode>().unwrap(), DeploymentMode::Manifest);
        assert_eq!(
            "CHART".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::ChartArchive
        );
        assert_eq!(
            "CHART_URL".parse::<DeploymentMode>().unwrap(),
            DeploymentMode::ChartReference
        );
    }

    #[test]
    fn test_unknown_deployment_mode_is_a_validation_error() {
        let err = "HELM".parse::<DeploymentMode>().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("deploymentMode"));
    }

    #[tokio::test]
    async fn test_raw_manifest_source_passes_through_unrendered() {
        let text = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n";
        let source = DeploymentSource::Manifest(text.to_string());
        assert_eq!(source.resolve().await.unwrap(), text);
    }
}
