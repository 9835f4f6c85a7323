//! Declarative description of the graph to build.

use std::path::PathBuf;

/// One configured live input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    pub uri: String,
}

/// Auxiliary visual content laid over the selected feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayDescriptor {
    /// Web page rendered into frames (remote URL or `file://` URL).
    HtmlRender { url: String },
    /// Local still image.
    StaticImage { path: PathBuf },
}

/// Where the output stream is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputDescriptor {
    pub uri: String,
}

/// Everything the graph builder needs to know about the shape of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Live inputs in rotation order.
    pub sources: Vec<SourceDescriptor>,
    pub overlay: Option<OverlayDescriptor>,
    pub output: OutputDescriptor,
}

impl Topology {
    pub fn new(sources: impl IntoIterator<Item = impl Into<String>>, output: impl Into<String>) -> Self {
        Self {
            sources: sources
                .into_iter()
                .map(|uri| SourceDescriptor { uri: uri.into() })
                .collect(),
            overlay: None,
            output: OutputDescriptor { uri: output.into() },
        }
    }

    pub fn with_overlay(mut self, overlay: OverlayDescriptor) -> Self {
        self.overlay = Some(overlay);
        self
    }
}
