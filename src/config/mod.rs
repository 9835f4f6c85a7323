//! Configuration module for feedswitch
//!
//! The orchestrator is configured from a TOML file (or JSON, picked by the
//! `.json` extension), then individual settings can be overridden from the
//! environment:
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `FEEDSWITCH_SOURCES` | `sources` (comma separated) |
//! | `FEEDSWITCH_OUTPUT_URI` | `output.uri` |
//! | `FEEDSWITCH_SWITCH_INTERVAL_SECS` | `timing.switch_interval_secs` |
//! | `HTML_OVERLAY_ENABLED` | `overlay.enabled` (`true`/`1`) |
//! | `HTML_OVERLAY_URL` | `overlay.location` |
//!
//! An enabled overlay without a location renders [`DEFAULT_OVERLAY_URL`].
//!
//! # Example
//!
//! ```toml
//! sources = ["srt://cam-a:6000?mode=caller", "srt://cam-b:6000?mode=caller"]
//!
//! [output]
//! uri = "srt://ingest:7000?mode=caller"
//!
//! [overlay]
//! enabled = true
//! location = "assets/lower-third.html"
//!
//! [timing]
//! switch_interval_secs = 120
//! ```

use crate::error::{FeedSwitchError, Result, ResultExt};
use crate::pipeline::node_type::NodeKind;
use crate::pipeline::topology::{OverlayDescriptor, Topology};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default source rotation interval in seconds
pub const DEFAULT_SWITCH_INTERVAL_SECS: u64 = 120;

/// Page rendered when the overlay is enabled without a location
pub const DEFAULT_OVERLAY_URL: &str = "https://index.hr";

/// Default reconcile tick in seconds
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 10;

/// File extensions treated as still images when no overlay kind is given
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp"];

/// Kind of overlay content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayKind {
    HtmlRender,
    StaticImage,
}

/// Overlay settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub enabled: bool,
    /// URL, `file://` URL or local path
    pub location: Option<String>,
    /// Inferred from `location` when absent
    pub kind: Option<OverlayKind>,
}

/// Output transport settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub uri: String,
}

/// Control loop timing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub switch_interval_secs: u64,
    pub reconcile_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            switch_interval_secs: DEFAULT_SWITCH_INTERVAL_SECS,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
        }
    }
}

impl TimingConfig {
    pub fn switch_interval(&self) -> Duration {
        Duration::from_secs(self.switch_interval_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

/// Factory names for the node kinds that are commonly swapped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementFactories {
    pub decoder: String,
    pub encoder: String,
    pub audio_encoder: String,
    pub transport_in: String,
    pub transport_out: String,
    pub demux: String,
    pub mux: String,
}

impl Default for ElementFactories {
    fn default() -> Self {
        Self {
            decoder: NodeKind::Decode.default_factory().to_string(),
            encoder: NodeKind::Encode.default_factory().to_string(),
            audio_encoder: NodeKind::AudioEncode.default_factory().to_string(),
            transport_in: NodeKind::TransportIn.default_factory().to_string(),
            transport_out: NodeKind::TransportOut.default_factory().to_string(),
            demux: NodeKind::Demux.default_factory().to_string(),
            mux: NodeKind::Mux.default_factory().to_string(),
        }
    }
}

impl ElementFactories {
    /// Factory a node kind is created from
    pub fn factory_for(&self, kind: NodeKind) -> &str {
        match kind {
            NodeKind::Decode => &self.decoder,
            NodeKind::Encode => &self.encoder,
            NodeKind::AudioEncode => &self.audio_encoder,
            NodeKind::TransportIn => &self.transport_in,
            NodeKind::TransportOut => &self.transport_out,
            NodeKind::Demux => &self.demux,
            NodeKind::Mux => &self.mux,
            other => other.default_factory(),
        }
    }
}

/// Output encoding parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    pub bitrate_kbps: u32,
    pub preset: String,
    pub gop_size: u32,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            bitrate_kbps: 6000,
            preset: "low-latency-hq".to_string(),
            gop_size: 30,
            audio_bitrate: 128_000,
            width: 1920,
            height: 1080,
            framerate: 30,
        }
    }
}

/// Complete orchestrator configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Live source URIs in rotation order
    pub sources: Vec<String>,
    pub output: OutputConfig,
    pub overlay: OverlayConfig,
    pub timing: TimingConfig,
    pub elements: ElementFactories,
    pub encoder: EncoderSettings,
}

impl AppConfig {
    /// Load from a TOML file, or JSON when the extension is `.json`
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(FeedSwitchError::from)
            .with_context(|| format!("Failed to read config {}", path.display()))?;

        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let config: Result<Self> = if is_json {
            serde_json::from_str(&content)
                .map_err(|e| FeedSwitchError::Serialization(e.to_string()))
        } else {
            toml::from_str(&content).map_err(|e| FeedSwitchError::Serialization(e.to_string()))
        };
        config.with_context(|| format!("Failed to parse config {}", path.display()))
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| FeedSwitchError::Serialization(e.to_string()))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(sources) = lookup("FEEDSWITCH_SOURCES") {
            self.sources = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(uri) = lookup("FEEDSWITCH_OUTPUT_URI") {
            self.output.uri = uri.trim().to_string();
        }
        if let Some(secs) = lookup("FEEDSWITCH_SWITCH_INTERVAL_SECS") {
            self.timing.switch_interval_secs = secs.trim().parse().map_err(|e| {
                FeedSwitchError::Config(format!(
                    "FEEDSWITCH_SWITCH_INTERVAL_SECS='{}' is not a number: {}",
                    secs, e
                ))
            })?;
        }
        if let Some(enabled) = lookup("HTML_OVERLAY_ENABLED") {
            let enabled = enabled.trim();
            self.overlay.enabled = enabled.eq_ignore_ascii_case("true") || enabled == "1";
        }
        if let Some(url) = lookup("HTML_OVERLAY_URL") {
            self.overlay.location = Some(url.trim().to_string());
        }
        Ok(())
    }

    /// Check the configuration before anything is built
    pub fn validate(&self) -> Result<()> {
        if self.output.uri.trim().is_empty() {
            return Err(FeedSwitchError::Config("output.uri is required".into()));
        }
        if self.sources.iter().any(|s| s.trim().is_empty()) {
            return Err(FeedSwitchError::Config("sources must not contain empty URIs".into()));
        }
        if self.timing.switch_interval_secs == 0 {
            return Err(FeedSwitchError::Config(
                "timing.switch_interval_secs must be greater than zero".into(),
            ));
        }
        if self.timing.reconcile_interval_secs == 0 {
            return Err(FeedSwitchError::Config(
                "timing.reconcile_interval_secs must be greater than zero".into(),
            ));
        }
        let enc = &self.encoder;
        if enc.width == 0 || enc.height == 0 || enc.framerate == 0 {
            return Err(FeedSwitchError::Config(
                "encoder width, height and framerate must be non-zero".into(),
            ));
        }
        self.overlay_descriptor().map(|_| ())
    }

    /// Resolve the overlay settings, checking local assets
    pub fn overlay_descriptor(&self) -> Result<Option<OverlayDescriptor>> {
        if !self.overlay.enabled {
            return Ok(None);
        }
        let location = self
            .overlay
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(DEFAULT_OVERLAY_URL);
        resolve_overlay(location, self.overlay.kind).map(Some)
    }

    /// Validate and turn into the graph description
    pub fn topology(&self) -> Result<Topology> {
        self.validate()?;
        let mut topology = Topology::new(self.sources.iter().map(|s| s.trim()), self.output.uri.trim());
        if let Some(overlay) = self.overlay_descriptor()? {
            topology = topology.with_overlay(overlay);
        }
        Ok(topology)
    }
}

fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.iter().any(|i| e.eq_ignore_ascii_case(i)))
}

/// Existing, readable local asset, made absolute
fn check_local_asset(path: &Path) -> Result<PathBuf> {
    std::fs::File::open(path)
        .map_err(|e| {
            FeedSwitchError::Config(format!(
                "overlay asset {} is not readable: {}",
                path.display(),
                e
            ))
        })?;
    std::fs::canonicalize(path).map_err(FeedSwitchError::from)
}

fn resolve_overlay(location: &str, kind: Option<OverlayKind>) -> Result<OverlayDescriptor> {
    if is_remote(location) {
        return match kind {
            Some(OverlayKind::StaticImage) => Err(FeedSwitchError::Config(format!(
                "static image overlay must be a local file, got {}",
                location
            ))),
            _ => Ok(OverlayDescriptor::HtmlRender {
                url: location.to_string(),
            }),
        };
    }

    let path = Path::new(location.strip_prefix("file://").unwrap_or(location));
    let path = check_local_asset(path)?;
    let kind = kind.unwrap_or(if is_image(&path) {
        OverlayKind::StaticImage
    } else {
        OverlayKind::HtmlRender
    });

    Ok(match kind {
        OverlayKind::StaticImage => OverlayDescriptor::StaticImage { path },
        OverlayKind::HtmlRender => OverlayDescriptor::HtmlRender {
            url: format!("file://{}", path.display()),
        },
    })
}
