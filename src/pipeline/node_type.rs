//! Node kind enumeration for graph construction.
//!
//! This module defines every kind of processing node the orchestrator asks
//! the media capability to instantiate, together with the factory name each
//! kind is created from unless the configuration overrides it.

use serde::{Deserialize, Serialize};

/// Kinds of processing nodes the graph is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    // Source branch nodes
    /// Network receiver for a live feed.
    TransportIn,
    /// Container demultiplexer with outputs discovered at runtime.
    Demux,
    /// Elementary stream parser.
    Parse,
    /// Video decoder.
    Decode,
    /// Raw video format converter.
    Convert,
    /// Buffering queue decoupling execution contexts.
    Queue,
    /// Format constraint.
    CapsFilter,

    // Synthetic and overlay sources
    /// Reference test pattern generator.
    TestPattern,
    /// Still image source.
    StaticImage,
    /// Web page renderer.
    HtmlRender,
    /// Video mixer used to lay the overlay over the selected feed.
    Compositor,

    // Join point and output
    /// Input selector with a settable active input.
    Selector,
    /// Video encoder.
    Encode,
    /// Container multiplexer.
    Mux,
    /// Network sender for the output stream.
    TransportOut,

    // Silent audio track
    /// Audio test tone source (configured for silence).
    AudioTestSource,
    /// Raw audio format converter.
    AudioConvert,
    /// Audio encoder.
    AudioEncode,
}

impl NodeKind {
    /// Get the display name for this node kind.
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeKind::TransportIn => "Transport In",
            NodeKind::Demux => "Demuxer",
            NodeKind::Parse => "Parser",
            NodeKind::Decode => "Decoder",
            NodeKind::Convert => "Video Convert",
            NodeKind::Queue => "Queue",
            NodeKind::CapsFilter => "Caps Filter",
            NodeKind::TestPattern => "Test Pattern",
            NodeKind::StaticImage => "Static Image",
            NodeKind::HtmlRender => "HTML Render",
            NodeKind::Compositor => "Compositor",
            NodeKind::Selector => "Input Selector",
            NodeKind::Encode => "Encoder",
            NodeKind::Mux => "Muxer",
            NodeKind::TransportOut => "Transport Out",
            NodeKind::AudioTestSource => "Audio Test Source",
            NodeKind::AudioConvert => "Audio Convert",
            NodeKind::AudioEncode => "Audio Encoder",
        }
    }

    /// Factory used when the configuration does not name one.
    pub fn default_factory(&self) -> &'static str {
        match self {
            NodeKind::TransportIn => "srtsrc",
            NodeKind::Demux => "tsdemux",
            NodeKind::Parse => "h264parse",
            NodeKind::Decode => "nvh264dec",
            NodeKind::Convert => "videoconvert",
            NodeKind::Queue => "queue",
            NodeKind::CapsFilter => "capsfilter",
            NodeKind::TestPattern => "videotestsrc",
            NodeKind::StaticImage => "multifilesrc",
            NodeKind::HtmlRender => "wpesrc",
            NodeKind::Compositor => "compositor",
            NodeKind::Selector => "input-selector",
            NodeKind::Encode => "nvh264enc",
            NodeKind::Mux => "mpegtsmux",
            NodeKind::TransportOut => "srtsink",
            NodeKind::AudioTestSource => "audiotestsrc",
            NodeKind::AudioConvert => "audioconvert",
            NodeKind::AudioEncode => "avenc_aac",
        }
    }

    /// Get all node kinds.
    pub fn all() -> &'static [NodeKind] {
        &[
            NodeKind::TransportIn,
            NodeKind::Demux,
            NodeKind::Parse,
            NodeKind::Decode,
            NodeKind::Convert,
            NodeKind::Queue,
            NodeKind::CapsFilter,
            NodeKind::TestPattern,
            NodeKind::StaticImage,
            NodeKind::HtmlRender,
            NodeKind::Compositor,
            NodeKind::Selector,
            NodeKind::Encode,
            NodeKind::Mux,
            NodeKind::TransportOut,
            NodeKind::AudioTestSource,
            NodeKind::AudioConvert,
            NodeKind::AudioEncode,
        ]
    }

    /// Check if this kind produces data without an upstream.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            NodeKind::TransportIn
                | NodeKind::TestPattern
                | NodeKind::StaticImage
                | NodeKind::HtmlRender
                | NodeKind::AudioTestSource
        )
    }

    /// Check if this kind only exposes outputs after inspecting live data.
    pub fn has_dynamic_outputs(&self) -> bool {
        matches!(self, NodeKind::Demux)
    }

    /// Get a detailed description of what this node does.
    pub fn description(&self) -> &'static str {
        match self {
            NodeKind::TransportIn => "Receives a live transport stream from a remote URI.",
            NodeKind::Demux => {
                "Splits a container into elementary streams.\n\
                 Outputs appear only after the first bytes are parsed."
            }
            NodeKind::Parse => "Frames an elementary stream, re-sending codec config on every keyframe.",
            NodeKind::Decode => "Decodes compressed video into raw frames.",
            NodeKind::Convert => "Converts raw video between pixel formats.",
            NodeKind::Queue => "Decouples upstream and downstream execution contexts.",
            NodeKind::CapsFilter => "Constrains the format negotiated across a link.",
            NodeKind::TestPattern => {
                "Generates SMPTE colour bars.\n\
                 Backs the fallback branch so the output is never dark."
            }
            NodeKind::StaticImage => "Emits a still image as a live video stream.",
            NodeKind::HtmlRender => "Renders a web page into video frames.",
            NodeKind::Compositor => "Mixes the selected feed with the overlay by z-order.",
            NodeKind::Selector => {
                "Joins every branch.\n\
                 Exactly one input is active and forwarded downstream."
            }
            NodeKind::Encode => "Encodes raw video for transmission.",
            NodeKind::Mux => "Interleaves audio and video into a transport stream.",
            NodeKind::TransportOut => "Publishes the output stream to a remote URI.",
            NodeKind::AudioTestSource => "Generates a live silent audio track.",
            NodeKind::AudioConvert => "Converts raw audio between sample formats.",
            NodeKind::AudioEncode => "Encodes the silent audio track.",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
