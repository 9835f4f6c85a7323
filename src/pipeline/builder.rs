//! Graph builder: topology → processing graph.
//!
//! Construction order:
//! 1. the synthetic fallback branch (test pattern → caps → queue → selector),
//! 2. one branch per live source (transport-in → demux ⇢ parse → decode →
//!    convert → queue → selector),
//! 3. the optional overlay composition stage after the selector,
//! 4. the output chain (caps → encode → parse → mux → transport-out),
//! 5. the silent audio chain into the muxer.
//!
//! Every node kind the topology needs is checked against the registry before
//! anything is created. If the capability still fails part-way, every node
//! created so far is released so no partial graph is left behind.

use crate::backend::{MediaBackend, NodeSpec, Properties, PropertyValue};
use crate::config::EncoderSettings;
use crate::pipeline::error::BuildError;
use crate::pipeline::event::MediaKind;
use crate::pipeline::graph::{
    Branch, BranchKind, BranchState, DeferredLink, Graph, GraphNode, NodeRole, OutputChain,
    OverlayBranch,
};
use crate::pipeline::id::{BranchId, NodeId, PadId};
use crate::pipeline::node_type::NodeKind;
use crate::pipeline::registry::NodeRegistry;
use crate::pipeline::topology::{OverlayDescriptor, Topology};

/// `videotestsrc` pattern index for SMPTE colour bars.
const PATTERN_SMPTE: i64 = 0;

/// `audiotestsrc` wave index for silence.
const WAVE_SILENCE: i64 = 4;

/// Compositor background index for black.
const BACKGROUND_BLACK: i64 = 1;

/// Re-send codec configuration with every keyframe.
const CONFIG_INTERVAL_EVERY_IDR: i64 = -1;

/// Builds a [`Graph`] from a [`Topology`].
pub struct GraphBuilder<'a> {
    registry: &'a NodeRegistry,
    encoder: &'a EncoderSettings,
}

/// Everything but the node table, collected while assembling.
struct GraphParts {
    branches: Vec<Branch>,
    fallback: BranchId,
    selector: NodeId,
    overlay: Option<OverlayBranch>,
    output: OutputChain,
    audio: Vec<NodeId>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry, encoder: &'a EncoderSettings) -> Self {
        Self { registry, encoder }
    }

    /// Node kinds a topology needs, without duplicates.
    pub fn required_kinds(topology: &Topology) -> Vec<NodeKind> {
        let mut kinds = vec![
            NodeKind::Selector,
            NodeKind::TestPattern,
            NodeKind::CapsFilter,
            NodeKind::Queue,
            NodeKind::Encode,
            NodeKind::Parse,
            NodeKind::Mux,
            NodeKind::TransportOut,
            NodeKind::AudioTestSource,
            NodeKind::AudioConvert,
            NodeKind::AudioEncode,
        ];
        if !topology.sources.is_empty() {
            kinds.extend([
                NodeKind::TransportIn,
                NodeKind::Demux,
                NodeKind::Decode,
                NodeKind::Convert,
            ]);
        }
        if let Some(overlay) = &topology.overlay {
            kinds.push(NodeKind::Compositor);
            kinds.push(NodeKind::Convert);
            kinds.push(match overlay {
                OverlayDescriptor::HtmlRender { .. } => NodeKind::HtmlRender,
                OverlayDescriptor::StaticImage { .. } => NodeKind::StaticImage,
            });
        }

        let mut seen = std::collections::HashSet::new();
        kinds.retain(|k| seen.insert(*k));
        kinds
    }

    /// Build the graph. All branches start `Unbound`.
    pub fn build(
        &self,
        topology: &Topology,
        backend: &mut dyn MediaBackend,
    ) -> Result<Graph, BuildError> {
        if topology.output.uri.trim().is_empty() {
            tracing::error!("Build failed: no output URI");
            return Err(BuildError::MissingOutput);
        }
        let required = Self::required_kinds(topology);
        if let Err(e) = self.registry.require(&required) {
            if let BuildError::MissingCapability { kind, factory } = &e {
                tracing::error!(kind = %kind, factory = %factory, "Build failed: missing capability");
            }
            return Err(e);
        }

        let mut asm = Assembly {
            registry: self.registry,
            backend,
            nodes: Vec::new(),
        };

        match self.assemble(topology, &mut asm) {
            Ok(parts) => {
                let graph = Graph {
                    nodes: asm.nodes,
                    branches: parts.branches,
                    fallback: parts.fallback,
                    selector: parts.selector,
                    overlay: parts.overlay,
                    output: parts.output,
                    audio: parts.audio,
                };
                tracing::info!(
                    "Graph built: {} nodes, {} live branches + fallback, overlay {}",
                    graph.nodes.len(),
                    graph.source_count(),
                    if graph.overlay.is_some() { "enabled" } else { "disabled" },
                );
                Ok(graph)
            }
            Err(e) => {
                tracing::error!("Build failed, releasing {} nodes: {}", asm.nodes.len(), e);
                asm.rollback();
                Err(e)
            }
        }
    }

    fn assemble(&self, topology: &Topology, asm: &mut Assembly) -> Result<GraphParts, BuildError> {
        let enc = self.encoder;
        let fallback = BranchId(topology.sources.len() as u32);

        let selector = asm.add(NodeKind::Selector, "selector".into(), NodeRole::Selector, Vec::new())?;

        let fallback_branch = self.build_fallback(asm, fallback, selector)?;

        let mut branches = Vec::with_capacity(topology.sources.len() + 1);
        for (i, source) in topology.sources.iter().enumerate() {
            branches.push(self.build_source(asm, BranchId(i as u32), &source.uri, selector)?);
        }
        branches.push(fallback_branch);

        let (overlay, video_tail) = match &topology.overlay {
            Some(descriptor) => {
                let overlay = self.build_overlay(asm, descriptor, selector)?;
                let tail = *overlay.node_chain.last().unwrap_or(&overlay.compositor);
                (Some(overlay), tail)
            }
            None => (None, selector),
        };

        // Output chain
        let role = NodeRole::Output;
        let output_caps = asm.add(
            NodeKind::CapsFilter,
            "output-caps".into(),
            role,
            vec![caps(format!(
                "video/x-raw,width={},height={}",
                enc.width, enc.height
            ))],
        )?;
        let encoder = asm.add(
            NodeKind::Encode,
            "encoder".into(),
            role,
            vec![
                prop("bitrate", PropertyValue::UInt(enc.bitrate_kbps as u64)),
                prop("preset", PropertyValue::String(enc.preset.clone())),
                prop("gop-size", PropertyValue::Int(enc.gop_size as i64)),
            ],
        )?;
        let parse_out = asm.add(
            NodeKind::Parse,
            "parse-out".into(),
            role,
            vec![prop("config-interval", PropertyValue::Int(CONFIG_INTERVAL_EVERY_IDR))],
        )?;
        let mux = asm.add(NodeKind::Mux, "mux".into(), role, Vec::new())?;
        let transport = asm.add(
            NodeKind::TransportOut,
            "transport-out".into(),
            role,
            vec![prop("uri", PropertyValue::String(topology.output.uri.clone()))],
        )?;

        asm.link(video_tail, output_caps)?;
        asm.chain(&[output_caps, encoder, parse_out])?;
        let video_pad = asm.request_pad(mux, "sink_0", Vec::new())?;
        asm.link_to_pad(parse_out, video_pad)?;
        asm.link(mux, transport)?;

        let audio = self.build_audio(asm, mux)?;

        Ok(GraphParts {
            branches,
            fallback,
            selector,
            overlay,
            output: OutputChain {
                node_chain: vec![output_caps, encoder, parse_out, mux, transport],
                mux,
                transport,
            },
            audio,
        })
    }

    fn build_fallback(
        &self,
        asm: &mut Assembly,
        id: BranchId,
        selector: NodeId,
    ) -> Result<Branch, BuildError> {
        let enc = self.encoder;
        let role = NodeRole::Branch(id);

        let pattern = asm.add(
            NodeKind::TestPattern,
            "test-pattern-source".into(),
            role,
            vec![
                prop("pattern", PropertyValue::Int(PATTERN_SMPTE)),
                prop("is-live", PropertyValue::Bool(true)),
            ],
        )?;
        let pattern_caps = asm.add(
            NodeKind::CapsFilter,
            "test-pattern-caps".into(),
            role,
            vec![caps(format!(
                "video/x-raw,width={},height={},framerate={}/1",
                enc.width, enc.height, enc.framerate
            ))],
        )?;
        let queue = asm.add(NodeKind::Queue, "test-pattern-queue".into(), role, Vec::new())?;

        asm.chain(&[pattern, pattern_caps, queue])?;
        let join_pad = asm.request_pad(selector, "sink_fallback", Vec::new())?;
        asm.link_to_pad(queue, join_pad)?;

        Ok(Branch {
            id,
            kind: BranchKind::SyntheticFallback,
            uri: None,
            node_chain: vec![pattern, pattern_caps, queue],
            join_pad,
            deferred: None,
            state: BranchState::Unbound,
        })
    }

    fn build_source(
        &self,
        asm: &mut Assembly,
        id: BranchId,
        uri: &str,
        selector: NodeId,
    ) -> Result<Branch, BuildError> {
        let i = id.0;
        let role = NodeRole::Branch(id);

        let transport = asm.add(
            NodeKind::TransportIn,
            format!("transport-in-{i}"),
            role,
            vec![prop("uri", PropertyValue::String(uri.to_string()))],
        )?;
        let demux = asm.add(NodeKind::Demux, format!("demux-{i}"), role, Vec::new())?;
        let parse = asm.add(
            NodeKind::Parse,
            format!("parse-in-{i}"),
            role,
            vec![prop("config-interval", PropertyValue::Int(CONFIG_INTERVAL_EVERY_IDR))],
        )?;
        let decoder = asm.add(NodeKind::Decode, format!("decoder-{i}"), role, Vec::new())?;
        let convert = asm.add(NodeKind::Convert, format!("convert-{i}"), role, Vec::new())?;
        let queue = asm.add(NodeKind::Queue, format!("queue-{i}"), role, Vec::new())?;

        // demux → parse is made later by the pad binder
        asm.link(transport, demux)?;
        asm.chain(&[parse, decoder, convert, queue])?;
        let join_pad = asm.request_pad(selector, &format!("sink_{i}"), Vec::new())?;
        asm.link_to_pad(queue, join_pad)?;

        Ok(Branch {
            id,
            kind: BranchKind::LiveSource,
            uri: Some(uri.to_string()),
            node_chain: vec![transport, demux, parse, decoder, convert, queue],
            join_pad,
            deferred: Some(DeferredLink {
                demux,
                downstream: parse,
                expected: MediaKind::Video,
            }),
            state: BranchState::Unbound,
        })
    }

    fn build_overlay(
        &self,
        asm: &mut Assembly,
        descriptor: &OverlayDescriptor,
        selector: NodeId,
    ) -> Result<OverlayBranch, BuildError> {
        let enc = self.encoder;
        let role = NodeRole::Overlay;
        let bgra = format!(
            "video/x-raw,format=BGRA,width={},height={}",
            enc.width, enc.height
        );

        let compositor = asm.add(
            NodeKind::Compositor,
            "compositor".into(),
            role,
            vec![prop("background", PropertyValue::Int(BACKGROUND_BLACK))],
        )?;

        // Selected feed at the bottom of the stack
        let selector_convert =
            asm.add(NodeKind::Convert, "selector-convert".into(), role, Vec::new())?;
        let selector_caps = asm.add(
            NodeKind::CapsFilter,
            "selector-caps".into(),
            role,
            vec![caps(bgra.clone())],
        )?;
        asm.chain(&[selector, selector_convert, selector_caps])?;
        let base_pad = asm.request_pad(
            compositor,
            "sink_0",
            vec![prop("zorder", PropertyValue::UInt(0))],
        )?;
        asm.link_to_pad(selector_caps, base_pad)?;

        // Overlay content on top
        let source = match descriptor {
            OverlayDescriptor::HtmlRender { url } => asm.add(
                NodeKind::HtmlRender,
                "overlay-source".into(),
                role,
                vec![prop("location", PropertyValue::String(url.clone()))],
            )?,
            OverlayDescriptor::StaticImage { path } => asm.add(
                NodeKind::StaticImage,
                "overlay-source".into(),
                role,
                vec![
                    prop("location", PropertyValue::String(path.display().to_string())),
                    prop("loop", PropertyValue::Bool(true)),
                ],
            )?,
        };
        let overlay_caps = asm.add(
            NodeKind::CapsFilter,
            "overlay-caps".into(),
            role,
            vec![caps(format!("{},framerate={}/1", bgra, enc.framerate))],
        )?;
        let overlay_convert =
            asm.add(NodeKind::Convert, "overlay-convert".into(), role, Vec::new())?;
        let overlay_queue = asm.add(NodeKind::Queue, "overlay-queue".into(), role, Vec::new())?;
        asm.chain(&[source, overlay_caps, overlay_convert, overlay_queue])?;
        let top_pad = asm.request_pad(
            compositor,
            "sink_1",
            vec![prop("zorder", PropertyValue::UInt(1))],
        )?;
        asm.link_to_pad(overlay_queue, top_pad)?;

        let compositor_convert =
            asm.add(NodeKind::Convert, "compositor-convert".into(), role, Vec::new())?;
        asm.link(compositor, compositor_convert)?;

        Ok(OverlayBranch {
            descriptor: descriptor.clone(),
            node_chain: vec![
                selector_convert,
                selector_caps,
                source,
                overlay_caps,
                overlay_convert,
                overlay_queue,
                compositor,
                compositor_convert,
            ],
            compositor,
        })
    }

    fn build_audio(&self, asm: &mut Assembly, mux: NodeId) -> Result<Vec<NodeId>, BuildError> {
        let role = NodeRole::Audio;

        let source = asm.add(
            NodeKind::AudioTestSource,
            "audio-source".into(),
            role,
            vec![
                prop("wave", PropertyValue::Int(WAVE_SILENCE)),
                prop("is-live", PropertyValue::Bool(true)),
            ],
        )?;
        let audio_caps = asm.add(
            NodeKind::CapsFilter,
            "audio-caps".into(),
            role,
            vec![caps("audio/x-raw,rate=48000,channels=2".to_string())],
        )?;
        let convert = asm.add(NodeKind::AudioConvert, "audio-convert".into(), role, Vec::new())?;
        let encoder = asm.add(
            NodeKind::AudioEncode,
            "audio-encoder".into(),
            role,
            vec![prop(
                "bitrate",
                PropertyValue::Int(self.encoder.audio_bitrate as i64),
            )],
        )?;

        asm.chain(&[source, audio_caps, convert, encoder])?;
        let pad = asm.request_pad(mux, "sink_1", Vec::new())?;
        asm.link_to_pad(encoder, pad)?;

        Ok(vec![source, audio_caps, convert, encoder])
    }
}

fn prop(key: &str, value: PropertyValue) -> (String, PropertyValue) {
    (key.to_string(), value)
}

fn caps(description: String) -> (String, PropertyValue) {
    prop("caps", PropertyValue::Caps(description))
}

/// Tracks what has been created so a failed build can be undone.
struct Assembly<'r, 'b> {
    registry: &'r NodeRegistry,
    backend: &'b mut dyn MediaBackend,
    nodes: Vec<GraphNode>,
}

impl Assembly<'_, '_> {
    fn add(
        &mut self,
        kind: NodeKind,
        name: String,
        role: NodeRole,
        properties: Properties,
    ) -> Result<NodeId, BuildError> {
        let id = NodeId(self.nodes.len() as u32);
        let spec = NodeSpec {
            kind,
            name: name.clone(),
            factory: self.registry.factory(kind).to_string(),
            properties,
        };
        self.backend
            .create(id, &spec)
            .map_err(|source| BuildError::Capability {
                node: name.clone(),
                source,
            })?;
        tracing::trace!("Created {:?} '{}' ({})", id, name, spec.factory);
        self.nodes.push(GraphNode {
            id,
            name,
            kind,
            role,
            state: None,
        });
        Ok(id)
    }

    fn name(&self, id: NodeId) -> String {
        self.nodes
            .get(id.index())
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    fn link(&mut self, from: NodeId, to: NodeId) -> Result<(), BuildError> {
        self.backend
            .link(from, to)
            .map_err(|source| BuildError::Capability {
                node: self.name(from),
                source,
            })
    }

    fn chain(&mut self, nodes: &[NodeId]) -> Result<(), BuildError> {
        for pair in nodes.windows(2) {
            self.link(pair[0], pair[1])?;
        }
        Ok(())
    }

    fn request_pad(
        &mut self,
        node: NodeId,
        template: &str,
        properties: Properties,
    ) -> Result<PadId, BuildError> {
        self.backend
            .request_pad(node, template, &properties)
            .map_err(|source| BuildError::Capability {
                node: self.name(node),
                source,
            })
    }

    fn link_to_pad(&mut self, from: NodeId, pad: PadId) -> Result<(), BuildError> {
        self.backend
            .link_to_pad(from, pad)
            .map_err(|source| BuildError::Capability {
                node: self.name(from),
                source,
            })
    }

    /// Release every created node, newest first.
    fn rollback(&mut self) {
        for node in self.nodes.iter().rev() {
            self.backend.release(node.id);
        }
        self.nodes.clear();
    }
}
