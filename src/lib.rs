//! # feedswitch: always-on live stream orchestrator
//!
//! Keeps an output stream alive while live inputs come and go. Several live
//! feeds and one synthetic test pattern are wired into a selector; the
//! orchestrator decides which one is on air, rotates between live feeds on a
//! timer, falls back to the test pattern when a feed drops and restarts
//! broken branches once the output transport is connected again.
//!
//! Media processing itself (decode, composite, encode, transport) belongs to
//! an external media library reached through [`backend::MediaBackend`].
//!
//! ## Architecture
//!
//! - **Backend**: the processing-node capability and an in-process simulation
//! - **Pipeline**: graph construction, selection, fault triage, recovery and the control loop
//! - **Config**: TOML/JSON configuration with environment overrides
//! - **Communication**: crossbeam channels between the loop, the capability and operators
//!
//! ## Example
//!
//! ```ignore
//! use feedswitch::{backend::SimulatedBackend, config::AppConfig, pipeline::{ControlHandle, Orchestrator}};
//!
//! let config = AppConfig::load("feedswitch.toml")?;
//! let topology = config.topology()?;
//! let mut orchestrator = Orchestrator::new(&config, &topology, SimulatedBackend::new())?;
//! orchestrator.start()?;
//!
//! let (handle, commands) = ControlHandle::new();
//! let outcome = orchestrator.run(commands);
//! std::process::exit(outcome.exit_code() as i32);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod pipeline;

// Re-export commonly used types
pub use backend::{MediaBackend, SimulatedBackend};
pub use config::AppConfig;
pub use error::{FeedSwitchError, Result};
pub use pipeline::{ControlHandle, Orchestrator, RunOutcome, Topology};
