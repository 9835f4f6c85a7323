//! Test data builders for creating test objects

use feedswitch::backend::SimulatedBackend;
use feedswitch::config::{AppConfig, OutputConfig};
use feedswitch::pipeline::{Orchestrator, Topology};

/// Builder for orchestrator configurations
pub struct ConfigBuilder {
    sources: usize,
    output: String,
    switch_interval_secs: u64,
    reconcile_interval_secs: u64,
    decoder: Option<String>,
}

impl ConfigBuilder {
    pub fn new(sources: usize) -> Self {
        Self {
            sources,
            output: "srt://ingest:7000?mode=caller".to_string(),
            switch_interval_secs: 120,
            reconcile_interval_secs: 10,
            decoder: None,
        }
    }

    pub fn switch_interval(mut self, secs: u64) -> Self {
        self.switch_interval_secs = secs;
        self
    }

    pub fn reconcile_interval(mut self, secs: u64) -> Self {
        self.reconcile_interval_secs = secs;
        self
    }

    pub fn decoder(mut self, factory: &str) -> Self {
        self.decoder = Some(factory.to_string());
        self
    }

    pub fn build(self) -> AppConfig {
        let mut config = AppConfig {
            sources: (0..self.sources)
                .map(|i| format!("srt://cam-{i}:6000?mode=caller"))
                .collect(),
            output: OutputConfig { uri: self.output },
            ..Default::default()
        };
        config.timing.switch_interval_secs = self.switch_interval_secs;
        config.timing.reconcile_interval_secs = self.reconcile_interval_secs;
        if let Some(decoder) = self.decoder {
            config.elements.decoder = decoder;
        }
        config
    }

    /// Build an orchestrator on a fresh simulated backend
    pub fn orchestrator(self) -> Orchestrator<SimulatedBackend> {
        self.orchestrator_on(SimulatedBackend::new())
    }

    pub fn orchestrator_on(self, backend: SimulatedBackend) -> Orchestrator<SimulatedBackend> {
        let config = self.build();
        let topology: Topology = config.topology().expect("valid test config");
        Orchestrator::new(&config, &topology, backend).expect("graph builds")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new(3)
            .switch_interval(2)
            .decoder("avdec_h264")
            .build();

        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.timing.switch_interval_secs, 2);
        assert_eq!(config.elements.decoder, "avdec_h264");
        assert!(config.validate().is_ok());
    }
}
