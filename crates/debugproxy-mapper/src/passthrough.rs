use std::sync::Arc;

use debugproxy_config::Config;

use crate::{PathMapper, PathMapping, Result};

pub const PASSTHROUGH_FRAMEWORK: &str = "dummy";

/// Forwards every message unchanged.
#[derive(Debug, Default)]
pub struct PassthroughMapper {
    config: Arc<Config>,
    mapping: Arc<PathMapping>,
}

impl PassthroughMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mapping(&self) -> &Arc<PathMapping> {
        &self.mapping
    }
}

impl PathMapper for PassthroughMapper {
    fn initialize(&mut self, config: Arc<Config>, _span: tracing::Span, mapping: Arc<PathMapping>) {
        self.config = config;
        self.mapping = mapping;
    }

    fn apply_mapping_to_text_protocol(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }

    fn apply_mapping_to_xml(&self, message: Vec<u8>) -> Result<Vec<u8>> {
        Ok(message)
    }
}
