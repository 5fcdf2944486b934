use std::collections::BTreeMap;
use std::sync::Arc;

use debugproxy_config::Config;

use crate::{MapperError, PathMapper, PathMapping, Result};

/// Builds an uninitialized mapper; [`MapperRegistry::create`] initializes it.
pub type MapperFactory = fn() -> Box<dyn PathMapper>;

/// Framework name -> mapper constructor.
///
/// Built explicitly at startup and passed to whoever needs to create
/// mappers. Lookups only depend on the final set of registrations, never on
/// the order they were made in.
#[derive(Default, Clone)]
pub struct MapperRegistry {
    factories: BTreeMap<String, MapperFactory>,
}

impl MapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `factory` under `framework`, returning any factory it replaces.
    pub fn register(
        &mut self,
        framework: impl Into<String>,
        factory: MapperFactory,
    ) -> Option<MapperFactory> {
        self.factories.insert(framework.into(), factory)
    }

    pub fn contains(&self, framework: &str) -> bool {
        self.factories.contains_key(framework)
    }

    /// Registered framework names, sorted.
    pub fn frameworks(&self) -> impl Iterator<Item = &str> + '_ {
        self.factories.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Construct and initialize the mapper registered for `framework`.
    pub fn create(
        &self,
        framework: &str,
        config: Arc<Config>,
        span: tracing::Span,
        mapping: Arc<PathMapping>,
    ) -> Result<Arc<dyn PathMapper>> {
        let Some(factory) = self.factories.get(framework) else {
            return Err(MapperError::UnsupportedFramework {
                framework: framework.to_owned(),
                available: self.frameworks().collect::<Vec<_>>().join(", "),
            });
        };

        let mut mapper = factory();
        mapper.initialize(config, span, mapping);
        Ok(Arc::from(mapper))
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("frameworks", &self.frameworks().collect::<Vec<_>>())
            .finish()
    }
}
