//! Built-in path mappers.
//!
//! Centralizes the list of framework mappers shipped with the proxy so the
//! binary and tests build their [`MapperRegistry`] the same way.

use debugproxy_mapper::{MapperFactory, MapperRegistry, PassthroughMapper, PathMapper};

/// Framework names paired with their mapper constructors.
pub fn builtin_mappers() -> Vec<(&'static str, MapperFactory)> {
    let mut mappers: Vec<(&'static str, MapperFactory)> = Vec::new();

    mappers.push((debugproxy_mapper::PASSTHROUGH_FRAMEWORK, passthrough));

    #[cfg(feature = "flow")]
    mappers.push((
        debugproxy_mapper_flow::FLOW_FRAMEWORK,
        debugproxy_mapper_flow::factory,
    ));

    mappers
}

/// Register the built-in mappers into an existing registry.
pub fn register_builtin_mappers(registry: &mut MapperRegistry) {
    for (framework, factory) in builtin_mappers() {
        registry.register(framework, factory);
    }
}

/// Construct a [`MapperRegistry`] with all built-in mappers registered.
pub fn builtin_registry() -> MapperRegistry {
    let mut registry = MapperRegistry::new();
    register_builtin_mappers(&mut registry);
    registry
}

fn passthrough() -> Box<dyn PathMapper> {
    Box::new(PassthroughMapper::new())
}
