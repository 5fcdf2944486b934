//! Path mapper for the Flow framework.
//!
//! Flow executes compiled proxy classes from its code cache instead of the
//! package sources, and packages may lay out their classes either mirroring
//! the namespace or flat below `Classes/`. This crate derives a layout
//! independent class identity from a path and uses it to translate paths
//! between the debugger's and the IDE's view of the project.

pub mod class_path;
mod mapper;

use debugproxy_mapper::PathMapper;

pub use class_path::{
    path_to_class_path, resolve_class_path, ClassIdentity, ClassPath, ClassPathError, Convention,
    ProxyClassPath,
};
pub use mapper::FlowPathMapper;

pub const FLOW_FRAMEWORK: &str = "flow";

/// Registry constructor for [`FlowPathMapper`].
pub fn factory() -> Box<dyn PathMapper> {
    Box::new(FlowPathMapper::new())
}
