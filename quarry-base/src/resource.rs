use std::any::Any;

use crate::definition::AttributeMap;
use crate::error::ResourceResult;

/// Load state of a single resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceState {
    Unloaded,
    Loaded,
}

/// Read access to the other resources of the group a resource is being loaded
/// into. Passed to [`ResourceData::load`] so that, for example, a material can
/// find the texture it references in the same group. Only resources that have
/// already finished loading are visible.
pub trait ResourceLookup {
    fn find(
        &self,
        type_name: &str,
        name: &str,
    ) -> Option<&dyn ResourceData>;
}

/// The load/unload body of a concrete resource kind (texture, sound, shader,
/// ...). Implementations live with the subsystems that consume them; this
/// crate only drives the calls.
pub trait ResourceData: Send {
    /// Bring the resource into memory. Called at most once per transition to
    /// loaded; a failure leaves the resource unloaded.
    fn load(
        &mut self,
        siblings: &dyn ResourceLookup,
    ) -> ResourceResult<()>;

    /// Release whatever `load` acquired. Must be safe to call exactly once
    /// per successful load.
    fn unload(&mut self);

    /// Downcast support for sibling lookup through [`ResourceLookup`].
    fn as_any(&self) -> &dyn Any;
}

/// Instantiates concrete resource payloads from a markup type name. The
/// registry of known type names is owned by engine setup code, not by the
/// group manager.
pub trait ResourceFactory: Send {
    fn create_resource(
        &self,
        type_name: &str,
        attributes: &AttributeMap,
    ) -> ResourceResult<Box<dyn ResourceData>>;
}
