use quarry_base::{
    GroupDefinition, ResourceData, ResourceDefinition, ResourceError, ResourceFactory,
    ResourceLookup, ResourceResult, ResourceState,
};

/// A single loadable asset. Owned by exactly one [`ResourceGroup`]; the group
/// drives `load`/`unload` on the payload and tracks the resulting state here.
pub struct Resource {
    name: String,
    type_name: String,
    is_manual: bool,
    state: ResourceState,
    data: Box<dyn ResourceData>,
}

impl Resource {
    pub fn new(
        name: String,
        type_name: String,
        is_manual: bool,
        data: Box<dyn ResourceData>,
    ) -> Self {
        Resource {
            name,
            type_name,
            is_manual,
            state: ResourceState::Unloaded,
            data,
        }
    }

    fn from_definition(
        def: &ResourceDefinition,
        factory: &dyn ResourceFactory,
    ) -> ResourceResult<Resource> {
        let name = def.name().ok_or(ResourceError::BadParam)?.to_string();
        let data = factory
            .create_resource(&def.type_name, &def.attributes)
            .map_err(|e| {
                log::error!(
                    "failed to instantiate resource {} of type {}: {:?}",
                    name,
                    def.type_name,
                    e
                );
                ResourceError::BadParam
            })?;

        Ok(Resource::new(
            name,
            def.type_name.clone(),
            def.is_manual(),
            data,
        ))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Manual resources have an externally managed lifecycle; the group skips
    /// them when loading/unloading and when computing its aggregate state.
    pub fn is_manual(&self) -> bool {
        self.is_manual
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn data(&self) -> &dyn ResourceData {
        self.data.as_ref()
    }
}

/// Sibling view handed to a resource while it loads. The resource currently
/// loading is excluded, so a payload can never observe itself half-built.
struct SiblingView<'a> {
    before: &'a [Resource],
    after: &'a [Resource],
}

impl<'a> ResourceLookup for SiblingView<'a> {
    fn find(
        &self,
        type_name: &str,
        name: &str,
    ) -> Option<&dyn ResourceData> {
        self.before
            .iter()
            .chain(self.after.iter())
            .find(|r| {
                r.state == ResourceState::Loaded && r.type_name == type_name && r.name == name
            })
            .map(|r| r.data.as_ref())
    }
}

/// A named bag of resources plus the names of the groups that must be loaded
/// before it. Owned exclusively by the manager's group table.
pub struct ResourceGroup {
    name: String,
    path: String,
    overridable: bool,
    dependencies: Vec<String>,
    resources: Vec<Resource>,
}

impl ResourceGroup {
    /// Builds a group from a parsed definition, instantiating each resource
    /// through the factory. An empty group name, an unusable resource name or
    /// a factory failure all reject the whole definition.
    pub fn from_definition(
        def: &GroupDefinition,
        factory: &dyn ResourceFactory,
    ) -> ResourceResult<ResourceGroup> {
        if def.name.is_empty() {
            log::error!("group definition with empty name rejected");
            return Err(ResourceError::BadParam);
        }

        let mut group = ResourceGroup {
            name: def.name.clone(),
            path: def.path.clone(),
            overridable: def.overridable,
            dependencies: Vec::default(),
            resources: Vec::default(),
        };

        // A dependency listed twice collapses to one entry
        for dependency in &def.dependencies {
            if !group.dependencies.iter().any(|d| d == dependency) {
                group.dependencies.push(dependency.clone());
            }
        }

        for resource_def in &def.resources {
            let resource = Resource::from_definition(resource_def, factory)?;
            group.add_resource(resource)?;
        }

        log::debug!(
            "created group {} with {} resources, {} dependencies",
            group.name,
            group.resources.len(),
            group.dependencies.len()
        );
        Ok(group)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_overridable(&self) -> bool {
        self.overridable
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn resource_count(&self) -> u32 {
        self.resources.len() as u32
    }

    /// A group is loaded when it has at least one resource and every
    /// non-manual resource reports loaded.
    pub fn is_loaded(&self) -> bool {
        !self.resources.is_empty()
            && self
                .resources
                .iter()
                .all(|r| r.is_manual || r.state == ResourceState::Loaded)
    }

    pub fn find_resource(
        &self,
        type_name: &str,
        name: &str,
    ) -> Option<&Resource> {
        self.find_index(type_name, name).map(|i| &self.resources[i])
    }

    fn find_index(
        &self,
        type_name: &str,
        name: &str,
    ) -> Option<usize> {
        self.resources
            .iter()
            .position(|r| r.type_name == type_name && r.name == name)
    }

    /// A (type_name, name) pair is unique within a group.
    pub fn add_resource(
        &mut self,
        resource: Resource,
    ) -> ResourceResult<()> {
        if self
            .find_index(&resource.type_name, &resource.name)
            .is_some()
        {
            log::warn!(
                "group {} already contains resource {} of type {}",
                self.name,
                resource.name,
                resource.type_name
            );
            return Err(ResourceError::AlreadyExists);
        }

        self.resources.push(resource);
        Ok(())
    }

    /// Replaces resources that share a (type_name, name) pair with `other`'s
    /// and appends the rest. The overridden group keeps its own name, path,
    /// override flag and dependency list.
    pub fn override_by(
        &mut self,
        other: ResourceGroup,
    ) -> ResourceResult<()> {
        if !self.overridable {
            log::warn!("group {} is not overridable", self.name);
            return Err(ResourceError::NotSupported);
        }

        // Self-override guard: the same definition file registered twice
        if !self.path.is_empty() && self.path == other.path {
            log::warn!(
                "group {} override rejected, both definitions come from {}",
                self.name,
                self.path
            );
            return Err(ResourceError::AlreadyExists);
        }

        // Swapping payloads out from under loaded resources would leak them
        if self
            .resources
            .iter()
            .any(|r| r.state == ResourceState::Loaded)
        {
            log::warn!("group {} cannot be overridden while loaded", self.name);
            return Err(ResourceError::NotSupported);
        }

        let mut replaced = 0;
        let mut appended = 0;
        for resource in other.resources {
            match self.find_index(&resource.type_name, &resource.name) {
                Some(i) => {
                    self.resources[i] = resource;
                    replaced += 1;
                }
                None => {
                    self.resources.push(resource);
                    appended += 1;
                }
            }
        }

        log::info!(
            "group {} overridden, {} resources replaced, {} appended",
            self.name,
            replaced,
            appended
        );
        Ok(())
    }

    /// Drives every non-manual unloaded resource through its load body. The
    /// first failure aborts and is returned; resources loaded so far stay
    /// loaded so an explicit re-request can resume where this one stopped.
    pub(crate) fn load(&mut self) -> ResourceResult<()> {
        if self.is_loaded() {
            return Err(ResourceError::AlreadyExists);
        }

        for i in 0..self.resources.len() {
            if self.resources[i].is_manual || self.resources[i].state == ResourceState::Loaded {
                continue;
            }

            let (before, rest) = self.resources.split_at_mut(i);
            let (current, after) = rest.split_at_mut(1);
            let siblings = SiblingView {
                before,
                after,
            };

            log::trace!("loading resource {} in group {}", current[0].name, self.name);
            current[0].data.load(&siblings).map_err(|e| {
                log::error!(
                    "resource {} of type {} in group {} failed to load: {:?}",
                    current[0].name,
                    current[0].type_name,
                    self.name,
                    e
                );
                e
            })?;
            current[0].state = ResourceState::Loaded;
        }

        Ok(())
    }

    /// Unloads every non-manual loaded resource, dependents of this group
    /// having been unloaded already by the batch order.
    pub(crate) fn unload(&mut self) -> ResourceResult<()> {
        let any_loaded = self
            .resources
            .iter()
            .any(|r| !r.is_manual && r.state == ResourceState::Loaded);
        if !any_loaded {
            return Err(ResourceError::AlreadyExists);
        }

        for resource in &mut self.resources {
            if resource.is_manual || resource.state != ResourceState::Loaded {
                continue;
            }

            log::trace!("unloading resource {} in group {}", resource.name, self.name);
            resource.data.unload();
            resource.state = ResourceState::Unloaded;
        }

        Ok(())
    }
}
