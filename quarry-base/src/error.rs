#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Malformed group or resource definition
    BadParam,
    /// Unknown group name, or a dependency that resolves to no known group
    NotFound,
    /// Duplicate resource, duplicate group path, or duplicate schedule request
    AlreadyExists,
    /// The target does not allow the operation (e.g. overriding a group that
    /// is not marked overridable)
    NotSupported,
    /// The group dependency graph contains a cycle
    CycleDetected,
    /// A worker thread or synchronization primitive could not be created
    NoMemory,
}

pub type ResourceResult<T> = Result<T, ResourceError>;
