pub mod hashing;

mod error;
pub use error::ResourceError;
pub use error::ResourceResult;

mod definition;
pub use definition::AttributeMap;
pub use definition::GroupDefinition;
pub use definition::ResourceDefinition;

pub mod resource;
pub use resource::ResourceData;
pub use resource::ResourceFactory;
pub use resource::ResourceLookup;
pub use resource::ResourceState;
