use crate::graph::resource::ResourceType;

/// Represents a logical resource in the graph, uniquely identified by a string.
/// Passes declare their accesses in terms of virtual resources, the graph decides which physical
/// image or buffer backs each of them.
#[derive(Debug, Default, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct VirtualResource {
    pub(crate) uid: String,
    ty: ResourceType,
}

impl VirtualResource {
    /// Create a new image virtual resource.
    pub fn image(uid: impl Into<String>) -> Self {
        VirtualResource {
            uid: uid.into(),
            ty: ResourceType::Image,
        }
    }

    /// Create a new buffer virtual resource.
    pub fn buffer(uid: impl Into<String>) -> Self {
        VirtualResource {
            uid: uid.into(),
            ty: ResourceType::Buffer,
        }
    }

    /// Returns the name of the resource
    pub fn name(&self) -> &str {
        &self.uid
    }

    /// Get the resource type of this virtual resource
    pub fn resource_type(&self) -> ResourceType {
        self.ty
    }

    /// Get the uid of this virtual resource
    pub fn uid(&self) -> &String {
        &self.uid
    }

    pub fn is_image(&self) -> bool {
        self.ty == ResourceType::Image
    }
}
