//! Physical resources backing the virtual resources of a graph.
//!
//! Imported resources are bound by the application through [`PhysicalResourceBindings`]. Transient resources are
//! created by the graph itself and owned by a [`PhysicalResources`], which is created once per bake.

use std::collections::HashMap;

use anyhow::{Context, Result};

use crate::{Allocator, Buffer, BufferView, DefaultAllocator, Device, Error, Image, ImageCreateInfo, ImageView, MemoryType, VirtualResource};
use crate::graph::allocation::{PhysicalDesc, ResourceAllocation};
use crate::resource::image::aspect_for_format;

/// Describes any physical resource handle on the GPU.
#[derive(Debug, Clone)]
pub enum PhysicalResource {
    Image(ImageView),
    Buffer(BufferView),
}

impl PhysicalResource {
    pub fn image(&self) -> Option<&ImageView> {
        match self {
            PhysicalResource::Image(view) => Some(view),
            PhysicalResource::Buffer(_) => None,
        }
    }

    pub fn buffer(&self) -> Option<&BufferView> {
        match self {
            PhysicalResource::Image(_) => None,
            PhysicalResource::Buffer(view) => Some(view),
        }
    }
}

/// Stores bindings from virtual resources to physical resources.
/// # Example usage
/// ```ignore
/// use ash::vk;
/// use deimos::prelude::*;
///
/// let resource = VirtualResource::image("image");
/// let image = Image::new(/*...*/)?;
/// let view = image.whole_view(vk::ImageAspectFlags::COLOR)?;
/// let mut bindings = PhysicalResourceBindings::new();
/// // Bind the virtual resource to the image
/// bindings.bind_image("image", view.clone());
/// // ... Later, lookup the physical image handle from a virtual resource handle
/// let view = bindings.resolve(&resource).ok_or_else(|| Error::NoResourceBound("image".into()))?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct PhysicalResourceBindings {
    bindings: HashMap<String, PhysicalResource>,
}

impl PhysicalResourceBindings {
    /// Create a new physical resource binding map.
    pub fn new() -> Self {
        PhysicalResourceBindings {
            bindings: Default::default(),
        }
    }

    /// Bind an image to the virtual resource with this name.
    pub fn bind_image(&mut self, name: impl Into<String>, image: ImageView) {
        self.bindings.insert(name.into(), PhysicalResource::Image(image));
    }

    /// Bind a buffer to the virtual resource with this name.
    pub fn bind_buffer(&mut self, name: impl Into<String>, buffer: BufferView) {
        self.bindings
            .insert(name.into(), PhysicalResource::Buffer(buffer));
    }

    /// Alias a resource by giving it an alternative name
    pub fn alias(&mut self, new_name: impl Into<String>, resource: &str) -> Result<()> {
        let bound = self
            .bindings
            .get(resource)
            .ok_or_else(|| Error::NoResourceBound(resource.to_owned()))?
            .clone();
        self.bindings.insert(new_name.into(), bound);
        Ok(())
    }

    /// Resolve a virtual resource to a physical resource. Returns `None` if the resource was not found.
    pub fn resolve(&self, resource: &VirtualResource) -> Option<&PhysicalResource> {
        self.bindings.get(resource.name())
    }

    /// Resolve a resource by name.
    pub fn get(&self, name: &str) -> Option<&PhysicalResource> {
        self.bindings.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Add all bindings of `other`, overwriting bindings with the same name.
    pub fn extend(&mut self, other: &PhysicalResourceBindings) {
        self.bindings
            .extend(other.bindings.iter().map(|(name, resource)| (name.clone(), resource.clone())));
    }
}

/// Memory owned by the graph for one physical resource. Views are declared first so they are dropped before their image.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
enum OwnedResource<A: Allocator> {
    Image {
        view: ImageView,
        #[derivative(Debug = "ignore")]
        _image: Image<A>,
    },
    Buffer {
        #[derivative(Debug = "ignore")]
        _buffer: Buffer<A>,
        view: BufferView,
    },
}

/// Images and buffers created for the transient resources of a baked graph.
/// Every virtual resource sharing a physical resource resolves to the same view.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct PhysicalResources<A: Allocator = DefaultAllocator> {
    resources: Vec<Option<OwnedResource<A>>>,
    bindings: PhysicalResourceBindings,
}

impl<A: Allocator> PhysicalResources<A> {
    /// Create a physical image or buffer for every transient physical resource in the allocation.
    /// # Errors
    /// Fails if creating any image, view or buffer fails. Resources created before the failure are released.
    pub fn new(device: Device, allocator: &mut A, allocation: &ResourceAllocation) -> Result<Self> {
        let mut resources = Vec::with_capacity(allocation.physical.len());
        let mut bindings = PhysicalResourceBindings::new();
        for physical in &allocation.physical {
            let name = physical.occupants.join("|");
            let owned = match &physical.desc {
                PhysicalDesc::Image(desc) => {
                    let image = Image::new(
                        device.clone(),
                        allocator,
                        ImageCreateInfo {
                            width: desc.extent.width,
                            height: desc.extent.height,
                            depth: desc.extent.depth,
                            usage: desc.usage,
                            format: desc.format,
                            samples: desc.samples,
                            mip_levels: desc.mip_levels,
                            layers: desc.layers,
                        },
                    )
                    .with_context(|| Error::ImageCreation(name.clone()))?;
                    let view = image
                        .whole_view(aspect_for_format(desc.format))
                        .with_context(|| Error::ViewCreation(name.clone()))?;
                    for occupant in &physical.occupants {
                        bindings.bind_image(occupant.clone(), view.clone());
                    }
                    Some(OwnedResource::Image {
                        view,
                        _image: image,
                    })
                }
                PhysicalDesc::Buffer(desc) => {
                    let buffer = Buffer::new(device.clone(), allocator, &name, desc.size, desc.usage, MemoryType::GpuOnly)
                        .with_context(|| Error::BufferCreation(name.clone()))?;
                    let view = buffer.view();
                    for occupant in &physical.occupants {
                        bindings.bind_buffer(occupant.clone(), view);
                    }
                    Some(OwnedResource::Buffer {
                        _buffer: buffer,
                        view,
                    })
                }
                PhysicalDesc::Imported(_) => None,
            };
            #[cfg(feature = "log-objects")]
            trace!("Created physical resource for `{name}`");
            resources.push(owned);
        }

        info!(
            "Created {} physical resources for {} virtual resources",
            resources.iter().filter(|resource| resource.is_some()).count(),
            allocation.assignment.len()
        );

        Ok(Self {
            resources,
            bindings,
        })
    }

    /// Bindings for every virtual resource backed by a graph-owned resource.
    pub fn bindings(&self) -> &PhysicalResourceBindings {
        &self.bindings
    }

    /// The image view of a physical resource, if it is a graph-owned image.
    pub fn image(&self, physical: usize) -> Option<&ImageView> {
        match self.resources.get(physical)? {
            Some(OwnedResource::Image {
                view, ..
            }) => Some(view),
            _ => None,
        }
    }

    /// The buffer view of a physical resource, if it is a graph-owned buffer.
    pub fn buffer(&self, physical: usize) -> Option<&BufferView> {
        match self.resources.get(physical)? {
            Some(OwnedResource::Buffer {
                view, ..
            }) => Some(view),
            _ => None,
        }
    }
}
