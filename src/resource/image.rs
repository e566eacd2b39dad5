//! Provides utilities to manage [`VkImage`](vk::Image) and [`VkImageView`](vk::ImageView) objects.
//!
//! # Images
//!
//! Images are managed through the [`Image`] struct. These images are usually backed by a memory allocation, except when
//! they are imported into the graph from outside (for example swapchain images).
//!
//! # Image views
//!
//! Using [`Image::view`] you can create an [`ImageView`] that covers the entire image. Note that [`ImageView`] is in fact an
//! `Arc<ImgView>`. The relationship between [`ImageView`] and [`ImgView`] is similar to `String` vs `str`, except that an
//! [`ImgView`] also owns a full Vulkan resource. For this reason, we wrap it in a reference-counted `Arc` so we can safely treat it as if it were
//! a `str` to a `String`. Most API functions will ask for an [`ImageView`].

use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use ash::vk;

use crate::{Allocation, Allocator, DefaultAllocator, Device, MemoryType};

/// Abstraction over a [`VkImage`](vk::Image). Stores information about size, format, etc. Additionally couples the image data together
/// with a memory allocation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Image<A: Allocator = DefaultAllocator> {
    #[derivative(Debug = "ignore")]
    device: Device,
    handle: vk::Image,
    /// GPU memory allocation. If this is None, then the image is not owned by our system (for example a swapchain image) and should not be
    /// destroyed.
    #[derivative(Debug = "ignore")]
    memory: Option<A::Allocation>,
    format: vk::Format,
    /// For 2D images, `size.depth == 1`.
    size: vk::Extent3D,
    layers: u32,
    mip_levels: u32,
    samples: vk::SampleCountFlags,
}

unsafe impl<A: Allocator> Send for Image<A> {}

unsafe impl<A: Allocator> Sync for Image<A> {}

/// Abstraction over a [`VkImageView`](vk::ImageView). Most functions operating on images will expect these instead of raw owning [`Image`] structs.
/// Image views can refer to one or more array layers or mip levels of an image.
#[derive(Derivative)]
#[derivative(Debug, Hash, PartialEq, Eq)]
pub struct ImgView {
    #[derivative(Debug = "ignore")]
    #[derivative(Hash = "ignore")]
    #[derivative(PartialEq = "ignore")]
    device: Device,
    handle: vk::ImageView,
    image: vk::Image,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    aspect: vk::ImageAspectFlags,
    /// Size of the corresponding image region.
    size: vk::Extent3D,
    base_level: u32,
    level_count: u32,
    base_layer: u32,
    layer_count: u32,
    /// Unique ID for this image view, because vk handles may be reused.
    id: u64,
}

/// Reference-counted version of [`ImgView`].
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct ImageView(pub Arc<ImgView>);

impl Deref for ImageView {
    type Target = Arc<ImgView>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

unsafe impl Send for ImageView {}

unsafe impl Sync for ImageView {}

/// Settings that describe how an image should be created
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq)]
pub struct ImageCreateInfo {
    /// Width in pixels of the image
    pub width: u32,
    /// Height in pixels of the image
    pub height: u32,
    /// Depth in pixels of the image, set to 1 for 2D images.
    pub depth: u32,
    /// Image usage flags
    pub usage: vk::ImageUsageFlags,
    /// Pixel format of the image
    pub format: vk::Format,
    /// MSAA samples
    pub samples: vk::SampleCountFlags,
    /// Number of mip levels. Set to 1 if not using mipmapping
    pub mip_levels: u32,
    /// Number of array layers. Set to 1 for non-array textures.
    pub layers: u32,
}

/// Returns the image aspect that a whole view of an image with this format should use.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => vk::ImageAspectFlags::DEPTH,
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

fn image_type(width: u32, height: u32, depth: u32) -> Result<vk::ImageType> {
    if width == 0 || height == 0 || depth == 0 {
        anyhow::bail!("Image extents invalid");
    }
    Ok(if depth > 1 {
        vk::ImageType::TYPE_3D
    } else if height > 1 {
        vk::ImageType::TYPE_2D
    } else {
        vk::ImageType::TYPE_1D
    })
}

impl<A: Allocator> Image<A> {
    /// Create a new simple [`VkImage`](vk::Image) and allocate some memory to it.
    /// Images are always created with exclusive sharing mode. Queue family ownership transfers
    /// are recorded by the render graph.
    pub fn new(device: Device, alloc: &mut A, info: ImageCreateInfo) -> Result<Self> {
        let image_type = image_type(info.width, info.height, info.depth)?;
        let extent = vk::Extent3D {
            width: info.width,
            height: info.height,
            depth: info.depth,
        };
        let handle = unsafe {
            device.create_image(
                &vk::ImageCreateInfo {
                    s_type: vk::StructureType::IMAGE_CREATE_INFO,
                    p_next: std::ptr::null(),
                    flags: Default::default(),
                    image_type,
                    format: info.format,
                    extent,
                    mip_levels: info.mip_levels,
                    array_layers: info.layers,
                    samples: info.samples,
                    tiling: vk::ImageTiling::OPTIMAL,
                    usage: info.usage,
                    sharing_mode: vk::SharingMode::EXCLUSIVE,
                    queue_family_index_count: 0,
                    p_queue_family_indices: std::ptr::null(),
                    initial_layout: vk::ImageLayout::UNDEFINED,
                },
                None,
            )?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {handle:p}");

        let requirements = unsafe { device.get_image_memory_requirements(handle) };
        let memory = match alloc.allocate("image", &requirements, MemoryType::GpuOnly) {
            Ok(memory) => memory,
            Err(err) => {
                unsafe { device.destroy_image(handle, None) };
                return Err(err);
            }
        };
        unsafe {
            device.bind_image_memory(handle, memory.memory(), memory.offset())?;
        }

        Ok(Self {
            device,
            handle,
            format: info.format,
            size: extent,
            layers: info.layers,
            mip_levels: info.mip_levels,
            samples: info.samples,
            memory: Some(memory),
        })
    }

    /// Wrap an image that is owned by someone else, such as a swapchain image.
    /// The image is not destroyed when this is dropped.
    pub fn new_managed(
        device: Device,
        handle: vk::Image,
        format: vk::Format,
        size: vk::Extent3D,
        layers: u32,
        mip_levels: u32,
        samples: vk::SampleCountFlags,
    ) -> Self {
        Self {
            device,
            handle,
            memory: None,
            format,
            size,
            layers,
            mip_levels,
            samples,
        }
    }

    /// Construct a trivial [`ImageView`] from this [`Image`]. This is an image view that views the
    /// whole image subresource.
    /// # Lifetime
    /// The returned [`ImageView`] is valid as long as `self` is valid.
    pub fn whole_view(&self, aspect: vk::ImageAspectFlags) -> Result<ImageView> {
        let view_type = match image_type(self.size.width, self.size.height, self.size.depth)? {
            vk::ImageType::TYPE_1D if self.layers > 1 => vk::ImageViewType::TYPE_1D_ARRAY,
            vk::ImageType::TYPE_1D => vk::ImageViewType::TYPE_1D,
            vk::ImageType::TYPE_3D => vk::ImageViewType::TYPE_3D,
            _ if self.layers > 1 => vk::ImageViewType::TYPE_2D_ARRAY,
            _ => vk::ImageViewType::TYPE_2D,
        };
        self.view(aspect, view_type, 0, self.mip_levels, 0, self.layers)
    }

    /// Construct an [`ImageView`] from this [`Image`], viewing the given mip and layer range.
    pub fn view(
        &self,
        aspect: vk::ImageAspectFlags,
        view_type: vk::ImageViewType,
        base_level: u32,
        level_count: u32,
        base_layer: u32,
        layer_count: u32,
    ) -> Result<ImageView> {
        let info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            p_next: std::ptr::null(),
            flags: Default::default(),
            image: self.handle,
            view_type,
            format: self.format,
            components: vk::ComponentMapping::default(),
            subresource_range: vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: base_level,
                level_count,
                base_array_layer: base_layer,
                layer_count,
            },
        };

        let view_handle = unsafe { self.device.create_image_view(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImageView {view_handle:p}");
        Ok(ImageView(Arc::new(ImgView {
            device: self.device.clone(),
            handle: view_handle,
            image: self.handle,
            format: self.format,
            samples: self.samples,
            aspect,
            size: self.size,
            base_level,
            level_count,
            base_layer,
            layer_count,
            id: ImgView::get_new_id(),
        })))
    }

    /// Whether this image resource is owned by the application or an external manager (such as the swapchain).
    pub fn is_owned(&self) -> bool {
        self.memory.is_some()
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image's state may put the system into an undefined state.
    pub unsafe fn handle(&self) -> vk::Image {
        self.handle
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn layers(&self) -> u32 {
        self.layers
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl<A: Allocator> Drop for Image<A> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImage {:p}", self.handle);
        if self.is_owned() {
            unsafe {
                self.device.destroy_image(self.handle, None);
            }
        }
    }
}

impl ImgView {
    fn get_new_id() -> u64 {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        COUNTER.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns the subresource range of the original image that this image view covers.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: self.base_level,
            level_count: self.level_count,
            base_array_layer: self.base_layer,
            layer_count: self.layer_count,
        }
    }

    /// Get unsafe access to the underlying `VkImageView` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image view's state may put the system in an undefined state.
    pub unsafe fn handle(&self) -> vk::ImageView {
        self.handle
    }

    /// Get unsafe access to the underlying `VkImage` handle.
    /// # Safety
    /// Any vulkan calls that mutate this image's state may put the system in an undefined state.
    pub unsafe fn image(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    pub fn size(&self) -> vk::Extent3D {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn base_level(&self) -> u32 {
        self.base_level
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    pub fn base_layer(&self) -> u32 {
        self.base_layer
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    /// Get the unique ID of this image view. Every unique image view
    /// is guaranteed to have its own unique id.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for ImgView {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImageView {:p}", self.handle);
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}
