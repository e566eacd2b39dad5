//! Descriptions of the resources a graph creates or imports.
//!
//! Transient resources are described with [`TextureInfo`] and [`BufferInfo`] and created by the graph itself.
//! Texture sizes and formats can be given relative to the swapchain, they are resolved against the
//! [`GraphSettings`] at bake time. Resources owned by the application are imported with an [`ImportInfo`].
//!
//! The human-readable tokens of resource description files can be turned into these types through [`FromStr`]
//! and the `parse_*` functions in this module.

use std::str::FromStr;

use ash::vk;

use crate::{Error, GraphSettings, PipelineStage};

/// How the size of a texture is specified.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SizeClass {
    /// Width and height are in pixels.
    #[default]
    Absolute,
    /// Width and height are scale factors applied to the swapchain extent.
    SwapchainRelative,
}

impl FromStr for SizeClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" | "Absolute" => Ok(SizeClass::Absolute),
            "as_swapchain" | "swapchain_relative" | "SwapchainRelative" => Ok(SizeClass::SwapchainRelative),
            _ => Err(Error::UnknownToken {
                kind: "size class",
                token: s.to_owned(),
            }),
        }
    }
}

/// Number of mip levels of a texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MipLevels {
    /// A full mip chain, computed from the extent.
    Auto,
    /// A fixed number of levels.
    Count(u32),
}

impl Default for MipLevels {
    fn default() -> Self {
        MipLevels::Count(1)
    }
}

impl FromStr for MipLevels {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "auto" || s == "Auto" {
            return Ok(MipLevels::Auto);
        }
        match s.parse::<u32>() {
            Ok(count) if count > 0 => Ok(MipLevels::Count(count)),
            _ => Err(Error::UnknownToken {
                kind: "mip levels",
                token: s.to_owned(),
            }),
        }
    }
}

/// Number of levels in a full mip chain for this extent.
pub fn auto_mip_levels(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Description of a transient texture.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TextureInfo {
    pub size_class: SizeClass,
    /// Width in pixels, or scale factor for [`SizeClass::SwapchainRelative`].
    pub width: f32,
    /// Height in pixels, or scale factor for [`SizeClass::SwapchainRelative`].
    pub height: f32,
    pub depth: u32,
    /// Pixel format, `None` to use the swapchain format.
    pub format: Option<vk::Format>,
    pub mip_levels: MipLevels,
    pub layers: u32,
    pub samples: vk::SampleCountFlags,
    /// Usage flags on top of the ones derived from the passes using this texture.
    pub usage: vk::ImageUsageFlags,
    /// Fill all mip levels with a blit chain after each pass that writes the texture.
    pub generate_mips: bool,
    /// Never alias this texture with others.
    pub persistent: bool,
}

impl Default for TextureInfo {
    fn default() -> Self {
        Self {
            size_class: SizeClass::SwapchainRelative,
            width: 1.0,
            height: 1.0,
            depth: 1,
            format: None,
            mip_levels: MipLevels::default(),
            layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            usage: vk::ImageUsageFlags::empty(),
            generate_mips: false,
            persistent: false,
        }
    }
}

/// A fully resolved image description, as used to create the physical image.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub layers: u32,
    pub samples: vk::SampleCountFlags,
    pub usage: vk::ImageUsageFlags,
}

impl ImageDesc {
    /// Whether two descriptions can share one physical image. Usage flags are merged, so they are not compared.
    pub fn is_compatible(&self, other: &ImageDesc) -> bool {
        self.format == other.format
            && self.extent == other.extent
            && self.mip_levels == other.mip_levels
            && self.layers == other.layers
            && self.samples == other.samples
    }
}

impl TextureInfo {
    /// A texture with a fixed size in pixels.
    pub fn absolute(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            size_class: SizeClass::Absolute,
            width: width as f32,
            height: height as f32,
            format: Some(format),
            ..Default::default()
        }
    }

    /// A texture scaled relative to the swapchain, using the swapchain format.
    pub fn swapchain_relative(scale_x: f32, scale_y: f32) -> Self {
        Self {
            size_class: SizeClass::SwapchainRelative,
            width: scale_x,
            height: scale_y,
            ..Default::default()
        }
    }

    /// Override the format. `None` means "as swapchain".
    pub fn format(mut self, format: Option<vk::Format>) -> Self {
        self.format = format;
        self
    }

    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = depth.max(1);
        self
    }

    pub fn mips(mut self, mip_levels: MipLevels) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    pub fn layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    pub fn samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    pub fn generate_mips(mut self) -> Self {
        self.generate_mips = true;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }

    /// Resolve the texture against the current settings.
    pub fn resolve(&self, settings: &GraphSettings) -> ImageDesc {
        let (width, height) = match self.size_class {
            SizeClass::Absolute => (self.width, self.height),
            SizeClass::SwapchainRelative => (
                settings.swapchain_extent.width as f32 * self.width,
                settings.swapchain_extent.height as f32 * self.height,
            ),
        };
        let extent = vk::Extent3D {
            width: (width.round() as u32).max(1),
            height: (height.round() as u32).max(1),
            depth: self.depth.max(1),
        };
        let mip_levels = match self.mip_levels {
            MipLevels::Auto => auto_mip_levels(extent),
            MipLevels::Count(count) => count.clamp(1, auto_mip_levels(extent)),
        };
        let mut usage = self.usage;
        if self.generate_mips && mip_levels > 1 {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        }
        ImageDesc {
            format: self.format.unwrap_or(settings.swapchain_format),
            extent,
            mip_levels,
            layers: self.layers.max(1),
            samples: self.samples,
            usage,
        }
    }
}

/// Description of a transient buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferInfo {
    pub size: vk::DeviceSize,
    /// Usage flags on top of the ones derived from the passes using this buffer.
    pub usage: vk::BufferUsageFlags,
    /// Never alias this buffer with others.
    pub persistent: bool,
}

impl BufferInfo {
    pub fn new(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::empty(),
            persistent: false,
        }
    }

    pub fn usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    pub fn persistent(mut self) -> Self {
        self.persistent = true;
        self
    }
}

/// A fully resolved buffer description.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// State of a resource owned by the application when the graph starts and ends using it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ImportInfo {
    /// Layout of the image when the frame starts. `UNDEFINED` discards its contents.
    pub initial_layout: vk::ImageLayout,
    /// Layout the image is transitioned to after its last use, if any.
    pub final_layout: Option<vk::ImageLayout>,
    /// Stages of the last access before the frame. The first barrier on the resource waits on these.
    pub stages: PipelineStage,
    /// Accesses of the last access before the frame that still need to be made available.
    pub access: vk::AccessFlags2,
}

impl Default for ImportInfo {
    fn default() -> Self {
        Self {
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: None,
            stages: PipelineStage::ALL_COMMANDS,
            access: vk::AccessFlags2::NONE,
        }
    }
}

impl ImportInfo {
    pub fn new(initial_layout: vk::ImageLayout) -> Self {
        Self {
            initial_layout,
            ..Default::default()
        }
    }

    /// Transition the image to `layout` after its last use in the graph.
    pub fn final_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.final_layout = Some(layout);
        self
    }

    /// Set the stage and access mask of the last access before the frame.
    pub fn after(mut self, stages: PipelineStage, access: vk::AccessFlags2) -> Self {
        self.stages = stages;
        self.access = access;
        self
    }

    /// Import settings for a swapchain image: its contents are discarded, and it is ready for
    /// presentation after its last use. The first access waits on `COLOR_ATTACHMENT_OUTPUT`, the stage the
    /// acquire semaphore is waited on.
    pub fn backbuffer() -> Self {
        Self {
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: Some(vk::ImageLayout::PRESENT_SRC_KHR),
            stages: PipelineStage::COLOR_ATTACHMENT_OUTPUT,
            access: vk::AccessFlags2::NONE,
        }
    }
}

fn unknown(kind: &'static str, token: &str) -> Error {
    Error::UnknownToken {
        kind,
        token: token.to_owned(),
    }
}

/// Parse a format token. `"as_swapchain"` yields `None`.
pub fn parse_format(token: &str) -> Result<Option<vk::Format>, Error> {
    let format = match token {
        "as_swapchain" => return Ok(None),
        "R8_UNORM" => vk::Format::R8_UNORM,
        "R8G8_UNORM" => vk::Format::R8G8_UNORM,
        "R8G8B8A8_UNORM" => vk::Format::R8G8B8A8_UNORM,
        "R8G8B8A8_SRGB" => vk::Format::R8G8B8A8_SRGB,
        "B8G8R8A8_UNORM" => vk::Format::B8G8R8A8_UNORM,
        "B8G8R8A8_SRGB" => vk::Format::B8G8R8A8_SRGB,
        "A2B10G10R10_UNORM" => vk::Format::A2B10G10R10_UNORM_PACK32,
        "R16G16_SFLOAT" => vk::Format::R16G16_SFLOAT,
        "R16G16B16A16_SFLOAT" => vk::Format::R16G16B16A16_SFLOAT,
        "R32_SFLOAT" => vk::Format::R32_SFLOAT,
        "R32G32B32A32_SFLOAT" => vk::Format::R32G32B32A32_SFLOAT,
        "D16_UNORM" => vk::Format::D16_UNORM,
        "D32_SFLOAT" => vk::Format::D32_SFLOAT,
        "D24_UNORM_S8_UINT" => vk::Format::D24_UNORM_S8_UINT,
        "D32_SFLOAT_S8_UINT" => vk::Format::D32_SFLOAT_S8_UINT,
        _ => return Err(unknown("format", token)),
    };
    Ok(Some(format))
}

/// Parse an image layout token.
pub fn parse_image_layout(token: &str) -> Result<vk::ImageLayout, Error> {
    Ok(match token {
        "undefined" => vk::ImageLayout::UNDEFINED,
        "general" => vk::ImageLayout::GENERAL,
        "color_attachment_optimal" => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        "depth_stencil_attachment_optimal" | "auto_depth_stencil_attachment_optimal" => {
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        }
        "depth_attachment_optimal" => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        "depth_stencil_read_only_optimal" | "auto_depth_stencil_read_only_optimal" => {
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
        }
        "shader_read_only_optimal" => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        "transfer_src_optimal" => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        "transfer_dst_optimal" => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        "present_src" | "present_src_khr" => vk::ImageLayout::PRESENT_SRC_KHR,
        _ => return Err(unknown("image layout", token)),
    })
}

/// Parse a `|` separated list of image usage tokens.
pub fn parse_image_usage(tokens: &str) -> Result<vk::ImageUsageFlags, Error> {
    tokens
        .split('|')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .try_fold(vk::ImageUsageFlags::empty(), |usage, token| {
            let flag = match token {
                "ColorAttachment" => vk::ImageUsageFlags::COLOR_ATTACHMENT,
                "DepthStencilAttachment" => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                "Sampled" => vk::ImageUsageFlags::SAMPLED,
                "Storage" => vk::ImageUsageFlags::STORAGE,
                "TransferSrc" => vk::ImageUsageFlags::TRANSFER_SRC,
                "TransferDst" => vk::ImageUsageFlags::TRANSFER_DST,
                "InputAttachment" => vk::ImageUsageFlags::INPUT_ATTACHMENT,
                _ => return Err(unknown("image usage", token)),
            };
            Ok(usage | flag)
        })
}
