use anyhow::Result;

use deimos::prelude::*;
use deimos::graph::resource::AttachmentType;
use deimos::graph::resource_info::{auto_mip_levels, parse_format, parse_image_layout, parse_image_usage};

#[test]
fn format_tokens() -> Result<()> {
    assert_eq!(parse_format("R16G16B16A16_SFLOAT")?, Some(vk::Format::R16G16B16A16_SFLOAT));
    assert_eq!(parse_format("D32_SFLOAT")?, Some(vk::Format::D32_SFLOAT));
    assert_eq!(parse_format("as_swapchain")?, None);
    assert!(matches!(
        parse_format("R9G9B9"),
        Err(Error::UnknownToken { kind: "format", token }) if token == "R9G9B9"
    ));
    Ok(())
}

#[test]
fn layout_tokens() -> Result<()> {
    assert_eq!(
        parse_image_layout("auto_depth_stencil_attachment_optimal")?,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    );
    assert_eq!(parse_image_layout("shader_read_only_optimal")?, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert_eq!(parse_image_layout("present_src")?, vk::ImageLayout::PRESENT_SRC_KHR);
    assert!(parse_image_layout("optimal").is_err());
    Ok(())
}

#[test]
fn usage_tokens() -> Result<()> {
    assert_eq!(
        parse_image_usage("ColorAttachment | Sampled")?,
        vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED
    );
    assert_eq!(parse_image_usage("")?, vk::ImageUsageFlags::empty());
    assert!(matches!(
        parse_image_usage("Storage|Sparkly"),
        Err(Error::UnknownToken { token, .. }) if token == "Sparkly"
    ));
    Ok(())
}

#[test]
fn enum_tokens() -> Result<()> {
    assert_eq!("as_swapchain".parse::<SizeClass>()?, SizeClass::SwapchainRelative);
    assert_eq!("absolute".parse::<SizeClass>()?, SizeClass::Absolute);
    assert!("relative".parse::<SizeClass>().is_err());

    assert_eq!("auto".parse::<MipLevels>()?, MipLevels::Auto);
    assert_eq!("4".parse::<MipLevels>()?, MipLevels::Count(4));
    assert!("0".parse::<MipLevels>().is_err());
    assert!("many".parse::<MipLevels>().is_err());

    assert_eq!("ColorAttachment".parse::<AttachmentType>()?, AttachmentType::Color);
    assert_eq!("DepthStencilAttachment".parse::<AttachmentType>()?, AttachmentType::Depth);
    Ok(())
}

#[test]
fn auto_mips() {
    let extent = |width, height| vk::Extent3D {
        width,
        height,
        depth: 1,
    };
    assert_eq!(auto_mip_levels(extent(1, 1)), 1);
    assert_eq!(auto_mip_levels(extent(256, 256)), 9);
    assert_eq!(auto_mip_levels(extent(1920, 1080)), 11);
    assert_eq!(auto_mip_levels(extent(0, 0)), 1);
}

#[test]
fn texture_resolution() {
    let settings = GraphSettingsBuilder::new()
        .swapchain(
            vk::Extent2D {
                width: 1280,
                height: 720,
            },
            vk::Format::B8G8R8A8_UNORM,
        )
        .build();

    let desc = TextureInfo::swapchain_relative(1.0, 1.0)
        .mips(MipLevels::Auto)
        .resolve(&settings);
    assert_eq!(desc.extent.width, 1280);
    assert_eq!(desc.extent.height, 720);
    assert_eq!(desc.format, vk::Format::B8G8R8A8_UNORM);
    assert_eq!(desc.mip_levels, 11);

    // Explicit counts are clamped to the full chain.
    let desc = TextureInfo::absolute(4, 4, vk::Format::R8_UNORM)
        .mips(MipLevels::Count(16))
        .resolve(&settings);
    assert_eq!(desc.mip_levels, 3);

    let tiny = TextureInfo::swapchain_relative(0.0001, 0.0001).resolve(&settings);
    assert_eq!((tiny.extent.width, tiny.extent.height), (1, 1));

    let a = TextureInfo::absolute(64, 64, vk::Format::R8_UNORM).resolve(&settings);
    let b = TextureInfo::absolute(64, 64, vk::Format::R8_UNORM)
        .usage(vk::ImageUsageFlags::STORAGE)
        .resolve(&settings);
    assert!(a.is_compatible(&b));
    let c = TextureInfo::absolute(64, 32, vk::Format::R8_UNORM).resolve(&settings);
    assert!(!a.is_compatible(&c));
}

#[test]
fn settings_builder() {
    let settings = GraphSettingsBuilder::new()
        .aliasing(false)
        .merge_passes(false)
        .recording_threads(0)
        .build();
    assert!(!settings.aliasing);
    assert!(!settings.merge_passes);
    assert!(settings.cull_unused);
    assert_eq!(settings.recording_threads, 1);
    assert!(GraphSettings::default().recording_threads >= 1);
}

#[test]
fn import_info() {
    let backbuffer = ImportInfo::backbuffer();
    assert_eq!(backbuffer.initial_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(backbuffer.final_layout, Some(vk::ImageLayout::PRESENT_SRC_KHR));
    assert_eq!(backbuffer.stages, PipelineStage::COLOR_ATTACHMENT_OUTPUT);

    let history = ImportInfo::new(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .final_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .after(PipelineStage::FRAGMENT_SHADER, vk::AccessFlags2::NONE);
    assert_eq!(history.stages, PipelineStage::FRAGMENT_SHADER);
    assert_eq!(history.final_layout, Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
}

#[test]
fn physical_bindings_alias() -> Result<()> {
    let mut bindings = PhysicalResourceBindings::new();
    assert!(bindings.alias("a", "missing").is_err());
    assert!(!bindings.contains("a"));
    assert!(bindings.resolve(&VirtualResource::image("a")).is_none());
    Ok(())
}

#[test]
fn creation_errors_keep_their_cause() {
    use anyhow::Context;

    let err = Err::<(), anyhow::Error>(Error::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).into())
        .with_context(|| Error::ImageCreation("gbuffer".to_owned()))
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::ImageCreation(name)) if name == "gbuffer"));
    assert!(err.chain().any(|cause| matches!(
        cause.downcast_ref::<Error>(),
        Some(Error::VkError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY))
    )));
}
