use anyhow::Result;

use deimos::prelude::*;
use deimos::graph::allocation::{Lifetime, PhysicalDesc};

mod framework;

use framework::{clear_pass, deimos_error, small_texture};

/// `first` writes `a`, `second` reads `a` and writes `b`, `third` reads `b` and writes `c`.
/// `a` and `c` do not overlap.
fn chain<'cb>(c_info: TextureInfo, alias: Option<(&str, &str)>) -> Result<PassGraph<'cb>> {
    let a = VirtualResource::image("a");
    let b = VirtualResource::image("b");
    let c = VirtualResource::image("c");

    let mut graph = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .declare_texture(&b, small_texture())?
        .declare_texture(&c, c_info)?
        .add_pass(clear_pass("first", &a)?)?
        .add_pass(
            PassBuilder::render("second")
                .sample_image(&a, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&b, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .add_pass(
            PassBuilder::render("third")
                .sample_image(&b, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&c, ClearColor::Float([0.0; 4]))?
                .build(),
        )?;
    if let Some((target, resource)) = alias {
        graph = graph.alias(&VirtualResource::image(target), &VirtualResource::image(resource));
    }
    Ok(graph)
}

#[test]
fn disjoint_lifetimes_share_memory() -> Result<()> {
    framework::init_logging();
    let baked = chain(small_texture(), None)?.bake(&GraphSettings::default())?;

    assert_eq!(baked.physical_resources().len(), 2);
    assert_eq!(baked.physical_index("a"), baked.physical_index("c"));
    assert_ne!(baked.physical_index("a"), baked.physical_index("b"));

    let shared = &baked.physical_resources()[baked.physical_index("a").unwrap()];
    assert!(shared.is_aliased());
    assert_eq!(shared.occupants, vec!["a".to_owned(), "c".to_owned()]);

    // The new occupant takes over the memory with an alias barrier instead of a discard.
    let third = baked.barriers("third").unwrap();
    assert!(third.discards.is_empty());
    assert_eq!(third.alias_transfers.len(), 1);
    assert_eq!(third.alias_transfers[0].resource, "c");
    assert_eq!(third.alias_transfers[0].old_layout, vk::ImageLayout::UNDEFINED);
    Ok(())
}

#[test]
fn lifetimes_follow_sorted_order() -> Result<()> {
    let baked = chain(small_texture(), None)?.bake(&GraphSettings::default())?;
    assert_eq!(
        baked.lifetime("b"),
        Some(Lifetime {
            first: 1,
            last: 2,
            first_queue: QueueType::Graphics,
            last_queue: QueueType::Graphics,
        })
    );
    assert!(!baked.lifetime("a").unwrap().overlaps(&baked.lifetime("c").unwrap()));
    assert!(baked.lifetime("a").unwrap().overlaps(&baked.lifetime("b").unwrap()));
    Ok(())
}

#[test]
fn aliasing_can_be_disabled() -> Result<()> {
    let settings = GraphSettingsBuilder::new().aliasing(false).build();
    let baked = chain(small_texture(), None)?.bake(&settings)?;
    assert_eq!(baked.physical_resources().len(), 3);
    assert!(baked.physical_resources().iter().all(|info| !info.is_aliased()));
    Ok(())
}

#[test]
fn persistent_and_incompatible_resources_are_not_aliased() -> Result<()> {
    let baked = chain(small_texture().persistent(), None)?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_resources().len(), 3);
    let c = &baked.physical_resources()[baked.physical_index("c").unwrap()];
    assert!(c.persistent);

    let other_format = TextureInfo::absolute(256, 256, vk::Format::R16G16B16A16_SFLOAT);
    let baked = chain(other_format, None)?.bake(&GraphSettings::default())?;
    assert_eq!(baked.physical_resources().len(), 3);
    Ok(())
}

#[test]
fn explicit_alias() -> Result<()> {
    // Explicit requests are honoured even with automatic aliasing turned off.
    let settings = GraphSettingsBuilder::new().aliasing(false).build();
    let baked = chain(small_texture(), Some(("a", "c")))?.bake(&settings)?;
    assert_eq!(baked.physical_index("a"), baked.physical_index("c"));
    assert_eq!(baked.physical_resources().len(), 2);
    Ok(())
}

#[test]
fn explicit_alias_with_overlap_is_rejected() -> Result<()> {
    let err = chain(small_texture(), Some(("a", "b")))?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Error::AliasLifetimeOverlap(resource, target) if resource == "b" && target == "a"
    ));
    Ok(())
}

#[test]
fn explicit_alias_of_incompatible_resources_is_rejected() -> Result<()> {
    let other_format = TextureInfo::absolute(256, 256, vk::Format::R16G16B16A16_SFLOAT);
    let err = chain(other_format, Some(("a", "c")))?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::AliasIncompatible(resource, _) if resource == "c"));
    Ok(())
}

#[test]
fn explicit_alias_of_imported_resource_is_rejected() -> Result<()> {
    let external = VirtualResource::image("external");
    let err = chain(small_texture(), None)?
        .import(&external, ImportInfo::default())?
        .alias(&external, &VirtualResource::image("c"))
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::AliasImported(name) if name == "external"));
    Ok(())
}

#[test]
fn swapchain_relative_textures() -> Result<()> {
    let half = VirtualResource::image("half");
    let settings = GraphSettingsBuilder::new()
        .swapchain(
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            vk::Format::B8G8R8A8_SRGB,
        )
        .build();
    let baked = PassGraph::new()
        .declare_texture(&half, TextureInfo::swapchain_relative(0.5, 0.5))?
        .add_pass(clear_pass("pass", &half)?)?
        .bake(&settings)?;

    let PhysicalDesc::Image(desc) = baked.physical_resources()[0].desc else {
        panic!("expected an image");
    };
    assert_eq!(
        desc.extent,
        vk::Extent3D {
            width: 960,
            height: 540,
            depth: 1,
        }
    );
    assert_eq!(desc.format, vk::Format::B8G8R8A8_SRGB);
    assert_eq!(desc.mip_levels, 1);
    assert!(desc.usage.contains(vk::ImageUsageFlags::COLOR_ATTACHMENT));
    Ok(())
}

#[test]
fn usage_is_derived_from_passes() -> Result<()> {
    let baked = chain(small_texture(), None)?.bake(&GraphSettings::default())?;
    let PhysicalDesc::Image(desc) = baked.physical_resources()[baked.physical_index("b").unwrap()].desc else {
        panic!("expected an image");
    };
    assert!(desc
        .usage
        .contains(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED));
    Ok(())
}

#[test]
fn mip_chain_generation() -> Result<()> {
    let bloom = VirtualResource::image("bloom");
    let info = small_texture().mips(MipLevels::Auto).generate_mips();
    let baked = PassGraph::new()
        .declare_texture(&bloom, info)?
        .add_pass(clear_pass("bloom", &bloom)?)?
        .bake(&GraphSettings::default())?;

    let PhysicalDesc::Image(desc) = baked.physical_resources()[0].desc else {
        panic!("expected an image");
    };
    assert_eq!(desc.mip_levels, 9);
    assert!(desc
        .usage
        .contains(vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST));
    let mips = &baked.barriers("bloom").unwrap().mips;
    assert_eq!(mips.len(), 1);
    assert_eq!(mips[0].from_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    // Blits need the graphics queue.
    let err = PassGraph::new()
        .declare_texture(&bloom, info)?
        .add_pass(
            PassBuilder::compute("bloom")
                .write_storage_image(&bloom, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::InvalidPass(_)));
    Ok(())
}
