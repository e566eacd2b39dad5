use anyhow::Result;

use deimos::prelude::*;
use deimos::graph::dependency::DependencyKind;

mod framework;

use framework::{clear_pass, deimos_error, scenario_graph, small_texture};

#[test]
fn scenario_order_and_levels() -> Result<()> {
    framework::init_logging();
    let baked = scenario_graph()?.bake(&GraphSettings::default())?;

    assert_eq!(baked.order(), vec!["shadow", "geometry", "ui"]);
    assert_eq!(baked.levels(), &[0, 1, 2]);
    assert_eq!(
        baked.dependency_levels(),
        vec![vec!["shadow"], vec!["geometry"], vec!["ui"]]
    );
    Ok(())
}

#[test]
fn scenario_barriers() -> Result<()> {
    let baked = scenario_graph()?.bake(&GraphSettings::default())?;

    let shadow = baked.barriers("shadow").unwrap();
    assert!(shadow.invalidate.is_empty());
    assert_eq!(shadow.discards.len(), 1);
    assert_eq!(shadow.discards[0].resource, "shadow_map");

    // The shadow map goes from depth attachment to sampled image.
    let geometry = baked.barriers("geometry").unwrap();
    assert_eq!(geometry.invalidate.len(), 1);
    let transition = &geometry.invalidate[0];
    assert_eq!(transition.resource, "shadow_map");
    assert_eq!(transition.old_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
    assert_eq!(transition.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    assert!(transition.src_access.contains(vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE));
    assert_eq!(transition.dst_access, vk::AccessFlags2::SHADER_SAMPLED_READ);
    let discarded = geometry
        .discards
        .iter()
        .map(|barrier| barrier.resource.as_str())
        .collect::<Vec<_>>();
    assert_eq!(discarded, vec!["color", "depth"]);

    // The UI loads what geometry wrote, so the color write has to be made visible.
    let ui = baked.barriers("ui").unwrap();
    assert_eq!(ui.invalidate.len(), 1);
    let load = &ui.invalidate[0];
    assert_eq!(load.resource, "color");
    assert!(!load.is_layout_transition());
    assert_eq!(load.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    assert!(load.dst_access.contains(vk::AccessFlags2::COLOR_ATTACHMENT_READ));
    assert!(ui.discards.is_empty());

    let insertion_points = baked
        .barrier_plan()
        .passes
        .iter()
        .filter(|barriers| !barriers.invalidate.is_empty())
        .count();
    assert_eq!(insertion_points, 2);
    Ok(())
}

#[test]
fn scenario_physical_passes() -> Result<()> {
    let baked = scenario_graph()?.bake(&GraphSettings::default())?;
    // Geometry and UI render to different attachment sets, nothing is merged.
    assert_eq!(baked.physical_passes().len(), 3);
    let plan = baked.submission_plan();
    assert_eq!(plan.submits.len(), 1);
    assert_eq!(plan.submits[0].physical_passes, vec![0, 1, 2]);
    assert!(plan.semaphores.is_empty());
    assert!(plan.submits[0].waits_on_frame);
    assert!(plan.submits[0].signals_frame);
    assert!(plan.submits[0].signals_fence);
    Ok(())
}

#[test]
fn dependency_edges() -> Result<()> {
    let baked = scenario_graph()?.bake(&GraphSettings::default())?;
    let edges = baked.dependency_edges();
    assert!(edges
        .iter()
        .any(|(from, to, edge)| *from == "shadow" && *to == "geometry" && edge.kind == DependencyKind::ReadAfterWrite));
    assert!(edges
        .iter()
        .any(|(from, to, edge)| *from == "geometry" && *to == "ui" && edge.kind == DependencyKind::WriteAfterWrite));
    assert!(!edges.iter().any(|(from, to, _)| from == to));
    Ok(())
}

#[test]
fn bake_is_deterministic() -> Result<()> {
    let first = scenario_graph()?.bake(&GraphSettings::default())?;
    let second = scenario_graph()?.bake(&GraphSettings::default())?;

    assert_eq!(first.order(), second.order());
    assert_eq!(first.levels(), second.levels());
    assert_eq!(first.barrier_plan().passes, second.barrier_plan().passes);
    let occupants = |baked: &BakedGraph| {
        baked
            .physical_resources()
            .iter()
            .map(|info| info.occupants.clone())
            .collect::<Vec<_>>()
    };
    assert_eq!(occupants(&first), occupants(&second));
    Ok(())
}

#[test]
fn independent_passes_keep_registration_order() -> Result<()> {
    let a = VirtualResource::image("a");
    let b = VirtualResource::image("b");
    let baked = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .declare_texture(&b, small_texture())?
        .add_pass(clear_pass("first", &a)?)?
        .add_pass(clear_pass("second", &b)?)?
        .bake(&GraphSettings::default())?;
    assert_eq!(baked.order(), vec!["first", "second"]);
    assert_eq!(baked.levels(), &[0, 0]);
    assert_eq!(baked.dependency_levels(), vec![vec!["first", "second"]]);
    Ok(())
}

#[test]
fn cycle_is_rejected() -> Result<()> {
    let x = VirtualResource::buffer("x");
    let y = VirtualResource::buffer("y");
    let graph = PassGraph::new()
        .declare_buffer(&x, BufferInfo::new(1024))?
        .declare_buffer(&y, BufferInfo::new(1024))?
        .add_pass(
            PassBuilder::compute("a")
                .read_storage_buffer(&x, PipelineStage::COMPUTE_SHADER)
                .write_storage_buffer(&y, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::compute("b")
                .read_storage_buffer(&y, PipelineStage::COMPUTE_SHADER)
                .write_storage_buffer(&x, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?;

    let err = graph.bake(&GraphSettings::default()).unwrap_err();
    match deimos_error(&err) {
        Error::GraphHasCycle(passes) => {
            assert_eq!(passes.len(), 2);
            assert!(passes.contains(&"a".to_owned()));
            assert!(passes.contains(&"b".to_owned()));
        }
        other => panic!("expected a cycle, got {other}"),
    }
    Ok(())
}

#[test]
fn last_written_returns_most_recent_writer() -> Result<()> {
    let r = VirtualResource::buffer("r");
    let baked = PassGraph::new()
        .declare_buffer(&r, BufferInfo::new(256))?
        .add_pass(
            PassBuilder::compute("p1")
                .write_storage_buffer(&r, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::compute("p2")
                .write_storage_buffer(&r, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::compute("p3")
                .read_storage_buffer(&r, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .bake(&GraphSettings::default())?;

    assert_eq!(baked.order(), vec!["p1", "p2", "p3"]);
    assert_eq!(baked.last_written("p3", "r"), Some("p2"));
    assert_eq!(baked.last_written("p2", "r"), Some("p1"));
    assert_eq!(baked.last_written("p1", "r"), None);
    assert_eq!(baked.last_written("missing", "r"), None);
    Ok(())
}

#[test]
fn reader_registered_before_writer() -> Result<()> {
    let r = VirtualResource::buffer("r");
    let baked = PassGraph::new()
        .declare_buffer(&r, BufferInfo::new(256))?
        .add_pass(
            PassBuilder::compute("consume")
                .read_storage_buffer(&r, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(
            PassBuilder::compute("produce")
                .write_storage_buffer(&r, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .bake(&GraphSettings::default())?;
    assert_eq!(baked.order(), vec!["produce", "consume"]);
    assert_eq!(baked.last_written("consume", "r"), Some("produce"));
    Ok(())
}

fn culling_graph<'cb>() -> Result<PassGraph<'cb>> {
    let swapchain = VirtualResource::image("swapchain");
    let albedo = VirtualResource::image("albedo");
    let debug = VirtualResource::buffer("debug");
    let history = VirtualResource::image("history");

    PassGraph::new()
        .declare_texture(&albedo, small_texture())?
        .declare_buffer(&debug, BufferInfo::new(64))?
        .declare_texture(&history, small_texture().persistent())?
        .set_backbuffer(&swapchain)?
        .add_pass(clear_pass("gbuffer", &albedo)?)?
        .add_pass(
            PassBuilder::compute("debug_stats")
                .write_storage_buffer(&debug, PipelineStage::COMPUTE_SHADER)
                .build(),
        )?
        .add_pass(clear_pass("accumulate", &history)?)?
        .add_pass(
            PassBuilder::render("main")
                .sample_image(&albedo, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&swapchain, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
                .build(),
        )
}

#[test]
fn unused_passes_are_culled() -> Result<()> {
    let baked = culling_graph()?.bake(&GraphSettings::default())?;
    assert_eq!(baked.culled(), &["debug_stats".to_owned()]);
    // Writers of persistent resources are kept even if nothing reads them this frame. Independent passes keep
    // their registration order.
    assert_eq!(baked.order(), vec!["gbuffer", "accumulate", "main"]);
    assert_eq!(baked.levels(), &[0, 0, 1]);
    assert!(baked.physical_index("debug").is_none());
    assert_eq!(baked.backbuffer(), Some("swapchain"));

    let settings = GraphSettingsBuilder::new().cull_unused(false).build();
    let baked = culling_graph()?.bake(&settings)?;
    assert!(baked.culled().is_empty());
    assert_eq!(baked.passes().len(), 4);
    Ok(())
}

#[test]
fn backbuffer_is_transitioned_for_present() -> Result<()> {
    let swapchain = VirtualResource::image("swapchain");
    let baked = PassGraph::new()
        .set_backbuffer(&swapchain)?
        .add_pass(clear_pass("main", &swapchain)?)?
        .bake(&GraphSettings::default())?;

    let barriers = baked.barriers("main").unwrap();
    // Imported resources are never discarded, their initial state comes from the import.
    assert!(barriers.discards.is_empty());
    assert_eq!(barriers.invalidate.len(), 1);
    assert_eq!(barriers.invalidate[0].old_layout, vk::ImageLayout::UNDEFINED);
    assert_eq!(barriers.invalidate[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    assert_eq!(barriers.flush.len(), 1);
    assert_eq!(barriers.flush[0].new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    Ok(())
}

#[test]
fn duplicate_pass_is_rejected() -> Result<()> {
    let a = VirtualResource::image("a");
    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .add_pass(clear_pass("pass", &a)?)?
        .add_pass(clear_pass("pass", &a)?)
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::DuplicatePass(name) if name == "pass"));
    Ok(())
}

#[test]
fn duplicate_resource_is_rejected() -> Result<()> {
    let a = VirtualResource::image("a");
    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .import(&a, ImportInfo::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::DuplicateResource(name) if name == "a"));

    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .set_backbuffer(&a)
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::DuplicateResource(_)));
    Ok(())
}

#[test]
fn undeclared_resource_is_rejected() -> Result<()> {
    let a = VirtualResource::image("a");
    let err = PassGraph::new()
        .add_pass(clear_pass("pass", &a)?)?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::UndeclaredResource(name) if name == "a"));
    Ok(())
}

#[test]
fn dangling_read_is_rejected() -> Result<()> {
    let a = VirtualResource::image("a");
    let target = VirtualResource::image("target");
    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .declare_texture(&target, small_texture())?
        .add_pass(
            PassBuilder::render("pass")
                .sample_image(&a, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&target, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Error::DanglingRead { pass, resource } if pass == "pass" && resource == "a"
    ));

    // Imported resources may be read without a writer.
    let baked = PassGraph::new()
        .import(&a, ImportInfo::new(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL))?
        .declare_texture(&target, small_texture())?
        .add_pass(
            PassBuilder::render("pass")
                .sample_image(&a, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&target, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .bake(&GraphSettings::default())?;
    assert!(baked
        .barriers("pass")
        .unwrap()
        .invalidate
        .iter()
        .filter(|barrier| barrier.resource == "a")
        .all(|barrier| !barrier.is_layout_transition()));
    Ok(())
}

#[test]
fn conflicting_layouts_are_rejected() -> Result<()> {
    let a = VirtualResource::image("a");
    let pass = PassBuilder::render("pass")
        .sample_image(&a, PipelineStage::FRAGMENT_SHADER)
        .clear_color_attachment(&a, ClearColor::Float([0.0; 4]))?
        .build();
    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .add_pass(pass)
        .unwrap_err();
    assert!(matches!(
        deimos_error(&err),
        Error::ConflictingLayouts { pass, resource } if pass == "pass" && resource == "a"
    ));
    Ok(())
}

#[test]
fn resource_type_mismatch_is_rejected() -> Result<()> {
    let buffer = VirtualResource::buffer("buffer");
    let pass = PassBuilder::render("pass")
        .sample_image(&buffer, PipelineStage::FRAGMENT_SHADER)
        .build();
    let err = PassGraph::new()
        .declare_buffer(&buffer, BufferInfo::new(16))?
        .add_pass(pass)
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::ResourceTypeMismatch(name) if name == "buffer"));

    let err = PassGraph::new()
        .declare_texture(&buffer, small_texture())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::ResourceTypeMismatch(_)));
    Ok(())
}

#[test]
fn missing_backbuffer_write_is_rejected() -> Result<()> {
    let swapchain = VirtualResource::image("swapchain");
    let a = VirtualResource::image("a");
    let err = PassGraph::new()
        .declare_texture(&a, small_texture())?
        .set_backbuffer(&swapchain)?
        .add_pass(clear_pass("pass", &a)?)?
        .bake(&GraphSettings::default())
        .unwrap_err();
    assert!(matches!(deimos_error(&err), Error::MissingBackbuffer(name) if name == "swapchain"));
    Ok(())
}

#[test]
fn attachments_require_renderpass() {
    let a = VirtualResource::image("a");
    let err = PassBuilder::compute("pass")
        .clear_color_attachment(&a, ClearColor::Float([0.0; 4]))
        .err()
        .unwrap();
    assert!(matches!(deimos_error(&err), Error::InvalidPass(_)));

    let err = PassBuilder::render("pass")
        .color_attachment(&a, vk::AttachmentLoadOp::CLEAR, None)
        .err()
        .unwrap();
    assert!(matches!(deimos_error(&err), Error::NoClearValue));
}

#[test]
fn dot_output() -> Result<()> {
    let baked = scenario_graph()?.bake(&GraphSettings::default())?;
    let dot = baked.dot()?;
    assert!(dot.starts_with("digraph"));
    for pass in ["shadow", "geometry", "ui"] {
        assert!(dot.contains(pass), "missing pass `{pass}` in:\n{dot}");
    }
    // Write-after-write between geometry and ui.
    assert!(dot.contains("style = dashed"));
    Ok(())
}

/// Small deterministic generator for pass sets.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next() % bound
    }
}

/// Compute passes over a handful of buffers. Passes only read buffers an earlier pass wrote, and every pass writes.
fn generated_graph<'cb>(seed: u64) -> Result<PassGraph<'cb>> {
    const BUFFERS: u32 = 6;
    let mut rng = Lcg(seed);
    let mut written = Vec::new();
    let mut passes = Vec::new();
    for index in 0..2 + rng.below(10) {
        let mut pass = PassBuilder::compute(format!("pass{index}"));
        let mut used = Vec::new();
        for _ in 0..rng.below(3) {
            if written.is_empty() {
                break;
            }
            let name = written[rng.below(written.len() as u32) as usize];
            if !used.contains(&name) {
                used.push(name);
                pass = pass.read_storage_buffer(&VirtualResource::buffer(name), PipelineStage::COMPUTE_SHADER);
            }
        }
        let target = ["b0", "b1", "b2", "b3", "b4", "b5"][rng.below(BUFFERS) as usize];
        pass = pass.write_storage_buffer(&VirtualResource::buffer(target), PipelineStage::COMPUTE_SHADER);
        if !written.contains(&target) {
            written.push(target);
        }
        passes.push(pass.build());
    }

    let mut graph = PassGraph::new();
    for name in &written {
        graph = graph.declare_buffer(&VirtualResource::buffer(*name), BufferInfo::new(256))?;
    }
    for pass in passes {
        graph = graph.add_pass(pass)?;
    }
    Ok(graph)
}

#[test]
fn generated_graphs_sort_edges_forward() -> Result<()> {
    for seed in 0..64 {
        let baked = generated_graph(seed)?.bake(&GraphSettings::default())?;
        for (from, to, _) in baked.dependency_edges() {
            assert!(
                baked.position(from) < baked.position(to),
                "seed {seed}: `{from}` must be sorted before `{to}`"
            );
            assert!(baked.level(to) > baked.level(from), "seed {seed}: level of `{to}` must exceed `{from}`");
        }
    }
    Ok(())
}

#[test]
fn consecutive_reads_share_one_barrier() -> Result<()> {
    let source = VirtualResource::image("source");
    let first = VirtualResource::image("first");
    let second = VirtualResource::image("second");
    let baked = PassGraph::new()
        .declare_texture(&source, small_texture())?
        .declare_texture(&first, small_texture())?
        .declare_texture(&second, small_texture())?
        .add_pass(clear_pass("produce", &source)?)?
        .add_pass(
            PassBuilder::render("read_once")
                .sample_image(&source, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&first, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .add_pass(
            PassBuilder::render("read_again")
                .sample_image(&source, PipelineStage::FRAGMENT_SHADER)
                .clear_color_attachment(&second, ClearColor::Float([0.0; 4]))?
                .build(),
        )?
        .bake(&GraphSettings::default())?;

    let on_source = |pass: &str| {
        baked
            .barriers(pass)
            .unwrap()
            .invalidate
            .iter()
            .filter(|barrier| barrier.resource == "source")
            .count()
    };
    assert_eq!(on_source("read_once"), 1);
    assert_eq!(on_source("read_again"), 0);
    Ok(())
}
