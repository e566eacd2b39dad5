//! The pass graph module holds the render graph builder and the baking process.
//!
//! A [`PassGraph`] is filled with resource declarations and passes, and then baked into a [`BakedGraph`]. Baking
//! validates the declarations, culls passes that do not contribute to the frame, sorts the passes, assigns dependency
//! levels and physical resources, builds the barriers, batches passes into physical passes and plans the submits.
//! The baked graph can then be handed to a [`RenderGraph`](crate::RenderGraph) for execution, or inspected directly.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::Graph;

use crate::{Error, GraphSettings, QueueType};
use crate::graph::allocation::{allocate, Lifetime, PhysicalResourceInfo, ResourceAllocation, ResourceDeclaration};
use crate::graph::barrier::{build_barriers, BarrierPlan, PassBarriers};
use crate::graph::dependency::{DependencyEdge, DependencyGraph, DependencyKind};
use crate::graph::pass::Pass;
use crate::graph::physical_pass::{batch_passes, PhysicalPass};
use crate::graph::resource_info::{BufferInfo, ImportInfo, TextureInfo};
use crate::graph::submission::{plan_submissions, SubmissionPlan};
use crate::graph::virtual_resource::VirtualResource;

/// Render graph under construction. Resources are declared or imported first, then passes using them are added.
/// # Example
/// ```ignore
/// use deimos::prelude::*;
///
/// let swapchain = VirtualResource::image("swapchain");
/// let color = VirtualResource::image("color");
/// let graph = PassGraph::new()
///     .declare_texture(&color, TextureInfo::swapchain_relative(1.0, 1.0))?
///     .set_backbuffer(&swapchain)?
///     .add_pass(PassBuilder::render("main")
///         .clear_color_attachment(&color, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
///         .build())?
///     .add_pass(PassBuilder::render("blit")
///         .sample_image(&color, PipelineStage::FRAGMENT_SHADER)
///         .clear_color_attachment(&swapchain, ClearColor::Float([0.0, 0.0, 0.0, 1.0]))?
///         .build())?;
/// let baked = graph.bake(&GraphSettings::default())?;
/// ```
#[derive(Derivative, Default)]
#[derivative(Debug)]
pub struct PassGraph<'cb> {
    #[derivative(Debug = "ignore")]
    passes: Vec<Pass<'cb>>,
    resources: Vec<(String, ResourceDeclaration)>,
    aliases: Vec<(String, String)>,
    backbuffer: Option<String>,
}

impl<'cb> PassGraph<'cb> {
    /// Create an empty pass graph.
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(mut self, resource: &VirtualResource, declaration: ResourceDeclaration) -> Result<Self> {
        if self.declaration(resource.name()).is_some() {
            return Err(Error::DuplicateResource(resource.name().to_owned()).into());
        }
        if declaration.resource_type() != resource.resource_type() {
            return Err(Error::ResourceTypeMismatch(resource.name().to_owned()).into());
        }
        self.resources.push((resource.name().to_owned(), declaration));
        Ok(self)
    }

    /// Declare a transient texture. Its memory is owned by the graph.
    /// # Errors
    /// * Fails if a resource with this name was already declared.
    /// * Fails if `resource` is not an image.
    pub fn declare_texture(self, resource: &VirtualResource, info: TextureInfo) -> Result<Self> {
        self.declare(resource, ResourceDeclaration::Texture(info))
    }

    /// Declare a transient buffer. Its memory is owned by the graph.
    /// # Errors
    /// * Fails if a resource with this name was already declared.
    /// * Fails if `resource` is not a buffer.
    pub fn declare_buffer(self, resource: &VirtualResource, info: BufferInfo) -> Result<Self> {
        self.declare(resource, ResourceDeclaration::Buffer(info))
    }

    /// Import a resource owned by the application. It has to be bound through
    /// [`PhysicalResourceBindings`](crate::PhysicalResourceBindings) when the graph is executed.
    /// # Errors
    /// Fails if a resource with this name was already declared.
    pub fn import(self, resource: &VirtualResource, info: ImportInfo) -> Result<Self> {
        let ty = resource.resource_type();
        self.declare(
            resource,
            ResourceDeclaration::Imported {
                ty,
                info,
            },
        )
    }

    /// Set the image presented at the end of the frame. If it was not imported yet, it is imported with
    /// [`ImportInfo::backbuffer()`]. Otherwise its final layout is set to `PRESENT_SRC_KHR`.
    /// # Errors
    /// * Fails if `resource` is a buffer.
    /// * Fails if `resource` was declared as a transient texture.
    pub fn set_backbuffer(mut self, resource: &VirtualResource) -> Result<Self> {
        if !resource.is_image() {
            return Err(Error::ResourceTypeMismatch(resource.name().to_owned()).into());
        }
        let name = resource.name().to_owned();
        let existing = self
            .resources
            .iter()
            .position(|(declared, _)| declared == &name);
        match existing {
            Some(index) => match &mut self.resources[index].1 {
                ResourceDeclaration::Imported {
                    info, ..
                } => {
                    info.final_layout = Some(vk::ImageLayout::PRESENT_SRC_KHR);
                }
                _ => return Err(Error::DuplicateResource(name).into()),
            },
            None => {
                self = self.import(resource, ImportInfo::backbuffer())?;
            }
        }
        self.backbuffer = Some(name);
        Ok(self)
    }

    /// Request that `resource` shares the physical resource of `target`. The request is validated when baking.
    pub fn alias(mut self, target: &VirtualResource, resource: &VirtualResource) -> Self {
        self.aliases
            .push((target.name().to_owned(), resource.name().to_owned()));
        self
    }

    /// Add a pass to the graph. To obtain a pass, use the [`PassBuilder`](crate::graph::pass::PassBuilder).
    /// # Errors
    /// * Fails if a pass with the same name was already added.
    /// * Fails if the pass uses one image in two different layouts.
    /// * Fails if the pass uses a resource in a way that does not fit its type, like sampling a buffer.
    pub fn add_pass(mut self, pass: Pass<'cb>) -> Result<Self> {
        if self.passes.iter().any(|existing| existing.name == pass.name) {
            return Err(Error::DuplicatePass(pass.name).into());
        }

        let mut layouts: HashMap<&str, vk::ImageLayout> = HashMap::new();
        for access in pass.reads.iter().chain(pass.writes.iter()) {
            let name = access.resource.name();
            if let Some(required) = access.usage.required_type() {
                if required != access.resource.resource_type() {
                    return Err(Error::ResourceTypeMismatch(name.to_owned()).into());
                }
            }
            if !access.resource.is_image() {
                continue;
            }
            match layouts.get(name) {
                Some(&layout) if layout != access.layout => {
                    return Err(Error::ConflictingLayouts {
                        pass: pass.name.clone(),
                        resource: name.to_owned(),
                    }
                    .into());
                }
                _ => {
                    layouts.insert(name, access.layout);
                }
            }
        }

        #[cfg(feature = "log-objects")]
        trace!("Added pass `{}` on the {:?} queue", pass.name, pass.queue);
        self.passes.push(pass);
        Ok(self)
    }

    /// Amount of passes added so far.
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    /// Declaration of a resource, if it was declared or imported.
    pub fn declaration(&self, name: &str) -> Option<&ResourceDeclaration> {
        self.resources
            .iter()
            .find(|(declared, _)| declared == name)
            .map(|(_, declaration)| declaration)
    }

    fn validate(&self) -> Result<()> {
        for pass in &self.passes {
            for resource in pass.resources() {
                let declaration = self
                    .declaration(resource.name())
                    .ok_or_else(|| Error::UndeclaredResource(resource.name().to_owned()))?;
                if declaration.resource_type() != resource.resource_type() {
                    return Err(Error::ResourceTypeMismatch(resource.name().to_owned()).into());
                }
                if declaration.is_imported() || !pass.is_reader(resource.name()) {
                    continue;
                }
                let written = self
                    .passes
                    .iter()
                    .any(|other| other.is_writer(resource.name()));
                if !written {
                    return Err(Error::DanglingRead {
                        pass: pass.name.clone(),
                        resource: resource.name().to_owned(),
                    }
                    .into());
                }
            }
        }

        if let Some(backbuffer) = &self.backbuffer {
            if !self.passes.iter().any(|pass| pass.is_writer(backbuffer)) {
                return Err(Error::MissingBackbuffer(backbuffer.clone()).into());
            }
        }
        Ok(())
    }

    /// Drop every pass that does not contribute to the backbuffer, an imported resource or a persistent resource.
    /// Returns the names of the culled passes.
    fn cull(&mut self) -> Vec<String> {
        let dependencies = DependencyGraph::build(&self.passes);
        let roots = self
            .passes
            .iter()
            .enumerate()
            .filter(|(_, pass)| {
                pass.writes.iter().any(|write| {
                    self.declaration(write.resource.name())
                        .map_or(false, |decl| decl.is_imported() || decl.is_persistent())
                })
            })
            .map(|(index, _)| index)
            .collect::<Vec<_>>();
        let live = dependencies.live_passes(&roots);

        let mut culled = Vec::new();
        let mut index = 0;
        self.passes.retain(|pass| {
            let keep = live[index];
            index += 1;
            if !keep {
                debug!("Culling pass `{}`: its output is never used.", pass.name);
                culled.push(pass.name.clone());
            }
            keep
        });
        culled
    }

    /// Bake the graph so it can be executed.
    /// # Errors
    /// * Fails if a pass uses a resource that was not declared, or uses it with the wrong type.
    /// * Fails if a pass reads a transient resource that no pass writes.
    /// * Fails if a backbuffer was set, but no pass writes to it.
    /// * Fails if the passes depend on each other in a cycle.
    /// * Fails if an explicit alias request cannot be honoured.
    /// * Fails if mip generation is requested for a texture written outside the graphics queue.
    pub fn bake(mut self, settings: &GraphSettings) -> Result<BakedGraph<'cb>> {
        self.validate()?;

        let culled = if self.backbuffer.is_some() && settings.cull_unused {
            self.cull()
        } else {
            Vec::new()
        };

        let dependencies = DependencyGraph::build(&self.passes);
        let order = dependencies.topological_sort()?;
        let levels = dependencies.dependency_levels(&order);

        let mut positions = vec![0; order.len()];
        for (position, &pass) in order.iter().enumerate() {
            positions[pass] = position;
        }
        let levels = order.iter().map(|&pass| levels[pass]).collect::<Vec<_>>();
        let mut slots = self.passes.into_iter().map(Some).collect::<Vec<_>>();
        let passes = order
            .iter()
            .filter_map(|&pass| slots[pass].take())
            .collect::<Vec<_>>();

        let allocation = allocate(&self.resources, &passes, &self.aliases, settings)?;
        let declarations = self.resources.into_iter().collect::<HashMap<_, _>>();
        let barriers = build_barriers(&passes, &declarations, &allocation)?;
        let physical_passes = batch_passes(&passes, &levels, &barriers, &allocation, settings.merge_passes);

        let touches_frame = physical_passes
            .iter()
            .map(|physical| {
                self.backbuffer.as_ref().map_or(false, |backbuffer| {
                    physical.passes.iter().any(|&position| {
                        passes[position]
                            .resources()
                            .iter()
                            .any(|resource| resource.name() == backbuffer)
                    })
                })
            })
            .collect::<Vec<_>>();
        let submissions = plan_submissions(&physical_passes, &touches_frame);

        info!(
            "Baked render graph: {} passes ({} culled) in {} dependency levels, {} physical passes, {} physical resources, {} submits",
            passes.len(),
            culled.len(),
            levels.iter().max().map_or(0, |max| max + 1),
            physical_passes.len(),
            allocation.physical.len(),
            submissions.submits.len()
        );

        Ok(BakedGraph {
            passes,
            levels,
            dependencies,
            positions,
            declarations,
            allocation,
            barriers,
            physical_passes,
            submissions,
            backbuffer: self.backbuffer,
            culled,
            settings: settings.clone(),
        })
    }
}

/// A render graph that was validated, sorted and fully analyzed. Passes are stored in sorted order, and every per-pass
/// result is indexed by the sorted position of the pass.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BakedGraph<'cb> {
    #[derivative(Debug = "ignore")]
    pub(crate) passes: Vec<Pass<'cb>>,
    pub(crate) levels: Vec<u32>,
    /// Built over the surviving passes in registration order.
    dependencies: DependencyGraph,
    /// Sorted position of every surviving pass, by registration index.
    positions: Vec<usize>,
    pub(crate) declarations: HashMap<String, ResourceDeclaration>,
    pub(crate) allocation: ResourceAllocation,
    pub(crate) barriers: BarrierPlan,
    pub(crate) physical_passes: Vec<PhysicalPass>,
    pub(crate) submissions: SubmissionPlan,
    backbuffer: Option<String>,
    culled: Vec<String>,
    settings: GraphSettings,
}

impl<'cb> BakedGraph<'cb> {
    /// Names of the passes in execution order.
    pub fn order(&self) -> Vec<&str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Passes in execution order.
    pub fn passes(&self) -> &[Pass<'cb>] {
        &self.passes
    }

    /// Sorted position of a pass.
    pub fn position(&self, pass: &str) -> Option<usize> {
        self.passes.iter().position(|p| p.name() == pass)
    }

    pub fn pass(&self, name: &str) -> Option<&Pass<'cb>> {
        self.passes.iter().find(|pass| pass.name() == name)
    }

    /// Dependency level of a pass.
    pub fn level(&self, pass: &str) -> Option<u32> {
        self.position(pass).map(|position| self.levels[position])
    }

    /// Dependency level of every pass, in execution order.
    pub fn levels(&self) -> &[u32] {
        &self.levels
    }

    /// The passes on each dependency level, starting at level zero. Passes on one level do not depend on each other.
    pub fn dependency_levels(&self) -> Vec<Vec<&str>> {
        let count = self.levels.iter().max().map_or(0, |max| *max as usize + 1);
        let mut levels = vec![Vec::new(); count];
        for (pass, &level) in self.passes.iter().zip(self.levels.iter()) {
            levels[level as usize].push(pass.name());
        }
        levels
    }

    /// Find the pass that most recently wrote `resource` before `pass` executes. Returns `None` if no earlier
    /// pass writes it, in which case the contents come from outside the frame.
    pub fn last_written(&self, pass: &str, resource: &str) -> Option<&str> {
        let position = self.position(pass)?;
        self.passes[..position]
            .iter()
            .rev()
            .find(|candidate| candidate.is_writer(resource))
            .map(|candidate| candidate.name())
    }

    /// Names of the passes that were dropped because they do not contribute to the frame.
    pub fn culled(&self) -> &[String] {
        &self.culled
    }

    pub fn backbuffer(&self) -> Option<&str> {
        self.backbuffer.as_deref()
    }

    pub fn settings(&self) -> &GraphSettings {
        &self.settings
    }

    pub fn declaration(&self, resource: &str) -> Option<&ResourceDeclaration> {
        self.declarations.get(resource)
    }

    /// Physical resource a virtual resource is stored in.
    pub fn physical_index(&self, resource: &str) -> Option<usize> {
        self.allocation.physical_index(resource)
    }

    /// First and last use of a resource.
    pub fn lifetime(&self, resource: &str) -> Option<Lifetime> {
        self.allocation.lifetime(resource)
    }

    pub fn physical_resources(&self) -> &[PhysicalResourceInfo] {
        &self.allocation.physical
    }

    pub fn allocation(&self) -> &ResourceAllocation {
        &self.allocation
    }

    /// Barriers computed for a pass, before batching.
    pub fn barriers(&self, pass: &str) -> Option<&PassBarriers> {
        self.position(pass)
            .map(|position| &self.barriers.passes[position])
    }

    pub fn barrier_plan(&self) -> &BarrierPlan {
        &self.barriers
    }

    pub fn physical_passes(&self) -> &[PhysicalPass] {
        &self.physical_passes
    }

    pub fn submission_plan(&self) -> &SubmissionPlan {
        &self.submissions
    }

    /// The dependency graph the order was derived from.
    pub fn dependencies(&self) -> &DependencyGraph {
        &self.dependencies
    }

    /// Dependency edges as `(before, after)` pass names.
    pub fn dependency_edges(&self) -> Vec<(&str, &str, &DependencyEdge)> {
        self.dependencies
            .edges()
            .map(|(from, to, edge)| {
                (
                    self.passes[self.positions[from]].name(),
                    self.passes[self.positions[to]].name(),
                    edge,
                )
            })
            .collect()
    }
}

/// Trait that is implemented for the baked graph to help with debugging and visualizing the graph.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

fn queue_color(queue: QueueType) -> &'static str {
    match queue {
        QueueType::Graphics => "#5e6df7",
        QueueType::Compute => "#5ef78a",
        QueueType::Transfer => "#f7c65e",
    }
}

fn edge_attributes(_: &Graph<String, DependencyEdge>, edge: EdgeReference<DependencyEdge>) -> String {
    match edge.weight().kind {
        DependencyKind::ReadAfterWrite => String::from(""),
        DependencyKind::WriteAfterWrite => String::from("style = dashed"),
        DependencyKind::WriteAfterRead => String::from("style = dotted"),
    }
}

impl GraphViz for BakedGraph<'_> {
    fn dot(&self) -> Result<String> {
        let node_attributes = |_: &Graph<String, DependencyEdge>, (index, _): (NodeIndex, &String)| -> String {
            let queue = self
                .positions
                .get(index.index())
                .map_or(QueueType::Graphics, |&position| self.passes[position].queue);
            format!("style = filled fillcolor = \"{}\"", queue_color(queue))
        };
        Ok(format!(
            "{}",
            Dot::with_attr_getters(&self.dependencies.graph, &[], &edge_attributes, &node_attributes)
        ))
    }
}
