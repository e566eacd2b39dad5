//! Lifetime analysis and physical resource assignment.
//!
//! Every virtual resource used by a surviving pass gets a physical index. Transient resources whose lifetimes do not
//! overlap, whose descriptions are compatible and that are used on the same queue at the boundary between them share
//! one physical resource. The barrier builder inserts an alias transfer at the point where one occupant hands the memory
//! to the next.
//!
//! Imported and persistent resources always get their own physical resource. Explicit aliases requested through
//! [`PassGraph::alias()`](crate::PassGraph::alias) are honoured or rejected, never silently dropped.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::{Error, GraphSettings, QueueType};
use crate::graph::pass::Pass;
use crate::graph::resource::ResourceType;
use crate::graph::resource_info::{BufferDesc, BufferInfo, ImageDesc, ImportInfo, TextureInfo};

/// How a virtual resource was introduced to the graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceDeclaration {
    /// Transient texture, created by the graph.
    Texture(TextureInfo),
    /// Transient buffer, created by the graph.
    Buffer(BufferInfo),
    /// Resource owned by the application and bound at execution time.
    Imported {
        ty: ResourceType,
        info: ImportInfo,
    },
}

impl ResourceDeclaration {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceDeclaration::Texture(_) => ResourceType::Image,
            ResourceDeclaration::Buffer(_) => ResourceType::Buffer,
            ResourceDeclaration::Imported {
                ty, ..
            } => *ty,
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, ResourceDeclaration::Imported { .. })
    }

    /// Persistent resources keep their contents between frames.
    pub fn is_persistent(&self) -> bool {
        match self {
            ResourceDeclaration::Texture(info) => info.persistent,
            ResourceDeclaration::Buffer(info) => info.persistent,
            ResourceDeclaration::Imported {
                ..
            } => false,
        }
    }

    pub fn import_info(&self) -> Option<&ImportInfo> {
        match self {
            ResourceDeclaration::Imported {
                info, ..
            } => Some(info),
            _ => None,
        }
    }
}

/// First and last use of a resource, as positions in the sorted pass order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Lifetime {
    pub first: usize,
    pub last: usize,
    pub first_queue: QueueType,
    pub last_queue: QueueType,
}

impl Lifetime {
    pub fn overlaps(&self, other: &Lifetime) -> bool {
        self.first <= other.last && other.first <= self.last
    }
}

/// Description of a physical resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalDesc {
    Image(ImageDesc),
    Buffer(BufferDesc),
    /// Owned by the application, the graph only knows its type.
    Imported(ResourceType),
}

impl PhysicalDesc {
    pub fn is_compatible(&self, other: &PhysicalDesc) -> bool {
        match (self, other) {
            (PhysicalDesc::Image(lhs), PhysicalDesc::Image(rhs)) => lhs.is_compatible(rhs),
            (PhysicalDesc::Buffer(lhs), PhysicalDesc::Buffer(rhs)) => lhs.size == rhs.size,
            _ => false,
        }
    }

    fn merge_usage(&mut self, other: &PhysicalDesc) {
        match (self, other) {
            (PhysicalDesc::Image(lhs), PhysicalDesc::Image(rhs)) => lhs.usage |= rhs.usage,
            (PhysicalDesc::Buffer(lhs), PhysicalDesc::Buffer(rhs)) => lhs.usage |= rhs.usage,
            _ => {}
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        match self {
            PhysicalDesc::Image(_) => ResourceType::Image,
            PhysicalDesc::Buffer(_) => ResourceType::Buffer,
            PhysicalDesc::Imported(ty) => *ty,
        }
    }
}

/// One physical resource and the virtual resources that occupy it.
#[derive(Debug, Clone)]
pub struct PhysicalResourceInfo {
    pub desc: PhysicalDesc,
    /// Virtual resources backed by this physical resource, ordered by first use.
    pub occupants: Vec<String>,
    pub imported: bool,
    pub persistent: bool,
    /// Position of the last pass using this physical resource.
    pub(crate) last: usize,
    pub(crate) last_queue: QueueType,
    /// Explicitly aliased, excluded from automatic aliasing.
    pub(crate) pinned: bool,
}

impl PhysicalResourceInfo {
    /// Whether more than one virtual resource shares this physical resource.
    pub fn is_aliased(&self) -> bool {
        self.occupants.len() > 1
    }
}

/// Result of the physical resource assignment.
#[derive(Debug, Default, Clone)]
pub struct ResourceAllocation {
    pub physical: Vec<PhysicalResourceInfo>,
    pub(crate) assignment: HashMap<String, usize>,
    pub(crate) lifetimes: HashMap<String, Lifetime>,
}

impl ResourceAllocation {
    /// Physical index of a virtual resource, or `None` if no surviving pass uses it.
    pub fn physical_index(&self, resource: &str) -> Option<usize> {
        self.assignment.get(resource).copied()
    }

    pub fn lifetime(&self, resource: &str) -> Option<Lifetime> {
        self.lifetimes.get(resource).copied()
    }
}

/// Compute first and last use of every resource used by these passes, which must be in sorted order.
pub fn compute_lifetimes(passes: &[Pass<'_>]) -> HashMap<String, Lifetime> {
    let mut lifetimes: HashMap<String, Lifetime> = HashMap::new();
    for (position, pass) in passes.iter().enumerate() {
        for resource in pass.resources() {
            lifetimes
                .entry(resource.name().to_owned())
                .and_modify(|lifetime| {
                    lifetime.last = position;
                    lifetime.last_queue = pass.queue;
                })
                .or_insert(Lifetime {
                    first: position,
                    last: position,
                    first_queue: pass.queue,
                    last_queue: pass.queue,
                });
        }
    }
    lifetimes
}

/// Union of the usage flags all passes require from a resource.
fn pass_usage(passes: &[Pass<'_>], resource: &str) -> (vk::ImageUsageFlags, vk::BufferUsageFlags) {
    passes
        .iter()
        .flat_map(|pass| pass.reads.iter().chain(pass.writes.iter()))
        .filter(|access| access.resource.name() == resource)
        .fold(
            (vk::ImageUsageFlags::empty(), vk::BufferUsageFlags::empty()),
            |(image, buffer), access| (image | access.usage.image_usage(), buffer | access.usage.buffer_usage()),
        )
}

/// Resolve the physical description of a declared resource.
pub fn resolve_desc(
    declaration: &ResourceDeclaration,
    passes: &[Pass<'_>],
    name: &str,
    settings: &GraphSettings,
) -> PhysicalDesc {
    let (image_usage, buffer_usage) = pass_usage(passes, name);
    match declaration {
        ResourceDeclaration::Texture(info) => {
            let mut desc = info.resolve(settings);
            desc.usage |= image_usage;
            PhysicalDesc::Image(desc)
        }
        ResourceDeclaration::Buffer(info) => PhysicalDesc::Buffer(BufferDesc {
            size: info.size,
            usage: info.usage | buffer_usage,
        }),
        ResourceDeclaration::Imported {
            ty, ..
        } => PhysicalDesc::Imported(*ty),
    }
}

fn find_declaration<'a>(resources: &'a [(String, ResourceDeclaration)], name: &str) -> Result<&'a ResourceDeclaration> {
    resources
        .iter()
        .find(|(resource, _)| resource == name)
        .map(|(_, declaration)| declaration)
        .ok_or_else(|| Error::UndeclaredResource(name.to_owned()).into())
}

/// Assign physical resources to every used resource.
/// * `resources` are all declared resources, in declaration order.
/// * `passes` are the surviving passes, in sorted order.
/// * `aliases` are explicit alias requests, `(target, resource)` places `resource` onto `target`'s physical resource.
/// # Errors
/// Fails if an explicit alias involves an imported resource, incompatible descriptions or overlapping lifetimes.
pub fn allocate(
    resources: &[(String, ResourceDeclaration)],
    passes: &[Pass<'_>],
    aliases: &[(String, String)],
    settings: &GraphSettings,
) -> Result<ResourceAllocation> {
    let lifetimes = compute_lifetimes(passes);
    let mut allocation = ResourceAllocation {
        physical: Vec::new(),
        assignment: HashMap::new(),
        lifetimes,
    };

    let new_physical = |allocation: &mut ResourceAllocation,
                        name: &str,
                        declaration: &ResourceDeclaration,
                        lifetime: Lifetime,
                        pinned: bool| {
        allocation.physical.push(PhysicalResourceInfo {
            desc: resolve_desc(declaration, passes, name, settings),
            occupants: vec![name.to_owned()],
            imported: declaration.is_imported(),
            persistent: declaration.is_persistent(),
            last: lifetime.last,
            last_queue: lifetime.last_queue,
            pinned,
        });
        let index = allocation.physical.len() - 1;
        allocation.assignment.insert(name.to_owned(), index);
        index
    };

    // Explicit aliases first, they pin their physical resource.
    for (target, resource) in aliases {
        let target_decl = find_declaration(resources, target)?;
        let resource_decl = find_declaration(resources, resource)?;
        if target_decl.is_imported() {
            return Err(Error::AliasImported(target.clone()).into());
        }
        if resource_decl.is_imported() {
            return Err(Error::AliasImported(resource.clone()).into());
        }
        let (Some(target_lifetime), Some(resource_lifetime)) =
            (allocation.lifetime(target), allocation.lifetime(resource))
        else {
            debug!("Ignoring alias of `{resource}` onto `{target}`: one of them is unused.");
            continue;
        };

        let physical = match allocation.physical_index(target) {
            Some(index) => index,
            None => new_physical(&mut allocation, target, target_decl, target_lifetime, true),
        };
        if let Some(existing) = allocation.physical_index(resource) {
            if existing == physical {
                continue;
            }
            return Err(Error::AliasIncompatible(resource.clone(), target.clone()).into());
        }

        let desc = resolve_desc(resource_decl, passes, resource, settings);
        let info = &allocation.physical[physical];
        if target_decl.is_persistent() || resource_decl.is_persistent() || !info.desc.is_compatible(&desc) {
            return Err(Error::AliasIncompatible(resource.clone(), target.clone()).into());
        }
        let overlaps = info.occupants.iter().any(|occupant| {
            allocation
                .lifetime(occupant)
                .map_or(false, |lifetime| lifetime.overlaps(&resource_lifetime))
        });
        if overlaps {
            return Err(Error::AliasLifetimeOverlap(resource.clone(), target.clone()).into());
        }

        let info = &mut allocation.physical[physical];
        info.desc.merge_usage(&desc);
        info.occupants.push(resource.clone());
        if resource_lifetime.last > info.last {
            info.last = resource_lifetime.last;
            info.last_queue = resource_lifetime.last_queue;
        }
        allocation.assignment.insert(resource.clone(), physical);
        debug!("Aliased `{resource}` onto `{target}` (physical resource {physical}) on request.");
    }

    // Remaining resources, by first use. Ties are broken by declaration order.
    let mut pending = resources
        .iter()
        .enumerate()
        .filter(|(_, (name, _))| allocation.physical_index(name).is_none())
        .filter_map(|(index, (name, decl))| allocation.lifetime(name).map(|lifetime| (lifetime, index, name, decl)))
        .collect::<Vec<_>>();
    pending.sort_by_key(|(lifetime, index, _, _)| (lifetime.first, *index));

    for (lifetime, _, name, decl) in pending {
        let reusable = settings.aliasing && !decl.is_imported() && !decl.is_persistent();
        if reusable {
            let desc = resolve_desc(decl, passes, name, settings);
            let candidate = allocation.physical.iter().position(|info| {
                !info.imported
                    && !info.persistent
                    && !info.pinned
                    && info.desc.is_compatible(&desc)
                    && info.last < lifetime.first
                    && info.last_queue == lifetime.first_queue
            });
            if let Some(physical) = candidate {
                let info = &mut allocation.physical[physical];
                info.desc.merge_usage(&desc);
                info.occupants.push(name.clone());
                info.last = lifetime.last;
                info.last_queue = lifetime.last_queue;
                allocation.assignment.insert(name.clone(), physical);
                debug!("Aliased `{name}` onto physical resource {physical} (previous occupant: `{}`).", info.occupants[info.occupants.len() - 2]);
                continue;
            }
        }
        new_physical(&mut allocation, name, decl, lifetime, false);
    }

    let lifetimes = &allocation.lifetimes;
    for info in &mut allocation.physical {
        info.occupants
            .sort_by_key(|occupant| lifetimes.get(occupant).map(|lifetime| lifetime.first));
    }

    Ok(allocation)
}
