//! Which resource categories a configuration change invalidates.
//!
//! Every category has one [`Rule`]: a trigger over the (requested, applied) pair and the
//! upstream categories whose rebuild forces its own. Rules are listed in rebuild order and
//! evaluated once, before anything is touched.

use crate::rendering::state::{Algorithm, State, SurfaceInfo};
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    UniformBuffers,
    Scene,
    FrameImages,
    DescriptorSets,
    RenderPasses,
    /// Framebuffers and the descriptor writes, both reference buffers and image views.
    Framebuffers,
    Shaders,
    Pipelines,
}

impl Category {
    pub const REBUILD_ORDER: [Category; 8] = [
        Category::UniformBuffers,
        Category::Scene,
        Category::FrameImages,
        Category::DescriptorSets,
        Category::RenderPasses,
        Category::Framebuffers,
        Category::Shaders,
        Category::Pipelines,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Category::UniformBuffers => "uniform buffers",
            Category::Scene => "scene",
            Category::FrameImages => "frame images",
            Category::DescriptorSets => "descriptor sets",
            Category::RenderPasses => "render passes",
            Category::Framebuffers => "framebuffers",
            Category::Shaders => "shaders",
            Category::Pipelines => "pipelines",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The pair a reconciliation compares. Without an applied configuration the change is forced.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    pub requested: &'a State,
    pub applied: &'a State,
    pub surface: &'a SurfaceInfo,
    pub applied_surface: &'a SurfaceInfo,
    pub forced: bool,
}

impl Change<'_> {
    fn changed<T: PartialEq>(&self, field: impl Fn(&State) -> T) -> bool {
        field(self.requested) != field(self.applied)
    }

    fn frame_slots_changed(&self) -> bool {
        self.surface.frame_slots != self.applied_surface.frame_slots
    }
}

pub struct Rule {
    pub category: Category,
    pub trigger: fn(&Change) -> bool,
    pub upstream: &'static [Category],
}

pub static RULES: [Rule; 8] = [
    Rule {
        category: Category::UniformBuffers,
        trigger: |change| change.frame_slots_changed(),
        upstream: &[],
    },
    Rule {
        category: Category::Scene,
        trigger: |change| {
            change.changed(|s| s.num_objects)
                || change.changed(|s| s.scale_min)
                || change.changed(|s| s.scale_width)
                || change.changed(|s| s.subdiv)
        },
        upstream: &[],
    },
    Rule {
        category: Category::FrameImages,
        trigger: |change| {
            change.changed(|s| s.supersample())
                || change.changed(|s| s.msaa())
                || change.changed(|s| s.algorithm)
                || change.changed(|s| s.sample_shading())
                || change.changed(|s| s.oit_layers)
                || (change.requested.algorithm == Algorithm::LinkedList
                    && change.changed(|s| s.linked_list_allocated_per_element))
                || change.surface.extent != change.applied_surface.extent
        },
        upstream: &[],
    },
    Rule {
        category: Category::DescriptorSets,
        trigger: |change| {
            change.changed(|s| s.algorithm.profile().abuffer_binding) || change.frame_slots_changed()
        },
        upstream: &[],
    },
    Rule {
        category: Category::RenderPasses,
        trigger: |change| change.changed(|s| s.msaa()),
        upstream: &[],
    },
    Rule {
        category: Category::Framebuffers,
        trigger: |_| false,
        upstream: &[
            Category::UniformBuffers,
            Category::FrameImages,
            Category::DescriptorSets,
            Category::RenderPasses,
        ],
    },
    Rule {
        category: Category::Shaders,
        trigger: |change| {
            change.changed(|s| s.algorithm)
                || change.changed(|s| s.oit_layers)
                || change.changed(|s| s.tail_blend)
                || change.changed(|s| s.interlock_is_ordered)
                || change.changed(|s| s.msaa())
                || change.changed(|s| s.sample_shading())
        },
        upstream: &[],
    },
    Rule {
        category: Category::Pipelines,
        trigger: |change| change.changed(|s| s.algorithm),
        upstream: &[
            Category::Shaders,
            Category::FrameImages,
            Category::RenderPasses,
            Category::DescriptorSets,
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtySet {
    flags: [bool; 8],
}

impl DirtySet {
    pub fn all() -> Self {
        Self { flags: [true; 8] }
    }

    pub fn contains(&self, category: Category) -> bool {
        self.flags[category.index()]
    }

    pub fn insert(&mut self, category: Category) {
        self.flags[category.index()] = true;
    }

    pub fn is_empty(&self) -> bool {
        !self.flags.contains(&true)
    }

    pub fn len(&self) -> usize {
        self.flags.iter().filter(|&&flag| flag).count()
    }

    /// Dirty categories in rebuild order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = Category> + '_ {
        Category::REBUILD_ORDER
            .into_iter()
            .filter(|category| self.contains(*category))
    }
}

impl Display for DirtySet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return f.write_str("nothing");
        }
        for (i, category) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(category.name())?;
        }
        Ok(())
    }
}

/// Dirty flags of every category, computed in one pass over the rules. Upstream flags are final
/// by the time a dependent reads them because upstream categories come first.
pub fn evaluate(change: &Change) -> DirtySet {
    let mut dirty = DirtySet::default();
    for rule in &RULES {
        if change.forced
            || (rule.trigger)(change)
            || rule.upstream.iter().any(|&upstream| dirty.contains(upstream))
        {
            dirty.insert(rule.category);
        }
    }
    dirty
}
