// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Layout allocation.

This module walks a signature's class-sorted resource list once and decides,
for every resource, where it lives at draw time:

- single buffers that may be dynamically updated become direct **root
  views**;
- everything else lands in a **descriptor table**, bucketed by canonical
  stage visibility and by whether the resource's class is dynamic;
- sampler resources claimed by an immutable sampler consume a bind point but
  no table slot;
- static-class resources additionally get a slot in the signature's own
  snapshot cache, bucketed by native range kind.

The result is a [`Layout`]: per-resource [`ResourceAttribs`] plus the
finished [`RootParamsManager`].
*/

pub mod root_params;

use std::collections::HashMap;

use crate::backend::HeapKind;
use crate::cache::CacheContent;
use crate::layout::root_params::{DescriptorRange, RootGroup, RootParamsManager};
use crate::signature::SignatureError;
use crate::signature::descriptor::{
    ImmutableSamplerDesc, RangeKind, ResourceDescriptor, ResourceFlags, ResourceKind,
    ShaderStages, VariableClass, matches_with_suffix,
};

/// Where one resource lives, as decided by layout allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceAttribs {
    /// First shader register of the resource within its register space.
    pub bind_point: u32,
    pub register_space: u32,
    /// For a combined-sampler texture, the index of its assigned sampler
    /// resource in the sorted list.
    pub assigned_sampler: Option<usize>,
    /// True for sampler resources claimed by an immutable sampler; such
    /// slots never hold a bound object.
    pub immutable_sampler: bool,
    /// True for direct root views.
    pub root_view: bool,
    /// Root parameter index in binding contexts, `None` for
    /// immutable-claimed samplers.
    pub context_root_index: Option<u32>,
    /// Descriptor offset from the start of the context table (unused for
    /// root views).
    pub context_offset: u32,
    /// Artificial root index in the signature's static snapshot cache:
    /// the native range-kind bucket.  `None` for non-static resources.
    pub static_root_index: Option<u32>,
    pub static_offset: u32,
}

impl ResourceAttribs {
    /// The root index in the given cache, if the resource occupies it.
    pub fn root_index(&self, content: CacheContent) -> Option<u32> {
        match content {
            CacheContent::Signature => self.static_root_index,
            CacheContent::Context => self.context_root_index,
        }
    }

    pub fn offset(&self, content: CacheContent) -> u32 {
        match content {
            CacheContent::Signature => self.static_offset,
            CacheContent::Context => self.context_offset,
        }
    }
}

/// Register assignment for one immutable sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmutableSamplerAttribs {
    pub bind_point: u32,
    pub register_space: u32,
    pub array_size: u32,
}

/// Output of [`build`].
#[derive(Debug)]
pub struct Layout {
    /// Parallel to the sorted resource list.
    pub attribs: Vec<ResourceAttribs>,
    pub params: RootParamsManager,
    /// Parallel to the immutable sampler list.
    pub immutable_samplers: Vec<ImmutableSamplerAttribs>,
    /// Descriptor counts of the signature's static snapshot cache, indexed
    /// by [`RangeKind`] discriminant.
    pub static_table_sizes: [u32; RangeKind::COUNT],
}

/// Canonical visibility for table bucketing.
///
/// Multi-stage visibility, compute, and all ray-tracing stages collapse to
/// the all-stages bucket; each remaining graphics stage maps to a fixed
/// bucket so that signatures built from equivalent descriptions produce
/// identical root parameter order.
fn canonical_visibility(stages: ShaderStages) -> ShaderStages {
    if !stages.is_single_stage() {
        return ShaderStages::all();
    }
    if stages.contains(ShaderStages::COMPUTE) || stages.intersects(ShaderStages::ALL_RAY_TRACING) {
        return ShaderStages::all();
    }
    stages
}

/// True if the resource binds inline as a root view rather than through a
/// descriptor table.
fn is_root_view(desc: &ResourceDescriptor) -> bool {
    desc.kind.is_buffer()
        && desc.array_size == 1
        && !desc.flags.contains(ResourceFlags::NO_DYNAMIC_BUFFERS)
        && !desc.flags.contains(ResourceFlags::FORMATTED_BUFFER)
        && !desc.flags.contains(ResourceFlags::RUNTIME_ARRAY)
}

/// Finds the sampler resource assigned to a combined-sampler texture: same
/// variable class, intersecting stages, name equal to the texture's name
/// plus the suffix.
pub(crate) fn find_assigned_sampler(
    resources: &[ResourceDescriptor],
    texture: &ResourceDescriptor,
    suffix: &str,
) -> Option<usize> {
    resources.iter().position(|r| {
        r.kind == ResourceKind::Sampler
            && r.class == texture.class
            && r.stages.intersects(texture.stages)
            && matches_with_suffix(&r.name, &texture.name, Some(suffix))
    })
}

/// Finds the immutable sampler claiming a sampler resource.  Under the
/// combined convention the immutable sampler is named after the texture, so
/// the sampler resource's name must equal the immutable name plus the
/// suffix; without the convention the names match exactly.
pub(crate) fn find_immutable_sampler(
    immutable: &[ImmutableSamplerDesc],
    sampler: &ResourceDescriptor,
    suffix: Option<&str>,
) -> Option<usize> {
    immutable.iter().position(|s| {
        s.stages.intersects(sampler.stages) && matches_with_suffix(&sampler.name, &s.name, suffix)
    })
}

/// Builds the layout for a class-sorted resource list.
///
/// `base_space` is the signature's first register space; runtime-sized
/// arrays claim successive spaces after it.  Fails with
/// [`SignatureError::TooManyRootSlots`] when the root parameter count would
/// exceed `max_root_slots`.
pub fn build(
    label: &str,
    resources: &[ResourceDescriptor],
    immutable: &[ImmutableSamplerDesc],
    suffix: Option<&str>,
    base_space: u32,
    max_root_slots: u32,
) -> Result<Layout, SignatureError> {
    let mut params = RootParamsManager::new();
    let mut attribs: Vec<ResourceAttribs> = Vec::with_capacity(resources.len());
    // Next free shader register in the base space, per native range kind.
    let mut packed_counter = [0u32; RangeKind::COUNT];
    let mut static_counter = [0u32; RangeKind::COUNT];
    let mut next_runtime_space = base_space + 1;
    // (canonical visibility, root group, heap) -> index into params.tables().
    let mut table_map: HashMap<(ShaderStages, RootGroup, HeapKind), usize> = HashMap::new();
    // Immutable sampler index -> claiming resource index.
    let mut claimed: Vec<Option<usize>> = vec![None; immutable.len()];

    for (res_index, res) in resources.iter().enumerate() {
        let range_kind = res.kind.range_kind();
        let runtime_array = res.flags.contains(ResourceFlags::RUNTIME_ARRAY);
        let immutable_match = if res.kind == ResourceKind::Sampler {
            find_immutable_sampler(immutable, res, suffix)
        } else {
            None
        };

        let (bind_point, register_space) = if runtime_array {
            let space = next_runtime_space;
            next_runtime_space += 1;
            (0, space)
        } else if let Some(first) = immutable_match.and_then(|sam| claimed[sam]) {
            // A later claimant of an already-claimed immutable sampler
            // reuses the first claimant's register; no new one is consumed.
            (attribs[first].bind_point, attribs[first].register_space)
        } else {
            let register = packed_counter[range_kind as usize];
            packed_counter[range_kind as usize] += res.array_size;
            (register, base_space)
        };

        let assigned_sampler = if res.flags.contains(ResourceFlags::COMBINED_SAMPLER) {
            suffix.and_then(|suffix| find_assigned_sampler(resources, res, suffix))
        } else {
            None
        };

        let immutable_sampler = match immutable_match {
            Some(sam) => {
                if claimed[sam].is_none() {
                    claimed[sam] = Some(res_index);
                }
                true
            }
            None => false,
        };

        if immutable_sampler {
            // The register is assigned, but no cache slot exists: the
            // sampler state is baked into the root signature itself.
            attribs.push(ResourceAttribs {
                bind_point,
                register_space,
                assigned_sampler: None,
                immutable_sampler: true,
                root_view: false,
                context_root_index: None,
                context_offset: 0,
                static_root_index: None,
                static_offset: 0,
            });
            continue;
        }

        let group = if res.class == VariableClass::Dynamic {
            RootGroup::Dynamic
        } else {
            RootGroup::StaticMutable
        };

        let (context_root_index, context_offset, root_view) = if is_root_view(res) {
            let root_index = params.add_root_view(
                group,
                canonical_visibility(res.stages),
                range_kind,
                bind_point,
                register_space,
            );
            (root_index, 0, true)
        } else {
            let heap = range_kind.heap_kind();
            let key = (canonical_visibility(res.stages), group, heap);
            let table_ind = match table_map.get(&key) {
                Some(&ind) => ind,
                None => {
                    let ind = params.add_root_table(group, key.0, heap);
                    table_map.insert(key, ind);
                    ind
                }
            };
            let offset = params.tables()[table_ind].table_size();
            params.add_range(
                table_ind,
                DescriptorRange {
                    kind: range_kind,
                    base_register: bind_point,
                    register_space,
                    count: res.array_size,
                    offset_from_table_start: offset,
                },
            );
            (params.tables()[table_ind].root_index(), offset, false)
        };

        let (static_root_index, static_offset) = if res.class == VariableClass::Static {
            let offset = static_counter[range_kind as usize];
            static_counter[range_kind as usize] += res.array_size;
            (Some(range_kind as u32), offset)
        } else {
            (None, 0)
        };

        attribs.push(ResourceAttribs {
            bind_point,
            register_space,
            assigned_sampler,
            immutable_sampler: false,
            root_view,
            context_root_index: Some(context_root_index),
            context_offset,
            static_root_index,
            static_offset,
        });
    }

    // Immutable samplers claimed by a resource reuse the resource's bind
    // point; the rest get trailing sampler registers.
    let mut immutable_attribs = Vec::with_capacity(immutable.len());
    for claiming in &claimed {
        let attr = match claiming {
            Some(res_index) => ImmutableSamplerAttribs {
                bind_point: attribs[*res_index].bind_point,
                register_space: attribs[*res_index].register_space,
                array_size: resources[*res_index].array_size,
            },
            None => {
                let register = packed_counter[RangeKind::Sampler as usize];
                packed_counter[RangeKind::Sampler as usize] += 1;
                ImmutableSamplerAttribs {
                    bind_point: register,
                    register_space: base_space,
                    array_size: 1,
                }
            }
        };
        immutable_attribs.push(attr);
    }

    if params.root_count() > max_root_slots {
        return Err(SignatureError::TooManyRootSlots {
            used: params.root_count(),
            max: max_root_slots,
        });
    }

    logwise::trace_sync!(
        "layout built for {label}: {tables} tables, {views} root views",
        label = logwise::privacy::LogIt(&label),
        tables = params.tables().len(),
        views = params.views().len()
    );

    Ok(Layout {
        attribs,
        params,
        immutable_samplers: immutable_attribs,
        static_table_sizes: static_counter,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::descriptor::ResourceKind;

    fn tex(name: &str, stages: ShaderStages, class: VariableClass) -> ResourceDescriptor {
        ResourceDescriptor::new(name, stages, ResourceKind::TextureSrv, class)
    }

    #[test]
    fn single_buffer_becomes_root_view() {
        let resources = vec![ResourceDescriptor::new(
            "cb",
            ShaderStages::VERTEX,
            ResourceKind::ConstantBuffer,
            VariableClass::Static,
        )];
        let layout = build("t", &resources, &[], None, 0, 64).unwrap();
        assert!(layout.attribs[0].root_view);
        assert_eq!(layout.params.views().len(), 1);
        assert_eq!(layout.params.tables().len(), 0);
    }

    #[test]
    fn no_dynamic_buffers_flag_forces_table() {
        let resources = vec![
            ResourceDescriptor::new(
                "cb",
                ShaderStages::VERTEX,
                ResourceKind::ConstantBuffer,
                VariableClass::Static,
            )
            .with_flags(ResourceFlags::NO_DYNAMIC_BUFFERS),
        ];
        let layout = build("t", &resources, &[], None, 0, 64).unwrap();
        assert!(!layout.attribs[0].root_view);
        assert_eq!(layout.params.tables().len(), 1);
    }

    #[test]
    fn visibility_and_class_bucket_tables() {
        let resources = vec![
            tex("a", ShaderStages::PIXEL, VariableClass::Mutable),
            tex("b", ShaderStages::PIXEL, VariableClass::Mutable),
            tex("c", ShaderStages::VERTEX, VariableClass::Mutable),
            tex("d", ShaderStages::PIXEL, VariableClass::Dynamic),
        ];
        let layout = build("t", &resources, &[], None, 0, 64).unwrap();
        // pixel/persistent, vertex/persistent, pixel/dynamic.
        assert_eq!(layout.params.tables().len(), 3);
        assert_eq!(layout.attribs[0].context_root_index, layout.attribs[1].context_root_index);
        assert_ne!(layout.attribs[0].context_root_index, layout.attribs[2].context_root_index);
        assert_ne!(layout.attribs[0].context_root_index, layout.attribs[3].context_root_index);
        // Shared table packs offsets contiguously, registers too.
        assert_eq!(layout.attribs[0].context_offset, 0);
        assert_eq!(layout.attribs[1].context_offset, 1);
        assert_eq!(layout.attribs[1].bind_point, 1);
    }

    #[test]
    fn multi_stage_and_compute_share_the_all_bucket() {
        let resources = vec![
            tex("a", ShaderStages::VERTEX | ShaderStages::PIXEL, VariableClass::Mutable),
            tex("b", ShaderStages::COMPUTE, VariableClass::Mutable),
        ];
        let layout = build("t", &resources, &[], None, 0, 64).unwrap();
        assert_eq!(layout.params.tables().len(), 2);
    }

    #[test]
    fn runtime_array_takes_its_own_space() {
        let resources = vec![
            tex("a", ShaderStages::PIXEL, VariableClass::Mutable),
            tex("arr", ShaderStages::PIXEL, VariableClass::Mutable)
                .with_flags(ResourceFlags::RUNTIME_ARRAY)
                .with_array_size(8),
            tex("b", ShaderStages::PIXEL, VariableClass::Mutable),
        ];
        let layout = build("t", &resources, &[], None, 3, 64).unwrap();
        assert_eq!(layout.attribs[0].register_space, 3);
        assert_eq!(layout.attribs[1].register_space, 4);
        assert_eq!(layout.attribs[1].bind_point, 0);
        // The runtime array does not advance the packed register counter.
        assert_eq!(layout.attribs[2].bind_point, 1);
        assert_eq!(layout.attribs[2].register_space, 3);
    }

    #[test]
    fn immutable_claimed_sampler_gets_no_cache_slot() {
        let resources = vec![ResourceDescriptor::new(
            "sam",
            ShaderStages::PIXEL,
            ResourceKind::Sampler,
            VariableClass::Static,
        )];
        let immutable = vec![ImmutableSamplerDesc::new(
            "sam",
            ShaderStages::PIXEL,
            Default::default(),
        )];
        let layout = build("t", &resources, &immutable, None, 0, 64).unwrap();
        assert!(layout.attribs[0].immutable_sampler);
        assert_eq!(layout.attribs[0].context_root_index, None);
        assert_eq!(layout.params.tables().len(), 0);
        assert_eq!(layout.immutable_samplers[0].bind_point, layout.attribs[0].bind_point);
    }

    #[test]
    fn immutable_sampler_claimants_share_one_register() {
        // Same sampler name on disjoint stages, both claimed by one
        // immutable sampler spanning those stages.
        let resources = vec![
            ResourceDescriptor::new("sam", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Mutable),
            ResourceDescriptor::new("sam", ShaderStages::VERTEX, ResourceKind::Sampler, VariableClass::Mutable),
            ResourceDescriptor::new("other", ShaderStages::PIXEL, ResourceKind::Sampler, VariableClass::Mutable),
        ];
        let immutable = vec![ImmutableSamplerDesc::new(
            "sam",
            ShaderStages::PIXEL | ShaderStages::VERTEX,
            Default::default(),
        )];
        let layout = build("t", &resources, &immutable, None, 0, 64).unwrap();
        assert!(layout.attribs[0].immutable_sampler);
        assert!(layout.attribs[1].immutable_sampler);
        assert_eq!(layout.attribs[0].bind_point, layout.attribs[1].bind_point);
        // The second claimant consumed no register, so the unrelated
        // sampler takes register 1.
        assert_eq!(layout.attribs[2].bind_point, 1);
        // The immutable sampler reports the first claimant's register.
        assert_eq!(layout.immutable_samplers[0].bind_point, layout.attribs[0].bind_point);
    }

    #[test]
    fn unmatched_immutable_sampler_gets_trailing_register() {
        let resources = vec![ResourceDescriptor::new(
            "sam",
            ShaderStages::PIXEL,
            ResourceKind::Sampler,
            VariableClass::Mutable,
        )];
        let immutable = vec![ImmutableSamplerDesc::new(
            "other",
            ShaderStages::PIXEL,
            Default::default(),
        )];
        let layout = build("t", &resources, &immutable, None, 0, 64).unwrap();
        assert!(!layout.attribs[0].immutable_sampler);
        assert_eq!(layout.attribs[0].bind_point, 0);
        assert_eq!(layout.immutable_samplers[0].bind_point, 1);
    }

    #[test]
    fn root_slot_cap_is_enforced() {
        let resources = vec![
            tex("a", ShaderStages::PIXEL, VariableClass::Mutable),
            tex("b", ShaderStages::VERTEX, VariableClass::Mutable),
        ];
        let err = build("t", &resources, &[], None, 0, 1).unwrap_err();
        assert!(matches!(err, SignatureError::TooManyRootSlots { used: 2, max: 1 }));
    }

    #[test]
    fn static_snapshot_offsets_run_per_range_kind() {
        let resources = vec![
            ResourceDescriptor::new("t0", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Static),
            ResourceDescriptor::new("t1", ShaderStages::PIXEL, ResourceKind::TextureSrv, VariableClass::Static)
                .with_array_size(3),
            ResourceDescriptor::new("u0", ShaderStages::PIXEL, ResourceKind::TextureUav, VariableClass::Static),
        ];
        let layout = build("t", &resources, &[], None, 0, 64).unwrap();
        assert_eq!(layout.attribs[0].static_root_index, Some(RangeKind::Srv as u32));
        assert_eq!(layout.attribs[1].static_offset, 1);
        assert_eq!(layout.attribs[2].static_root_index, Some(RangeKind::Uav as u32));
        assert_eq!(layout.attribs[2].static_offset, 0);
        assert_eq!(layout.static_table_sizes, [4, 1, 0, 0]);
    }
}
