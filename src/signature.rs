// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Resource signatures.

A [`Signature`] is the validated, immutable shape of everything a set of
shaders can bind: its resources sorted by update frequency, the native slot
each one was assigned by [layout allocation](crate::layout), a snapshot cache
for static-class bindings, and a content hash for fast compatibility checks.

Construction is two-phase in the ownership sense only: build the signature,
bind its static resources while it is still uniquely owned, then wrap it in
an [`Arc`] and mint [binding contexts](crate::binding::BindingContext) from
it.

```
use signatures_and_slots::backend::headless::{Headless, Heaps, Object};
use signatures_and_slots::signature::Signature;
use signatures_and_slots::signature::descriptor::*;

let desc = SignatureDesc {
    label: "demo".into(),
    resources: vec![ResourceDescriptor::new(
        "globals",
        ShaderStages::VERTEX,
        ResourceKind::ConstantBuffer,
        VariableClass::Static,
    )],
    ..Default::default()
};
let mut signature: Signature<Headless> = Signature::new(&desc).unwrap();
let res = signature.find_resource(ShaderStages::VERTEX, "globals").unwrap();
signature.bind_static_resource(res, 0, Some(Object::buffer("globals")));
let signature = std::sync::Arc::new(signature);

let heaps = Heaps::new(128, 16);
let context = signature.create_binding_context(&heaps, true).unwrap();
assert!(context.is_bound(res, 0));
```
*/

pub mod descriptor;

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::backend::{Backend, HeapExhausted};
use crate::binding::BindingContext;
use crate::cache::ResourceCache;
use crate::layout::root_params::RootParamsManager;
use crate::layout::{self, ImmutableSamplerAttribs, ResourceAttribs};
use crate::signature::descriptor::{
    ImmutableSamplerDesc, PipelineKind, ResourceDescriptor, ResourceFlags, ResourceKind,
    ShaderStages, SignatureDesc, VariableClass, matches_with_suffix,
};

/// Hard cap on resources per signature.
pub const MAX_RESOURCES: usize = 256;

/// Configuration errors.  These are programmer errors in the signature
/// description and always fail construction.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignatureError {
    #[error("resource {index} has an empty name")]
    EmptyResourceName { index: usize },
    #[error("resource '{name}' declares no shader stages")]
    NoShaderStages { name: String },
    #[error("resource '{name}' has array size zero")]
    ZeroArraySize { name: String },
    #[error("resource '{name}' carries flags {flags:?}, which are not legal on {kind:?}")]
    InvalidFlags {
        name: String,
        flags: ResourceFlags,
        kind: ResourceKind,
    },
    #[error("resource '{name}' mixes stages from different pipeline families")]
    MixedPipelineStages { name: String },
    #[error("two resources named '{name}' have overlapping shader stages")]
    OverlappingStages { name: String },
    #[error("resource '{name}' requests a combined sampler but the signature defines no suffix")]
    MissingSamplerSuffix { name: String },
    #[error("the combined-sampler suffix is empty")]
    EmptySamplerSuffix,
    #[error("texture '{texture}' and its combined sampler '{sampler}' have different variable classes")]
    SamplerClassMismatch { texture: String, sampler: String },
    #[error("immutable sampler {index} has an empty name")]
    EmptyImmutableSamplerName { index: usize },
    #[error("immutable sampler '{name}' declares no shader stages")]
    NoImmutableSamplerStages { name: String },
    #[error("{count} resources exceed the per-signature cap of {max}")]
    TooManyResources { count: usize, max: usize },
    #[error("layout requires {used} root slots but the backend caps them at {max}")]
    TooManyRootSlots { used: u32, max: u32 },
}

/// A validated resource signature.  See the module docs.
#[derive(Debug)]
pub struct Signature<B: Backend> {
    label: String,
    binding_index: u8,
    pipeline: PipelineKind,
    /// Sorted by [`VariableClass`], stably, so relative declaration order
    /// survives within each class.
    resources: Vec<ResourceDescriptor>,
    /// `class_offsets[c]..class_offsets[c + 1]` is the index range of class
    /// `c` in [`Self::resources`].
    class_offsets: [u32; VariableClass::COUNT + 1],
    immutable_samplers: Vec<ImmutableSamplerDesc>,
    combined_sampler_suffix: Option<String>,
    attribs: Vec<ResourceAttribs>,
    immutable_sampler_attribs: Vec<ImmutableSamplerAttribs>,
    params: RootParamsManager,
    static_cache: ResourceCache<B>,
    hash: u64,
}

impl<B: Backend> Signature<B> {
    /// Validates `desc` and computes the full layout.
    pub fn new(desc: &SignatureDesc) -> Result<Signature<B>, SignatureError> {
        let pipeline = validate(desc)?;

        let mut resources = desc.resources.clone();
        resources.sort_by_key(|r| r.class);
        let mut class_offsets = [0u32; VariableClass::COUNT + 1];
        for res in &resources {
            class_offsets[res.class as usize + 1] += 1;
        }
        for class in 0..VariableClass::COUNT {
            class_offsets[class + 1] += class_offsets[class];
        }

        let suffix = desc.combined_sampler_suffix.as_deref();
        let layout = layout::build(
            &desc.label,
            &resources,
            &desc.immutable_samplers,
            suffix,
            desc.binding_index as u32,
            B::MAX_ROOT_SLOTS,
        )?;

        let hash = content_hash(
            desc.binding_index,
            &resources,
            &layout.attribs,
            &desc.immutable_samplers,
        );

        Ok(Signature {
            label: desc.label.clone(),
            binding_index: desc.binding_index,
            pipeline,
            resources,
            class_offsets,
            immutable_samplers: desc.immutable_samplers.clone(),
            combined_sampler_suffix: desc.combined_sampler_suffix.clone(),
            attribs: layout.attribs,
            immutable_sampler_attribs: layout.immutable_samplers,
            params: layout.params,
            static_cache: ResourceCache::for_signature(&layout.static_table_sizes),
            hash,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn binding_index(&self) -> u8 {
        self.binding_index
    }

    pub fn pipeline(&self) -> PipelineKind {
        self.pipeline
    }

    /// Resources in sorted order.  Indices into this slice are the resource
    /// indices used everywhere else in the crate.
    pub fn resources(&self) -> &[ResourceDescriptor] {
        &self.resources
    }

    pub fn attribs(&self) -> &[ResourceAttribs] {
        &self.attribs
    }

    pub fn immutable_samplers(&self) -> &[ImmutableSamplerDesc] {
        &self.immutable_samplers
    }

    pub fn immutable_sampler_attribs(&self) -> &[ImmutableSamplerAttribs] {
        &self.immutable_sampler_attribs
    }

    pub fn params(&self) -> &RootParamsManager {
        &self.params
    }

    pub fn combined_sampler_suffix(&self) -> Option<&str> {
        self.combined_sampler_suffix.as_deref()
    }

    /// Index range of one variable class within [`Self::resources`].
    pub fn class_range(&self, class: VariableClass) -> std::ops::Range<usize> {
        self.class_offsets[class as usize] as usize..self.class_offsets[class as usize + 1] as usize
    }

    /// Looks a resource up by name among those visible to any of `stages`.
    pub fn find_resource(&self, stages: ShaderStages, name: &str) -> Option<usize> {
        self.resources
            .iter()
            .position(|r| r.stages.intersects(stages) && r.name == name)
    }

    /// Content hash over every attribute except names.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Two signatures are compatible when they assign identical slots:
    /// same binding index, same per-resource attributes and descriptions
    /// apart from names, same immutable samplers apart from names.
    /// Compatible signatures may be swapped for one another without
    /// rebinding.
    pub fn is_compatible_with(&self, other: &Signature<B>) -> bool {
        if self.hash != other.hash || self.binding_index != other.binding_index {
            return false;
        }
        if self.resources.len() != other.resources.len()
            || self.immutable_samplers.len() != other.immutable_samplers.len()
        {
            return false;
        }
        let descs_match = self.resources.iter().zip(&other.resources).all(|(a, b)| {
            a.stages == b.stages
                && a.kind == b.kind
                && a.array_size == b.array_size
                && a.class == b.class
                && a.flags == b.flags
        });
        let samplers_match = self
            .immutable_samplers
            .iter()
            .zip(&other.immutable_samplers)
            .all(|(a, b)| a.stages == b.stages && a.desc == b.desc);
        descs_match && samplers_match && self.attribs == other.attribs
    }

    pub(crate) fn static_cache(&self) -> &ResourceCache<B> {
        &self.static_cache
    }

    /// Binds an object into the signature's static snapshot.  Only
    /// meaningful for static-class resources; the binding is copied into
    /// every context created with `init_static`.
    ///
    /// Follows the full bind rules of
    /// [`crate::binding::BindingContext::bind_resource`], including the
    /// combined-sampler recursion and rebind diagnostics.
    pub fn bind_static_resource(
        &mut self,
        res_index: usize,
        array_index: u32,
        object: Option<B::Object>,
    ) {
        crate::binding::bind_resource_into(
            &self.label,
            &self.resources,
            &self.attribs,
            &mut self.static_cache,
            res_index,
            array_index,
            object,
        );
    }

    /// Creates a binding context backed by persistent heap space from
    /// `allocator`.  With `init_static` the signature's static snapshot is
    /// copied in immediately.
    pub fn create_binding_context(
        self: &Arc<Self>,
        allocator: &B::HeapAllocator,
        init_static: bool,
    ) -> Result<BindingContext<B>, HeapExhausted> {
        let cache = ResourceCache::for_context(&self.params, allocator)?;
        let mut context = BindingContext::new(Arc::clone(self), cache);
        if init_static {
            context.initialize_static_resources();
        }
        Ok(context)
    }
}

fn validate(desc: &SignatureDesc) -> Result<PipelineKind, SignatureError> {
    if desc.resources.len() > MAX_RESOURCES {
        return Err(SignatureError::TooManyResources {
            count: desc.resources.len(),
            max: MAX_RESOURCES,
        });
    }
    if let Some(suffix) = &desc.combined_sampler_suffix
        && suffix.is_empty()
    {
        return Err(SignatureError::EmptySamplerSuffix);
    }

    let mut union = ShaderStages::empty();
    for (index, res) in desc.resources.iter().enumerate() {
        if res.name.is_empty() {
            return Err(SignatureError::EmptyResourceName { index });
        }
        if res.stages.is_empty() {
            return Err(SignatureError::NoShaderStages {
                name: res.name.clone(),
            });
        }
        if res.array_size == 0 {
            return Err(SignatureError::ZeroArraySize {
                name: res.name.clone(),
            });
        }
        if !res.kind.allowed_flags().contains(res.flags) {
            return Err(SignatureError::InvalidFlags {
                name: res.name.clone(),
                flags: res.flags,
                kind: res.kind,
            });
        }
        if PipelineKind::from_stages(res.stages).is_none() {
            return Err(SignatureError::MixedPipelineStages {
                name: res.name.clone(),
            });
        }
        if res.flags.contains(ResourceFlags::COMBINED_SAMPLER)
            && desc.combined_sampler_suffix.is_none()
        {
            return Err(SignatureError::MissingSamplerSuffix {
                name: res.name.clone(),
            });
        }
        for other in &desc.resources[..index] {
            if other.name == res.name && other.stages.intersects(res.stages) {
                return Err(SignatureError::OverlappingStages {
                    name: res.name.clone(),
                });
            }
        }
        union |= res.stages;
    }

    let pipeline = PipelineKind::from_stages(union).ok_or_else(|| {
        // Name the first resource whose stages broke the union.
        SignatureError::MixedPipelineStages {
            name: desc
                .resources
                .first()
                .map(|r| r.name.clone())
                .unwrap_or_default(),
        }
    })?;

    // A combined texture's sampler must share its variable class.
    if let Some(suffix) = desc.combined_sampler_suffix.as_deref() {
        for res in &desc.resources {
            if !res.flags.contains(ResourceFlags::COMBINED_SAMPLER) {
                continue;
            }
            let mismatched = desc.resources.iter().find(|s| {
                s.kind == ResourceKind::Sampler
                    && s.stages.intersects(res.stages)
                    && matches_with_suffix(&s.name, &res.name, Some(suffix))
                    && s.class != res.class
            });
            if let Some(sampler) = mismatched {
                return Err(SignatureError::SamplerClassMismatch {
                    texture: res.name.clone(),
                    sampler: sampler.name.clone(),
                });
            }
        }
    }

    for (index, sam) in desc.immutable_samplers.iter().enumerate() {
        if sam.name.is_empty() {
            return Err(SignatureError::EmptyImmutableSamplerName { index });
        }
        if sam.stages.is_empty() {
            return Err(SignatureError::NoImmutableSamplerStages {
                name: sam.name.clone(),
            });
        }
    }

    Ok(pipeline)
}

/// Hashes everything that decides slot assignment — the name-stripped
/// descriptions plus the allocated attributes (bind points, register
/// spaces, root indices and offsets) — so that renamed-but-identical
/// signatures collide into the same bucket for the compatibility check.
fn content_hash(
    binding_index: u8,
    sorted_resources: &[ResourceDescriptor],
    attribs: &[ResourceAttribs],
    immutable_samplers: &[ImmutableSamplerDesc],
) -> u64 {
    let mut hasher = std::hash::DefaultHasher::new();
    binding_index.hash(&mut hasher);
    sorted_resources.len().hash(&mut hasher);
    immutable_samplers.len().hash(&mut hasher);
    for (res, attr) in sorted_resources.iter().zip(attribs) {
        res.stages.hash(&mut hasher);
        res.kind.hash(&mut hasher);
        res.array_size.hash(&mut hasher);
        res.class.hash(&mut hasher);
        res.flags.hash(&mut hasher);
        attr.hash(&mut hasher);
    }
    for sam in immutable_samplers {
        sam.stages.hash(&mut hasher);
        sam.desc.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::headless::Headless;

    fn desc_with(resources: Vec<ResourceDescriptor>) -> SignatureDesc {
        SignatureDesc {
            label: "test".into(),
            resources,
            ..Default::default()
        }
    }

    #[test]
    fn validation_rejects_empty_name() {
        let desc = desc_with(vec![ResourceDescriptor::new(
            "",
            ShaderStages::PIXEL,
            ResourceKind::TextureSrv,
            VariableClass::Static,
        )]);
        assert!(matches!(
            Signature::<Headless>::new(&desc),
            Err(SignatureError::EmptyResourceName { index: 0 })
        ));
    }

    #[test]
    fn validation_rejects_illegal_flags() {
        let desc = desc_with(vec![
            ResourceDescriptor::new(
                "cb",
                ShaderStages::PIXEL,
                ResourceKind::ConstantBuffer,
                VariableClass::Static,
            )
            .with_flags(ResourceFlags::FORMATTED_BUFFER),
        ]);
        assert!(matches!(
            Signature::<Headless>::new(&desc),
            Err(SignatureError::InvalidFlags { .. })
        ));
    }

    #[test]
    fn validation_rejects_duplicate_names_with_overlapping_stages() {
        let desc = desc_with(vec![
            ResourceDescriptor::new(
                "t",
                ShaderStages::PIXEL | ShaderStages::VERTEX,
                ResourceKind::TextureSrv,
                VariableClass::Static,
            ),
            ResourceDescriptor::new(
                "t",
                ShaderStages::PIXEL,
                ResourceKind::TextureSrv,
                VariableClass::Mutable,
            ),
        ]);
        assert!(matches!(
            Signature::<Headless>::new(&desc),
            Err(SignatureError::OverlappingStages { .. })
        ));
    }

    #[test]
    fn duplicate_names_on_disjoint_stages_are_allowed() {
        let desc = desc_with(vec![
            ResourceDescriptor::new(
                "t",
                ShaderStages::VERTEX,
                ResourceKind::TextureSrv,
                VariableClass::Static,
            ),
            ResourceDescriptor::new(
                "t",
                ShaderStages::PIXEL,
                ResourceKind::TextureSrv,
                VariableClass::Mutable,
            ),
        ]);
        assert!(Signature::<Headless>::new(&desc).is_ok());
    }

    #[test]
    fn validation_rejects_mixed_pipeline_union() {
        let desc = desc_with(vec![
            ResourceDescriptor::new(
                "a",
                ShaderStages::PIXEL,
                ResourceKind::TextureSrv,
                VariableClass::Static,
            ),
            ResourceDescriptor::new(
                "b",
                ShaderStages::COMPUTE,
                ResourceKind::TextureSrv,
                VariableClass::Static,
            ),
        ]);
        assert!(matches!(
            Signature::<Headless>::new(&desc),
            Err(SignatureError::MixedPipelineStages { .. })
        ));
    }

    #[test]
    fn combined_sampler_without_suffix_is_rejected() {
        let desc = desc_with(vec![
            ResourceDescriptor::new(
                "t",
                ShaderStages::PIXEL,
                ResourceKind::TextureSrv,
                VariableClass::Static,
            )
            .with_flags(ResourceFlags::COMBINED_SAMPLER),
        ]);
        assert!(matches!(
            Signature::<Headless>::new(&desc),
            Err(SignatureError::MissingSamplerSuffix { .. })
        ));
    }
}
