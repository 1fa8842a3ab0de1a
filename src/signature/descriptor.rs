// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Vocabulary types for describing shader-visible resources.
//!
//! A [`SignatureDesc`] enumerates every resource a set of shaders can see —
//! constant buffers, texture and buffer views, samplers, acceleration
//! structures — along with the stages that see them, their update frequency
//! ([`VariableClass`]) and per-kind flags.  The description is plain data;
//! [`crate::signature::Signature`] validates it and converts it into native
//! binding slots.

use bitflags::bitflags;

bitflags! {
    /// Shader stages a resource is visible to.
    ///
    /// Masks combine with `|`: a resource visible to both vertex and pixel
    /// work uses `ShaderStages::VERTEX | ShaderStages::PIXEL`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        const VERTEX        = 1 << 0;
        const HULL          = 1 << 1;
        const DOMAIN        = 1 << 2;
        const GEOMETRY      = 1 << 3;
        const PIXEL         = 1 << 4;
        const COMPUTE       = 1 << 5;
        const AMPLIFICATION = 1 << 6;
        const MESH          = 1 << 7;
        const RAY_GEN           = 1 << 8;
        const RAY_MISS          = 1 << 9;
        const RAY_CLOSEST_HIT   = 1 << 10;
        const RAY_ANY_HIT       = 1 << 11;
        const RAY_INTERSECTION  = 1 << 12;
        const CALLABLE          = 1 << 13;
    }
}

impl ShaderStages {
    pub const ALL_GRAPHICS: ShaderStages = ShaderStages::VERTEX
        .union(ShaderStages::HULL)
        .union(ShaderStages::DOMAIN)
        .union(ShaderStages::GEOMETRY)
        .union(ShaderStages::PIXEL)
        .union(ShaderStages::AMPLIFICATION)
        .union(ShaderStages::MESH);

    pub const ALL_RAY_TRACING: ShaderStages = ShaderStages::RAY_GEN
        .union(ShaderStages::RAY_MISS)
        .union(ShaderStages::RAY_CLOSEST_HIT)
        .union(ShaderStages::RAY_ANY_HIT)
        .union(ShaderStages::RAY_INTERSECTION)
        .union(ShaderStages::CALLABLE);

    /// True if exactly one stage bit is set.
    pub fn is_single_stage(self) -> bool {
        let bits = self.bits();
        bits != 0 && (bits & (bits - 1)) == 0
    }

    /// Number of stage bits set.
    pub fn stage_count(self) -> u32 {
        self.bits().count_ones()
    }
}

/// Kind of pipeline a set of stages belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
    RayTracing,
}

impl PipelineKind {
    /// Derives the pipeline kind from a stage union, or `None` when stages
    /// from different pipeline families are mixed.
    pub fn from_stages(stages: ShaderStages) -> Option<PipelineKind> {
        let graphics = stages.intersects(ShaderStages::ALL_GRAPHICS);
        let compute = stages.contains(ShaderStages::COMPUTE);
        let ray = stages.intersects(ShaderStages::ALL_RAY_TRACING);
        match (graphics, compute, ray) {
            (true, false, false) => Some(PipelineKind::Graphics),
            (false, true, false) => Some(PipelineKind::Compute),
            (false, false, true) => Some(PipelineKind::RayTracing),
            _ => None,
        }
    }
}

/// What a resource is, as declared by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// A uniform/constant buffer.
    ConstantBuffer,
    /// A texture read through a shader-resource view.
    TextureSrv,
    /// A buffer read through a shader-resource view.
    BufferSrv,
    /// A texture written through an unordered-access view.
    TextureUav,
    /// A buffer written through an unordered-access view.
    BufferUav,
    /// A standalone sampler.
    Sampler,
    /// A ray-tracing acceleration structure.
    AccelStruct,
}

impl ResourceKind {
    /// True for the buffer-backed kinds.  Only buffers are eligible to become
    /// direct root views.
    pub fn is_buffer(self) -> bool {
        matches!(
            self,
            ResourceKind::ConstantBuffer | ResourceKind::BufferSrv | ResourceKind::BufferUav
        )
    }

    /// The native descriptor-range bucket this kind lands in.
    pub fn range_kind(self) -> RangeKind {
        match self {
            ResourceKind::TextureSrv | ResourceKind::BufferSrv | ResourceKind::AccelStruct => {
                RangeKind::Srv
            }
            ResourceKind::TextureUav | ResourceKind::BufferUav => RangeKind::Uav,
            ResourceKind::ConstantBuffer => RangeKind::Cbv,
            ResourceKind::Sampler => RangeKind::Sampler,
        }
    }

    /// Flags that are legal on this resource kind.
    pub(crate) fn allowed_flags(self) -> ResourceFlags {
        match self {
            ResourceKind::ConstantBuffer => {
                ResourceFlags::NO_DYNAMIC_BUFFERS | ResourceFlags::RUNTIME_ARRAY
            }
            ResourceKind::TextureSrv => {
                ResourceFlags::COMBINED_SAMPLER | ResourceFlags::RUNTIME_ARRAY
            }
            ResourceKind::BufferSrv | ResourceKind::BufferUav => {
                ResourceFlags::NO_DYNAMIC_BUFFERS
                    | ResourceFlags::FORMATTED_BUFFER
                    | ResourceFlags::RUNTIME_ARRAY
            }
            ResourceKind::TextureUav => ResourceFlags::RUNTIME_ARRAY,
            ResourceKind::Sampler => ResourceFlags::RUNTIME_ARRAY,
            ResourceKind::AccelStruct => ResourceFlags::RUNTIME_ARRAY,
        }
    }
}

/// One of the four native descriptor-range buckets.
///
/// The discriminants double as the artificial root indices of the signature's
/// static snapshot cache, so their order is load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RangeKind {
    Srv = 0,
    Uav = 1,
    Cbv = 2,
    Sampler = 3,
}

impl RangeKind {
    pub const COUNT: usize = 4;

    pub fn heap_kind(self) -> crate::backend::HeapKind {
        match self {
            RangeKind::Sampler => crate::backend::HeapKind::Sampler,
            _ => crate::backend::HeapKind::Resource,
        }
    }
}

/// How often a resource may be rebound.
///
/// The class decides where the resource's descriptor lives and which rebind
/// rules apply:
///
/// - `Static`: bound once on the signature itself and copied into every
///   binding context.
/// - `Mutable`: bound once per binding context, then stable across
///   submissions.
/// - `Dynamic`: may change every submission; descriptors go to transient
///   per-submission heap space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum VariableClass {
    Static = 0,
    Mutable = 1,
    Dynamic = 2,
}

impl VariableClass {
    pub const COUNT: usize = 3;
}

bitflags! {
    /// Per-resource behavior flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceFlags: u32 {
        /// The resource will never be bound a dynamically-updated buffer,
        /// which lets buffers of this resource live in descriptor tables
        /// instead of direct root views.
        const NO_DYNAMIC_BUFFERS = 1 << 0;
        /// Texture SRV paired with an implicit sampler by name suffix.
        const COMBINED_SAMPLER = 1 << 1;
        /// Buffer view carries a format and cannot be a direct root view.
        const FORMATTED_BUFFER = 1 << 2;
        /// Unbounded array; gets a dedicated register space.
        const RUNTIME_ARRAY = 1 << 3;
    }
}

/// Texture filtering mode for [`SamplerDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Linear,
    Nearest,
}

/// Texture addressing mode for [`SamplerDesc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AddressMode {
    #[default]
    Clamp,
    Wrap,
    Mirror,
}

/// Device-agnostic sampler state, used by immutable samplers baked into a
/// signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
}

/// One shader-visible resource in a [`SignatureDesc`].
///
/// Invariants checked at signature construction: `name` is non-empty,
/// `stages` is non-empty, `array_size >= 1`, and `flags` are legal for
/// `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceDescriptor {
    pub name: String,
    pub stages: ShaderStages,
    pub kind: ResourceKind,
    pub array_size: u32,
    pub class: VariableClass,
    pub flags: ResourceFlags,
}

impl ResourceDescriptor {
    /// Creates a single-element resource with no flags.
    pub fn new(
        name: impl Into<String>,
        stages: ShaderStages,
        kind: ResourceKind,
        class: VariableClass,
    ) -> Self {
        ResourceDescriptor {
            name: name.into(),
            stages,
            kind,
            array_size: 1,
            class,
            flags: ResourceFlags::empty(),
        }
    }

    pub fn with_array_size(mut self, array_size: u32) -> Self {
        self.array_size = array_size;
        self
    }

    pub fn with_flags(mut self, flags: ResourceFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// A sampler state baked into the signature rather than bound per context.
///
/// `name` matches either a declared sampler resource directly or, under the
/// combined-sampler convention, a texture resource (the declared sampler is
/// then `name` + suffix).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImmutableSamplerDesc {
    pub name: String,
    pub stages: ShaderStages,
    pub desc: SamplerDesc,
}

impl ImmutableSamplerDesc {
    pub fn new(name: impl Into<String>, stages: ShaderStages, desc: SamplerDesc) -> Self {
        ImmutableSamplerDesc {
            name: name.into(),
            stages,
            desc,
        }
    }
}

/// Caller-facing description of a complete resource signature.
#[derive(Debug, Clone, Default)]
pub struct SignatureDesc {
    /// Debug label used in diagnostics.
    pub label: String,
    /// Index of this signature when several are bound together; part of
    /// binding compatibility.
    pub binding_index: u8,
    pub resources: Vec<ResourceDescriptor>,
    pub immutable_samplers: Vec<ImmutableSamplerDesc>,
    /// `Some(suffix)` enables the combined texture+sampler convention: a
    /// texture named `g_Tex` pairs with a sampler named `g_Tex<suffix>`.
    pub combined_sampler_suffix: Option<String>,
}

/// Compares `candidate` against `base` with the combined-sampler suffix
/// applied: with `Some(suffix)` the candidate must equal `base + suffix`,
/// otherwise the names must match exactly.
pub(crate) fn matches_with_suffix(candidate: &str, base: &str, suffix: Option<&str>) -> bool {
    match suffix {
        Some(suffix) => {
            candidate.len() == base.len() + suffix.len()
                && candidate.starts_with(base)
                && candidate.ends_with(suffix)
        }
        None => candidate == base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_stage_detection() {
        assert!(ShaderStages::PIXEL.is_single_stage());
        assert!(!(ShaderStages::PIXEL | ShaderStages::VERTEX).is_single_stage());
        assert!(!ShaderStages::empty().is_single_stage());
    }

    #[test]
    fn pipeline_kind_rejects_mixed_families() {
        assert_eq!(
            PipelineKind::from_stages(ShaderStages::VERTEX | ShaderStages::PIXEL),
            Some(PipelineKind::Graphics)
        );
        assert_eq!(
            PipelineKind::from_stages(ShaderStages::COMPUTE),
            Some(PipelineKind::Compute)
        );
        assert_eq!(
            PipelineKind::from_stages(ShaderStages::COMPUTE | ShaderStages::PIXEL),
            None
        );
    }

    #[test]
    fn suffix_matching() {
        assert!(matches_with_suffix("g_Tex_sampler", "g_Tex", Some("_sampler")));
        assert!(!matches_with_suffix("g_Tex_sampler", "g_Other", Some("_sampler")));
        assert!(matches_with_suffix("g_Sam", "g_Sam", None));
        assert!(!matches_with_suffix("g_Sam", "g_Sam", Some("_sampler")));
    }
}
