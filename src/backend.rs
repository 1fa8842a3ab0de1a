// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Backend seam.

The binding model is device-agnostic: it decides *which* slot every resource
lands in and *when* descriptors move, while an implementation of [`Backend`]
supplies the native objects, descriptor heaps and command recording.  The
crate ships one implementation, [`headless`], a software backend suitable for
tests and for running the model without a GPU.

Backends are wired in through generics rather than dynamic dispatch; the
signature, cache and binding-context types are all parameterized on a
[`Backend`].
*/

use std::fmt::Debug;

use crate::signature::descriptor::ResourceKind;

pub mod headless;

/// A complete backend: native objects plus the descriptor machinery the
/// binding model drives.
pub trait Backend: Sized + 'static {
    /// A device object a shader resource can be bound to (buffer, texture
    /// view, sampler, acceleration structure).  Cloning is expected to be a
    /// cheap handle copy.
    type Object: BackendObject<Descriptor = Self::Descriptor>;
    /// The native descriptor written into heap cells.
    type Descriptor: Copy + PartialEq + Debug;
    /// A contiguous run of descriptor heap cells.
    type HeapRange: HeapRange<Self>;
    /// Allocator for persistent (context-lifetime) heap space.
    type HeapAllocator: HeapAllocator<Self>;
    /// Command recording surface used by transition and commit.
    type CommandContext: CommandContext<Self>;

    /// Cap on root parameters (tables plus views) per signature.
    const MAX_ROOT_SLOTS: u32;
}

/// A bindable device object.
pub trait BackendObject: Clone + PartialEq + Debug {
    type Descriptor: Copy + PartialEq + Debug;

    /// Name used in diagnostics.
    fn debug_name(&self) -> &str;

    /// Whether this object can satisfy a slot of the given kind.  Binding an
    /// object where this returns `false` is a recoverable error: it is
    /// logged and the slot is left unchanged.
    fn accepts(&self, kind: ResourceKind) -> bool;

    /// The native descriptor to copy into heap cells for this object.
    fn descriptor(&self) -> Self::Descriptor;

    /// True for buffers whose contents are updated dynamically each
    /// submission; these adjust the cache's dynamic constant-buffer counter
    /// and are re-pointed at commit time when bound as root views.
    fn is_dynamic_buffer(&self) -> bool;

    /// For texture views participating in the combined-sampler convention,
    /// the sampler object paired with the view.
    fn paired_sampler(&self) -> Option<Self>;

    /// Last known resource state, if the object is tracked.  `None` means
    /// state is unknown and transitions are skipped for it.
    fn state(&self) -> Option<ResourceState>;
}

/// Allocator for persistent shader-visible heap space, consulted once per
/// binding context.
pub trait HeapAllocator<B: Backend> {
    fn allocate(&self, kind: HeapKind, count: u32) -> Result<B::HeapRange, HeapExhausted>;
}

/// A contiguous run of shader-visible descriptor cells.
pub trait HeapRange<B: Backend>: Debug {
    fn len(&self) -> u32;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    /// Writes one descriptor at `offset` cells from the start of the range.
    /// `None` resets the cell to the null descriptor, so an unbind leaves
    /// nothing stale in shader-visible space.
    fn write(&self, offset: u32, descriptor: Option<B::Descriptor>);
}

/// Command recording surface for [`crate::binding::BindingContext::transition_resources`]
/// and [`crate::binding::BindingContext::commit`].
pub trait CommandContext<B: Backend> {
    /// Records a state transition for `object` into `target`.
    fn transition(&mut self, object: &B::Object, target: ResourceState);

    /// Allocates transient heap space valid for the current submission only.
    /// Dynamic descriptor tables are copied into such space at every commit.
    fn allocate_transient(&mut self, kind: HeapKind, count: u32)
    -> Result<B::HeapRange, HeapExhausted>;

    /// Makes the given heaps current on the command list.
    fn set_descriptor_heaps(&mut self, resource: Option<&B::HeapRange>, sampler: Option<&B::HeapRange>);

    /// Points root parameter `root_index` at `range` starting `start_offset`
    /// cells in.
    fn set_root_table(&mut self, root_index: u32, heap: HeapKind, range: &B::HeapRange, start_offset: u32);

    /// Points root parameter `root_index` directly at a buffer object.
    fn set_root_view(&mut self, root_index: u32, object: &B::Object);
}

/// The two native descriptor heap kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeapKind {
    Resource = 0,
    Sampler = 1,
}

impl HeapKind {
    pub const COUNT: usize = 2;
}

/// Device-agnostic resource states used by transition and validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    Common,
    ConstantBuffer,
    ShaderResource,
    UnorderedAccess,
    RayTracing,
    CopyDest,
    RenderTarget,
}

/// The state a bound resource must be in for shaders to access it, or `None`
/// for kinds that carry no state (samplers).
pub fn required_state(kind: ResourceKind) -> Option<ResourceState> {
    match kind {
        ResourceKind::ConstantBuffer => Some(ResourceState::ConstantBuffer),
        ResourceKind::TextureSrv | ResourceKind::BufferSrv => Some(ResourceState::ShaderResource),
        ResourceKind::TextureUav | ResourceKind::BufferUav => Some(ResourceState::UnorderedAccess),
        ResourceKind::AccelStruct => Some(ResourceState::RayTracing),
        ResourceKind::Sampler => None,
    }
}

/// A descriptor heap ran out of space.
///
/// Persistent exhaustion surfaces from binding-context creation; transient
/// exhaustion surfaces from [`CommandContext::allocate_transient`] during
/// commit and is fatal for the submission.
#[derive(Debug, Clone, thiserror::Error)]
#[error("descriptor heap exhausted: failed to allocate {requested} {kind:?} descriptors")]
pub struct HeapExhausted {
    pub kind: HeapKind,
    pub requested: u32,
}
