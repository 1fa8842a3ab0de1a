// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
A software backend with no GPU behind it.

Objects are reference-counted handles with a synthetic descriptor value, heap
ranges are plain cell vectors, and the command context records every call so
tests can assert on exactly what the binding model did.
*/

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::backend::{
    Backend, BackendObject, CommandContext, HeapAllocator, HeapExhausted, HeapKind, HeapRange,
    ResourceState,
};
use crate::signature::descriptor::ResourceKind;

/// The headless backend.  See the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Headless;

impl Backend for Headless {
    type Object = Object;
    type Descriptor = u64;
    type HeapRange = Cells;
    type HeapAllocator = Heaps;
    type CommandContext = Recorder;

    const MAX_ROOT_SLOTS: u32 = 64;
}

static NEXT_DESCRIPTOR: AtomicU64 = AtomicU64::new(1);

#[derive(Debug)]
enum ObjectKind {
    Buffer { dynamic: bool },
    TextureView { sampler: Option<Object> },
    Sampler,
    AccelStruct,
}

#[derive(Debug)]
struct ObjectInner {
    name: String,
    kind: ObjectKind,
    descriptor: u64,
    state: Mutex<Option<ResourceState>>,
}

/// A fake device object.  Identity is handle identity: two clones of the same
/// object compare equal, two separately-created objects never do.
#[derive(Debug, Clone)]
pub struct Object {
    inner: Arc<ObjectInner>,
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Object {
    fn build(name: impl Into<String>, kind: ObjectKind, state: Option<ResourceState>) -> Object {
        Object {
            inner: Arc::new(ObjectInner {
                name: name.into(),
                kind,
                descriptor: NEXT_DESCRIPTOR.fetch_add(1, Ordering::Relaxed),
                state: Mutex::new(state),
            }),
        }
    }

    /// A buffer in [`ResourceState::Common`].
    pub fn buffer(name: impl Into<String>) -> Object {
        Object::build(name, ObjectKind::Buffer { dynamic: false }, Some(ResourceState::Common))
    }

    /// A dynamically-updated buffer.  Untracked: `state()` is `None`.
    pub fn dynamic_buffer(name: impl Into<String>) -> Object {
        Object::build(name, ObjectKind::Buffer { dynamic: true }, None)
    }

    /// A texture view in [`ResourceState::Common`], optionally carrying a
    /// paired sampler for the combined-sampler convention.
    pub fn texture(name: impl Into<String>, sampler: Option<Object>) -> Object {
        Object::build(name, ObjectKind::TextureView { sampler }, Some(ResourceState::Common))
    }

    pub fn sampler(name: impl Into<String>) -> Object {
        Object::build(name, ObjectKind::Sampler, None)
    }

    pub fn acceleration_structure(name: impl Into<String>) -> Object {
        Object::build(name, ObjectKind::AccelStruct, Some(ResourceState::Common))
    }

    /// Forces the tracked state, as a real engine would after using the
    /// object elsewhere.
    pub fn set_state(&self, state: Option<ResourceState>) {
        *self.inner.state.lock().unwrap() = state;
    }
}

impl BackendObject for Object {
    type Descriptor = u64;

    fn debug_name(&self) -> &str {
        &self.inner.name
    }

    fn accepts(&self, kind: ResourceKind) -> bool {
        match self.inner.kind {
            ObjectKind::Buffer { .. } => matches!(
                kind,
                ResourceKind::ConstantBuffer | ResourceKind::BufferSrv | ResourceKind::BufferUav
            ),
            ObjectKind::TextureView { .. } => {
                matches!(kind, ResourceKind::TextureSrv | ResourceKind::TextureUav)
            }
            ObjectKind::Sampler => kind == ResourceKind::Sampler,
            ObjectKind::AccelStruct => kind == ResourceKind::AccelStruct,
        }
    }

    fn descriptor(&self) -> u64 {
        self.inner.descriptor
    }

    fn is_dynamic_buffer(&self) -> bool {
        matches!(self.inner.kind, ObjectKind::Buffer { dynamic: true })
    }

    fn paired_sampler(&self) -> Option<Object> {
        match &self.inner.kind {
            ObjectKind::TextureView { sampler } => sampler.clone(),
            _ => None,
        }
    }

    fn state(&self) -> Option<ResourceState> {
        *self.inner.state.lock().unwrap()
    }
}

/// A run of descriptor cells.  Cells start empty and are filled by
/// [`HeapRange::write`].
#[derive(Debug, Clone)]
pub struct Cells {
    kind: HeapKind,
    cells: Arc<Mutex<Vec<Option<u64>>>>,
}

impl Cells {
    fn new(kind: HeapKind, count: u32) -> Cells {
        Cells {
            kind,
            cells: Arc::new(Mutex::new(vec![None; count as usize])),
        }
    }

    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    /// The descriptor at `offset`, or `None` if never written.  Test hook.
    pub fn descriptor_at(&self, offset: u32) -> Option<u64> {
        self.cells.lock().unwrap()[offset as usize]
    }
}

impl HeapRange<Headless> for Cells {
    fn len(&self) -> u32 {
        self.cells.lock().unwrap().len() as u32
    }

    fn write(&self, offset: u32, descriptor: Option<u64>) {
        self.cells.lock().unwrap()[offset as usize] = descriptor;
    }
}

/// Bounded persistent heap allocator.
#[derive(Debug)]
pub struct Heaps {
    remaining: [Mutex<u32>; HeapKind::COUNT],
}

impl Heaps {
    pub fn new(resource_capacity: u32, sampler_capacity: u32) -> Heaps {
        Heaps {
            remaining: [Mutex::new(resource_capacity), Mutex::new(sampler_capacity)],
        }
    }
}

impl HeapAllocator<Headless> for Heaps {
    fn allocate(&self, kind: HeapKind, count: u32) -> Result<Cells, HeapExhausted> {
        let mut remaining = self.remaining[kind as usize].lock().unwrap();
        if count > *remaining {
            return Err(HeapExhausted { kind, requested: count });
        }
        *remaining -= count;
        Ok(Cells::new(kind, count))
    }
}

/// Recording command context.  Also owns a bounded transient allocator.
#[derive(Debug)]
pub struct Recorder {
    transient_remaining: [u32; HeapKind::COUNT],
    transitions: Vec<(Object, ResourceState)>,
    heaps_set: Vec<(Option<Cells>, Option<Cells>)>,
    root_tables: Vec<(u32, HeapKind, Cells, u32)>,
    root_views: Vec<(u32, Object)>,
}

impl Recorder {
    pub fn new(transient_resource_capacity: u32, transient_sampler_capacity: u32) -> Recorder {
        Recorder {
            transient_remaining: [transient_resource_capacity, transient_sampler_capacity],
            transitions: Vec::new(),
            heaps_set: Vec::new(),
            root_tables: Vec::new(),
            root_views: Vec::new(),
        }
    }

    pub fn transitions(&self) -> &[(Object, ResourceState)] {
        &self.transitions
    }

    pub fn heaps_set(&self) -> &[(Option<Cells>, Option<Cells>)] {
        &self.heaps_set
    }

    pub fn root_tables(&self) -> &[(u32, HeapKind, Cells, u32)] {
        &self.root_tables
    }

    pub fn root_views(&self) -> &[(u32, Object)] {
        &self.root_views
    }
}

impl CommandContext<Headless> for Recorder {
    fn transition(&mut self, object: &Object, target: ResourceState) {
        self.transitions.push((object.clone(), target));
        object.set_state(Some(target));
    }

    fn allocate_transient(&mut self, kind: HeapKind, count: u32) -> Result<Cells, HeapExhausted> {
        let remaining = &mut self.transient_remaining[kind as usize];
        if count > *remaining {
            return Err(HeapExhausted { kind, requested: count });
        }
        *remaining -= count;
        Ok(Cells::new(kind, count))
    }

    fn set_descriptor_heaps(&mut self, resource: Option<&Cells>, sampler: Option<&Cells>) {
        self.heaps_set.push((resource.cloned(), sampler.cloned()));
    }

    fn set_root_table(&mut self, root_index: u32, heap: HeapKind, range: &Cells, start_offset: u32) {
        self.root_tables.push((root_index, heap, range.clone(), start_offset));
    }

    fn set_root_view(&mut self, root_index: u32, object: &Object) {
        self.root_views.push((root_index, object.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_exhaustion_is_observable() {
        let heaps = Heaps::new(4, 0);
        assert!(heaps.allocate(HeapKind::Resource, 3).is_ok());
        let err = heaps.allocate(HeapKind::Resource, 2).unwrap_err();
        assert_eq!(err.requested, 2);
        assert!(heaps.allocate(HeapKind::Sampler, 1).is_err());
    }

    #[test]
    fn object_identity_is_handle_identity() {
        let a = Object::buffer("a");
        let b = Object::buffer("a");
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_ne!(a.descriptor(), b.descriptor());
    }
}
