// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
The bind / validate / transition engine.

A [`BindingContext`] pairs an immutable [`Signature`] with a mutable
[`ResourceCache`] and drives everything that happens to bindings after
signature construction:

- [`bind_resource`](BindingContext::bind_resource) with the full rebind
  rules, type checking and combined-sampler recursion;
- [`initialize_static_resources`](BindingContext::initialize_static_resources),
  the idempotent copy of the signature's static snapshot;
- [`transition_resources`](BindingContext::transition_resources), which
  either records state transitions or validates states without touching
  them;
- [`commit`](BindingContext::commit), which publishes the bindings to a
  command context, re-uploading dynamic tables into transient heap space
  each submission;
- bulk binding by name through a [`ResourceMapping`].

Binding mistakes are recoverable by design: they are logged through
`logwise` and leave the context in a well-defined state rather than
returning errors.  Only heap exhaustion is fatal.
*/

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;

use crate::backend::{
    Backend, BackendObject, CommandContext, HeapExhausted, HeapKind, HeapRange, required_state,
};
use crate::cache::{CacheContent, ResourceCache};
use crate::layout::ResourceAttribs;
use crate::signature::Signature;
use crate::signature::descriptor::{
    ResourceDescriptor, ResourceKind, ShaderStages, VariableClass,
};

/// Whether [`BindingContext::transition_resources`] records transitions or
/// only checks states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Record a transition for every bound resource not already in its
    /// required state.  Unordered-access resources are re-affirmed even
    /// when already in that state, so back-to-back UAV use gets the barrier
    /// it needs.
    Transition,
    /// Touch nothing; log a diagnostic for every bound resource found in
    /// the wrong state.
    Validate,
}

bitflags! {
    /// Controls for [`BindingContext::bind_from_mapping`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BindFlags: u32 {
        const UPDATE_STATIC = 1 << 0;
        const UPDATE_MUTABLE = 1 << 1;
        const UPDATE_DYNAMIC = 1 << 2;
        const UPDATE_ALL = Self::UPDATE_STATIC.bits()
            | Self::UPDATE_MUTABLE.bits()
            | Self::UPDATE_DYNAMIC.bits();
        /// Leave already-bound slots alone instead of overwriting them.
        const KEEP_EXISTING = 1 << 3;
        /// Log an error for every selected slot left unbound afterwards.
        const VERIFY_ALL_RESOLVED = 1 << 4;
    }
}

impl VariableClass {
    fn bind_flag(self) -> BindFlags {
        match self {
            VariableClass::Static => BindFlags::UPDATE_STATIC,
            VariableClass::Mutable => BindFlags::UPDATE_MUTABLE,
            VariableClass::Dynamic => BindFlags::UPDATE_DYNAMIC,
        }
    }
}

/// Name-keyed object collection for bulk binding.
#[derive(Debug)]
pub struct ResourceMapping<B: Backend> {
    entries: HashMap<String, Vec<B::Object>>,
}

impl<B: Backend> Default for ResourceMapping<B> {
    fn default() -> Self {
        ResourceMapping {
            entries: HashMap::new(),
        }
    }
}

impl<B: Backend> ResourceMapping<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: impl Into<String>, object: B::Object) {
        self.entries.insert(name.into(), vec![object]);
    }

    /// Adds an array of objects; element `i` resolves array index `i`.
    pub fn add_array(&mut self, name: impl Into<String>, objects: Vec<B::Object>) {
        self.entries.insert(name.into(), objects);
    }

    pub fn get(&self, name: &str, array_index: u32) -> Option<&B::Object> {
        self.entries.get(name)?.get(array_index as usize)
    }
}

/// A signature's mutable binding state.  See the module docs.
#[derive(Debug)]
pub struct BindingContext<B: Backend> {
    signature: Arc<Signature<B>>,
    cache: ResourceCache<B>,
    static_initialized: bool,
}

impl<B: Backend> BindingContext<B> {
    pub(crate) fn new(signature: Arc<Signature<B>>, cache: ResourceCache<B>) -> BindingContext<B> {
        BindingContext {
            signature,
            cache,
            static_initialized: false,
        }
    }

    pub fn signature(&self) -> &Arc<Signature<B>> {
        &self.signature
    }

    /// Count of dynamically-updated constant buffers currently bound.
    pub fn dynamic_constant_buffer_count(&self) -> u32 {
        self.cache.dynamic_constant_buffer_count()
    }

    /// Binds `object` (or unbinds, with `None`) into the slot of resource
    /// `res_index` at `array_index`.
    ///
    /// Rules, in order: slots claimed by immutable samplers reject the bind;
    /// an object of the wrong kind is rejected; rebinding the same object is
    /// a no-op; rebinding a non-`Dynamic` slot to a different object, or
    /// unbinding it, logs a conflict and proceeds with the new value.  A
    /// texture carrying a combined sampler recursively binds its paired
    /// sampler unless an immutable sampler already claims that slot.
    pub fn bind_resource(&mut self, res_index: usize, array_index: u32, object: Option<B::Object>) {
        let signature = Arc::clone(&self.signature);
        bind_resource_into(
            signature.label(),
            signature.resources(),
            signature.attribs(),
            &mut self.cache,
            res_index,
            array_index,
            object,
        );
    }

    /// True when the slot holds an object.  Slots claimed by immutable
    /// samplers are considered bound.
    pub fn is_bound(&self, res_index: usize, array_index: u32) -> bool {
        let attribs = self.signature.attribs();
        let Some(attr) = attribs.get(res_index) else {
            return false;
        };
        if attr.immutable_sampler {
            return true;
        }
        let Some(root) = attr.root_index(CacheContent::Context) else {
            return false;
        };
        self.cache
            .resource(root, attr.context_offset + array_index)
            .is_some_and(|r| r.object.is_some())
    }

    /// Copies the signature's static snapshot into this context.
    ///
    /// Idempotent: a second call does nothing.  Static slots never bound on
    /// the signature are logged and skipped; already-identical slots are
    /// left untouched.
    pub fn initialize_static_resources(&mut self) {
        if self.static_initialized {
            return;
        }
        self.static_initialized = true;

        let signature = Arc::clone(&self.signature);
        let static_cache = signature.static_cache();
        for res_index in signature.class_range(VariableClass::Static) {
            let res = &signature.resources()[res_index];
            let attr = &signature.attribs()[res_index];
            if attr.immutable_sampler {
                continue;
            }
            let (Some(src_root), Some(dst_root)) = (
                attr.root_index(CacheContent::Signature),
                attr.root_index(CacheContent::Context),
            ) else {
                continue;
            };
            for elem in 0..res.array_size {
                let src = static_cache
                    .resource(src_root, attr.static_offset + elem)
                    .and_then(|r| r.object.clone());
                let Some(src) = src else {
                    logwise::error_sync!(
                        "signature {label}: static resource {name}[{elem}] was never bound",
                        label = logwise::privacy::LogIt(signature.label()),
                        name = logwise::privacy::LogIt(&res.name),
                        elem = elem
                    );
                    continue;
                };
                let dst_offset = attr.context_offset + elem;
                let already = self
                    .cache
                    .resource(dst_root, dst_offset)
                    .and_then(|r| r.object.clone());
                if already.as_ref() == Some(&src) {
                    continue;
                }
                if res.kind == ResourceKind::ConstantBuffer {
                    self.cache.adjust_dynamic_cb_count(already.as_ref(), Some(&src));
                }
                if let Some((space, cell)) = self.cache.shader_visible_cell(dst_root, dst_offset) {
                    space.write(cell, Some(src.descriptor()));
                }
                self.cache.set_object(dst_root, dst_offset, Some(src));
            }
        }
    }

    /// Bulk-binds by name: every resource visible to `stages` whose class
    /// is selected by `flags` is looked up in `mapping` and bound.
    pub fn bind_from_mapping(
        &mut self,
        stages: ShaderStages,
        mapping: &ResourceMapping<B>,
        flags: BindFlags,
    ) {
        let signature = Arc::clone(&self.signature);
        for (res_index, res) in signature.resources().iter().enumerate() {
            if !res.stages.intersects(stages) {
                continue;
            }
            if !flags.contains(res.class.bind_flag()) {
                continue;
            }
            if signature.attribs()[res_index].immutable_sampler {
                continue;
            }
            for array_index in 0..res.array_size {
                let bound = self.is_bound(res_index, array_index);
                if bound && flags.contains(BindFlags::KEEP_EXISTING) {
                    continue;
                }
                match mapping.get(&res.name, array_index) {
                    Some(object) => {
                        self.bind_resource(res_index, array_index, Some(object.clone()));
                    }
                    None => {
                        if !bound && flags.contains(BindFlags::VERIFY_ALL_RESOLVED) {
                            logwise::error_sync!(
                                "signature {label}: no object named {name} (index {array_index}) in the mapping",
                                label = logwise::privacy::LogIt(signature.label()),
                                name = logwise::privacy::LogIt(&res.name),
                                array_index = array_index
                            );
                        }
                    }
                }
            }
        }
    }

    /// Walks every bound resource and either records state transitions into
    /// `ctx` or validates states, per `mode`.
    pub fn transition_resources(&self, ctx: &mut B::CommandContext, mode: TransitionMode) {
        let signature = &self.signature;
        for (res_index, res) in signature.resources().iter().enumerate() {
            let attr = &signature.attribs()[res_index];
            if attr.immutable_sampler {
                continue;
            }
            let Some(target) = required_state(res.kind) else {
                continue;
            };
            let Some(root) = attr.root_index(CacheContent::Context) else {
                continue;
            };
            for elem in 0..res.array_size {
                let object = self
                    .cache
                    .resource(root, attr.context_offset + elem)
                    .and_then(|r| r.object.clone());
                let Some(object) = object else {
                    if mode == TransitionMode::Validate {
                        logwise::error_sync!(
                            "signature {label}: no resource bound to {name}[{elem}]; bind one before submitting",
                            label = logwise::privacy::LogIt(signature.label()),
                            name = logwise::privacy::LogIt(&res.name),
                            elem = elem
                        );
                    }
                    continue;
                };
                // Untracked objects manage their own states.
                let Some(state) = object.state() else {
                    continue;
                };
                let unordered = matches!(
                    res.kind,
                    ResourceKind::TextureUav | ResourceKind::BufferUav
                );
                match mode {
                    TransitionMode::Transition => {
                        if state != target || unordered {
                            ctx.transition(&object, target);
                        }
                    }
                    TransitionMode::Validate => {
                        if state != target {
                            logwise::error_sync!(
                                "signature {label}: {name}[{elem}] ({object}) is in state {state}, needs {target}; transition it before submitting or use the transitioning commit path",
                                label = logwise::privacy::LogIt(signature.label()),
                                name = logwise::privacy::LogIt(&res.name),
                                elem = elem,
                                object = logwise::privacy::LogIt(object.debug_name()),
                                state = logwise::privacy::LogIt(&state),
                                target = logwise::privacy::LogIt(&target)
                            );
                        }
                    }
                }
            }
        }
    }

    /// Publishes the bindings to `ctx` for one submission.
    ///
    /// Persistent tables are pointed at their long-lived heap space.
    /// Dynamic tables are copied into freshly-allocated transient space;
    /// failure to get that space fails the whole commit.  Root views are
    /// pointed at their bound buffers; an unbound root view is logged and
    /// skipped.
    pub fn commit(&mut self, ctx: &mut B::CommandContext) -> Result<(), HeapExhausted> {
        let signature = Arc::clone(&self.signature);

        // Transient space for the dynamic tables, sized by one walk.
        let mut dynamic_totals = [0u32; HeapKind::COUNT];
        for table in self.cache.tables() {
            if table.is_dynamic() && !table.is_root_view() {
                dynamic_totals[table.heap() as usize] += table.len();
            }
        }
        let mut transient: [Option<B::HeapRange>; HeapKind::COUNT] = [None, None];
        for kind in [HeapKind::Resource, HeapKind::Sampler] {
            if dynamic_totals[kind as usize] > 0 {
                transient[kind as usize] =
                    Some(ctx.allocate_transient(kind, dynamic_totals[kind as usize])?);
            }
        }

        ctx.set_descriptor_heaps(
            self.cache.heap_space(HeapKind::Resource),
            self.cache.heap_space(HeapKind::Sampler),
        );

        let mut transient_used = [0u32; HeapKind::COUNT];
        for table in self.cache.tables() {
            if table.is_root_view() || table.is_empty() {
                continue;
            }
            if table.is_dynamic() {
                let heap = table.heap();
                // Sized in the walk above, so the space exists.
                let Some(range) = transient[heap as usize].as_ref() else {
                    continue;
                };
                let table_start = transient_used[heap as usize];
                transient_used[heap as usize] += table.len();
                for (elem, slot) in table.resources().iter().enumerate() {
                    if let Some(object) = &slot.object {
                        range.write(table_start + elem as u32, Some(object.descriptor()));
                    }
                }
                ctx.set_root_table(table.root_index(), heap, range, table_start);
            } else if let (Some(start), Some(space)) =
                (table.start_offset(), self.cache.heap_space(table.heap()))
            {
                ctx.set_root_table(table.root_index(), table.heap(), space, start);
            }
        }

        for view in signature.params().views() {
            let bound = self
                .cache
                .resource(view.root_index(), 0)
                .and_then(|r| r.object.clone());
            match bound {
                Some(object) => ctx.set_root_view(view.root_index(), &object),
                None => {
                    logwise::error_sync!(
                        "signature {label}: root view at root index {root} has no buffer bound",
                        label = logwise::privacy::LogIt(signature.label()),
                        root = view.root_index()
                    );
                }
            }
        }

        Ok(())
    }
}

/// The bind rules, shared between binding contexts and the signature's own
/// static snapshot.  Operates on split borrows so the sampler recursion can
/// re-enter the same cache.
pub(crate) fn bind_resource_into<B: Backend>(
    label: &str,
    resources: &[ResourceDescriptor],
    attribs: &[ResourceAttribs],
    cache: &mut ResourceCache<B>,
    res_index: usize,
    array_index: u32,
    object: Option<B::Object>,
) {
    let res = &resources[res_index];
    let attr = &attribs[res_index];

    if attr.immutable_sampler {
        logwise::error_sync!(
            "signature {label}: {name} is claimed by an immutable sampler and cannot be rebound",
            label = logwise::privacy::LogIt(label),
            name = logwise::privacy::LogIt(&res.name)
        );
        return;
    }
    if array_index >= res.array_size {
        logwise::error_sync!(
            "signature {label}: array index {array_index} is out of range for {name} (size {size})",
            label = logwise::privacy::LogIt(label),
            array_index = array_index,
            name = logwise::privacy::LogIt(&res.name),
            size = res.array_size
        );
        return;
    }
    let Some(root) = attr.root_index(cache.content()) else {
        return;
    };
    let offset = attr.offset(cache.content()) + array_index;

    if let Some(new) = &object
        && !new.accepts(res.kind)
    {
        logwise::error_sync!(
            "signature {label}: {object} cannot be bound to {name}, which expects a {kind}",
            label = logwise::privacy::LogIt(label),
            object = logwise::privacy::LogIt(new.debug_name()),
            name = logwise::privacy::LogIt(&res.name),
            kind = logwise::privacy::LogIt(&res.kind)
        );
        return;
    }

    let old = cache.resource(root, offset).and_then(|r| r.object.clone());

    match &object {
        Some(new) => {
            if old.as_ref() == Some(new) {
                return;
            }
            if res.class != VariableClass::Dynamic && old.is_some() {
                logwise::error_sync!(
                    "signature {label}: {name} is {class} and already holds {old}; rebinding to {new}. Label the variable dynamic if it changes between submissions",
                    label = logwise::privacy::LogIt(label),
                    name = logwise::privacy::LogIt(&res.name),
                    class = logwise::privacy::LogIt(&res.class),
                    old = logwise::privacy::LogIt(old.as_ref().map(|o| o.debug_name()).unwrap_or_default()),
                    new = logwise::privacy::LogIt(new.debug_name())
                );
            }
        }
        None => {
            if res.class != VariableClass::Dynamic && old.is_some() {
                logwise::error_sync!(
                    "signature {label}: unbinding {name}, a {class} variable",
                    label = logwise::privacy::LogIt(label),
                    name = logwise::privacy::LogIt(&res.name),
                    class = logwise::privacy::LogIt(&res.class)
                );
            }
        }
    }

    if res.kind == ResourceKind::ConstantBuffer {
        cache.adjust_dynamic_cb_count(old.as_ref(), object.as_ref());
    }
    // An unbind clears the cell too; stale descriptors must not survive in
    // persistent shader-visible space.
    if let Some((space, cell)) = cache.shader_visible_cell(root, offset) {
        space.write(cell, object.as_ref().map(|o| o.descriptor()));
    }
    cache.set_object(root, offset, object.clone());

    // Combined-sampler convention: the texture drags its paired sampler
    // along, unless an immutable sampler already owns that slot.
    if let Some(new) = &object
        && let Some(sampler_ind) = attr.assigned_sampler
        && !attribs[sampler_ind].immutable_sampler
    {
        match new.paired_sampler() {
            Some(sampler) => {
                let sampler_elem = if resources[sampler_ind].array_size > 1 {
                    array_index
                } else {
                    0
                };
                bind_resource_into(
                    label,
                    resources,
                    attribs,
                    cache,
                    sampler_ind,
                    sampler_elem,
                    Some(sampler),
                );
            }
            None => {
                logwise::error_sync!(
                    "signature {label}: {object} bound to combined-sampler texture {name} carries no sampler",
                    label = logwise::privacy::LogIt(label),
                    object = logwise::privacy::LogIt(new.debug_name()),
                    name = logwise::privacy::LogIt(&res.name)
                );
            }
        }
    }
}
