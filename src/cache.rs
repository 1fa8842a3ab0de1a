// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
Resource caches.

A [`ResourceCache`] is the CPU-side shadow of a set of descriptor tables:
one flat entry array per table, plus the shader-visible heap space the
persistent tables were assigned at construction.  Two flavors exist, told
apart by [`CacheContent`]:

- the **signature cache** holds static-class resources bound on the
  signature itself, bucketed into four artificial tables by native range
  kind, with no heap space behind them;
- the **context cache** backs a binding context, with one entry array per
  real root table and persistent heap space assigned by prefix sum over the
  non-dynamic tables.

Dynamic tables get no persistent offset; commit copies them into transient
heap space every submission.
*/

use crate::backend::{Backend, BackendObject, HeapAllocator, HeapExhausted, HeapKind};
use crate::layout::root_params::{RootGroup, RootParamsManager};
use crate::signature::descriptor::RangeKind;

/// Which flavor of cache a set of attributes addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheContent {
    /// The signature's own static snapshot.
    Signature,
    /// A binding context's cache.
    Context,
}

/// One descriptor slot's CPU-side shadow.
#[derive(Debug)]
pub struct CachedResource<B: Backend> {
    pub object: Option<B::Object>,
}

impl<B: Backend> Clone for CachedResource<B> {
    fn clone(&self) -> Self {
        CachedResource {
            object: self.object.clone(),
        }
    }
}

/// Entry array for one table.
#[derive(Debug)]
pub struct TableCache<B: Backend> {
    root_index: u32,
    heap: HeapKind,
    dynamic: bool,
    /// True for the one-entry shadow of a direct root view; such entries
    /// never occupy heap cells.
    root_view: bool,
    /// Offset of the table's first cell within the cache's persistent heap
    /// space; `None` for dynamic tables, root views, and the signature
    /// cache.
    start_offset: Option<u32>,
    resources: Vec<CachedResource<B>>,
}

impl<B: Backend> TableCache<B> {
    pub fn root_index(&self) -> u32 {
        self.root_index
    }

    pub fn heap(&self) -> HeapKind {
        self.heap
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn is_root_view(&self) -> bool {
        self.root_view
    }

    pub fn start_offset(&self) -> Option<u32> {
        self.start_offset
    }

    pub fn len(&self) -> u32 {
        self.resources.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[CachedResource<B>] {
        &self.resources
    }
}

/// The cache proper.
#[derive(Debug)]
pub struct ResourceCache<B: Backend> {
    content: CacheContent,
    tables: Vec<TableCache<B>>,
    heap_space: [Option<B::HeapRange>; HeapKind::COUNT],
    /// Count of currently-bound dynamically-updated constant buffers.
    /// Engines consult this to decide whether root views need re-pointing.
    dynamic_cb_count: u32,
}

impl<B: Backend> ResourceCache<B> {
    /// Builds the signature's static snapshot cache.  `table_sizes` is
    /// indexed by [`RangeKind`] discriminant; empty kinds still get a table
    /// so artificial root indices stay fixed.
    pub fn for_signature(table_sizes: &[u32; RangeKind::COUNT]) -> ResourceCache<B> {
        let tables = table_sizes
            .iter()
            .enumerate()
            .map(|(kind, &size)| TableCache {
                root_index: kind as u32,
                heap: if kind == RangeKind::Sampler as usize {
                    HeapKind::Sampler
                } else {
                    HeapKind::Resource
                },
                dynamic: false,
                root_view: false,
                start_offset: None,
                resources: vec![CachedResource { object: None }; size as usize],
            })
            .collect();
        ResourceCache {
            content: CacheContent::Signature,
            tables,
            heap_space: [None, None],
            dynamic_cb_count: 0,
        }
    }

    /// Builds a context cache for the given root parameters.  Persistent
    /// (non-dynamic) tables are packed into shader-visible heap space by
    /// prefix sum, one allocation per heap kind.
    pub fn for_context(
        params: &RootParamsManager,
        allocator: &B::HeapAllocator,
    ) -> Result<ResourceCache<B>, HeapExhausted> {
        let mut totals = [0u32; HeapKind::COUNT];
        let mut tables = Vec::with_capacity(params.tables().len());
        for table in params.tables() {
            let dynamic = table.group() == RootGroup::Dynamic;
            let start_offset = if dynamic {
                None
            } else {
                let offset = totals[table.heap() as usize];
                totals[table.heap() as usize] += table.table_size();
                Some(offset)
            };
            tables.push(TableCache {
                root_index: table.root_index(),
                heap: table.heap(),
                dynamic,
                root_view: false,
                start_offset,
                resources: vec![CachedResource { object: None }; table.table_size() as usize],
            });
        }
        for view in params.views() {
            tables.push(TableCache {
                root_index: view.root_index(),
                heap: HeapKind::Resource,
                dynamic: view.group() == RootGroup::Dynamic,
                root_view: true,
                start_offset: None,
                resources: vec![CachedResource { object: None }],
            });
        }

        let mut heap_space = [None, None];
        for kind in [HeapKind::Resource, HeapKind::Sampler] {
            if totals[kind as usize] > 0 {
                heap_space[kind as usize] = Some(allocator.allocate(kind, totals[kind as usize])?);
            }
        }

        Ok(ResourceCache {
            content: CacheContent::Context,
            tables,
            heap_space,
            dynamic_cb_count: 0,
        })
    }

    pub fn content(&self) -> CacheContent {
        self.content
    }

    pub fn tables(&self) -> &[TableCache<B>] {
        &self.tables
    }

    pub fn table(&self, root_index: u32) -> Option<&TableCache<B>> {
        self.tables.iter().find(|t| t.root_index == root_index)
    }

    pub fn resource(&self, root_index: u32, offset: u32) -> Option<&CachedResource<B>> {
        self.table(root_index)?.resources.get(offset as usize)
    }

    pub fn set_object(&mut self, root_index: u32, offset: u32, object: Option<B::Object>) {
        let table = self
            .tables
            .iter_mut()
            .find(|t| t.root_index == root_index);
        if let Some(table) = table
            && let Some(slot) = table.resources.get_mut(offset as usize)
        {
            slot.object = object;
        }
    }

    /// The persistent heap space of `kind`, if any table was assigned into
    /// it.
    pub fn heap_space(&self, kind: HeapKind) -> Option<&B::HeapRange> {
        self.heap_space[kind as usize].as_ref()
    }

    /// The shader-visible cell of a persistent table slot: the heap range
    /// and the absolute cell offset within it.  `None` for dynamic tables,
    /// root views, and the signature cache.
    pub fn shader_visible_cell(&self, root_index: u32, offset: u32) -> Option<(&B::HeapRange, u32)> {
        let table = self.table(root_index)?;
        let start = table.start_offset?;
        let space = self.heap_space[table.heap as usize].as_ref()?;
        Some((space, start + offset))
    }

    pub fn dynamic_constant_buffer_count(&self) -> u32 {
        self.dynamic_cb_count
    }

    /// Keeps the dynamic constant-buffer counter in step with a slot change.
    pub fn adjust_dynamic_cb_count(&mut self, old: Option<&B::Object>, new: Option<&B::Object>) {
        if old.is_some_and(|o| o.is_dynamic_buffer()) {
            self.dynamic_cb_count -= 1;
        }
        if new.is_some_and(|o| o.is_dynamic_buffer()) {
            self.dynamic_cb_count += 1;
        }
    }
}
