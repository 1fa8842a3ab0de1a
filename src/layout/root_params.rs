// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Storage for root parameters: descriptor tables and direct root views.
//!
//! All descriptor ranges live in one contiguous arena; each table owns a
//! segment of it, addressed by offset.  The manager is append-only — tables
//! and views keep their root index for the life of the signature no matter
//! how many ranges are added after them.

use crate::backend::HeapKind;
use crate::signature::descriptor::{RangeKind, ShaderStages};

/// Which half of the root signature a parameter belongs to.  Dynamic-class
/// resources are kept apart so their tables can be re-uploaded per
/// submission without touching the persistent half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RootGroup {
    StaticMutable = 0,
    Dynamic = 1,
}

impl RootGroup {
    pub const COUNT: usize = 2;
}

/// One contiguous run of same-kind descriptors within a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorRange {
    pub kind: RangeKind,
    pub base_register: u32,
    pub register_space: u32,
    pub count: u32,
    /// Offset of the range's first descriptor from the start of its table.
    pub offset_from_table_start: u32,
}

/// A descriptor table root parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootTable {
    root_index: u32,
    group: RootGroup,
    visibility: ShaderStages,
    heap: HeapKind,
    start: usize,
    len: u32,
    capacity: u32,
    table_size: u32,
}

impl RootTable {
    pub fn root_index(&self) -> u32 {
        self.root_index
    }

    pub fn group(&self) -> RootGroup {
        self.group
    }

    pub fn visibility(&self) -> ShaderStages {
        self.visibility
    }

    pub fn heap(&self) -> HeapKind {
        self.heap
    }

    /// Number of descriptor cells the table spans, including any holes left
    /// by immutable-sampler bind-point reuse.
    pub fn table_size(&self) -> u32 {
        self.table_size
    }
}

/// A direct root-view parameter: a single buffer bound inline, with no
/// descriptor heap cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootView {
    root_index: u32,
    group: RootGroup,
    visibility: ShaderStages,
    kind: RangeKind,
    pub base_register: u32,
    pub register_space: u32,
}

impl RootView {
    pub fn root_index(&self) -> u32 {
        self.root_index
    }

    pub fn group(&self) -> RootGroup {
        self.group
    }

    pub fn visibility(&self) -> ShaderStages {
        self.visibility
    }

    pub fn kind(&self) -> RangeKind {
        self.kind
    }
}

/// Owns all root parameters of a signature under construction.
#[derive(Debug, Default)]
pub struct RootParamsManager {
    ranges: Vec<DescriptorRange>,
    tables: Vec<RootTable>,
    views: Vec<RootView>,
}

const INITIAL_TABLE_CAPACITY: u32 = 4;

impl RootParamsManager {
    pub fn new() -> RootParamsManager {
        RootParamsManager::default()
    }

    /// Total root parameter count: tables plus views.
    pub fn root_count(&self) -> u32 {
        (self.tables.len() + self.views.len()) as u32
    }

    pub fn tables(&self) -> &[RootTable] {
        &self.tables
    }

    pub fn views(&self) -> &[RootView] {
        &self.views
    }

    /// The ranges of `table`, in insertion order.
    pub fn ranges_of(&self, table: &RootTable) -> &[DescriptorRange] {
        &self.ranges[table.start..table.start + table.len as usize]
    }

    /// Adds a direct root view and returns its root index.
    pub fn add_root_view(
        &mut self,
        group: RootGroup,
        visibility: ShaderStages,
        kind: RangeKind,
        base_register: u32,
        register_space: u32,
    ) -> u32 {
        let root_index = self.root_count();
        self.views.push(RootView {
            root_index,
            group,
            visibility,
            kind,
            base_register,
            register_space,
        });
        root_index
    }

    /// Adds an empty table and returns its index into [`Self::tables`].
    pub fn add_root_table(
        &mut self,
        group: RootGroup,
        visibility: ShaderStages,
        heap: HeapKind,
    ) -> usize {
        let root_index = self.root_count();
        let start = self.ranges.len();
        self.ranges.extend(std::iter::repeat_n(
            DescriptorRange {
                kind: RangeKind::Srv,
                base_register: 0,
                register_space: 0,
                count: 0,
                offset_from_table_start: 0,
            },
            INITIAL_TABLE_CAPACITY as usize,
        ));
        self.tables.push(RootTable {
            root_index,
            group,
            visibility,
            heap,
            start,
            len: 0,
            capacity: INITIAL_TABLE_CAPACITY,
            table_size: 0,
        });
        self.tables.len() - 1
    }

    /// Appends `range` to the table at `table_ind`, growing the arena if the
    /// table's segment is full.  Root indices never change.
    pub fn add_range(&mut self, table_ind: usize, range: DescriptorRange) {
        if self.tables[table_ind].len == self.tables[table_ind].capacity {
            self.grow_table(table_ind);
        }
        let table = &mut self.tables[table_ind];
        self.ranges[table.start + table.len as usize] = range;
        table.len += 1;
        table.table_size = table.table_size.max(range.offset_from_table_start + range.count);
    }

    /// Re-strides the arena with double capacity for table `table_ind`,
    /// copying every table's live ranges into its new segment.
    fn grow_table(&mut self, table_ind: usize) {
        let mut new_ranges = Vec::with_capacity(self.ranges.len() + self.tables[table_ind].capacity as usize);
        for (ind, table) in self.tables.iter_mut().enumerate() {
            let new_capacity = if ind == table_ind {
                table.capacity * 2
            } else {
                table.capacity
            };
            let new_start = new_ranges.len();
            new_ranges.extend_from_slice(&self.ranges[table.start..table.start + table.len as usize]);
            new_ranges.resize(
                new_start + new_capacity as usize,
                DescriptorRange {
                    kind: RangeKind::Srv,
                    base_register: 0,
                    register_space: 0,
                    count: 0,
                    offset_from_table_start: 0,
                },
            );
            table.start = new_start;
            table.capacity = new_capacity;
        }
        self.ranges = new_ranges;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(register: u32) -> DescriptorRange {
        DescriptorRange {
            kind: RangeKind::Srv,
            base_register: register,
            register_space: 0,
            count: 1,
            offset_from_table_start: register,
        }
    }

    #[test]
    fn growth_preserves_earlier_tables_and_root_indices() {
        let mut params = RootParamsManager::new();
        let view_root = params.add_root_view(
            RootGroup::StaticMutable,
            ShaderStages::VERTEX,
            RangeKind::Cbv,
            0,
            0,
        );
        let first = params.add_root_table(RootGroup::StaticMutable, ShaderStages::PIXEL, HeapKind::Resource);
        let second = params.add_root_table(RootGroup::Dynamic, ShaderStages::PIXEL, HeapKind::Resource);
        for r in 0..3 {
            params.add_range(first, range(r));
        }
        params.add_range(second, range(0));

        let first_before: Vec<_> = params.ranges_of(&params.tables()[first]).to_vec();
        let second_root_before = params.tables()[second].root_index();

        // 5 more ranges forces at least one re-stride of the first table.
        for r in 3..8 {
            params.add_range(first, range(r));
        }

        assert_eq!(view_root, 0);
        assert_eq!(&params.ranges_of(&params.tables()[first])[..3], &first_before[..]);
        assert_eq!(params.tables()[second].root_index(), second_root_before);
        assert_eq!(params.ranges_of(&params.tables()[second]), &[range(0)]);
        assert_eq!(params.tables()[first].table_size(), 8);
        assert_eq!(params.root_count(), 3);
    }
}
