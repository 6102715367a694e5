//! Translation-table builder.
//!
//! Owns the two translation hierarchies (one rooted at TTBR0 for the low
//! bootstrap identity regime, one at TTBR1 for the kernel's permanent high
//! half) and provides the walk/map/lookup operations the bring-up sequence
//! is built from. Table pages come from the frame allocator and are never
//! freed; descriptors are only ever written with the clean-to-PoC sandwich
//! the walker-visibility contract requires, and every batch of writes ends
//! in one regime-wide TLB invalidation.
//!
//! This module reads and writes table memory but never a system register;
//! all maintenance goes through the policy layer.

use crate::arch::aarch64::mmu::policy;
use crate::config::{PAGE_SIZE, VaBits};
use crate::mm::descriptor::{
    self, DescriptorKind, EncodeError, Level, PageAttributes,
};
use crate::mm::{phys_to_virt, pmm};
use crate::println;
use crate::sync::SpinLock;

/// One of the two translation regimes, selected by the top VA bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// TTBR0: top bits zero. Bootstrap identity mappings only.
    Low,
    /// TTBR1: top bits one. The kernel's permanent address space.
    High,
}

/// Failures of the read/create walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkError {
    /// A read-only walk met an invalid entry.
    NotMapped,
    /// The frame allocator ran dry while creating an intermediate table.
    /// Unrecoverable before the MMU is on.
    OutOfFrames,
}

/// Failures of the range-mapping interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    OutOfFrames,
    /// `va_end` precedes `va_start`.
    InvalidRange { va_start: usize, va_end: usize },
    /// The range does not lie in the regime the call named.
    WrongRegime { va: usize, regime: Regime },
    /// The address selects neither regime (non-canonical top bits).
    NonCanonical(usize),
    /// `va_start` and `pa_start` disagree within the page offset.
    OffsetMismatch { va: usize, pa: usize },
    /// Mappings with a clear access flag would fault on first touch; the
    /// builder refuses to create them.
    AccessFlagOff,
    Encode(EncodeError),
}

impl From<EncodeError> for MapError {
    fn from(err: EncodeError) -> Self {
        MapError::Encode(err)
    }
}

/// Diagnostic record of one `map_range` call. Bounded; see [`MappingLog`].
#[derive(Debug, Clone, Copy)]
pub struct MappingRecord {
    pub regime: Regime,
    pub va_start: usize,
    pub va_end: usize,
    pub pa_start: usize,
    pub attrs: PageAttributes,
    pub name: &'static str,
}

const MAX_RECORDS: usize = 48;

/// Append-only list of mapping records. Overflow drops the record with a
/// warning; it never fails the mapping itself.
struct MappingLog {
    records: [MappingRecord; MAX_RECORDS],
    len: usize,
    dropped: usize,
}

const EMPTY_RECORD: MappingRecord = MappingRecord {
    regime: Regime::Low,
    va_start: 0,
    va_end: 0,
    pa_start: 0,
    attrs: PageAttributes::KERNEL_DATA,
    name: "",
};

impl MappingLog {
    const fn new() -> Self {
        Self {
            records: [EMPTY_RECORD; MAX_RECORDS],
            len: 0,
            dropped: 0,
        }
    }

    fn push(&mut self, record: MappingRecord) {
        if self.len < MAX_RECORDS {
            self.records[self.len] = record;
            self.len += 1;
        } else {
            if self.dropped == 0 {
                println!("vm: mapping log full, dropping `{}`", record.name);
            }
            self.dropped += 1;
        }
    }
}

/// A successfully resolved level-3 mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMapping {
    pub pa: usize,
    pub attrs: PageAttributes,
    pub raw: u64,
}

/// The two bootstrap translation hierarchies.
pub struct KernelTables {
    root_low: usize,
    root_high: usize,
    va_bits: VaBits,
    log: MappingLog,
}

impl KernelTables {
    /// Allocate and zero both root tables.
    pub fn new(va_bits: VaBits) -> Result<Self, MapError> {
        let root_low = pmm::alloc_frame_zeroed().ok_or(MapError::OutOfFrames)?;
        let root_high = pmm::alloc_frame_zeroed().ok_or(MapError::OutOfFrames)?;
        Ok(Self {
            root_low: root_low.addr,
            root_high: root_high.addr,
            va_bits,
            log: MappingLog::new(),
        })
    }

    pub fn va_bits(&self) -> VaBits {
        self.va_bits
    }

    /// Physical address of a regime's root, for TTBR programming.
    pub fn root_pa(&self, regime: Regime) -> usize {
        match regime {
            Regime::Low => self.root_low,
            Regime::High => self.root_high,
        }
    }

    /// Which regime a canonical address belongs to.
    pub fn regime_of(&self, va: usize) -> Result<Regime, MapError> {
        let span = 1usize << self.va_bits.bits();
        if va < span {
            Ok(Regime::Low)
        } else if va >= self.va_bits.high_base() {
            Ok(Regime::High)
        } else {
            Err(MapError::NonCanonical(va))
        }
    }

    /// Bits of `va` that index the tables: the regime-selecting top bits are
    /// all-zero or all-one and take no part in the walk.
    fn table_bits(&self, va: usize) -> usize {
        va & ((1usize << self.va_bits.bits()) - 1) & 0x0000_FFFF_FFFF_FFFF
    }

    /// Level the hardware roots its walk at for this VA width: level 0 for
    /// 48 bits, level 1 for 39 (T0SZ/T1SZ = 25 skips the top level).
    fn root_level(&self) -> Level {
        match self.va_bits {
            VaBits::Va48 => Level::L0,
            VaBits::Va39 => Level::L1,
        }
    }

    fn entry_ptr(table_pa: usize, level: Level, va: usize) -> *mut u64 {
        let table = phys_to_virt(table_pa) as *mut u64;
        // SAFETY: `table_pa` refers to a 4 KiB table page owned by this
        // hierarchy; the level index is 9 bits and stays inside it.
        unsafe { table.add(level.index_of(va)) }
    }

    /// Descend L0 -> L3 and return a pointer to the level-3 entry.
    ///
    /// With `create` set, invalid intermediate entries are populated with
    /// freshly zeroed tables (descriptor write cleaned to PoC). Without it,
    /// an invalid entry anywhere on the path is `NotMapped`.
    pub fn walk(&mut self, regime: Regime, va: usize, create: bool) -> Result<*mut u64, WalkError> {
        let va = self.table_bits(va);
        let mut table_pa = self.root_pa(regime);

        let mut level = self.root_level();
        while level != Level::L3 {
            let entry = Self::entry_ptr(table_pa, level, va);
            // SAFETY: in-bounds entry of an owned table page.
            let raw = unsafe { entry.read_volatile() };
            match descriptor::decode(raw, level) {
                Ok(DescriptorKind::Table { pa }) => table_pa = pa,
                Ok(DescriptorKind::Invalid) if create => {
                    let frame = pmm::alloc_frame_zeroed().ok_or(WalkError::OutOfFrames)?;
                    let desc = descriptor::table_descriptor(frame.addr)
                        .expect("frame allocator returned an unaligned frame");
                    policy::clean_dcache_line(entry as usize);
                    // SAFETY: as above.
                    unsafe { entry.write_volatile(desc) };
                    policy::clean_dcache_line(entry as usize);
                    table_pa = frame.addr;
                }
                // Blocks are never created by this builder; finding one is
                // equivalent to the path not supporting a page walk.
                _ => return Err(WalkError::NotMapped),
            }
            level = level.next().expect("walk stops before level 3");
        }

        Ok(Self::entry_ptr(table_pa, Level::L3, va))
    }

    /// Read-only variant of [`walk`].
    fn walk_ro(&self, regime: Regime, va: usize) -> Result<*mut u64, WalkError> {
        let va = self.table_bits(va);
        let mut table_pa = self.root_pa(regime);
        let mut level = self.root_level();
        while level != Level::L3 {
            let entry = Self::entry_ptr(table_pa, level, va);
            // SAFETY: in-bounds entry of an owned table page.
            let raw = unsafe { entry.read_volatile() };
            match descriptor::decode(raw, level) {
                Ok(DescriptorKind::Table { pa }) => table_pa = pa,
                _ => return Err(WalkError::NotMapped),
            }
            level = level.next().expect("walk stops before level 3");
        }
        Ok(Self::entry_ptr(table_pa, Level::L3, va))
    }

    /// Map `[va_start, va_end)` to physical memory starting at `pa_start`.
    ///
    /// Endpoints are rounded outward to page boundaries. Re-issuing a
    /// mapping with identical parameters rewrites nothing (the table state
    /// stays bit-identical); an overlapping request with different
    /// parameters overwrites the old descriptors. Returns the number of
    /// pages now covering the range.
    pub fn map_range(
        &mut self,
        regime: Regime,
        va_start: usize,
        va_end: usize,
        pa_start: usize,
        attrs: PageAttributes,
        name: &'static str,
    ) -> Result<usize, MapError> {
        if va_end < va_start {
            return Err(MapError::InvalidRange { va_start, va_end });
        }
        if (va_start ^ pa_start) & (PAGE_SIZE - 1) != 0 {
            return Err(MapError::OffsetMismatch {
                va: va_start,
                pa: pa_start,
            });
        }
        if !attrs.access_flag {
            return Err(MapError::AccessFlagOff);
        }

        let va0 = va_start & !(PAGE_SIZE - 1);
        let va1 = va_end.div_ceil(PAGE_SIZE) * PAGE_SIZE;
        let pa0 = pa_start - (va_start - va0);
        if va0 == va1 {
            // An empty request maps zero pages and mutates nothing.
            return Ok(0);
        }

        for va in [va0, va1 - PAGE_SIZE] {
            match self.regime_of(va) {
                Ok(found) if found == regime => {}
                Ok(_) => return Err(MapError::WrongRegime { va, regime }),
                Err(err) => return Err(err),
            }
        }

        let pages = (va1 - va0) / PAGE_SIZE;
        let mut wrote = false;
        for index in 0..pages {
            let va = va0 + index * PAGE_SIZE;
            let pa = pa0 + index * PAGE_SIZE;
            let desc = descriptor::page_descriptor(pa, attrs)?;
            let entry = match self.walk(regime, va, true) {
                Ok(entry) => entry,
                Err(_) => return Err(MapError::OutOfFrames),
            };
            // SAFETY: `walk` returned an in-bounds level-3 entry of a table
            // page owned by this hierarchy.
            unsafe {
                if entry.read_volatile() == desc {
                    // Same (va, pa, attrs) already installed; leave the
                    // line untouched so re-mapping is a no-op.
                    continue;
                }
                policy::clean_dcache_line(entry as usize);
                entry.write_volatile(desc);
                policy::clean_dcache_line(entry as usize);
            }
            wrote = true;
        }

        if wrote {
            policy::tlbi_full();
        }

        self.log.push(MappingRecord {
            regime,
            va_start: va0,
            va_end: va1,
            pa_start: pa0,
            attrs,
            name,
        });
        Ok(pages)
    }

    /// Remove any level-3 mappings in `[va_start, va_end)`. Intermediate
    /// tables stay allocated. Returns the number of entries invalidated.
    pub fn unmap(
        &mut self,
        regime: Regime,
        va_start: usize,
        va_end: usize,
    ) -> Result<usize, MapError> {
        if va_end < va_start {
            return Err(MapError::InvalidRange { va_start, va_end });
        }
        let va0 = va_start & !(PAGE_SIZE - 1);
        let va1 = va_end.div_ceil(PAGE_SIZE) * PAGE_SIZE;

        let mut removed = 0;
        for va in (va0..va1).step_by(PAGE_SIZE) {
            let Ok(entry) = self.walk_ro(regime, va) else {
                continue;
            };
            // SAFETY: in-bounds level-3 entry of an owned table page.
            unsafe {
                if entry.read_volatile() & 1 == 0 {
                    continue;
                }
                policy::clean_dcache_line(entry as usize);
                entry.write_volatile(0);
                policy::clean_dcache_line(entry as usize);
            }
            removed += 1;
        }
        if removed > 0 {
            policy::tlbi_full();
        }
        Ok(removed)
    }

    /// Read-only translation of `va`, if a page descriptor covers it.
    pub fn lookup(&self, regime: Regime, va: usize) -> Option<PageMapping> {
        let entry = self.walk_ro(regime, va).ok()?;
        // SAFETY: in-bounds level-3 entry of an owned table page.
        let raw = unsafe { entry.read_volatile() };
        match descriptor::decode(raw, Level::L3) {
            Ok(DescriptorKind::Page { pa, attrs }) => Some(PageMapping { pa, attrs, raw }),
            _ => None,
        }
    }

    /// Verify that every table descriptor reachable from either root refers
    /// to a 4 KiB-aligned table page.
    pub fn tables_aligned(&self) -> bool {
        let root = self.root_level();
        self.check_table(self.root_low, root) && self.check_table(self.root_high, root)
    }

    fn check_table(&self, table_pa: usize, level: Level) -> bool {
        if table_pa % PAGE_SIZE != 0 {
            return false;
        }
        let Some(next) = level.next() else {
            return true;
        };
        for index in 0..512 {
            let table = phys_to_virt(table_pa) as *const u64;
            // SAFETY: reading an owned, always-present table page.
            let raw = unsafe { table.add(index).read_volatile() };
            if let Ok(DescriptorKind::Table { pa }) = descriptor::decode(raw, level) {
                if !self.check_table(pa, next) {
                    return false;
                }
            }
        }
        true
    }

    pub fn records(&self) -> &[MappingRecord] {
        &self.log.records[..self.log.len]
    }

    pub fn records_dropped(&self) -> usize {
        self.log.dropped
    }

    /// Print the mapping table over the UART.
    pub fn dump(&self) {
        println!("vm: {} mappings ({} dropped)", self.log.len, self.log.dropped);
        for record in self.records() {
            println!(
                "  {:>4?} {:#018x}..{:#018x} -> {:#010x} {:?} `{}`",
                record.regime,
                record.va_start,
                record.va_end,
                record.pa_start,
                record.attrs.attr_index,
                record.name,
            );
        }
    }
}

/// Long-lived home of the bootstrap hierarchies, installed by the
/// continuation once the high half is live. Before that point the tables
/// are threaded through the bring-up context by value and this is `None`.
static KERNEL_TABLES: SpinLock<Option<KernelTables>> = SpinLock::new(None);

pub fn install_kernel_tables(tables: KernelTables) {
    *KERNEL_TABLES.lock() = Some(tables);
}

/// Map further high-regime ranges after bring-up has completed.
pub fn map_range_kernel(
    va_start: usize,
    va_end: usize,
    pa_start: usize,
    attrs: PageAttributes,
    name: &'static str,
) -> Result<usize, MapError> {
    let mut tables = KERNEL_TABLES.lock();
    let tables = tables.as_mut().ok_or(MapError::WrongRegime {
        va: va_start,
        regime: Regime::High,
    })?;
    tables.map_range(Regime::High, va_start, va_end, pa_start, attrs, name)
}

/// Run `f` against the installed kernel tables, if bring-up has completed.
pub fn with_kernel_tables<R>(f: impl FnOnce(&KernelTables) -> R) -> Option<R> {
    KERNEL_TABLES.lock().as_ref().map(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VA_BITS;
    use crate::mm::descriptor::AttrIndex;

    // Test ranges live far from anything the running kernel maps; the
    // hierarchies built here are never installed in a TTBR.
    const TEST_VA: usize = 0x40_0000_0000;
    const TEST_PA: usize = 0x6000_0000;

    fn fresh() -> KernelTables {
        KernelTables::new(VA_BITS).expect("table roots")
    }

    #[test_case]
    fn mapped_page_resolves_to_its_frame() {
        let mut tables = fresh();
        tables
            .map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        let mapping = tables.lookup(Regime::Low, TEST_VA).unwrap();
        assert_eq!(mapping.pa, TEST_PA);
        assert_eq!(mapping.attrs, PageAttributes::KERNEL_DATA);
    }

    #[test_case]
    fn multi_page_range_translates_linearly() {
        let mut tables = fresh();
        let pages = tables
            .map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA + 5 * PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        assert_eq!(pages, 5);
        for k in 0..5 {
            let mapping = tables.lookup(Regime::Low, TEST_VA + k * PAGE_SIZE).unwrap();
            assert_eq!(mapping.pa, TEST_PA + k * PAGE_SIZE);
        }
        assert!(tables.lookup(Regime::Low, TEST_VA + 5 * PAGE_SIZE).is_none());
    }

    #[test_case]
    fn remapping_identically_is_a_no_op() {
        let mut tables = fresh();
        let map = |tables: &mut KernelTables| {
            tables
                .map_range(
                    Regime::Low,
                    TEST_VA,
                    TEST_VA + 4 * PAGE_SIZE,
                    TEST_PA,
                    PageAttributes::KERNEL_TEXT,
                    "test",
                )
                .unwrap()
        };
        map(&mut tables);
        let raws: [u64; 4] = core::array::from_fn(|k| {
            tables.lookup(Regime::Low, TEST_VA + k * PAGE_SIZE).unwrap().raw
        });
        let free_before = pmm::stats().free;

        map(&mut tables);
        for (k, raw) in raws.iter().enumerate() {
            let again = tables.lookup(Regime::Low, TEST_VA + k * PAGE_SIZE).unwrap();
            assert_eq!(again.raw, *raw, "descriptor {k} rewritten");
        }
        assert_eq!(pmm::stats().free, free_before, "idempotent remap allocated");
    }

    #[test_case]
    fn overlapping_map_overwrites_but_appends_records() {
        let mut tables = fresh();
        for attrs in [PageAttributes::KERNEL_DATA, PageAttributes::KERNEL_RODATA] {
            tables
                .map_range(Regime::Low, TEST_VA, TEST_VA + PAGE_SIZE, TEST_PA, attrs, "test")
                .unwrap();
        }
        let mapping = tables.lookup(Regime::Low, TEST_VA).unwrap();
        assert_eq!(mapping.attrs, PageAttributes::KERNEL_RODATA);
        assert_eq!(tables.records().len(), 2);
    }

    #[test_case]
    fn empty_range_maps_nothing() {
        let mut tables = fresh();
        let free_before = pmm::stats().free;
        let pages = tables
            .map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        assert_eq!(pages, 0);
        assert_eq!(pmm::stats().free, free_before);
        assert_eq!(tables.records().len(), 0);
        assert!(tables.lookup(Regime::Low, TEST_VA).is_none());
    }

    #[test_case]
    fn straddling_a_level2_boundary_grows_a_second_leaf_table() {
        let mut tables = fresh();
        let free_before = pmm::stats().free;
        // One page either side of a 2 MiB (level-2 slot) boundary.
        let boundary = TEST_VA + (2 << 20);
        tables
            .map_range(
                Regime::Low,
                boundary - PAGE_SIZE,
                boundary + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        // Intermediate tables down to L2, plus two distinct L3 tables.
        let intermediates = match VA_BITS {
            VaBits::Va48 => 2, // L1 + L2
            VaBits::Va39 => 1, // L2 (the root already is L1)
        };
        assert_eq!(free_before - pmm::stats().free, intermediates + 2);
        assert!(tables.lookup(Regime::Low, boundary - PAGE_SIZE).is_some());
        assert!(tables.lookup(Regime::Low, boundary).is_some());
    }

    #[test_case]
    fn readonly_walk_neither_maps_nor_allocates() {
        let mut tables = fresh();
        let free_before = pmm::stats().free;
        assert_eq!(
            tables.walk(Regime::Low, TEST_VA + 0x123000, false).unwrap_err(),
            WalkError::NotMapped
        );
        assert!(tables.lookup(Regime::Low, TEST_VA + 0x123000).is_none());
        assert_eq!(pmm::stats().free, free_before);
    }

    #[test_case]
    fn unaligned_endpoints_round_outward() {
        let mut tables = fresh();
        let pages = tables
            .map_range(
                Regime::Low,
                TEST_VA + 0x800,
                TEST_VA + PAGE_SIZE + 0x10,
                TEST_PA + 0x800,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        assert_eq!(pages, 2);
        assert_eq!(tables.lookup(Regime::Low, TEST_VA).unwrap().pa, TEST_PA);
        assert_eq!(
            tables.lookup(Regime::Low, TEST_VA + PAGE_SIZE).unwrap().pa,
            TEST_PA + PAGE_SIZE
        );
    }

    #[test_case]
    fn ranges_must_match_their_regime() {
        let mut tables = fresh();
        let high = VA_BITS.high_base();
        assert!(matches!(
            tables.map_range(
                Regime::Low,
                high,
                high + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            ),
            Err(MapError::WrongRegime { .. })
        ));
        assert!(matches!(
            tables.map_range(
                Regime::High,
                TEST_VA,
                TEST_VA + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            ),
            Err(MapError::WrongRegime { .. })
        ));
    }

    #[test_case]
    fn non_canonical_addresses_are_rejected() {
        let tables = fresh();
        let span = 1usize << VA_BITS.bits();
        assert!(matches!(
            tables.regime_of(span),
            Err(MapError::NonCanonical(_))
        ));
        assert_eq!(tables.regime_of(VA_BITS.high_base()), Ok(Regime::High));
        assert_eq!(tables.regime_of(span - 1), Ok(Regime::Low));
    }

    #[test_case]
    fn access_flag_must_be_set() {
        let mut tables = fresh();
        let mut attrs = PageAttributes::KERNEL_DATA;
        attrs.access_flag = false;
        assert_eq!(
            tables.map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA + PAGE_SIZE,
                TEST_PA,
                attrs,
                "test",
            ),
            Err(MapError::AccessFlagOff)
        );
    }

    #[test_case]
    fn mismatched_page_offsets_are_rejected() {
        let mut tables = fresh();
        assert!(matches!(
            tables.map_range(
                Regime::Low,
                TEST_VA + 0x800,
                TEST_VA + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            ),
            Err(MapError::OffsetMismatch { .. })
        ));
    }

    #[test_case]
    fn unmap_invalidates_and_lookup_misses() {
        let mut tables = fresh();
        tables
            .map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA + 2 * PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        let removed = tables.unmap(Regime::Low, TEST_VA, TEST_VA + PAGE_SIZE).unwrap();
        assert_eq!(removed, 1);
        assert!(tables.lookup(Regime::Low, TEST_VA).is_none());
        assert!(tables.lookup(Regime::Low, TEST_VA + PAGE_SIZE).is_some());
    }

    #[test_case]
    fn every_reachable_table_is_page_aligned() {
        let mut tables = fresh();
        tables
            .map_range(
                Regime::Low,
                TEST_VA,
                TEST_VA + 8 * PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        tables
            .map_range(
                Regime::High,
                VA_BITS.high_base() | TEST_PA,
                (VA_BITS.high_base() | TEST_PA) + PAGE_SIZE,
                TEST_PA,
                PageAttributes::KERNEL_DATA,
                "test",
            )
            .unwrap();
        assert!(tables.tables_aligned());
    }

    #[test_case]
    fn duplicate_device_mapping_is_tolerated() {
        use crate::config::{UART_PHYS, UART_VIRT};
        let mut tables = fresh();
        for _ in 0..2 {
            tables
                .map_range(
                    Regime::High,
                    UART_VIRT,
                    UART_VIRT + PAGE_SIZE,
                    UART_PHYS,
                    PageAttributes::DEVICE,
                    "uart",
                )
                .unwrap();
        }
        let mapping = tables.lookup(Regime::High, UART_VIRT).unwrap();
        assert_eq!(mapping.pa, UART_PHYS);
        assert_eq!(mapping.attrs.attr_index, AttrIndex::DeviceNGnRE);
    }
}
