//! ARMv8-A translation descriptor and control-register value encoding.
//!
//! Pure functions from typed attribute sets to the 64-bit values the
//! hardware walker and the system registers consume. Nothing in this module
//! touches memory or registers; misuse surfaces as an [`EncodeError`] at the
//! call site instead of as a translation fault three instructions after the
//! MMU comes on.
//!
//! Reference: ARM ARM Section D5.3 (VMSAv8-64 translation table format),
//! D13.2 (MAIR_EL1, TCR_EL1).

/// Descriptor type bits \[1:0\].
///
/// `0b11` is a table descriptor at levels 0-2 and a page descriptor at
/// level 3; `0b01` is a block at levels 1-2. Classification therefore needs
/// the level, which is why [`decode`] takes one.
const DESC_VALID: u64 = 1 << 0;
const DESC_TYPE_BIT: u64 = 1 << 1;

/// Lower attribute shifts (page/block descriptors).
const ATTR_INDEX_SHIFT: u64 = 2;
const AP_SHIFT: u64 = 6;
const SH_SHIFT: u64 = 8;
const ACCESS_FLAG: u64 = 1 << 10;

/// Output address field, bits \[47:12\].
const PA_MASK: u64 = 0x0000_FFFF_FFFF_F000;

/// Upper attribute bits.
const PXN: u64 = 1 << 53;
const UXN: u64 = 1 << 54;

/// Translation table level. L0 is the root; L3 holds page descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    L0,
    L1,
    L2,
    L3,
}

impl Level {
    /// VA bit position at which this level's 9-bit index starts.
    pub const fn index_shift(self) -> u32 {
        match self {
            Level::L0 => 39,
            Level::L1 => 30,
            Level::L2 => 21,
            Level::L3 => 12,
        }
    }

    /// This level's index for `va`: bits \[47:39\], \[38:30\], \[29:21\]
    /// or \[20:12\].
    pub const fn index_of(self, va: usize) -> usize {
        (va >> self.index_shift()) & 0x1FF
    }

    pub const fn next(self) -> Option<Level> {
        match self {
            Level::L0 => Some(Level::L1),
            Level::L1 => Some(Level::L2),
            Level::L2 => Some(Level::L3),
            Level::L3 => None,
        }
    }
}

/// MAIR attribute palette index, bits \[4:2\] of a page descriptor.
///
/// The palette itself is fixed (see [`mair_value`]); the numeric values
/// here are the byte positions within MAIR_EL1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum AttrIndex {
    /// Device-nGnRnE: strictly ordered, no early ack. Attr0 = 0x00.
    DeviceNGnRnE = 0,
    /// Normal write-back, read/write-allocate, inner+outer. Attr1 = 0xFF.
    NormalWb = 1,
    /// Normal non-cacheable. Attr2 = 0x44.
    NormalNc = 2,
    /// Device-nGnRE: gathers nothing, reorders nothing, early ack allowed.
    /// Attr3 = 0x04. Used for the UART.
    DeviceNGnRE = 3,
}

impl AttrIndex {
    fn from_bits(bits: u64) -> Result<Self, EncodeError> {
        match bits {
            0 => Ok(AttrIndex::DeviceNGnRnE),
            1 => Ok(AttrIndex::NormalWb),
            2 => Ok(AttrIndex::NormalNc),
            3 => Ok(AttrIndex::DeviceNGnRE),
            other => Err(EncodeError::UnknownAttrIndex(other)),
        }
    }
}

/// AP\[2:1\], bits \[7:6\] of a page descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum AccessPermission {
    KernelRw = 0b00,
    UserRw = 0b01,
    KernelRo = 0b10,
    UserRo = 0b11,
}

impl AccessPermission {
    fn from_bits(bits: u64) -> Self {
        match bits {
            0b00 => AccessPermission::KernelRw,
            0b01 => AccessPermission::UserRw,
            0b10 => AccessPermission::KernelRo,
            _ => AccessPermission::UserRo,
        }
    }

    /// True when EL1 may write through this permission.
    pub const fn kernel_writable(self) -> bool {
        matches!(self, AccessPermission::KernelRw | AccessPermission::UserRw)
    }
}

/// SH\[1:0\], bits \[9:8\]. `0b01` is architecturally reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum Shareability {
    None = 0b00,
    Outer = 0b10,
    Inner = 0b11,
}

impl Shareability {
    fn from_bits(bits: u64) -> Result<Self, EncodeError> {
        match bits {
            0b00 => Ok(Shareability::None),
            0b10 => Ok(Shareability::Outer),
            0b11 => Ok(Shareability::Inner),
            other => Err(EncodeError::ReservedShareability(other)),
        }
    }
}

/// PXN/UXN combination, bits 53/54.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteNever {
    /// Executable at every level (kernel text).
    None,
    /// PXN only: EL1 may not execute, EL0 may.
    PrivilegedOnly,
    /// UXN only: EL0 may not execute, EL1 may.
    UnprivilegedOnly,
    /// Not executable at all (data, MMIO).
    Both,
}

impl ExecuteNever {
    const fn bits(self) -> u64 {
        match self {
            ExecuteNever::None => 0,
            ExecuteNever::PrivilegedOnly => PXN,
            ExecuteNever::UnprivilegedOnly => UXN,
            ExecuteNever::Both => PXN | UXN,
        }
    }

    fn from_raw(raw: u64) -> Self {
        match (raw & PXN != 0, raw & UXN != 0) {
            (false, false) => ExecuteNever::None,
            (true, false) => ExecuteNever::PrivilegedOnly,
            (false, true) => ExecuteNever::UnprivilegedOnly,
            (true, true) => ExecuteNever::Both,
        }
    }
}

/// Full attribute set of a leaf (page) mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAttributes {
    pub attr_index: AttrIndex,
    pub access: AccessPermission,
    pub shareability: Shareability,
    /// Must be set on every live mapping; a clear access flag faults on
    /// first touch.
    pub access_flag: bool,
    pub execute_never: ExecuteNever,
}

impl PageAttributes {
    /// Kernel code: read-only, cacheable, executable at EL1.
    pub const KERNEL_TEXT: Self = Self {
        attr_index: AttrIndex::NormalWb,
        access: AccessPermission::KernelRo,
        shareability: Shareability::Inner,
        access_flag: true,
        execute_never: ExecuteNever::UnprivilegedOnly,
    };

    /// Kernel read-only data: like text, but never executable.
    pub const KERNEL_RODATA: Self = Self {
        attr_index: AttrIndex::NormalWb,
        access: AccessPermission::KernelRo,
        shareability: Shareability::Inner,
        access_flag: true,
        execute_never: ExecuteNever::Both,
    };

    /// Kernel read-write data, stacks, table pages.
    pub const KERNEL_DATA: Self = Self {
        attr_index: AttrIndex::NormalWb,
        access: AccessPermission::KernelRw,
        shareability: Shareability::Inner,
        access_flag: true,
        execute_never: ExecuteNever::Both,
    };

    /// MMIO: Device-nGnRE, kernel read-write, never executable.
    pub const DEVICE: Self = Self {
        attr_index: AttrIndex::DeviceNGnRE,
        access: AccessPermission::KernelRw,
        shareability: Shareability::None,
        access_flag: true,
        execute_never: ExecuteNever::Both,
    };
}

/// Decoded view of a raw descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Invalid,
    /// Levels 0-2: physical address of the next-level table.
    Table { pa: usize },
    /// Level 3 leaf.
    Page { pa: usize, attrs: PageAttributes },
    /// Levels 1-2 leaf. Not produced by the bring-up path, but decoded so
    /// diagnostics can name what they find.
    Block { pa: usize, attrs: PageAttributes },
}

/// Precondition violations. These are caller bugs, reported rather than
/// masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodeError {
    /// Physical address not 4 KiB aligned.
    MisalignedAddress(usize),
    /// Physical address has bits above the 48-bit output range.
    AddressTooWide(usize),
    /// Attribute index outside the four-entry palette.
    UnknownAttrIndex(u64),
    /// SH field holds the reserved encoding.
    ReservedShareability(u64),
}

impl core::fmt::Display for EncodeError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            EncodeError::MisalignedAddress(pa) => write!(f, "misaligned address {pa:#x}"),
            EncodeError::AddressTooWide(pa) => write!(f, "address {pa:#x} exceeds 48-bit range"),
            EncodeError::UnknownAttrIndex(idx) => write!(f, "attribute index {idx} not in palette"),
            EncodeError::ReservedShareability(sh) => write!(f, "reserved shareability {sh:#b}"),
        }
    }
}

fn check_pa(pa: usize) -> Result<u64, EncodeError> {
    let pa64 = pa as u64;
    if pa64 & 0xFFF != 0 {
        return Err(EncodeError::MisalignedAddress(pa));
    }
    if pa64 & !PA_MASK != 0 {
        return Err(EncodeError::AddressTooWide(pa));
    }
    Ok(pa64)
}

/// Build a level-3 page descriptor.
pub fn page_descriptor(pa: usize, attrs: PageAttributes) -> Result<u64, EncodeError> {
    let pa64 = check_pa(pa)?;
    let af = if attrs.access_flag { ACCESS_FLAG } else { 0 };
    Ok(pa64
        | DESC_VALID
        | DESC_TYPE_BIT
        | ((attrs.attr_index as u64) << ATTR_INDEX_SHIFT)
        | ((attrs.access as u64) << AP_SHIFT)
        | ((attrs.shareability as u64) << SH_SHIFT)
        | af
        | attrs.execute_never.bits())
}

/// Build an intermediate-level table descriptor: valid + table type + the
/// next-level table's physical address, nothing else.
pub fn table_descriptor(pa: usize) -> Result<u64, EncodeError> {
    Ok(check_pa(pa)? | DESC_VALID | DESC_TYPE_BIT)
}

/// Classify a raw descriptor as seen at `level`.
pub fn decode(raw: u64, level: Level) -> Result<DescriptorKind, EncodeError> {
    if raw & DESC_VALID == 0 {
        return Ok(DescriptorKind::Invalid);
    }
    let pa = (raw & PA_MASK) as usize;
    let is_type_set = raw & DESC_TYPE_BIT != 0;
    match (level, is_type_set) {
        (Level::L3, true) => Ok(DescriptorKind::Page {
            pa,
            attrs: decode_attrs(raw)?,
        }),
        // `0b01` at level 3 is architecturally reserved.
        (Level::L3, false) => Ok(DescriptorKind::Invalid),
        (_, true) => Ok(DescriptorKind::Table { pa }),
        (Level::L0, false) => Ok(DescriptorKind::Invalid),
        (_, false) => Ok(DescriptorKind::Block {
            pa,
            attrs: decode_attrs(raw)?,
        }),
    }
}

fn decode_attrs(raw: u64) -> Result<PageAttributes, EncodeError> {
    Ok(PageAttributes {
        attr_index: AttrIndex::from_bits((raw >> ATTR_INDEX_SHIFT) & 0b111)?,
        access: AccessPermission::from_bits((raw >> AP_SHIFT) & 0b11),
        shareability: Shareability::from_bits((raw >> SH_SHIFT) & 0b11)?,
        access_flag: raw & ACCESS_FLAG != 0,
        execute_never: ExecuteNever::from_raw(raw),
    })
}

// ============================================================================
// MAIR_EL1
// ============================================================================

/// The fixed memory-type palette.
///
/// | index | byte | meaning |
/// |-------|------|---------|
/// | 0 | 0x00 | Device-nGnRnE |
/// | 1 | 0xFF | Normal WB RA/WA, inner+outer |
/// | 2 | 0x44 | Normal non-cacheable |
/// | 3 | 0x04 | Device-nGnRE |
pub const fn mair_value() -> u64 {
    0x00 | (0xFF << 8) | (0x44 << 16) | (0x04 << 24)
}

// ============================================================================
// TCR_EL1
// ============================================================================

use crate::config::VaBits;

/// Named TCR_EL1 configurations.
///
/// `BootstrapDual` keeps both regimes walking so the trampoline can move the
/// PC from the identity alias to the high half; `KernelOnly` sets EPD0 and
/// retires the low regime. The two values differ in exactly that one bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcrProfile {
    BootstrapDual,
    KernelOnly,
}

/// TCR_EL1 field positions used by [`tcr_value`] and its tests.
pub mod tcr {
    pub const T0SZ_SHIFT: u64 = 0;
    pub const EPD0: u64 = 1 << 7;
    pub const IRGN0_SHIFT: u64 = 8;
    pub const ORGN0_SHIFT: u64 = 10;
    pub const SH0_SHIFT: u64 = 12;
    pub const TG0_SHIFT: u64 = 14;
    pub const T1SZ_SHIFT: u64 = 16;
    pub const EPD1: u64 = 1 << 23;
    pub const IRGN1_SHIFT: u64 = 24;
    pub const ORGN1_SHIFT: u64 = 26;
    pub const SH1_SHIFT: u64 = 28;
    pub const TG1_SHIFT: u64 = 30;
    pub const IPS_SHIFT: u64 = 32;
    pub const TBI0: u64 = 1 << 37;
    pub const TBI1: u64 = 1 << 38;
}

/// Build the TCR_EL1 value for a profile and VA width.
///
/// Common geometry for both profiles: 4 KiB granules on both halves
/// (TG0=0b00, TG1=0b10), inner-shareable write-back/write-allocate table
/// walks, 48-bit IPS, top-byte-ignore off on both halves.
pub fn tcr_value(profile: TcrProfile, va_bits: VaBits) -> u64 {
    let t_sz = va_bits.t_sz();
    let mut value = (t_sz << tcr::T0SZ_SHIFT)
        | (0b01 << tcr::IRGN0_SHIFT)
        | (0b01 << tcr::ORGN0_SHIFT)
        | (0b11 << tcr::SH0_SHIFT)
        | (0b00 << tcr::TG0_SHIFT)
        | (t_sz << tcr::T1SZ_SHIFT)
        | (0b01 << tcr::IRGN1_SHIFT)
        | (0b01 << tcr::ORGN1_SHIFT)
        | (0b11 << tcr::SH1_SHIFT)
        | (0b10 << tcr::TG1_SHIFT)
        | (0b101 << tcr::IPS_SHIFT);

    if let TcrProfile::KernelOnly = profile {
        value |= tcr::EPD0;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn page_descriptor_round_trips() {
        let cases = [
            (0x4000_0000, PageAttributes::KERNEL_TEXT),
            (0x4200_3000, PageAttributes::KERNEL_DATA),
            (0x0900_0000, PageAttributes::DEVICE),
            (
                0x7FFF_F000,
                PageAttributes {
                    attr_index: AttrIndex::NormalNc,
                    access: AccessPermission::UserRo,
                    shareability: Shareability::Outer,
                    access_flag: true,
                    execute_never: ExecuteNever::PrivilegedOnly,
                },
            ),
        ];
        for (pa, attrs) in cases {
            let raw = page_descriptor(pa, attrs).unwrap();
            match decode(raw, Level::L3).unwrap() {
                DescriptorKind::Page { pa: got_pa, attrs: got } => {
                    assert_eq!(got_pa, pa);
                    assert_eq!(got, attrs);
                }
                other => panic!("expected page descriptor, decoded {:?}", other),
            }
        }
    }

    #[test_case]
    fn page_descriptor_bit_positions() {
        // Known-answer check against the architectural layout.
        let attrs = PageAttributes {
            attr_index: AttrIndex::NormalWb,
            access: AccessPermission::KernelRo,
            shareability: Shareability::Inner,
            access_flag: true,
            execute_never: ExecuteNever::UnprivilegedOnly,
        };
        let raw = page_descriptor(0x4008_1000, attrs).unwrap();
        assert_eq!(raw & 0b11, 0b11, "valid + page type");
        assert_eq!((raw >> 2) & 0b111, 1, "AttrIndx = 1 (normal WB)");
        assert_eq!((raw >> 6) & 0b11, 0b10, "AP = kernel read-only");
        assert_eq!((raw >> 8) & 0b11, 0b11, "SH = inner");
        assert_ne!(raw & (1 << 10), 0, "access flag set");
        assert_eq!(raw & 0x0000_FFFF_FFFF_F000, 0x4008_1000);
        assert_eq!(raw & (1 << 53), 0, "PXN clear");
        assert_ne!(raw & (1 << 54), 0, "UXN set");
    }

    #[test_case]
    fn page_descriptor_rejects_misaligned_pa() {
        assert_eq!(
            page_descriptor(0x4000_0800, PageAttributes::KERNEL_DATA),
            Err(EncodeError::MisalignedAddress(0x4000_0800))
        );
    }

    #[test_case]
    fn page_descriptor_rejects_wide_pa() {
        assert_eq!(
            page_descriptor(0x1_0000_0000_0000, PageAttributes::KERNEL_DATA),
            Err(EncodeError::AddressTooWide(0x1_0000_0000_0000))
        );
    }

    #[test_case]
    fn table_descriptor_carries_only_type_bits_and_pa() {
        let raw = table_descriptor(0x4040_2000).unwrap();
        assert_eq!(raw, 0x4040_2000 | 0b11);
        assert_eq!(
            decode(raw, Level::L1).unwrap(),
            DescriptorKind::Table { pa: 0x4040_2000 }
        );
    }

    #[test_case]
    fn type_bits_depend_on_level() {
        let raw = table_descriptor(0x4040_2000).unwrap();
        // The same bit pattern is a page at level 3.
        assert!(matches!(
            decode(raw, Level::L3).unwrap(),
            DescriptorKind::Page { pa: 0x4040_2000, .. }
        ));
        // A cleared type bit is a block below the root, invalid at L0/L3.
        let block = (raw & !(1 << 1)) | (1 << 10) | (0b11 << 8);
        assert!(matches!(
            decode(block, Level::L2).unwrap(),
            DescriptorKind::Block { pa: 0x4040_2000, .. }
        ));
        assert_eq!(decode(block, Level::L0).unwrap(), DescriptorKind::Invalid);
        assert_eq!(decode(block, Level::L3).unwrap(), DescriptorKind::Invalid);
    }

    #[test_case]
    fn zero_is_invalid_everywhere() {
        for level in [Level::L0, Level::L1, Level::L2, Level::L3] {
            assert_eq!(decode(0, level).unwrap(), DescriptorKind::Invalid);
        }
    }

    #[test_case]
    fn mair_palette_layout() {
        let mair = mair_value();
        assert_eq!(mair & 0xFF, 0x00, "Attr0: Device-nGnRnE");
        assert_eq!((mair >> 8) & 0xFF, 0xFF, "Attr1: normal WB RA/WA");
        assert_eq!((mair >> 16) & 0xFF, 0x44, "Attr2: normal non-cacheable");
        assert_eq!((mair >> 24) & 0xFF, 0x04, "Attr3: Device-nGnRE");
        assert_eq!(mair >> 32, 0, "Attr4-7 unused");
    }

    #[test_case]
    fn tcr_profiles_differ_only_in_epd0() {
        for width in [VaBits::Va39, VaBits::Va48] {
            let dual = tcr_value(TcrProfile::BootstrapDual, width);
            let kernel_only = tcr_value(TcrProfile::KernelOnly, width);
            assert_eq!(dual & tcr::EPD0, 0);
            assert_ne!(kernel_only & tcr::EPD0, 0);
            assert_eq!(dual ^ kernel_only, tcr::EPD0, "exactly bit 7 differs");
            assert_eq!(dual & tcr::EPD1, 0, "high regime always walks");
        }
    }

    #[test_case]
    fn tcr_geometry_tracks_va_width() {
        let tcr39 = tcr_value(TcrProfile::BootstrapDual, VaBits::Va39);
        let tcr48 = tcr_value(TcrProfile::BootstrapDual, VaBits::Va48);
        assert_eq!(tcr39 & 0x3F, 25);
        assert_eq!((tcr39 >> 16) & 0x3F, 25);
        assert_eq!(tcr48 & 0x3F, 16);
        assert_eq!((tcr48 >> 16) & 0x3F, 16);
        // 4 KiB granules on both halves, both widths.
        for tcr in [tcr39, tcr48] {
            assert_eq!((tcr >> 14) & 0b11, 0b00, "TG0 = 4 KiB");
            assert_eq!((tcr >> 30) & 0b11, 0b10, "TG1 = 4 KiB");
            assert_eq!(tcr & tcr::TBI0, 0);
            assert_eq!(tcr & tcr::TBI1, 0);
        }
    }

    #[test_case]
    fn level_indices_slice_the_va() {
        let va = 0x0000_7FAB_CDE1_2000_usize;
        assert_eq!(Level::L0.index_of(va), (va >> 39) & 0x1FF);
        assert_eq!(Level::L1.index_of(va), (va >> 30) & 0x1FF);
        assert_eq!(Level::L2.index_of(va), (va >> 21) & 0x1FF);
        assert_eq!(Level::L3.index_of(va), (va >> 12) & 0x1FF);
    }
}
