//! Import-table walking for PE images.
//!
//! Reads go through [`ImageView`] so the walker works on a loaded module
//! (raw pointer reads) or on an in-memory buffer. Nothing here writes.

use thiserror::Error;

const DOS_MAGIC: u16 = 0x5A4D;
const NT_SIGNATURE: u32 = 0x0000_4550;
const PE32_MAGIC: u16 = 0x010B;
const PE32_PLUS_MAGIC: u16 = 0x020B;

const IMPORT_DIRECTORY: u32 = 1;
const DESCRIPTOR_SIZE: u32 = 20;
const MAX_DESCRIPTORS: u32 = 4096;
const MAX_THUNKS: u32 = 65536;
const MAX_NAME: usize = 512;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PeError {
    #[error("missing DOS or NT signature")]
    NotPe,
    #[error("unsupported optional header magic {0:#06x}")]
    UnknownMagic(u16),
    #[error("image has no import directory")]
    NoImports,
    #[error("read past the end of the image at rva {0:#x}")]
    Truncated(u32),
}

/// Little-endian reads at relative virtual addresses.
pub trait ImageView {
    fn read_u8(&self, rva: u32) -> Option<u8>;

    fn read_u16(&self, rva: u32) -> Option<u16> {
        Some(u16::from_le_bytes([
            self.read_u8(rva)?,
            self.read_u8(rva.checked_add(1)?)?,
        ]))
    }

    fn read_u32(&self, rva: u32) -> Option<u32> {
        let lo = self.read_u16(rva)? as u32;
        let hi = self.read_u16(rva.checked_add(2)?)? as u32;
        Some(lo | hi << 16)
    }

    fn read_u64(&self, rva: u32) -> Option<u64> {
        let lo = self.read_u32(rva)? as u64;
        let hi = self.read_u32(rva.checked_add(4)?)? as u64;
        Some(lo | hi << 32)
    }

    fn read_c_str(&self, rva: u32) -> Option<String> {
        let mut bytes = Vec::new();
        for offset in 0..MAX_NAME as u32 {
            match self.read_u8(rva.checked_add(offset)?)? {
                0 => return Some(String::from_utf8_lossy(&bytes).into_owned()),
                b => bytes.push(b),
            }
        }
        None
    }
}

/// Image held in a byte buffer, laid out as it would be once mapped.
pub struct BufferImage<'a>(pub &'a [u8]);

impl ImageView for BufferImage<'_> {
    #[inline]
    fn read_u8(&self, rva: u32) -> Option<u8> {
        self.0.get(rva as usize).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportEntry {
    /// Name of the imported DLL as written in the descriptor.
    pub dll: String,
    /// `None` for ordinal imports and for images without a name table.
    pub function: Option<String>,
    /// RVA of the import-address-table slot.
    pub slot_rva: u32,
    /// Current slot contents (the bound address once loaded).
    pub value: u64,
}

/// One function to redirect.
#[derive(Debug, Clone, Copy)]
pub struct ImportTarget<'a> {
    pub dlls: &'a [&'a str],
    pub function: &'a str,
    /// Bound address of the real function, used for images whose name
    /// table was stripped.
    pub real_address: Option<u64>,
}

impl ImportTarget<'_> {
    pub fn matches(&self, entry: &ImportEntry) -> bool {
        if !self
            .dlls
            .iter()
            .any(|dll| dll.eq_ignore_ascii_case(&entry.dll))
        {
            return false;
        }
        match &entry.function {
            Some(name) => name.eq_ignore_ascii_case(self.function),
            None => self.real_address.is_some_and(|real| real == entry.value),
        }
    }
}

/// `base + by`, or a truncation error at `base` when it wraps.
fn offset(base: u32, by: u32) -> Result<u32, PeError> {
    base.checked_add(by).ok_or(PeError::Truncated(base))
}

struct Layout {
    wide: bool,
    import_rva: u32,
}

fn layout(view: &impl ImageView) -> Result<Layout, PeError> {
    if view.read_u16(0) != Some(DOS_MAGIC) {
        return Err(PeError::NotPe);
    }
    let nt = view.read_u32(0x3C).ok_or(PeError::Truncated(0x3C))?;
    if view.read_u32(nt) != Some(NT_SIGNATURE) {
        return Err(PeError::NotPe);
    }

    let optional = offset(nt, 24)?;
    let magic = view.read_u16(optional).ok_or(PeError::Truncated(optional))?;
    let (wide, count_offset, dirs_offset) = match magic {
        PE32_PLUS_MAGIC => (true, 108, 112),
        PE32_MAGIC => (false, 92, 96),
        other => return Err(PeError::UnknownMagic(other)),
    };

    let count_at = offset(optional, count_offset)?;
    let dir_count = view.read_u32(count_at).ok_or(PeError::Truncated(count_at))?;
    if dir_count <= IMPORT_DIRECTORY {
        return Err(PeError::NoImports);
    }
    let entry = offset(optional, dirs_offset + IMPORT_DIRECTORY * 8)?;
    let import_rva = view.read_u32(entry).ok_or(PeError::Truncated(entry))?;
    if import_rva == 0 {
        return Err(PeError::NoImports);
    }
    Ok(Layout { wide, import_rva })
}

/// Every import-address-table slot of the image.
pub fn imports(view: &impl ImageView) -> Result<Vec<ImportEntry>, PeError> {
    let Layout { wide, import_rva } = layout(view)?;
    let thunk_size = if wide { 8 } else { 4 };
    let ordinal_flag = if wide { 1u64 << 63 } else { 1u64 << 31 };
    let read_thunk = |rva: u32| -> Option<u64> {
        if wide {
            view.read_u64(rva)
        } else {
            view.read_u32(rva).map(u64::from)
        }
    };

    let mut out = Vec::new();
    for index in 0..MAX_DESCRIPTORS {
        let desc = offset(import_rva, index * DESCRIPTOR_SIZE)?;
        let name_table = view.read_u32(desc).ok_or(PeError::Truncated(desc))?;
        let name_at = offset(desc, 12)?;
        let name_rva = view.read_u32(name_at).ok_or(PeError::Truncated(name_at))?;
        let table_at = offset(desc, 16)?;
        let address_table = view.read_u32(table_at).ok_or(PeError::Truncated(table_at))?;
        if name_rva == 0 && address_table == 0 {
            break;
        }
        let Some(dll) = view.read_c_str(name_rva) else {
            continue;
        };

        for n in 0..MAX_THUNKS {
            let slot_rva = offset(address_table, n * thunk_size)?;
            let value = read_thunk(slot_rva).ok_or(PeError::Truncated(slot_rva))?;
            if value == 0 {
                break;
            }
            let function = if name_table != 0 {
                name_table
                    .checked_add(n * thunk_size)
                    .and_then(read_thunk)
                    .filter(|hint| hint & ordinal_flag == 0 && *hint != 0)
                    .and_then(|hint| u32::try_from(hint).ok()?.checked_add(2))
                    .and_then(|name| view.read_c_str(name))
            } else {
                None
            };
            out.push(ImportEntry {
                dll: dll.clone(),
                function,
                slot_rva,
                value,
            });
        }
    }
    Ok(out)
}

/// Pairs each matching slot with the index of the target it matched.
pub fn matching_slots(entries: &[ImportEntry], targets: &[ImportTarget<'_>]) -> Vec<(usize, u32)> {
    entries
        .iter()
        .filter_map(|entry| {
            targets
                .iter()
                .position(|target| target.matches(entry))
                .map(|index| (index, entry.slot_rva))
        })
        .collect()
}
