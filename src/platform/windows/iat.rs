//! Import address table patching across every module loaded in the process.

use std::ffi::c_void;
use std::mem::size_of;

use log::{debug, trace, warn};
use windows::Win32::Foundation::{CloseHandle, HMODULE};
use windows::Win32::System::Diagnostics::ToolHelp::{
    CreateToolhelp32Snapshot, MODULEENTRY32W, Module32FirstW, Module32NextW, TH32CS_SNAPMODULE,
    TH32CS_SNAPMODULE32,
};
use windows::Win32::System::LibraryLoader::{
    GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS, GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
    GetModuleHandleExW, GetModuleHandleW,
};
use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, PAGE_READWRITE, VirtualProtect};
use windows::core::PCWSTR;

use crate::platform::pe::{self, ImageView, ImportTarget};

/// A mapped image, read in place.
struct LoadedImage {
    base: *const u8,
    size: u32,
}

impl ImageView for LoadedImage {
    fn read_u8(&self, rva: u32) -> Option<u8> {
        if rva >= self.size {
            return None;
        }
        Some(unsafe { *self.base.add(rva as usize) })
    }
}

struct Module {
    name: String,
    base: usize,
    size: u32,
}

/// A patched slot and the value it held before.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchedSlot {
    pub address: usize,
    pub original: usize,
    pub replacement: usize,
}

fn module_containing(address: *const c_void) -> Option<usize> {
    let mut module = HMODULE::default();
    unsafe {
        GetModuleHandleExW(
            GET_MODULE_HANDLE_EX_FLAG_FROM_ADDRESS | GET_MODULE_HANDLE_EX_FLAG_UNCHANGED_REFCOUNT,
            PCWSTR(address.cast()),
            &mut module,
        )
    }
    .ok()?;
    Some(module.0 as usize)
}

fn loaded_modules() -> Vec<Module> {
    let mut modules = Vec::new();
    let snapshot =
        match unsafe { CreateToolhelp32Snapshot(TH32CS_SNAPMODULE | TH32CS_SNAPMODULE32, 0) } {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("module snapshot failed: {}", e);
                return modules;
            }
        };

    let mut entry = MODULEENTRY32W {
        dwSize: size_of::<MODULEENTRY32W>() as u32,
        ..Default::default()
    };
    let mut more = unsafe { Module32FirstW(snapshot, &mut entry) }.is_ok();
    while more {
        let len = entry
            .szModule
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(entry.szModule.len());
        modules.push(Module {
            name: String::from_utf16_lossy(&entry.szModule[..len]),
            base: entry.modBaseAddr as usize,
            size: entry.modBaseSize,
        });
        more = unsafe { Module32NextW(snapshot, &mut entry) }.is_ok();
    }
    let _ = unsafe { CloseHandle(snapshot) };
    modules
}

fn main_module() -> Option<Module> {
    let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.ok()?;
    let base = module.0 as usize;
    // SizeOfImage sits at a fixed offset in the optional header.
    let probe = LoadedImage {
        base: base as *const u8,
        size: 0x1000,
    };
    let nt = probe.read_u32(0x3C)?;
    let size = probe.read_u32(nt.checked_add(24 + 56)?)?;
    Some(Module {
        name: "<main>".into(),
        base,
        size,
    })
}

unsafe fn write_slot(address: usize, value: usize) -> bool {
    let mut old = PAGE_PROTECTION_FLAGS(0);
    let target = address as *const c_void;
    if unsafe { VirtualProtect(target, size_of::<usize>(), PAGE_READWRITE, &mut old) }.is_err() {
        return false;
    }
    unsafe { (address as *mut usize).write_volatile(value) };
    let mut restored = PAGE_PROTECTION_FLAGS(0);
    let _ = unsafe { VirtualProtect(target, size_of::<usize>(), old, &mut restored) };
    true
}

/// Points every import slot matching `targets[i]` at `replacements[i]`
/// in all loaded modules except this one.
pub fn patch_loaded_modules(targets: &[ImportTarget<'_>], replacements: &[usize]) -> Vec<PatchedSlot> {
    let own = module_containing(patch_loaded_modules as *const c_void);
    let mut modules = loaded_modules();
    if modules.is_empty() {
        modules.extend(main_module());
    }

    let mut patched = Vec::new();
    for module in modules.iter().filter(|m| Some(m.base) != own) {
        let image = LoadedImage {
            base: module.base as *const u8,
            size: module.size,
        };
        let entries = match pe::imports(&image) {
            Ok(entries) => entries,
            Err(e) => {
                trace!("skipping {}: {}", module.name, e);
                continue;
            }
        };

        for (index, slot_rva) in pe::matching_slots(&entries, targets) {
            let address = module.base + slot_rva as usize;
            let Some(&replacement) = replacements.get(index) else {
                continue;
            };
            let original = unsafe { (address as *const usize).read_volatile() };
            if original == replacement {
                continue;
            }
            if unsafe { write_slot(address, replacement) } {
                patched.push(PatchedSlot {
                    address,
                    original,
                    replacement,
                });
            } else {
                warn!("could not unprotect {} slot {:#x}", module.name, address);
            }
        }
    }
    debug!("patched {} import slots", patched.len());
    patched
}

/// Puts back the original values. A slot that no longer holds our
/// replacement was re-patched by someone else and is left alone.
pub fn restore(slots: &[PatchedSlot]) {
    for slot in slots.iter().rev() {
        if module_containing(slot.address as *const c_void).is_none() {
            trace!("module for slot {:#x} was unloaded", slot.address);
            continue;
        }
        let current = unsafe { (slot.address as *const usize).read_volatile() };
        if current != slot.replacement {
            trace!("slot {:#x} changed since patching, leaving it", slot.address);
            continue;
        }
        if !unsafe { write_slot(slot.address, slot.original) } {
            warn!("could not restore slot {:#x}", slot.address);
        }
    }
}
