//! WinMM joystick query replacements.
//!
//! A real device, when present, is read through and offset by the virtual
//! joystick; otherwise a response is fabricated from the virtual state
//! alone. Every query returns what the real API would for bad arguments.

use std::mem::size_of;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::backoff::ProbeCache;
use crate::capability::CapabilityTable;
use crate::clock::SharedClock;
use crate::vjoy::{AXIS_CENTER, AXIS_MAX, Axis, POV_CENTERED, VirtualJoystick};

pub const MMSYSERR_NOERROR: u32 = 0;
pub const MMSYSERR_INVALPARAM: u32 = 11;
pub const JOYERR_UNPLUGGED: u32 = 167;

pub const JOY_RETURNALL: u32 = 0xFF;

/// Device indices the probe cache tracks. Higher ids are treated as absent.
pub const PROBED_DEVICES: usize = 4;

const FABRICATED_AXES: u32 = 3;
const FABRICATED_MAX_AXES: u32 = 6;
const FABRICATED_BUTTONS: u32 = 32;

/// `JOYINFO`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoyInfo {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub buttons: u32,
}

/// `JOYINFOEX`. Callers must set `size` before querying.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JoyInfoEx {
    pub size: u32,
    pub flags: u32,
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub r: u32,
    pub u: u32,
    pub v: u32,
    pub buttons: u32,
    pub button_number: u32,
    pub pov: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

impl JoyInfoEx {
    pub fn new(flags: u32) -> Self {
        Self {
            size: size_of::<Self>() as u32,
            flags,
            ..Default::default()
        }
    }
}

/// `JOYCAPSA` / `JOYCAPSW`, generic over the character type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoyCaps<C: Copy> {
    pub mid: u16,
    pub pid: u16,
    pub pname: [C; 32],
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
    pub z_min: u32,
    pub z_max: u32,
    pub num_buttons: u32,
    pub period_min: u32,
    pub period_max: u32,
    pub r_min: u32,
    pub r_max: u32,
    pub u_min: u32,
    pub u_max: u32,
    pub v_min: u32,
    pub v_max: u32,
    pub caps: u32,
    pub max_axes: u32,
    pub num_axes: u32,
    pub max_buttons: u32,
    pub reg_key: [C; 32],
    pub oem_vxd: [C; 260],
}

pub type JoyCapsA = JoyCaps<u8>;
pub type JoyCapsW = JoyCaps<u16>;

impl<C: Copy + Default> JoyCaps<C> {
    pub fn zeroed() -> Self {
        let z = C::default();
        Self {
            mid: 0,
            pid: 0,
            pname: [z; 32],
            x_min: 0,
            x_max: 0,
            y_min: 0,
            y_max: 0,
            z_min: 0,
            z_max: 0,
            num_buttons: 0,
            period_min: 0,
            period_max: 0,
            r_min: 0,
            r_max: 0,
            u_min: 0,
            u_max: 0,
            v_min: 0,
            v_max: 0,
            caps: 0,
            max_axes: 0,
            num_axes: 0,
            max_buttons: 0,
            reg_key: [z; 32],
            oem_vxd: [z; 260],
        }
    }

    /// Generic 3-axis, 32-button device spanning the full 16-bit range.
    pub fn fabricated() -> Self {
        let full = AXIS_MAX as u32;
        Self {
            x_max: full,
            y_max: full,
            z_max: full,
            num_buttons: FABRICATED_BUTTONS,
            max_buttons: FABRICATED_BUTTONS,
            num_axes: FABRICATED_AXES,
            max_axes: FABRICATED_MAX_AXES,
            ..Self::zeroed()
        }
    }
}

/// Real (or fake) WinMM joystick entry points.
pub trait JoystickApi: Send + Sync {
    fn num_devs(&self) -> u32;
    fn get_pos(&self, id: u32, info: &mut JoyInfo) -> u32;
    fn get_pos_ex(&self, id: u32, info: &mut JoyInfoEx) -> u32;
    fn get_dev_caps_a(&self, id: usize, caps: &mut JoyCapsA) -> u32;
    fn get_dev_caps_w(&self, id: usize, caps: &mut JoyCapsW) -> u32;

    /// Drops loaded libraries and cached entry points. The next call
    /// reloads them.
    fn release(&self) {}
}

/// Applies the virtual axis' offset from center to a real reading.
/// Clamps to the axis range; drift is never re-centered.
#[inline]
pub fn blend_axis(real: u32, virtual_value: u16) -> u32 {
    let offset = virtual_value as i64 - AXIS_CENTER as i64;
    (real as i64 + offset).clamp(0, AXIS_MAX as i64) as u32
}

pub struct JoystickEmulator {
    api: Arc<dyn JoystickApi>,
    vjoy: Arc<VirtualJoystick>,
    capabilities: Arc<CapabilityTable>,
    clock: SharedClock,
    probes: [Mutex<ProbeCache>; PROBED_DEVICES],
}

impl JoystickEmulator {
    pub fn new(
        api: Arc<dyn JoystickApi>,
        vjoy: Arc<VirtualJoystick>,
        capabilities: Arc<CapabilityTable>,
        clock: SharedClock,
    ) -> Self {
        Self {
            api,
            vjoy,
            capabilities,
            clock,
            probes: std::array::from_fn(|_| Mutex::new(ProbeCache::new())),
        }
    }

    /// Backoff-limited presence check for a real device at `id`.
    pub fn real_device_present(&self, id: u32) -> bool {
        let Some(cache) = self.probes.get(id as usize) else {
            return false;
        };
        let now = self.clock.now_ms();
        cache.lock().probe_with(now, || self.probe_device(id))
    }

    /// Forgets cached presence so the next query probes again.
    pub fn invalidate_probes(&self) {
        for cache in &self.probes {
            cache.lock().invalidate();
        }
    }

    fn probe_device(&self, id: u32) -> bool {
        let mut caps_a = JoyCapsA::zeroed();
        if self.api.get_dev_caps_a(id as usize, &mut caps_a) != MMSYSERR_NOERROR {
            let mut caps_w = JoyCapsW::zeroed();
            if self.api.get_dev_caps_w(id as usize, &mut caps_w) != MMSYSERR_NOERROR {
                trace!("joystick {} has no caps", id);
                return false;
            }
        }
        let mut info = JoyInfoEx::new(JOY_RETURNALL);
        self.api.get_pos_ex(id, &mut info) == MMSYSERR_NOERROR
    }

    /// Always at least one device, so games enable joystick input.
    pub fn num_devs(&self) -> u32 {
        self.api.num_devs().max(1)
    }

    pub fn get_pos(&self, id: u32, info: Option<&mut JoyInfo>) -> u32 {
        let Some(info) = info else {
            return MMSYSERR_INVALPARAM;
        };

        if self.real_device_present(id) {
            let result = self.api.get_pos(id, info);
            if result == MMSYSERR_NOERROR {
                let virt = self.vjoy.snapshot();
                info.x = blend_axis(info.x, virt.axis(Axis::X));
                info.y = blend_axis(info.y, virt.axis(Axis::Y));
                info.z = blend_axis(info.z, virt.axis(Axis::Z));
                if self.capabilities.any_gamepad_mapped() {
                    info.buttons = 0;
                }
                info.buttons |= virt.buttons & 0xFFFF;
            }
            return result;
        }

        let virt = self.vjoy.snapshot();
        *info = JoyInfo {
            x: virt.axis(Axis::X) as u32,
            y: virt.axis(Axis::Y) as u32,
            z: virt.axis(Axis::Z) as u32,
            buttons: virt.buttons & 0xFFFF,
        };
        MMSYSERR_NOERROR
    }

    pub fn get_pos_ex(&self, id: u32, info: Option<&mut JoyInfoEx>) -> u32 {
        let info = match info {
            Some(info) if info.size as usize >= size_of::<JoyInfoEx>() => info,
            _ => return MMSYSERR_INVALPARAM,
        };

        if self.real_device_present(id) {
            let result = self.api.get_pos_ex(id, info);
            if result == MMSYSERR_NOERROR {
                let virt = self.vjoy.snapshot();
                info.x = blend_axis(info.x, virt.axis(Axis::X));
                info.y = blend_axis(info.y, virt.axis(Axis::Y));
                info.z = blend_axis(info.z, virt.axis(Axis::Z));
                info.r = blend_axis(info.r, virt.axis(Axis::R));
                info.u = blend_axis(info.u, virt.axis(Axis::U));
                info.v = blend_axis(info.v, virt.axis(Axis::V));
                if self.capabilities.any_gamepad_mapped() {
                    info.buttons = 0;
                    info.pov = POV_CENTERED;
                }
                info.buttons |= virt.buttons;
                if virt.pov != POV_CENTERED {
                    info.pov = virt.pov;
                }
            }
            return result;
        }

        let virt = self.vjoy.snapshot();
        info.x = virt.axis(Axis::X) as u32;
        info.y = virt.axis(Axis::Y) as u32;
        info.z = virt.axis(Axis::Z) as u32;
        info.r = virt.axis(Axis::R) as u32;
        info.u = virt.axis(Axis::U) as u32;
        info.v = virt.axis(Axis::V) as u32;
        info.buttons = virt.buttons;
        info.button_number = virt.buttons.count_ones();
        info.pov = virt.pov;
        MMSYSERR_NOERROR
    }

    pub fn get_dev_caps_a(&self, id: usize, caps: Option<&mut JoyCapsA>, size: u32) -> u32 {
        let caps = match caps {
            Some(caps) if size as usize >= size_of::<JoyCapsA>() => caps,
            _ => return MMSYSERR_INVALPARAM,
        };
        if self.api.get_dev_caps_a(id, caps) == MMSYSERR_NOERROR {
            return MMSYSERR_NOERROR;
        }
        *caps = JoyCapsA::fabricated();
        MMSYSERR_NOERROR
    }

    pub fn get_dev_caps_w(&self, id: usize, caps: Option<&mut JoyCapsW>, size: u32) -> u32 {
        let caps = match caps {
            Some(caps) if size as usize >= size_of::<JoyCapsW>() => caps,
            _ => return MMSYSERR_INVALPARAM,
        };
        if self.api.get_dev_caps_w(id, caps) == MMSYSERR_NOERROR {
            return MMSYSERR_NOERROR;
        }
        *caps = JoyCapsW::fabricated();
        MMSYSERR_NOERROR
    }
}
