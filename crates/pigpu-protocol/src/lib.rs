//! Client-visible ABI for the pi-gpu virtual display/compute device.
//!
//! Everything in this crate is plain data: command codes, argument structs with their
//! little-endian wire encoding, register offsets, pixel format codes and the fixed layout of the
//! descriptor region in device memory. The device model (`pigpu-devices`) and any client build
//! against the same definitions.

pub mod pigpu_exec;
pub mod pigpu_format;
pub mod pigpu_regs;
pub mod pigpu_vram;
