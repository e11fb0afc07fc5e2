//! Buffer submission.
//!
//! A submission names up to [`PIGPU_MAX_EXEC_BUFFERS`] buffer objects. Each one is resolved, pinned
//! and validated in list order, then its address and length are published in the descriptor
//! region for the device to pick up. Every pin taken by a request is released before the request
//! returns, in list order, whether it succeeded or not.

use std::collections::HashSet;

use pigpu_protocol::pigpu_exec::{
    PigpuExecBuffer, PigpuExecBufferObj, PigpuExecObjKind, PIGPU_MAX_EXEC_BUFFERS,
};
use pigpu_protocol::pigpu_vram::{
    hi32, lo32, FRM_BUFFER_LEN_OFFSET, FRM_BUFFER_OFFSET, INS_BUFFER_LEN_OFFSET,
    INS_BUFFER_OFFSET, INS_BUFFER_START_OFFSET,
};
use tracing::{debug, error, warn};

use crate::device::PiGpuDevice;
use crate::error::ExecError;
use crate::gem::{BufferObjectTable, PinnedBo};
use crate::uaccess::UserMemory;
use crate::vram::Vram;

impl PiGpuDevice {
    /// Executes one buffer submission.
    pub fn exec_buffer(
        &mut self,
        args: &PigpuExecBuffer,
        objects: &dyn BufferObjectTable,
        user: &dyn UserMemory,
    ) -> Result<(), ExecError> {
        let result = self.exec_buffer_inner(args, objects, user);
        if let Err(err) = &result {
            warn!(device = self.id.0, %err, errno = err.errno(), "exec buffer rejected");
        }
        result
    }

    fn exec_buffer_inner(
        &mut self,
        args: &PigpuExecBuffer,
        objects: &dyn BufferObjectTable,
        user: &dyn UserMemory,
    ) -> Result<(), ExecError> {
        if !self.liveness.is_alive() {
            return Err(ExecError::NoDevice);
        }
        let count = args.num_buffers as usize;
        if count > PIGPU_MAX_EXEC_BUFFERS {
            return Err(ExecError::TooManyBuffers {
                count: args.num_buffers,
                max: PIGPU_MAX_EXEC_BUFFERS,
            });
        }

        if count == 0 {
            return Ok(());
        }

        let mut raw = vec![0u8; count * PigpuExecBufferObj::SIZE_BYTES];
        user.copy_from_user(args.buffers, &mut raw)?;
        let descs: Vec<PigpuExecBufferObj> = raw
            .chunks_exact(PigpuExecBufferObj::SIZE_BYTES)
            .filter_map(PigpuExecBufferObj::decode_from_le_bytes)
            .collect();

        // Dropped at the end of this function, which releases the pins in list order.
        let mut pins: Vec<PinnedBo> = Vec::with_capacity(count);
        let mut seen = HashSet::new();

        for desc in &descs {
            let bo = objects
                .lookup(desc.handle)
                .ok_or(ExecError::InvalidHandle(desc.handle))?;
            let pin = PinnedBo::acquire(desc.handle, bo).map_err(|errno| ExecError::PinFailed {
                handle: desc.handle,
                errno,
            })?;
            pins.push(pin);
            let pin = &pins[pins.len() - 1];

            if pin.is_iomem() {
                error!(handle = desc.handle, "exec buffer object is mapped as I/O memory");
                return Err(ExecError::IoMemMapping(desc.handle));
            }
            let owner = pin.bo().owner();
            if owner != self.id {
                return Err(ExecError::ForeignDevice {
                    handle: desc.handle,
                    owner,
                });
            }
            let kind = PigpuExecObjKind::from_flag(desc.flag).ok_or(ExecError::InvalidKind {
                handle: desc.handle,
                flag: desc.flag,
            })?;
            if !seen.insert(kind) && self.config.strict_exec_kinds {
                return Err(ExecError::DuplicateKind(kind));
            }

            publish_descriptor(&mut self.hw.vram, kind, pin, args);
        }
        Ok(())
    }
}

fn publish_descriptor(
    vram: &mut Vram,
    kind: PigpuExecObjKind,
    pin: &PinnedBo,
    args: &PigpuExecBuffer,
) {
    let addr = pin.vaddr();
    let size = pin.bo().size() as u64;
    let words = match kind {
        PigpuExecObjKind::Instruction => {
            let len = if args.instr_len != 0 {
                args.instr_len
            } else {
                lo32(size)
            };
            debug!(
                handle = pin.handle(),
                addr = format_args!("0x{addr:x}"),
                start = args.instr_start_offset,
                len,
                "published instruction buffer"
            );
            [
                (INS_BUFFER_OFFSET, lo32(addr)),
                (INS_BUFFER_OFFSET + 1, hi32(addr)),
                (INS_BUFFER_START_OFFSET, args.instr_start_offset),
                (INS_BUFFER_LEN_OFFSET, len),
            ]
        }
        PigpuExecObjKind::Frame => {
            debug!(
                handle = pin.handle(),
                addr = format_args!("0x{addr:x}"),
                len = size,
                "published frame buffer"
            );
            [
                (FRM_BUFFER_OFFSET, lo32(addr)),
                (FRM_BUFFER_OFFSET + 1, hi32(addr)),
                (FRM_BUFFER_LEN_OFFSET, lo32(size)),
                (FRM_BUFFER_LEN_OFFSET + 1, hi32(size)),
            ]
        }
    };
    for (index, value) in words {
        let written = vram.write_word(index, value);
        debug_assert!(written, "descriptor word 0x{index:04x} outside the descriptor region");
    }
}
