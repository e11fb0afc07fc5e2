mod common;

use std::sync::{Arc, Mutex};

use common::{new_device, new_device_with, DEVICE};
use pigpu_devices::{
    BoMapping, BufferObject, BufferObjectTable, DeviceId, ExecError, PiGpuConfig, PiGpuDevice,
    ShmemObjectTable, UserFault, VecUserMemory,
};
use pigpu_protocol::pigpu_exec::{
    PigpuExecBuffer, PigpuExecBufferObj, PigpuExecObjKind, PIGPU_IOCTL_EXEC_BUFFER,
};
use pigpu_protocol::pigpu_vram::{
    hi32, lo32, FRM_BUFFER_LEN_OFFSET, FRM_BUFFER_OFFSET, INS_BUFFER_LEN_OFFSET,
    INS_BUFFER_OFFSET, INS_BUFFER_START_OFFSET,
};
use pretty_assertions::assert_eq;

const USER_BASE: u64 = 0x7f00_0000_0000;

/// Lays the descriptor array out in client memory and builds the matching argument block.
fn submission(objs: &[PigpuExecBufferObj], instr_len: u32) -> (PigpuExecBuffer, VecUserMemory) {
    let user = VecUserMemory::new(USER_BASE, PigpuExecBufferObj::encode_array(objs));
    let args = PigpuExecBuffer {
        buffers: USER_BASE,
        num_buffers: objs.len() as u32,
        instr_start_offset: 0,
        instr_len,
    };
    (args, user)
}

fn words(dev: &PiGpuDevice, start: usize, n: usize) -> Vec<u32> {
    (start..start + n)
        .map(|i| dev.descriptor_word(i).unwrap())
        .collect()
}

#[test]
fn empty_submission_succeeds() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let user = VecUserMemory::new(USER_BASE, Vec::new());
    let args = PigpuExecBuffer {
        buffers: 0,
        num_buffers: 0,
        instr_start_offset: 0,
        instr_len: 0,
    };

    dev.exec_buffer(&args, &objects, &user).unwrap();
    assert_eq!(
        dev.ioctl(PIGPU_IOCTL_EXEC_BUFFER, &args.encode_to_le_bytes(), &objects, &user),
        0
    );
    assert_eq!(words(&dev, INS_BUFFER_OFFSET, 4), vec![0; 4]);
    assert_eq!(words(&dev, FRM_BUFFER_OFFSET, 4), vec![0; 4]);
}

#[test]
fn instruction_buffer_is_published() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create(0x1000);
    let addr = objects.shmem(handle).unwrap().vaddr();

    let (args, user) = submission(
        &[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Instruction)],
        256,
    );
    dev.exec_buffer(&args, &objects, &user).unwrap();

    assert_eq!(
        words(&dev, INS_BUFFER_OFFSET, 4),
        vec![lo32(addr), hi32(addr), 0, 256]
    );
    assert_ne!(hi32(addr), 0);
    // Nothing was published for a frame buffer.
    assert_eq!(words(&dev, FRM_BUFFER_OFFSET, 4), vec![0; 4]);
    assert_eq!(objects.outstanding_pins(), 0);
}

#[test]
fn zero_instruction_length_means_whole_buffer() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create(0x3000);
    let (mut args, user) = submission(
        &[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Instruction)],
        0,
    );
    args.instr_start_offset = 0x40;
    dev.exec_buffer(&args, &objects, &user).unwrap();
    assert_eq!(dev.descriptor_word(INS_BUFFER_START_OFFSET), Some(0x40));
    assert_eq!(dev.descriptor_word(INS_BUFFER_LEN_OFFSET), Some(0x3000));
}

#[test]
fn frame_and_instruction_buffers_use_their_own_slots() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let ins = objects.create(0x100);
    let frm = objects.create(0x20000);
    let ins_addr = objects.shmem(ins).unwrap().vaddr();
    let frm_addr = objects.shmem(frm).unwrap().vaddr();

    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(frm, PigpuExecObjKind::Frame),
            PigpuExecBufferObj::new(ins, PigpuExecObjKind::Instruction),
        ],
        0,
    );
    dev.exec_buffer(&args, &objects, &user).unwrap();

    assert_eq!(
        words(&dev, FRM_BUFFER_OFFSET, 4),
        vec![lo32(frm_addr), hi32(frm_addr), 0x20000, 0]
    );
    assert_eq!(dev.descriptor_word(FRM_BUFFER_LEN_OFFSET), Some(0x20000));
    assert_eq!(
        words(&dev, INS_BUFFER_OFFSET, 4),
        vec![lo32(ins_addr), hi32(ins_addr), 0, 0x100]
    );
    assert_eq!(objects.outstanding_pins(), 0);
    // The scanout region is never touched by submissions.
    assert!(dev.scanout_bytes().iter().all(|b| *b == 0));
}

#[test]
fn too_many_buffers_is_rejected_before_touching_anything() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handles: Vec<u32> = (0..3).map(|_| objects.create(0x100)).collect();
    let objs: Vec<_> = handles
        .iter()
        .map(|h| PigpuExecBufferObj::new(*h, PigpuExecObjKind::Frame))
        .collect();
    let (args, user) = submission(&objs, 0);

    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(err, ExecError::TooManyBuffers { count: 3, max: 2 });
    assert_eq!(err.errno(), -22);
    assert_eq!(objects.outstanding_pins(), 0);
    assert_eq!(words(&dev, FRM_BUFFER_OFFSET, 4), vec![0; 4]);
}

#[test]
fn unreadable_descriptor_list_faults() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let user = VecUserMemory::new(USER_BASE, vec![0; 4]);
    let args = PigpuExecBuffer {
        buffers: USER_BASE,
        num_buffers: 1,
        instr_start_offset: 0,
        instr_len: 0,
    };
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(
        err,
        ExecError::Fault(UserFault {
            addr: USER_BASE,
            len: 8,
        })
    );
    assert_eq!(err.errno(), -14);
}

#[test]
fn invalid_handle_releases_earlier_pins() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let good = objects.create(0x100);
    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(good, PigpuExecObjKind::Instruction),
            PigpuExecBufferObj::new(0xdead, PigpuExecObjKind::Frame),
        ],
        0,
    );
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(err, ExecError::InvalidHandle(0xdead));
    assert_eq!(err.errno(), -22);
    assert_eq!(objects.outstanding_pins(), 0);
    assert_eq!(objects.shmem(good).unwrap().pin_count(), 0);
}

#[test]
fn iomem_mapping_is_an_integrity_error() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create_iomem(0x100);
    let (args, user) = submission(
        &[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Instruction)],
        0,
    );
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(err, ExecError::IoMemMapping(handle));
    assert_eq!(err.errno(), -5);
    assert_eq!(objects.outstanding_pins(), 0);
    assert_eq!(words(&dev, INS_BUFFER_OFFSET, 4), vec![0; 4]);
}

#[test]
fn foreign_buffer_objects_are_rejected() {
    let mut dev = new_device();
    let other = ShmemObjectTable::new(DeviceId(0xbeef));
    let foreign = other.lookup(other.create(0x100)).unwrap();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.import(foreign);

    let (args, user) = submission(&[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Frame)], 0);
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(
        err,
        ExecError::ForeignDevice {
            handle,
            owner: DeviceId(0xbeef),
        }
    );
    assert_eq!(err.errno(), -19);
    assert_eq!(other.outstanding_pins(), 0);
}

#[test]
fn pin_failure_is_propagated() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let first = objects.create(0x100);
    let second = objects.create(0x100);
    assert!(objects.set_pin_error(second, -12));
    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(first, PigpuExecObjKind::Instruction),
            PigpuExecBufferObj::new(second, PigpuExecObjKind::Frame),
        ],
        0,
    );
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(
        err,
        ExecError::PinFailed {
            handle: second,
            errno: -12,
        }
    );
    assert_eq!(err.errno(), -12);
    assert_eq!(objects.outstanding_pins(), 0);
}

#[test]
fn invalid_kind_flag_is_rejected() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create(0x100);
    let mut obj = PigpuExecBufferObj::new(handle, PigpuExecObjKind::Frame);
    obj.flag = 7;
    let (args, user) = submission(&[obj], 0);
    assert_eq!(
        dev.exec_buffer(&args, &objects, &user).unwrap_err(),
        ExecError::InvalidKind { handle, flag: 7 }
    );
    assert_eq!(objects.outstanding_pins(), 0);
}

#[test]
fn duplicate_kind_overwrites_by_default() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let a = objects.create(0x100);
    let b = objects.create(0x200);
    let b_addr = objects.shmem(b).unwrap().vaddr();
    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(a, PigpuExecObjKind::Frame),
            PigpuExecBufferObj::new(b, PigpuExecObjKind::Frame),
        ],
        0,
    );
    dev.exec_buffer(&args, &objects, &user).unwrap();
    assert_eq!(
        words(&dev, FRM_BUFFER_OFFSET, 4),
        vec![lo32(b_addr), hi32(b_addr), 0x200, 0]
    );
}

#[test]
fn duplicate_kind_is_rejected_in_strict_mode() {
    let mut dev = new_device_with(PiGpuConfig {
        strict_exec_kinds: true,
        ..Default::default()
    });
    let objects = ShmemObjectTable::new(DEVICE);
    let a = objects.create(0x100);
    let b = objects.create(0x200);
    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(a, PigpuExecObjKind::Instruction),
            PigpuExecBufferObj::new(b, PigpuExecObjKind::Instruction),
        ],
        0,
    );
    assert_eq!(
        dev.exec_buffer(&args, &objects, &user).unwrap_err(),
        ExecError::DuplicateKind(PigpuExecObjKind::Instruction)
    );
    assert_eq!(objects.outstanding_pins(), 0);
}

#[test]
fn detached_device_refuses_submissions() {
    let mut dev = new_device();
    dev.detach();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create(0x100);
    let (args, user) = submission(&[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Frame)], 0);
    let err = dev.exec_buffer(&args, &objects, &user).unwrap_err();
    assert_eq!(err, ExecError::NoDevice);
    assert_eq!(err.errno(), -19);
}

#[test]
fn ioctl_entry_point_decodes_arguments() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let handle = objects.create(0x20000);
    let (args, user) = submission(&[PigpuExecBufferObj::new(handle, PigpuExecObjKind::Frame)], 0);

    let ret = dev.ioctl(PIGPU_IOCTL_EXEC_BUFFER, &args.encode_to_le_bytes(), &objects, &user);
    assert_eq!(ret, 0);
    assert_eq!(dev.descriptor_word(FRM_BUFFER_LEN_OFFSET), Some(0x20000));

    let bad = PigpuExecBuffer {
        num_buffers: 5,
        ..args
    };
    assert_eq!(
        dev.ioctl(PIGPU_IOCTL_EXEC_BUFFER, &bad.encode_to_le_bytes(), &objects, &user),
        -22
    );
}

/// Records the order in which pins are released.
#[derive(Debug)]
struct RecordingObject {
    handle: u32,
    inner: Arc<dyn BufferObject>,
    log: Arc<Mutex<Vec<u32>>>,
}

impl BufferObject for RecordingObject {
    fn owner(&self) -> DeviceId {
        self.inner.owner()
    }
    fn size(&self) -> usize {
        self.inner.size()
    }
    fn vmap(&self) -> Result<BoMapping, i32> {
        self.inner.vmap()
    }
    fn vunmap(&self, map: &BoMapping) {
        self.log.lock().unwrap().push(self.handle);
        self.inner.vunmap(map)
    }
    fn read(&self, offset: usize, out: &mut [u8]) -> bool {
        self.inner.read(offset, out)
    }
}

#[test]
fn pins_are_released_in_list_order() {
    let mut dev = new_device();
    let objects = ShmemObjectTable::new(DEVICE);
    let log = Arc::new(Mutex::new(Vec::new()));
    let backing: Vec<u32> = (0..2).map(|_| objects.create(0x100)).collect();
    let wrapped: Vec<u32> = backing
        .iter()
        .map(|&handle| {
            objects.import(Arc::new(RecordingObject {
                handle,
                inner: objects.lookup(handle).unwrap(),
                log: log.clone(),
            }))
        })
        .collect();

    let (args, user) = submission(
        &[
            PigpuExecBufferObj::new(wrapped[1], PigpuExecObjKind::Frame),
            PigpuExecBufferObj::new(wrapped[0], PigpuExecObjKind::Instruction),
        ],
        0,
    );
    dev.exec_buffer(&args, &objects, &user).unwrap();

    assert_eq!(*log.lock().unwrap(), vec![backing[1], backing[0]]);
    assert_eq!(objects.outstanding_pins(), 0);
}
