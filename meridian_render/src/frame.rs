use gpu_allocator::MemoryLocation;
use windows::Win32::Graphics::Direct3D12::{
    D3D12_RESOURCE_FLAG_NONE, D3D12_RESOURCE_STATE_GENERIC_READ,
};

use crate::{
    command_encoder::CommandEncoder,
    device::{BufferId, Device},
    error::{Error, Result},
    fence::{FenceValue, QueueKind},
    queue::CommandQueue,
};

pub const FRAME_COUNT: usize = 2;

pub(crate) const fn align_up(value: u64, alignment: u64) -> u64 {
    (value + alignment - 1) & !(alignment - 1)
}

/// Aligned bump cursor over one frame's upload buffer. Pure bookkeeping;
/// the mapped memory lives in [`FrameContext`].
struct UploadCursor {
    capacity: u64,
    offset: u64,
}

impl UploadCursor {
    fn new(capacity: u64) -> Self {
        Self {
            capacity,
            offset: 0,
        }
    }

    fn reset(&mut self) {
        self.offset = 0;
    }

    fn allocate(&mut self, size: u64, alignment: u64) -> Result<u64> {
        if !alignment.is_power_of_two() {
            return Err(Error::precondition(
                "upload alignment must be a power of two",
            ));
        }

        let start = align_up(self.offset, alignment);
        let end = start
            .checked_add(size)
            .ok_or_else(|| Error::environment("frame upload buffer exhausted"))?;
        if end > self.capacity {
            return Err(Error::environment("frame upload buffer exhausted"));
        }
        self.offset = end;

        Ok(start)
    }
}

/// One frame's recording state: a command encoder, an upload buffer with a
/// bump cursor, and the fence value of the frame's last submission.
pub struct FrameContext {
    encoder: CommandEncoder,
    upload_buffer: BufferId,
    cursor: UploadCursor,
    fence_value: FenceValue,
}

impl FrameContext {
    fn new(device: &mut Device, kind: QueueKind, upload_capacity: u64) -> Result<Self> {
        let encoder = device.create_command_encoder(kind)?;
        let upload_buffer = device.create_buffer(
            upload_capacity,
            D3D12_RESOURCE_FLAG_NONE,
            D3D12_RESOURCE_STATE_GENERIC_READ,
            MemoryLocation::CpuToGpu,
        )?;

        Ok(Self {
            encoder,
            upload_buffer,
            cursor: UploadCursor::new(upload_capacity),
            fence_value: 0,
        })
    }

    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    pub fn upload_buffer(&self) -> BufferId {
        self.upload_buffer
    }

    pub fn fence_value(&self) -> FenceValue {
        self.fence_value
    }

    /// Copies `bytes` into the frame's upload buffer at the next aligned
    /// offset and returns that offset, for use in a copy command or as a
    /// constant-buffer address.
    pub fn write_to_upload(
        &mut self,
        device: &Device,
        bytes: &[u8],
        alignment: u64,
    ) -> Result<u64> {
        let offset = self.cursor.allocate(bytes.len() as u64, alignment)?;
        let data = device.map_buffer::<u8>(self.upload_buffer)?;
        data[offset as usize..offset as usize + bytes.len()].copy_from_slice(bytes);
        device.unmap_buffer(self.upload_buffer);

        Ok(offset)
    }
}

/// Double-buffered frame state. While the GPU consumes one frame's
/// submission, the CPU records into the other.
pub struct FrameResources {
    frames: Vec<FrameContext>,
    frame_index: usize,
}

impl FrameResources {
    pub fn new(device: &mut Device, kind: QueueKind, upload_capacity: u64) -> Result<Self> {
        let mut frames = Vec::with_capacity(FRAME_COUNT);
        for _ in 0..FRAME_COUNT {
            frames.push(FrameContext::new(device, kind, upload_capacity)?);
        }

        Ok(Self {
            frames,
            frame_index: 0,
        })
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn current(&self) -> &FrameContext {
        &self.frames[self.frame_index]
    }

    pub fn current_mut(&mut self) -> &mut FrameContext {
        &mut self.frames[self.frame_index]
    }

    /// Rotates to the next frame slot, blocks until the GPU has finished
    /// that slot's previous submission, then resets its encoder and upload
    /// cursor for re-recording.
    pub fn begin_frame(&mut self, queue: &CommandQueue) -> Result<&mut FrameContext> {
        self.frame_index = (self.frame_index + 1) % self.frames.len();
        let frame = &mut self.frames[self.frame_index];
        queue.wait_for_fence_blocking(frame.fence_value)?;
        frame.encoder.reset()?;
        frame.cursor.reset();

        Ok(frame)
    }

    /// Submits the current frame's list and records the fence value that
    /// marks its completion.
    pub fn end_frame(&mut self, queue: &CommandQueue) -> Result<FenceValue> {
        let frame = &mut self.frames[self.frame_index];
        let value = queue.execute_command_list(frame.encoder.list())?;
        frame.fence_value = value;

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_respects_alignment() {
        let mut cursor = UploadCursor::new(1024);
        assert_eq!(cursor.allocate(10, 4).unwrap(), 0);
        assert_eq!(cursor.allocate(4, 256).unwrap(), 256);
        assert_eq!(cursor.allocate(1, 1).unwrap(), 260);
    }

    #[test]
    fn cursor_rejects_non_power_of_two_alignment() {
        let mut cursor = UploadCursor::new(1024);
        assert!(cursor.allocate(4, 3).is_err());
    }

    #[test]
    fn cursor_reports_exhaustion() {
        let mut cursor = UploadCursor::new(64);
        cursor.allocate(60, 4).unwrap();
        assert!(cursor.allocate(8, 4).is_err());
    }

    #[test]
    fn cursor_reset_reclaims_space() {
        let mut cursor = UploadCursor::new(64);
        cursor.allocate(64, 4).unwrap();
        cursor.reset();
        assert_eq!(cursor.allocate(64, 4).unwrap(), 0);
    }

    #[test]
    fn align_up_rounds_to_boundary() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }
}
