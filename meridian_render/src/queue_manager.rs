use windows::Win32::Graphics::Direct3D12::ID3D12Device;

use crate::{
    error::Result,
    fence::{fence_value_kind, FenceValue, QueueKind},
    queue::CommandQueue,
};

/// Owns one [`CommandQueue`] per kind for the lifetime of the device
/// context. The manager is the only entry point that can map an opaque
/// fence value back to the queue that produced it.
pub struct QueueManager {
    graphics: CommandQueue,
    compute: CommandQueue,
    copy: CommandQueue,
}

impl QueueManager {
    /// Creates the three queues against the supplied device. The device is
    /// borrowed; the caller keeps ownership of it.
    pub fn new(device: &ID3D12Device) -> Result<Self> {
        let graphics = CommandQueue::new(device, QueueKind::Graphics)?;
        let compute = CommandQueue::new(device, QueueKind::Compute)?;
        let copy = CommandQueue::new(device, QueueKind::Copy)?;
        graphics.set_debug_name("meridian graphics queue")?;
        compute.set_debug_name("meridian compute queue")?;
        copy.set_debug_name("meridian copy queue")?;

        Ok(Self {
            graphics,
            compute,
            copy,
        })
    }

    pub fn graphics(&self) -> &CommandQueue {
        &self.graphics
    }

    pub fn compute(&self) -> &CommandQueue {
        &self.compute
    }

    pub fn copy(&self) -> &CommandQueue {
        &self.copy
    }

    pub fn queue(&self, kind: QueueKind) -> &CommandQueue {
        match kind {
            QueueKind::Graphics => &self.graphics,
            QueueKind::Compute => &self.compute,
            QueueKind::Copy => &self.copy,
        }
    }

    /// Decodes the producing queue from the value's top bits and asks it
    /// for completion. A value that decodes to no known queue is a
    /// precondition violation.
    pub fn is_fence_complete(&self, value: FenceValue) -> Result<bool> {
        let kind = fence_value_kind(value)?;
        Ok(self.queue(kind).is_fence_complete(value))
    }

    /// Blocking counterpart of [`is_fence_complete`], dispatched the same
    /// way.
    ///
    /// [`is_fence_complete`]: QueueManager::is_fence_complete
    pub fn wait_for_fence_blocking(&self, value: FenceValue) -> Result<()> {
        let kind = fence_value_kind(value)?;
        self.queue(kind).wait_for_fence_blocking(value)
    }

    /// Drains every queue in fixed order (graphics, compute, copy). Used
    /// for full-device drains before resize or shutdown.
    pub fn wait_for_all_idle(&self) -> Result<()> {
        self.graphics.wait_for_idle()?;
        self.compute.wait_for_idle()?;
        self.copy.wait_for_idle()
    }
}
