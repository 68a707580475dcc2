use std::mem::ManuallyDrop;
use windows::Win32::Graphics::Direct3D12::*;

use crate::{
    device::AllocatedBuffer,
    error::{Error, IntoDeviceResult, Result},
};

/// A command allocator and its list, recycled together. Recording is the
/// caller's responsibility; closing happens at submission, inside
/// [`CommandQueue::execute_command_list`].
///
/// [`CommandQueue::execute_command_list`]: crate::CommandQueue::execute_command_list
pub struct CommandEncoder {
    allocator: ID3D12CommandAllocator,
    list: ID3D12GraphicsCommandList,
}

impl CommandEncoder {
    pub(crate) fn new(allocator: ID3D12CommandAllocator, list: ID3D12GraphicsCommandList) -> Self {
        Self { allocator, list }
    }

    /// Reopens the list for recording. The GPU must be done with the
    /// previous recording; resetting earlier is a caller bug.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.allocator
                .Reset()
                .map_err(|error| Error::precondition_for("command allocator reset", error))?;
            self.list
                .Reset(&self.allocator, None)
                .into_device_result("command list reset")?;
        }

        Ok(())
    }

    pub fn transition_resource(
        &self,
        resource: &ID3D12Resource,
        state_before: D3D12_RESOURCE_STATES,
        state_after: D3D12_RESOURCE_STATES,
    ) {
        let barrier = D3D12_RESOURCE_BARRIER {
            Type: D3D12_RESOURCE_BARRIER_TYPE_TRANSITION,
            Flags: D3D12_RESOURCE_BARRIER_FLAG_NONE,
            Anonymous: D3D12_RESOURCE_BARRIER_0 {
                Transition: ManuallyDrop::new(D3D12_RESOURCE_TRANSITION_BARRIER {
                    pResource: unsafe { std::mem::transmute_copy(resource) },
                    StateBefore: state_before,
                    StateAfter: state_after,
                    Subresource: D3D12_RESOURCE_BARRIER_ALL_SUBRESOURCES,
                }),
            },
        };
        unsafe {
            self.list.ResourceBarrier(&[barrier]);
        }
    }

    pub fn copy_buffer(
        &self,
        src: &AllocatedBuffer,
        src_offset: u64,
        dst: &AllocatedBuffer,
        dst_offset: u64,
        size: u64,
    ) {
        unsafe {
            self.list.CopyBufferRegion(
                dst.allocation.resource(),
                dst_offset,
                src.allocation.resource(),
                src_offset,
                size,
            );
        }
    }

    pub fn list(&self) -> &ID3D12GraphicsCommandList {
        &self.list
    }
}
