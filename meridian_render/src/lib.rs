pub mod camera;
mod command_encoder;
mod descriptor;
mod device;
pub mod error;
pub mod fence;
mod frame;
mod queue;
mod queue_manager;

pub use camera::{CameraKey, FreeCamera, ViewUniform};
pub use command_encoder::CommandEncoder;
pub use descriptor::{
    BindlessAllocator, DescriptorHeap, DescriptorRange, DescriptorSlot, LinearAllocator,
};
pub use device::{AllocatedBuffer, BufferId, Device};
pub use error::{Error, ErrorKind, Result};
pub use fence::{
    fence_value_kind, fence_value_sequence, pack_fence_value, FenceValue, QueueKind,
};
pub use frame::{FrameContext, FrameResources, FRAME_COUNT};
pub use queue::CommandQueue;
pub use queue_manager::QueueManager;

pub use gpu_allocator::MemoryLocation;
pub use windows::Win32::Graphics::{
    Direct3D::*,
    Direct3D12::*,
    Dxgi::{Common::*, *},
};
