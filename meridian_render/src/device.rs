use gpu_allocator::{
    d3d12::{
        Allocator, AllocatorCreateDesc, ID3D12DeviceVersion, Resource, ResourceCategory,
        ResourceCreateDesc, ResourceStateOrBarrierLayout, ResourceType,
    },
    MemoryLocation,
};
use std::{ffi::c_void, mem::MaybeUninit, ptr, sync::Arc};
use windows::{
    core::{ComInterface, PCSTR},
    Win32::Graphics::{
        Direct3D::*,
        Direct3D12::*,
        Dxgi::{Common::*, *},
    },
};

use crate::{
    command_encoder::CommandEncoder,
    descriptor::DescriptorHeap,
    error::{Error, IntoDeviceResult, Result},
    fence::QueueKind,
    queue_manager::QueueManager,
};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct BufferId(pub usize);

pub struct AllocatedBuffer {
    pub allocation: Resource,
    pub size: u64,
}

/// The native graphics device plus the allocator and validation plumbing
/// around it. Queues, heaps, and encoders are created through it; the
/// device itself is created once and owns nothing GPU-timeline-aware.
pub struct Device {
    device: Arc<ID3D12Device>,
    allocator: Allocator,
    // Held so the registered validation callback stays alive.
    debug_callback: Option<ID3D12InfoQueue1>,

    buffers: Vec<AllocatedBuffer>,
}

impl Device {
    pub fn new() -> Result<Self> {
        if cfg!(debug_assertions) {
            unsafe {
                let mut debug: Option<ID3D12Debug1> = None;
                D3D12GetDebugInterface(&mut debug).into_device_result("debug interface query")?;
                if let Some(debug) = debug {
                    debug.EnableDebugLayer();
                }
            }
        }

        let factory_flags = if cfg!(debug_assertions) {
            DXGI_CREATE_FACTORY_DEBUG
        } else {
            0
        };
        let factory: IDXGIFactory6 = unsafe { CreateDXGIFactory2(factory_flags) }
            .into_device_result("DXGI factory creation")?;

        let physical_device = get_physical_device(&factory)?;
        let mut adapter_desc = Default::default();
        unsafe { physical_device.GetDesc1(&mut adapter_desc) }
            .into_device_result("adapter description")?;
        tracing::info!(
            adapter = %String::from_utf16_lossy(&adapter_desc.Description)
                .trim_end_matches('\0'),
            "adapter selected"
        );

        let mut device: Option<ID3D12Device> = None;
        unsafe { D3D12CreateDevice(&physical_device, D3D_FEATURE_LEVEL_11_0, &mut device) }
            .into_device_result("D3D12 device creation")?;
        let device = device.unwrap();

        let allocator = Allocator::new(&AllocatorCreateDesc {
            device: ID3D12DeviceVersion::Device(device.clone()),
            debug_settings: Default::default(),
            allocation_sizes: Default::default(),
        })
        .map_err(|error| Error::environment(format!("GPU allocator creation: {error}")))?;

        // The info queue only exists once the debug layer is on; route its
        // messages into tracing instead of the debugger output window.
        let debug_callback = if cfg!(debug_assertions) {
            let mut info_queue: Option<ID3D12InfoQueue1> = None;
            unsafe { device.query(&ID3D12InfoQueue1::IID, &mut info_queue as *mut _ as *mut _) }
                .ok()
                .into_device_result("info queue query")?;
            let info_queue = info_queue.unwrap();
            let mut callback = 0;
            unsafe {
                info_queue.RegisterMessageCallback(
                    Some(message_callback),
                    D3D12_MESSAGE_CALLBACK_FLAG_NONE,
                    ptr::null(),
                    &mut callback,
                )
            }
            .into_device_result("info queue callback registration")?;
            Some(info_queue)
        } else {
            None
        };

        tracing::info!("D3D12 device created");

        Ok(Self {
            device: Arc::new(device),
            allocator,
            debug_callback,
            buffers: Vec::new(),
        })
    }

    pub fn handle(&self) -> &ID3D12Device {
        &self.device
    }

    /// Creates the per-kind queue set. One manager per device.
    pub fn create_queue_manager(&self) -> Result<QueueManager> {
        QueueManager::new(&self.device)
    }

    pub fn create_descriptor_heap(
        &self,
        kind: D3D12_DESCRIPTOR_HEAP_TYPE,
        count: u32,
        flags: D3D12_DESCRIPTOR_HEAP_FLAGS,
    ) -> Result<DescriptorHeap> {
        let desc = D3D12_DESCRIPTOR_HEAP_DESC {
            Type: kind,
            NumDescriptors: count,
            Flags: flags,
            ..Default::default()
        };
        let raw_heap: ID3D12DescriptorHeap = unsafe { self.device.CreateDescriptorHeap(&desc) }
            .into_device_result("descriptor heap creation")?;
        let descriptor_size = unsafe { self.device.GetDescriptorHandleIncrementSize(kind) };
        let shader_visible = (flags & D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE)
            != D3D12_DESCRIPTOR_HEAP_FLAG_NONE;

        Ok(DescriptorHeap::new(
            raw_heap,
            self.device.clone(),
            descriptor_size,
            count,
            shader_visible,
        ))
    }

    pub fn create_command_encoder(&self, kind: QueueKind) -> Result<CommandEncoder> {
        let allocator: ID3D12CommandAllocator =
            unsafe { self.device.CreateCommandAllocator(kind.list_type()) }
                .into_device_result("command allocator creation")?;
        let list: ID3D12GraphicsCommandList =
            unsafe { self.device.CreateCommandList(0, kind.list_type(), &allocator, None) }
                .into_device_result("command list creation")?;
        unsafe { list.Close() }.into_device_result("command list initial close")?;

        Ok(CommandEncoder::new(allocator, list))
    }

    pub fn create_buffer(
        &mut self,
        size: u64,
        flags: D3D12_RESOURCE_FLAGS,
        state: D3D12_RESOURCE_STATES,
        location: MemoryLocation,
    ) -> Result<BufferId> {
        let desc = D3D12_RESOURCE_DESC {
            Dimension: D3D12_RESOURCE_DIMENSION_BUFFER,
            Alignment: 0,
            Width: size,
            Height: 1,
            DepthOrArraySize: 1,
            MipLevels: 1,
            Format: DXGI_FORMAT_UNKNOWN,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Layout: D3D12_TEXTURE_LAYOUT_ROW_MAJOR,
            Flags: flags,
        };
        let allocation = self
            .allocator
            .create_resource(&ResourceCreateDesc {
                name: "Buffer",
                memory_location: location,
                resource_category: ResourceCategory::Buffer,
                resource_desc: &desc,
                clear_value: None,
                initial_state_or_layout: ResourceStateOrBarrierLayout::ResourceState(state),
                resource_type: &ResourceType::Placed,
            })
            .map_err(|error| Error::environment(format!("buffer allocation: {error}")))?;

        let idx = self.buffers.len();
        self.buffers.push(AllocatedBuffer { allocation, size });

        Ok(BufferId(idx))
    }

    pub fn get_buffer(&self, buffer_id: BufferId) -> &AllocatedBuffer {
        &self.buffers[buffer_id.0]
    }

    pub fn map_buffer<T>(&self, id: BufferId) -> Result<&mut [T]> {
        let mut data = MaybeUninit::uninit();
        let buffer = &self.buffers[id.0];
        unsafe {
            buffer
                .allocation
                .resource()
                .Map(0, None, Some(data.as_mut_ptr()))
                .into_device_result("buffer map")?;
            let slice = std::slice::from_raw_parts_mut(
                data.assume_init() as *mut T,
                buffer.size as usize / std::mem::size_of::<T>(),
            );
            Ok(slice)
        }
    }

    pub fn unmap_buffer(&self, id: BufferId) {
        unsafe {
            self.buffers[id.0].allocation.resource().Unmap(0, None);
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            let _ = self.allocator.free_resource(buffer.allocation);
        }
    }
}

fn get_physical_device(factory: &IDXGIFactory6) -> Result<IDXGIAdapter1> {
    for i in 0.. {
        let physical_device: IDXGIAdapter1 =
            unsafe { factory.EnumAdapterByGpuPreference(i, DXGI_GPU_PREFERENCE_HIGH_PERFORMANCE) }
                .into_device_result("adapter enumeration")?;

        let mut desc = Default::default();
        unsafe { physical_device.GetDesc1(&mut desc) }.into_device_result("adapter description")?;
        if (DXGI_ADAPTER_FLAG(desc.Flags as i32) & DXGI_ADAPTER_FLAG_SOFTWARE)
            != DXGI_ADAPTER_FLAG_NONE
        {
            continue;
        }

        if unsafe {
            D3D12CreateDevice(
                &physical_device,
                D3D_FEATURE_LEVEL_11_0,
                std::ptr::null_mut::<Option<ID3D12Device>>(),
            )
        }
        .is_ok()
        {
            return Ok(physical_device);
        }
    }

    unreachable!()
}

unsafe extern "system" fn message_callback(
    _category: D3D12_MESSAGE_CATEGORY,
    _severity: D3D12_MESSAGE_SEVERITY,
    _id: D3D12_MESSAGE_ID,
    description: PCSTR,
    _context: *mut c_void,
) {
    tracing::warn!("{}", description.display());
}
