use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};
use windows::{
    core::HSTRING,
    Win32::Graphics::Direct3D12::{
        ID3D12DescriptorHeap, ID3D12Device, ID3D12Resource, D3D12_CONSTANT_BUFFER_VIEW_DESC,
        D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_GPU_DESCRIPTOR_HANDLE, D3D12_SAMPLER_DESC,
        D3D12_SHADER_RESOURCE_VIEW_DESC,
    },
};

use crate::error::{Error, IntoDeviceResult, Result};

pub struct DescriptorHeap {
    heap: ID3D12DescriptorHeap,
    device: Arc<ID3D12Device>,
    descriptor_size: u32,
    capacity: u32,
    shader_visible: bool,
}

impl DescriptorHeap {
    pub(crate) fn new(
        heap: ID3D12DescriptorHeap,
        device: Arc<ID3D12Device>,
        descriptor_size: u32,
        capacity: u32,
        shader_visible: bool,
    ) -> Self {
        Self {
            heap,
            device,
            descriptor_size,
            capacity,
            shader_visible,
        }
    }

    pub fn get(&self) -> ID3D12DescriptorHeap {
        self.heap.clone()
    }

    pub fn descriptor_size(&self) -> u32 {
        self.descriptor_size
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn is_shader_visible(&self) -> bool {
        self.shader_visible
    }

    pub fn cpu_handle(&self, index: u32) -> D3D12_CPU_DESCRIPTOR_HANDLE {
        D3D12_CPU_DESCRIPTOR_HANDLE {
            ptr: unsafe { self.heap.GetCPUDescriptorHandleForHeapStart() }.ptr
                + index as usize * self.descriptor_size as usize,
        }
    }

    /// Zero for heaps that are not shader visible.
    pub fn gpu_handle(&self, index: u32) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        if !self.shader_visible {
            return D3D12_GPU_DESCRIPTOR_HANDLE { ptr: 0 };
        }

        D3D12_GPU_DESCRIPTOR_HANDLE {
            ptr: unsafe { self.heap.GetGPUDescriptorHandleForHeapStart() }.ptr
                + index as u64 * self.descriptor_size as u64,
        }
    }

    pub fn create_cbv(&self, desc: &D3D12_CONSTANT_BUFFER_VIEW_DESC, index: u32) {
        unsafe {
            self.device
                .CreateConstantBufferView(Some(desc), self.cpu_handle(index));
        }
    }

    pub fn create_srv(
        &self,
        resource: &ID3D12Resource,
        desc: &D3D12_SHADER_RESOURCE_VIEW_DESC,
        index: u32,
    ) {
        unsafe {
            self.device
                .CreateShaderResourceView(resource, Some(desc), self.cpu_handle(index));
        }
    }

    pub fn create_sampler(&self, desc: &D3D12_SAMPLER_DESC, index: u32) {
        unsafe {
            self.device.CreateSampler(desc, self.cpu_handle(index));
        }
    }

    pub fn set_debug_name(&self, name: &str) -> Result<()> {
        unsafe { self.heap.SetName(&HSTRING::from(name)) }
            .into_device_result("descriptor heap debug name")
    }
}

/// FIFO recycling pool over the slot indices of one heap.
struct SlotPool {
    free: VecDeque<u32>,
}

impl SlotPool {
    fn with_capacity(capacity: u32) -> Self {
        Self {
            free: (0..capacity).collect(),
        }
    }

    fn allocate(&mut self) -> Option<u32> {
        self.free.pop_front()
    }

    fn release(&mut self, index: u32) {
        self.free.push_back(index);
    }

    fn available(&self) -> usize {
        self.free.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorSlot {
    pub index: u32,
    pub cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
}

/// Stable-slot allocator for long-lived views (textures, static buffers):
/// every slot keeps its index for the resource's whole life, so shaders can
/// address it directly.
pub struct BindlessAllocator {
    heap: DescriptorHeap,
    slots: Mutex<SlotPool>,
}

impl BindlessAllocator {
    pub fn new(heap: DescriptorHeap) -> Result<Self> {
        if !heap.is_shader_visible() {
            return Err(Error::precondition(
                "bindless allocator requires a shader-visible heap",
            ));
        }
        let slots = Mutex::new(SlotPool::with_capacity(heap.capacity()));

        Ok(Self { heap, slots })
    }

    pub fn allocate(&self) -> Result<DescriptorSlot> {
        let index = self
            .slots
            .lock()
            .unwrap()
            .allocate()
            .ok_or_else(|| Error::environment("bindless descriptor heap exhausted"))?;

        Ok(DescriptorSlot {
            index,
            cpu: self.heap.cpu_handle(index),
        })
    }

    pub fn free(&self, index: u32) {
        self.slots.lock().unwrap().release(index);
    }

    pub fn available(&self) -> usize {
        self.slots.lock().unwrap().available()
    }

    pub fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }

    pub fn base_gpu_handle(&self) -> D3D12_GPU_DESCRIPTOR_HANDLE {
        self.heap.gpu_handle(0)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DescriptorRange {
    pub first_index: u32,
    pub cpu: D3D12_CPU_DESCRIPTOR_HANDLE,
    pub gpu: D3D12_GPU_DESCRIPTOR_HANDLE,
}

/// Bump allocator for per-frame views (transforms, dynamic constants).
/// Reset at the top of each frame; allocations are contiguous so a range
/// can be bound as one descriptor table.
pub struct LinearAllocator {
    heap: DescriptorHeap,
    cursor: u32,
}

impl LinearAllocator {
    pub fn new(heap: DescriptorHeap) -> Result<Self> {
        if !heap.is_shader_visible() {
            return Err(Error::precondition(
                "linear allocator requires a shader-visible heap",
            ));
        }

        Ok(Self { heap, cursor: 0 })
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    pub fn allocate(&mut self, count: u32) -> Result<DescriptorRange> {
        if self.cursor + count > self.heap.capacity() {
            return Err(Error::environment("linear descriptor heap exhausted"));
        }

        let first_index = self.cursor;
        self.cursor += count;

        Ok(DescriptorRange {
            first_index,
            cpu: self.heap.cpu_handle(first_index),
            gpu: self.heap.gpu_handle(first_index),
        })
    }

    pub fn heap(&self) -> &DescriptorHeap {
        &self.heap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_pool_hands_out_every_index_once() {
        let mut pool = SlotPool::with_capacity(3);
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(2));
        assert_eq!(pool.allocate(), None);
    }

    #[test]
    fn slot_pool_recycles_fifo() {
        let mut pool = SlotPool::with_capacity(2);
        pool.allocate();
        pool.allocate();
        pool.release(1);
        pool.release(0);
        assert_eq!(pool.allocate(), Some(1));
        assert_eq!(pool.allocate(), Some(0));
        assert_eq!(pool.available(), 0);
    }
}
