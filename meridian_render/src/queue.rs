use std::sync::Mutex;
use windows::{
    core::{ComInterface, HSTRING},
    Win32::Graphics::Direct3D12::{
        ID3D12CommandList, ID3D12CommandQueue, ID3D12Device, ID3D12GraphicsCommandList,
        D3D12_COMMAND_QUEUE_DESC,
    },
};

use crate::{
    error::{Error, IntoDeviceResult, Result},
    fence::{pack_fence_value, FenceTimeline, FenceValue, QueueKind},
};

/// One hardware submission queue plus its fence timeline.
///
/// Two independent locks guard disjoint state: the submission mutex covers
/// the fence signal and counter increment, the timeline's event mutex
/// covers the reusable wait event. A thread can block on completion while
/// another keeps submitting to the same queue.
pub struct CommandQueue {
    kind: QueueKind,
    queue: ID3D12CommandQueue,
    timeline: FenceTimeline,
    next_fence_value: Mutex<FenceValue>,
}

impl CommandQueue {
    pub fn new(device: &ID3D12Device, kind: QueueKind) -> Result<Self> {
        let desc = D3D12_COMMAND_QUEUE_DESC {
            Type: kind.list_type(),
            NodeMask: 0,
            ..Default::default()
        };
        let queue: ID3D12CommandQueue = unsafe { device.CreateCommandQueue(&desc) }
            .into_device_result("command queue creation")?;
        let timeline = FenceTimeline::new(device, pack_fence_value(kind, 0))?;
        tracing::debug!(kind = kind.name(), "command queue created");

        Ok(Self {
            kind,
            queue,
            timeline,
            next_fence_value: Mutex::new(pack_fence_value(kind, 1)),
        })
    }

    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    pub fn raw(&self) -> &ID3D12CommandQueue {
        &self.queue
    }

    /// Tags the queue for GPU debugging tools. Cosmetic only.
    pub fn set_debug_name(&self, name: &str) -> Result<()> {
        unsafe { self.queue.SetName(&HSTRING::from(name)) }.into_device_result("queue debug name")
    }

    /// Closes `list`, submits it alone, then signals the queue's fence with
    /// the next value and returns it.
    ///
    /// Only the signal+increment pair runs under the submission mutex.
    /// Close and submit happen outside it, so under concurrent submission
    /// the driver's submit order and the fence-value order are each
    /// consistent but not jointly atomic; callers needing strict
    /// cross-thread ordering must serialize their calls.
    pub fn execute_command_list(&self, list: &ID3D12GraphicsCommandList) -> Result<FenceValue> {
        unsafe { list.Close() }
            .map_err(|error| Error::precondition_for("command list close", error))?;
        let list: ID3D12CommandList = list
            .cast()
            .map_err(|error| Error::precondition_for("command list interface query", error))?;
        unsafe { self.queue.ExecuteCommandLists(&[Some(list)]) };

        self.signal_next()
    }

    /// Batch variant of [`execute_command_list`]: all lists are closed
    /// first, the batch is one hardware submit call, and one fence value
    /// covers the whole batch.
    ///
    /// An empty slice or a `None` element is a caller bug and fails as a
    /// precondition violation.
    ///
    /// [`execute_command_list`]: CommandQueue::execute_command_list
    pub fn execute_command_lists(
        &self,
        lists: &[Option<ID3D12GraphicsCommandList>],
    ) -> Result<FenceValue> {
        if lists.is_empty() {
            return Err(Error::precondition("empty command list batch"));
        }

        let mut batch = Vec::with_capacity(lists.len());
        for list in lists {
            let list = list
                .as_ref()
                .ok_or_else(|| Error::precondition("null command list in batch"))?;
            unsafe { list.Close() }
                .map_err(|error| Error::precondition_for("command list close", error))?;
            let list: ID3D12CommandList = list
                .cast()
                .map_err(|error| Error::precondition_for("command list interface query", error))?;
            batch.push(Some(list));
        }
        unsafe { self.queue.ExecuteCommandLists(&batch) };

        self.signal_next()
    }

    fn signal_next(&self) -> Result<FenceValue> {
        let mut next = self.next_fence_value.lock().unwrap();
        let value = *next;
        unsafe { self.queue.Signal(self.timeline.raw(), value) }
            .into_device_result("fence signal")?;
        *next += 1;

        Ok(value)
    }

    /// Makes this queue's future hardware work wait until its own fence
    /// reaches `value`. GPU-side only; no CPU blocking.
    pub fn insert_wait(&self, value: FenceValue) -> Result<()> {
        unsafe { self.queue.Wait(self.timeline.raw(), value) }
            .into_device_result("queue fence wait")
    }

    /// Makes this queue's future hardware work wait until `other`'s fence
    /// reaches `value`. The cross-queue dependency primitive.
    pub fn insert_wait_for_queue_fence(
        &self,
        other: &CommandQueue,
        value: FenceValue,
    ) -> Result<()> {
        unsafe { self.queue.Wait(other.timeline.raw(), value) }
            .into_device_result("cross-queue fence wait")
    }

    /// Waits for everything submitted to `other` so far, without the caller
    /// tracking an exact fence value.
    pub fn insert_wait_for_queue(&self, other: &CommandQueue) -> Result<()> {
        self.insert_wait_for_queue_fence(other, other.next_fence_value() - 1)
    }

    pub fn is_fence_complete(&self, value: FenceValue) -> bool {
        self.timeline.is_complete(value)
    }

    pub fn poll_current_fence_value(&self) -> FenceValue {
        self.timeline.poll_completed_value()
    }

    pub fn last_completed_fence_value(&self) -> FenceValue {
        self.timeline.last_completed_value()
    }

    /// The value the next submission will signal.
    pub fn next_fence_value(&self) -> FenceValue {
        *self.next_fence_value.lock().unwrap()
    }

    /// Blocks the calling thread until the fence reaches `value`. Returns
    /// immediately if it already has.
    pub fn wait_for_fence_blocking(&self, value: FenceValue) -> Result<()> {
        self.timeline.wait_blocking(value)
    }

    /// Drains all work submitted to this queue so far.
    pub fn wait_for_idle(&self) -> Result<()> {
        self.wait_for_fence_blocking(self.next_fence_value() - 1)
    }
}
