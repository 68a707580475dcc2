use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};
use windows::Win32::{
    Foundation::{CloseHandle, HANDLE},
    Graphics::Direct3D12::{
        ID3D12Device, ID3D12Fence, D3D12_COMMAND_LIST_TYPE, D3D12_COMMAND_LIST_TYPE_COMPUTE,
        D3D12_COMMAND_LIST_TYPE_COPY, D3D12_COMMAND_LIST_TYPE_DIRECT, D3D12_FENCE_FLAG_NONE,
    },
    System::Threading::{CreateEventA, WaitForSingleObject, INFINITE},
};

use crate::error::{Error, IntoDeviceResult, Result};

/// Opaque per-queue progress marker. The top 8 bits carry the producing
/// queue's ordinal, the low 56 bits a per-queue sequence number starting at
/// 1 for the queue's first submission. See [`pack_fence_value`].
pub type FenceValue = u64;

const KIND_SHIFT: u32 = 56;
const SEQUENCE_MASK: u64 = (1u64 << KIND_SHIFT) - 1;

/// The class of hardware engine a command list targets.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum QueueKind {
    Graphics,
    Compute,
    Copy,
}

impl QueueKind {
    pub const ALL: [QueueKind; 3] = [QueueKind::Graphics, QueueKind::Compute, QueueKind::Copy];

    pub const fn ordinal(self) -> u64 {
        match self {
            QueueKind::Graphics => 0,
            QueueKind::Compute => 1,
            QueueKind::Copy => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            QueueKind::Graphics => "graphics",
            QueueKind::Compute => "compute",
            QueueKind::Copy => "copy",
        }
    }

    pub(crate) const fn list_type(self) -> D3D12_COMMAND_LIST_TYPE {
        match self {
            QueueKind::Graphics => D3D12_COMMAND_LIST_TYPE_DIRECT,
            QueueKind::Compute => D3D12_COMMAND_LIST_TYPE_COMPUTE,
            QueueKind::Copy => D3D12_COMMAND_LIST_TYPE_COPY,
        }
    }

    const fn from_ordinal(ordinal: u64) -> Option<QueueKind> {
        match ordinal {
            0 => Some(QueueKind::Graphics),
            1 => Some(QueueKind::Compute),
            2 => Some(QueueKind::Copy),
            _ => None,
        }
    }
}

/// Packs a queue kind and sequence number into a fence value.
pub const fn pack_fence_value(kind: QueueKind, sequence: u64) -> FenceValue {
    (kind.ordinal() << KIND_SHIFT) | (sequence & SEQUENCE_MASK)
}

/// Recovers the queue that produced `value` from its top 8 bits.
pub fn fence_value_kind(value: FenceValue) -> Result<QueueKind> {
    QueueKind::from_ordinal(value >> KIND_SHIFT).ok_or_else(|| {
        Error::precondition(format!(
            "fence value 0x{value:016X} does not decode to a known queue kind"
        ))
    })
}

/// Recovers the per-queue sequence number from the low 56 bits of `value`.
pub const fn fence_value_sequence(value: FenceValue) -> u64 {
    value & SEQUENCE_MASK
}

struct WaitEvent(HANDLE);

impl Drop for WaitEvent {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseHandle(self.0);
        }
    }
}

/// One queue's completion timeline: the hardware fence, a cached lower
/// bound on its completed value, and the single reusable wait event.
///
/// The event sits behind its own mutex, distinct from the owning queue's
/// submission mutex, so a thread blocked on completion never serializes
/// against threads submitting new work.
pub(crate) struct FenceTimeline {
    fence: ID3D12Fence,
    last_completed: AtomicU64,
    wait_event: Mutex<WaitEvent>,
}

impl FenceTimeline {
    pub(crate) fn new(device: &ID3D12Device, initial_value: FenceValue) -> Result<Self> {
        let fence: ID3D12Fence = unsafe { device.CreateFence(initial_value, D3D12_FENCE_FLAG_NONE) }
            .into_device_result("fence creation")?;
        let event = unsafe { CreateEventA(None, false, false, None) }
            .into_device_result("fence wait event creation")?;

        Ok(Self {
            fence,
            last_completed: AtomicU64::new(initial_value),
            wait_event: Mutex::new(WaitEvent(event)),
        })
    }

    pub(crate) fn raw(&self) -> &ID3D12Fence {
        &self.fence
    }

    pub(crate) fn last_completed_value(&self) -> FenceValue {
        self.last_completed.load(Ordering::Acquire)
    }

    /// Reads the hardware-reported completed value and merges it into the
    /// cache. The cache never regresses, even across racing pollers.
    pub(crate) fn poll_completed_value(&self) -> FenceValue {
        let hardware = unsafe { self.fence.GetCompletedValue() };
        let previous = self.last_completed.fetch_max(hardware, Ordering::AcqRel);
        previous.max(hardware)
    }

    /// Checks completion against the cache, refreshing it once if the cache
    /// is behind `value`.
    pub(crate) fn is_complete(&self, value: FenceValue) -> bool {
        if value > self.last_completed.load(Ordering::Acquire) {
            self.poll_completed_value();
        }

        value <= self.last_completed.load(Ordering::Acquire)
    }

    /// Blocks the calling thread until the fence reaches `value`. Already
    /// completed values return without touching the event. One blocking
    /// wait owns the event at a time; further waiters queue on the event
    /// mutex. The wait has no timeout.
    pub(crate) fn wait_blocking(&self, value: FenceValue) -> Result<()> {
        if self.is_complete(value) {
            return Ok(());
        }

        let event = self.wait_event.lock().unwrap();
        unsafe { self.fence.SetEventOnCompletion(value, event.0) }
            .into_device_result("fence completion event registration")?;
        unsafe {
            WaitForSingleObject(event.0, INFINITE);
        }
        self.last_completed.fetch_max(value, Ordering::AcqRel);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_value_round_trips_every_kind() {
        for kind in QueueKind::ALL {
            let value = pack_fence_value(kind, 42);
            assert_eq!(fence_value_kind(value).unwrap(), kind);
            assert_eq!(fence_value_sequence(value), 42);
        }
    }

    #[test]
    fn first_graphics_submission_is_one() {
        assert_eq!(pack_fence_value(QueueKind::Graphics, 1), 0x0000000000000001);
    }

    #[test]
    fn compute_sequence_occupies_low_bits() {
        assert_eq!(pack_fence_value(QueueKind::Compute, 1), 0x0100000000000001);
        assert_eq!(pack_fence_value(QueueKind::Compute, 2), 0x0100000000000002);
        assert_eq!(pack_fence_value(QueueKind::Compute, 3), 0x0100000000000003);
    }

    #[test]
    fn copy_ordinal_is_two() {
        assert_eq!(pack_fence_value(QueueKind::Copy, 7) >> 56, 2);
    }

    #[test]
    fn unknown_ordinal_is_rejected() {
        let bogus = (0xABu64 << 56) | 5;
        assert!(fence_value_kind(bogus).is_err());
    }

    #[test]
    fn sequence_never_spills_into_kind_bits() {
        let value = pack_fence_value(QueueKind::Graphics, u64::MAX);
        assert_eq!(fence_value_kind(value).unwrap(), QueueKind::Graphics);
        assert_eq!(fence_value_sequence(value), SEQUENCE_MASK);
    }
}
