// src/channel.rs - Memory log channel probing and reservation
use std::fmt;
use std::sync::Arc;

use crate::device::{LogState, MotionLogDevice};
use crate::error::{DeviceError, DeviceResultExt, check_error_code};

/// A memory log channel reserved on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelHandle(u8);

impl ChannelHandle {
    pub fn new(id: u8) -> Self {
        Self(id)
    }

    pub fn id(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Finds a free memory log channel, scanning from the highest id down.
/// Channel 0 is never handed out.
pub struct ChannelAllocator {
    device: Arc<dyn MotionLogDevice>,
    max_log_channel: u8,
}

impl ChannelAllocator {
    pub fn new(device: Arc<dyn MotionLogDevice>, max_log_channel: u8) -> Self {
        Self { device, max_log_channel }
    }

    /// Channel ids in probe order
    pub fn candidates(&self) -> std::iter::Rev<std::ops::Range<u8>> {
        (1..self.max_log_channel).rev()
    }

    /// A channel is free when its log is idle and its buffer is not open.
    ///
    /// Some firmware keeps reporting the buffer as open after it was closed,
    /// so a reusable channel can be skipped here. That is accepted.
    pub fn is_available_channel(&self, channel: u8) -> Result<bool, DeviceError> {
        let status = self
            .device
            .memory_log_status(channel)
            .for_operation("GetMemoryLogStatus")?;

        if status.log_state != LogState::Idle || status.buffer_opened {
            tracing::debug!(
                "Channel {} unavailable: log state {:?}, buffer opened {}",
                channel,
                status.log_state,
                status.buffer_opened
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Open the buffer of the first free channel. A failed open is logged
    /// and the scan moves on to the next candidate.
    pub fn reserve_channel(&self) -> Result<Option<ChannelHandle>, DeviceError> {
        for channel in self.candidates() {
            tracing::trace!("Probing memory log channel {}", channel);
            if !self.is_available_channel(channel)? {
                continue;
            }
            match self.device.open_memory_log_buffer(channel) {
                Ok(()) => {
                    tracing::info!("Reserved memory log channel {}", channel);
                    return Ok(Some(ChannelHandle(channel)));
                }
                Err(code) => {
                    if let Err(e) =
                        check_error_code("OpenMemoryLogBuffer during checkMemoryLogChannel", code)
                    {
                        tracing::warn!("Skipping channel {}: {}", channel, e);
                    }
                }
            }
        }
        tracing::warn!(
            "No memory log channel available among {} candidates",
            self.max_log_channel.saturating_sub(1)
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::{DeviceOp, SimulatedDevice};
    use crate::device::MemoryLogStatus;
    use crate::error::ErrorCode;

    fn busy() -> MemoryLogStatus {
        MemoryLogStatus { log_state: LogState::Running, buffer_opened: true }
    }

    #[test]
    fn test_candidates_descend_and_skip_zero() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        let allocator = ChannelAllocator::new(device, 4);
        assert_eq!(allocator.candidates().collect::<Vec<_>>(), vec![3, 2, 1]);
    }

    #[test]
    fn test_highest_free_channel_wins() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        let allocator = ChannelAllocator::new(device.clone(), 4);
        assert_eq!(allocator.reserve_channel().unwrap(), Some(ChannelHandle::new(3)));
        assert!(device.is_buffer_open(3));
        assert_eq!(device.count_calls(DeviceOp::Status, 2), 0);
    }

    #[test]
    fn test_availability_requires_idle_and_closed() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        let allocator = ChannelAllocator::new(device.clone(), 4);
        device.set_status(1, MemoryLogStatus { log_state: LogState::Idle, buffer_opened: true });
        device.set_status(
            2,
            MemoryLogStatus { log_state: LogState::Finished, buffer_opened: false },
        );
        assert!(!allocator.is_available_channel(1).unwrap());
        assert!(!allocator.is_available_channel(2).unwrap());
        assert!(allocator.is_available_channel(3).unwrap());
    }

    #[test]
    fn test_all_busy_returns_none() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        for channel in 1..4 {
            device.set_status(channel, busy());
        }
        let allocator = ChannelAllocator::new(device.clone(), 4);
        assert_eq!(allocator.reserve_channel().unwrap(), None);
        assert_eq!(device.count_calls(DeviceOp::Open, 1), 0);
    }

    #[test]
    fn test_probe_failure_aborts_scan() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        device.set_status(3, busy());
        device.fail_on(DeviceOp::Status, 2, ErrorCode(0x11020));
        let allocator = ChannelAllocator::new(device.clone(), 4);
        let err = allocator.reserve_channel().unwrap_err();
        assert_eq!(err.operation, "GetMemoryLogStatus");
        assert_eq!(device.count_calls(DeviceOp::Status, 1), 0);
    }

    #[test]
    fn test_open_failure_continues_to_next_channel() {
        let device = Arc::new(SimulatedDevice::scripted(4));
        device.fail_on(DeviceOp::Open, 3, ErrorCode(0x11002));
        let allocator = ChannelAllocator::new(device.clone(), 4);
        assert_eq!(allocator.reserve_channel().unwrap(), Some(ChannelHandle::new(2)));
        assert_eq!(device.count_calls(DeviceOp::Open, 3), 1);
        assert_eq!(device.count_calls(DeviceOp::Open, 2), 1);
    }
}
