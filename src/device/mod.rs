// src/device/mod.rs - Memory log interface consumed from the motion controller driver
pub mod sim;

use crate::error::ErrorCode;

pub use sim::SimulatedDevice;

/// Driver calls either succeed or hand back the raw status code.
pub type DeviceResult<T> = Result<T, ErrorCode>;

/// Logging state of a memory log channel as reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogState {
    Idle,
    Running,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryLogStatus {
    pub log_state: LogState,
    pub buffer_opened: bool,
}

/// Axes whose cyclic data the device records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisSelection {
    pub axes: Vec<u8>,
}

impl AxisSelection {
    /// Select axes `0..count`
    pub fn first(count: u8) -> Self {
        Self { axes: (0..count).collect() }
    }

    pub fn axis_count(&self) -> usize {
        self.axes.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MemoryLogOptions {
    pub trigger_event_count: u32,
}

/// Feedback recorded for one axis in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisFeedback {
    pub feedback_pos: f64,
    pub feedback_velocity: f64,
}

/// Samples drained from a channel by one fetch. `entries[cycle][axis]`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogBatch {
    pub overflow: bool,
    pub entries: Vec<Vec<AxisFeedback>>,
}

impl LogBatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build a batch of single-axis `(position, velocity)` cycles
    pub fn from_pairs(pairs: &[(f64, f64)], overflow: bool) -> Self {
        Self {
            overflow,
            entries: pairs
                .iter()
                .map(|&(feedback_pos, feedback_velocity)| {
                    vec![AxisFeedback { feedback_pos, feedback_velocity }]
                })
                .collect(),
        }
    }
}

/// Memory log API of a motion controller.
///
/// Implementations are shared between the session controller and its
/// acquisition thread, so every call takes `&self` and must be thread safe.
pub trait MotionLogDevice: Send + Sync {
    fn memory_log_status(&self, channel: u8) -> DeviceResult<MemoryLogStatus>;
    fn open_memory_log_buffer(&self, channel: u8) -> DeviceResult<()>;
    fn set_memory_log(
        &self,
        channel: u8,
        axes: &AxisSelection,
        options: &MemoryLogOptions,
    ) -> DeviceResult<()>;
    fn start_memory_log(&self, channel: u8) -> DeviceResult<()>;
    fn stop_memory_log(&self, channel: u8) -> DeviceResult<()>;
    fn close_memory_log_buffer(&self, channel: u8) -> DeviceResult<()>;
    /// Drain every sample recorded since the previous call
    fn memory_log_data(&self, channel: u8) -> DeviceResult<LogBatch>;
}
