// src/device/sim.rs - In-process motion controller with a scriptable memory log
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    AxisFeedback, AxisSelection, DeviceResult, LogBatch, LogState, MemoryLogOptions,
    MemoryLogStatus, MotionLogDevice,
};
use crate::config::DeviceConfig;
use crate::error::ErrorCode;

pub const ERR_INVALID_CHANNEL: ErrorCode = ErrorCode(0x11001);
pub const ERR_BUFFER_ALREADY_OPEN: ErrorCode = ErrorCode(0x11002);
pub const ERR_BUFFER_NOT_OPEN: ErrorCode = ErrorCode(0x11003);
pub const ERR_LOG_NOT_CONFIGURED: ErrorCode = ErrorCode(0x11004);

/// Cycles per synthetic move (accelerate, cruise, decelerate, dwell)
const PROFILE_PERIOD: u64 = 400;
const PROFILE_PEAK_VELOCITY: f64 = 100.0;
const CYCLE_TIME_S: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceOp {
    Status,
    Open,
    SetLog,
    Start,
    Stop,
    Close,
    Data,
}

/// One journaled driver call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceCall {
    pub op: DeviceOp,
    pub channel: u8,
}

#[derive(Debug, Clone)]
struct SimChannel {
    log_state: LogState,
    /// Flag reported to callers; may lag behind `open` when sticky
    buffer_flag: bool,
    open: bool,
    axis_count: Option<usize>,
    script: VecDeque<LogBatch>,
    cycle: u64,
    position: Vec<f64>,
}

impl SimChannel {
    fn idle() -> Self {
        Self {
            log_state: LogState::Idle,
            buffer_flag: false,
            open: false,
            axis_count: None,
            script: VecDeque::new(),
            cycle: 0,
            position: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct SimState {
    channels: Vec<SimChannel>,
    one_shot: HashMap<DeviceOp, ErrorCode>,
    persistent: HashMap<(DeviceOp, u8), ErrorCode>,
    journal: Vec<DeviceCall>,
    synthesize: bool,
    samples_per_batch: usize,
    overflow_every: u32,
    sticky_buffer_flag: bool,
    batches_synthesized: u32,
}

/// Simulated controller.
///
/// In scripted mode a channel only yields the batches queued with
/// [`SimulatedDevice::push_batch`]; otherwise a running channel synthesizes a
/// repeating trapezoidal move on every selected axis.
#[derive(Debug)]
pub struct SimulatedDevice {
    inner: Mutex<SimState>,
}

impl SimulatedDevice {
    /// Deterministic device: `channels` idle channels, no synthetic data
    pub fn scripted(channels: u8) -> Self {
        Self::build(channels, false, 0, 0, false)
    }

    pub fn from_config(config: &DeviceConfig) -> Self {
        let device = Self::build(
            config.channels,
            true,
            config.samples_per_batch,
            config.overflow_every,
            config.sticky_buffer_flag,
        );
        for &channel in &config.busy_channels {
            device.set_status(
                channel,
                MemoryLogStatus { log_state: LogState::Running, buffer_opened: true },
            );
        }
        device
    }

    fn build(
        channels: u8,
        synthesize: bool,
        samples_per_batch: usize,
        overflow_every: u32,
        sticky_buffer_flag: bool,
    ) -> Self {
        Self {
            inner: Mutex::new(SimState {
                channels: (0..channels).map(|_| SimChannel::idle()).collect(),
                one_shot: HashMap::new(),
                persistent: HashMap::new(),
                journal: Vec::new(),
                synthesize,
                samples_per_batch,
                overflow_every,
                sticky_buffer_flag,
                batches_synthesized: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force the status a channel reports. Setting `buffer_opened` also marks
    /// the buffer as owned by someone else.
    pub fn set_status(&self, channel: u8, status: MemoryLogStatus) {
        let mut state = self.state();
        if let Some(ch) = state.channels.get_mut(channel as usize) {
            ch.log_state = status.log_state;
            ch.buffer_flag = status.buffer_opened;
            ch.open = status.buffer_opened;
        }
    }

    pub fn set_sticky_buffer_flag(&self, sticky: bool) {
        self.state().sticky_buffer_flag = sticky;
    }

    /// Queue a batch to be returned by the next data fetch on `channel`
    pub fn push_batch(&self, channel: u8, batch: LogBatch) {
        let mut state = self.state();
        if let Some(ch) = state.channels.get_mut(channel as usize) {
            ch.script.push_back(batch);
        }
    }

    pub fn pending_batches(&self, channel: u8) -> usize {
        self.state()
            .channels
            .get(channel as usize)
            .map_or(0, |ch| ch.script.len())
    }

    /// Fail the next call of `op` on any channel with `code`
    pub fn fail_next(&self, op: DeviceOp, code: ErrorCode) {
        self.state().one_shot.insert(op, code);
    }

    /// Fail every call of `op` on `channel` with `code`
    pub fn fail_on(&self, op: DeviceOp, channel: u8, code: ErrorCode) {
        self.state().persistent.insert((op, channel), code);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.one_shot.clear();
        state.persistent.clear();
    }

    pub fn calls(&self) -> Vec<DeviceCall> {
        self.state().journal.clone()
    }

    pub fn count_calls(&self, op: DeviceOp, channel: u8) -> usize {
        self.state()
            .journal
            .iter()
            .filter(|call| call.op == op && call.channel == channel)
            .count()
    }

    pub fn is_buffer_open(&self, channel: u8) -> bool {
        self.state()
            .channels
            .get(channel as usize)
            .is_some_and(|ch| ch.open)
    }

    pub fn log_state(&self, channel: u8) -> Option<LogState> {
        self.state().channels.get(channel as usize).map(|ch| ch.log_state)
    }

    /// Journal the call, apply injected failures and resolve the channel
    fn enter<'a>(
        state: &'a mut SimState,
        op: DeviceOp,
        channel: u8,
    ) -> DeviceResult<&'a mut SimChannel> {
        state.journal.push(DeviceCall { op, channel });
        if let Some(code) = state.one_shot.remove(&op) {
            return Err(code);
        }
        if let Some(&code) = state.persistent.get(&(op, channel)) {
            return Err(code);
        }
        state
            .channels
            .get_mut(channel as usize)
            .ok_or(ERR_INVALID_CHANNEL)
    }
}

fn profile_velocity(cycle: u64) -> f64 {
    let phase = cycle % PROFILE_PERIOD;
    let ramp = PROFILE_PERIOD / 4;
    match phase {
        p if p < ramp => PROFILE_PEAK_VELOCITY * p as f64 / ramp as f64,
        p if p < 2 * ramp => PROFILE_PEAK_VELOCITY,
        p if p < 3 * ramp => PROFILE_PEAK_VELOCITY * (3 * ramp - p) as f64 / ramp as f64,
        _ => 0.0,
    }
}

fn synthesize_batch(channel: &mut SimChannel, samples: usize) -> Vec<Vec<AxisFeedback>> {
    let axes = channel.axis_count.unwrap_or(1);
    if channel.position.len() != axes {
        channel.position = vec![0.0; axes];
    }
    let mut entries = Vec::with_capacity(samples);
    for _ in 0..samples {
        let base = profile_velocity(channel.cycle);
        let cycle: Vec<AxisFeedback> = (0..axes)
            .map(|axis| {
                let jitter = (rand::random::<f64>() - 0.5) * 0.01;
                let velocity = base * (axis + 1) as f64 + jitter;
                channel.position[axis] += velocity * CYCLE_TIME_S;
                AxisFeedback {
                    feedback_pos: channel.position[axis],
                    feedback_velocity: velocity,
                }
            })
            .collect();
        entries.push(cycle);
        channel.cycle += 1;
    }
    entries
}

impl MotionLogDevice for SimulatedDevice {
    fn memory_log_status(&self, channel: u8) -> DeviceResult<MemoryLogStatus> {
        let mut state = self.state();
        let ch = Self::enter(&mut state, DeviceOp::Status, channel)?;
        Ok(MemoryLogStatus {
            log_state: ch.log_state,
            buffer_opened: ch.buffer_flag,
        })
    }

    fn open_memory_log_buffer(&self, channel: u8) -> DeviceResult<()> {
        let mut state = self.state();
        let ch = Self::enter(&mut state, DeviceOp::Open, channel)?;
        if ch.open {
            return Err(ERR_BUFFER_ALREADY_OPEN);
        }
        ch.open = true;
        ch.buffer_flag = true;
        ch.axis_count = None;
        Ok(())
    }

    fn set_memory_log(
        &self,
        channel: u8,
        axes: &AxisSelection,
        _options: &MemoryLogOptions,
    ) -> DeviceResult<()> {
        let mut state = self.state();
        let ch = Self::enter(&mut state, DeviceOp::SetLog, channel)?;
        if !ch.open {
            return Err(ERR_BUFFER_NOT_OPEN);
        }
        ch.axis_count = Some(axes.axis_count());
        Ok(())
    }

    fn start_memory_log(&self, channel: u8) -> DeviceResult<()> {
        let mut state = self.state();
        let ch = Self::enter(&mut state, DeviceOp::Start, channel)?;
        if !ch.open {
            return Err(ERR_BUFFER_NOT_OPEN);
        }
        if ch.axis_count.is_none() {
            return Err(ERR_LOG_NOT_CONFIGURED);
        }
        ch.log_state = LogState::Running;
        Ok(())
    }

    fn stop_memory_log(&self, channel: u8) -> DeviceResult<()> {
        let mut state = self.state();
        let ch = Self::enter(&mut state, DeviceOp::Stop, channel)?;
        if ch.log_state == LogState::Running {
            ch.log_state = LogState::Finished;
        }
        Ok(())
    }

    fn close_memory_log_buffer(&self, channel: u8) -> DeviceResult<()> {
        let mut state = self.state();
        let sticky = state.sticky_buffer_flag;
        let ch = Self::enter(&mut state, DeviceOp::Close, channel)?;
        if !ch.open {
            return Err(ERR_BUFFER_NOT_OPEN);
        }
        ch.open = false;
        ch.buffer_flag = sticky;
        ch.log_state = LogState::Idle;
        ch.axis_count = None;
        ch.script.clear();
        Ok(())
    }

    fn memory_log_data(&self, channel: u8) -> DeviceResult<LogBatch> {
        let mut state = self.state();
        let synthesize = state.synthesize;
        let samples = state.samples_per_batch;
        let ch = Self::enter(&mut state, DeviceOp::Data, channel)?;
        if !ch.open {
            return Err(ERR_BUFFER_NOT_OPEN);
        }
        if let Some(batch) = ch.script.pop_front() {
            return Ok(batch);
        }
        if !synthesize || ch.log_state != LogState::Running || samples == 0 {
            return Ok(LogBatch::empty());
        }
        let entries = synthesize_batch(ch, samples);
        state.batches_synthesized += 1;
        let overflow = state.overflow_every > 0
            && state.batches_synthesized % state.overflow_every == 0;
        Ok(LogBatch { overflow, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configure(device: &SimulatedDevice, channel: u8) {
        device.open_memory_log_buffer(channel).unwrap();
        device
            .set_memory_log(channel, &AxisSelection::first(2), &MemoryLogOptions::default())
            .unwrap();
    }

    #[test]
    fn test_lifecycle_state_transitions() {
        let device = SimulatedDevice::scripted(4);
        configure(&device, 3);
        device.start_memory_log(3).unwrap();
        assert_eq!(device.log_state(3), Some(LogState::Running));
        device.stop_memory_log(3).unwrap();
        assert_eq!(device.log_state(3), Some(LogState::Finished));
        device.close_memory_log_buffer(3).unwrap();
        let status = device.memory_log_status(3).unwrap();
        assert_eq!(status.log_state, LogState::Idle);
        assert!(!status.buffer_opened);
    }

    #[test]
    fn test_sticky_buffer_flag_after_close() {
        let device = SimulatedDevice::scripted(4);
        device.set_sticky_buffer_flag(true);
        configure(&device, 2);
        device.close_memory_log_buffer(2).unwrap();
        assert!(!device.is_buffer_open(2));
        assert!(device.memory_log_status(2).unwrap().buffer_opened);
    }

    #[test]
    fn test_start_requires_configuration() {
        let device = SimulatedDevice::scripted(4);
        device.open_memory_log_buffer(1).unwrap();
        assert_eq!(device.start_memory_log(1), Err(ERR_LOG_NOT_CONFIGURED));
    }

    #[test]
    fn test_data_requires_open_buffer() {
        let device = SimulatedDevice::scripted(4);
        assert_eq!(device.memory_log_data(1), Err(ERR_BUFFER_NOT_OPEN));
    }

    #[test]
    fn test_scripted_batches_then_empty() {
        let device = SimulatedDevice::scripted(4);
        configure(&device, 1);
        device.push_batch(1, LogBatch::from_pairs(&[(1.0, 2.0)], true));
        let batch = device.memory_log_data(1).unwrap();
        assert_eq!(batch.count(), 1);
        assert!(batch.overflow);
        assert!(device.memory_log_data(1).unwrap().is_empty());
    }

    #[test]
    fn test_failure_injection() {
        let device = SimulatedDevice::scripted(4);
        device.fail_next(DeviceOp::Open, ErrorCode(0x11010));
        assert_eq!(device.open_memory_log_buffer(1), Err(ErrorCode(0x11010)));
        assert!(device.open_memory_log_buffer(1).is_ok());

        device.fail_on(DeviceOp::Status, 2, ErrorCode(7));
        assert_eq!(device.memory_log_status(2), Err(ErrorCode(7)));
        assert_eq!(device.memory_log_status(2), Err(ErrorCode(7)));
        assert_eq!(device.count_calls(DeviceOp::Status, 2), 2);
    }

    #[test]
    fn test_synthesized_data_follows_selected_axes() {
        let config =
            DeviceConfig { samples_per_batch: 8, overflow_every: 2, ..DeviceConfig::default() };
        let device = SimulatedDevice::from_config(&config);
        configure(&device, 5);
        // Nothing is recorded before the log starts
        assert!(device.memory_log_data(5).unwrap().is_empty());
        device.start_memory_log(5).unwrap();
        let first = device.memory_log_data(5).unwrap();
        assert_eq!(first.count(), 8);
        assert!(first.entries.iter().all(|cycle| cycle.len() == 2));
        assert!(!first.overflow);
        assert!(device.memory_log_data(5).unwrap().overflow);
    }

    #[test]
    fn test_busy_channels_from_config() {
        let config = DeviceConfig { busy_channels: vec![7], ..DeviceConfig::default() };
        let device = SimulatedDevice::from_config(&config);
        let status = device.memory_log_status(7).unwrap();
        assert_eq!(status.log_state, LogState::Running);
        assert!(status.buffer_opened);
    }

    #[test]
    fn test_profile_velocity_shape() {
        assert_eq!(profile_velocity(0), 0.0);
        assert_eq!(profile_velocity(PROFILE_PERIOD / 4), PROFILE_PEAK_VELOCITY);
        assert_eq!(profile_velocity(PROFILE_PERIOD - 1), 0.0);
    }
}
