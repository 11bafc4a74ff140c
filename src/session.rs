// src/session.rs - Start/pause/stop lifecycle of a memory log acquisition session
use std::path::Path;
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

use crate::channel::{ChannelAllocator, ChannelHandle};
use crate::config::AcquisitionConfig;
use crate::device::{AxisSelection, LogState, MemoryLogOptions, MotionLogDevice};
use crate::error::{AcquisitionError, ConfigError, DeviceError, DeviceResultExt, ErrorCode};
use crate::export;
use crate::history::{HistorySummary, Sample, SampleHistory, SharedHistory, lock_history, shared};
use crate::worker::{AcquisitionWorker, WorkerHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    /// Acquisition halted by `pause`; only a new `start` leaves this state
    Paused,
}

/// Owns the active channel, the acquisition thread and the sample history.
///
/// Meant to be driven from a single foreground thread. The history is the
/// only state shared with the acquisition thread.
pub struct SessionController {
    device: Arc<dyn MotionLogDevice>,
    allocator: ChannelAllocator,
    config: AcquisitionConfig,
    active_channel: Option<ChannelHandle>,
    state: SessionState,
    session_id: Option<Uuid>,
    worker: Option<WorkerHandle>,
    history: SharedHistory,
}

impl SessionController {
    /// Fails when `config` does not validate, e.g. a sample axis outside the
    /// selected axes.
    pub fn new(
        device: Arc<dyn MotionLogDevice>,
        config: AcquisitionConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!("Session controller created");
        let allocator = ChannelAllocator::new(Arc::clone(&device), config.max_log_channel);
        let history = shared(SampleHistory::with_chunk_size(config.chunk_size));
        Ok(Self {
            device,
            allocator,
            config,
            active_channel: None,
            state: SessionState::Idle,
            session_id: None,
            worker: None,
            history,
        })
    }

    /// Reserve a channel, start the device log and spawn the acquisition
    /// thread. Any previous session is stopped first.
    ///
    /// Returns `Ok(None)` when no channel could be reserved.
    pub fn start(&mut self) -> Result<Option<ChannelHandle>, AcquisitionError> {
        self.retire_previous_session()?;

        let Some(channel) = self.allocator.reserve_channel()? else {
            tracing::warn!("No memory log channel could be reserved");
            return Ok(None);
        };

        let axes = AxisSelection::first(self.config.axis_count);
        let options = MemoryLogOptions {
            trigger_event_count: self.config.trigger_event_count,
        };
        self.device
            .set_memory_log(channel.id(), &axes, &options)
            .for_operation("SetMemoryLog during startLog")?;
        self.device
            .start_memory_log(channel.id())
            .for_operation("StartMemoryLog during startLog")?;

        // Session state is only replaced once the thread is running
        let history = shared(SampleHistory::with_chunk_size(self.config.chunk_size));
        let worker = AcquisitionWorker::new(Arc::clone(&self.device), channel, Arc::clone(&history))
            .with_axis(self.config.sample_axis as usize)
            .with_idle_poll(self.config.idle_poll())
            .spawn()?;

        self.worker = Some(worker);
        self.history = history;
        self.active_channel = Some(channel);
        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.state = SessionState::Running;
        tracing::info!("Session {} started on memory log channel {}", session_id, channel);
        Ok(Some(channel))
    }

    /// Stop a leftover session before a new one starts: device sequence on
    /// the old channel, then signal and join its thread.
    fn retire_previous_session(&mut self) -> Result<(), AcquisitionError> {
        let Some(mut worker) = self.worker.take() else {
            return Ok(());
        };
        if worker.is_joinable() {
            if let Some(channel) = self.active_channel {
                tracing::info!("Stopping previous session on channel {}", channel);
                self.stop(channel)?;
            }
        }
        worker.stop()
    }

    /// Halt acquisition on `channel` and report what was collected.
    ///
    /// The buffer stays open and the channel stays active. A channel other
    /// than the active one is reported and ignored (`Ok(None)`).
    pub fn pause(
        &mut self,
        channel: ChannelHandle,
    ) -> Result<Option<HistorySummary>, AcquisitionError> {
        if self.active_channel != Some(channel) {
            tracing::error!(
                "Channel {} is not the current channel ({:?}), pause ignored",
                channel,
                self.active_channel.map(ChannelHandle::id)
            );
            return Ok(None);
        }

        if let Some(worker) = &self.worker {
            worker.signal_stop();
        }

        self.device
            .stop_memory_log(channel.id())
            .for_operation("StopMemoryLog in pauseLog()")?;

        thread::sleep(self.config.pause_settle());

        if let Some(mut worker) = self.worker.take() {
            worker.join()?;
        }
        self.state = SessionState::Paused;

        let summary = lock_history(&self.history).summary();
        tracing::info!("{}", summary);
        Ok(Some(summary))
    }

    /// Stop the device log if it is running and close the channel buffer.
    ///
    /// The acquisition thread is neither signaled nor joined here. A failed
    /// status query is reported and yields `Ok(false)`.
    pub fn stop(&mut self, channel: ChannelHandle) -> Result<bool, AcquisitionError> {
        let status = match self
            .device
            .memory_log_status(channel.id())
            .for_operation("GetMemoryLogStatus during stopLog")
        {
            Ok(status) => status,
            Err(_) => return Ok(false),
        };

        if status.log_state == LogState::Running {
            self.device
                .stop_memory_log(channel.id())
                .for_operation("StopMemoryLog during stopLog")?;
        }

        self.device
            .close_memory_log_buffer(channel.id())
            .for_operation("CloseMemoryLogBuffer during stopLog")?;

        self.active_channel = None;
        self.state = SessionState::Idle;
        tracing::info!("Memory log channel {} closed", channel);
        Ok(true)
    }

    pub fn is_available_channel(&self, channel: u8) -> Result<bool, DeviceError> {
        self.allocator.is_available_channel(channel)
    }

    pub fn check_error_code(operation: &str, code: ErrorCode) -> Result<(), DeviceError> {
        crate::error::check_error_code(operation, code)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_channel(&self) -> Option<ChannelHandle> {
        self.active_channel
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    /// True while an acquisition thread exists and has not returned
    pub fn worker_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// True while an acquisition thread handle is held and not yet joined
    pub fn worker_joinable(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerHandle::is_joinable)
    }

    /// True once the current acquisition thread has been told to stop
    pub fn worker_stop_signaled(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerHandle::stop_signaled)
    }

    /// Handle on the current history for readers outside the controller
    pub fn history(&self) -> SharedHistory {
        Arc::clone(&self.history)
    }

    pub fn summary(&self) -> HistorySummary {
        lock_history(&self.history).summary()
    }

    pub fn history_len(&self) -> usize {
        lock_history(&self.history).len()
    }

    pub fn sample(&self, index: usize) -> Sample {
        lock_history(&self.history).get(index)
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        lock_history(&self.history).as_slice().to_vec()
    }

    /// Write the history as plot data; returns the number of rows written
    pub fn export_plot_data(&self, path: impl AsRef<Path>) -> Result<usize, AcquisitionError> {
        export::export_plot_data(&self.history, path.as_ref())
    }
}
