// src/worker.rs - Background thread draining the device memory log into the history
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::channel::ChannelHandle;
use crate::device::MotionLogDevice;
use crate::error::{AcquisitionError, DeviceResultExt};
use crate::history::{SharedHistory, lock_history};

/// Everything the acquisition thread needs for one session
pub struct AcquisitionWorker {
    device: Arc<dyn MotionLogDevice>,
    channel: ChannelHandle,
    axis: usize,
    idle_poll: Duration,
    history: SharedHistory,
    stop: Arc<AtomicBool>,
}

/// Control side of a running acquisition thread
#[derive(Debug)]
pub struct WorkerHandle {
    channel: ChannelHandle,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl AcquisitionWorker {
    pub fn new(
        device: Arc<dyn MotionLogDevice>,
        channel: ChannelHandle,
        history: SharedHistory,
    ) -> Self {
        Self {
            device,
            channel,
            axis: 0,
            idle_poll: Duration::from_millis(1),
            history,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_axis(mut self, axis: usize) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Start the thread. The stop flag starts cleared.
    pub fn spawn(self) -> Result<WorkerHandle, AcquisitionError> {
        let channel = self.channel;
        let stop = Arc::clone(&self.stop);
        stop.store(false, Ordering::Relaxed);

        let thread = thread::Builder::new()
            .name(format!("memlog-ch{}", channel))
            .spawn(move || self.run())
            .map_err(AcquisitionError::WorkerSpawn)?;

        tracing::debug!("Memory log thread spawned for channel {}", channel);
        Ok(WorkerHandle {
            channel,
            stop,
            thread: Some(thread),
        })
    }

    /// Poll until the stop flag is observed at the top of an iteration, or a
    /// device call fails. A failure ends the thread; it is never retried.
    fn run(self) {
        let mut polls: u64 = 0;
        while !self.stop.load(Ordering::Relaxed) {
            match collect_log_data(self.device.as_ref(), self.channel, self.axis, &self.history) {
                Ok(0) => thread::sleep(self.idle_poll),
                Ok(count) => {
                    tracing::trace!("Collected {} samples from channel {}", count, self.channel);
                }
                Err(e) => {
                    tracing::error!(
                        "Memory log thread for channel {} aborted: {}",
                        self.channel,
                        e
                    );
                    break;
                }
            }
            polls += 1;
        }
        tracing::info!(
            "Memory log thread for channel {} stopped after {} polls",
            self.channel,
            polls
        );
    }
}

/// Fetch one batch from the device and append the selected axis to the
/// history. The history lock is taken only after the device call returns.
///
/// A cycle without feedback for `axis` rejects the whole batch, leaving the
/// history untouched.
pub fn collect_log_data(
    device: &dyn MotionLogDevice,
    channel: ChannelHandle,
    axis: usize,
    history: &SharedHistory,
) -> Result<usize, AcquisitionError> {
    let batch = device
        .memory_log_data(channel.id())
        .for_operation("collectLogData")?;

    if batch.is_empty() && !batch.overflow {
        return Ok(0);
    }

    let feedback = batch
        .entries
        .iter()
        .enumerate()
        .map(|(cycle, axes)| {
            axes.get(axis).copied().ok_or(AcquisitionError::MissingAxis {
                channel: channel.id(),
                cycle,
                axis,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut history = lock_history(history);
    if batch.overflow {
        history.mark_overflow();
    }
    for sample in &feedback {
        history.append(sample.feedback_pos, sample.feedback_velocity);
    }
    Ok(feedback.len())
}

impl WorkerHandle {
    pub fn channel(&self) -> ChannelHandle {
        self.channel
    }

    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_signaled(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// True until the thread has been joined
    pub fn is_joinable(&self) -> bool {
        self.thread.is_some()
    }

    /// True once the thread body has returned, joined or not
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// Block until the thread exits. There is no timeout.
    pub fn join(&mut self) -> Result<(), AcquisitionError> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| AcquisitionError::WorkerPanicked),
            None => Ok(()),
        }
    }

    pub fn stop(&mut self) -> Result<(), AcquisitionError> {
        self.signal_stop();
        self.join()
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            let _ = self.stop();
        }
    }
}
