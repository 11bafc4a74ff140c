// memlog-rs: memory log feedback acquisition for motion controllers

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod export;
pub mod history;
pub mod session;
pub mod worker;

pub use channel::{ChannelAllocator, ChannelHandle};
pub use config::{AcquisitionConfig, Config, DeviceConfig};
pub use device::{MotionLogDevice, SimulatedDevice};
pub use error::{
    AcquisitionError, ConfigError, DeviceError, ErrorCode, ErrorKind, check_error_code, classify,
};
pub use history::{HistorySummary, Sample, SampleHistory};
pub use session::{SessionController, SessionState};
pub use worker::{AcquisitionWorker, WorkerHandle};
