//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod meter;
pub mod output;
pub mod pcm;
pub mod playback;
pub mod resample;
pub mod types;

pub use buffer::{ReorderBuffer, ReorderStats, SubmitOutcome};
pub use capture::{frame_size_for, FrameAccumulator, MicCapture};
pub use device::{list_devices, get_device_by_id, AudioDevice, AudioDeviceInfo};
pub use meter::InputLevel;
pub use output::CpalTimeline;
pub use pcm::{encode_base64, encode_pcm16, encode_pcm16_base64};
pub use playback::{OutputTimeline, PlaybackScheduler, ScheduleHandle, VirtualTimeline};
pub use resample::{resample_linear, StreamResampler};
pub use types::{CaptureFrame, DecodedBuffer};
