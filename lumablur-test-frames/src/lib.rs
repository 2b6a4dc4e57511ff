pub mod frames;
pub mod scenarios;

pub use frames::{channel_sum, max_channel_difference, pixel_at, TestFrame};
