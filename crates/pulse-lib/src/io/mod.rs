//! Reading recorded sample streams from text.

pub mod text;

pub use text::{parse_samples, read_samples, SampleColumn};
