pub mod human_format;

pub use human_format::{format_duration, format_size};
