pub mod humanize;
pub mod input;
pub mod jitter;
