//! Foundation module - math, time and logging helpers shared by the renderer

pub mod math;
pub mod time;
pub mod logging;
