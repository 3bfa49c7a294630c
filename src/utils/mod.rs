//! Utility helpers: math extensions, allocators, logging, profiling.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod profiling;

pub use allocator::{Arena, Id};
pub use math::{Aabb, Mat3, Quat, Real, Transform, Vec3};
pub use profiling::StepProfiler;
