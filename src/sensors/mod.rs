//! Sensor module - motion sources, simulation and the live feed

mod feed;
mod simulator;
mod traits;
mod window;

pub use feed::SensorFeed;
pub use simulator::{MotionSimulator, FALL_SEQUENCE};
pub use traits::{Axis3, FallStep, MotionReading, MotionSensor, SensorKind, SensorStatus, STANDARD_GRAVITY};
pub use window::SampleWindow;
