pub mod point;
pub mod sensor;

pub use point::PointMechanics;
pub use sensor::{SensorEvents, SensorLatch};
