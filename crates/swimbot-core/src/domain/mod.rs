//! Domain types describing the robot, independent of any wire format.

pub mod robot;

pub use robot::*;
