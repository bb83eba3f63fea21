//! # Sensor Network Model
//!
//! Clean DTOs shared by the registry, the node engine and the clients.
//! These types cross every boundary, including the wire.
//!
//! Design rule: this module is pure data. No I/O, no state, no async.

pub mod position;
pub mod value;
pub mod sensor;
pub mod descriptor;

pub use position::{Position, Direction, DirectionSet};
pub use value::SensorValue;
pub use sensor::SensorData;
pub use descriptor::{NodeDescriptor, EndpointDescriptor, ConnectionInfo};
