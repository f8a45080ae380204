// Domain layer: record model and ports (interfaces). No network or parsing code here.

pub mod model;
pub mod ports;
