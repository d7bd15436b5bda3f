// Domain layer: row/result models, ports, and the pure phone/fax services.

pub mod model;
pub mod ports;

pub mod services;
