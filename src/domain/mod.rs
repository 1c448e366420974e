// Domain layer: core models and ports (interfaces) shared by the scan pipeline and its adapters.

pub mod language;
pub mod model;
pub mod ports;
