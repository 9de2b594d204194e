pub mod exporter;
pub mod gateway;
