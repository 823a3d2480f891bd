//! FOTA - Firmware-over-the-air update service
//! Device registry, firmware store and update decision protocol

pub mod engine;
