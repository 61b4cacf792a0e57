#![no_std]

//! ESP32-S3 board support for the envnode wake cycle: storage backends, the
//! MQTT transport over Wi-Fi, the e-paper panel and platform glue.

pub mod network;
pub mod platform;
pub mod storage;
