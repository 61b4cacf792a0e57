#![cfg_attr(not(test), no_std)]

//! Wake-cycle orchestration for a battery-powered environmental sensor node.
//!
//! Everything here is hardware independent. Board crates implement the
//! collaborator traits (`SensorSource`, `BatteryGauge`, `NetworkTransport`,
//! `DisplayDriver`, `WakeTimer`, `PersistentStore`, `Clock`) and hand them to
//! [`controller::WakeCycleController`].

pub mod battery;
pub mod command;
pub mod config;
pub mod controller;
pub mod crash;
pub mod deadline;
pub mod display;
pub mod network;
pub mod persist;
pub mod publish;
pub mod refresh;
pub mod sensor;
pub mod sleep;
pub mod store;
pub mod wake;
