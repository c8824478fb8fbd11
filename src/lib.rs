//! Demand-driven ventilation control for a central fan with per-room valves.
//!
//! Each cycle reads humidity, CO2 and occupancy from the home automation hub,
//! scores every room's demand, sets the fan from the summed demand and opens
//! valves in proportion to the neediest room.

pub mod config;
pub mod controller;
pub mod domain;
pub mod hardware;
pub mod telemetry;
