//! Broker runtime for the controller (requires the `mqtt` feature).
//!
//! - `mqtt`: `rumqttc` client adapter and event pump
//! - `runner`: the single-consumer event loop that owns the controller
//!
//! ```ignore
//! let (client, eventloop) = connect(&config.mqtt);
//! let (tx, rx) = mpsc::channel(64);
//! tokio::spawn(pump_events(eventloop, tx.clone()));
//! spawn_ticker(tx, config.control.tick_ms);
//! run(Runner::new(config, client, SystemClock::new()), rx, shutdown).await;
//! ```

pub mod mqtt;
pub mod runner;

pub use mqtt::*;
pub use runner::*;
