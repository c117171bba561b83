//! Cut a continuous stream of radio IQ samples into discrete bursts and
//! persist each one.
//!
//! The detection core is [`segment::segment`], a pure function over one chunk
//! plus the state carried from the previous one, wrapped by
//! [`assembler::BurstAssembler`]. [`pipeline::Pipeline`] runs it between a
//! [`radio::Radio`] and a [`storage::CaptureStore`] on three threads joined by
//! bounded queues.

pub mod assembler;
pub mod capture;
pub mod chunk;
pub mod complex;
pub mod config;
pub mod detect;
pub mod error;
pub mod exfil;
#[cfg(feature = "storage_hdf5")]
pub mod hdf5_store;
pub mod message;
pub mod monitoring;
pub mod pipeline;
pub mod radio;
pub mod segment;
pub mod storage;

pub use complex::Sample;
pub use error::{Error, Result};
