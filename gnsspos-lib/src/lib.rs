#![doc = include_str!("../README.md")]

mod error;

pub mod aggregate;
pub mod geodesy;
pub mod gpstime;
pub mod occupation;
pub mod pos;
pub mod timescale;

pub use error::{Error, Result};
