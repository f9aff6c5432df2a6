#![cfg_attr(not(test), no_std)]

pub mod address;
pub mod board;
pub mod config;
pub mod device;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod irq;
pub mod locking;
pub mod logging;
pub mod memory;

#[cfg(test)]
mod testing;
