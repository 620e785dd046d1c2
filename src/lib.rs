//! fibbench - latency benchmark for the fibdrv kernel module
//!
//! This library drives repeated, CPU-pinned runs of the fibdrv client,
//! collects per-offset user and kernel timings into trial × offset matrices,
//! and reduces each offset to a robust mean by discarding samples outside a
//! Student's t confidence band.

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod cpu;
pub mod csv_output;
pub mod json_output;
pub mod matrix;
pub mod mode;
pub mod outlier;
pub mod plot;
pub mod runner;
pub mod sample;
