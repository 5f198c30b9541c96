// src/handlers/mod.rs
pub mod batch;
pub mod cache;
pub mod error;
pub mod pe_ratios;
pub mod valuation;
