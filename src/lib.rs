//! OCR engine benchmarking and recommendation service.
//!
//! Runs several OCR engines concurrently against the same document,
//! isolates their failures from one another, scores the successful
//! outcomes on accuracy, speed, and cost, and recommends the best
//! engine while streaming live progress to subscribers.

pub mod cli;
pub mod config;
pub mod engine;
pub mod models;
pub mod orchestrator;
pub mod progress;
pub mod repository;
pub mod scoring;
pub mod server;
