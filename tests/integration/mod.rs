//! Integration tests for the Trest contract-test orchestration engine

mod config_integration;
mod orchestration;
