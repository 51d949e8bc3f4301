//! Scenario and property tests across the whole engine

mod common;
mod scenarios;
