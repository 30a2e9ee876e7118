//! Intersection Simulation Library
//!
//! A multi-intersection traffic signal simulation that runs headless and
//! publishes snapshots for whatever front-end wants to draw them.

pub mod simulation;
