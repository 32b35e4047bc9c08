//! Discrete event simulator for the `batman` routing agent. Virtual clock,
//! seeded randomness and deterministic event ordering make every run
//! reproducible, which is what the protocol level scenario tests build on.

pub use crate::{
    event::{Event, ScheduledEvent, SequenceNumber},
    metrics::SimMetrics,
    node::{SimNode, SimSubstrate},
    sim::Simulator,
    topology::{Link, Topology},
};

mod event;
mod metrics;
mod node;
mod sim;
mod topology;
