//! Discrete event simulator driving a mesh of routing agents.
//!
//! Time only advances when an event is due, and same-time events run in
//! insertion order, so a run is fully determined by the topology, the agent
//! configs and the seed.

use std::collections::BinaryHeap;
use std::time::Duration;

use batman::{Address, Config, ConfigError, Timestamp};
use hashbrown::HashMap;

use crate::event::{Event, ScheduledEvent, SequenceNumber};
use crate::metrics::SimMetrics;
use crate::node::SimNode;
use crate::topology::Topology;

/// Discrete event simulator for a mesh of routing agents.
pub struct Simulator {
    /// All nodes in the simulation, keyed by main address.
    nodes: HashMap<Address, SimNode>,
    /// Radio topology.
    topology: Topology,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// RNG state for link loss decisions.
    rng_state: u64,
    /// Collected counters.
    metrics: SimMetrics,
}

impl Simulator {
    /// Create a new simulator with the given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            topology: Topology::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            next_seq: 0,
            rng_state: seed,
            metrics: SimMetrics::default(),
        }
    }

    /// Set the radio topology. Should be done before nodes start talking.
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Mutable access to the topology, for mid-run scenario changes.
    pub fn topology_mut(&mut self) -> &mut Topology {
        &mut self.topology
    }

    /// Add a node to the simulation and start its agent at the current
    /// simulation time. The node's random source is derived from the
    /// simulator seed and the node address, so runs stay reproducible.
    pub fn add_node(&mut self, config: Config) -> Result<Address, ConfigError> {
        let address = config.address;
        let seed = self
            .rng_state
            .wrapping_mul(0x9e3779b97f4a7c15)
            .wrapping_add(u64::from(u32::from(address)));
        let mut node = SimNode::new(config, seed)?;
        node.start(self.current_time);

        self.nodes.insert(address, node);
        self.collect_outputs(address);
        Ok(address)
    }

    /// Get a reference to a node.
    pub fn node(&self, address: &Address) -> Option<&SimNode> {
        self.nodes.get(address)
    }

    /// The current simulation time.
    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    /// Collected traffic counters.
    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Run the simulation until the given time, inclusive.
    pub fn run_until(&mut self, end_time: Timestamp) {
        while let Some(event) = self.event_queue.peek() {
            if event.time > end_time {
                break;
            }

            let event = self
                .event_queue
                .pop()
                .expect("peek just returned an event; qed");
            if event.time > self.current_time {
                self.current_time = event.time;
            }
            self.process_event(event.event);
        }

        // Advance to end_time even if no more events are due.
        if end_time > self.current_time {
            self.current_time = end_time;
        }
    }

    /// Run the simulation for the given duration.
    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(self.current_time + duration);
    }

    /// Schedule an event at the given time.
    fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    /// Process a single event.
    fn process_event(&mut self, event: Event) {
        match event {
            Event::Datagram { to, from, payload } => {
                let now = self.current_time;
                if let Some(node) = self.nodes.get_mut(&to) {
                    node.handle_datagram(from, &payload, now);
                    self.metrics.datagrams_delivered += 1;
                }
                self.collect_outputs(to);
            }
            Event::Timer { node, timer } => {
                let now = self.current_time;
                if let Some(sim_node) = self.nodes.get_mut(&node) {
                    sim_node.handle_timer(timer, now);
                }
                self.collect_outputs(node);
            }
        }
    }

    /// Drain the broadcasts and timer registrations a node queued during its
    /// last handler invocation, and turn them into future events.
    fn collect_outputs(&mut self, address: Address) {
        let Some(node) = self.nodes.get_mut(&address) else {
            return;
        };
        let broadcasts = node.take_broadcasts();
        let scheduled = node.take_scheduled();

        for (delay, timer) in scheduled {
            let time = self.current_time + delay;
            self.schedule(
                time,
                Event::Timer {
                    node: address,
                    timer,
                },
            );
        }

        for payload in broadcasts {
            self.route_broadcast(address, payload);
        }
    }

    /// Fan a broadcast out to every node hearing the sender.
    fn route_broadcast(&mut self, sender: Address, payload: Vec<u8>) {
        self.metrics.datagrams_sent += 1;

        for receiver in self.topology.receivers(sender) {
            let Some(link) = self.topology.link(sender, receiver) else {
                continue;
            };
            if !link.active {
                continue;
            }

            let loss_rate = link.loss_rate;
            let delay = link.delay;

            if loss_rate > 0.0 && self.random_f64() < loss_rate {
                self.metrics.datagrams_dropped += 1;
                continue;
            }

            let delivery_time = self.current_time + delay;
            self.schedule(
                delivery_time,
                Event::Datagram {
                    to: receiver,
                    from: sender,
                    payload: payload.clone(),
                },
            );
        }
    }

    /// Generate a random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use batman::{Address, Config, Timestamp};

    use super::Simulator;
    use crate::topology::Topology;

    fn quiet_config(address: Address) -> Config {
        let mut config = Config::new(address);
        config.ogm_interval_jitter = Duration::ZERO;
        config
    }

    #[test]
    fn simulator_starts_empty() {
        let sim = Simulator::new(42);
        assert_eq!(sim.current_time(), Timestamp::ZERO);
        assert_eq!(sim.metrics().datagrams_sent, 0);
    }

    #[test]
    fn single_node_emits_on_schedule() {
        let mut sim = Simulator::new(42);
        let addr = Address::new(0x0a000001);
        sim.add_node(quiet_config(addr)).expect("config is valid");

        sim.run_for(Duration::from_secs(10));

        // One emission per second, nobody listening.
        assert_eq!(sim.metrics().datagrams_sent, 10);
        assert_eq!(sim.metrics().datagrams_delivered, 0);
    }

    #[test]
    fn connected_nodes_deliver_datagrams() {
        let a = Address::new(0x0a000001);
        let b = Address::new(0x0a000002);

        let mut sim = Simulator::new(42).with_topology(Topology::fully_connected(&[a, b]));
        sim.add_node(quiet_config(a)).expect("config is valid");
        sim.add_node(quiet_config(b)).expect("config is valid");

        sim.run_for(Duration::from_secs(5));

        assert!(sim.metrics().datagrams_delivered > 0);
    }

    #[test]
    fn identical_seeds_reproduce_runs() {
        let a = Address::new(0x0a000001);
        let b = Address::new(0x0a000002);

        let run = |seed: u64| {
            let mut topo = Topology::new();
            topo.add_link(a, b, crate::topology::Link::new().with_loss_rate(0.3));
            let mut sim = Simulator::new(seed).with_topology(topo);
            sim.add_node(quiet_config(a)).expect("config is valid");
            sim.add_node(quiet_config(b)).expect("config is valid");
            sim.run_for(Duration::from_secs(60));
            (
                sim.metrics().datagrams_delivered,
                sim.metrics().datagrams_dropped,
            )
        };

        assert_eq!(run(7), run(7));
    }
}
