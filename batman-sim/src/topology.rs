//! Radio topology and link properties. Links are directed so asymmetric
//! reachability (A hears B, B does not hear A) can be modelled; the common
//! helpers install both directions.

use std::time::Duration;

use batman::Address;
use hashbrown::HashMap;

/// Properties of one direction of a radio link.
#[derive(Debug, Clone)]
pub struct Link {
    /// Packet loss rate (0.0 to 1.0).
    pub loss_rate: f64,
    /// Propagation delay.
    pub delay: Duration,
    /// Whether the link currently carries traffic.
    pub active: bool,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay: Duration::from_millis(1),
            active: true,
        }
    }
}

impl Link {
    /// Create a new link with default properties.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the loss rate.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Set the propagation delay.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Network topology defining which nodes hear which.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    /// Directed links, keyed by (sender, receiver).
    links: HashMap<(Address, Address), Link>,
}

impl Topology {
    /// Create an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fully connected topology over the given nodes.
    pub fn fully_connected(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for (i, &a) in nodes.iter().enumerate() {
            for &b in nodes.iter().skip(i + 1) {
                topo.add_link(a, b, Link::default());
            }
        }
        topo
    }

    /// Create a chain topology: each node only hears its direct neighbours
    /// in the slice.
    pub fn chain(nodes: &[Address]) -> Self {
        let mut topo = Self::new();
        for window in nodes.windows(2) {
            topo.add_link(window[0], window[1], Link::default());
        }
        topo
    }

    /// Install a symmetric link between `a` and `b`.
    pub fn add_link(&mut self, a: Address, b: Address, link: Link) {
        self.links.insert((a, b), link.clone());
        self.links.insert((b, a), link);
    }

    /// Install a one way link: `to` hears `from`, not the other way around.
    pub fn add_one_way_link(&mut self, from: Address, to: Address, link: Link) {
        self.links.insert((from, to), link);
    }

    /// Remove the link between `a` and `b` in both directions.
    pub fn remove_link(&mut self, a: Address, b: Address) {
        self.links.remove(&(a, b));
        self.links.remove(&(b, a));
    }

    /// The link carrying traffic from `from` to `to`, if any.
    pub fn link(&self, from: Address, to: Address) -> Option<&Link> {
        self.links.get(&(from, to))
    }

    /// Mutable access to one direction of a link.
    pub fn link_mut(&mut self, from: Address, to: Address) -> Option<&mut Link> {
        self.links.get_mut(&(from, to))
    }

    /// All nodes which hear broadcasts of `from`.
    pub fn receivers(&self, from: Address) -> Vec<Address> {
        let mut receivers: Vec<Address> = self
            .links
            .keys()
            .filter(|(sender, _)| *sender == from)
            .map(|(_, receiver)| *receiver)
            .collect();
        // Deterministic fan-out order regardless of map iteration order.
        receivers.sort();
        receivers
    }
}
