//! Simulated node: a [`Router`] driven through a queueing substrate whose
//! outputs the simulator collects after every handler invocation.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use batman::{Address, Config, ConfigError, NoMetrics, Router, Substrate, Timer, Timestamp};

/// Shared host side state of a simulated node. The simulator advances the
/// clock and drains the queues, the agent fills them.
#[derive(Default)]
struct HostState {
    now: Timestamp,
    broadcasts: Vec<Vec<u8>>,
    scheduled: Vec<(Duration, Timer)>,
    rng_state: u64,
}

impl HostState {
    /// Generate a random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state >> 11) as f64 / (1u64 << 53) as f64
    }
}

/// Substrate implementation backed by the shared [`HostState`]. The
/// simulation is single threaded, so plain shared mutability does the job.
pub struct SimSubstrate {
    host: Rc<RefCell<HostState>>,
}

impl Substrate for SimSubstrate {
    fn now(&self) -> Timestamp {
        self.host.borrow().now
    }

    fn broadcast(&mut self, payload: Vec<u8>) {
        self.host.borrow_mut().broadcasts.push(payload);
    }

    fn schedule_after(&mut self, delay: Duration, timer: Timer) {
        self.host.borrow_mut().scheduled.push((delay, timer));
    }

    fn random_uniform(&mut self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + self.host.borrow_mut().random_f64() * (high - low)
    }
}

/// A node in the simulation, wrapping a routing agent.
pub struct SimNode {
    address: Address,
    router: Router<SimSubstrate, NoMetrics>,
    host: Rc<RefCell<HostState>>,
}

impl SimNode {
    /// Create a new `SimNode` from an agent config and a seed for its random
    /// source.
    pub fn new(config: Config, seed: u64) -> Result<Self, ConfigError> {
        let address = config.address;
        let host = Rc::new(RefCell::new(HostState {
            rng_state: seed,
            ..HostState::default()
        }));
        let router = Router::new(
            config,
            SimSubstrate { host: host.clone() },
            NoMetrics,
        )?;
        Ok(Self {
            address,
            router,
            host,
        })
    }

    /// The main address of the simulated node.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Read access to the wrapped agent, for assertions on its routing
    /// state.
    pub fn router(&self) -> &Router<SimSubstrate, NoMetrics> {
        &self.router
    }

    /// Start the agent at the given simulation time.
    pub fn start(&mut self, now: Timestamp) {
        self.host.borrow_mut().now = now;
        self.router.start();
    }

    /// Deliver a broadcast datagram at the given simulation time.
    pub fn handle_datagram(&mut self, src: Address, payload: &[u8], now: Timestamp) {
        self.host.borrow_mut().now = now;
        self.router.handle_datagram(src, payload);
    }

    /// Deliver a due agent timer at the given simulation time.
    pub fn handle_timer(&mut self, timer: Timer, now: Timestamp) {
        self.host.borrow_mut().now = now;
        self.router.handle_timer(timer);
    }

    /// Take all broadcasts queued by the agent since the last call.
    pub fn take_broadcasts(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.host.borrow_mut().broadcasts)
    }

    /// Take all timer registrations queued by the agent since the last call.
    pub fn take_scheduled(&mut self) -> Vec<(Duration, Timer)> {
        std::mem::take(&mut self.host.borrow_mut().scheduled)
    }
}
