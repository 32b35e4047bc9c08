//! Node addresses on the mesh.
//!
//! The protocol identifies nodes by a 32-bit network address. Two values are
//! reserved: all zeroes means "no address" and all ones is the limited
//! broadcast address. Every node has exactly one main address, fixed at
//! startup.

use core::fmt;
use std::net::Ipv4Addr;

/// A 32-bit network address identifying a node (or a network, in host network
/// announcements).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u32);

impl Address {
    /// The "no address" sentinel.
    pub const UNSPECIFIED: Address = Address(0);

    /// The limited broadcast address.
    pub const BROADCAST: Address = Address(u32::MAX);

    /// Create a new `Address` from its raw numeric value.
    pub const fn new(raw: u32) -> Self {
        Address(raw)
    }

    /// Checks if this is the "no address" sentinel.
    pub const fn is_unspecified(&self) -> bool {
        self.0 == 0
    }

    /// Checks if this is the limited broadcast address.
    pub const fn is_broadcast(&self) -> bool {
        self.0 == u32::MAX
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Ipv4Addr::from(self.0).fmt(f)
    }
}

impl From<u32> for Address {
    fn from(value: u32) -> Self {
        Address(value)
    }
}

impl From<Address> for u32 {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl From<Ipv4Addr> for Address {
    fn from(value: Ipv4Addr) -> Self {
        Address(value.into())
    }
}

impl From<Address> for Ipv4Addr {
    fn from(value: Address) -> Self {
        Ipv4Addr::from(value.0)
    }
}
