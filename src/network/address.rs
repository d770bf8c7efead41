use super::NodeId;
use crate::error::{ScenarioError, ScenarioResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::net::Ipv4Addr;
use std::str::FromStr;

/// A contiguous IPv4 block in CIDR notation, e.g. `192.168.0.0/24`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressBlock {
    network: Ipv4Addr,
    prefix: u8,
}

impl AddressBlock {
    pub fn new(base: Ipv4Addr, prefix: u8) -> ScenarioResult<Self> {
        // /31 and /32 leave no room for both a network and a broadcast address
        if prefix == 0 || prefix > 30 {
            return Err(ScenarioError::InvalidAddressBlock(format!("{base}/{prefix}")));
        }
        let mask = u32::MAX << (32 - prefix);
        Ok(Self {
            network: Ipv4Addr::from_bits(base.to_bits() & mask),
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn netmask(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(u32::MAX << (32 - self.prefix))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from_bits(self.network.to_bits() | !self.netmask().to_bits())
    }

    /// Usable host addresses, network and broadcast excluded.
    pub fn capacity(&self) -> u32 {
        (1u32 << (32 - self.prefix)) - 2
    }

    pub fn host(&self, index: u32) -> Option<Ipv4Addr> {
        (index < self.capacity()).then(|| Ipv4Addr::from_bits(self.network.to_bits() + 1 + index))
    }

    pub fn contains(&self, address: Ipv4Addr) -> bool {
        address.to_bits() & self.netmask().to_bits() == self.network.to_bits()
    }
}

impl Default for AddressBlock {
    fn default() -> Self {
        Self {
            network: Ipv4Addr::new(192, 168, 0, 0),
            prefix: 24,
        }
    }
}

impl Display for AddressBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl FromStr for AddressBlock {
    type Err = ScenarioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScenarioError::InvalidAddressBlock(s.to_string());
        let mut parts = s.trim().split('/');

        let base: Ipv4Addr = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        let prefix: u8 = parts
            .next()
            .ok_or_else(invalid)?
            .parse()
            .map_err(|_| invalid())?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        Self::new(base, prefix)
    }
}

impl TryFrom<String> for AddressBlock {
    type Error = ScenarioError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AddressBlock> for String {
    fn from(block: AddressBlock) -> Self {
        block.to_string()
    }
}

/// Hands out host addresses from a block in order, starting at `.1`.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    block: AddressBlock,
    next: u32,
}

impl AddressAllocator {
    pub fn new(block: AddressBlock) -> Self {
        Self { block, next: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.block.capacity() - self.next
    }

    pub fn allocate(&mut self) -> ScenarioResult<Ipv4Addr> {
        let address = self.block.host(self.next).ok_or(ScenarioError::AddressExhausted {
            block: self.block.to_string(),
            capacity: self.block.capacity(),
            requested: self.next + 1,
        })?;
        self.next += 1;
        Ok(address)
    }
}

/// Address to node lookups, frozen once every interface is addressed.
#[derive(Debug, Clone)]
pub struct AddressTable {
    block: AddressBlock,
    by_address: BTreeMap<Ipv4Addr, NodeId>,
    by_node: BTreeMap<NodeId, Ipv4Addr>,
}

impl AddressTable {
    pub(crate) fn new(block: AddressBlock) -> Self {
        Self {
            block,
            by_address: BTreeMap::new(),
            by_node: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, node: NodeId, address: Ipv4Addr) {
        self.by_address.insert(address, node);
        self.by_node.insert(node, address);
    }

    pub fn block(&self) -> &AddressBlock {
        &self.block
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.block.broadcast()
    }

    pub fn node_for(&self, address: Ipv4Addr) -> Option<NodeId> {
        self.by_address.get(&address).copied()
    }

    pub fn address_of(&self, node: NodeId) -> Option<Ipv4Addr> {
        self.by_node.get(&node).copied()
    }

    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cidr_and_masks_host_bits() {
        let block: AddressBlock = "192.168.0.77/24".parse().unwrap();
        assert_eq!(block.network(), Ipv4Addr::new(192, 168, 0, 0));
        assert_eq!(block.broadcast(), Ipv4Addr::new(192, 168, 0, 255));
        assert_eq!(block.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(block.capacity(), 254);
    }

    #[test]
    fn rejects_malformed_blocks() {
        for input in ["", "192.168.0.0", "192.168.0.0/0", "192.168.0.0/31", "10.0.0.0/8/1", "nope/24"] {
            assert!(input.parse::<AddressBlock>().is_err(), "{input} should not parse");
        }
    }

    #[test]
    fn allocator_starts_at_first_host_and_exhausts() {
        let mut alloc = AddressAllocator::new("10.1.1.0/30".parse().unwrap());
        assert_eq!(alloc.allocate().unwrap(), Ipv4Addr::new(10, 1, 1, 1));
        assert_eq!(alloc.allocate().unwrap(), Ipv4Addr::new(10, 1, 1, 2));
        assert_eq!(alloc.remaining(), 0);
        assert!(matches!(
            alloc.allocate(),
            Err(ScenarioError::AddressExhausted { capacity: 2, requested: 3, .. })
        ));
    }

    #[test]
    fn serde_uses_cidr_strings() {
        let block: AddressBlock = serde_json::from_str("\"10.0.0.0/16\"").unwrap();
        assert_eq!(block.capacity(), 65534);
        assert_eq!(serde_json::to_string(&block).unwrap(), "\"10.0.0.0/16\"");
    }
}
