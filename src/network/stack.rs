use super::{AddressAllocator, AddressBlock, AddressTable, NodeSet, WifiConfig, WifiDevice, WirelessChannel};
use crate::error::{ScenarioError, ScenarioResult};
use crate::routing::RoutingConfiguration;
use std::sync::Arc;
use tracing::{debug, info};

/// What the rest of the run needs once every node is installed and addressed.
#[derive(Debug, Clone)]
pub struct InstalledNetwork {
    pub routing: Arc<RoutingConfiguration>,
    pub addresses: AddressTable,
    pub channel: WirelessChannel,
    pub wifi: WifiConfig,
}

/// Attaches an ad-hoc interface and the routing configuration to every node, then
/// addresses the interfaces from `block` in node id order.
///
/// Every check happens before the first node is touched, so a failure leaves
/// `nodes` exactly as it was.
pub fn install_stack(
    nodes: &mut NodeSet,
    routing: RoutingConfiguration,
    block: AddressBlock,
    wifi: &WifiConfig,
) -> ScenarioResult<InstalledNetwork> {
    routing.validate()?;

    let requested = nodes.len() as u32;
    if requested > block.capacity() {
        return Err(ScenarioError::AddressExhausted {
            block: block.to_string(),
            capacity: block.capacity(),
            requested,
        });
    }

    let routing = Arc::new(routing);
    let mut allocator = AddressAllocator::new(block);
    let mut addresses = AddressTable::new(block);

    let mut ids: Vec<_> = nodes.ids().collect();
    ids.sort();

    for id in ids {
        let address = allocator.allocate()?;
        let Some(node) = nodes.get_mut(id) else {
            continue;
        };
        node.attach_stack(WifiDevice::adhoc(id, wifi), routing.clone());
        node.assign_address(address);
        addresses.insert(id, address);
        debug!("Node {} -> {} ({})", id, address, routing.describe());
    }

    let channel = WirelessChannel::new(nodes, wifi);

    info!(
        "Installed {} ad-hoc interfaces on {} with routing [{}]",
        addresses.len(),
        block,
        routing.describe()
    );

    Ok(InstalledNetwork {
        routing,
        addresses,
        channel,
        wifi: wifi.clone(),
    })
}
