use std::str::FromStr;

use bitcoin::{Address, Network, address::NetworkUnchecked};
use types::errors::NodeError;

/// Parses `address` and checks that it belongs to `network`.
pub fn parse_address(address: &str, network: Network) -> Result<Address, NodeError> {
    let unchecked = Address::<NetworkUnchecked>::from_str(address.trim())
        .map_err(|e| NodeError::InvalidAddress(format!("{address}: {e}")))?;

    unchecked
        .require_network(network)
        .map_err(|_| NodeError::InvalidAddress(format!("{address} is not a {network} address")))
}

#[must_use]
pub fn is_valid_address(address: &str, network: Network) -> bool {
    parse_address(address, network).is_ok()
}
