//! Per-network USDT contract addresses and chain parameters.

use crate::config::Network;

/// Chain parameters relevant to confirmation depth, gas sanity, and the
/// block-time sampler's fallback.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig {
    pub display_name: &'static str,
    pub chain_id: u64,
    pub block_time_secs: u64,
    pub confirmations_required: u64,
    pub max_gas_price_gwei: u64,
    pub contract_address: &'static str,
}

/// Resolve the fixed parameters for `network`. Goerli is rejected earlier,
/// in [`Network::from_str`](crate::config::Network), and has no entry here.
#[must_use]
pub const fn config_for(network: Network) -> NetworkConfig {
    match network {
        Network::Mainnet => NetworkConfig {
            display_name: "Ethereum Mainnet",
            chain_id: 1,
            block_time_secs: 12,
            confirmations_required: 24,
            max_gas_price_gwei: 100,
            contract_address: "0xdAC17F958D2ee523a2206206994597C13D831ec7",
        },
        Network::Sepolia => NetworkConfig {
            display_name: "Sepolia Testnet",
            chain_id: 11_155_111,
            block_time_secs: 12,
            confirmations_required: 6,
            max_gas_price_gwei: 50,
            contract_address: "0x7169D38820dfd117C3FA1f22a697dBA58d90BA06",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mainnet_and_sepolia_have_distinct_contracts() {
        let mainnet = config_for(Network::Mainnet);
        let sepolia = config_for(Network::Sepolia);
        assert_ne!(mainnet.contract_address, sepolia.contract_address);
        assert_eq!(mainnet.chain_id, 1);
        assert_eq!(sepolia.chain_id, 11_155_111);
    }
}
