//! Minimal ERC-20 ABI surface this crate calls: the read-only accessors used
//! at startup and health-check time, plus the `Transfer` event the scan
//! decodes. Declared inline (no ABI JSON on disk) since only these five
//! members are ever touched.

use alloy_sol_types::sol;

sol! {
    #[sol(rpc)]
    interface IErc20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function name() external view returns (string);
        function balanceOf(address owner) external view returns (uint256);
        event Transfer(address indexed from, address indexed to, uint256 value);
    }
}
