//! Generated call bindings for the token and linker contracts
//!
//! Only the calls the orchestration issues are bound; everything else the
//! deployed contracts expose is out of scope here.

use ethers::prelude::abigen;

abigen!(
    CrossChainToken,
    r#"[
        function mint(address account, uint256 amount)
        function balanceOf(address account) external view returns (uint256)
        function increaseAllowance(address spender, uint256 addedValue) external returns (bool)
        function grantRole(bytes32 role, address account)
    ]"#
);

abigen!(
    TokenLinker,
    r#"[
        function addLinkers(address[] linkers, string[] names)
        function sendToken(string destinationChain, address to, uint256 amount) external payable
    ]"#
);
