//! Registry contract bindings
//!
//! Only the read-only surface discovery needs. The two reputation
//! interfaces are the two deployed revisions of `getSummary`.

use alloy::sol;

sol! {
    #[sol(rpc)]
    interface IIdentityRegistry {
        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);

        function tokenURI(uint256 tokenId) external view returns (string memory);
        function ownerOf(uint256 tokenId) external view returns (address);
    }

    #[sol(rpc)]
    interface ILegacyReputationRegistry {
        function getSummary(
            uint256 agentId,
            address[] calldata clientAddresses,
            bytes32 tag1,
            bytes32 tag2
        ) external view returns (uint64 count, uint8 averageScore);
    }

    #[sol(rpc)]
    interface IReputationRegistry {
        function getSummary(
            uint256 agentId,
            address[] calldata clientAddresses,
            string calldata tag1,
            string calldata tag2
        ) external view returns (uint64 count, int128 summaryValue, uint8 summaryValueDecimals);
    }
}
