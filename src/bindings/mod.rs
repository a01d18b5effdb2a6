//! Static call layouts of the contracts this crate reads.

use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(all_derives)]
    interface INodeOperatorsRegistry {
        function getNodeOperatorsCount() external view returns (uint256);

        function getNodeOperator(uint256 _id, bool _fullInfo)
            external
            view
            returns (
                bool active,
                string name,
                address rewardAddress,
                uint64 stakingLimit,
                uint64 stoppedValidators,
                uint64 totalSigningKeys,
                uint64 usedSigningKeys
            );

        function getSigningKey(uint256 _operator_id, uint256 _index)
            external
            view
            returns (bytes key, bytes depositSignature, bool used);
    }

    #[allow(missing_docs)]
    #[sol(all_derives)]
    interface ILido {
        function getWithdrawalCredentials() external view returns (bytes32);
    }

    #[allow(missing_docs)]
    #[sol(all_derives)]
    interface IMulticall {
        struct Call {
            address target;
            bytes callData;
        }

        function aggregate(Call[] calls)
            external
            returns (uint256 blockNumber, bytes[] returnData);
    }
}

/// The same layouts as human-readable signatures, used to check ABI overrides.
pub mod signatures {
    /// `INodeOperatorsRegistry.getNodeOperatorsCount`
    pub const GET_NODE_OPERATORS_COUNT: &str = "getNodeOperatorsCount()(uint256)";
    /// `INodeOperatorsRegistry.getNodeOperator`
    pub const GET_NODE_OPERATOR: &str =
        "getNodeOperator(uint256,bool)(bool,string,address,uint64,uint64,uint64,uint64)";
    /// `INodeOperatorsRegistry.getSigningKey`
    pub const GET_SIGNING_KEY: &str = "getSigningKey(uint256,uint256)(bytes,bytes,bool)";
    /// `IMulticall.aggregate`
    pub const AGGREGATE: &str = "aggregate((address,bytes)[])(uint256,bytes[])";
}
