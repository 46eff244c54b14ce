//! Contract interfaces used by the tools: the ERC20 subset and the swap router.

use alloy::{
    primitives::{Address, Bytes, U256},
    sol,
    sol_types::SolCall,
};

use crate::gateway::{CallRequest, ChainError, ChainGateway};

sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function transfer(address recipient, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
        function allowance(address owner, address spender) external view returns (uint256);
    }

    interface IRouter {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}

pub fn transfer_calldata(recipient: Address, amount: U256) -> Bytes {
    IERC20::transferCall { recipient, amount }.abi_encode().into()
}

pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

pub fn swap_calldata(
    amount_in: U256,
    amount_out_min: U256,
    path: Vec<Address>,
    to: Address,
    deadline: U256,
) -> Bytes {
    IRouter::swapExactTokensForTokensCall {
        amountIn: amount_in,
        amountOutMin: amount_out_min,
        path,
        to,
        deadline,
    }
    .abi_encode()
    .into()
}

/// ERC20 `balanceOf(owner)` on `token`
pub async fn token_balance(
    gateway: &dyn ChainGateway,
    token: Address,
    owner: Address,
) -> Result<U256, ChainError> {
    let data = gateway
        .call(CallRequest {
            to: token,
            input: IERC20::balanceOfCall { owner }.abi_encode().into(),
            ..Default::default()
        })
        .await?;
    IERC20::balanceOfCall::abi_decode_returns(&data).map_err(|err| ChainError::Rpc {
        op: "balanceOf",
        error: err.to_string(),
    })
}

/// ERC20 `allowance(owner, spender)` on `token`
pub async fn allowance(
    gateway: &dyn ChainGateway,
    token: Address,
    owner: Address,
    spender: Address,
) -> Result<U256, ChainError> {
    let data = gateway
        .call(CallRequest {
            to: token,
            input: IERC20::allowanceCall { owner, spender }.abi_encode().into(),
            ..Default::default()
        })
        .await?;
    IERC20::allowanceCall::abi_decode_returns(&data).map_err(|err| ChainError::Rpc {
        op: "allowance",
        error: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calldata_selectors() {
        let data = transfer_calldata(Address::ZERO, U256::from(1u64));
        // transfer(address,uint256)
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(data.len(), 4 + 32 * 2);

        let data = approve_calldata(Address::ZERO, U256::from(1u64));
        // approve(address,uint256)
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);

        let data = swap_calldata(
            U256::from(1u64),
            U256::from(1000u64),
            vec![Address::ZERO, Address::ZERO],
            Address::ZERO,
            U256::from(600u64),
        );
        // swapExactTokensForTokens(uint256,uint256,address[],address,uint256)
        assert_eq!(&data[..4], &[0x38, 0xed, 0x17, 0x39]);
    }
}
