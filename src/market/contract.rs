//! ABI bindings for the destination market contract and ERC20 tokens.

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use super::types::Side;
use crate::error::ChainError;

sol! {
    /// Minimal ERC20 surface used by the orchestrator.
    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
        function balanceOf(address account) external view returns (uint256);
    }

    /// Destination prediction market.
    interface IPredictionMarket {
        function buyFor(uint256 amount, bool buyYes, address recipient) external;
        function sell(uint256 amount, bool sellYes) external;
        function yesToken() external view returns (address);
        function noToken() external view returns (address);
    }
}

/// Calldata for `approve(spender, amount)`.
pub fn approve_calldata(spender: Address, amount: U256) -> Bytes {
    IERC20::approveCall { spender, amount }.abi_encode().into()
}

/// Calldata for `balanceOf(account)`.
pub fn balance_of_calldata(account: Address) -> Bytes {
    IERC20::balanceOfCall { account }.abi_encode().into()
}

/// Calldata for the settlement entrypoint `buyFor(amount, side, recipient)`.
pub fn buy_for_calldata(amount: U256, side: Side, recipient: Address) -> Bytes {
    IPredictionMarket::buyForCall {
        amount,
        buyYes: side.is_yes(),
        recipient,
    }
    .abi_encode()
    .into()
}

/// Calldata for the withdrawal entrypoint `sell(amount, side)`.
pub fn sell_calldata(amount: U256, side: Side) -> Bytes {
    IPredictionMarket::sellCall {
        amount,
        sellYes: side.is_yes(),
    }
    .abi_encode()
    .into()
}

/// Calldata for the position-token accessor of `side`.
pub fn position_token_calldata(side: Side) -> Bytes {
    match side {
        Side::Yes => IPredictionMarket::yesTokenCall {}.abi_encode().into(),
        Side::No => IPredictionMarket::noTokenCall {}.abi_encode().into(),
    }
}

/// Decode a `balanceOf` return value.
pub fn decode_balance(data: &[u8]) -> Result<U256, ChainError> {
    IERC20::balanceOfCall::abi_decode_returns(data).map_err(|e| ChainError::Decode(e.to_string()))
}

/// Decode a `yesToken()` / `noToken()` return value.
pub fn decode_position_token(data: &[u8]) -> Result<Address, ChainError> {
    IPredictionMarket::yesTokenCall::abi_decode_returns(data)
        .map_err(|e| ChainError::Decode(e.to_string()))
}

/// View call recognised by [`decode_view`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCall {
    /// `balanceOf(account)`.
    BalanceOf(Address),
    /// `yesToken()` or `noToken()`.
    PositionToken(Side),
}

/// State-changing call recognised by [`decode_write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteCall {
    /// `approve(spender, amount)`.
    Approve { spender: Address, amount: U256 },
    /// `buyFor(amount, side, recipient)`.
    BuyFor {
        amount: U256,
        side: Side,
        recipient: Address,
    },
    /// `sell(amount, side)`.
    Sell { amount: U256, side: Side },
}

fn side_from_flag(yes: bool) -> Side {
    if yes {
        Side::Yes
    } else {
        Side::No
    }
}

/// Identify a view call from its calldata.
pub fn decode_view(data: &[u8]) -> Option<ViewCall> {
    let selector = data.get(..4)?;
    if selector == IERC20::balanceOfCall::SELECTOR.as_slice() {
        let call = IERC20::balanceOfCall::abi_decode(data).ok()?;
        Some(ViewCall::BalanceOf(call.account))
    } else if selector == IPredictionMarket::yesTokenCall::SELECTOR.as_slice() {
        Some(ViewCall::PositionToken(Side::Yes))
    } else if selector == IPredictionMarket::noTokenCall::SELECTOR.as_slice() {
        Some(ViewCall::PositionToken(Side::No))
    } else {
        None
    }
}

/// Identify a state-changing call from its calldata.
pub fn decode_write(data: &[u8]) -> Option<WriteCall> {
    let selector = data.get(..4)?;
    if selector == IERC20::approveCall::SELECTOR.as_slice() {
        let call = IERC20::approveCall::abi_decode(data).ok()?;
        Some(WriteCall::Approve {
            spender: call.spender,
            amount: call.amount,
        })
    } else if selector == IPredictionMarket::buyForCall::SELECTOR.as_slice() {
        let call = IPredictionMarket::buyForCall::abi_decode(data).ok()?;
        Some(WriteCall::BuyFor {
            amount: call.amount,
            side: side_from_flag(call.buyYes),
            recipient: call.recipient,
        })
    } else if selector == IPredictionMarket::sellCall::SELECTOR.as_slice() {
        let call = IPredictionMarket::sellCall::abi_decode(data).ok()?;
        Some(WriteCall::Sell {
            amount: call.amount,
            side: side_from_flag(call.sellYes),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::sol_types::SolValue;

    #[test]
    fn write_calls_decode_back() {
        let recipient = Address::repeat_byte(0x22);
        let buy = buy_for_calldata(U256::from(7u64), Side::No, recipient);
        assert_eq!(
            decode_write(&buy),
            Some(WriteCall::BuyFor {
                amount: U256::from(7u64),
                side: Side::No,
                recipient
            })
        );

        let approve = approve_calldata(recipient, U256::MAX);
        assert!(matches!(
            decode_write(&approve),
            Some(WriteCall::Approve { amount, .. }) if amount == U256::MAX
        ));
        assert_eq!(decode_write(&[1, 2]), None);
    }

    #[test]
    fn view_calls_decode_back() {
        let owner = Address::repeat_byte(0x33);
        assert_eq!(
            decode_view(&balance_of_calldata(owner)),
            Some(ViewCall::BalanceOf(owner))
        );
        assert_eq!(
            decode_view(&position_token_calldata(Side::No)),
            Some(ViewCall::PositionToken(Side::No))
        );
    }

    #[test]
    fn buy_for_uses_side_flag() {
        let recipient = Address::repeat_byte(0x11);
        let yes = buy_for_calldata(U256::from(5u64), Side::Yes, recipient);
        let no = buy_for_calldata(U256::from(5u64), Side::No, recipient);

        assert_eq!(&yes[..4], IPredictionMarket::buyForCall::SELECTOR.as_slice());
        assert_ne!(yes, no);

        let decoded = IPredictionMarket::buyForCall::abi_decode(&yes).unwrap();
        assert!(decoded.buyYes);
        assert_eq!(decoded.recipient, recipient);
        assert_eq!(decoded.amount, U256::from(5u64));
    }

    #[test]
    fn decode_balance_from_word() {
        let encoded = U256::from(42u64).abi_encode();
        assert_eq!(decode_balance(&encoded).unwrap(), U256::from(42u64));
    }

    #[test]
    fn decode_rejects_short_data() {
        assert!(decode_balance(&[0u8; 3]).is_err());
    }

    #[test]
    fn position_token_selector_depends_on_side() {
        assert_ne!(position_token_calldata(Side::Yes), position_token_calldata(Side::No));
    }
}
