//! Typed binding for the Nursery staking contract.
//!
//! Members stake, earn per-epoch rewards and withdraw after a lock-up
//! measured in epochs. Every method returns a [`ContractCall`] that can be
//! invoked directly, simulated, gas-estimated or populated into an unsigned
//! request.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use binding_core::address::parse_address;
use binding_core::{contract_methods, AbiError, Address, Contract, Registry, Transport, U256};

pub use binding_core::{ContractCall, ContractError, Invocation};

/// JSON ABI of the Nursery contract.
pub const NURSERY_ABI: &str = include_str!("../abi/Nursery.json");

/// Parses [`NURSERY_ABI`] into a registry.
pub fn nursery_registry() -> Result<Registry, AbiError> {
    Registry::from_json(NURSERY_ABI)
}

/// The Nursery contract at one address. Derefs to the generic [`Contract`].
pub struct Nursery<T: ?Sized>(Contract<T>);

impl<T: ?Sized> Clone for Nursery<T> {
    fn clone(&self) -> Self {
        Nursery(self.0.clone())
    }
}

impl<T: ?Sized> Deref for Nursery<T> {
    type Target = Contract<T>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T: Transport + ?Sized> fmt::Debug for Nursery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Nursery").field(&self.address()).finish()
    }
}

impl<T: Transport + ?Sized> From<Contract<T>> for Nursery<T> {
    fn from(contract: Contract<T>) -> Self {
        Nursery(contract)
    }
}

impl<T: Transport + ?Sized> Nursery<T> {
    pub fn new(address: Address, transport: Arc<T>) -> Result<Self, AbiError> {
        Ok(Self::with_registry(address, Arc::new(nursery_registry()?), transport))
    }

    /// Like [`Nursery::new`], taking a hex address. Mixed-case input must be
    /// EIP-55 checksummed.
    pub fn at(address: &str, transport: Arc<T>) -> Result<Self, AbiError> {
        Self::new(parse_address(address)?, transport)
    }

    /// Shares an already parsed registry between several instances.
    pub fn with_registry(address: Address, registry: Arc<Registry>, transport: Arc<T>) -> Self {
        Contract::new(address, registry, transport).into()
    }

    /// The Nursery deployed at `address`, on the same transport.
    pub fn attach(&self, address: Address) -> Self {
        self.0.attach(address).into()
    }

    /// This Nursery routed through `transport`, typically one with another
    /// signer.
    pub fn connect<U: Transport + ?Sized>(&self, transport: Arc<U>) -> Nursery<U> {
        self.0.connect(transport).into()
    }

    pub fn into_inner(self) -> Contract<T> {
        self.0
    }

    contract_methods! {
        transport = T;

        /// Operator only: distributes newly minted rewards to stakers.
        fn allocate_seigniorage("allocateSeigniorage(uint256)", amount: U256) -> ();

        fn balance_of("balanceOf(address)", member: Address) -> U256;

        fn can_claim_reward("canClaimReward(address)", member: Address) -> bool;

        fn can_withdraw("canWithdraw(address)", member: Address) -> bool;

        fn claim_reward("claimReward()") -> ();

        /// Rewards accrued by `member` and not yet claimed.
        fn earned("earned(address)", member: Address) -> U256;

        fn epoch("epoch()") -> U256;

        /// Withdraws the whole stake and claims rewards.
        fn exit("exit()") -> ();

        fn get_kitty_price("getKittyPrice()") -> U256;

        /// Operator only: sends `amount` of a stray `token` to `to`.
        fn governance_recover_unsupported(
            "governanceRecoverUnsupported(address,uint256,address)",
            token: Address,
            amount: U256,
            to: Address
        ) -> ();

        /// Timestamp at which the next epoch starts.
        fn next_epoch_point("nextEpochPoint()") -> U256;

        /// Operator only: lock-up lengths, in epochs, for withdrawals and rewards.
        fn set_lock_up(
            "setLockUp(uint256,uint256)",
            withdraw_lockup_epochs: U256,
            reward_lockup_epochs: U256
        ) -> ();

        fn set_operator("setOperator(address)", operator: Address) -> ();

        fn stake("stake(uint256)", amount: U256) -> ();

        fn withdraw("withdraw(uint256)", amount: U256) -> ();
    }
}
