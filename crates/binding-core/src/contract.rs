//! Generic contract facade and its typed call builders.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use tracing::debug;

use crate::dispatch::{codec_error, CallMode, Dispatcher};
use crate::error::{AbiError, ContractError};
use crate::event::{DecodedEvent, Event};
use crate::filter::{self, Filter};
use crate::function::{EncodedCall, Function};
use crate::registry::Registry;
use crate::token::{Token, Tokenizable};
use crate::transaction::{BlockId, CallOverrides, TransactionRequest};
use crate::transport::{PendingTransaction, Transport};

/// A contract at one address: its registry plus a dispatcher.
///
/// Per-contract bindings wrap this type and deref to it.
pub struct Contract<T: ?Sized> {
    registry: Arc<Registry>,
    dispatcher: Dispatcher<T>,
    defaults: CallOverrides,
}

impl<T: ?Sized> Clone for Contract<T> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            dispatcher: self.dispatcher.clone(),
            defaults: self.defaults.clone(),
        }
    }
}

impl<T: Transport + ?Sized> fmt::Debug for Contract<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("address", &self.dispatcher.address())
            .field("functions", &self.registry.functions().count())
            .finish()
    }
}

impl<T: Transport + ?Sized> Contract<T> {
    pub fn new(address: Address, registry: Arc<Registry>, transport: Arc<T>) -> Self {
        Self {
            registry,
            dispatcher: Dispatcher::new(address, transport),
            defaults: CallOverrides::default(),
        }
    }

    /// Builds the registry from a JSON ABI.
    pub fn from_json(address: Address, abi: &str, transport: Arc<T>) -> Result<Self, AbiError> {
        Ok(Self::new(address, Arc::new(Registry::from_json(abi)?), transport))
    }

    /// Overrides applied to every call unless the call sets its own.
    pub fn with_defaults(mut self, defaults: CallOverrides) -> Self {
        self.defaults = defaults;
        self
    }

    /// The same contract interface at another address, sharing the registry
    /// and transport.
    pub fn attach(&self, address: Address) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            dispatcher: Dispatcher::new(address, Arc::clone(self.dispatcher.transport())),
            defaults: self.defaults.clone(),
        }
    }

    /// The same contract routed through another transport, for instance one
    /// holding a different signer.
    pub fn connect<U: Transport + ?Sized>(&self, transport: Arc<U>) -> Contract<U> {
        Contract {
            registry: Arc::clone(&self.registry),
            dispatcher: Dispatcher::new(self.address(), transport),
            defaults: self.defaults.clone(),
        }
    }

    pub fn address(&self) -> Address {
        self.dispatcher.address()
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Dispatcher<T> {
        &self.dispatcher
    }

    /// Call builder for the function named `name`; fails when the name is
    /// overloaded.
    pub fn method<R: Tokenizable>(
        &self,
        name: &str,
        args: Vec<Token>,
    ) -> Result<ContractCall<'_, T, R>, ContractError> {
        let function = Arc::clone(self.registry.function(name)?);
        Ok(self.call_builder(function, args))
    }

    /// Call builder for the function with the given canonical signature.
    pub fn method_by_signature<R: Tokenizable>(
        &self,
        signature: &str,
        args: Vec<Token>,
    ) -> Result<ContractCall<'_, T, R>, ContractError> {
        let function = Arc::clone(self.registry.function_by_signature(signature)?);
        Ok(self.call_builder(function, args))
    }

    pub fn method_by_selector<R: Tokenizable>(
        &self,
        selector: [u8; 4],
        args: Vec<Token>,
    ) -> Result<ContractCall<'_, T, R>, ContractError> {
        let function = self
            .registry
            .function_by_selector(selector)
            .ok_or_else(|| AbiError::UnknownFunction(format!("0x{}", hex::encode(selector))))?;
        Ok(self.call_builder(Arc::clone(function), args))
    }

    /// Log query for the event named `name`.
    pub fn event(&self, name: &str) -> Result<EventQuery<'_, T>, ContractError> {
        let event = Arc::clone(self.registry.event(name)?);
        Ok(EventQuery::new(&self.dispatcher, event))
    }

    pub fn event_by_signature(&self, signature: &str) -> Result<EventQuery<'_, T>, ContractError> {
        let event = Arc::clone(self.registry.event_by_signature(signature)?);
        Ok(EventQuery::new(&self.dispatcher, event))
    }

    fn call_builder<R>(&self, function: Arc<Function>, args: Vec<Token>) -> ContractCall<'_, T, R> {
        ContractCall {
            dispatcher: &self.dispatcher,
            function,
            args,
            overrides: self.defaults.clone(),
            _output: PhantomData,
        }
    }
}

/// Result of [`ContractCall::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation<R> {
    /// A read-only function returned its outputs.
    Returned(R),
    /// A state-changing function was submitted.
    Submitted(PendingTransaction),
}

/// One pending invocation of a contract function, decoding to `R`.
///
/// The terminal methods correspond to the four call modes; `invoke` picks
/// simulate or send from the function's mutability.
#[must_use = "contract calls do nothing unless executed"]
pub struct ContractCall<'a, T: ?Sized, R> {
    dispatcher: &'a Dispatcher<T>,
    function: Arc<Function>,
    args: Vec<Token>,
    overrides: CallOverrides,
    _output: PhantomData<fn() -> R>,
}

impl<'a, T: Transport + ?Sized, R: Tokenizable> ContractCall<'a, T, R> {
    pub fn value(mut self, value: U256) -> Self {
        self.overrides.value = Some(value);
        self
    }

    pub fn gas(mut self, gas_limit: u64) -> Self {
        self.overrides.gas_limit = Some(gas_limit);
        self
    }

    pub fn from(mut self, from: Address) -> Self {
        self.overrides.from = Some(from);
        self
    }

    pub fn block(mut self, block: BlockId) -> Self {
        self.overrides.block = Some(block);
        self
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.overrides.nonce = Some(nonce);
        self
    }

    /// Layers `overrides` over what the builder already holds.
    pub fn overrides(mut self, overrides: CallOverrides) -> Self {
        self.overrides = overrides.or(&self.overrides);
        self
    }

    pub fn function(&self) -> &Arc<Function> {
        &self.function
    }

    pub fn arguments(&self) -> &[Token] {
        &self.args
    }

    /// Selector and encoded arguments.
    pub fn calldata(&self) -> Result<Bytes, ContractError> {
        let call = EncodedCall::new(Arc::clone(&self.function), &self.args)
            .map_err(|source| codec_error(&self.function, CallMode::Populate, source))?;
        Ok(call.data)
    }

    /// Sends state-changing functions and simulates read-only ones.
    pub async fn invoke(&self) -> Result<Invocation<R>, ContractError> {
        if self.function.state_mutability.is_read_only() {
            Ok(Invocation::Returned(self.call().await?))
        } else {
            Ok(Invocation::Submitted(self.send().await?))
        }
    }

    /// Simulates the call and decodes the outputs into `R`.
    pub async fn call(&self) -> Result<R, ContractError> {
        let result = self
            .dispatcher
            .simulate(&self.function, &self.args, &self.overrides)
            .await?;
        result
            .into_typed()
            .map_err(|source| codec_error(&self.function, CallMode::Simulate, source))
    }

    pub async fn send(&self) -> Result<PendingTransaction, ContractError> {
        self.dispatcher
            .send(&self.function, &self.args, &self.overrides)
            .await
    }

    pub async fn estimate_gas(&self) -> Result<U256, ContractError> {
        self.dispatcher
            .estimate_gas(&self.function, &self.args, &self.overrides)
            .await
    }

    /// The unsigned request, built without contacting the transport.
    pub fn populate_transaction(&self) -> Result<TransactionRequest, ContractError> {
        self.dispatcher
            .populate(&self.function, &self.args, &self.overrides)
    }
}

impl<T: ?Sized, R> fmt::Debug for ContractCall<'_, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractCall")
            .field("function", &self.function.signature())
            .field("args", &self.args)
            .field("overrides", &self.overrides)
            .finish()
    }
}

/// A log query for one event of one contract.
#[must_use = "event queries do nothing unless executed"]
pub struct EventQuery<'a, T: ?Sized> {
    dispatcher: &'a Dispatcher<T>,
    event: Arc<Event>,
    topics: Vec<Option<Token>>,
    from_block: Option<u64>,
    to_block: Option<u64>,
}

impl<T: ?Sized> fmt::Debug for EventQuery<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQuery")
            .field("event", &self.event.signature())
            .field("topics", &self.topics)
            .field("from_block", &self.from_block)
            .field("to_block", &self.to_block)
            .finish()
    }
}

impl<'a, T: Transport + ?Sized> EventQuery<'a, T> {
    fn new(dispatcher: &'a Dispatcher<T>, event: Arc<Event>) -> Self {
        let indexed = event.indexed().count();
        Self {
            dispatcher,
            event,
            topics: vec![None; indexed],
            from_block: None,
            to_block: None,
        }
    }

    pub fn event(&self) -> &Arc<Event> {
        &self.event
    }

    /// Restricts the `position`-th indexed input to `value`.
    pub fn topic(mut self, position: usize, value: impl Tokenizable) -> Result<Self, ContractError> {
        let indexed = self.topics.len();
        let slot = self.topics.get_mut(position).ok_or_else(|| {
            AbiError::encoding(
                position,
                format!(
                    "{} has {indexed} indexed inputs, no position {position}",
                    self.event.signature()
                ),
            )
        })?;
        *slot = Some(value.into_token());
        Ok(self)
    }

    /// Restricts the indexed input called `name` to `value`.
    pub fn topic_by_name(self, name: &str, value: impl Tokenizable) -> Result<Self, ContractError> {
        let position = self
            .event
            .indexed()
            .position(|p| p.name == name)
            .ok_or_else(|| {
                AbiError::encoding(0, format!("{} has no indexed input {name}", self.event.signature()))
            })?;
        self.topic(position, value)
    }

    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn to_block(mut self, block: u64) -> Self {
        self.to_block = Some(block);
        self
    }

    /// The filter sent to the transport.
    pub fn filter(&self) -> Result<Filter, ContractError> {
        let mut log_filter =
            filter::build_filter(&self.event, &self.topics)?.address(self.dispatcher.address());
        log_filter.from_block = self.from_block;
        log_filter.to_block = self.to_block;
        Ok(log_filter)
    }

    /// Fetches matching logs and decodes them in transport order.
    pub async fn query(&self) -> Result<Vec<DecodedEvent>, ContractError> {
        let log_filter = self.filter()?;
        let logs = self
            .dispatcher
            .transport()
            .get_logs(&log_filter)
            .await
            .map_err(|source| ContractError::Transport {
                signature: self.event.signature(),
                source,
            })?;
        debug!(event = %self.event.signature(), count = logs.len(), "fetched logs");

        logs.iter()
            .filter(|log| log_filter.matches(log))
            .map(|log| filter::decode_log(&self.event, log).map_err(ContractError::from))
            .collect()
    }
}

/// Expands a table of function signatures into typed methods on a binding
/// that derefs to [`Contract`].
///
/// ```ignore
/// impl<T: Transport + ?Sized> Nursery<T> {
///     contract_methods! {
///         transport = T;
///         fn balance_of("balanceOf(address)", member: Address) -> U256;
///     }
/// }
/// ```
#[macro_export]
macro_rules! contract_methods {
    (
        transport = $transport:ident;
        $(
            $(#[$meta:meta])*
            fn $method:ident($signature:literal $(, $arg:ident : $arg_ty:ty)*) -> $ret:ty;
        )*
    ) => {
        $(
            $(#[$meta])*
            pub fn $method(
                &self
                $(, $arg: $arg_ty)*
            ) -> ::core::result::Result<$crate::ContractCall<'_, $transport, $ret>, $crate::ContractError> {
                self.method_by_signature::<$ret>(
                    $signature,
                    ::std::vec![$($crate::Tokenizable::into_token($arg)),*],
                )
            }
        )*
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Log;
    use crate::transport::{CallOutcome, TransportError};
    use crate::B256;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const ABI: &str = r#"[
        {"type":"function","name":"epoch","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"stake","inputs":[{"name":"amount","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"stake","inputs":[{"name":"amount","type":"uint256"},{"name":"to","type":"address"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"event","name":"Staked","anonymous":false,"inputs":[
            {"name":"user","type":"address","indexed":true},
            {"name":"amount","type":"uint256","indexed":false}
        ]}
    ]"#;

    #[derive(Default)]
    struct Recorder {
        filters: Mutex<Vec<Filter>>,
        logs: Vec<Log>,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn call(
            &self,
            _request: &TransactionRequest,
            _block: BlockId,
        ) -> Result<CallOutcome<Bytes>, TransportError> {
            Ok(CallOutcome::Success(Bytes::from(U256::from(9).to_be_bytes::<32>().to_vec())))
        }

        async fn send_transaction(
            &self,
            _request: &TransactionRequest,
        ) -> Result<CallOutcome<PendingTransaction>, TransportError> {
            Ok(CallOutcome::Success(PendingTransaction { hash: B256::repeat_byte(1) }))
        }

        async fn estimate_gas(
            &self,
            _request: &TransactionRequest,
        ) -> Result<CallOutcome<U256>, TransportError> {
            Ok(CallOutcome::Success(U256::from(21_000)))
        }

        async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, TransportError> {
            self.filters.lock().unwrap().push(filter.clone());
            Ok(self.logs.clone())
        }
    }

    fn contract(transport: Recorder) -> Contract<Recorder> {
        Contract::from_json(Address::repeat_byte(0x99), ABI, Arc::new(transport)).unwrap()
    }

    fn staked_log(user: Address, amount: u64) -> Log {
        Log {
            address: Address::repeat_byte(0x99),
            topics: vec![crate::keccak256("Staked(address,uint256)"), user.into_word()],
            data: Bytes::from(U256::from(amount).to_be_bytes::<32>().to_vec()),
            ..Log::default()
        }
    }

    #[tokio::test]
    async fn invoke_picks_mode_from_mutability() {
        let contract = contract(Recorder::default());

        let epoch = contract.method::<U256>("epoch", vec![]).unwrap();
        assert_eq!(epoch.invoke().await.unwrap(), Invocation::Returned(U256::from(9)));

        let stake = contract
            .method_by_signature::<()>("stake(uint)", vec![Token::Uint(U256::from(1))])
            .unwrap();
        assert_eq!(
            stake.invoke().await.unwrap(),
            Invocation::Submitted(PendingTransaction { hash: B256::repeat_byte(1) })
        );
    }

    #[test]
    fn overloaded_name_needs_signature() {
        let contract = contract(Recorder::default());
        let err = contract.method::<()>("stake", vec![]).unwrap_err();
        assert!(matches!(err, ContractError::Abi(AbiError::AmbiguousName(_))));
    }

    #[test]
    fn defaults_and_builder_overrides() {
        let sender = Address::repeat_byte(0x10);
        let contract = contract(Recorder::default()).with_defaults(CallOverrides {
            from: Some(sender),
            gas_limit: Some(80_000),
            ..Default::default()
        });

        let request = contract
            .method_by_signature::<()>("stake(uint256)", vec![Token::Uint(U256::from(3))])
            .unwrap()
            .gas(120_000)
            .populate_transaction()
            .unwrap();
        assert_eq!(request.from, Some(sender));
        assert_eq!(request.gas_limit, Some(120_000));
        assert_eq!(request.to, Address::repeat_byte(0x99));
    }

    #[test]
    fn selector_lookup() {
        let contract = contract(Recorder::default());
        let call = contract
            .method_by_selector::<U256>(crate::keccak256("epoch()")[..4].try_into().unwrap(), vec![])
            .unwrap();
        assert_eq!(call.function().name, "epoch");
        assert!(contract.method_by_selector::<U256>([0; 4], vec![]).is_err());
    }

    #[tokio::test]
    async fn event_query_filters_and_decodes() {
        let alice = Address::repeat_byte(0xaa);
        let bob = Address::repeat_byte(0xbb);
        let contract = contract(Recorder {
            logs: vec![staked_log(alice, 5), staked_log(bob, 7)],
            ..Default::default()
        });

        let events = contract
            .event("Staked")
            .unwrap()
            .topic_by_name("user", alice)
            .unwrap()
            .from_block(100)
            .query()
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].get("amount"), Some(&Token::Uint(U256::from(5))));

        let transport = contract.dispatcher().transport();
        let sent = transport.filters.lock().unwrap();
        assert_eq!(sent[0].address, Some(Address::repeat_byte(0x99)));
        assert_eq!(sent[0].from_block, Some(100));
        assert_eq!(sent[0].topics[1], Some(vec![alice.into_word()]));
    }

    #[test]
    fn event_query_rejects_unknown_topic_name() {
        let contract = contract(Recorder::default());
        let query = contract.event("Staked").unwrap();
        assert!(query.topic_by_name("amount", U256::from(1)).is_err());
    }

    #[test]
    fn event_query_rejects_topic_past_indexed_inputs() {
        let contract = contract(Recorder::default());

        let query = contract.event("Staked").unwrap().topic(0, Address::ZERO).unwrap();
        assert_eq!(query.filter().unwrap().topics[1], Some(vec![Address::ZERO.into_word()]));

        let err = contract.event("Staked").unwrap().topic(1, U256::from(5)).unwrap_err();
        assert!(matches!(err, ContractError::Abi(AbiError::Encoding { index: 1, .. })));
        assert_eq!(
            err.to_string(),
            "encoding error at argument 1: Staked(address,uint256) has 1 indexed inputs, no position 1"
        );
    }

    #[test]
    fn attach_moves_to_another_address() {
        let contract = contract(Recorder::default()).with_defaults(CallOverrides {
            gas_limit: Some(70_000),
            ..Default::default()
        });
        let other = contract.attach(Address::repeat_byte(0x55));

        assert_eq!(other.address(), Address::repeat_byte(0x55));
        assert_eq!(contract.address(), Address::repeat_byte(0x99));
        assert!(Arc::ptr_eq(other.registry(), contract.registry()));
        assert!(Arc::ptr_eq(other.dispatcher().transport(), contract.dispatcher().transport()));

        let request = other.method::<U256>("epoch", vec![]).unwrap().populate_transaction().unwrap();
        assert_eq!(request.to, Address::repeat_byte(0x55));
        assert_eq!(request.gas_limit, Some(70_000));
    }

    struct Signer(Address);

    #[async_trait]
    impl Transport for Signer {
        async fn call(
            &self,
            _request: &TransactionRequest,
            _block: BlockId,
        ) -> Result<CallOutcome<Bytes>, TransportError> {
            Err("read-only calls go elsewhere".into())
        }

        async fn send_transaction(
            &self,
            _request: &TransactionRequest,
        ) -> Result<CallOutcome<PendingTransaction>, TransportError> {
            Ok(CallOutcome::Success(PendingTransaction { hash: B256::repeat_byte(2) }))
        }

        async fn estimate_gas(
            &self,
            _request: &TransactionRequest,
        ) -> Result<CallOutcome<U256>, TransportError> {
            Ok(CallOutcome::Success(U256::from(30_000)))
        }

        async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, TransportError> {
            Ok(Vec::new())
        }

        fn signer_address(&self) -> Option<Address> {
            Some(self.0)
        }
    }

    #[tokio::test]
    async fn connect_swaps_transport() {
        let contract = contract(Recorder::default());
        let signer = Address::repeat_byte(0x66);
        let connected = contract.connect(Arc::new(Signer(signer)));

        assert_eq!(connected.address(), contract.address());
        assert!(Arc::ptr_eq(connected.registry(), contract.registry()));

        let stake = connected
            .method_by_signature::<()>("stake(uint256)", vec![Token::Uint(U256::from(1))])
            .unwrap();
        assert_eq!(stake.populate_transaction().unwrap().from, Some(signer));
        assert_eq!(stake.send().await.unwrap().hash, B256::repeat_byte(2));

        // The original keeps its own transport.
        let pending = contract
            .method_by_signature::<()>("stake(uint256)", vec![Token::Uint(U256::from(1))])
            .unwrap()
            .send()
            .await
            .unwrap();
        assert_eq!(pending.hash, B256::repeat_byte(1));
    }

    #[tokio::test]
    async fn mistyped_output_names_the_call() {
        let contract = contract(Recorder::default());
        let err = contract.method::<bool>("epoch", vec![]).unwrap().call().await.unwrap_err();
        assert!(matches!(err, ContractError::Codec { mode: CallMode::Simulate, .. }));
        assert!(err.to_string().starts_with("call epoch()"), "{err}");
    }
}
