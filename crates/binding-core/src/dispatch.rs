//! Routes encoded calls through the transport in one of four modes.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use tracing::{debug, warn};

use crate::error::{AbiError, ContractError};
use crate::function::{CallResult, EncodedCall, Function, StateMutability};
use crate::revert::RevertReason;
use crate::token::Token;
use crate::transaction::{CallOverrides, TransactionRequest};
use crate::transport::{CallOutcome, PendingTransaction, Transport};

/// How a call is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallMode {
    /// Read-only execution; nothing is mined.
    Simulate,
    /// Signed and submitted as a transaction.
    Send,
    EstimateGas,
    /// Builds the unsigned request without contacting the transport.
    Populate,
}

impl fmt::Display for CallMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CallMode::Simulate => "call",
            CallMode::Send => "send",
            CallMode::EstimateGas => "estimate gas",
            CallMode::Populate => "populate",
        })
    }
}

/// What a dispatched call produced, by mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Decoded(CallResult),
    Pending(PendingTransaction),
    Gas(U256),
    Populated(TransactionRequest),
}

/// Sends calls for one contract address through a shared transport.
pub struct Dispatcher<T: ?Sized> {
    transport: Arc<T>,
    address: Address,
}

impl<T: ?Sized> Clone for Dispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            address: self.address,
        }
    }
}

impl<T: Transport + ?Sized> Dispatcher<T> {
    pub fn new(address: Address, transport: Arc<T>) -> Self {
        Self { transport, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Read-only call; allowed for every mutability.
    pub async fn simulate(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
    ) -> Result<CallResult, ContractError> {
        match self.dispatch(function, args, overrides, CallMode::Simulate).await? {
            DispatchOutcome::Decoded(result) => Ok(result),
            other => Err(unexpected(function, CallMode::Simulate, &other)),
        }
    }

    /// Submits a state-changing call through the transport's signer.
    pub async fn send(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
    ) -> Result<PendingTransaction, ContractError> {
        match self.dispatch(function, args, overrides, CallMode::Send).await? {
            DispatchOutcome::Pending(pending) => Ok(pending),
            other => Err(unexpected(function, CallMode::Send, &other)),
        }
    }

    pub async fn estimate_gas(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
    ) -> Result<U256, ContractError> {
        match self.dispatch(function, args, overrides, CallMode::EstimateGas).await? {
            DispatchOutcome::Gas(gas) => Ok(gas),
            other => Err(unexpected(function, CallMode::EstimateGas, &other)),
        }
    }

    /// Builds the unsigned request locally.
    pub fn populate(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
    ) -> Result<TransactionRequest, ContractError> {
        self.prepare(function, args, overrides, CallMode::Populate)
    }

    /// Encodes the call, checks it is allowed in `mode`, and runs it.
    pub async fn dispatch(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
        mode: CallMode,
    ) -> Result<DispatchOutcome, ContractError> {
        let request = self.prepare(function, args, overrides, mode)?;
        let signature = function.signature();

        debug!(
            signature = %signature,
            mode = %mode,
            selector = %hex::encode(function.selector()),
            to = %self.address,
            "dispatching"
        );

        match mode {
            CallMode::Simulate => {
                let block = overrides.block.unwrap_or_default();
                let output = self
                    .transport
                    .call(&request, block)
                    .await
                    .map_err(|source| ContractError::Transport {
                        signature: signature.clone(),
                        source,
                    })?;
                let data = settle(function, output)?;
                let result = function
                    .decode_output(&data)
                    .map_err(|source| codec_error(function, mode, source))?;
                Ok(DispatchOutcome::Decoded(result))
            }
            CallMode::Send => {
                let outcome = self
                    .transport
                    .send_transaction(&request)
                    .await
                    .map_err(|source| ContractError::Transport {
                        signature: signature.clone(),
                        source,
                    })?;
                let pending = settle(function, outcome)?;
                debug!(signature = %signature, hash = %pending.hash, "submitted");
                Ok(DispatchOutcome::Pending(pending))
            }
            CallMode::EstimateGas => {
                let outcome = self
                    .transport
                    .estimate_gas(&request)
                    .await
                    .map_err(|source| ContractError::Transport {
                        signature: signature.clone(),
                        source,
                    })?;
                Ok(DispatchOutcome::Gas(settle(function, outcome)?))
            }
            CallMode::Populate => Ok(DispatchOutcome::Populated(request)),
        }
    }

    fn prepare(
        &self,
        function: &Arc<Function>,
        args: &[Token],
        overrides: &CallOverrides,
        mode: CallMode,
    ) -> Result<TransactionRequest, ContractError> {
        let mutability = function.state_mutability;

        if matches!(mode, CallMode::Send | CallMode::EstimateGas) && mutability.is_read_only() {
            return Err(ContractError::UnsupportedOperation {
                signature: function.signature(),
                reason: format!("{mode} is not available for {mutability} functions"),
            });
        }

        if overrides.value.is_some_and(|value| !value.is_zero())
            && mutability != StateMutability::Payable
        {
            return Err(ContractError::UnsupportedOperation {
                signature: function.signature(),
                reason: format!("{mutability} function does not accept value"),
            });
        }

        let call = EncodedCall::new(Arc::clone(function), args)
            .map_err(|source| codec_error(function, mode, source))?;
        let mut request = TransactionRequest::new(self.address, call.data).apply(overrides);
        if request.from.is_none() {
            request.from = self.transport.signer_address();
        }
        Ok(request)
    }
}

/// Unwraps a transport outcome, turning a node-reported revert into an error.
fn settle<V>(function: &Function, outcome: CallOutcome<V>) -> Result<V, ContractError> {
    match outcome {
        CallOutcome::Success(value) => Ok(value),
        CallOutcome::Revert(data) => Err(revert_error(function, &data)),
    }
}

fn revert_error(function: &Function, data: &Bytes) -> ContractError {
    let reason = RevertReason::decode(data);
    warn!(signature = %function.signature(), reason = %reason, "call reverted");
    ContractError::Revert {
        signature: function.signature(),
        reason: reason.to_string(),
        data: data.to_vec(),
    }
}

/// Tags a codec failure with the call it belongs to.
pub(crate) fn codec_error(function: &Function, mode: CallMode, source: AbiError) -> ContractError {
    ContractError::Codec {
        signature: function.signature(),
        mode,
        source,
    }
}

fn unexpected(function: &Function, mode: CallMode, outcome: &DispatchOutcome) -> ContractError {
    ContractError::UnsupportedOperation {
        signature: function.signature(),
        reason: format!("{mode} produced {outcome:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Filter, Log};
    use crate::function::Param;
    use crate::revert::ERROR_SELECTOR;
    use crate::transaction::BlockId;
    use crate::transport::TransportError;
    use crate::types::ParamType;
    use crate::{abi, B256};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockTransport {
        requests: Mutex<Vec<(&'static str, TransactionRequest)>>,
        call_output: Mutex<Option<CallOutcome<Bytes>>>,
        tx_revert: Option<Bytes>,
        fail: bool,
        signer: Option<Address>,
    }

    impl MockTransport {
        fn returning(output: CallOutcome<Bytes>) -> Self {
            Self {
                call_output: Mutex::new(Some(output)),
                ..Default::default()
            }
        }

        fn record(&self, kind: &'static str, request: &TransactionRequest) -> Result<(), TransportError> {
            self.requests.lock().unwrap().push((kind, request.clone()));
            if self.fail {
                return Err("connection refused".into());
            }
            Ok(())
        }

        fn calls(&self) -> Vec<(&'static str, TransactionRequest)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn call(
            &self,
            request: &TransactionRequest,
            _block: BlockId,
        ) -> Result<CallOutcome<Bytes>, TransportError> {
            self.record("call", request)?;
            Ok(self
                .call_output
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(CallOutcome::Success(Bytes::new())))
        }

        async fn send_transaction(
            &self,
            request: &TransactionRequest,
        ) -> Result<CallOutcome<PendingTransaction>, TransportError> {
            self.record("send", request)?;
            if let Some(data) = &self.tx_revert {
                return Ok(CallOutcome::Revert(data.clone()));
            }
            Ok(CallOutcome::Success(PendingTransaction {
                hash: B256::repeat_byte(0x42),
            }))
        }

        async fn estimate_gas(
            &self,
            request: &TransactionRequest,
        ) -> Result<CallOutcome<U256>, TransportError> {
            self.record("estimate", request)?;
            if let Some(data) = &self.tx_revert {
                return Ok(CallOutcome::Revert(data.clone()));
            }
            Ok(CallOutcome::Success(U256::from(53_000)))
        }

        async fn get_logs(&self, _filter: &Filter) -> Result<Vec<Log>, TransportError> {
            Ok(Vec::new())
        }

        fn signer_address(&self) -> Option<Address> {
            self.signer
        }
    }

    fn function(name: &str, inputs: &[&str], outputs: &[&str], mutability: StateMutability) -> Arc<Function> {
        let params = |types: &[&str]| -> Vec<Param> {
            types
                .iter()
                .map(|t| Param::new("", ParamType::parse(t).unwrap()))
                .collect()
        };
        Arc::new(Function::new(name, params(inputs), params(outputs), mutability))
    }

    fn word(value: u64) -> Bytes {
        Bytes::from(U256::from(value).to_be_bytes::<32>().to_vec())
    }

    fn target() -> Address {
        Address::repeat_byte(0x77)
    }

    #[tokio::test]
    async fn simulate_decodes_output() {
        let transport = Arc::new(MockTransport::returning(CallOutcome::Success(word(1000))));
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let balance_of = function("balanceOf", &["address"], &["uint256"], StateMutability::View);

        let result = dispatcher
            .simulate(&balance_of, &[Token::Address(Address::ZERO)], &CallOverrides::default())
            .await
            .unwrap();
        assert_eq!(result.get(0), Some(&Token::Uint(U256::from(1000))));

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "call");
        assert_eq!(calls[0].1.to, target());
        assert_eq!(&calls[0].1.data[..4], &[0x70, 0xa0, 0x82, 0x31]);
    }

    #[tokio::test]
    async fn simulate_allowed_on_state_changing_function() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(target(), transport);
        let claim = function("claimReward", &[], &[], StateMutability::NonPayable);

        let result = dispatcher.simulate(&claim, &[], &CallOverrides::default()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn send_rejects_read_only_functions() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let epoch = function("epoch", &[], &["uint256"], StateMutability::View);

        let err = dispatcher.send(&epoch, &[], &CallOverrides::default()).await.unwrap_err();
        assert!(matches!(err, ContractError::UnsupportedOperation { .. }));
        assert_eq!(err.to_string(), "unsupported operation on epoch(): send is not available for view functions");

        let err = dispatcher
            .estimate_gas(&epoch, &[], &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::UnsupportedOperation { .. }));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn send_returns_pending_transaction() {
        let signer = Address::repeat_byte(0x05);
        let transport = Arc::new(MockTransport {
            signer: Some(signer),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let stake = function("stake", &["uint256"], &[], StateMutability::NonPayable);

        let pending = dispatcher
            .send(&stake, &[Token::Uint(U256::from(10))], &CallOverrides::default())
            .await
            .unwrap();
        assert_eq!(pending.hash, B256::repeat_byte(0x42));

        let calls = transport.calls();
        assert_eq!(calls[0].0, "send");
        assert_eq!(calls[0].1.from, Some(signer));
    }

    #[tokio::test]
    async fn estimate_gas_returns_estimate() {
        let dispatcher = Dispatcher::new(target(), Arc::new(MockTransport::default()));
        let exit = function("exit", &[], &[], StateMutability::NonPayable);

        let gas = dispatcher.estimate_gas(&exit, &[], &CallOverrides::default()).await.unwrap();
        assert_eq!(gas, U256::from(53_000));
    }

    #[tokio::test]
    async fn value_only_for_payable() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let overrides = CallOverrides {
            value: Some(U256::from(1)),
            ..Default::default()
        };

        let stake = function("stake", &["uint256"], &[], StateMutability::NonPayable);
        let err = dispatcher
            .send(&stake, &[Token::Uint(U256::from(1))], &overrides)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::UnsupportedOperation { .. }));
        assert!(dispatcher
            .populate(&stake, &[Token::Uint(U256::from(1))], &overrides)
            .is_err());

        let deposit = function("deposit", &[], &[], StateMutability::Payable);
        dispatcher.send(&deposit, &[], &overrides).await.unwrap();
        assert_eq!(transport.calls()[0].1.value, Some(U256::from(1)));
    }

    #[tokio::test]
    async fn revert_reason_is_decoded() {
        let data = abi::encode_function_call(
            ERROR_SELECTOR,
            &[ParamType::String],
            &[Token::String("Nursery: still in lockup".into())],
        )
        .unwrap();
        let transport = Arc::new(MockTransport::returning(CallOutcome::Revert(Bytes::from(data.clone()))));
        let dispatcher = Dispatcher::new(target(), transport);
        let withdraw = function("withdraw", &["uint256"], &[], StateMutability::NonPayable);

        let err = dispatcher
            .simulate(&withdraw, &[Token::Uint(U256::from(5))], &CallOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "withdraw(uint256) reverted: Nursery: still in lockup");
        assert_eq!(err.revert_data(), Some(data.as_slice()));
    }

    #[tokio::test]
    async fn send_and_estimate_surface_reverts() {
        let data = abi::encode_function_call(
            ERROR_SELECTOR,
            &[ParamType::String],
            &[Token::String("Nursery: not operator".into())],
        )
        .unwrap();
        let transport = Arc::new(MockTransport {
            tx_revert: Some(Bytes::from(data.clone())),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let set_operator = function("setOperator", &["address"], &[], StateMutability::NonPayable);
        let args = [Token::Address(Address::repeat_byte(0x01))];

        let err = dispatcher
            .send(&set_operator, &args, &CallOverrides::default())
            .await
            .unwrap_err();
        match &err {
            ContractError::Revert { signature, reason, data: raw } => {
                assert_eq!(signature, "setOperator(address)");
                assert_eq!(reason, "Nursery: not operator");
                assert_eq!(raw, &data);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = dispatcher
            .estimate_gas(&set_operator, &args, &CallOverrides::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "setOperator(address) reverted: Nursery: not operator");
        assert_eq!(err.revert_data(), Some(data.as_slice()));

        let kinds: Vec<&str> = transport.calls().iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, ["send", "estimate"]);
    }

    #[tokio::test]
    async fn estimate_revert_with_panic_code() {
        let mut data = crate::revert::PANIC_SELECTOR.to_vec();
        data.extend_from_slice(&word(0x11));
        let transport = Arc::new(MockTransport {
            tx_revert: Some(Bytes::from(data.clone())),
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(target(), transport);
        let withdraw = function("withdraw", &["uint256"], &[], StateMutability::NonPayable);

        let err = dispatcher
            .estimate_gas(&withdraw, &[Token::Uint(U256::MAX)], &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Revert { .. }));
        assert_eq!(err.revert_data(), Some(data.as_slice()));
        assert!(err.to_string().starts_with("withdraw(uint256) reverted: panic 0x11"), "{err}");
    }

    #[tokio::test]
    async fn transport_failure_keeps_source() {
        let transport = Arc::new(MockTransport {
            fail: true,
            ..Default::default()
        });
        let dispatcher = Dispatcher::new(target(), transport);
        let epoch = function("epoch", &[], &["uint256"], StateMutability::View);

        let err = dispatcher.simulate(&epoch, &[], &CallOverrides::default()).await.unwrap_err();
        match &err {
            ContractError::Transport { signature, source } => {
                assert_eq!(signature, "epoch()");
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn encoding_error_stops_before_transport() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let stake = function("stake", &["uint256"], &[], StateMutability::NonPayable);

        let err = dispatcher
            .simulate(&stake, &[Token::Bool(true)], &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ContractError::Codec {
                mode: CallMode::Simulate,
                source: AbiError::Encoding { index: 0, .. },
                ..
            }
        ));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn codec_errors_name_the_call() {
        let transport = Arc::new(MockTransport::returning(CallOutcome::Success(Bytes::from(vec![0u8; 8]))));
        let dispatcher = Dispatcher::new(target(), transport);
        let stake = function("stake", &["uint8"], &[], StateMutability::NonPayable);

        let err = dispatcher
            .simulate(&stake, &[Token::Uint(U256::from(300))], &CallOverrides::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stake(uint8)"), "{err}");
        assert!(err.to_string().contains("argument 0"), "{err}");

        let err = dispatcher
            .populate(&stake, &[Token::Uint(U256::from(300))], &CallOverrides::default())
            .unwrap_err();
        assert!(matches!(err, ContractError::Codec { mode: CallMode::Populate, .. }));

        let stake_for = function("stakeFor", &["uint8"], &["uint256"], StateMutability::View);
        let err = dispatcher
            .simulate(&stake_for, &[Token::Uint(U256::from(1))], &CallOverrides::default())
            .await
            .unwrap_err();
        match &err {
            ContractError::Codec { signature, mode, source } => {
                assert_eq!(signature, "stakeFor(uint8)");
                assert_eq!(*mode, CallMode::Simulate);
                assert!(matches!(source, AbiError::Decoding { index: 0, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().starts_with("call stakeFor(uint8): decoding error at output 0"), "{err}");
    }

    #[test]
    fn populate_builds_request_without_transport() {
        let transport = Arc::new(MockTransport::default());
        let dispatcher = Dispatcher::new(target(), Arc::clone(&transport));
        let set_lock_up = function("setLockUp", &["uint256", "uint256"], &[], StateMutability::NonPayable);

        let overrides = CallOverrides {
            gas_limit: Some(90_000),
            nonce: Some(3),
            ..Default::default()
        };
        let request = dispatcher
            .populate(
                &set_lock_up,
                &[Token::Uint(U256::from(2)), Token::Uint(U256::from(4))],
                &overrides,
            )
            .unwrap();

        assert_eq!(request.to, target());
        assert_eq!(request.gas_limit, Some(90_000));
        assert_eq!(request.nonce, Some(3));
        assert_eq!(request.data.len(), 4 + 64);
        assert_eq!(&request.data[4..36], &word(2)[..]);
        assert_eq!(&request.data[36..], &word(4)[..]);
        assert!(transport.calls().is_empty());
    }
}
