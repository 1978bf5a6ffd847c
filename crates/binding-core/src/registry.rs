//! Immutable lookup of a contract's functions and events.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use alloy_primitives::B256;
use serde::Deserialize;
use tracing::debug;

use crate::error::AbiError;
use crate::event::{Event, EventParam};
use crate::function::{canonical_signature, Function, Param, StateMutability};
use crate::types::{split_top_level, ParamType};

/// Functions and events of one contract, keyed by canonical signature.
///
/// Built once from an ABI description and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    functions: BTreeMap<String, Arc<Function>>,
    functions_by_name: HashMap<String, Vec<String>>,
    selectors: HashMap<[u8; 4], String>,
    events: BTreeMap<String, Arc<Event>>,
    events_by_name: HashMap<String, Vec<String>>,
}

impl Registry {
    /// Builds a registry from declarations in ABI order.
    ///
    /// Declarations that normalize to the same signature collapse when they
    /// agree on mutability and output shape, and fail otherwise.
    pub fn new(functions: Vec<Function>, events: Vec<Event>) -> Result<Self, AbiError> {
        let mut registry = Registry::default();
        for function in functions {
            registry.insert_function(function)?;
        }
        for event in events {
            registry.insert_event(event)?;
        }

        debug!(
            functions = registry.functions.len(),
            events = registry.events.len(),
            "built contract registry"
        );
        Ok(registry)
    }

    /// Builds a registry from a standard JSON ABI array.
    ///
    /// Constructor, fallback, receive and error entries are skipped.
    pub fn from_json(json: &str) -> Result<Self, AbiError> {
        let entries: Vec<RawEntry> =
            serde_json::from_str(json).map_err(|e| AbiError::InvalidAbi(e.to_string()))?;

        let mut functions = Vec::new();
        let mut events = Vec::new();
        for entry in entries {
            match entry.entry_type.as_str() {
                "function" => functions.push(entry.into_function()?),
                "event" => events.push(entry.into_event()?),
                "constructor" | "fallback" | "receive" | "error" => {}
                other => return Err(AbiError::InvalidAbi(format!("unknown entry type {other}"))),
            }
        }

        Registry::new(functions, events)
    }

    fn insert_function(&mut self, function: Function) -> Result<(), AbiError> {
        let signature = function.signature();

        if let Some(existing) = self.functions.get(&signature) {
            if existing.state_mutability != function.state_mutability {
                return Err(AbiError::AmbiguousSignature {
                    signature,
                    reason: format!(
                        "declared both {} and {}",
                        existing.state_mutability, function.state_mutability
                    ),
                });
            }
            if existing.output_types() != function.output_types() {
                return Err(AbiError::AmbiguousSignature {
                    signature,
                    reason: "declared with different outputs".into(),
                });
            }
            return Ok(());
        }

        let selector = function.selector();
        if let Some(other) = self.selectors.get(&selector) {
            return Err(AbiError::AmbiguousSignature {
                signature,
                reason: format!("selector 0x{} collides with {other}", hex::encode(selector)),
            });
        }

        self.selectors.insert(selector, signature.clone());
        self.functions_by_name
            .entry(function.name.clone())
            .or_default()
            .push(signature.clone());
        self.functions.insert(signature, Arc::new(function));
        Ok(())
    }

    fn insert_event(&mut self, event: Event) -> Result<(), AbiError> {
        let signature = event.signature();

        if let Some(existing) = self.events.get(&signature) {
            let flags = |e: &Event| e.inputs.iter().map(|p| p.indexed).collect::<Vec<_>>();
            if existing.anonymous != event.anonymous || flags(existing) != flags(&event) {
                return Err(AbiError::AmbiguousSignature {
                    signature,
                    reason: "event declared with different indexing".into(),
                });
            }
            return Ok(());
        }

        self.events_by_name
            .entry(event.name.clone())
            .or_default()
            .push(signature.clone());
        self.events.insert(signature, Arc::new(event));
        Ok(())
    }

    /// Looks up a function by name; fails if the name is overloaded.
    pub fn function(&self, name: &str) -> Result<&Arc<Function>, AbiError> {
        match self.functions_by_name.get(name).map(Vec::as_slice) {
            Some([signature]) => self.function_by_signature(signature),
            Some([_, _, ..]) => Err(AbiError::AmbiguousName(name.to_string())),
            _ => Err(AbiError::UnknownFunction(name.to_string())),
        }
    }

    /// Looks up a function by signature, e.g. `setLockUp(uint, uint)`.
    ///
    /// Whitespace and the `uint`/`int` aliases are normalized first.
    pub fn function_by_signature(&self, signature: &str) -> Result<&Arc<Function>, AbiError> {
        let canonical = normalize_signature(signature)?;
        self.functions
            .get(&canonical)
            .ok_or(AbiError::UnknownFunction(canonical))
    }

    pub fn function_by_selector(&self, selector: [u8; 4]) -> Option<&Arc<Function>> {
        self.selectors
            .get(&selector)
            .and_then(|signature| self.functions.get(signature))
    }

    /// Functions in canonical signature order.
    pub fn functions(&self) -> impl Iterator<Item = &Arc<Function>> {
        self.functions.values()
    }

    /// Looks up an event by name; fails if the name is overloaded.
    pub fn event(&self, name: &str) -> Result<&Arc<Event>, AbiError> {
        match self.events_by_name.get(name).map(Vec::as_slice) {
            Some([signature]) => self.event_by_signature(signature),
            Some([_, _, ..]) => Err(AbiError::AmbiguousName(name.to_string())),
            _ => Err(AbiError::UnknownEvent(name.to_string())),
        }
    }

    pub fn event_by_signature(&self, signature: &str) -> Result<&Arc<Event>, AbiError> {
        let canonical = normalize_signature(signature)?;
        self.events
            .get(&canonical)
            .ok_or(AbiError::UnknownEvent(canonical))
    }

    /// Finds the non-anonymous event whose topic 0 is `topic`.
    pub fn event_by_topic(&self, topic: B256) -> Option<&Arc<Event>> {
        self.events
            .values()
            .find(|event| !event.anonymous && event.topic_hash() == topic)
    }

    pub fn events(&self) -> impl Iterator<Item = &Arc<Event>> {
        self.events.values()
    }
}

/// Normalizes `name(t1, t2)` to its canonical form.
pub fn normalize_signature(signature: &str) -> Result<String, AbiError> {
    let signature = signature.trim();
    let open = signature
        .find('(')
        .ok_or_else(|| AbiError::InvalidType(format!("missing parameter list in {signature}")))?;
    let params = signature[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| AbiError::InvalidType(format!("unbalanced parentheses in {signature}")))?;

    let kinds = split_top_level(params)?
        .into_iter()
        .map(ParamType::parse)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(canonical_signature(signature[..open].trim(), kinds.iter()))
}

// ---------------------------------------------------------------------------
// JSON ABI
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    #[serde(rename = "type", default = "default_entry_type")]
    entry_type: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<RawParam>,
    #[serde(default)]
    outputs: Vec<RawParam>,
    #[serde(default)]
    state_mutability: Option<StateMutability>,
    // Pre-0.5 ABIs describe mutability with these flags instead.
    #[serde(default)]
    constant: Option<bool>,
    #[serde(default)]
    payable: Option<bool>,
    #[serde(default)]
    anonymous: bool,
}

fn default_entry_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct RawParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    components: Vec<RawParam>,
    #[serde(default)]
    indexed: bool,
}

impl RawEntry {
    fn mutability(&self) -> StateMutability {
        match (self.state_mutability, self.constant, self.payable) {
            (Some(mutability), _, _) => mutability,
            (None, Some(true), _) => StateMutability::View,
            (None, _, Some(true)) => StateMutability::Payable,
            _ => StateMutability::NonPayable,
        }
    }

    fn into_function(self) -> Result<Function, AbiError> {
        if self.name.is_empty() {
            return Err(AbiError::InvalidAbi("function entry without a name".into()));
        }
        let state_mutability = self.mutability();
        let inputs = self.inputs.iter().map(RawParam::to_param).collect::<Result<Vec<_>, _>>()?;
        let outputs = self.outputs.iter().map(RawParam::to_param).collect::<Result<Vec<_>, _>>()?;
        Ok(Function::new(self.name, inputs, outputs, state_mutability))
    }

    fn into_event(self) -> Result<Event, AbiError> {
        if self.name.is_empty() {
            return Err(AbiError::InvalidAbi("event entry without a name".into()));
        }
        let inputs = self
            .inputs
            .iter()
            .map(|raw| -> Result<EventParam, AbiError> {
                Ok(EventParam::new(raw.name.clone(), raw.resolve()?, raw.indexed))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Event::new(self.name, inputs, self.anonymous))
    }
}

impl RawParam {
    fn to_param(&self) -> Result<Param, AbiError> {
        Ok(Param::new(self.name.clone(), self.resolve()?))
    }

    /// Resolves `tuple` types (with any array suffix) through `components`.
    fn resolve(&self) -> Result<ParamType, AbiError> {
        match self.kind.strip_prefix("tuple") {
            Some(suffix) => {
                let members = self
                    .components
                    .iter()
                    .map(RawParam::resolve)
                    .collect::<Result<Vec<_>, _>>()?;
                ParamType::parse(&format!("{}{suffix}", ParamType::Tuple(members)))
            }
            None => ParamType::parse(&self.kind),
        }
    }
}
