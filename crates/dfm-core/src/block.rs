//! Block scoping and the builder API used to construct a pipeline graph.
//!
//! The source this platform is modeled on keeps "the current block" as an implicit
//! process-global stack that every `FunctionCall` constructor pushes itself onto. Per
//! the redesign note on process-wide mutable state, this crate keeps the stack but makes
//! it an explicit task-local handle (`BLOCK_STACK`) reached only through [`BlockBuilder`]
//! — node construction never has side effects on a hidden global, it goes through
//! `BlockBuilder::add_node`.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Error, Result};

/// A node's stable identifier within a process.
pub type NodeId = Uuid;

/// Handle to a node that has been added to a block, returned by
/// [`BlockBuilder::add_node`]. Used as the value callers pass when they want to
/// reference one node's output from another node's parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeHandle(NodeId);

impl NodeHandle {
    /// The underlying node id.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.0
    }
}

/// A parameter value before reference rewriting: either an opaque JSON scalar/array, a
/// single node reference, or a list of node references. [`BlockBuilder::add_node`]
/// rewrites `Ref`/`RefList` into plain JSON (a UUID string, or array of UUID strings)
/// before storing the node, matching the "any field whose value is itself a FunctionCall
/// is normalized to that call's node identifier" invariant.
#[derive(Clone, Debug)]
pub enum ParamValue {
    /// An opaque scalar or structured JSON value with no node references.
    Json(Value),
    /// A reference to another node's output.
    Ref(NodeHandle),
    /// A list of references to other nodes' output.
    RefList(Vec<NodeHandle>),
}

impl From<Value> for ParamValue {
    fn from(v: Value) -> Self {
        ParamValue::Json(v)
    }
}

impl From<NodeHandle> for ParamValue {
    fn from(h: NodeHandle) -> Self {
        ParamValue::Ref(h)
    }
}

fn rewrite(params: HashMap<String, ParamValue>) -> Map<String, Value> {
    params
        .into_iter()
        .map(|(k, v)| {
            let json = match v {
                ParamValue::Json(v) => v,
                ParamValue::Ref(h) => Value::String(h.id().to_string()),
                ParamValue::RefList(hs) => {
                    Value::Array(hs.into_iter().map(|h| Value::String(h.id().to_string())).collect())
                }
            };
            (k, json)
        })
        .collect()
}

/// A frozen function-call node: the discriminator, stable fields, and variant-specific
/// parameters with all node references already rewritten to node ids.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FunctionCall {
    /// Fully qualified discriminator used for polymorphic (de)serialization.
    pub api_class: String,
    /// Provider tag responsible for executing this node. Empty string means "unset,
    /// ask discovery to enumerate candidates."
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Stable unique identifier for this node within its process.
    pub node_id: NodeId,
    /// Whether this node's yielded values should be surfaced to the client.
    #[serde(default)]
    pub is_output: bool,
    /// Whether to ignore any cached result and recompute (does not cascade to inputs).
    #[serde(default)]
    pub force_compute: bool,
    /// Variant-specific parameters, with any `FunctionCall` references already
    /// rewritten to node ids.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

fn default_provider() -> String {
    "dfm".to_string()
}

/// An ordered mapping from node id to `FunctionCall`, in insertion order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct Block {
    body: Vec<(NodeId, FunctionCall)>,
}

impl Block {
    /// An empty block.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterate the block's nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &FunctionCall> {
        self.body.iter().map(|(_, fc)| fc)
    }

    /// Number of nodes in the block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the block has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&FunctionCall> {
        self.body.iter().find(|(nid, _)| *nid == id).map(|(_, fc)| fc)
    }

    fn add(&mut self, fc: FunctionCall) -> Result<()> {
        if self.get(fc.node_id).is_some() {
            return Err(Error::DuplicateNodeId(fc.node_id));
        }
        self.body.push((fc.node_id, fc));
        Ok(())
    }

    /// Validate that every reference in every node's params resolves to a node id
    /// present in this block. Does not check ancestor blocks; callers compiling a full
    /// process walk the block stack for that.
    pub fn resolve_local_refs(&self, id: NodeId, known: &dyn Fn(NodeId) -> bool) -> Result<()> {
        let fc = self.get(id).ok_or(Error::UnknownNodeId(id))?;
        for value in fc.params.values() {
            check_refs(value, known)?;
        }
        Ok(())
    }
}

fn check_refs(value: &Value, known: &dyn Fn(NodeId) -> bool) -> Result<()> {
    match value {
        Value::String(s) => {
            // Heuristic: a bare UUID-shaped string that doesn't resolve is only an
            // error for fields that are declared as references; full resolution is
            // the adapter compiler's job (dfm-registry). Here we only check values
            // that parse as UUIDs, since those are exactly what `rewrite` produces.
            if let Ok(uuid) = Uuid::parse_str(s) {
                if !known(uuid) {
                    return Err(Error::UnknownNodeId(uuid));
                }
            }
            Ok(())
        }
        Value::Array(items) => {
            for item in items {
                check_refs(item, known)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

tokio::task_local! {
    static BLOCK_STACK: RefCell<Vec<Block>>;
}

/// Handle used to construct nodes within the currently active block scope.
///
/// Obtained from [`with_block_scope`]; every call to [`BlockBuilder::add_node`] pushes
/// the constructed node onto whichever block is on top of the task-local stack at the
/// time of the call.
#[derive(Clone, Copy, Debug, Default)]
pub struct BlockBuilder {
    allow_outside_block: bool,
}

impl BlockBuilder {
    /// A builder that requires an active block scope (the production code path).
    #[must_use]
    pub fn new() -> Self {
        Self {
            allow_outside_block: false,
        }
    }

    /// A builder that tolerates constructing nodes with no active block scope,
    /// silently discarding them rather than erroring. Used by tests and by the
    /// `demos/` runnable examples that build a single node outside any `Process`.
    #[must_use]
    pub fn allow_outside_block() -> Self {
        Self {
            allow_outside_block: true,
        }
    }

    /// Push a new empty block onto the stack, returning its depth (for diagnostics).
    pub fn push_block(&self) -> Result<usize> {
        BLOCK_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                stack.push(Block::new());
                stack.len()
            })
            .map_err(|_| Error::NoSurroundingBlock)
    }

    /// Pop the top block off the stack and return it.
    pub fn pop_block(&self) -> Result<Block> {
        BLOCK_STACK
            .try_with(|stack| {
                let mut stack = stack.borrow_mut();
                stack.pop().ok_or(Error::EmptyBlockStack)
            })
            .map_err(|_| Error::EmptyBlockStack)?
    }

    /// Construct a `FunctionCall` and add it to the block on top of the stack.
    ///
    /// Reference-valued parameters are rewritten to node ids before storage. Fails
    /// with [`Error::NoSurroundingBlock`] unless a block scope is active or this
    /// builder was created with [`BlockBuilder::allow_outside_block`].
    pub fn add_node(
        &self,
        api_class: impl Into<String>,
        provider: impl Into<String>,
        node_id: Option<NodeId>,
        is_output: bool,
        force_compute: bool,
        params: HashMap<String, ParamValue>,
    ) -> Result<NodeHandle> {
        let node_id = node_id.unwrap_or_else(Uuid::new_v4);
        let fc = FunctionCall {
            api_class: api_class.into(),
            provider: provider.into(),
            node_id,
            is_output,
            force_compute,
            params: rewrite(params),
        };

        let pushed = BLOCK_STACK.try_with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.last_mut() {
                Some(block) => {
                    block.add(fc)?;
                    Ok(true)
                }
                None => Ok(false),
            }
        });

        match pushed {
            Ok(Ok(true)) => Ok(NodeHandle(node_id)),
            Ok(Ok(false)) | Err(_) => {
                if self.allow_outside_block {
                    Ok(NodeHandle(node_id))
                } else {
                    Err(Error::NoSurroundingBlock)
                }
            }
            Ok(Err(e)) => Err(e),
        }
    }
}

/// Run `f` with a fresh block scope active, returning the block it built alongside
/// `f`'s return value.
///
/// This is the entry point for constructing a `Process`'s top-level `Execute` body: it
/// establishes the task-local block stack, runs the closure (which typically calls
/// [`BlockBuilder::add_node`] any number of times, possibly nesting further scopes for
/// sub-blocks), and pops the resulting block back out.
pub fn with_block_scope<F, T>(f: F) -> Result<(Block, T)>
where
    F: FnOnce(&BlockBuilder) -> Result<T>,
{
    BLOCK_STACK.sync_scope(RefCell::new(Vec::new()), || {
        let builder = BlockBuilder::new();
        builder.push_block()?;
        let result = f(&builder);
        let block = builder.pop_block()?;
        result.map(|t| (block, t))
    })
}
