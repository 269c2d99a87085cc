//! Audio graph - owns nodes, their message queues and their output buffers

use core::marker::PhantomData;

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::algo;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use rtrb::{Consumer, Producer, RingBuffer};
use tracing::warn;

use crate::node::{AudioNode, NodeId, ProcessContext, BLOCK_SIZE};

/// Default capacity of a node's message queue.
pub const DEFAULT_QUEUE_SIZE: usize = 64;

/// Handle for sending messages to a node in an [`AudioGraph`].
///
/// Messages are buffered in a lock-free ring and applied at the start of the
/// node's next block.
pub struct NodeHandle<M: Send + 'static> {
    pub(crate) id: NodeId,
    pub(crate) sender: Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> NodeHandle<M> {
    /// Send a message to the node (applied next process cycle).
    ///
    /// Returns `Err(msg)` if the queue is full or the node has been removed.
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        if self.sender.is_abandoned() {
            return Err(msg);
        }
        self.sender.push(msg).map_err(|rtrb::PushError::Full(m)| m)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// True once the node behind this handle has been dropped from its graph.
    pub fn is_detached(&self) -> bool {
        self.sender.is_abandoned()
    }
}

// Type-erased wrapper so we can store heterogeneous nodes
trait ErasedNode: Send {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]);
}

struct NodeWrapper<N: AudioNode> {
    node: N,
    receiver: Consumer<N::Message>,
}

impl<N: AudioNode> ErasedNode for NodeWrapper<N> {
    fn process_erased(&mut self, ctx: &ProcessContext, inputs: &[Input], outputs: &mut [Buffer]) {
        let receiver = &mut self.receiver;
        let messages = core::iter::from_fn(|| receiver.pop().ok());
        self.node.process(ctx, messages, inputs, outputs);
    }
}

struct DaspAdapter {
    node: Box<dyn ErasedNode>,
    ctx: ProcessContext,
}

impl dasp_graph::Node for DaspAdapter {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        self.node.process_erased(&self.ctx, inputs, outputs);
    }
}

type InnerGraph = StableGraph<NodeData<DaspAdapter>, ()>;

/// An audio processing graph at a fixed sample rate.
///
/// Each block processes every node feeding the terminal (normally the sink)
/// once, upstream first; a node's inputs are the outputs its neighbours
/// produced earlier in the same block. Connections that would form a cycle
/// are refused.
pub struct AudioGraph {
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,

    node_indices: HashMap<NodeId, NodeIndex>,
    next_node_id: u32,

    terminal: Option<NodeIndex>,
}

impl AudioGraph {
    /// Create a new graph with the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: InnerGraph::with_capacity(64, 64),
            processor: Processor::with_capacity(64),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: BLOCK_SIZE,
            },
            node_indices: HashMap::new(),
            next_node_id: 0,
            terminal: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    pub fn len(&self) -> usize {
        self.node_indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_indices.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_indices.contains_key(&id)
    }

    /// Add a node, returns a handle for sending messages
    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeHandle<N::Message> {
        self.add_with_queue_size(node, DEFAULT_QUEUE_SIZE)
    }

    /// Add a node with a custom message queue size
    pub fn add_with_queue_size<N: AudioNode>(&mut self, node: N, queue_size: usize) -> NodeHandle<N::Message> {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;

        let (producer, consumer) = RingBuffer::new(queue_size.max(1));

        // sinks have no outputs, but dasp_graph still hands every node a buffer
        let buffers = vec![Buffer::SILENT; node.num_outputs().max(1)];
        let adapter = DaspAdapter {
            node: Box::new(NodeWrapper { node, receiver: consumer }),
            ctx: self.ctx,
        };

        let idx = self.graph.add_node(NodeData::new(adapter, buffers));
        self.node_indices.insert(id, idx);

        NodeHandle {
            id,
            sender: producer,
            _marker: PhantomData,
        }
    }

    /// Connect the output of `from` to an input of `to`.
    ///
    /// Returns `false` (and leaves the graph untouched) if either node is
    /// unknown or the edge would create a cycle. Connecting twice is a no-op.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> bool {
        let (Some(&from_idx), Some(&to_idx)) = (self.node_indices.get(&from), self.node_indices.get(&to)) else {
            warn!(?from, ?to, "connect: unknown node");
            return false;
        };

        if self.graph.find_edge(from_idx, to_idx).is_some() {
            return true;
        }

        if from_idx == to_idx || algo::has_path_connecting(&self.graph, to_idx, from_idx, None) {
            warn!(?from, ?to, "connect: edge would create a cycle");
            return false;
        }

        self.graph.add_edge(from_idx, to_idx, ());
        true
    }

    /// Remove the edge between `from` and `to`. Returns whether it existed.
    pub fn disconnect(&mut self, from: NodeId, to: NodeId) -> bool {
        let (Some(&from_idx), Some(&to_idx)) = (self.node_indices.get(&from), self.node_indices.get(&to)) else {
            return false;
        };

        match self.graph.find_edge(from_idx, to_idx) {
            Some(edge) => {
                self.graph.remove_edge(edge);
                true
            }
            None => false,
        }
    }

    /// Remove a node and all of its connections.
    ///
    /// The node is dropped here, which abandons its message queue: the
    /// matching [`NodeHandle`] reports [`is_detached`](NodeHandle::is_detached)
    /// from now on. Returns whether the node existed.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(idx) = self.node_indices.remove(&id) else { return false };
        self.graph.remove_node(idx);
        if self.terminal == Some(idx) {
            self.terminal = None;
        }
        true
    }

    /// Set which node to process to (typically a sink). Returns whether the
    /// node exists.
    pub fn set_terminal(&mut self, id: NodeId) -> bool {
        match self.node_indices.get(&id) {
            Some(&idx) => {
                self.terminal = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Process one block of audio through the graph
    pub fn process(&mut self) {
        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.graph, terminal);
        }
    }
}
