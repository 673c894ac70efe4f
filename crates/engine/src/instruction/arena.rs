//! Flat storage for lowered instructions.
//!
//! Each workflow owns one arena. Handles carry the arena's identity so a
//! handle from another workflow is rejected instead of silently aliasing a
//! foreign node. Nodes are never removed; unregistering an instruction only
//! drops it from the workflow's registration list.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use scanflow_types::MemoryRegister;
use tracing::{Level, debug, error, info, trace, warn};

use super::{CallbackFn, Instruction, ProcessResult, timed::TimedNode};
use crate::condition::Condition;

const LOG_TARGET: &str = "scanflow::instruction";

static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// Generation-checked handle to an instruction inside a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstructionId {
    arena: u64,
    index: usize,
}

impl InstructionId {
    /// Position of the instruction within its arena.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for InstructionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

pub(crate) enum NodeKind {
    Callback(CallbackFn),
    Log {
        level: Level,
        message: String,
    },
    Label(String),
    Jump(String),
    Condition {
        condition: Condition,
        alternative: Option<InstructionId>,
        result: bool,
    },
    Timed(TimedNode),
    Block(Vec<InstructionId>),
    SetStatus {
        name: String,
        level: i64,
        on: bool,
    },
    PutValue {
        name: String,
        namespace: String,
        value: serde_json::Value,
        persist: bool,
    },
}

pub(crate) struct Node {
    kind: NodeKind,
    next: Option<InstructionId>,
    /// Instruction this node was lowered into (block parent or branching
    /// instruction), `None` for top-level instructions.
    owner: Option<InstructionId>,
}

pub(crate) struct InstructionArena {
    id: u64,
    nodes: Vec<Node>,
}

impl Default for InstructionArena {
    fn default() -> Self {
        Self {
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
        }
    }
}

impl InstructionArena {
    pub(crate) fn contains(&self, id: InstructionId) -> bool {
        id.arena == self.id && id.index < self.nodes.len()
    }

    fn node(&self, id: InstructionId) -> &Node {
        debug_assert!(self.contains(id), "foreign instruction handle {id}");
        &self.nodes[id.index]
    }

    fn node_mut(&mut self, id: InstructionId) -> &mut Node {
        debug_assert!(self.contains(id), "foreign instruction handle {id}");
        &mut self.nodes[id.index]
    }

    pub(crate) fn owner(&self, id: InstructionId) -> Option<InstructionId> {
        self.node(id).owner
    }

    /// Lowers `instruction` (and everything nested in it) into the arena.
    pub(crate) fn insert(&mut self, instruction: Instruction, owner: Option<InstructionId>) -> InstructionId {
        let id = InstructionId {
            arena: self.id,
            index: self.nodes.len(),
        };
        // Reserve the slot first so nested instructions can name their owner.
        self.nodes.push(Node {
            kind: NodeKind::Label(String::new()),
            next: None,
            owner,
        });

        let kind = match instruction {
            Instruction::Callback(callback) => NodeKind::Callback(callback.callback),
            Instruction::Log(log) => NodeKind::Log {
                level: log.level,
                message: log.message,
            },
            Instruction::Label(name) => NodeKind::Label(name),
            Instruction::Jump(label) => NodeKind::Jump(label),
            Instruction::Condition(condition) => NodeKind::Condition {
                condition: condition.condition,
                alternative: condition.alternative.map(|alternative| self.insert(*alternative, Some(id))),
                result: false,
            },
            Instruction::WaitForTimer(wait) => NodeKind::Timed(TimedNode::wait(wait.timer)),
            Instruction::TimedCondition(timed) => {
                let alternative = timed.alternative.map(|alternative| self.insert(*alternative, Some(id)));
                NodeKind::Timed(TimedNode::condition(timed.timer, timed.condition, alternative))
            }
            Instruction::Block(block) => {
                let children: Vec<InstructionId> = block
                    .instructions
                    .into_iter()
                    .map(|child| self.insert(child, Some(id)))
                    .collect();
                for pair in children.windows(2) {
                    self.set_next(pair[0], Some(pair[1]));
                }
                NodeKind::Block(children)
            }
            Instruction::SetStatus { name, level, on } => NodeKind::SetStatus { name, level, on },
            Instruction::PutValue {
                name,
                namespace,
                value,
                persist,
            } => NodeKind::PutValue {
                name,
                namespace,
                value,
                persist,
            },
        };

        self.node_mut(id).kind = kind;
        id
    }

    /// Whether appending after `id` may rewrite its next link. Jumps only
    /// ever continue at their label.
    pub(crate) fn supports_next(&self, id: InstructionId) -> bool {
        !matches!(self.node(id).kind, NodeKind::Jump(_))
    }

    /// Sets the next link of `id`. For blocks the link is also handed down to
    /// the last child, so the block yields to whatever follows it.
    pub(crate) fn set_next(&mut self, id: InstructionId, next: Option<InstructionId>) {
        if !self.supports_next(id) {
            return;
        }
        let node = self.node_mut(id);
        node.next = next;
        if let NodeKind::Block(children) = &node.kind
            && let Some(last) = children.last().copied()
        {
            self.set_next(last, next);
        }
    }

    /// Binds a jump to its label.
    pub(crate) fn resolve_jump(&mut self, jump: InstructionId, target: InstructionId) {
        self.node_mut(jump).next = Some(target);
    }

    /// Nodes lowered into `id`: the alternative branch and block children.
    fn children(&self, id: InstructionId) -> Vec<InstructionId> {
        match &self.node(id).kind {
            NodeKind::Condition { alternative, .. } => alternative.iter().copied().collect(),
            NodeKind::Timed(timed) => timed.alternative().into_iter().collect(),
            NodeKind::Block(children) => children.clone(),
            _ => Vec::new(),
        }
    }

    /// `id` followed by every node nested in it, depth first.
    pub(crate) fn subtree(&self, id: InstructionId) -> Vec<InstructionId> {
        let mut nodes = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            nodes.push(current);
            let mut children = self.children(current);
            children.reverse();
            stack.extend(children);
        }
        nodes
    }

    pub(crate) fn label_name(&self, id: InstructionId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Label(name) => Some(name),
            _ => None,
        }
    }

    pub(crate) fn jump_label(&self, id: InstructionId) -> Option<&str> {
        match &self.node(id).kind {
            NodeKind::Jump(label) => Some(label),
            _ => None,
        }
    }

    /// Re-arms per-visit state when `id` becomes the pending instruction.
    pub(crate) fn reset(&mut self, id: InstructionId) {
        match &mut self.node_mut(id).kind {
            NodeKind::Timed(timed) => timed.reset(),
            NodeKind::Condition { result, .. } => *result = false,
            _ => {}
        }
    }

    pub(crate) fn process(&mut self, id: InstructionId, register: &mut dyn MemoryRegister) -> ProcessResult {
        match &mut self.node_mut(id).kind {
            NodeKind::Callback(callback) => (*callback)(register),
            NodeKind::Log { level, message } => {
                emit_log(*level, id, message);
                ProcessResult::ContinueImmediately
            }
            NodeKind::Label(_) | NodeKind::Jump(_) | NodeKind::Block(_) => ProcessResult::ContinueImmediately,
            NodeKind::Condition { condition, result, .. } => {
                *result = condition.evaluate(&*register);
                ProcessResult::ContinueImmediately
            }
            NodeKind::Timed(timed) => timed.process(&*register),
            NodeKind::SetStatus { name, level, on } => {
                register.set_status(*level, name, *on);
                ProcessResult::ContinueImmediately
            }
            NodeKind::PutValue {
                name,
                namespace,
                value,
                persist,
            } => {
                register.put_value(value.clone(), name, namespace, *persist);
                ProcessResult::ContinueImmediately
            }
        }
    }

    /// Successor of `id` after it has been processed.
    pub(crate) fn next_instruction(&self, id: InstructionId) -> Option<InstructionId> {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Condition { alternative, result, .. } => {
                if *result {
                    node.next
                } else {
                    *alternative
                }
            }
            NodeKind::Timed(timed) => timed.successor(node.next),
            NodeKind::Block(children) => children.first().copied().or(node.next),
            _ => node.next,
        }
    }
}

fn emit_log(level: Level, id: InstructionId, message: &str) {
    if level == Level::ERROR {
        error!(target: LOG_TARGET, instruction = %id, "{}", message);
    } else if level == Level::WARN {
        warn!(target: LOG_TARGET, instruction = %id, "{}", message);
    } else if level == Level::INFO {
        info!(target: LOG_TARGET, instruction = %id, "{}", message);
    } else if level == Level::DEBUG {
        debug!(target: LOG_TARGET, instruction = %id, "{}", message);
    } else {
        trace!(target: LOG_TARGET, instruction = %id, "{}", message);
    }
}
