//! Control-flow-graph analysis.

use hashbrown::HashMap;

use crate::basic_block::BlockId;
use crate::function::Function;
use crate::instruction::Opcode;

/// A CFG node; indices refer into [`ControlFlowGraph::nodes`].
#[derive(Debug, Clone)]
pub struct Node {
    pub block: BlockId,
    pub predecessors: Vec<usize>,
    pub successors: Vec<usize>,
}

/// Predecessor/successor edges of a function's basic blocks, computed from
/// the branch targets of each block's terminator.
#[derive(Debug, Clone)]
pub struct ControlFlowGraph {
    pub nodes: Vec<Node>,
    block_indices: HashMap<BlockId, usize>,
}

impl ControlFlowGraph {
    pub fn compute(func: &Function) -> Self {
        let mut nodes = Vec::new();
        let mut block_indices = HashMap::new();

        for (id, _) in &func.blocks {
            block_indices.insert(id, nodes.len());
            nodes.push(Node {
                block: id,
                predecessors: Vec::new(),
                successors: Vec::new(),
            });
        }

        let mut cfg = Self {
            nodes,
            block_indices,
        };

        for (id, block) in &func.blocks {
            let from = cfg.block_indices[&id];
            let Some(last) = block.instrs.last() else {
                continue;
            };

            let instr = block.instrs.get(last);
            match instr.opcode {
                Opcode::Jmp => {
                    let to = cfg.block_indices[&instr.operand(0).branch_target().block];
                    cfg.add_edge(from, to);
                }
                Opcode::CJmp | Opcode::FCJmp => {
                    let true_to = cfg.block_indices[&instr.operand(3).branch_target().block];
                    let false_to = cfg.block_indices[&instr.operand(4).branch_target().block];
                    cfg.add_edge(from, true_to);
                    if true_to != false_to {
                        cfg.add_edge(from, false_to);
                    }
                }
                _ => {}
            }
        }

        cfg
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub fn index_of(&self, block: BlockId) -> usize {
        self.block_indices[&block]
    }

    /// Node indices in postorder starting from the entry node.
    pub fn postorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited = vec![false; self.nodes.len()];
        self.visit_postorder(0, &mut order, &mut visited);
        order
    }

    fn visit_postorder(&self, index: usize, order: &mut Vec<usize>, visited: &mut Vec<bool>) {
        visited[index] = true;

        for &succ in &self.nodes[index].successors {
            if !visited[succ] {
                self.visit_postorder(succ, order, visited);
            }
        }

        order.push(index);
    }

    fn add_edge(&mut self, from: usize, to: usize) {
        self.nodes[from].successors.push(to);
        self.nodes[to].predecessors.push(from);
    }
}
