//! Dominator-tree analysis.

use crate::cfg::ControlFlowGraph;

/// A dominator-tree node; indices match the CFG's node indices.
#[derive(Debug, Clone)]
pub struct Node {
    /// The entry node is its own parent.
    pub parent_index: usize,
    pub children_indices: Vec<usize>,
}

/// Immediate dominators computed with the iterative algorithm over reverse
/// postorder (Cooper, Harvey, Kennedy).
#[derive(Debug, Clone)]
pub struct DominatorTree {
    pub nodes: Vec<Node>,
}

impl DominatorTree {
    pub fn compute(cfg: &ControlFlowGraph) -> Self {
        let num_nodes = cfg.nodes.len();
        let postorder = cfg.postorder();

        // Postorder number per node; unreachable nodes keep usize::MAX and
        // are ignored below.
        let mut postorder_number = vec![usize::MAX; num_nodes];
        for (number, &index) in postorder.iter().enumerate() {
            postorder_number[index] = number;
        }

        let mut idom: Vec<Option<usize>> = vec![None; num_nodes];
        idom[0] = Some(0);

        let mut changed = true;
        while changed {
            changed = false;

            for &index in postorder.iter().rev() {
                if index == 0 {
                    continue;
                }

                let mut new_idom = None;
                for &pred in &cfg.nodes[index].predecessors {
                    if idom[pred].is_none() {
                        continue;
                    }

                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => {
                            Self::intersect(&idom, &postorder_number, pred, current)
                        }
                    });
                }

                if let Some(new_idom) = new_idom {
                    if idom[index] != Some(new_idom) {
                        idom[index] = Some(new_idom);
                        changed = true;
                    }
                }
            }
        }

        let mut nodes: Vec<Node> = (0..num_nodes)
            .map(|index| Node {
                parent_index: idom[index].unwrap_or(0),
                children_indices: Vec::new(),
            })
            .collect();

        for index in 1..num_nodes {
            let parent = nodes[index].parent_index;
            if parent != index {
                nodes[parent].children_indices.push(index);
            }
        }

        Self { nodes }
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    fn intersect(
        idom: &[Option<usize>],
        postorder_number: &[usize],
        mut a: usize,
        mut b: usize,
    ) -> usize {
        while a != b {
            while postorder_number[a] < postorder_number[b] {
                a = idom[a].unwrap();
            }
            while postorder_number[b] < postorder_number[a] {
                b = idom[b].unwrap();
            }
        }
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_block::BasicBlock;
    use crate::function::{CallingConv, Function};
    use crate::instruction::{Instruction, Opcode};
    use crate::types::Type;
    use crate::value::Value;

    /// Diamond: entry -> a, b; a -> exit; b -> exit.
    #[test]
    fn test_diamond_dominators() {
        let mut func = Function::new("f", CallingConv::X86_64SysV, vec![], Type::Void);
        let entry = func.append_block(BasicBlock::new(""));
        let a = func.append_block(BasicBlock::new("a"));
        let b = func.append_block(BasicBlock::new("b"));
        let exit = func.append_block(BasicBlock::new("exit"));

        func.append_instr(
            entry,
            Instruction::new(
                Opcode::CJmp,
                vec![
                    Value::from_int_immediate(1, Type::I32),
                    Value::from_comparison(crate::Comparison::Eq),
                    Value::from_int_immediate(0, Type::I32),
                    Value::from_branch_target(a, vec![]),
                    Value::from_branch_target(b, vec![]),
                ],
            ),
        );
        func.append_instr(
            a,
            Instruction::new(Opcode::Jmp, vec![Value::from_branch_target(exit, vec![])]),
        );
        func.append_instr(
            b,
            Instruction::new(Opcode::Jmp, vec![Value::from_branch_target(exit, vec![])]),
        );
        func.append_instr(exit, Instruction::new(Opcode::Ret, vec![]));

        let cfg = ControlFlowGraph::compute(&func);
        let domtree = DominatorTree::compute(&cfg);

        // Entry dominates everything; the merge point's idom is the entry.
        assert_eq!(domtree.node(0).parent_index, 0);
        assert_eq!(domtree.node(1).parent_index, 0);
        assert_eq!(domtree.node(2).parent_index, 0);
        assert_eq!(domtree.node(3).parent_index, 0);
        assert_eq!(domtree.node(0).children_indices, vec![1, 2, 3]);
    }
}
