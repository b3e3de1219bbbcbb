use std::collections::HashMap;

/// One dependency node. Links are indices into the owning forest.
#[derive(Debug, Clone)]
pub struct NestedSetNode {
    pub token_id: String,
    pub head: Option<String>,
    pub label: String,
    pub row_id: u64,            // Row id of the token in the token table
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub left: Option<u64>,      // Unset until anchors are computed
    pub right: Option<u64>,
    pub consumed: bool,
}

/// Arena of the dependency nodes buffered for one segment
#[derive(Debug, Clone, Default)]
pub struct NestedSetForest {
    nodes: Vec<NestedSetNode>,
    by_token: HashMap<String, usize>,
    linked: bool,
}

impl NestedSetForest {
    pub fn new() -> Self {
        NestedSetForest::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &NestedSetNode {
        &self.nodes[idx]
    }

    pub fn push(&mut self, token_id: &str, head: Option<&str>, label: &str, row_id: u64) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(NestedSetNode {
            token_id: token_id.to_string(),
            head: head.map(str::to_string),
            label: label.to_string(),
            row_id,
            parent: None,
            children: Vec::new(),
            left: None,
            right: None,
            consumed: false,
        });
        self.by_token.insert(token_id.to_string(), idx);
        self.linked = false;
        idx
    }

    /// Attach every node to its head; heads outside the forest stay unlinked
    pub fn link(&mut self) {
        if self.linked {
            return;
        }
        for node in &mut self.nodes {
            node.parent = None;
            node.children.clear();
        }
        for idx in 0..self.nodes.len() {
            let Some(head) = &self.nodes[idx].head else {
                continue;
            };
            let Some(&parent) = self.by_token.get(head) else {
                continue;
            };
            if parent == idx {
                continue;
            }
            self.nodes[idx].parent = Some(parent);
            self.nodes[parent].children.push(idx);
        }
        self.linked = true;
    }

    /// Root nodes in arrival order
    pub fn roots(&self) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&i| self.nodes[i].head.is_none())
            .collect()
    }

    /// Nested-set numbering of the tree under `root`, relative to 0.
    ///
    /// The counter moves once on entry and once on exit, so a subtree of `n`
    /// nodes spans `2n` positions and sibling intervals are disjoint.
    /// Returns the visited nodes in pre-order.
    pub fn compute_anchors(&mut self, root: usize) -> Vec<usize> {
        self.link();
        let mut order = vec![root];
        let mut counter = 0u64;
        self.nodes[root].left = Some(counter);
        counter += 1;

        let mut stack = vec![(root, 0usize)];
        while let Some(&(node, next_child)) = stack.last() {
            if let Some(&child) = self.nodes[node].children.get(next_child) {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                self.nodes[child].left = Some(counter);
                counter += 1;
                order.push(child);
                stack.push((child, 0));
            } else {
                counter += 1;
                self.nodes[node].right = Some(counter);
                stack.pop();
            }
        }
        order
    }

    pub fn mark_consumed(&mut self, idx: usize) {
        self.nodes[idx].consumed = true;
    }

    pub fn unconsumed(&self) -> usize {
        self.nodes.iter().filter(|n| !n.consumed).count()
    }
}
