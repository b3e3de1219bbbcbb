use crate::deps::nested_set::NestedSetForest;

/// Header of every dependency relation table
pub const DEPENDENCY_COLUMNS: [&str; 5] = ["head", "dependent", "udep", "left_anchor", "right_anchor"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinearizerState {
    Idle,
    Accumulating,    // The current segment has no root yet
    ReadyToClose,    // The current segment holds a root and closes with the next segment
}

/// One emitted edge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRow {
    pub head: Option<u64>,
    pub dependent: u64,
    pub label: String,
    pub left_anchor: u64,
    pub right_anchor: u64,
}

impl DependencyRow {
    pub fn into_fields(self) -> Vec<String> {
        vec![
            self.head.map(|h| h.to_string()).unwrap_or_default(),
            self.dependent.to_string(),
            self.label,
            self.left_anchor.to_string(),
            self.right_anchor.to_string(),
        ]
    }
}

#[derive(Debug)]
struct SegmentTrees {
    segment_id: String,
    forest: NestedSetForest,
}

/// Linearizes the trees of one dependency relation into nested-set rows.
///
/// Nodes of the current segment are buffered until the first token of a
/// later segment arrives, or the stream ends; the segment is closed right
/// then, so at most one segment is held in memory. Anchors are offset by a
/// cursor shared by the whole relation, so intervals are unique across segments.
#[derive(Debug)]
pub struct DependencyLinearizer {
    pub relation: String,
    anchor_right: u64,
    current: Option<SegmentTrees>,
    pub trees: u64,
    pub anomalies: u64,
}

impl DependencyLinearizer {
    pub fn new(relation: &str) -> Self {
        DependencyLinearizer {
            relation: relation.to_string(),
            anchor_right: 1,
            current: None,
            trees: 0,
            anomalies: 0,
        }
    }

    pub fn state(&self) -> LinearizerState {
        match &self.current {
            None => LinearizerState::Idle,
            Some(segment) if segment.forest.roots().is_empty() => LinearizerState::Accumulating,
            Some(_) => LinearizerState::ReadyToClose,
        }
    }

    pub fn anchor_right(&self) -> u64 {
        self.anchor_right
    }

    /// Nodes still held in memory
    pub fn buffered(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.forest.len())
    }

    /// Buffer one token's edge. The first token of a new segment closes the
    /// previous one and returns its rows.
    pub fn observe(
        &mut self,
        segment_id: &str,
        token_id: &str,
        head: Option<&str>,
        label: &str,
        row_id: u64,
    ) -> Vec<DependencyRow> {
        let mut rows = Vec::new();
        if self.current.as_ref().is_some_and(|s| s.segment_id != segment_id) {
            if let Some(done) = self.current.take() {
                self.close_segment(done, &mut rows);
            }
        }

        let current = self.current.get_or_insert_with(|| SegmentTrees {
            segment_id: segment_id.to_string(),
            forest: NestedSetForest::new(),
        });
        current.forest.push(token_id, head, label, row_id);
        rows
    }

    /// Close the segment still buffered
    pub fn finish(&mut self) -> Vec<DependencyRow> {
        let mut rows = Vec::new();
        if let Some(done) = self.current.take() {
            self.close_segment(done, &mut rows);
        }
        rows
    }

    fn close_segment(&mut self, segment: SegmentTrees, rows: &mut Vec<DependencyRow>) {
        let SegmentTrees { segment_id, mut forest } = segment;
        forest.link();
        let roots = forest.roots();

        if roots.is_empty() {
            self.anomalies += 1;
            tracing::warn!(
                relation = %self.relation,
                segment = %segment_id,
                nodes = forest.len(),
                "dependency tree without a root skipped"
            );
            return;
        }
        if roots.len() > 1 {
            self.anomalies += 1;
            tracing::warn!(
                relation = %self.relation,
                segment = %segment_id,
                roots = roots.len(),
                "segment holds several dependency roots, emitting one tree per root"
            );
        }

        for root in roots {
            let order = forest.compute_anchors(root);
            let anchor = self.anchor_right;
            for &idx in &order {
                let node = forest.node(idx);
                if node.consumed {
                    continue;
                }
                rows.push(DependencyRow {
                    head: node.parent.map(|p| forest.node(p).row_id),
                    dependent: node.row_id,
                    label: node.label.clone(),
                    left_anchor: anchor + node.left.unwrap_or_default(),
                    right_anchor: anchor + node.right.unwrap_or_default(),
                });
                forest.mark_consumed(idx);
            }
            self.anchor_right = anchor + forest.node(root).right.unwrap_or_default();
            self.trees += 1;
        }

        let orphans = forest.unconsumed();
        if orphans > 0 {
            self.anomalies += 1;
            tracing::warn!(
                relation = %self.relation,
                segment = %segment_id,
                orphans,
                "dependency nodes unreachable from any root dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_closes_when_the_next_one_starts() {
        let mut lin = DependencyLinearizer::new("deprel");
        assert_eq!(lin.state(), LinearizerState::Idle);

        // s1: 1 <- 2 (2's head is 1)
        assert!(lin.observe("s1", "1", None, "root", 1).is_empty());
        assert_eq!(lin.state(), LinearizerState::ReadyToClose);
        assert!(lin.observe("s1", "2", Some("1"), "obj", 2).is_empty());

        // s2 starts with a dependent: s1 is closed right away
        let rows = lin.observe("s2", "2", Some("1"), "nsubj", 4);
        assert_eq!(
            rows,
            vec![
                DependencyRow { head: None, dependent: 1, label: "root".into(), left_anchor: 1, right_anchor: 5 },
                DependencyRow { head: Some(1), dependent: 2, label: "obj".into(), left_anchor: 2, right_anchor: 4 },
            ]
        );
        assert_eq!(lin.state(), LinearizerState::Accumulating);
        assert_eq!(lin.anchor_right(), 5);
        assert_eq!(lin.buffered(), 1);

        assert!(lin.observe("s2", "1", None, "root", 3).is_empty());
        assert_eq!(lin.state(), LinearizerState::ReadyToClose);

        let rows = lin.finish();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].dependent, 3);
        assert_eq!((rows[0].left_anchor, rows[0].right_anchor), (5, 9));
        assert_eq!(rows[1].head, Some(3));
        assert_eq!(lin.state(), LinearizerState::Idle);
        assert_eq!(lin.trees, 2);
        assert_eq!(lin.anomalies, 0);
        assert_eq!(lin.buffered(), 0);
    }

    #[test]
    fn rootless_segments_do_not_accumulate() {
        let mut lin = DependencyLinearizer::new("deprel");
        lin.observe("s0", "1", None, "root", 1);
        let mut row_id = 1;
        for n in 1..=1000 {
            row_id += 1;
            let rows = lin.observe(&format!("s{}", n), "2", Some("1"), "dep", row_id);
            if n == 1 {
                assert_eq!(rows.len(), 1);
            } else {
                assert!(rows.is_empty());
            }
            assert!(lin.buffered() <= 2);
        }
        assert!(lin.finish().is_empty());
        assert_eq!(lin.trees, 1);
        assert_eq!(lin.anomalies, 1000);
        assert_eq!(lin.buffered(), 0);
        assert_eq!(lin.anchor_right(), 3);
    }

    #[test]
    fn tree_intervals_contain_descendants() {
        let mut lin = DependencyLinearizer::new("deprel");
        lin.observe("s1", "1", None, "root", 10);
        lin.observe("s1", "2", Some("1"), "amod", 11);
        lin.observe("s1", "3", Some("2"), "advmod", 12);
        let rows = lin.finish();
        let root = &rows[0];
        for row in &rows[1..] {
            assert!(root.left_anchor < row.left_anchor && row.right_anchor < root.right_anchor);
        }
        for row in &rows {
            assert_eq!((row.right_anchor - row.left_anchor) % 2, 0);
        }
        assert_eq!(root.right_anchor - root.left_anchor, 6);
    }

    #[test]
    fn rootless_segment_is_skipped_and_evicted() {
        let mut lin = DependencyLinearizer::new("deprel");
        lin.observe("s1", "1", Some("2"), "x", 1);
        lin.observe("s1", "2", Some("1"), "y", 2);
        let rows = lin.observe("s2", "1", None, "root", 3);
        assert!(rows.is_empty());
        assert_eq!(lin.anomalies, 1);
        assert_eq!(lin.buffered(), 1);
        assert_eq!(lin.anchor_right(), 1);
    }

    #[test]
    fn several_roots_emit_separate_trees() {
        let mut lin = DependencyLinearizer::new("deprel");
        lin.observe("s1", "1", None, "root", 1);
        lin.observe("s1", "2", Some("1"), "a", 2);
        lin.observe("s1", "3", None, "root", 3);
        lin.observe("s1", "4", Some("3"), "b", 4);
        lin.observe("s1", "5", Some("7"), "lost", 5);
        let rows = lin.finish();

        assert_eq!(rows.len(), 4);
        assert_eq!((rows[0].left_anchor, rows[0].right_anchor), (1, 5));
        assert_eq!((rows[2].left_anchor, rows[2].right_anchor), (5, 9));
        assert_eq!(rows[3].head, Some(3));
        assert_eq!(lin.trees, 2);
        assert_eq!(lin.anomalies, 2);
    }

    #[test]
    fn rows_render_empty_head_for_roots() {
        let row = DependencyRow { head: None, dependent: 4, label: "root".into(), left_anchor: 1, right_anchor: 3 };
        assert_eq!(row.into_fields(), vec!["", "4", "root", "1", "3"]);
    }
}
