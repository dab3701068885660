/// Range-maximum segment tree over a fixed series of yields
#[derive(Debug, Clone)]
pub struct SegmentTree {
    root: Option<Box<SegmentNode>>,
    len: usize,
}

#[derive(Debug, Clone)]
struct SegmentNode {
    start: usize,
    end: usize,
    value: f64,
    left: Option<Box<SegmentNode>>,
    right: Option<Box<SegmentNode>>,
}

impl SegmentNode {
    fn build(values: &[f64], start: usize, end: usize) -> Box<SegmentNode> {
        if start == end {
            return Box::new(SegmentNode {
                start,
                end,
                value: values[start],
                left: None,
                right: None,
            });
        }

        let mid = start + (end - start) / 2;
        let left = SegmentNode::build(values, start, mid);
        let right = SegmentNode::build(values, mid + 1, end);
        Box::new(SegmentNode {
            start,
            end,
            value: left.value.max(right.value),
            left: Some(left),
            right: Some(right),
        })
    }

    fn query(&self, lo: usize, hi: usize) -> f64 {
        if hi < self.start || lo > self.end {
            return f64::NEG_INFINITY;
        }
        if lo <= self.start && self.end <= hi {
            return self.value;
        }

        let left = self.left.as_ref().map_or(f64::NEG_INFINITY, |n| n.query(lo, hi));
        let right = self.right.as_ref().map_or(f64::NEG_INFINITY, |n| n.query(lo, hi));
        left.max(right)
    }
}

impl SegmentTree {
    pub fn build(values: &[f64]) -> Self {
        let root = (!values.is_empty()).then(|| SegmentNode::build(values, 0, values.len() - 1));
        Self { root, len: values.len() }
    }

    /// Maximum over the inclusive range `[lo, hi]`.
    ///
    /// Returns `f64::NEG_INFINITY` when the range does not overlap the series.
    pub fn query(&self, lo: usize, hi: usize) -> f64 {
        match &self.root {
            Some(root) if lo <= hi => root.query(lo, hi),
            _ => f64::NEG_INFINITY,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_query_ranges() {
        let tree = SegmentTree::build(&[0.05, 0.12, 0.08, 0.30, 0.02]);

        assert_eq!(tree.query(0, 4), 0.30);
        assert_eq!(tree.query(0, 2), 0.12);
        assert_eq!(tree.query(4, 4), 0.02);
        assert_eq!(tree.query(2, 10), 0.30);
    }

    #[test]
    fn test_no_overlap() {
        let tree = SegmentTree::build(&[1.0, 2.0]);
        assert_eq!(tree.query(5, 9), f64::NEG_INFINITY);
        assert_eq!(tree.query(1, 0), f64::NEG_INFINITY);

        let empty = SegmentTree::build(&[]);
        assert!(empty.is_empty());
        assert_eq!(empty.query(0, 0), f64::NEG_INFINITY);
    }

    proptest! {
        #[test]
        fn prop_query_matches_slice_max(
            values in prop::collection::vec(-1.0f64..1.0, 1..64),
            a in 0usize..64,
            b in 0usize..64,
        ) {
            let tree = SegmentTree::build(&values);
            let lo = a.min(b) % values.len();
            let hi = (a.max(b) % values.len()).max(lo);

            let expected = values[lo..=hi].iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert_eq!(tree.query(lo, hi), expected);
        }
    }
}
