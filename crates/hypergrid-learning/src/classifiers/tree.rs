//! Histogram-based regression trees fitted to gradient statistics.
//!
//! Features are bucketed once per boosting run by a [`BinMapper`]; each
//! tree then finds splits by scanning per-bin sums of gradients and
//! hessians. Trees grow best-first: the leaf whose best split has the
//! largest gain is split next, until `max_leaf_nodes` is reached or no
//! leaf can be split.

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Hessian sums below this never form a child.
const MIN_HESSIAN_TO_SPLIT: f64 = 1e-3;

// =============================================================================
// Binning
// =============================================================================

/// Maps raw feature values to at most `max_bins` ordered buckets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinMapper {
    /// Per feature, ascending upper bounds of every bin except the last.
    thresholds: Vec<Vec<f64>>,
}

impl BinMapper {
    pub fn fit(x: ArrayView2<f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.max(2);
        let thresholds = x
            .columns()
            .into_iter()
            .map(|col| {
                let mut values: Vec<f64> = col.to_vec();
                values.sort_by(f64::total_cmp);
                values.dedup();
                if values.len() <= max_bins {
                    values.windows(2).map(|w| (w[0] + w[1]) / 2.0).collect()
                } else {
                    let mut cuts: Vec<f64> = (1..max_bins)
                        .map(|q| {
                            let pos = q * (values.len() - 1) / max_bins;
                            (values[pos] + values[pos + 1]) / 2.0
                        })
                        .collect();
                    cuts.dedup();
                    cuts
                }
            })
            .collect();
        Self { thresholds }
    }

    pub fn n_features(&self) -> usize {
        self.thresholds.len()
    }

    /// Number of bins used by `feature`.
    pub fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// Upper bound of `bin` for `feature`: values `<=` it fall left.
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.thresholds[feature][bin]
    }

    /// Bin index of every cell, `n_rows x n_features`.
    pub fn transform(&self, x: ArrayView2<f64>) -> Array2<u16> {
        let mut out = Array2::zeros(x.dim());
        for (j, cuts) in self.thresholds.iter().enumerate() {
            for (i, &v) in x.column(j).iter().enumerate() {
                out[[i, j]] = cuts.partition_point(|&t| t < v) as u16;
            }
        }
        out
    }
}

// =============================================================================
// Tree
// =============================================================================

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_leaf_nodes: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub l2_regularization: f64,
    /// Multiplies every leaf value.
    pub shrinkage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    gain: f64,
    feature: usize,
    bin: usize,
}

struct GrowingLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    split: Option<SplitInfo>,
}

impl RegressionTree {
    /// Grow a tree on the given rows of the binned matrix.
    pub fn fit(
        binned: &Array2<u16>,
        mapper: &BinMapper,
        gradients: &[f64],
        hessians: &[f64],
        rows: Vec<usize>,
        params: &TreeParams,
    ) -> Self {
        let mut tree = RegressionTree {
            nodes: vec![Node::Leaf { value: 0.0 }],
        };
        let mut root = GrowingLeaf {
            node: 0,
            rows,
            depth: 0,
            split: None,
        };
        root.split = find_best_split(binned, mapper, gradients, hessians, &root, params);
        let mut leaves = vec![root];
        let max_leaves = params.max_leaf_nodes.unwrap_or(usize::MAX);

        while leaves.len() < max_leaves {
            // Largest gain first
            let mut best: Option<(usize, f64)> = None;
            for (i, leaf) in leaves.iter().enumerate() {
                if let Some(split) = leaf.split {
                    if best.is_none_or(|(_, g)| split.gain > g) {
                        best = Some((i, split.gain));
                    }
                }
            }
            let Some((index, _)) = best else { break };

            let leaf = leaves.swap_remove(index);
            let Some(split) = leaf.split else { break };
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| usize::from(binned[[r, split.feature]]) <= split.bin);

            let left = tree.nodes.len();
            tree.nodes.push(Node::Leaf { value: 0.0 });
            tree.nodes.push(Node::Leaf { value: 0.0 });
            tree.nodes[leaf.node] = Node::Split {
                feature: split.feature,
                threshold: mapper.threshold(split.feature, split.bin),
                left,
                right: left + 1,
            };

            for (node, rows) in [(left, left_rows), (left + 1, right_rows)] {
                let mut child = GrowingLeaf {
                    node,
                    rows,
                    depth: leaf.depth + 1,
                    split: None,
                };
                child.split = find_best_split(binned, mapper, gradients, hessians, &child, params);
                leaves.push(child);
            }
        }

        for leaf in &leaves {
            let (g, h) = sums(gradients, hessians, &leaf.rows);
            tree.nodes[leaf.node] = Node::Leaf {
                value: params.shrinkage * -g / (h + params.l2_regularization),
            };
        }
        tree
    }

    pub fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], node: usize) -> usize {
            match &nodes[node] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

fn sums(gradients: &[f64], hessians: &[f64], rows: &[usize]) -> (f64, f64) {
    rows.iter()
        .fold((0.0, 0.0), |(g, h), &r| (g + gradients[r], h + hessians[r]))
}

fn find_best_split(
    binned: &Array2<u16>,
    mapper: &BinMapper,
    gradients: &[f64],
    hessians: &[f64],
    leaf: &GrowingLeaf,
    params: &TreeParams,
) -> Option<SplitInfo> {
    if params.max_depth.is_some_and(|d| leaf.depth >= d)
        || leaf.rows.len() < 2 * params.min_samples_leaf
    {
        return None;
    }
    let lambda = params.l2_regularization;
    let (g_total, h_total) = sums(gradients, hessians, &leaf.rows);
    let parent_score = g_total * g_total / (h_total + lambda);

    let mut best: Option<SplitInfo> = None;
    for feature in 0..mapper.n_features() {
        let n_bins = mapper.n_bins(feature);
        if n_bins < 2 {
            continue;
        }
        let mut hist = vec![(0.0f64, 0.0f64, 0usize); n_bins];
        for &r in &leaf.rows {
            let slot = &mut hist[usize::from(binned[[r, feature]])];
            slot.0 += gradients[r];
            slot.1 += hessians[r];
            slot.2 += 1;
        }

        let (mut g_left, mut h_left, mut n_left) = (0.0, 0.0, 0usize);
        for (bin, &(g, h, n)) in hist.iter().enumerate().take(n_bins - 1) {
            g_left += g;
            h_left += h;
            n_left += n;
            let n_right = leaf.rows.len() - n_left;
            if n_left < params.min_samples_leaf {
                continue;
            }
            if n_right < params.min_samples_leaf {
                break;
            }
            let h_right = h_total - h_left;
            if h_left < MIN_HESSIAN_TO_SPLIT || h_right < MIN_HESSIAN_TO_SPLIT {
                continue;
            }
            let g_right = g_total - g_left;
            let gain = g_left * g_left / (h_left + lambda) + g_right * g_right / (h_right + lambda)
                - parent_score;
            if gain > 1e-12 && best.is_none_or(|b| gain > b.gain) {
                best = Some(SplitInfo { gain, feature, bin });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn params(max_leaf_nodes: Option<usize>) -> TreeParams {
        TreeParams {
            max_leaf_nodes,
            max_depth: None,
            min_samples_leaf: 1,
            l2_regularization: 0.0,
            shrinkage: 1.0,
        }
    }

    #[test]
    fn test_bin_mapper_midpoints() {
        let x = array![[1.0], [3.0], [3.0], [5.0]];
        let mapper = BinMapper::fit(x.view(), 255);
        assert_eq!(mapper.n_bins(0), 3);
        assert_eq!(mapper.threshold(0, 0), 2.0);
        assert_eq!(
            mapper.transform(x.view()).column(0).to_vec(),
            vec![0, 1, 1, 2]
        );
    }

    #[test]
    fn test_bin_mapper_caps_bins() {
        let x = Array2::from_shape_fn((1000, 1), |(i, _)| i as f64);
        let mapper = BinMapper::fit(x.view(), 16);
        assert!(mapper.n_bins(0) <= 16);
        let binned = mapper.transform(x.view());
        assert_eq!(binned[[0, 0]], 0);
        assert_eq!(usize::from(binned[[999, 0]]), mapper.n_bins(0) - 1);
    }

    #[test]
    fn test_tree_separates_gradients() {
        // Rows 0-1 want a positive output, rows 2-3 a negative one
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let mapper = BinMapper::fit(x.view(), 255);
        let binned = mapper.transform(x.view());
        let g = [-1.0, -1.0, 1.0, 1.0];
        let h = [1.0; 4];

        let tree = RegressionTree::fit(&binned, &mapper, &g, &h, vec![0, 1, 2, 3], &params(None));
        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(tree.predict_row(array![0.5].view()), 1.0);
        assert_eq!(tree.predict_row(array![2.5].view()), -1.0);
    }

    #[test]
    fn test_max_leaf_nodes_and_depth() {
        let x = Array2::from_shape_fn((16, 1), |(i, _)| i as f64);
        let mapper = BinMapper::fit(x.view(), 255);
        let binned = mapper.transform(x.view());
        let g: Vec<f64> = (0..16).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let h = vec![1.0; 16];
        let rows: Vec<usize> = (0..16).collect();

        let tree = RegressionTree::fit(&binned, &mapper, &g, &h, rows.clone(), &params(Some(3)));
        assert!(tree.n_leaves() <= 3);

        let shallow = RegressionTree::fit(
            &binned,
            &mapper,
            &g,
            &h,
            rows,
            &TreeParams {
                max_depth: Some(1),
                ..params(None)
            },
        );
        assert!(shallow.depth() <= 1);
    }

    #[test]
    fn test_min_samples_leaf_blocks_split() {
        let x = array![[0.0], [1.0], [2.0]];
        let mapper = BinMapper::fit(x.view(), 255);
        let binned = mapper.transform(x.view());
        let tree = RegressionTree::fit(
            &binned,
            &mapper,
            &[-1.0, 1.0, 1.0],
            &[1.0; 3],
            vec![0, 1, 2],
            &TreeParams {
                min_samples_leaf: 2,
                ..params(None)
            },
        );
        assert_eq!(tree.n_leaves(), 1);
    }
}
