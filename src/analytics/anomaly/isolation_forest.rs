//! Isolation Forest
//!
//! ランダム分割による孤立化の深さで異常度を測るアンサンブルモデル。
//! 同じシード・同じ入力なら同じ結果を返す。

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// オイラー・マスケローニ定数
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation Forest（学習前の設定）
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    random_state: u64,
}

/// 学習済みフォレスト
#[derive(Debug, Clone)]
pub struct FittedForest<const N: usize> {
    trees: Vec<IsolationTree>,
    /// 正規化に使う平均パス長 c(ψ)
    normalizer: f64,
    /// 判定閾値（score_samples のパーセンタイル）
    offset: f64,
}

/// 孤立木
#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl IsolationForest {
    /// 設定からモデルを作成
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            n_estimators: config.n_estimators,
            max_samples: config.max_samples,
            contamination: config.contamination,
            random_state: config.random_state,
        }
    }

    /// バッチで学習
    pub fn fit<const N: usize>(&self, data: &[[f64; N]]) -> Result<FittedForest<N>> {
        if data.is_empty() {
            return Err(Error::Computation(
                "Isolation forest requires at least one sample".to_string(),
            ));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(Error::Computation(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if data.iter().flatten().any(|v| !v.is_finite()) {
            return Err(Error::Computation(
                "Non-finite value in scaled features".to_string(),
            ));
        }

        let n = data.len();
        let subsample_size = self.max_samples.min(n).max(1);
        let max_depth = (subsample_size as f64).log2().ceil().max(0.0) as usize;
        let mut rng = StdRng::seed_from_u64(self.random_state);

        let trees: Vec<IsolationTree> = (0..self.n_estimators.max(1))
            .map(|_| {
                let mut indices = if subsample_size < n {
                    rand::seq::index::sample(&mut rng, n, subsample_size).into_vec()
                } else {
                    (0..n).collect()
                };
                IsolationTree {
                    root: build_node(data, &mut indices, 0, max_depth, &mut rng),
                }
            })
            .collect();

        let normalizer = match average_path_length(subsample_size) {
            c if c > 0.0 => c,
            _ => 1.0,
        };

        let mut forest = FittedForest {
            trees,
            normalizer,
            offset: 0.0,
        };

        let scores: Vec<f64> = data.iter().map(|x| forest.score_sample(x)).collect();
        forest.offset = percentile(&scores, 100.0 * self.contamination);

        debug!(
            samples = n,
            trees = forest.trees.len(),
            subsample_size,
            offset = forest.offset,
            "Isolation forest fitted"
        );

        Ok(forest)
    }

    /// 学習して同じバッチを判定
    pub fn fit_predict<const N: usize>(&self, data: &[[f64; N]]) -> Result<Vec<bool>> {
        let forest = self.fit(data)?;
        Ok(data.iter().map(|x| forest.predict(x)).collect())
    }
}

impl<const N: usize> FittedForest<N> {
    /// 異常スコア（0-1、大きいほど異常）
    pub fn anomaly_score(&self, x: &[f64; N]) -> f64 {
        let mean_path = self
            .trees
            .iter()
            .map(|tree| tree.path_length(x))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / self.normalizer)
    }

    /// 負の異常スコア（小さいほど異常）
    pub fn score_sample(&self, x: &[f64; N]) -> f64 {
        -self.anomaly_score(x)
    }

    /// 判定関数（負なら異常）
    pub fn decision_function(&self, x: &[f64; N]) -> f64 {
        self.score_sample(x) - self.offset
    }

    /// 異常判定
    pub fn predict(&self, x: &[f64; N]) -> bool {
        self.decision_function(x) < 0.0
    }
}

impl IsolationTree {
    fn path_length<const N: usize>(&self, x: &[f64; N]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold {
                        left.as_ref()
                    } else {
                        right.as_ref()
                    };
                    depth += 1.0;
                }
                Node::Leaf { size } => return depth + average_path_length(*size),
            }
        }
    }
}

/// ノードを再帰的に構築
fn build_node<const N: usize>(
    data: &[[f64; N]],
    indices: &mut [usize],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= max_depth || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    // 値に幅のある特徴量だけが分割候補
    let candidates: Vec<(usize, f64, f64)> = (0..N)
        .filter_map(|feature| {
            let (min, max) = indices.iter().map(|&i| data[i][feature]).fold(
                (f64::INFINITY, f64::NEG_INFINITY),
                |(lo, hi), v| (lo.min(v), hi.max(v)),
            );
            (max > min).then_some((feature, min, max))
        })
        .collect();

    if candidates.is_empty() {
        return Node::Leaf {
            size: indices.len(),
        };
    }

    let (feature, min, max) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(min..max);

    // threshold < max なので左右とも空にならない
    let split = partition(indices, |i| data[i][feature] <= threshold);
    let (left_indices, right_indices) = indices.split_at_mut(split);

    Node::Split {
        feature,
        threshold,
        left: Box::new(build_node(data, left_indices, depth + 1, max_depth, rng)),
        right: Box::new(build_node(data, right_indices, depth + 1, max_depth, rng)),
    }
}

/// 条件を満たす要素を前方に集め、その個数を返す
fn partition(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut split = 0;
    for j in 0..indices.len() {
        if pred(indices[j]) {
            indices.swap(split, j);
            split += 1;
        }
    }
    split
}

/// 二分探索木の失敗探索の平均パス長 c(n)
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// 線形補間によるパーセンタイル
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(contamination: f64, seed: u64) -> IsolationForest {
        IsolationForest::new(&ModelConfig {
            n_estimators: 100,
            contamination,
            random_state: seed,
            max_samples: 256,
        })
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(4) = 2 * (ln 3 + γ) - 1.5
        assert!((average_path_length(4) - 1.851_655_9).abs() < 1e-6);
    }

    #[test]
    fn test_percentile_interpolation() {
        assert_eq!(percentile(&[4.0, 1.0, 3.0, 2.0, 5.0], 50.0), 3.0);
        assert!((percentile(&[0.0, 10.0], 20.0) - 2.0).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 20.0), 7.0);
    }

    #[test]
    fn test_single_dominant_outlier() {
        let data = [[0.0], [0.0], [0.0], [0.0], [10.0]];
        let flags = model(0.2, 42).fit_predict(&data).unwrap();
        assert_eq!(flags, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_outlier_scores_higher() {
        let mut data: Vec<[f64; 2]> = (0..50).map(|i| [(i % 5) as f64, (i % 7) as f64]).collect();
        data.push([100.0, 100.0]);
        let forest = model(0.1, 7).fit(&data).unwrap();

        let outlier = forest.anomaly_score(&[100.0, 100.0]);
        let inlier = forest.anomaly_score(&[2.0, 3.0]);
        assert!(outlier > inlier);
        assert!(forest.predict(&[100.0, 100.0]));
    }

    #[test]
    fn test_deterministic_for_same_seed() {
        let data: Vec<[f64; 3]> = (0..40)
            .map(|i| {
                let x = i as f64;
                [x.sin(), (x * 0.3).cos(), (i % 4) as f64]
            })
            .collect();
        let first = model(0.2, 42).fit_predict(&data).unwrap();
        let second = model(0.2, 42).fit_predict(&data).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_constant_data_flags_nothing() {
        let data = [[0.0, 0.0]; 6];
        let flags = model(0.2, 1).fit_predict(&data).unwrap();
        assert!(flags.iter().all(|&f| !f));
    }

    #[test]
    fn test_single_sample() {
        let flags = model(0.2, 1).fit_predict(&[[0.0]]).unwrap();
        assert_eq!(flags, vec![false]);
    }

    #[test]
    fn test_rejects_empty_and_non_finite() {
        let empty: [[f64; 1]; 0] = [];
        assert!(model(0.2, 1).fit(&empty).is_err());
        assert!(model(0.2, 1).fit(&[[f64::NAN]]).is_err());
    }

    #[test]
    fn test_subsampling_large_batch() {
        let data: Vec<[f64; 1]> = (0..600).map(|i| [(i % 10) as f64]).collect();
        let forest = IsolationForest::new(&ModelConfig {
            n_estimators: 10,
            contamination: 0.1,
            random_state: 3,
            max_samples: 64,
        })
        .fit(&data)
        .unwrap();
        assert_eq!(forest.trees.len(), 10);
        assert!((forest.normalizer - average_path_length(64)).abs() < 1e-12);
    }
}
