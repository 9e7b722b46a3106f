//! Feature Scaling
//!
//! バッチ単位の標準化（平均0・分散1）。モデルはリクエストを跨いで保持しない。

/// 列ごとのZ-score標準化
#[derive(Debug, Clone, PartialEq)]
pub struct StandardScaler<const N: usize> {
    /// 各列の平均値
    pub means: [f64; N],
    /// 各列の標準偏差（母集団）。定数列は0
    pub std_devs: [f64; N],
}

impl<const N: usize> StandardScaler<N> {
    /// バッチから平均・標準偏差を学習
    pub fn fit(rows: &[[f64; N]]) -> Self {
        let mut means = [0.0; N];
        let mut std_devs = [0.0; N];
        if rows.is_empty() {
            return Self { means, std_devs };
        }

        let n = rows.len() as f64;
        for col in 0..N {
            let column = rows.iter().map(|row| row[col]);
            let (min, max) = column
                .clone()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                });
            let mean = column.clone().sum::<f64>() / n;
            means[col] = mean;

            // 全値が等しい列は分散0として扱う（丸め誤差で微小な分散が出ないように）
            if min == max {
                continue;
            }
            let variance = column.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            std_devs[col] = variance.sqrt();
        }

        Self { means, std_devs }
    }

    /// 標準化を適用。定数列は0になる
    pub fn transform(&self, rows: &[[f64; N]]) -> Vec<[f64; N]> {
        rows.iter()
            .map(|row| {
                let mut scaled = [0.0; N];
                for col in 0..N {
                    if self.std_devs[col] > 0.0 {
                        scaled[col] = (row[col] - self.means[col]) / self.std_devs[col];
                    }
                }
                scaled
            })
            .collect()
    }

    /// 学習と変換をまとめて実行
    pub fn fit_transform(rows: &[[f64; N]]) -> Vec<[f64; N]> {
        Self::fit(rows).transform(rows)
    }
}
