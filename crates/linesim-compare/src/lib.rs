//! # Line Configuration Comparison
//!
//! 比較多個產線配置的彙總 KPI：以其中一個為基準，計算各 KPI 的
//! 絕對差、百分比差與改善/惡化判定。

use linesim_core::{LineConfig, LineError, RunParams};
use linesim_engine::{AggregatedResult, ReplicationRunner};
use serde::{Deserialize, Serialize};

/// 比較錯誤
#[derive(Debug, thiserror::Error)]
pub enum CompareError {
    #[error("沒有可比較的配置")]
    NoCandidates,

    #[error("基準索引 {index} 超出範圍（共 {len} 個配置）")]
    BaselineOutOfRange { index: usize, len: usize },

    #[error("模擬失敗: {0}")]
    Simulation(#[from] LineError),
}

pub type Result<T> = std::result::Result<T, CompareError>;

/// 比較的 KPI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kpi {
    /// 產出率，越高越好
    Throughput,
    /// 平均在製品，越低越好
    Wip,
    /// 每件能耗，越低越好
    EnergyPerPart,
}

impl Kpi {
    pub const ALL: [Kpi; 3] = [Kpi::Throughput, Kpi::Wip, Kpi::EnergyPerPart];

    pub fn higher_is_better(self) -> bool {
        matches!(self, Kpi::Throughput)
    }

    pub fn name(self) -> &'static str {
        match self {
            Kpi::Throughput => "throughput",
            Kpi::Wip => "wip",
            Kpi::EnergyPerPart => "energy_per_part",
        }
    }

    fn value(self, result: &AggregatedResult) -> f64 {
        match self {
            Kpi::Throughput => result.mean_throughput,
            Kpi::Wip => result.mean_wip,
            Kpi::EnergyPerPart => result.mean_energy_per_part,
        }
    }
}

/// 判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Improved,
    Worsened,
    Unchanged,
}

/// 單一 KPI 相對基準的差異
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub kpi: Kpi,
    pub baseline: f64,
    pub candidate: f64,

    /// `candidate - baseline`
    pub absolute: f64,

    /// 百分比差；基準為 0 時為 `None`
    pub percent: Option<f64>,

    pub verdict: Verdict,
}

impl KpiDelta {
    /// 計算差異；`tolerance_pct` 內的變化視為不變
    pub fn new(kpi: Kpi, baseline: f64, candidate: f64, tolerance_pct: f64) -> Self {
        let absolute = candidate - baseline;
        let percent = if baseline == 0.0 {
            None
        } else {
            Some(absolute / baseline.abs() * 100.0)
        };

        let within_tolerance = match percent {
            Some(pct) => pct.abs() <= tolerance_pct,
            None => absolute == 0.0,
        };
        let verdict = if absolute == 0.0 || within_tolerance {
            Verdict::Unchanged
        } else if (absolute > 0.0) == kpi.higher_is_better() {
            Verdict::Improved
        } else {
            Verdict::Worsened
        };

        Self {
            kpi,
            baseline,
            candidate,
            absolute,
            percent,
            verdict,
        }
    }
}

/// 單一配置相對基準的比較
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateComparison {
    pub name: String,
    pub deltas: Vec<KpiDelta>,

    /// 最常出現在前三名瓶頸的機台
    pub top_bottleneck: Option<String>,
}

impl CandidateComparison {
    pub fn delta(&self, kpi: Kpi) -> Option<&KpiDelta> {
        self.deltas.iter().find(|d| d.kpi == kpi)
    }

    /// 是否所有 KPI 都沒有惡化，且至少一項改善
    pub fn dominates_baseline(&self) -> bool {
        self.deltas.iter().all(|d| d.verdict != Verdict::Worsened)
            && self.deltas.iter().any(|d| d.verdict == Verdict::Improved)
    }
}

/// 比較報告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub baseline: String,

    /// 所有配置（含基準本身），依輸入順序
    pub candidates: Vec<CandidateComparison>,
}

impl ComparisonReport {
    /// 指定 KPI 最佳的配置名稱
    pub fn best_by(&self, kpi: Kpi) -> Option<&str> {
        let better = |a: f64, b: f64| {
            if kpi.higher_is_better() {
                a > b
            } else {
                a < b
            }
        };

        let mut best: Option<(&str, f64)> = None;
        for candidate in &self.candidates {
            let Some(delta) = candidate.delta(kpi) else {
                continue;
            };
            match best {
                Some((_, value)) if !better(delta.candidate, value) => {}
                _ => best = Some((candidate.name.as_str(), delta.candidate)),
            }
        }
        best.map(|(name, _)| name)
    }
}

/// 以 `results[baseline]` 為基準比較所有配置
pub fn compare(
    results: &[(String, AggregatedResult)],
    baseline: usize,
    tolerance_pct: f64,
) -> Result<ComparisonReport> {
    if results.is_empty() {
        return Err(CompareError::NoCandidates);
    }
    let Some((baseline_name, base)) = results.get(baseline) else {
        return Err(CompareError::BaselineOutOfRange {
            index: baseline,
            len: results.len(),
        });
    };

    let candidates = results
        .iter()
        .map(|(name, result)| CandidateComparison {
            name: name.clone(),
            deltas: Kpi::ALL
                .iter()
                .map(|&kpi| KpiDelta::new(kpi, kpi.value(base), kpi.value(result), tolerance_pct))
                .collect(),
            top_bottleneck: result.bottleneck_frequency.first().map(|b| b.machine.clone()),
        })
        .collect();

    Ok(ComparisonReport {
        baseline: baseline_name.clone(),
        candidates,
    })
}

/// 配置比較器：以相同執行參數模擬每個配置後比較
pub struct ConfigComparator {
    params: RunParams,
    tolerance_pct: f64,
}

impl ConfigComparator {
    pub fn new(params: RunParams) -> Self {
        Self {
            params,
            tolerance_pct: 0.0,
        }
    }

    /// 建構器模式：設置「不變」判定容差（百分比）
    pub fn with_tolerance(mut self, tolerance_pct: f64) -> Self {
        self.tolerance_pct = tolerance_pct.max(0.0);
        self
    }

    /// 模擬所有配置（同一組種子）並以 `baseline` 為基準比較
    pub fn run(&self, configs: &[LineConfig], baseline: usize) -> Result<ComparisonReport> {
        if configs.is_empty() {
            return Err(CompareError::NoCandidates);
        }
        if baseline >= configs.len() {
            return Err(CompareError::BaselineOutOfRange {
                index: baseline,
                len: configs.len(),
            });
        }

        let mut results = Vec::with_capacity(configs.len());
        for config in configs {
            tracing::info!("模擬配置 {}", config.name);
            let runner = ReplicationRunner::new(config.clone(), self.params.clone())?;
            results.push((config.name.clone(), runner.run()?));
        }

        compare(&results, baseline, self.tolerance_pct)
    }
}
