//! 模擬執行參數

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{LineConfig, LineError, Result};

/// 模擬執行參數
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunParams {
    /// 模擬時界（秒，從 0 起算）
    pub horizon: f64,

    /// 暖機時間（秒），期間統計不列入 KPI
    pub warmup: f64,

    /// 重複次數
    pub replications: usize,

    /// 基礎亂數種子，第 i 次重複使用 `base_seed + i`
    pub base_seed: u64,

    /// WIP 取樣間隔（秒）
    #[serde(default = "default_sample_interval")]
    pub wip_sample_interval: f64,

    /// 機台輪詢與加工的時間步長（秒）
    #[serde(default = "default_tick")]
    pub tick: f64,

    /// 整體模擬的實際時間預算（秒）
    #[serde(default)]
    pub wall_clock_budget_secs: Option<f64>,

    /// 是否平行執行各次重複
    #[serde(default)]
    pub parallel: bool,
}

fn default_sample_interval() -> f64 {
    60.0
}

fn default_tick() -> f64 {
    1.0
}

impl RunParams {
    /// 創建執行參數
    pub fn new(horizon: f64, warmup: f64) -> Self {
        Self {
            horizon,
            warmup,
            ..Self::default()
        }
    }

    /// 建構器模式：設置重複次數
    pub fn with_replications(mut self, replications: usize) -> Self {
        self.replications = replications;
        self
    }

    /// 建構器模式：設置基礎種子
    pub fn with_base_seed(mut self, base_seed: u64) -> Self {
        self.base_seed = base_seed;
        self
    }

    /// 建構器模式：設置 WIP 取樣間隔
    pub fn with_wip_sample_interval(mut self, interval: f64) -> Self {
        self.wip_sample_interval = interval;
        self
    }

    /// 建構器模式：設置時間步長
    pub fn with_tick(mut self, tick: f64) -> Self {
        self.tick = tick;
        self
    }

    /// 建構器模式：設置實際時間預算
    pub fn with_wall_clock_budget(mut self, budget: Duration) -> Self {
        self.wall_clock_budget_secs = Some(budget.as_secs_f64());
        self
    }

    /// 建構器模式：平行執行
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// 量測區間長度（秒）
    pub fn measured_duration(&self) -> f64 {
        (self.horizon - self.warmup).max(0.0)
    }

    /// 量測區間長度（小時）
    pub fn measured_hours(&self) -> f64 {
        self.measured_duration() / 3600.0
    }

    /// 實際時間預算；無法表示為 `Duration` 時視為未設定
    pub fn wall_clock_budget(&self) -> Option<Duration> {
        self.wall_clock_budget_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    /// 第 `index` 次重複的種子
    pub fn seed_for(&self, index: usize) -> u64 {
        self.base_seed.wrapping_add(index as u64)
    }

    /// 驗證參數
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(LineError::InvalidRunParams(msg));

        if !(self.warmup.is_finite() && self.warmup >= 0.0) {
            return invalid(format!("暖機時間必須 >= 0: {}", self.warmup));
        }
        if !(self.horizon.is_finite() && self.horizon > self.warmup) {
            return invalid(format!(
                "模擬時界 {} 必須大於暖機時間 {}",
                self.horizon, self.warmup
            ));
        }
        if self.replications == 0 {
            return invalid("重複次數至少為 1".to_string());
        }
        if !(self.wip_sample_interval.is_finite() && self.wip_sample_interval > 0.0) {
            return invalid(format!("WIP 取樣間隔必須為正數: {}", self.wip_sample_interval));
        }
        if !(self.tick.is_finite() && self.tick > 0.0) {
            return invalid(format!("時間步長必須為正數: {}", self.tick));
        }
        if let Some(budget) = self.wall_clock_budget_secs {
            if !(budget.is_finite() && budget > 0.0) {
                return invalid(format!("實際時間預算必須為正數: {}", budget));
            }
            if Duration::try_from_secs_f64(budget).is_err() {
                return invalid(format!("實際時間預算過大: {}", budget));
            }
        }
        Ok(())
    }
}

impl Default for RunParams {
    /// 30 天模擬、1 天暖機、10 次重複、種子 11
    fn default() -> Self {
        Self {
            horizon: 3600.0 * 24.0 * 30.0,
            warmup: 3600.0 * 24.0,
            replications: 10,
            base_seed: 11,
            wip_sample_interval: default_sample_interval(),
            tick: default_tick(),
            wall_clock_budget_secs: None,
            parallel: false,
        }
    }
}

/// 完整情境：產線配置 + 執行參數
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub line: LineConfig,

    #[serde(default)]
    pub run: RunParams,
}

impl Scenario {
    pub fn new(line: LineConfig, run: RunParams) -> Self {
        Self { line, run }
    }

    /// 驗證產線與執行參數
    pub fn validate(&self) -> Result<()> {
        self.line.validate()?;
        self.run.validate()
    }

    /// 從 JSON 字串載入並驗證
    pub fn from_json_str(json: &str) -> Result<Self> {
        let scenario: Self = serde_json::from_str(json)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// 從 JSON 檔案載入並驗證
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_default_params() {
        let params = RunParams::default();
        assert_eq!(params.replications, 10);
        assert_eq!(params.base_seed, 11);
        assert_eq!(params.measured_hours(), 29.0 * 24.0);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_seed_for_replication() {
        let params = RunParams::new(100.0, 0.0).with_base_seed(11);
        assert_eq!(params.seed_for(0), 11);
        assert_eq!(params.seed_for(3), 14);
    }

    #[rstest]
    #[case::horizon_before_warmup(RunParams::new(10.0, 20.0))]
    #[case::horizon_equals_warmup(RunParams::new(10.0, 10.0))]
    #[case::negative_warmup(RunParams::new(10.0, -1.0))]
    #[case::no_replications(RunParams::new(10.0, 0.0).with_replications(0))]
    #[case::zero_tick(RunParams::new(10.0, 0.0).with_tick(0.0))]
    #[case::zero_sampling(RunParams::new(10.0, 0.0).with_wip_sample_interval(0.0))]
    fn test_invalid_params(#[case] params: RunParams) {
        assert!(matches!(params.validate(), Err(LineError::InvalidRunParams(_))));
    }

    #[test]
    fn test_wall_clock_budget() {
        let params = RunParams::new(10.0, 0.0).with_wall_clock_budget(Duration::from_millis(1500));
        assert_eq!(params.wall_clock_budget(), Some(Duration::from_millis(1500)));
    }

    #[rstest]
    #[case::not_representable(1.0e20)]
    #[case::infinite(f64::INFINITY)]
    #[case::zero(0.0)]
    fn test_invalid_wall_clock_budget(#[case] secs: f64) {
        let mut params = RunParams::new(10.0, 0.0);
        params.wall_clock_budget_secs = Some(secs);
        assert!(matches!(params.validate(), Err(LineError::InvalidRunParams(_))));
        // 存取器不會 panic
        if secs > 0.0 {
            assert_eq!(params.wall_clock_budget(), None);
        }
    }

    #[test]
    fn test_scenario_from_json_uses_run_defaults() {
        let json = r#"{
            "line": {
                "name": "s",
                "channels": [{"name": "in", "kind": "plain"}, {"name": "out", "kind": "plain"}],
                "machines": [{"name": "A", "input": "in", "output": "out", "process_time": 2.0}],
                "source": {"output": "in"},
                "sink": "out"
            }
        }"#;
        let scenario = Scenario::from_json_str(json).unwrap();
        assert_eq!(scenario.run, RunParams::default());
        assert_eq!(scenario.line.machines[0].name, "A");
    }
}
