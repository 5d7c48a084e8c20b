//! 產線拓撲配置模型

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{LineError, ProductionCalendar, Result};

/// 加工時間分佈（秒）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessTime {
    /// 固定加工時間
    Constant(f64),

    /// 均勻分佈 [min, max)
    Uniform { min: f64, max: f64 },

    /// 常態分佈（抽樣結果截斷於 0）
    Normal { mean: f64, std_dev: f64 },

    /// 指數分佈
    Exponential { mean: f64 },
}

impl ProcessTime {
    /// 期望加工時間
    pub fn mean(&self) -> f64 {
        match *self {
            ProcessTime::Constant(value) => value,
            ProcessTime::Uniform { min, max } => (min + max) / 2.0,
            ProcessTime::Normal { mean, .. } => mean,
            ProcessTime::Exponential { mean } => mean,
        }
    }

    /// 驗證分佈參數
    pub fn validate(&self, machine: &str) -> Result<()> {
        let ok = match *self {
            ProcessTime::Constant(value) => value.is_finite() && value > 0.0,
            ProcessTime::Uniform { min, max } => {
                min.is_finite() && max.is_finite() && min >= 0.0 && min < max
            }
            ProcessTime::Normal { mean, std_dev } => {
                mean.is_finite() && std_dev.is_finite() && mean > 0.0 && std_dev >= 0.0
            }
            ProcessTime::Exponential { mean } => mean.is_finite() && mean > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(LineError::InvalidProcessTime(format!("{}: {:?}", machine, self)))
        }
    }
}

impl From<f64> for ProcessTime {
    fn from(value: f64) -> Self {
        ProcessTime::Constant(value)
    }
}

/// 緩衝區類型
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChannelKind {
    /// 一般有界佇列；`capacity` 為 `None` 時不設上限（投料區、成品區）
    Plain {
        #[serde(default)]
        capacity: Option<usize>,
    },

    /// 輸送延遲緩衝區：在途與就緒工件合計不得超過 `capacity`
    Delay { capacity: usize, delay: f64 },
}

/// 緩衝區配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSpec {
    /// 緩衝區名稱
    pub name: String,

    /// 類型與容量
    #[serde(flatten)]
    pub kind: ChannelKind,
}

impl ChannelSpec {
    /// 有界佇列
    pub fn plain(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Plain {
                capacity: Some(capacity),
            },
        }
    }

    /// 無上限佇列
    pub fn unbounded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Plain { capacity: None },
        }
    }

    /// 輸送延遲緩衝區
    pub fn delay(name: impl Into<String>, capacity: usize, delay: f64) -> Self {
        Self {
            name: name.into(),
            kind: ChannelKind::Delay { capacity, delay },
        }
    }

    pub fn is_delay(&self) -> bool {
        matches!(self.kind, ChannelKind::Delay { .. })
    }

    /// 驗證容量與延遲
    pub fn validate(&self) -> Result<()> {
        match self.kind {
            ChannelKind::Plain { capacity: Some(0) } | ChannelKind::Delay { capacity: 0, .. } => {
                Err(LineError::InvalidCapacity(self.name.clone()))
            }
            ChannelKind::Delay { delay, .. } if !delay.is_finite() || delay < 0.0 => {
                Err(LineError::InvalidDelay {
                    name: self.name.clone(),
                    value: delay,
                })
            }
            _ => Ok(()),
        }
    }
}

/// 機台配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSpec {
    /// 機台名稱
    pub name: String,

    /// 上游緩衝區
    pub input: String,

    /// 下游緩衝區（良品）
    pub output: String,

    /// 加工時間（秒）
    pub process_time: ProcessTime,

    /// 可用率（百分比，(0, 100]）
    #[serde(default = "default_availability")]
    pub availability: f64,

    /// 平均修復時間（秒）
    #[serde(default)]
    pub mttr: f64,

    /// 加工功率（能耗單位 / 秒）
    #[serde(default)]
    pub working_power: f64,

    /// 待機功率（能耗單位 / 秒）
    #[serde(default)]
    pub waiting_power: f64,

    /// 同時加工數（工位數）
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// 不良率 [0, 1]
    #[serde(default)]
    pub defect_rate: Option<f64>,

    /// 不良品緩衝區
    #[serde(default)]
    pub defect_sink: Option<String>,
}

fn default_availability() -> f64 {
    100.0
}

fn default_capacity() -> usize {
    1
}

impl MachineSpec {
    /// 創建新的機台配置（可用率 100%、單工位、無能耗）
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        process_time: impl Into<ProcessTime>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            output: output.into(),
            process_time: process_time.into(),
            availability: default_availability(),
            mttr: 0.0,
            working_power: 0.0,
            waiting_power: 0.0,
            capacity: default_capacity(),
            defect_rate: None,
            defect_sink: None,
        }
    }

    /// 建構器模式：設置可用率與平均修復時間
    pub fn with_availability(mut self, availability: f64, mttr: f64) -> Self {
        self.availability = availability;
        self.mttr = mttr;
        self
    }

    /// 建構器模式：設置加工/待機功率
    pub fn with_power(mut self, working_power: f64, waiting_power: f64) -> Self {
        self.working_power = working_power;
        self.waiting_power = waiting_power;
        self
    }

    /// 建構器模式：設置工位數
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// 建構器模式：設置不良率與不良品緩衝區
    pub fn with_defects(mut self, defect_rate: f64, defect_sink: impl Into<String>) -> Self {
        self.defect_rate = Some(defect_rate);
        self.defect_sink = Some(defect_sink.into());
        self
    }

    /// 平均故障間隔時間 `mttr * a / (100 - a)`；可用率 100% 時為無限大
    pub fn mtbf(&self) -> f64 {
        if self.availability >= 100.0 {
            f64::INFINITY
        } else {
            self.mttr * self.availability / (100.0 - self.availability)
        }
    }

    /// 是否會發生故障
    pub fn can_break_down(&self) -> bool {
        self.availability < 100.0
    }

    /// 驗證機台參數（不含緩衝區引用）
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(LineError::InvalidCapacity(self.name.clone()));
        }

        if !(self.availability > 0.0 && self.availability <= 100.0) {
            return Err(LineError::InvalidAvailability {
                name: self.name.clone(),
                value: self.availability,
            });
        }

        if self.can_break_down() && !(self.mttr.is_finite() && self.mttr > 0.0) {
            return Err(LineError::InvalidMttr {
                name: self.name.clone(),
                value: self.mttr,
            });
        }

        for power in [self.working_power, self.waiting_power] {
            if !power.is_finite() || power < 0.0 {
                return Err(LineError::InvalidPower(self.name.clone()));
            }
        }

        self.process_time.validate(&self.name)?;

        match (self.defect_rate, &self.defect_sink) {
            (None, None) => Ok(()),
            (Some(rate), Some(_)) if (0.0..=1.0).contains(&rate) => Ok(()),
            (Some(rate), Some(_)) => Err(LineError::InvalidDefectRate(format!(
                "{}: {}",
                self.name, rate
            ))),
            _ => Err(LineError::InvalidDefectRate(format!(
                "{}: 不良率與不良品緩衝區必須同時設定",
                self.name
            ))),
        }
    }
}

/// 分流器：一進二出，依剩餘容量交替分配
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitterSpec {
    pub name: String,
    pub input: String,
    pub outputs: [String; 2],
}

impl SplitterSpec {
    pub fn new(
        name: impl Into<String>,
        input: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            outputs: [first.into(), second.into()],
        }
    }
}

/// 合流器：多進一出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergerSpec {
    pub name: String,
    pub inputs: Vec<String>,
    pub output: String,
}

impl MergerSpec {
    pub fn new(name: impl Into<String>, inputs: Vec<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs,
            output: output.into(),
        }
    }
}

/// 投料源配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// 投料目標緩衝區
    pub output: String,

    /// 投料間隔（秒）
    #[serde(default = "default_interarrival")]
    pub interarrival: f64,
}

fn default_interarrival() -> f64 {
    1.0
}

impl SourceSpec {
    pub fn new(output: impl Into<String>, interarrival: f64) -> Self {
        Self {
            output: output.into(),
            interarrival,
        }
    }
}

/// 產線配置（拓撲 + 生產日曆）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineConfig {
    /// 配置名稱
    pub name: String,

    /// 緩衝區
    pub channels: Vec<ChannelSpec>,

    /// 機台（依宣告順序建構）
    pub machines: Vec<MachineSpec>,

    #[serde(default)]
    pub splitters: Vec<SplitterSpec>,

    #[serde(default)]
    pub mergers: Vec<MergerSpec>,

    /// 投料源
    pub source: SourceSpec,

    /// 成品緩衝區（計算產出量）
    pub sink: String,

    /// 生產日曆
    #[serde(default)]
    pub calendar: ProductionCalendar,
}

impl LineConfig {
    /// 創建空的產線配置
    pub fn new(name: impl Into<String>, source: SourceSpec, sink: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channels: Vec::new(),
            machines: Vec::new(),
            splitters: Vec::new(),
            mergers: Vec::new(),
            source,
            sink: sink.into(),
            calendar: ProductionCalendar::default(),
        }
    }

    /// 建構器模式：添加緩衝區
    pub fn with_channel(mut self, channel: ChannelSpec) -> Self {
        self.channels.push(channel);
        self
    }

    /// 建構器模式：添加機台
    pub fn with_machine(mut self, machine: MachineSpec) -> Self {
        self.machines.push(machine);
        self
    }

    /// 建構器模式：添加分流器
    pub fn with_splitter(mut self, splitter: SplitterSpec) -> Self {
        self.splitters.push(splitter);
        self
    }

    /// 建構器模式：添加合流器
    pub fn with_merger(mut self, merger: MergerSpec) -> Self {
        self.mergers.push(merger);
        self
    }

    /// 建構器模式：設置生產日曆
    pub fn with_calendar(mut self, calendar: ProductionCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// 從 JSON 字串載入並驗證
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 從 JSON 檔案載入並驗證
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// 查找緩衝區
    pub fn channel(&self, name: &str) -> Option<&ChannelSpec> {
        self.channels.iter().find(|c| c.name == name)
    }

    /// 所有不良品緩衝區名稱（依機台順序、去重）
    pub fn defect_sinks(&self) -> Vec<&str> {
        let mut sinks: Vec<&str> = Vec::new();
        for sink in self.machines.iter().filter_map(|m| m.defect_sink.as_deref()) {
            if !sinks.contains(&sink) {
                sinks.push(sink);
            }
        }
        sinks
    }

    /// 完整驗證：參數範圍、名稱唯一性、緩衝區引用、日曆
    pub fn validate(&self) -> Result<()> {
        let mut channel_names = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !channel_names.insert(channel.name.as_str()) {
                return Err(LineError::DuplicateName(channel.name.clone()));
            }
        }

        let require = |name: &str| -> Result<()> {
            if channel_names.contains(name) {
                Ok(())
            } else {
                Err(LineError::UnknownChannel(name.to_string()))
            }
        };

        let mut node_names = HashSet::new();
        for machine in &self.machines {
            machine.validate()?;
            if !node_names.insert(machine.name.as_str()) {
                return Err(LineError::DuplicateName(machine.name.clone()));
            }
            require(&machine.input)?;
            require(&machine.output)?;
            if let Some(sink) = &machine.defect_sink {
                require(sink)?;
            }
        }

        for splitter in &self.splitters {
            if !node_names.insert(splitter.name.as_str()) {
                return Err(LineError::DuplicateName(splitter.name.clone()));
            }
            require(&splitter.input)?;
            for output in &splitter.outputs {
                require(output)?;
            }
            if splitter.outputs[0] == splitter.outputs[1] {
                return Err(LineError::DuplicateName(format!(
                    "{}: 兩個出口相同 ({})",
                    splitter.name, splitter.outputs[0]
                )));
            }
        }

        for merger in &self.mergers {
            if !node_names.insert(merger.name.as_str()) {
                return Err(LineError::DuplicateName(merger.name.clone()));
            }
            if merger.inputs.is_empty() {
                return Err(LineError::UnknownChannel(format!("{}: 未指定入口", merger.name)));
            }
            for input in &merger.inputs {
                require(input)?;
            }
            require(&merger.output)?;
        }

        require(&self.source.output)?;
        if !(self.source.interarrival.is_finite() && self.source.interarrival > 0.0) {
            return Err(LineError::InvalidRunParams(format!(
                "投料間隔必須為正數: {}",
                self.source.interarrival
            )));
        }

        require(&self.sink)?;
        self.calendar.validate()
    }

    /// 參考產線：M1 → M2 → [M3 ‖ M4] → M5（含不良品分流）
    ///
    /// ```
    /// use linesim_core::LineConfig;
    ///
    /// let line = LineConfig::reference_line();
    /// assert_eq!(line.machines.len(), 5);
    /// assert!(line.validate().is_ok());
    /// ```
    pub fn reference_line() -> Self {
        let working = 1.28 / 3600.0;
        let waiting = 1.25 / 3600.0;

        LineConfig::new("reference", SourceSpec::new("raw_input", 1.0), "sink")
            .with_channel(ChannelSpec::plain("raw_input", 1000))
            .with_channel(ChannelSpec::delay("buffer1", 2, 10.0))
            .with_channel(ChannelSpec::delay("buffer2", 2, 10.0))
            .with_channel(ChannelSpec::delay("buffer3", 2, 10.0))
            .with_channel(ChannelSpec::plain("branch1_out", 2))
            .with_channel(ChannelSpec::plain("branch2_out", 2))
            .with_channel(ChannelSpec::unbounded("sink"))
            .with_channel(ChannelSpec::unbounded("defects"))
            .with_machine(
                MachineSpec::new("M1", "raw_input", "buffer1", 5.0)
                    .with_availability(97.79, 74.0)
                    .with_power(working, waiting),
            )
            .with_machine(
                MachineSpec::new("M2", "buffer1", "buffer2", 20.0)
                    .with_availability(95.0, 100.0)
                    .with_power(working, waiting),
            )
            .with_machine(
                MachineSpec::new("M3parallel", "buffer2", "branch1_out", 15.0)
                    .with_availability(90.0, 80.0)
                    .with_power(working, waiting),
            )
            .with_machine(
                MachineSpec::new("M4parallel", "buffer2", "branch2_out", 15.0)
                    .with_availability(90.0, 80.0)
                    .with_power(working, waiting),
            )
            .with_merger(MergerSpec::new(
                "merge_parallel",
                vec!["branch1_out".to_string(), "branch2_out".to_string()],
                "buffer3",
            ))
            .with_machine(
                MachineSpec::new("M5", "buffer3", "sink", 25.0)
                    .with_availability(92.0, 90.0)
                    .with_power(working, waiting)
                    .with_defects(0.089, "defects"),
            )
            .with_calendar(ProductionCalendar::weekday_evening_stop())
    }
}
