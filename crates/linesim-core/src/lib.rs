//! # Line Simulation Core
//!
//! 產線模擬的核心資料模型、配置與驗證

pub mod calendar;
pub mod config;
pub mod part;
pub mod run;

// Re-export 主要類型
pub use calendar::{ProductionCalendar, StopWindow, SECONDS_PER_DAY, SECONDS_PER_WEEK};
pub use config::{
    ChannelKind, ChannelSpec, LineConfig, MachineSpec, MergerSpec, ProcessTime, SourceSpec,
    SplitterSpec,
};
pub use part::Part;
pub use run::{RunParams, Scenario};

/// 產線模擬錯誤類型
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    #[error("容量必須為正整數: {0}")]
    InvalidCapacity(String),

    #[error("可用率必須在 (0, 100] 之間: {name} = {value}")]
    InvalidAvailability { name: String, value: f64 },

    #[error("平均修復時間必須為正數: {name} = {value}")]
    InvalidMttr { name: String, value: f64 },

    #[error("功率不可為負數: {0}")]
    InvalidPower(String),

    #[error("加工時間參數無效: {0}")]
    InvalidProcessTime(String),

    #[error("不良率設定無效: {0}")]
    InvalidDefectRate(String),

    #[error("緩衝區延遲無效: {name} = {value}")]
    InvalidDelay { name: String, value: f64 },

    #[error("停機時段格式錯誤: {0}")]
    InvalidCalendarWindow(String),

    #[error("日曆整週皆為停機時段，產線永遠無法生產")]
    CalendarNeverOpen,

    #[error("找不到緩衝區: {0}")]
    UnknownChannel(String),

    #[error("名稱重複: {0}")]
    DuplicateName(String),

    #[error("模擬參數無效: {0}")]
    InvalidRunParams(String),

    #[error("模擬超過實際時間預算 {budget_secs:.1}s（模擬時間停在 {sim_time:.1}s）")]
    WallClockBudgetExceeded { budget_secs: f64, sim_time: f64 },

    #[error("配置解析錯誤: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("讀取配置檔失敗: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LineError>;
