//! 工件模型

use serde::{Deserialize, Serialize};

/// 在產線上流動的工件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    /// 工件序號（由投料源遞增產生）
    pub id: u64,

    /// 品檢結果
    /// - `None`: 尚未經過可產生不良的機台
    /// - `Some(true)`: 判定不良，送往不良品區
    /// - `Some(false)`: 判定良品
    pub defect: Option<bool>,
}

impl Part {
    /// 創建新的工件
    pub fn new(id: u64) -> Self {
        Self { id, defect: None }
    }

    /// 標記品檢結果
    pub fn mark_inspected(&mut self, defective: bool) {
        self.defect = Some(defective);
    }

    pub fn is_defective(&self) -> bool {
        self.defect == Some(true)
    }
}
