//! 生產日曆模型
//!
//! 以「一週」為週期的停機時段。模擬時間 0 對應週一 00:00，
//! 日曆只依賴星期與當日時刻，與模擬起點、暖機長度、模擬時界無關。

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::{LineError, Result};

/// 一天的秒數
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// 一週的秒數（日曆週期）
pub const SECONDS_PER_WEEK: f64 = SECONDS_PER_DAY * 7.0;

const DAY_SECS: u32 = 86_400;

/// 停機時段
///
/// 在 `days` 所列的每一天，`[start, end)`（當日秒數）內禁止開始加工。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopWindow {
    /// 適用的星期
    pub days: Vec<Weekday>,

    /// 起始時刻（當日秒數）
    pub start: u32,

    /// 結束時刻（當日秒數，最大 86400 表示午夜）
    pub end: u32,
}

impl StopWindow {
    /// 創建新的停機時段（秒）
    pub fn new(days: Vec<Weekday>, start: u32, end: u32) -> Self {
        Self { days, start, end }
    }

    /// 以整點創建停機時段，例如 `hours(平日, 16, 24)`
    pub fn hours(days: Vec<Weekday>, start_hour: u32, end_hour: u32) -> Self {
        Self::new(days, start_hour * 3600, end_hour * 3600)
    }

    /// 驗證時段格式
    pub fn validate(&self) -> Result<()> {
        if self.days.is_empty() {
            return Err(LineError::InvalidCalendarWindow(
                "停機時段未指定任何星期".to_string(),
            ));
        }
        if self.start >= self.end {
            return Err(LineError::InvalidCalendarWindow(format!(
                "起始時刻 {} 必須早於結束時刻 {}",
                self.start, self.end
            )));
        }
        if self.end > DAY_SECS {
            return Err(LineError::InvalidCalendarWindow(format!(
                "結束時刻 {} 超過一天 ({})",
                self.end, DAY_SECS
            )));
        }
        Ok(())
    }

    fn applies_to(&self, day: u32) -> bool {
        self.days.iter().any(|d| d.num_days_from_monday() == day)
    }

    fn contains(&self, day: u32, time_of_day: f64) -> bool {
        self.applies_to(day)
            && f64::from(self.start) <= time_of_day
            && time_of_day < f64::from(self.end)
    }
}

/// 生產日曆
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionCalendar {
    /// 日曆ID
    pub calendar_id: String,

    /// 停機時段列表
    #[serde(default)]
    pub stop_windows: Vec<StopWindow>,
}

impl ProductionCalendar {
    /// 創建新的生產日曆（無停機時段，全天候生產）
    pub fn new(calendar_id: String) -> Self {
        Self {
            calendar_id,
            stop_windows: Vec::new(),
        }
    }

    /// 創建 24/7 日曆
    pub fn always_open() -> Self {
        Self::new("24/7".to_string())
    }

    /// 平日晚班停機：週一到週五 16:00–24:00
    pub fn weekday_evening_stop() -> Self {
        Self::new("WEEKDAY-EVENING-STOP".to_string()).with_window(StopWindow::hours(
            vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            16,
            24,
        ))
    }

    /// 建構器模式：添加停機時段（驗證延後到 `validate`）
    pub fn with_window(mut self, window: StopWindow) -> Self {
        self.stop_windows.push(window);
        self
    }

    /// 添加停機時段
    pub fn add_window(&mut self, window: StopWindow) -> Result<()> {
        window.validate()?;
        self.stop_windows.push(window);
        if let Err(err) = self.validate() {
            self.stop_windows.pop();
            return Err(err);
        }
        Ok(())
    }

    /// 驗證所有停機時段，並確認一週內至少有一段可生產時間
    pub fn validate(&self) -> Result<()> {
        for window in &self.stop_windows {
            window.validate()?;
        }
        if !self.stop_windows.is_empty() && (0..7).all(|day| self.day_fully_stopped(day)) {
            return Err(LineError::CalendarNeverOpen);
        }
        Ok(())
    }

    /// 計算在 `now` 時刻開始加工前必須等待的秒數
    ///
    /// 若 `now` 落在停機時段內，回傳距離停機結束的時間；相鄰或重疊的
    /// 時段會被串接，保證等待結束時不會落在任何停機時段內。
    /// 結果永遠 >= 0，且以一週為週期。
    pub fn production_wait_time(&self, now: f64) -> f64 {
        if self.stop_windows.is_empty() || !now.is_finite() {
            return 0.0;
        }

        let t = now.rem_euclid(SECONDS_PER_WEEK);
        // rem_euclid 可能因浮點誤差回傳恰好等於週期的值
        let t = if t >= SECONDS_PER_WEEK { 0.0 } else { t };
        let mut day = ((t / SECONDS_PER_DAY).floor() as u32).min(6);
        let mut time_of_day = t - f64::from(day) * SECONDS_PER_DAY;
        let mut waited = 0.0;

        // 每一輪至少前進到某個時段的結束，一週內最多 7 天 × 時段數 次
        let max_steps = 7 * self.stop_windows.len() + 1;
        for _ in 0..max_steps {
            let Some(end) = self.stop_end_at(day, time_of_day) else {
                break;
            };
            waited += end - time_of_day;
            if end >= SECONDS_PER_DAY {
                day = (day + 1) % 7;
                time_of_day = 0.0;
            } else {
                time_of_day = end;
            }
        }

        waited.max(0.0)
    }

    /// 檢查該時刻是否允許開始加工
    pub fn is_open(&self, now: f64) -> bool {
        self.production_wait_time(now) == 0.0
    }

    /// 該時刻所在停機時段中最晚的結束時刻
    fn stop_end_at(&self, day: u32, time_of_day: f64) -> Option<f64> {
        self.stop_windows
            .iter()
            .filter(|w| w.contains(day, time_of_day))
            .map(|w| f64::from(w.end))
            .reduce(f64::max)
    }

    fn day_fully_stopped(&self, day: u32) -> bool {
        let mut spans: Vec<(u32, u32)> = self
            .stop_windows
            .iter()
            .filter(|w| w.applies_to(day))
            .map(|w| (w.start, w.end))
            .collect();
        spans.sort_unstable();

        let mut covered = 0;
        for (start, end) in spans {
            if start > covered {
                return false;
            }
            covered = covered.max(end);
        }
        covered >= DAY_SECS
    }
}

impl Default for ProductionCalendar {
    fn default() -> Self {
        Self::always_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    const HOUR: f64 = 3600.0;

    #[test]
    fn test_always_open() {
        let calendar = ProductionCalendar::always_open();
        assert_eq!(calendar.production_wait_time(0.0), 0.0);
        assert_eq!(calendar.production_wait_time(17.0 * HOUR), 0.0);
        assert!(calendar.validate().is_ok());
    }

    #[rstest]
    #[case::monday_morning(8.0 * HOUR, 0.0)]
    #[case::monday_stop_start(16.0 * HOUR, 8.0 * HOUR)]
    #[case::monday_evening(20.5 * HOUR, 3.5 * HOUR)]
    #[case::friday_evening(4.0 * SECONDS_PER_DAY + 23.0 * HOUR, 1.0 * HOUR)]
    #[case::saturday_evening(5.0 * SECONDS_PER_DAY + 20.0 * HOUR, 0.0)]
    #[case::sunday_evening(6.0 * SECONDS_PER_DAY + 16.0 * HOUR, 0.0)]
    #[case::next_week_tuesday(SECONDS_PER_WEEK + SECONDS_PER_DAY + 18.0 * HOUR, 6.0 * HOUR)]
    fn test_weekday_evening_stop(#[case] now: f64, #[case] expected: f64) {
        let calendar = ProductionCalendar::weekday_evening_stop();
        assert_eq!(calendar.production_wait_time(now), expected);
    }

    #[test]
    fn test_chained_windows_cover_whole_stop() {
        // 週五 17:00 到週六 07:00 停機
        let calendar = ProductionCalendar::new("FRI-NIGHT".to_string())
            .with_window(StopWindow::hours(vec![Weekday::Fri], 17, 24))
            .with_window(StopWindow::hours(vec![Weekday::Sat], 0, 7));
        assert!(calendar.validate().is_ok());

        let friday_22 = 4.0 * SECONDS_PER_DAY + 22.0 * HOUR;
        assert_eq!(calendar.production_wait_time(friday_22), 9.0 * HOUR);
        assert!(calendar.is_open(5.0 * SECONDS_PER_DAY + 7.0 * HOUR));
    }

    #[test]
    fn test_overlapping_windows_use_latest_end() {
        let calendar = ProductionCalendar::new("OVERLAP".to_string())
            .with_window(StopWindow::hours(vec![Weekday::Mon], 10, 12))
            .with_window(StopWindow::hours(vec![Weekday::Mon], 11, 14));

        assert_eq!(calendar.production_wait_time(10.5 * HOUR), 3.5 * HOUR);
    }

    #[rstest]
    #[case::no_days(StopWindow::hours(vec![], 1, 2))]
    #[case::reversed(StopWindow::hours(vec![Weekday::Mon], 5, 4))]
    #[case::empty_span(StopWindow::hours(vec![Weekday::Mon], 4, 4))]
    #[case::past_midnight(StopWindow::new(vec![Weekday::Mon], 0, 90_000))]
    fn test_malformed_window_rejected(#[case] window: StopWindow) {
        let mut calendar = ProductionCalendar::new("BAD".to_string());
        assert!(calendar.add_window(window).is_err());
    }

    #[test]
    fn test_calendar_never_open_rejected() {
        let all_days = vec![
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ];
        let calendar = ProductionCalendar::new("CLOSED".to_string())
            .with_window(StopWindow::hours(all_days.clone(), 0, 12))
            .with_window(StopWindow::hours(all_days, 12, 24));

        assert!(matches!(
            calendar.validate(),
            Err(LineError::CalendarNeverOpen)
        ));
    }

    proptest! {
        #[test]
        fn prop_wait_time_is_weekly_periodic(secs in 0u64..(20 * 604_800), quarter in 0u8..4) {
            let calendar = ProductionCalendar::weekday_evening_stop()
                .with_window(StopWindow::hours(vec![Weekday::Sat], 0, 7));
            let t = secs as f64 + f64::from(quarter) * 0.25;
            prop_assert_eq!(
                calendar.production_wait_time(t),
                calendar.production_wait_time(t + SECONDS_PER_WEEK)
            );
        }

        #[test]
        fn prop_wait_time_is_non_negative_and_bounded(t in 0.0f64..1.0e8) {
            let calendar = ProductionCalendar::weekday_evening_stop();
            let wait = calendar.production_wait_time(t);
            prop_assert!(wait >= 0.0);
            prop_assert!(wait <= SECONDS_PER_DAY);
        }
    }
}
