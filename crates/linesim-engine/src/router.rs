//! 分流與合流
//!
//! 合流器拆成每個入口一個轉送行程，各自依到達順序把工件送往共用出口。

use crate::channel::{Channel, ChannelId, PartBuffer, PutStatus};
use crate::line::{Activity, Event, LineState, ProcessId};
use crate::scheduler::Scheduler;

/// 路由方式
#[derive(Debug, Clone, Copy)]
pub enum RouteKind {
    /// 一進二出；`toggle` 指向偏好出口
    Split { outputs: [ChannelId; 2], toggle: usize },

    /// 一進一出（合流器的單一入口）
    Forward { output: ChannelId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouterState {
    Fetch,
    AwaitInput,
    AwaitOutput,
}

/// 路由行程
#[derive(Debug)]
pub struct Router {
    name: String,
    input: ChannelId,
    kind: RouteKind,
    state: RouterState,
    routed: [u64; 2],
}

impl Router {
    /// 分流器
    pub fn splitter(name: impl Into<String>, input: ChannelId, outputs: [ChannelId; 2]) -> Self {
        Self::new(name, input, RouteKind::Split { outputs, toggle: 0 })
    }

    /// 合流器的單一入口轉送
    pub fn forwarder(name: impl Into<String>, input: ChannelId, output: ChannelId) -> Self {
        Self::new(name, input, RouteKind::Forward { output })
    }

    fn new(name: impl Into<String>, input: ChannelId, kind: RouteKind) -> Self {
        Self {
            name: name.into(),
            input,
            kind,
            state: RouterState::Fetch,
            routed: [0, 0],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 各出口累計送出件數（轉送器只使用第一格）
    pub fn routed(&self) -> [u64; 2] {
        self.routed
    }

    /// 選擇出口
    ///
    /// 偏好出口仍有空間時送往偏好出口並切換偏好；否則改送另一個出口，偏好不變。
    fn choose_output(&mut self, channels: &[Channel]) -> (usize, ChannelId) {
        match &mut self.kind {
            RouteKind::Forward { output } => (0, *output),
            RouteKind::Split { outputs, toggle } => {
                let preferred = *toggle;
                if channels[outputs[preferred].0].free_capacity() > 0 {
                    *toggle ^= 1;
                    (preferred, outputs[preferred])
                } else {
                    let alternate = preferred ^ 1;
                    (alternate, outputs[alternate])
                }
            }
        }
    }
}

impl Activity for Router {
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>) {
        loop {
            match self.state {
                RouterState::AwaitOutput => {
                    self.state = RouterState::Fetch;
                }
                RouterState::AwaitInput => {
                    // 有新工件到達，重新嘗試取料
                    self.state = RouterState::Fetch;
                }
                RouterState::Fetch => {
                    let Some(part) = line.channels[self.input.0].get(me, sched) else {
                        self.state = RouterState::AwaitInput;
                        return;
                    };

                    let (slot, target) = self.choose_output(&line.channels);
                    self.routed[slot] += 1;
                    match line.channels[target.0].put(part, me, sched) {
                        PutStatus::Done => {}
                        PutStatus::Pending => {
                            self.state = RouterState::AwaitOutput;
                            return;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::line::Line;
    use linesim_core::{ChannelSpec, LineConfig, MachineSpec, MergerSpec, SourceSpec, SplitterSpec};
    use proptest::prelude::*;
    use rstest::rstest;

    fn split_line(interarrival: f64, branch_time: f64) -> LineConfig {
        LineConfig::new("split", SourceSpec::new("in", interarrival), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::plain("left", 2))
            .with_channel(ChannelSpec::plain("right", 2))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_splitter(SplitterSpec::new("S", "in", "left", "right"))
            .with_machine(MachineSpec::new("L", "left", "out", branch_time))
            .with_machine(MachineSpec::new("R", "right", "out", branch_time))
    }

    #[test]
    fn test_splitter_alternates_when_both_free() {
        let config = split_line(1.0, 1.5);
        let mut line = Line::build(&config, 1, 1.0).unwrap();
        line.advance_to(10_000.0).unwrap();

        let [left, right] = line.routers()[0].routed();
        assert!(left.abs_diff(right) <= 1, "left {} right {}", left, right);
    }

    #[test]
    fn test_splitter_falls_back_without_flipping() {
        // 左側機台極慢：左側佇列很快滿載，之後工件幾乎全部送往右側
        let config = LineConfig::new("skewed", SourceSpec::new("in", 2.0), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::plain("left", 1))
            .with_channel(ChannelSpec::plain("right", 100))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_splitter(SplitterSpec::new("S", "in", "left", "right"))
            .with_machine(MachineSpec::new("L", "left", "out", 1000.0))
            .with_machine(MachineSpec::new("R", "right", "out", 1.0));
        let mut line = Line::build(&config, 1, 1.0).unwrap();
        line.advance_to(10_000.0).unwrap();

        let [left, right] = line.routers()[0].routed();
        assert!(left <= 12);
        assert!(right > 4_900);
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    fn test_splitter_balances_delay_buffers_with_breakdowns(#[case] seed: u64) {
        // 兩個容量與延遲相同的輸送緩衝區，下游機台會故障
        let config = LineConfig::new("split-delay", SourceSpec::new("in", 1.0), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::delay("left", 2, 10.0))
            .with_channel(ChannelSpec::delay("right", 2, 10.0))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_splitter(SplitterSpec::new("S", "in", "left", "right"))
            .with_machine(MachineSpec::new("L", "left", "out", 3.0).with_availability(90.0, 80.0))
            .with_machine(MachineSpec::new("R", "right", "out", 3.0).with_availability(90.0, 80.0));
        let mut line = Line::build(&config, seed, 1.0).unwrap();
        line.advance_to(500_000.0).unwrap();

        let [left, right] = line.routers()[0].routed();
        let total = (left + right) as f64;
        assert!(total > 10_000.0);
        assert!(
            (left as f64 / total - 0.5).abs() < 0.05,
            "left {} right {}",
            left,
            right
        );
        assert!(line.machines().iter().all(|m| m.counters().breakdown_count > 0));
        for channel in line.snapshot().channels {
            if let Some(cap) = channel.capacity {
                assert!(channel.ready + channel.in_transit <= cap);
            }
        }
    }

    #[test]
    fn test_merger_forwards_all_inputs() {
        let config = LineConfig::new("merge", SourceSpec::new("in", 1.0), "out")
            .with_channel(ChannelSpec::unbounded("in"))
            .with_channel(ChannelSpec::plain("a", 2))
            .with_channel(ChannelSpec::plain("b", 2))
            .with_channel(ChannelSpec::plain("left", 2))
            .with_channel(ChannelSpec::plain("right", 2))
            .with_channel(ChannelSpec::unbounded("out"))
            .with_splitter(SplitterSpec::new("S", "in", "left", "right"))
            .with_machine(MachineSpec::new("L", "left", "a", 2.0))
            .with_machine(MachineSpec::new("R", "right", "b", 2.0))
            .with_merger(MergerSpec::new(
                "J",
                vec!["a".to_string(), "b".to_string()],
                "out",
            ));
        let mut line = Line::build(&config, 1, 1.0).unwrap();
        line.advance_to(1_000.0).unwrap();

        let forwarded: u64 = line.routers()[1..].iter().map(|r| r.routed()[0]).sum();
        assert_eq!(forwarded, line.sink_count());
        assert!(line.sink_count() > 900);
        assert!(line.routers()[1].routed()[0] > 400);
        assert!(line.routers()[2].routed()[0] > 400);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_splitter_is_balanced_under_symmetric_load(seed in 0u64..1_000, branch in 1u32..4) {
            let config = split_line(1.0, f64::from(branch) + 0.5);
            let mut line = Line::build(&config, seed, 1.0).unwrap();
            line.advance_to(5_000.0).unwrap();

            let [left, right] = line.routers()[0].routed();
            let total = (left + right) as f64;
            prop_assert!(total > 0.0);
            prop_assert!((left as f64 / total - 0.5).abs() < 0.05);
        }
    }
}
