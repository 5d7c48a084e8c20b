//! 投料源

use linesim_core::Part;

use crate::channel::{ChannelId, PartBuffer, PutStatus};
use crate::line::{Activity, Event, LineState, ProcessId};
use crate::scheduler::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Emit,
    AwaitPut,
}

/// 從時間 0 起，每隔固定間隔投入一個序號遞增的工件
///
/// 放入完成後才開始計算下一個間隔；下游滿載時投料會被延後。
#[derive(Debug)]
pub struct PartSource {
    output: ChannelId,
    interarrival: f64,
    next_id: u64,
    state: SourceState,
}

impl PartSource {
    pub fn new(output: ChannelId, interarrival: f64) -> Self {
        Self {
            output,
            interarrival,
            next_id: 0,
            state: SourceState::Emit,
        }
    }
}

impl Activity for PartSource {
    fn resume(&mut self, me: ProcessId, line: &mut LineState, sched: &mut Scheduler<Event>) {
        if self.state == SourceState::Emit {
            let part = Part::new(self.next_id);
            self.next_id += 1;
            line.released += 1;
            if line.channels[self.output.0].put(part, me, sched) == PutStatus::Pending {
                self.state = SourceState::AwaitPut;
                return;
            }
        }
        self.state = SourceState::Emit;
        sched.schedule_after(self.interarrival, Event::Resume(me));
    }
}
