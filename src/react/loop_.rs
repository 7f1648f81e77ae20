//! 编排主循环：Deciding -> {Dispatching, Composing} -> Done
//!
//! 一次只做一个状态转换；每次转换前检查取消。Deciding<->Dispatching 的往返次数达到上限后
//! 强制进入 Composing，保证循环有限。decider / composer 的错误终止会话并发出 SessionAborted。

use tracing::{info, warn};

use crate::core::{next_phase, ExecutionContext, Phase, PlannerError, Session};
use crate::react::{Composer, Decider};
use crate::tools::ToolDispatch;

pub struct Orchestrator {
    decider: Decider,
    dispatch: ToolDispatch,
    composer: Composer,
    max_round_trips: usize,
}

impl Orchestrator {
    pub fn new(decider: Decider, dispatch: ToolDispatch, composer: Composer, max_round_trips: usize) -> Self {
        Self {
            decider,
            dispatch,
            composer,
            max_round_trips: max_round_trips.max(1),
        }
    }

    pub fn max_round_trips(&self) -> usize {
        self.max_round_trips
    }

    /// 驱动会话直到 Done；失败时发出 SessionAborted 并返回错误
    pub async fn run(&self, session: &mut Session, ctx: &ExecutionContext) -> Result<(), PlannerError> {
        let result = self.run_phases(session, ctx).await;
        if let Err(e) = &result {
            warn!(session = %session.id, error = %e, "session aborted");
            ctx.aborted(e.reason());
        }
        result
    }

    async fn run_phases(&self, session: &mut Session, ctx: &ExecutionContext) -> Result<(), PlannerError> {
        let mut phase = Phase::Deciding;
        loop {
            if ctx.is_cancelled() {
                return Err(PlannerError::Cancelled);
            }
            info!(phase = phase.name(), rounds = session.rounds(), "transition");
            phase = match phase {
                Phase::Deciding if session.rounds() >= self.max_round_trips => {
                    warn!(max = self.max_round_trips, "round-trip limit reached, composing with current history");
                    ctx.status(format!(
                        "Round-trip limit ({}) reached, composing with the research so far...",
                        self.max_round_trips
                    ));
                    Phase::Composing
                }
                Phase::Deciding => {
                    let turn = self.decider.decide(session, ctx).await?;
                    session.push_decider_turn(turn.text, turn.items.clone());
                    let next = next_phase(&turn.items);
                    match &next {
                        Phase::Composing => {
                            // 单独的 handoff：记录路由结果后直接进入 Composing
                            for item in &turn.items {
                                let result = self.dispatch.handoff(item, ctx);
                                session.push_result(result.item_id, result.text, result.failed);
                            }
                        }
                        _ => session.complete_round(),
                    }
                    next
                }
                Phase::Dispatching(items) => {
                    let results = self.dispatch.dispatch(&items, ctx).await?;
                    for result in results {
                        session.push_result(result.item_id, result.text, result.failed);
                    }
                    Phase::Deciding
                }
                Phase::Composing => {
                    let artifact = self.composer.compose(session, ctx).await?;
                    session.finish(artifact);
                    ctx.status("Your travel plan is ready!");
                    Phase::Done
                }
                Phase::Done => return Ok(()),
            };
        }
    }
}
