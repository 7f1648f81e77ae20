//! 规划入口
//!
//! - plan_trip：一次性运行会话，返回完整消息历史
//! - plan_trip_stream：后台运行会话，实时暴露事件流、取消令牌与最终结果
//! - drive_timeline（见 timeline 模块）：把事件流折叠为时间线并交给展示层

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::{
    ExecutionContext, Message, PlannerComponents, PlannerError, ResolvedTrip, Session,
    SessionSupervisor, TripParams,
};
use crate::react::events::{EventSink, ExecutionEvent};

pub use crate::timeline::drive_timeline;

/// 一次规划的最终结果
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub artifact: String,
    /// 建议的下载文件名：trip_<目的地>.md
    pub filename: String,
    pub history: Vec<Message>,
}

/// 流式规划句柄
pub struct PlanStream {
    pub events: UnboundedReceiver<ExecutionEvent>,
    /// 取消后会话不再调用外部能力，并以 SessionAborted 结束
    pub cancel: CancellationToken,
    pub outcome: JoinHandle<Result<PlanOutcome, PlannerError>>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// 在给定上下文中运行完整会话
pub async fn run_session(
    components: &PlannerComponents,
    trip: ResolvedTrip,
    seed: &str,
    ctx: &ExecutionContext,
) -> Result<PlanOutcome, PlannerError> {
    let mut session = Session::new(trip, seed);
    info!(
        session = %session.id,
        destination = %session.trip.destination,
        nights = session.trip.nights(),
        "planning session started"
    );
    components.orchestrator.run(&mut session, ctx).await?;

    let filename = session.trip.suggested_filename();
    let artifact = session
        .artifact()
        .map(str::to_string)
        .ok_or_else(|| PlannerError::MalformedOutput("session finished without an artifact".to_string()))?;
    Ok(PlanOutcome {
        artifact,
        filename,
        history: session.into_messages(),
    })
}

/// 一次性规划：校验并补全行程参数，运行会话，返回完整消息历史
pub async fn plan_trip(
    components: &PlannerComponents,
    params: &TripParams,
    seed: &str,
) -> Result<Vec<Message>, PlannerError> {
    let trip = params.resolve(today())?;
    let supervisor = SessionSupervisor::new();
    let ctx = supervisor.root_context(uuid::Uuid::new_v4(), EventSink::disabled());
    let outcome = run_session(components, trip, seed, &ctx).await?;
    Ok(outcome.history)
}

/// 流式规划：参数校验失败立即返回错误，否则在 tokio 上启动会话
pub fn plan_trip_stream(
    components: Arc<PlannerComponents>,
    params: &TripParams,
    seed: &str,
) -> Result<PlanStream, PlannerError> {
    plan_trip_stream_on(components, params, seed, today())
}

/// 同 plan_trip_stream，但以指定日期作为“今天”补全默认日期
pub fn plan_trip_stream_on(
    components: Arc<PlannerComponents>,
    params: &TripParams,
    seed: &str,
    today: NaiveDate,
) -> Result<PlanStream, PlannerError> {
    let trip = params.resolve(today)?;
    let (sink, events) = EventSink::channel();
    let supervisor = SessionSupervisor::new();
    let cancel = supervisor.cancel_token();
    let ctx = supervisor.root_context(uuid::Uuid::new_v4(), sink);
    let seed = seed.to_string();

    let outcome = tokio::spawn(async move {
        // ctx 随任务结束释放，事件通道随之关闭
        run_session(&components, trip, &seed, &ctx).await
    });
    Ok(PlanStream {
        events,
        cancel,
        outcome,
    })
}
