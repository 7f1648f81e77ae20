//! Composer：根据完整会话历史流式生成最终方案
//!
//! 每个 token 片段发出一次 StepProgressed，结束时 StepEnded 携带按到达顺序拼接的全文。

use std::sync::Arc;

use futures_util::StreamExt;
use tracing::info;

use crate::core::{ExecutionContext, PlannerError, Session};
use crate::llm::{ChatMessage, LlmClient};
use crate::react::events::{Node, StepOutput, COMPOSER};

pub struct Composer {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Composer {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    /// 生成最终产物并返回全文；调用方负责写入会话
    pub async fn compose(&self, session: &Session, ctx: &ExecutionContext) -> Result<String, PlannerError> {
        if ctx.is_cancelled() {
            return Err(PlannerError::Cancelled);
        }
        let step = ctx.child();
        step.started(Node::Composer, COMPOSER, "");
        ctx.status("Creating your personalized travel plan...");

        let result = self.stream_artifact(session, &step).await;
        match &result {
            Ok(artifact) => {
                info!(chars = artifact.len(), "artifact composed");
                step.ended(Node::Composer, COMPOSER, StepOutput::text(artifact.as_str()));
            }
            Err(e) => step.ended(Node::Composer, COMPOSER, StepOutput::failed(e.reason())),
        }
        result
    }

    async fn stream_artifact(&self, session: &Session, step: &ExecutionContext) -> Result<String, PlannerError> {
        let mut messages = vec![ChatMessage::system(format!(
            "{}\n\n{}",
            self.system_prompt,
            session.trip.requirements_section()
        ))];
        messages.extend(session.to_llm_messages());

        let mut stream = self.llm.complete_stream(&messages).await?;
        let mut artifact = String::new();
        loop {
            let next = tokio::select! {
                _ = step.cancelled() => return Err(PlannerError::Cancelled),
                n = stream.next() => n,
            };
            match next {
                Some(Ok(chunk)) => {
                    step.progressed(Node::Composer, COMPOSER, chunk.as_str());
                    artifact.push_str(&chunk);
                }
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        if artifact.trim().is_empty() {
            return Err(PlannerError::MalformedOutput("composer returned an empty plan".to_string()));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TripParams;
    use crate::llm::ScriptedLlmClient;
    use crate::react::events::{EventPayload, EventSink};
    use chrono::NaiveDate;
    use tokio_util::sync::CancellationToken;

    fn session() -> Session {
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        let trip = TripParams::new("Munich", "Lisbon").resolve(today).unwrap();
        Session::new(trip, "Plan my trip")
    }

    #[tokio::test]
    async fn test_chunks_concatenate_to_final_output() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok("# Lisbon\nDay 1: Alfama and Miradouro da Senhora do Monte.")
                .with_chunk_chars(5),
        );
        let (sink, mut rx) = EventSink::channel();
        let ctx = ExecutionContext::root(uuid::Uuid::new_v4(), sink, CancellationToken::new());
        let artifact = Composer::new(llm, "compose").compose(&session(), &ctx).await.unwrap();
        drop(ctx);

        let mut chunks = String::new();
        let mut final_text = None;
        while let Some(ev) = rx.recv().await {
            match ev.payload {
                EventPayload::StepProgressed { chunk } => chunks.push_str(&chunk),
                EventPayload::StepEnded { output: StepOutput::Text { text } } => final_text = Some(text),
                _ => {}
            }
        }
        assert_eq!(final_text.as_deref(), Some(chunks.as_str()));
        assert_eq!(artifact, chunks);
    }

    #[tokio::test]
    async fn test_empty_plan_is_malformed() {
        let llm = Arc::new(ScriptedLlmClient::new().then_ok("   "));
        let ctx = ExecutionContext::root(uuid::Uuid::new_v4(), EventSink::disabled(), CancellationToken::new());
        assert!(matches!(
            Composer::new(llm, "compose").compose(&session(), &ctx).await,
            Err(PlannerError::MalformedOutput(_))
        ));
    }
}
