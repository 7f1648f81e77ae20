//! 端到端规划场景：脚本化 LLM 与委派能力驱动完整会话，检查历史、时间线与事件流

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use serde_json::Value;

    use wayfarer::agent::{plan_trip_stream_on, PlanOutcome};
    use wayfarer::config::AppConfig;
    use wayfarer::core::{check_item_pairing, ExecutionContext, Message, PlannerBuilder, PlannerError, TripParams};
    use wayfarer::llm::ScriptedLlmClient;
    use wayfarer::react::events::{EventPayload, ExecutionEvent, Node, StepOutput, COMPOSER, WEB_SEARCH};
    use wayfarer::timeline::{drive_timeline, project, ItemStatus, Terminal, Timeline};
    use wayfarer::tools::{DelegatedCapability, Tool};

    const FLIGHTS_AND_HOTELS: &str = "I'll research transport and lodging first.\n```json\n{\"tool_calls\": [\
        {\"id\": \"1\", \"tool\": \"call_researcher\", \"args\": {\"question\": \"flights\"}},\
        {\"id\": \"2\", \"tool\": \"call_researcher\", \"args\": {\"question\": \"hotels\"}}]}\n```";
    const HANDOFF: &str = "Research is sufficient.\n```json\n{\"tool\": \"call_planner\", \"args\": {}}\n```";
    const MORE_RESEARCH: &str = "```json\n{\"tool\": \"call_researcher\", \"args\": {\"question\": \"events\"}}\n```";
    const PLAN: &str = "# Tokyo, 7 days\n\nDay 1: Asakusa and Senso-ji.\nDay 2: Tsukiji outer market.";

    /// 脚本化委派：每个问题发出一次 web_search 子调用；fail 开头的问题失败，hang 开头的问题永不返回
    struct ScriptedDelegate {
        delays: HashMap<&'static str, Duration>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl ScriptedDelegate {
        fn new() -> Self {
            Self {
                delays: HashMap::new(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, question: &'static str, delay: Duration) -> Self {
            self.delays.insert(question, delay);
            self
        }
    }

    #[async_trait]
    impl DelegatedCapability for ScriptedDelegate {
        fn name(&self) -> &str {
            "researcher"
        }

        async fn invoke(&self, question: &str, ctx: &ExecutionContext) -> Result<String, PlannerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let search = ctx.child();
            search.started(Node::DelegateSubcall, WEB_SEARCH, format!("{question} Tokyo"));
            if let Some(delay) = self.delays.get(question) {
                tokio::time::sleep(*delay).await;
            }
            if question.starts_with("hang") {
                std::future::pending::<()>().await;
            }
            let result = if question.starts_with("fail") {
                search.ended(Node::DelegateSubcall, WEB_SEARCH, StepOutput::failed("quota exceeded"));
                Err(PlannerError::CapabilityUnavailable("search quota exceeded".to_string()))
            } else {
                search.ended(Node::DelegateSubcall, WEB_SEARCH, StepOutput::text(format!("results for {question}")));
                Ok(format!("Findings on {question}"))
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
    }

    fn config(max_round_trips: usize, max_concurrent: usize) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.orchestrator.max_round_trips = max_round_trips;
        cfg.orchestrator.max_concurrent_research = max_concurrent;
        cfg.research.timeout_secs = 5;
        cfg
    }

    struct Run {
        outcome: Result<PlanOutcome, PlannerError>,
        timeline: Timeline,
        log: Vec<ExecutionEvent>,
        snapshots: usize,
    }

    async fn run(cfg: AppConfig, llm: Arc<ScriptedLlmClient>, delegate: Arc<dyn DelegatedCapability>) -> Run {
        let components = PlannerBuilder::new(cfg).with_llm(llm).with_delegate(delegate).build();
        let stream = plan_trip_stream_on(
            Arc::new(components),
            &TripParams::new("Munich", "Tokyo"),
            "Plan my trip",
            today(),
        )
        .unwrap();
        let mut snapshots = 0;
        let mut sink = |_: &Timeline| snapshots += 1;
        let (timeline, log) = drive_timeline(stream.events, &mut sink, 300).await;
        let outcome = stream.outcome.await.unwrap();
        Run {
            outcome,
            timeline,
            log,
            snapshots,
        }
    }

    fn work_results(history: &[Message]) -> Vec<(String, String, bool)> {
        history
            .iter()
            .filter_map(|m| match m {
                Message::WorkResult { item_id, text, failed } => Some((item_id.clone(), text.clone(), *failed)),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn scenario_a_two_research_items_then_handoff() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(FLIGHTS_AND_HOTELS)
                .then_ok(HANDOFF)
                .then_ok(PLAN),
        );
        let r = run(config(8, 3), llm.clone(), Arc::new(ScriptedDelegate::new())).await;
        let outcome = r.outcome.unwrap();

        check_item_pairing(&outcome.history).unwrap();
        let results = work_results(&outcome.history);
        assert_eq!(results[0].0, "1");
        assert_eq!(results[0].1, "Findings on flights");
        assert_eq!(results[1].0, "2");
        assert_eq!(outcome.artifact, PLAN);
        assert_eq!(outcome.filename, "trip_tokyo.md");
        assert_eq!(llm.calls(), 3);

        let items: Vec<_> = r.timeline.work_items().collect();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.status == ItemStatus::Done && !i.failed));
        assert_eq!(items[0].sub_steps[0].label, "🔍 flights Tokyo");
        assert_eq!(items[1].sub_steps[0].label, "🔍 hotels Tokyo");
        assert_eq!(r.timeline.final_artifact.as_deref(), Some(PLAN));
        assert_eq!(r.timeline.terminal, Terminal::Completed);
        assert!(r.timeline.preview.is_none());
        assert_eq!(r.snapshots, r.log.len());
    }

    #[tokio::test]
    async fn scenario_b_immediate_handoff() {
        let llm = Arc::new(ScriptedLlmClient::new().then_ok(HANDOFF).then_ok(PLAN));
        let r = run(config(8, 3), llm, Arc::new(ScriptedDelegate::new())).await;
        let outcome = r.outcome.unwrap();

        assert_eq!(r.timeline.work_items().count(), 0);
        assert_eq!(r.timeline.final_artifact.as_deref(), Some(PLAN));
        let results = work_results(&outcome.history);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1, wayfarer::tools::HANDOFF_ROUTED);
        check_item_pairing(&outcome.history).unwrap();
    }

    #[tokio::test]
    async fn scenario_c_failed_item_does_not_abort() {
        let failing = "```json\n{\"tool_calls\": [\
            {\"tool\": \"call_researcher\", \"args\": {\"question\": \"fail: ryokan availability\"}},\
            {\"tool\": \"call_researcher\", \"args\": {\"question\": \"flights\"}}]}\n```";
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(failing)
                .then_ok(HANDOFF)
                .then_ok(PLAN),
        );
        let r = run(config(8, 3), llm.clone(), Arc::new(ScriptedDelegate::new())).await;
        let outcome = r.outcome.unwrap();

        let results = work_results(&outcome.history);
        assert!(results[0].2);
        assert!(results[0].1.starts_with("Research failed"));
        assert!(!results[1].2);

        // 失败结果进入下一轮 decider 的输入
        let second_decider_call = &llm.received()[1];
        assert!(second_decider_call
            .iter()
            .any(|m| m.content.contains("Research failed")));

        let items: Vec<_> = r.timeline.work_items().collect();
        assert_eq!(items[0].status, ItemStatus::Done);
        assert!(items[0].failed);
        assert!(items[0].sub_steps[0].failed);
        assert!(!items[1].failed);
        assert_eq!(r.timeline.terminal, Terminal::Completed);
    }

    #[tokio::test]
    async fn scenario_d_round_cap_forces_compose() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(MORE_RESEARCH)
                .then_ok(MORE_RESEARCH)
                .then_ok(MORE_RESEARCH)
                .then_ok(PLAN),
        );
        let r = run(config(3, 3), llm.clone(), Arc::new(ScriptedDelegate::new())).await;
        let outcome = r.outcome.unwrap();

        assert_eq!(llm.calls(), 4);
        assert_eq!(outcome.artifact, PLAN);
        check_item_pairing(&outcome.history).unwrap();
        let decider_turns = outcome
            .history
            .iter()
            .filter(|m| matches!(m, Message::DeciderTurn { .. }))
            .count();
        assert_eq!(decider_turns, 3);
        assert!(r.log.iter().any(|e| matches!(
            &e.payload,
            EventPayload::Status { text } if text.contains("Round-trip limit")
        )));
        // 三轮各一个调研项，id 由系统生成且互不相同
        let ids: Vec<_> = r.timeline.work_items().map(|i| i.id.clone()).collect();
        assert_eq!(ids, vec!["item-1", "item-2", "item-3"]);
    }

    #[tokio::test]
    async fn finite_even_when_decider_only_talks() {
        let llm = Arc::new(ScriptedLlmClient::new().with_fallback("Still thinking about the itinerary."));
        let r = run(config(2, 1), llm.clone(), Arc::new(ScriptedDelegate::new())).await;
        assert!(r.outcome.is_ok());
        assert_eq!(llm.calls(), 3);
        assert_eq!(r.timeline.assistant_texts().count(), 2);
    }

    #[tokio::test]
    async fn projection_of_log_is_idempotent_and_matches_live_fold() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(FLIGHTS_AND_HOTELS)
                .then_ok(HANDOFF)
                .then_ok(PLAN),
        );
        let delegate = ScriptedDelegate::new()
            .with_delay("flights", Duration::from_millis(30))
            .with_delay("hotels", Duration::from_millis(5));
        let r = run(config(8, 3), llm, Arc::new(delegate)).await;
        assert!(r.outcome.is_ok());

        let first = project(&r.log);
        let second = project(&r.log);
        assert_eq!(first, second);
        assert_eq!(first, r.timeline);
    }

    #[tokio::test]
    async fn composer_chunks_concatenate_to_final_text() {
        let llm = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(HANDOFF)
                .then_ok(PLAN)
                .with_chunk_chars(7),
        );
        let r = run(config(8, 3), llm, Arc::new(ScriptedDelegate::new())).await;
        assert!(r.outcome.is_ok());

        let composer_events: Vec<_> = r.log.iter().filter(|e| e.capability == COMPOSER).collect();
        let chunks: String = composer_events
            .iter()
            .filter_map(|e| match &e.payload {
                EventPayload::StepProgressed { chunk } => Some(chunk.as_str()),
                _ => None,
            })
            .collect();
        let final_text = composer_events.iter().find_map(|e| match &e.payload {
            EventPayload::StepEnded { output: StepOutput::Text { text } } => Some(text.clone()),
            _ => None,
        });
        assert!(composer_events.len() > 3);
        assert_eq!(final_text, Some(chunks));
    }

    #[tokio::test]
    async fn concurrent_dispatch_respects_limit_and_declaration_order() {
        let three = "```json\n{\"tool_calls\": [\
            {\"tool\": \"call_researcher\", \"args\": {\"question\": \"slow\"}},\
            {\"tool\": \"call_researcher\", \"args\": {\"question\": \"medium\"}},\
            {\"tool\": \"call_researcher\", \"args\": {\"question\": \"fast\"}}]}\n```";
        let llm = Arc::new(ScriptedLlmClient::new().then_ok(three).then_ok(HANDOFF).then_ok(PLAN));
        let delegate = Arc::new(
            ScriptedDelegate::new()
                .with_delay("slow", Duration::from_millis(60))
                .with_delay("medium", Duration::from_millis(30))
                .with_delay("fast", Duration::from_millis(1)),
        );
        let r = run(config(8, 2), llm, delegate.clone()).await;
        let outcome = r.outcome.unwrap();

        assert!(delegate.peak.load(Ordering::SeqCst) <= 2);
        let texts: Vec<_> = work_results(&outcome.history).into_iter().map(|r| r.1).collect();
        assert_eq!(
            &texts[..3],
            &["Findings on slow", "Findings on medium", "Findings on fast"]
        );
        // 子步骤按显式 work_item_id 归属，不受完成顺序影响
        for item in r.timeline.work_items() {
            assert_eq!(item.sub_steps.len(), 1);
            assert_eq!(item.sub_steps[0].label, format!("🔍 {} Tokyo", item.question));
        }
    }

    #[tokio::test]
    async fn cancellation_aborts_session_and_timeline() {
        let hang = "```json\n{\"tool\": \"call_researcher\", \"args\": {\"question\": \"hang: visa rules\"}}\n```";
        let llm = Arc::new(ScriptedLlmClient::new().then_ok(hang).with_fallback(HANDOFF));
        let components = PlannerBuilder::new(config(8, 3))
            .with_llm(llm)
            .with_delegate(Arc::new(ScriptedDelegate::new()))
            .build();
        let stream = plan_trip_stream_on(
            Arc::new(components),
            &TripParams::new("Munich", "Tokyo"),
            "Plan my trip",
            today(),
        )
        .unwrap();

        let cancel = stream.cancel.clone();
        let mut sink = move |t: &Timeline| {
            if t.work_items().any(|i| i.status == ItemStatus::Running) {
                cancel.cancel();
            }
        };
        let (timeline, _) = drive_timeline(stream.events, &mut sink, 300).await;
        let outcome = stream.outcome.await.unwrap();

        assert_eq!(outcome.unwrap_err(), PlannerError::Cancelled);
        assert!(matches!(timeline.terminal, Terminal::Aborted { .. }));
        assert!(timeline.final_artifact.is_none());
    }

    /// 假 web_search：替换内置 Tavily 工具，走真实的调研子智能体
    struct FakeSearch;

    #[async_trait]
    impl Tool for FakeSearch {
        fn name(&self) -> &str {
            "web_search"
        }
        fn description(&self) -> &str {
            "offline search"
        }
        async fn execute(&self, args: Value, _ctx: &ExecutionContext) -> Result<String, String> {
            Ok(format!("cached results for {}", args["query"].as_str().unwrap_or("")))
        }
    }

    #[tokio::test]
    async fn research_agent_sub_steps_nest_under_work_items() {
        let decider = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(FLIGHTS_AND_HOTELS)
                .then_ok(HANDOFF)
                .then_ok(PLAN),
        );
        let researcher = Arc::new(
            ScriptedLlmClient::new()
                .then_ok(r#"{"tool": "web_search", "args": {"query": "MUC to HND March"}}"#)
                .then_ok("ANA direct, about 900 EUR.")
                .then_ok("Hotel Gracery Shinjuku, 4 stars."),
        );
        let components = PlannerBuilder::new(config(8, 1))
            .with_llm(decider)
            .with_researcher_llm(researcher)
            .with_tool(Arc::new(FakeSearch))
            .build();
        let stream = plan_trip_stream_on(
            Arc::new(components),
            &TripParams::new("Munich", "Tokyo"),
            "Plan my trip",
            today(),
        )
        .unwrap();
        let mut sink = |_: &Timeline| {};
        let (timeline, _) = drive_timeline(stream.events, &mut sink, 300).await;
        let outcome = stream.outcome.await.unwrap().unwrap();

        let results = work_results(&outcome.history);
        assert_eq!(results[0].1, "ANA direct, about 900 EUR.");
        assert_eq!(results[1].1, "Hotel Gracery Shinjuku, 4 stars.");

        let items: Vec<_> = timeline.work_items().collect();
        assert_eq!(items[0].sub_steps.len(), 1);
        assert_eq!(items[0].sub_steps[0].label, "🔍 MUC to HND March");
        assert_eq!(
            items[0].sub_steps[0].result.as_deref(),
            Some("cached results for MUC to HND March")
        );
        assert!(items[1].sub_steps.is_empty());
    }
}
