//! 搜索主循环集成测试

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use arbor::config::AppConfig;
    use arbor::llm::MockLlmClient;
    use arbor::mcts::{search_loop, EngineEvent, SearchSession};
    use arbor::tools::{MockSearchProvider, SearchHit, ToolInvoker};

    /// 预算=4、分支=2 的完整场景：一条候选带检索指令，检索结果含答案；
    /// 带证据的候选胜出并被继续扩展，终答同时包含城市与人口
    fn capital_session() -> (SearchSession, Arc<MockSearchProvider>) {
        let llm = Arc::new(
            MockLlmClient::new()
                .with_rule(
                    "strategic planner",
                    vec!["Step 1: Search for the capital of France and its 2024 population.\nStep 2: State the answer."],
                )
                .with_rule(
                    "deep reasoning assistant",
                    vec![
                        "<think>I should verify the current population figure.</think><search>capital of France population 2024</search>",
                        "<think>From memory alone.</think>The capital of France is probably Paris but the population needs checking.",
                        "<think>The snippets confirm it.</think>Final Answer: The capital of France is Paris, with a 2024 population estimate of 2.1 million.",
                    ],
                )
                .with_rule(
                    "rigorous critic",
                    vec!["The trajectory identifies the city correctly; the population figure still needs confirmation from a current source."],
                )
                .with_rule(
                    "scoring a critique",
                    vec![
                        r#"{"score": 6, "completeness": 5}"#,
                        r#"{"score": 6, "completeness": 5}"#,
                        r#"{"score": 9, "completeness": 9}"#,
                    ],
                ),
        );

        let provider = Arc::new(MockSearchProvider::new(vec![SearchHit {
            title: "Paris - Wikipedia".to_string(),
            url: "https://en.wikipedia.org/wiki/Paris".to_string(),
            snippet: "Paris is the capital of France. The 2024 population estimate is 2.1 million."
                .to_string(),
        }]));
        let invoker = Arc::new(ToolInvoker::new(provider.clone(), 5, 5, 600));

        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".to_string();
        cfg.mcts.search_budget = 4;
        cfg.mcts.default_branching = 2;
        cfg.mcts.explore_branching = 2;
        cfg.mcts.exploit_branching = 2;

        (SearchSession::new(llm, invoker, &cfg), provider)
    }

    #[tokio::test]
    async fn test_capital_of_france_end_to_end() {
        let (session, provider) = capital_session();
        let outcome = search_loop(
            &session,
            "What is the capital of France and its 2024 population estimate?",
        )
        .await
        .unwrap();

        assert!(!outcome.low_confidence);
        assert!(outcome.final_answer.contains("Paris"));
        assert!(outcome.final_answer.contains("2.1 million"));
        // 反思链沿最优路径返回
        assert!(!outcome.reflections.is_empty());

        // 检索只发生一次（一个候选带指令，且结果进缓存）
        assert_eq!(*provider.search_calls.lock().unwrap(), 1);

        // 第一层：恰有一个候选带检索结果，且其均值高于无证据的兄弟
        let tree = &outcome.tree;
        let root = tree.get(tree.root_id).unwrap();
        assert_eq!(root.children_ids.len(), 2);
        let children: Vec<_> = root
            .children_ids
            .iter()
            .map(|id| tree.get(*id).unwrap())
            .collect();
        let searched: Vec<_> = children.iter().filter(|c| !c.tool_results.is_empty()).collect();
        assert_eq!(searched.len(), 1);
        let sibling = children
            .iter()
            .find(|c| c.tool_results.is_empty())
            .unwrap();
        assert!(searched[0].mean_value() > sibling.mean_value());

        // 终答节点挂在带证据的候选之下
        let final_node = tree.get(outcome.final_node_id).unwrap();
        assert_eq!(final_node.parent_id, Some(searched[0].id));

        // 根的访问数 = 经过它的回传次数（2 圈 × 2 候选）
        assert_eq!(root.visits, 4);
    }

    #[tokio::test]
    async fn test_event_ordering_and_done() {
        let (session, _provider) = capital_session();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let session = session.with_event_tx(tx);

        search_loop(
            &session,
            "What is the capital of France and its 2024 population estimate?",
        )
        .await
        .unwrap();
        drop(session);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }

        // node_enter 必须先于同一节点的任何 token
        for (i, ev) in events.iter().enumerate() {
            if let EngineEvent::Token { node_id, .. } = ev {
                let entered = events[..i].iter().any(|prev| {
                    matches!(prev, EngineEvent::NodeEnter { node_id: n, .. } if n == node_id)
                });
                assert!(entered, "token before node_enter for {}", node_id);
            }
        }

        // 有工具事件，且最后一个事件是 done
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::ToolIo { result_count, .. } if *result_count == 1)));
        assert!(matches!(events.last(), Some(EngineEvent::Done { .. })));
    }

    #[tokio::test]
    async fn test_zero_budget_yields_root_immediately() {
        let llm = Arc::new(MockLlmClient::new().with_rule("strategic planner", vec!["Step 1: think."]));
        let provider = Arc::new(MockSearchProvider::new(Vec::new()));
        let invoker = Arc::new(ToolInvoker::new(provider, 5, 5, 600));

        let mut cfg = AppConfig::default();
        cfg.mcts.search_budget = 0;

        let session = SearchSession::new(llm, invoker, &cfg);
        let outcome = search_loop(&session, "anything").await.unwrap();

        assert_eq!(outcome.laps, 0);
        assert!(outcome.low_confidence);
        assert_eq!(outcome.tree.len(), 1);
        assert_eq!(outcome.final_node_id, outcome.tree.root_id);
    }

    #[tokio::test]
    async fn test_cancellation_before_start() {
        let (session, _provider) = capital_session();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let session = session.with_cancel(cancel);

        let result = search_loop(&session, "anything").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_no_terminal_answer_exhausts_budget() {
        // 回显式模型永远不会产出终答标记、评分输出也非法（记 0 分）：
        // 预算照常递减，最终以当前最优节点低置信收尾而非死循环
        let llm = Arc::new(MockLlmClient::new());
        let provider = Arc::new(MockSearchProvider::new(Vec::new()));
        let invoker = Arc::new(ToolInvoker::new(provider, 5, 5, 600));

        let mut cfg = AppConfig::default();
        cfg.mcts.search_budget = 2;
        cfg.mcts.default_branching = 2;
        cfg.mcts.explore_branching = 2;
        cfg.mcts.exploit_branching = 2;

        let session = SearchSession::new(llm, invoker, &cfg);
        let outcome = search_loop(&session, "anything").await.unwrap();

        assert!(outcome.low_confidence);
        assert_eq!(outcome.laps, 2);
    }
}
