//! Agent 主循环集成测试：脚本化 LLM + 临时目录沙箱

use std::sync::Arc;

use forager::core::AgentError;
use forager::llm::mock::function_call;
use forager::llm::{LlmError, ScriptedLlmClient};
use forager::memory::{Part, Role, Turn};
use forager::react::{AgentEvent, AgentLoop, AgentSettings};
use forager::tools::{ExecutorConfig, ToolExecutor};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn build(dir: &std::path::Path, llm: Arc<ScriptedLlmClient>) -> AgentLoop {
    let executor = ToolExecutor::new(ExecutorConfig::new(dir)).unwrap();
    AgentLoop::new(
        llm,
        Arc::new(executor),
        AgentSettings::new("gemini-2.5-flash", "You are a test agent."),
    )
}

fn responses(turn: &Turn) -> Vec<(&str, &serde_json::Map<String, Value>)> {
    turn.parts
        .iter()
        .filter_map(|p| match p {
            Part::FunctionResponse { name, response } => Some((name.as_str(), response)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_single_tool_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![Ok(vec![function_call("list_directory", json!({}), None)])],
        vec![Ok(vec![Part::text("There is one file: main.rs")])],
    ]));
    let mut agent = build(dir.path(), llm.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let msg = agent
        .run_cycle("what files are here?", &tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(msg.text, "There is one file: main.rs");
    assert_eq!(msg.tools_used, vec!["list_directory"]);

    let turns = agent.history().turns();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0], Turn::user("what files are here?"));
    assert_eq!(turns[1].role, Role::Model);
    assert!(turns[1].parts[0].is_function_call());
    assert_eq!(turns[2].role, Role::User);
    let results = responses(&turns[2]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, "list_directory");
    assert_eq!(results[0].1["count"], json!(1));
    assert_eq!(turns[3], Turn::model("There is one file: main.rs"));

    // 第二次请求带上了函数调用与结果
    let reqs = llm.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].history, turns[..3].to_vec());

    let mut saw_running = false;
    while let Ok(ev) = rx.try_recv() {
        if let AgentEvent::ToolsRunning { tools } = ev {
            assert_eq!(tools, vec!["list_directory"]);
            saw_running = true;
        }
    }
    assert!(saw_running);
}

#[tokio::test]
async fn test_batch_runs_in_report_order() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![Ok(vec![
            function_call("create_directory", json!({"path": "src/nested"}), None),
            function_call(
                "write_file",
                json!({"path": "src/nested/lib.rs", "content": "pub fn x() {}"}),
                None,
            ),
            function_call("read_file", json!({"path": "src/nested/lib.rs"}), None),
        ])],
        vec![Ok(vec![Part::text("Created.")])],
    ]));
    let mut agent = build(dir.path(), llm.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    let msg = agent.run_cycle("scaffold", &tx, CancellationToken::new()).await.unwrap();
    assert_eq!(msg.tools_used, vec!["create_directory", "write_file", "read_file"]);

    let turns = agent.history().turns();
    let results = responses(&turns[2]);
    let names: Vec<_> = results.iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["create_directory", "write_file", "read_file"]);
    assert!(results.iter().all(|(_, r)| !r.contains_key("error")));
    assert_eq!(results[2].1["content"], json!("pub fn x() {}"));
    assert!(dir.path().join("src/nested/lib.rs").is_file());
}

#[tokio::test]
async fn test_tool_errors_are_returned_to_model() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![Ok(vec![
            function_call("read_file", json!({"path": "../../etc/passwd"}), None),
            function_call("read_file", json!({"path": "missing.txt"}), None),
            function_call("delete_everything", json!({}), None),
        ])],
        vec![Ok(vec![Part::text("I could not read those.")])],
    ]));
    let mut agent = build(dir.path(), llm);
    let (tx, _rx) = mpsc::unbounded_channel();

    let msg = agent.run_cycle("read", &tx, CancellationToken::new()).await.unwrap();
    assert_eq!(msg.text, "I could not read those.");

    let turns = agent.history().turns();
    let results = responses(&turns[2]);
    assert_eq!(results[0].1["error"], json!("path is outside allowed directory"));
    assert_eq!(results[1].1["error"], json!("file not found: missing.txt"));
    assert_eq!(results[2].1["error"], json!("unknown tool: delete_everything"));
}

#[tokio::test]
async fn test_continuation_token_is_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let call = function_call("glob_search", json!({"pattern": "**/*.rs"}), Some("c2lnLTE="));
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![
            Ok(vec![Part::Thought("need to search".into())]),
            Ok(vec![call.clone()]),
        ],
        vec![Ok(vec![Part::text("No Rust files.")])],
    ]));
    let mut agent = build(dir.path(), llm.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    agent.run_cycle("find rust", &tx, CancellationToken::new()).await.unwrap();

    let second = &llm.requests()[1];
    assert_eq!(second.history[1].parts, vec![call]);
    match &second.history[1].parts[0] {
        Part::FunctionCall { signature, .. } => assert_eq!(signature.as_deref(), Some("c2lnLTE=")),
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_error_rolls_back_staged_turns() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![Ok(vec![function_call(
            "write_file",
            json!({"path": "out.txt", "content": "kept"}),
            None,
        )])],
        vec![Err(LlmError::ApiError {
            status: 503,
            message: "overloaded".into(),
        })],
        vec![Ok(vec![Part::text("second try works")])],
    ]));
    let mut agent = build(dir.path(), llm.clone());
    let (tx, mut rx) = mpsc::unbounded_channel();

    let err = agent.run_cycle("write it", &tx, CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, AgentError::Llm(LlmError::ApiError { status: 503, .. })));
    assert_eq!(agent.history().turns(), &[Turn::user("write it")]);
    // 磁盘修改不回滚
    assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "kept");

    let mut last = None;
    while let Ok(ev) = rx.try_recv() {
        last = Some(ev);
    }
    assert!(matches!(last, Some(AgentEvent::Error { text }) if text.contains("overloaded")));

    // 会话仍可继续
    let msg = agent.run_cycle("again", &tx, CancellationToken::new()).await.unwrap();
    assert_eq!(msg.text, "second try works");
    assert_eq!(agent.history().len(), 3);
    assert_eq!(llm.requests()[2].history.len(), 2);
}

#[tokio::test]
async fn test_empty_answer_does_not_break_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlmClient::new(vec![
        vec![Ok(vec![Part::Thought("nothing to say".into())])],
        vec![Ok(vec![Part::text("Back on track.")])],
    ]));
    let mut agent = build(dir.path(), llm.clone());
    let (tx, _rx) = mpsc::unbounded_channel();

    let first = agent.run_cycle("first", &tx, CancellationToken::new()).await.unwrap();
    assert!(first.text.is_empty());
    assert_eq!(first.thinking, "nothing to say");

    let second = agent.run_cycle("second", &tx, CancellationToken::new()).await.unwrap();
    assert_eq!(second.text, "Back on track.");

    let reqs = llm.requests();
    assert_eq!(reqs.len(), 2);
    assert_eq!(reqs[1].history.len(), 3);
    assert_eq!(reqs[1].history[2], Turn::user("second"));
    assert_eq!(agent.history().len(), 4);
}
