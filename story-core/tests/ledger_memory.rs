//! Anchor ledger behaviour across whole reading sessions.

use relay::{CompactionMode, SummaryRequest};
use story_core::memory::{append_anchor, PHASE_TAG};
use story_core::testing::{assert_ledger, StubSummarizer};
use story_core::{
    AnchorLedger, CompactionPolicy, LedgerEntry, MockBackend, MockStream, SessionConfig,
    StoryHarness,
};

fn anchors(n: usize) -> String {
    (1..=n)
        .map(|i| format!("事件{i}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn test_hundred_and_first_anchor_triggers_one_phase_pass() {
    let stub = StubSummarizer::new().with_reply("前一百零一条事件的总结");
    let ledger = AnchorLedger::parse(&anchors(101));
    let policy = CompactionPolicy::default().with_max_chars(1_000_000);

    let outcome = append_anchor(&ledger, "第一百零二条", &policy, &stub)
        .await
        .unwrap();

    let phase_calls: Vec<_> = stub
        .calls()
        .into_iter()
        .filter(|c| matches!(c, SummaryRequest::Compact { mode: CompactionMode::Phase, .. }))
        .collect();
    assert_eq!(phase_calls.len(), 1);
    assert_eq!(
        outcome.ledger.entries(),
        &[
            LedgerEntry::Phase("前一百零一条事件的总结".into()),
            LedgerEntry::Anchor("第一百零二条".into()),
        ]
    );
    assert!(outcome.ledger.to_string().starts_with(PHASE_TAG));
}

#[tokio::test]
async fn test_ledger_stays_bounded_over_a_long_story() {
    let policy = CompactionPolicy::default().with_max_chars(120);
    let mut harness = StoryHarness::with_config(SessionConfig::default().with_compaction(policy));

    for i in 1..=30 {
        harness.expect_stream(
            MockStream::new()
                .title(&format!("第{i}章"))
                .content("雨一直下。")
                .branches(&["甲", "乙", "丙"])
                .node_update(&format!("第{i}章：林默又向真相走近了一步")),
        );
    }
    for _ in 0..30 {
        harness.next(Some("甲")).await.unwrap();
        assert!(harness.session.ledger().char_len() < 120);
    }
    harness.settle().await.unwrap();
    assert!(harness.session.ledger().char_len() < 120);
    assert!(harness
        .backend
        .summarizer()
        .calls()
        .iter()
        .any(|c| matches!(c, SummaryRequest::Compact { mode: CompactionMode::Global, .. })));
}

#[tokio::test]
async fn test_failed_summary_leaves_ledger_untouched() {
    let backend = MockBackend::new()
        .with_summarizer(StubSummarizer::new().failing())
        .with_stream(MockStream::new().content("夜色如墨。").branches(&["甲", "乙", "丙"]))
        .with_stream(MockStream::new().content("雨停了。").branches(&["丁", "戊", "己"]));

    let mut harness = StoryHarness::new();
    harness.backend = backend;
    harness.session = story_core::StorySession::new("雨夜", SessionConfig::default())
        .with_story_nodes("父亲失踪");

    harness.next(None).await.unwrap();
    assert!(harness.settle().await.is_err());
    assert!(!harness.session.has_pending_anchor());
    assert_ledger(&harness, &[LedgerEntry::Anchor("父亲失踪".into())]);

    // The next chapter still generates with the unchanged ledger.
    harness.next(Some("乙")).await.unwrap();
    let requests = harness.backend.requests();
    assert_eq!(requests[1].settings.story_nodes.as_deref(), Some("父亲失踪"));
}

#[tokio::test]
async fn test_anchor_extracted_when_relay_sends_none() {
    let mut harness = StoryHarness::new();
    harness.backend = MockBackend::new()
        .with_summarizer(StubSummarizer::new().with_reply("林默收到了信"))
        .with_stream(
            MockStream::new()
                .title("雨夜")
                .content("夜色如墨。")
                .branches(&["甲", "乙", "丙"]),
        );

    harness.next(None).await.unwrap();
    assert!(harness.settle().await.unwrap());
    assert_ledger(&harness, &[LedgerEntry::Anchor("林默收到了信".into())]);

    match &harness.backend.summarizer().calls()[0] {
        SummaryRequest::ExtractAnchor { title, content } => {
            assert_eq!(title, "雨夜");
            assert_eq!(content, "夜色如墨。");
        }
        other => panic!("unexpected request {other:?}"),
    }
}

#[tokio::test]
async fn test_next_generation_settles_pending_anchor_first() {
    let mut harness = StoryHarness::new();
    harness
        .expect_stream(
            MockStream::new()
                .content("夜色如墨。")
                .branches(&["甲", "乙", "丙"])
                .node_update("林默收信"),
        )
        .expect_chapter("二", "雨停了。", &["丁", "戊", "己"]);

    harness.next(None).await.unwrap();
    harness.next(Some("甲")).await.unwrap();

    let requests = harness.backend.requests();
    assert_eq!(requests[0].settings.story_nodes, None);
    assert_eq!(requests[1].settings.story_nodes.as_deref(), Some("林默收信"));
    assert!(harness.session.has_pending_anchor());
}
