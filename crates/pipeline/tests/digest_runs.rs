//! End-to-end digest runs over mock services.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;

use mailbrief_blob::MemoryBlobStore;
use mailbrief_core::{
    CostTracker, EmailItem, EmailSender, Mode, RunWindow, SenderClass, SenderRecord, now_ms,
};
use mailbrief_enrich::{MockExtractor, MockSearch};
use mailbrief_gmail::MockMailbox;
use mailbrief_llm::MockChatClient;
use mailbrief_mailer::MockMailer;
use mailbrief_pipeline::{
    BreakerRegistry, Orchestrator, PipelineConfig, RetryConfig, RetryStrategy, Services,
};
use mailbrief_state_memory::{MemoryProcessedStore, MemorySenderStore, MemoryTokenStore};

struct Harness {
    services: Arc<Services>,
    mailbox: Arc<MockMailbox>,
    chat: Arc<MockChatClient>,
    mailer: Arc<MockMailer>,
}

impl Harness {
    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(Arc::clone(&self.services))
    }
}

fn config() -> PipelineConfig {
    PipelineConfig {
        recipient: "user@example.com".to_owned(),
        own_address: "digest@mailbrief.example".to_owned(),
        classify_stagger: Duration::from_millis(1),
        retry: RetryConfig {
            max_attempts: 3,
            strategy: RetryStrategy::Constant {
                delay: Duration::from_millis(1),
            },
        },
        ..PipelineConfig::default()
    }
}

fn harness(emails: Vec<EmailItem>, config: PipelineConfig, cost: CostTracker) -> Harness {
    let mailbox = Arc::new(MockMailbox::new(emails));
    let chat = Arc::new(MockChatClient::new());
    let mailer = Arc::new(MockMailer::new());
    let services = Arc::new(Services {
        mailbox: mailbox.clone(),
        chat: chat.clone(),
        extractor: Arc::new(MockExtractor::new()),
        search: Arc::new(MockSearch::new()),
        mailer: mailer.clone(),
        processed: Arc::new(MemoryProcessedStore::new()),
        senders: Arc::new(MemorySenderStore::new()),
        tokens: Arc::new(MemoryTokenStore::new()),
        blobs: Arc::new(MemoryBlobStore::new()),
        cost: Arc::new(cost),
        breakers: Arc::new(BreakerRegistry::default()),
        config,
    });
    Harness {
        services,
        mailbox,
        chat,
        mailer,
    }
}

fn email(id: &str, sender: &str) -> EmailItem {
    EmailItem {
        id: id.to_owned(),
        thread_id: format!("t-{id}"),
        sender: EmailSender::parse(&format!("Sender <{sender}>")),
        subject: format!("AI news {id}"),
        date: "2024-06-01T08:00:00+00:00".to_owned(),
        snippet: format!("snippet {id}"),
        body: format!("body {id}"),
        labels: vec!["INBOX".to_owned()],
    }
}

fn analyze_json(title: &str) -> String {
    serde_json::json!({
        "title": title,
        "summary": format!("analysis of {title}"),
        "key_insights": ["a", "b"],
        "why_it_matters": "context",
        "action_items": [],
    })
    .to_string()
}

async fn mark_known_ai(harness: &Harness, addresses: &[&str]) {
    for address in addresses {
        harness
            .services
            .senders
            .upsert(SenderRecord::new(address, SenderClass::Ai, 90.0, now_ms()))
            .await
            .unwrap();
    }
}

// S1: weekly run over an empty inbox does nothing and spends nothing.
#[tokio::test]
async fn weekly_empty_inbox() {
    let h = harness(vec![], config(), CostTracker::default());
    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;

    assert!(report.success);
    assert_eq!(report.emails_found, 0);
    assert_eq!(report.emails_processed, 0);
    assert_eq!(report.message, "No AI-related emails found to process");
    assert_eq!(h.chat.call_count(), 0);
    assert!(h.services.cost.total_cost().abs() < f64::EPSILON);
    assert!(h.mailer.digests().is_empty());
}

// S2: three new emails from known AI senders flow straight to one digest.
#[tokio::test]
async fn weekly_all_known_ai() {
    let emails = vec![
        email("a", "one@ai.example"),
        email("b", "two@ai.example"),
        email("c", "three@ai.example"),
    ];
    let h = harness(emails, config(), CostTracker::default());
    mark_known_ai(&h, &["one@ai.example", "two@ai.example", "three@ai.example"]).await;
    h.chat.set_default(analyze_json("Item"));

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;

    assert!(report.success, "{report:?}");
    assert_eq!(report.emails_found, 3);
    assert_eq!(report.emails_processed, 3);
    assert_eq!(report.batches, 1);

    // No classification calls, three analyze calls.
    assert_eq!(h.services.cost.call_count("openai", "classify"), 0);
    assert_eq!(h.services.cost.call_count("openai", "analyze"), 3);

    // One digest, three records, three archived ids.
    assert_eq!(h.mailer.digests().len(), 1);
    assert_eq!(h.mailer.digests()[0].1.summaries.len(), 3);
    for id in ["a", "b", "c"] {
        assert!(h.services.processed.is_processed(id).await.unwrap());
    }
    let mut archived = h.mailbox.archived_ids();
    archived.sort();
    assert_eq!(archived, vec!["a", "b", "c"]);
}

// Invariant 1: a second run with no new mail marks nothing new.
#[tokio::test]
async fn back_to_back_runs_are_idempotent() {
    let emails = vec![email("a", "one@ai.example"), email("b", "two@ai.example")];
    let h = harness(emails, config(), CostTracker::default());
    mark_known_ai(&h, &["one@ai.example", "two@ai.example"]).await;
    h.chat.set_default(analyze_json("Item"));

    let first = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert_eq!(first.emails_processed, 2);

    let second = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(second.success);
    assert_eq!(second.emails_processed, 0);
    assert!(
        second.message.contains("already processed"),
        "got: {}",
        second.message
    );
    // Still exactly one digest and one record per id.
    assert_eq!(h.mailer.digests().len(), 1);
    assert!(h.services.processed.is_processed("a").await.unwrap());
}

// S3: failed delivery marks nothing, and a rerun retries the same emails.
#[tokio::test]
async fn weekly_delivery_failure_leaves_emails_unmarked() {
    let emails = vec![
        email("a", "one@ai.example"),
        email("b", "two@ai.example"),
        email("c", "three@ai.example"),
    ];
    let h = harness(emails, config(), CostTracker::default());
    mark_known_ai(&h, &["one@ai.example", "two@ai.example", "three@ai.example"]).await;
    h.chat.set_default(analyze_json("Item"));
    h.mailer.fail_digest_sends();

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("delivery_failed"));
    assert_eq!(report.emails_processed, 0);
    for id in ["a", "b", "c"] {
        assert!(!h.services.processed.is_processed(id).await.unwrap());
    }
    assert!(h.mailbox.archived_ids().is_empty());
    // The failure was reported through the error-notice channel.
    assert!(!h.mailer.error_notices().is_empty());

    // Delivery restored: the same three emails process on the next run.
    h.mailer.restore_digest_sends();
    let retry = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(retry.success);
    assert_eq!(retry.emails_processed, 3);
}

// S4: a 91+ day historical window is refused up front.
#[tokio::test]
async fn historical_window_over_90_days_is_rejected() {
    let h = harness(vec![], config(), CostTracker::default());
    let window = RunWindow::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap(),
    );
    let report = h
        .orchestrator()
        .run_digest(Mode::Historical, Some(window))
        .await;

    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("validation"));
    assert!(report.message.contains("90 days"), "got: {}", report.message);
    // Nothing ran.
    assert!(h.mailbox.queries().is_empty());
    assert_eq!(h.chat.call_count(), 0);
}

// S5: cleanup splits 70 AI emails into sub-batches of 50 and 20, one
// digest each, with the inter-batch delay between dispatches.
#[tokio::test(start_paused = true)]
async fn cleanup_sub_batches_of_50() {
    let mut emails = Vec::new();
    let mut ai_addresses = Vec::new();
    let mut non_ai_addresses = Vec::new();
    for i in 0..120 {
        let address = format!("sender{i}@news.example");
        emails.push(email(&format!("m{i}"), &address));
        if i < 70 {
            ai_addresses.push(address);
        } else {
            non_ai_addresses.push(address);
        }
    }

    // Raise the per-run call cap: a 70-email cleanup legitimately makes
    // more than 50 model calls.
    let cost = CostTracker::new(100.0).with_call_cap("openai", 1_000);
    let h = harness(emails, config(), cost);
    for address in &ai_addresses {
        h.services
            .senders
            .upsert(SenderRecord::new(address, SenderClass::Ai, 90.0, now_ms()))
            .await
            .unwrap();
    }
    for address in &non_ai_addresses {
        h.services
            .senders
            .upsert(SenderRecord::new(address, SenderClass::NonAi, 90.0, now_ms()))
            .await
            .unwrap();
    }
    h.chat.set_default(analyze_json("Item"));

    let started = tokio::time::Instant::now();
    let report = h.orchestrator().run_digest(Mode::Cleanup, None).await;

    assert!(report.success, "{report:?}");
    assert_eq!(report.emails_found, 70);
    assert_eq!(report.emails_processed, 70);
    assert_eq!(report.batches, 2);

    // Two separate digests, sized 50 and 20.
    let digests = h.mailer.digests();
    assert_eq!(digests.len(), 2);
    assert_eq!(digests[0].1.summaries.len(), 50);
    assert_eq!(digests[1].1.summaries.len(), 20);

    // All 70 marked; the 50 known non-AI untouched.
    for i in 0..70 {
        assert!(h.services.processed.is_processed(&format!("m{i}")).await.unwrap());
    }
    for i in 70..120 {
        assert!(!h.services.processed.is_processed(&format!("m{i}")).await.unwrap());
    }

    // The second dispatch waited at least the inter-batch delay.
    assert!(started.elapsed() >= Duration::from_secs(5));
}

// S6: budget exhaustion mid-analyze still delivers and marks what was
// analyzed; the rest stays for the next run.
#[tokio::test]
async fn budget_exhaustion_mid_run_keeps_partial_progress() {
    let mut emails = Vec::new();
    let mut addresses = Vec::new();
    for i in 0..45 {
        let address = format!("sender{i}@ai.example");
        emails.push(email(&format!("m{i}"), &address));
        addresses.push(address);
    }

    // A ceiling with room for exactly 40 analyze calls at $0.02.
    let h = harness(emails, config(), CostTracker::new(0.805));
    let address_refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    mark_known_ai(&h, &address_refs).await;
    h.chat.set_default(analyze_json("Item"));

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(report.success, "{report:?}");

    let digests = h.mailer.digests();
    assert_eq!(digests.len(), 1);
    let delivered = digests[0].1.summaries.len();
    assert_eq!(delivered, 40, "budget allows exactly 40 analyze calls");
    assert_eq!(report.emails_processed as usize, delivered);

    // Budget bound held.
    assert!(h.services.cost.total_cost() <= 0.805 + 1e-9);

    // Unanalyzed emails remain unmarked for the next run.
    let marked = {
        let mut count = 0;
        for i in 0..45 {
            if h.services
                .processed
                .is_processed(&format!("m{i}"))
                .await
                .unwrap()
            {
                count += 1;
            }
        }
        count
    };
    assert_eq!(marked, delivered);
    assert!(marked < 45);
}

// Invariant 2 + error handler: an auth failure aborts the run and sends a
// re-auth notice, never a digest.
#[tokio::test]
async fn auth_failure_triggers_reauth_notice() {
    let h = harness(vec![email("a", "x@ai.example")], config(), CostTracker::default());
    h.mailbox.fail_search(mailbrief_gmail::MockFailure::AuthInvalid);

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("auth_invalid"));
    assert_eq!(h.mailer.reauth_notices(), vec!["user@example.com"]);
    assert!(!h.mailer.error_notices().is_empty());
    assert!(h.mailer.digests().is_empty());
}

// Retryable fetch failures are retried; persistent ones fail the run with
// an error notice.
#[tokio::test]
async fn transient_failures_exhaust_retries_then_notify() {
    let h = harness(vec![email("a", "x@ai.example")], config(), CostTracker::default());
    h.mailbox.fail_search(mailbrief_gmail::MockFailure::Network);

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("transient_network"));
    let notices = h.mailer.error_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].1.contains("fetch"));
}

// Invariant 4: classification keeps the two sender populations disjoint
// across a run that reclassifies.
#[tokio::test]
async fn sender_populations_stay_disjoint() {
    let h = harness(vec![email("a", "flip@example.com")], config(), CostTracker::default());
    // Previously (long ago) classified AI; confidence has fully decayed.
    h.services
        .senders
        .upsert(SenderRecord::new(
            "flip@example.com",
            SenderClass::Ai,
            60.0,
            now_ms() - 365 * 86_400_000,
        ))
        .await
        .unwrap();
    // The classifier now calls it NON_AI with high confidence.
    h.chat.push_response(
        serde_json::json!({
            "a": {"classification": "NON_AI", "confidence": 95, "reasoning": "retail"}
        })
        .to_string(),
    );

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(report.success);

    let ai = h.services.senders.list(SenderClass::Ai).await.unwrap();
    let non_ai = h.services.senders.list(SenderClass::NonAi).await.unwrap();
    assert!(ai.iter().all(|r| r.sender_email != "flip@example.com"));
    assert!(non_ai.iter().any(|r| r.sender_email == "flip@example.com"));
}

// Large batches offload between stages and still round-trip correctly.
#[tokio::test]
async fn oversized_payloads_offload_to_blob_storage() {
    let mut cfg = config();
    cfg.inline_payload_limit = 512;

    let mut big = email("a", "one@ai.example");
    big.body = "AI ".repeat(2_000);
    let h = harness(vec![big], cfg, CostTracker::default());
    mark_known_ai(&h, &["one@ai.example"]).await;
    h.chat.set_default(analyze_json("Item"));

    let report = h.orchestrator().run_digest(Mode::Weekly, None).await;
    assert!(report.success, "{report:?}");
    assert_eq!(report.emails_processed, 1);

    // The oversized batch actually hit the blob store.
    let offloaded = h.services.blobs.list("payloads/").await.unwrap();
    assert!(!offloaded.is_empty());
}

// Cancellation before launch leaves everything unmarked.
#[tokio::test]
async fn cancelled_run_marks_nothing() {
    let h = harness(vec![email("a", "one@ai.example")], config(), CostTracker::default());
    mark_known_ai(&h, &["one@ai.example"]).await;
    h.chat.set_default(analyze_json("Item"));

    let orchestrator = h.orchestrator();
    orchestrator.cancel_token().cancel();
    let report = orchestrator.run_digest(Mode::Weekly, None).await;

    assert!(!report.success);
    assert!(!h.services.processed.is_processed("a").await.unwrap());
    assert!(h.mailer.digests().is_empty());
}
