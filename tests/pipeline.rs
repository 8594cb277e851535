mod common;

use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use common::*;
use helios::config::LoginConfig;
use helios::errors::HeliosError;
use helios::models::{Finding, SessionContext, Severity, WorkItem};
use helios::pipeline::{
    ErrorPolicy, PipelineEvent, RunConfig, RunOutcome, ScanController, Stage, StageFlag, StageSet,
};

fn config(flags: &[StageFlag]) -> RunConfig {
    RunConfig {
        stages: flags.iter().copied().collect(),
        ..Default::default()
    }
}

fn seeds(urls: &[&str]) -> Vec<String> {
    urls.iter().map(|u| u.to_string()).collect()
}

async fn run(fixture: &Fixture, config: RunConfig, urls: &[&str]) -> Result<RunOutcome, HeliosError> {
    ScanController::new(config, fixture.collaborators())
        .run(&seeds(urls), None)
        .await
}

fn completed(outcome: Result<RunOutcome, HeliosError>) -> helios::models::ScanTree {
    match outcome {
        Ok(RunOutcome::Completed(tree)) => *tree,
        other => panic!("expected a completed run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scan_only_uses_seed_as_single_work_item() {
    let fixture = Fixture::default();
    let tree = completed(run(&fixture, config(&[StageFlag::Scan]), &["http://example.com"]).await);

    assert_eq!(tree.crawled_count, 0);
    assert_eq!(tree.scanned_count, 1);
    assert_eq!(tree.findings.len(), 1);
    assert_eq!(tree.findings[0].text, "http://example.com");
    assert_eq!(tree.scope_host, "example.com");

    let queue = fixture.scanner.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].url, "http://example.com");
    assert_eq!(queue[0].body, None);
    assert!(fixture.crawler.job.lock().unwrap().is_none());
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_scan_findings_forwarded_to_sink() {
    let fixture = Fixture::default();
    completed(run(&fixture, config(&[StageFlag::Scan]), &["http://example.com"]).await);
    let puts = fixture.sink.puts();
    assert_eq!(puts.len(), 1);
    assert_eq!(puts[0].0, "Passive Check");
    assert_eq!(puts[0].2, Severity::Low);
    assert!(fixture.sink.report.lock().unwrap().is_some());
    assert_eq!(
        fixture.sink.run_start.lock().unwrap().clone(),
        Some(("http://example.com".to_string(), "example.com".to_string()))
    );
}

#[tokio::test]
async fn test_crawled_pages_are_deduplicated() {
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler {
            pages: vec![
                WorkItem::get("http://example.com/"),
                WorkItem::get("http://example.com/"),
                WorkItem::post("http://example.com/login", "u=a"),
                WorkItem::post("http://example.com/login", "u=a"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let tree = completed(
        run(&fixture, config(&[StageFlag::Crawl, StageFlag::Scan]), &["http://example.com/"]).await,
    );
    assert_eq!(tree.crawled_count, 4);
    assert_eq!(tree.scanned_count, 2);
    let urls: Vec<_> = fixture.scanner.queue().into_iter().map(|r| (r.url, r.body)).collect();
    assert_eq!(
        urls,
        vec![
            ("http://example.com/".to_string(), None),
            ("http://example.com/login".to_string(), Some("u=a".to_string())),
        ]
    );
}

#[tokio::test]
async fn test_extra_seeds_reach_crawler_in_order() {
    let fixture = Fixture {
        filesystem: Arc::new(MockFilesystem {
            links: vec!["http://example.com/backup/".to_string()],
            ..Default::default()
        }),
        scripts: Arc::new(MockScripts {
            links: vec!["http://example.com/from-robots".to_string()],
            ..Default::default()
        }),
        ..Default::default()
    };
    let stages = [StageFlag::Crawl, StageFlag::Scan, StageFlag::AdvancedScripts];
    completed(
        run(&fixture, config(&stages), &["http://example.com/", "http://example.com/second"]).await,
    );

    let job = fixture.crawler.job.lock().unwrap().clone().unwrap();
    assert_eq!(job.start_url, "http://example.com/");
    assert_eq!(
        job.extra_seeds,
        vec![
            "http://example.com/second",
            "http://example.com/backup/",
            "http://example.com/from-robots",
        ]
    );
    assert_eq!(job.max_urls, 200);
    assert_eq!(fixture.filesystem.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_filesystem_discovery_needs_crawl_and_scan() {
    let fixture = Fixture::default();
    completed(run(&fixture, config(&[StageFlag::Crawl]), &["http://example.com/"]).await);
    assert_eq!(fixture.filesystem.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_crawler_cookies_reach_scan_requests() {
    let mut login_session = SessionContext::new();
    login_session.cookies.insert("session".to_string(), "abc".to_string());
    login_session.headers.insert("X-Login".to_string(), "1".to_string());

    let fixture = Fixture {
        login: Arc::new(MockLogin { session: Some(login_session), ..Default::default() }),
        crawler: Arc::new(MockCrawler {
            pages: vec![WorkItem::get("http://example.com/")],
            cookies: BTreeMap::from([("tracking".to_string(), "xyz".to_string())]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let mut run_config = config(&[StageFlag::Crawl, StageFlag::Scan]);
    run_config.login = Some(LoginConfig {
        headers: vec!["Authorization: Bearer t0ken".to_string()],
        ..Default::default()
    });
    run_config.user_agent = Some("helios-test".to_string());
    completed(run(&fixture, run_config, &["http://example.com/"]).await);

    let job = fixture.crawler.job.lock().unwrap().clone().unwrap();
    assert_eq!(job.session.cookies["session"], "abc");

    let queue = fixture.scanner.queue();
    assert_eq!(queue[0].cookies["session"], "abc");
    assert_eq!(queue[0].cookies["tracking"], "xyz");
    assert_eq!(queue[0].headers["Authorization"], "Bearer t0ken");
    assert_eq!(queue[0].headers["X-Login"], "1");
    assert_eq!(queue[0].user_agent.as_deref(), Some("helios-test"));
}

#[tokio::test]
async fn test_login_without_session_continues() {
    let fixture = Fixture::default();
    let mut run_config = config(&[StageFlag::Scan]);
    run_config.login = Some(LoginConfig::default());
    let tree = completed(run(&fixture, run_config, &["http://example.com"]).await);
    assert_eq!(tree.scanned_count, 1);
    assert!(fixture.login.seen.lock().unwrap().is_some());
    assert!(fixture.scanner.queue()[0].cookies.is_empty());
}

#[tokio::test]
async fn test_browser_candidates_filtered() {
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler {
            pages: vec![WorkItem::get("http://example.com/")],
            ..Default::default()
        }),
        browser: Arc::new(MockBrowser {
            candidates: vec![
                WorkItem::get("http://attacker.net/steal"),
                WorkItem::get("http://example.com/app.css"),
                WorkItem::get("http://example.com/"),
                WorkItem::post("http://example.com/api", "{\"q\":1}"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let stages = [StageFlag::Crawl, StageFlag::Scan, StageFlag::BrowserDiscovery];
    let tree = completed(run(&fixture, config(&stages), &["http://example.com/"]).await);

    let urls: Vec<_> = fixture.scanner.queue().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://example.com/", "http://example.com/api"]);
    assert!(!urls.iter().any(|u| u.contains("attacker.net")));
    assert_eq!(tree.scanned_count, 2);
}

#[tokio::test]
async fn test_thread_count_clamped_to_work_and_cap() {
    let fixture = Fixture::default();
    let mut run_config = config(&[StageFlag::Scan]);
    run_config.thread_count = 10;
    completed(run(&fixture, run_config, &["http://example.com"]).await);
    assert_eq!(*fixture.scanner.threads.lock().unwrap(), Some(1));

    let pages: Vec<WorkItem> = (0..40).map(|i| WorkItem::get(format!("http://example.com/{}", i))).collect();
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler { pages, ..Default::default() }),
        ..Default::default()
    };
    let mut run_config = config(&[StageFlag::Crawl, StageFlag::Scan]);
    run_config.thread_count = 100;
    completed(run(&fixture, run_config, &["http://example.com/"]).await);
    assert_eq!(*fixture.scanner.threads.lock().unwrap(), Some(25));
}

#[tokio::test]
async fn test_crawl_job_thread_count_capped() {
    let pages: Vec<WorkItem> = (0..40).map(|i| WorkItem::get(format!("http://example.com/{}", i))).collect();
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler { pages, ..Default::default() }),
        ..Default::default()
    };
    let mut run_config = config(&[StageFlag::Crawl, StageFlag::Scan]);
    run_config.thread_count = 100;
    completed(run(&fixture, run_config, &["http://example.com/"]).await);

    let job = fixture.crawler.job.lock().unwrap().clone().unwrap();
    assert_eq!(job.thread_count, 25);

    let fixture = Fixture::default();
    let mut run_config = config(&[StageFlag::Crawl]);
    run_config.thread_count = 0;
    completed(run(&fixture, run_config, &["http://example.com/"]).await);
    let job = fixture.crawler.job.lock().unwrap().clone().unwrap();
    assert_eq!(job.thread_count, 1);
}

#[tokio::test]
async fn test_duplicate_seeds_without_crawl_scan_seed_once() {
    let fixture = Fixture::default();
    let tree = completed(
        run(
            &fixture,
            config(&[StageFlag::Scan]),
            &["http://example.com", "http://example.com/admin"],
        )
        .await,
    );
    let queue = fixture.scanner.queue();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0].url, "http://example.com");
    assert_eq!(tree.scanned_count, 1);
}

#[tokio::test]
async fn test_duplicate_crawled_seeds_collapse() {
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler {
            pages: vec![
                WorkItem::get("http://example.com"),
                WorkItem::get("http://example.com/admin"),
                WorkItem::get("http://example.com"),
                WorkItem::get("http://example.com/admin"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let tree = completed(
        run(
            &fixture,
            config(&[StageFlag::Crawl, StageFlag::Scan]),
            &["http://example.com", "http://example.com/admin"],
        )
        .await,
    );
    let urls: Vec<_> = fixture.scanner.queue().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://example.com", "http://example.com/admin"]);
    assert_eq!(tree.crawled_count, 4);
    assert_eq!(tree.scanned_count, 2);
}

#[tokio::test]
async fn test_interrupt_mid_scan_closes_once_and_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("report.json");
    let token = CancellationToken::new();
    let fixture = Fixture {
        scanner: Arc::new(MockScanner::new(ScanBehavior::InterruptMidScan(token.clone()))),
        ..Default::default()
    };
    let mut run_config = config(&[StageFlag::Scan]);
    run_config.output_path = Some(output.clone());

    let outcome = ScanController::new(run_config, fixture.collaborators())
        .with_cancel_token(token)
        .run(&seeds(&["http://example.com"]), None)
        .await;

    assert!(matches!(outcome, Ok(RunOutcome::Interrupted)));
    assert_eq!(fixture.sink.closes(), 1);
    assert!(fixture.sink.report.lock().unwrap().is_none());
    assert!(!output.exists());
}

#[tokio::test]
async fn test_cancel_before_run_is_interrupted() {
    let fixture = Fixture::default();
    let token = CancellationToken::new();
    token.cancel();
    let outcome = ScanController::new(config(&[]), fixture.collaborators())
        .with_cancel_token(token)
        .run(&seeds(&["http://example.com"]), None)
        .await;
    assert!(matches!(outcome, Ok(RunOutcome::Interrupted)));
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_stage_error_swallowed_by_default() {
    let fixture = Fixture {
        scanner: Arc::new(MockScanner::new(ScanBehavior::Fail)),
        ..Default::default()
    };
    let outcome = run(&fixture, config(&[StageFlag::Scan]), &["http://example.com"]).await;
    match outcome {
        Ok(RunOutcome::Aborted { error }) => {
            assert!(matches!(error, HeliosError::Stage { stage: "scan", .. }));
        }
        other => panic!("expected aborted run, got {:?}", other),
    }
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_stage_error_propagated_when_verbose() {
    let fixture = Fixture {
        browser: Arc::new(MockBrowser { fail: true, ..Default::default() }),
        ..Default::default()
    };
    let mut run_config = config(&[StageFlag::BrowserDiscovery, StageFlag::Scan]);
    run_config.error_policy = ErrorPolicy { propagate: true };
    let err = run(&fixture, run_config, &["http://example.com"]).await.unwrap_err();
    assert!(matches!(err, HeliosError::Stage { stage: "browser-discovery", .. }));
    assert_eq!(fixture.sink.closes(), 1);
    assert!(fixture.scanner.queue().is_empty());
}

#[tokio::test]
async fn test_sink_open_failure_runs_no_stage() {
    let fixture = Fixture {
        sink: Arc::new(RecordingSink::failing_open()),
        ..Default::default()
    };
    let outcome = run(&fixture, config(&[StageFlag::Scan]), &["http://example.com"]).await;
    assert!(matches!(outcome, Ok(RunOutcome::Aborted { error: HeliosError::Database(_) })));
    assert_eq!(fixture.sink.closes(), 0);
    assert!(fixture.scanner.queue().is_empty());
}

#[tokio::test]
async fn test_empty_seed_list_is_config_error() {
    let fixture = Fixture::default();
    let err = run(&fixture, config(&[StageFlag::Scan]), &[]).await.unwrap_err();
    assert!(matches!(err, HeliosError::Config(_)));
    assert_eq!(fixture.sink.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_invalid_seed_opens_no_sink() {
    let fixture = Fixture::default();
    let err = run(&fixture, config(&[]), &["not a url"]).await.unwrap_err();
    assert!(matches!(err, HeliosError::InvalidTarget(_)));
    assert_eq!(fixture.sink.opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_non_working_exploit_client_gives_empty_results() {
    let fixture = Fixture {
        exploit: Arc::new(MockExploit {
            working: false,
            results: BTreeMap::from([("apache".to_string(), vec!["exploit/x".to_string()])]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let tree = completed(
        run(&fixture, config(&[StageFlag::ExploitCorrelation]), &["http://example.com"]).await,
    );
    assert!(tree.exploit_results.is_empty());
    assert_eq!(fixture.exploit.connects.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_working_exploit_client_results_in_tree() {
    let fixture = Fixture {
        exploit: Arc::new(MockExploit {
            working: true,
            results: BTreeMap::from([("apache".to_string(), vec!["exploit/x".to_string()])]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let tree = completed(
        run(&fixture, config(&[StageFlag::ExploitCorrelation]), &["http://example.com"]).await,
    );
    assert_eq!(tree.exploit_results["apache"], vec!["exploit/x"]);
}

#[tokio::test]
async fn test_malformed_exploit_credentials_skip_stage() {
    let fixture = Fixture::default();
    let mut run_config = config(&[StageFlag::ExploitCorrelation]);
    run_config.exploit.credentials = "no-colon-here".to_string();
    let tree = completed(run(&fixture, run_config, &["http://example.com"]).await);
    assert!(tree.exploit_results.is_empty());
    assert_eq!(fixture.exploit.connects.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fingerprint_results_persisted() {
    let fixture = Fixture {
        cms: Arc::new(MockCms {
            results: BTreeMap::from([("wordpress".to_string(), vec!["WordPress 6.4".to_string()])]),
        }),
        webapp: Arc::new(MockWebApp {
            results: BTreeMap::from([(
                "tomcat".to_string(),
                vec![serde_json::json!({"url": "http://example.com/manager/html", "version": "9"})],
            )]),
            ..Default::default()
        }),
        ..Default::default()
    };
    let tree = completed(
        run(&fixture, config(&[StageFlag::Cms, StageFlag::WebApp]), &["http://example.com"]).await,
    );
    assert_eq!(tree.cms_results["wordpress"], vec!["WordPress 6.4"]);
    assert_eq!(tree.webapp_results["tomcat"].len(), 1);
    assert!(fixture.webapp.loaded.load(Ordering::SeqCst));

    let puts = fixture.sink.puts();
    assert_eq!(puts.len(), 2);
    assert_eq!(puts[0], ("CMS Script".to_string(), "wordpress".to_string(), Severity::Info, "WordPress 6.4".to_string()));
    assert_eq!(puts[1].0, "WebApp Script");
    let payload: serde_json::Value = serde_json::from_str(&puts[1].3).unwrap();
    assert_eq!(payload["version"], "9");
}

#[tokio::test]
async fn test_post_scan_runs_on_final_work_list() {
    let fixture = Fixture {
        scripts: Arc::new(MockScripts {
            post: vec![Finding::new("Post Script", "cors", Severity::High, "reflects origin")],
            ..Default::default()
        }),
        ..Default::default()
    };
    let stages = [StageFlag::Scan, StageFlag::AdvancedScripts];
    let tree = completed(run(&fixture, config(&stages), &["http://example.com"]).await);
    assert_eq!(tree.post_results.len(), 1);
    assert_eq!(tree.total_findings(), 2);
    assert_eq!(*fixture.scripts.post_work.lock().unwrap(), vec![WorkItem::get("http://example.com")]);
    assert!(fixture.sink.puts().iter().any(|p| p.0 == "Post Script"));
}

#[tokio::test]
async fn test_no_stages_still_assembles_report() {
    let fixture = Fixture::default();
    let tree = completed(run(&fixture, config(&[]), &["http://example.com"]).await);
    assert_eq!(tree.crawled_count, 0);
    assert_eq!(tree.scanned_count, 0);
    assert!(tree.findings.is_empty());
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_output_file_written_and_overwritten() {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("report.json");
    std::fs::write(&output, "stale").unwrap();

    let fixture = Fixture::default();
    let mut run_config = config(&[StageFlag::Scan]);
    run_config.output_path = Some(output.clone());
    completed(run(&fixture, run_config, &["http://example.com"]).await);

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["starturl"], "http://example.com");
    assert_eq!(report["scope"], "example.com");
    assert_eq!(report["scanned"], 1);
    assert_eq!(report["crawled"], 0);
    assert_eq!(report["results"].as_array().unwrap().len(), 1);
    assert!(report["metasploit"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn test_events_report_stage_progress() {
    let fixture = Fixture::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let controller = ScanController::new(config(&[StageFlag::Scan]), fixture.collaborators())
        .with_event_channel(tx);
    completed(controller.run(&seeds(&["http://example.com"]), None).await);
    drop(controller);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(PipelineEvent::RunStarted { .. })));
    assert!(matches!(events.last(), Some(PipelineEvent::RunCompleted { scanned: 1, .. })));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::StageCompleted { stage: Stage::Scan, .. })));
    assert!(events.iter().any(|e| matches!(e, PipelineEvent::StageSkipped { stage: Stage::Crawl, .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, PipelineEvent::FindingsRecorded { stage: Stage::Scan, count: 1 })));
}

#[tokio::test]
async fn test_all_stages_end_to_end() {
    let fixture = Fixture {
        crawler: Arc::new(MockCrawler {
            pages: vec![WorkItem::get("http://example.com/"), WorkItem::get("http://example.com/a")],
            ..Default::default()
        }),
        exploit: Arc::new(MockExploit { working: true, ..Default::default() }),
        ..Default::default()
    };
    let run_config = RunConfig { stages: StageSet::all(), ..Default::default() };
    let tree = completed(run(&fixture, run_config, &["http://example.com/"]).await);
    assert_eq!(tree.crawled_count, 2);
    assert_eq!(tree.scanned_count, 2);
    assert_eq!(fixture.sink.closes(), 1);
}

#[tokio::test]
async fn test_extra_scope_hosts_admit_browser_candidates() {
    let fixture = Fixture {
        browser: Arc::new(MockBrowser {
            candidates: vec![WorkItem::get("http://cdn.example.org/app")],
            ..Default::default()
        }),
        ..Default::default()
    };
    let stages = [StageFlag::BrowserDiscovery, StageFlag::Scan];
    let outcome = ScanController::new(config(&stages), fixture.collaborators())
        .run(&seeds(&["http://example.com"]), Some(" cdn.example.org , "))
        .await;
    completed(outcome);
    let urls: Vec<_> = fixture.scanner.queue().into_iter().map(|r| r.url).collect();
    assert_eq!(urls, vec!["http://example.com", "http://cdn.example.org/app"]);
}
