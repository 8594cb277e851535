use std::path::PathBuf;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::commands::Cli;
use crate::cli::progress::{print_summary, ScanProgress};
use crate::config::{parse_config, HeliosConfig, LoginConfig, LoginMethod};
use crate::errors::HeliosError;
use crate::pipeline::{
    Collaborators, ErrorPolicy, RunConfig, RunOutcome, ScanController, StageFlag, StageSet,
    DEFAULT_DATABASE, DEFAULT_MAX_URLS,
};
use crate::scope::ScopeOptions;

/// Collect start URLs from `-u` and `--urls`. The single URL comes first.
pub async fn load_seeds(cli: &Cli) -> Result<Vec<String>, HeliosError> {
    let mut seeds = Vec::new();
    if let Some(url) = cli.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        seeds.push(url.to_string());
    }
    if let Some(path) = &cli.urls {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            HeliosError::Config(format!("Failed to read URL file {}: {}", path.display(), e))
        })?;
        let from_file = parse_seed_lines(&content);
        info!("Got {} start URL's from file {}", from_file.len(), path.display());
        seeds.extend(from_file);
    }
    Ok(seeds)
}

fn parse_seed_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Merge command-line flags over the optional config file.
///
/// Explicit flag values win over file values; boolean toggles are enabled
/// when either source enables them.
pub fn build_run_config(cli: &Cli, file: Option<&HeliosConfig>) -> Result<RunConfig, HeliosError> {
    let mut config = RunConfig::default();
    let scan = file.and_then(|f| f.scan.as_ref());

    config.stages = resolve_stages(cli, file)?;

    let file_threads = scan.and_then(|s| s.threads).map(|t| t.to_string());
    let threads = cli.threads.clone().or(file_threads);
    config.thread_count = config.governor.resolve(threads.as_deref());

    config.max_urls = cli
        .max_urls
        .or_else(|| scan.and_then(|s| s.max_urls))
        .unwrap_or(DEFAULT_MAX_URLS);
    if config.max_urls == 0 {
        return Err(HeliosError::Config("--max-urls must be at least 1".into()));
    }

    config.user_agent = cli
        .user_agent
        .clone()
        .or_else(|| scan.and_then(|s| s.user_agent.clone()));
    config.ssl_verify = cli.sslverify || scan.and_then(|s| s.ssl_verify).unwrap_or(false);
    if let Some(retries) = cli.retries.or_else(|| scan.and_then(|s| s.retries)) {
        config.http_retries = retries;
    }

    config.scan_options = match &cli.options {
        Some(raw) => split_list(raw),
        None => scan.and_then(|s| s.options.clone()).unwrap_or_default(),
    };

    config.scope_options = cli.scope_options.clone().or_else(|| {
        file.and_then(|f| f.scope.as_ref())
            .and_then(|s| s.options.as_ref())
            .map(|opts| opts.join(","))
    });
    // Reject bad scope options before anything touches the network.
    ScopeOptions::parse(config.scope_options.as_deref())?;

    let output = file.and_then(|f| f.output.as_ref());
    config.output_path = cli
        .output
        .clone()
        .or_else(|| output.and_then(|o| o.file.as_ref()).map(PathBuf::from));
    config.database_path = cli
        .database
        .clone()
        .or_else(|| output.and_then(|o| o.database.as_ref()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE));

    config.login = build_login(cli, file.and_then(|f| f.login.as_ref()))?;

    let mut browser = file.and_then(|f| f.browser.clone()).unwrap_or_default();
    if let Some(path) = &cli.driver_path {
        browser.driver_path = path.clone();
    }
    browser.show |= cli.show_driver;
    browser.interactive |= cli.interactive;
    if cli.no_proxy {
        browser.proxy = false;
    }
    if let Some(port) = cli.proxy_port {
        browser.proxy_port = port;
    }
    config.browser = browser;

    let mut exploit = file.and_then(|f| f.exploit.clone()).unwrap_or_default();
    if let Some(host) = &cli.msf_host {
        exploit.host = host.clone();
    }
    if let Some(port) = cli.msf_port {
        exploit.port = port;
    }
    if let Some(creds) = &cli.msf_creds {
        exploit.credentials = creds.clone();
    }
    if let Some(endpoint) = &cli.msf_endpoint {
        exploit.endpoint = endpoint.clone();
    }
    if cli.msf_nossl {
        exploit.ssl = false;
    }
    exploit.autostart |= cli.msf_start;
    config.exploit = exploit;

    config.error_policy = ErrorPolicy::from_verbosity(cli.verbose);
    Ok(config)
}

fn resolve_stages(cli: &Cli, file: Option<&HeliosConfig>) -> Result<StageSet, HeliosError> {
    let scan = file.and_then(|f| f.scan.as_ref());
    if cli.all || scan.and_then(|s| s.all).unwrap_or(false) {
        return Ok(StageSet::all());
    }

    let mut stages = StageSet::empty();
    let toggles = [
        (cli.crawler, StageFlag::Crawl),
        (cli.scan, StageFlag::Scan),
        (cli.adv, StageFlag::AdvancedScripts),
        (cli.driver, StageFlag::BrowserDiscovery),
        (cli.cms, StageFlag::Cms),
        (cli.webapp, StageFlag::WebApp),
        (cli.msf, StageFlag::ExploitCorrelation),
    ];
    for (enabled, flag) in toggles {
        if enabled {
            stages.insert(flag);
        }
    }

    for name in scan.and_then(|s| s.stages.as_ref()).into_iter().flatten() {
        if name.trim().eq_ignore_ascii_case("all") {
            return Ok(StageSet::all());
        }
        stages.insert(name.parse()?);
    }
    Ok(stages)
}

fn build_login(cli: &Cli, file: Option<&LoginConfig>) -> Result<Option<LoginConfig>, HeliosError> {
    let any_flag = cli.login.is_some()
        || cli.login_creds.is_some()
        || cli.login_url.is_some()
        || cli.login_data.is_some()
        || cli.token_url.is_some()
        || !cli.headers.is_empty();
    if !any_flag {
        return Ok(file.cloned());
    }

    let mut login = file.cloned().unwrap_or_default();
    if let Some(method) = &cli.login {
        login.method = Some(method.parse::<LoginMethod>()?);
    }
    if let Some(creds) = &cli.login_creds {
        login.credentials = Some(creds.clone());
    }
    if let Some(url) = &cli.login_url {
        login.url = Some(url.clone());
    }
    if let Some(data) = &cli.login_data {
        login.data = Some(data.clone());
    }
    if let Some(token_url) = &cli.token_url {
        login.token_url = Some(token_url.clone());
    }
    login.headers.extend(cli.headers.iter().cloned());
    Ok(Some(login))
}

/// Extra scope hosts from `--scopes` and the config file, comma joined.
pub fn extra_scope_hosts(cli: &Cli, file: Option<&HeliosConfig>) -> Option<String> {
    let mut hosts: Vec<String> = cli.scopes.as_deref().map(split_list).unwrap_or_default();
    if let Some(extra) = file.and_then(|f| f.scope.as_ref()).and_then(|s| s.hosts.as_ref()) {
        hosts.extend(extra.iter().map(|h| h.trim().to_string()).filter(|h| !h.is_empty()));
    }
    if hosts.is_empty() {
        None
    } else {
        Some(hosts.join(","))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run a scan from parsed arguments, rendering progress until it ends.
pub async fn handle_scan(cli: &Cli, seeds: Vec<String>) -> Result<RunOutcome, HeliosError> {
    let file_config = match &cli.config {
        Some(path) => Some(parse_config(path).await?),
        None => None,
    };
    let run_config = build_run_config(cli, file_config.as_ref())?;
    let extra_hosts = extra_scope_hosts(cli, file_config.as_ref());
    let collaborators = Collaborators::from_config(&run_config)?;
    let output_path = run_config.output_path.clone();

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("KeyboardInterrupt received, shutting down");
            ctrl_c_token.cancel();
        }
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let renderer = tokio::spawn(async move {
        let mut progress = ScanProgress::new();
        while let Some(event) = event_rx.recv().await {
            progress.handle_event(&event);
        }
        progress.finish();
    });

    let controller = ScanController::new(run_config, collaborators)
        .with_cancel_token(cancel)
        .with_event_channel(event_tx);
    let outcome = controller.run(&seeds, extra_hosts.as_deref()).await;
    drop(controller);
    let _ = renderer.await;

    if let Ok(RunOutcome::Completed(tree)) = &outcome {
        print_summary(tree, output_path.as_deref());
    }
    outcome
}
