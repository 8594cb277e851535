use std::path::PathBuf;

use clap::Parser;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "helios",
    version,
    long_version = LONG_VERSION,
    about = "Web application security scan pipeline"
)]
pub struct Cli {
    /// URL to start with
    #[arg(short = 'u', long = "url")]
    pub url: Option<String>,

    /// File with start URLs, one per line
    #[arg(long = "urls")]
    pub urls: Option<PathBuf>,

    /// Set the user agent
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Run everything
    #[arg(short = 'a', long = "all")]
    pub all: bool,

    /// Output file to write the JSON report to
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the browser driver for dynamic discovery
    #[arg(short = 'd', long = "driver", help_heading = "Browser")]
    pub driver: bool,

    /// Path to the browser driver executable
    #[arg(long, help_heading = "Browser")]
    pub driver_path: Option<String>,

    /// Show the browser window
    #[arg(long, help_heading = "Browser")]
    pub show_driver: bool,

    /// Keep the browser open until the user is done
    #[arg(long, help_heading = "Browser")]
    pub interactive: bool,

    /// Disable the driver's proxy module
    #[arg(long, help_heading = "Browser")]
    pub no_proxy: bool,

    /// Port for the driver's proxy module [default: 3333]
    #[arg(long, help_heading = "Browser")]
    pub proxy_port: Option<u16>,

    /// Enable the crawler
    #[arg(short = 'c', long = "crawler", help_heading = "Crawler")]
    pub crawler: bool,

    /// Max URLs for the crawler [default: 200]
    #[arg(long, help_heading = "Crawler")]
    pub max_urls: Option<usize>,

    /// Extra allowed hosts, comma separated (* wildcards allowed)
    #[arg(long, help_heading = "Crawler")]
    pub scopes: Option<String>,

    /// Scope options: subdomains, same-scheme, https-only
    #[arg(long, help_heading = "Crawler")]
    pub scope_options: Option<String>,

    /// Enable the scanner
    #[arg(short = 's', long = "scan", help_heading = "Scanner")]
    pub scan: bool,

    /// Enable the advanced scripts
    #[arg(long, help_heading = "Scanner")]
    pub adv: bool,

    /// Enable CMS fingerprinting
    #[arg(long, help_heading = "Scanner")]
    pub cms: bool,

    /// Enable web application framework fingerprinting (Tomcat, JBoss, ...)
    #[arg(long, help_heading = "Scanner")]
    pub webapp: bool,

    /// Comma separated scan options (discovery, passive, injection, dangerous, all)
    #[arg(long, help_heading = "Scanner")]
    pub options: Option<String>,

    /// Login method: basic, form, form-csrf, header
    #[arg(long, help_heading = "Login")]
    pub login: Option<String>,

    /// Credentials as username:password (or $ENV_VAR)
    #[arg(long, help_heading = "Login")]
    pub login_creds: Option<String>,

    /// URL to post the login form to
    #[arg(long, help_heading = "Login")]
    pub login_url: Option<String>,

    /// urlencoded login form data
    #[arg(long, help_heading = "Login")]
    pub login_data: Option<String>,

    /// Page to fetch CSRF tokens from [default: login URL]
    #[arg(long, help_heading = "Login")]
    pub token_url: Option<String>,

    /// Header sent on all requests, e.g. "Authorization: Bearer {token}"
    #[arg(long = "header", help_heading = "Login")]
    pub headers: Vec<String>,

    /// Number of crawling and scanning threads [default: 10]
    #[arg(long, help_heading = "Advanced")]
    pub threads: Option<String>,

    /// Enable TLS certificate verification
    #[arg(long, help_heading = "Advanced")]
    pub sslverify: bool,

    /// SQLite database to record results in [default: helios.db]
    #[arg(long, help_heading = "Advanced")]
    pub database: Option<PathBuf>,

    /// Retries for collaborator network operations [default: 2]
    #[arg(long, help_heading = "Advanced")]
    pub retries: Option<u32>,

    /// Increase log verbosity and re-raise stage errors (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, help_heading = "Advanced")]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, help_heading = "Advanced")]
    pub no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, help_heading = "Advanced")]
    pub json_logs: bool,

    /// Enable exploit correlation through msfrpcd
    #[arg(long, help_heading = "Metasploit")]
    pub msf: bool,

    /// msfrpcd host [default: localhost]
    #[arg(long, help_heading = "Metasploit")]
    pub msf_host: Option<String>,

    /// msfrpcd port [default: 55553]
    #[arg(long, help_heading = "Metasploit")]
    pub msf_port: Option<u16>,

    /// msfrpcd username:password [default: msf:msfrpcd]
    #[arg(long, help_heading = "Metasploit")]
    pub msf_creds: Option<String>,

    /// msfrpcd endpoint URI [default: /api/]
    #[arg(long, help_heading = "Metasploit")]
    pub msf_endpoint: Option<String>,

    /// Connect to msfrpcd without TLS
    #[arg(long, help_heading = "Metasploit")]
    pub msf_nossl: bool,

    /// Start msfrpcd if it is not running
    #[arg(long, help_heading = "Metasploit")]
    pub msf_start: bool,
}
