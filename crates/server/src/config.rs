use std::time::Duration;

use serde::Deserialize;

use mailbrief_pipeline::PipelineConfig;

/// Top-level configuration, loaded from a TOML file.
///
/// Every section has defaults so a missing file yields a runnable (if
/// credential-less) configuration.
#[derive(Debug, Default, Deserialize)]
pub struct MailbriefConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub gmail: GmailConfigSection,
    #[serde(default)]
    pub openai: OpenAiConfigSection,
    #[serde(default)]
    pub firecrawl: FirecrawlConfigSection,
    #[serde(default)]
    pub brave: BraveConfigSection,
    #[serde(default)]
    pub mailer: MailerConfigSection,
    #[serde(default)]
    pub pipeline: PipelineConfigSection,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// HTTP bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

/// Weekly trigger configuration.
#[derive(Debug, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Standard 5-field cron expression.
    #[serde(default = "default_cron")]
    pub cron: String,
    /// IANA timezone for evaluating the expression.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: default_cron(),
            timezone: default_timezone(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_cron() -> String {
    "0 9 * * MON".to_owned()
}

fn default_timezone() -> String {
    "UTC".to_owned()
}

/// Mailbox credentials.
#[derive(Debug, Default, Deserialize)]
pub struct GmailConfigSection {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

fn default_user_id() -> String {
    "default".to_owned()
}

/// LLM endpoint and key.
#[derive(Debug, Deserialize)]
pub struct OpenAiConfigSection {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_openai_endpoint")]
    pub endpoint: String,
}

impl Default for OpenAiConfigSection {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_openai_endpoint(),
        }
    }
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_owned()
}

#[derive(Debug, Default, Deserialize)]
pub struct FirecrawlConfigSection {
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct BraveConfigSection {
    #[serde(default)]
    pub api_key: String,
}

/// Outbound email configuration.
#[derive(Debug, Deserialize)]
pub struct MailerConfigSection {
    /// `"resend"` or `"smtp"`.
    #[serde(default = "default_mail_backend")]
    pub backend: String,
    #[serde(default)]
    pub from: String,
    /// Digest recipient.
    #[serde(default)]
    pub recipient: String,
    #[serde(default)]
    pub resend_api_key: String,
    /// Link included in re-authorization notices.
    #[serde(default)]
    pub reauth_url: String,
    #[serde(default)]
    pub smtp: SmtpConfigSection,
}

impl Default for MailerConfigSection {
    fn default() -> Self {
        Self {
            backend: default_mail_backend(),
            from: String::new(),
            recipient: String::new(),
            resend_api_key: String::new(),
            reauth_url: String::new(),
            smtp: SmtpConfigSection::default(),
        }
    }
}

fn default_mail_backend() -> String {
    "resend".to_owned()
}

#[derive(Debug, Deserialize)]
pub struct SmtpConfigSection {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_true")]
    pub tls: bool,
}

impl Default for SmtpConfigSection {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
            tls: true,
        }
    }
}

fn default_smtp_host() -> String {
    "localhost".to_owned()
}

fn default_smtp_port() -> u16 {
    587
}

/// Pipeline tunables; unset values fall back to the built-in limits.
#[derive(Debug, Default, Deserialize)]
pub struct PipelineConfigSection {
    pub max_cost_per_run: Option<f64>,
    pub cleanup_batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub max_emails_per_run: Option<u32>,
    pub openai_batch_size: Option<usize>,
    pub max_urls_per_email: Option<usize>,
    pub max_article_length: Option<usize>,
    pub search_results_per_email: Option<u32>,
    pub stage_timeout_secs: Option<u64>,
    pub run_budget_secs: Option<u64>,
    pub inline_payload_limit: Option<usize>,
    pub max_openai_calls: Option<u32>,
    pub max_firecrawl_calls: Option<u32>,
    pub max_brave_calls: Option<u32>,
}

impl PipelineConfigSection {
    /// Merge this section over the pipeline defaults.
    #[must_use]
    pub fn build(&self, recipient: String, own_address: String) -> PipelineConfig {
        let mut config = PipelineConfig {
            recipient,
            own_address,
            ..PipelineConfig::default()
        };
        if let Some(v) = self.max_cost_per_run {
            config.max_cost_per_run = v;
        }
        if let Some(v) = self.cleanup_batch_size {
            config.cleanup_batch_size = v.max(1);
        }
        if let Some(v) = self.batch_delay_ms {
            config.inter_batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.max_emails_per_run {
            config.max_emails_per_run = v;
        }
        if let Some(v) = self.openai_batch_size {
            config.openai_batch_size = v.clamp(10, 50);
        }
        if let Some(v) = self.max_urls_per_email {
            config.max_urls_per_email = v;
        }
        if let Some(v) = self.max_article_length {
            config.max_article_length = v;
        }
        if let Some(v) = self.search_results_per_email {
            config.search_results_per_email = v;
        }
        if let Some(v) = self.stage_timeout_secs {
            config.stage_timeout = Duration::from_secs(v);
        }
        if let Some(v) = self.run_budget_secs {
            config.run_budget = Duration::from_secs(v);
        }
        if let Some(v) = self.inline_payload_limit {
            config.inline_payload_limit = v;
        }
        config
    }
}

/// Persistent storage configuration.
#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    /// `"memory"` or `"fs"`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,
    /// Root directory for the filesystem backend.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_owned()
}

fn default_storage_path() -> String {
    "./data".to_owned()
}
