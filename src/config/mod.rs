//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, DatabaseOverride, HashPasswordArgs, MigrateArgs, ServeArgs, ServeOverrides,
};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "kubinet";
const ENV_PREFIX: &str = "KUBINET";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_GATE_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_GATE_LOCKOUT_SECS: u64 = 300;
const DEFAULT_GATE_MAX_BROWSERS: usize = 1_024;
const DEFAULT_GATE_BROWSER_IDLE_SECS: u64 = 1_800;
const DEFAULT_REVALIDATION_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_MARKDOWN_TTL_SECS: u64 = 3_600;
const DEFAULT_CACHE_RESPONSE_LIMIT: usize = 200;
const DEFAULT_CACHE_HOME_MAX_AGE_SECS: u64 = 3_600;
const DEFAULT_CACHE_BLOG_MAX_AGE_SECS: u64 = 600;
const DEFAULT_STORAGE_DIR: &str = "data/browsers";

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub gate: GateSettings,
    pub revalidation: RevalidationSettings,
    pub markdown: MarkdownSettings,
    pub cache: CacheSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    /// Without a URL the site runs on in-memory repositories.
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub enum AuthSettings {
    Hosted { url: Url, api_key: String },
    Local { email: String, password_sha256: String },
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub secret_key: String,
    pub max_attempts: NonZeroU32,
    pub lockout: Duration,
    pub max_browsers: NonZeroUsize,
    pub browser_idle: Duration,
}

#[derive(Debug, Clone)]
pub struct RevalidationSettings {
    pub token: String,
    /// Remote endpoint to notify instead of the in-process cache.
    pub endpoint: Option<Url>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MarkdownSettings {
    pub ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub enabled: bool,
    pub response_limit: NonZeroUsize,
    pub home_max_age_secs: u64,
    pub blog_max_age_secs: u64,
}

#[derive(Debug, Clone)]
pub enum StorageSettings {
    Memory,
    File { directory: PathBuf },
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::HashPassword(_)) => {}
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    auth: RawAuthSettings,
    gate: RawGateSettings,
    revalidation: RawRevalidationSettings,
    markdown: RawMarkdownSettings,
    cache: RawCacheSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(directory) = overrides.storage_directory.as_ref() {
            self.storage.backend = Some("file".to_string());
            self.storage.directory = Some(directory.clone());
        }
        self.apply_database_override(&overrides.database);
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            auth,
            gate,
            revalidation,
            markdown,
            cache,
            storage,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            auth: build_auth_settings(auth)?,
            gate: build_gate_settings(gate)?,
            revalidation: build_revalidation_settings(revalidation)?,
            markdown: build_markdown_settings(markdown)?,
            cache: build_cache_settings(cache)?,
            storage: build_storage_settings(storage)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);
    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_auth_settings(auth: RawAuthSettings) -> Result<AuthSettings, LoadError> {
    let hosted_url = non_blank(auth.url);
    let backend = match non_blank(auth.backend) {
        Some(backend) => backend.to_ascii_lowercase(),
        None if hosted_url.is_some() => "hosted".to_string(),
        None => "local".to_string(),
    };

    match backend.as_str() {
        "hosted" => {
            let raw_url = hosted_url
                .ok_or_else(|| LoadError::invalid("auth.url", "required for the hosted backend"))?;
            let url = Url::parse(&raw_url)
                .map_err(|err| LoadError::invalid("auth.url", format!("invalid url: {err}")))?;
            let api_key = non_blank(auth.api_key).ok_or_else(|| {
                LoadError::invalid("auth.api_key", "required for the hosted backend")
            })?;
            Ok(AuthSettings::Hosted { url, api_key })
        }
        "local" => {
            let email = non_blank(auth.local_email).ok_or_else(|| {
                LoadError::invalid("auth.local_email", "required for the local backend")
            })?;
            let password_sha256 = non_blank(auth.local_password_sha256)
                .ok_or_else(|| {
                    LoadError::invalid("auth.local_password_sha256", "required for the local backend")
                })?
                .to_ascii_lowercase();
            if password_sha256.len() != 64 || hex::decode(&password_sha256).is_err() {
                return Err(LoadError::invalid(
                    "auth.local_password_sha256",
                    "expected 64 hex characters",
                ));
            }
            Ok(AuthSettings::Local {
                email,
                password_sha256,
            })
        }
        other => Err(LoadError::invalid(
            "auth.backend",
            format!("unknown backend `{other}` (expected `hosted` or `local`)"),
        )),
    }
}

fn build_gate_settings(gate: RawGateSettings) -> Result<GateSettings, LoadError> {
    let secret_key = gate
        .secret_key
        .filter(|value| !value.is_empty())
        .ok_or_else(|| LoadError::invalid("gate.secret_key", "must be set"))?;
    let max_attempts = non_zero_u32(
        gate.max_attempts.unwrap_or(DEFAULT_GATE_MAX_ATTEMPTS).into(),
        "gate.max_attempts",
    )?;
    let lockout_secs = gate.lockout_seconds.unwrap_or(DEFAULT_GATE_LOCKOUT_SECS);
    if lockout_secs == 0 {
        return Err(LoadError::invalid(
            "gate.lockout_seconds",
            "must be greater than zero",
        ));
    }

    let max_browsers = NonZeroUsize::new(gate.max_browsers.unwrap_or(DEFAULT_GATE_MAX_BROWSERS))
        .ok_or_else(|| LoadError::invalid("gate.max_browsers", "must be greater than zero"))?;
    let browser_idle_secs = gate
        .browser_idle_seconds
        .unwrap_or(DEFAULT_GATE_BROWSER_IDLE_SECS);
    if browser_idle_secs == 0 {
        return Err(LoadError::invalid(
            "gate.browser_idle_seconds",
            "must be greater than zero",
        ));
    }

    Ok(GateSettings {
        secret_key,
        max_attempts,
        lockout: Duration::from_secs(lockout_secs),
        max_browsers,
        browser_idle: Duration::from_secs(browser_idle_secs),
    })
}

fn build_revalidation_settings(
    revalidation: RawRevalidationSettings,
) -> Result<RevalidationSettings, LoadError> {
    let token = non_blank(revalidation.token)
        .ok_or_else(|| LoadError::invalid("revalidation.token", "must be set"))?;
    let endpoint = non_blank(revalidation.endpoint)
        .map(|raw| {
            Url::parse(&raw).map_err(|err| {
                LoadError::invalid("revalidation.endpoint", format!("invalid url: {err}"))
            })
        })
        .transpose()?;
    let timeout_ms = revalidation
        .timeout_ms
        .unwrap_or(DEFAULT_REVALIDATION_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "revalidation.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(RevalidationSettings {
        token,
        endpoint,
        timeout: Duration::from_millis(timeout_ms),
    })
}

fn build_markdown_settings(markdown: RawMarkdownSettings) -> Result<MarkdownSettings, LoadError> {
    let ttl_secs = markdown.ttl_seconds.unwrap_or(DEFAULT_MARKDOWN_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "markdown.ttl_seconds",
            "must be greater than zero",
        ));
    }
    Ok(MarkdownSettings {
        ttl: Duration::from_secs(ttl_secs),
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let response_limit = NonZeroUsize::new(
        cache
            .response_limit
            .unwrap_or(DEFAULT_CACHE_RESPONSE_LIMIT),
    )
    .ok_or_else(|| LoadError::invalid("cache.response_limit", "must be greater than zero"))?;

    Ok(CacheSettings {
        enabled: cache.enabled.unwrap_or(true),
        response_limit,
        home_max_age_secs: cache
            .home_max_age_seconds
            .unwrap_or(DEFAULT_CACHE_HOME_MAX_AGE_SECS),
        blog_max_age_secs: cache
            .blog_max_age_seconds
            .unwrap_or(DEFAULT_CACHE_BLOG_MAX_AGE_SECS),
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let backend = non_blank(storage.backend)
        .unwrap_or_else(|| "file".to_string())
        .to_ascii_lowercase();
    match backend.as_str() {
        "memory" => Ok(StorageSettings::Memory),
        "file" => {
            let directory = storage
                .directory
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR));
            if directory.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "storage.directory",
                    "path must not be empty",
                ));
            }
            Ok(StorageSettings::File { directory })
        }
        other => Err(LoadError::invalid(
            "storage.backend",
            format!("unknown backend `{other}` (expected `file` or `memory`)"),
        )),
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAuthSettings {
    backend: Option<String>,
    url: Option<String>,
    api_key: Option<String>,
    local_email: Option<String>,
    local_password_sha256: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawGateSettings {
    secret_key: Option<String>,
    max_attempts: Option<u32>,
    lockout_seconds: Option<u64>,
    max_browsers: Option<usize>,
    browser_idle_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRevalidationSettings {
    token: Option<String>,
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMarkdownSettings {
    ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    enabled: Option<bool>,
    response_limit: Option<usize>,
    home_max_age_seconds: Option<u64>,
    blog_max_age_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    backend: Option<String>,
    directory: Option<PathBuf>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
