use std::{process, sync::Arc, time::Duration as StdDuration};

use kubinet::{
    application::{
        content::{BlogService, PageContentService, RevalidationHook},
        error::AppError,
        gate::LockoutPolicy,
        render::{ComrakParser, MarkdownRenderer},
        repos::{PagesRepo, PagesWriteRepo, PostsRepo, PostsWriteRepo},
        revalidation::{RevalidationService, Revalidator},
        session::AuthBackend,
    },
    cache::{CacheConfig, CacheState, ResponseStore},
    config::{self, AuthSettings, StorageSettings},
    infra::{
        auth::{HostedAuthBackend, LocalAuthBackend},
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState, BrowserLimits, BrowserSessions},
        memory::MemoryRepositories,
        revalidate::{HttpRevalidator, LocalRevalidator},
        storage::StorageBackend,
        telemetry,
    },
    util::clock::SystemClock,
};
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    if let config::Command::HashPassword(args) = &command {
        println!("{}", LocalAuthBackend::digest(&args.password));
        return Ok(());
    }

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrations(&settings).await,
        config::Command::HashPassword(_) => Ok(()),
    }
}

async fn run_migrations(settings: &config::Settings) -> Result<(), AppError> {
    if connect_database(settings).await?.is_none() {
        return Err(AppError::from(InfraError::configuration(
            "database url is not configured; nothing to migrate",
        )));
    }
    info!(target = "kubinet::migrate", "database schema is up to date");
    Ok(())
}

/// Connect and migrate when a database url is configured.
async fn connect_database(
    settings: &config::Settings,
) -> Result<Option<Arc<PostgresRepositories>>, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        return Ok(None);
    };

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Some(Arc::new(PostgresRepositories::new(pool))))
}

struct Repositories {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    pages: Arc<dyn PagesRepo>,
    pages_write: Arc<dyn PagesWriteRepo>,
    db: Option<Arc<PostgresRepositories>>,
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    match connect_database(settings).await? {
        Some(db) => Ok(Repositories {
            posts: db.clone(),
            posts_write: db.clone(),
            pages: db.clone(),
            pages_write: db.clone(),
            db: Some(db),
        }),
        None => {
            warn!(
                target = "kubinet::serve",
                "no database url configured; content lives in memory and is lost on exit"
            );
            let memory = Arc::new(MemoryRepositories::new());
            Ok(Repositories {
                posts: memory.clone(),
                posts_write: memory.clone(),
                pages: memory.clone(),
                pages_write: memory,
                db: None,
            })
        }
    }
}

fn time_duration(key: &str, value: StdDuration) -> Result<time::Duration, AppError> {
    time::Duration::try_from(value)
        .map_err(|err| AppError::validation(format!("`{key}` is out of range: {err}")))
}

fn build_auth_backend(settings: &AuthSettings) -> Result<Arc<dyn AuthBackend>, AppError> {
    match settings {
        AuthSettings::Hosted { url, api_key } => HostedAuthBackend::new(url.as_str(), api_key)
            .map(|backend| Arc::new(backend) as Arc<dyn AuthBackend>)
            .map_err(|err| AppError::from(InfraError::backend(err.to_string()))),
        AuthSettings::Local {
            email,
            password_sha256,
        } => Ok(Arc::new(LocalAuthBackend::new(email, password_sha256))),
    }
}

fn build_application_state(
    settings: &config::Settings,
    repositories: Repositories,
) -> Result<AppState, AppError> {
    let cache_config = CacheConfig::from(&settings.cache);
    let store = Arc::new(ResponseStore::new(&cache_config));
    let cache = cache_config.enabled.then(|| CacheState {
        config: cache_config.clone(),
        store: store.clone(),
    });

    let revalidation = Arc::new(RevalidationService::new(
        &settings.revalidation.token,
        store,
    ));
    let revalidator: Arc<dyn Revalidator> = match settings.revalidation.endpoint.clone() {
        Some(endpoint) => Arc::new(
            HttpRevalidator::new(endpoint, settings.revalidation.token.clone())
                .map_err(|err| AppError::from(InfraError::backend(err.to_string())))?,
        ),
        None => Arc::new(LocalRevalidator::new(
            revalidation.clone(),
            settings.revalidation.token.clone(),
        )),
    };
    let hook = RevalidationHook::new(revalidator, settings.revalidation.timeout);

    let blog = Arc::new(BlogService::new(
        repositories.posts,
        repositories.posts_write,
        hook.clone(),
    ));
    let pages = Arc::new(PageContentService::new(
        repositories.pages,
        repositories.pages_write,
        hook,
    ));

    let clock = Arc::new(SystemClock);
    let renderer = Arc::new(MarkdownRenderer::with_ttl(
        Arc::new(ComrakParser::new()),
        clock.clone(),
        time_duration("markdown.ttl_seconds", settings.markdown.ttl)?,
    ));

    let storage = match &settings.storage {
        StorageSettings::Memory => StorageBackend::Memory,
        StorageSettings::File { directory } => StorageBackend::File {
            directory: directory.clone(),
        },
    };
    let policy = LockoutPolicy {
        max_attempts: settings.gate.max_attempts.get(),
        lockout: time_duration("gate.lockout_seconds", settings.gate.lockout)?,
    };
    let limits = BrowserLimits {
        max_browsers: settings.gate.max_browsers.get(),
        idle: time_duration("gate.browser_idle_seconds", settings.gate.browser_idle)?,
    };
    let sessions = Arc::new(BrowserSessions::new(
        build_auth_backend(&settings.auth)?,
        storage,
        settings.gate.secret_key.clone(),
        policy,
        limits,
        clock,
    ));

    Ok(AppState {
        blog,
        pages,
        renderer,
        revalidation,
        sessions,
        cache,
        db: repositories.db,
    })
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_application_state(&settings, repositories)?;
    serve_http(&settings, state).await
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);
    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "kubinet::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let stopping = Arc::new(Notify::new());
    let trigger = stopping.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            trigger.notify_one();
        },
    );
    let mut handle = tokio::spawn(async move { server.await });

    tokio::select! {
        joined = &mut handle => return server_result(joined),
        _ = stopping.notified() => {
            info!(target = "kubinet::serve", "shutdown requested, draining connections");
        }
    }

    match tokio::time::timeout(settings.server.graceful_shutdown, &mut handle).await {
        Ok(joined) => server_result(joined),
        Err(_) => {
            warn!(
                target = "kubinet::serve",
                grace_secs = settings.server.graceful_shutdown.as_secs(),
                "graceful shutdown timed out; dropping remaining connections"
            );
            handle.abort();
            Ok(())
        }
    }
}

fn server_result(
    joined: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match joined {
        Ok(result) => result.map_err(|err| AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(target = "kubinet::serve", error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
