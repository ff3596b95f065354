use dotenvy::dotenv;
use reel_relay::bot::handlers::setup_handler;
use reel_relay::config::Settings;
use reel_relay::relay::RelayController;
use reel_relay::store::ArtifactStore;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Masks Telegram bot tokens before log lines reach stderr.
///
/// teloxide builds request URLs as `https://api.telegram.org/bot<id>:<secret>/<Method>`,
/// and network errors echo that URL verbatim. Config errors may print the bare token.
struct TokenRedactor {
    rules: Vec<(Regex, &'static str)>,
}

impl TokenRedactor {
    /// Compile the redaction rules
    ///
    /// # Errors
    ///
    /// Returns an error if any regex pattern is invalid
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            rules: vec![
                // token as a URL path segment, incl. file downloads (/file/bot<token>/...)
                (
                    Regex::new(r"(/bot)[0-9]{5,12}:[A-Za-z0-9_-]{30,}")?,
                    "${1}[TELEGRAM_TOKEN]",
                ),
                // bare token, e.g. TELEGRAM_TOKEN=<token> in a config dump
                (
                    Regex::new(r"\b[0-9]{5,12}:[A-Za-z0-9_-]{30,}")?,
                    "[TELEGRAM_TOKEN]",
                ),
            ],
        })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |text, (pattern, replacement)| {
                pattern.replace_all(&text, *replacement).into_owned()
            })
    }
}

struct RedactingWriter<W: Write> {
    inner: W,
    redactor: Arc<TokenRedactor>,
}

impl<W: Write> RedactingWriter<W> {
    const fn new(inner: W, redactor: Arc<TokenRedactor>) -> Self {
        Self { inner, redactor }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let s = String::from_utf8_lossy(buf);
        let redacted = self.redactor.redact(&s);
        self.inner.write_all(redacted.as_bytes())?;
        // Report the caller's length; the redacted text may differ in size
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactingMakeWriter<F> {
    make_inner: F,
    redactor: Arc<TokenRedactor>,
}

impl<F> RedactingMakeWriter<F> {
    const fn new(make_inner: F, redactor: Arc<TokenRedactor>) -> Self {
        Self {
            make_inner,
            redactor,
        }
    }
}

impl<'a, F, W> tracing_subscriber::fmt::MakeWriter<'a> for RedactingMakeWriter<F>
where
    F: Fn() -> W + 'static,
    W: Write,
{
    type Writer = RedactingWriter<W>;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter::new((self.make_inner)(), Arc::clone(&self.redactor))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let redactor = Arc::new(TokenRedactor::new().map_err(|e| {
        eprintln!("Failed to compile redaction patterns: {e}");
        e
    })?);
    init_logging(redactor);

    info!("Starting reel relay bot...");

    let settings = init_settings();

    let store = Arc::new(ArtifactStore::new());
    let reaper_cancel = CancellationToken::new();
    let reaper = Arc::clone(&store).spawn_reaper(
        settings.artifact_ttl(),
        settings.sweep_interval(),
        reaper_cancel.clone(),
    );
    info!(
        ttl_secs = settings.artifact_ttl_secs,
        sweep_secs = settings.sweep_interval().as_secs(),
        "Artifact reaper started"
    );

    let relay = Arc::new(RelayController::from_settings(&settings, Arc::clone(&store)));
    info!(
        marker = %relay.link_marker(),
        staging_root = %settings.staging_root().display(),
        "Relay controller initialized"
    );

    let bot = Bot::new(settings.telegram_token.clone());

    info!("Bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![relay])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Shutting down...");
    reaper_cancel.cancel();
    if let Err(e) = reaper.await {
        warn!(error = %e, "Artifact reaper did not stop cleanly");
    }
    let released = store.release_all().await;
    info!(released, "Staged videos released");

    Ok(())
}

fn init_logging(redactor: Arc<TokenRedactor>) {
    let make_writer = RedactingMakeWriter::new(io::stderr, redactor);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<Settings> {
    match Settings::new() {
        Ok(s) => {
            info!("Configuration loaded successfully.");
            Arc::new(s)
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    }
}
