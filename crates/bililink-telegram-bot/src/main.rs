use bililink_core::CoreSettings;
use bililink_transport_telegram::config::{BotSettings, TelegramSettings};
use bililink_transport_telegram::runner::run_bot;
use dotenvy::dotenv;
use regex::Regex;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Secrets that must never reach the log: the bot token and the Bilibili
/// login cookies
struct Redactor {
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    fn new() -> Result<Self, regex::Error> {
        let rules = vec![
            // Token inside Bot API URLs printed by teloxide and reqwest
            (Regex::new(r"(/bot)[0-9]+:[A-Za-z0-9_-]+")?, "${1}[TELEGRAM_TOKEN]"),
            (Regex::new(r"\b[0-9]{8,10}:[A-Za-z0-9_-]{35}")?, "[TELEGRAM_TOKEN]"),
            (Regex::new(r"(SESSDATA=)[^;\s&]+")?, "${1}[MASKED]"),
            (Regex::new(r"(bili_jct=)[^;\s&]+")?, "${1}[MASKED]"),
        ];
        Ok(Self { rules })
    }

    fn redact(&self, input: &str) -> String {
        self.rules
            .iter()
            .fold(input.to_string(), |text, (pattern, replacement)| {
                pattern.replace_all(&text, *replacement).into_owned()
            })
    }
}

/// Stderr handle that masks each formatted event before writing it
struct RedactedStderr {
    inner: io::Stderr,
    redactor: Arc<Redactor>,
}

impl Write for RedactedStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let masked = self.redactor.redact(&String::from_utf8_lossy(buf));
        self.inner.write_all(masked.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct RedactedStderrMaker(Arc<Redactor>);

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RedactedStderrMaker {
    type Writer = RedactedStderr;

    fn make_writer(&'a self) -> Self::Writer {
        RedactedStderr {
            inner: io::stderr(),
            redactor: Arc::clone(&self.0),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file
    dotenv().ok();

    // Masking must be in place before the first log line
    let redactor = Arc::new(Redactor::new().map_err(|e| {
        eprintln!("Failed to compile redaction rules: {e}");
        e
    })?);

    init_logging(redactor);

    info!("Starting Bilibili link bot...");

    let settings = init_settings();

    run_bot(settings).await;

    Ok(())
}

fn init_logging(redactor: Arc<Redactor>) {
    let make_writer = RedactedStderrMaker(redactor);

    let debug_mode = std::env::var("DEBUG_MODE")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);

    let filter = if debug_mode {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "bililink_core=info,bililink_transport_telegram=info,bililink_telegram_bot=info,hyper=warn,h2=error,reqwest=warn,tokio=warn,tower=warn,teloxide=warn",
            )
        })
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(make_writer))
        .init();
}

fn init_settings() -> Arc<BotSettings> {
    let core_settings = match CoreSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load core configuration: {}", e);
            std::process::exit(1);
        }
    };
    let telegram_settings = match TelegramSettings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load telegram configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration loaded successfully.");
    Arc::new(BotSettings::new(core_settings, telegram_settings))
}

#[cfg(test)]
mod tests {
    use super::Redactor;

    #[test]
    fn secrets_are_masked() {
        let redactor = Redactor::new().expect("rules");

        let url = "POST https://api.telegram.org/bot123456789:AAEhBOweik6ad9r_QXMENQjcrGbqCr4K-ty/getMe";
        assert_eq!(
            redactor.redact(url),
            "POST https://api.telegram.org/bot[TELEGRAM_TOKEN]/getMe"
        );

        let bare = "token=123456789:AAEhBOweik6ad9r_QXMENQjcrGbqCr4K-ty loaded";
        assert_eq!(redactor.redact(bare), "token=[TELEGRAM_TOKEN] loaded");

        let cookie = "cookie: SESSDATA=abc%2C123; bili_jct=deadbeef; buvid3=keep";
        assert_eq!(
            redactor.redact(cookie),
            "cookie: SESSDATA=[MASKED]; bili_jct=[MASKED]; buvid3=keep"
        );
    }

    #[test]
    fn ordinary_lines_pass_through() {
        let redactor = Redactor::new().expect("rules");
        let line = "Handling message: 'https://b23.tv/BV1GJ411x7h7 12:30'";
        assert_eq!(redactor.redact(line), line);
    }
}
