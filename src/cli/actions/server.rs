use crate::{
    api::{self, ServerConfig},
    device::{DeviceConfig, TemplateSelector},
    email::EmailSenderKind,
};
use anyhow::Result;
use secrecy::{ExposeSecret, SecretString};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub device: DeviceConfig,
    pub email_sender: EmailSenderKind,
    pub templates: TemplateSelector,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    api::new(
        args.port,
        args.dsn,
        ServerConfig {
            device: args.device,
            email_sender: args.email_sender,
            templates: args.templates,
        },
    )
    .await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", redact_dsn(args.dsn.expose_secret())),
        ("max_signatures", args.device.max_signatures().to_string()),
        ("cas_attempts", args.device.cas_attempts().to_string()),
        ("cookie_name", args.device.cookie_name().to_string()),
        (
            "cookie_max_age_seconds",
            args.device.cookie_max_age_seconds().to_string(),
        ),
        ("flow_ttl_seconds", args.device.flow_ttl_seconds().to_string()),
        ("max_flows", args.device.max_flows().to_string()),
        ("email_sender", args.email_sender.to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("REDACTED"));
            }
            parsed.to_string()
        }
        Err(_) => "invalid-dsn".to_string(),
    }
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\n{title}:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}
