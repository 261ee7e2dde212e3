use clap::{Arg, ArgMatches, Command};

use crate::device::{
    DEFAULT_FLOW_TTL_SECONDS, DEFAULT_MAX_FLOWS, DeviceConfig,
    capture::{DEFAULT_COOKIE_MAX_AGE_SECONDS, DEVICE_ID_COOKIE},
    history::{DEFAULT_CAS_ATTEMPTS, DEFAULT_MAX_SIGNATURES},
};

pub const ARG_MAX_SIGNATURES: &str = "max-signatures";
pub const ARG_CAS_ATTEMPTS: &str = "cas-attempts";
pub const ARG_COOKIE_NAME: &str = "cookie-name";
pub const ARG_COOKIE_MAX_AGE_SECONDS: &str = "cookie-max-age-seconds";
pub const ARG_FLOW_TTL_SECONDS: &str = "flow-ttl-seconds";
pub const ARG_MAX_FLOWS: &str = "max-flows";

#[derive(Debug, Clone)]
pub struct Options {
    pub max_signatures: usize,
    pub cas_attempts: u32,
    pub cookie_name: String,
    pub cookie_max_age_seconds: u64,
    pub flow_ttl_seconds: u64,
    pub max_flows: usize,
}

impl Options {
    /// Parse device tracking arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the cookie name is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let cookie_name = matches
            .get_one::<String>(ARG_COOKIE_NAME)
            .map(|name| name.trim().to_string())
            .unwrap_or_else(|| DEVICE_ID_COOKIE.to_string());
        if cookie_name.is_empty() {
            anyhow::bail!("--{ARG_COOKIE_NAME} must not be empty");
        }

        Ok(Self {
            max_signatures: matches
                .get_one::<usize>(ARG_MAX_SIGNATURES)
                .copied()
                .unwrap_or(DEFAULT_MAX_SIGNATURES),
            cas_attempts: matches
                .get_one::<u32>(ARG_CAS_ATTEMPTS)
                .copied()
                .unwrap_or(DEFAULT_CAS_ATTEMPTS),
            cookie_name,
            cookie_max_age_seconds: matches
                .get_one::<u64>(ARG_COOKIE_MAX_AGE_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_COOKIE_MAX_AGE_SECONDS),
            flow_ttl_seconds: matches
                .get_one::<u64>(ARG_FLOW_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_FLOW_TTL_SECONDS),
            max_flows: matches
                .get_one::<u32>(ARG_MAX_FLOWS)
                .and_then(|max| usize::try_from(*max).ok())
                .unwrap_or(DEFAULT_MAX_FLOWS),
        })
    }

    #[must_use]
    pub fn into_config(self) -> DeviceConfig {
        DeviceConfig::new()
            .with_max_signatures(self.max_signatures)
            .with_cas_attempts(self.cas_attempts)
            .with_cookie_name(self.cookie_name)
            .with_cookie_max_age_seconds(self.cookie_max_age_seconds)
            .with_flow_ttl_seconds(self.flow_ttl_seconds)
            .with_max_flows(self.max_flows)
            .normalize()
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_SIGNATURES)
                .long(ARG_MAX_SIGNATURES)
                .help("Known device signatures kept per user, oldest evicted first")
                .env("DEVICETRUST_MAX_SIGNATURES")
                .default_value("20")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_CAS_ATTEMPTS)
                .long(ARG_CAS_ATTEMPTS)
                .help("Attempts to update a user's device history when logins race")
                .env("DEVICETRUST_CAS_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_NAME)
                .long(ARG_COOKIE_NAME)
                .help("Name of the long-lived device identity cookie")
                .env("DEVICETRUST_COOKIE_NAME")
                .default_value(DEVICE_ID_COOKIE),
        )
        .arg(
            Arg::new(ARG_COOKIE_MAX_AGE_SECONDS)
                .long(ARG_COOKIE_MAX_AGE_SECONDS)
                .help("Max-Age of the device identity cookie in seconds")
                .env("DEVICETRUST_COOKIE_MAX_AGE_SECONDS")
                .default_value("31536000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_FLOW_TTL_SECONDS)
                .long(ARG_FLOW_TTL_SECONDS)
                .help("Idle time after which an unfinished authentication session is dropped")
                .env("DEVICETRUST_FLOW_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_FLOWS)
                .long(ARG_MAX_FLOWS)
                .help("Open authentication sessions kept at once; new flows get 503 beyond it")
                .env("DEVICETRUST_MAX_FLOWS")
                .default_value("10000")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
}
