use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::device::notifier::{
    DEFAULT_SUBJECT_KEY, DEFAULT_TEMPLATE, EmailTemplate, RealmTemplate, TemplateSelector,
};
use crate::email::EmailSenderKind;

pub const ARG_EMAIL_SENDER: &str = "email-sender";
pub const ARG_EMAIL_TEMPLATE: &str = "email-template";
pub const ARG_EMAIL_SUBJECT_KEY: &str = "email-subject-key";
pub const ARG_REALM_TEMPLATE: &str = "realm-template";

#[derive(Debug, Clone)]
pub struct Options {
    pub sender: EmailSenderKind,
    pub templates: TemplateSelector,
}

impl Options {
    /// Parse notification arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the default template or subject key is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let get_non_empty = |id: &str, default: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };

        let default = EmailTemplate {
            name: get_non_empty(ARG_EMAIL_TEMPLATE, DEFAULT_TEMPLATE),
            subject_key: get_non_empty(ARG_EMAIL_SUBJECT_KEY, DEFAULT_SUBJECT_KEY),
        };
        if default.name.is_empty() || default.subject_key.is_empty() {
            anyhow::bail!(
                "--{ARG_EMAIL_TEMPLATE} and --{ARG_EMAIL_SUBJECT_KEY} must not be empty"
            );
        }

        let templates = matches
            .get_many::<RealmTemplate>(ARG_REALM_TEMPLATE)
            .into_iter()
            .flatten()
            .cloned()
            .fold(TemplateSelector::new(default), TemplateSelector::with_realm);

        Ok(Self {
            sender: matches
                .get_one::<EmailSenderKind>(ARG_EMAIL_SENDER)
                .copied()
                .unwrap_or_default(),
            templates,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_SENDER)
                .long(ARG_EMAIL_SENDER)
                .help("How notifications are delivered: outbox (email_outbox table) or log")
                .env("DEVICETRUST_EMAIL_SENDER")
                .default_value("outbox")
                .value_parser(|value: &str| value.parse::<EmailSenderKind>()),
        )
        .arg(
            Arg::new(ARG_EMAIL_TEMPLATE)
                .long(ARG_EMAIL_TEMPLATE)
                .help("Default notification template")
                .env("DEVICETRUST_EMAIL_TEMPLATE")
                .default_value(DEFAULT_TEMPLATE),
        )
        .arg(
            Arg::new(ARG_EMAIL_SUBJECT_KEY)
                .long(ARG_EMAIL_SUBJECT_KEY)
                .help("Default notification subject key")
                .env("DEVICETRUST_EMAIL_SUBJECT_KEY")
                .default_value(DEFAULT_SUBJECT_KEY),
        )
        .arg(
            Arg::new(ARG_REALM_TEMPLATE)
                .long(ARG_REALM_TEMPLATE)
                .help("Per-realm template override as realm=template:subject (repeatable)")
                .env("DEVICETRUST_REALM_TEMPLATES")
                .value_delimiter(',')
                .action(ArgAction::Append)
                .value_parser(|value: &str| value.parse::<RealmTemplate>()),
        )
}
