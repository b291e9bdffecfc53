use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::Context as _;
use chrono::NaiveDate;
use regex::Regex;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cli::ValidateArgs;
use crate::extract::{
    DEFAULT_AGENDA_SLOT_SELECTOR, ExtractionStrategy, InvalidSelector, SlotExtractor,
    compile_selector, default_selector_strategies,
};

pub const PROVIDER_ID_PLACEHOLDER: &str = "{provider_id}";
pub const DEFAULT_PAGE_URL_TEMPLATE: &str =
    "https://www.rededorsaoluiz.com.br/paciente/marcar-consulta/?medicom={provider_id}";
pub const DEFAULT_BOOKING_URL: &str = "https://www.rededorsaoluiz.com.br/paciente/marcar-consulta";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("valid email regex")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config file {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("`{field}` is not a valid email address: {value:?}")]
    InvalidEmail { field: &'static str, value: String },
    #[error("`{field}` is not a YYYY-MM-DD date: {value:?}")]
    InvalidDate { field: &'static str, value: String },
    #[error("`provider.id` may only contain letters, digits, '-' and '_': {0:?}")]
    InvalidProviderId(String),
    #[error("`page_url_template` must contain {{provider_id}}")]
    MissingPlaceholder,
    #[error("`{field}` is not a valid http(s) url: {value:?}")]
    InvalidUrl { field: &'static str, value: String },
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("invalid extraction selector")]
    Selector(#[from] InvalidSelector),
}

/// The configuration file as written, before validation.
///
/// Sender credentials never come from the file; they are filled in from the
/// environment with [`RawMonitorConfig::with_sender`].
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMonitorConfig {
    #[serde(default)]
    pub provider: RawProvider,
    pub reference_date: Option<String>,
    pub destination_email: Option<String>,
    pub page_url_template: Option<String>,
    pub booking_url: Option<String>,
    #[serde(default)]
    pub smtp: SmtpSettings,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub steps: Vec<InteractionStep>,
    #[serde(default)]
    pub extraction: ExtractionSettings,

    #[serde(skip)]
    pub sender_email: Option<String>,
    #[serde(skip)]
    pub sender_credential: Option<SecretString>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProvider {
    pub id: Option<String>,
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub facility: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmtpSettings {
    pub host: String,
    /// 465 means implicit TLS; anything else uses STARTTLS.
    pub port: u16,
    pub timeout_secs: u64,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_owned(),
            port: 587,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserSettings {
    pub webdriver_url: String,
    pub navigation_timeout_secs: u64,
    pub widget_timeout_secs: u64,
    /// Bounds the failure snapshot and the session close.
    pub capture_timeout_secs: u64,
    pub poll_ms: u64,
    pub settle_ms: u64,
    pub step_settle_ms: u64,
    /// An iframe whose URL contains one of these becomes the extraction context.
    pub frame_keywords: Vec<String>,
    /// Elements showing that the availability widget has rendered.
    pub widget_selectors: Vec<String>,
    pub user_agent: String,
    pub window_width: u32,
    pub window_height: u32,
    pub locale: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_owned(),
            navigation_timeout_secs: 30,
            widget_timeout_secs: 30,
            capture_timeout_secs: 15,
            poll_ms: 500,
            settle_ms: 3000,
            step_settle_ms: 1000,
            frame_keywords: [
                "agenda",
                "agendamento",
                "schedule",
                "scheduling",
                "booking",
                "consulta",
                "horario",
                "calendar",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            widget_selectors: [
                r#"[class*="agenda"]"#,
                r#"[class*="calendar"]"#,
                r#"[class*="calendario"]"#,
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36"
                .to_owned(),
            window_width: 1280,
            window_height: 900,
            locale: "pt-BR".to_owned(),
        }
    }
}

/// A page interaction performed before extraction, e.g. walking through a
/// booking wizard. Steps are best-effort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InteractionStep {
    Click { selector: String },
    /// Clicks the first element whose visible text equals `text`.
    ClickText { text: String },
    Fill { selector: String, text: String },
    Wait { ms: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionSettings {
    /// `None` uses the default agenda selector; an empty string disables the agenda strategy.
    pub agenda_slot_selector: Option<String>,
    /// Replaces the built-in selector list when set.
    pub selectors: Option<Vec<String>>,
}

impl ExtractionSettings {
    pub fn strategies(&self) -> Vec<ExtractionStrategy> {
        let agenda = self
            .agenda_slot_selector
            .clone()
            .unwrap_or_else(|| DEFAULT_AGENDA_SLOT_SELECTOR.to_owned());

        let mut strategies = Vec::new();
        if !agenda.trim().is_empty() {
            strategies.push(ExtractionStrategy::CalendarAgenda {
                slot_selector: agenda,
            });
        }
        match &self.selectors {
            Some(selectors) => strategies.extend(
                selectors
                    .iter()
                    .map(|css| ExtractionStrategy::Selector(css.clone())),
            ),
            None => strategies.extend(default_selector_strategies()),
        }
        strategies
    }
}

/// Validated configuration, read-only for the rest of the run.
#[derive(Debug)]
pub struct MonitorConfig {
    pub provider_id: String,
    pub provider_name: String,
    pub specialty: Option<String>,
    pub facility: Option<String>,
    pub reference_date: NaiveDate,
    pub destination_email: String,
    pub sender_email: String,
    pub sender_credential: SecretString,
    pub page_url: Url,
    pub booking_url: Url,
    pub smtp: SmtpSettings,
    pub browser: BrowserSettings,
    pub steps: Vec<InteractionStep>,
    pub strategies: Vec<ExtractionStrategy>,
}

impl RawMonitorConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_sender(mut self, email: Option<String>, credential: Option<String>) -> Self {
        if email.is_some() {
            self.sender_email = email;
        }
        if let Some(credential) = credential {
            self.sender_credential = Some(SecretString::from(credential));
        }
        self
    }
}

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates `raw`, failing on the first missing or malformed setting.
    pub fn validate(raw: &RawMonitorConfig) -> Result<MonitorConfig, ConfigError> {
        let provider_id = required(raw.provider.id.as_deref(), "provider.id")?;
        if !provider_id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(ConfigError::InvalidProviderId(provider_id.to_owned()));
        }

        let provider_name = required(raw.provider.name.as_deref(), "provider.name")?;

        let reference_date_raw = required(raw.reference_date.as_deref(), "reference_date")?;
        let reference_date = NaiveDate::parse_from_str(reference_date_raw, "%Y-%m-%d")
            .map_err(|_| ConfigError::InvalidDate {
                field: "reference_date",
                value: reference_date_raw.to_owned(),
            })?;

        let destination_email = email(raw.destination_email.as_deref(), "destination_email")?;
        let sender_email = email(raw.sender_email.as_deref(), "sender_email")?;

        let sender_credential = match &raw.sender_credential {
            Some(secret) if !secret.expose_secret().trim().is_empty() => {
                SecretString::from(secret.expose_secret().to_owned())
            }
            _ => return Err(ConfigError::Missing("sender_credential")),
        };

        let template = raw
            .page_url_template
            .as_deref()
            .unwrap_or(DEFAULT_PAGE_URL_TEMPLATE);
        if !template.contains(PROVIDER_ID_PLACEHOLDER) {
            return Err(ConfigError::MissingPlaceholder);
        }
        let page_url = http_url(
            &template.replace(PROVIDER_ID_PLACEHOLDER, provider_id),
            "page_url_template",
        )?;
        let booking_url = http_url(
            raw.booking_url.as_deref().unwrap_or(DEFAULT_BOOKING_URL),
            "booking_url",
        )?;

        if raw.smtp.host.trim().is_empty() {
            return Err(ConfigError::Missing("smtp.host"));
        }
        if raw.smtp.port == 0 {
            return Err(ConfigError::Invalid {
                field: "smtp.port",
                reason: "must be non-zero".to_owned(),
            });
        }
        if raw.browser.webdriver_url.trim().is_empty() {
            return Err(ConfigError::Missing("browser.webdriver_url"));
        }
        if raw
            .browser
            .frame_keywords
            .iter()
            .any(|keyword| keyword.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "browser.frame_keywords",
                reason: "keywords must not be blank".to_owned(),
            });
        }
        for css in &raw.browser.widget_selectors {
            compile_selector(css)?;
        }

        let strategies = raw.extraction.strategies();
        if strategies.is_empty() {
            return Err(ConfigError::Invalid {
                field: "extraction",
                reason: "at least one extraction strategy is required".to_owned(),
            });
        }
        SlotExtractor::new(&strategies)?;

        Ok(MonitorConfig {
            provider_id: provider_id.to_owned(),
            provider_name: provider_name.to_owned(),
            specialty: optional(raw.provider.specialty.as_deref()),
            facility: optional(raw.provider.facility.as_deref()),
            reference_date,
            destination_email,
            sender_email,
            sender_credential,
            page_url,
            booking_url,
            smtp: raw.smtp.clone(),
            browser: raw.browser.clone(),
            steps: raw.steps.clone(),
            strategies,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, ConfigError> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(ConfigError::Missing(field))
}

fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

fn email(value: Option<&str>, field: &'static str) -> Result<String, ConfigError> {
    let value = required(value, field)?;
    if !EMAIL.is_match(value) {
        return Err(ConfigError::InvalidEmail {
            field,
            value: value.to_owned(),
        });
    }
    Ok(value.to_owned())
}

fn http_url(value: &str, field: &'static str) -> Result<Url, ConfigError> {
    let invalid = || ConfigError::InvalidUrl {
        field,
        value: value.to_owned(),
    };
    let url = Url::parse(value).map_err(|_| invalid())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(invalid());
    }
    Ok(url)
}

pub fn run(args: ValidateArgs) -> anyhow::Result<()> {
    let path = PathBuf::from(&args.config);
    let raw = RawMonitorConfig::load(&path)?
        .with_sender(args.sender.sender_email, args.sender.sender_password);
    let config = ConfigValidator::validate(&raw).context("validate config")?;

    tracing::info!(path = %path.display(), "config is valid");
    println!("provider: {} ({})", config.provider_name, config.provider_id);
    println!("page: {}", config.page_url);
    println!("reference date: {}", config.reference_date.format("%d/%m/%Y"));
    println!("notify: {}", config.destination_email);
    println!(
        "strategies: {}",
        config
            .strategies
            .iter()
            .map(ExtractionStrategy::label)
            .collect::<Vec<_>>()
            .join(" | ")
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> RawMonitorConfig {
        let raw: RawMonitorConfig = serde_yaml::from_str(
            r#"
provider:
  id: "725717342"
  name: Isadora Leda Braga
  specialty: Endocrinologia Geral
  facility: Hospital Villa Lobos
reference_date: "2026-03-11"
destination_email: paciente@example.com
"#,
        )
        .expect("parse test config");
        raw.with_sender(
            Some("alertas@example.com".to_owned()),
            Some("app-password".to_owned()),
        )
    }

    #[test]
    fn complete_config_validates_with_defaults() -> anyhow::Result<()> {
        let config = ConfigValidator::validate(&complete())?;

        assert_eq!(
            config.page_url.as_str(),
            "https://www.rededorsaoluiz.com.br/paciente/marcar-consulta/?medicom=725717342"
        );
        assert_eq!(config.reference_date, NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(config.smtp.port, 587);
        assert_eq!(config.specialty.as_deref(), Some("Endocrinologia Geral"));
        assert!(matches!(
            config.strategies.first(),
            Some(ExtractionStrategy::CalendarAgenda { .. })
        ));
        Ok(())
    }

    #[test]
    fn reports_first_missing_field() {
        let mut raw = complete();
        raw.provider.id = None;
        raw.destination_email = None;

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("provider.id")));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut raw = complete();
        raw.sender_credential = Some(SecretString::from("   ".to_owned()));

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("sender_credential")));
    }

    #[test]
    fn rejects_malformed_reference_date() {
        let mut raw = complete();
        raw.reference_date = Some("11/03/2026".to_owned());

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidDate {
                field: "reference_date",
                ..
            }
        ));
    }

    #[test]
    fn rejects_malformed_emails() {
        let mut raw = complete();
        raw.sender_email = Some("alertas-at-example".to_owned());

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidEmail {
                field: "sender_email",
                ..
            }
        ));
    }

    #[test]
    fn rejects_provider_id_with_url_characters() {
        let mut raw = complete();
        raw.provider.id = Some("123&x=1".to_owned());

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProviderId(_)));
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let mut raw = complete();
        raw.page_url_template = Some("https://example.com/agenda".to_owned());

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(err, ConfigError::MissingPlaceholder));
    }

    #[test]
    fn custom_selectors_replace_defaults() -> anyhow::Result<()> {
        let mut raw = complete();
        raw.extraction = ExtractionSettings {
            agenda_slot_selector: Some(String::new()),
            selectors: Some(vec![".vaga".to_owned()]),
        };

        let config = ConfigValidator::validate(&raw)?;
        assert_eq!(
            config.strategies,
            vec![ExtractionStrategy::Selector(".vaga".to_owned())]
        );
        Ok(())
    }

    #[test]
    fn malformed_widget_selector_is_a_config_error() {
        let mut raw = complete();
        raw.browser.widget_selectors = vec![r#"div[class*="#.to_owned()];

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Selector(InvalidSelector { ref selector, .. }) if selector == r#"div[class*="#
        ));
    }

    #[test]
    fn blank_frame_keyword_is_rejected() {
        let mut raw = complete();
        raw.browser.frame_keywords = vec!["agenda".to_owned(), " ".to_owned()];

        let err = ConfigValidator::validate(&raw).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "browser.frame_keywords",
                ..
            }
        ));
    }

    #[test]
    fn default_strategies_lead_with_the_agenda() -> anyhow::Result<()> {
        let config = ConfigValidator::validate(&complete())?;
        assert_eq!(config.strategies, crate::extract::default_strategies());
        Ok(())
    }

    #[test]
    fn steps_and_unknown_keys() {
        let raw: RawMonitorConfig = serde_yaml::from_str(
            r#"
steps:
  - action: click_text
    text: CONTINUE O AGENDAMENTO
  - action: fill
    selector: "input[placeholder='dd/mm/aaaa']"
    text: "06051995"
  - action: wait
    ms: 500
"#,
        )
        .expect("parse steps");
        assert_eq!(raw.steps.len(), 3);
        assert_eq!(raw.steps[2], InteractionStep::Wait { ms: 500 });

        let err = serde_yaml::from_str::<RawMonitorConfig>("sender_password: hunter2\n");
        assert!(err.is_err());
    }
}
