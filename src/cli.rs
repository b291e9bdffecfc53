use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape the booking page once and email any slot before the reference date.
    Check(CheckArgs),
    /// Load and validate the config without touching the network.
    Validate(ValidateArgs),
    /// Run extraction and filtering against a saved HTML snapshot.
    Extract(ExtractArgs),
}

#[derive(Args)]
pub struct SenderArgs {
    /// Address the notification is sent from (also the SMTP login).
    #[arg(long, env = "EMAIL_SENDER")]
    pub sender_email: Option<String>,

    /// SMTP password or app password for the sender account.
    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    pub sender_password: Option<String>,
}

impl std::fmt::Debug for SenderArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderArgs")
            .field("sender_email", &self.sender_email)
            .field(
                "sender_password",
                &self.sender_password.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Monitor config file (YAML).
    #[arg(long)]
    pub config: String,

    /// Directory for failure screenshots and HTML snapshots.
    #[arg(long, default_value = ".")]
    pub artifacts_dir: String,

    /// WebDriver endpoint; overrides `browser.webdriver_url` from the config.
    #[arg(long, env = "SLOTWATCH_WEBDRIVER_URL")]
    pub webdriver_url: Option<String>,

    #[command(flatten)]
    pub sender: SenderArgs,

    /// Print the notification instead of sending it.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Also save a screenshot and HTML snapshot when the scrape succeeds.
    #[arg(long, default_value_t = false)]
    pub debug_snapshot: bool,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Monitor config file (YAML).
    #[arg(long)]
    pub config: String,

    #[command(flatten)]
    pub sender: SenderArgs,
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Saved page source.
    #[arg(long)]
    pub html: String,

    /// Only print slots before this date (YYYY-MM-DD).
    #[arg(long)]
    pub reference_date: Option<String>,

    /// Date used to place dates without a year (YYYY-MM-DD; default: today).
    #[arg(long)]
    pub today: Option<String>,
}
