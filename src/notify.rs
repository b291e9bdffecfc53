use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport as _, Message, Tokio1Executor};
use secrecy::ExposeSecret as _;
use serde::Serialize;
use thiserror::Error;

use crate::config::MonitorConfig;
use crate::extract::ENCAIXE_MARKER;
use crate::formats::AppointmentSlot;

const NOTIFICATION_TEMPLATE: &str = include_str!("templates/notification.html");

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("nothing to notify about")]
    NoSlots,
    #[error("invalid email address {address:?}")]
    Address {
        address: String,
        #[source]
        source: lettre::address::AddressError,
    },
    #[error("render notification body")]
    Template(#[from] tera::Error),
    #[error("build email message")]
    Message(#[from] lettre::error::Error),
    #[error("send email via {host}:{port}")]
    Smtp {
        host: String,
        port: u16,
        #[source]
        source: lettre::transport::smtp::Error,
    },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        config: &MonitorConfig,
        slots: &[AppointmentSlot],
    ) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

#[derive(Serialize)]
struct SlotView {
    date: String,
    time: String,
    encaixe: bool,
}

pub fn render_email(
    config: &MonitorConfig,
    slots: &[AppointmentSlot],
) -> Result<RenderedEmail, NotificationError> {
    if slots.is_empty() {
        return Err(NotificationError::NoSlots);
    }

    let views = slots
        .iter()
        .map(|slot| SlotView {
            date: slot.date_label(),
            time: slot.time_label(),
            encaixe: slot.raw_text.contains(ENCAIXE_MARKER)
                || slot.raw_text.contains("(Encaixe)"),
        })
        .collect::<Vec<_>>();

    let mut context = tera::Context::new();
    context.insert("provider_name", &config.provider_name);
    context.insert("specialty", &config.specialty);
    context.insert("facility", &config.facility);
    context.insert(
        "reference_date",
        &config.reference_date.format("%d/%m/%Y").to_string(),
    );
    context.insert("booking_url", config.booking_url.as_str());
    context.insert("slots", &views);

    let html = tera::Tera::one_off(NOTIFICATION_TEMPLATE, &context, true)?;
    Ok(RenderedEmail {
        subject: format!("Nova disponibilidade - {}", config.provider_name),
        html,
    })
}

/// Sends the notification through an authenticated SMTP relay.
#[derive(Debug, Clone, Default)]
pub struct SmtpNotifier;

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(
        &self,
        config: &MonitorConfig,
        slots: &[AppointmentSlot],
    ) -> Result<(), NotificationError> {
        let email = render_email(config, slots)?;
        let message = Message::builder()
            .from(mailbox(&config.sender_email)?)
            .to(mailbox(&config.destination_email)?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)?;

        let smtp = &config.smtp;
        let smtp_error = |source: lettre::transport::smtp::Error| NotificationError::Smtp {
            host: smtp.host.clone(),
            port: smtp.port,
            source,
        };

        // 465 is implicit TLS; every other port upgrades with STARTTLS.
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)
        }
        .map_err(smtp_error)?;

        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(
                config.sender_email.clone(),
                config.sender_credential.expose_secret().to_owned(),
            ))
            .timeout(Some(Duration::from_secs(smtp.timeout_secs)))
            .build();

        tracing::info!(host = %smtp.host, port = smtp.port, "connecting to smtp server");
        transport.send(message).await.map_err(smtp_error)?;
        tracing::info!(to = %config.destination_email, slots = slots.len(), "notification sent");
        Ok(())
    }
}

/// Prints the email to stdout instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct DryRunNotifier;

#[async_trait]
impl Notifier for DryRunNotifier {
    async fn notify(
        &self,
        config: &MonitorConfig,
        slots: &[AppointmentSlot],
    ) -> Result<(), NotificationError> {
        let email = render_email(config, slots)?;
        tracing::info!(to = %config.destination_email, "dry run; not sending email");
        println!("To: {}", config.destination_email);
        println!("Subject: {}", email.subject);
        println!();
        println!("{}", email.html);
        Ok(())
    }
}

fn mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address.parse().map_err(|source| NotificationError::Address {
        address: address.to_owned(),
        source,
    })
}
