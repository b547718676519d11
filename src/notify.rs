//! Operator notifications by mail (AWS SES) and webhook.

use std::process::Command;

use derive_more::{Display, Error};
use serde::Serialize;

use crate::config::{MailConfig, WebhookConfig};
use crate::util::{CommandError, Runner};

#[derive(Debug, Display, Error)]
/// Errors on delivering a notification.
pub enum NotifyError {
    /// Building the SES payload failed.
    #[display("Building the mail payload failed: {_0}")]
    Payload(serde_json::Error),
    /// `aws ses send-email` failed.
    #[display("Sending the notification mail failed: {_0}")]
    Mail(CommandError),
    /// The webhook request failed.
    #[display("Calling the webhook failed: {_0}")]
    Webhook(CommandError),
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Destination<'a> {
    to_addresses: [&'a str; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Content<'a> {
    data: &'a str,
    charset: &'static str,
}

impl<'a> Content<'a> {
    fn utf8(data: &'a str) -> Self {
        Self {
            data,
            charset: "UTF-8",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Body<'a> {
    text: Content<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct Message<'a> {
    subject: Content<'a>,
    body: Body<'a>,
}

/// Sends notifications over the configured channels.
///
/// A channel that isn't configured is skipped silently.
pub struct Notifier<'a> {
    mail: Option<&'a MailConfig>,
    webhook: Option<&'a WebhookConfig>,
    runner: &'a dyn Runner,
}

impl<'a> Notifier<'a> {
    pub fn new(
        mail: Option<&'a MailConfig>,
        webhook: Option<&'a WebhookConfig>,
        runner: &'a dyn Runner,
    ) -> Self {
        Self {
            mail,
            webhook,
            runner,
        }
    }

    /// Returns if at least one channel is configured.
    pub fn is_enabled(&self) -> bool {
        self.mail.is_some() || self.webhook.is_some()
    }

    /// Sends the mail, then calls the webhook.
    ///
    /// Stops at the first failing channel.
    pub fn notify(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        if let Some(mail) = self.mail {
            log::info!(target: "notify", "Sending mail to {}", mail.to);
            self.send_mail(mail, subject, body)?;
        }

        if let Some(webhook) = self.webhook {
            log::info!(target: "notify", "Making HTTP {} request to webhook: {}", webhook.method, webhook.url);
            self.call_webhook(webhook)?;
        }

        Ok(())
    }

    fn send_mail(&self, mail: &MailConfig, subject: &str, body: &str) -> Result<(), NotifyError> {
        let destination = serde_json::to_string(&Destination {
            to_addresses: [mail.to.as_str()],
        })
        .map_err(NotifyError::Payload)?;
        let message = serde_json::to_string(&Message {
            subject: Content::utf8(subject),
            body: Body {
                text: Content::utf8(body),
            },
        })
        .map_err(NotifyError::Payload)?;

        let mut command = Command::new("aws");
        command
            .arg("--region")
            .arg(&mail.region)
            .arg("ses")
            .arg("send-email")
            .arg("--from")
            .arg(&mail.from)
            .arg("--destination")
            .arg(destination)
            .arg("--message")
            .arg(message);
        self.runner.run(&mut command).map_err(NotifyError::Mail)?;

        Ok(())
    }

    fn call_webhook(&self, webhook: &WebhookConfig) -> Result<(), NotifyError> {
        let mut command = Command::new("curl");
        command
            .arg("--silent")
            .arg("--show-error")
            .arg("--fail")
            .arg("-X")
            .arg(&webhook.method)
            .arg("--url")
            .arg(&webhook.url);
        self.runner.run(&mut command).map_err(NotifyError::Webhook)?;

        Ok(())
    }
}
