use crate::error::Error;
use crate::notify::Channel;
use crate::settings::{ChannelKind, SmtpSettings};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// Port on which SMTP servers expect TLS from the first byte instead of STARTTLS.
const IMPLICIT_TLS_PORT: u16 = 465;

/// Sends plain-text e-mail to one or more recipients.
pub struct SmtpChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpChannel {
    /// # Errors
    ///
    /// Returns [`Error::Notification`] if the host, sender or recipients are missing or
    /// malformed.
    pub fn new(settings: &SmtpSettings) -> Result<Self, Error> {
        if settings.host.trim().is_empty()
            || settings.from_email.trim().is_empty()
            || settings.to_email.trim().is_empty()
        {
            return Err(Error::Notification(
                "SMTP config missing host, from_email or to_email".into(),
            ));
        }

        let from = parse_mailbox(&settings.from_email)?;
        let to = settings
            .to_email
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(parse_mailbox)
            .collect::<Result<Vec<_>, _>>()?;

        let host = settings.host.trim();
        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|err| Error::Notification(format!("SMTP relay {host}: {err}")))?
        .port(settings.port);

        let builder = match (settings.user.as_deref(), settings.pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                builder.credentials(Credentials::new(user.to_string(), pass.to_string()))
            }
            _ => builder,
        };

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn message(&self, subject: &str, body: &str) -> Result<Message, Error> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(body.to_string())
            .map_err(|err| Error::Notification(err.to_string()))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, Error> {
    address
        .trim()
        .parse()
        .map_err(|err| Error::Notification(format!("invalid e-mail address \"{address}\": {err}")))
}

#[async_trait::async_trait]
impl Channel for SmtpChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Smtp
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), Error> {
        let message = self.message(subject, body)?;
        self.transport
            .send(message)
            .await
            .map_err(|err| Error::Notification(format!("SMTP: {err}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            enabled: true,
            host: "smtp.example.com".into(),
            port: 587,
            from_email: "domains@example.com".into(),
            to_email: "ops@example.com, oncall@example.com,".into(),
            user: Some("mailer".into()),
            pass: Some("hunter2".into()),
        }
    }

    #[test]
    fn recipients_are_comma_separated() {
        let channel = SmtpChannel::new(&settings()).unwrap();
        let recipients: Vec<String> = channel.to.iter().map(ToString::to_string).collect();
        assert_eq!(recipients, vec!["ops@example.com", "oncall@example.com"]);

        let formatted = String::from_utf8(
            channel
                .message("DDNS IP Updated for example.com", "hello")
                .unwrap()
                .formatted(),
        )
        .unwrap();
        assert!(formatted.contains("Subject: DDNS IP Updated for example.com"));
        assert!(formatted.contains("oncall@example.com"));
    }

    #[test]
    fn incomplete_settings_are_rejected() {
        let mut missing_host = settings();
        missing_host.host = " ".into();
        assert!(matches!(
            SmtpChannel::new(&missing_host),
            Err(Error::Notification(_))
        ));

        let mut bad_recipient = settings();
        bad_recipient.to_email = "not an address".into();
        assert!(SmtpChannel::new(&bad_recipient).is_err());

        let mut implicit_tls = settings();
        implicit_tls.port = 465;
        implicit_tls.user = None;
        assert!(SmtpChannel::new(&implicit_tls).is_ok());
    }
}
