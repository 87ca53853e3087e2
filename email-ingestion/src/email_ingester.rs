use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use interfaces::defs::LiveSourceSpec;
use tracing::{debug, info, warn};
use url::Url;

use crate::alert_parser::{parse_alert_message, AlertEmail};

pub const GOOGLE_ALERT_SENDER: &str = "googlealerts-noreply@google.com";

#[derive(Clone, Debug)]
pub struct EmailIngesterConfig {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub mailbox: String,
    pub use_tls: bool,
    pub accept_invalid_certs: bool,
    pub accept_invalid_hostnames: bool,
    pub sender: String,
    pub max_messages: usize,
}

impl EmailIngesterConfig {
    /// Parse mailbox configuration from a URI plus the account password.
    /// Expected URI format: email://username@server:port/mailbox?tls=true
    pub fn from_uri(uri: &str, password: &str) -> Result<Self> {
        let parsed_uri = Url::parse(uri)
            .map_err(|e| anyhow::anyhow!("Invalid email URI '{}': {}", uri, e))?;

        if parsed_uri.scheme() != "email" {
            return Err(anyhow::anyhow!(
                "URI must use 'email://' scheme, got: {}",
                parsed_uri.scheme()
            ));
        }

        let server = parsed_uri.host_str()
            .ok_or_else(|| anyhow::anyhow!("No server specified in URI: {}", uri))?
            .to_string();

        let port = parsed_uri.port().unwrap_or(993); // IMAPS

        let username = match parsed_uri.username() {
            "" => return Err(anyhow::anyhow!("No username in URI: {}", uri)),
            user => user.replace("%40", "@"),
        };

        let mailbox = {
            let path = parsed_uri.path().trim_start_matches('/');
            if path.is_empty() {
                "INBOX".to_string()
            } else {
                path.to_string()
            }
        };

        let flag = |name: &str, default: bool| {
            parsed_uri.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.parse().unwrap_or(default))
                .unwrap_or(default)
        };

        // Only meant for local test servers
        let accept_invalid_certs = flag("accept_invalid_certs", false);
        let accept_invalid_hostnames = flag("accept_invalid_hostnames", false);

        Ok(Self {
            server,
            port,
            username,
            password: password.to_string(),
            mailbox,
            use_tls: flag("tls", true),
            accept_invalid_certs,
            accept_invalid_hostnames,
            sender: GOOGLE_ALERT_SENDER.to_string(),
            max_messages: 100,
        })
    }

    pub fn with_sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }
}

pub struct EmailIngester {
    config: EmailIngesterConfig,
}

impl EmailIngester {
    pub fn with_config(config: EmailIngesterConfig) -> Self {
        Self { config }
    }

    /// The source this ingester reads from, with the password left out
    pub fn source(&self) -> LiveSourceSpec {
        LiveSourceSpec {
            uri: format!(
                "email://{}@{}:{}/{}",
                self.config.username, self.config.server, self.config.port, self.config.mailbox
            ),
        }
    }

    /// Fetch the Google Alert emails received during the last `days` days.
    pub async fn fetch_alerts(&self, days: u32) -> Result<Vec<AlertEmail>> {
        self.fetch_alerts_since(Utc::now() - Duration::days(i64::from(days))).await
    }

    /// Fetch the Google Alert emails received on or after the day of `since`.
    pub async fn fetch_alerts_since(&self, since: DateTime<Utc>) -> Result<Vec<AlertEmail>> {
        let config = self.config.clone();

        info!(
            "Fetching alerts from {} since {}",
            self.source().uri,
            since.format("%Y-%m-%d")
        );

        let raw_messages = tokio::task::spawn_blocking(move || fetch_raw_messages(&config, since))
            .await
            .map_err(|e| anyhow::anyhow!("IMAP task panicked: {}", e))??;

        let mut alerts = Vec::new();
        for (fallback_id, body) in raw_messages {
            match parse_alert_message(&body, &fallback_id) {
                Ok(alert) => {
                    debug!(
                        "Parsed alert '{}' with {} articles",
                        alert.subject,
                        alert.articles.len()
                    );
                    alerts.push(alert);
                }
                Err(e) => warn!("Skipping message {}: {}", fallback_id, e),
            }
        }

        info!("Parsed {} alert emails", alerts.len());
        Ok(alerts)
    }
}

/// IMAP SEARCH wants dates as dd-Mon-yyyy
pub fn search_criteria(sender: &str, since: DateTime<Utc>) -> String {
    format!("FROM \"{}\" SINCE {}", sender, since.format("%d-%b-%Y"))
}

fn fetch_raw_messages(
    config: &EmailIngesterConfig,
    since: DateTime<Utc>,
) -> Result<Vec<(String, Vec<u8>)>> {
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .danger_accept_invalid_hostnames(config.accept_invalid_hostnames)
        .build()?;

    let client = if config.use_tls {
        imap::connect((config.server.as_str(), config.port), &config.server, &tls)?
    } else {
        imap::connect_starttls((config.server.as_str(), config.port), &config.server, &tls)?
    };

    let mut imap_session = client.login(&config.username, &config.password)
        .map_err(|(e, _)| anyhow::anyhow!("Login failed: {:?}", e))?;
    imap_session.select(&config.mailbox)?;

    let message_ids = imap_session.search(search_criteria(&config.sender, since))?;

    // Most recent messages have the highest sequence numbers
    let mut ids: Vec<u32> = message_ids.into_iter().collect();
    ids.sort_unstable();
    if ids.len() > config.max_messages {
        ids = ids.split_off(ids.len() - config.max_messages);
    }

    let mut raw_messages = Vec::new();
    if !ids.is_empty() {
        let sequence_set = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(",");
        let messages = imap_session.fetch(sequence_set, "(UID RFC822)")?;

        for message in messages.iter() {
            if let Some(body) = message.body() {
                let fallback_id = format!("imap_{}_{}", message.uid.unwrap_or(0), message.message);
                raw_messages.push((fallback_id, body.to_vec()));
            }
        }
    }

    imap_session.logout()?;
    Ok(raw_messages)
}
