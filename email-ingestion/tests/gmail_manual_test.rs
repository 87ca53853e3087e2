use std::env;
use anyhow::Result;
use email_ingestion::email_ingester::{EmailIngester, EmailIngesterConfig};

/// Manual Gmail integration test - IGNORED BY DEFAULT
///
/// Pulls the Google Alert emails of the last few days from a real Gmail
/// account over IMAP and prints what was extracted from them.
///
/// ## Setup Instructions:
///
/// 1. Enable IMAP in Gmail (Settings → Forwarding and POP/IMAP).
/// 2. Create an app password (Google Account → Security → App passwords).
/// 3. Set environment variables:
///    ```bash
///    export GMAIL_EMAIL="your-email@gmail.com"
///    export GMAIL_PASSWORD="your-app-password"
///    ```
/// 4. Run the test:
///    ```bash
///    cargo test -p email-ingestion gmail_manual_integration_test -- --ignored --nocapture
///    ```
///
/// The test is read-only: messages are fetched with RFC822, never flagged or deleted.
#[tokio::test]
#[ignore = "Manual test - requires Gmail credentials"]
async fn gmail_manual_integration_test() -> Result<()> {
    let email = env::var("GMAIL_EMAIL")
        .map_err(|_| anyhow::anyhow!("GMAIL_EMAIL environment variable not set"))?;
    let password = env::var("GMAIL_PASSWORD")
        .map_err(|_| anyhow::anyhow!("GMAIL_PASSWORD environment variable not set"))?;

    let uri = format!("email://{}@imap.gmail.com:993/INBOX?tls=true", email.replace('@', "%40"));
    let config = EmailIngesterConfig::from_uri(&uri, &password)?;
    assert_eq!(config.username, email);

    let ingester = EmailIngester::with_config(config);
    let alerts = ingester.fetch_alerts(3).await?;
    println!("Fetched {} alert emails", alerts.len());

    for alert in alerts.iter().take(5) {
        println!("\n--- {} ({}) ---", alert.subject, alert.date);
        for article in alert.articles.iter().take(3) {
            println!("  {} | {}", article.title, article.url);
            assert!(!article.url.contains("google.com/url"), "redirect links should be unwrapped");
        }
    }

    Ok(())
}
