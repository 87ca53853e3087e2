use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use interfaces::defs::NewArticle;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use url::Url;

const MIN_SUMMARY_CHARS: usize = 50;
const MAX_SUMMARY_CHARS: usize = 500;

/// A Google Alert notification email and the articles found in it.
#[derive(Debug, Clone)]
pub struct AlertEmail {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub date: DateTime<Utc>,
    pub body_html: Option<String>,
    pub body_text: Option<String>,
    pub articles: Vec<NewArticle>,
}

fn anchor_regex() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| {
        Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
            .expect("anchor pattern is valid")
    })
}

fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("tag pattern is valid"))
}

/// Parse a raw RFC822 message into an [`AlertEmail`].
///
/// `fallback_id` is used when the message carries no Message-ID header.
pub fn parse_alert_message(raw: &[u8], fallback_id: &str) -> Result<AlertEmail> {
    let parsed = mail_parser::MessageParser::default()
        .parse(raw)
        .ok_or_else(|| anyhow::anyhow!("Failed to parse email"))?;

    let message_id = parsed
        .message_id()
        .map(|id| id.to_string())
        .unwrap_or_else(|| fallback_id.to_string());

    let sender = parsed
        .from()
        .and_then(|addrs| addrs.first())
        .and_then(|addr| addr.address.as_ref())
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let subject = parsed.subject().unwrap_or("(No Subject)").to_string();

    let date = parsed
        .date()
        .and_then(|date| Utc.timestamp_opt(date.to_timestamp(), 0).single())
        .unwrap_or_else(Utc::now);

    let body_html = parsed.body_html(0).map(|body| body.into_owned());
    let body_text = parsed.body_text(0).map(|body| body.into_owned());

    let articles = match &body_html {
        Some(html) => extract_articles(html, &message_id, &subject, date),
        None => Vec::new(),
    };

    Ok(AlertEmail {
        message_id,
        subject,
        sender,
        date,
        body_html,
        body_text,
        articles,
    })
}

/// Pull every Google-redirected news link out of an alert's HTML body.
pub fn extract_articles(
    html: &str,
    message_id: &str,
    subject: &str,
    date: DateTime<Utc>,
) -> Vec<NewArticle> {
    let anchors: Vec<_> = anchor_regex().captures_iter(html).collect();
    let mut seen = HashSet::new();
    let mut articles = Vec::new();

    for (index, captures) in anchors.iter().enumerate() {
        let (Some(whole), Some(href), Some(inner)) =
            (captures.get(0), captures.get(1), captures.get(2))
        else {
            continue;
        };

        let Some(url) = unwrap_alert_link(&decode_entities(href.as_str())) else {
            continue;
        };

        let title = clean_text(inner.as_str());
        if title.is_empty() || !seen.insert(url.clone()) {
            continue;
        }

        let next_start = anchors
            .get(index + 1)
            .and_then(|next| next.get(0))
            .map(|next| next.start())
            .unwrap_or(html.len());
        let trailing = clean_text(&html[whole.end()..next_start]);
        let summary_len = trailing.chars().count();
        let summary = (MIN_SUMMARY_CHARS..=MAX_SUMMARY_CHARS)
            .contains(&summary_len)
            .then_some(trailing);

        articles.push(NewArticle {
            email_message_id: message_id.to_string(),
            title,
            source: source_label(&url),
            url,
            publish_time: None,
            summary,
            alert_subject: Some(subject.to_string()),
            alert_date: Some(date),
        });
    }

    articles
}

/// Resolve a Google Alert link to the article it points at.
///
/// Returns `None` for links that are not news links (footer, settings, ...).
pub fn unwrap_alert_link(href: &str) -> Option<String> {
    let parsed = Url::parse(href).ok()?;
    let host = parsed.host_str()?;

    if host == "news.google.com" {
        return Some(href.to_string());
    }

    if host.contains("google.") && parsed.path() == "/url" {
        return parsed
            .query_pairs()
            .find(|(key, _)| key == "url" || key == "q")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty());
    }

    None
}

fn source_label(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .host_str()
                .map(|host| host.trim_start_matches("www.").to_string())
        })
}

fn clean_text(fragment: &str) -> String {
    let stripped = tag_regex().replace_all(fragment, " ");
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}
