use crate::types::ArticleCandidate;
use std::fmt::Write;

pub const SYSTEM_MESSAGE: &str = "You are a news editor for automotive manufacturing engineers. \
You judge news articles strictly and always answer with valid JSON only.";

pub const CATEGORIES: [&str; 5] = [
    "factory construction",
    "AI manufacturing",
    "advanced manufacturing",
    "supply chain technology",
    "other",
];

pub const AUDIENCE_POLICY: &str = "\
Audience: engineers working in automotive manufacturing (body, paint, assembly, powertrain and \
battery plants, manufacturing engineering and plant planning).

Review each article below and decide whether it is worth their time.

Include with high priority:
- New plants, plant expansions and production line construction or retooling by \
automakers and suppliers
- Applications of AI, machine vision, robotics or digital twins on the factory floor
- Advanced manufacturing processes: gigacasting, battery cell and pack production, \
new joining or coating methods
- Manufacturing-related supply chain technology such as logistics automation or traceability

Include with lower priority:
- Industry trends with a clear technical angle on production
- Capacity, localization or investment decisions that change how or where vehicles are built

Exclude:
- Pure financial results, stock movements and executive personnel changes
- Marketing, vehicle launches and reviews with no manufacturing content
- Policy or politics without concrete impact on production
- Duplicate or low-information articles";

const URL_DISPLAY_LIMIT: usize = 100;
const NO_SUMMARY: &str = "No summary";
const UNKNOWN_PUBLISH_TIME: &str = "Unknown";
const UNKNOWN_SOURCE: &str = "Unknown source";

/// Renders one classification prompt per batch of candidates
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    policy: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self {
            policy: AUDIENCE_POLICY.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }

    pub fn build(&self, articles: &[ArticleCandidate]) -> String {
        let count = articles.len();
        let mut prompt = String::new();

        prompt.push_str(&self.policy);
        let _ = write!(prompt, "\n\nArticles to review ({} total):\n", count);

        for (index, article) in articles.iter().enumerate() {
            let _ = write!(
                prompt,
                "\n[Article {}]\nTitle: {}\nSource: {}\nSummary: {}\nPublished: {}\nURL: {}\n",
                index + 1,
                article.title.trim(),
                non_empty(article.source.as_deref()).unwrap_or(UNKNOWN_SOURCE),
                non_empty(article.summary.as_deref()).unwrap_or(NO_SUMMARY),
                non_empty(article.publish_time.as_deref()).unwrap_or(UNKNOWN_PUBLISH_TIME),
                truncate_url(&article.url),
            );
        }

        let categories = CATEGORIES
            .iter()
            .map(|category| format!("\"{}\"", category))
            .collect::<Vec<_>>()
            .join(", ");

        let _ = write!(
            prompt,
            "\nReply with a JSON array of exactly {count} objects, one per article, \
             in the same order as listed above.\n\
             Each object must have these keys:\n\
             - \"is_selected\": true or false\n\
             - \"quality_score\": number from 1 to 10 (depth and value of the content)\n\
             - \"relevance_score\": number from 1 to 10 \
             (relevance to automotive manufacturing engineers)\n\
             - \"reason\": string explaining the decision\n\
             - \"key_points\": array of strings with the key technical or manufacturing points\n\
             - \"category\": one of {categories}\n\
             Return only the JSON array, with no text before or after it.\n"
        );

        prompt
    }
}

/// URLs longer than the display limit are cut and marked with "..."
pub fn truncate_url(url: &str) -> String {
    if url.chars().count() > URL_DISPLAY_LIMIT {
        let cut: String = url.chars().take(URL_DISPLAY_LIMIT).collect();
        format!("{}...", cut)
    } else {
        url.to_string()
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
