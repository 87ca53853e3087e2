use crate::types::{ArticleCandidate, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;
use tracing::info;

const TOP_ARTICLES: usize = 5;
const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopArticle {
    pub title: String,
    pub source: String,
    pub url: String,
    pub quality_score: f64,
    pub relevance_score: f64,
}

/// Summary of the articles accepted over a time window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterReport {
    pub days: u32,
    pub total_selected: usize,
    pub average_quality: f64,
    pub average_relevance: f64,
    /// Most frequent first, ties by name
    pub sources: Vec<(String, usize)>,
    pub categories: Vec<(String, usize)>,
    pub top_articles: Vec<TopArticle>,
}

impl FilterReport {
    /// Articles that were not accepted are ignored.
    pub fn build(articles: &[ArticleCandidate], days: u32) -> Self {
        let classified: Vec<_> = articles
            .iter()
            .filter_map(|article| article.classification.as_ref().map(|payload| (article, payload)))
            .filter(|(_, payload)| payload.is_selected)
            .collect();

        let total_selected = classified.len();
        let average_quality = mean(classified.iter().map(|(_, payload)| payload.quality_score));
        let average_relevance = mean(classified.iter().map(|(_, payload)| payload.relevance_score));

        let sources = distribution(classified.iter().map(|(article, _)| source_of(article)));
        let categories =
            distribution(classified.iter().map(|(_, payload)| payload.category.clone()));

        let mut ranked = classified.clone();
        ranked.sort_by(|(_, a), (_, b)| {
            let a = a.quality_score + a.relevance_score;
            let b = b.quality_score + b.relevance_score;
            b.total_cmp(&a)
        });

        let top_articles = ranked
            .into_iter()
            .take(TOP_ARTICLES)
            .map(|(article, payload)| TopArticle {
                title: article.title.clone(),
                source: source_of(article),
                url: article.url.clone(),
                quality_score: payload.quality_score,
                relevance_score: payload.relevance_score,
            })
            .collect();

        Self {
            days,
            total_selected,
            average_quality,
            average_relevance,
            sources,
            categories,
            top_articles,
        }
    }

    pub fn render(&self) -> String {
        if self.total_selected == 0 {
            return format!("No selected articles in the last {} days.\n", self.days);
        }

        let mut out = String::new();
        let _ = writeln!(out, "Filter report for the last {} days", self.days);
        let _ = writeln!(out, "{}", "=".repeat(50));
        let _ = writeln!(out);
        let _ = writeln!(out, "Overall:");
        let _ = writeln!(out, "- Selected articles: {}", self.total_selected);
        let _ = writeln!(out, "- Average quality: {:.1}/10", self.average_quality);
        let _ = writeln!(out, "- Average relevance: {:.1}/10", self.average_relevance);

        let _ = writeln!(out, "\nSources:");
        for (source, count) in &self.sources {
            let _ = writeln!(out, "- {}: {}", source, count);
        }

        if !self.categories.is_empty() {
            let _ = writeln!(out, "\nCategories:");
            for (category, count) in &self.categories {
                let _ = writeln!(out, "- {}: {}", category, count);
            }
        }

        let _ = writeln!(out, "\nRecommended reading (top {}):", TOP_ARTICLES);
        for (index, article) in self.top_articles.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", index + 1, article.title);
            let _ = writeln!(
                out,
                "   Source: {} | Quality: {:.1} | Relevance: {:.1}",
                article.source, article.quality_score, article.relevance_score
            );
            let _ = writeln!(out, "   Link: {}\n", article.url);
        }

        out
    }
}

/// Write the given articles to `path` as pretty-printed JSON.
pub async fn export_json(path: &Path, articles: &[ArticleCandidate]) -> Result<()> {
    let json = serde_json::to_string_pretty(articles)?;
    tokio::fs::write(path, json).await?;
    info!("Exported {} articles to {}", articles.len(), path.display());
    Ok(())
}

fn source_of(article: &ArticleCandidate) -> String {
    article
        .source
        .clone()
        .filter(|source| !source.is_empty())
        .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn distribution(labels: impl Iterator<Item = String>) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in labels {
        *counts.entry(label).or_default() += 1;
    }

    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|(a_name, a_count), (b_name, b_count)| {
        b_count.cmp(a_count).then_with(|| a_name.cmp(b_name))
    });
    counts
}
