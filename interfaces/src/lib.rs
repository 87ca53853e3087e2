pub mod defs;

pub use defs::{
    ArticleCandidate, ClassificationPayload, ClassificationResult, ClassificationState,
    LiveSourceSpec, NewArticle,
};
