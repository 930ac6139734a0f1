use chrono::NaiveDateTime;

use crate::error::{DomainResult, Violations};
use crate::schema::{ArticleInput, ArticleStatus};

const WORDS_PER_MINUTE: usize = 200;

/// Minutes needed to read `content`, never less than one.
pub fn reading_time(content: &str) -> i64 {
    let words = content.split_whitespace().count();
    words.div_ceil(WORDS_PER_MINUTE).max(1) as i64
}

pub fn validate_article(input: &ArticleInput) -> DomainResult<()> {
    let mut v = Violations::new();
    v.check(
        input.title.trim().chars().count() >= 3,
        "Title must be at least 3 characters",
    );
    v.check(!input.content.trim().is_empty(), "Content is required");
    v.check(
        input.status != ArticleStatus::Scheduled || input.scheduled_at.is_some(),
        "Scheduled articles need a publish time",
    );
    v.check(
        input
            .excerpt
            .as_deref()
            .is_none_or(|e| e.chars().count() <= 500),
        "Excerpt must be at most 500 characters",
    );
    v.into_result()
}

/// `published_at` is stamped the first time an article goes live. A
/// scheduled article carries its future go-live time there instead, which the
/// sweeper acts on.
pub fn published_at(
    status: ArticleStatus,
    scheduled_at: Option<NaiveDateTime>,
    previous: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let stamped = previous.filter(|at| *at <= now);
    match status {
        ArticleStatus::Scheduled => scheduled_at,
        ArticleStatus::Published => stamped.or(Some(now)),
        ArticleStatus::Draft | ArticleStatus::Archived => stamped,
    }
}
