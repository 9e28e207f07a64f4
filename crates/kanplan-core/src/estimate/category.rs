//! Category keys used to index learned statistics.

use crate::task::Task;

/// Category used when nothing else matches.
pub const GENERAL_CATEGORY: &str = "general";

/// Title keyword vocabulary, checked in order.
const VOCABULARY: &[(&str, &[&str])] = &[
    ("writing", &["write", "draft", "report", "document", "docs", "article", "essay", "blog"]),
    ("development", &["code", "implement", "fix", "bug", "refactor", "build", "deploy", "test"]),
    ("design", &["design", "mockup", "wireframe", "prototype", "sketch", "ui", "ux"]),
    ("research", &["research", "read", "study", "investigate", "survey", "learn"]),
    ("meeting", &["meeting", "call", "sync", "interview", "standup"]),
    ("review", &["review", "feedback", "check", "audit"]),
    ("admin", &["email", "invoice", "expense", "plan", "organize", "schedule"]),
];

fn normalize(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Derive the category of a task.
///
/// Declared project first, then the first keyword, then a title vocabulary
/// match, then [`GENERAL_CATEGORY`].
pub fn category_for(task: &Task) -> String {
    if let Some(project) = task.project.as_deref().and_then(normalize) {
        return project;
    }
    if let Some(keyword) = task.keywords.iter().find_map(|k| normalize(k)) {
        return keyword;
    }
    title_category(&task.title).unwrap_or(GENERAL_CATEGORY).to_string()
}

fn title_category(title: &str) -> Option<&'static str> {
    let words: Vec<String> = title
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    VOCABULARY
        .iter()
        .find(|(_, terms)| words.iter().any(|w| terms.contains(&w.as_str())))
        .map(|(category, _)| *category)
}
