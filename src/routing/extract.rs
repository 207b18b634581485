//! Category extraction from free-text classifier output
//!
//! Language models do not always answer with the structured shape they were
//! asked for. These heuristics recover a category from whatever text came
//! back, in a fixed precedence order.

use std::sync::LazyLock;

use regex::Regex;

use super::Category;

/// Markers emitted by routing workflows ahead of the chosen label
const ROUTING_MARKERS: [&str; 2] = ["🤖 Router: Routing to ", "📍 Routing to:"];

/// Order used when every other heuristic has failed
const PREFERENCE: [Category; 3] = [Category::General, Category::HomeAssistant, Category::Japanese];

/// `-> LABEL` pattern per category, in `Category::ALL` order
static ARROW_PATTERNS: LazyLock<Vec<(Category, Regex)>> = LazyLock::new(|| {
    Category::ALL
        .into_iter()
        .map(|category| {
            let pattern = format!(r"->\s*{}\b", regex::escape(category.label()));
            (category, Regex::new(&pattern).expect("valid regex"))
        })
        .collect()
});

/// Extract a category from text that may carry a routing marker
///
/// When a marker is present the label after it is authoritative. Only an
/// exact canonical label counts; anything else, aliases included, resolves
/// to `GENERAL` rather than falling through to the free-text heuristics.
#[must_use]
pub fn extract_routing_decision(text: &str) -> Category {
    for marker in ROUTING_MARKERS {
        if let Some((_, rest)) = text.split_once(marker) {
            let label = rest.split(" agent").next().unwrap_or(rest).trim();
            let category = Category::ALL
                .into_iter()
                .find(|c| c.label() == label)
                .unwrap_or(Category::General);
            tracing::debug!(marker, label, %category, "routing marker found");
            return category;
        }
    }

    extract_category(text)
}

/// Extract a category from arbitrary text
///
/// Heuristics, first match wins:
/// 1. the whole text is a label
/// 2. the text starts with a label
/// 3. the text ends with a label
/// 4. a `-> LABEL` arrow
/// 5. the label whose last occurrence is furthest into the text
/// 6. any occurrence, preferring `GENERAL`, then `HOME_ASSISTANT`, then `JAPANESE`
///
/// Falls back to `GENERAL`.
#[must_use]
pub fn extract_category(text: &str) -> Category {
    let upper = text.trim().to_uppercase();
    if upper.is_empty() {
        return Category::General;
    }

    if let Some(category) = Category::ALL.into_iter().find(|c| upper == c.label()) {
        return category;
    }

    if let Some(category) = Category::ALL
        .into_iter()
        .find(|c| upper.starts_with(c.label()))
    {
        return category;
    }

    if let Some(category) = Category::ALL.into_iter().find(|c| upper.ends_with(c.label())) {
        return category;
    }

    if let Some((category, _)) = ARROW_PATTERNS.iter().find(|(_, re)| re.is_match(&upper)) {
        return *category;
    }

    if let Some((category, _)) = Category::ALL
        .into_iter()
        .filter_map(|c| upper.rfind(c.label()).map(|pos| (c, pos)))
        .max_by_key(|(_, pos)| *pos)
    {
        return category;
    }

    PREFERENCE
        .into_iter()
        .find(|c| upper.contains(c.label()))
        .unwrap_or(Category::General)
}
