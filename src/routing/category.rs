//! Closed set of query categories

use std::fmt;

use serde::{Deserialize, Serialize};

/// Category label a query is routed by
///
/// The set is closed: every classification resolves to exactly one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Japanese language, culture, and travel
    Japanese,
    /// Smart home control and automation
    HomeAssistant,
    /// Everything else
    General,
}

/// How responses for a category are presented to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Presentation {
    /// Marker prepended to every response (without the trailing colon)
    pub prefix: &'static str,
    /// What the user calls the backing system ("home automation system")
    pub system: &'static str,
    /// Product name of the backing server ("Home Assistant")
    pub server: &'static str,
}

impl Presentation {
    /// Prefix a message with this category's marker
    #[must_use]
    pub fn tag(&self, message: &str) -> String {
        format!("{}: {message}", self.prefix)
    }

    /// The marker as it appears in tagged output
    #[must_use]
    pub fn marker(&self) -> String {
        format!("{}:", self.prefix)
    }
}

const HOME_PRESENTATION: Presentation = Presentation {
    prefix: "🏠 Smart Home Assistant",
    system: "home automation system",
    server: "Home Assistant",
};

impl Category {
    /// All categories in declaration order
    pub const ALL: [Self; 3] = [Self::Japanese, Self::HomeAssistant, Self::General];

    /// Canonical upper-case label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Japanese => "JAPANESE",
            Self::HomeAssistant => "HOME_ASSISTANT",
            Self::General => "GENERAL",
        }
    }

    /// One-line description used when prompting the classifier
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Japanese => {
                "Japanese language, culture, anime, manga, travel to Japan, Japanese food, customs, traditions"
            }
            Self::HomeAssistant => {
                "Smart home automation, IoT devices, home security, lighting, thermostats, appliances, Home Assistant platform"
            }
            Self::General => {
                "Everything else including science, programming, general knowledge, math, history, etc."
            }
        }
    }

    /// What a handler for this category helps with, for user-facing text
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Japanese => "Japanese language learning",
            Self::HomeAssistant => "smart home control",
            Self::General => "general questions",
        }
    }

    /// Response presentation, if this category rewrites handler output
    #[must_use]
    pub const fn presentation(self) -> Option<Presentation> {
        match self {
            Self::HomeAssistant => Some(HOME_PRESENTATION),
            Self::Japanese | Self::General => None,
        }
    }

    /// Parse a label or one of its common aliases
    ///
    /// Matching is case-insensitive and treats spaces and dashes like
    /// underscores, so "home assistant" and "Home-Assistant" both resolve.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .trim_matches(|c: char| matches!(c, '\'' | '"' | '`' | '.'))
            .chars()
            .map(|c| match c {
                ' ' | '-' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();

        match normalized.as_str() {
            "JAPANESE" | "JAPAN" => Some(Self::Japanese),
            "HOME_ASSISTANT" | "HOME" | "SMART_HOME" | "HOMEASSISTANT" => Some(Self::HomeAssistant),
            "GENERAL" | "OTHER" => Some(Self::General),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
