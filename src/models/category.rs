use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_idle: bool,
}

impl CategoryConfig {
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            is_idle: false,
        }
    }
}

pub fn default_categories() -> Vec<CategoryConfig> {
    vec![
        CategoryConfig::new(
            "Work",
            "Focused, productive work: coding, writing, design, research, meetings.",
        ),
        CategoryConfig::new(
            "Personal",
            "Life admin, errands, learning for its own sake, personal communication.",
        ),
        CategoryConfig::new(
            "Distraction",
            "Entertainment, social feeds, aimless browsing.",
        ),
        CategoryConfig {
            name: "Idle".to_string(),
            description: "Screen unchanged or nobody at the computer.".to_string(),
            is_idle: true,
        },
    ]
}

/// Case-insensitive lookup returning the configured spelling.
pub fn match_category<'a>(categories: &'a [CategoryConfig], candidate: &str) -> Option<&'a str> {
    let wanted = candidate.trim().trim_matches(|c| c == '"' || c == '.').to_lowercase();
    categories
        .iter()
        .find(|c| c.name.to_lowercase() == wanted)
        .map(|c| c.name.as_str())
}
