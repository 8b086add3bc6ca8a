use serde::{Deserialize, Serialize};

/// How the presentation layer should style a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    User,
    Bot,
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::User => "user",
            Category::Bot => "bot",
            Category::System => "system",
        }
    }
}

/// Unit of output flowing from background workers to the interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayTuple {
    pub sender: String,
    pub text: String,
    pub category: Category,
}

impl DisplayTuple {
    pub fn new(sender: impl Into<String>, text: impl Into<String>, category: Category) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            category,
        }
    }

    pub fn user(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, text, Category::User)
    }

    pub fn bot(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, text, Category::Bot)
    }

    pub fn system(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(sender, text, Category::System)
    }

    pub fn is_system(&self) -> bool {
        self.category == Category::System
    }
}

impl std::fmt::Display for DisplayTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.sender, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_serializes_snake_case() {
        let tuple = DisplayTuple::system("System", "Loading model...");
        let json = serde_json::to_value(&tuple).unwrap();
        assert_eq!(json["category"], "system");
        assert_eq!(tuple.category.as_str(), "system");
    }

    #[test]
    fn test_display_renders_sender_and_text() {
        let tuple = DisplayTuple::bot("AI Assistant", "hi");
        assert_eq!(tuple.to_string(), "AI Assistant: hi");
        assert!(!tuple.is_system());
    }
}
