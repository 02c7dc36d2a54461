//! Rendering a [`CollectionResult`] into backend-neutral prompt text.

use crate::aggregator::CollectionResult;

/// The standing instruction sent with every briefing request.
pub const BRIEFING_TASK: &str = "You are an AI assistant for developers. Analyze the following data from different developer tools and provide a concise summary focusing on:
1. Important tasks and their priorities
2. Pending code reviews that need attention
3. Messages that require responses
4. Any blocking issues that should be addressed immediately

Please format the output in a clear, readable way with sections for each category.";

/// Shown to the user, and given to the model, when nothing was collected.
pub const NO_DATA_MESSAGE: &str = "No data collected from extensions.";

/// A rendered prompt, consumed once by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    text: String,
    sources: Vec<String>,
}

impl PromptContext {
    /// Render `results` under `task`.
    ///
    /// Sections appear in name order so the same data always produces the
    /// same prompt.
    pub fn build(task: &str, results: &CollectionResult) -> Self {
        let mut text = String::from("Context:\n");
        if results.is_empty() {
            text.push_str(NO_DATA_MESSAGE);
            text.push_str("\n\n");
        }
        for (source, data) in results {
            let rendered =
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string());
            text.push_str(&format!("=== {source} ===\n{rendered}\n\n"));
        }
        text.push_str(&format!("\nTask: {task}\n\nResponse:"));

        Self {
            text,
            sources: results.keys().cloned().collect(),
        }
    }

    /// Render with the standard [`BRIEFING_TASK`].
    pub fn briefing(results: &CollectionResult) -> Self {
        Self::build(BRIEFING_TASK, results)
    }

    /// `true` when no connector contributed a section.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}
