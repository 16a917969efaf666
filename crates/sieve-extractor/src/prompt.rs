//! Prompt construction for Q&A extraction

use std::collections::BTreeMap;

use sieve_domain::{LANGUAGE_KEY, PLATFORM_KEY};

/// Builds the completion prompt for one chunk
pub struct PromptBuilder<'a> {
    text: &'a str,
    platform: Option<&'a str>,
    language: Option<&'a str>,
}

impl<'a> PromptBuilder<'a> {
    /// Create a new prompt builder over the conversation text
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            platform: None,
            language: None,
        }
    }

    /// Take platform and language hints from request metadata
    pub fn with_metadata(mut self, metadata: &'a BTreeMap<String, String>) -> Self {
        self.platform = metadata.get(PLATFORM_KEY).map(String::as_str);
        self.language = metadata.get(LANGUAGE_KEY).map(String::as_str);
        self
    }

    /// Set the platform hint
    pub fn with_platform(mut self, platform: &'a str) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the language hint
    pub fn with_language(mut self, language: &'a str) -> Self {
        self.language = Some(language);
        self
    }

    /// Build the complete extraction prompt
    pub fn build(&self) -> String {
        let mut prompt = String::with_capacity(self.text.len() + 2048);

        prompt.push_str(EXTRACTION_INSTRUCTIONS);
        prompt.push_str("\n\n");

        prompt.push_str(&format!("Source: {}\n", self.describe_platform()));
        if let Some(language) = self.language {
            prompt.push_str(&format!(
                "Conversation language: {}. Write questions and answers in that language.\n",
                language
            ));
        }
        prompt.push('\n');

        prompt.push_str("Conversation:\n");
        prompt.push_str("---\n");
        prompt.push_str(self.text);
        prompt.push_str("\n---\n\n");

        prompt.push_str(OUTPUT_FORMAT_REMINDER);

        prompt
    }

    /// Describe the platform the conversation came from
    fn describe_platform(&self) -> String {
        let Some(platform) = self.platform else {
            return "Customer support conversation".to_string();
        };

        let kind = match platform.to_ascii_lowercase().as_str() {
            "discord" | "slack" | "telegram" => "Community chat",
            "zendesk" | "freshdesk" | "jira" => "Support ticket thread",
            "intercom" | "livechat" | "drift" => "Live chat transcript",
            "email" | "gmail" | "outlook" => "Email thread",
            "forum" | "discourse" | "reddit" => "Forum thread",
            "phone" | "call" => "Call transcript",
            _ => "Customer support conversation",
        };
        format!("{} ({})", kind, platform)
    }
}

const EXTRACTION_INSTRUCTIONS: &str = r#"Extract question and answer pairs from the following support conversation.
Each pair should follow this format:

{
  "question": "the customer's question or problem, rewritten to stand alone",
  "answer": "the answer or resolution that was given",
  "context_before": "short summary of what led up to the question",
  "context_after": "short summary of what followed the answer",
  "confidence": 0.0-1.0,
  "quality_score": 0.0-1.0,
  "issue_type": "error | access | billing | how_to | other",
  "resolution_type": "instructions | workaround | escalation | explanation",
  "tags": ["keyword", "..."]
}

Rules:
- Only extract questions that received an actual answer in the conversation
- Questions and answers must each be at least 10 characters
- Do not invent answers; paraphrase only what the agent said
- Merge follow-up clarifications into the answer they refine
- Skip greetings, small talk and unanswered questions
- confidence reflects how sure you are the pair is correct and complete
- quality_score reflects how useful the answer would be to another customer"#;

const OUTPUT_FORMAT_REMINDER: &str = r#"Output format (JSON array only, no additional text):
[
  {
    "question": "...",
    "answer": "...",
    "confidence": 0.0-1.0,
    "quality_score": 0.0-1.0
  }
]

Return [] when the conversation contains no answered questions.
Remember: Return ONLY valid JSON, no markdown code blocks, no explanations."#;
