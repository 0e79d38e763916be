use serde::{Deserialize, Serialize};
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::error::Error;

pub const MAX_CONTENT_CHARS: u64 = 5000;
pub const MAX_STYLE_CHARS: u64 = 500;
pub const DEFAULT_TONE: &str = "professional";

/// A request to draft a reply to `content`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct GenerationRequest {
    #[serde(rename = "emailContent", default)]
    #[validate(
        custom(function = "not_blank"),
        length(max = MAX_CONTENT_CHARS, message = "Email content cannot exceed 5000 characters")
    )]
    pub content: String,

    #[serde(default)]
    pub tone: Option<String>,

    #[serde(rename = "customPrompt", default)]
    #[validate(length(max = MAX_STYLE_CHARS, message = "Custom prompt cannot exceed 500 characters"))]
    pub style_instructions: Option<String>,
}

impl GenerationRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tone: None,
            style_instructions: None,
        }
    }

    pub fn with_tone(mut self, tone: impl Into<String>) -> Self {
        self.tone = Some(tone.into());
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style_instructions = Some(style.into());
        self
    }

    /// Trimmed, lower-cased tone; `professional` when absent or blank.
    pub fn effective_tone(&self) -> String {
        match self.tone.as_deref().map(str::trim) {
            Some(tone) if !tone.is_empty() => tone.to_lowercase(),
            _ => DEFAULT_TONE.to_string(),
        }
    }

    /// Trimmed style instructions, `None` when absent or blank.
    pub fn effective_style(&self) -> Option<&str> {
        self.style_instructions
            .as_deref()
            .map(str::trim)
            .filter(|style| !style.is_empty())
    }

    /// Check content and style bounds, collapsing failures into one message.
    pub fn check(&self) -> Result<(), Error> {
        self.validate()
            .map_err(|errors| Error::Validation(describe(&errors)))
    }
}

// Content and style can be long or private; keep them out of logs.
impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("content_chars", &self.content.chars().count())
            .field("tone", &self.tone)
            .field(
                "style_chars",
                &self.style_instructions.as_ref().map(|s| s.chars().count()),
            )
            .finish()
    }
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("blank");
        error.message = Some("Email content cannot be empty".into());
        return Err(error);
    }
    Ok(())
}

fn describe(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| match &err.message {
                Some(message) => message.to_string(),
                None => format!("Invalid value for {field}"),
            })
        })
        .collect();
    messages.sort();
    messages.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_wire_names() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "emailContent": "Can we meet on Friday?",
            "tone": "Casual",
            "customPrompt": "Sign off as Sam"
        }))
        .unwrap();

        assert_eq!(request.content, "Can we meet on Friday?");
        assert_eq!(request.effective_tone(), "casual");
        assert_eq!(request.effective_style(), Some("Sign off as Sam"));
    }

    #[test]
    fn test_missing_fields_default() {
        let request: GenerationRequest = serde_json::from_value(json!({})).unwrap();
        assert!(request.content.is_empty());
        assert_eq!(request.effective_tone(), DEFAULT_TONE);
        assert_eq!(request.effective_style(), None);
    }

    #[test]
    fn test_blank_tone_defaults_to_professional() {
        let request = GenerationRequest::new("hi").with_tone("   ");
        assert_eq!(request.effective_tone(), "professional");
    }

    #[test]
    fn test_check_accepts_valid_request() {
        let request = GenerationRequest::new("Thanks for the update.").with_style("short");
        assert!(request.check().is_ok());
    }

    #[test]
    fn test_check_rejects_blank_content() {
        let err = GenerationRequest::new("  \n ").check().unwrap_err();
        match err {
            Error::Validation(message) => assert!(message.contains("cannot be empty")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_check_rejects_oversized_content() {
        let request = GenerationRequest::new("a".repeat(MAX_CONTENT_CHARS as usize + 1));
        assert!(matches!(request.check(), Err(Error::Validation(_))));

        let request = GenerationRequest::new("a".repeat(MAX_CONTENT_CHARS as usize));
        assert!(request.check().is_ok());
    }

    #[test]
    fn test_check_rejects_oversized_style() {
        let request = GenerationRequest::new("hello")
            .with_style("b".repeat(MAX_STYLE_CHARS as usize + 1));
        let err = request.check().unwrap_err();
        assert!(err.to_string().contains("Custom prompt"));
    }

    #[test]
    fn test_style_limit_boundary() {
        let request = GenerationRequest::new("hello")
            .with_style("b".repeat(MAX_STYLE_CHARS as usize));
        assert!(request.check().is_ok());
    }

    #[test]
    fn test_debug_hides_content() {
        let request = GenerationRequest::new("secret body");
        let debug = format!("{request:?}");
        assert!(!debug.contains("secret body"));
        assert!(debug.contains("content_chars"));
    }
}
