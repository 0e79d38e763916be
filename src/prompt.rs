//! Prompt construction for reply generation.

use serde::Serialize;

use crate::request::GenerationRequest;

const FRAMING: &str = "You are an AI email assistant. Write a reply to the email below; \
do not compose a new message from scratch. ";

const GUIDELINES: &str = "Important guidelines: \
- Do NOT include a subject line \
- Start directly with the email body \
- Keep the response contextually appropriate \
- Include a proper greeting and closing \
- Address the main points of the original email ";

const CONTENT_LABEL: &str = "\n\nOriginal Email Content:\n";
const CLOSING_INSTRUCTION: &str = "\n\nGenerate only the email reply body (no subject line):";

/// Reply tone. Anything outside the fixed set is carried through as
/// [`Tone::Custom`] and echoed into the prompt as written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tone {
    Professional,
    Casual,
    Friendly,
    Formal,
    Concise,
    Custom(String),
}

/// Entry in the list served to clients.
#[derive(Debug, Clone, Serialize)]
pub struct ToneDescription {
    pub name: &'static str,
    pub description: &'static str,
}

impl Tone {
    /// Case-insensitive, trimmed; blank means professional.
    pub fn parse(raw: Option<&str>) -> Self {
        let trimmed = raw.map(str::trim).unwrap_or_default();
        match trimmed.to_lowercase().as_str() {
            "" | "professional" => Tone::Professional,
            "casual" => Tone::Casual,
            "friendly" => Tone::Friendly,
            "formal" => Tone::Formal,
            "concise" => Tone::Concise,
            _ => Tone::Custom(trimmed.to_string()),
        }
    }

    pub fn instruction(&self) -> String {
        match self {
            Tone::Professional => {
                "Use a professional, courteous tone. Be formal but approachable. ".to_string()
            }
            Tone::Casual => "Use a casual, friendly tone. Be relaxed and conversational. ".to_string(),
            Tone::Friendly => "Use a warm, friendly tone. Be personable and engaging. ".to_string(),
            Tone::Formal => {
                "Use a formal, business-appropriate tone. Be respectful and structured. ".to_string()
            }
            Tone::Concise => {
                "Be brief and to-the-point. Use short sentences and get straight to the message. "
                    .to_string()
            }
            Tone::Custom(tone) => format!("Use a {tone} tone. "),
        }
    }

    pub fn supported() -> [ToneDescription; 5] {
        [
            ToneDescription {
                name: "professional",
                description: "Professional, courteous, and business-appropriate",
            },
            ToneDescription {
                name: "casual",
                description: "Casual, relaxed, and informal",
            },
            ToneDescription {
                name: "friendly",
                description: "Warm, friendly, and approachable",
            },
            ToneDescription {
                name: "formal",
                description: "Very formal, respectful, and traditional",
            },
            ToneDescription {
                name: "concise",
                description: "Brief, direct, and to-the-point",
            },
        ]
    }
}

/// Turns a [`GenerationRequest`] into the single instruction string sent to
/// the provider. Deterministic; applies no length cap of its own.
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, request: &GenerationRequest) -> String {
        let tone = Tone::parse(request.tone.as_deref());

        let mut prompt = String::with_capacity(
            FRAMING.len() + GUIDELINES.len() + request.content.len() + 256,
        );
        prompt.push_str(FRAMING);
        prompt.push_str(&tone.instruction());
        prompt.push_str(GUIDELINES);

        if let Some(style) = request.effective_style() {
            prompt.push_str("Additional writing style requirements: ");
            prompt.push_str(style);
            prompt.push(' ');
        }

        prompt.push_str(CONTENT_LABEL);
        prompt.push_str(&request.content);
        prompt.push_str(CLOSING_INSTRUCTION);
        prompt
    }
}
