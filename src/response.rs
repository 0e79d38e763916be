use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::orchestrator::{ClientUsage, GeneratedReply};
use crate::prompt::{Tone, ToneDescription};
use crate::request::DEFAULT_TONE;
use crate::usage_tracker::UsageSnapshot;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReplyResponse {
    pub success: bool,
    pub reply: String,
    pub tone: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub usage: UsageSnapshot,
}

impl From<GeneratedReply> for GenerateReplyResponse {
    fn from(generated: GeneratedReply) -> Self {
        Self {
            success: true,
            reply: generated.reply,
            tone: generated.tone,
            timestamp: now_millis(),
            usage: generated.usage,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub success: bool,
    pub client_ip: String,
    pub timestamp: u64,
    #[serde(flatten)]
    pub usage: UsageSnapshot,
}

impl From<ClientUsage> for UsageResponse {
    fn from(usage: ClientUsage) -> Self {
        Self {
            success: true,
            client_ip: usage.client_id,
            timestamp: now_millis(),
            usage: usage.usage,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TonesResponse {
    pub success: bool,
    pub tones: [ToneDescription; 5],
    pub default_tone: &'static str,
}

impl TonesResponse {
    pub fn current() -> Self {
        Self {
            success: true,
            tones: Tone::supported(),
            default_tone: DEFAULT_TONE,
        }
    }
}
