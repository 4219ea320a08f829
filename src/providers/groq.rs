//! Groq adapter (§4.A) — an OpenAI-compatible Chat Completions surface at Groq's own base URL.

use super::openai::OpenAiAdapter;
use super::ModelCapabilities;

const API_BASE: &str = "https://api.groq.com/openai/v1";

pub fn adapter(capabilities: Vec<ModelCapabilities>) -> OpenAiAdapter {
    OpenAiAdapter::new_compatible("groq", API_BASE, capabilities)
}
