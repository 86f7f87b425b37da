/// Base URLs of the external services the action and generation nodes call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceEndpoints {
    pub sendgrid: String,
    pub gmail: String,
    pub slack: String,
    pub openai: String,
    pub xai: String,
    /// OpenAI compatibility layer of the Gemini API
    pub google: String,
    pub anthropic: String,
}

impl ServiceEndpoints {
    /// Point every service at one server (a local mock, a proxy)
    pub fn all(base: impl Into<String>) -> Self {
        let base = base.into().trim_end_matches('/').to_string();
        Self {
            sendgrid: base.clone(),
            gmail: base.clone(),
            slack: base.clone(),
            openai: base.clone(),
            xai: base.clone(),
            google: base.clone(),
            anthropic: base,
        }
    }
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            sendgrid: "https://api.sendgrid.com".to_string(),
            gmail: "https://gmail.googleapis.com".to_string(),
            slack: "https://slack.com/api".to_string(),
            openai: "https://api.openai.com/v1".to_string(),
            xai: "https://api.x.ai/v1".to_string(),
            google: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            anthropic: "https://api.anthropic.com/v1".to_string(),
        }
    }
}
