use crate::endpoints::ServiceEndpoints;

/// How a provider's streaming API is spoken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    ChatCompletions,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    OpenAi,
    Anthropic,
    Xai,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Google,
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Xai,
    ];

    /// Display name, also the credential key
    pub fn name(&self) -> &'static str {
        match self {
            Provider::Google => "Google Generative AI",
            Provider::OpenAi => "OpenAI",
            Provider::Anthropic => "Anthropic",
            Provider::Xai => "xAI",
        }
    }

    pub fn models(&self) -> &'static [&'static str] {
        match self {
            Provider::Google => &[
                "gemini-1.5-flash",
                "gemini-1.5-flash-8b",
                "gemini-1.5-pro",
                "gemini-2.0-flash",
                "gemini-2.0-flash-lite",
                "gemini-2.0-pro-exp-02-05",
                "gemini-2.0-flash-exp",
                "gemini-2.5-pro",
                "gemini-2.5-flash",
                "gemini-exp-1206",
                "gemma-3-27b-it",
            ],
            Provider::OpenAi => &[
                "o1",
                "o1-mini",
                "o3-mini",
                "o3",
                "o4-mini",
                "gpt-4.1",
                "gpt-4.1-mini",
                "gpt-4.1-nano",
                "gpt-4o",
                "gpt-4o-mini",
                "gpt-4-turbo",
                "gpt-4",
                "gpt-4.5-preview",
                "gpt-3.5-turbo",
                "chatgpt-4o-latest",
            ],
            Provider::Anthropic => &[
                "claude-4-opus-20250514",
                "claude-4-sonnet-20250514",
                "claude-3-7-sonnet-20250219",
                "claude-3-5-sonnet-latest",
                "claude-3-5-haiku-latest",
                "claude-3-opus-latest",
                "claude-3-sonnet-20240229",
                "claude-3-haiku-20240307",
            ],
            Provider::Xai => &[
                "grok-3",
                "grok-3-fast",
                "grok-3-mini",
                "grok-3-mini-fast",
                "grok-2-1212",
                "grok-2",
                "grok-beta",
            ],
        }
    }

    pub fn for_model(model: &str) -> Option<Provider> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.models().contains(&model))
    }

    pub fn wire(&self) -> Wire {
        match self {
            Provider::Anthropic => Wire::Messages,
            _ => Wire::ChatCompletions,
        }
    }

    pub fn base_url<'a>(&self, endpoints: &'a ServiceEndpoints) -> &'a str {
        match self {
            Provider::Google => &endpoints.google,
            Provider::OpenAi => &endpoints.openai,
            Provider::Anthropic => &endpoints.anthropic,
            Provider::Xai => &endpoints.xai,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn models_resolve_to_one_provider() {
        assert_eq!(Provider::for_model("gpt-4o"), Some(Provider::OpenAi));
        assert_eq!(Provider::for_model("gemini-2.5-flash"), Some(Provider::Google));
        assert_eq!(Provider::for_model("claude-3-5-haiku-latest"), Some(Provider::Anthropic));
        assert_eq!(Provider::for_model("grok-3-mini"), Some(Provider::Xai));
        assert_eq!(Provider::for_model("llama-3"), None);

        let mut seen = std::collections::HashSet::new();
        for provider in Provider::ALL {
            for model in provider.models() {
                assert!(seen.insert(*model), "{model} listed twice");
            }
        }
    }

    #[test]
    fn only_anthropic_uses_messages() {
        assert_eq!(Provider::Anthropic.wire(), Wire::Messages);
        assert_eq!(Provider::Google.wire(), Wire::ChatCompletions);
    }
}
