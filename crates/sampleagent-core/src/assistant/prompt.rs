//! Prompt construction for the sample collection assistant.

use crate::config::AssistantConfig;

use super::CompletionRequest;

/// Wrap the user's question in the fixed field-assistant template.
pub fn build_prompt(system_context: &str, utterance: &str) -> String {
    format!(
        "{}\n\nUser question: \"{}\"\n\nPlease provide helpful, accurate information. Keep responses concise and practical for field use.",
        system_context.trim(),
        utterance.trim()
    )
}

pub fn completion_request(config: &AssistantConfig, utterance: &str) -> CompletionRequest {
    CompletionRequest {
        prompt: build_prompt(&config.system_context, utterance),
        max_output_tokens: config.max_output_tokens,
        temperature: config.temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context_and_question() {
        let prompt = build_prompt("You help couriers.", "  Where do swabs go? ");
        assert!(prompt.starts_with("You help couriers.\n\n"));
        assert!(prompt.contains("User question: \"Where do swabs go?\""));
        assert!(prompt.ends_with("practical for field use."));
    }

    #[test]
    fn test_completion_request_uses_generation_settings() {
        let config = AssistantConfig::default();
        let request = completion_request(&config, "hello");
        assert_eq!(request.max_output_tokens, 500);
        assert!((request.temperature - 0.7).abs() < f32::EPSILON);
        assert!(request.prompt.contains("hello"));
    }
}
