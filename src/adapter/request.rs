//! Provider-specific request payloads.

use serde::{Deserialize, Serialize};

use super::turns::{ChatTurn, Role};
use crate::config::{CompletionConfig, GenerationSettings, SafetySetting};

/// One request to one provider, built fresh for every inbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRequest {
    Completion(CompletionRequest),
    Chat(ChatRequest),
}

/// Completion-style body: `{model, prompt, max_tokens, temperature}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn from_turns(settings: &CompletionConfig, persona: &str, turns: &[ChatTurn]) -> Self {
        Self {
            model: settings.model.clone(),
            prompt: build_prompt(persona, turns),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        }
    }
}

/// Flatten a conversation into a single prompt: persona first, then every
/// turn's content in order, newline separated. Roles are not rendered.
pub fn build_prompt(persona: &str, turns: &[ChatTurn]) -> String {
    let mut prompt = String::with_capacity(
        persona.len() + turns.iter().map(|t| t.content.len() + 1).sum::<usize>() + 1,
    );
    prompt.push_str(persona);
    prompt.push('\n');
    let body: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
    prompt.push_str(&body.join("\n"));
    prompt
}

/// Chat-style body for `streamGenerateContent`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// Target model; part of the URL, not the body.
    #[serde(skip)]
    pub model: String,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
    pub safety_settings: Vec<SafetySetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

/// A role-tagged list of text parts.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
            }],
        }
    }
}

/// Map a conversation onto chat-style `contents`.
///
/// The provider requires the first content to come from the user, while
/// the browser usually opens with an assistant greeting. Leading assistant
/// turns are therefore folded into the first user content as extra parts,
/// ahead of the user's own text, so no turn text is dropped.
pub fn chat_contents(turns: &[ChatTurn]) -> Vec<Content> {
    let lead = turns
        .iter()
        .take_while(|turn| turn.role == Role::Assistant)
        .count();
    if lead == 0 {
        return turns.iter().map(Content::from).collect();
    }

    let (greeting, rest) = turns.split_at(lead);
    let mut parts: Vec<Part> = greeting
        .iter()
        .map(|turn| Part {
            text: Some(turn.content.clone()),
        })
        .collect();

    let mut rest = rest.iter();
    if let Some(first_user) = rest.next() {
        parts.push(Part {
            text: Some(first_user.content.clone()),
        });
    }

    let mut contents = vec![Content {
        role: Some("user".to_string()),
        parts,
    }];
    contents.extend(rest.map(Content::from));
    contents
}

impl From<&ChatTurn> for Content {
    fn from(turn: &ChatTurn) -> Self {
        let role = match turn.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        Content::text(Some(role), turn.content.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl From<&GenerationSettings> for GenerationConfig {
    fn from(settings: &GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_k: settings.top_k,
            top_p: settings.top_p,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completion_settings() -> CompletionConfig {
        CompletionConfig {
            url: "https://example.com/v1/completions".to_string(),
            api_key: None,
            model: "test-model".to_string(),
            max_tokens: 512,
            temperature: 0.7,
        }
    }

    #[test]
    fn test_prompt_keeps_every_turn_in_order() {
        let turns = vec![
            ChatTurn::assistant("Hi! I'm the support assistant."),
            ChatTurn::user("How do I install an extension?"),
            ChatTurn::assistant("Open the Extensions view."),
            ChatTurn::user("Where is it?"),
        ];

        let prompt = build_prompt("PERSONA", &turns);
        assert_eq!(
            prompt,
            "PERSONA\nHi! I'm the support assistant.\nHow do I install an extension?\nOpen the Extensions view.\nWhere is it?"
        );

        let mut cursor = 0;
        for turn in &turns {
            let found = prompt[cursor..].find(&turn.content).expect("turn text lost");
            cursor += found + turn.content.len();
        }
    }

    #[test]
    fn test_completion_request_wire_shape() {
        let request =
            CompletionRequest::from_turns(&completion_settings(), "P", &[ChatTurn::user("hello")]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "test-model",
                "prompt": "P\nhello",
                "max_tokens": 512,
                "temperature": 0.7f32
            })
        );
    }

    #[test]
    fn test_identical_history_builds_independent_requests() {
        let turns = vec![ChatTurn::user("same question")];
        let first = CompletionRequest::from_turns(&completion_settings(), "P", &turns);
        let second = CompletionRequest::from_turns(&completion_settings(), "P", &turns);
        assert_eq!(first, second);
    }

    #[test]
    fn test_chat_contents_plain_history_maps_one_to_one() {
        let contents = chat_contents(&[
            ChatTurn::user("q1"),
            ChatTurn::assistant("a1"),
            ChatTurn::user("q2"),
        ]);
        let roles: Vec<_> = contents.iter().map(|c| c.role.as_deref().unwrap()).collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn test_chat_contents_folds_leading_greeting_into_first_user_turn() {
        let contents = chat_contents(&[
            ChatTurn::assistant("Welcome!"),
            ChatTurn::user("How do I save?"),
            ChatTurn::assistant("Press Ctrl+S."),
            ChatTurn::user("Thanks"),
        ]);

        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        let first: Vec<_> = contents[0]
            .parts
            .iter()
            .map(|p| p.text.as_deref().unwrap())
            .collect();
        assert_eq!(first, vec!["Welcome!", "How do I save?"]);
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(contents[2].role.as_deref(), Some("user"));
    }

    #[test]
    fn test_chat_contents_assistant_only_history_is_sent_as_user() {
        let contents = chat_contents(&[ChatTurn::assistant("a"), ChatTurn::assistant("b")]);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[0].parts.len(), 2);
    }

    #[test]
    fn test_chat_request_wire_shape() {
        let request = ChatRequest {
            model: "gemini-test".to_string(),
            contents: vec![
                Content::from(&ChatTurn::user("hi")),
                Content::from(&ChatTurn::assistant("hello")),
            ],
            generation_config: GenerationConfig::from(&GenerationSettings::default()),
            safety_settings: vec![SafetySetting {
                category: "HARM_CATEGORY_HARASSMENT".to_string(),
                threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
            }],
            system_instruction: None,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("model").is_none());
        assert!(json.get("systemInstruction").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][1]["parts"][0]["text"], "hello");
        assert_eq!(json["generationConfig"]["topK"], 1);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(
            json["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }
}
