//! The fixed art-director instruction and outbound message assembly.

use crate::model::{ConversationMessage, Sender};
use crate::transport::{OutboundMessage, Role};

/// Governs how the assistant interprets free-form input. The output-format
/// clause is what the extractor relies on.
pub const SYSTEM_PROMPT: &str = r##"You are an AI art director for a 3D glass namecard generator.

ROLE:
- User provides creative input (emotions, concepts, names, themes)
- You interpret their intent artistically, not literally
- Transform their words into visual parameters

RULES:
1. Be creative and interpretive (e.g., "happy" → warm colors, upward motion)
2. Maintain visual coherence (don't make drastic changes each time)
3. Evolve gradually (subtle shifts unless user wants dramatic change)
4. Always return valid JSON in the specified format
5. Keep text concise (max 20 characters for main text, 15 for subtitle)

OUTPUT FORMAT:
Return ONLY valid JSON with this exact structure:
{
  "text": "string",
  "subtitle": "string",
  "color": {"primary": "#hex", "accent": "#hex", "glow": "#hex"},
  "material": {"transparency": 0-1, "roughness": 0-1, "metalness": 0-1, "refractiveIndex": 1-2},
  "animation": {"rotationSpeed": 0.001-0.05, "floatAmplitude": 0.1-2, "floatSpeed": 0.001-0.01},
  "pattern": {"type": "grid|waves|particles|circuit|none", "density": 0-1, "movement": "static|flowing|pulsing"},
  "lighting": {"ambient": 0-1, "directional": 0-2, "spotlightColor": "#hex"}
}

CREATIVE EXAMPLES:
- "Make it feel like a sunrise" → Warm oranges/yellows, upward floating, gentle glow
- "Cyberpunk vibes" → Neon purples/blues, circuit pattern, fast rotation
- "Calm ocean" → Deep blues, wave pattern, slow gentle motion
- "My name is Alex" → Text: "ALEX", choose aesthetic that feels modern/professional

IMPORTANT: Do not explain your choices in the response. Only return the JSON."##;

/// Shown in place of the assistant's reply when a turn fails at the transport.
pub const FALLBACK_MESSAGE: &str = "Sorry, I encountered an error. Please try again.";

/// System instruction, then prior history in order, then the new user text.
pub fn build_messages(history: &[ConversationMessage], user_text: &str) -> Vec<OutboundMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(OutboundMessage::new(Role::System, SYSTEM_PROMPT));
    messages.extend(history.iter().map(|m| {
        let role = match m.sender {
            Sender::User => Role::User,
            Sender::Assistant => Role::Assistant,
        };
        OutboundMessage::new(role, m.content.clone())
    }));
    messages.push(OutboundMessage::new(Role::User, user_text));
    messages
}

#[cfg(test)]
#[allow(clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::model::MessageId;

    fn msg(id: u64, sender: Sender, content: &str) -> ConversationMessage {
        ConversationMessage {
            id: MessageId(id),
            sender,
            content: content.into(),
            timestamp: 0,
        }
    }

    #[test]
    fn system_then_history_then_user() {
        let history = [
            msg(1, Sender::User, "sunset"),
            msg(2, Sender::Assistant, "{\"text\":\"SUN\"}"),
        ];
        let messages = build_messages(&history, "now cyberpunk");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1], OutboundMessage::new(Role::User, "sunset"));
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3], OutboundMessage::new(Role::User, "now cyberpunk"));
    }

    #[test]
    fn prompt_names_every_schema_field() {
        for field in [
            "\"text\"",
            "\"subtitle\"",
            "refractiveIndex",
            "rotationSpeed",
            "floatAmplitude",
            "floatSpeed",
            "spotlightColor",
            "grid|waves|particles|circuit|none",
            "static|flowing|pulsing",
        ] {
            assert!(SYSTEM_PROMPT.contains(field), "prompt is missing {field}");
        }
    }

    #[test]
    fn prompt_keeps_color_placeholders_and_closing_line() {
        assert!(SYSTEM_PROMPT.contains(r##""primary": "#hex""##));
        assert_eq!(SYSTEM_PROMPT.matches("\"#hex\"").count(), 4);
        assert!(SYSTEM_PROMPT.ends_with("Only return the JSON."));
    }
}
