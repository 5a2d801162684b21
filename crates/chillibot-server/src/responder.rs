//! Canned text replies

use crate::config::ResponderConfig;
use std::collections::HashMap;

/// Answers text messages from a fixed table, echoing anything else
#[derive(Debug, Clone)]
pub struct TextResponder {
    replies: HashMap<String, String>,
    echo_prefix: String,
}

impl TextResponder {
    pub fn new(config: &ResponderConfig) -> Self {
        let replies = config
            .replies
            .iter()
            .map(|(k, v)| (normalize(k), v.clone()))
            .collect();
        Self {
            replies,
            echo_prefix: config.echo_prefix.clone(),
        }
    }

    /// Reply for one inbound text
    ///
    /// Matching ignores case, surrounding whitespace and trailing `?`/`!`/`.`.
    pub fn respond(&self, text: &str) -> String {
        match self.replies.get(&normalize(text)) {
            Some(reply) => reply.clone(),
            None => format!("{}{}", self.echo_prefix, text.trim()),
        }
    }
}

fn normalize(text: &str) -> String {
    text.trim()
        .trim_end_matches(['?', '!', '.'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn responder() -> TextResponder {
        TextResponder::new(&ResponderConfig::default())
    }

    #[test]
    fn test_canned_replies() {
        let r = responder();
        assert!(r.respond("hello").starts_with("Hi there"));
        assert!(r.respond("  HELLO ").starts_with("Hi there"));
        assert_eq!(r.respond("How are you?"), r.respond("how  are you"));
        assert!(r.respond("bye").starts_with("Goodbye"));
        assert!(r.respond("Help").contains("photo"));
    }

    #[test]
    fn test_echo_fallback() {
        let r = responder();
        assert_eq!(r.respond("พริกใบหงิก"), "You said: พริกใบหงิก");
        assert_eq!(r.respond(" hello there "), "You said: hello there");
    }

    #[test]
    fn test_custom_table() {
        let mut config = ResponderConfig::default();
        config.echo_prefix = "> ".to_string();
        config.replies.insert("Sawasdee".to_string(), "สวัสดีครับ".to_string());

        let r = TextResponder::new(&config);
        assert_eq!(r.respond("sawasdee"), "สวัสดีครับ");
        assert_eq!(r.respond("other"), "> other");
    }
}
