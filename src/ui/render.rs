//! Plain-text rendering of conversations

use crate::types::{ConversationSummary, Message, Sender};

/// Longest title shown in the conversation list
const LIST_TITLE_CHARS: usize = 30;

fn shorten(title: &str, max: usize) -> String {
    match title.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &title[..cut]),
        None => title.to_string(),
    }
}

pub fn conversation_list(conversations: &[ConversationSummary], active: Option<&str>) -> String {
    if conversations.is_empty() {
        return "No chats yet.".to_string();
    }

    let mut out = String::from("Chats\n");
    for (index, conversation) in conversations.iter().enumerate() {
        let marker = if active == Some(conversation.id.as_str()) { '*' } else { ' ' };
        out.push_str(&format!(
            "{} {:>2}. {} ({} messages, {})\n",
            marker,
            index + 1,
            shorten(&conversation.title, LIST_TITLE_CHARS),
            conversation.message_count,
            conversation.created_at.format("%Y-%m-%d %H:%M"),
        ));
    }
    out
}

fn speaker(sender: &Sender) -> &str {
    match sender {
        Sender::User => "You",
        Sender::Assistant => "Gemini",
        Sender::Other(tag) => tag,
    }
}

pub fn message(message: &Message) -> String {
    format!("{}: \n{}\n", speaker(&message.sender), message.text)
}
