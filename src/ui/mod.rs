//! Terminal front-end
//!
//! A line-oriented stand-in for the chat window: reads commands and turns
//! from stdin, prints the conversation list and message stream to stdout.

pub mod commands;
pub mod render;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::AppState;
use crate::chat::ReplyEvent;
use crate::error::ChatError;
use crate::responder::Responder;
use crate::storage::StorageError;
use crate::types::ConversationSummary;
use commands::Command;

const HELP: &str = "\
Type a message to chat. Commands:
  /new            start a new chat
  /list           list chats, newest first
  /open <n|id>    switch to a chat by list number or id prefix
  /rename <title> rename the current chat
  /show           print the current chat
  /quit           leave (waits for pending replies)";

/// Pick a conversation by 1-based list position or by unique id prefix.
pub fn resolve_conversation<'a>(
    conversations: &'a [ConversationSummary],
    selector: &str,
) -> Result<&'a str, String> {
    if let Ok(position) = selector.parse::<usize>() {
        if let Some(conversation) = position.checked_sub(1).and_then(|i| conversations.get(i)) {
            return Ok(&conversation.id);
        }
    }

    let mut matches = conversations.iter().filter(|c| c.id.starts_with(selector));
    match (matches.next(), matches.next()) {
        (Some(conversation), None) => Ok(&conversation.id),
        (None, _) => Err(format!("no chat matches '{}'", selector)),
        (Some(_), Some(_)) => Err(format!("'{}' matches more than one chat", selector)),
    }
}

fn print_conversation<R: Responder>(app: &AppState<R>, conversation_id: &str) {
    let Some(conversation) = app.store().conversation(conversation_id) else {
        return;
    };
    println!("== {} ==", conversation.title);
    for message in conversation.messages.values() {
        println!("{}", render::message(message));
    }
}

/// Apply one command. Returns `false` when the user wants to leave.
fn handle_command<R: Responder>(app: &mut AppState<R>, command: Command) -> bool {
    let result = match command {
        Command::Quit => return false,
        Command::Help => {
            println!("{}", HELP);
            Ok(())
        }
        Command::New => app.controller.new_conversation().map(|_| {
            println!("Started a new chat.");
        }),
        Command::List => {
            let conversations = app.store().list_conversations();
            print!(
                "{}",
                render::conversation_list(&conversations, app.controller.active_conversation())
            );
            Ok(())
        }
        Command::Open(selector) => {
            let conversations = app.store().list_conversations();
            match resolve_conversation(&conversations, &selector) {
                Ok(id) => {
                    let id = id.to_string();
                    app.controller
                        .select_conversation(&id)
                        .map(|_| print_conversation(app, &id))
                }
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(())
                }
            }
        }
        Command::Rename(title) => match app.controller.active_conversation() {
            Some(id) => {
                let id = id.to_string();
                app.store().rename_conversation(&id, &title)
            }
            None => {
                println!("Please start a new chat or select an existing one.");
                Ok(())
            }
        },
        Command::Show => {
            if let Some(id) = app.controller.active_conversation() {
                print_conversation(app, id);
            }
            Ok(())
        }
        Command::Say(text) => match app.controller.active_conversation() {
            Some(id) => {
                let id = id.to_string();
                app.controller
                    .submit_user_turn(&id, &text)
                    .map(|recorded| warn_unsaved(recorded.saved))
            }
            None => {
                println!("Please start a new chat or select an existing one.");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        tracing::debug!("Command failed: {}", e);
        eprintln!("Error: {}", e);
    }
    true
}

fn unsaved_warning(saved: Result<(), StorageError>) -> Option<String> {
    saved
        .err()
        .map(|e| format!("Warning: {} (kept in memory)", ChatError::from(e)))
}

fn warn_unsaved(saved: Result<(), StorageError>) {
    if let Some(warning) = unsaved_warning(saved) {
        eprintln!("{}", warning);
    }
}

/// Apply a finished responder call.
///
/// Returns the line for the message stream and the line for stderr. A reply
/// that could not be written to disk is still shown.
fn reply_output<R: Responder>(
    app: &mut AppState<R>,
    event: ReplyEvent,
) -> (Option<String>, Option<String>) {
    let conversation_id = event.conversation_id.clone();
    let recorded = match app.controller.apply_reply(event) {
        Ok(recorded) => recorded,
        Err(e) => return (None, Some(format!("Error: {}", e))),
    };

    let shown = if app.controller.active_conversation() != Some(conversation_id.as_str()) {
        Some("(new reply in another chat)".to_string())
    } else {
        app.store()
            .conversation(&conversation_id)
            .and_then(|c| c.messages.get(&recorded.message_id).map(render::message))
    };
    (shown, unsaved_warning(recorded.saved))
}

fn handle_reply<R: Responder>(app: &mut AppState<R>, event: ReplyEvent) {
    let (shown, problem) = reply_output(app, event);
    if let Some(line) = shown {
        println!("{}", line);
    }
    if let Some(line) = problem {
        eprintln!("{}", line);
    }
}

/// Run the interactive loop until `/quit` or end of input.
pub async fn run<R: Responder>(app: &mut AppState<R>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let latest = app.store().list_conversations().into_iter().next();
    if let Some(latest) = latest {
        if app.controller.select_conversation(&latest.id).is_ok() {
            print_conversation(app, &latest.id);
        }
    }
    println!("{}", HELP);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match commands::parse(&line) {
                    None => {}
                    Some(Err(e)) => eprintln!("{}", e),
                    Some(Ok(command)) => {
                        if !handle_command(app, command) {
                            break;
                        }
                    }
                }
            }
            Some(event) = app.controller.next_event() => handle_reply(app, event),
        }
    }

    // In-flight calls cannot be cancelled; keep their replies
    while app.controller.pending_replies() > 0 {
        match app.controller.next_event().await {
            Some(event) => handle_reply(app, event),
            None => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::ResponderError;
    use crate::storage::settings::AppSettings;
    use async_trait::async_trait;
    use chrono::Utc;
    use tempfile::tempdir;

    struct PongResponder;

    #[async_trait]
    impl Responder for PongResponder {
        type Session = ();

        fn start_session(&self) -> Self::Session {}

        async fn send(&self, _session: &(), text: &str) -> Result<String, ResponderError> {
            if text.contains("fail") {
                return Err(ResponderError::EmptyResponse);
            }
            Ok("pong".to_string())
        }
    }

    fn app_in(dir: &tempfile::TempDir) -> AppState<PongResponder> {
        let settings = AppSettings {
            history_file: Some(dir.path().join("history.json")),
            ..AppSettings::default()
        };
        AppState::new(settings, PongResponder)
    }

    async fn next_output(app: &mut AppState<PongResponder>) -> (Option<String>, Option<String>) {
        let event = app.controller.next_event().await.expect("reply channel closed");
        reply_output(app, event)
    }

    fn summaries(ids: &[&str]) -> Vec<ConversationSummary> {
        ids.iter()
            .map(|id| ConversationSummary {
                id: id.to_string(),
                title: "t".to_string(),
                created_at: Utc::now(),
                message_count: 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_reply_shown_in_active_chat() {
        let dir = tempdir().unwrap();
        let mut app = app_in(&dir);
        let id = app.controller.new_conversation().unwrap();

        app.controller.submit_user_turn(&id, "ping").unwrap();
        let (shown, problem) = next_output(&mut app).await;
        assert!(shown.unwrap().contains("pong"));
        assert_eq!(problem, None);
    }

    #[tokio::test]
    async fn test_unsaved_reply_is_still_shown() {
        let dir = tempdir().unwrap();
        let mut app = app_in(&dir);
        let id = app.controller.new_conversation().unwrap();

        let path = app.store().path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let submitted = app.controller.submit_user_turn(&id, "ping").unwrap();
        assert!(unsaved_warning(submitted.saved).is_some());

        let (shown, problem) = next_output(&mut app).await;
        assert!(shown.unwrap().contains("pong"));
        let problem = problem.unwrap();
        assert!(problem.starts_with("Warning: Failed to save chat history"));
    }

    #[tokio::test]
    async fn test_reply_for_inactive_chat_and_failed_call() {
        let dir = tempdir().unwrap();
        let mut app = app_in(&dir);
        let first = app.controller.new_conversation().unwrap();
        app.controller.submit_user_turn(&first, "ping").unwrap();
        app.controller.new_conversation().unwrap();

        let (shown, problem) = next_output(&mut app).await;
        assert_eq!(shown.as_deref(), Some("(new reply in another chat)"));
        assert_eq!(problem, None);

        app.controller.submit_user_turn(&first, "please fail").unwrap();
        let (shown, problem) = next_output(&mut app).await;
        assert_eq!(shown, None);
        assert!(problem.unwrap().starts_with("Error: Failed to get response"));
    }

    #[test]
    fn test_resolve_by_position() {
        let list = summaries(&["aaa", "bbb"]);
        assert_eq!(resolve_conversation(&list, "2"), Ok("bbb"));
    }

    #[test]
    fn test_resolve_by_prefix() {
        let list = summaries(&["abc-1", "abd-2", "x9"]);
        assert_eq!(resolve_conversation(&list, "abd"), Ok("abd-2"));
        assert!(resolve_conversation(&list, "ab").is_err());
        assert!(resolve_conversation(&list, "zzz").is_err());
        // Out-of-range numbers fall back to prefix matching
        assert_eq!(resolve_conversation(&summaries(&["7f"]), "7"), Ok("7f"));
    }
}
