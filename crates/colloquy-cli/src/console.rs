//! Console message platform.
//!
//! Inbound: every stdin line is a message from the current console user.  A
//! line of the form `name: text` switches the current user to `name` first,
//! so one terminal can play several people.  `/quit` ends the session.
//!
//! Outbound: bot messages, edits and reactions are printed one per line.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use colloquy_kernel::{Author, Message, Platform, RuntimeError, SentMessage};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// One parsed console line.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Message(Message),
    /// Blank line or a bare user switch.
    Nothing,
    Quit,
}

/// Turns console lines into messages.
#[derive(Debug)]
pub struct ConsoleSession {
    author: Author,
    channel: String,
    received: u64,
}

impl ConsoleSession {
    pub fn new(user: &str, channel: impl Into<String>) -> Self {
        Self {
            author: author_named(user),
            channel: channel.into(),
            received: 0,
        }
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn read(&mut self, line: &str) -> Input {
        let line = line.trim();
        if matches!(line, "/quit" | "/exit") {
            return Input::Quit;
        }

        let text = match line.split_once(':') {
            Some((name, rest)) if is_user_name(name) => {
                let name = name.trim();
                if name != self.author.name {
                    tracing::debug!(user = %name, "console user switched");
                    self.author = author_named(name);
                }
                rest.trim()
            }
            _ => line,
        };
        if text.is_empty() {
            return Input::Nothing;
        }

        self.received += 1;
        let mut message = Message::new(self.author.clone(), self.channel.clone(), text);
        message.id = format!("m{}", self.received);
        Input::Message(message)
    }
}

fn is_user_name(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty()
        && s.len() <= 32
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn author_named(name: &str) -> Author {
    Author::new(name.to_lowercase(), name)
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// [`Platform`] that prints to a writer, stdout by default.
pub struct ConsolePlatform {
    out: Mutex<Box<dyn Write + Send>>,
    sent: AtomicU64,
}

impl ConsolePlatform {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            sent: AtomicU64::new(0),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    fn next_id(&self) -> String {
        format!("b{}", self.sent.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn emit(&self, operation: &'static str, line: &str) -> Result<(), RuntimeError> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(out, "{line}")
            .and_then(|()| out.flush())
            .map_err(|e| RuntimeError::Platform {
                operation,
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Platform for ConsolePlatform {
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<SentMessage, RuntimeError> {
        let id = self.next_id();
        self.emit("send", &format!("[#{channel_id}] bot ({id}): {content}"))?;
        Ok(SentMessage::new(id, channel_id, content))
    }

    async fn reply(&self, message: &Message, content: &str) -> Result<SentMessage, RuntimeError> {
        let id = self.next_id();
        self.emit(
            "reply",
            &format!(
                "[#{}] bot ({id}) -> {}: {content}",
                message.channel_id, message.author.name
            ),
        )?;
        Ok(SentMessage::new(id, &message.channel_id, content))
    }

    async fn edit_message(
        &self,
        message: &SentMessage,
        content: &str,
    ) -> Result<SentMessage, RuntimeError> {
        self.emit(
            "edit",
            &format!("[#{}] bot ({} edited): {content}", message.channel_id, message.id),
        )?;
        Ok(SentMessage::new(message.id.clone(), &message.channel_id, content))
    }

    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        reaction: &str,
    ) -> Result<(), RuntimeError> {
        self.emit(
            "react",
            &format!("[#{channel_id}] bot reacted {reaction} to {message_id}"),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn lines_become_messages_from_current_user() {
        let mut session = ConsoleSession::new("you", "general");
        let Input::Message(first) = session.read("hello there") else {
            panic!("expected a message");
        };
        assert_eq!(first.author.id, "you");
        assert_eq!(first.channel_id, "general");
        assert_eq!(first.id, "m1");

        let Input::Message(second) = session.read("Bob: yes") else {
            panic!("expected a message");
        };
        assert_eq!(second.author.name, "Bob");
        assert_eq!(second.author.id, "bob");
        assert_eq!(second.content, "yes");

        // The switch sticks.
        let Input::Message(third) = session.read("no") else {
            panic!("expected a message");
        };
        assert_eq!(third.author.name, "Bob");
    }

    #[test]
    fn special_lines() {
        let mut session = ConsoleSession::new("you", "general");
        assert_eq!(session.read("   "), Input::Nothing);
        assert_eq!(session.read("alice:"), Input::Nothing);
        assert_eq!(session.author().name, "alice");
        assert_eq!(session.read("/quit"), Input::Quit);

        // Not a user name: the colon is part of the text.
        let Input::Message(m) = session.read("note to self: buy milk") else {
            panic!("expected a message");
        };
        assert_eq!(m.content, "note to self: buy milk");
        assert_eq!(m.author.name, "alice");
    }

    #[tokio::test]
    async fn prints_outbound_operations() {
        let captured = Captured::default();
        let platform = ConsolePlatform::new(Box::new(captured.clone()));
        let incoming = Message::new(Author::new("bob", "Bob"), "general", "hi");

        let sent = platform.send_message("general", "Who's in?").await.unwrap();
        platform.reply(&incoming, "hey Bob").await.unwrap();
        platform.edit_message(&sent, "Who's in? Bob").await.unwrap();
        platform.add_reaction("general", "m1", "👍").await.unwrap();

        assert_eq!(
            captured.text(),
            "[#general] bot (b1): Who's in?\n\
             [#general] bot (b2) -> Bob: hey Bob\n\
             [#general] bot (b1 edited): Who's in? Bob\n\
             [#general] bot reacted 👍 to m1\n"
        );
    }
}
