//! Messaging leaves: outbound operations through the platform and the
//! wait-for-message nodes that suspend a conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Result, TypeResult};
use crate::expectation::{ExpectationKind, MessageExpectation};
use crate::expr::{Expr, expect_type};
use crate::types::Type;
use crate::value::Value;

use super::combinators::seconds_to_duration;
use super::{Action, BoxAction};

/// Render a message expression.  An empty result means "say nothing".
fn render(ctx: &Context, content: &Expr) -> Result<String> {
    Ok(match ctx.evaluate(content.as_ref())? {
        Value::String(s) => s,
        other => other.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

struct ReplyToMessage(Expr);

#[async_trait]
impl Action for ReplyToMessage {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let text = render(ctx, &self.0)?;
        if text.is_empty() {
            return Ok(true);
        }
        let platform = Arc::clone(ctx.platform());
        let message = ctx.message();
        // Direct channels have no reply threading.
        let sent = if message.direct {
            platform.send_message(&message.channel_id, &text).await?
        } else {
            platform.reply(message, &text).await?
        };
        ctx.set_last_answer(sent);
        Ok(true)
    }
}

/// Reply to the message being processed.
pub fn reply_to_message(content: Expr) -> TypeResult<BoxAction> {
    expect_type("reply", &Type::String, content.as_ref())?;
    Ok(Arc::new(ReplyToMessage(content)))
}

struct SendMessageToChannel(Expr);

#[async_trait]
impl Action for SendMessageToChannel {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let text = render(ctx, &self.0)?;
        if text.is_empty() {
            return Ok(true);
        }
        let platform = Arc::clone(ctx.platform());
        let sent = platform
            .send_message(&ctx.message().channel_id, &text)
            .await?;
        ctx.set_last_answer(sent);
        Ok(true)
    }
}

/// Post to the channel of the message being processed.
pub fn send_message_to_channel(content: Expr) -> TypeResult<BoxAction> {
    expect_type("channel message", &Type::String, content.as_ref())?;
    Ok(Arc::new(SendMessageToChannel(content)))
}

struct EditLastAnswer(Expr);

#[async_trait]
impl Action for EditLastAnswer {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let text = render(ctx, &self.0)?;
        if text.is_empty() {
            return Ok(true);
        }
        let Some(last) = ctx.last_answer().cloned() else {
            tracing::warn!(conversation = %ctx.id(), "no answer to edit");
            return Ok(false);
        };
        let platform = Arc::clone(ctx.platform());
        let edited = platform.edit_message(&last, &text).await?;
        ctx.set_last_answer(edited);
        Ok(true)
    }
}

/// Replace the content of this conversation's last answer.
///
/// Fails when the conversation has not answered yet.
pub fn edit_last_answer(content: Expr) -> TypeResult<BoxAction> {
    expect_type("edited message", &Type::String, content.as_ref())?;
    Ok(Arc::new(EditLastAnswer(content)))
}

struct ReactToRequest(String);

#[async_trait]
impl Action for ReactToRequest {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        if self.0.is_empty() {
            return Ok(true);
        }
        let message = ctx.message();
        ctx.platform()
            .add_reaction(&message.channel_id, &message.id, &self.0)
            .await?;
        Ok(true)
    }
}

pub fn add_reaction_to_request_message(reaction: impl Into<String>) -> BoxAction {
    Arc::new(ReactToRequest(reaction.into()))
}

struct ReactToReply(String);

#[async_trait]
impl Action for ReactToReply {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        if self.0.is_empty() {
            return Ok(true);
        }
        if let Some(answer) = ctx.last_answer() {
            ctx.platform()
                .add_reaction(&answer.channel_id, &answer.id, &self.0)
                .await?;
        }
        Ok(true)
    }
}

/// React to this conversation's last answer, if there is one.
pub fn add_reaction_to_reply_message(reaction: impl Into<String>) -> BoxAction {
    Arc::new(ReactToReply(reaction.into()))
}

struct MessageIntentIs(String);

#[async_trait]
impl Action for MessageIntentIs {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        Ok(ctx.intent().is_some_and(|m| m.intent == self.0))
    }
}

/// Succeeds when the last matched intent is `intent`.
pub fn message_intent_is(intent: impl Into<String>) -> BoxAction {
    Arc::new(MessageIntentIs(intent.into()))
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum WaitTarget {
    Author,
    AuthorWithIntents(Vec<String>),
    Channel,
}

/// Suspend until a qualifying message arrives or the wait times out.
///
/// On delivery the context's current message (and, for intent waits, the
/// matched intent) is replaced and the node succeeds; on timeout it fails.
#[derive(Debug, Clone)]
pub struct WaitForMessage {
    target: WaitTarget,
    timeout: Duration,
    priority: Option<f64>,
}

impl WaitForMessage {
    /// Override the kind's default priority.
    #[must_use]
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    fn expectation_kind(&self, ctx: &Context) -> ExpectationKind {
        let message = ctx.message();
        match &self.target {
            WaitTarget::Author => ExpectationKind::FromUser {
                user_id: message.author.id.clone(),
            },
            WaitTarget::AuthorWithIntents(intents) => ExpectationKind::FromUserWithIntents {
                user_id: message.author.id.clone(),
                intents: intents.clone(),
            },
            WaitTarget::Channel => ExpectationKind::FromChannel {
                channel_id: message.channel_id.clone(),
            },
        }
    }
}

#[async_trait]
impl Action for WaitForMessage {
    async fn run(&self, ctx: &mut Context) -> Result<bool> {
        let kind = self.expectation_kind(ctx);
        let priority = self.priority.unwrap_or_else(|| kind.default_priority());
        let (expectation, delivered) = MessageExpectation::new(kind, priority, self.timeout);
        let expectation = Arc::new(expectation);
        let deadline = expectation.expires_at();

        tracing::debug!(
            conversation = %ctx.id(),
            expectation = %expectation.id(),
            kind = ?expectation.kind(),
            priority,
            timeout_ms = self.timeout.as_millis() as u64,
            "waiting for message"
        );
        let _guard = ctx.expectations().register(Arc::clone(&expectation));

        match tokio::time::timeout_at(deadline, delivered).await {
            Ok(Ok(delivery)) => {
                ctx.accept_delivery(delivery);
                Ok(true)
            }
            Ok(Err(_closed)) => Ok(false),
            Err(_elapsed) => {
                tracing::debug!(
                    conversation = %ctx.id(),
                    expectation = %expectation.id(),
                    "wait timed out"
                );
                Ok(false)
            }
        }
    }
}

fn wait(target: WaitTarget, seconds: f64) -> WaitForMessage {
    WaitForMessage {
        target,
        timeout: seconds_to_duration(seconds),
        priority: None,
    }
}

/// Wait for the current message's author to say anything (priority 1.0).
pub fn wait_for_message_from_user(seconds: f64) -> WaitForMessage {
    wait(WaitTarget::Author, seconds)
}

/// Wait for the current message's author to say something the NLU matches to
/// one of `intents` (priority 1.0).  The match becomes the context's intent.
pub fn wait_for_message_from_user_with_intents<I, S>(intents: I, seconds: f64) -> WaitForMessage
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    wait(
        WaitTarget::AuthorWithIntents(intents.into_iter().map(Into::into).collect()),
        seconds,
    )
}

/// Wait for anyone to post in the current channel (priority 0.5).
pub fn wait_for_message_from_channel(seconds: f64) -> WaitForMessage {
    wait(WaitTarget::Channel, seconds)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Author, Message};
    use crate::expectation::ExpectationBoard;
    use crate::expr::{Const, ExpressionExt, MessageText};
    use crate::nlu::{IntentMatch, PatternNlu};
    use crate::platform::{Outbound, RecordingPlatform};

    fn setup(message: Message) -> (Context, Arc<RecordingPlatform>) {
        let platform = Arc::new(RecordingPlatform::new());
        (Context::new(message, platform.clone()), platform)
    }

    fn alice(text: &str) -> Message {
        Message::new(Author::new("u1", "Alice"), "general", text)
    }

    /// Satisfy the first expectation on `board` that claims `message`.
    async fn deliver(board: Arc<ExpectationBoard>, message: Message, nlu: &PatternNlu) {
        loop {
            let active = board.active(tokio::time::Instant::now());
            if let Some(delivery) = active.first().and_then(|e| e.claim(&message, nlu)) {
                assert!(active[0].satisfy(delivery));
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn reply_records_last_answer() {
        let (mut ctx, platform) = setup(alice("hi"));
        let reply = reply_to_message(Const::string("hello Alice").shared()).unwrap();
        assert!(reply.run(&mut ctx).await.unwrap());

        assert!(matches!(&platform.outbound()[0], Outbound::Reply { content, .. } if content == "hello Alice"));
        assert_eq!(ctx.last_answer().unwrap().content, "hello Alice");
    }

    #[tokio::test]
    async fn reply_in_direct_channel_is_a_plain_send() {
        let (mut ctx, platform) = setup(alice("hi").direct());
        reply_to_message(MessageText.shared())
            .unwrap()
            .run(&mut ctx)
            .await
            .unwrap();
        assert!(matches!(&platform.outbound()[0], Outbound::Sent { .. }));
    }

    #[tokio::test]
    async fn empty_content_sends_nothing() {
        let (mut ctx, platform) = setup(alice("hi"));
        let send = send_message_to_channel(Const::string("").shared()).unwrap();
        assert!(send.run(&mut ctx).await.unwrap());
        assert!(platform.outbound().is_empty());
    }

    #[test]
    fn outbound_content_must_be_a_string() {
        assert!(reply_to_message(Const::number(1.0).shared()).is_err());
    }

    #[tokio::test]
    async fn edit_requires_a_previous_answer() {
        let (mut ctx, platform) = setup(alice("hi"));
        let edit = edit_last_answer(Const::string("edited").shared()).unwrap();
        assert!(!edit.run(&mut ctx).await.unwrap());

        send_message_to_channel(Const::string("draft").shared())
            .unwrap()
            .run(&mut ctx)
            .await
            .unwrap();
        assert!(edit.run(&mut ctx).await.unwrap());
        assert_eq!(platform.sent_texts(), ["draft", "edited"]);
    }

    #[tokio::test]
    async fn reactions() {
        let (mut ctx, platform) = setup(alice("hi"));
        add_reaction_to_reply_message("👀").run(&mut ctx).await.unwrap();
        assert!(platform.reactions().is_empty());

        add_reaction_to_request_message("❓").run(&mut ctx).await.unwrap();
        send_message_to_channel(Const::string("ok").shared())
            .unwrap()
            .run(&mut ctx)
            .await
            .unwrap();
        add_reaction_to_reply_message("👀").run(&mut ctx).await.unwrap();
        assert_eq!(platform.reactions(), ["❓", "👀"]);
    }

    #[tokio::test]
    async fn intent_check() {
        let (ctx, _) = setup(alice("hi"));
        let mut ctx = ctx.with_intent(IntentMatch::new("yes", 0.9));
        assert!(message_intent_is("yes").run(&mut ctx).await.unwrap());
        assert!(!message_intent_is("no").run(&mut ctx).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_times_out_as_failure_and_cleans_up() {
        let (mut ctx, _) = setup(alice("hi"));
        let start = tokio::time::Instant::now();
        let ok = wait_for_message_from_user(5.0).run(&mut ctx).await.unwrap();
        assert!(!ok);
        assert_eq!(start.elapsed(), Duration::from_secs(5));
        assert!(ctx.expectations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_resumes_with_delivered_message() {
        let nlu = PatternNlu::builder().build().unwrap();
        let (mut ctx, _) = setup(alice("how are you?"));
        let board = Arc::clone(ctx.expectations());
        let answer = alice("fine, thanks");

        let wait = wait_for_message_from_user(10.0);
        let (ok, ()) = tokio::join!(wait.run(&mut ctx), deliver(board, answer, &nlu));
        assert!(ok.unwrap());
        assert_eq!(ctx.message().content, "fine, thanks");
    }

    #[tokio::test(start_paused = true)]
    async fn intent_wait_binds_the_match() {
        let nlu = PatternNlu::builder()
            .phrase("yes", "yes")
            .phrase("no", "no")
            .build()
            .unwrap();
        let (mut ctx, _) = setup(alice("are you sure?"));
        let board = Arc::clone(ctx.expectations());

        let wait = wait_for_message_from_user_with_intents(["yes", "no"], 5.0);
        let (ok, ()) = tokio::join!(wait.run(&mut ctx), deliver(board, alice("no"), &nlu));
        assert!(ok.unwrap());
        assert_eq!(ctx.intent().unwrap().intent, "no");
    }

    #[tokio::test(start_paused = true)]
    async fn priority_defaults_and_override() {
        let (mut ctx, _) = setup(alice("hi"));
        let board = Arc::clone(ctx.expectations());

        let probe = async {
            tokio::task::yield_now().await;
            let active = board.active(tokio::time::Instant::now());
            active.iter().map(|e| e.priority()).collect::<Vec<_>>()
        };
        let wait = wait_for_message_from_channel(1.0).with_priority(0.7);
        let (_, seen) = tokio::join!(wait.run(&mut ctx), probe);
        assert_eq!(seen, [0.7]);
        assert_eq!(wait_for_message_from_channel(1.0).expectation_kind(&ctx).default_priority(), 0.5);
    }
}
