//! Integration tests for the colloquy-kernel crate.
//!
//! These drive the scheduler with real behavior trees, the pattern NLU and the
//! recording platform, on tokio's paused clock.

use std::sync::Arc;
use std::time::Duration;

use colloquy_kernel::action::{
    ActionExt, add_reaction_to_request_message, message_intent_is, reply_to_message, selector,
    sequence, set_var_from, wait_for_message_from_channel, wait_for_message_from_user,
    wait_for_message_from_user_with_intents,
};
use colloquy_kernel::expr::{Const, Formatted, MessageText};
use colloquy_kernel::{
    Author, ConversationOutcome, ConversationScheduler, Dispatch, ExpressionExt, HandlerRegistry,
    Message, PatternNlu, Platform, RecordingPlatform, RuntimeConfig, Scope, Type,
};

// ═══════════════════════════════════════════════════════════════════════
//  Helpers
// ═══════════════════════════════════════════════════════════════════════

fn nlu() -> Arc<PatternNlu> {
    Arc::new(
        PatternNlu::builder()
            .phrase("intent-wait", "wait for me")
            .phrase("intent-watch", "watch the channel")
            .phrase("intent-greet", "hi bot")
            .phrase("intent-ask", "ask me")
            .phrase("yes", "yes")
            .phrase("no", "no")
            .build()
            .expect("nlu"),
    )
}

fn from(user: &str, channel: &str, text: &str) -> Message {
    Message::new(Author::new(user, user.to_uppercase()), channel, text)
}

fn scheduler(handlers: HandlerRegistry) -> (ConversationScheduler, Arc<RecordingPlatform>) {
    let platform = Arc::new(RecordingPlatform::new());
    let scheduler = ConversationScheduler::new(
        handlers,
        nlu(),
        Arc::clone(&platform) as Arc<dyn Platform>,
        RuntimeConfig::default(),
    );
    (scheduler, platform)
}

/// Let spawned conversations run up to their next suspension point.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn reply(text: &str) -> colloquy_kernel::BoxAction {
    reply_to_message(Const::string(text).shared()).expect("reply")
}

// ═══════════════════════════════════════════════════════════════════════
//  Routing
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn higher_priority_expectation_wins_exactly_once() {
    let handlers = HandlerRegistry::new();
    handlers.register(
        "intent-wait",
        sequence([
            wait_for_message_from_user(30.0).boxed(),
            add_reaction_to_request_message("user"),
        ]),
    );
    handlers.register(
        "intent-watch",
        sequence([
            wait_for_message_from_channel(30.0).boxed(),
            add_reaction_to_request_message("channel"),
        ]),
    );
    let (mut sched, platform) = scheduler(handlers);

    // The channel watcher starts first, so only priority decides.
    let watcher = sched.handle_incoming_message(from("u2", "c1", "watch the channel"));
    let waiter = sched.handle_incoming_message(from("u1", "c9", "wait for me"));
    assert!(matches!(watcher, Dispatch::Started { .. }));
    assert!(matches!(waiter, Dispatch::Started { .. }));
    settle().await;
    assert_eq!(sched.pending_expectations().len(), 2);

    // From u1 *and* in c1: both expectations qualify.
    let Dispatch::Resumed { conversation, .. } =
        sched.handle_incoming_message(from("u1", "c1", "here"))
    else {
        panic!("expected a resumption");
    };
    let Dispatch::Started {
        conversation: waiter_id,
        ..
    } = waiter
    else {
        unreachable!()
    };
    assert_eq!(conversation, waiter_id);
    settle().await;

    let pending = sched.pending_expectations();
    assert_eq!(pending.len(), 1);
    assert!((pending[0].expectation.priority() - 0.5).abs() < f64::EPSILON);
    assert_eq!(platform.reactions(), vec!["user".to_string()]);

    // The watcher expires on its own.
    tokio::time::advance(Duration::from_secs(31)).await;
    settle().await;
    assert!(sched.pending_expectations().is_empty());
    let reports = sched.join_all().await;
    let outcomes: Vec<_> = reports.into_iter().map(|r| r.outcome).collect();
    assert!(outcomes.contains(&ConversationOutcome::Succeeded));
    assert!(outcomes.contains(&ConversationOutcome::Failed));
}

#[tokio::test(start_paused = true)]
async fn equal_priorities_resolve_in_creation_order() {
    let handlers = HandlerRegistry::new();
    handlers.register("intent-wait", wait_for_message_from_user(30.0).boxed());
    handlers.register(
        "intent-watch",
        wait_for_message_from_channel(30.0).with_priority(1.0).boxed(),
    );
    let (mut sched, _) = scheduler(handlers);

    let Dispatch::Started {
        conversation: older,
        ..
    } = sched.handle_incoming_message(from("u1", "c1", "wait for me"))
    else {
        panic!("waiter not started");
    };
    settle().await;
    let Dispatch::Started {
        conversation: newer,
        ..
    } = sched.handle_incoming_message(from("u2", "c2", "watch the channel"))
    else {
        panic!("watcher not started");
    };
    settle().await;

    // u1 in c2 qualifies for both, at the same priority.
    let Dispatch::Resumed { conversation, .. } =
        sched.handle_incoming_message(from("u1", "c2", "hello"))
    else {
        panic!("expected a resumption");
    };
    assert_eq!(conversation, older);

    let Dispatch::Resumed { conversation, .. } =
        sched.handle_incoming_message(from("u1", "c2", "again"))
    else {
        panic!("expected a resumption");
    };
    assert_eq!(conversation, newer);
}

#[tokio::test(start_paused = true)]
async fn satisfied_expectation_does_not_take_a_second_message() {
    let handlers = HandlerRegistry::new();
    handlers.register("intent-wait", wait_for_message_from_user(30.0).boxed());
    let (mut sched, _) = scheduler(handlers);

    sched.handle_incoming_message(from("u1", "c1", "wait for me"));
    settle().await;

    let first = sched.handle_incoming_message(from("u1", "c1", "one"));
    let second = sched.handle_incoming_message(from("u1", "c1", "two"));
    assert!(matches!(first, Dispatch::Resumed { .. }));
    assert_eq!(
        second,
        Dispatch::Ignored {
            intent: "mismatch".into()
        }
    );
}

// ═══════════════════════════════════════════════════════════════════════
//  Conversations
// ═══════════════════════════════════════════════════════════════════════

fn greet_handler() -> colloquy_kernel::BoxAction {
    let mut scope = Scope::new();
    let name = scope.local("name", Type::String).expect("local");
    let greeting = Formatted::new("Nice to meet you, {name}!", [("name", name.clone().shared())])
        .expect("template")
        .shared();

    sequence([
        reply("Hi! What's your name?"),
        selector([
            sequence([
                wait_for_message_from_user(5.0).boxed(),
                set_var_from(&name, MessageText.shared()).expect("set"),
                reply_to_message(greeting).expect("reply"),
            ]),
            reply("Too slow."),
        ]),
    ])
}

#[tokio::test(start_paused = true)]
async fn answer_within_deadline_resumes_conversation() {
    let handlers = HandlerRegistry::new();
    handlers.register("intent-greet", greet_handler());
    let (mut sched, platform) = scheduler(handlers);

    sched.handle_incoming_message(from("u1", "c1", "hi bot"));
    settle().await;
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(matches!(
        sched.handle_incoming_message(from("u1", "c1", "Bob")),
        Dispatch::Resumed { .. }
    ));
    sched.join_all().await;

    assert_eq!(
        platform.sent_texts(),
        vec!["Hi! What's your name?", "Nice to meet you, Bob!"]
    );
}

#[tokio::test(start_paused = true)]
async fn late_answer_is_not_routed_to_expired_wait() {
    let handlers = HandlerRegistry::new();
    handlers.register("intent-greet", greet_handler());
    let (mut sched, platform) = scheduler(handlers);

    sched.handle_incoming_message(from("u1", "c1", "hi bot"));
    settle().await;
    tokio::time::advance(Duration::from_secs(6)).await;
    settle().await;

    assert_eq!(
        sched.handle_incoming_message(from("u1", "c1", "Bob")),
        Dispatch::Ignored {
            intent: "mismatch".into()
        }
    );
    assert_eq!(
        platform.sent_texts(),
        vec!["Hi! What's your name?", "Too slow."]
    );
    assert_eq!(sched.active_conversations(), 0);
}

#[tokio::test(start_paused = true)]
async fn intent_wait_only_takes_matching_answers() {
    let handlers = HandlerRegistry::new();
    handlers.register(
        "intent-ask",
        sequence([
            reply("Yes or no?"),
            wait_for_message_from_user_with_intents(["yes", "no"], 10.0).boxed(),
            selector([
                sequence([message_intent_is("yes"), reply("Great.")]),
                reply("Oh well."),
            ]),
        ]),
    );
    handlers.register("mismatch", add_reaction_to_request_message("❓"));
    let (mut sched, platform) = scheduler(handlers);

    sched.handle_incoming_message(from("u1", "c1", "ask me"));
    settle().await;

    // Not one of the awaited intents: falls through to the mismatch handler.
    let dispatch = sched.handle_incoming_message(from("u1", "c1", "perhaps"));
    assert!(matches!(dispatch, Dispatch::Started { ref intent, .. } if intent == "mismatch"));

    assert!(matches!(
        sched.handle_incoming_message(from("u1", "c1", "no")),
        Dispatch::Resumed { .. }
    ));
    sched.join_all().await;

    assert_eq!(platform.sent_texts(), vec!["Yes or no?", "Oh well."]);
    assert_eq!(platform.reactions(), vec!["❓".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn failing_conversation_leaves_others_running() {
    let handlers = HandlerRegistry::new();
    handlers.register("intent-wait", wait_for_message_from_user(30.0).boxed());
    handlers.register(
        "intent-greet",
        colloquy_kernel::action::do_action(|_| {
            Err(colloquy_kernel::RuntimeError::Collaborator {
                collaborator: "memory",
                reason: "unavailable".into(),
            })
        }),
    );
    let (mut sched, _) = scheduler(handlers);

    sched.handle_incoming_message(from("u1", "c1", "wait for me"));
    sched.handle_incoming_message(from("u2", "c1", "hi bot"));
    settle().await;

    assert_eq!(sched.active_conversations(), 1);
    assert!(matches!(
        sched.handle_incoming_message(from("u1", "c1", "still here")),
        Dispatch::Resumed { .. }
    ));

    let reports = sched.join_all().await;
    assert!(reports.iter().any(|r| matches!(
        &r.outcome,
        ConversationOutcome::Errored(reason) if reason.contains("unavailable")
    )));
    assert!(
        reports
            .iter()
            .any(|r| r.outcome == ConversationOutcome::Succeeded)
    );
}
