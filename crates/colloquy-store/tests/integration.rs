//! Integration tests for the colloquy-store crate.
//!
//! These run memory-backed conversations through the kernel scheduler against
//! a real JSON file on disk (via tempfile).

use std::sync::Arc;
use std::time::Duration;

use colloquy_kernel::action::{ActionExt, reply_to_message, selector, sequence, wait_for_message_from_user};
use colloquy_kernel::expr::{Const, Formatted, MessageText};
use colloquy_kernel::{
    Author, BoxAction, ConversationScheduler, ExpressionExt, HandlerRegistry, Message, PatternNlu,
    Platform, RecordingPlatform, RuntimeConfig, Scope, Type,
};
use colloquy_store::{JsonFileStore, Memory, MemoryStore};

fn handlers(memory: &Memory) -> HandlerRegistry {
    let mut scope = Scope::new();
    let name = scope.local("name", Type::String).unwrap();

    let remember = sequence([
        reply_to_message(Const::string("What should I call you?").shared()).unwrap(),
        wait_for_message_from_user(10.0).boxed(),
        memory.set_user_var("name", MessageText.shared()).unwrap(),
        reply_to_message(Const::string("Got it.").shared()).unwrap(),
    ]);

    let whoami: BoxAction = selector([
        sequence([
            memory.check_user_var_exists("name"),
            memory.copy_user_var_to_local("name", &name).unwrap(),
            reply_to_message(
                Formatted::new("You are {name}.", [("name", name.clone().shared())])
                    .unwrap()
                    .shared(),
            )
            .unwrap(),
        ]),
        reply_to_message(Const::string("I don't know you yet.").shared()).unwrap(),
    ]);

    let registry = HandlerRegistry::new();
    registry.register("intent-remember", remember);
    registry.register("intent-whoami", whoami);
    registry
}

fn scheduler(memory: &Memory) -> (ConversationScheduler, Arc<RecordingPlatform>) {
    let nlu = PatternNlu::builder()
        .phrase("intent-remember", "remember me")
        .phrase("intent-whoami", "who am i")
        .build()
        .unwrap();
    let platform = Arc::new(RecordingPlatform::new());
    let scheduler = ConversationScheduler::new(
        handlers(memory),
        Arc::new(nlu),
        Arc::clone(&platform) as Arc<dyn Platform>,
        RuntimeConfig::default(),
    );
    (scheduler, platform)
}

fn from(user: &str, text: &str) -> Message {
    Message::new(Author::new(user, user), "general", text)
}

#[tokio::test]
async fn remembered_name_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");

    {
        let store = JsonFileStore::open(&path).await.unwrap();
        let memory = Memory::new(Arc::new(store));
        let (mut sched, platform) = scheduler(&memory);

        sched.handle_incoming_message(from("u1", "remember me"));
        tokio::time::sleep(Duration::from_millis(10)).await;
        sched.handle_incoming_message(from("u1", "Ada"));
        sched.join_all().await;

        assert_eq!(platform.sent_texts(), vec!["What should I call you?", "Got it."]);
    }

    let store = JsonFileStore::open(&path).await.unwrap();
    assert_eq!(store.get("u1-name").await.unwrap().as_deref(), Some("Ada"));

    let memory = Memory::new(Arc::new(store));
    let (mut sched, platform) = scheduler(&memory);
    sched.handle_incoming_message(from("u1", "who am i"));
    sched.handle_incoming_message(from("u2", "who am i"));
    sched.join_all().await;

    let mut texts = platform.sent_texts();
    texts.sort();
    assert_eq!(texts, vec!["I don't know you yet.", "You are Ada."]);
}

#[tokio::test]
async fn file_contents_are_a_plain_json_object() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");

    let store = JsonFileStore::open(&path).await.unwrap();
    store.set("u1-name", "Ada").await.unwrap();
    store.set("motd", "hello").await.unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["u1-name"], "Ada");
    assert_eq!(parsed["motd"], "hello");
}
