//! Bundled demo scenarios.
//!
//! | Intent                     | Trigger                     | Behavior                        |
//! |----------------------------|-----------------------------|---------------------------------|
//! | `mismatch`                 | nothing matched             | react with ❓                    |
//! | `intent-hello`             | "hi", "hello, I'm Ada"      | random greeting                 |
//! | `intent-what-do-you-think` | yes/no questions            | random verdict                  |
//! | `intent-dialog-test`       | "dialog test"               | yes/no question, two attempts   |
//! | `intent-gather-test`       | "gather", "who's in"        | collect names for 25 seconds    |
//! | `intent-remember`          | "remember me", "call me X"  | store the user's name           |
//! | `intent-whoami`            | "who am i"                  | recall the stored name          |
//!
//! `yes` and `no` are not context-free; they only resume the dialog test.

use anyhow::{Context as _, Result};
use colloquy_kernel::action::{
    ActionExt, add_reaction_to_request_message, always_fail, edit_last_answer,
    message_intent_is, random_one_of, repeat_until_timer_expires, reply_to_message,
    retry_until_success, selector, send_message_to_channel, sequence, set_var_from,
    wait_for_message_from_channel, wait_for_message_from_user,
    wait_for_message_from_user_with_intents,
};
use colloquy_kernel::expr::{
    Appended, AuthorName, Const, Fallback, Formatted, JoinedString, MessageText, SlotValue,
};
use colloquy_kernel::{
    BoxAction, ExpressionExt, HandlerRegistry, PatternNlu, RuntimeConfig, Scope, Type, TypeResult,
    Value,
};
use colloquy_store::Memory;

/// Seconds the gather scenario keeps collecting names.
const GATHER_SECONDS: f64 = 25.0;
/// Seconds of silence after which the gather scenario nudges the channel.
const GATHER_IDLE_SECONDS: f64 = 10.0;
/// Seconds the dialog test waits for each answer.
const DIALOG_ANSWER_SECONDS: f64 = 5.0;

/// Handlers plus the NLU that recognises their intents.
pub struct Bundle {
    pub handlers: HandlerRegistry,
    pub nlu: PatternNlu,
}

/// Assemble every scenario.  Any ill-typed tree is reported here, before a
/// single message is handled.
pub fn build(memory: &Memory, config: &RuntimeConfig) -> Result<Bundle> {
    let handlers = HandlerRegistry::new();
    let scenarios: [(&str, TypeResult<BoxAction>); 7] = [
        (config.mismatch_intent.as_str(), Ok(mismatch())),
        ("intent-hello", hello()),
        ("intent-what-do-you-think", what_do_you_think()),
        ("intent-dialog-test", dialog_test()),
        ("intent-gather-test", gather_test()),
        ("intent-remember", remember(memory, config.default_wait_seconds)),
        ("intent-whoami", whoami(memory)),
    ];
    for (intent, tree) in scenarios {
        let tree = tree.with_context(|| format!("scenario `{intent}` is ill-typed"))?;
        handlers.register(intent, tree);
    }

    let nlu = nlu().context("failed to build the pattern NLU")?;
    tracing::info!(handlers = handlers.len(), "scenarios loaded");
    Ok(Bundle { handlers, nlu })
}

fn nlu() -> Result<PatternNlu, colloquy_kernel::ConfigError> {
    PatternNlu::builder()
        .pattern(
            "intent-hello",
            r"^\s*(?:hi|hello|hey)\b(?:[,!]?\s+i'?m\s+(?P<name>\w+))?",
        )?
        .phrase("intent-what-do-you-think", "what do you think")
        .pattern(
            "intent-what-do-you-think",
            r"^\s*(?:is|are|will|do|does|can|should|would)\b.*\?\s*$",
        )?
        .phrase("intent-dialog-test", "dialog test")
        .phrase("intent-gather-test", "gather")
        .phrase("intent-gather-test", "who's in")
        .phrase("intent-remember", "remember me")
        .pattern(
            "intent-remember",
            r"\b(?:call me|my name is)\s+(?P<name>\w+)",
        )?
        .phrase("intent-whoami", "who am i")
        .pattern("yes", r"^\s*(?:yes|yeah|yep|sure|of course)\b")?
        .pattern("no", r"^\s*(?:no|nope|nah|never)\b")?
        .build()
}

fn reply(text: &str) -> TypeResult<BoxAction> {
    reply_to_message(Const::string(text).shared())
}

fn replies<'a>(texts: impl IntoIterator<Item = &'a str>) -> TypeResult<Vec<BoxAction>> {
    texts.into_iter().map(reply).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

fn mismatch() -> BoxAction {
    add_reaction_to_request_message("❓")
}

fn hello() -> TypeResult<BoxAction> {
    let name = Fallback::new(
        Type::String,
        SlotValue::new("name").shared(),
        AuthorName.shared(),
    )?
    .shared();
    let mut options = replies(["hey", "hi there", "greetings"])?;
    options.push(reply_to_message(
        Formatted::new("Hello, {name}!", [("name", name)])?.shared(),
    )?);
    Ok(random_one_of(options))
}

fn what_do_you_think() -> TypeResult<BoxAction> {
    Ok(random_one_of(replies([
        "of course",
        "definitely",
        "naturally",
        "maybe",
        "in theory",
        "the odds are decent",
        "I wouldn't count on it",
        "doubtful",
        "no way",
        "are you kidding?",
        "I won't answer that",
    ])?))
}

fn dialog_test() -> TypeResult<BoxAction> {
    Ok(sequence([
        reply("Just tell me: yes or no?")?,
        retry_until_success(
            2,
            sequence([
                wait_for_message_from_user_with_intents(["yes", "no"], DIALOG_ANSWER_SECONDS)
                    .boxed(),
                selector([
                    sequence([message_intent_is("yes"), reply("OK")?]),
                    sequence([message_intent_is("no"), reply("No it is")?]),
                    always_fail(random_one_of(replies([
                        "What was that supposed to mean?",
                        "\"Yes\" or \"no\", is that so hard?",
                    ])?)),
                ]),
            ]),
        ),
    ]))
}

fn gather_test() -> TypeResult<BoxAction> {
    let mut scope = Scope::new();
    let gathered = scope.local("gathered", Type::array(Type::String))?;

    let nobody = Const::new(Type::array(Type::String), Value::Array(Vec::new()))?.shared();
    let joined = JoinedString::new(gathered.clone().shared(), ", ")?.shared();
    let roll_call = Formatted::new(
        "(test) Who's in? Waiting 20 seconds. `{names}`",
        [("names", joined)],
    )?
    .shared();

    Ok(sequence([
        set_var_from(&gathered, nobody)?,
        send_message_to_channel(Const::string("(test) Who's in? Waiting 20 seconds.").shared())?,
        repeat_until_timer_expires(
            GATHER_SECONDS,
            selector([
                sequence([
                    wait_for_message_from_channel(GATHER_IDLE_SECONDS).boxed(),
                    set_var_from(
                        &gathered,
                        Appended::new(gathered.clone().shared(), AuthorName.shared())?.shared(),
                    )?,
                    edit_last_answer(roll_call)?,
                ]),
                send_message_to_channel(Const::string("Anyone?").shared())?,
            ]),
        ),
        send_message_to_channel(Const::string("Voting is over.").shared())?,
    ]))
}

fn remember(memory: &Memory, wait_seconds: f64) -> TypeResult<BoxAction> {
    let mut scope = Scope::new();
    let name = scope.local("name", Type::String)?;
    let greeting = Formatted::new(
        "Nice to meet you, {name}. I'll remember that.",
        [("name", name.clone().shared())],
    )?
    .shared();

    Ok(sequence([
        selector([
            set_var_from(&name, SlotValue::new("name").shared())?,
            sequence([
                reply("What should I call you?")?,
                wait_for_message_from_user(wait_seconds).boxed(),
                set_var_from(&name, MessageText.shared())?,
            ]),
        ]),
        memory.set_user_var("name", name.clone().shared())?,
        reply_to_message(greeting)?,
    ]))
}

fn whoami(memory: &Memory) -> TypeResult<BoxAction> {
    let mut scope = Scope::new();
    let name = scope.local("name", Type::String)?;
    let answer = Formatted::new("You are {name}.", [("name", name.clone().shared())])?.shared();

    Ok(selector([
        sequence([
            memory.check_user_var_exists("name"),
            memory.copy_user_var_to_local("name", &name)?,
            reply_to_message(answer)?,
        ]),
        reply("I don't know you yet. Say \"call me <name>\".")?,
    ]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
