//! Shared test fixtures: a recording chat platform and an in-memory sink.

#![allow(dead_code)]

use async_trait::async_trait;
use lobby_common::config::Config;
use lobby_herald::snapshot::DurableSnapshot;
use lobby_herald::{
    Activity, BotEvent, ChatPlatform, Command, CommandSurface, Herald, InteractionRef, Invocation,
    LobbyBot, MessageId, PlatformError, PlatformResult, Session, SessionStore, SnapshotSink,
    StatusView, UserId,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

pub const OWNER: UserId = UserId(42);
pub const GAME: &str = "Baldur's Gate 3";
pub const CODE: &str = "AAAA11BBBB22CC";

/// One recorded platform call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    SendStatus(StatusView),
    EditStatus(MessageId, StatusView),
    SendText(MessageId, String),
    Delete(MessageId),
    Direct(UserId, String),
    Register(u64),
    Reply(String),
}

/// Chat platform that records calls and keeps track of live messages.
///
/// Editing or deleting a message the fake never posted (or already deleted)
/// fails with `NotFound`, like the real platform.
#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<Call>>,
    live: Mutex<HashSet<MessageId>>,
    next_id: AtomicU64,
    forbid_send: AtomicBool,
    forbid_delete: AtomicBool,
    break_edits: AtomicBool,
    forbid_edit: AtomicBool,
    replace_on_stale_edit: Mutex<Option<(SessionStore, MessageId)>>,
    unreachable: Mutex<HashSet<UserId>>,
}

impl FakePlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(1000),
            ..Self::default()
        })
    }

    /// Pretend a message with this id already exists.
    pub fn seed_message(&self, id: MessageId) {
        self.live.lock().unwrap().insert(id);
    }

    pub fn forbid_send(&self, forbid: bool) {
        self.forbid_send.store(forbid, Ordering::SeqCst);
    }

    pub fn forbid_delete(&self, forbid: bool) {
        self.forbid_delete.store(forbid, Ordering::SeqCst);
    }

    /// Fail edits with a transport error.
    pub fn break_edits(&self, broken: bool) {
        self.break_edits.store(broken, Ordering::SeqCst);
    }

    /// Fail edits with `Forbidden`, as for a message the bot can no longer touch.
    pub fn forbid_edit(&self, forbid: bool) {
        self.forbid_edit.store(forbid, Ordering::SeqCst);
    }

    /// On the next edit of a missing message, store `replacement` as the
    /// status handle before reporting `NotFound`.
    pub fn replace_on_stale_edit(&self, store: SessionStore, replacement: MessageId) {
        *self.replace_on_stale_edit.lock().unwrap() = Some((store, replacement));
    }

    pub fn make_unreachable(&self, user: UserId) {
        self.unreachable.lock().unwrap().insert(user);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    pub fn is_live(&self, id: MessageId) -> bool {
        self.live.lock().unwrap().contains(&id)
    }

    pub fn directs(&self) -> Vec<(UserId, String)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Direct(user, text) => Some((user, text)),
                _ => None,
            })
            .collect()
    }

    pub fn replies(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Reply(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    /// Most recent status view that was posted or edited.
    pub fn last_status(&self) -> Option<StatusView> {
        self.calls().into_iter().rev().find_map(|c| match c {
            Call::SendStatus(view) | Call::EditStatus(_, view) => Some(view),
            _ => None,
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn post(&self) -> PlatformResult<MessageId> {
        if self.forbid_send.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("Missing Permissions".into()));
        }
        let id = MessageId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.live.lock().unwrap().insert(id);
        Ok(id)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn send_status(&self, view: &StatusView) -> PlatformResult<MessageId> {
        self.record(Call::SendStatus(view.clone()));
        self.post()
    }

    async fn edit_status(&self, id: MessageId, view: &StatusView) -> PlatformResult<()> {
        self.record(Call::EditStatus(id, view.clone()));
        if self.break_edits.load(Ordering::SeqCst) {
            return Err(PlatformError::Transport("connection reset".into()));
        }
        if self.forbid_edit.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("Missing Access".into()));
        }
        if self.is_live(id) {
            return Ok(());
        }
        let hook = self.replace_on_stale_edit.lock().unwrap().take();
        if let Some((store, replacement)) = hook {
            self.seed_message(replacement);
            store
                .mutate(move |s| s.status_message = Some(replacement))
                .await
                .unwrap();
        }
        Err(PlatformError::NotFound("Unknown Message".into()))
    }

    async fn send_text(&self, text: &str) -> PlatformResult<MessageId> {
        let id = self.post()?;
        self.record(Call::SendText(id, text.to_string()));
        Ok(id)
    }

    async fn delete_message(&self, id: MessageId) -> PlatformResult<()> {
        self.record(Call::Delete(id));
        if self.forbid_delete.load(Ordering::SeqCst) {
            return Err(PlatformError::Forbidden("Missing Permissions".into()));
        }
        if self.live.lock().unwrap().remove(&id) {
            Ok(())
        } else {
            Err(PlatformError::NotFound("Unknown Message".into()))
        }
    }

    async fn send_direct(&self, user: UserId, text: &str) -> PlatformResult<()> {
        self.record(Call::Direct(user, text.to_string()));
        if self.unreachable.lock().unwrap().contains(&user) {
            return Err(PlatformError::Forbidden("Cannot send messages to this user".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CommandSurface for FakePlatform {
    async fn register_commands(&self, application_id: u64) -> PlatformResult<()> {
        self.record(Call::Register(application_id));
        Ok(())
    }

    async fn reply_ephemeral(&self, _interaction: &InteractionRef, text: &str) -> PlatformResult<()> {
        self.record(Call::Reply(text.to_string()));
        Ok(())
    }
}

/// Sink that keeps every durable write in memory.
#[derive(Default)]
pub struct MemorySink {
    writes: Mutex<Vec<DurableSnapshot>>,
}

impl MemorySink {
    pub fn writes(&self) -> Vec<DurableSnapshot> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotSink for MemorySink {
    async fn write(&self, snapshot: &DurableSnapshot) -> lobby_common::Result<()> {
        self.writes.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}

pub struct Harness {
    pub herald: Herald,
    pub bot: LobbyBot,
    pub platform: Arc<FakePlatform>,
    pub sink: Arc<MemorySink>,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.discord.bot_token = "test-token".into();
    config.discord.owner_id = OWNER.0;
    config.discord.channel_id = 500;
    config.lobby.tracked_game = GAME.into();
    config
}

impl Harness {
    pub fn new(initial: Session) -> Self {
        Self::with_platform(initial, FakePlatform::new())
    }

    pub fn with_platform(initial: Session, platform: Arc<FakePlatform>) -> Self {
        let sink = Arc::new(MemorySink::default());
        let (herald, bot) = Herald::assemble(
            &test_config(),
            initial,
            platform.clone(),
            platform.clone(),
            sink.clone(),
        );
        Self {
            herald,
            bot,
            platform,
            sink,
        }
    }

    pub async fn session(&self) -> Session {
        self.herald.store.read().await.unwrap()
    }

    /// Feed the owner's presence with an optional tracked party.
    pub async fn presence(&self, party: Option<(u32, u32)>) {
        let mut activity = Activity::new(GAME);
        activity.party_size = party;
        self.bot
            .handle(BotEvent::Presence {
                user_id: OWNER,
                activities: vec![activity],
            })
            .await;
    }

    pub async fn command(&self, caller: UserId, command: Command) -> String {
        self.bot
            .handle(BotEvent::Command {
                interaction: InteractionRef {
                    id: "1".into(),
                    token: "token".into(),
                },
                invocation: Invocation { caller, command },
            })
            .await;
        self.platform.replies().pop().unwrap_or_default()
    }

    /// Wait until the background fanout has sent `count` direct messages.
    pub async fn wait_for_directs(&self, count: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while self.platform.directs().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fanout did not finish");
    }

    pub async fn set(&self, code: &str, notify: bool) -> String {
        self.command(
            OWNER,
            Command::Set {
                code: code.into(),
                notify,
            },
        )
        .await
    }
}
