use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::chat::{ChatPort, ChatResult, IncomingMessage};
use crate::config::{Config, ReplyMode};
use crate::db::Store;
use crate::db::models::NewRecord;
use crate::karma::patterns::{Command, GiveMatch, Grammar};
use crate::karma::users::UserResolver;
use crate::karma::{KarmaError, KarmaResult, PolicyRejection, policy, reply};
use crate::ui::UiPort;

/// Where the answer to an event goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Answer a message, placed according to the configured reply mode.
    Message {
        channel: String,
        user: String,
        ts: String,
        thread_ts: Option<String>,
    },
    /// Answer privately in a direct-message channel.
    Direct { user: String },
}

impl From<&IncomingMessage> for ReplyTarget {
    fn from(msg: &IncomingMessage) -> Self {
        ReplyTarget::Message {
            channel: msg.channel.clone(),
            user: msg.user.clone(),
            ts: msg.ts.clone(),
            thread_ts: msg.thread_ts.clone(),
        }
    }
}

/// A resolved karma operation, ready for the policy filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub from: String,
    pub to: String,
    pub points: i64,
    pub reason: Option<String>,
}

/// The scoring engine: turns recognized commands into records and replies.
#[derive(Debug)]
pub struct Bot {
    config: Arc<Config>,
    chat: Arc<dyn ChatPort>,
    store: Arc<dyn Store>,
    ui: Arc<dyn UiPort>,
    grammar: Grammar,
    users: UserResolver,
}

impl Bot {
    pub fn new(
        config: Arc<Config>,
        chat: Arc<dyn ChatPort>,
        store: Arc<dyn Store>,
        ui: Arc<dyn UiPort>,
    ) -> KarmaResult<Self> {
        Ok(Self {
            users: UserResolver::new(chat.clone(), config.clone())?,
            grammar: Grammar::new()?,
            config,
            chat,
            store,
            ui,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn users(&self) -> &UserResolver {
        &self.users
    }

    /// Runs the command in `msg`, if there is one. Failures are reported to the requester
    /// according to [`KarmaError::user_message`].
    #[instrument(skip(self, msg), fields(channel = %msg.channel, user = %msg.user))]
    pub async fn handle_message(&self, msg: &IncomingMessage) {
        let motivated = match self.config.motivate {
            true => self.grammar.expand_motivate(&msg.text),
            false => None,
        };
        let text = motivated.as_deref().unwrap_or(&msg.text);

        let Some(command) = self.grammar.parse(text) else {
            return;
        };

        let target = ReplyTarget::from(msg);
        let result = match command {
            Command::Url => self.print_url(&target).await,
            Command::Give(give) => self.give_points(&msg.user, &give, &target).await,
            Command::Leaderboard { limit } => {
                self.print_leaderboard(limit.as_deref(), &target).await
            }
            Command::Throwback { target: who } => {
                self.get_throwback(&msg.user, who.as_deref(), &target)
                    .await
            }
            Command::Query { target: who } => self.query_karma(&who, &target).await,
        };

        if let Err(e) = result {
            self.handle_error(e, &target).await;
        }
    }

    /// `user++` / `user-- for reason`, issued by the platform user `actor_id`.
    #[instrument(skip(self, target))]
    pub async fn give_points(
        &self,
        actor_id: &str,
        give: &GiveMatch,
        target: &ReplyTarget,
    ) -> KarmaResult<()> {
        let from = self.users.resolve_id(actor_id).await?;
        let to = self.users.resolve(&give.target).await?;

        let operation = Operation {
            from,
            to,
            points: give.points(self.config.max_points),
            reason: give.reason.clone(),
        };

        self.apply_points(operation, target).await
    }

    /// Filters, stores and confirms an operation. Shared by text commands and reactions.
    #[instrument(skip(self, target))]
    pub async fn apply_points(&self, op: Operation, target: &ReplyTarget) -> KarmaResult<()> {
        policy::check(&self.config, &op.from, &op.to)?;

        let points = policy::clamp(op.points, self.config.max_points);
        let record = NewRecord::new(&op.from, &op.to, points, op.reason.as_deref());
        self.store.insert(&record).await?;

        let total = self.store.get_user_score(&op.to).await?;
        info!(
            from = %op.from,
            to = %op.to,
            points,
            total = total.points,
            "karma operation stored"
        );

        let text = reply::points_given(&op.to, total.points, points, op.reason.as_deref());
        self.reply(target, &text).await;

        Ok(())
    }

    /// `user==`
    #[instrument(skip(self, target))]
    pub async fn query_karma(&self, token: &str, target: &ReplyTarget) -> KarmaResult<()> {
        let name = self.users.resolve(token).await?;
        let score = self.store.get_user_score(&name).await?;

        self.reply(target, &reply::score(&score)).await;
        Ok(())
    }

    /// `karma top [N]`
    #[instrument(skip(self, target))]
    pub async fn print_leaderboard(
        &self,
        limit: Option<&str>,
        target: &ReplyTarget,
    ) -> KarmaResult<()> {
        let limit = match limit {
            Some(raw) => raw
                .parse::<u32>()
                .map_err(|_| KarmaError::InvalidLimit(raw.to_owned()))?,
            None => self.config.leaderboard_limit,
        };

        let link = match self.ui.get_url(&format!("/leaderboard/{limit}")) {
            Ok(link) => link,
            Err(e) => {
                warn!(error = ?e, "unable to build a leaderboard link");
                None
            }
        };

        let entries = self.store.get_leaderboard(limit).await?;
        let text = reply::leaderboard(limit, link.as_deref(), &entries);

        self.reply(target, &text).await;
        Ok(())
    }

    /// `karma throwback [user]`; without a user, the requester's own history is used.
    #[instrument(skip(self, target))]
    pub async fn get_throwback(
        &self,
        actor_id: &str,
        token: Option<&str>,
        target: &ReplyTarget,
    ) -> KarmaResult<()> {
        let name = match token {
            Some(token) => self.users.resolve(token).await?,
            None => self.users.resolve_id(actor_id).await?,
        };

        let record = self.store.get_random_record_for(&name).await?;
        let text = reply::throwback(&record, Utc::now().naive_utc());

        self.reply(target, &text).await;
        Ok(())
    }

    /// `karma web`
    #[instrument(skip(self, target))]
    pub async fn print_url(&self, target: &ReplyTarget) -> KarmaResult<()> {
        let text = self
            .ui
            .get_url("/")?
            .unwrap_or_else(|| reply::WEBUI_DISABLED.to_owned());

        self.reply(target, &text).await;
        Ok(())
    }

    /// Sends `text`; delivery failures are logged, never surfaced.
    pub async fn reply(&self, target: &ReplyTarget, text: &str) {
        if let Err(e) = self.send(target, text).await {
            error!(error = ?e, ?target, "unable to deliver reply");
        }
    }

    async fn send(&self, target: &ReplyTarget, text: &str) -> ChatResult<()> {
        match target {
            ReplyTarget::Message {
                channel,
                user,
                ts,
                thread_ts,
            } => match self.config.reply_mode {
                ReplyMode::Channel => {
                    self.chat
                        .send_message(text, channel, thread_ts.as_deref())
                        .await
                }
                ReplyMode::Thread => {
                    let thread = thread_ts.as_deref().unwrap_or(ts);
                    self.chat.send_message(text, channel, Some(thread)).await
                }
                ReplyMode::Ephemeral => {
                    self.chat
                        .send_ephemeral(text, channel, user, thread_ts.as_deref())
                        .await
                }
            },
            ReplyTarget::Direct { user } => {
                let channel = self.chat.open_direct_channel(user).await?;
                self.chat.send_message(text, &channel, None).await
            }
        }
    }

    /// Logs `err` in full and tells the requester whatever the debug setting allows.
    pub async fn handle_error(&self, err: KarmaError, target: &ReplyTarget) {
        match &err {
            KarmaError::Policy(PolicyRejection::Blacklisted(user)) => {
                info!(user = %user, "ignoring karma operation on blacklisted user");
            }
            KarmaError::Policy(_) | KarmaError::NotFound(_) => {
                info!(error = %err, "karma operation rejected");
            }
            _ => error!(error = ?err, "karma operation failed"),
        }

        if let Some(text) = err.user_message(self.config.debug) {
            self.reply(target, &text).await;
        }
    }
}

#[cfg(test)]
pub mod test {
    use super::*;
    use crate::chat::testing::{SentMessage, TestChat};
    use crate::config::AliasTable;
    use crate::db::memory::MemoryStore;
    use crate::ui::{BlankUi, UiResult};

    #[derive(Debug)]
    struct StaticUi;

    impl UiPort for StaticUi {
        fn get_url(&self, path: &str) -> UiResult<Option<String>> {
            Ok(Some(format!("http://karma.test{path}?token=123456")))
        }
    }

    pub struct Harness {
        pub bot: Bot,
        pub chat: Arc<TestChat>,
        pub store: Arc<MemoryStore>,
    }

    pub async fn harness(config: Config, chat: TestChat, records: &[NewRecord]) -> Harness {
        harness_with_ui(config, chat, records, Arc::new(BlankUi)).await
    }

    async fn harness_with_ui(
        config: Config,
        chat: TestChat,
        records: &[NewRecord],
        ui: Arc<dyn UiPort>,
    ) -> Harness {
        let chat = Arc::new(chat);
        let store = Arc::new(MemoryStore::with_records(records).await);
        let bot = Bot::new(Arc::new(config), chat.clone(), store.clone(), ui).unwrap();

        Harness { bot, chat, store }
    }

    pub fn message(user: &str, text: &str) -> IncomingMessage {
        IncomingMessage {
            user: user.into(),
            channel: "C1".into(),
            text: text.into(),
            ts: "1700000000.000100".into(),
            thread_ts: None,
        }
    }

    pub fn seed() -> Vec<NewRecord> {
        vec![NewRecord::new(
            "point_giver",
            "onehundred_points",
            100,
            Some("for being a swell guy"),
        )]
    }

    impl Harness {
        async fn say(&self, user: &str, text: &str) -> Vec<String> {
            self.bot.handle_message(&message(user, text)).await;
            self.chat.texts().await
        }
    }

    #[tokio::test]
    async fn test_give_points() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;

        assert_eq!(h.say("bob", "alice++").await, vec!["alice == 1 (+1)"]);
        assert_eq!(
            h.chat.sent().await[0],
            SentMessage::Message {
                text: "alice == 1 (+1)".into(),
                channel: "C1".into(),
                thread: None,
            }
        );

        let records = h.store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].from, "bob");
        assert_eq!(records[0].to, "alice");
    }

    #[tokio::test]
    async fn test_give_clamped_with_reason() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;

        let sent = h.say("bob", "well done alice++++++++++ for shipping it").await;
        assert_eq!(sent, vec!["alice == 6 (+6 for shipping it)"]);

        let sent = h.say("bob", "alice-- for breaking it").await;
        assert_eq!(sent[1], "alice == 5 (-1 for breaking it)");
    }

    #[tokio::test]
    async fn test_round_trip_and_idempotent_query() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;

        h.say("bob", "newcomer+++").await;
        h.say("bob", "newcomer==").await;
        let sent = h.say("bob", "newcomer==").await;

        assert_eq!(sent[1], "newcomer == 2");
        assert_eq!(sent[2], "newcomer == 2");
        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_motivate() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;
        assert_eq!(
            h.say("bob", "?m alice").await,
            vec!["alice == 1 (+1 for doing good work)"]
        );

        let config = Config {
            motivate: false,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;
        assert!(h.say("bob", "!m alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_self_karma_disabled() {
        let config = Config {
            self_karma: false,
            ..Default::default()
        };
        let h = harness(config, TestChat::default().with_user("U1", "Alice"), &[]).await;

        let sent = h.say("U1", "alice++").await;
        assert_eq!(sent, vec!["you are not allowed to give karma to yourself"]);
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_self_karma_enabled() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;
        assert_eq!(h.say("alice", "alice++").await, vec!["alice == 1 (+1)"]);
    }

    #[tokio::test]
    async fn test_blacklist_is_silent() {
        let config = Config {
            blacklist: ["spammer".to_owned()].into_iter().collect(),
            debug: true,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;

        assert!(h.say("bob", "Spammer++").await.is_empty());
        assert_eq!(h.store.len().await, 0);
    }

    #[tokio::test]
    async fn test_alias() {
        let config = Config {
            aliases: AliasTable::parse(["robert++bob"]).unwrap(),
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;

        assert_eq!(h.say("alice", "bob++").await, vec!["robert == 1 (+1)"]);
        assert_eq!(h.say("alice", "robert==").await[1], "robert == 1");
        assert_eq!(
            h.say("alice", "bob==").await[2],
            "robert == 1",
            "aliases resolve on query too"
        );
    }

    #[tokio::test]
    async fn test_mentions_resolve() {
        let chat = TestChat::default()
            .with_user("U2", "Alice")
            .with_unknown("U404");
        let h = harness(Config::default(), chat, &[]).await;

        assert_eq!(h.say("bob", "<@U2>++").await, vec!["alice == 1 (+1)"]);
        assert_eq!(h.say("bob", "<@U404>++").await[1], "an error has occurred.");
    }

    #[tokio::test]
    async fn test_lookup_error_in_debug() {
        let config = Config {
            debug: true,
            ..Default::default()
        };
        let h = harness(config, TestChat::default().with_unknown("U404"), &[]).await;

        assert_eq!(
            h.say("bob", "<@U404>++").await,
            vec!["unable to resolve user: unknown user 'U404'"]
        );
    }

    #[tokio::test]
    async fn test_query() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;

        assert_eq!(
            h.say("bob", "onehundred_points==").await,
            vec!["onehundred_points == 100"]
        );
        assert_eq!(
            h.say("bob", "nobody==").await[1],
            "could not find any karma operations for nobody"
        );
    }

    #[tokio::test]
    async fn test_leaderboard() {
        let records = [
            NewRecord::new("x", "carol", 3, None),
            NewRecord::new("x", "alice", 5, None),
            NewRecord::new("x", "bob", 5, None),
        ];
        let h = harness(Config::default(), TestChat::default(), &records).await;

        assert_eq!(
            h.say("x", "karma top 2").await,
            vec!["*top 2 leaderboard*\n1. älice == 5\n2. Бob == 5"]
        );
        assert_eq!(
            h.say("x", "karmabot leaderboard").await[1],
            "*top 10 leaderboard*\n1. älice == 5\n2. Бob == 5\n3. ċarol == 3"
        );
        assert_eq!(
            h.say("x", "karmabot top 99999999999").await[2],
            "an error has occurred."
        );
    }

    #[tokio::test]
    async fn test_leaderboard_and_url_with_webui() {
        let records = [NewRecord::new("x", "alice", 5, None)];
        let h = harness_with_ui(
            Config::default(),
            TestChat::default(),
            &records,
            Arc::new(StaticUi),
        )
        .await;

        assert_eq!(
            h.say("x", "karma top 1").await,
            vec!["*top 1 leaderboard*\nhttp://karma.test/leaderboard/1?token=123456\n1. älice == 5"]
        );
        assert_eq!(
            h.say("x", "karmabot web").await[1],
            "http://karma.test/?token=123456"
        );
    }

    #[tokio::test]
    async fn test_url_without_webui() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;
        assert_eq!(h.say("x", "karma url").await, vec![reply::WEBUI_DISABLED]);
    }

    #[tokio::test]
    async fn test_throwback() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;

        assert_eq!(
            h.say("bob", "karmabot throwback onehundred_points").await,
            vec![
                "önehundred_points received 100 points from ρoint_giver now for for being a swell guy"
            ]
        );
        assert_eq!(
            h.say("bob", "karma throwback").await[1],
            "could not find any karma operations for bob"
        );
    }

    #[tokio::test]
    async fn test_throwback_defaults_to_requester() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;
        let sent = h.say("onehundred_points", "karma throwback").await;

        assert!(sent[0].starts_with("önehundred_points received 100 points"));
    }

    #[tokio::test]
    async fn test_reply_modes() {
        let mut msg = message("bob", "alice++");

        let config = Config {
            reply_mode: ReplyMode::Thread,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;
        h.bot.handle_message(&msg).await;
        msg.thread_ts = Some("1600000000.000001".into());
        h.bot.handle_message(&msg).await;

        let sent = h.chat.sent().await;
        assert!(matches!(
            &sent[0],
            SentMessage::Message { thread: Some(t), .. } if t == "1700000000.000100"
        ));
        assert!(matches!(
            &sent[1],
            SentMessage::Message { thread: Some(t), .. } if t == "1600000000.000001"
        ));

        let config = Config {
            reply_mode: ReplyMode::Ephemeral,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;
        h.bot.handle_message(&msg).await;
        assert_eq!(
            h.chat.sent().await,
            vec![SentMessage::Ephemeral {
                text: "alice == 1 (+1)".into(),
                channel: "C1".into(),
                user: "bob".into(),
                thread: Some("1600000000.000001".into()),
            }]
        );
    }

    #[tokio::test]
    async fn test_ephemeral_outside_thread_goes_to_channel() {
        let config = Config {
            reply_mode: ReplyMode::Ephemeral,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &[]).await;
        h.say("bob", "alice++").await;

        assert!(matches!(
            &h.chat.sent().await[0],
            SentMessage::Ephemeral { thread: None, user, .. } if user == "bob"
        ));
    }

    #[tokio::test]
    async fn test_channel_mode_keeps_existing_thread() {
        let h = harness(Config::default(), TestChat::default(), &[]).await;
        let mut msg = message("bob", "alice++");
        msg.thread_ts = Some("1600000000.000001".into());
        h.bot.handle_message(&msg).await;

        assert!(matches!(
            &h.chat.sent().await[0],
            SentMessage::Message { thread: Some(t), .. } if t == "1600000000.000001"
        ));
    }

    #[tokio::test]
    async fn test_non_commands_are_ignored() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;

        for text in ["hello", "c++ is fun", "user ++", "karma", "a == b"] {
            h.say("bob", text).await;
        }

        assert!(h.chat.sent().await.is_empty());
        assert_eq!(h.store.len().await, 1);
    }
}
