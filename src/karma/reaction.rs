use tracing::{debug, instrument};

use crate::chat::ReactionEvent;
use crate::config::ReactionConfig;
use crate::karma::KarmaResult;
use crate::karma::engine::{Bot, Operation, ReplyTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Added,
    Removed,
}

impl ReactionKind {
    fn verb(self) -> &'static str {
        match self {
            ReactionKind::Added => "adding",
            ReactionKind::Removed => "removing",
        }
    }
}

/// The vote cast by `reaction`, or `None` when it is not a voting reaction.
///
/// Removing a reaction undoes what adding it did.
pub fn reaction_vote(config: &ReactionConfig, reaction: &str, kind: ReactionKind) -> Option<i64> {
    if !config.enabled {
        return None;
    }

    let vote = if config.upvote.contains(reaction) {
        1
    } else if config.downvote.contains(reaction) {
        -1
    } else {
        return None;
    };

    match kind {
        ReactionKind::Added => Some(vote),
        ReactionKind::Removed => Some(-vote),
    }
}

pub fn reaction_reason(reaction: &str, kind: ReactionKind) -> String {
    format!("{} a :{reaction}: reactji", kind.verb())
}

impl Bot {
    /// Scores a reaction on someone's message; the reacting user is answered privately.
    #[instrument(skip(self))]
    pub async fn handle_reaction(&self, event: &ReactionEvent, kind: ReactionKind) {
        let Some(points) = reaction_vote(&self.config().reactji, &event.reaction, kind) else {
            debug!(reaction = %event.reaction, "ignoring non-voting reaction");
            return;
        };

        let target = ReplyTarget::Direct {
            user: event.user.clone(),
        };

        if let Err(e) = self.score_reaction(event, kind, points, &target).await {
            self.handle_error(e, &target).await;
        }
    }

    async fn score_reaction(
        &self,
        event: &ReactionEvent,
        kind: ReactionKind,
        points: i64,
        target: &ReplyTarget,
    ) -> KarmaResult<()> {
        let operation = Operation {
            from: self.users().resolve_id(&event.user).await?,
            to: self.users().resolve_id(&event.item_user).await?,
            points,
            reason: Some(reaction_reason(&event.reaction, kind)),
        };

        self.apply_points(operation, target).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::chat::testing::{SentMessage, TestChat};
    use crate::config::Config;
    use crate::karma::engine::test::{Harness, harness, seed};

    fn reaction(user: &str, item_user: &str, reaction: &str) -> ReactionEvent {
        ReactionEvent {
            user: user.into(),
            item_user: item_user.into(),
            reaction: reaction.into(),
            channel: "C1".into(),
        }
    }

    async fn react(h: &Harness, reaction_name: &str, kind: ReactionKind) -> Vec<String> {
        h.bot
            .handle_reaction(&reaction("user", "onehundred_points", reaction_name), kind)
            .await;
        h.chat.texts().await
    }

    #[test]
    fn test_reaction_vote() {
        let config = Config::default().reactji;

        assert_eq!(reaction_vote(&config, "+1", ReactionKind::Added), Some(1));
        assert_eq!(reaction_vote(&config, "thumbsup", ReactionKind::Removed), Some(-1));
        assert_eq!(reaction_vote(&config, "-1", ReactionKind::Added), Some(-1));
        assert_eq!(reaction_vote(&config, "thumbsdown", ReactionKind::Removed), Some(1));
        assert_eq!(reaction_vote(&config, "cat", ReactionKind::Added), None);

        // an add of an upvote and a removal of a downvote are the same vote
        assert_eq!(
            reaction_vote(&config, "+1", ReactionKind::Added),
            reaction_vote(&config, "-1", ReactionKind::Removed)
        );
    }

    #[test]
    fn test_reaction_vote_disabled() {
        let mut config = Config::default().reactji;
        config.enabled = false;

        assert_eq!(reaction_vote(&config, "+1", ReactionKind::Added), None);
    }

    #[test]
    fn test_upvote_wins_when_configured_twice() {
        let mut config = Config::default().reactji;
        config.downvote.insert("+1".into());

        assert_eq!(reaction_vote(&config, "+1", ReactionKind::Added), Some(1));
    }

    #[tokio::test]
    async fn test_upvote_added() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;

        assert_eq!(
            react(&h, "+1", ReactionKind::Added).await,
            vec!["onehundred_points == 101 (+1 for adding a :+1: reactji)"]
        );
        assert_eq!(h.chat.sent().await[0].channel(), "user");
        assert!(matches!(
            h.chat.sent().await[0],
            SentMessage::Message { thread: None, .. }
        ));
    }

    #[tokio::test]
    async fn test_downvote_added() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;

        assert_eq!(
            react(&h, "-1", ReactionKind::Added).await,
            vec!["onehundred_points == 99 (-1 for adding a :-1: reactji)"]
        );
    }

    #[tokio::test]
    async fn test_removals_invert() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;
        assert_eq!(
            react(&h, "+1", ReactionKind::Removed).await,
            vec!["onehundred_points == 99 (-1 for removing a :+1: reactji)"]
        );

        let h = harness(Config::default(), TestChat::default(), &seed()).await;
        assert_eq!(
            react(&h, "-1", ReactionKind::Removed).await,
            vec!["onehundred_points == 101 (+1 for removing a :-1: reactji)"]
        );
    }

    #[tokio::test]
    async fn test_ignored_reactions() {
        let h = harness(Config::default(), TestChat::default(), &seed()).await;
        assert!(react(&h, "cat", ReactionKind::Added).await.is_empty());

        let mut config = Config::default();
        config.reactji.enabled = false;
        let h = harness(config, TestChat::default(), &seed()).await;
        assert!(react(&h, "+1", ReactionKind::Added).await.is_empty());

        assert_eq!(h.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_reactions_follow_policy() {
        let config = Config {
            self_karma: false,
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &seed()).await;
        h.bot
            .handle_reaction(&reaction("alice", "alice", "+1"), ReactionKind::Added)
            .await;
        assert_eq!(
            h.chat.texts().await,
            vec!["you are not allowed to give karma to yourself"]
        );

        let config = Config {
            blacklist: ["onehundred_points".to_owned()].into_iter().collect(),
            ..Default::default()
        };
        let h = harness(config, TestChat::default(), &seed()).await;
        assert!(react(&h, "+1", ReactionKind::Added).await.is_empty());
        assert_eq!(h.store.len().await, 1);
    }
}
