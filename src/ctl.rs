use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::chat::ChatError;
use crate::chat::slack::SlackClient;
use crate::cli::{AdminCommand, Command};
use crate::config::{AliasTable, Config, ConfigError, Settings};
use crate::db::prelude::*;
use crate::karma::dispatch::{self, DispatchError};
use crate::karma::{Bot, KarmaError, reply};
use crate::ui::web::WebUi;
use crate::ui::web::auth::Authenticator;
use crate::ui::{BlankUi, UiError, UiPort};

/// Author of the records written by the admin commands.
pub const CTL_USER: &str = "karmabot";
const RESET_REASON: &str = "karmabotctl resetting karma";
const SET_REASON: &str = "karmabotctl overriding karma";

pub type CtlResult<T> = core::result::Result<T, CtlError>;

#[derive(Debug, Error)]
pub enum CtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error(transparent)]
    Ui(#[from] UiError),

    #[error(transparent)]
    Karma(#[from] KarmaError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("KARMABOT_{0} must be set")]
    MissingToken(&'static str),

    #[error("webui not enabled; set KARMABOT_WEBUI_LISTEN_ADDR")]
    WebUiDisabled,

    #[error("'{0}' has no karma to migrate")]
    NothingToMigrate(String),

    #[error("cannot move '{user}' to {target} points without overflowing")]
    PointsOverflow { user: String, target: i64 },
}

/// Runs a subcommand to completion.
pub async fn execute(command: Command, settings: &Settings) -> CtlResult<()> {
    match command {
        Command::Run => run(settings).await,
        Command::Web => web(settings).await,
        Command::Mktotp => {
            println!("{}", mktotp(settings)?);
            Ok(())
        }
        Command::Admin(command) => {
            let aliases = AliasTable::parse(&settings.aliases)?;
            let store = SqliteStore::connect(&settings.db).await?;
            println!("{}", administer(&store, &aliases, command).await?);
            Ok(())
        }
    }
}

#[instrument(skip_all)]
async fn run(settings: &Settings) -> CtlResult<()> {
    if settings.slack_bot_token.is_empty() {
        return Err(CtlError::MissingToken("SLACK_BOT_TOKEN"));
    }
    if settings.slack_app_token.is_empty() {
        return Err(CtlError::MissingToken("SLACK_APP_TOKEN"));
    }

    let config = Arc::new(Config::try_from(settings)?);
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&settings.db).await?);
    let slack = Arc::new(SlackClient::new(
        &settings.slack_bot_token,
        &settings.slack_app_token,
    ));
    let bot_name = slack.verify().await?;
    info!(bot = %bot_name, "slack bot token accepted");

    let (ui, webui_task) = match settings.webui() {
        Some(webui_settings) => {
            let webui = WebUi::new(&webui_settings)?;
            let server = webui.clone();
            let store = store.clone();
            let task = tokio::spawn(async move {
                if let Err(e) = server.serve(store).await {
                    tracing::error!(error = ?e, "webui stopped");
                }
            });

            let ui: Arc<dyn UiPort> = Arc::new(webui);
            (ui, Some(task))
        }
        None => {
            info!("webui disabled");
            let ui: Arc<dyn UiPort> = Arc::new(BlankUi);
            (ui, None)
        }
    };

    let bot = Arc::new(Bot::new(config, slack.clone(), store, ui)?);
    let (events, socket) = slack.listen();

    info!(db = %settings.db, "karmabot started");
    let result = dispatch::listen(bot, events).await;

    socket.abort();
    if let Some(task) = webui_task {
        task.abort();
    }

    Ok(result?)
}

#[instrument(skip_all)]
async fn web(settings: &Settings) -> CtlResult<()> {
    let webui_settings = settings.webui().ok_or(CtlError::WebUiDisabled)?;
    let webui = WebUi::new(&webui_settings)?;
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&settings.db).await?);

    if let Some(url) = webui.get_url("/")? {
        info!(url = %url, "dashboard link");
    }

    Ok(webui.serve(store).await?)
}

/// A current dashboard token, or a fresh secret (with instructions) when none is configured.
pub fn mktotp(settings: &Settings) -> CtlResult<String> {
    match settings.webui_totp.as_deref() {
        Some(secret) => Ok(Authenticator::new(secret)?.token()?),
        None => Ok(format!(
            "no secret configured; set KARMABOT_WEBUI_TOTP={}",
            Authenticator::generate_secret()
        )),
    }
}

/// The store-only subcommands; returns what to print.
///
/// User names are lowercased and resolved through `aliases`, the same way chat commands are.
pub async fn administer(
    store: &dyn Store,
    aliases: &AliasTable,
    command: AdminCommand,
) -> CtlResult<String> {
    let canonical = |name: &str| aliases.resolve(&name.to_lowercase()).to_owned();

    match command {
        AdminCommand::Add {
            from,
            to,
            points,
            reason,
        } => {
            let to = canonical(&to);
            let record = NewRecord::new(&canonical(&from), &to, points, reason.as_deref());
            store.insert(&record).await?;

            Ok(reply::score(&store.get_user_score(&to).await?))
        }

        AdminCommand::Migrate { from, to } => {
            migrate(store, &canonical(&from), &canonical(&to)).await
        }

        AdminCommand::Reset { user } => set(store, &canonical(&user), 0, RESET_REASON).await,

        AdminCommand::Set { user, points } => {
            set(store, &canonical(&user), points, SET_REASON).await
        }

        AdminCommand::Throwback { user } => {
            let record = store.get_random_record_for(&canonical(&user)).await?;
            Ok(reply::throwback(&record, Utc::now().naive_utc()))
        }
    }
}

#[instrument(skip(store))]
async fn migrate(store: &dyn Store, from: &str, to: &str) -> CtlResult<String> {
    let points = match store.get_user_score(from).await {
        Ok(score) if score.points != 0 => score.points,
        Ok(_) | Err(DbError::NoSuchUser(_)) => {
            return Err(CtlError::NothingToMigrate(from.to_owned()));
        }
        Err(e) => return Err(e.into()),
    };

    let reason = format!("migrating karma from {from} to {to}");
    store
        .insert(&NewRecord::new(CTL_USER, from, -points, Some(&reason)))
        .await?;
    store
        .insert(&NewRecord::new(CTL_USER, to, points, Some(&reason)))
        .await?;

    info!(points, "karma migrated");
    Ok(format!(
        "{}\n{}",
        reply::score(&store.get_user_score(from).await?),
        reply::score(&store.get_user_score(to).await?)
    ))
}

/// Writes whatever delta takes `user` to `target` points.
#[instrument(skip(store))]
async fn set(store: &dyn Store, user: &str, target: i64, reason: &str) -> CtlResult<String> {
    let current = match store.get_user_score(user).await {
        Ok(score) => score.points,
        Err(DbError::NoSuchUser(_)) => 0,
        Err(e) => return Err(e.into()),
    };

    let delta = target
        .checked_sub(current)
        .ok_or_else(|| CtlError::PointsOverflow {
            user: user.to_owned(),
            target,
        })?;
    if delta == 0 {
        warn!(user, current, "already at the requested total, nothing to do");
    } else {
        store
            .insert(&NewRecord::new(CTL_USER, user, delta, Some(reason)))
            .await?;
    }

    Ok(format!("{user} == {target}"))
}
