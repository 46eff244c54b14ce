//! Scheduled tweets for registered characters.
//!
//! [`TwitterManager`] persists each character's credentials in a JSON file and
//! runs one posting task per character. A task posts [`TWEETS_PER_DAY`] times a
//! day, one random template each time, and stops when its [`ScheduleHandle`]
//! is cancelled.

use mezo_core::{BoxError, BoxPinFut};
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod client;

pub use client::*;

pub const TWEETS_PER_DAY: u64 = 5;

/// Delay between two posts of one character
pub const TWEET_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60 / TWEETS_PER_DAY);

const TWEET_TEMPLATES: [&str; 5] = [
    "Thinking about the future of DeFi... 🚀",
    "GM! Stay bullish today. 🌞",
    "On-chain or it didn't happen! ⛓️",
    "Stacking sats and stacking wisdom. 💡",
    "Wen moon? HODL tight! 🌙",
];

/// Twitter API credentials and tweet personality of a character.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CharacterCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub access_token: String,
    pub access_secret: String,
    pub personality: String,
}

#[derive(Debug, thiserror::Error)]
pub enum TwitterError {
    #[error("Character '{0}' already has a Twitter client.")]
    Duplicate(String),

    #[error("credential file {path}: {error}")]
    Store { path: String, error: String },

    #[error("failed to start Twitter client: {0}")]
    Client(String),
}

/// Publishes a tweet.
pub trait TweetPoster: Send + Sync + 'static {
    fn post(&self, text: String) -> BoxPinFut<Result<(), BoxError>>;
}

/// Builds the poster of a character from its credentials.
pub type PosterFactory =
    Arc<dyn Fn(&CharacterCredentials) -> Result<Arc<dyn TweetPoster>, BoxError> + Send + Sync>;

/// Poster backed by [`TwitterClient`].
pub fn twitter_poster_factory() -> PosterFactory {
    Arc::new(|creds| {
        let client = TwitterClient::new(creds.clone())?;
        Ok(Arc::new(client) as Arc<dyn TweetPoster>)
    })
}

/// Picks one of the fixed templates at random.
pub fn compose_tweet(name: &str, personality: &str) -> String {
    let line = TWEET_TEMPLATES
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(TWEET_TEMPLATES[0]);
    format!("{} - {}: \"{}\"", name, personality, line)
}

/// A running posting task.
pub struct ScheduleHandle {
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ScheduleHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels the task and waits for it to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(err) = self.task.await {
            log::error!(character = self.name; "tweet task panicked: {}", err);
        }
    }
}

/// Spawns the posting loop of one character.
///
/// The first tweet goes out immediately. Post failures are logged and do not
/// stop the loop; cancelling `parent` stops every task spawned from it.
pub fn spawn_schedule(
    name: String,
    personality: String,
    poster: Arc<dyn TweetPoster>,
    interval: Duration,
    parent: &CancellationToken,
) -> ScheduleHandle {
    let cancel = parent.child_token();
    let token = cancel.clone();
    let character = name.clone();
    let task = tokio::spawn(async move {
        loop {
            let text = compose_tweet(&character, &personality);
            match poster.post(text.clone()).await {
                Ok(_) => log::info!(character = character; "tweeted: {}", text),
                Err(err) => {
                    log::error!(character = character; "failed to post tweet: {}", err)
                }
            }
            log::info!(
                character = character,
                next_in_secs = interval.as_secs();
                "next tweet scheduled"
            );
            tokio::select! {
                _ = token.cancelled() => {
                    log::info!(character = character; "tweet task stopped");
                    return;
                },
                _ = tokio::time::sleep(interval) => {},
            }
        }
    });
    ScheduleHandle { name, cancel, task }
}

pub struct TwitterManager {
    path: PathBuf,
    characters: BTreeMap<String, CharacterCredentials>,
    factory: PosterFactory,
    interval: Duration,
    cancel: CancellationToken,
    handles: Vec<ScheduleHandle>,
}

impl TwitterManager {
    /// Loads the registered characters; a missing file means none.
    pub fn load(
        path: impl Into<PathBuf>,
        factory: PosterFactory,
        cancel: CancellationToken,
    ) -> Result<Self, TwitterError> {
        let path = path.into();
        let store_err = |error: String| TwitterError::Store {
            path: path.display().to_string(),
            error,
        };
        let characters = if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|err| store_err(err.to_string()))?;
            serde_json::from_str(&content).map_err(|err| store_err(err.to_string()))?
        } else {
            BTreeMap::new()
        };
        log::info!(
            path = path.display().to_string(),
            characters = characters.len();
            "twitter characters loaded"
        );
        Ok(Self {
            path,
            characters,
            factory,
            interval: TWEET_INTERVAL,
            cancel,
            handles: Vec::new(),
        })
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn characters(&self) -> Vec<String> {
        self.characters.keys().cloned().collect()
    }

    /// Names of the characters with a running posting task
    pub fn running(&self) -> Vec<String> {
        self.handles
            .iter()
            .filter(|h| !h.is_finished())
            .map(|h| h.name().to_string())
            .collect()
    }

    /// Stores the credentials of a new character and starts its posting task.
    ///
    /// Nothing is kept when the poster cannot be built or the file cannot be
    /// written, so a failed registration can be retried.
    pub fn register(
        &mut self,
        name: String,
        creds: CharacterCredentials,
    ) -> Result<(), TwitterError> {
        if self.characters.contains_key(&name) {
            return Err(TwitterError::Duplicate(name));
        }
        let poster = (self.factory)(&creds).map_err(|err| TwitterError::Client(err.to_string()))?;
        let personality = creds.personality.clone();
        self.characters.insert(name.clone(), creds);
        if let Err(err) = self.save() {
            self.characters.remove(&name);
            return Err(err);
        }
        log::info!(character = name; "character registered for Twitter");
        self.spawn(name, personality, poster);
        Ok(())
    }

    /// Starts the posting task of every stored character not running yet.
    pub fn start_all(&mut self) -> Result<(), TwitterError> {
        for name in self.characters() {
            if !self.handles.iter().any(|h| h.name() == name) {
                self.start(&name)?;
            }
        }
        Ok(())
    }

    /// Stops every posting task.
    pub async fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.shutdown().await;
        }
    }

    fn start(&mut self, name: &str) -> Result<(), TwitterError> {
        let creds = self
            .characters
            .get(name)
            .ok_or_else(|| TwitterError::Client(format!("unknown character {}", name)))?;
        let poster = (self.factory)(creds).map_err(|err| TwitterError::Client(err.to_string()))?;
        let personality = creds.personality.clone();
        self.spawn(name.to_string(), personality, poster);
        Ok(())
    }

    fn spawn(&mut self, name: String, personality: String, poster: Arc<dyn TweetPoster>) {
        let handle = spawn_schedule(name, personality, poster, self.interval, &self.cancel);
        self.handles.push(handle);
    }

    fn save(&self) -> Result<(), TwitterError> {
        let store_err = |error: String| TwitterError::Store {
            path: self.path.display().to_string(),
            error,
        };
        let content =
            serde_json::to_string_pretty(&self.characters).map_err(|err| store_err(err.to_string()))?;
        std::fs::write(&self.path, content).map_err(|err| store_err(err.to_string()))
    }
}
