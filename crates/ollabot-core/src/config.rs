use std::fmt;

use figment::{
    providers::{Env, Format, Toml},
    value::Uncased,
    Figment,
};
use serde::{Deserialize, Deserializer};

use crate::error::{BotError, Result};
use crate::types::ContextMode;

pub const DEFAULT_CONFIG_PATH: &str = "ollabot.toml";
pub const DEFAULT_BOT_NAME: &str = "gpt";
pub const DEFAULT_TRIGGER: &str = "()";
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_HISTORY: usize = 40;

/// Environment variable → config path. These names are the bot's public
/// configuration surface and must not change.
const ENV_KEYS: &[(&str, &str)] = &[
    ("TWITCH_USERNAME", "twitch.username"),
    ("TWITCH_OAUTH", "twitch.oauth"),
    ("TWITCH_CHANNELS", "twitch.channels"),
    ("TWITCHBOTNAME", "twitch.bot_name"),
    ("TRIGGER", "twitch.trigger"),
    ("TWITCH_GREETING", "twitch.greeting"),
    ("OLLAMA_MODEL", "ollama.model"),
    ("OLLAMA_CONTEXT", "ollama.context"),
    ("OLLAMA_SYSTEM", "ollama.system"),
    ("OLLAMA_HOST", "ollama.host"),
    ("OLLAMA_TIMEOUT_SECS", "ollama.timeout_secs"),
    ("OLLAMA_MAX_HISTORY", "ollama.max_history"),
    ("OLLAMA_ERROR_REPLY", "ollama.error_reply"),
];

/// Validated bot configuration (ollabot.toml + environment overrides).
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub twitch: TwitchConfig,
    pub ollama: OllamaConfig,
}

#[derive(Clone)]
pub struct TwitchConfig {
    /// Login name of the bot account.
    pub username: String,
    /// Chat OAuth token, with or without the `oauth:` prefix.
    pub oauth: String,
    /// Channel logins to join (lowercase, no leading `#`).
    pub channels: Vec<String>,
    /// Command name that invokes the LLM (e.g. `gpt` in `()gpt`).
    pub bot_name: String,
    /// Prefix marking a chat message as a command.
    pub trigger: String,
    /// Optional line said in every channel after joining.
    pub greeting: Option<String>,
}

impl TwitchConfig {
    /// The bare token. The IRC client adds the `oauth:` prefix itself.
    pub fn token(&self) -> &str {
        self.oauth.strip_prefix("oauth:").unwrap_or(&self.oauth)
    }
}

impl fmt::Debug for TwitchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitchConfig")
            .field("username", &self.username)
            .field("oauth", &"<redacted>")
            .field("channels", &self.channels)
            .field("bot_name", &self.bot_name)
            .field("trigger", &self.trigger)
            .field("greeting", &self.greeting)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub model: String,
    pub context: ContextMode,
    /// System prompt prepended to every request. Never stored in history.
    pub system: Option<String>,
    /// Base URL without trailing slash.
    pub host: String,
    pub timeout_secs: u64,
    /// Maximum stored messages per history. `0` disables the bound.
    pub max_history: usize,
    /// Reply sent to chat when the LLM call fails. `None` keeps failures silent.
    pub error_reply: Option<String>,
}

impl BotConfig {
    /// Load config from a TOML file with environment overrides.
    ///
    /// The file is optional; every setting can come from the environment
    /// alone (see [`ENV_KEYS`]).
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_PATH);
        Self::from_figment(&Self::figment(path))
    }

    /// The provider stack used by [`BotConfig::load`].
    pub fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::raw().filter_map(map_env_key))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let raw: RawConfig = figment
            .extract()
            .map_err(|e| BotError::Config(e.to_string()))?;
        raw.validate()
    }
}

fn map_env_key(key: &figment::value::UncasedStr) -> Option<Uncased<'_>> {
    ENV_KEYS
        .iter()
        .find(|(env, _)| key.as_str().eq_ignore_ascii_case(env))
        .map(|(_, path)| Uncased::from(*path))
}

// ---------------------------------------------------------------------------
// Raw (unvalidated) layer
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    twitch: RawTwitch,
    #[serde(default)]
    ollama: RawOllama,
}

#[derive(Debug, Default, Deserialize)]
struct RawTwitch {
    #[serde(default, deserialize_with = "de::string")]
    username: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    oauth: Option<String>,
    #[serde(default, deserialize_with = "de::comma_list")]
    channels: Vec<String>,
    #[serde(default, deserialize_with = "de::string")]
    bot_name: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    trigger: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    greeting: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawOllama {
    #[serde(default, deserialize_with = "de::string")]
    model: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    context: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    system: Option<String>,
    #[serde(default, deserialize_with = "de::string")]
    host: Option<String>,
    #[serde(default, deserialize_with = "de::number")]
    timeout_secs: Option<u64>,
    #[serde(default, deserialize_with = "de::number")]
    max_history: Option<u64>,
    #[serde(default, deserialize_with = "de::string")]
    error_reply: Option<String>,
}

impl RawConfig {
    fn validate(self) -> Result<BotConfig> {
        let RawConfig { twitch, ollama } = self;

        let username = required(twitch.username, "twitch.username", "TWITCH_USERNAME")?;
        let oauth = required(twitch.oauth, "twitch.oauth", "TWITCH_OAUTH")?;

        let channels: Vec<String> = twitch
            .channels
            .iter()
            .map(|c| c.trim().trim_start_matches('#').to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if channels.is_empty() {
            return Err(BotError::MissingSetting {
                key: "twitch.channels",
                env: "TWITCH_CHANNELS",
            });
        }

        let bot_name = non_blank(twitch.bot_name)
            .map(|n| n.to_lowercase())
            .unwrap_or_else(|| DEFAULT_BOT_NAME.to_string());
        if bot_name.chars().any(char::is_whitespace) {
            return Err(BotError::Config(format!(
                "bot name `{bot_name}` must be a single word"
            )));
        }

        let model = required(ollama.model, "ollama.model", "OLLAMA_MODEL")?;
        let context = match ollama.context {
            Some(c) => c.parse::<ContextMode>().map_err(BotError::Config)?,
            None => ContextMode::default(),
        };

        let host = non_blank(ollama.host)
            .unwrap_or_else(|| DEFAULT_OLLAMA_HOST.to_string())
            .trim_end_matches('/')
            .to_string();
        if !(host.starts_with("http://") || host.starts_with("https://")) {
            return Err(BotError::Config(format!(
                "OLLAMA_HOST `{host}` must start with http:// or https://"
            )));
        }

        let timeout_secs = ollama.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(BotError::Config(
                "OLLAMA_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let max_history = match ollama.max_history {
            Some(n) => usize::try_from(n)
                .map_err(|_| BotError::Config(format!("OLLAMA_MAX_HISTORY {n} is too large")))?,
            None => DEFAULT_MAX_HISTORY,
        };
        // One message cannot hold a user turn and its reply.
        if max_history == 1 {
            return Err(BotError::Config(
                "OLLAMA_MAX_HISTORY must be 0 (unbounded) or at least 2".to_string(),
            ));
        }

        Ok(BotConfig {
            twitch: TwitchConfig {
                username: username.to_lowercase(),
                oauth,
                channels,
                bot_name,
                // The trigger is matched literally, so surrounding spaces are kept.
                trigger: twitch
                    .trigger
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| DEFAULT_TRIGGER.to_string()),
                greeting: non_blank(twitch.greeting),
            },
            ollama: OllamaConfig {
                model,
                context,
                system: non_blank(ollama.system),
                host,
                timeout_secs,
                max_history,
                error_reply: non_blank(ollama.error_reply),
            },
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, key: &'static str, env: &'static str) -> Result<String> {
    non_blank(value).ok_or(BotError::MissingSetting { key, env })
}

/// Lenient deserializers: environment values arrive as whatever figment
/// parsed them into (`"123"` becomes a number), and empty values mean unset.
mod de {
    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    impl Scalar {
        fn into_string(self) -> String {
            match self {
                Scalar::Str(s) => s,
                Scalar::Int(n) => n.to_string(),
                Scalar::Float(n) => n.to_string(),
                Scalar::Bool(b) => b.to_string(),
            }
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
        let value = Option::<Scalar>::deserialize(d)?;
        Ok(value.map(Scalar::into_string).filter(|s| !s.is_empty()))
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<u64>, D::Error> {
        match Option::<Scalar>::deserialize(d)? {
            None => Ok(None),
            Some(Scalar::Int(n)) => u64::try_from(n)
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected a non-negative number, got {n}"))),
            Some(Scalar::Str(s)) if s.trim().is_empty() => Ok(None),
            Some(Scalar::Str(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| serde::de::Error::custom(format!("expected a number, got `{s}`"))),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected a number, got `{}`",
                other.into_string()
            ))),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrString {
        List(Vec<String>),
        One(Scalar),
    }

    pub fn comma_list<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
        Ok(match Option::<ListOrString>::deserialize(d)? {
            None => Vec::new(),
            Some(ListOrString::List(items)) => items,
            Some(ListOrString::One(s)) => s
                .into_string()
                .split(',')
                .map(str::to_string)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn base_env(jail: &mut Jail) {
        jail.set_env("TWITCH_USERNAME", "OllaBot");
        jail.set_env("TWITCH_OAUTH", "oauth:abc123");
        jail.set_env("TWITCH_CHANNELS", "#Forsen, nouryxd,,");
        jail.set_env("OLLAMA_MODEL", "llama3");
    }

    fn load(jail: &Jail) -> Result<BotConfig> {
        let path = jail.directory().join(DEFAULT_CONFIG_PATH);
        BotConfig::load(path.to_str())
    }

    #[test]
    fn env_only_config_applies_defaults() {
        Jail::expect_with(|jail| {
            base_env(jail);
            let cfg = load(jail).expect("config should load");
            assert_eq!(cfg.twitch.username, "ollabot");
            assert_eq!(cfg.twitch.token(), "abc123");
            assert_eq!(cfg.twitch.channels, vec!["forsen", "nouryxd"]);
            assert_eq!(cfg.twitch.bot_name, DEFAULT_BOT_NAME);
            assert_eq!(cfg.twitch.trigger, DEFAULT_TRIGGER);
            assert_eq!(cfg.twitch.greeting, None);
            assert_eq!(cfg.ollama.model, "llama3");
            assert_eq!(cfg.ollama.context, ContextMode::None);
            assert_eq!(cfg.ollama.host, DEFAULT_OLLAMA_HOST);
            assert_eq!(cfg.ollama.timeout_secs, DEFAULT_TIMEOUT_SECS);
            assert_eq!(cfg.ollama.max_history, DEFAULT_MAX_HISTORY);
            assert!(cfg.ollama.system.is_none());
            Ok(())
        });
    }

    #[test]
    fn env_overrides_every_setting() {
        Jail::expect_with(|jail| {
            base_env(jail);
            jail.set_env("TWITCHBOTNAME", "Ask");
            jail.set_env("TRIGGER", "!");
            jail.set_env("OLLAMA_CONTEXT", "user");
            jail.set_env("OLLAMA_SYSTEM", "You are a Twitch chat bot.");
            jail.set_env("OLLAMA_HOST", "http://gpu-box:11434/");
            jail.set_env("OLLAMA_TIMEOUT_SECS", "15");
            jail.set_env("OLLAMA_MAX_HISTORY", "0");
            jail.set_env("OLLAMA_ERROR_REPLY", "the model is asleep");
            let cfg = load(jail).expect("config should load");
            assert_eq!(cfg.twitch.bot_name, "ask");
            assert_eq!(cfg.twitch.trigger, "!");
            assert_eq!(cfg.ollama.context, ContextMode::User);
            assert_eq!(cfg.ollama.system.as_deref(), Some("You are a Twitch chat bot."));
            assert_eq!(cfg.ollama.host, "http://gpu-box:11434");
            assert_eq!(cfg.ollama.timeout_secs, 15);
            assert_eq!(cfg.ollama.max_history, 0);
            assert_eq!(cfg.ollama.error_reply.as_deref(), Some("the model is asleep"));
            Ok(())
        });
    }

    #[test]
    fn empty_env_values_count_as_unset() {
        Jail::expect_with(|jail| {
            base_env(jail);
            jail.set_env("TWITCHBOTNAME", "");
            jail.set_env("TRIGGER", "");
            jail.set_env("OLLAMA_CONTEXT", "");
            jail.set_env("OLLAMA_SYSTEM", "");
            jail.set_env("OLLAMA_TIMEOUT_SECS", "");
            let cfg = load(jail).expect("config should load");
            assert_eq!(cfg.twitch.bot_name, DEFAULT_BOT_NAME);
            assert_eq!(cfg.twitch.trigger, DEFAULT_TRIGGER);
            assert_eq!(cfg.ollama.context, ContextMode::None);
            assert!(cfg.ollama.system.is_none());
            assert_eq!(cfg.ollama.timeout_secs, DEFAULT_TIMEOUT_SECS);
            Ok(())
        });
    }

    #[test]
    fn toml_file_is_read_and_env_wins() {
        Jail::expect_with(|jail| {
            jail.create_file(
                DEFAULT_CONFIG_PATH,
                r#"
                [twitch]
                username = "filebot"
                oauth = "fromfile"
                channels = ["one", "two"]

                [ollama]
                model = "mistral"
                context = "general"
                max_history = 10
                "#,
            )?;
            jail.set_env("OLLAMA_MODEL", "llama3");
            let cfg = load(jail).expect("config should load");
            assert_eq!(cfg.twitch.username, "filebot");
            assert_eq!(cfg.twitch.channels, vec!["one", "two"]);
            assert_eq!(cfg.ollama.model, "llama3");
            assert_eq!(cfg.ollama.context, ContextMode::General);
            assert_eq!(cfg.ollama.max_history, 10);
            Ok(())
        });
    }

    #[test]
    fn missing_required_setting_is_config_error() {
        Jail::expect_with(|jail| {
            jail.set_env("TWITCH_USERNAME", "bot");
            jail.set_env("TWITCH_OAUTH", "abc");
            jail.set_env("TWITCH_CHANNELS", "forsen");
            let err = load(jail).unwrap_err();
            assert!(matches!(err, BotError::MissingSetting { .. }));
            assert!(err.to_string().contains("OLLAMA_MODEL"), "{err}");
            Ok(())
        });
    }

    #[test]
    fn missing_channels_is_config_error() {
        Jail::expect_with(|jail| {
            base_env(jail);
            jail.set_env("TWITCH_CHANNELS", " , ");
            let err = load(jail).unwrap_err();
            assert!(err.to_string().contains("TWITCH_CHANNELS"), "{err}");
            Ok(())
        });
    }

    #[test]
    fn invalid_context_mode_is_config_error() {
        Jail::expect_with(|jail| {
            base_env(jail);
            jail.set_env("OLLAMA_CONTEXT", "channel");
            let err = load(jail).unwrap_err();
            assert!(matches!(err, BotError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn history_bound_of_one_is_rejected() {
        Jail::expect_with(|jail| {
            base_env(jail);
            jail.set_env("OLLAMA_MAX_HISTORY", "1");
            let err = load(jail).unwrap_err();
            assert!(matches!(err, BotError::Config(_)));
            assert!(err.to_string().contains("OLLAMA_MAX_HISTORY"), "{err}");

            jail.set_env("OLLAMA_MAX_HISTORY", "2");
            assert_eq!(load(jail).expect("config should load").ollama.max_history, 2);
            Ok(())
        });
    }

    #[test]
    fn debug_output_redacts_oauth() {
        Jail::expect_with(|jail| {
            base_env(jail);
            let cfg = load(jail).expect("config should load");
            let dbg = format!("{:?}", cfg);
            assert!(!dbg.contains("abc123"));
            assert!(dbg.contains("<redacted>"));
            Ok(())
        });
    }
}
