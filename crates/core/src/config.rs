use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_SLACK_API_BASE_URL: &str = "https://slack.com/api";
pub const DEFAULT_INFO_TEXT: &str = "상세한 내용은 안내책자 참고";
pub const DEFAULT_BUTTON_LABEL: &str = "연말정산 안내 PDF 다운로드";
pub const DEFAULT_BUTTON_URL: &str =
    "https://www.nts.go.kr/comm/nttFileDownload.do?fileKey=143949cdeade82ab901580cd2f2a68ae";
pub const DEFAULT_BUTTON_VALUE: &str = "click_me_123";
pub const DEFAULT_BUTTON_ACTION_ID: &str = "button-action";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub slack: SlackConfig,
    pub flowise: FlowiseConfig,
    pub reply: ReplyConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct SlackConfig {
    pub bot_token: SecretString,
    pub signing_secret: SecretString,
    pub app_token: SecretString,
    pub slash_command: String,
    pub api_base_url: String,
}

impl SlackConfig {
    /// The slash command as Slack sends it, always with a leading `/`.
    pub fn command_name(&self) -> String {
        let trimmed = self.slash_command.trim().trim_start_matches('/');
        format!("/{trimmed}")
    }
}

#[derive(Clone, Debug)]
pub struct FlowiseConfig {
    pub api_endpoint: String,
    pub api_key: Option<SecretString>,
    pub timeout_secs: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplyConfig {
    pub bot_title: String,
    pub info_text: String,
    pub button_label: String,
    pub button_url: String,
    pub button_value: String,
    pub button_action_id: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            bot_title: String::new(),
            info_text: DEFAULT_INFO_TEXT.to_string(),
            button_label: DEFAULT_BUTTON_LABEL.to_string(),
            button_url: DEFAULT_BUTTON_URL.to_string(),
            button_value: DEFAULT_BUTTON_VALUE.to_string(),
            button_action_id: DEFAULT_BUTTON_ACTION_ID.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub startup_failure_delay_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub slack_bot_token: Option<String>,
    pub slack_signing_secret: Option<String>,
    pub slack_app_token: Option<String>,
    pub slash_command: Option<String>,
    pub slack_api_base_url: Option<String>,
    pub flowise_api_endpoint: Option<String>,
    pub flowise_api_key: Option<String>,
    pub bot_title: Option<String>,
    pub port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            slack: SlackConfig {
                bot_token: secret_value(String::new()),
                signing_secret: secret_value(String::new()),
                app_token: secret_value(String::new()),
                slash_command: String::new(),
                api_base_url: DEFAULT_SLACK_API_BASE_URL.to_string(),
            },
            flowise: FlowiseConfig { api_endpoint: String::new(), api_key: None, timeout_secs: None },
            reply: ReplyConfig::default(),
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 3000,
                startup_failure_delay_secs: 60,
            },
            logging: LoggingConfig { level: "debug".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("flowbot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(slack) = patch.slack {
            if let Some(bot_token) = slack.bot_token {
                self.slack.bot_token = secret_value(bot_token);
            }
            if let Some(signing_secret) = slack.signing_secret {
                self.slack.signing_secret = secret_value(signing_secret);
            }
            if let Some(app_token) = slack.app_token {
                self.slack.app_token = secret_value(app_token);
            }
            if let Some(slash_command) = slack.slash_command {
                self.slack.slash_command = slash_command;
            }
            if let Some(api_base_url) = slack.api_base_url {
                self.slack.api_base_url = api_base_url;
            }
        }

        if let Some(flowise) = patch.flowise {
            if let Some(api_endpoint) = flowise.api_endpoint {
                self.flowise.api_endpoint = api_endpoint;
            }
            if let Some(api_key) = flowise.api_key {
                self.flowise.api_key = Some(secret_value(api_key));
            }
            if let Some(timeout_secs) = flowise.timeout_secs {
                self.flowise.timeout_secs = Some(timeout_secs);
            }
        }

        if let Some(reply) = patch.reply {
            if let Some(bot_title) = reply.bot_title {
                self.reply.bot_title = bot_title;
            }
            if let Some(info_text) = reply.info_text {
                self.reply.info_text = info_text;
            }
            if let Some(button_label) = reply.button_label {
                self.reply.button_label = button_label;
            }
            if let Some(button_url) = reply.button_url {
                self.reply.button_url = button_url;
            }
            if let Some(button_value) = reply.button_value {
                self.reply.button_value = button_value;
            }
            if let Some(button_action_id) = reply.button_action_id {
                self.reply.button_action_id = button_action_id;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(startup_failure_delay_secs) = server.startup_failure_delay_secs {
                self.server.startup_failure_delay_secs = startup_failure_delay_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BOT_TOKEN") {
            self.slack.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("SIGNING_SECRET") {
            self.slack.signing_secret = secret_value(value);
        }
        if let Some(value) = read_env("APP_TOKEN") {
            self.slack.app_token = secret_value(value);
        }
        if let Some(value) = read_env("SLASH_COMMAND") {
            self.slack.slash_command = value;
        }
        if let Some(value) = read_env("SLACK_API_BASE_URL") {
            self.slack.api_base_url = value;
        }

        if let Some(value) = read_env("FLOWISE_API_ENDPOINT") {
            self.flowise.api_endpoint = value;
        }
        if let Some(value) = read_env("FLOWISE_API_KEY") {
            self.flowise.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("FLOWISE_TIMEOUT_SECS") {
            self.flowise.timeout_secs = Some(parse_u64("FLOWISE_TIMEOUT_SECS", &value)?);
        }

        if let Some(value) = read_env("BOT_TITLE") {
            self.reply.bot_title = value;
        }
        if let Some(value) = read_env("REPLY_INFO_TEXT") {
            self.reply.info_text = value;
        }
        if let Some(value) = read_env("REPLY_BUTTON_LABEL") {
            self.reply.button_label = value;
        }
        if let Some(value) = read_env("REPLY_BUTTON_URL") {
            self.reply.button_url = value;
        }

        if let Some(value) = read_env("SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PORT") {
            self.server.port = parse_u16("PORT", &value)?;
        }
        if let Some(value) = read_env("STARTUP_FAILURE_DELAY_SECS") {
            self.server.startup_failure_delay_secs =
                parse_u64("STARTUP_FAILURE_DELAY_SECS", &value)?;
        }

        if let Some(value) = read_env("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bot_token) = overrides.slack_bot_token {
            self.slack.bot_token = secret_value(bot_token);
        }
        if let Some(signing_secret) = overrides.slack_signing_secret {
            self.slack.signing_secret = secret_value(signing_secret);
        }
        if let Some(app_token) = overrides.slack_app_token {
            self.slack.app_token = secret_value(app_token);
        }
        if let Some(slash_command) = overrides.slash_command {
            self.slack.slash_command = slash_command;
        }
        if let Some(api_base_url) = overrides.slack_api_base_url {
            self.slack.api_base_url = api_base_url;
        }
        if let Some(api_endpoint) = overrides.flowise_api_endpoint {
            self.flowise.api_endpoint = api_endpoint;
        }
        if let Some(api_key) = overrides.flowise_api_key {
            self.flowise.api_key = Some(secret_value(api_key));
        }
        if let Some(bot_title) = overrides.bot_title {
            self.reply.bot_title = bot_title;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_slack(&self.slack)?;
        validate_flowise(&self.flowise)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("flowbot.toml"), PathBuf::from("config/flowbot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_slack(slack: &SlackConfig) -> Result<(), ConfigError> {
    let bot_token = slack.bot_token.expose_secret();
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.bot_token is required (env `BOT_TOKEN`). Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_string(),
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.bot_token must start with `xoxb-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    if slack.signing_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.signing_secret is required (env `SIGNING_SECRET`). Get it from https://api.slack.com/apps > Your App > Basic Information > Signing Secret".to_string(),
        ));
    }

    let app_token = slack.app_token.expose_secret();
    if app_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "slack.app_token is required (env `APP_TOKEN`). Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_string(),
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "slack.app_token must start with `xapp-`{hint}. Get it from https://api.slack.com/apps"
        )));
    }

    let command = slack.slash_command.trim().trim_start_matches('/');
    if command.is_empty() {
        return Err(ConfigError::Validation(
            "slack.slash_command is required (env `SLASH_COMMAND`)".to_string(),
        ));
    }
    if command.chars().any(char::is_whitespace) {
        return Err(ConfigError::Validation(
            "slack.slash_command must be a single word such as `ask`".to_string(),
        ));
    }

    if !is_http_url(&slack.api_base_url) {
        return Err(ConfigError::Validation(
            "slack.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_flowise(flowise: &FlowiseConfig) -> Result<(), ConfigError> {
    if flowise.api_endpoint.trim().is_empty() {
        return Err(ConfigError::Validation(
            "flowise.api_endpoint is required (env `FLOWISE_API_ENDPOINT`)".to_string(),
        ));
    }
    if !is_http_url(&flowise.api_endpoint) {
        return Err(ConfigError::Validation(
            "flowise.api_endpoint must start with http:// or https://".to_string(),
        ));
    }

    if let Some(timeout_secs) = flowise.timeout_secs {
        if timeout_secs == 0 || timeout_secs > 300 {
            return Err(ConfigError::Validation(
                "flowise.timeout_secs must be in range 1..=300".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    slack: Option<SlackPatch>,
    flowise: Option<FlowisePatch>,
    reply: Option<ReplyPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct SlackPatch {
    bot_token: Option<String>,
    signing_secret: Option<String>,
    app_token: Option<String>,
    slash_command: Option<String>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FlowisePatch {
    api_endpoint: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReplyPatch {
    bot_title: Option<String>,
    info_text: Option<String>,
    button_label: Option<String>,
    button_url: Option<String>,
    button_value: Option<String>,
    button_action_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    startup_failure_delay_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
