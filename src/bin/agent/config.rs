use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use grasp_agent::browser::{ChromeOptions, DEFAULT_FALLBACK_URL, DEFAULT_START_URL, SessionOptions};
use grasp_agent::providers::ProviderKind;
use grasp_agent::{AgentOptions, Dimensions, MAX_TURNS_PER_TASK};

/// Command line, with every flag also readable from the environment (and `.env`).
#[derive(Debug, Parser)]
#[command(name = "agent", about = "LLM-driven browser agent with a web dashboard")]
pub struct Config {
    /// LLM backend: anthropic, openai, azure, bedrock or openrouter.
    #[arg(long, env = "MODEL_PROVIDER", default_value = "anthropic", value_parser = parse_provider)]
    pub provider: ProviderKind,

    /// First port to try for the dashboard; the next nine are fallbacks.
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    #[arg(long, env = "HEADLESS", default_value_t = false)]
    pub headless: bool,

    /// Chrome binary to launch.
    #[arg(long, env = "CHROME_PATH")]
    pub chrome: Option<PathBuf>,

    /// Attach to a running Chrome (`ws://...` debugger URL) instead of launching one.
    #[arg(long, env = "CHROME_WS_URL")]
    pub attach: Option<String>,

    /// Chrome profile directory. Defaults to the platform data dir.
    #[arg(long, env = "USER_DATA_DIR")]
    pub user_data_dir: Option<PathBuf>,

    #[arg(long, env = "VIEWPORT_WIDTH", default_value_t = 1024)]
    pub width: u32,

    #[arg(long, env = "VIEWPORT_HEIGHT", default_value_t = 768)]
    pub height: u32,

    #[arg(long, env = "START_URL", default_value = DEFAULT_START_URL)]
    pub start_url: String,

    /// JSON file of `{"domain": {"username", "password"}}`.
    #[arg(long, env = "CREDENTIALS_FILE")]
    pub credentials: Option<PathBuf>,

    #[arg(long, env = "MAX_TURNS", default_value_t = MAX_TURNS_PER_TASK)]
    pub max_turns: usize,

    /// Seconds to wait for one model reply.
    #[arg(long, env = "PROVIDER_TIMEOUT_SECS", default_value_t = 300)]
    pub provider_timeout: u64,
}

fn parse_provider(raw: &str) -> Result<ProviderKind, String> {
    raw.parse().map_err(|e: grasp_agent::ProviderError| e.to_string())
}

impl Config {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    pub fn chrome_options(&self) -> ChromeOptions {
        ChromeOptions {
            headless: self.headless,
            executable: self.chrome.clone(),
            user_data_dir: self.user_data_dir.clone().or_else(default_profile_dir),
            attach_url: self.attach.clone(),
            dimensions: self.dimensions(),
            ..ChromeOptions::default()
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            start_url: self.start_url.clone(),
            fallback_url: DEFAULT_FALLBACK_URL.to_string(),
            ..SessionOptions::default()
        }
    }

    pub fn agent_options(&self) -> AgentOptions {
        AgentOptions {
            max_turns: self.max_turns,
            provider_timeout: Duration::from_secs(self.provider_timeout),
        }
    }
}

fn default_profile_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("grasp-agent").join("chrome-profile"))
}
