use clap::Parser;

use crate::config::AppConfig;
use crate::store::FeedMode;
use crate::strategy::ThinkerKind;

#[derive(Parser, Debug)]
#[command(name = "checkers-bot")]
#[command(version = "0.1.0")]
#[command(about = "Checkers bot that votes on moves through a Sync Gateway game document", long_about = None)]
pub struct Cli {
    /// Team to play for: RED or BLUE
    #[arg(short, long, env = "CHECKERS_TEAM")]
    pub team: Option<String>,

    /// Sync Gateway database URL
    #[arg(long = "sync-gateway-url", env = "CHECKERS_SYNC_GATEWAY_URL")]
    pub sync_gateway_url: Option<String>,

    /// Change feed type: longpoll or normal
    #[arg(short, long, value_parser = parse_feed_mode)]
    pub feed: Option<FeedMode>,

    /// Move selection: random or first
    #[arg(long)]
    pub thinker: Option<ThinkerKind>,

    /// Stop after this many finished games
    #[arg(long)]
    pub max_games: Option<u64>,

    /// Directory holding default.toml and environment overrides
    #[arg(short, long, default_value = "config")]
    pub config_dir: String,

    /// Emit JSON formatted logs
    #[arg(long)]
    pub json_logs: bool,
}

fn parse_feed_mode(raw: &str) -> Result<FeedMode, String> {
    raw.parse()
}

impl Cli {
    /// Command-line values win over files and environment
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(team) = &self.team {
            config.bot.team = Some(team.clone());
        }
        if let Some(url) = &self.sync_gateway_url {
            config.store.url = url.clone();
        }
        if let Some(mode) = self.feed {
            config.feed.mode = mode;
        }
        if let Some(thinker) = self.thinker {
            config.bot.thinker = thinker;
        }
        if let Some(max_games) = self.max_games {
            config.bot.max_games = Some(max_games);
        }
        if self.json_logs {
            config.logging.json = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TeamId;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "checkers-bot",
            "--team",
            "blue",
            "--sync-gateway-url",
            "http://gw:4984/checkers",
            "--feed",
            "normal",
            "--thinker",
            "first",
        ])
        .unwrap();

        let mut config = AppConfig::load_from(std::env::temp_dir().join("checkers-bot-no-config")).unwrap();
        cli.apply(&mut config);

        assert_eq!(config.team().unwrap(), TeamId::Blue);
        assert_eq!(config.store.url, "http://gw:4984/checkers");
        assert_eq!(config.feed.mode, FeedMode::Poll);
        assert_eq!(config.bot.thinker, ThinkerKind::First);
    }

    #[test]
    fn test_unknown_feed_rejected() {
        assert!(Cli::try_parse_from(["checkers-bot", "--feed", "continuous"]).is_err());
    }
}
