use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

static CONFIG: OnceCell<Config> = OnceCell::new();

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub game: GameConfig,
    pub log: LogConfig,
    pub cors: CorsConfig,
    pub word_bank: WordBankConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct GameConfig {
    pub min_players: usize,
    pub max_players: usize,
    /// 每个阶段的提示时长（秒），只作为截止时间广播给客户端，服务端不强制
    pub round_time_limit: u64,
    /// 断线宽限期（秒），超时后才真正移除玩家
    pub grace_period: u64,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CorsConfig {
    pub allow_all_origins: Option<bool>,
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WordBankConfig {
    pub file_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3456)?
            .set_default("game.min_players", 3)?
            .set_default("game.max_players", 10)?
            .set_default("game.round_time_limit", 60)?
            .set_default("game.grace_period", 5)?
            .set_default("log.level", "info")?
            .set_default("cors.allow_all_origins", true)?
            .set_default("word_bank.file_path", "words.json")?
            .add_source(config::File::with_name("config").required(false))
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    /// 初始化全局配置
    pub fn init() -> Result<()> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| anyhow::anyhow!("配置已经初始化"))?;
        Ok(())
    }

    /// 获取全局配置实例
    pub fn get() -> &'static Config {
        CONFIG.get().expect("配置未初始化，请先调用 Config::init()")
    }

    pub fn server_addr(&self) -> SocketAddr {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .expect("Invalid server address")
    }

    pub fn round_time_limit(&self) -> Duration {
        Duration::from_secs(self.game.round_time_limit)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.game.grace_period)
    }

    /// 游戏规则快照，传入纯状态机，避免核心逻辑依赖全局配置
    pub fn game_rules(&self) -> crate::game::GameRules {
        crate::game::GameRules {
            min_players: self.game.min_players,
            max_players: self.game.max_players,
            round_time_limit: self.round_time_limit(),
            grace_period: self.grace_period(),
        }
    }

    pub fn log_filter(&self) -> String {
        format!("chameleon_server={}", self.log.level)
    }
}
