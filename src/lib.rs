pub mod categories;
pub mod config;
pub mod game;
pub mod message;
pub mod network;
pub mod registry;
pub mod room;

pub use categories::CategoryProvider;
pub use config::Config;
pub use game::{GameError, Lobby};
pub use message::GameMessage;
pub use network::WebSocketServer;
pub use registry::LobbyRegistry;
pub use room::Room;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("网络错误: {0}")]
    Network(#[from] anyhow::Error),
    #[error("游戏错误: {0}")]
    Game(#[from] game::GameError),
    #[error("房间错误: {0}")]
    Room(String),
    #[error("配置错误: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
