use serde::{Deserialize, Serialize};

/// 统一的消息信封，事件名与负载都遵循前端协议（kebab-case）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMessage {
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl GameMessage {
    pub fn new(type_: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            type_: type_.into(),
            data,
        }
    }

    /// 构造连接级错误消息，只发给出错的连接
    pub fn error(code: ErrorCode) -> Self {
        Self::new(
            "error",
            serde_json::json!({
                "code": code.as_str(),
                "message": code.message(),
            }),
        )
    }
}

/// 错误码：全部为非致命、连接级错误，不会影响其他大厅
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    LobbyNotFound,
    GameInProgress,
    LobbyFull,
    NameTaken,
    NotHost,
    InsufficientPlayers,
    NotYourTurn,
    AlreadyVoted,
    InvalidPhase,
    InvalidPayload,
    PlayerNotFound,
    ParseError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::LobbyNotFound => "lobby-not-found",
            ErrorCode::GameInProgress => "game-in-progress",
            ErrorCode::LobbyFull => "lobby-full",
            ErrorCode::NameTaken => "name-taken",
            ErrorCode::NotHost => "not-host",
            ErrorCode::InsufficientPlayers => "insufficient-players",
            ErrorCode::NotYourTurn => "not-your-turn",
            ErrorCode::AlreadyVoted => "already-voted",
            ErrorCode::InvalidPhase => "invalid-phase",
            ErrorCode::InvalidPayload => "invalid-payload",
            ErrorCode::PlayerNotFound => "player-not-found",
            ErrorCode::ParseError => "parse-error",
        }
    }

    /// 发给客户端的英文提示，与原版前端文案保持一致
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::LobbyNotFound => "Lobby not found",
            ErrorCode::GameInProgress => "Game already in progress",
            ErrorCode::LobbyFull => "Lobby is full",
            ErrorCode::NameTaken => "Name already taken",
            ErrorCode::NotHost => "Only the host can do that",
            ErrorCode::InsufficientPlayers => "Need at least 3 players",
            ErrorCode::NotYourTurn => "Not your turn",
            ErrorCode::AlreadyVoted => "You have already voted",
            ErrorCode::InvalidPhase => "Action not allowed in the current phase",
            ErrorCode::InvalidPayload => "Missing or invalid message payload",
            ErrorCode::PlayerNotFound => "Player not found in this lobby",
            ErrorCode::ParseError => "Malformed message",
        }
    }
}

impl From<&crate::game::GameError> for ErrorCode {
    fn from(error: &crate::game::GameError) -> Self {
        use crate::game::GameError;
        match error {
            GameError::LobbyFull => ErrorCode::LobbyFull,
            GameError::GameInProgress => ErrorCode::GameInProgress,
            GameError::NameTaken => ErrorCode::NameTaken,
            GameError::NotHost => ErrorCode::NotHost,
            GameError::InsufficientPlayers(_) => ErrorCode::InsufficientPlayers,
            GameError::NotYourTurn => ErrorCode::NotYourTurn,
            GameError::InvalidPhase => ErrorCode::InvalidPhase,
            GameError::InvalidPayload => ErrorCode::InvalidPayload,
            GameError::PlayerNotFound => ErrorCode::PlayerNotFound,
        }
    }
}
