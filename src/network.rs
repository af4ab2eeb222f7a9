use crate::{
    Result,
    categories::CategoryProvider,
    message::{ErrorCode, GameMessage},
    registry::LobbyRegistry,
    room::Room,
};
use axum::{
    Router,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::Html,
    routing::get,
};
use futures_util::{SinkExt, StreamExt};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error};
use uuid::Uuid;

/// WebSocket服务器，负责连接升级、消息解析和到大厅的分发
pub struct WebSocketServer {
    registry: Arc<LobbyRegistry>,
}

impl WebSocketServer {
    pub fn new() -> Self {
        let config = crate::config::Config::get();
        let categories = Arc::new(CategoryProvider::new());

        WebSocketServer {
            registry: Arc::new(LobbyRegistry::new(categories, config.game_rules())),
        }
    }

    pub fn registry(&self) -> Arc<LobbyRegistry> {
        self.registry.clone()
    }

    /// 启动服务器：静态页面 + WebSocket 升级路由
    pub async fn start(&self, addr: &str) -> Result<()> {
        let config = crate::config::Config::get();

        // CORS 与原版一致，默认放开所有来源
        let cors = if config.cors.allow_all_origins.unwrap_or(true) {
            CorsLayer::new().allow_origin(Any).allow_methods(Any)
        } else if let Some(allowed_origins) = &config.cors.allowed_origins {
            let origins = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse::<axum::http::HeaderValue>().ok())
                .collect::<Vec<_>>();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        } else {
            CorsLayer::new().allow_origin(Any).allow_methods(Any)
        };

        let app = Router::new()
            .route("/", get(serve_index))
            .route("/index.html", get(serve_index))
            .route(
                "/ws",
                get({
                    let registry = self.registry.clone();
                    move |ws: WebSocketUpgrade| {
                        let registry = registry.clone();
                        async move {
                            ws.on_upgrade(move |socket| handle_connection(socket, registry))
                        }
                    }
                }),
            )
            .layer(cors);

        let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
            error!("绑定地址失败: {} - {}", addr, e);
            crate::Error::Network(anyhow::anyhow!(e))
        })?;

        axum::serve(listener, app)
            .await
            .map_err(|e| crate::Error::Network(anyhow::anyhow!(e)))?;
        Ok(())
    }
}

/// 提供index.html文件
async fn serve_index() -> Html<String> {
    let index_path = Path::new("public/index.html");
    match fs::read_to_string(index_path) {
        Ok(content) => Html(content),
        Err(e) => {
            error!("读取index.html失败: {}", e);
            Html("<h1>404 Not Found</h1>".to_string())
        }
    }
}

/// 处理单个WebSocket连接的整个生命周期
async fn handle_connection(socket: WebSocket, registry: Arc<LobbyRegistry>) {
    // 连接标识在整个会话中不变，断线重连拿到的是新连接、新标识
    let connection_id = Uuid::new_v4().to_string();
    debug!("新连接: {}", connection_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<GameMessage>(100);

    // 出站消息泵：大厅广播和单发都经由这个通道串行写出
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(text) => {
                    if let Err(e) = ws_sender.send(Message::Text(text)).await {
                        error!("发送消息失败: {}", e);
                        break;
                    }
                }
                Err(e) => error!("消息序列化失败: {}", e),
            }
        }
    });

    // 这个连接加入的房间，断开时用来触发宽限期处理
    let mut joined_room: Option<Arc<Room>> = None;

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<GameMessage>(&text) {
                Ok(message) => {
                    dispatch_message(message, &connection_id, &registry, &tx, &mut joined_room)
                        .await;
                }
                Err(e) => {
                    error!("解析消息失败: {}", e);
                    let _ = tx.send(GameMessage::error(ErrorCode::ParseError)).await;
                }
            },
            Ok(Message::Close(_)) => {
                debug!("收到关闭消息: {}", connection_id);
                break;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Binary(_)) => {
                debug!("收到二进制消息，忽略");
            }
            Err(e) => {
                error!("WebSocket错误: {}", e);
                break;
            }
        }
    }

    // 意外断开走宽限期流程，而不是立刻移除
    if let Some(room) = joined_room.take() {
        room.handle_disconnect(&connection_id).await;
    }

    send_task.abort();
    debug!("连接关闭: {}", connection_id);
}

/// 按事件类型分发入站消息。create-lobby 在这里直接处理，
/// 其余消息按大厅码路由到对应的房间。
async fn dispatch_message(
    message: GameMessage,
    connection_id: &str,
    registry: &Arc<LobbyRegistry>,
    tx: &mpsc::Sender<GameMessage>,
    joined_room: &mut Option<Arc<Room>>,
) {
    match message.type_.as_str() {
        "create-lobby" => {
            let Some(name) = payload_str(&message, "name") else {
                let _ = tx.send(GameMessage::error(ErrorCode::InvalidPayload)).await;
                return;
            };

            let room = registry.create(connection_id.to_string(), &name);
            room.register_channel(connection_id.to_string(), tx.clone());

            let players = room.players_json().await;
            let _ = tx
                .send(GameMessage::new(
                    "lobby-created",
                    serde_json::json!({ "code": room.code(), "players": players }),
                ))
                .await;
            *joined_room = Some(room);
        }
        "rejoin-lobby" => {
            let Some(code) = payload_str(&message, "code") else {
                let _ = tx.send(GameMessage::new("rejoin-failed", serde_json::json!({}))).await;
                return;
            };
            // 大厅不存在时重连失败，不报错误事件
            let Some(room) = registry.lookup(&code) else {
                let _ = tx.send(GameMessage::new("rejoin-failed", serde_json::json!({}))).await;
                return;
            };

            // 守卫失败统一回 rejoin-failed，连接不记为已加入
            match room
                .handle_message(connection_id, message, Some(tx.clone()))
                .await
            {
                Ok(()) => *joined_room = Some(room),
                Err(e) => {
                    debug!("重连失败: {}", e);
                    let _ = tx
                        .send(GameMessage::new("rejoin-failed", serde_json::json!({})))
                        .await;
                }
            }
        }
        "join-lobby" => {
            let Some(room) = lookup_or_report(&message, registry, tx).await else {
                return;
            };
            if forward(&room, connection_id, message, Some(tx.clone()), tx).await {
                *joined_room = Some(room);
            }
        }
        "start-game" | "submit-clue" | "submit-vote" | "chameleon-guess" | "play-again" => {
            let Some(room) = lookup_or_report(&message, registry, tx).await else {
                return;
            };
            forward(&room, connection_id, message, None, tx).await;
        }
        "leave-lobby" => {
            let Some(room) = lookup_or_report(&message, registry, tx).await else {
                return;
            };
            if forward(&room, connection_id, message, None, tx).await {
                *joined_room = None;
            }
        }
        other => {
            debug!("未知的消息类型: {}", other);
            let _ = tx.send(GameMessage::error(ErrorCode::ParseError)).await;
        }
    }
}

/// 按消息里的大厅码查房间，查不到直接把错误回给发送方
async fn lookup_or_report(
    message: &GameMessage,
    registry: &Arc<LobbyRegistry>,
    tx: &mpsc::Sender<GameMessage>,
) -> Option<Arc<Room>> {
    let Some(code) = payload_str(message, "code") else {
        let _ = tx.send(GameMessage::error(ErrorCode::InvalidPayload)).await;
        return None;
    };

    match registry.lookup(&code) {
        Some(room) => Some(room),
        None => {
            let _ = tx.send(GameMessage::error(ErrorCode::LobbyNotFound)).await;
            None
        }
    }
}

/// 把消息交给房间处理；守卫失败只回给出错的连接。返回是否处理成功。
async fn forward(
    room: &Arc<Room>,
    connection_id: &str,
    message: GameMessage,
    player_tx: Option<mpsc::Sender<GameMessage>>,
    tx: &mpsc::Sender<GameMessage>,
) -> bool {
    match room.handle_message(connection_id, message, player_tx).await {
        Ok(()) => true,
        Err(crate::Error::Game(e)) => {
            debug!("事件被拒绝: {}", e);
            let _ = tx.send(GameMessage::error(ErrorCode::from(&e))).await;
            false
        }
        Err(e) => {
            error!("处理消息失败: {}", e);
            let _ = tx
                .send(GameMessage::new(
                    "error",
                    serde_json::json!({
                        "code": "internal-error",
                        "message": e.to_string(),
                    }),
                ))
                .await;
            false
        }
    }
}

/// 取负载里的字符串字段，空白视为缺失
fn payload_str(message: &GameMessage, key: &str) -> Option<String> {
    message.data[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
