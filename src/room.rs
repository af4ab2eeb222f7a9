use crate::Result;
use crate::categories::CategoryProvider;
use crate::game::{
    ClueOutcome, GameError, Lobby, PlayerId, RejoinOutcome, RemoveOutcome, TallyResult, VoteOutcome,
};
use crate::message::GameMessage;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use rand::SeedableRng;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error};

/// 空大厅回调，由注册表注入，负责把房间从全局映射里摘掉
pub type DeleteCallback = Box<dyn Fn(String) + Send + Sync>;

/// 游戏房间：一个大厅的异步外壳。状态机由 RwLock 保护，
/// 同一大厅的事件处理和计时器回调都在写锁内完成，互不交错；
/// 不同大厅之间完全独立。
pub struct Room {
    code: String,
    state: RwLock<Lobby>,
    categories: Arc<CategoryProvider>,
    player_channels: DashMap<PlayerId, mpsc::Sender<GameMessage>>,
    /// 同步存储，注册表在持有映射分片锁时设置回调，中间不能有 await
    delete_callback: OnceCell<DeleteCallback>,
}

impl Room {
    pub fn new(lobby: Lobby, categories: Arc<CategoryProvider>) -> Self {
        Room {
            code: lobby.code.clone(),
            state: RwLock::new(lobby),
            categories,
            player_channels: DashMap::new(),
            delete_callback: OnceCell::new(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    /// 设置空大厅回调，只有第一次设置生效
    pub fn set_delete_callback(&self, callback: DeleteCallback) {
        let _ = self.delete_callback.set(callback);
    }

    pub async fn player_count(&self) -> usize {
        self.state.read().await.players.len()
    }

    /// 当前名单快照，创建大厅后的首条回执用
    pub async fn players_json(&self) -> serde_json::Value {
        json!(self.state.read().await.players)
    }

    /// 注册玩家的连接通道，重连时覆盖旧通道
    pub fn register_channel(&self, player_id: PlayerId, channel: mpsc::Sender<GameMessage>) {
        self.player_channels.insert(player_id, channel);
    }

    /// 广播消息给房间内所有已连接玩家，尽力投递，失败即清理通道
    pub async fn broadcast(&self, message: GameMessage) {
        let channels: Vec<(PlayerId, mpsc::Sender<GameMessage>)> = self
            .player_channels
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (player_id, channel) in channels {
            if let Err(e) = channel.send(message.clone()).await {
                error!("广播消息失败: {}", e);
                self.player_channels.remove(&player_id);
            }
        }
    }

    /// 单发给指定连接
    async fn unicast(&self, player_id: &str, message: GameMessage) {
        if let Some(channel) = self
            .player_channels
            .get(player_id)
            .map(|entry| entry.value().clone())
        {
            if let Err(e) = channel.send(message).await {
                error!("发送消息失败: {}", e);
                self.player_channels.remove(player_id);
            }
        }
    }

    /// 处理房间消息，按事件名分发；守卫失败以错误返回，
    /// 由网络层只回给出错的连接
    pub(crate) async fn handle_message(
        &self,
        connection_id: &str,
        message: GameMessage,
        player_tx: Option<mpsc::Sender<GameMessage>>,
    ) -> Result<()> {
        match message.type_.as_str() {
            "join-lobby" => {
                let tx = player_tx
                    .ok_or_else(|| crate::Error::Room("join-lobby 消息需要连接通道".to_string()))?;
                self.handle_join(connection_id, &message, tx).await?;
            }
            "rejoin-lobby" => {
                let tx = player_tx.ok_or_else(|| {
                    crate::Error::Room("rejoin-lobby 消息需要连接通道".to_string())
                })?;
                self.handle_rejoin(connection_id, &message, tx).await?;
            }
            "start-game" => {
                self.handle_start(connection_id).await?;
            }
            "submit-clue" => {
                self.handle_clue(connection_id, &message).await?;
            }
            "submit-vote" => {
                self.handle_vote(connection_id, &message).await?;
            }
            "chameleon-guess" => {
                self.handle_guess(connection_id, &message).await?;
            }
            "play-again" => {
                self.handle_play_again(connection_id).await?;
            }
            "leave-lobby" => {
                self.handle_leave(connection_id).await?;
            }
            _ => return Err(crate::Error::Room("未知的消息类型".to_string())),
        }
        Ok(())
    }

    /// 处理玩家加入
    async fn handle_join(
        &self,
        connection_id: &str,
        message: &GameMessage,
        player_tx: mpsc::Sender<GameMessage>,
    ) -> Result<()> {
        let name = string_field(message, "name")?;

        let players = {
            let mut state = self.state.write().await;
            state.join(connection_id.to_string(), &name)?;
            json!(state.players)
        };

        self.register_channel(connection_id.to_string(), player_tx);
        self.unicast(
            connection_id,
            GameMessage::new("lobby-joined", json!({ "code": self.code, "players": players })),
        )
        .await;
        self.broadcast(GameMessage::new(
            "player-joined",
            json!({ "players": players }),
        ))
        .await;

        debug!("玩家 {} 加入大厅 {}", name, self.code);
        Ok(())
    }

    /// 处理重连：按名字找回座位，或在等待阶段按新玩家加入
    async fn handle_rejoin(
        &self,
        connection_id: &str,
        message: &GameMessage,
        player_tx: mpsc::Sender<GameMessage>,
    ) -> Result<()> {
        let name = string_field(message, "name")?;

        let (outcome, players, phase) = {
            let mut state = self.state.write().await;
            let outcome = state.rejoin(connection_id.to_string(), &name);
            (outcome, json!(state.players), state.phase)
        };

        match outcome {
            RejoinOutcome::Rejoined { is_host, old_id } => {
                // 旧连接可能还挂着通道，先摘掉再注册新的
                self.player_channels.remove(&old_id);
                self.register_channel(connection_id.to_string(), player_tx);
                self.unicast(
                    connection_id,
                    GameMessage::new(
                        "rejoin-success",
                        json!({
                            "code": self.code,
                            "players": players,
                            "phase": phase.as_str(),
                            "isHost": is_host,
                        }),
                    ),
                )
                .await;
                debug!("玩家 {} 重连回大厅 {}", name, self.code);
            }
            RejoinOutcome::JoinedAsNew => {
                self.register_channel(connection_id.to_string(), player_tx);
                self.unicast(
                    connection_id,
                    GameMessage::new(
                        "rejoin-success",
                        json!({
                            "code": self.code,
                            "players": players,
                            "phase": phase.as_str(),
                            "isHost": false,
                        }),
                    ),
                )
                .await;
                self.broadcast(GameMessage::new(
                    "player-joined",
                    json!({ "players": players }),
                ))
                .await;
                debug!("玩家 {} 以新玩家身份加入大厅 {}", name, self.code);
            }
            // 以错误返回，调用方不会把这个连接记为已加入
            RejoinOutcome::Failed => return Err(GameError::PlayerNotFound.into()),
        }

        Ok(())
    }

    /// 开始新一轮：抽取分类和秘密词，给每个玩家单发各自视角的开局信息
    /// （变色龙看不到秘密词）
    async fn handle_start(&self, connection_id: &str) -> Result<()> {
        // ThreadRng 不是 Send，连接任务会跨 await 持有这里的局部变量
        let mut rng = rand::rngs::StdRng::from_os_rng();
        let draw = self
            .categories
            .draw(&mut rng)
            .ok_or_else(|| crate::Error::Room("词表为空，无法开局".to_string()))?;

        let per_player = {
            let mut state = self.state.write().await;
            state.start(connection_id, draw, &mut rng)?;
            let round = state.round.as_ref().ok_or(GameError::InvalidPhase)?;

            let turn_order: Vec<_> = round
                .turn_order
                .iter()
                .map(|id| json!({ "id": id, "name": state.player_name(id) }))
                .collect();
            let current = &round.turn_order[0];
            let current_player = json!({ "id": current, "name": state.player_name(current) });

            let messages: Vec<(PlayerId, GameMessage)> = state
                .players
                .iter()
                .map(|player| {
                    let is_chameleon = player.id == round.chameleon_id;
                    let message = GameMessage::new(
                        "game-started",
                        json!({
                            "category": round.category,
                            "decoyWords": round.decoy_words,
                            "secretWord": if is_chameleon { None } else { Some(&round.secret_word) },
                            "isChameleon": is_chameleon,
                            "turnOrder": turn_order,
                            "currentPlayer": current_player,
                            "deadline": round.round_deadline,
                        }),
                    );
                    (player.id.clone(), message)
                })
                .collect();
            messages
        };

        for (player_id, message) in per_player {
            self.unicast(&player_id, message).await;
        }

        debug!("大厅 {} 开始新一轮", self.code);
        Ok(())
    }

    /// 处理线索提交
    async fn handle_clue(&self, connection_id: &str, message: &GameMessage) -> Result<()> {
        let clue = string_field(message, "clue")?;

        let (clue_broadcast, follow_up) = {
            let mut state = self.state.write().await;
            let outcome = state.submit_clue(connection_id, &clue)?;

            let player = state
                .player_by_id(connection_id)
                .ok_or(GameError::PlayerNotFound)?;
            let clue_broadcast = GameMessage::new(
                "clue-submitted",
                json!({
                    "playerId": connection_id,
                    "playerName": player.name,
                    "clue": player.clue,
                    "allClues": clues_json(&state),
                }),
            );

            let follow_up = match outcome {
                ClueOutcome::VotingStarted { deadline } => GameMessage::new(
                    "voting-phase",
                    json!({ "allClues": clues_json(&state), "deadline": deadline }),
                ),
                ClueOutcome::NextPlayer { current, deadline } => GameMessage::new(
                    "next-player",
                    json!({
                        "currentPlayer": { "id": current, "name": state.player_name(&current) },
                        "deadline": deadline,
                    }),
                ),
            };
            (clue_broadcast, follow_up)
        };

        self.broadcast(clue_broadcast).await;
        self.broadcast(follow_up).await;
        Ok(())
    }

    /// 处理投票；全员投完时同步计票，并按结果广播下一阶段
    async fn handle_vote(&self, connection_id: &str, message: &GameMessage) -> Result<()> {
        let voted_id = string_field(message, "votedId")?;

        let messages = {
            let mut state = self.state.write().await;
            let outcome = state.submit_vote(connection_id, &voted_id)?;

            match outcome {
                // 重复投票按原版行为静默忽略
                VoteOutcome::Ignored => Vec::new(),
                VoteOutcome::Recorded {
                    voter_name,
                    votes_count,
                    total_players,
                } => vec![vote_cast_message(
                    connection_id,
                    &voter_name,
                    votes_count,
                    total_players,
                )],
                VoteOutcome::Complete {
                    voter_name,
                    votes_count,
                    total_players,
                    result,
                } => {
                    let mut messages = vec![vote_cast_message(
                        connection_id,
                        &voter_name,
                        votes_count,
                        total_players,
                    )];
                    match result {
                        TallyResult::ChameleonCaught => {
                            messages.push(chameleon_guess_phase_message(&state));
                        }
                        TallyResult::ChameleonEscaped => {
                            messages.push(game_results_message(&state));
                        }
                    }
                    messages
                }
            }
        };

        for message in messages {
            self.broadcast(message).await;
        }
        Ok(())
    }

    /// 处理变色龙猜词
    async fn handle_guess(&self, connection_id: &str, message: &GameMessage) -> Result<()> {
        let guess = string_field(message, "guess")?;

        let results = {
            let mut state = self.state.write().await;
            state.chameleon_guess(connection_id, &guess)?;
            game_results_message(&state)
        };

        self.broadcast(results).await;
        Ok(())
    }

    /// 房主发起再来一局
    async fn handle_play_again(&self, connection_id: &str) -> Result<()> {
        let players = {
            let mut state = self.state.write().await;
            state.play_again(connection_id)?;
            json!(state.players)
        };

        self.broadcast(GameMessage::new(
            "reset-lobby",
            json!({ "players": players }),
        ))
        .await;
        Ok(())
    }

    /// 处理玩家主动离开
    async fn handle_leave(&self, connection_id: &str) -> Result<()> {
        let outcome = {
            let mut state = self.state.write().await;
            state.leave(connection_id)?
        };

        self.player_channels.remove(connection_id);
        self.apply_removal(outcome).await;
        Ok(())
    }

    /// 连接意外断开：标记断线并启动宽限期计时器，不立刻移除。
    /// 计时器以 (玩家名, 断开时的连接ID) 为键，到点后重新校验，
    /// 玩家已用新连接回来时什么都不做。
    pub async fn handle_disconnect(self: Arc<Self>, connection_id: &str) {
        let (name, grace) = {
            let mut state = self.state.write().await;
            (
                state.mark_disconnected(connection_id),
                state.rules.grace_period,
            )
        };
        self.player_channels.remove(connection_id);

        let Some(name) = name else {
            return;
        };
        debug!("玩家 {} 从大厅 {} 断线，等待重连...", name, self.code);

        let room = self;
        let connection_id = connection_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            room.grace_expired(&name, &connection_id).await;
        });
    }

    /// 宽限期到点后的移除检查
    async fn grace_expired(&self, name: &str, connection_id: &str) {
        let outcome = {
            let mut state = self.state.write().await;
            state.grace_expired(name, connection_id)
        };

        match outcome {
            None => {
                debug!("玩家 {} 已重连，跳过移除", name);
            }
            Some(outcome) => {
                debug!("玩家 {} 宽限期结束，从大厅 {} 移除", name, self.code);
                self.apply_removal(outcome).await;
            }
        }
    }

    /// 移除玩家后的广播与善后：空大厅删除、离场通知、废轮通知
    async fn apply_removal(&self, outcome: RemoveOutcome) {
        match outcome {
            RemoveOutcome::LobbyEmpty { .. } => {
                self.delete();
            }
            RemoveOutcome::Removed {
                name, interrupted, ..
            } => {
                let players = {
                    let state = self.state.read().await;
                    json!(state.players)
                };

                self.broadcast(GameMessage::new(
                    "player-left",
                    json!({ "players": players, "leftName": name }),
                ))
                .await;

                if interrupted {
                    self.broadcast(GameMessage::new(
                        "game-interrupted",
                        json!({
                            "reason": format!("{} disconnected", name),
                            "players": players,
                        }),
                    ))
                    .await;
                }
            }
        }
    }

    /// 删除房间：触发注册表回调
    pub fn delete(&self) {
        debug!("大厅 {} 已空，删除", self.code);
        if let Some(callback) = self.delete_callback.get() {
            callback(self.code.clone());
        }
    }
}

/// 从消息负载中取必填字符串字段，空白视为缺失
fn string_field(message: &GameMessage, key: &str) -> std::result::Result<String, GameError> {
    message.data[key]
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .ok_or(GameError::InvalidPayload)
}

fn vote_cast_message(
    voter_id: &str,
    voter_name: &str,
    votes_count: usize,
    total_players: usize,
) -> GameMessage {
    GameMessage::new(
        "vote-cast",
        json!({
            "voterId": voter_id,
            "voterName": voter_name,
            "votesCount": votes_count,
            "totalPlayers": total_players,
        }),
    )
}

/// 每个玩家的线索清单
fn clues_json(state: &Lobby) -> serde_json::Value {
    json!(
        state
            .players
            .iter()
            .map(|p| json!({ "id": p.id, "name": p.name, "clue": p.clue }))
            .collect::<Vec<_>>()
    )
}

/// 选票明细：每个玩家投给了谁（按名字）
fn votes_json(state: &Lobby) -> serde_json::Value {
    json!(
        state
            .players
            .iter()
            .map(|p| {
                let voted_for = p.vote.as_deref().and_then(|id| state.player_name(id));
                json!({ "id": p.id, "name": p.name, "votedFor": voted_for })
            })
            .collect::<Vec<_>>()
    )
}

/// 变色龙被抓后的猜词阶段广播：公开票型、干扰词表和分类，但不公开秘密词
fn chameleon_guess_phase_message(state: &Lobby) -> GameMessage {
    let round = state.round.as_ref();
    let chameleon_id = round.map(|r| r.chameleon_id.clone()).unwrap_or_default();
    let chameleon_name = state.player_name(&chameleon_id);
    let accused_id = round.and_then(|r| r.accused_id.clone());
    let accused_name = accused_id.as_deref().and_then(|id| state.player_name(id));

    GameMessage::new(
        "chameleon-guess-phase",
        json!({
            "chameleonId": chameleon_id,
            "chameleonName": chameleon_name,
            "accusedId": accused_id,
            "accusedName": accused_name,
            "votes": votes_json(state),
            "voteCounts": round.map(|r| &r.vote_counts),
            "decoyWords": round.map(|r| &r.decoy_words),
            "category": round.map(|r| &r.category),
        }),
    )
}

/// 最终结果广播，此时秘密词公开
fn game_results_message(state: &Lobby) -> GameMessage {
    let round = state.round.as_ref();
    let chameleon_id = round.map(|r| r.chameleon_id.clone()).unwrap_or_default();
    let chameleon_name = state.player_name(&chameleon_id);
    let accused_id = round.and_then(|r| r.accused_id.clone());
    let accused_name = accused_id.as_deref().and_then(|id| state.player_name(id));

    GameMessage::new(
        "game-results",
        json!({
            "chameleonId": chameleon_id,
            "chameleonName": chameleon_name,
            "secretWord": round.map(|r| &r.secret_word),
            "caughtChameleon": round.map(|r| r.caught_chameleon).unwrap_or(false),
            "chameleonGuess": round.and_then(|r| r.chameleon_guess.as_ref()),
            "chameleonGuessCorrect": round.map(|r| r.chameleon_guess_correct).unwrap_or(false),
            "accusedId": accused_id,
            "accusedName": accused_name,
            "votes": votes_json(state),
            "voteCounts": round.map(|r| &r.vote_counts),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameRules;
    use pretty_assertions::assert_eq;

    fn test_room() -> Arc<Room> {
        let lobby = Lobby::new(
            "ABCD".to_string(),
            "conn-0".to_string(),
            "alice".to_string(),
            GameRules {
                grace_period: std::time::Duration::from_secs(5),
                ..GameRules::default()
            },
        );
        Arc::new(Room::new(
            lobby,
            Arc::new(CategoryProvider::with_defaults()),
        ))
    }

    fn join_msg(name: &str) -> GameMessage {
        GameMessage::new("join-lobby", json!({ "code": "ABCD", "name": name }))
    }

    #[tokio::test]
    async fn test_join_broadcasts_roster() {
        let room = test_room();
        let (host_tx, mut host_rx) = mpsc::channel(16);
        room.register_channel("conn-0".to_string(), host_tx);

        let (tx, mut rx) = mpsc::channel(16);
        room.handle_message("conn-1", join_msg("bob"), Some(tx))
            .await
            .unwrap();

        let joined = rx.recv().await.unwrap();
        assert_eq!(joined.type_, "lobby-joined");
        assert_eq!(joined.data["code"], "ABCD");
        assert_eq!(joined.data["players"].as_array().unwrap().len(), 2);

        let broadcast = host_rx.recv().await.unwrap();
        assert_eq!(broadcast.type_, "player-joined");
    }

    #[tokio::test]
    async fn test_join_with_taken_name_fails_without_broadcast() {
        let room = test_room();
        let (tx, mut rx) = mpsc::channel(16);

        let err = room
            .handle_message("conn-1", join_msg("ALICE"), Some(tx))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Game(GameError::NameTaken)
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(room.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_failed_rejoin_is_an_error_and_registers_nothing() {
        // 满员大厅里不认识的名字，重连按失败处理
        let lobby = Lobby::new(
            "ABCD".to_string(),
            "conn-0".to_string(),
            "alice".to_string(),
            GameRules {
                max_players: 1,
                ..GameRules::default()
            },
        );
        let room = Arc::new(Room::new(
            lobby,
            Arc::new(CategoryProvider::with_defaults()),
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let err = room
            .handle_message(
                "conn-9",
                GameMessage::new("rejoin-lobby", json!({ "code": "ABCD", "name": "bob" })),
                Some(tx),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            crate::Error::Game(GameError::PlayerNotFound)
        ));
        assert!(room.player_channels.get("conn-9").is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(room.player_count().await, 1);
    }

    #[tokio::test]
    async fn test_rejoin_drops_stale_channel_of_old_connection() {
        let room = test_room();
        let (old_tx, _old_rx) = mpsc::channel(16);
        room.register_channel("conn-0".to_string(), old_tx);

        let (tx, mut rx) = mpsc::channel(16);
        room.handle_message(
            "conn-0b",
            GameMessage::new("rejoin-lobby", json!({ "code": "ABCD", "name": "alice" })),
            Some(tx),
        )
        .await
        .unwrap();

        let rejoined = rx.recv().await.unwrap();
        assert_eq!(rejoined.type_, "rejoin-success");
        assert!(room.player_channels.get("conn-0").is_none());
        assert!(room.player_channels.get("conn-0b").is_some());
    }

    #[tokio::test]
    async fn test_game_started_withholds_secret_word_from_chameleon() {
        let room = test_room();
        let (alice_tx, mut alice_rx) = mpsc::channel(16);
        room.register_channel("conn-0".to_string(), alice_tx);

        let (bob_tx, mut bob_rx) = mpsc::channel(16);
        room.handle_message("conn-1", join_msg("bob"), Some(bob_tx))
            .await
            .unwrap();
        let (carol_tx, mut carol_rx) = mpsc::channel(16);
        room.handle_message("conn-2", join_msg("carol"), Some(carol_tx))
            .await
            .unwrap();

        room.handle_message(
            "conn-0",
            GameMessage::new("start-game", json!({ "code": "ABCD" })),
            None,
        )
        .await
        .unwrap();

        let mut started = Vec::new();
        for rx in [&mut alice_rx, &mut bob_rx, &mut carol_rx] {
            while let Ok(msg) = rx.try_recv() {
                if msg.type_ == "game-started" {
                    started.push(msg.data);
                }
            }
        }
        assert_eq!(started.len(), 3);

        let chameleons: Vec<_> = started
            .iter()
            .filter(|d| d["isChameleon"] == true)
            .collect();
        assert_eq!(chameleons.len(), 1);
        assert!(chameleons[0]["secretWord"].is_null());

        // 其余玩家拿到同一个秘密词
        let words: Vec<_> = started
            .iter()
            .filter(|d| d["isChameleon"] == false)
            .map(|d| d["secretWord"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], words[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_timer_removes_player_and_transfers_host() {
        let room = test_room();
        let (tx, _rx) = mpsc::channel(16);
        room.handle_message("conn-1", join_msg("bob"), Some(tx))
            .await
            .unwrap();

        let (bob_tx, mut bob_rx) = mpsc::channel(16);
        room.register_channel("conn-1".to_string(), bob_tx);

        Arc::clone(&room).handle_disconnect("conn-0").await;
        tokio::time::sleep(std::time::Duration::from_secs(6)).await;

        assert_eq!(room.player_count().await, 1);
        let state = room.state.read().await;
        assert_eq!(state.host_id, "conn-1");
        drop(state);

        // 清空 player-joined 之类的早期消息，找到离场广播
        let mut saw_player_left = false;
        while let Ok(msg) = bob_rx.try_recv() {
            if msg.type_ == "player-left" {
                assert_eq!(msg.data["leftName"], "alice");
                saw_player_left = true;
            }
        }
        assert!(saw_player_left);
    }

    #[tokio::test(start_paused = true)]
    async fn test_grace_timer_is_noop_after_reconnect() {
        let room = test_room();
        let (tx, _rx) = mpsc::channel(16);
        room.handle_message("conn-1", join_msg("bob"), Some(tx))
            .await
            .unwrap();

        Arc::clone(&room).handle_disconnect("conn-0").await;

        // 宽限期内重连，拿到新连接ID
        let (tx2, mut rx2) = mpsc::channel(16);
        room.handle_message(
            "conn-0b",
            GameMessage::new("rejoin-lobby", json!({ "code": "ABCD", "name": "alice" })),
            Some(tx2),
        )
        .await
        .unwrap();

        let rejoined = rx2.recv().await.unwrap();
        assert_eq!(rejoined.type_, "rejoin-success");
        assert_eq!(rejoined.data["isHost"], true);

        tokio::time::sleep(std::time::Duration::from_secs(6)).await;

        // 旧计时器到点后不应当移除任何人
        assert_eq!(room.player_count().await, 2);
        let state = room.state.read().await;
        assert_eq!(state.host_id, "conn-0b");
    }
}
