use chrono::{DateTime, Utc};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::categories::CategoryDraw;

/// 玩家ID类型，取值为当前连接ID，重连后会被替换
pub type PlayerId = String;

/// 游戏规则快照，由配置层构造后传入，核心逻辑不读全局配置
#[derive(Debug, Clone)]
pub struct GameRules {
    pub min_players: usize,
    pub max_players: usize,
    pub round_time_limit: Duration,
    pub grace_period: Duration,
}

impl Default for GameRules {
    fn default() -> Self {
        GameRules {
            min_players: 3,
            max_players: 10,
            round_time_limit: Duration::from_secs(60),
            grace_period: Duration::from_secs(5),
        }
    }
}

/// 断线标记：记录断开时刻和断开时的连接ID
/// 宽限期计时器触发时用连接ID比对，避免误删已重连的玩家
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disconnected {
    pub at: DateTime<Utc>,
    pub connection_id: PlayerId,
}

/// 玩家信息，name 是大厅内的稳定身份，id 随重连变化
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_host: bool,
    pub clue: Option<String>,
    pub vote: Option<PlayerId>,
    pub has_voted: bool,
    #[serde(skip)]
    pub disconnected: Option<Disconnected>,
}

impl Player {
    fn new(id: PlayerId, name: String, is_host: bool) -> Self {
        Player {
            id,
            name,
            is_host,
            clue: None,
            vote: None,
            has_voted: false,
            disconnected: None,
        }
    }

    /// 清空每轮重置的字段
    fn reset_round_fields(&mut self) {
        self.clue = None;
        self.vote = None;
        self.has_voted = false;
    }
}

/// 大厅阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Waiting,
    CluePhase,
    Voting,
    ChameleonGuessing,
    Results,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::CluePhase => "clue-phase",
            Phase::Voting => "voting",
            Phase::ChameleonGuessing => "chameleon-guessing",
            Phase::Results => "results",
        }
    }
}

/// 单轮状态，开局时整体构建，回到等待阶段时整体丢弃，绝不跨轮复用
#[derive(Debug, Clone)]
pub struct Round {
    pub category: String,
    pub secret_word: String,
    pub decoy_words: Vec<String>,
    pub chameleon_id: PlayerId,
    pub turn_order: Vec<PlayerId>,
    pub turn_index: usize,
    /// 截止时间（毫秒时间戳），只广播给客户端，服务端不强制
    pub round_deadline: i64,
    pub accused_id: Option<PlayerId>,
    pub vote_counts: HashMap<PlayerId, usize>,
    pub caught_chameleon: bool,
    pub chameleon_guess: Option<String>,
    pub chameleon_guess_correct: bool,
}

/// 状态机的守卫错误，全部为连接级、非致命，出错时不改动任何状态
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("lobby is full")]
    LobbyFull,
    #[error("game already in progress")]
    GameInProgress,
    #[error("name already taken")]
    NameTaken,
    #[error("only the host can do that")]
    NotHost,
    #[error("need at least {0} players")]
    InsufficientPlayers(usize),
    #[error("not your turn")]
    NotYourTurn,
    #[error("invalid phase for this action")]
    InvalidPhase,
    #[error("missing or invalid payload")]
    InvalidPayload,
    #[error("player not found")]
    PlayerNotFound,
}

/// 提交线索后的走向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClueOutcome {
    /// 轮到下一位玩家
    NextPlayer {
        current: PlayerId,
        deadline: i64,
    },
    /// 所有人都提交了，进入投票阶段
    VotingStarted {
        deadline: i64,
    },
}

/// 计票结果分支
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TallyResult {
    /// 被指认的就是变色龙，进入猜词阶段
    ChameleonCaught,
    /// 变色龙逃脱，直接出最终结果
    ChameleonEscaped,
}

/// 一次投票的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// 重复投票，按原版行为静默忽略
    Ignored,
    /// 已记录，附带当前进度
    Recorded {
        voter_name: String,
        votes_count: usize,
        total_players: usize,
    },
    /// 最后一票，计票完成
    Complete {
        voter_name: String,
        votes_count: usize,
        total_players: usize,
        result: TallyResult,
    },
}

/// 移除玩家后的走向
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// 大厅已空，应当从注册表删除
    LobbyEmpty { name: String },
    /// 仍有玩家
    Removed {
        name: String,
        /// 移除发生在对局中，本轮已废弃
        interrupted: bool,
        new_host: Option<PlayerId>,
    },
}

/// 重连的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejoinOutcome {
    /// 按名字找回了原座位，连接ID已更新，附带被替换的旧连接ID
    Rejoined { is_host: bool, old_id: PlayerId },
    /// 名字不认识，但大厅在等待阶段且有空位，按新玩家加入
    JoinedAsNew,
    Failed,
}

/// 大厅状态机：一个对局会话的全部状态，所有入站事件先过守卫再改状态
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: String,
    pub host_id: PlayerId,
    /// 插入顺序即加入顺序，计票的平票裁决依赖这个顺序
    pub players: Vec<Player>,
    pub phase: Phase,
    pub round: Option<Round>,
    pub rules: GameRules,
}

impl Lobby {
    pub fn new(
        code: String,
        host_connection: PlayerId,
        host_name: String,
        rules: GameRules,
    ) -> Self {
        let host = Player::new(host_connection.clone(), host_name, true);
        Lobby {
            code,
            host_id: host_connection,
            players: vec![host],
            phase: Phase::Waiting,
            round: None,
            rules,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn player_by_id(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn player_name(&self, id: &str) -> Option<&str> {
        self.player_by_id(id).map(|p| p.name.as_str())
    }

    /// 当前应当给线索的玩家
    pub fn current_player(&self) -> Option<&Player> {
        let round = self.round.as_ref()?;
        let id = round.turn_order.get(round.turn_index)?;
        self.player_by_id(id)
    }

    fn deadline_from_now(&self) -> i64 {
        Utc::now().timestamp_millis() + self.rules.round_time_limit.as_millis() as i64
    }

    /// 新玩家加入，只在等待阶段允许
    pub fn join(&mut self, id: PlayerId, name: &str) -> Result<(), GameError> {
        if self.phase != Phase::Waiting {
            return Err(GameError::GameInProgress);
        }
        if self.players.len() >= self.rules.max_players {
            return Err(GameError::LobbyFull);
        }
        // 名字在大厅内大小写不敏感唯一
        if self
            .players
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(name))
        {
            return Err(GameError::NameTaken);
        }

        self.players.push(Player::new(id, name.to_string(), false));
        Ok(())
    }

    /// 开始新一轮：房主触发，人数达标后抽词、选变色龙、洗出场顺序
    pub fn start(
        &mut self,
        actor: &str,
        draw: CategoryDraw,
        rng: &mut impl Rng,
    ) -> Result<(), GameError> {
        if actor != self.host_id {
            return Err(GameError::NotHost);
        }
        if self.players.len() < self.rules.min_players {
            return Err(GameError::InsufficientPlayers(self.rules.min_players));
        }

        for player in &mut self.players {
            player.reset_round_fields();
        }

        let chameleon_id = self
            .players
            .choose(rng)
            .map(|p| p.id.clone())
            .ok_or(GameError::InsufficientPlayers(self.rules.min_players))?;

        let turn_order = build_turn_order(&self.players, rng);

        self.phase = Phase::CluePhase;
        self.round = Some(Round {
            category: draw.category,
            secret_word: draw.secret_word,
            decoy_words: draw.words,
            chameleon_id,
            turn_order,
            turn_index: 0,
            round_deadline: self.deadline_from_now(),
            accused_id: None,
            vote_counts: HashMap::new(),
            caught_chameleon: false,
            chameleon_guess: None,
            chameleon_guess_correct: false,
        });

        Ok(())
    }

    /// 提交线索：只有当前出场玩家可以提交，线索截断为第一个空白分隔的词，
    /// 防止用整句话把秘密词直接说出来
    pub fn submit_clue(&mut self, actor: &str, clue: &str) -> Result<ClueOutcome, GameError> {
        if self.phase != Phase::CluePhase {
            return Err(GameError::InvalidPhase);
        }

        let round = self.round.as_ref().ok_or(GameError::InvalidPhase)?;
        let current_id = round
            .turn_order
            .get(round.turn_index)
            .ok_or(GameError::InvalidPhase)?
            .clone();
        if current_id != actor {
            return Err(GameError::NotYourTurn);
        }

        let word = clue
            .split_whitespace()
            .next()
            .ok_or(GameError::InvalidPayload)?
            .to_string();

        if let Some(player) = self.players.iter_mut().find(|p| p.id == current_id) {
            player.clue = Some(word);
        }

        let deadline = self.deadline_from_now();
        let round = self.round.as_mut().ok_or(GameError::InvalidPhase)?;
        round.turn_index += 1;

        if round.turn_index >= round.turn_order.len() {
            round.round_deadline = deadline;
            self.phase = Phase::Voting;
            Ok(ClueOutcome::VotingStarted { deadline })
        } else {
            round.round_deadline = deadline;
            let current = round.turn_order[round.turn_index].clone();
            Ok(ClueOutcome::NextPlayer { current, deadline })
        }
    }

    /// 记录一票；每人只能投一次，重复投票静默忽略（沿用原版行为）。
    /// 全员投完后同步计票并切换阶段。
    pub fn submit_vote(&mut self, actor: &str, voted_id: &str) -> Result<VoteOutcome, GameError> {
        if self.phase != Phase::Voting {
            return Err(GameError::InvalidPhase);
        }
        if voted_id.is_empty() {
            return Err(GameError::InvalidPayload);
        }

        let total_players = self.players.len();
        let voter = self
            .players
            .iter_mut()
            .find(|p| p.id == actor)
            .ok_or(GameError::PlayerNotFound)?;

        if voter.has_voted {
            return Ok(VoteOutcome::Ignored);
        }

        let voter_name = voter.name.clone();
        voter.vote = Some(voted_id.to_string());
        voter.has_voted = true;

        let votes_count = self.players.iter().filter(|p| p.has_voted).count();
        if votes_count < total_players {
            return Ok(VoteOutcome::Recorded {
                voter_name,
                votes_count,
                total_players,
            });
        }

        let (accused_id, vote_counts) = tally_votes(&self.players);
        let round = self.round.as_mut().ok_or(GameError::InvalidPhase)?;
        let caught = accused_id.as_deref() == Some(round.chameleon_id.as_str());

        round.accused_id = accused_id;
        round.vote_counts = vote_counts;
        round.caught_chameleon = caught;

        let result = if caught {
            self.phase = Phase::ChameleonGuessing;
            TallyResult::ChameleonCaught
        } else {
            // 逃脱时没有猜词机会，直接定格结果
            round.chameleon_guess_correct = false;
            self.phase = Phase::Results;
            TallyResult::ChameleonEscaped
        };

        Ok(VoteOutcome::Complete {
            voter_name,
            votes_count,
            total_players,
            result,
        })
    }

    /// 被抓住的变色龙猜秘密词，大小写不敏感比较
    pub fn chameleon_guess(&mut self, actor: &str, guess: &str) -> Result<(), GameError> {
        if self.phase != Phase::ChameleonGuessing {
            return Err(GameError::InvalidPhase);
        }

        let round = self.round.as_mut().ok_or(GameError::InvalidPhase)?;
        if round.chameleon_id != actor {
            return Err(GameError::NotYourTurn);
        }

        let guess = guess.trim();
        if guess.is_empty() {
            return Err(GameError::InvalidPayload);
        }

        round.chameleon_guess_correct = guess.eq_ignore_ascii_case(&round.secret_word);
        round.chameleon_guess = Some(guess.to_string());
        self.phase = Phase::Results;

        Ok(())
    }

    /// 房主发起再来一局：回到等待阶段，丢弃整轮状态
    /// 任何阶段都允许，作为卡死时的兜底
    pub fn play_again(&mut self, actor: &str) -> Result<(), GameError> {
        if actor != self.host_id {
            return Err(GameError::NotHost);
        }

        self.phase = Phase::Waiting;
        self.round = None;
        for player in &mut self.players {
            player.reset_round_fields();
        }

        Ok(())
    }

    /// 玩家主动离开
    pub fn leave(&mut self, actor: &str) -> Result<RemoveOutcome, GameError> {
        let index = self
            .players
            .iter()
            .position(|p| p.id == actor)
            .ok_or(GameError::PlayerNotFound)?;
        Ok(self.remove_at(index))
    }

    /// 标记断线但不移除，返回玩家名供宽限期计时器使用
    pub fn mark_disconnected(&mut self, connection_id: &str) -> Option<String> {
        let player = self.players.iter_mut().find(|p| p.id == connection_id)?;
        player.disconnected = Some(Disconnected {
            at: Utc::now(),
            connection_id: connection_id.to_string(),
        });
        Some(player.name.clone())
    }

    /// 宽限期到点：按名字重新定位玩家，连接ID仍是断开时那个才移除。
    /// 期间重连过（标记被清除或换了新连接ID）则什么都不做。
    pub fn grace_expired(&mut self, name: &str, connection_id: &str) -> Option<RemoveOutcome> {
        let index = self.players.iter().position(|p| {
            p.name == name
                && p.disconnected
                    .as_ref()
                    .is_some_and(|d| d.connection_id == connection_id)
        })?;
        Some(self.remove_at(index))
    }

    /// 按名字找回座位：把旧连接ID换成新的，并同步所有存了旧ID的引用
    pub fn rejoin(&mut self, connection_id: PlayerId, name: &str) -> RejoinOutcome {
        let existing = self.players.iter_mut().find(|p| p.name == name);

        let Some(player) = existing else {
            // 不认识的名字：等待阶段且有空位就按新玩家处理
            return match self.join(connection_id, name) {
                Ok(()) => RejoinOutcome::JoinedAsNew,
                Err(_) => RejoinOutcome::Failed,
            };
        };

        let old_id = std::mem::replace(&mut player.id, connection_id.clone());
        player.disconnected = None;
        let is_host = player.is_host;

        if self.host_id == old_id {
            self.host_id = connection_id.clone();
        }
        if let Some(round) = self.round.as_mut() {
            if round.chameleon_id == old_id {
                round.chameleon_id = connection_id.clone();
            }
            for entry in &mut round.turn_order {
                if *entry == old_id {
                    *entry = connection_id.clone();
                }
            }
        }

        RejoinOutcome::Rejoined { is_host, old_id }
    }

    /// 移除指定位置的玩家并处理善后：房主转移、空大厅、废轮
    fn remove_at(&mut self, index: usize) -> RemoveOutcome {
        let removed = self.players.remove(index);

        if self.players.is_empty() {
            return RemoveOutcome::LobbyEmpty { name: removed.name };
        }

        let mut new_host = None;
        if removed.is_host {
            // 房主身份转给剩余名单中的第一位
            let next = &mut self.players[0];
            next.is_host = true;
            self.host_id = next.id.clone();
            new_host = Some(next.id.clone());
        }

        let interrupted = self.phase != Phase::Waiting;
        if interrupted {
            // 对局中少了人，整轮作废
            self.phase = Phase::Waiting;
            self.round = None;
            for player in &mut self.players {
                player.reset_round_fields();
            }
        }

        RemoveOutcome::Removed {
            name: removed.name,
            interrupted,
            new_host,
        }
    }
}

/// 生成本轮出场顺序：当前玩家集合的均匀随机排列。
/// 每轮必须重新生成，旧顺序可能引用已离开的玩家。
pub fn build_turn_order(players: &[Player], rng: &mut impl Rng) -> Vec<PlayerId> {
    let mut order: Vec<PlayerId> = players.iter().map(|p| p.id.clone()).collect();
    order.shuffle(rng);
    order
}

/// 计票：按名单顺序扫描每个玩家的选票逐步累加，维护当前最大值，
/// 先达到最大票数的人当选。平票时的裁决因此由名单顺序决定，
/// 与原版的累加顺序保持一致。
pub fn tally_votes(players: &[Player]) -> (Option<PlayerId>, HashMap<PlayerId, usize>) {
    let mut counts: HashMap<PlayerId, usize> = HashMap::new();
    let mut max_votes = 0usize;
    let mut accused = None;

    for player in players {
        if let Some(target) = &player.vote {
            let count = counts.entry(target.clone()).or_insert(0);
            *count += 1;
            if *count > max_votes {
                max_votes = *count;
                accused = Some(target.clone());
            }
        }
    }

    (accused, counts)
}
