use crate::categories::CategoryProvider;
use crate::game::{GameRules, Lobby, PlayerId};
use crate::room::Room;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// 大厅码字符表：剔除了 0/1/I/O 这类易混淆字形
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const CODE_LENGTH: usize = 4;

/// 生成随机大厅码
pub fn generate_lobby_code(rng: &mut impl Rng) -> String {
    (0..CODE_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..CODE_CHARSET.len());
            CODE_CHARSET[idx] as char
        })
        .collect()
}

/// 大厅注册表：进程内唯一的 大厅码 -> 房间 映射。
/// 创建和删除都经由这里，码冲突检查靠 entry 插入原子完成；
/// 大厅本身的状态只能通过返回的 Room 修改。
pub struct LobbyRegistry {
    lobbies: Arc<DashMap<String, Arc<Room>>>,
    categories: Arc<CategoryProvider>,
    rules: GameRules,
}

impl LobbyRegistry {
    pub fn new(categories: Arc<CategoryProvider>, rules: GameRules) -> Self {
        LobbyRegistry {
            lobbies: Arc::new(DashMap::new()),
            categories,
            rules,
        }
    }

    /// 创建大厅：生成不与现存大厅冲突的码，房主作为第一个玩家入座
    pub fn create(&self, host_connection: PlayerId, host_name: &str) -> Arc<Room> {
        let mut rng = rand::rng();

        loop {
            let code = generate_lobby_code(&mut rng);
            // entry 持有分片锁，临界区内不能有 await
            match self.lobbies.entry(code.clone()) {
                // 撞码就重新抽
                Entry::Occupied(_) => continue,
                Entry::Vacant(slot) => {
                    let lobby = Lobby::new(
                        code.clone(),
                        host_connection.clone(),
                        host_name.to_string(),
                        self.rules.clone(),
                    );
                    let room = Arc::new(Room::new(lobby, self.categories.clone()));

                    let lobbies = self.lobbies.clone();
                    room.set_delete_callback(Box::new(move |code: String| {
                        if lobbies.remove(&code).is_some() {
                            debug!("大厅 {} 已从注册表删除", code);
                        }
                    }));

                    slot.insert(room.clone());
                    debug!("玩家 {} 创建了大厅 {}", host_name, code);
                    return room;
                }
            }
        }
    }

    /// 按码查找大厅，码不区分大小写
    pub fn lookup(&self, code: &str) -> Option<Arc<Room>> {
        self.lobbies
            .get(&code.to_uppercase())
            .map(|entry| entry.value().clone())
    }

    /// 删除大厅
    pub fn delete(&self, code: &str) {
        self.lobbies.remove(code);
    }

    pub fn lobby_count(&self) -> usize {
        self.lobbies.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;

    #[test]
    fn test_code_alphabet_excludes_ambiguous_glyphs() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let code = generate_lobby_code(&mut rng);
            assert_eq!(code.len(), 4);
            for c in code.chars() {
                assert!(
                    !matches!(c, '0' | '1' | 'I' | 'O'),
                    "大厅码不应包含易混淆字符: {}",
                    code
                );
                assert!(c.is_ascii_uppercase() || c.is_ascii_digit());
            }
        }
    }

    #[test]
    fn test_create_lookup_delete() {
        let registry = LobbyRegistry::new(
            Arc::new(CategoryProvider::with_defaults()),
            GameRules::default(),
        );

        let room = registry.create("conn-0".to_string(), "alice");
        let code = room.code().to_string();
        assert_eq!(registry.lobby_count(), 1);

        // 查找不区分大小写
        assert!(registry.lookup(&code.to_lowercase()).is_some());
        assert!(registry.lookup("ZZZZ").is_none());

        registry.delete(&code);
        assert!(registry.lookup(&code).is_none());
        assert_eq!(registry.lobby_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_room_removes_itself_via_callback() {
        let registry = LobbyRegistry::new(
            Arc::new(CategoryProvider::with_defaults()),
            GameRules::default(),
        );

        let room = registry.create("conn-0".to_string(), "alice");
        let code = room.code().to_string();

        room.handle_message(
            "conn-0",
            crate::message::GameMessage::new("leave-lobby", serde_json::json!({ "code": code })),
            None,
        )
        .await
        .unwrap();

        assert!(registry.lookup(&code).is_none());
    }

    #[tokio::test]
    async fn test_delete_callback_keeps_first_registration() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let registry = LobbyRegistry::new(
            Arc::new(CategoryProvider::with_defaults()),
            GameRules::default(),
        );
        let room = registry.create("conn-0".to_string(), "alice");
        let code = room.code().to_string();

        // 创建时已注册的回调不能被覆盖
        let overridden = Arc::new(AtomicBool::new(false));
        let flag = overridden.clone();
        room.set_delete_callback(Box::new(move |_| {
            flag.store(true, Ordering::SeqCst);
        }));

        room.handle_message(
            "conn-0",
            crate::message::GameMessage::new("leave-lobby", serde_json::json!({ "code": code })),
            None,
        )
        .await
        .unwrap();

        assert!(registry.lookup(&code).is_none());
        assert!(!overridden.load(Ordering::SeqCst));
    }
}
