use crate::Result;
use anyhow::Context;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 一次抽取的结果：分类名、秘密词、整个分类词表（揭晓阶段作干扰词用）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraw {
    pub category: String,
    pub secret_word: String,
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryData {
    pub categories: BTreeMap<String, Vec<String>>,
}

/// 分类词表，游戏开局时从这里抽取分类和秘密词
// BTreeMap 保证固定的遍历顺序，注入种子随机数即可复现抽取结果
#[derive(Debug, Clone)]
pub struct CategoryProvider {
    categories: BTreeMap<String, Vec<String>>,
}

impl CategoryProvider {
    pub fn new() -> Self {
        let file_path = crate::config::Config::get().word_bank.file_path.clone();
        let mut provider = CategoryProvider {
            categories: BTreeMap::new(),
        };

        // 尝试从文件加载，失败则使用内置词表
        if let Err(e) = provider.load_from_file(&file_path) {
            tracing::warn!("无法加载词表文件: {}, 使用内置词表", e);
            provider.load_default_words();
        }

        provider
    }

    /// 只含内置词表的实例，不读配置，测试用
    pub fn with_defaults() -> Self {
        let mut provider = CategoryProvider {
            categories: BTreeMap::new(),
        };
        provider.load_default_words();
        provider
    }

    /// 从文件加载词表
    pub fn load_from_file(&mut self, path: &str) -> Result<()> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("无法读取词表文件: {}", path))?;

        let data: CategoryData =
            serde_json::from_str(&content).with_context(|| "无法解析词表文件格式")?;

        self.categories = data.categories;
        Ok(())
    }

    /// 保存词表到文件
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let data = CategoryData {
            categories: self.categories.clone(),
        };

        let content = serde_json::to_string_pretty(&data).with_context(|| "无法序列化词表")?;
        std::fs::write(path, content).with_context(|| format!("无法写入词表文件: {}", path))?;

        Ok(())
    }

    /// 加载内置词表
    fn load_default_words(&mut self) {
        let defaults: [(&str, &[&str]); 8] = [
            (
                "Animals",
                &[
                    "Dog", "Cat", "Elephant", "Lion", "Penguin", "Dolphin", "Eagle", "Tiger",
                    "Bear", "Wolf", "Snake", "Rabbit",
                ],
            ),
            (
                "Foods",
                &[
                    "Pizza", "Sushi", "Burger", "Pasta", "Tacos", "Ice Cream", "Chocolate",
                    "Steak", "Salad", "Soup",
                ],
            ),
            (
                "Movies",
                &[
                    "Titanic", "Avatar", "Inception", "Jaws", "Matrix", "Frozen", "Gladiator",
                    "Jurassic Park", "Star Wars", "Batman",
                ],
            ),
            (
                "Sports",
                &[
                    "Soccer", "Basketball", "Tennis", "Golf", "Swimming", "Boxing", "Baseball",
                    "Hockey", "Volleyball", "Surfing",
                ],
            ),
            (
                "Countries",
                &[
                    "Japan", "Brazil", "France", "Australia", "Canada", "Egypt", "India", "Italy",
                    "Mexico", "Norway",
                ],
            ),
            (
                "Professions",
                &[
                    "Doctor", "Chef", "Pilot", "Teacher", "Lawyer", "Artist", "Engineer",
                    "Firefighter", "Detective", "Astronaut",
                ],
            ),
            (
                "Emotions",
                &[
                    "Happy", "Sad", "Angry", "Excited", "Nervous", "Bored", "Surprised",
                    "Confused", "Proud", "Jealous",
                ],
            ),
            (
                "Holidays",
                &[
                    "Christmas", "Halloween", "Easter", "Thanksgiving", "New Year", "Valentine",
                    "Independence Day", "St Patrick", "Hanukkah", "Diwali",
                ],
            ),
        ];

        self.categories = defaults
            .iter()
            .map(|(name, words)| {
                (
                    name.to_string(),
                    words.iter().map(|w| w.to_string()).collect(),
                )
            })
            .collect();
    }

    /// 随机抽取分类和秘密词
    pub fn draw(&self, rng: &mut impl Rng) -> Option<CategoryDraw> {
        let names: Vec<&String> = self.categories.keys().collect();
        let category = names.choose(rng)?.as_str();
        let words = self.categories.get(category)?;
        let secret_word = words.choose(rng)?.clone();

        Some(CategoryDraw {
            category: category.to_string(),
            secret_word,
            words: words.clone(),
        })
    }

    /// 获取所有分类名
    pub fn category_names(&self) -> Vec<&String> {
        self.categories.keys().collect()
    }

    /// 获取分类词表
    pub fn category_words(&self, category: &str) -> Option<&Vec<String>> {
        self.categories.get(category)
    }

    /// 分类中的词语数量
    pub fn category_word_count(&self, category: &str) -> usize {
        self.categories
            .get(category)
            .map(|words| words.len())
            .unwrap_or(0)
    }

    /// 添加词语到分类，分类不存在时自动创建
    pub fn add_word(&mut self, category: &str, word: impl Into<String>) {
        self.categories
            .entry(category.to_string())
            .or_default()
            .push(word.into());
    }

    /// 删除分类
    pub fn remove_category(&mut self, category: &str) {
        self.categories.remove(category);
    }

    /// 验证词表完整性
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (category, words) in &self.categories {
            if words.is_empty() {
                errors.push(format!("分类 '{}' 没有词语", category));
            }

            for (i, word) in words.iter().enumerate() {
                if word.trim().is_empty() {
                    errors.push(format!("分类 '{}' 第{}个词语为空", category, i + 1));
                }
            }
        }

        errors
    }

    pub fn total_words(&self) -> usize {
        self.categories.values().map(|words| words.len()).sum()
    }

    pub fn total_categories(&self) -> usize {
        self.categories.len()
    }
}

impl Default for CategoryProvider {
    fn default() -> Self {
        Self::with_defaults()
    }
}
