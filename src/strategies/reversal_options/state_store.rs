use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::core::error::TradingError;
use crate::core::types::Result;

use super::model::TradingState;

/// 状态文件内容
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateDocument {
    #[serde(default)]
    pub last_updated: Option<NaiveDateTime>,
    #[serde(default)]
    pub trading_states: HashMap<String, TradingState>,
}

/// 交易状态持久化接口；每次保存都是整体重写
pub trait StateStore: Send + Sync {
    fn load(&self) -> Result<HashMap<String, TradingState>>;
    fn save(&self, states: &HashMap<String, TradingState>) -> Result<()>;
}

/// JSON 文件存储（临时文件 + rename 原子替换）
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_path(&self) -> PathBuf {
        let suffix = Local::now().format("%Y%m%d_%H%M%S");
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".backup.{}", suffix));
        PathBuf::from(name)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

/// 载入后校验每个状态，违反约束的状态重置为空仓（保留布防标志）
pub fn repair_states(states: &mut HashMap<String, TradingState>) -> Vec<String> {
    let mut repaired = Vec::new();
    for (key, state) in states.iter_mut() {
        if let Err(reason) = state.check_invariants() {
            log::error!("❌ 状态 {} 不一致 ({})，重置为空仓", key, reason);
            state.reset_position();
            repaired.push(key.clone());
        }
    }
    repaired
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<HashMap<String, TradingState>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("状态文件 {} 不存在，使用全新状态", self.path.display());
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(TradingError::PersistenceError(format!(
                    "读取状态文件 {} 失败: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        if contents.trim().is_empty() {
            log::warn!("⚠️ 状态文件 {} 为空，使用全新状态", self.path.display());
            return Ok(HashMap::new());
        }

        match serde_json::from_str::<StateDocument>(&contents) {
            Ok(document) => {
                let mut states = document.trading_states;
                repair_states(&mut states);
                log::info!(
                    "✅ 已载入 {} 个交易状态 (最后更新 {:?})",
                    states.len(),
                    document.last_updated
                );
                Ok(states)
            }
            Err(e) => {
                let backup = self.backup_path();
                fs::copy(&self.path, &backup).map_err(|copy_err| {
                    TradingError::PersistenceError(format!(
                        "状态文件损坏且备份失败: {} / {}",
                        e, copy_err
                    ))
                })?;
                log::error!(
                    "❌ 状态文件损坏 ({})，已备份到 {}，使用全新状态",
                    e,
                    backup.display()
                );
                Ok(HashMap::new())
            }
        }
    }

    fn save(&self, states: &HashMap<String, TradingState>) -> Result<()> {
        let document = StateDocument {
            last_updated: Some(Local::now().naive_local()),
            trading_states: states.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let temp = self.temp_path();
        fs::write(&temp, json).map_err(|e| {
            TradingError::PersistenceError(format!("写入临时状态文件失败: {}", e))
        })?;
        fs::rename(&temp, &self.path).map_err(|e| {
            TradingError::PersistenceError(format!("替换状态文件失败: {}", e))
        })?;
        Ok(())
    }
}
