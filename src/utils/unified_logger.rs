//! 统一日志管理模块
//! 控制台日志走 env_logger，策略文件日志按日期落盘

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

fn default_root_dir() -> String {
    "logs".to_string()
}

fn default_level() -> String {
    "INFO".to_string()
}

fn default_retention_days() -> u32 {
    30
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: String,
    #[serde(default = "default_level")]
    pub default_level: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            default_level: default_level(),
            retention_days: default_retention_days(),
        }
    }
}

/// 初始化进程日志；RUST_LOG 优先于配置中的级别
pub fn init_logger(config: &LogConfig, level: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let strategies_dir = format!("{}/strategies", config.root_dir);
    if !Path::new(&strategies_dir).exists() {
        fs::create_dir_all(&strategies_dir)?;
    }

    let level = level.unwrap_or(&config.default_level).to_lowercase();
    let env = env_logger::Env::default().filter_or("RUST_LOG", level);

    env_logger::Builder::from_env(env)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] [{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init()?;

    Ok(())
}

/// 获取策略的当前日志文件路径
pub fn get_strategy_log_path(root_dir: &str, strategy_name: &str) -> String {
    let timestamp = Local::now().format("%Y%m%d");
    format!("{}/strategies/{}_{}.log", root_dir, strategy_name, timestamp)
}

/// 清理过期日志，返回删除的文件数
pub fn cleanup_old_logs(config: &LogConfig) -> usize {
    use std::time::SystemTime;

    let mut deleted_count = 0;
    let retention_secs = config.retention_days as u64 * 24 * 3600;
    let now = SystemTime::now();
    let dir_path = format!("{}/strategies", config.root_dir);

    if let Ok(entries) = fs::read_dir(&dir_path) {
        for entry in entries.filter_map(|e| e.ok()) {
            let expired = entry
                .metadata()
                .ok()
                .filter(|m| m.is_file())
                .and_then(|m| m.modified().ok())
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|age| age.as_secs() > retention_secs)
                .unwrap_or(false);

            if expired && fs::remove_file(entry.path()).is_ok() {
                deleted_count += 1;
            }
        }
    }

    deleted_count
}

// 日志文件命名规范：
// - 策略日志: logs/strategies/{策略名}_{YYYYMMDD}.log
// - 订单日志: 由策略配置指定（默认 OrderLog.txt）
