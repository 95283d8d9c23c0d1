//! 策略日志：每条消息同时进入日志门面和按日期滚动的策略日志文件

use chrono::Local;
use log::Level;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::utils::unified_logger::get_strategy_log_path;

const LOG_ROOT: &str = "logs";
const STRATEGY_NAME: &str = "reversal_options";

fn append_strategy_file(level: Level, symbol: Option<&str>, message: &str) {
    let path = PathBuf::from(get_strategy_log_path(LOG_ROOT, STRATEGY_NAME));
    if let Some(dir) = path.parent() {
        if fs::create_dir_all(dir).is_err() {
            return;
        }
    }
    let line = format!(
        "[{}] [{}] [{}] {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        level,
        symbol.unwrap_or("-"),
        message
    );
    if let Ok(mut handle) = OpenOptions::new().create(true).append(true).open(&path) {
        let _ = handle.write_all(line.as_bytes());
    }
}

fn emit(level: Level, symbol: Option<&str>, message: &str) {
    // 低于门面级别的消息也不落盘
    if level > log::max_level() {
        return;
    }
    append_strategy_file(level, symbol, message);
    match symbol {
        Some(sym) => log::log!(target: STRATEGY_NAME, level, "[{}] {}", sym, message),
        None => log::log!(target: STRATEGY_NAME, level, "{}", message),
    }
}

pub fn info(symbol: Option<&str>, message: impl AsRef<str>) {
    emit(Level::Info, symbol, message.as_ref());
}

pub fn warn(symbol: Option<&str>, message: impl AsRef<str>) {
    emit(Level::Warn, symbol, message.as_ref());
}

pub fn error(symbol: Option<&str>, message: impl AsRef<str>) {
    emit(Level::Error, symbol, message.as_ref());
}

pub fn debug(symbol: Option<&str>, message: impl AsRef<str>) {
    emit(Level::Debug, symbol, message.as_ref());
}

pub const ORDER_LOG_RULE: &str =
    "================================================================================";

/// 订单日志：每次下单、下单失败、开平仓明细与止损变动都追加一行
#[derive(Debug, Clone, Default)]
pub struct OrderLog {
    path: Option<PathBuf>,
}

impl OrderLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// 只输出到日志门面，不落盘
    pub fn disabled() -> Self {
        Self { path: None }
    }

    pub fn write(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        log::debug!(target: "order_log", "{}", message);

        let Some(path) = &self.path else {
            return;
        };
        let line = format!("[{}] {}\n", Local::now().format("%Y-%m-%d %H:%M:%S"), message);
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(mut handle) => {
                let _ = handle.write_all(line.as_bytes());
            }
            Err(e) => log::warn!("⚠️ 写入订单日志 {} 失败: {}", path.display(), e),
        }
    }

    /// 多行明细块，首尾加分隔线
    pub fn block<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.write(ORDER_LOG_RULE);
        for line in lines {
            self.write(line);
        }
        self.write(ORDER_LOG_RULE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_log_appends_lines() {
        let path = std::env::temp_dir().join(format!("rustopt-orderlog-{}.txt", std::process::id()));
        let _ = fs::remove_file(&path);
        let log = OrderLog::new(&path);
        log.write("ORDER FAILED | test");
        log.block(["ENTRY", "Quantity: 1"]);

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 5);
        assert!(contents.lines().next().unwrap().ends_with("ORDER FAILED | test"));
        let _ = fs::remove_file(&path);
    }
}
