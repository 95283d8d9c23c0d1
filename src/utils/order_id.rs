/// 订单标签生成器
///
/// 为每笔期权订单生成可识别的客户端标签，券商侧标签最长20个字符，只允许字母数字
use chrono::Local;
use std::sync::atomic::{AtomicU32, Ordering};

/// 券商订单标签最大长度
pub const MAX_TAG_LENGTH: usize = 20;

/// 订单标签生成器
pub struct OrderIdGenerator {
    strategy_code: String,
    sequence: AtomicU32,
}

impl OrderIdGenerator {
    /// 创建新的订单标签生成器
    pub fn new(strategy_name: &str) -> Self {
        Self {
            strategy_code: Self::generate_strategy_code(strategy_name),
            sequence: AtomicU32::new(0),
        }
    }

    /// 策略代码：取各单词首字母，不足3位时补原名字母
    fn generate_strategy_code(strategy_name: &str) -> String {
        let initials: String = strategy_name
            .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
            .filter_map(|w| w.chars().next())
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();

        let mut code = initials.to_uppercase();
        if code.len() < 3 {
            code = strategy_name
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(3)
                .collect::<String>()
                .to_uppercase();
        }
        if code.is_empty() {
            code = "ORD".to_string();
        }
        code.truncate(4);
        code
    }

    /// 生成带标签的订单ID，例如 `REVENT0931000001`
    pub fn generate_with_tag(&self, tag: &str) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let timestamp = Local::now().format("%H%M").to_string();

        let clean_tag: String = tag
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(3)
            .collect::<String>()
            .to_uppercase();

        let mut order_id = format!(
            "{}{}{}{:06}",
            self.strategy_code,
            clean_tag,
            timestamp,
            seq % 1_000_000
        );
        order_id.truncate(MAX_TAG_LENGTH);
        order_id
    }

    pub fn issued(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }
}
