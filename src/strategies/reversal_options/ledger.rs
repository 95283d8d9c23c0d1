//! 信号台账（signal.csv）
//!
//! 每个事件一行：布防、布防重置、开仓、加仓以及每条腿的平仓。

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use csv::{Writer as CsvWriter, WriterBuilder};

use crate::core::types::Result;

use super::model::Position;

pub const CSV_HEADER: [&str; 13] = [
    "timestamp",
    "action",
    "optionprice",
    "optioncontract",
    "futurecontract",
    "futureprice",
    "lotsize",
    "Stop loss",
    "Margin",
    "Points Captured",
    "Charges",
    "P&L (Abs.)",
    "P&L (%)",
];

/// 台账事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    ArmedBuy,
    ArmedSell,
    ArmedBuyReset,
    ArmedSellReset,
    Entry(Position),
    /// 第 N 次加仓
    PyramidAdd(Position, u32),
    Exit(Position),
    /// 第 N 次加仓腿的平仓
    PyramidExit(Position, u32),
}

impl SignalAction {
    pub fn is_exit(&self) -> bool {
        matches!(self, SignalAction::Exit(_) | SignalAction::PyramidExit(..))
    }
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignalAction::ArmedBuy => write!(f, "Armed Buy"),
            SignalAction::ArmedSell => write!(f, "Armed Sell"),
            SignalAction::ArmedBuyReset => write!(f, "Armed Buy Reset"),
            SignalAction::ArmedSellReset => write!(f, "Armed Sell Reset"),
            SignalAction::Entry(p) => write!(f, "{}", p.tag()),
            SignalAction::PyramidAdd(p, n) => write!(f, "pyramiding trade {} ({})", p.tag(), n),
            SignalAction::Exit(p) => write!(f, "{}exit", p.tag()),
            SignalAction::PyramidExit(p, n) => write!(f, "pyramiding trade {} ({}) exit", p.tag(), n),
        }
    }
}

/// 保证金与盈亏计算参数
#[derive(Debug, Clone, Copy)]
pub struct PnlParams {
    pub lot_size: u32,
    pub multiplier: f64,
    pub charges: f64,
}

impl PnlParams {
    fn units(&self) -> f64 {
        self.lot_size as f64 * self.multiplier
    }
}

/// 平仓腿的已实现结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitPnl {
    pub points: Option<f64>,
    pub abs: Option<f64>,
    pub percent: Option<f64>,
}

/// 平仓盈亏：点数按标的价格计算，金额按期权权利金计算（两个方向都是买入期权）
pub fn exit_pnl(
    position: Position,
    entry_underlying: Option<f64>,
    exit_underlying: f64,
    entry_option: Option<f64>,
    exit_option: Option<f64>,
    params: &PnlParams,
) -> ExitPnl {
    let points = entry_underlying.map(|entry| match position {
        Position::LongCall => exit_underlying - entry,
        Position::LongPut => entry - exit_underlying,
    });

    let (abs, percent) = match (entry_option, exit_option) {
        (Some(entry), Some(exit)) => {
            let abs = (exit - entry) * params.units() - params.charges;
            let margin = entry * params.units();
            let percent = if margin > 0.0 {
                Some(abs / margin * 100.0)
            } else {
                None
            };
            (Some(abs), percent)
        }
        _ => (None, None),
    };

    ExitPnl {
        points,
        abs,
        percent,
    }
}

/// 台账中的一行
#[derive(Debug, Clone, PartialEq)]
pub struct SignalRecord {
    pub timestamp: NaiveDateTime,
    pub action: SignalAction,
    pub option_price: Option<f64>,
    pub option_contract: Option<String>,
    pub future_contract: String,
    pub future_price: Option<f64>,
    pub lot_size: Option<u32>,
    pub stop_loss: Option<f64>,
    pub margin: Option<f64>,
    pub charges: Option<f64>,
    pub pnl: Option<ExitPnl>,
}

impl SignalRecord {
    /// 布防/布防重置
    pub fn arming(
        timestamp: NaiveDateTime,
        action: SignalAction,
        future_contract: impl Into<String>,
        future_price: f64,
    ) -> Self {
        Self {
            timestamp,
            action,
            option_price: None,
            option_contract: None,
            future_contract: future_contract.into(),
            future_price: Some(future_price),
            lot_size: None,
            stop_loss: None,
            margin: None,
            charges: None,
            pnl: None,
        }
    }

    /// 开仓/加仓：带保证金，不带止损
    pub fn entry(
        timestamp: NaiveDateTime,
        action: SignalAction,
        option_contract: Option<String>,
        option_price: Option<f64>,
        future_contract: impl Into<String>,
        future_price: f64,
        params: &PnlParams,
    ) -> Self {
        Self {
            timestamp,
            action,
            option_price,
            option_contract,
            future_contract: future_contract.into(),
            future_price: Some(future_price),
            lot_size: Some(params.lot_size),
            stop_loss: None,
            margin: option_price.map(|p| p * params.units()),
            charges: None,
            pnl: None,
        }
    }

    /// 平仓腿：带止损、费用和盈亏
    pub fn exit(
        timestamp: NaiveDateTime,
        action: SignalAction,
        option_contract: Option<String>,
        option_price: Option<f64>,
        future_contract: impl Into<String>,
        future_price: f64,
        stop_loss: Option<f64>,
        pnl: ExitPnl,
        params: &PnlParams,
    ) -> Self {
        Self {
            timestamp,
            action,
            option_price,
            option_contract,
            future_contract: future_contract.into(),
            future_price: Some(future_price),
            lot_size: Some(params.lot_size),
            stop_loss,
            margin: None,
            charges: Some(params.charges),
            pnl: Some(pnl),
        }
    }

    /// CSV 各列的文本
    pub fn columns(&self) -> Vec<String> {
        let fmt = |value: Option<f64>, decimals: usize| {
            value
                .map(|v| format!("{:.*}", decimals, v))
                .unwrap_or_default()
        };
        let pnl = self.pnl.unwrap_or(ExitPnl {
            points: None,
            abs: None,
            percent: None,
        });

        vec![
            self.timestamp.format("%d-%m-%Y %H:%M").to_string(),
            self.action.to_string(),
            fmt(self.option_price, 1),
            self.option_contract.clone().unwrap_or_default(),
            self.future_contract.clone(),
            fmt(self.future_price, 2),
            self.lot_size.map(|l| l.to_string()).unwrap_or_default(),
            fmt(self.stop_loss, 2),
            self.margin.map(|m| (m.trunc() as i64).to_string()).unwrap_or_default(),
            fmt(pnl.points, 1),
            self.charges.map(|c| (c.trunc() as i64).to_string()).unwrap_or_default(),
            pnl.abs.map(|a| (a.trunc() as i64).to_string()).unwrap_or_default(),
            pnl.percent.map(|p| format!("{:.0}%", p)).unwrap_or_default(),
        ]
    }
}

/// 信号台账写入接口
pub trait SignalLedger: Send + Sync {
    fn record(&self, record: &SignalRecord) -> Result<()>;
}

/// 追加写入的 CSV 台账
#[derive(Debug, Clone)]
pub struct CsvSignalLedger {
    path: PathBuf,
}

impl CsvSignalLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 文件不存在或为空时写入表头
    pub fn initialize(&self) -> Result<()> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(_) => true,
        };
        if needs_header {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut wtr = CsvWriter::from_path(&self.path)?;
            wtr.write_record(CSV_HEADER)?;
            wtr.flush()?;
            log::info!("✅ 信号台账已初始化: {}", self.path.display());
        }
        Ok(())
    }
}

impl SignalLedger for CsvSignalLedger {
    fn record(&self, record: &SignalRecord) -> Result<()> {
        self.initialize()?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(record.columns())?;
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 3)
            .and_then(|d| d.and_hms_opt(14, 35, 0))
            .unwrap()
    }

    fn render(record: &SignalRecord) -> String {
        let mut wtr = CsvWriter::from_writer(Vec::new());
        wtr.write_record(record.columns()).unwrap();
        let bytes = wtr.into_inner().unwrap();
        String::from_utf8(bytes).unwrap().trim_end().to_string()
    }

    fn params() -> PnlParams {
        PnlParams {
            lot_size: 1,
            multiplier: 100.0,
            charges: 63.0,
        }
    }

    #[test]
    fn test_action_tags() {
        assert_eq!(SignalAction::ArmedBuyReset.to_string(), "Armed Buy Reset");
        assert_eq!(SignalAction::Entry(Position::LongPut).to_string(), "sell");
        assert_eq!(
            SignalAction::PyramidAdd(Position::LongCall, 2).to_string(),
            "pyramiding trade buy (2)"
        );
        assert_eq!(SignalAction::Exit(Position::LongCall).to_string(), "buyexit");
        assert_eq!(
            SignalAction::PyramidExit(Position::LongPut, 1).to_string(),
            "pyramiding trade sell (1) exit"
        );
    }

    #[test]
    fn test_exit_pnl_for_both_sides() {
        let call = exit_pnl(Position::LongCall, Some(5300.0), 5350.0, Some(100.0), Some(130.0), &params());
        assert_eq!(call.points, Some(50.0));
        assert!((call.abs.unwrap() - 2937.0).abs() < 1e-9);
        assert!((call.percent.unwrap() - 29.37).abs() < 1e-9);

        // 买入看跌：标的下跌点数为正，权利金上涨即盈利
        let put = exit_pnl(Position::LongPut, Some(5300.0), 5250.0, Some(80.0), Some(60.0), &params());
        assert_eq!(put.points, Some(50.0));
        assert!((put.abs.unwrap() - (-2063.0)).abs() < 1e-9);
    }

    #[test]
    fn test_exit_without_quote_leaves_pnl_empty() {
        let pnl = exit_pnl(Position::LongCall, Some(5300.0), 5310.0, Some(100.0), None, &params());
        assert_eq!(pnl.points, Some(10.0));
        assert!(pnl.abs.is_none() && pnl.percent.is_none());
    }

    #[test]
    fn test_csv_columns() {
        let entry = SignalRecord::entry(
            ts(),
            SignalAction::Entry(Position::LongCall),
            Some("CRUDEOIL25NOV5300CE".to_string()),
            Some(123.456),
            "CRUDEOIL25NOVFUT",
            5319.5,
            &params(),
        );
        assert_eq!(
            render(&entry),
            "03-11-2025 14:35,buy,123.5,CRUDEOIL25NOV5300CE,CRUDEOIL25NOVFUT,5319.50,1,,12345,,,,"
        );

        let pnl = exit_pnl(Position::LongCall, Some(5300.0), 5350.0, Some(100.0), Some(130.0), &params());
        let exit = SignalRecord::exit(
            ts(),
            SignalAction::Exit(Position::LongCall),
            Some("CRUDEOIL25NOV5300CE".to_string()),
            Some(130.0),
            "CRUDEOIL25NOVFUT",
            5350.0,
            Some(5290.0),
            pnl,
            &params(),
        );
        assert_eq!(
            render(&exit),
            "03-11-2025 14:35,buyexit,130.0,CRUDEOIL25NOV5300CE,CRUDEOIL25NOVFUT,5350.00,1,5290.00,,50.0,63,2937,29%"
        );

        let arm = SignalRecord::arming(ts(), SignalAction::ArmedSell, "CRUDEOIL25NOVFUT", 5400.0);
        assert_eq!(arm.columns()[2], "");
        assert_eq!(arm.columns()[6], "");
    }

    #[test]
    fn test_fields_with_commas_are_quoted() {
        let arm = SignalRecord::arming(ts(), SignalAction::ArmedBuy, "CRUDEOIL,25NOV", 5200.0);
        assert_eq!(
            render(&arm),
            "03-11-2025 14:35,Armed Buy,,,\"CRUDEOIL,25NOV\",5200.00,,,,,,,"
        );
    }

    #[test]
    fn test_csv_ledger_writes_header_once() {
        let dir = std::env::temp_dir().join(format!("rustopt-ledger-{}", std::process::id()));
        let path = dir.join("signal.csv");
        let _ = fs::remove_file(&path);
        let ledger = CsvSignalLedger::new(&path);
        let arm = SignalRecord::arming(ts(), SignalAction::ArmedBuy, "CRUDEOIL25NOVFUT", 5200.0);
        ledger.record(&arm).unwrap();
        ledger.record(&arm).unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER.join(","));
        assert_eq!(lines[1], render(&arm));
        let _ = fs::remove_dir_all(&dir);
    }
}
