use clap::{Arg, ArgAction, Command};
use rustopt::{
    core::config::{BrokerKind, GlobalConfig},
    exchanges::PaperBroker,
    strategies::common::{Strategy, StrategyDeps, StrategyInstance},
    strategies::reversal_options::{ReversalOptionsConfig, ReversalOptionsStrategy},
    utils::unified_logger::{cleanup_old_logs, init_logger},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载环境变量
    dotenv::dotenv().ok();

    // 解析命令行参数
    let matches = Command::new("RustOpt")
        .version("0.1")
        .about("基于K线的期权反转交易引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("策略配置文件路径")
                .required(true),
        )
        .arg(
            Arg::new("global")
                .short('g')
                .long("global")
                .value_name("FILE")
                .help("全局配置文件路径（券商、日志）")
                .default_value("config/global.yml"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("只评估一轮后退出")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let config_file = matches
        .get_one::<String>("config")
        .ok_or("缺少 --config 参数")?;
    let global_file = matches
        .get_one::<String>("global")
        .map(String::as_str)
        .unwrap_or("config/global.yml");

    let mut config = ReversalOptionsConfig::from_file(config_file)?;
    let global = GlobalConfig::from_file_or_default(global_file)?;

    init_logger(&global.log, Some(&config.strategy.log_level))?;
    let removed = cleanup_old_logs(&global.log);
    if removed > 0 {
        log::info!("🧹 已清理 {} 个过期日志文件", removed);
    }

    if matches.get_flag("once") {
        config.engine.run_once = true;
    }

    log::info!(
        "🚀 启动策略: {} with config: {}, 日志级别: {}",
        config.strategy.name,
        config_file,
        config.strategy.log_level
    );

    let broker = match global.broker.kind {
        BrokerKind::Paper => Arc::new(PaperBroker::new(global.broker.paper.clone())),
    };
    log::info!("✅ 券商已就绪: 纸面交易 (数据目录 {})", global.broker.paper.data_dir);

    let deps = StrategyDeps::builder().with_broker(broker).build()?;
    let run_once = config.engine.run_once;
    let strategy = ReversalOptionsStrategy::create(config, deps)?;

    strategy.start().await?;

    if !run_once {
        // 保持运行直到收到停止信号
        tokio::signal::ctrl_c().await?;
        log::info!("收到停止信号，正在关闭策略...");
    }
    strategy.stop().await?;

    let status = strategy.status().await?;
    log::info!("策略已停止: {:?}", status.state);
    Ok(())
}
