//! QAFilter 行情看板
//!
//! 加载日线行情，组装看板上下文，按命令行参数施加过滤并输出各控件数据。
//!
//! 运行: cargo run --bin qafilter-dashboard -- --data data/ndx.csv --year 2000:2005

use anyhow::{anyhow, Context};
use qafilter::record::{load_rows, weekday_ordinal, RecordStore};
use qafilter::utils::config::DashboardConfig;
use qafilter::{FilterEvent, MarketDashboard};

/// 命令行参数
#[derive(Debug, Default)]
struct CliArgs {
    config: Option<String>,
    data: Option<String>,
    years: Option<(i32, i32)>,
    weekdays: Vec<u32>,
    rows: Option<usize>,
}

impl CliArgs {
    fn parse() -> anyhow::Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut cli = CliArgs::default();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1);
            match args[i].as_str() {
                "--config" | "-c" => {
                    cli.config = Some(required(value, "--config")?.clone());
                    i += 1;
                }
                "--data" | "-d" => {
                    cli.data = Some(required(value, "--data")?.clone());
                    i += 1;
                }
                "--year" | "-y" => {
                    cli.years = Some(parse_year_range(required(value, "--year")?)?);
                    i += 1;
                }
                "--weekday" | "-w" => {
                    let name = required(value, "--weekday")?;
                    let day = weekday_ordinal(name)
                        .ok_or_else(|| anyhow!("unknown weekday: {}", name))?;
                    cli.weekdays.push(day);
                    i += 1;
                }
                "--rows" | "-n" => {
                    let raw = required(value, "--rows")?;
                    cli.rows = Some(
                        raw.parse()
                            .with_context(|| format!("invalid --rows value: {}", raw))?,
                    );
                    i += 1;
                }
                other => log::warn!("Ignoring unknown argument: {}", other),
            }
            i += 1;
        }

        Ok(cli)
    }
}

fn required<'a>(value: Option<&'a String>, flag: &str) -> anyhow::Result<&'a String> {
    value.ok_or_else(|| anyhow!("{} requires a value", flag))
}

/// `LO:HI` 或单个年份
fn parse_year_range(raw: &str) -> anyhow::Result<(i32, i32)> {
    let (lo, hi) = raw.split_once(':').unwrap_or((raw, raw));
    let lo = lo
        .trim()
        .parse()
        .with_context(|| format!("invalid year range: {}", raw))?;
    let hi = hi
        .trim()
        .parse()
        .with_context(|| format!("invalid year range: {}", raw))?;
    Ok((lo, hi))
}

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse()?;

    // 1. 加载配置文件 (日志级别来自配置，先加载再初始化日志)
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| "config/dashboard.toml".to_string());
    let (mut config, config_error) = match DashboardConfig::load_from_file(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (DashboardConfig::default(), Some(e)),
    };

    // 初始化日志
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.app.log_level.as_str()),
    )
    .init();

    if let Some(e) = config_error {
        log::warn!("Failed to load config file {}: {}, using defaults", config_path, e);
    }

    if let Some(data) = cli.data {
        config.data.path = data;
    }
    if let Some(rows) = cli.rows {
        config.table.rows = rows;
    }

    log::info!("{} starting", config.app.name);
    log::info!("  Data file: {}", config.data.path);
    log::info!("  Date format: {}", config.data.date_format);

    // 2. 加载记录
    let rows = load_rows(&config.data.path)
        .with_context(|| format!("failed to load {}", config.data.path))?;
    let store = RecordStore::load_with_format(&rows, &config.data.date_format)
        .context("failed to ingest rows")?;

    // 3. 组装看板
    let mut dashboard = MarketDashboard::new(store).context("failed to build dashboard")?;
    dashboard
        .engine()
        .subscribe(Box::new(|event: &FilterEvent| {
            log::info!(
                "Filter on {} applied: {} live records (generation {})",
                event.dimension,
                event.live_count,
                event.generation
            );
        }));

    // 4. 施加过滤
    if let Some((lo, hi)) = cli.years {
        dashboard.filter_years(lo, hi)?;
    }
    if !cli.weekdays.is_empty() {
        dashboard.filter_weekdays(&cli.weekdays)?;
    }

    // 5. 输出
    let count = dashboard.data_count()?;
    println!("{} selected out of {} records", count.live, count.total);

    println!("\nGain / Loss");
    for share in dashboard.gain_or_loss_shares()? {
        println!("  {}", share.label());
    }

    println!("\nDay of week");
    for (key, count) in dashboard.day_of_week_counts()? {
        println!("  {:<4} {}", key.display_name(), count);
    }

    println!("\nQuarter volume");
    for (key, volume) in dashboard.quarter_volumes()? {
        println!("  {:<4} {:.0}", key.display_name(), volume);
    }

    println!("\nYearly performance");
    for point in dashboard.yearly_bubbles()? {
        println!(
            "  {}  gain {:>9.2}  gain% {:>7.2}  fluctuation% {:>7.2}",
            point.year, point.x, point.y, point.radius
        );
    }

    println!("\nMonthly index (last 12)");
    let monthly = dashboard.monthly_index()?;
    for point in monthly.iter().skip(monthly.len().saturating_sub(12)) {
        println!(
            "  {}  avg {:>9.0}  move {:>9.2}",
            point.month, point.index.avg, point.monthly_move
        );
    }

    println!("\nLatest records");
    for section in dashboard.table(config.table.rows)? {
        println!("  {}", section.label);
        for row in section.rows {
            println!(
                "    {}  open {:>9.2}  close {:>9.2}  volume {:.0}",
                row.date, row.open, row.close, row.volume
            );
        }
    }

    Ok(())
}
