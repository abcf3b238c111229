//! Dumbbell 拓扑 ON/OFF TCP 实验
//!
//! N 个网关经由一台路由器连到一台服务器，每个网关上一个 ON/OFF 源，
//! 输出 cwnd-i / rtt-i / tx-i / phytx-i / rx 五类 trace。

use clap::Parser;
use onoff_sim::net::DataRate;
use onoff_sim::scenario::{Scenario, ScenarioConfig};
use onoff_sim::sim::TimeDist;
use onoff_sim::trace::FileStreams;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

#[derive(Debug, Parser)]
#[command(
    name = "onoff-dumbbell",
    about = "Dumbbell 拓扑仿真：N 个网关上的 ON/OFF TCP 源 -> 单台服务器"
)]
struct Args {
    /// JSON 配置文件；命令行参数覆盖其中的字段
    #[arg(long)]
    config: Option<PathBuf>,

    /// trace 输出目录
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// 网关（源）个数
    #[arg(long)]
    gateways: Option<usize>,

    /// 实验时长（秒）
    #[arg(long)]
    sim_time_s: Option<f64>,

    /// 仿真停止时间（秒），缺省为 sim_time + 5
    #[arg(long)]
    stop_s: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    /// 应用包大小（字节）
    #[arg(long)]
    packet_size: Option<u32>,

    /// ON 期间的发送速率，例如 8Mbps
    #[arg(long)]
    data_rate: Option<DataRate>,

    /// ON 时长分布，例如 constant:1 / exp:1 / uniform:0.5:1.5
    #[arg(long)]
    on_time: Option<TimeDist>,

    /// OFF 时长分布
    #[arg(long)]
    off_time: Option<TimeDist>,

    /// 把运行汇总写成 JSON
    #[arg(long)]
    summary_json: Option<PathBuf>,
}

impl Args {
    fn apply(&self, cfg: &mut ScenarioConfig) {
        if let Some(n) = self.gateways {
            cfg.gateways = n;
        }
        if let Some(t) = self.sim_time_s {
            cfg.sim_time_s = t;
        }
        if self.stop_s.is_some() {
            cfg.stop_s = self.stop_s;
        }
        if let Some(seed) = self.seed {
            cfg.seed = seed;
        }
        if let Some(size) = self.packet_size {
            cfg.source.packet_size = size;
        }
        if let Some(rate) = self.data_rate {
            cfg.source.data_rate = rate;
        }
        if let Some(d) = self.on_time {
            cfg.source.on_time = d;
        }
        if let Some(d) = self.off_time {
            cfg.source.off_time = d;
        }
    }
}

fn run(args: Args) -> onoff_sim::Result<()> {
    let mut cfg = match &args.config {
        Some(path) => ScenarioConfig::load(path)?,
        None => ScenarioConfig::default(),
    };
    args.apply(&mut cfg);

    fs::create_dir_all(&args.out_dir)?;
    let mut scenario = Scenario::build(cfg, Box::new(FileStreams::new(args.out_dir.clone())))?;
    let report = scenario.run()?;
    println!("{report}");

    if let Some(path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)?;
        eprintln!("wrote summary to {}", path.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "❌ 实验失败");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
