//! 模拟飞扫演示
//!
//! 对进程内模拟的 Malcolm 设备执行一次完整的飞扫：
//! initialize → configure → run（可选暂停边界）→ 完成。
//! 运行期间按 Ctrl-C 会从信号线程调用 `abort()`，`run()` 随即返回 `Aborted`。

use anyhow::Context;
use clap::Parser;
use malcolm_sdk::prelude::*;
use malcolm_sdk::transport::SimulatedEndpoint;
use std::sync::Arc;
use std::time::Duration;

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "simulated_fly_scan")]
#[command(about = "模拟飞扫演示 - 对进程内模拟设备执行 configure / run / abort")]
struct Args {
    /// 模拟设备报告的协议版本
    #[arg(long, default_value = "4.2")]
    protocol_version: String,

    /// 扫描步数
    #[arg(long, default_value = "50")]
    steps: u64,

    /// 每步耗时（毫秒）
    #[arg(long, default_value = "20")]
    step_interval_ms: u64,

    /// 暂停边界（步数，可重复）
    #[arg(long)]
    breakpoint: Vec<u64>,

    /// 扫描轴（可重复；缺省为设备全部可用轴）
    #[arg(long)]
    axis: Vec<String>,

    /// 文件目录
    #[arg(long, default_value = "/tmp/malcolm/i45-1234")]
    file_dir: String,

    /// 客户端配置文件（TOML）
    #[arg(long)]
    config: Option<String>,
}

/// 打印状态与进度事件
struct ConsoleListener;

impl MalcolmListener for ConsoleListener {
    fn event_performed(&self, event: &MalcolmEvent) {
        match event {
            MalcolmEvent::StateChanged {
                previous, current, ..
            } => println!("   🔄 {previous} → {current}"),
            MalcolmEvent::StepsCompleted { message, .. } => println!("   📈 {message}"),
            MalcolmEvent::ConnectionChanged { connected } => {
                println!("   🔌 connected = {connected}")
            },
        }
    }
}

fn main() -> anyhow::Result<()> {
    malcolm_sdk::init_logger();
    let args = Args::parse();

    println!("🔬 Malcolm SDK - 模拟飞扫演示");
    println!("=========================\n");

    // ==================== 步骤 1: 连接设备 ====================
    println!("📡 步骤 1: 连接模拟设备...");
    let endpoint = Arc::new(
        SimulatedEndpoint::new("sim://BL45P-ML-SCAN-01")
            .with_protocol_version(args.protocol_version.clone())
            .with_total_steps(args.steps)
            .with_step_interval(Duration::from_millis(args.step_interval_ms)),
    );
    let mut builder = MalcolmDeviceBuilder::new("BL45P-ML-SCAN-01").connection(endpoint);
    if let Some(path) = &args.config {
        builder = builder.config_file(path).context("loading client config")?;
    }
    let device = Arc::new(builder.build()?);
    let listener = Arc::new(ConsoleListener);
    device.add_listener(listener.clone())?;
    device.initialize().context("initializing device")?;
    println!(
        "   ✅ 协议 {}，可用轴 {:?}\n",
        device.get_version()?,
        device.get_available_axes()?
    );

    // Ctrl-C → abort
    {
        let device = device.clone();
        ctrlc::set_handler(move || {
            println!("\n   ⚠️  Ctrl-C，正在中止...");
            if let Err(e) = device.abort() {
                eprintln!("   ❌ abort 失败: {e}");
            }
        })?;
    }

    // ==================== 步骤 2: 配置 ====================
    println!("⚙️  步骤 2: 配置扫描...");
    let axis = args.axis.first().cloned().unwrap_or_else(|| "x".to_string());
    device.set_point_generator(Arc::new(StaticGenerator::line(&axis, 0.0, 1.0, args.steps)))?;
    device.set_file_dir(args.file_dir.clone())?;
    let mut model = MalcolmModel::new("fly-scan")
        .with_exposure_time(0.01)
        .with_breakpoints(args.breakpoint.clone());
    if !args.axis.is_empty() {
        model = model.with_axes_to_move(args.axis.clone());
    }
    let model = device.validate_with_return(&model)?;
    device.configure(&model)?;
    println!("   ✅ 已配置，共 {} 步\n", device.total_steps()?);

    // ==================== 步骤 3: 运行 ====================
    println!("🚀 步骤 3: 运行...");
    loop {
        match device.run()? {
            RunOutcome::SegmentComplete => {
                println!("   ⏸️  到达暂停边界（{} 步），继续", device.completed_steps()?);
            },
            RunOutcome::Completed => {
                println!("   ✅ 扫描完成");
                break;
            },
            RunOutcome::Aborted => {
                println!("   🛑 扫描已中止");
                break;
            },
        }
    }

    let metrics = device.metrics()?;
    println!(
        "\n📊 请求 {}，事件 {}，节流 {}",
        metrics.requests_sent, metrics.events_received, metrics.steps_events_throttled
    );
    device.dispose();
    Ok(())
}
