use std::{
    cell::{Cell, RefCell},
    path::{Path, PathBuf},
    rc::Rc,
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use paintpool::schedule::scheduler::FrameCallback;

#[derive(Parser, Debug)]
#[command(name = "paintpool", version)]
struct Cli {
    /// Log pipeline activity at debug level.
    #[arg(long, global = true)]
    verbose: bool,

    /// Pipeline options JSON. Environment overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Animate clients through the pool and write client 0's last frame as a PNG.
    Demo(DemoArgs),
    /// Run the pipeline headless and print a JSON report.
    Bench(BenchArgs),
    /// Decode a raw segment file and print its actions.
    Dump(DumpArgs),
}

#[derive(Parser, Debug)]
struct DemoArgs {
    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value_t = 4)]
    clients: u32,

    /// Frames each client paints.
    #[arg(long, default_value_t = 30)]
    frames: u32,

    /// Override the thread count.
    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, default_value_t = 320)]
    width: u32,

    #[arg(long, default_value_t = 240)]
    height: u32,
}

#[derive(Parser, Debug)]
struct BenchArgs {
    #[arg(long, default_value_t = 8)]
    clients: u32,

    #[arg(long, default_value_t = 60)]
    frames: u32,

    #[arg(long)]
    threads: Option<usize>,

    #[arg(long, value_enum, default_value_t = PolicyChoice::Newest)]
    policy: PolicyChoice,
}

#[derive(Parser, Debug)]
struct DumpArgs {
    /// Raw segment bytes.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyChoice {
    Newest,
    RoundRobin,
}

impl From<PolicyChoice> for paintpool::DispatchPolicy {
    fn from(choice: PolicyChoice) -> Self {
        match choice {
            PolicyChoice::Newest => Self::NewestFirst,
            PolicyChoice::RoundRobin => Self::RoundRobin,
        }
    }
}

#[derive(serde::Serialize)]
struct BenchReport {
    clients: u32,
    frames_per_client: u32,
    threads: usize,
    policy: paintpool::DispatchPolicy,
    completed: bool,
    elapsed_ms: f64,
    frames_per_sec: f64,
    host_ticks: u64,
    stats: paintpool::SchedulerStats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Demo(args) => cmd_demo(cli.config.as_deref(), args),
        Command::Bench(args) => cmd_bench(cli.config.as_deref(), args),
        Command::Dump(args) => cmd_dump(args),
    }
}

fn load_opts(
    config: Option<&Path>,
    threads: Option<usize>,
) -> anyhow::Result<paintpool::PipelineOpts> {
    let opts = match config {
        Some(path) => paintpool::PipelineOpts::from_json_file(path)?,
        None => paintpool::PipelineOpts::default(),
    };
    let mut opts = opts.with_env_overrides();
    if let Some(n) = threads {
        opts.threads = n;
    }
    opts.validate()?;
    Ok(opts)
}

/// One client's animation: a spinning rounded square over a gradient backdrop.
fn animate(client: u32, width: u32, height: u32, remaining: u32) -> FrameCallback {
    Box::new(move |ctx: &mut paintpool::FrameCtx<'_>| {
        let (w, h) = (width as f32, height as f32);
        let t = ctx.now_ms as f32 / 1000.0;
        let hue = (client * 47 % 360) as f32;
        let enc = &mut *ctx.encoder;

        enc.start(width, height);
        enc.set_fill_style(
            paintpool::ColorValue::linear_gradient(0.0, 0.0, w, h)
                .with_stop(0.0, format!("hsl({hue} 60% 20%)"))
                .with_stop(1.0, "#10131c"),
        );
        enc.fill_rect(0.0, 0.0, w, h);

        enc.save();
        enc.translate(w / 2.0, h / 2.0);
        enc.rotate(t * (1.0 + client as f32 * 0.25));
        let side = w.min(h) * 0.4;
        enc.set_shadow_color("rgba(0, 0, 0, 0.5)");
        enc.set_shadow_blur(8.0);
        enc.set_fill_style(format!("hsl({hue} 80% 60%)").as_str());
        enc.fill_rect(-side / 2.0, -side / 2.0, side, side);
        enc.set_shadow_color("transparent");
        enc.begin_path();
        enc.round_rect(-side / 2.0, -side / 2.0, side, side, side / 6.0);
        enc.set_line_width(3.0);
        enc.set_stroke_style("#f5f5f5");
        enc.stroke();
        enc.restore();

        enc.begin_path();
        enc.arc(w - 24.0, 24.0, 12.0, 0.0, t % std::f32::consts::TAU, false);
        enc.set_stroke_style("#ffd166");
        enc.stroke();

        enc.set_font("16px sans-serif");
        enc.set_fill_style("#ffffff");
        enc.fill_text(&format!("client {client}"), 12.0, h - 12.0, None);
        enc.commit();

        if remaining > 1 {
            ctx.request_next_frame(animate(client, width, height, remaining - 1));
        }
    })
}

struct Run {
    completed: bool,
    elapsed: Duration,
    host_ticks: u64,
    stats: paintpool::SchedulerStats,
    last: Option<paintpool::Bitmap>,
}

fn run_clients(
    opts: paintpool::PipelineOpts,
    clients: u32,
    frames: u32,
    size: paintpool::CanvasSize,
) -> anyhow::Result<Run> {
    let mut sched = paintpool::Scheduler::new(opts)?;
    let painted = Rc::new(Cell::new(0u64));
    let last = Rc::new(RefCell::new(None));

    for client in 0..clients {
        let painted = painted.clone();
        let last = last.clone();
        let raf = sched.get_raf(move |bitmap, _dirty| {
            painted.set(painted.get() + 1);
            if client == 0 {
                *last.borrow_mut() = Some(bitmap);
            }
        });
        sched.request_next_frame(raf, animate(client, size.width, size.height, frames))?;
    }

    let target = u64::from(clients) * u64::from(frames);
    let budget = Duration::from_secs(60) + Duration::from_millis(target * 50);
    let mut host = paintpool::HostLoop::at_fps(120);
    let started = Instant::now();
    let completed = host.run_until(&mut sched, budget, |s| {
        s.is_settled() && painted.get() + s.stats().faulted >= target
    });
    let elapsed = started.elapsed();

    Ok(Run {
        completed,
        elapsed,
        host_ticks: host.ticks(),
        stats: sched.stats(),
        last: last.take(),
    })
}

fn cmd_demo(config: Option<&Path>, args: DemoArgs) -> anyhow::Result<()> {
    let opts = load_opts(config, args.threads)?;
    let size = paintpool::CanvasSize::new(args.width, args.height);
    let run = run_clients(opts, args.clients.max(1), args.frames.max(1), size)?;
    if !run.completed {
        tracing::warn!("demo stopped before every frame painted");
    }
    let bitmap = run.last.context("client 0 never painted a frame")?;
    let img = bitmap.to_rgba_image()?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    img.save_with_format(&args.out, image::ImageFormat::Png)
        .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!(
        "wrote {} ({} frames painted in {:.1} ms)",
        args.out.display(),
        run.stats.painted,
        run.elapsed.as_secs_f64() * 1000.0
    );
    Ok(())
}

fn cmd_bench(config: Option<&Path>, args: BenchArgs) -> anyhow::Result<()> {
    let mut opts = load_opts(config, args.threads)?;
    opts.dispatch_policy = args.policy.into();
    let threads = opts.threads;
    let policy = opts.dispatch_policy;
    let run = run_clients(opts, args.clients, args.frames, paintpool::CanvasSize::new(256, 256))?;

    let secs = run.elapsed.as_secs_f64();
    let report = BenchReport {
        clients: args.clients,
        frames_per_client: args.frames,
        threads,
        policy,
        completed: run.completed,
        elapsed_ms: secs * 1000.0,
        frames_per_sec: if secs > 0.0 {
            run.stats.painted as f64 / secs
        } else {
            0.0
        },
        host_ticks: run.host_ticks,
        stats: run.stats,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("serialize bench report")?
    );
    Ok(())
}

fn cmd_dump(args: DumpArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.in_path)
        .with_context(|| format!("read segment '{}'", args.in_path.display()))?;
    let (calls, err) = paintpool::decode_segment(&bytes);
    for (i, call) in calls.iter().enumerate() {
        println!("{i:>5}  {:<28} {call:?}", format!("{:?}", call.op()));
    }
    if let Some(e) = err {
        anyhow::bail!("segment decode stopped after {} actions: {e}", calls.len());
    }
    eprintln!("{} actions", calls.len());
    Ok(())
}
