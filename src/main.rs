use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use atomic_counter::AtomicCounter;
use clap::Parser;
#[allow(unused_imports)]
use tracing::{trace, debug, error, info, warn};

use n64_rdp::*;
use n64_rdp::backend::RenderCommandBuffer;

const DMEM_SIZE: usize = 0x1000;

/// Replay a captured RDP workload: a display list task (or a raw DP command range) run
/// against RDRAM and DMEM dumps.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// RDRAM dump, big endian
    rdram: PathBuf,

    /// RSP DMEM dump holding the task header
    dmem: PathBuf,

    /// Execute raw RDP commands from --dp-start to --dp-end instead of a display list
    #[arg(long)]
    lle: bool,

    #[arg(long, value_parser = parse_hex, default_value = "0")]
    dp_start: u32,

    #[arg(long, value_parser = parse_hex, default_value = "0")]
    dp_end: u32,

    /// Read the DP commands from DMEM
    #[arg(long)]
    dp_from_dmem: bool,

    /// Number of times to run the workload
    #[arg(long, default_value_t = 1)]
    frames: u32,

    #[arg(long, default_value_t = 1024)]
    cache_capacity: usize,

    #[arg(long)]
    fb_emulation: bool,

    /// Force a microcode instead of identifying it (f3d, f3dex, f3dex2, s2dex, ...)
    #[arg(long)]
    ucode: Option<String>,

    /// Log every interpreted command
    #[arg(long)]
    trace_commands: bool,
}

fn parse_hex(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches('$');
    u32::from_str_radix(digits, 16).map_err(|e| format!("{}: {}", s, e))
}

fn load_dump(name: &'static str, path: &PathBuf, needed: usize) -> Result<Memory, GfxError> {
    let bytes = std::fs::read(path)?;
    if bytes.len() < needed {
        return Err(GfxError::DumpTooSmall { name: name, size: bytes.len(), needed: needed });
    }
    Ok(Memory::from_bytes(&bytes))
}

#[derive(Default, Debug)]
struct RenderStats {
    commands: u64,
    draws: u64,
    vertices: u64,
    uploads: u64,
    swaps: u64,
}

// stand-in for a render thread: consumes the command stream and counts it
fn render_thread(buffer: Arc<RenderCommandBuffer>, done: Arc<AtomicBool>) -> RenderStats {
    let mut stats = RenderStats::default();
    loop {
        match buffer.try_pop() {
            Some(command) => {
                stats.commands += 1;
                match command {
                    RenderCommand::Draw { vertices, .. } => {
                        stats.draws += 1;
                        stats.vertices += vertices.len() as u64;
                    },
                    RenderCommand::UploadTexture { .. } => stats.uploads += 1,
                    RenderCommand::SwapBuffers => stats.swaps += 1,
                    _ => {},
                };
            },
            None => {
                if done.load(Ordering::SeqCst) {
                    break;
                }
                thread::yield_now();
            },
        };
    }
    stats
}

fn run(args: Args) -> Result<(), GfxError> {
    let rdram = load_dump("RDRAM", &args.rdram, 4)?;
    let dmem = load_dump("DMEM", &args.dmem, DMEM_SIZE)?;
    info!("RDRAM {} bytes, DMEM {} bytes", rdram.len(), dmem.len());

    let comms = HostCommunication::new();
    if let Ok(mut settings) = comms.settings.write() {
        settings.fb_emulation = args.fb_emulation;
        settings.cache_capacity = args.cache_capacity;
        settings.ucode_override = args.ucode.as_deref().and_then(|name| {
            let ucode = Microcode::from_name(name);
            if ucode.is_none() {
                warn!("unknown microcode name {}, identifying instead", name);
            }
            ucode
        });
    }
    if let Ok(mut tweakables) = comms.tweakables.write() {
        tweakables.trace_commands = args.trace_commands;
    }

    let texture_memory = comms.settings().texture_memory;
    let buffer = Arc::new(RenderCommandBuffer::with_capacity(16384));
    let backend = CommandBufferBackend::new(buffer.clone(), texture_memory);

    let done = Arc::new(AtomicBool::new(false));
    let render = {
        let buffer = buffer.clone();
        let done = done.clone();
        thread::spawn(move || render_thread(buffer, done))
    };

    let mut rdp = Rdp::new(comms.clone(), rdram, dmem, backend);
    let mut result = Ok(());
    for frame in 0..args.frames {
        debug!("frame {}", frame);
        result = if args.lle {
            comms.dpc_current.store(args.dp_start, Ordering::SeqCst);
            comms.dpc_end.store(args.dp_end, Ordering::SeqCst);
            comms.dpc_status.store(if args.dp_from_dmem { DPC_STATUS_XBUS_DMEM_DMA } else { 0 }, Ordering::SeqCst);
            rdp.process_rdp_list()
        } else {
            rdp.process_display_list()
        };

        if result.is_err() {
            break;
        }
    }

    done.store(true, Ordering::SeqCst);
    let render_stats = render.join().unwrap_or_default();
    let cache = rdp.cache_stats();

    println!("microcode        : {:?}", rdp.microcode());
    println!("interrupts       : {}", comms.interrupts_raised.get());
    println!("render commands  : {}", render_stats.commands);
    println!("draws            : {} ({} vertices)", render_stats.draws, render_stats.vertices);
    println!("texture uploads  : {}", render_stats.uploads);
    println!("buffer swaps     : {}", render_stats.swaps);
    println!("cache            : {} hits, {} misses, {} evictions", cache.hits, cache.misses, cache.evictions);
    for fb in rdp.frame_buffer_info().iter().filter(|fb| fb.width != 0) {
        println!("frame buffer     : ${:08X} {}x{} ({} bit)", fb.addr, fb.width, fb.height, 4 << fb.size);
    }

    result
}

fn main() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
