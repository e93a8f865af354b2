//! cellforge - PPU guest execution engine
//!
//! Loads a raw big-endian code image, discovers its functions and runs it
//! on a guest thread with the configured execution strategy.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cf_core::config::{Config, TranslatorMode};
use cf_core::error::PpuError;
use cf_memory::{MemoryManager, PageFlags};
use cf_ppu::cell::registry;
use cf_ppu::recompiler::translate_segment;
use cf_ppu::syscall::{BasicSyscalls, NoSyscalls, SyscallHandler};
use cf_ppu::{CompiledExecutor, Executor, PpuInterpreter, PpuThread, Segment};

const USAGE: &str = "usage: cellforge <image> [--base ADDR] [--entry ADDR] [--steps N] \
                     [--mode interpreter|function|module] [--dump-hir]";

struct Args {
    image: PathBuf,
    base: u32,
    entry: Option<u32>,
    steps: Option<u64>,
    mode: Option<TranslatorMode>,
    dump_hir: bool,
}

fn parse_number(text: &str) -> Result<u64> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    value.with_context(|| format!("invalid number '{}'", text))
}

fn parse_address(text: &str) -> Result<u32> {
    let value = parse_number(text)?;
    u32::try_from(value).with_context(|| format!("address {} is outside the guest space", text))
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        image: PathBuf::new(),
        base: 0x10000,
        entry: None,
        steps: None,
        mode: None,
        dump_hir: false,
    };
    let mut image = None;
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| iter.next().with_context(|| format!("{} needs a value\n{}", flag, USAGE));
        match arg.as_str() {
            "--base" => args.base = parse_address(&value("--base")?)?,
            "--entry" => args.entry = Some(parse_address(&value("--entry")?)?),
            "--steps" => args.steps = Some(parse_number(&value("--steps")?)?),
            "--mode" => {
                let mode = value("--mode")?;
                args.mode = Some(mode.parse().map_err(anyhow::Error::msg)?);
            }
            "--dump-hir" => args.dump_hir = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            flag if flag.starts_with("--") => bail!("unknown option {}\n{}", flag, USAGE),
            path => image = Some(PathBuf::from(path)),
        }
    }
    args.image = image.context(USAGE)?;
    Ok(args)
}

/// Ends the thread with an error once `remaining` steps have run
struct StepBudget {
    inner: Arc<dyn Executor>,
    remaining: AtomicU64,
}

impl Executor for StepBudget {
    fn step(&self, thread: &mut PpuThread) -> Result<(), PpuError> {
        let left = self.remaining.load(Ordering::Relaxed);
        if left == 0 {
            return Err(PpuError::Thread("step budget exhausted".to_string()));
        }
        self.remaining.store(left - 1, Ordering::Relaxed);
        self.inner.step(thread)
    }
}

fn main() -> Result<()> {
    let args = parse_args()?;
    let config = Config::load().unwrap_or_default();
    cf_core::logging::init(&config);

    let image = std::fs::read(&args.image).with_context(|| format!("reading {}", args.image.display()))?;
    let size = u32::try_from(image.len()).context("image does not fit the guest space")?;
    let memory = MemoryManager::new().context("reserving guest memory")?;
    memory
        .load_segment(args.base, &image, PageFlags::RWX)
        .with_context(|| format!("loading image at 0x{:08x}", args.base))?;
    tracing::info!("Loaded {} ({} bytes) at 0x{:08x}", args.image.display(), size, args.base);

    let mut segment = Segment::new(args.base, size);
    segment.analyze(&memory);
    for function in segment.functions.values() {
        println!(
            "{} 0x{:08x} size 0x{:x} blocks {} args {:?} returns {:?}",
            function.name,
            function.address,
            function.size,
            function.blocks.len(),
            function.argument_shape,
            function.return_shape
        );
    }

    if args.dump_hir {
        let translation = translate_segment(&memory, &segment);
        print!("{}", translation.module);
        if translation.errors > 0 {
            eprintln!(
                "{} instructions could not be lowered in {} functions",
                translation.errors,
                translation.incomplete.len()
            );
        }
    }

    let Some(entry) = args.entry else {
        return Ok(());
    };

    let syscalls: Arc<dyn SyscallHandler> = if config.ppu.hle_enabled {
        Arc::new(BasicSyscalls::new())
    } else {
        Arc::new(NoSyscalls)
    };
    let mut interpreter = PpuInterpreter::with_syscalls(Arc::clone(&memory), syscalls);
    interpreter.set_trace(config.debug.trace_instructions);
    let interpreter = Arc::new(interpreter);

    let mode = args.mode.unwrap_or(config.ppu.translator);
    let mut executor: Arc<dyn Executor> = if mode.requires_analysis() {
        let compiled = CompiledExecutor::with_evaluator(Arc::clone(&interpreter), mode);
        compiled.add_segment(args.base, size)?;
        Arc::new(compiled)
    } else {
        interpreter
    };
    if let Some(steps) = args.steps {
        executor = Arc::new(StepBudget {
            inner: executor,
            remaining: AtomicU64::new(steps),
        });
    }

    let mut thread = PpuThread::new(1, Arc::clone(&memory));
    thread.allocate_stack(config.ppu.stack_size)?;
    thread.set_entry(entry, 0);

    let guest = registry().spawn(thread, executor)?;
    let regs = guest.join()?;
    registry().remove_thread(guest.id());
    println!(
        "{} ended {:?} at 0x{:08x}: r3 = 0x{:016x}",
        guest.name(),
        guest.status(),
        regs.pc,
        regs.gpr[3]
    );
    Ok(())
}
