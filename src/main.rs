//! vm16 Emulator - CLI Entry Point
//!
//! Commands:
//! - `vm16-emu run <image>` - Load a raw machine code image and run it
//! - `vm16-emu disasm <image>` - Disassemble a raw image
//! - `vm16-emu demo` - Step through a built-in call/return program

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "vm16-emu")]
#[command(author = "Yigit")]
#[command(version = "0.1.0")]
#[command(about = "An emulator of a minimal 16-bit stack machine")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the raw machine code image
        image: String,
        /// Load address of the image (decimal or 0x-prefixed hex)
        #[arg(short, long, default_value = "0", value_parser = parse_u16)]
        origin: u16,
        /// Maximum number of steps to run
        #[arg(short, long, default_value = "10000")]
        max_steps: u64,
        /// Show trace output
        #[arg(short, long)]
        trace: bool,
        /// JSON machine configuration file
        #[arg(short, long)]
        config: Option<String>,
        /// Memory size in bytes, overriding the configuration
        #[arg(long)]
        memory_size: Option<usize>,
        /// Skip unknown opcodes instead of faulting
        #[arg(long)]
        permissive: bool,
        /// Preset a register before running, e.g. `--reg r1=0x10`
        #[arg(long = "reg", value_name = "NAME=VALUE")]
        regs: Vec<String>,
        /// Print the final CPU snapshot as JSON
        #[arg(long)]
        json: bool,
    },
    /// Disassemble a raw machine code image
    Disasm {
        /// Path to the raw machine code image
        image: String,
        /// Load address of the image
        #[arg(short, long, default_value = "0", value_parser = parse_u16)]
        origin: u16,
    },
    /// Step through a built-in subroutine call, showing the stack
    Demo,
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Run { image, origin, max_steps, trace, config, memory_size, permissive, regs, json }) => {
            let options = RunOptions { origin, max_steps, trace, config, memory_size, permissive, regs, json };
            run_program(&image, &options);
        }
        Some(Commands::Disasm { image, origin }) => {
            disassemble_file(&image, origin);
        }
        Some(Commands::Demo) => {
            run_demo();
        }
        None => {
            println!("vm16 Emulator v0.1.0");
            println!("A minimal 16-bit stack machine");
            println!();
            println!("Use --help for available commands");
        }
    }
}

struct RunOptions {
    origin: u16,
    max_steps: u64,
    trace: bool,
    config: Option<String>,
    memory_size: Option<usize>,
    permissive: bool,
    regs: Vec<String>,
    json: bool,
}

fn parse_u16(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid 16-bit value {:?}: {}", s, e))
}

fn read_image(path: &str) -> Vec<u8> {
    match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("❌ Failed to read file: {}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(options: &RunOptions) -> vm16::MachineConfig {
    use vm16::{MachineConfig, OpcodePolicy};

    let mut config = match &options.config {
        Some(path) => {
            let source = match std::fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    eprintln!("❌ Failed to read config: {}", e);
                    std::process::exit(1);
                }
            };
            match MachineConfig::from_json(&source) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    std::process::exit(1);
                }
            }
        }
        None => MachineConfig::default(),
    };

    if let Some(size) = options.memory_size {
        config = config.with_memory_size(size);
    }
    if options.permissive {
        config = config.with_opcode_policy(OpcodePolicy::Permissive);
    }
    config
}

fn preset_registers(cpu: &mut vm16::Cpu, assignments: &[String]) -> Result<(), String> {
    for assignment in assignments {
        let (name, value) = assignment
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=VALUE, got {:?}", assignment))?;
        let value = parse_u16(value)?;
        cpu.set_register_by_name(name, value).map_err(|e| e.to_string())?;
    }
    Ok(())
}

fn run_program(path: &str, options: &RunOptions) {
    use vm16::{Cpu, Program, Step};
    use vm16::asm::disassemble_at;

    println!("🔧 Running: {}", path);

    let image = read_image(path);
    if image.is_empty() {
        eprintln!("❌ No instructions to execute");
        std::process::exit(1);
    }

    let config = load_config(options);
    let mut cpu = match Cpu::new(&config) {
        Ok(cpu) => cpu,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    let image_len = image.len();
    if let Err(e) = cpu.load_program(&Program::from_bytes(options.origin, image)) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }
    cpu.set_register(vm16::Register::Ip, options.origin);

    if let Err(e) = preset_registers(&mut cpu, &options.regs) {
        eprintln!("❌ {}", e);
        std::process::exit(1);
    }

    println!("📂 Loaded {} bytes at {:#06x}", image_len, options.origin);
    println!("Opcode policy: {:?}", cpu.policy());
    println!();
    println!("━━━ Execution ━━━");

    let mut steps = 0u64;
    while cpu.is_running() && steps < options.max_steps {
        let ip = cpu.ip();
        let text = match disassemble_at(&cpu.mem, ip) {
            Ok((text, _)) => text,
            Err(_) => "??".to_string(),
        };

        match cpu.step() {
            Ok(step) => {
                if options.trace {
                    let note = match step {
                        Step::Executed(_) => "",
                        Step::Skipped(_) => "  (skipped)",
                    };
                    println!("{:#06x}: {:<24} ACC={:#06x} SP={:#06x} FP={:#06x}{}",
                        ip, text, cpu.peek_register(vm16::Register::Acc), cpu.sp(), cpu.fp(), note);
                }
                steps += 1;
            }
            Err(e) => {
                eprintln!("❌ CPU error at IP={:#06x}: {}", ip, e);
                std::process::exit(1);
            }
        }
    }

    println!();
    println!("━━━ Result ━━━");
    println!("Steps: {}", steps);
    println!("State: {:?}", cpu.state);
    println!("{}", cpu.register_dump());
    match cpu.view_stack() {
        Ok(stack) => println!("Stack: {}", stack),
        Err(e) => println!("Stack: unavailable ({})", e),
    }

    if options.json {
        match serde_json::to_string_pretty(&cpu.snapshot()) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("❌ Failed to encode snapshot: {}", e);
                std::process::exit(1);
            }
        }
    }

    if steps >= options.max_steps && cpu.is_running() {
        println!();
        println!("⚠️  Reached max steps limit ({}). Use --max-steps to increase.", options.max_steps);
    }
}

fn disassemble_file(path: &str, origin: u16) {
    use vm16::disassemble;

    println!("📖 Disassembling: {}", path);
    println!();

    let image = read_image(path);
    println!("{}", disassemble(&image, origin));
}

fn run_demo() {
    use vm16::{Cpu, ProgramBuilder, Register};
    use vm16::asm::disassemble_at;

    const SUBROUTINE: u16 = 0x3000;

    println!("━━━ Call/Return Demo ━━━");
    println!();

    let mut asm = ProgramBuilder::new();
    asm.push_lit(0x1111)
        .push_lit(0x2222)
        .push_lit(0x3333)
        .mov_lit_reg(0x1234, Register::R1)
        .mov_lit_reg(0x5678, Register::R4)
        .push_lit(0x0000) // argument count
        .cal_lit(SUBROUTINE)
        .push_lit(0x4444)
        .hlt();
    asm.org(SUBROUTINE)
        .push_lit(0x0102)
        .push_lit(0x0304)
        .push_lit(0x0506)
        .mov_lit_reg(0x0708, Register::R1)
        .mov_lit_reg(0x090a, Register::R8)
        .ret();

    let mut cpu = Cpu::default();
    if let Err(e) = cpu.load_program(&asm.build()) {
        eprintln!("❌ Failed to load program: {}", e);
        std::process::exit(1);
    }

    while cpu.is_running() {
        let ip = cpu.ip();
        let text = disassemble_at(&cpu.mem, ip)
            .map(|(text, _)| text)
            .unwrap_or_else(|_| "??".to_string());

        if let Err(e) = cpu.step() {
            eprintln!("❌ CPU error at IP={:#06x}: {}", ip, e);
            std::process::exit(1);
        }

        println!("{:#06x}: {}", ip, text);
        println!("{}", cpu.register_dump());
        match cpu.view_stack() {
            Ok(stack) => println!("stack {}", stack),
            Err(e) => println!("stack unavailable ({})", e),
        }
        println!();
    }

    println!("✓ Halted after {} steps", cpu.cycles);
}
