use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use log::info;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use microslice::dependency::{DataDependencyConfig, LocatedLValue};
use microslice::microcode::{Microcode, MicrocodeAddress, Statement};
use microslice::parser::parse_term;
use microslice::slicing::{compute_slice, dependencies_at, find_useless_statements, possible_values_at};
use microslice::term::Terms;

#[derive(Parser)]
#[command(name = "microslice")]
#[command(about = "Backward data dependencies and slicing on sample microcode programs", long_about = None)]
struct Cli {
    /// Increase verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a sample program
    List {
        /// Program name: straight, dead, alias, loop, branch
        program: String,
    },
    /// Slice a program with respect to an expression observed at an address
    Slice {
        program: String,
        /// Instruction address of the observation point
        #[arg(short, long)]
        at: String,
        /// Observed expression, e.g. `%r3` or `[%sp + 4]`
        #[arg(short, long)]
        seed: String,
    },
    /// List the assignments whose value is never read
    Useless { program: String },
    /// Print the dependencies of an lvalue observed at `at`, as seen at `point`
    Deps {
        program: String,
        #[arg(short, long)]
        at: String,
        #[arg(short, long)]
        seed: String,
        /// Address where dependencies are inspected
        #[arg(short, long)]
        point: String,
        /// Step bound (defaults to the number of nodes)
        #[arg(long)]
        steps: Option<usize>,
        /// Fold guards into the dependency sets
        #[arg(long)]
        jump_cond: bool,
        /// Flatten dependency sets after every step
        #[arg(long)]
        simple: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    TermLogger::init(level, Config::default(), TerminalMode::Mixed, ColorChoice::Auto)?;

    let terms = Terms::default();

    match cli.command {
        Commands::List { program } => {
            let mc = get_program(&terms, &program)?;
            print!("{}", mc.pretty(&terms));
        }
        Commands::Slice { program, at, seed } => {
            let mc = get_program(&terms, &program)?;
            let seed = parse_term(&terms, &seed)?;
            let slice = compute_slice(&terms, &mc, parse_address(&at)?, seed);
            info!("Slice has {} arrows", slice.len());
            for e in slice {
                println!("{}", mc.edge(e).pretty(&terms));
            }
        }
        Commands::Useless { program } => {
            let mc = get_program(&terms, &program)?;
            let useless = find_useless_statements(&terms, &mc);
            info!("Found {} useless statements", useless.len());
            for e in useless {
                println!("{}", mc.edge(e).pretty(&terms));
            }
        }
        Commands::Deps {
            program,
            at,
            seed,
            point,
            steps,
            jump_cond,
            simple,
        } => {
            let mc = get_program(&terms, &program)?;
            let seed = LocatedLValue::parse(&terms, parse_address(&at)?, &seed)?;
            let config = DataDependencyConfig::default()
                .with_consider_jump_cond(jump_cond)
                .with_only_simple_sets(simple);
            let point = parse_address(&point)?;
            let steps = steps.unwrap_or(mc.node_count());

            let deps = dependencies_at(&terms, &mc, config, &[seed], point, steps);
            println!("dependencies at {}: {}", point, terms.pretty(deps));
            for v in possible_values_at(&terms, &mc, config, &[seed], point, steps) {
                println!("  {}", terms.pretty(v));
            }
        }
    }

    Ok(())
}

/// `0x10` or `16` for `[0x10,0]`, `0x10,2` for `[0x10,2]`.
fn parse_address(text: &str) -> Result<MicrocodeAddress> {
    let number = |s: &str| -> Result<u64> {
        let s = s.trim();
        let value = match s.strip_prefix("0x") {
            Some(hex) => u64::from_str_radix(hex, 16)?,
            None => s.parse::<u64>()?,
        };
        Ok(value)
    };
    match text.split_once(',') {
        Some((global, local)) => Ok(MicrocodeAddress::new(number(global)?, number(local)? as u32)),
        None => Ok(MicrocodeAddress::new(number(text)?, 0)),
    }
}

/// Build a program from `(src, tgt, lval, rval)` rows; an empty `lval` is a skip.
fn build(terms: &Terms, rows: &[(u64, u64, &str, &str)]) -> Result<Microcode> {
    let mut mc = Microcode::new();
    for &(src, tgt, lval, rval) in rows {
        let (src, tgt) = (MicrocodeAddress::new(src, 0), MicrocodeAddress::new(tgt, 0));
        if lval.is_empty() {
            mc.add_skip(src, tgt, None);
        } else {
            let lval = parse_term(terms, lval)?;
            let rval = parse_term(terms, rval)?;
            mc.add_assignment(terms, src, tgt, lval, rval, None)?;
        }
    }
    Ok(mc)
}

fn get_program(terms: &Terms, name: &str) -> Result<Microcode> {
    match name {
        "straight" => build(
            terms,
            &[
                (0x0, 0x4, "%r1", "5"),
                (0x4, 0x8, "%r4", "7"),
                (0x8, 0xc, "%r2", "%r1 + 1"),
                (0xc, 0x10, "%r3", "%r2"),
            ],
        ),
        "dead" => build(
            terms,
            &[
                (0x0, 0x4, "%r1", "1"),
                (0x4, 0x8, "%r1", "2"),
                (0x8, 0xc, "%r2", "%r1"),
            ],
        ),
        "alias" => build(
            terms,
            &[
                (0x0, 0x4, "[%sp + 8]", "%r1"),
                (0x4, 0x8, "[%y]", "%v"),
                (0x8, 0xc, "%r2", "[%x] + [%sp + 8]"),
            ],
        ),
        "loop" => {
            let mut mc = build(
                terms,
                &[
                    (0x0, 0x4, "%i", "0"),
                    (0x4, 0x8, "%acc", "%acc + %i"),
                    (0x8, 0x4, "%i", "%i + 1"),
                    (0x8, 0xc, "", ""),
                ],
            )?;
            mc.add_dynamic_successor(
                MicrocodeAddress::new(0xc, 0),
                terms.mk_register("lr"),
                Statement::Jump,
                None,
            );
            Ok(mc)
        }
        "branch" => {
            let mut mc = build(terms, &[(0x0, 0x4, "%c", "[%sp]")])?;
            let c = terms.mk_register("c");
            let taken = parse_term(terms, "%c == 0")?;
            let not_taken = terms.mk_not(taken);
            let (p4, p8, pc, p10) = (
                MicrocodeAddress::new(0x4, 0),
                MicrocodeAddress::new(0x8, 0),
                MicrocodeAddress::new(0xc, 0),
                MicrocodeAddress::new(0x10, 0),
            );
            mc.add_skip(p4, p8, Some(taken));
            mc.add_skip(p4, pc, Some(not_taken));
            mc.add_assignment(terms, p8, p10, terms.mk_register("r0"), terms.mk_register("a"), None)?;
            mc.add_assignment(terms, pc, p10, terms.mk_register("r0"), c, None)?;
            Ok(mc)
        }
        _ => Err(eyre!(
            "Unknown program `{}`. Available: straight, dead, alias, loop, branch",
            name
        )),
    }
}
