use clap::{Parser, Subcommand};
use micrograph::{
    input_leaves, squared_error, Analyzer, AnalyzerConfig, Compilation, GraphData, Lexer, Network,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fs;
use std::path::PathBuf;

const MAX_JSON_DEPTH: usize = 2_000;

#[derive(Parser)]
#[command(name = "micrograph")]
#[command(about = "Scalar computation graphs with reverse-mode autodiff", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file into a graph and print its bindings
    Run {
        /// Input source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Run a backward pass from the last statement's value
        #[arg(short, long)]
        backward: bool,

        /// Print the graph as JSON nodes/links instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Check syntax and identifier resolution without printing the graph
    Check {
        /// Input source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the tokens produced by the lexer
    Tokens {
        /// Input source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Print the parsed statements
    Ast {
        /// Input source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the AST as JSON
        #[arg(long)]
        json: bool,
    },

    /// Build a random network, run one forward/backward pass and print parameters
    Network {
        /// Number of inputs
        #[arg(long, default_value_t = 3)]
        inputs: usize,

        /// Comma-separated layer widths
        #[arg(long, value_delimiter = ',', default_values_t = vec![4, 4, 1])]
        layers: Vec<usize>,

        /// Input values (defaults to 1.0 for every input)
        #[arg(long = "x", value_delimiter = ',', allow_negative_numbers = true)]
        x: Vec<f64>,

        /// Seed for parameter initialisation
        #[arg(long)]
        seed: Option<u64>,

        /// Print the output graph as JSON
        #[arg(long)]
        json: bool,
    },

    /// Train a small network on a toy dataset with gradient descent
    Demo {
        #[arg(long, default_value_t = 100)]
        epochs: usize,

        #[arg(long = "learning-rate", default_value_t = 0.05)]
        learning_rate: f64,

        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Run { file, backward, json } => run_file(file, backward, json)?,
        Commands::Check { file } => check_file(file)?,
        Commands::Tokens { file } => print_tokens(file)?,
        Commands::Ast { file, json } => print_ast(file, json)?,
        Commands::Network { inputs, layers, x, seed, json } => {
            run_network(inputs, layers, x, seed, json)?
        }
        Commands::Demo { epochs, learning_rate, seed } => run_demo(epochs, learning_rate, seed)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn compile_file(file: &PathBuf, backward: bool) -> anyhow::Result<Compilation> {
    let source = fs::read_to_string(file)?;
    let config = AnalyzerConfig::default().with_auto_backward(backward);
    let mut analyzer = Analyzer::new(config);
    analyzer
        .analyze(&source)
        .map_err(|e| anyhow::anyhow!("{}: {}", file.display(), e))?;
    analyzer
        .into_compilation()
        .ok_or_else(|| anyhow::anyhow!("{}: no compilation produced", file.display()))
}

fn run_file(file: PathBuf, backward: bool, json: bool) -> anyhow::Result<()> {
    let compilation = compile_file(&file, backward)?;

    if json {
        let data = GraphData::from_environment(&compilation.environment);
        println!("{}", data.to_json()?);
        return Ok(());
    }

    println!("{:<12} | {:>12} | {:>12} | node", "identifier", "value", "grad");
    println!("{:-<12}-|-{:->12}-|-{:->12}-|-----", "", "", "");
    for (name, value) in compilation.environment.iter() {
        println!(
            "{:<12} | {:>12.6} | {:>12.6} | {}",
            name,
            value.data(),
            value.grad(),
            value.name()
        );
    }

    match &compilation.result {
        Some(result) => println!("\nResult: {} = {}", result.name(), result.data()),
        None => println!("\nNo assignments found"),
    }
    Ok(())
}

fn check_file(file: PathBuf) -> anyhow::Result<()> {
    let compilation = compile_file(&file, false)?;
    println!(
        "OK: {} statements, {} identifiers",
        compilation.program.len(),
        compilation.environment.len()
    );
    Ok(())
}

fn print_tokens(file: PathBuf) -> anyhow::Result<()> {
    let source = fs::read_to_string(&file)?;
    let tokens = Lexer::new(&source).tokenize()?;
    for token in tokens {
        println!("{:>4}:{:<4} {}", token.line, token.column, token.token_type);
    }
    Ok(())
}

fn print_ast(file: PathBuf, json: bool) -> anyhow::Result<()> {
    let source = fs::read_to_string(&file)?;
    let program = micrograph::parse_source(&source)?;
    if json {
        // Serialization recurses once per tree level
        if program.depth() > MAX_JSON_DEPTH {
            anyhow::bail!(
                "{}: expression nests {} levels deep; JSON output is limited to {}",
                file.display(),
                program.depth(),
                MAX_JSON_DEPTH
            );
        }
        println!("{}", serde_json::to_string_pretty(&program)?);
    } else {
        print!("{}", program);
    }
    Ok(())
}

fn run_network(
    n_in: usize,
    layers: Vec<usize>,
    x: Vec<f64>,
    seed: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let mut rng = seeded_rng(seed);
    let net = Network::with_rng(n_in, &layers, &mut rng)?;
    let x = if x.is_empty() { vec![1.0; n_in] } else { x };

    let outputs = net.forward(&input_leaves(&x))?.into_vec();
    let (first, rest) = outputs
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("network produced no outputs"))?;
    let root = rest.iter().fold(first.clone(), |acc, v| acc.add(v));
    root.backward();

    if json {
        println!("{}", GraphData::from_root(&root).to_json()?);
        return Ok(());
    }

    for (i, out) in outputs.iter().enumerate() {
        println!("output[{}] = {:.6}", i, out.data());
    }
    println!("\n{} parameters:", net.parameters().len());
    for p in net.parameters() {
        println!("  {:<12} {:>10.6}  grad {:>10.6}", p.name(), p.data(), p.grad());
    }
    Ok(())
}

fn run_demo(epochs: usize, learning_rate: f64, seed: Option<u64>) -> anyhow::Result<()> {
    println!("Network demo: fit 4 samples with a 3 -> [4, 4, 1] network");
    println!("=========================================================\n");

    let xs = [
        [2.0, 3.0, -1.0],
        [3.0, -1.0, 0.5],
        [0.5, 1.0, 1.0],
        [1.0, 1.0, -1.0],
    ];
    let ys = [1.0, -1.0, -1.0, 1.0];

    let mut rng = seeded_rng(seed);
    let mut net = Network::with_rng(3, &[4, 4, 1], &mut rng)?;

    let mut final_loss = f64::NAN;
    println!("Epoch | loss");
    println!("------|----------");
    for epoch in 0..=epochs {
        let mut preds = Vec::with_capacity(xs.len());
        for x in &xs {
            preds.extend(net.forward_scalars(x)?.into_vec());
        }
        let loss = squared_error(&preds, &ys)?;
        loss.backward();
        final_loss = loss.data();

        if epoch % 10 == 0 || epoch == epochs {
            println!("{:>5} | {:.6}", epoch, loss.data());
        }
        if epoch < epochs {
            net = net.step(learning_rate);
        }
    }

    println!("\nFinal loss: {:.6}", final_loss);
    for (x, y) in xs.iter().zip(&ys) {
        let pred = net.forward_scalars(x)?.into_vec();
        println!("  {:?} -> {:>9.6} (target {})", x, pred[0].data(), y);
    }
    Ok(())
}
