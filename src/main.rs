//! mcpilot - drive an LLM against MCP capability providers.
//!
//! Starts the configured providers, discovers their tools and resources,
//! and runs a chat loop that lets the model call them.

#![allow(clippy::single_match_else)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mcpilot::agent::OperationInvoker;
use mcpilot::mcp::{format_capabilities, format_resources, ProviderSet};
use mcpilot::{Config, ProviderServer};

/// Drive an LLM against MCP capability providers
#[derive(Parser)]
#[command(name = "mcpilot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default lookup
    #[arg(short, long, global = true, env = "MCPILOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the model; without a message, start an interactive session
    #[cfg(feature = "ai")]
    Chat {
        /// Single message to answer
        message: Option<String>,

        /// Only connect this provider
        #[arg(short, long)]
        provider: Option<String>,

        /// Maximum invocation cycles per turn
        #[arg(long)]
        max_cycles: Option<usize>,

        /// Model override
        #[arg(short, long)]
        model: Option<String>,
    },

    /// List tools advertised by the providers
    Tools {
        /// Only connect this provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// List resources advertised by the providers
    Resources {
        /// Only connect this provider
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Print the text of a resource
    Read {
        /// Resource URI
        uri: String,

        /// Provider to read from
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Call a tool directly
    Call {
        /// Tool name
        tool: String,

        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,

        /// Provider to call, bypassing routing
        #[arg(short, long)]
        provider: Option<String>,
    },

    /// Run the bundled resource provider on stdin/stdout
    Serve {
        /// Directory of guideline documents
        #[arg(long)]
        guidelines: Option<PathBuf>,

        /// Directory of PR templates
        #[arg(long)]
        templates: Option<PathBuf>,

        /// Repository to analyse
        #[arg(long)]
        repo: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // .env is optional
    let _ = dotenvy::dotenv();

    // Logs go to stderr; stdout may carry the protocol
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        #[cfg(feature = "ai")]
        Commands::Chat { message, provider, max_cycles, model } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_chat(&config, message, provider.as_deref(), max_cycles, model)?;
        }
        Commands::Tools { provider } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_tools(&config, provider.as_deref())?;
        }
        Commands::Resources { provider } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_resources(&config, provider.as_deref())?;
        }
        Commands::Read { uri, provider } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_read(&config, &uri, provider.as_deref())?;
        }
        Commands::Call { tool, args, provider } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_call(&config, &tool, args.as_deref(), provider.as_deref())?;
        }
        Commands::Serve { guidelines, templates, repo } => {
            let config = load_config(cli.config.as_deref())?;
            cmd_serve(&config, guidelines, templates, repo)?;
        }
        Commands::Config { path } => {
            cmd_config(cli.config.as_deref(), path)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path),
        None => Config::load(),
    }
}

/// Connect the configured providers, or only `only`.
async fn connect(config: &Config, only: Option<&str>) -> Result<ProviderSet> {
    let selected: Vec<_> = match only {
        Some(name) => match config.find_provider(name) {
            Some(provider) => vec![provider.clone()],
            None => anyhow::bail!("Provider '{}' not found in configuration.", name),
        },
        None => config.providers.clone(),
    };

    if selected.is_empty() {
        anyhow::bail!(
            "No providers configured.\n\n  Add one to mcpilot.toml:\n    [[providers]]\n    \
             name = \"resources\"\n    command = \"mcpilot\"\n    args = [\"serve\"]"
        );
    }

    let (providers, failures) = ProviderSet::connect_all(&selected).await;
    for failure in &failures {
        eprintln!("Warning: {}", failure);
    }

    if providers.is_empty() {
        anyhow::bail!("No provider could be started.");
    }

    Ok(providers)
}

/// Chat with the configured model.
#[cfg(feature = "ai")]
fn cmd_chat(
    config: &Config,
    message: Option<String>,
    provider: Option<&str>,
    max_cycles: Option<usize>,
    model: Option<String>,
) -> Result<()> {
    use mcpilot::agent::{default_system_prompt, DispatchLoop, DispatchOptions};
    use mcpilot::llm::engine_from_config;

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let providers = connect(config, provider).await?;

        let mut llm = config.llm.clone();
        if model.is_some() {
            llm.model = model;
        }
        let engine = engine_from_config(&llm)?;
        if !engine.is_available().await {
            eprintln!("Warning: {} does not appear to be reachable", engine.name());
        }

        let functions = providers.function_declarations();
        let mut options = DispatchOptions::from(&config.agent);
        if let Some(max_cycles) = max_cycles {
            options = options.with_max_cycles(max_cycles);
        }
        if options.system_prompt.is_none() {
            let names: Vec<&str> = functions.iter().map(|f| f.name()).collect();
            options = options.with_system_prompt(default_system_prompt(&names));
        }

        let mut dispatch = DispatchLoop::new(engine, providers, functions, options);

        let result = match message {
            Some(message) => match dispatch.run_turn(&message).await {
                Ok(outcome) => {
                    println!("{}", outcome.text);
                    Ok(())
                }
                Err(e) => Err(e.into()),
            },
            None => chat_repl(&mut dispatch).await,
        };

        let (_, providers, _) = dispatch.into_parts();
        providers.close_all().await;
        result
    })
}

#[cfg(feature = "ai")]
async fn chat_repl(
    dispatch: &mut mcpilot::agent::DispatchLoop<Box<dyn mcpilot::agent::ReasoningEngine>, ProviderSet>,
) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    println!("Type a message, or 'exit' to quit.\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        match dispatch.run_turn(line).await {
            Ok(outcome) => {
                println!("\n{}\n", outcome.text);
                tracing::debug!(cycles = outcome.cycles, invocations = outcome.invocations, "Turn done");
            }
            Err(e) => eprintln!("Error: {}\n", e),
        }
    }

    Ok(())
}

/// List tools per provider.
fn cmd_tools(config: &Config, provider: Option<&str>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let providers = connect(config, provider).await?;

        println!("Available tools:\n");
        let mut total = 0;
        for handle in providers.providers() {
            let descriptors = handle.registry().descriptors();
            println!("[{}]", handle.name());
            if descriptors.is_empty() {
                println!("  No tools available.");
            } else {
                print!("{}", format_capabilities(descriptors));
            }
            println!();
            total += descriptors.len();
        }
        println!("Total: {} tool(s)", total);

        providers.close_all().await;
        Ok(())
    })
}

/// List resources per provider.
fn cmd_resources(config: &Config, provider: Option<&str>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let providers = connect(config, provider).await?;

        println!("Available resources:\n");
        for handle in providers.providers() {
            let resources = handle.registry().resources();
            println!("[{}]", handle.name());
            if resources.is_empty() {
                println!("  No resources available.");
            } else {
                print!("{}", format_resources(resources));
            }
            println!();
        }

        providers.close_all().await;
        Ok(())
    })
}

/// Print a resource's text.
fn cmd_read(config: &Config, uri: &str, provider: Option<&str>) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let providers = connect(config, provider).await?;
        let result = providers.read_resource(uri, provider).await;
        providers.close_all().await;

        println!("{}", result?.first_text());
        Ok(())
    })
}

/// Call one tool and print its result.
fn cmd_call(config: &Config, tool: &str, args: Option<&str>, provider: Option<&str>) -> Result<()> {
    let arguments: Map<String, Value> = match args {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--args must be a JSON object: {}", e))?,
        None => Map::new(),
    };

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let mut providers = connect(config, provider).await?;
        let result = match provider {
            Some(name) => providers.invoke_on(name, tool, arguments).await.map_err(anyhow::Error::from),
            None => providers.invoke(tool, arguments).await.map_err(anyhow::Error::from),
        };
        providers.close_all().await;

        let result = result?;
        println!("{}", result.first_text());
        if result.is_error() {
            anyhow::bail!("Tool '{}' reported an error", tool);
        }
        Ok(())
    })
}

/// Run the bundled provider.
fn cmd_serve(
    config: &Config,
    guidelines: Option<PathBuf>,
    templates: Option<PathBuf>,
    repo: Option<PathBuf>,
) -> Result<()> {
    let mut serve = config.serve.clone();
    if let Some(dir) = guidelines {
        serve.guidelines_dir = dir;
    }
    if let Some(dir) = templates {
        serve.templates_dir = dir;
    }
    if let Some(dir) = repo {
        serve.repo_path = dir;
    }

    let server = ProviderServer::from_config(&serve);
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(server.serve_stdio())
}

/// Show configuration.
fn cmd_config(path: Option<&Path>, show_path: bool) -> Result<()> {
    if show_path {
        match path {
            Some(path) => println!("{}", path.display()),
            None => {
                if let Some(path) = Config::global_path() {
                    println!("{}", path.display());
                }
            }
        }
        return Ok(());
    }

    let config = load_config(path)?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "mcpilot", &mut io::stdout());
}
