use anyhow::{Context, Result};
use clap::Parser;
use chatedit::cli::{AppContext, Cli, Commands};
use chatedit::core::{GitRepo, Repository, Session, SessionSettings};
use chatedit::infra::{CommandModel, ConsolePrompter, Interrupt, load_config, logging};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.quiet);

    // Build a context once, pass everywhere
    let ctx = AppContext { quiet: cli.quiet };

    match cli.command {
        Some(Commands::Init(args)) => chatedit::infra::config_init(args, &ctx),
        None => run_chat(cli),
    }
}

fn run_chat(cli: Cli) -> Result<()> {
    let config = load_config()?;
    let pretty = config.pretty && !cli.no_pretty;
    let settings = SessionSettings {
        main_model: cli.model.unwrap_or(config.main_model),
        edit_model: cli.edit_model.unwrap_or(config.edit_model),
        last_edit_path: config.last_edit_path,
        matcher: config.matcher,
    };

    let interrupt = Interrupt::install()?;
    let root = std::env::current_dir().context("Failed to get current directory")?;
    let repo = GitRepo::discover(&root)?.map(|r| Box::new(r) as Box<dyn Repository>);

    let mut session = Session::start(
        &root,
        &cli.files,
        repo,
        Box::new(CommandModel::new(config.model_command, interrupt.clone())),
        Box::new(ConsolePrompter::stdio(pretty, interrupt)),
        settings,
    )?;

    if let Err(e) = session.commit_dirty_on_start(!cli.commit_dirty) {
        tracing::error!("startup commit failed: {e:#}");
    }

    if let Some(path) = cli.apply {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let report = session.apply_text(&content, "");
        tracing::info!(
            directives = report.outcomes.len(),
            edited = report.edited().len(),
            "applied edits from file"
        );
        return Ok(());
    }

    session.run()
}
