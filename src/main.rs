use git_who::cli::Cli;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = cli.execute() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}
