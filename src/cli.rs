use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::git::LogFilters;

#[derive(Parser)]
#[command(name = "git-who")]
#[command(about = "Tallies code contributions by author")]
#[command(version)]
pub struct Cli {
    #[arg(short = 'v', long = "verbose", global = true, help = "Enable debug logging")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    // Running with no subcommand behaves like "table".
    #[command(flatten)]
    pub table: TableArgs,
}

#[derive(Args, Clone)]
pub struct FilterArgs {
    #[arg(long, help = "Only count commits after the given date")]
    pub since: Option<String>,

    #[arg(long, help = "Only count commits before the given date")]
    pub until: Option<String>,

    #[arg(long = "author", help = "Only count commits by these authors; can be repeated")]
    pub author: Vec<String>,

    #[arg(long = "nauthor", help = "Exclude commits by these authors; can be repeated")]
    pub nauthor: Vec<String>,
}

impl FilterArgs {
    pub fn to_filters(&self) -> LogFilters {
        LogFilters {
            since: self.since.clone().unwrap_or_default(),
            until: self.until.clone().unwrap_or_default(),
            authors: self.author.clone(),
            nauthors: self.nauthor.clone(),
        }
    }
}

#[derive(Args, Clone)]
pub struct RevPathArgs {
    #[arg(value_name = "REVISION", help = "Revisions and/or paths to tally")]
    pub args: Vec<String>,

    #[arg(last = true, value_name = "PATH", help = "Paths, when separated by --")]
    pub paths: Vec<String>,
}

impl RevPathArgs {
    /// Reassembles the argument list, keeping the `--` separator so git
    /// rev-parse can tell revisions from paths.
    pub fn combined(&self) -> Vec<String> {
        let mut all = self.args.clone();
        if !self.paths.is_empty() {
            all.push("--".to_string());
            all.extend(self.paths.iter().cloned());
        }
        all
    }
}

#[derive(Args, Clone)]
pub struct TableArgs {
    #[arg(short = 'e', help = "Show email address of each author")]
    pub email: bool,

    #[arg(long, help = "Output as csv")]
    pub csv: bool,

    #[arg(long, help = "Count merge commits toward commit total")]
    pub merges: bool,

    #[arg(short = 'l', help = "Sort by lines added + removed")]
    pub lines: bool,

    #[arg(short = 'f', help = "Sort by files changed")]
    pub files: bool,

    #[arg(short = 'c', help = "Sort by first modified (created)")]
    pub created: bool,

    #[arg(short = 'm', help = "Sort by last modified")]
    pub modified: bool,

    #[arg(
        short = 'n',
        long = "limit",
        default_value_t = 10,
        allow_negative_numbers = true,
        help = "Limit rows in table (set to 0 for no limit)"
    )]
    pub limit: i64,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub revs: RevPathArgs,
}

#[derive(Args, Clone)]
pub struct TreeArgs {
    #[arg(short = 'e', help = "Show email address of each author")]
    pub email: bool,

    #[arg(short = 'a', help = "Show files not in working tree")]
    pub all: bool,

    #[arg(long, help = "Count merge commits toward commit total")]
    pub merges: bool,

    #[arg(short = 'l', help = "Rank authors by lines added/changed")]
    pub lines: bool,

    #[arg(short = 'f', help = "Rank authors by files touched")]
    pub files: bool,

    #[arg(short = 'c', help = "Rank authors by first commit time (created)")]
    pub created: bool,

    #[arg(short = 'm', help = "Rank authors by last commit time")]
    pub modified: bool,

    #[arg(short = 'd', long = "depth", default_value_t = 0, help = "Limit on tree depth")]
    pub depth: u32,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub revs: RevPathArgs,
}

#[derive(Args, Clone)]
pub struct HistArgs {
    #[arg(short = 'e', help = "Show email address of each author")]
    pub email: bool,

    #[arg(long, help = "Count merge commits toward commit total")]
    pub merges: bool,

    #[arg(short = 'l', help = "Rank authors by lines added/changed")]
    pub lines: bool,

    #[arg(short = 'f', help = "Rank authors by files touched")]
    pub files: bool,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub revs: RevPathArgs,
}

#[derive(Args, Clone)]
pub struct LogDebugArgs {
    #[arg(short = 's', help = "Use short log")]
    pub short: bool,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[command(flatten)]
    pub revs: RevPathArgs,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Print out a table showing total contributions by author")]
    Table(TableArgs),

    #[command(about = "Print out a file tree showing most contributions by path")]
    Tree(TreeArgs),

    #[command(about = "Print out a timeline showing most contributions by date")]
    Hist(HistArgs),

    #[command(about = "Print out the raw git log stream being parsed")]
    Dump(LogDebugArgs),

    #[command(about = "Print out parsed commits for debugging")]
    Parse(LogDebugArgs),
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Some(Commands::Table(args)) => crate::commands::table::exec(args),
            Some(Commands::Tree(args)) => crate::commands::tree::exec(args),
            Some(Commands::Hist(args)) => crate::commands::hist::exec(args),
            Some(Commands::Dump(args)) => crate::commands::dump::exec(args),
            Some(Commands::Parse(args)) => crate::commands::parse::exec(args),
            None => crate::commands::table::exec(self.table),
        }
    }
}
