use std::path::PathBuf;

use clap::Parser;
use dqql_db::sql_common::values_to_json;
use dqql_db::{
    CompilerConfig, DbSchema, FilterQueryBuilder, TagProjection, Tenant, ValueTable,
};
use tracing_subscriber::EnvFilter;

/// Compile a DQQL filter into the PostgreSQL query selecting the matching entities
#[derive(Debug, Parser)]
#[command(name = "dqql-db", version)]
struct Args {
    /// Compiler config (TOML)
    #[arg(short, long, env = "DQQL_CONFIG")]
    config: Option<PathBuf>,

    /// Schema qualifying every table, overrides the config
    #[arg(long)]
    schema: Option<String>,

    /// Organization of the requesting user
    #[arg(long)]
    org: i64,

    /// Requesting user
    #[arg(long)]
    user: i64,

    /// Return the facts of these tags with every entity, `*` for all of them
    #[arg(long)]
    tags: Option<TagProjection>,

    /// Print the query with values inlined instead of placeholders and a value list
    #[arg(long)]
    inline: bool,

    /// Log more, repeat for even more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    filter: String,
}

fn main() -> miette::Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)?,
        None => {
            let mut config = CompilerConfig::default();
            config.registry.register(args.org, ValueTable::for_org(args.org))?;
            config
        }
    };
    if let Some(schema) = args.schema {
        config.schema = DbSchema::new(schema);
    }

    let query = FilterQueryBuilder::new(&config).compile(
        &args.filter,
        Tenant::new(args.org, args.user),
        &args.tags.unwrap_or_default(),
    )?;

    if args.inline {
        println!("{}", query.to_string_postgres());
    } else {
        let (sql, values) = query.build();
        println!("{sql}");
        println!("{}", values_to_json(&values));
    }
    Ok(())
}
