use anyhow::Result;
use clap::{Parser, Subcommand};
use pathfinder::cache::CitationCountCache;
use pathfinder::query::PaginationMode;
use pathfinder::{Analyzer, Config, PathServer, QueryClient};
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "pathfinder", version)]
#[command(about = "Find citation/authorship paths between academic entities")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve GET /paths?id1=..&id2=.. over HTTP
    Serve,
    /// Find 1- and 2-hop paths between two paper or author ids
    Paths {
        id1: i64,
        id2: i64,
        /// Print the paths as a JSON array
        #[arg(long)]
        json: bool,
    },
    /// Estimate how many entities match an expression
    Count {
        expr: String,
        #[arg(long, default_value = "1000000")]
        upper_bound: u64,
    },
    /// List the entities matching an expression, paging adaptively
    List {
        expr: String,
        #[arg(long, default_value = "100")]
        limit: usize,
    },
    /// Histogram of attribute values over the entities matching an expression
    Histogram {
        expr: String,
        #[arg(short, long, default_value = "AA.AfId")]
        attributes: String,
        #[arg(long, default_value = "10")]
        count: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration (also loads .env)
    let config = Config::load()?;

    // RUST_LOG wins over the configured level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.http_server.log_level.as_str()),
    )
    .init();

    let client = Arc::new(QueryClient::from_config(&config.service)?);

    match args.command {
        Command::Serve => {
            log::info!("Starting Pathfinder HTTP Server v{}", env!("CARGO_PKG_VERSION"));
            let server = PathServer::new(client, config)?;
            server.run().await?;
        }
        Command::Paths { id1, id2, json } => {
            let citation_counts = Arc::new(CitationCountCache::new(
                config.exploration.citation_cache_capacity,
            ));
            let analyzer = Analyzer::from_config(client, citation_counts, &config);

            let start = Instant::now();
            let paths = analyzer.find_paths(id1, id2).await?;
            let elapsed = start.elapsed();

            if json {
                println!("{}", serde_json::to_string(&paths)?);
            } else {
                for path in &paths {
                    let hops: Vec<String> = path
                        .ids()
                        .iter()
                        .map(|id| match analyzer.node(*id) {
                            Some(node) => format!("{} {}", node.kind(), id),
                            None => id.to_string(),
                        })
                        .collect();
                    println!("{}", hops.join(" -> "));
                }
                let stats = analyzer.stats();
                eprintln!(
                    "{} paths in {:?} ({} queries, {} vertices, {} edges)",
                    paths.len(),
                    elapsed,
                    stats.query.query_count,
                    stats.vertex_count,
                    stats.edge_count
                );
            }
        }
        Command::Count { expr, upper_bound } => {
            let estimate = client
                .estimate_count(&expr, upper_bound, config.exploration.estimate_precision)
                .await?;
            println!("{}", estimate);
        }
        Command::List { expr, limit } => {
            client
                .evaluate_all(
                    &expr,
                    limit,
                    PaginationMode::Optimistic,
                    pathfinder::query::types::PAPER_ATTRIBUTES,
                    |page| {
                        for entity in page.entities {
                            println!("{}", serde_json::to_string(&entity).map_err(|e| {
                                pathfinder::PathfinderError::Parse(e.to_string())
                            })?);
                        }
                        Ok(())
                    },
                )
                .await?;
        }
        Command::Histogram {
            expr,
            attributes,
            count,
        } => {
            let result = client.calc_histogram(&expr, &attributes, count, 0).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
