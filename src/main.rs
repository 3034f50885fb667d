use std::path::{Path, PathBuf};

use anyhow::anyhow;
use clap::Parser as ClapParser;
use sqlineage::{Analyzer, DependencyGraph};
use std::time::Instant;

#[derive(clap::Parser)]
#[command(name = "sqlineage")]
#[command(about = "Table-level lineage of SQL scripts as a PlantUML diagram", long_about = None)]
struct Cli {
    /// SQL files, or directories whose `.sql` files are read in name order.
    #[arg(value_name = "SQL_[FILE|DIR]", required = true)]
    sql: Vec<PathBuf>,
}

fn sql_files(path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    if !path.is_dir() {
        return Ok(vec![path.to_path_buf()]);
    }
    let mut sql_in_dir: Vec<_> = std::fs::read_dir(path)
        .map_err(|err| anyhow!("Failed to read directory {}: {}", path.display(), err))?
        .filter_map(|res| res.ok())
        .map(|entry| entry.path())
        .filter(|file| file.is_file() && file.extension().is_some_and(|ext| ext == "sql"))
        .collect();
    sql_in_dir.sort();
    Ok(sql_in_dir)
}

fn read_scripts(paths: &[PathBuf]) -> anyhow::Result<Vec<(PathBuf, String)>> {
    let mut scripts = vec![];
    for path in paths {
        for sql_file_path in sql_files(path)? {
            let sql = std::fs::read_to_string(&sql_file_path).map_err(|err| {
                anyhow!(
                    "Failed to read sql file {}: {}",
                    sql_file_path.display(),
                    err
                )
            })?;
            scripts.push((sql_file_path, sql));
        }
    }
    Ok(scripts)
}

fn main() -> anyhow::Result<()> {
    let now = Instant::now();

    env_logger::init();
    let cli = Cli::parse();

    let scripts = read_scripts(&cli.sql)?;

    let analyzer = Analyzer::new();
    let mut graph = DependencyGraph::new();
    for (sql_file_path, sql) in &scripts {
        let n_edges = graph.extend_from_script(&analyzer, sql).map_err(|err| {
            anyhow!(
                "Could not extract lineage from SQL in file {} due to error: {}",
                sql_file_path.display(),
                err
            )
        })?;
        log::info!(
            "{}: {} statements with a destination",
            sql_file_path.display(),
            n_edges
        );
    }

    print!("{}", graph.render());

    let elapsed = now.elapsed();
    log::info!("Elapsed: {:.2?}", elapsed);

    Ok(())
}
