use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rbs_chunk_pool::{FilePool, PoolMeta, PoolOptions};
use rbs_config::ConfigManager;
use rbs_fs::PosixFs;

/// RBS chunk file pool maintenance tool
#[derive(Parser, Debug)]
#[command(name = "rbs-pool-tool", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pre-format a pool directory up to its configured size
    Format {
        /// Path to a TOML file holding the pool options
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Write the persisted pool meta record
    Meta {
        /// Where to write the record
        #[arg(long)]
        path: PathBuf,
        /// Bytes in each chunk's data region
        #[arg(long)]
        chunk_size: u32,
        /// Bytes in the header page of each chunk file
        #[arg(long, default_value_t = 4096)]
        meta_page_size: u32,
        /// Device block alignment
        #[arg(long)]
        block_size: Option<u32>,
        /// Directory holding the reserve files
        #[arg(long)]
        pool_dir: String,
    },
    /// Scan an existing pool and print its state
    Stat {
        /// Path to a TOML file holding the pool options
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let args = Args::parse();
    let fs = Arc::new(PosixFs::new());

    match args.command {
        Command::Format { config } => {
            let options = load_options(&config)?;
            let pool = FilePool::new(fs, options);
            pool.initialize()?;
            if !pool.wait_format_done() {
                bail!("pool formatting failed, see the log for the first error");
            }
            let state = pool.state();
            tracing::info!(
                clean = state.clean_left,
                dirty = state.dirty_left,
                chunk_num = state.chunk_num,
                "pool format complete"
            );
        }
        Command::Meta {
            path,
            chunk_size,
            meta_page_size,
            block_size,
            pool_dir,
        } => {
            let meta = PoolMeta {
                chunk_size,
                meta_page_size,
                block_size,
                pool_dir,
            };
            meta.encode(fs.as_ref(), &path)
                .with_context(|| format!("write pool meta to {}", path.display()))?;
            tracing::info!(path = %path.display(), crc32 = meta.crc32(), "pool meta written");
        }
        Command::Stat { config } => {
            let mut options = load_options(&config)?;
            // Observe only: no formatting, no cleaning.
            options.file_pool_size = 0;
            options.allocated_by_percent = false;
            options.need_clean = false;

            let pool = FilePool::new(fs, options);
            pool.initialize()?;
            pool.wait_format_done();

            let state = pool.state();
            println!("chunk_size:         {}", state.chunk_size);
            println!("meta_page_size:     {}", state.meta_page_size);
            println!("block_size:         {}", state.block_size);
            println!("clean_left:         {}", state.clean_left);
            println!("dirty_left:         {}", state.dirty_left);
            println!("preallocated_left:  {}", state.preallocated_left);
            println!("chunk_num:          {}", state.chunk_num);
        }
    }
    Ok(())
}

fn load_options(path: &PathBuf) -> anyhow::Result<PoolOptions> {
    let manager = ConfigManager::<PoolOptions>::load(path)
        .with_context(|| format!("load pool options from {}", path.display()))?;
    Ok(manager.snapshot())
}
