// src/main.rs

use dagbatch::{cli, logging, run, RunStatus};

#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(RunStatus::Succeeded) => {}
        Ok(RunStatus::TasksFailed) => std::process::exit(2),
        Err(err) => {
            eprintln!("dagbatch error: {err:?}");
            std::process::exit(1);
        }
    }
}

async fn run_main() -> anyhow::Result<RunStatus> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
