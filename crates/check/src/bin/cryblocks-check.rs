use clap::Parser;
use std::process::ExitCode;

use cryblocks_check::CheckArgs;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let args = CheckArgs::parse();
    match cryblocks_check::run(args).await {
        Ok(result) => {
            print!("{result}");
            if result.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            }
        }
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(2)
        }
    }
}
