use app_warden::commands::apps::{list_apps, print_env};
use app_warden::commands::run::{run_apps, RunOptions};
use app_warden::commands::{Cli, Commands};
use app_warden::utils::logger::init_logger;
use app_warden::Environment;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // 初始化日志系统
    if let Err(err) = init_logger(cli.log_level.as_deref(), cli.log_file.clone()) {
        eprintln!("Failed to initialize logger: {}", err);
        return ExitCode::from(1);
    }

    match main_impl(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("❌ {:#}", err);
            ExitCode::from(1)
        }
    }
}

async fn main_impl(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command() {
        Commands::List => {
            list_apps(&cli.apps, &mut std::io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Env { name } => {
            let parent_env = Environment::capture();
            print_env(&cli.apps, &name, &parent_env, &mut std::io::stdout().lock())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { names, tail, lines } => {
            run_apps(
                &cli.apps,
                RunOptions {
                    names,
                    tail,
                    max_lines: lines,
                },
            )
            .await
        }
    }
}
