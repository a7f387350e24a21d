mod ai;
mod app;
mod chain;
mod cli;
mod config;
mod engine;
mod logging;
mod resolver;
mod shell;
mod storage;
mod worker;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use app::Friday;
use config::FridayConfig;
use engine::classifier::IntentClassifier;
use engine::handlers::SystemLauncher;
use resolver::media::MediaResolver;
use storage::handoff::RequestHandoff;
use storage::DataDir;
use worker::{HandoffWorker, ImageRequestProcessor, WorkerExit};

#[derive(Parser)]
#[command(name = "friday", version, about = "Text assistant that turns utterances into actions")]
struct Args {
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// 1 つの発話を処理して終了する
    Ask {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// 発話の分類結果だけを表示する
    Classify {
        #[arg(required = true)]
        text: Vec<String>,
    },
    /// 画像生成リクエストを 1 件処理するワーカー（内部用）
    #[command(hide = true)]
    ImageWorker,
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env ファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let data = match DataDir::resolve() {
        Ok(data) => data,
        Err(e) => {
            eprintln!("friday: error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let log_prefix = match args.command {
        Some(CliCommand::ImageWorker) => logging::WORKER_LOG_PREFIX,
        _ => logging::REPL_LOG_PREFIX,
    };
    // _guard は main 終了まで保持する
    let _guard = match logging::init_logging(&data.logs_dir(), log_prefix) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("friday: warning: logging disabled: {e:#}");
            None
        }
    };
    info!(data_dir = %data.root().display(), "friday started");

    let config = FridayConfig::load();

    let result = match args.command {
        None => run_repl(&config, &data).await,
        Some(CliCommand::Ask { text }) => run_ask(&config, &data, &text.join(" ")).await,
        Some(CliCommand::Classify { text }) => run_classify(&config, &text.join(" ")).await,
        Some(CliCommand::ImageWorker) => run_image_worker(&config, &data).await,
    };

    match result {
        Ok(code) => {
            info!(code, "friday shutting down");
            ExitCode::from(code)
        }
        Err(e) => {
            error!(error = %format!("{e:#}"), "friday failed");
            eprintln!("friday: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run_repl(config: &FridayConfig, data: &DataDir) -> Result<u8> {
    let friday = Friday::build(config, data)?;
    let mut shell = shell::Shell::new(friday, config.assistant.clone(), data)?;
    Ok(u8::try_from(shell.run().await).unwrap_or(1))
}

async fn run_ask(config: &FridayConfig, data: &DataDir, text: &str) -> Result<u8> {
    let friday = Friday::build(config, data)?;
    let summary = shell::run_turn(&friday, text).await;
    Ok(if summary.failed { 1 } else { 0 })
}

async fn run_classify(config: &FridayConfig, text: &str) -> Result<u8> {
    let classifier = match ai::FridayAI::new(&config.ai) {
        Ok(ai) => IntentClassifier::new(Some(Arc::new(ai)), config.ai.classifier_model.clone()),
        Err(e) => {
            warn!(error = %e, "AI disabled, classifying with keyword rules only");
            eprintln!("friday: warning: AI disabled: {e}");
            IntentClassifier::rules_only()
        }
    };
    for command in classifier.classify(text).await {
        println!("{command}");
    }
    Ok(0)
}

async fn run_image_worker(config: &FridayConfig, data: &DataDir) -> Result<u8> {
    let http = resolver::http_client(Duration::from_secs(config.image.timeout_secs))?;
    let media = MediaResolver::new(
        MediaResolver::standard_chain(&config.image, http),
        data.images_dir(),
    );
    let processor = ImageRequestProcessor::new(media, Arc::new(SystemLauncher::detect()));
    let worker = HandoffWorker::new(
        RequestHandoff::new(data.handoff_file()),
        processor,
        &config.worker,
    );

    match worker.run().await? {
        WorkerExit::Handled(outcome) => {
            info!(outcome = ?outcome, "Image worker finished");
            Ok(0)
        }
        WorkerExit::IdleTimeout => Ok(0),
    }
}
