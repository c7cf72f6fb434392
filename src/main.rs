use clap::Parser;
use colony_counter::cli::{Cli, Commands, ExportFormat, HistoryAction};
use colony_counter::config::Config;
use colony_counter::controller::{AnalysisReport, ControllerEvent, UploadController};
use colony_counter::error::{CounterError, Result};
use colony_counter::session::SessionOptions;
use colony_counter::transport::HttpTransport;
use colony_counter::logging;
use colony_counter_common::types::{FEEDBACK_DENSITY_KEY, FEEDBACK_ESTIMATE_KEY, SUMMARY_TOTAL_KEY};
use colony_counter_common::{AnalysisLedger, FileStore, LoadStatus, Phase, PlateHint, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    if let Err(e) = logging::init(&config.log_level, cli.verbose) {
        eprintln!("{}", e);
    }

    match cli.command {
        Commands::Analyze { file, sample, plate_x, plate_y, plate_r, output } => {
            println!("🧫 colony-counter - コロニー計数\n");
            let plate = PlateHint { x: plate_x, y: plate_y, r: plate_r };
            analyze(&config, &file, sample.as_deref(), plate, output).await?;
        }

        Commands::History { action } => {
            run_history(&config, action)?;
        }

        Commands::Config { set_url, set_timeout, show } => {
            let mut config = config;

            if let Some(url) = set_url {
                config.set_base_url(url)?;
                println!("✔ サーバーURLを設定しました");
            }

            if let Some(seconds) = set_timeout {
                config.set_timeout_seconds(seconds)?;
                println!("✔ タイムアウトを設定しました");
            }

            if show {
                println!("設定:");
                println!("  送信先: {}", config.endpoint_url());
                println!("  タイムアウト: {}秒", config.timeout().as_secs());
                println!("  接続タイムアウト: {}秒", config.connect_timeout_seconds);
                match config.data_dir() {
                    Ok(dir) => println!("  履歴の保存先: {}", dir.display()),
                    Err(e) => println!("  履歴の保存先: {}", e),
                }
                println!("  ログレベル: {}", config.log_level);
            }
        }
    }

    Ok(())
}

fn open_ledger(config: &Config) -> Result<AnalysisLedger<FileStore>> {
    let store = FileStore::new(config.data_dir()?);
    let (ledger, status) = AnalysisLedger::load_with_status(store);
    match status {
        LoadStatus::Fresh => debug!("no ledger found, starting empty"),
        LoadStatus::Restored(count) => debug!(count, "ledger restored"),
        LoadStatus::Corrupt(reason) => {
            warn!("解析履歴を読み込めなかったため空で開始します: {}", reason);
        }
    }
    Ok(ledger)
}

async fn analyze(
    config: &Config,
    file: &Path,
    sample: Option<&str>,
    plate: PlateHint,
    output: Option<PathBuf>,
) -> Result<()> {
    if !file.is_file() {
        return Err(CounterError::FileNotFound(file.display().to_string()));
    }
    let file_bytes = std::fs::read(file)?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let transport = HttpTransport::from_config(config)?;
    let ledger = open_ledger(config)?;
    let options = SessionOptions { timeout: config.timeout() };
    let mut controller = UploadController::new(transport, ledger, options);

    let handle = controller.submit_with_plate(file_bytes, &file_name, sample, plate)?;
    println!("[1/2] 送信中: {} (検体: {})", handle.file_name, handle.sample_name);

    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.green/white} {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    let report = loop {
        tokio::select! {
            event = controller.next_event() => match event {
                Some(ControllerEvent::Progress { event, .. }) => render_progress(&bar, &event),
                Some(ControllerEvent::Finished(report)) => break Some(report),
                None => break None,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                controller.cancel();
            }
        }
    };
    bar.finish_and_clear();

    let Some(report) = report else {
        println!("⚠ 結果を受信できませんでした");
        return Ok(());
    };

    if let Some(message) = report.user_message() {
        println!("❌ エラー: {}", message);
        return Ok(());
    }

    println!("[2/2] 計数完了\n");
    print_report(&report);

    if let Some(image) = &report.image {
        let path = output.unwrap_or_else(|| PathBuf::from(image.download_name()));
        image.save_to(&path)?;
        println!("\n✔ 結果画像を保存: {}", path.display());
    }

    if let Some(e) = &report.persistence_error {
        println!("⚠ 解析履歴の保存に失敗しました: {}", e);
    } else if let Some(index) = report.ledger_index {
        println!("✔ 解析履歴に追加: #{}", index + 1);
    }

    Ok(())
}

fn render_progress(bar: &ProgressBar, event: &ProgressEvent) {
    bar.set_position(u64::from(event.percent));
    match event.phase {
        Phase::Uploading => bar.set_message("送信中..."),
        Phase::AwaitingServer => bar.set_message("Enviado! サーバーで計数中..."),
    }
}

fn print_report(report: &AnalysisReport) {
    let metric = |value: Option<&String>| value.map(String::as_str).unwrap_or("0").to_string();

    println!("🧪 コロニー集計 ({})", report.sample_name);
    println!("  TOTAL: {}", metric(report.summary.get(SUMMARY_TOTAL_KEY)));
    println!("  密度 (UFC/cm2): {}", metric(report.feedback.get(FEEDBACK_DENSITY_KEY)));
    println!("  推定総数 (プレート57.5cm2): {}", metric(report.feedback.get(FEEDBACK_ESTIMATE_KEY)));

    let colors: Vec<_> = report
        .summary
        .iter()
        .filter(|(key, _)| key.as_str() != SUMMARY_TOTAL_KEY)
        .collect();
    if !colors.is_empty() {
        println!("\n  色分類:");
        for (key, value) in colors {
            println!("    {}: {}", key, value);
        }
    }

    let details: Vec<_> = report
        .feedback
        .iter()
        .filter(|(key, _)| ![FEEDBACK_DENSITY_KEY, FEEDBACK_ESTIMATE_KEY].contains(&key.as_str()))
        .collect();
    if !details.is_empty() {
        println!("\n⚙ 詳細:");
        for (key, value) in details {
            println!("  {}: {}", key, value);
        }
    }
}

fn run_history(config: &Config, action: HistoryAction) -> Result<()> {
    let mut ledger = open_ledger(config)?;

    match action {
        HistoryAction::List => {
            if ledger.is_empty() {
                println!("解析履歴はありません");
                return Ok(());
            }
            println!("📋 解析履歴 ({}件)", ledger.len());
            println!("{:>4}  {:<10}  {:<8}  {:<24}  {:>6}  {:>10}  {:>10}", "No", "日付", "時刻", "検体", "TOTAL", "密度", "推定");
            for (i, entry) in ledger.entries().iter().enumerate() {
                println!(
                    "{:>4}  {:<10}  {:<8}  {:<24}  {:>6}  {:>10}  {:>10}",
                    i + 1,
                    entry.date_iso,
                    entry.time_iso,
                    entry.sample_name,
                    entry.total().unwrap_or("-"),
                    entry.density().unwrap_or("-"),
                    entry.estimated_total().unwrap_or("-"),
                );
            }
        }

        HistoryAction::Export { output, select, all, format } => {
            if all {
                ledger.select_all(true);
            } else {
                let indices: BTreeSet<usize> = select.into_iter().collect();
                for number in indices {
                    let index = number
                        .checked_sub(1)
                        .ok_or_else(|| CounterError::Validation("番号は1以上を指定してください".into()))?;
                    ledger.toggle_select(index)?;
                }
            }

            let exported = match format {
                ExportFormat::Csv => ledger.export_selected(),
                ExportFormat::Excel => ledger.export_selected_excel(),
            };
            let bytes = match exported {
                Ok(bytes) => bytes,
                Err(e @ colony_counter_common::Error::EmptySelection) => {
                    println!("⚠ {}", e);
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            std::fs::write(&output, bytes)?;
            println!(
                "✔ {}件を出力 ({}): {}",
                ledger.selected_indices().len(),
                format,
                output.display()
            );
        }

        HistoryAction::Remove { index } => {
            let position = index
                .checked_sub(1)
                .ok_or_else(|| CounterError::Validation("番号は1以上を指定してください".into()))?;
            let removed = ledger.remove(position)?;
            println!("✔ 削除しました: #{} {}", index, removed.sample_name);
        }

        HistoryAction::Clear { yes } => {
            if ledger.is_empty() {
                println!("解析履歴はありません");
                return Ok(());
            }
            let confirmed = yes
                || dialoguer::Confirm::new()
                    .with_prompt(format!("解析履歴{}件をすべて削除しますか？", ledger.len()))
                    .default(false)
                    .interact()
                    .map_err(|e| CounterError::Prompt(e.to_string()))?;
            if confirmed {
                ledger.clear()?;
                println!("✔ 解析履歴を削除しました");
            }
        }
    }

    Ok(())
}
