// ==========================================
// BOQ 导入引擎 - 命令行入口
// ==========================================
// 职责: 读取文件 → 提交后台任务 → 输出进度与结果
// 用法: boq-import <FILE> [--chunk-size N] [--strict] [--rules rules.json] [--sheet NAME] [--json]
// ==========================================

use anyhow::{Context, Result};
use boq_import_engine::config::{ConfigManager, DuplicateHandling, ImportConfig};
use boq_import_engine::domain::{ImportJob, ImportProgress, JobStatus};
use boq_import_engine::engine::JobManager;
use boq_import_engine::importer::BoqImporterImpl;
use boq_import_engine::logging;
use clap::Parser;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

/// 进度通道容量
const PROGRESS_CHANNEL_CAPACITY: usize = 64;

#[derive(Parser, Debug)]
#[command(name = "boq-import")]
#[command(about = "Import a bill of quantities spreadsheet (.csv, .xlsx, .xls)")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// Spreadsheet to import
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Process rows in chunks of this size
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Treat unparsable optional values as errors
    #[arg(long)]
    strict: bool,

    /// JSON file with validation thresholds
    #[arg(long, value_name = "RULES_JSON")]
    rules: Option<PathBuf>,

    /// Worksheet name (Excel only, defaults to the first sheet)
    #[arg(long)]
    sheet: Option<String>,

    /// 1-based header row
    #[arg(long, default_value_t = 1)]
    header_row: usize,

    /// Duplicate handling: skip, update or append
    #[arg(long, default_value = "append")]
    duplicates: DuplicateHandling,

    /// Approve automatically when the import is clean
    #[arg(long)]
    auto_approve: bool,

    /// Print the full job as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let args = Args::parse();

    let rules = match &args.rules {
        Some(path) => ConfigManager::from_json_file(path)
            .with_context(|| format!("failed to load rules from {}", path.display()))?,
        None => ConfigManager::new(),
    };

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let file_name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .context("input path has no file name")?;

    let (tx, rx) = mpsc::channel::<ImportProgress>(PROGRESS_CHANNEL_CAPACITY);
    let config = ImportConfig {
        auto_approve: args.auto_approve,
        strict_validation: args.strict,
        duplicate_handling: args.duplicates,
        chunk_size: args.chunk_size,
        header_row: args.header_row,
        sheet_name: args.sheet.clone(),
        ..ImportConfig::default()
    }
    .with_progress(tx);
    config.validate()?;

    let manager = JobManager::new(BoqImporterImpl::new(rules));
    let handle = manager.start_import(bytes, file_name, config).await;
    let job_id = handle.id().to_string();
    info!(job_id = %job_id, "已提交导入任务");

    let printer = tokio::spawn(print_progress(rx));

    // Ctrl-C 取消任务
    let cancel_manager = manager.clone();
    let cancel_id = job_id.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_manager.cancel_job(&cancel_id).await;
        }
    });

    let job = handle.wait().await;
    ctrl_c.abort();
    printer.await.context("progress printer failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        print_summary(&job);
    }

    if job.status != JobStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<ImportProgress>) {
    while let Some(p) = rx.recv().await {
        eprintln!(
            "[{:>5.1}%] {:<10} {} ({}/{})",
            p.percentage, p.phase, p.message, p.processed_rows, p.total_rows
        );
    }
}

fn print_summary(job: &ImportJob) {
    println!("Job:      {}", job.id);
    println!("File:     {} ({} bytes)", job.file_name, job.file_size);
    println!("Status:   {}", job.status);
    if let Some(ms) = job.duration_ms() {
        println!("Duration: {} ms", ms);
    }
    if let Some(error) = &job.error {
        println!("Error:    {}", error);
    }

    let Some(result) = &job.result else {
        return;
    };
    println!(
        "Rows:     {} read, {} valid, {} with errors, {} with warnings",
        result.stats.total_rows,
        result.stats.valid_rows,
        result.stats.error_rows,
        result.stats.warning_rows
    );
    if result.duplicates_collapsed > 0 {
        println!("Merged:   {} duplicate rows", result.duplicates_collapsed);
    }
    if let Some(mapping) = &result.mapping {
        println!("Mapping:  confidence {:.0}%", mapping.confidence * 100.0);
        for assignment in mapping.assignments.values() {
            println!(
                "          {:<12} <- {} ({:.2})",
                assignment.field.display_name(),
                assignment.header,
                assignment.confidence
            );
        }
    }
    println!("Review:   {:?}", result.review_status);

    for issue in &result.errors {
        println!("  error   {}", issue);
    }
    for issue in &result.warnings {
        println!("  warning {}", issue);
    }
}
