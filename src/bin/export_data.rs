use clap::Parser;

use bookkeeping_core::config::AppConfig;
use bookkeeping_core::context::AppContext;
use bookkeeping_core::domains::export::{ArchiveFormat, ExportParams};

/// Export all entries to a CSV inside an archive, optionally with their documents.
#[derive(Debug, Parser)]
#[command(name = "export_data")]
struct Args {
    /// Include the attached documents
    #[arg(long)]
    export_documents: bool,

    /// Convert webp, avif, bmp and svg documents to JPEG
    #[arg(long)]
    convert_to_jpeg: bool,

    /// Print a signed download link instead of the file path
    #[arg(long)]
    return_download_link: bool,

    /// Archive format: zip or tar.gz
    #[arg(long, default_value = "zip")]
    export_format: ArchiveFormat,
}

#[tokio::main]
async fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let args = Args::parse();
    if let Err(e) = run(args).await {
        log::error!("Export failed: {}", e);
        eprintln!("Export failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_env()?;
    let context = AppContext::initialize(config).await?;

    let params = ExportParams {
        include_documents: args.export_documents,
        convert_to_universal_format: args.convert_to_jpeg,
        archive_format: args.export_format,
    };

    if args.return_download_link {
        let link = context.export_service.export_with_link(params).await?;
        println!("{}", link.capability.download_path());
    } else {
        let report = context.export_service.run_export(params).await?;
        println!("{}", report.artifact_path.display());
        for warning in &report.integrity_warnings {
            eprintln!(
                "warning: entry {} document {}: {} ({})",
                warning.entry_id, warning.document_id, warning.reason, warning.path
            );
        }
    }
    Ok(())
}
