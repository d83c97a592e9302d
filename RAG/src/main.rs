use anyhow::Result;
use clap::Parser;
use pdf_rag::{validate_request, RagConfig, RagError, RagPipeline};
use std::path::PathBuf;
use std::process::ExitCode;

/// Ask a question about one or two PDF documents.
#[derive(Parser, Debug)]
#[command(name = "pdf_rag", version)]
struct Cli {
    /// The question to answer from the documents
    #[arg(short, long)]
    question: String,

    /// PDF files to search (at most two)
    #[arg(value_name = "PDF")]
    pdfs: Vec<PathBuf>,

    /// Number of passages to retrieve
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Print the retrieved passages after the answer
    #[arg(long)]
    show_context: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    if let Err(err) = validate_request(&cli.pdfs, &cli.question) {
        eprintln!("{}", err);
        return ExitCode::from(2);
    }

    match answer(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error processing PDFs: {}", err);
            match err.downcast_ref::<RagError>() {
                Some(RagError::Validation(_)) | Some(RagError::Config(_)) => ExitCode::from(2),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn answer(cli: Cli) -> Result<()> {
    let mut config = RagConfig::from_env()?;
    if let Some(k) = cli.top_k {
        config.top_k = k;
    }

    let pipeline = RagPipeline::new(config)?;
    let answer = pipeline.run(&cli.pdfs, &cli.question).await?;

    println!("{}", answer.text);

    if cli.show_context {
        for (rank, retrieved) in answer.context.iter().enumerate() {
            println!(
                "\n--- [{}] {} p.{} (distance {:.4}) ---\n{}",
                rank + 1,
                retrieved.chunk.source.filename,
                retrieved.chunk.source.page,
                retrieved.distance,
                retrieved.chunk.content
            );
        }
    }

    log::info!("Answered in {} ms", answer.processing_time_ms);
    Ok(())
}
