use newsbrief::app::{print_cards, Pipeline};
use newsbrief::config::Config;
use newsbrief::error::Result;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Load configuration
    let mut config = Config::load()?;

    // Check for --limit N override
    if let Some(pos) = args.iter().position(|a| a == "--limit") {
        if let Some(n) = args.get(pos + 1).and_then(|v| v.parse().ok()) {
            config.story_limit = n;
        }
    }

    let pipeline = Pipeline::new(&config).await?;

    if args.iter().any(|a| a == "--stats") {
        pipeline.print_stats().await?;
        return Ok(());
    }

    if args.iter().any(|a| a == "--retry-failed") {
        let completed = pipeline.retry_failed().await?;
        println!("Retried failed jobs; {} now completed", completed);
        return Ok(());
    }

    let cards = pipeline.run().await?;
    print_cards(&cards);

    let progress = pipeline.queue().progress().await;
    eprintln!(
        "Done: {} summarized, {} failed, {} skipped",
        progress.completed,
        progress.failed,
        cards.len().saturating_sub(progress.completed + progress.failed)
    );

    Ok(())
}
