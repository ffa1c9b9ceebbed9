use financial_education_assistant::{agent::Assistant, config::AssistantConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SAMPLE_QUERY: &str = "What is compound interest and how does it help my savings grow?";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let query = if args.is_empty() {
        SAMPLE_QUERY.to_string()
    } else {
        args.join(" ")
    };

    let config = AssistantConfig::from_env()?;
    let assistant = Assistant::from_config(&config).await?;

    info!(query = %query, "Asking assistant");

    let outcome = assistant.handle(&query).await;
    // flush pending quality checks before reporting
    assistant.shutdown().await?;
    let response = outcome?;

    println!("\n=== ANSWER ({}, {:?}) ===", response.domain, response.source);
    println!("{}", response.answer);
    println!("\nLatency: {} ms", response.latency_ms);
    println!("Context chunks: {}", response.context_chunks);
    if response.retried {
        println!("Retried after gate flags: {:?}", response.gate.map(|g| g.flags).unwrap_or_default());
    }

    let stats = assistant.cache_stats().await;
    println!(
        "Cache: L1 {}/{} hits, L2 {}/{} hits",
        stats.rag.hits, stats.rag.total_queries, stats.response.hits, stats.response.total_queries
    );

    if let Some(perf) = assistant.tracker().snapshot(response.domain.as_str()).await {
        println!(
            "Agent '{}': success {:.2}, quality {:.2}, latency {:.3}s over {} samples",
            response.domain, perf.success_rate_ema, perf.avg_quality_ema, perf.avg_latency_ema, perf.sample_count
        );
    }

    Ok(())
}
