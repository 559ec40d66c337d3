use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use onion_crawler::config::ConfigLoader;
use onion_crawler::crawler::{CrawlSettings, CrawlerEngine, ShutdownSignal, StopReason};
use onion_crawler::fetcher::Fetcher;
use onion_crawler::resources::{ResourceMonitor, SystemProbe};
use onion_crawler::transport::{check_proxy, ReqwestTransport};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(name = "onion-crawler")]
#[command(version = "0.1.0")]
#[command(about = "Breadth-first crawler for .onion hidden services over Tor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl until the time limit, an interrupt, or the frontier runs dry
    Run {
        /// Path to a configuration file (JSON/YAML/TOML); built-in defaults otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Record pages containing this keyword in keyword_matches.txt
        #[arg(short, long)]
        keyword: Option<String>,

        /// Crawl duration in minutes (must fall inside the configured range)
        #[arg(short, long)]
        time: Option<u64>,

        /// Address to try before the configured seeds
        #[arg(long)]
        start_url: Option<String>,

        /// Directory for queue, visited log, matches and raw pages
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Show progress bar (stderr)
        #[arg(short, long, default_value_t = true, action = clap::ArgAction::Set)]
        progress: bool,
    },
    /// Validate a configuration file
    Check {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    let cli = Cli::parse();
    let logger = env_logger::Builder::from_default_env().build();
    let level = logger.filter();
    let multi = Arc::new(indicatif::MultiProgress::new());

    match cli.command {
        Commands::Run { config, keyword, time, start_url, output, progress } => {
            if progress {
                indicatif_log_bridge::LogWrapper::new((*multi).clone(), logger).try_init()?;
            } else {
                log::set_boxed_logger(Box::new(logger))?;
            }
            log::set_max_level(level);

            let mut config_data = ConfigLoader::load_optional(config.as_deref())?;
            if let Some(output) = output {
                config_data.output_root = output.display().to_string();
            }

            let minutes = time.unwrap_or(config_data.default_duration_minutes);
            let duration = config_data.check_duration(minutes).map_err(|e| anyhow!(e))?;
            if minutes != config_data.default_duration_minutes {
                log::info!(
                    "Recommended crawl duration is {} minutes. You set {} minutes.",
                    config_data.default_duration_minutes,
                    minutes
                );
            }

            if let Some(url) = start_url {
                config_data.address_rules().validate(&url)?;
                config_data.seeds.retain(|seed| seed != &url);
                config_data.seeds.insert(0, url);
            }

            check_proxy(&config_data.proxy, Duration::from_secs(config_data.proxy_check_timeout_secs))
                .await
                .with_context(|| format!("Tor is not reachable at {}. Start Tor before crawling.", config_data.proxy))?;

            log::info!(
                "Starting crawler (Time limit: {} minutes, Keyword: {})",
                minutes,
                keyword.as_deref().unwrap_or("None")
            );

            let transport = Arc::new(ReqwestTransport::new(Some(&config_data.proxy), &config_data.headers)?);
            let fetcher = Fetcher::new(
                transport,
                config_data.address_rules(),
                config_data.fetch_timeout(),
                keyword.clone(),
            );
            let monitor = ResourceMonitor::new(
                Box::new(SystemProbe::new(Duration::from_millis(config_data.cpu_sample_ms))),
                config_data.throttle_limits(),
            );
            let store = ConfigLoader::create_store(&config_data, Some(multi.clone())).await;

            let shutdown = ShutdownSignal::new();
            let interrupt = shutdown.clone();
            tokio::spawn(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if interrupt.request() {
                        log::warn!("Second interrupt received. Exiting without saving.");
                        std::process::exit(130);
                    }
                    log::info!("Received shutdown signal. Finishing current batch (Ctrl-C again to force quit)...");
                }
            });

            let mut engine = CrawlerEngine::new(
                CrawlSettings::from_config(&config_data, duration),
                fetcher,
                monitor,
                store,
            )
            .with_shutdown(shutdown);
            engine.restore();

            let mut progress_bar: Option<ProgressBar> = None;
            let mut _progress_task = None;
            if progress {
                let pb = multi.add(ProgressBar::new(0));
                pb.set_style(ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"));

                let mut snapshots = WatchStream::new(engine.watch_metrics());
                let pb_clone = pb.clone();
                progress_bar = Some(pb);
                _progress_task = Some(tokio::spawn(async move {
                    while let Some(snapshot) = snapshots.next().await {
                        pb_clone.set_length(snapshot.pages_attempted + snapshot.frontier_len);
                        pb_clone.set_position(snapshot.pages_attempted);
                        pb_clone.set_message(format!(
                            "Queued: {} | Success: {:.1}% | Concurrency: {} | Matches: {}",
                            snapshot.frontier_len,
                            snapshot.success_rate,
                            snapshot.concurrency,
                            snapshot.keyword_matches
                        ));
                    }
                }));
            }

            let summary = engine.run().await?;

            if let Some(task) = _progress_task {
                task.abort();
            }
            if let Some(pb) = progress_bar {
                pb.set_style(ProgressStyle::default_bar()
                    .template("✅ [{elapsed_precise}] [{bar:40.green/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"));
                pb.finish_with_message(format!(
                    "Success: {:.1}% - Stopped",
                    summary.metrics.success_rate
                ));
            }

            let root = config_data.output_root();
            match summary.reason {
                StopReason::Exhausted => println!("\n✅ Crawling completed. No more URLs to crawl."),
                StopReason::Deadline | StopReason::Interrupted => println!(
                    "\n⏸  Crawling paused. Saved {} URLs to {}.",
                    summary.pending,
                    root.join(onion_crawler::frontier::QUEUE_FILE).display()
                ),
            }
            println!("   Pages Crawled: {}", summary.metrics.pages_attempted);
            println!("   Succeeded: {} | Skipped: {} | Failed: {}",
                summary.metrics.pages_succeeded,
                summary.metrics.pages_skipped,
                summary.metrics.pages_failed
            );
            println!("   Links Enqueued: {}", summary.metrics.links_enqueued);
            println!("   Total Time: {:.1}s", summary.metrics.elapsed_seconds);
            if keyword.is_some() {
                println!(
                    "   Keyword matches ({}) saved to {}",
                    summary.metrics.keyword_matches,
                    root.join(onion_crawler::output::archive::KEYWORD_FILE).display()
                );
            }
        }
        Commands::Check { config } => {
            match ConfigLoader::load(&config) {
                Ok(cfg) => {
                    println!("✅ Config is valid:");
                    println!("   Seeds: {:?}", cfg.seeds);
                    println!("   Proxy: {}", cfg.proxy);
                    println!("   Concurrency: {}..={}", cfg.min_concurrency, cfg.max_concurrency);
                    println!("   Output: {}", cfg.output_root);
                }
                Err(e) => {
                    eprintln!("❌ Config error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
