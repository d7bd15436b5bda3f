use clap::Parser;
use contact_etl::config::toml_config::TomlConfig;
use contact_etl::domain::ports::ConfigProvider;
use contact_etl::utils::{logger, validation::Validate};
use contact_etl::{ContactPipeline, EtlEngine, LocalStorage};

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "Contact lookup driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "contact-etl.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override the number of workers from config
    #[arg(long)]
    workers: Option<usize>,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // 載入 TOML 配置
    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 初始化日誌
    let verbose = args.verbose || config.verbose();
    if args.json_logs {
        logger::init_json_logger(verbose);
    } else {
        logger::init_cli_logger(verbose, config.log_file())?;
    }

    tracing::info!("🚀 Starting TOML-based contact lookup");
    tracing::info!("📁 Loaded configuration from: {}", args.config);

    // 應用命令列覆蓋設定
    if let Some(workers) = args.workers {
        config.extract.workers = Some(workers);
        tracing::info!("🔧 Workers overridden to: {}", workers);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");
    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(".");
    let pipeline = match ContactPipeline::from_config(storage, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            tracing::error!("❌ Failed to set up lookup: {}", e);
            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code().max(1));
        }
    };

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ Contact lookup completed successfully!");
            println!("✅ Contact lookup completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ Contact lookup failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = e.exit_code();
            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!(
        "  Pipeline: {} v{}",
        config.pipeline.name,
        config.pipeline.version.as_deref().unwrap_or("0")
    );
    println!("  Input: {}", config.input_path());
    println!("  Output: {}/{}_*", config.output_path(), config.output_prefix());
    println!("  Workers: {}", config.concurrent_requests());

    if let Some(max_records) = config.max_records() {
        println!("  Max Records: {}", max_records);
    }

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    println!("📚 Reference Lookup:");
    if config.lookup_files().is_empty() {
        println!("  (none)");
    }
    for file in config.lookup_files() {
        println!("  {}", file);
    }

    let options = config.lookup_options();
    println!();
    println!("⚙️ Lookup Steps:");
    println!("  Homepage fetch: {}", options.use_homepage);
    println!("  Homepage discovery: {}", options.discover_homepage);
    println!("  Search fallback: {} ({})", options.use_search, options.search_url);
    println!("  Delay between rows: {}ms", options.delay_ms);
    println!("  Strict fax validation: {}", options.strict);
    println!("  Owner reverse lookup: {}", options.reverse_lookup);

    println!();
    match config.ai_settings() {
        Some(ai) => {
            println!("🤖 AI Oracle: {} (max {} chars)", ai.model, ai.max_chars);
            for name in &ai.api_key_envs {
                let state = if std::env::var(name).is_ok() { "set" } else { "missing" };
                println!("  {}: {}", name, state);
            }
        }
        None => println!("🤖 AI Oracle: disabled"),
    }

    let columns = config.columns();
    println!();
    println!("🔄 Column Mapping:");
    println!("  name <- {}", columns.name.join(" | "));
    println!("  address <- {}", columns.address.join(" | "));
    println!("  phone <- {}", columns.phone.join(" | "));
    println!("  fax <- {}", columns.fax.join(" | "));
    println!("  homepage <- {}", columns.homepage.join(" | "));
    println!("  phone owner <- {}", columns.phone_owner.join(" | "));
    println!("  fax owner <- {}", columns.fax_owner.join(" | "));

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    println!("  Progress files every {} rows", config.batch_size());
    if config.compress_output() {
        println!("  Compression: ZIP with summary.json");
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
