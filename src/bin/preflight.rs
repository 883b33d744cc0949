//! Checks that the environment is ready for `api_server`.

use market_platform::infra::config::Config;
use market_platform::DatabaseService;

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- [--apply-schema]\n\
         \n\
         Requires env vars:\n\
           DATABASE_URL, JWT_SECRET, LICENSE_SECRET\n\
         Optional providers:\n\
           STRIPE_SECRET_KEY, STRIPE_WEBHOOK_SECRET, BINANCE_PAY_API_KEY, BINANCE_PAY_SECRET, OPENAI_API_KEY\n"
    );
    std::process::exit(2);
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "enabled"
    } else {
        "disabled"
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let apply_schema = args.iter().any(|a| a == "--apply-schema");

    let config = Config::from_env()?;
    println!("> Preflight:");
    println!("  BIND_ADDR={}", config.bind_addr);
    println!("  PUBLIC_BASE_URL={}", config.public_base_url);
    println!("  STORAGE_DIR={}", config.storage_dir.display());
    println!("  Stripe checkout: {}", on_off(config.stripe.secret_key.is_some()));
    println!("  Stripe webhooks: {}", on_off(config.stripe.webhook_secret.is_some()));
    println!("  Binance Pay: {}", on_off(config.binance.is_some()));
    println!(
        "  Moderation classifier: {}",
        on_off(config.moderation.openai_api_key.is_some())
    );

    let db = DatabaseService::connect_lazy(&config)?;
    db.ping()
        .await
        .map_err(|e| anyhow::anyhow!("database unreachable: {e}"))?;
    println!("  Database reachable.");

    let missing = db.missing_tables().await?;
    if missing.is_empty() {
        println!("  Schema present.");
    } else if apply_schema {
        db.apply_schema().await?;
        println!("  Created missing tables: {}", missing.join(", "));
    } else {
        eprintln!("  Missing tables: {}", missing.join(", "));
        eprintln!("  Re-run with --apply-schema (or start api_server) to create them.");
        std::process::exit(1);
    }

    println!("> Preflight OK");
    Ok(())
}
