use clap::{Arg, Command};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use ssr_suspense::{
    RenderConfig, SsrError, create_component, create_resource, render_async, render_streaming,
    render_to_string_with, suspense,
};
use std::io::Write;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Product {
    id: u32,
    name: String,
    price_cents: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let matches = Command::new("ssr-suspense")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render a demo page with out-of-order Suspense boundaries")
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .help("Render mode")
                .value_parser(["async", "sync", "streaming"])
                .default_value("async"),
        )
        .arg(
            Arg::new("items")
                .short('n')
                .long("items")
                .value_name("COUNT")
                .help("Number of suspended product cards")
                .value_parser(clap::value_parser!(u32).range(1..=64))
                .default_value("3"),
        )
        .arg(
            Arg::new("delay-ms")
                .short('d')
                .long("delay-ms")
                .value_name("MS")
                .help("Base latency of each simulated data load")
                .value_parser(clap::value_parser!(u64))
                .default_value("25"),
        )
        .arg(
            Arg::new("timeout-ms")
                .long("timeout-ms")
                .value_name("MS")
                .help("Override the render timeout")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Reduce log output")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    dotenvy::dotenv().ok();
    init_logging(&matches)?;

    let config = load_configuration(&matches)?;
    let items = matches.get_one::<u32>("items").copied().unwrap_or(3);
    let delay_ms = matches.get_one::<u64>("delay-ms").copied().unwrap_or(25);
    let mode = matches.get_one::<String>("mode").map_or("async", String::as_str);

    let page = move || catalog_page(items, delay_ms);
    let mut out = std::io::stdout().lock();

    match mode {
        "sync" => {
            let html = render_to_string_with(page, &config)?;
            writeln!(out, "{html}")?;
        }
        "streaming" => {
            let render = render_streaming(page, &config)?;
            writeln!(out, "{}", render.shell.html)?;
            writeln!(out, "{}", render.shell.hydration_script(config.nonce.as_deref())?)?;

            let mut resources = render.resources;
            while let Some(chunk) = resources.next().await {
                if let Err(e) = &chunk.result {
                    error!(resource = %chunk.id, "Streamed resource failed: {}", e);
                }
                writeln!(out, "{}", chunk.to_script(config.nonce.as_deref())?)?;
                out.flush()?;
            }
        }
        _ => {
            let render = render_async(page, &config).await.map_err(|e| {
                error!(code = e.code(), "Render failed: {}", e);
                e
            })?;
            info!(resources = render.resources.len(), "Page rendered");
            writeln!(out, "{}", render.html)?;
            writeln!(out, "{}", render.hydration_script(config.nonce.as_deref())?)?;
        }
    }

    Ok(())
}

fn catalog_page(items: u32, delay_ms: u64) -> String {
    let header = create_component(|| "<header><h1>Catalog</h1></header>".to_string());

    let cards: String = (0..items)
        .map(|index| {
            create_component(move || {
                suspense(format!("<li class=\"skeleton\">#{index}</li>"), move || {
                    product_card(index, delay_ms)
                })
            })
        })
        .collect();

    format!("<html><body>{header}<ul>{cards}</ul></body></html>")
}

fn product_card(index: u32, delay_ms: u64) -> String {
    let product = create_resource::<Product>(None);

    // Later cards answer first so the boundaries resolve out of order.
    let latency = Duration::from_millis(delay_ms * u64::from(reverse_rank(index)));
    product.load(move || fetch_product(index, latency));

    match product.read() {
        Some(p) => format!(
            "<li data-id=\"{}\">{} <b>${}.{:02}</b></li>",
            p.id,
            p.name,
            p.price_cents / 100,
            p.price_cents % 100
        ),
        None => String::new(),
    }
}

fn reverse_rank(index: u32) -> u32 {
    8_u32.saturating_sub(index % 8)
}

async fn fetch_product(index: u32, latency: Duration) -> Result<Product, SsrError> {
    tokio::time::sleep(latency).await;
    Ok(Product {
        id: index,
        name: format!("Product {index}"),
        price_cents: 999 + u64::from(index) * 250,
    })
}

fn init_logging(matches: &clap::ArgMatches) -> Result<(), SsrError> {
    let verbose = matches.get_flag("verbose");
    let quiet = matches.get_flag("quiet");

    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("ssr_suspense={default_level}")))
        .map_err(|e| SsrError::configuration(format!("Failed to create log filter: {e}")))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(verbose)
                .with_line_number(verbose)
                .compact(),
        )
        .init();

    Ok(())
}

fn load_configuration(matches: &clap::ArgMatches) -> Result<RenderConfig, SsrError> {
    let mut config = match RenderConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid environment config, using defaults: {}", e);
            RenderConfig::default()
        }
    };

    if let Some(&timeout_ms) = matches.get_one::<u64>("timeout-ms") {
        config.timeout_ms = timeout_ms;
    }

    config.validate()?;

    Ok(config)
}
