//! Test share-links and merge the live ones into a sing-box template.
//!
//! Usage: `cargo run --example simple -- <links file or url> <template.json> [ipinfo|ip-api|whois]`

use anyhow::{bail, Context};
use linkprobe::{fetch_links_from_source, ConfigTemplate, LinkTester, TesterConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("usage: simple <links file or url> <template.json> [geoip mode]");
    }

    let links = fetch_links_from_source(&args[0])
        .await
        .with_context(|| format!("failed to read links from {}", args[0]))?;
    let template_text = std::fs::read_to_string(&args[1])
        .with_context(|| format!("failed to read template {}", args[1]))?;
    let template: ConfigTemplate = template_text.parse().context("invalid template")?;

    let config = TesterConfig::builder()
        .connect_timeout(Duration::from_secs(5))
        .concurrency(32)
        .geoip_mode(args.get(2).map(String::as_str).unwrap_or("ipinfo"))
        .lookup_requests_per_second(1.0)
        .build();

    let tester = LinkTester::new(config)?;

    println!("Testing {} links...", links.len());
    let run = tester.run(template, &links).await?;

    for row in &run.rows {
        println!(
            "{:>3}  {:<6} {:<28} {:<16} {:<24} {}",
            row.no,
            format!("{:?}", row.status),
            row.tag,
            row.ip,
            row.provider,
            row.country
        );
    }

    println!("{}", run.config.to_string_pretty()?);

    Ok(())
}
