use anyhow::{Context, Result};
use did_btc1::chain::esplora::{EsploraChain, EsploraConfig};
use did_btc1::{CancellationToken, Did, ResolutionOptions};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Resolve a did:btc1 identifier against a public Esplora instance.
///
/// Usage: `read_did <did> [resolution-options.json]`
fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let did: Did = args
        .next()
        .context("missing DID argument")?
        .parse()?;
    let options = match args.next() {
        Some(path) => ResolutionOptions::from_file(&path)
            .with_context(|| format!("reading resolution options from {path}"))?,
        None => ResolutionOptions::default(),
    };

    let config = match std::env::var("ESPLORA_URL") {
        Ok(url) => EsploraConfig::new(url),
        Err(_) => EsploraConfig::for_network(did.components().network()),
    };
    let chain = EsploraChain::new(config);
    let cancel = CancellationToken::with_timeout(Duration::from_secs(600));

    let resolution = did_btc1::resolve(&did, &options, &chain, &cancel)?;
    println!("{}", serde_json::to_string_pretty(&resolution)?);

    Ok(())
}
