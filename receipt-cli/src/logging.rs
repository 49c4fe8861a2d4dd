use tracing_subscriber::EnvFilter;

const CRATES: [&str; 4] = ["receipts", "receipt_core", "receipt_ingest", "receipt_ledger"];

/// Log to stderr. `RUST_LOG` wins; otherwise `info`, or debug for our own
/// crates with `--verbose`.
pub fn init(verbose: bool, json: bool) {
    let default = if verbose {
        let ours: Vec<String> = CRATES.iter().map(|c| format!("{c}=debug")).collect();
        format!("info,{}", ours.join(","))
    } else {
        "info".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
