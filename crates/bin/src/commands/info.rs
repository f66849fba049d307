//! Store info command - shows backend and top-level entry count.

use ggconfig::value::Path;
use ggconfig::ConfigStore;

use crate::backend::{backend_label, create_backend};
use crate::cli::InfoArgs;
use crate::output::OutputFormat;

/// Run the info command
pub async fn run(args: &InfoArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let persistence = create_backend(&args.backend_config).await?;
    let store = ConfigStore::open(persistence).await?;

    let root_entries = match store.read(&Path::root()).await {
        Ok(value) => value.as_map().map(|m| m.len()).unwrap_or(0),
        Err(_) => 0,
    };

    let backend_str = backend_label(&args.backend_config);

    match format {
        OutputFormat::Human => {
            println!("Service:      {}", ggconfig::SERVICE_NAME);
            println!("Backend:      {backend_str}");
            println!("Root entries: {root_entries}");
        }
        OutputFormat::Json => {
            let value = serde_json::json!({
                "service": ggconfig::SERVICE_NAME,
                "backend": backend_str,
                "root_entries": root_entries,
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }

    Ok(())
}
