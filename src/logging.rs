use anyhow::Result;
use tracing_subscriber::fmt;

/// Installs the fmt subscriber; logging stays silent unless `verbose` is set.
pub fn init(verbose: bool) -> Result<()> {
    if !verbose {
        return Ok(());
    }
    let _ = fmt()
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
    Ok(())
}
