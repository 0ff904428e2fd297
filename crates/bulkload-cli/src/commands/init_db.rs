use bulkload_import::DatabaseStore;
use clap::Args;
use colored::Colorize;
use tracing::{debug, info};

#[derive(Args)]
pub struct InitDbCommand {
    /// Database connection URL
    #[arg(long, env = "BULKLOAD_DATABASE_URL")]
    pub database_url: String,
}

impl InitDbCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        info!("Creating import tables");

        debug!("Initializing database connection...");
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let store = DatabaseStore::connect(&self.database_url).await?;
            store.ensure_schema().await
        })?;

        println!("{}", "Import tables are ready".bright_green());
        Ok(())
    }
}
