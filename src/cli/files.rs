use clap::Parser;
use step_osis::{
    pipeline::{discover, sources},
    Config,
};
use tracing::instrument;

use super::{terminal::Colorize, Sources};

#[derive(Debug, Parser)]
pub struct Files {
    #[command(flatten)]
    sources: Sources,

    /// Print bare paths, one per line
    #[arg(long)]
    quiet: bool,
}

impl Files {
    #[instrument(level = "debug", skip(config))]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let dialect = self.sources.dialect(config)?;
        let dirs = std::iter::once(self.sources.old_testament.as_path())
            .chain(self.sources.new_testament.as_deref());
        let files = sources(discover(dirs, dialect)?)?;

        if self.quiet {
            for file in &files {
                println!("{}", file.display());
            }
            return Ok(());
        }

        println!("Merge order ({dialect})");
        println!("{}", "────────────────────".dim());
        for (index, file) in files.iter().enumerate() {
            println!("{:>4}  {}", (index + 1).to_string().dim(), file.display());
        }
        Ok(())
    }
}
