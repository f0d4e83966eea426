use std::path::PathBuf;

use clap::Parser;
use step_osis::{
    domain::{PRE_VERSE, VERSE_TAG},
    pipeline::reposition_file,
};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
pub struct Reposition {
    /// The OSIS file to tidy
    input: PathBuf,

    /// Where to write the result. Defaults to rewriting the input.
    #[arg(long, short, value_name = "FILE")]
    output: Option<PathBuf>,
}

impl Reposition {
    #[instrument(level = "debug")]
    pub fn run(self) -> anyhow::Result<()> {
        let output = self.output.as_ref().unwrap_or(&self.input);
        let report = reposition_file(&self.input, output, PRE_VERSE, VERSE_TAG)?;

        if report.orphaned == 0 {
            println!("Moved {} pre-verse node(s) ✅", report.moved.to_string().success());
        } else {
            println!(
                "Moved {} pre-verse node(s), {} left in place ⚠️",
                report.moved,
                report.orphaned.to_string().warning()
            );
        }
        println!("Wrote {}", output.display());
        Ok(())
    }
}
