use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use step_osis::{
    Assembler, Config, ConfigurationError, ConversionReport, ConversionRequest, ModuleSettings,
    StylesheetSource,
};
use tracing::instrument;

use super::{
    terminal::{is_narrow, Colorize},
    Sources,
};

#[derive(Debug, Parser)]
pub struct Convert {
    #[command(flatten)]
    sources: Sources,

    /// The OSIS file to write
    #[arg(long, short, value_name = "FILE")]
    output: PathBuf,

    /// Directory of stylesheets overriding the bundled ones
    #[arg(long, value_name = "DIR")]
    stylesheets: Option<PathBuf>,

    /// Compile the result into an encrypted module with osis2mod
    #[arg(long)]
    compile: bool,

    /// The osis2mod executable
    #[arg(long, value_name = "EXE")]
    compiler: Option<PathBuf>,

    /// Directory the compiled module is written to
    #[arg(long, value_name = "DIR")]
    module_dir: Option<PathBuf>,

    /// Key the module text is encrypted with
    #[arg(long, env = "STEP_CIPHER_KEY", hide_env_values = true)]
    cipher_key: Option<String>,

    /// Password the cipher key is masked with in the module configuration
    #[arg(long, env = "STEP_OBFUSCATION_KEY", hide_env_values = true)]
    obfuscation_key: Option<String>,

    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Convert {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, config: &Config) -> anyhow::Result<()> {
        let request = self.request(config)?;
        let stylesheets = StylesheetSource::from_dir(
            self.stylesheets
                .clone()
                .or_else(|| config.stylesheet_dir().map(Path::to_path_buf)),
        );

        // Compiler chatter goes to stderr when stdout carries JSON.
        let json = self.format == OutputFormat::Json;
        let mut relay = |line: &str| {
            if json {
                eprintln!("{line}");
            } else {
                println!("{line}");
            }
        };

        let report = Assembler::new(stylesheets)
            .convert(&request, &mut relay)
            .with_context(|| format!("failed to convert {} sources", request.dialect()))?;

        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
            OutputFormat::Table => output_table(&report),
        }
        Ok(())
    }

    fn request(&self, config: &Config) -> Result<ConversionRequest, ConfigurationError> {
        let dialect = self.sources.dialect(config)?;
        let request = ConversionRequest::new(
            self.sources.old_testament.clone(),
            self.output.clone(),
            dialect,
        )?
        .with_new_testament(self.sources.new_testament.clone());

        match self.module(config)? {
            Some(module) => Ok(request.with_module(module)),
            None => Ok(request),
        }
    }

    fn module(&self, config: &Config) -> Result<Option<ModuleSettings>, ConfigurationError> {
        if !(self.compile || config.compile_module) {
            return Ok(None);
        }

        let compiler = self
            .compiler
            .clone()
            .or_else(|| config.compiler().map(Path::to_path_buf))
            .ok_or(ConfigurationError::IncompleteModule("a compiler (--compiler)"))?;
        let module_dir = self
            .module_dir
            .clone()
            .or_else(|| config.module_dir().map(Path::to_path_buf))
            .ok_or(ConfigurationError::IncompleteModule(
                "a module directory (--module-dir)",
            ))?;
        let cipher_key = self
            .cipher_key
            .clone()
            .ok_or(ConfigurationError::IncompleteModule(
                "a cipher key (--cipher-key or STEP_CIPHER_KEY)",
            ))?;
        let obfuscation_key = self.obfuscation_key.clone().ok_or(
            ConfigurationError::IncompleteModule(
                "an obfuscation key (--obfuscation-key or STEP_OBFUSCATION_KEY)",
            ),
        )?;

        ModuleSettings::new(compiler, module_dir, cipher_key, obfuscation_key).map(Some)
    }
}

fn output_table(report: &ConversionReport) {
    println!(
        "Converted {} {} file(s)",
        report.files.len(),
        report.dialect.to_string().info()
    );
    println!("{}", "────────────────────".dim());
    for file in &report.files {
        let name = file
            .file_name()
            .map_or_else(|| file.display().to_string(), |n| n.to_string_lossy().into_owned());
        println!("  {name}");
    }
    println!();

    if report.repositioned.orphaned == 0 {
        println!(
            "Pre-verse nodes moved: {} ✅",
            report.repositioned.moved.to_string().success()
        );
    } else {
        println!(
            "Pre-verse nodes moved: {}, left in place: {} ⚠️",
            report.repositioned.moved,
            report.repositioned.orphaned.to_string().warning()
        );
        println!("{}", "Run with -v to see which nodes had no following verse.".dim());
    }

    if is_narrow() {
        for timing in &report.stages {
            println!("{}: {} ms", timing.stage, timing.elapsed_ms);
        }
    } else {
        let stages: Vec<String> = report
            .stages
            .iter()
            .map(|timing| format!("{} {} ms", timing.stage, timing.elapsed_ms))
            .collect();
        println!("{}", stages.join(" · ").dim());
    }
    println!();

    println!("Wrote {}", report.output.display().to_string().success());
    if let Some(key) = &report.cipher_key {
        println!("CipherKey={key}");
    }
}
