//! The conversion pipeline.
//!
//! A run discovers the source files, merges them under the dialect's anchor,
//! transforms the merged document into OSIS, moves pre-verse material in
//! front of its verse, writes the result and, when requested, compiles it
//! into a module. Every stage fails fast; nothing is written unless merging,
//! transforming and repositioning all succeed.

use std::{
    fmt, io,
    path::{Path, PathBuf},
    time::Instant,
};

use nonempty::NonEmpty;
use serde::Serialize;

use crate::{
    domain::{ConfigurationError, ConversionRequest, Dialect, Marker},
    module::{obfuscate_key, CompileJob, KeyError, ModuleCompiler, Osis2Mod, SubprocessError},
    xml::{AnchorPath, Document, HierarchyError, ParseError},
    xslt::TransformError,
};

mod discover;
pub use discover::discover;

mod merge;
pub use merge::{merge, sources, MergeError};

mod reposition;
pub use reposition::{reposition, RepositionReport};

mod transform;
pub use transform::StylesheetSource;

/// Errors raised by a conversion run.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// The request is invalid.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The source files could not be merged.
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// The stylesheet could not be loaded or applied.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// A file or directory could not be read or written.
    #[error("failed to access {}", path.display())]
    Io {
        /// The file or directory.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// The module compiler failed.
    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    /// The cipher key could not be masked.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A node could not be moved within the document.
    #[error("failed to rearrange the document")]
    Hierarchy(#[from] HierarchyError),
}

/// A step of a conversion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Listing the source files.
    Discover,
    /// Combining the source files.
    Merge,
    /// Applying the stylesheet.
    Transform,
    /// Moving pre-verse material.
    Reposition,
    /// Writing the output file.
    Write,
    /// Running the module compiler.
    Compile,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discover => "discover",
            Self::Merge => "merge",
            Self::Transform => "transform",
            Self::Reposition => "reposition",
            Self::Write => "write",
            Self::Compile => "compile",
        })
    }
}

/// How long a stage took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    /// The stage.
    pub stage: Stage,
    /// Wall-clock time spent, in milliseconds.
    pub elapsed_ms: u128,
}

/// The outcome of a successful conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    /// The dialect that was converted.
    pub dialect: Dialect,
    /// The merged files, in merge order.
    pub files: Vec<PathBuf>,
    /// The OSIS file written.
    pub output: PathBuf,
    /// What the repositioning pass did.
    pub repositioned: RepositionReport,
    /// Per-stage timings, in run order.
    pub stages: Vec<StageTiming>,
    /// The masked cipher key for the module configuration, when a module was
    /// compiled.
    pub cipher_key: Option<String>,
}

/// Runs conversions with a fixed stylesheet source.
#[derive(Debug, Clone, Default)]
pub struct Assembler {
    stylesheets: StylesheetSource,
}

impl Assembler {
    /// Creates an assembler that loads stylesheets from `stylesheets`.
    #[must_use]
    pub const fn new(stylesheets: StylesheetSource) -> Self {
        Self { stylesheets }
    }

    /// Lists the files a request would merge, in merge order.
    ///
    /// # Errors
    ///
    /// Fails if a source directory cannot be read or holds no matching files.
    pub fn files(&self, request: &ConversionRequest) -> Result<NonEmpty<PathBuf>, ConversionError> {
        let files = discover(request.source_dirs(), request.dialect())?;
        Ok(sources(files)?)
    }

    /// Converts the request, compiling a module with `osis2mod` when the
    /// request carries module settings.
    ///
    /// Lines printed by the compiler are passed to `on_line`.
    ///
    /// # Errors
    ///
    /// Fails on the first stage that fails. The output file is only written
    /// once the document is complete; a compiler failure is reported after
    /// the output has been written.
    pub fn convert(
        &self,
        request: &ConversionRequest,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ConversionReport, ConversionError> {
        let compiler = request
            .module()
            .map(|module| Osis2Mod::new(module.compiler.clone()));
        self.run(
            request,
            compiler.as_ref().map(|c| c as &dyn ModuleCompiler),
            on_line,
        )
    }

    /// Converts the request using `compiler` for the module stage.
    ///
    /// The compiler is only used when the request carries module settings.
    ///
    /// # Errors
    ///
    /// As for [`Assembler::convert`].
    pub fn convert_with(
        &self,
        request: &ConversionRequest,
        compiler: &dyn ModuleCompiler,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ConversionReport, ConversionError> {
        self.run(request, Some(compiler), on_line)
    }

    fn run(
        &self,
        request: &ConversionRequest,
        compiler: Option<&dyn ModuleCompiler>,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<ConversionReport, ConversionError> {
        let dialect = request.dialect();
        let mut stages = Vec::new();
        tracing::info!("Converting {dialect} sources to {}", request.output().display());

        let files = timed(&mut stages, Stage::Discover, || self.files(request))?;
        tracing::info!("Found {} source file(s)", files.len());

        let anchor: AnchorPath = dialect.anchor_path().parse().map_err(MergeError::from)?;
        let merged = timed(&mut stages, Stage::Merge, || merge(&files, &anchor))?;

        let mut document = timed(&mut stages, Stage::Transform, || {
            let stylesheet = self.stylesheets.load(dialect)?;
            Ok(stylesheet.transform(&merged)?)
        })?;
        drop(merged);

        let repositioned = timed(&mut stages, Stage::Reposition, || {
            Ok(reposition(
                &mut document,
                dialect.pre_verse_marker(),
                dialect.verse_tag(),
            )?)
        })?;
        tracing::info!(
            "Moved {} pre-verse node(s), {} left in place",
            repositioned.moved,
            repositioned.orphaned
        );

        timed(&mut stages, Stage::Write, || save(&document, request.output()))?;

        let mut cipher_key = None;
        if let (Some(module), Some(compiler)) = (request.module(), compiler) {
            let masked = obfuscate_key(&module.cipher_key, &module.obfuscation_key)?;
            tracing::info!("Module configuration key: CipherKey={masked}");
            cipher_key = Some(masked);

            let job = CompileJob {
                input: request.output(),
                module_dir: &module.module_dir,
                cipher_key: &module.cipher_key,
            };
            timed(&mut stages, Stage::Compile, || Ok(compiler.compile(&job, on_line)?))?;
        }

        Ok(ConversionReport {
            dialect,
            files: files.into(),
            output: request.output().to_path_buf(),
            repositioned,
            stages,
            cipher_key,
        })
    }
}

/// Runs only the repositioning pass over an existing file.
///
/// The result is written to `output`, which may be the input itself.
///
/// # Errors
///
/// Fails if the input cannot be read or parsed, or the output cannot be
/// written.
pub fn reposition_file(
    input: &Path,
    output: &Path,
    marker: Marker,
    verse_tag: &str,
) -> Result<RepositionReport, ConversionError> {
    let mut document = load(input)?;
    let report = reposition(&mut document, marker, verse_tag)?;
    save(&document, output)?;
    Ok(report)
}

fn timed<T>(
    stages: &mut Vec<StageTiming>,
    stage: Stage,
    f: impl FnOnce() -> Result<T, ConversionError>,
) -> Result<T, ConversionError> {
    let start = Instant::now();
    let value = f()?;
    let elapsed_ms = start.elapsed().as_millis();
    tracing::info!("Stage {stage} finished in {elapsed_ms} ms");
    stages.push(StageTiming { stage, elapsed_ms });
    Ok(value)
}

fn load(path: &Path) -> Result<Document, ConversionError> {
    Document::load(path).map_err(|err| match err {
        ParseError::Io(source) => ConversionError::Io {
            path: path.to_path_buf(),
            source,
        },
        ParseError::Xml(source) => MergeError::Parse {
            path: path.to_path_buf(),
            source,
        }
        .into(),
    })
}

fn save(document: &Document, path: &Path) -> Result<(), ConversionError> {
    document.save(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::debug!("Wrote {}", path.display());
    Ok(())
}
