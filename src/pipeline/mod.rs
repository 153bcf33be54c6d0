//! Per-file process pipelines
//!
//! A task is processed by a chain of one to three external processes:
//! an optional decompressor, the annotator, and an optional compressor.
//! Stage *n*'s stdout is connected to stage *n+1*'s stdin through an OS
//! pipe, so the stages run concurrently and pipe backpressure provides the
//! flow control.
//!
//! # Shapes
//!
//! The chain topology is fully determined by the two compression flags:
//!
//! | input compressed | output compressed | chain |
//! |---|---|---|
//! | yes | yes | decompress → annotate → compress > `<file>.annotated.xz` |
//! | yes | no  | decompress → annotate (`--outfile=<file>.annotated`) |
//! | no  | yes | annotate `<file>` → compress > `<file>.annotated.xz` |
//! | no  | no  | annotate `<file>` (`--outfile=<file>.annotated`) |
//!
//! [`PipelinePlan`] is the pure description of a chain (programs, argv,
//! sink); [`runner::PipelineRunner`] spawns and reaps it.

pub mod error;
pub mod runner;

use crate::config::{JobConfig, ToolConfig};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

pub use error::PipelineError;
pub use runner::{PipelineReport, PipelineRunner};

/// Suffix appended to the input path for annotator output
pub const ANNOTATED_SUFFIX: &str = ".annotated";

/// Extra suffix when the output goes through the compressor
pub const COMPRESSED_SUFFIX: &str = ".xz";

/// One of the four fixed chain topologies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineShape {
    /// annotate(file) writes the output itself
    PlainToPlain,
    /// annotate(file) | compress > output
    PlainToCompressed,
    /// decompress(file) | annotate writes the output itself
    CompressedToPlain,
    /// decompress(file) | annotate | compress > output
    CompressedToCompressed,
}

impl PipelineShape {
    /// Select the shape from (input compressed, output compressed)
    pub fn select(input_compressed: bool, output_compressed: bool) -> Self {
        match (input_compressed, output_compressed) {
            (true, true) => PipelineShape::CompressedToCompressed,
            (true, false) => PipelineShape::CompressedToPlain,
            (false, true) => PipelineShape::PlainToCompressed,
            (false, false) => PipelineShape::PlainToPlain,
        }
    }

    /// Chain starts with a decompression stage
    pub fn decompresses(self) -> bool {
        matches!(
            self,
            PipelineShape::CompressedToPlain | PipelineShape::CompressedToCompressed
        )
    }

    /// Chain ends with a compression stage
    pub fn compresses(self) -> bool {
        matches!(
            self,
            PipelineShape::PlainToCompressed | PipelineShape::CompressedToCompressed
        )
    }

    /// Number of external processes in the chain
    pub fn stage_count(self) -> usize {
        1 + self.decompresses() as usize + self.compresses() as usize
    }

    /// Deterministic output location for `input`
    pub fn output_path(self, input: &Path) -> PathBuf {
        let mut name = input.as_os_str().to_owned();
        name.push(ANNOTATED_SUFFIX);
        if self.compresses() {
            name.push(COMPRESSED_SUFFIX);
        }
        PathBuf::from(name)
    }
}

impl fmt::Display for PipelineShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineShape::PlainToPlain => "plain->plain",
            PipelineShape::PlainToCompressed => "plain->compressed",
            PipelineShape::CompressedToPlain => "compressed->plain",
            PipelineShape::CompressedToCompressed => "compressed->compressed",
        };
        f.write_str(name)
    }
}

/// What a stage does in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageRole {
    Decompress,
    Annotate,
    Compress,
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageRole::Decompress => "decompress",
            StageRole::Annotate => "annotate",
            StageRole::Compress => "compress",
        };
        f.write_str(name)
    }
}

/// One external process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub role: StageRole,
    pub program: String,
    pub args: Vec<OsString>,
}

impl StageSpec {
    fn new(role: StageRole, program: &str) -> Self {
        Self {
            role,
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(args.into_iter().map(|a| a.as_ref().to_owned()));
        self
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Where the output artifact comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    /// The annotator is given an explicit output-file argument
    AnnotatorOutfile,
    /// The last stage's stdout is redirected into the output file
    LastStageStdout,
}

/// Fully resolved chain for one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    pub shape: PipelineShape,
    pub input: PathBuf,
    pub output: PathBuf,
    pub stages: Vec<StageSpec>,
    pub sink: Sink,
}

impl PipelinePlan {
    /// Build the chain for `input` under `config`
    pub fn build(input: &Path, config: &JobConfig) -> Self {
        let shape = PipelineShape::select(config.input_compressed, config.output_compressed);
        let output = shape.output_path(input);
        let tools = &config.tools;

        let mut annotate = annotator_base(tools, config);
        if !shape.compresses() {
            annotate = annotate.arg(outfile_arg(&tools.outfile_flag, &output));
        }
        if !shape.decompresses() {
            annotate = annotate.arg(input);
        }

        let mut stages = Vec::with_capacity(shape.stage_count());
        if shape.decompresses() {
            stages.push(StageSpec::new(StageRole::Decompress, &tools.decompressor).arg(input));
        }
        stages.push(annotate);
        if shape.compresses() {
            stages.push(StageSpec::new(StageRole::Compress, &tools.compressor));
        }

        let sink = if shape.compresses() {
            Sink::LastStageStdout
        } else {
            Sink::AnnotatorOutfile
        };

        Self {
            shape,
            input: input.to_path_buf(),
            output,
            stages,
            sink,
        }
    }

    /// The annotator stage; every plan built by [`PipelinePlan::build`] has one
    pub fn annotator(&self) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.role == StageRole::Annotate)
    }
}

impl fmt::Display for PipelinePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stage) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", stage)?;
        }
        if self.sink == Sink::LastStageStdout {
            write!(f, " > {}", self.output.display())?;
        }
        Ok(())
    }
}

/// `<annotator> <immediate flag> <args...> <model>`
fn annotator_base(tools: &ToolConfig, config: &JobConfig) -> StageSpec {
    let mut stage = StageSpec::new(StageRole::Annotate, &tools.annotator);
    if !tools.immediate_flag.is_empty() {
        stage = stage.arg(&tools.immediate_flag);
    }
    stage.args(&config.args).arg(&config.model)
}

/// `<flag>=<path>`, kept as an OS string so odd file names survive
fn outfile_arg(flag: &str, output: &Path) -> OsString {
    let mut arg = OsString::from(format!("{}=", flag));
    arg.push(output.as_os_str());
    arg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;

    fn config(input_compressed: bool, output_compressed: bool) -> JobConfig {
        JobConfig {
            args: vec!["--tokenize".to_string(), "--tag".to_string(), "--parse".to_string()],
            model: PathBuf::from("ru.udpipe"),
            pattern: "*.txt".to_string(),
            input_compressed,
            output_compressed,
            workers: None,
            chunk_size: None,
            tools: ToolConfig::default(),
            failure_policy: FailurePolicy::Strict,
        }
    }

    fn argv(stage: &StageSpec) -> Vec<String> {
        stage.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_shape_selection_is_exhaustive_and_distinct() {
        let shapes = [
            PipelineShape::select(false, false),
            PipelineShape::select(false, true),
            PipelineShape::select(true, false),
            PipelineShape::select(true, true),
        ];
        assert_eq!(shapes[0], PipelineShape::PlainToPlain);
        assert_eq!(shapes[1], PipelineShape::PlainToCompressed);
        assert_eq!(shapes[2], PipelineShape::CompressedToPlain);
        assert_eq!(shapes[3], PipelineShape::CompressedToCompressed);

        let unique: std::collections::HashSet<_> = shapes.iter().collect();
        assert_eq!(unique.len(), 4);
        assert_eq!(shapes.map(|s| s.stage_count()), [1, 2, 2, 3]);
    }

    #[test]
    fn test_output_paths() {
        let input = Path::new("/data/ru.01.txt.xz");
        assert_eq!(
            PipelineShape::PlainToPlain.output_path(input),
            PathBuf::from("/data/ru.01.txt.xz.annotated")
        );
        assert_eq!(
            PipelineShape::CompressedToPlain.output_path(input),
            PathBuf::from("/data/ru.01.txt.xz.annotated")
        );
        assert_eq!(
            PipelineShape::PlainToCompressed.output_path(input),
            PathBuf::from("/data/ru.01.txt.xz.annotated.xz")
        );
        assert_eq!(
            PipelineShape::CompressedToCompressed.output_path(input),
            PathBuf::from("/data/ru.01.txt.xz.annotated.xz")
        );
    }

    #[test]
    fn test_every_plan_has_one_annotator() {
        for (input_compressed, output_compressed) in
            [(false, false), (false, true), (true, false), (true, true)]
        {
            let plan = PipelinePlan::build(
                Path::new("in.txt"),
                &config(input_compressed, output_compressed),
            );
            let annotators = plan.stages.iter().filter(|s| s.role == StageRole::Annotate);
            assert_eq!(annotators.count(), 1);
            assert_eq!(plan.annotator().map(|s| s.program.as_str()), Some("udpipe"));
        }

        let empty = PipelinePlan {
            stages: Vec::new(),
            ..PipelinePlan::build(Path::new("in.txt"), &config(false, false))
        };
        assert!(empty.annotator().is_none());
    }

    #[test]
    fn test_plain_to_plain_plan() {
        let plan = PipelinePlan::build(Path::new("in.txt"), &config(false, false));
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.sink, Sink::AnnotatorOutfile);

        let stage = &plan.stages[0];
        assert_eq!(stage.program, "udpipe");
        assert_eq!(
            argv(stage),
            vec![
                "--immediate",
                "--tokenize",
                "--tag",
                "--parse",
                "ru.udpipe",
                "--outfile=in.txt.annotated",
                "in.txt",
            ]
        );
    }

    #[test]
    fn test_plain_to_compressed_plan() {
        let plan = PipelinePlan::build(Path::new("in.txt"), &config(false, true));
        assert_eq!(plan.sink, Sink::LastStageStdout);
        assert_eq!(plan.output, PathBuf::from("in.txt.annotated.xz"));

        let roles: Vec<StageRole> = plan.stages.iter().map(|s| s.role).collect();
        assert_eq!(roles, vec![StageRole::Annotate, StageRole::Compress]);
        assert_eq!(
            argv(&plan.stages[0]),
            vec!["--immediate", "--tokenize", "--tag", "--parse", "ru.udpipe", "in.txt"]
        );
        assert_eq!(plan.stages[1].program, "xz");
        assert!(plan.stages[1].args.is_empty());
    }

    #[test]
    fn test_compressed_to_plain_plan() {
        let plan = PipelinePlan::build(Path::new("in.txt.xz"), &config(true, false));
        assert_eq!(plan.sink, Sink::AnnotatorOutfile);

        assert_eq!(plan.stages[0].role, StageRole::Decompress);
        assert_eq!(plan.stages[0].program, "xzcat");
        assert_eq!(argv(&plan.stages[0]), vec!["in.txt.xz"]);

        // Reads stdin: outfile given, no positional input
        assert_eq!(
            argv(&plan.stages[1]),
            vec![
                "--immediate",
                "--tokenize",
                "--tag",
                "--parse",
                "ru.udpipe",
                "--outfile=in.txt.xz.annotated",
            ]
        );
    }

    #[test]
    fn test_compressed_to_compressed_plan() {
        let plan = PipelinePlan::build(Path::new("in.txt.xz"), &config(true, true));
        let roles: Vec<StageRole> = plan.stages.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![StageRole::Decompress, StageRole::Annotate, StageRole::Compress]
        );
        assert_eq!(
            argv(plan.annotator().unwrap()),
            vec!["--immediate", "--tokenize", "--tag", "--parse", "ru.udpipe"]
        );
        assert_eq!(
            plan.to_string(),
            "xzcat in.txt.xz | udpipe --immediate --tokenize --tag --parse ru.udpipe | xz > in.txt.xz.annotated.xz"
        );
    }

    #[test]
    fn test_custom_tools() {
        let mut config = config(false, false);
        config.tools.annotator = "/opt/bin/annotate".to_string();
        config.tools.immediate_flag = String::new();
        config.tools.outfile_flag = "--output".to_string();

        let plan = PipelinePlan::build(Path::new("a"), &config);
        assert_eq!(
            plan.to_string(),
            "/opt/bin/annotate --tokenize --tag --parse ru.udpipe --output=a.annotated a"
        );
    }
}
