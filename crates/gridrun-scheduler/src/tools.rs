//! Invocations of the MEME suite motif tools.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::submitter::ToolInvocation;

/// Motif discovery with DREME.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DremeJob {
    pub executable: String,
    /// Sequences expected to contain the motifs.
    pub positives: PathBuf,
    /// Background sequences. DREME shuffles the positives when absent.
    pub negatives: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub description: String,
    pub extra_options: Vec<String>,
}

impl DremeJob {
    pub const ADDITIONAL_OPTIONS: &'static [&'static str] = &["-dna", "-png"];
    pub const MEMORY_GB: u32 = 8;

    pub fn new(
        executable: impl Into<String>,
        positives: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            positives: positives.into(),
            negatives: None,
            output_dir: output_dir.into(),
            description: description.into(),
            extra_options: Self::ADDITIONAL_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_negatives(mut self, negatives: impl Into<PathBuf>) -> Self {
        self.negatives = Some(negatives.into());
        self
    }

    pub fn with_extra_options(mut self, options: Vec<String>) -> Self {
        self.extra_options = options;
        self
    }

    /// Text-format motifs DREME writes into its output directory.
    pub fn motif_file(&self) -> PathBuf {
        self.output_dir.join("dreme.txt")
    }

    pub fn invocation(&self) -> ToolInvocation {
        let mut invocation = ToolInvocation::new(self.executable.clone())
            .arg("-oc")
            .arg(path_arg(&self.output_dir))
            .arg("-p")
            .arg(path_arg(&self.positives));
        if let Some(ref negatives) = self.negatives {
            invocation = invocation.arg("-n").arg(path_arg(negatives));
        }
        invocation
            .arg("-desc")
            .arg(self.description.clone())
            .args(self.extra_options.iter().cloned())
            .with_label(format!("dreme-{}", self.description))
            .with_memory_gb(Self::MEMORY_GB)
    }
}

/// Motif scanning with FIMO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FimoJob {
    pub executable: String,
    /// MEME-format motif file to scan for.
    pub motifs: PathBuf,
    /// Sequences to scan.
    pub sequences: PathBuf,
    pub output_dir: PathBuf,
    pub description: String,
    /// Expected proportion of sequences containing a motif (`--alpha`).
    pub alpha: f64,
    /// Q-value threshold for reported matches.
    pub qv_thresh: f64,
    pub extra_options: Vec<String>,
}

impl FimoJob {
    pub const ADDITIONAL_OPTIONS: &'static [&'static str] = &["--verbosity", "1"];
    pub const MEMORY_GB: u32 = 4;

    pub fn new(
        executable: impl Into<String>,
        motifs: impl Into<PathBuf>,
        sequences: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            motifs: motifs.into(),
            sequences: sequences.into(),
            output_dir: output_dir.into(),
            description: description.into(),
            alpha: 1.0,
            qv_thresh: 0.05,
            extra_options: Self::ADDITIONAL_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_qv_thresh(mut self, qv_thresh: f64) -> Self {
        self.qv_thresh = qv_thresh;
        self
    }

    pub fn with_extra_options(mut self, options: Vec<String>) -> Self {
        self.extra_options = options;
        self
    }

    pub fn invocation(&self) -> ToolInvocation {
        // FIMO wants every option before the two positional files.
        ToolInvocation::new(self.executable.clone())
            .arg("--oc")
            .arg(path_arg(&self.output_dir))
            .arg("--alpha")
            .arg(self.alpha.to_string())
            .arg("--thresh")
            .arg(self.qv_thresh.to_string())
            .arg("--qv-thresh")
            .args(self.extra_options.iter().cloned())
            .arg(path_arg(&self.motifs))
            .arg(path_arg(&self.sequences))
            .with_label(format!("fimo-{}", self.description))
            .with_memory_gb(Self::MEMORY_GB)
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
