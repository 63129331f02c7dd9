//! Per-language job preparation
//!
//! Turns a language recipe plus submitted source into the concrete file
//! name, command vectors, and (possibly rewritten) source bytes for one
//! execution. The recipes themselves are pure data; the code here is the
//! small set of hook points behind them: entry-point detection and source
//! harness wrapping.

use tracing::debug;

use crate::config::{EntryPointDetector, Harness, Language};

mod entry;
mod harness;

pub use entry::{detect_csharp_class, detect_java_entry, JavaEntry};
pub use harness::wrap_node_harness;

/// Everything the controller needs to run one submission.
#[derive(Debug, Clone)]
pub struct PreparedJob {
    /// File name the source is written under in the scratch directory
    pub source_name: String,

    /// Source bytes, after any harness rewriting
    pub source: Vec<u8>,

    /// Expanded compile command, if the recipe has a compile step
    pub compile_command: Option<Vec<String>>,

    /// Expanded run command
    pub run_command: Vec<String>,
}

/// Resolve a recipe and submitted source into a concrete job.
///
/// Entry-point detection is a best-effort scan, not a parse: obfuscated or
/// unusual source may pick the wrong name, in which case the toolchain's
/// own diagnostics surface the mismatch.
pub fn prepare(language: &Language, code: &str) -> PreparedJob {
    let (file_stem, run_class) = match language.detect_entry {
        Some(EntryPointDetector::JavaClass) => {
            let entry = detect_java_entry(code);
            debug!(class = %entry.class, package = ?entry.package, "detected java entry point");
            (entry.class.clone(), entry.qualified_class())
        }
        Some(EntryPointDetector::CsharpClass) => {
            let class = detect_csharp_class(code);
            debug!(class = %class, "detected c# entry point");
            (class.clone(), class)
        }
        None => ("main".to_owned(), "Main".to_owned()),
    };

    let source_name = if language.detect_entry.is_some() {
        format!("{file_stem}.{}", language.extension)
    } else {
        language.source_name()
    };

    let source = match language.harness {
        Some(Harness::NodeInput) => wrap_node_harness(code).into_bytes(),
        Some(Harness::Utf8Prelude) => format!("# coding: utf-8\n{code}").into_bytes(),
        None => code.as_bytes().to_vec(),
    };

    let binary = language
        .compile
        .as_ref()
        .map(|c| c.output_name.as_str())
        .unwrap_or("main");

    let compile_command = language
        .compile
        .as_ref()
        .map(|c| Language::expand_command(&c.command, &source_name, binary, &run_class));

    let run_command =
        Language::expand_command(&language.run.command, &source_name, binary, &run_class);

    PreparedJob {
        source_name,
        source,
        compile_command,
        run_command,
    }
}
