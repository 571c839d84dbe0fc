//! Top level driver for the IR pipeline.
//!
//! The pipeline is linear: the self tail-call optimizer runs first, the
//! checker re-validates its output, the await transform runs next, and
//! the checker re-validates again. A checker failure is a compiler bug;
//! the driver prints the diagnostic (and, in verbose mode, a dump of the
//! offending tree) and reports failure to its caller.

use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{BufferedStandardStream, ColorChoice};

use crate::ir::validate::{check_prog, Scope};
use crate::ir::Prog;
use crate::pass::{await_lowering, tailcall};
use crate::reporting::CheckError;
use crate::source::FileId;

#[derive(Debug, Copy, Clone)]
pub enum Status {
    Ok,
    Error,
}

impl Status {
    pub fn exit_code(self) -> i32 {
        match self {
            Status::Ok => 0,
            Status::Error => 1,
        }
    }
}

/// Run the passes over a checked program. Phase names appear in the
/// checker's messages.
pub fn lower(scope: &Scope, prog: Prog) -> Result<Prog, CheckError> {
    check_prog(scope, "desugaring", &prog)?;
    let prog = tailcall::transform(prog);
    check_prog(scope, "tail call optimization", &prog)?;
    let prog = await_lowering::transform(prog);
    check_prog(scope, "await lowering", &prog)?;
    Ok(prog)
}

pub struct Driver {
    files: SimpleFiles<String, String>,
    codespan_config: term::Config,
    verbose: bool,
}

impl Driver {
    pub fn new() -> Driver {
        Driver {
            files: SimpleFiles::new(),
            codespan_config: term::Config::default(),
            verbose: false,
        }
    }

    /// Dump the IR alongside any diagnostic.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Register a source file for diagnostic rendering; elaboration's
    /// spans refer to the returned id.
    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> FileId {
        self.files.add(name.into(), source.into())
    }

    /// Run the pipeline, printing a diagnostic on failure.
    pub fn run_passes(&self, scope: &Scope, prog: Prog) -> (Status, Option<Prog>) {
        let dump = self.verbose.then(|| format!("{:#?}", prog));
        match lower(scope, prog) {
            Ok(prog) => (Status::Ok, Some(prog)),
            Err(error) => {
                self.emit(&error);
                if let Some(dump) = dump {
                    eprintln!("{}", dump);
                }
                (Status::Error, None)
            }
        }
    }

    fn emit(&self, error: &CheckError) {
        let mut writer = BufferedStandardStream::stderr(ColorChoice::Auto);
        // Falls back to the one-line rendering if the span's file is not
        // registered with this driver.
        if term::emit(
            &mut writer,
            &self.codespan_config,
            &self.files,
            &error.to_diagnostic(),
        )
        .is_err()
        {
            eprintln!("{}", error);
        }
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new()
    }
}
