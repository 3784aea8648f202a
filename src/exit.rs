use std::fmt;

/// Process exit status for a failed run. Errors without a class exit with
/// [`ExitCode::PollFailed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    InvalidArgs = 2,
    PollFailed = 10,
    UpstreamFailed = 20,
}

#[derive(Debug)]
struct ExitError {
    code: ExitCode,
    err: anyhow::Error,
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.err.fmt(f)
    }
}

impl std::error::Error for ExitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.err.source()
    }
}

fn classify(code: ExitCode, err: anyhow::Error) -> anyhow::Error {
    ExitError { code, err }.into()
}

pub fn exit_code(err: &anyhow::Error) -> i32 {
    let code = err
        .downcast_ref::<ExitError>()
        .map_or(ExitCode::PollFailed, |exit| exit.code);
    code as i32
}

pub fn invalid_args(message: impl Into<String>) -> anyhow::Error {
    classify(ExitCode::InvalidArgs, anyhow::anyhow!(message.into()))
}

pub fn invalid_args_err(err: anyhow::Error) -> anyhow::Error {
    classify(ExitCode::InvalidArgs, err)
}

pub fn upstream_err(err: anyhow::Error) -> anyhow::Error {
    classify(ExitCode::UpstreamFailed, err)
}
