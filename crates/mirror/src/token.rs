//! Resolution of the gallery bearer token.
//!
//! Sources are tried in order: the configured value, the token file,
//! and finally an interactive prompt.  The token itself is never logged.

use std::io::{self, BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Failed to read token file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prompt for the token: {0}")]
    Prompt(#[source] io::Error),

    #[error("No authorization token was provided")]
    Empty,
}

/// Where the resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Config,
    File,
    Prompt,
}

pub fn resolve_token<R, W>(
    configured: Option<&str>,
    token_file: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<(String, TokenSource), TokenError>
where
    R: BufRead,
    W: Write,
{
    if let Some(token) = configured.map(str::trim).filter(|t| !t.is_empty()) {
        return Ok((token.to_string(), TokenSource::Config));
    }

    match std::fs::read_to_string(token_file) {
        Ok(contents) => {
            let token = contents.trim();
            if !token.is_empty() {
                tracing::debug!(path = %token_file.display(), "Using token from file");
                return Ok((token.to_string(), TokenSource::File));
            }
            tracing::warn!(path = %token_file.display(), "Token file is empty");
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(source) => {
            return Err(TokenError::File {
                path: token_file.to_path_buf(),
                source,
            })
        }
    }

    write!(
        output,
        "Authorization token not found in the environment or {}\n\
         Paste it here and press Enter, or Ctrl-C to cancel: ",
        token_file.display(),
    )
    .and_then(|()| output.flush())
    .map_err(TokenError::Prompt)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(TokenError::Prompt)?;
    let token = line.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }
    Ok((token.to_string(), TokenSource::Prompt))
}
