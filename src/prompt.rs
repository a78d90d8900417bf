// Interactive credential prompt for live pushes.

use std::io::{self, BufRead, Write};

use crate::store::Credentials;

/// Ask for admin credentials on `output`, reading answers from `input`.
/// A username already supplied on the command line is not asked again.
pub fn prompt_credentials<R, W>(
    mut input: R,
    mut output: W,
    known_username: Option<&str>,
) -> io::Result<Credentials>
where
    R: BufRead,
    W: Write,
{
    writeln!(output)?;
    let username = match known_username {
        Some(name) => name.to_string(),
        None => ask(&mut input, &mut output, "Enter admin username: ")?,
    };
    let password = ask(&mut input, &mut output, "Enter admin password: ")?;
    Ok(Credentials::new(username, password))
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed before credentials were entered",
        ));
    }
    Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
}
