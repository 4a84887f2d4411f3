use std::io::{self, ErrorKind, Write};

/// Print rendered output followed by a newline. Nothing is printed for an
/// empty rendering. A closed pipe (`linkedin-ads ... | head`) is not an error.
pub fn emit(text: &str) -> io::Result<()> {
    if text.is_empty() {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    let written = writeln!(stdout, "{text}").and_then(|()| stdout.flush());
    match written {
        Err(e) if e.kind() == ErrorKind::BrokenPipe => Ok(()),
        other => other,
    }
}
