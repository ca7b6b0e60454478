//! 命令行循环: 单条命令, 交互模式, rc 文件模式

use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use anyhow::anyhow;
use log::{debug, info};

use crate::command;
use crate::context::Context;
use crate::error::{IfshError, Result};
use crate::platform::ControlPlatform;

const PROMPT: &str = "ifsh> ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Split a line into words; double quotes group words and are removed.
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_word = false;

    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

/// Error lines are prefixed with `% `.
pub fn report(out: &mut dyn Write, err: &IfshError) -> std::io::Result<()> {
    for line in err.to_string().lines() {
        writeln!(out, "% {}", line)?;
    }
    Ok(())
}

fn run_line(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    line: &str,
    out: &mut dyn Write,
) -> Result<Flow> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(Flow::Continue);
    }

    let words = split_words(trimmed);
    if let Some(first) = words.first() {
        if first.eq_ignore_ascii_case("quit") || first.eq_ignore_ascii_case("exit") {
            return Ok(Flow::Quit);
        }
    }

    debug!("command: {:?}", words);
    if let Err(e) = command::run(platform, ctx, &words, out) {
        report(out, &e)?;
    }
    // the handler has returned and its channel is closed by now
    if ctx.cancel.take() {
        writeln!(out)?;
    }
    Ok(Flow::Continue)
}

/// One command from the process arguments. Errors go back to the caller.
pub fn run_once<S: AsRef<str>>(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    words: &[S],
    out: &mut dyn Write,
) -> Result<()> {
    command::run(platform, ctx, words, out)
}

pub fn interactive<R: BufRead>(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    mut input: R,
    out: &mut dyn Write,
) -> Result<()> {
    if !ctx.privileged {
        writeln!(out, "% Functionality may be limited without root privileges.")?;
    }
    loop {
        write!(out, "{}", PROMPT)?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(out)?;
            break;
        }
        // an interrupt while waiting for input only discards the prompt
        if ctx.cancel.take() {
            debug!("interrupt at prompt");
        }
        if run_line(platform, ctx, &line, out)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

/// Interpret a file of commands, one per line; `#` starts a comment line.
pub fn run_rcfile(
    platform: &dyn ControlPlatform,
    ctx: &Context,
    path: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let file = File::open(path).map_err(|e| anyhow!("{}: {}", path.display(), e))?;
    info!("reading commands from {}", path.display());
    for line in BufReader::new(file).lines() {
        if ctx.cancel.is_cancelled() {
            info!("{}: interrupted, remaining commands skipped", path.display());
            break;
        }
        if run_line(platform, ctx, &line?, out)? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{SimInterface, SimKernel};
    use std::io::Cursor;

    fn kernel() -> SimKernel {
        SimKernel::new()
            .with_interface("em0", SimInterface::ethernet())
            .with_interface("ath0", SimInterface::wireless())
    }

    #[test]
    fn test_split_words() {
        assert_eq!(split_words("  int em0  mtu 1400 "), vec!["int", "em0", "mtu", "1400"]);
        assert_eq!(
            split_words("interface ath0 nwid \"my net\""),
            vec!["interface", "ath0", "nwid", "my net"]
        );
        assert_eq!(split_words("nwid \"\""), vec!["nwid", ""]);
        assert!(split_words("   ").is_empty());
    }

    #[test]
    fn test_failed_command_keeps_loop_running() {
        let kernel = kernel();
        let ctx = Context::default();
        let input = Cursor::new("interface em0 mtu abc\ninterface em0 mtu 1400\nquit\ninterface em0 mtu 1300\n");
        let mut out = Vec::new();
        interactive(&kernel, &ctx, input, &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("% Invalid MTU\n"));
        assert_eq!(kernel.interface("em0").data.mtu, 1400);
        assert_eq!(kernel.open_channels(), 0);
    }

    #[test]
    fn test_usage_lines_are_prefixed() {
        let kernel = kernel();
        let mut out = Vec::new();
        run_line(&kernel, &Context::default(), "interface em0 mtu", &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "% mtu <mtu>\n% no mtu [mtu]\n");
    }

    #[test]
    fn test_cancel_prints_newline() {
        let kernel = kernel();
        let ctx = Context::default();
        ctx.cancel.cancel();
        let mut out = Vec::new();
        run_line(&kernel, &ctx, "show", &mut out).unwrap();
        assert_eq!(out, b"\n");
        assert!(!ctx.cancel.is_cancelled());
    }

    #[test]
    fn test_rcfile() {
        let kernel = kernel();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ifsh.rc");
        std::fs::write(
            &path,
            "# wireless\ninterface ath0 nwid \"my net\"\n\ninterface ath0 powersave 300\ninterface em0 ip 10.0.0.1/24\n",
        )
        .unwrap();

        let mut out = Vec::new();
        run_rcfile(&kernel, &Context::default(), &path, &mut out).unwrap();
        assert!(out.is_empty());
        let ath0 = kernel.interface("ath0").wireless.unwrap();
        assert_eq!(ath0.nwid, b"my net");
        assert_eq!(ath0.power.timeout_ms, 300);
        assert_eq!(kernel.interface("em0").addresses.len(), 1);
    }

    #[test]
    fn test_cancelled_rcfile_stops_reading() {
        let kernel = kernel();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ifsh.rc");
        std::fs::write(
            &path,
            "interface em0 mtu 1400\ninterface em0 mtu 1300\ninterface em0 mtu 1200\n",
        )
        .unwrap();

        let ctx = Context::default();
        ctx.cancel.cancel();
        let mut out = Vec::new();
        run_rcfile(&kernel, &ctx, &path, &mut out).unwrap();

        assert!(out.is_empty());
        assert_eq!(kernel.interface("em0").data.mtu, 1500);
        assert!(kernel.requests().is_empty());
    }

    #[test]
    fn test_missing_rcfile() {
        let kernel = kernel();
        let mut out = Vec::new();
        let err = run_rcfile(&kernel, &Context::default(), Path::new("/nonexistent/ifsh.rc"), &mut out)
            .unwrap_err();
        assert!(err.to_string().starts_with("/nonexistent/ifsh.rc: "));
    }
}
